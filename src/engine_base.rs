//! This module contains the implementation of the [`Engine`](crate::engine::Engine) struct and is intended for advanced usages.
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use num::traits::{NumAssign, NumOps};
use num::{
    cast::AsPrimitive,
    traits::{ConstOne, ConstZero},
    Num,
};
use serde::{Deserialize, Serialize};
use tinyvec::TinyVec;

use crate::engine_like::{ParseError, ParserLike};
use crate::forest::ParseForest;
use crate::grammar::{RhsKind, RuleID, RuleSet};
use crate::graph::{GrowingNodeId, ParseGraph};

/// The specific config of the [`EngineBase`].
///
/// Both limits implement the bounded-work watchdog: they are a policy layer
/// above the growth algorithm, not part of its contract. `None` disables a
/// limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EngineConfig {
    /// The maximum number of growth rounds one parse may take.
    pub max_growth_rounds: Option<usize>,
    /// The maximum number of graph nodes one parse may allocate.
    pub max_graph_nodes: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
/// Represents the error type for the [`EngineBase`] creation.
pub enum CreateEngineBaseError {
    #[error(
        "The rule set needs {0} rule ids, exceeding {1}, the maximum allowed by the current id type(TI).
     Consider using a larger id type."
    )]
    /// The rule set has more rules than the configured id type can number.
    RuleSetTooLarge(usize, usize),
}

/// The growth engine over one compiled rule set, generic over the id width.
/// One instance is reusable for any number of parses; each parse owns a fresh
/// parse graph internally.
#[derive(Clone)]
pub struct EngineBase<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    rule_set: Arc<RuleSet<TI>>,
    config: EngineConfig,
}

impl<TI> EngineBase<TI>
where
    TI: Num
        + AsPrimitive<usize>
        + ConstOne
        + ConstZero
        + NumOps
        + NumAssign
        + std::cmp::PartialOrd
        + std::convert::TryFrom<usize>
        + num::Bounded
        + Hash
        + Eq,
    usize: num::traits::AsPrimitive<TI>,
{
    /// Create a new [`EngineBase`].
    ///
    /// # Errors
    ///
    /// Returns a [`CreateEngineBaseError`] when the rule set (plus the goal
    /// wrapper the graph synthesizes per parse) does not fit the id type.
    pub fn new(
        rule_set: Arc<RuleSet<TI>>,
        config: EngineConfig,
    ) -> Result<Self, CreateEngineBaseError> {
        let max = TI::max_value().as_();
        if rule_set.rule_count() + 1 > max {
            return Err(CreateEngineBaseError::RuleSetTooLarge(
                rule_set.rule_count() + 1,
                max,
            ));
        }
        Ok(Self { rule_set, config })
    }

    #[inline]
    /// The compiled rule set the engine parses with.
    pub fn rule_set(&self) -> &RuleSet<TI> {
        &self.rule_set
    }

    pub(crate) fn parse_text(&self, goal: &str, text: &str) -> Result<ParseForest, ParseError> {
        let goal_id = self
            .rule_set
            .rule_id_from_tag(goal)
            .ok_or_else(|| ParseError::RuleNotFound(goal.to_string()))?;
        if text.len() > u32::MAX as usize {
            return Err(ParseError::InputTooLong(text.len()));
        }
        let mut graph = ParseGraph::new(&self.rule_set, goal_id, text);
        graph.create_start();
        let mut rounds = 0usize;
        while graph.can_grow() {
            rounds += 1;
            if let Some(limit) = self.config.max_growth_rounds {
                if rounds > limit {
                    return Err(ParseError::RoundLimitExceeded(limit));
                }
            }
            if let Some(limit) = self.config.max_graph_nodes {
                if graph.node_count() > limit {
                    return Err(ParseError::GraphSizeLimitExceeded(limit));
                }
            }
            let to_grow = graph.take_growable();
            log::debug!(
                "growth round {}: {} heads, {} nodes in graph",
                rounds,
                to_grow.len(),
                graph.node_count()
            );
            for gn in to_grow {
                self.grow_tree_width_and_height(&mut graph, gn);
            }
        }
        match graph.find_full_goal() {
            Some(goal_cn) => Ok(graph.extract_rerooted_forest(goal_cn)),
            None => {
                let diagnostic = graph.longest_match_diagnostic();
                let position = diagnostic.map_or(0, |cn| {
                    let node = graph.complete_node(cn);
                    if node.start == 0 {
                        (node.start + node.length) as usize
                    } else {
                        0
                    }
                });
                Err(ParseError::ParseFailed {
                    goal: goal.to_string(),
                    position,
                    longest_match: diagnostic.map(|cn| graph.extract_forest(cn)),
                })
            }
        }
    }

    /// Process one growable node: skip-width first, then either the skip-node
    /// path or height growth, graft-back and width growth, finally releasing
    /// the stack context of a node that made no width progress.
    fn grow_tree_width_and_height(&self, graph: &mut ParseGraph<'_, TI>, gn: GrowingNodeId) {
        log::trace!(
            "grow head {}: rule {}",
            gn,
            graph.growing_node(gn).rule.0.as_()
        );
        if self.grow_width_with_skip(graph, gn) {
            // skip-interleaving takes precedence; the grafted skip child
            // re-enters this node's continuation next round
            return;
        }
        let rule = graph.growing_node(gn).rule;
        if graph.is_skip_rule(rule) {
            if graph.has_complete_children(gn) {
                self.try_graft_back_skip(graph, gn);
            }
            let grown = if graph.can_grow_width(gn) {
                self.grow_width(graph, gn)
            } else {
                false
            };
            if !grown {
                graph.pop(gn);
            }
            return;
        }
        if graph.has_complete_children(gn) {
            self.grow_height(graph, gn);
        }
        if graph.has_complete_children(gn) && !graph.growing_node(gn).previous.is_empty() {
            self.try_graft_back(graph, gn);
        }
        let grown = if graph.can_grow_width(gn) {
            self.grow_width(graph, gn)
        } else {
            false
        };
        if !grown {
            graph.pop(gn);
        }
    }

    /// Shift every possible skip-first terminal at the node's end position,
    /// without requiring the rule's own expected terminal.
    fn grow_width_with_skip(&self, graph: &mut ParseGraph<'_, TI>, gn: GrowingNodeId) -> bool {
        let rule = graph.growing_node(gn).rule;
        if graph.is_skip_rule(rule) {
            return false;
        }
        // The goal wrapper accepts skip content at any time so trailing skip
        // text after a complete goal still attaches.
        if !(graph.can_grow_width(gn) || rule == graph.goal_rule()) {
            return false;
        }
        let rule_set = graph.rule_set;
        let end = graph.growing_node(gn).next_input_position;
        let mut modified = false;
        for t in rule_set.skip_first_terminals().ones() {
            let terminal = RuleID(t.as_());
            if let Some(leaf) = graph.fetch_bud(terminal, end) {
                let cn = graph.find_or_create_leaf(leaf);
                graph.push_to_stack_of(cn, gn);
                modified = true;
            }
        }
        modified
    }

    /// Graft a completed skip occurrence into every stacked context, without
    /// advancing the owners' cursors.
    fn try_graft_back_skip(&self, graph: &mut ParseGraph<'_, TI>, gn: GrowingNodeId) {
        let previous = graph.growing_node(gn).previous.clone();
        let cn = graph.complete(gn);
        for info in previous {
            graph.grow_next_skip_child(info.node, cn);
        }
    }

    /// Graft a completed node back into every stacked context that expects
    /// exactly its rule at the recorded slot.
    fn try_graft_back(&self, graph: &mut ParseGraph<'_, TI>, gn: GrowingNodeId) {
        let rule = graph.growing_node(gn).rule;
        let previous = graph.growing_node(gn).previous.clone();
        for info in previous {
            if graph.expects_item_at(info.node, rule, info.at_position) {
                let cn = graph.complete(gn);
                graph.grow_next_child(info.node, cn, info.at_position);
            }
        }
    }

    /// Height growth: lift a completed node one level into every possible
    /// super-rule that is realizable in at least one of its stacked contexts.
    fn grow_height(&self, graph: &mut ParseGraph<'_, TI>, gn: GrowingNodeId) {
        let rule = graph.growing_node(gn).rule;
        if rule == graph.goal_rule() {
            return;
        }
        let previous = graph.growing_node(gn).previous.clone();
        let rule_set = graph.rule_set;
        for parent in rule_set.super_rules(rule).ones() {
            let parent_rule = RuleID(parent.as_());
            if !self.has_height_potential(graph, parent_rule, gn) {
                continue;
            }
            let priority = match rule_set.rhs(parent_rule).map(|rhs| rhs.kind) {
                Some(RhsKind::Choice) | Some(RhsKind::PriorityChoice) => rule_set
                    .rhs_items(parent_rule)
                    .iter()
                    .position(|&item| item == rule)
                    .unwrap_or(0) as u32,
                _ => 0,
            };
            let cn = graph.complete(gn);
            graph.create_with_first_child(parent_rule, priority, cn, &previous);
        }
    }

    /// Whether lifting `gn` into `parent_rule` can lead anywhere: the parent
    /// must accept the rule as its first child, and some stacked context must
    /// expect the parent directly or be able to reach it as a first sub-rule.
    /// Skip content is realizable at any position.
    fn has_height_potential(
        &self,
        graph: &ParseGraph<'_, TI>,
        parent_rule: RuleID<TI>,
        gn: GrowingNodeId,
    ) -> bool {
        let rule_set = graph.rule_set;
        let node = graph.growing_node(gn);
        let rule = node.rule;
        if !rule_set.could_have_first_child(parent_rule, rule) {
            return false;
        }
        if rule_set.is_skip_reachable(parent_rule) {
            return true;
        }
        if node.previous.is_empty() {
            return false;
        }
        for info in node.previous.iter() {
            if !graph.has_next_expected_item(info.node) {
                continue;
            }
            for expected in graph.next_expected_items(info.node) {
                if expected == parent_rule {
                    return true;
                }
                if !rule_set.is_terminal(expected)
                    && rule_set
                        .first_sub_rules(expected)
                        .contains(parent_rule.0.as_())
                {
                    return true;
                }
            }
        }
        false
    }

    /// Width growth: match the terminals that could legally come next at the
    /// node's end position and push each match as a new stack frame.
    fn grow_width(&self, graph: &mut ParseGraph<'_, TI>, gn: GrowingNodeId) -> bool {
        let rule_set = graph.rule_set;
        let end = graph.growing_node(gn).next_input_position;
        let expected = graph.next_expected_items(gn);
        let mut candidates: TinyVec<[RuleID<TI>; 8]> = TinyVec::default();
        for item in expected {
            for t in rule_set.first_terminals(item).ones() {
                let terminal = RuleID(t.as_());
                if !candidates.contains(&terminal) {
                    candidates.push(terminal);
                }
            }
        }
        let mut modified = false;
        for terminal in candidates {
            if let Some(leaf) = graph.fetch_bud(terminal, end) {
                let cn = graph.find_or_create_leaf(leaf);
                graph.push_to_stack_of(cn, gn);
                modified = true;
            }
        }
        modified
    }
}

impl<TI> Debug for EngineBase<TI>
where
    TI: Num
        + AsPrimitive<usize>
        + ConstOne
        + ConstZero
        + NumOps
        + NumAssign
        + std::cmp::PartialOrd
        + std::convert::TryFrom<usize>
        + num::Bounded
        + Hash
        + Eq
        + Debug,
    usize: num::traits::AsPrimitive<TI>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBase")
            .field("rule_set", &self.rule_set)
            .field("config", &self.config)
            .finish()
    }
}

impl<TI> crate::engine_like::sealed::Sealed for EngineBase<TI> where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero
{
}

impl<TI> ParserLike for EngineBase<TI>
where
    TI: Num
        + AsPrimitive<usize>
        + ConstOne
        + ConstZero
        + NumOps
        + NumAssign
        + std::cmp::PartialOrd
        + std::convert::TryFrom<usize>
        + num::Bounded
        + Hash
        + Eq
        + Debug,
    usize: num::traits::AsPrimitive<TI>,
{
    fn parse(&self, goal: &str, text: &str) -> Result<ParseForest, ParseError> {
        self.parse_text(goal, text)
    }

    fn rule_count(&self) -> usize {
        self.rule_set.rule_count()
    }

    fn into_boxed_parser(self) -> Box<dyn ParserLike> {
        Box::new(self)
    }
}
