//! The parse graph: the shared mutable state of one parse attempt. It doubles
//! as the graph-structured stack (growing nodes and their Previous links) and
//! as the SPPF store (canonical complete nodes with packed alternatives).
use std::hash::Hash;

use ahash::AHashMap;
use num::traits::{NumAssign, NumOps};
use num::{
    cast::AsPrimitive,
    traits::{ConstOne, ConstZero},
    Num,
};
use tinyvec::TinyVec;

use crate::forest::{ForestNode, ForestRule, ParseForest};
use crate::grammar::{RhsKind, RuleID, RuleKind, RuleRhs, RuleSet, TerminalKind};
use crate::input::{Input, Leaf};

pub(crate) type CompleteNodeId = u32;
pub(crate) type GrowingNodeId = u32;

/// Identity of a canonical complete node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct CompleteNodeIndex<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    rule: RuleID<TI>,
    start: u32,
    length: u32,
}

/// Identity of a growing node within the frame and worklist indexes.
/// Priority is part of the identity so same-span alternatives of a choice
/// stay distinct until the complete-node pool disambiguates them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct GrowingNodeIndex<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    rule: RuleID<TI>,
    start: u32,
    next_input_position: u32,
    next_item_index: u32,
    priority: u32,
}

/// An SPPF node: "rule R validly matches text[start, start+length)".
/// Canonical per `(rule, start, length)`; ambiguous derivations pack their
/// child lists as alternatives under the one node.
#[derive(Debug, Clone)]
pub(crate) struct CompleteNode<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    pub(crate) rule: RuleID<TI>,
    pub(crate) start: u32,
    pub(crate) length: u32,
    pub(crate) priority: u32,
    pub(crate) is_leaf: bool,
    pub(crate) alternatives: Vec<Vec<CompleteNodeId>>,
}

/// One stacked context a growing node is continuing: the owner node and the
/// RHS slot the grown node would fill in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct PreviousInfo {
    pub(crate) node: GrowingNodeId,
    pub(crate) at_position: u32,
}

/// A node mid-derivation. The Previous set is how the graph-structured stack
/// shares context: the same node can continue several parent derivations.
#[derive(Debug, Clone)]
pub(crate) struct GrowingNode<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    pub(crate) rule: RuleID<TI>,
    pub(crate) start: u32,
    pub(crate) next_input_position: u32,
    pub(crate) next_item_index: u32,
    pub(crate) priority: u32,
    pub(crate) children: Vec<CompleteNodeId>,
    pub(crate) previous: Vec<PreviousInfo>,
}

/// The shared mutable state of one parse attempt. Created per parse and
/// discarded after the result is extracted.
pub(crate) struct ParseGraph<'a, TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    pub(crate) rule_set: &'a RuleSet<TI>,
    pub(crate) input: Input<'a, TI>,
    user_goal: RuleID<TI>,
    goal: RuleID<TI>,
    goal_items: [RuleID<TI>; 1],
    complete_nodes: Vec<CompleteNode<TI>>,
    complete_index: AHashMap<CompleteNodeIndex<TI>, CompleteNodeId>,
    growing_nodes: Vec<GrowingNode<TI>>,
    /// Live stack frames: nodes currently referenced as someone's Previous.
    growing: AHashMap<GrowingNodeIndex<TI>, GrowingNodeId>,
    /// Next round's worklist, deduplicated by node identity.
    growable: AHashMap<GrowingNodeIndex<TI>, GrowingNodeId>,
    growable_order: Vec<GrowingNodeId>,
    goals: Vec<CompleteNodeId>,
}

impl<'a, TI> ParseGraph<'a, TI>
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
    pub(crate) fn new(rule_set: &'a RuleSet<TI>, user_goal: RuleID<TI>, text: &'a str) -> Self {
        // The goal wrapper occupies the id one past the compiled rules; the
        // caller has verified that it fits the id type.
        let goal = RuleID(rule_set.rule_count().as_());
        Self {
            rule_set,
            input: Input::new(text),
            user_goal,
            goal,
            goal_items: [user_goal],
            complete_nodes: Vec::new(),
            complete_index: AHashMap::default(),
            growing_nodes: Vec::new(),
            growing: AHashMap::default(),
            growable: AHashMap::default(),
            growable_order: Vec::new(),
            goals: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn goal_rule(&self) -> RuleID<TI> {
        self.goal
    }

    #[inline]
    pub(crate) fn node_count(&self) -> usize {
        self.growing_nodes.len() + self.complete_nodes.len()
    }

    #[inline]
    pub(crate) fn can_grow(&self) -> bool {
        !self.growable_order.is_empty()
    }

    /// Snapshot and clear the growable worklist for one round.
    pub(crate) fn take_growable(&mut self) -> Vec<GrowingNodeId> {
        self.growable.clear();
        std::mem::take(&mut self.growable_order)
    }

    #[inline]
    pub(crate) fn growing_node(&self, id: GrowingNodeId) -> &GrowingNode<TI> {
        &self.growing_nodes[id as usize]
    }

    #[inline]
    pub(crate) fn complete_node(&self, id: CompleteNodeId) -> &CompleteNode<TI> {
        &self.complete_nodes[id as usize]
    }

    /// Goal-aware right-hand-side lookup; `None` for terminals.
    fn rhs_of(&self, rule: RuleID<TI>) -> Option<RuleRhs> {
        if rule == self.goal {
            Some(RuleRhs {
                kind: RhsKind::Concatenation,
                min: 0,
                max: None,
            })
        } else {
            self.rule_set.rhs(rule)
        }
    }

    /// Goal-aware RHS item row lookup.
    fn rhs_items_of(&self, rule: RuleID<TI>) -> &[RuleID<TI>] {
        if rule == self.goal {
            &self.goal_items
        } else {
            self.rule_set.rhs_items(rule)
        }
    }

    #[inline]
    pub(crate) fn is_skip_rule(&self, rule: RuleID<TI>) -> bool {
        rule != self.goal && self.rule_set.is_skip(rule)
    }

    fn concat_len(&self, rule: RuleID<TI>) -> usize {
        self.rhs_items_of(rule).len()
    }

    fn key_of(&self, id: GrowingNodeId) -> GrowingNodeIndex<TI> {
        let gn = &self.growing_nodes[id as usize];
        GrowingNodeIndex {
            rule: gn.rule,
            start: gn.start,
            next_input_position: gn.next_input_position,
            next_item_index: gn.next_item_index,
            priority: gn.priority,
        }
    }

    fn add_previous(&mut self, id: GrowingNodeId, info: PreviousInfo) {
        let previous = &mut self.growing_nodes[id as usize].previous;
        if !previous.contains(&info) {
            previous.push(info);
        }
    }

    /// Register a node as a live stack frame. A key collision merges the
    /// newcomer's Previous set into the already registered frame.
    fn register_frame(&mut self, id: GrowingNodeId) {
        let key = self.key_of(id);
        match self.growing.get(&key) {
            None => {
                self.growing.insert(key, id);
            }
            Some(&existing) if existing != id => {
                let infos = self.growing_nodes[id as usize].previous.clone();
                for info in infos {
                    self.add_previous(existing, info);
                }
            }
            _ => {}
        }
    }

    /// Find or create a growing node. An existing node with the same identity
    /// accumulates the additional Previous links instead of being duplicated;
    /// a new node is enqueued as a growth head and completed immediately when
    /// its completion condition already holds.
    fn find_or_create_growing(
        &mut self,
        proto: GrowingNode<TI>,
        previous: &[PreviousInfo],
    ) -> GrowingNodeId {
        let key = GrowingNodeIndex {
            rule: proto.rule,
            start: proto.start,
            next_input_position: proto.next_input_position,
            next_item_index: proto.next_item_index,
            priority: proto.priority,
        };
        if let Some(&existing) = self.growing.get(&key) {
            for &info in previous {
                self.add_previous(existing, info);
                self.register_frame(info.node);
            }
            return existing;
        }
        if let Some(&existing) = self.growable.get(&key) {
            for &info in previous {
                self.add_previous(existing, info);
                self.register_frame(info.node);
            }
            return existing;
        }
        let id = self.growing_nodes.len() as GrowingNodeId;
        self.growing_nodes.push(proto);
        for &info in previous {
            self.add_previous(id, info);
            self.register_frame(info.node);
        }
        self.growable.insert(key, id);
        self.growable_order.push(id);
        if self.has_complete_children(id) {
            self.complete(id);
        }
        id
    }

    /// Match a terminal at a position through the input's memo table.
    pub(crate) fn fetch_bud(&mut self, terminal: RuleID<TI>, position: u32) -> Option<Leaf<TI>> {
        let rule_set = self.rule_set;
        self.input.fetch_or_create_bud(rule_set, terminal, position)
    }

    /// Seed the graph with a growing node for the goal wrapper at position 0.
    pub(crate) fn create_start(&mut self) {
        let proto = GrowingNode {
            rule: self.goal,
            start: 0,
            next_input_position: 0,
            next_item_index: 0,
            priority: 0,
            children: Vec::new(),
            previous: Vec::new(),
        };
        self.find_or_create_growing(proto, &[]);
    }

    /// Return the canonical complete node wrapping a terminal match.
    pub(crate) fn find_or_create_leaf(&mut self, leaf: Leaf<TI>) -> CompleteNodeId {
        let key = CompleteNodeIndex {
            rule: leaf.rule,
            start: leaf.start,
            length: leaf.length,
        };
        if let Some(&existing) = self.complete_index.get(&key) {
            return existing;
        }
        let id = self.complete_nodes.len() as CompleteNodeId;
        self.complete_nodes.push(CompleteNode {
            rule: leaf.rule,
            start: leaf.start,
            length: leaf.length,
            priority: 0,
            is_leaf: true,
            alternatives: Vec::new(),
        });
        self.complete_index.insert(key, id);
        id
    }

    /// Whether the sole child is the rule's own synthesized empty terminal,
    /// in which case the completed node packs zero children.
    fn is_empty_alternative(&self, rule: RuleID<TI>, children: &[CompleteNodeId]) -> bool {
        if children.len() != 1 {
            return false;
        }
        let child_rule = self.complete_nodes[children[0] as usize].rule;
        if child_rule == self.goal {
            return false;
        }
        matches!(
            self.rule_set.rule(child_rule).kind,
            RuleKind::Terminal(TerminalKind::EmptyMatch(owner)) if owner == rule
        )
    }

    /// Promote a growing node whose completion condition holds into its
    /// canonical complete form, packing or disambiguating against an already
    /// registered node for the same `(rule, start, length)`.
    pub(crate) fn complete(&mut self, gn_id: GrowingNodeId) -> CompleteNodeId {
        let gn = &self.growing_nodes[gn_id as usize];
        let rule = gn.rule;
        if self.rhs_of(rule).is_none() {
            // terminal: the leaf itself is the complete node
            return gn.children[0];
        }
        let (start, length, priority) = (gn.start, gn.next_input_position - gn.start, gn.priority);
        let children = if self.is_empty_alternative(rule, &gn.children) {
            Vec::new()
        } else {
            gn.children.clone()
        };
        let key = CompleteNodeIndex {
            rule,
            start,
            length,
        };
        if let Some(&existing) = self.complete_index.get(&key) {
            let kind = self.rhs_of(rule).map(|rhs| rhs.kind);
            let node = &mut self.complete_nodes[existing as usize];
            if kind == Some(RhsKind::PriorityChoice) {
                if priority < node.priority {
                    // the earlier-declared alternative wins and replaces in place
                    node.priority = priority;
                    node.alternatives.clear();
                    node.alternatives.push(children);
                }
                // on a priority tie the first-registered alternative is kept
            } else if !node.alternatives.contains(&children) {
                node.alternatives.push(children);
            }
            return existing;
        }
        let id = self.complete_nodes.len() as CompleteNodeId;
        self.complete_nodes.push(CompleteNode {
            rule,
            start,
            length,
            priority,
            is_leaf: false,
            alternatives: vec![children],
        });
        self.complete_index.insert(key, id);
        if rule == self.goal && start == 0 && self.input.is_end(start + length) {
            self.goals.push(id);
        }
        id
    }

    /// Height growth: create (or reuse) a one-child node for a possible
    /// super-rule, continuing the child's stacked contexts.
    pub(crate) fn create_with_first_child(
        &mut self,
        parent_rule: RuleID<TI>,
        priority: u32,
        child: CompleteNodeId,
        previous: &[PreviousInfo],
    ) {
        let c = &self.complete_nodes[child as usize];
        let (start, end) = (c.start, c.start + c.length);
        let proto = GrowingNode {
            rule: parent_rule,
            start,
            next_input_position: end,
            next_item_index: 1,
            priority,
            children: vec![child],
            previous: Vec::new(),
        };
        self.find_or_create_growing(proto, previous);
    }

    /// Graft-back: append the next child to a stacked owner, advancing its cursor.
    pub(crate) fn grow_next_child(
        &mut self,
        parent: GrowingNodeId,
        child: CompleteNodeId,
        at_position: u32,
    ) {
        let p = &self.growing_nodes[parent as usize];
        let (rule, start, priority) = (p.rule, p.start, p.priority);
        let mut children = p.children.clone();
        let previous = p.previous.clone();
        let c = &self.complete_nodes[child as usize];
        let child_end = c.start + c.length;
        children.push(child);
        let proto = GrowingNode {
            rule,
            start,
            next_input_position: child_end,
            next_item_index: at_position + 1,
            priority,
            children,
            previous: Vec::new(),
        };
        self.find_or_create_growing(proto, &previous);
    }

    /// Append an interleaved skip occurrence without advancing the owner's cursor.
    pub(crate) fn grow_next_skip_child(&mut self, parent: GrowingNodeId, skip: CompleteNodeId) {
        let p = &self.growing_nodes[parent as usize];
        let (rule, start, priority, cursor) = (p.rule, p.start, p.priority, p.next_item_index);
        let mut children = p.children.clone();
        let previous = p.previous.clone();
        let c = &self.complete_nodes[skip as usize];
        let skip_end = c.start + c.length;
        children.push(skip);
        let proto = GrowingNode {
            rule,
            start,
            next_input_position: skip_end,
            next_item_index: cursor,
            priority,
            children,
            previous: Vec::new(),
        };
        self.find_or_create_growing(proto, &previous);
    }

    /// Width growth: the matched bud becomes a growing node stacked on `stack`.
    pub(crate) fn push_to_stack_of(&mut self, leaf: CompleteNodeId, stack: GrowingNodeId) {
        let c = &self.complete_nodes[leaf as usize];
        let (rule, start, end) = (c.rule, c.start, c.start + c.length);
        let at_position = self.growing_nodes[stack as usize].next_item_index;
        let proto = GrowingNode {
            rule,
            start,
            next_input_position: end,
            next_item_index: 0,
            priority: 0,
            children: vec![leaf],
            previous: Vec::new(),
        };
        let previous = [PreviousInfo {
            node: stack,
            at_position,
        }];
        self.find_or_create_growing(proto, &previous);
    }

    /// Drop the stale stack bookkeeping of a node that made no further width
    /// progress this round. Safe because nothing will re-enter it; a later
    /// derivation reaching the same identity creates a fresh node.
    pub(crate) fn pop(&mut self, gn_id: GrowingNodeId) {
        let previous = std::mem::take(&mut self.growing_nodes[gn_id as usize].previous);
        for info in previous.iter() {
            let key = self.key_of(info.node);
            if self.growing.get(&key) == Some(&info.node) {
                self.growing.remove(&key);
            }
        }
        let own_key = self.key_of(gn_id);
        if self.growing.get(&own_key) == Some(&gn_id) {
            self.growing.remove(&own_key);
        }
    }

    /// The per-kind completion condition: whether the node's children form a
    /// valid full derivation of its rule at the current cursor.
    pub(crate) fn has_complete_children(&self, gn_id: GrowingNodeId) -> bool {
        let gn = &self.growing_nodes[gn_id as usize];
        match self.rhs_of(gn.rule) {
            None => true,
            Some(rhs) => match rhs.kind {
                RhsKind::Empty => true,
                RhsKind::Choice | RhsKind::PriorityChoice => gn.next_item_index >= 1,
                RhsKind::Concatenation => {
                    gn.next_item_index as usize >= self.concat_len(gn.rule)
                }
                RhsKind::Multi => gn.next_item_index >= rhs.min,
                RhsKind::SeparatedList => {
                    gn.next_item_index % 2 == 1
                        && (gn.next_item_index + 1) / 2 >= rhs.min.max(1)
                }
            },
        }
    }

    /// Whether the node can still accept more input through normal width growth.
    pub(crate) fn can_grow_width(&self, gn_id: GrowingNodeId) -> bool {
        let gn = &self.growing_nodes[gn_id as usize];
        let rhs = match self.rhs_of(gn.rule) {
            None => return false,
            Some(rhs) => rhs,
        };
        if self.has_complete_children(gn_id) && gn.next_input_position == gn.start {
            // an empty match cannot be extended
            return false;
        }
        match rhs.kind {
            RhsKind::Empty | RhsKind::Choice | RhsKind::PriorityChoice => false,
            RhsKind::Concatenation => (gn.next_item_index as usize) < self.concat_len(gn.rule),
            RhsKind::Multi => rhs.max.map_or(true, |max| gn.next_item_index < max),
            RhsKind::SeparatedList => match rhs.max {
                None => true,
                Some(max) => {
                    if gn.next_item_index % 2 == 1 {
                        (gn.next_item_index + 1) / 2 < max
                    } else {
                        gn.next_item_index / 2 < max
                    }
                }
            },
        }
    }

    /// Whether the node has a next expected RHS item at its cursor.
    pub(crate) fn has_next_expected_item(&self, gn_id: GrowingNodeId) -> bool {
        let gn = &self.growing_nodes[gn_id as usize];
        match self.rhs_of(gn.rule) {
            None => false,
            Some(rhs) => match rhs.kind {
                RhsKind::Empty | RhsKind::Choice | RhsKind::PriorityChoice => false,
                RhsKind::Concatenation => {
                    (gn.next_item_index as usize) < self.concat_len(gn.rule)
                }
                RhsKind::Multi | RhsKind::SeparatedList => true,
            },
        }
    }

    /// The RHS items that could come next at the node's cursor.
    pub(crate) fn next_expected_items(&self, gn_id: GrowingNodeId) -> TinyVec<[RuleID<TI>; 2]> {
        let gn = &self.growing_nodes[gn_id as usize];
        let mut expected = TinyVec::default();
        let rhs = match self.rhs_of(gn.rule) {
            None => return expected,
            Some(rhs) => rhs,
        };
        let items = self.rhs_items_of(gn.rule);
        match rhs.kind {
            RhsKind::Empty | RhsKind::Choice | RhsKind::PriorityChoice => {}
            RhsKind::Concatenation => {
                if (gn.next_item_index as usize) < items.len() {
                    expected.push(items[gn.next_item_index as usize]);
                }
            }
            RhsKind::Multi => expected.push(items[0]),
            RhsKind::SeparatedList => {
                if gn.next_item_index % 2 == 1 {
                    expected.push(items[1]);
                } else {
                    expected.push(items[0]);
                }
            }
        }
        expected
    }

    /// Whether the owner expects exactly this rule at the recorded RHS slot.
    pub(crate) fn expects_item_at(
        &self,
        owner: GrowingNodeId,
        rule: RuleID<TI>,
        at_position: u32,
    ) -> bool {
        let gn = &self.growing_nodes[owner as usize];
        let rhs = match self.rhs_of(gn.rule) {
            None => return false,
            Some(rhs) => rhs,
        };
        let items = self.rhs_items_of(gn.rule);
        match rhs.kind {
            RhsKind::Empty | RhsKind::Choice | RhsKind::PriorityChoice => false,
            RhsKind::Concatenation => {
                (at_position as usize) < items.len() && items[at_position as usize] == rule
            }
            RhsKind::Multi => {
                items[0] == rule && rhs.max.map_or(true, |max| at_position < max)
            }
            RhsKind::SeparatedList => {
                if at_position % 2 == 1 {
                    items[1] == rule
                } else {
                    items[0] == rule && rhs.max.map_or(true, |max| at_position / 2 < max)
                }
            }
        }
    }

    /// The first goal-wrapper node spanning the whole input, if any.
    pub(crate) fn find_full_goal(&self) -> Option<CompleteNodeId> {
        self.goals.first().copied()
    }

    /// The longest complete node starting at offset 0, falling back to the
    /// globally longest complete node. The synthesized goal wrapper is
    /// excluded; a length tie goes to the later completion, which is the
    /// higher reduction (parents always complete after their children).
    /// `None` only when the graph built no complete node at all.
    pub(crate) fn longest_match_diagnostic(&self) -> Option<CompleteNodeId> {
        let mut from_start: Option<CompleteNodeId> = None;
        let mut global: Option<CompleteNodeId> = None;
        for (id, node) in self.complete_nodes.iter().enumerate() {
            if node.rule == self.goal {
                continue;
            }
            let id = id as CompleteNodeId;
            if node.start == 0
                && from_start.map_or(true, |best| {
                    node.length >= self.complete_nodes[best as usize].length
                })
            {
                from_start = Some(id);
            }
            if global.map_or(true, |best| {
                node.length >= self.complete_nodes[best as usize].length
            }) {
                global = Some(id);
            }
        }
        from_start.or(global)
    }

    fn forest_tag(&self, rule: RuleID<TI>) -> &str {
        if rule == self.goal {
            "<goal>"
        } else {
            self.rule_set.tag_str(rule).unwrap_or("<goal>")
        }
    }

    fn forest_is_skip(&self, rule: RuleID<TI>) -> bool {
        rule != self.goal && self.rule_set.is_skip(rule)
    }

    /// Extract the sub-forest rooted at one complete node.
    pub(crate) fn extract_forest(&self, root: CompleteNodeId) -> ParseForest {
        self.build_forest(None, &[root])
    }

    /// Extract the success forest: the user-goal node re-rooted with the goal
    /// wrapper's leading and trailing skip children folded into each of its
    /// child-list alternatives, so skip text is visible in the forest and the
    /// root span covers the input exactly.
    pub(crate) fn extract_rerooted_forest(&self, goal_cn: CompleteNodeId) -> ParseForest {
        let goal_node = &self.complete_nodes[goal_cn as usize];
        if goal_node.alternatives.len() == 1 && goal_node.alternatives[0].len() == 1 {
            // no interleaved skip children; the user-goal node is the root as is
            return self.extract_forest(goal_node.alternatives[0][0]);
        }
        let mut alternatives: Vec<Vec<CompleteNodeId>> = Vec::new();
        for alt in goal_node.alternatives.iter() {
            let ug_pos = alt
                .iter()
                .position(|&c| self.complete_nodes[c as usize].rule == self.user_goal)
                .expect("a complete goal node always contains the user goal child");
            let leading = &alt[..ug_pos];
            let trailing = &alt[ug_pos + 1..];
            let ug_cn = alt[ug_pos];
            let ug_node = &self.complete_nodes[ug_cn as usize];
            if ug_node.is_leaf {
                let mut children = leading.to_vec();
                children.push(ug_cn);
                children.extend_from_slice(trailing);
                if !alternatives.contains(&children) {
                    alternatives.push(children);
                }
            } else {
                for ug_alt in ug_node.alternatives.iter() {
                    let mut children = leading.to_vec();
                    children.extend_from_slice(ug_alt);
                    children.extend_from_slice(trailing);
                    if !alternatives.contains(&children) {
                        alternatives.push(children);
                    }
                }
            }
        }
        let root = SyntheticRoot {
            rule: self.user_goal,
            start: goal_node.start,
            length: goal_node.length,
            alternatives,
        };
        let reachable: Vec<CompleteNodeId> = root.alternatives.iter().flatten().copied().collect();
        self.build_forest(Some(root), &reachable)
    }

    fn build_forest(
        &self,
        synthetic_root: Option<SyntheticRoot<TI>>,
        roots: &[CompleteNodeId],
    ) -> ParseForest {
        let offset = u32::from(synthetic_root.is_some());
        let mut rule_table: Vec<ForestRule> = Vec::new();
        let mut rule_map: AHashMap<usize, u32> = AHashMap::default();
        let mut intern_rule = |rule: RuleID<TI>,
                               rule_table: &mut Vec<ForestRule>,
                               rule_map: &mut AHashMap<usize, u32>|
         -> u32 {
            let key = rule.0.as_();
            if let Some(&index) = rule_map.get(&key) {
                return index;
            }
            let index = rule_table.len() as u32;
            rule_table.push(ForestRule::new(
                self.forest_tag(rule),
                self.forest_is_skip(rule),
            ));
            rule_map.insert(key, index);
            index
        };
        // discovery order, depth-first
        let mut order: Vec<CompleteNodeId> = Vec::new();
        let mut node_map: AHashMap<CompleteNodeId, u32> = AHashMap::default();
        let mut stack: Vec<CompleteNodeId> = roots.iter().rev().copied().collect();
        while let Some(cn) = stack.pop() {
            if node_map.contains_key(&cn) {
                continue;
            }
            node_map.insert(cn, offset + order.len() as u32);
            order.push(cn);
            let node = &self.complete_nodes[cn as usize];
            for alt in node.alternatives.iter().rev() {
                for &child in alt.iter().rev() {
                    stack.push(child);
                }
            }
        }
        let mut nodes: Vec<ForestNode> = Vec::with_capacity(order.len() + offset as usize);
        if let Some(root) = &synthetic_root {
            let rule = intern_rule(root.rule, &mut rule_table, &mut rule_map);
            nodes.push(ForestNode::new(
                rule,
                root.start,
                root.length,
                false,
                root.alternatives
                    .iter()
                    .map(|alt| alt.iter().map(|c| node_map[c]).collect())
                    .collect(),
            ));
        }
        for &cn in order.iter() {
            let node = &self.complete_nodes[cn as usize];
            let rule = intern_rule(node.rule, &mut rule_table, &mut rule_map);
            nodes.push(ForestNode::new(
                rule,
                node.start,
                node.length,
                node.is_leaf,
                node.alternatives
                    .iter()
                    .map(|alt| alt.iter().map(|c| node_map[c]).collect())
                    .collect(),
            ));
        }
        ParseForest::from_parts(self.input.text(), rule_table, nodes, 0)
    }
}

struct SyntheticRoot<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    rule: RuleID<TI>,
    start: u32,
    length: u32,
    alternatives: Vec<Vec<CompleteNodeId>>,
}
