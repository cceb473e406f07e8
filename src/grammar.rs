//! The grammar module that contains the compiled rule set and its related functions and structs.
use std::fmt::Debug;
use std::hash::Hash;

use ahash::AHashMap;
use fixedbitset_stack::FixedBitSet;
use jaggedarray::jagged_array::JaggedArray;
use jaggedarray::jagged_array::JaggedArrayViewTrait;
use num::traits::{NumAssign, NumOps};
use num::{
    cast::AsPrimitive,
    traits::{ConstOne, ConstZero},
    Num,
};
use regex_automata::dfa::Automaton;
use string_interner::backend::StringBackend;
use string_interner::symbol::SymbolU32;
use string_interner::StringInterner;

use crate::utils::{self, dispatch_by_dfa_state_status, ByteSet};

pub(crate) type TagInterner = StringInterner<StringBackend<SymbolU32>>;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[repr(transparent)]
/// The wrapper struct that represents a rule id in the rule set.
/// Terminals and non-terminals share one numbering.
pub struct RuleID<TI>(pub TI)
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero;

impl<TI> Default for RuleID<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    fn default() -> Self {
        RuleID(TI::ZERO)
    }
}

impl<TI> RuleID<TI>
where
    TI: Num
        + AsPrimitive<usize>
        + ConstOne
        + ConstZero
        + NumAssign
        + std::cmp::PartialOrd
        + std::convert::TryFrom<usize>
        + num::Bounded
        + Hash
        + Eq,
    usize: num::traits::AsPrimitive<TI>,
{
    /// Get the display form of the rule id.
    pub fn to_display_form(&self, rule_set: &RuleSet<TI>) -> String {
        format!(
            "{}[{}]",
            rule_set.tag_str(*self).unwrap_or("<goal>"),
            self.0.as_()
        )
    }
}

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[repr(transparent)]
/// The wrapper struct that represents a literal terminal id in the rule set.
pub struct LiteralID<TI>(pub TI)
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[repr(transparent)]
/// The wrapper struct that represents a pattern terminal id in the rule set.
pub struct RegexID<TI>(pub TI)
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero;

/// The structural kind of a non-terminal rule's right hand side.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, strum::Display)]
pub enum RhsKind {
    /// The rule derives only the empty string.
    Empty,
    /// An unordered choice between alternatives. Ambiguity is preserved.
    Choice,
    /// An ordered choice; on span ties the earlier alternative wins.
    PriorityChoice,
    /// A sequence of items.
    Concatenation,
    /// A repetition of one item with min/max bounds.
    Multi,
    /// A repetition of one item separated by a separator rule.
    SeparatedList,
}

/// The right hand side descriptor of a non-terminal rule.
///
/// The item list itself is stored in the rule set's jagged item table.
/// Row layout per kind: `Empty` -> `[empty_terminal]`;
/// `Choice`/`PriorityChoice` -> alternatives in declaration order;
/// `Concatenation` -> items; `Multi` -> `[item]` or `[item, empty_terminal]`;
/// `SeparatedList` -> `[item, separator]` or `[item, separator, empty_terminal]`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RuleRhs {
    /// The structural kind tag.
    pub kind: RhsKind,
    /// The minimum repetition count for `Multi`/`SeparatedList`.
    pub min: u32,
    /// The maximum repetition count for `Multi`/`SeparatedList`; `None` is unbounded.
    pub max: Option<u32>,
}

/// How a terminal rule matches text.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum TerminalKind<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    /// A byte-exact literal.
    Literal(LiteralID<TI>),
    /// An anchored pattern compiled to a dense DFA.
    Pattern(RegexID<TI>),
    /// A terminal matching the empty span, synthesized for a nullable owner rule.
    EmptyMatch(RuleID<TI>),
}

/// The kind of a compiled rule.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RuleKind<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    /// A terminal, matched directly against the text.
    Terminal(TerminalKind<TI>),
    /// A non-terminal with a structured right hand side.
    NonTerminal(RuleRhs),
}

/// A grammar rule in compiled form. Immutable once the rule set is built.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeRule<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    pub(crate) tag: SymbolU32,
    /// The kind of the rule.
    pub kind: RuleKind<TI>,
    /// Whether the rule may be interleaved anywhere as skip content.
    pub is_skip: bool,
}

#[derive(Debug, thiserror::Error)]
/// The error type for errors in rule set creation.
pub enum CreateRuleSetError {
    #[error("rule `{0}` is defined more than once")]
    /// A tag is used by two rule definitions.
    DuplicateRule(String),
    #[error("rule `{0}` is referenced but not defined")]
    /// A right hand side references a tag with no definition.
    RuleNotFound(String),
    #[error("The number of {0}, which is {1}, exceeds the maximum value {2}.")]
    /// Error due to the number of a certain type exceeding the maximum value specified in the generic parameter.
    IntConversionError(String, usize, usize),
    #[error("rule `{0}` has an invalid shape: {1}")]
    /// A right hand side violates the shape constraints of its kind.
    InvalidRule(String, String),
    #[error("Pattern initialization error: {0}")]
    /// Error when compiling a terminal pattern into a DFA.
    DfaBuildError(#[from] regex_automata::dfa::dense::BuildError),
    #[error("Pattern initialization error: {0}")]
    /// Error when computing the start state for a DFA.
    DfaStartError(#[from] regex_automata::dfa::StartError),
    #[error("pattern of rule `{0}` can match the empty string; model nullability with repetition bounds instead")]
    /// A terminal pattern accepts the empty string, which the engine reserves for synthesized empty terminals.
    NullablePattern(String),
}

/// The body of one rule in a [`RuleSetSource`], still in tag-reference form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceBody {
    Literal(String),
    Pattern(String),
    Rule {
        kind: RhsKind,
        min: u32,
        max: Option<u32>,
        items: Vec<String>,
    },
}

/// One rule of a [`RuleSetSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceRule {
    pub(crate) tag: String,
    pub(crate) is_skip: bool,
    pub(crate) body: SourceBody,
}

/// The compiled-boundary input form of a grammar: a flat list of rules whose
/// right hand sides reference each other by tag. Produced by [`RuleSetBuilder`]
/// (or an external grammar compiler) and consumed by [`Engine`](crate::engine::Engine).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSetSource {
    pub(crate) rules: Vec<SourceRule>,
}

impl RuleSetSource {
    /// The number of rules the compiled rule set will contain, including the
    /// empty terminals synthesized for nullable rules. Used for id-width selection.
    pub fn compiled_rule_count(&self) -> usize {
        let synthesized = self
            .rules
            .iter()
            .filter(|r| match &r.body {
                SourceBody::Rule { kind, min, .. } => match kind {
                    RhsKind::Empty => true,
                    RhsKind::Multi | RhsKind::SeparatedList => *min == 0,
                    _ => false,
                },
                _ => false,
            })
            .count();
        self.rules.len() + synthesized
    }

    /// Whether the source contains no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// A programmatic builder for [`RuleSetSource`].
///
/// Tags are plain strings; right hand sides reference other rules by tag.
/// Definition order fixes rule numbering and, for choices, alternative priority.
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    source: RuleSetSource,
}

impl RuleSetBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, tag: &str, is_skip: bool, body: SourceBody) -> &mut Self {
        self.source.rules.push(SourceRule {
            tag: tag.to_string(),
            is_skip,
            body,
        });
        self
    }

    /// Define a literal terminal.
    pub fn literal(&mut self, tag: &str, value: &str) -> &mut Self {
        self.push(tag, false, SourceBody::Literal(value.to_string()))
    }

    /// Define a literal terminal that may be interleaved anywhere as skip content.
    pub fn skip_literal(&mut self, tag: &str, value: &str) -> &mut Self {
        self.push(tag, true, SourceBody::Literal(value.to_string()))
    }

    /// Define a pattern terminal. The pattern is matched anchored at the
    /// requested offset; the longest match wins.
    pub fn pattern(&mut self, tag: &str, pattern: &str) -> &mut Self {
        self.push(tag, false, SourceBody::Pattern(pattern.to_string()))
    }

    /// Define a pattern terminal that may be interleaved anywhere as skip content.
    pub fn skip_pattern(&mut self, tag: &str, pattern: &str) -> &mut Self {
        self.push(tag, true, SourceBody::Pattern(pattern.to_string()))
    }

    /// Define a rule deriving only the empty string.
    pub fn empty(&mut self, tag: &str) -> &mut Self {
        self.push(
            tag,
            false,
            SourceBody::Rule {
                kind: RhsKind::Empty,
                min: 0,
                max: Some(0),
                items: vec![],
            },
        )
    }

    /// Define a concatenation of items.
    pub fn concatenation(&mut self, tag: &str, items: &[&str]) -> &mut Self {
        self.push(
            tag,
            false,
            SourceBody::Rule {
                kind: RhsKind::Concatenation,
                min: 0,
                max: None,
                items: items.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    /// Define a skip rule as a concatenation of items.
    pub fn skip(&mut self, tag: &str, items: &[&str]) -> &mut Self {
        self.push(
            tag,
            true,
            SourceBody::Rule {
                kind: RhsKind::Concatenation,
                min: 0,
                max: None,
                items: items.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    /// Define an unordered choice. Ambiguity between alternatives is preserved
    /// in the forest.
    pub fn choice(&mut self, tag: &str, items: &[&str]) -> &mut Self {
        self.push(
            tag,
            false,
            SourceBody::Rule {
                kind: RhsKind::Choice,
                min: 0,
                max: None,
                items: items.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    /// Define an ordered choice. On span ties the earlier alternative wins.
    pub fn priority_choice(&mut self, tag: &str, items: &[&str]) -> &mut Self {
        self.push(
            tag,
            false,
            SourceBody::Rule {
                kind: RhsKind::PriorityChoice,
                min: 0,
                max: None,
                items: items.iter().map(|s| s.to_string()).collect(),
            },
        )
    }

    /// Define a repetition of `item`, between `min` and `max` times
    /// (`max == None` meaning unbounded).
    pub fn multi(&mut self, tag: &str, min: u32, max: Option<u32>, item: &str) -> &mut Self {
        self.push(
            tag,
            false,
            SourceBody::Rule {
                kind: RhsKind::Multi,
                min,
                max,
                items: vec![item.to_string()],
            },
        )
    }

    /// Define a repetition of `item` separated by `separator`, with `min`/`max`
    /// bounds on the number of items.
    pub fn separated_list(
        &mut self,
        tag: &str,
        min: u32,
        max: Option<u32>,
        item: &str,
        separator: &str,
    ) -> &mut Self {
        self.push(
            tag,
            false,
            SourceBody::Rule {
                kind: RhsKind::SeparatedList,
                min,
                max,
                items: vec![item.to_string(), separator.to_string()],
            },
        )
    }

    /// Finish building and return the source.
    pub fn source(&self) -> RuleSetSource {
        self.source.clone()
    }
}

/// The compiled, immutable grammar: an indexed collection of rules with
/// precomputed derived relations. Pure lookup surface; no mutation after
/// construction.
#[derive(Clone)]
pub struct RuleSet<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    rules: Vec<RuntimeRule<TI>>,
    rhs_items: JaggedArray<RuleID<TI>, Vec<usize>, 2>,
    tags: TagInterner,
    tag_to_rule: AHashMap<SymbolU32, RuleID<TI>>,
    id_to_literals: JaggedArray<u8, Vec<usize>, 2>,
    id_to_regexes: Vec<regex_automata::dfa::dense::DFA<Vec<u32>>>,
    first_terminals: Vec<FixedBitSet>,
    first_sub_rules: Vec<FixedBitSet>,
    super_rules: Vec<FixedBitSet>,
    skip_rules: FixedBitSet,
    skip_first_terminals: FixedBitSet,
    skip_sub_rules: FixedBitSet,
    terminal_first_bytes: Vec<ByteSet>,
    regex_start_config: regex_automata::util::start::Config,
}

impl<TI> RuleSet<TI>
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
    /// Create a new rule set from a source and a pattern automaton configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`CreateRuleSetError`] when a tag is duplicated or unresolved,
    /// a rule shape is invalid, an id does not fit the generic parameter, or a
    /// pattern fails to compile.
    pub fn new(
        source: &RuleSetSource,
        regex_config: &regex_automata::dfa::dense::Config,
    ) -> Result<Self, CreateRuleSetError> {
        let mut tags = TagInterner::new();
        let mut tag_to_index: AHashMap<SymbolU32, usize> = AHashMap::default();
        // Pass 1: assign ids in definition order, then synthesized empty terminals.
        let mut all_rules: Vec<SourceRule> = source.rules.clone();
        for rule in source.rules.iter() {
            if let SourceBody::Rule { kind, min, .. } = &rule.body {
                let nullable = matches!(kind, RhsKind::Empty)
                    || (matches!(kind, RhsKind::Multi | RhsKind::SeparatedList) && *min == 0);
                if nullable {
                    all_rules.push(SourceRule {
                        tag: format!("\u{a7}empty.{}", rule.tag),
                        is_skip: false,
                        body: SourceBody::Literal(String::new()),
                    });
                }
            }
        }
        for (index, rule) in all_rules.iter().enumerate() {
            let sym = tags.get_or_intern(&rule.tag);
            if tag_to_index.insert(sym, index).is_some() {
                return Err(CreateRuleSetError::DuplicateRule(rule.tag.clone()));
            }
        }
        let max_id = TI::max_value().as_();
        if all_rules.len() > max_id {
            return Err(CreateRuleSetError::IntConversionError(
                "rule".to_string(),
                all_rules.len(),
                max_id,
            ));
        }
        let to_rule_id = |index: usize| -> Result<RuleID<TI>, CreateRuleSetError> {
            Ok(RuleID(index.try_into().map_err(|_| {
                CreateRuleSetError::IntConversionError("rule".to_string(), index, max_id)
            })?))
        };
        let resolve = |tags: &TagInterner,
                       tag_to_index: &AHashMap<SymbolU32, usize>,
                       tag: &str|
         -> Result<usize, CreateRuleSetError> {
            tags.get(tag)
                .and_then(|sym| tag_to_index.get(&sym).copied())
                .ok_or_else(|| CreateRuleSetError::RuleNotFound(tag.to_string()))
        };
        // Pass 2: lower bodies, building literal rows and pattern automata.
        let regex_start_config =
            regex_automata::util::start::Config::new().anchored(regex_automata::Anchored::Yes);
        let mut rules: Vec<RuntimeRule<TI>> = Vec::with_capacity(all_rules.len());
        let mut rhs_items = JaggedArray::<RuleID<TI>, Vec<usize>, 2>::new();
        let mut id_to_literals = JaggedArray::<u8, Vec<usize>, 2>::new();
        let mut id_to_regexes = Vec::new();
        for (index, rule) in all_rules.iter().enumerate() {
            let tag_sym = tags.get(&rule.tag).unwrap();
            rhs_items.new_row::<0>();
            let kind = match &rule.body {
                SourceBody::Literal(value) => {
                    let is_empty_terminal = index >= source.rules.len();
                    if is_empty_terminal {
                        // Synthesized `§empty.<tag>` terminal; the owner is the rule it was created for.
                        let owner_tag = rule.tag.strip_prefix("\u{a7}empty.").unwrap();
                        let owner = resolve(&tags, &tag_to_index, owner_tag)?;
                        RuleKind::Terminal(TerminalKind::EmptyMatch(to_rule_id(owner)?))
                    } else {
                        if value.is_empty() {
                            return Err(CreateRuleSetError::InvalidRule(
                                rule.tag.clone(),
                                "literal terminals must not be empty".to_string(),
                            ));
                        }
                        id_to_literals.new_row::<0>();
                        id_to_literals.extend_last_row_from_slice(value.as_bytes());
                        let literal_id = LiteralID((id_to_literals.len() - 1).try_into().map_err(
                            |_| {
                                CreateRuleSetError::IntConversionError(
                                    "literal".to_string(),
                                    id_to_literals.len() - 1,
                                    max_id,
                                )
                            },
                        )?);
                        RuleKind::Terminal(TerminalKind::Literal(literal_id))
                    }
                }
                SourceBody::Pattern(pattern) => {
                    let dfa = regex_automata::dfa::dense::Builder::new()
                        .configure(regex_config.clone())
                        .build(pattern)?;
                    let start = dfa.start_state(&regex_start_config)?;
                    if utils::check_dfa_state_status(start, &dfa) == utils::FsaStateStatus::Accept {
                        return Err(CreateRuleSetError::NullablePattern(rule.tag.clone()));
                    }
                    id_to_regexes.push(dfa);
                    let regex_id =
                        RegexID((id_to_regexes.len() - 1).try_into().map_err(|_| {
                            CreateRuleSetError::IntConversionError(
                                "pattern".to_string(),
                                id_to_regexes.len() - 1,
                                max_id,
                            )
                        })?);
                    RuleKind::Terminal(TerminalKind::Pattern(regex_id))
                }
                SourceBody::Rule {
                    kind,
                    min,
                    max,
                    items,
                } => {
                    Self::validate_shape(rule, *kind, *min, *max, items)?;
                    for item in items.iter() {
                        let item_index = resolve(&tags, &tag_to_index, item)?;
                        rhs_items.push_to_last_row(to_rule_id(item_index)?);
                    }
                    let nullable = matches!(kind, RhsKind::Empty)
                        || (matches!(kind, RhsKind::Multi | RhsKind::SeparatedList) && *min == 0);
                    if nullable {
                        let empty_index = resolve(
                            &tags,
                            &tag_to_index,
                            &format!("\u{a7}empty.{}", rule.tag),
                        )?;
                        rhs_items.push_to_last_row(to_rule_id(empty_index)?);
                    }
                    RuleKind::NonTerminal(RuleRhs {
                        kind: *kind,
                        min: *min,
                        max: *max,
                    })
                }
            };
            rules.push(RuntimeRule {
                tag: tag_sym,
                kind,
                is_skip: rule.is_skip,
            });
        }
        let tag_to_rule = tag_to_index
            .iter()
            .map(|(&sym, &index)| Ok((sym, to_rule_id(index)?)))
            .collect::<Result<AHashMap<_, _>, CreateRuleSetError>>()?;
        let mut this = Self {
            rules,
            rhs_items,
            tags,
            tag_to_rule,
            id_to_literals,
            id_to_regexes,
            first_terminals: vec![],
            first_sub_rules: vec![],
            super_rules: vec![],
            skip_rules: FixedBitSet::new(),
            skip_first_terminals: FixedBitSet::new(),
            skip_sub_rules: FixedBitSet::new(),
            terminal_first_bytes: vec![],
            regex_start_config,
        };
        this.construct_derived_relations();
        this.construct_terminal_first_bytes();
        Ok(this)
    }

    fn validate_shape(
        rule: &SourceRule,
        kind: RhsKind,
        min: u32,
        max: Option<u32>,
        items: &[String],
    ) -> Result<(), CreateRuleSetError> {
        let invalid = |message: &str| {
            Err(CreateRuleSetError::InvalidRule(
                rule.tag.clone(),
                message.to_string(),
            ))
        };
        match kind {
            RhsKind::Empty => {
                if !items.is_empty() {
                    return invalid("an empty rule has no items");
                }
            }
            RhsKind::Choice | RhsKind::PriorityChoice => {
                if items.is_empty() {
                    return invalid("a choice needs at least one alternative");
                }
            }
            RhsKind::Concatenation => {
                if items.is_empty() {
                    return invalid("a concatenation needs at least one item");
                }
            }
            RhsKind::Multi => {
                if items.len() != 1 {
                    return invalid("a repetition has exactly one item");
                }
                if let Some(max) = max {
                    if max < min || max == 0 {
                        return invalid("max repetitions must be >= min and >= 1");
                    }
                }
            }
            RhsKind::SeparatedList => {
                if items.len() != 2 {
                    return invalid("a separated list has exactly one item and one separator");
                }
                if let Some(max) = max {
                    if max < min || max == 0 {
                        return invalid("max repetitions must be >= min and >= 1");
                    }
                }
            }
        }
        Ok(())
    }

    /// The item ids a derivation of the rule can begin with, before closure.
    fn direct_first_items(&self, rule: usize) -> Vec<usize> {
        match self.rules[rule].kind {
            RuleKind::Terminal(_) => vec![],
            RuleKind::NonTerminal(rhs) => {
                let row = self.rhs_items.view([rule]).as_slice();
                let items: Vec<RuleID<TI>> = match rhs.kind {
                    RhsKind::Concatenation => vec![row[0]],
                    // choices list all alternatives; a repetition row is
                    // `[item]` or `[item, empty]`
                    RhsKind::Empty | RhsKind::Choice | RhsKind::PriorityChoice | RhsKind::Multi => {
                        row.to_vec()
                    }
                    // the separator is never a first item; the empty terminal
                    // of a min-0 list is
                    RhsKind::SeparatedList => {
                        let mut items = vec![row[0]];
                        if row.len() == 3 {
                            items.push(row[2]);
                        }
                        items
                    }
                };
                items.iter().map(|id| id.0.as_()).collect()
            }
        }
    }

    fn construct_derived_relations(&mut self) {
        let n = self.rules.len();
        let mut direct_first: Vec<Vec<usize>> = Vec::with_capacity(n);
        for rule in 0..n {
            direct_first.push(self.direct_first_items(rule));
        }
        let mut super_rules = vec![FixedBitSet::with_capacity(n); n];
        for (rule, items) in direct_first.iter().enumerate() {
            for &item in items.iter() {
                super_rules[item].insert(rule);
            }
        }
        let mut first_terminals = vec![FixedBitSet::with_capacity(n); n];
        let mut first_sub_rules = vec![FixedBitSet::with_capacity(n); n];
        for rule in 0..n {
            match self.rules[rule].kind {
                RuleKind::Terminal(_) => {
                    first_terminals[rule].insert(rule);
                }
                RuleKind::NonTerminal(_) => {
                    let mut stack: Vec<usize> = direct_first[rule].clone();
                    while let Some(item) = stack.pop() {
                        match self.rules[item].kind {
                            RuleKind::Terminal(_) => {
                                first_terminals[rule].insert(item);
                            }
                            RuleKind::NonTerminal(_) => {
                                if !first_sub_rules[rule].contains(item) {
                                    first_sub_rules[rule].insert(item);
                                    stack.extend_from_slice(&direct_first[item]);
                                }
                            }
                        }
                    }
                }
            }
        }
        let mut skip_rules = FixedBitSet::with_capacity(n);
        let mut skip_first_terminals = FixedBitSet::with_capacity(n);
        let mut skip_sub_rules = FixedBitSet::with_capacity(n);
        for rule in 0..n {
            if self.rules[rule].is_skip {
                skip_rules.insert(rule);
                skip_first_terminals.union_with(&first_terminals[rule]);
                skip_sub_rules.insert(rule);
                skip_sub_rules.union_with(&first_sub_rules[rule]);
            }
        }
        self.first_terminals = first_terminals;
        self.first_sub_rules = first_sub_rules;
        self.super_rules = super_rules;
        self.skip_rules = skip_rules;
        self.skip_first_terminals = skip_first_terminals;
        self.skip_sub_rules = skip_sub_rules;
    }

    fn construct_terminal_first_bytes(&mut self) {
        let mut sets = Vec::with_capacity(self.rules.len());
        for rule in self.rules.iter() {
            let mut set = ByteSet::with_capacity(256);
            match rule.kind {
                RuleKind::Terminal(TerminalKind::Literal(literal_id)) => {
                    set.insert(self.id_to_literals.view([literal_id.0.as_()]).as_slice()[0] as usize);
                }
                RuleKind::Terminal(TerminalKind::Pattern(regex_id)) => {
                    let dfa = &self.id_to_regexes[regex_id.0.as_()];
                    // start_state errors were surfaced in Self::new
                    let start = dfa.start_state(&self.regex_start_config).unwrap();
                    for byte in 0..=u8::MAX {
                        let next = dfa.next_state(start, byte);
                        let viable;
                        dispatch_by_dfa_state_status!(next, dfa,
                            accept => { viable = true },
                            reject => { viable = false },
                            in_progress => { viable = true }
                        );
                        if viable {
                            set.insert(byte as usize);
                        }
                    }
                }
                RuleKind::Terminal(TerminalKind::EmptyMatch(_)) => {
                    // matches at any position regardless of the next byte
                    for byte in 0..=u8::MAX {
                        set.insert(byte as usize);
                    }
                }
                RuleKind::NonTerminal(_) => {}
            }
            sets.push(set);
        }
        self.terminal_first_bytes = sets;
    }

    #[inline]
    /// The number of rules, synthesized empty terminals included.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    #[inline]
    /// Get a rule by id.
    ///
    /// # Panics
    ///
    /// Panics if the id is out of bounds.
    pub fn rule(&self, id: RuleID<TI>) -> &RuntimeRule<TI> {
        &self.rules[id.0.as_()]
    }

    #[inline]
    /// Get the tag string of a rule.
    pub fn tag_str(&self, id: RuleID<TI>) -> Option<&str> {
        self.rules
            .get(id.0.as_())
            .and_then(|rule| self.tags.resolve(rule.tag))
    }

    #[inline]
    /// Look a rule up by its tag.
    pub fn rule_id_from_tag(&self, tag: &str) -> Option<RuleID<TI>> {
        self.tags
            .get(tag)
            .and_then(|sym| self.tag_to_rule.get(&sym).copied())
    }

    #[inline]
    /// Whether the rule is a terminal.
    pub fn is_terminal(&self, id: RuleID<TI>) -> bool {
        matches!(self.rules[id.0.as_()].kind, RuleKind::Terminal(_))
    }

    #[inline]
    /// Whether the rule may be interleaved anywhere as skip content.
    pub fn is_skip(&self, id: RuleID<TI>) -> bool {
        self.rules[id.0.as_()].is_skip
    }

    #[inline]
    /// The right hand side descriptor of a non-terminal rule.
    pub fn rhs(&self, id: RuleID<TI>) -> Option<RuleRhs> {
        match self.rules[id.0.as_()].kind {
            RuleKind::NonTerminal(rhs) => Some(rhs),
            RuleKind::Terminal(_) => None,
        }
    }

    #[inline]
    /// The raw RHS item row of a rule. See [`RuleRhs`] for the per-kind layout.
    pub fn rhs_items(&self, id: RuleID<TI>) -> &[RuleID<TI>] {
        self.rhs_items.view([id.0.as_()]).as_slice()
    }

    #[inline]
    /// The separator rule of a separated list.
    ///
    /// # Panics
    ///
    /// Panics if the rule is not a separated list.
    pub fn separator(&self, id: RuleID<TI>) -> RuleID<TI> {
        debug_assert!(matches!(
            self.rhs(id),
            Some(RuleRhs {
                kind: RhsKind::SeparatedList,
                ..
            })
        ));
        self.rhs_items(id)[1]
    }

    #[inline]
    /// The bytes of a literal terminal.
    pub fn literal(&self, id: LiteralID<TI>) -> &[u8] {
        self.id_to_literals.view([id.0.as_()]).as_slice()
    }

    #[inline]
    /// The compiled automaton of a pattern terminal.
    pub fn regex(&self, id: RegexID<TI>) -> &regex_automata::dfa::dense::DFA<Vec<u32>> {
        &self.id_to_regexes[id.0.as_()]
    }

    #[inline]
    /// The anchored start configuration shared by all pattern automata.
    pub(crate) fn regex_start_config(&self) -> &regex_automata::util::start::Config {
        &self.regex_start_config
    }

    #[inline]
    /// The set of terminals that can begin a derivation of the rule.
    /// A terminal's set is the singleton of itself.
    pub fn first_terminals(&self, id: RuleID<TI>) -> &FixedBitSet {
        &self.first_terminals[id.0.as_()]
    }

    #[inline]
    /// The set of non-terminals reachable as a first child of the rule, transitively.
    pub fn first_sub_rules(&self, id: RuleID<TI>) -> &FixedBitSet {
        &self.first_sub_rules[id.0.as_()]
    }

    #[inline]
    /// The set of rules that could have this rule as their first child.
    pub fn super_rules(&self, id: RuleID<TI>) -> &FixedBitSet {
        &self.super_rules[id.0.as_()]
    }

    #[inline]
    /// Whether `parent` could have `child` as its first child.
    pub fn could_have_first_child(&self, parent: RuleID<TI>, child: RuleID<TI>) -> bool {
        self.super_rules[child.0.as_()].contains(parent.0.as_())
    }

    #[inline]
    /// The set of skip rules.
    pub fn skip_rules(&self) -> &FixedBitSet {
        &self.skip_rules
    }

    #[inline]
    /// The union of the first-terminal sets of all skip rules.
    pub fn skip_first_terminals(&self) -> &FixedBitSet {
        &self.skip_first_terminals
    }

    #[inline]
    /// Whether the rule is a skip rule or reachable as a first child inside one,
    /// i.e. a derivation of it can be part of interleaved skip content.
    pub fn is_skip_reachable(&self, id: RuleID<TI>) -> bool {
        self.skip_sub_rules.contains(id.0.as_())
    }

    #[inline]
    /// The admissible first input bytes of a terminal.
    pub(crate) fn terminal_first_bytes(&self, id: RuleID<TI>) -> &ByteSet {
        &self.terminal_first_bytes[id.0.as_()]
    }

    /// Render one rule as a `tag ::= ...` line for debugging.
    fn rule_display_line(&self, rule: usize) -> String {
        let id = RuleID::<TI>(rule.as_());
        let mut line = format!("{} ::= ", id.to_display_form(self));
        match self.rules[rule].kind {
            RuleKind::Terminal(TerminalKind::Literal(literal_id)) => {
                line.push_str(&format!(
                    "'{}'",
                    String::from_utf8_lossy(self.literal(literal_id))
                ));
            }
            RuleKind::Terminal(TerminalKind::Pattern(_)) => {
                line.push_str("#pattern");
            }
            RuleKind::Terminal(TerminalKind::EmptyMatch(owner)) => {
                line.push_str(&format!("<empty of {}>", owner.to_display_form(self)));
            }
            RuleKind::NonTerminal(rhs) => {
                let items = self
                    .rhs_items(id)
                    .iter()
                    .map(|item| item.to_display_form(self))
                    .collect::<Vec<_>>();
                line.push_str(&format!(
                    "{}({}, min={}, max={:?})",
                    rhs.kind,
                    items.join(" "),
                    rhs.min,
                    rhs.max
                ));
            }
        }
        if self.rules[rule].is_skip {
            line.push_str(" [skip]");
        }
        line
    }
}

impl<TI> Debug for RuleSet<TI>
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
        f.debug_struct("RuleSet")
            .field("rules", {
                let mut lines = String::new();
                for rule in 0..self.rules.len() {
                    lines.push_str(&self.rule_display_line(rule));
                    lines.push_str(";\n");
                }
                &lines.into_boxed_str()
            })
            .field(
                "first_terminals",
                &utils::fill_debug_form_of_id_to_x(
                    self.first_terminals
                        .iter()
                        .map(utils::get_display_form_from_bitset),
                    |x| RuleID::<TI>(x.as_()).to_display_form(self),
                ),
            )
            .field(
                "super_rules",
                &utils::fill_debug_form_of_id_to_x(
                    self.super_rules
                        .iter()
                        .map(utils::get_display_form_from_bitset),
                    |x| RuleID::<TI>(x.as_()).to_display_form(self),
                ),
            )
            .field(
                "skip_rules",
                &utils::get_display_form_from_bitset(&self.skip_rules),
            )
            .field(
                "skip_first_terminals",
                &utils::get_display_form_from_bitset(&self.skip_first_terminals),
            )
            .finish()
    }
}
