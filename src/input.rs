//! This module contains the [`Input`] struct, which wraps the raw text and
//! matches terminals on demand at arbitrary offsets.
use std::hash::Hash;

use ahash::AHashMap;
use num::traits::{NumAssign, NumOps};
use num::{
    cast::AsPrimitive,
    traits::{ConstOne, ConstZero},
    Num,
};
use regex_automata::dfa::Automaton;

use crate::grammar::{RuleID, RuleKind, RuleSet, TerminalKind};
use crate::utils::dispatch_by_dfa_state_status;

/// A matched terminal occurrence: rule identity, start offset, length.
/// Offsets are 0-based byte offsets; the exclusive end is `start + length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Leaf<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    /// The terminal rule that matched.
    pub rule: RuleID<TI>,
    /// The byte offset the match starts at.
    pub start: u32,
    /// The number of bytes matched. Zero only for empty-match terminals.
    pub length: u32,
}

impl<TI> Leaf<TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    /// The exclusive end offset of the match.
    #[inline]
    pub fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// The raw input text plus the per-`(rule, offset)` leaf memo table.
/// Matching is pure with respect to the text; the only side effect is
/// cache population, misses included.
#[derive(Debug, Clone)]
pub struct Input<'a, TI>
where
    TI: Num + AsPrimitive<usize> + ConstOne + ConstZero,
{
    text: &'a str,
    leaves: AHashMap<(RuleID<TI>, u32), Option<Leaf<TI>>>,
}

impl<'a, TI> Input<'a, TI>
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
    /// Wrap a text. The text must be at most `u32::MAX` bytes long; the caller
    /// checks this before constructing the input.
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            leaves: AHashMap::default(),
        }
    }

    #[inline]
    /// The wrapped text.
    pub fn text(&self) -> &'a str {
        self.text
    }

    #[inline]
    /// The text length in bytes.
    pub fn len(&self) -> u32 {
        self.text.len() as u32
    }

    #[inline]
    /// Whether the text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    #[inline]
    /// Whether the position is at or beyond the text end.
    pub fn is_end(&self, position: u32) -> bool {
        position >= self.len()
    }

    /// Attempt to match the terminal's pattern starting exactly at `position`,
    /// returning the cached leaf on repeated calls. A memoized miss is returned
    /// as `None` without re-matching.
    pub fn fetch_or_create_bud(
        &mut self,
        rule_set: &RuleSet<TI>,
        terminal: RuleID<TI>,
        position: u32,
    ) -> Option<Leaf<TI>> {
        if let Some(&cached) = self.leaves.get(&(terminal, position)) {
            return cached;
        }
        let leaf = self.try_match(rule_set, terminal, position);
        self.leaves.insert((terminal, position), leaf);
        leaf
    }

    fn try_match(
        &self,
        rule_set: &RuleSet<TI>,
        terminal: RuleID<TI>,
        position: u32,
    ) -> Option<Leaf<TI>> {
        let bytes = self.text.as_bytes();
        let pos = position as usize;
        match rule_set.rule(terminal).kind {
            RuleKind::Terminal(TerminalKind::EmptyMatch(_)) => Some(Leaf {
                rule: terminal,
                start: position,
                length: 0,
            }),
            RuleKind::Terminal(TerminalKind::Literal(literal_id)) => {
                let literal = rule_set.literal(literal_id);
                if pos + literal.len() <= bytes.len() && &bytes[pos..pos + literal.len()] == literal
                {
                    Some(Leaf {
                        rule: terminal,
                        start: position,
                        length: literal.len() as u32,
                    })
                } else {
                    None
                }
            }
            RuleKind::Terminal(TerminalKind::Pattern(regex_id)) => {
                if pos >= bytes.len() {
                    return None;
                }
                if !rule_set
                    .terminal_first_bytes(terminal)
                    .contains(bytes[pos] as usize)
                {
                    return None;
                }
                let dfa = rule_set.regex(regex_id);
                // start_state errors were surfaced in RuleSet::new
                let mut state = dfa.start_state(rule_set.regex_start_config()).unwrap();
                let mut longest: Option<u32> = None;
                for (i, &byte) in bytes[pos..].iter().enumerate() {
                    state = dfa.next_state(state, byte);
                    dispatch_by_dfa_state_status!(state, dfa,
                        accept => {
                            longest = Some((i + 1) as u32);
                        },
                        reject => {
                            break;
                        },
                        in_progress => {}
                    );
                }
                // A zero-length pattern match would let repetition rules loop
                // without consuming input; nullability is modelled through
                // synthesized empty terminals instead.
                longest.filter(|&length| length > 0).map(|length| Leaf {
                    rule: terminal,
                    start: position,
                    length,
                })
            }
            RuleKind::NonTerminal(_) => {
                unreachable!("terminal match requested for a non-terminal rule")
            }
        }
    }
}
