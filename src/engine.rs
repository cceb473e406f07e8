//! The main module that contains the [`Engine`] struct and its related types.
use std::sync::Arc;

use crate::{
    config::Config,
    engine_base::EngineBase,
    engine_like::{ParseError, ParserLike},
    forest::ParseForest,
    grammar::{RuleSet, RuleSetSource},
};

#[derive(Debug, Clone)]
/// An enum that represents the common type combinations of [`EngineBase`].
pub(crate) enum EngineUnion {
    /// Small rule sets, at most 254 rule ids
    U8(EngineBase<u8>),
    /// Typical rule sets, at most 65534 rule ids
    U16(EngineBase<u16>),
    /// Large rule sets
    U32(EngineBase<u32>),
}

/// The main struct that wraps the [`EngineBase`] so the user does not have to
/// specify the generic type every time for common cases.
#[derive(Debug, Clone)]
pub struct Engine {
    union: EngineUnion,
}

#[derive(Debug, thiserror::Error)]
/// Represents the error type for the [`Engine`] creation.
pub enum CreateEngineError {
    #[error("{0}")] // inherits the error message from the wrapped EngineBaseError
    /// A wrapper for the [`CreateEngineBaseError`](crate::engine_base::CreateEngineBaseError) error type.
    EngineBaseError(#[from] crate::engine_base::CreateEngineBaseError),
    #[error("{0}")] // inherits the error message from the wrapped RuleSetError
    /// A wrapper for the [`CreateRuleSetError`](crate::grammar::CreateRuleSetError) error type.
    RuleSetError(#[from] crate::grammar::CreateRuleSetError),
    #[error("The rule set is empty.")]
    /// The rule set source contains no rules.
    EmptyRuleSetError,
    #[error("The rule set and/or config's value range is not supported by the Engine.
    This usually means that the rule set has more than 2^32-2 rules and/or the expected input length is more than 2^32-1.")]
    /// The rule set and/or config's value range is not supported by the Engine.
    InvalidInputError,
}

impl Engine {
    /// Create a new [`Engine`] from a rule set source with the default configuration.
    ///
    /// # Arguments
    ///
    /// * `source` - The compiled rule set source, typically produced by a
    ///   [`RuleSetBuilder`](crate::grammar::RuleSetBuilder).
    ///
    /// # Returns
    ///
    /// * [`Engine`] - The new [`Engine`] object.
    ///
    /// # Errors
    ///
    /// Returns a [`CreateEngineError`] when the source is empty, malformed, or
    /// its value range is not supported by the engine.
    pub fn new(source: &RuleSetSource) -> Result<Engine, CreateEngineError> {
        let config = Config::default();
        Self::with_config(source, config)
    }

    /// Create a new [`Engine`] from a rule set source and a [`Config`].
    ///
    /// The id width (`u8`/`u16`/`u32`) is selected from the number of compiled
    /// rules, the synthesized empty terminals and the per-parse goal wrapper
    /// included.
    ///
    /// # Errors
    ///
    /// Returns a [`CreateEngineError`] when the source is empty, malformed, or
    /// its value range is not supported by the engine.
    pub fn with_config(
        source: &RuleSetSource,
        config: Config,
    ) -> Result<Engine, CreateEngineError> {
        if source.is_empty() {
            return Err(CreateEngineError::EmptyRuleSetError);
        }
        if config.expected_input_length > u32::MAX as usize {
            return Err(CreateEngineError::InvalidInputError);
        }
        let internal_config = config.internal_config();
        // one extra id for the goal wrapper the graph synthesizes per parse
        let id_count = source.compiled_rule_count() + 1;
        let union = if id_count <= u8::MAX as usize {
            let rule_set: RuleSet<u8> = RuleSet::new(source, &internal_config.regex_config)?;
            EngineUnion::U8(EngineBase::new(
                Arc::new(rule_set),
                internal_config.engine_config,
            )?)
        } else if id_count <= u16::MAX as usize {
            let rule_set: RuleSet<u16> = RuleSet::new(source, &internal_config.regex_config)?;
            EngineUnion::U16(EngineBase::new(
                Arc::new(rule_set),
                internal_config.engine_config,
            )?)
        } else if id_count <= u32::MAX as usize {
            let rule_set: RuleSet<u32> = RuleSet::new(source, &internal_config.regex_config)?;
            EngineUnion::U32(EngineBase::new(
                Arc::new(rule_set),
                internal_config.engine_config,
            )?)
        } else {
            return Err(CreateEngineError::InvalidInputError);
        };
        Ok(Self { union })
    }
}

macro_rules! match_engine_union {
    ($e:path[$s:expr$(,$p:ident)*]) => {
        match $s {
            EngineUnion::U8(engine) => $e(engine, $($p,)*),
            EngineUnion::U16(engine) => $e(engine, $($p,)*),
            EngineUnion::U32(engine) => $e(engine, $($p,)*),
        }
    }
}

impl crate::engine_like::sealed::Sealed for Engine {}

impl ParserLike for Engine {
    fn parse(&self, goal: &str, text: &str) -> Result<ParseForest, ParseError> {
        match_engine_union!(ParserLike::parse[&self.union, goal, text])
    }

    fn rule_count(&self) -> usize {
        match_engine_union!(ParserLike::rule_count[&self.union])
    }

    fn into_boxed_parser(self) -> Box<dyn ParserLike> {
        match_engine_union!(ParserLike::into_boxed_parser[self.union])
    }
}
