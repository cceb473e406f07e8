//! The configuration module of the coppice engine.
use serde::{Deserialize, Serialize};

use crate::engine_base::EngineConfig;

#[derive(Debug, Clone)]
/// The internal configuration of the coppice engine. This is intended for advanced usages.
pub struct InternalConfig {
    /// The configuration of the terminal pattern automata.
    pub regex_config: regex_automata::dfa::dense::Config,
    /// The configuration of the engine itself.
    pub engine_config: EngineConfig,
}

/// The configuration of the [`Engine`](crate::engine::Engine) struct. This should suffice most scenarios.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Config {
    /// The configuration of the terminal patterns.
    pub regex_config: RegexConfig,
    /// The configuration of the engine.
    pub engine_config: EngineConfig,
    /// The length of the longest expected input in bytes.
    /// This is used to determine the index type used in EngineBase.
    /// If you are sure that inputs will be short,
    /// you can set a shorter length to save memory and potentially speed up the engine.
    /// The default is `2^32-1`.
    pub expected_input_length: usize,
}

/// The type of the finite state automaton used for terminal patterns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Copy)]
pub enum Fsa {
    /// The dense deterministic finite automaton.
    /// It eagerly computes all state transitions, trading construction time and
    /// memory for the fastest possible matching.
    Dfa,
}

/// The configuration of terminal patterns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Copy)]
pub struct RegexConfig {
    /// The maximum memory usage in bytes allowed when compiling one pattern.
    /// If the memory usage exceeds this limit, an error will be returned.
    /// The default is `None`, which means no limit.
    pub max_memory_usage: Option<usize>,
    /// The type of the finite state automaton to be used.
    /// The default is [`Fsa::Dfa`].
    pub fsa_type: Fsa,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            regex_config: RegexConfig {
                max_memory_usage: None,
                fsa_type: Fsa::Dfa,
            },
            engine_config: EngineConfig {
                max_growth_rounds: None,
                max_graph_nodes: None,
            },
            expected_input_length: u32::MAX as usize,
        }
    }
}

impl Config {
    /// Converts the configuration to the internal configuration.
    pub fn internal_config(self) -> InternalConfig {
        let regex_config = match self.regex_config.fsa_type {
            Fsa::Dfa => regex_automata::dfa::dense::Config::new()
                .dfa_size_limit(self.regex_config.max_memory_usage)
                .start_kind(regex_automata::dfa::StartKind::Anchored),
        };
        InternalConfig {
            regex_config,
            engine_config: self.engine_config,
        }
    }
}
