/*!
# Coppice

This crate provides a scannerless, generalized parsing engine
which builds a shared packed parse forest (SPPF) for arbitrary context-free grammars,
ambiguous and locally non-deterministic ones included, directly over raw text.
There is no separate lexer stage; terminals are matched on demand at arbitrary offsets.
Here is a quick example of how this crate works:

```rust
use coppice::{Engine, ParserLike, RuleSetBuilder};

let mut builder = RuleSetBuilder::new();
builder
    .choice("expr", &["range", "real"])
    .concatenation("range", &["integer", "dots", "integer"])
    .concatenation("integer", &["int_pat"])
    .concatenation("real", &["real_pat"])
    .literal("dots", "..")
    .pattern("int_pat", "[0-9]+")
    .pattern("real_pat", "([0-9]+[.][0-9]*)|([.][0-9]+)");
let engine = Engine::new(&builder.source()).unwrap();
let forest = engine.parse("expr", "1..5").unwrap();
assert_eq!(
    forest.to_bracketed_string(),
    "expr { range { integer { '1' } '..' integer { '5' } } }"
);
let forest = engine.parse("expr", ".5").unwrap();
assert_eq!(forest.to_bracketed_string(), "expr { real { '.5' } }");
```

# Overview

The primary types in this crate are [`ParserLike`] and [`Engine`]. [`ParserLike`] defines the behavior of a parser,
while [`Engine`] is a concrete implementation of [`ParserLike`]. The most important methods are as follows:
- [`Engine::new`]: This method creates a new engine from a [`RuleSetSource`] and the default configuration.
  [`Engine::with_config`] allows you to specify a custom configuration.
- [`ParserLike::parse`]: This method parses a text against a goal rule and returns the [`ParseForest`],
  or a [`ParseError`](crate::engine_like::ParseError) carrying a longest-match diagnostic.

Grammars are handed to the engine in compiled form: a [`RuleSetSource`] built
programmatically through [`RuleSetBuilder`] (or by an external grammar
compiler). Rules come in six shapes: literal and pattern terminals,
concatenations, unordered and ordered (priority) choices, bounded repetitions
and separated lists. Rules marked as *skip* (typically whitespace and
comments) may be interleaved at any position without being an explicit
grammar symbol:

```rust
use coppice::{Engine, ParserLike, RuleSetBuilder};

let mut builder = RuleSetBuilder::new();
builder
    .skip_pattern("WS", r"\s+")
    .multi("as", 1, None, "a")
    .literal("a", "a");
let engine = Engine::new(&builder.source()).unwrap();
let forest = engine.parse("as", " a a ").unwrap();
assert_eq!(forest.to_bracketed_string(), "as { ' ' 'a' ' ' 'a' ' ' }");
```

# Ambiguity

Unlike deterministic parsers, the engine does not reject ambiguous grammars.
Every derivation of the same text span by the same rule is packed as an
alternative child list under one forest node; the caller walks
[`ParseForest`] and decides. Ordered choices resolve span ties eagerly
instead: the earlier-declared alternative wins and is kept as the sole
representative.

# Performance

## Reducing ambiguity

Grammar structure is the most influential factor in the performance of the engine **asymptotically**.

Practically speaking, if parsing runs abysmally slow for long inputs, you should check the grammar
for [ambiguity](https://en.wikipedia.org/wiki/Ambiguous_grammar). Highly ambiguous
grammars force the engine to keep many derivations alive at once; the graph
stays polynomial thanks to node sharing, but the constant factor grows.

## Prefer patterns over character-level rules

A pattern terminal is compiled into a dense DFA and matched in one pass,
which has far lower overhead than deriving the same text through repetition
rules character by character.

## Bound the work for untrusted input

A single growth-to-fixpoint pass is deterministic, but pathological
grammar/input pairs can grow large graphs. [`Config`](crate::config::Config)
exposes watchdog limits (maximum growth rounds, maximum graph nodes) that
turn runaway parses into errors instead.
*/
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod config;
pub mod engine;
pub mod engine_base;
pub mod engine_like;
pub mod forest;
pub mod grammar;
mod graph;
pub mod input;
mod utils;
pub use config::Config;
pub use engine::Engine;
pub use engine_like::ParseError;
pub use engine_like::ParserLike;
pub use forest::NodeRef;
pub use forest::ParseForest;
pub use grammar::RuleSetBuilder;
pub use grammar::RuleSetSource;
