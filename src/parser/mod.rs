/*!
# XML 1.0 well-formedness parser

This module houses the event layer on top of the [`crate::lexer`]: the
[`Parser`] consumes raw bytes, runs them through encoding detection and the
tokenizer, splices entity replacement text into the token stream and checks
the well-formedness constraints which span multiple tokens (element nesting,
attribute uniqueness, entity balance, prolog structure).

Its results are [`Event`]s in document order. Fatal errors are returned as
[`crate::Error`] values and poison the parser; in
[`Strictness::Permissive`] mode, a small set of recoverable conditions is
reported as [`Event::Warning`] instead.
*/
mod common;
mod engine;

pub use common::{Event, ParserOptions, Strictness, XMLVersion};
pub use engine::Parser;
