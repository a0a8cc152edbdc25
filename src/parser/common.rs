use std::collections::HashMap;

use crate::encoding::Encoding;
use crate::entity::ReplacementOrigin;
use crate::error::WFError;
use crate::input::Position;
use crate::strings::*;

/**
# XML version number

Only version 1.0 is supported.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XMLVersion {
	/// XML Version 1.0
	V1_0,
}

/// How the parser treats recoverable violations.
///
/// Fatal violations (mismatched tags, malformed encodings, syntax errors)
/// always abort parsing regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
	/// Any violation is fatal.
	Strict,
	/// References to undeclared or unresolvable entities produce an
	/// [`Event::Warning`] and are skipped.
	Permissive,
}

/**
# Logical XML document parts

The term *Event* is borrowed from SAX terminology. Each [`Event`] refers to
a logical bit of the XML document which has been parsed.

Each event carries the [`Position`] at which the construct began, in the
source the construct was read from (positions inside entity replacement text
are relative to the entity, not the document).

## Document event sequence

A well-formed document generates the following sequence:

1. One [`Self::StartDocument`]
2. Zero or more [`Self::Comment`] / [`Self::ProcessingInstruction`]
3. One *element sequence*
4. Zero or more [`Self::Comment`] / [`Self::ProcessingInstruction`]
5. One [`Self::EndDocument`]

An *element sequence* consists of one [`Self::StartElement`], a mix of
[`Self::Text`], [`Self::CDataSection`], [`Self::Comment`],
[`Self::ProcessingInstruction`], [`Self::ReferenceResolved`] and nested
element sequences, and a final [`Self::EndElement`].
*/
#[derive(Clone, PartialEq, Debug)]
pub enum Event {
	/// Start of the document.
	///
	/// Emitted after the XML declaration (if any) has been processed, before
	/// any other event. The version defaults to 1.0 when no declaration is
	/// present.
	StartDocument(Position, XMLVersion),

	/// The start of an element, with its complete attribute map.
	///
	/// Attribute values are normalized and have all references expanded.
	StartElement(Position, Name, HashMap<Name, CData>),

	/// The end of an element.
	///
	/// Elements closed with `/>` emit this immediately after their
	/// [`Self::StartElement`].
	EndElement(Position, Name),

	/// Character data.
	///
	/// References are expanded, so the text corresponds to the *logical*
	/// character data.
	///
	/// **Note:** Multiple consecutive `Text` events may be emitted for long
	/// sections of text or because of implementation details in the
	/// processing.
	Text(Position, CData),

	/// Contents of a `<![CDATA[ .. ]]>` section, unprocessed.
	CDataSection(Position, CData),

	/// A comment, without the delimiters.
	Comment(Position, CData),

	/// A processing instruction with its target and optional data string.
	ProcessingInstruction(Position, Name, Option<CData>),

	/// A general entity reference was resolved and its replacement spliced
	/// into the document.
	///
	/// The events generated from the replacement text follow.
	ReferenceResolved(Position, Name, ReplacementOrigin),

	/// A recoverable violation, reported instead of an error in
	/// [`Strictness::Permissive`] mode.
	Warning(Position, WFError),

	/// End of the document. Final event of a well-formed document.
	EndDocument(Position),
}

impl Event {
	/// Return the position at which the construct began.
	pub fn position(&self) -> Position {
		match self {
			Self::StartDocument(p, ..) => *p,
			Self::StartElement(p, ..) => *p,
			Self::EndElement(p, ..) => *p,
			Self::Text(p, ..) => *p,
			Self::CDataSection(p, ..) => *p,
			Self::Comment(p, ..) => *p,
			Self::ProcessingInstruction(p, ..) => *p,
			Self::ReferenceResolved(p, ..) => *p,
			Self::Warning(p, ..) => *p,
			Self::EndDocument(p, ..) => *p,
		}
	}
}

/**
# Configuration of parser limits and behavior

The defaults are safe for untrusted input. The limits exist to bound memory
use in the face of adversarial documents; see
[`crate::input::ExpansionGuard`] for the expansion limits specifically.

The options struct is constructed through a builder pattern:

```
use ixml::{Parser, ParserOptions, Strictness};
let parser = Parser::with_options(
	ParserOptions::default()
		.max_entity_depth(4)
		.strictness(Strictness::Permissive),
);
```
*/
#[derive(Clone, Debug)]
pub struct ParserOptions {
	/// Maximum number of decoded bytes buffered per input source.
	pub max_buffer_capacity: usize,
	/// Maximum nesting depth of entity expansions.
	pub max_entity_depth: usize,
	/// Maximum cumulative size of all expanded replacement text.
	pub max_expansion_bytes: usize,
	/// Encoding assumed when neither detection nor a declaration decides.
	pub default_encoding: Encoding,
	/// Encoding forced from out-of-band knowledge (e.g. a transport
	/// header), overriding anything found in the stream.
	pub explicit_encoding: Option<Encoding>,
	/// Treatment of recoverable violations.
	pub strictness: Strictness,
	/// Maximum length of a single token, in bytes. Forwarded to
	/// [`crate::LexerOptions::max_token_length`].
	pub max_token_length: usize,
}

impl ParserOptions {
	/// Set the [`Self::max_buffer_capacity`] value.
	pub fn max_buffer_capacity(mut self, v: usize) -> ParserOptions {
		self.max_buffer_capacity = v;
		self
	}

	/// Set the [`Self::max_entity_depth`] value.
	pub fn max_entity_depth(mut self, v: usize) -> ParserOptions {
		self.max_entity_depth = v;
		self
	}

	/// Set the [`Self::max_expansion_bytes`] value.
	pub fn max_expansion_bytes(mut self, v: usize) -> ParserOptions {
		self.max_expansion_bytes = v;
		self
	}

	/// Set the [`Self::default_encoding`] value.
	pub fn default_encoding(mut self, v: Encoding) -> ParserOptions {
		self.default_encoding = v;
		self
	}

	/// Set the [`Self::explicit_encoding`] value.
	pub fn explicit_encoding(mut self, v: Encoding) -> ParserOptions {
		self.explicit_encoding = Some(v);
		self
	}

	/// Set the [`Self::strictness`] value.
	pub fn strictness(mut self, v: Strictness) -> ParserOptions {
		self.strictness = v;
		self
	}

	/// Set the [`Self::max_token_length`] value.
	pub fn max_token_length(mut self, v: usize) -> ParserOptions {
		self.max_token_length = v;
		self
	}
}

impl Default for ParserOptions {
	fn default() -> ParserOptions {
		ParserOptions {
			max_buffer_capacity: 16 * 1024 * 1024,
			max_entity_depth: 32,
			max_expansion_bytes: 4 * 1024 * 1024,
			default_encoding: Encoding::Utf8,
			explicit_encoding: None,
			strictness: Strictness::Strict,
			max_token_length: 8192,
		}
	}
}
