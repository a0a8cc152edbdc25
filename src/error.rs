/*!
# Error types

This module holds the error types returned by the various functions of this
crate.
*/
use std::error;
use std::fmt;
use std::io;
use std::ops::Deref;
use std::result::Result as StdResult;
use std::sync::Arc;

use crate::selectors::ValidationError;

pub use crate::errctx::*;

/// Violation of a well-formedness constraint or the XML 1.0 grammar.
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum WFError {
	/// End-of-file encountered during a construct where more data was
	/// expected.
	///
	/// The contents are implementation details.
	InvalidEof(&'static str),

	/// Attempt to refer to an undeclared entity.
	///
	/// **Note**: May also be emitted in some cases of malformed entities as
	/// the lexer is very conservative about how many chars are read to
	/// interpret an entity.
	UndeclaredEntity,

	/// Unicode codepoint which is not allowed in XML 1.0 encountered.
	///
	/// The contents are implementation details.
	InvalidChar(&'static str, u32, bool),

	/// Unicode codepoint which was not expected at that point in the
	/// grammar.
	///
	/// The contents are implementation details.
	UnexpectedChar(&'static str, char, Option<&'static [&'static str]>),

	/// Byte which was not expected at that point in the grammar.
	///
	/// The contents are implementation details.
	UnexpectedByte(&'static str, u8, Option<&'static [&'static str]>),

	/// Generalized invalid syntactic construct which does not fit into any
	/// of the other categories.
	///
	/// The contents are implementation details.
	InvalidSyntax(&'static str),

	/// Token was not expected by the parser at that point in the grammar.
	///
	/// The contents are implementation details.
	UnexpectedToken(&'static str, &'static str, Option<&'static [&'static str]>),

	/// Attribute was declared multiple times in the same element.
	DuplicateAttribute,

	/// A prefixed name was used without an in-scope declaration for its
	/// prefix.
	UndeclaredNamespacePrefix,

	/// Ending tag name does not match opening tag.
	ElementMismatch,

	/// An element was opened inside an entity replacement and closed outside
	/// of it (or vice versa).
	UnbalancedEntity,

	/// An external entity was referenced where only internal entities are
	/// allowed, most notably inside an attribute value.
	ExternalEntityForbidden,
}

impl error::Error for WFError {}

impl ErrorWithContext for WFError {
	fn with_context(self, ctx: &'static str) -> WFError {
		match self {
			WFError::InvalidEof(_) => WFError::InvalidEof(ctx),
			WFError::InvalidChar(_, cp, fromref) => WFError::InvalidChar(ctx, cp, fromref),
			WFError::UnexpectedChar(_, ch, alt) => WFError::UnexpectedChar(ctx, ch, alt),
			WFError::UnexpectedToken(_, tok, alt) => WFError::UnexpectedToken(ctx, tok, alt),
			other => other.clone(),
		}
	}
}

fn write_alternatives(f: &mut fmt::Formatter, opts: &'static [&'static str]) -> fmt::Result {
	if opts.len() == 1 {
		f.write_str(opts[0])?;
		f.write_str(")")
	} else {
		f.write_str("one of: ")?;
		for (i, opt) in opts.iter().enumerate() {
			if i > 0 {
				f.write_str(", ")?;
			}
			f.write_str(*opt)?;
		}
		f.write_str(")")
	}
}

impl fmt::Display for WFError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			WFError::InvalidEof(ctx) => write!(f, "invalid eof {}", ctx),
			WFError::UndeclaredEntity => write!(f, "use of undeclared entity"),
			WFError::InvalidChar(ctx, cp, false) => {
				write!(f, "invalid codepoint U+{:x} {}", cp, ctx)
			}
			WFError::InvalidChar(ctx, cp, true) => write!(
				f,
				"character reference expanded to invalid codepoint U+{:x} {}",
				cp, ctx
			),
			WFError::UnexpectedChar(ctx, ch, Some(opts)) if opts.len() > 0 => {
				write!(f, "U+{:x} not allowed {} (expected ", *ch as u32, ctx)?;
				write_alternatives(f, opts)
			}
			WFError::UnexpectedByte(ctx, b, Some(opts)) if opts.len() > 0 => {
				write!(f, "0x{:x} not allowed {} (expected ", *b, ctx)?;
				write_alternatives(f, opts)
			}
			WFError::UnexpectedChar(ctx, ch, _) => {
				write!(f, "U+{:x} not allowed {}", *ch as u32, ctx)
			}
			WFError::UnexpectedByte(ctx, b, _) => write!(f, "0x{:x} not allowed {}", *b, ctx),
			WFError::InvalidSyntax(msg) => write!(f, "invalid syntax: {}", msg),
			WFError::UnexpectedToken(ctx, tok, Some(opts)) if opts.len() > 0 => {
				write!(f, "unexpected {} token {} (expected ", tok, ctx)?;
				write_alternatives(f, opts)
			}
			WFError::UnexpectedToken(ctx, tok, _) => write!(f, "unexpected {} token {}", tok, ctx),
			WFError::DuplicateAttribute => f.write_str("duplicate attribute"),
			WFError::UndeclaredNamespacePrefix => f.write_str("undeclared namespace prefix"),
			WFError::ElementMismatch => f.write_str("start and end tag do not match"),
			WFError::UnbalancedEntity => {
				f.write_str("element not opened and closed within the same entity")
			}
			WFError::ExternalEntityForbidden => {
				f.write_str("external entity referenced where forbidden")
			}
		}
	}
}

impl From<ValidationError> for WFError {
	fn from(other: ValidationError) -> Self {
		match other {
			ValidationError::EmptyName => Self::InvalidSyntax("Name must have at least one Char"),
			ValidationError::InvalidChar(ch) => Self::UnexpectedChar(ERRCTX_UNKNOWN, ch, None),
		}
	}
}

impl From<ValidationError> for Error {
	fn from(other: ValidationError) -> Self {
		Error::NotWellFormed(other.into())
	}
}

/// Failure of a byte buffer operation.
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum BufError {
	/// Growing the buffer would exceed its configured maximum capacity.
	CapacityExceeded,

	/// Attempt to modify a buffer backed by read-only memory.
	StaticBufferMutation,

	/// Attempt to detach the contents of a buffer which have already been
	/// detached.
	AlreadyDetached,
}

impl error::Error for BufError {}

impl fmt::Display for BufError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::CapacityExceeded => f.write_str("buffer capacity limit exceeded"),
			Self::StaticBufferMutation => f.write_str("attempt to modify a static buffer"),
			Self::AlreadyDetached => f.write_str("buffer contents already detached"),
		}
	}
}

/// Failure to decode the input byte stream into text.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodingError {
	/// A byte sequence which is not valid in the active encoding.
	///
	/// The contents are the label of the active encoding and the offending
	/// byte.
	Malformed(&'static str, u8),

	/// The encoding label in the XML declaration does not match the encoding
	/// established by the byte order mark or first-bytes detection.
	DeclarationMismatch {
		detected: &'static str,
		declared: &'static str,
	},

	/// The declared encoding label names an encoding this crate does not
	/// support.
	UnsupportedEncoding,

	/// An encoding declaration was seen after non-whitespace content had
	/// already been decoded, when switching is no longer possible.
	LateSwitch,
}

impl error::Error for EncodingError {}

impl fmt::Display for EncodingError {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Malformed(enc, b) => {
				write!(f, "byte 0x{:02x} is not valid {}", b, enc)
			}
			Self::DeclarationMismatch { detected, declared } => write!(
				f,
				"declared encoding {} contradicts detected encoding {}",
				declared, detected
			),
			Self::UnsupportedEncoding => f.write_str("unsupported encoding"),
			Self::LateSwitch => {
				f.write_str("encoding declaration after non-whitespace content")
			}
		}
	}
}

/// The entity expansion limit which was exceeded.
#[derive(Debug, Clone, PartialEq, Copy)]
pub enum LimitKind {
	/// Nesting depth of entity replacement inputs.
	EntityDepth,
	/// Cumulative number of replacement text bytes produced by entity
	/// expansion over the lifetime of the document.
	ExpansionBytes,
}

impl fmt::Display for LimitKind {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::EntityDepth => f.write_str("entity nesting depth"),
			Self::ExpansionBytes => f.write_str("cumulative entity expansion size"),
		}
	}
}

/// [`std::sync::Arc`]-based wrapper around [`std::io::Error`] to allow
/// cloning.
#[derive(Clone)]
pub struct IOErrorWrapper(Arc<io::Error>);

impl IOErrorWrapper {
	fn wrap(e: io::Error) -> IOErrorWrapper {
		IOErrorWrapper(Arc::new(e))
	}
}

impl fmt::Debug for IOErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(&**self, f)
	}
}

impl fmt::Display for IOErrorWrapper {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&**self, f)
	}
}

impl PartialEq for IOErrorWrapper {
	fn eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}
}

impl AsRef<io::Error> for IOErrorWrapper {
	fn as_ref(&self) -> &io::Error {
		&*self.0
	}
}

impl Deref for IOErrorWrapper {
	type Target = io::Error;

	fn deref(&self) -> &io::Error {
		&*self.0
	}
}

impl std::borrow::Borrow<io::Error> for IOErrorWrapper {
	fn borrow(&self) -> &io::Error {
		&*self.0
	}
}

/// Error types which may be returned from the parser or lexer.
///
/// With the exception of [`Error::IO`], all errors are fatal and will be
/// returned indefinitely from the parser or lexer after the first encounter.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
	/// An I/O error was encountered.
	///
	/// I/O errors are not fatal and may be retried. This is especially
	/// important for (but not limited to)
	/// [`std::io::ErrorKind::WouldBlock`] errors, which the progressive
	/// interfaces use to signal that more input is needed.
	///
	/// **Note:** When an unexpected end-of-file situation is encountered
	/// during parsing or lexing, that is signalled using
	/// [`Error::NotWellFormed`] instead of a
	/// [`std::io::ErrorKind::UnexpectedEof`] error.
	IO(IOErrorWrapper),

	/// An invalid UTF-8 byte was encountered during decoding.
	InvalidUtf8Byte(u8),
	/// An invalid Unicode scalar value was encountered during decoding.
	InvalidChar(u32),
	/// A violation of the XML 1.0 grammar or a well-formedness constraint
	/// was encountered during parsing or lexing.
	NotWellFormed(WFError),
	/// A byte buffer operation failed, most likely because a configured
	/// capacity limit was reached.
	Buffer(BufError),
	/// The input byte stream could not be decoded into text.
	Encoding(EncodingError),
	/// An entity expansion limit was exceeded.
	///
	/// This is the defense against expansion attacks such as the billion
	/// laughs; the check happens before the offending replacement text is
	/// processed.
	ExpansionLimitExceeded(LimitKind),
	/// A construct was encountered which this crate does not process, such
	/// as a parameter entity declaration.
	Unsupported(&'static str),
}

pub type Result<T> = StdResult<T, Error>;

pub(crate) trait ErrorWithContext {
	fn with_context(self, ctx: &'static str) -> Self;
}

impl Error {
	pub fn io(e: io::Error) -> Error {
		Error::IO(IOErrorWrapper::wrap(e))
	}

	pub(crate) fn wfeof(ctx: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidEof(ctx))
	}
}

impl ErrorWithContext for Error {
	fn with_context(self, ctx: &'static str) -> Self {
		match self {
			Self::NotWellFormed(wf) => Self::NotWellFormed(wf.with_context(ctx)),
			other => other,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::io(e)
	}
}

impl From<WFError> for Error {
	fn from(e: WFError) -> Error {
		Error::NotWellFormed(e)
	}
}

impl From<BufError> for Error {
	fn from(e: BufError) -> Error {
		Error::Buffer(e)
	}
}

impl From<EncodingError> for Error {
	fn from(e: EncodingError) -> Error {
		Error::Encoding(e)
	}
}

impl fmt::Display for Error {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::NotWellFormed(e) => write!(f, "not-well-formed: {}", e),
			Error::Buffer(e) => write!(f, "buffer error: {}", e),
			Error::Encoding(e) => write!(f, "encoding error: {}", e),
			Error::ExpansionLimitExceeded(kind) => write!(f, "{} limit exceeded", kind),
			Error::Unsupported(msg) => write!(f, "unsupported construct: {}", msg),
			Error::InvalidUtf8Byte(b) => write!(f, "invalid utf-8 byte: \\x{:02x}", b),
			Error::InvalidChar(ch) => write!(f, "invalid char: U+{:08x}", ch),
			Error::IO(e) => write!(f, "I/O error: {}", e),
		}
	}
}

impl error::Error for Error {
	fn source(&self) -> Option<&(dyn error::Error + 'static)> {
		match self {
			Error::IO(e) => Some(&**e),
			_ => None,
		}
	}
}
