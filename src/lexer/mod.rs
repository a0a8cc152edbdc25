/*!
# XML 1.0 Lexer

Byte-level tokenizer for XML 1.0 documents. The lexer is incremental: it
reads from a caller-provided byte window and suspends with a
[`std::io::ErrorKind::WouldBlock`] I/O error whenever it runs out of input
mid-token, keeping all partial state so that lexing resumes seamlessly when
more bytes arrive.
*/
use std::fmt;
use std::io;

mod ranges;

use crate::entity::EntityDef;
use crate::errctx::*;
use crate::error::{ErrorWithContext, Result as CrateResult, WFError};
use crate::selectors::{validate_cdata, validate_name, CharSelector, ValidationError, CLASS_XML_NONCHAR};
use crate::strings::*;
use ranges::*;

/// Where a bounded byte scan stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Endbyte {
	/// The window ran out of bytes.
	Eof,
	/// The length limit was hit with bytes still left in the window.
	Limit,
	/// A byte the selector rejects was found and consumed.
	Delimiter(u8),
}

/**
Copy bytes matched by `selector` from the front of `*r` into `into`, at most
`limit` of them.

`*r` is advanced past everything consumed. A rejecting byte is consumed too
but not copied; it comes back as [`Endbyte::Delimiter`]. Running out of
window at the limit boundary reports [`Endbyte::Eof`], which keeps a resumed
scan from spuriously reporting the limit.
*/
fn read_validated_bytes<B: ByteSelect>(
	r: &mut &[u8],
	selector: &B,
	limit: usize,
	into: &mut Vec<u8>,
) -> Endbyte {
	let window = if r.len() > limit { &r[..limit] } else { *r };
	match window.iter().position(|&b| !selector.select(b)) {
		Some(at) => {
			into.extend_from_slice(&window[..at]);
			let delim = window[at];
			*r = &r[at + 1..];
			Endbyte::Delimiter(delim)
		},
		None => {
			into.extend_from_slice(window);
			let copied = window.len();
			*r = &r[copied..];
			if r.is_empty() {
				Endbyte::Eof
			} else {
				Endbyte::Limit
			}
		},
	}
}

/**
Advance `*r` over bytes matched by `selector` without copying them anywhere.

Returns the number of bytes skipped, not counting a consumed delimiter.
*/
fn skip_matching_bytes<B: ByteSelect>(r: &mut &[u8], selector: &B) -> (usize, Endbyte) {
	match r.iter().position(|&b| !selector.select(b)) {
		Some(at) => {
			let delim = r[at];
			*r = &r[at + 1..];
			(at, Endbyte::Delimiter(delim))
		},
		None => {
			let skipped = r.len();
			*r = &[];
			(skipped, Endbyte::Eof)
		},
	}
}

/// Carry information about where in the stream the token was observed
///
/// Tokens are not necessarily consecutive. Specifically, it is possible that
/// some whitespace is ignored and not converted into tokens between tokens
/// inside element headers and footers as well as between the XML declaration
/// and the first element.
#[derive(Copy, Debug, Clone, PartialEq, Eq)]
pub struct TokenMetrics {
	start: usize,
	end: usize,
}

impl TokenMetrics {
	/// Get the length of the token, taking a potential counter overflow
	/// into account.
	pub fn len(&self) -> usize {
		self.end.wrapping_sub(self.start)
	}

	/// Start byte in the stream.
	///
	/// Note that this is a "dumb" counter of size [`usize`] which may wrap
	/// around on some architectures with sufficently long-running streams.
	/// For accurate counting of bytes in a sequence of tokens, this needs
	/// to be taken into account.
	///
	/// Note also that more than one wraparound within a single token is
	/// generally not possible because the token length limit is also a
	/// `usize` and internal buffers will generally refuse to allocate before
	/// that limit is reached, even if set to usize::MAX.
	pub fn start(&self) -> usize {
		self.start
	}

	/// End byte of the token in the stream (exclusive).
	///
	/// Please see the considerations in [`TokenMetrics.start()`].
	pub fn end(&self) -> usize {
		self.end
	}

	// for use in parser unit tests
	#[cfg(test)]
	pub(crate) const fn new(start: usize, end: usize) -> TokenMetrics {
		TokenMetrics{start: start, end: end}
	}
}

/**
A single XML token

Tokens are emitted by the lexer after processing bits of XML. Tokens do not
map directly to concepts in the XML 1.0 specification. Instead, they are
modelled in such a way that they provide a useful layer of abstraction for
processing semantics inside the parser on top of the lexer.

Each token has a [`TokenMetrics`] object attached which describes the byte
range of the input stream from which the token was derived. Note that the
ranges denoted by the token metrics may not be consecutive, as some whitespace
within elements and the XML declaration does not generate tokens.
*/
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
	/// A freestanding (i.e. not the element name) XML `Name`.
	///
	/// This token is only emitted while the XML declaration or an element
	/// header or footer is being lexed.
	///
	/// See also [`Token::ElementHeadStart`] and [`Token::ElementFootStart`],
	/// which carry the XML element names.
	Name(TokenMetrics, Name),

	/// An equal sign.
	///
	/// This token is only emitted while the XML declaration or an element
	/// header or footer is being lexed.
	Eq(TokenMetrics),

	/// An attribute value.
	///
	/// The delimiters are not included in the CData. Character references
	/// and the five predefined entity references are expanded already (i.e.
	/// you get `&` instead of `&amp;`). References to other entities are
	/// reported through [`Token::Reference`] before the attribute value
	/// token is emitted; their expansion is the business of the parser.
	///
	/// Note that the number of bytes in an AttributeValue token will always
	/// be less than the number of bytes used to generate it. The delimiters
	/// are not included in its CData, but they are counted for the token
	/// metrics. Likewise, any entity references inside the attribute value
	/// will take more bytes "on the wire" than in the CData.
	AttributeValue(TokenMetrics, CData),

	/// The `?>` sequence.
	///
	/// This token is only emitted while the XML declaration is being lexed.
	XMLDeclEnd(TokenMetrics),

	/// The `/>` sequence.
	///
	/// This token is only emitted while an element header is being lexed. If
	/// a `/>` is encountered within an element footer or the XML declaration,
	/// an error is returned.
	ElementHeadClose(TokenMetrics),

	/// The `>` sequence.
	///
	/// This token is only emitted while an element header or footer is being
	/// lexed. If a stray `>` is encountered within the XML declaration, an
	/// error is returned.
	ElementHFEnd(TokenMetrics),

	/// The `<?xml` sequence.
	XMLDeclStart(TokenMetrics),

	/// The `<` sequence, not followed by `!`, `/` or `?`.
	ElementHeadStart(TokenMetrics, Name),

	/// The `</` sequence.
	ElementFootStart(TokenMetrics, Name),

	/// A piece of character data inside an element.
	///
	/// Character references and the predefined entity references are
	/// processed in the lexer, which means that it is possible to encounter
	/// the verbatim string `<![CDATA[foo]]>` inside a Text token (namely
	/// when the input `&lt;![CDATA[foo]]&gt;` is processed).
	///
	/// There is no guarantee as to the segmentation of text tokens. It is
	/// possible that for a single consecutive piece of character data,
	/// multiple tokens are emitted. This can happen for instance when the
	/// token length limit is exceeded.
	Text(TokenMetrics, CData),

	/// Contents of a `<![CDATA[ .. ]]>` section.
	///
	/// The delimiters are not part of the CData. The contents are reported
	/// completely verbatim; no references are recognized inside a CDATA
	/// section. Like [`Token::Text`], the contents may be split into
	/// multiple tokens when the token length limit is exceeded. An empty
	/// section emits no token at all.
	CDataSection(TokenMetrics, CData),

	/// A complete `<!-- .. -->` comment with its contents.
	Comment(TokenMetrics, CData),

	/// A complete `<?target data?>` processing instruction.
	///
	/// The second field is the target, the third the data, which is absent
	/// when the instruction closes right after the target.
	ProcessingInstruction(TokenMetrics, Name, Option<CData>),

	/// The `<!DOCTYPE name` part of a document type declaration.
	///
	/// An external identifier following the name is consumed (and skipped)
	/// by the lexer before the next token is emitted.
	DoctypeStart(TokenMetrics, Name),

	/// A `<!ENTITY .. >` declaration from the internal subset.
	EntityDecl(TokenMetrics, Name, EntityDef),

	/// The final `>` (or `] .. >`) of a document type declaration.
	DoctypeEnd(TokenMetrics),

	/// A reference to a general entity which is not one of the predefined
	/// five, in text or in an attribute value.
	///
	/// The lexer does not know the declared entities. The parser resolves
	/// the name and splices the replacement text into the input, at which
	/// point lexing continues transparently inside the expansion.
	Reference(TokenMetrics, Name),
}

impl Token {
	pub const NAME_NAME: &'static str = "Name";
	pub const NAME_EQ: &'static str = "'='";
	pub const NAME_ATTRIBUTEVALUE: &'static str = "AttValue";
	pub const NAME_XMLDECLEND: &'static str = "'?>'";
	pub const NAME_ELEMENTHEADCLOSE: &'static str = "'/>'";
	pub const NAME_ELEMENTHFEND: &'static str = "'>'";
	pub const NAME_XMLDECLSTART: &'static str = "'<?xml'";
	pub const NAME_ELEMENTHEADSTART: &'static str = "'<'";
	pub const NAME_ELEMENTFOOTSTART: &'static str = "'</'";
	pub const NAME_TEXT: &'static str = "Text";
	pub const NAME_CDATASECTION: &'static str = "CDATA section";
	pub const NAME_COMMENT: &'static str = "Comment";
	pub const NAME_PROCESSINGINSTRUCTION: &'static str = "PI";
	pub const NAME_DOCTYPESTART: &'static str = "'<!DOCTYPE'";
	pub const NAME_ENTITYDECL: &'static str = "'<!ENTITY'";
	pub const NAME_DOCTYPEEND: &'static str = "']>'";
	pub const NAME_REFERENCE: &'static str = "Reference";

	/// Return a static string describing the token type.
	///
	/// This is intended for error messages.
	pub fn name(&self) -> &'static str {
		match self {
			Self::Name(..) => Self::NAME_NAME,
			Self::Eq(..) => Self::NAME_EQ,
			Self::AttributeValue(..) => Self::NAME_ATTRIBUTEVALUE,
			Self::XMLDeclEnd(..) => Self::NAME_XMLDECLEND,
			Self::ElementHeadClose(..) => Self::NAME_ELEMENTHEADCLOSE,
			Self::ElementHFEnd(..) => Self::NAME_ELEMENTHFEND,
			Self::XMLDeclStart(..) => Self::NAME_XMLDECLSTART,
			Self::ElementHeadStart(..) => Self::NAME_ELEMENTHEADSTART,
			Self::ElementFootStart(..) => Self::NAME_ELEMENTFOOTSTART,
			Self::Text(..) => Self::NAME_TEXT,
			Self::CDataSection(..) => Self::NAME_CDATASECTION,
			Self::Comment(..) => Self::NAME_COMMENT,
			Self::ProcessingInstruction(..) => Self::NAME_PROCESSINGINSTRUCTION,
			Self::DoctypeStart(..) => Self::NAME_DOCTYPESTART,
			Self::EntityDecl(..) => Self::NAME_ENTITYDECL,
			Self::DoctypeEnd(..) => Self::NAME_DOCTYPEEND,
			Self::Reference(..) => Self::NAME_REFERENCE,
		}
	}

	/// Return a reference to this tokens [`TokenMetrics`].
	pub fn metrics(&self) -> &TokenMetrics {
		match self {
			Self::Name(m, ..) => &m,
			Self::Eq(m) => &m,
			Self::AttributeValue(m, ..) => &m,
			Self::XMLDeclEnd(m) => &m,
			Self::ElementHeadClose(m) => &m,
			Self::ElementHFEnd(m) => &m,
			Self::XMLDeclStart(m) => &m,
			Self::ElementHeadStart(m, ..) => &m,
			Self::ElementFootStart(m, ..) => &m,
			Self::Text(m, ..) => &m,
			Self::CDataSection(m, ..) => &m,
			Self::Comment(m, ..) => &m,
			Self::ProcessingInstruction(m, ..) => &m,
			Self::DoctypeStart(m, ..) => &m,
			Self::EntityDecl(m, ..) => &m,
			Self::DoctypeEnd(m) => &m,
			Self::Reference(m, ..) => &m,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CharRefRadix {
	Decimal,
	Hexadecimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RefKind {
	Entity,
	Char(CharRefRadix),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementState {
	Start,
	Blank,
	Name,
	Eq,
	Close,
	/// Delimiter, Alphabet and whether we just read a CR, because of the mess
	/// which is CRLF -> LF normalization.
	AttributeValue(u8, &'static [ByteRange], bool),
	/// Encountered ?
	MaybeXMLDeclEnd,
	/// Encountered /
	MaybeHeadClose,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ElementKind {
	/// standard XML element head e.g. `<foo>`
	Header,
	/// standard XML element foot e.g. `</foo>`
	Footer,
	/// XML declaration e.g. `<?xml version='1.0'?>`
	XMLDecl,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum MaybeElementState {
	Initial,
	/// Encountered `<!`, the next byte decides between comment, CDATA
	/// section and document type declaration
	Bang,
	/// Encountered `<!-`, expecting the second `-`
	CommentStart,
	/// Number of correct CDATA section start characters
	CDataSectionStart(usize),
	/// Number of correct `<!DOCTYPE` characters
	DoctypeStart(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ContentState {
	Initial,
	/// Within cdata section
	CDataSection,
	/// Encountered <
	MaybeElement(MaybeElementState),
	/// only whitespace allowed, e.g. between ?> and <
	Whitespace,
	/// `]]>` sequence, either within cdata (true) or not (false)
	/// if not within cdata, encountering this sequence is illegal
	MaybeCDataEnd(bool, usize),
	/// `\r` read, we need to look ahead by one char to see if it is a `\n`
	/// before substituting
	///
	/// bool indicates whether we’re in a cdata section, because yes, this also applies to those
	MaybeCRLF(bool),
}

/// Where a comment or processing instruction was encountered, which decides
/// the state to return to once it is over.
#[derive(Debug, Clone, Copy, PartialEq)]
enum MiscContext {
	Content,
	Subset,
}

impl MiscContext {
	fn return_state(self) -> State {
		match self {
			Self::Content => State::Content(ContentState::Initial),
			Self::Subset => State::Doctype(DoctypeState::Subset),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CommentState {
	/// Comment contents; the flag indicates that the previous byte was a CR
	Data(bool),
	/// Number of consecutive `-` read (1 or 2)
	MaybeEnd(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PiState {
	/// Reading the target name
	Target,
	/// Whitespace after the target, before data (if any)
	AfterTarget,
	/// Instruction data; the flag indicates that the previous byte was a CR
	Data(bool),
	/// Encountered `?`
	MaybeEnd,
}

/// Which literal of an entity external identifier is being captured.
#[derive(Debug, Clone, Copy, PartialEq)]
enum EntityLiteral {
	Public,
	System,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EntityDeclState {
	/// Whitespace before the entity name (the byte after `<!ENTITY` has
	/// already been checked to be whitespace)
	BeforeName,
	Name,
	AfterName,
	/// Literal entity value: delimiter and CR flag
	Value(u8, bool),
	AfterValue,
	/// SYSTEM or PUBLIC keyword
	ExtKeyword,
	/// Whitespace before an external identifier literal
	ExtLiteralStart(EntityLiteral),
	ExtLiteral(EntityLiteral, u8),
	AfterExternalId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DoctypeState {
	/// Whitespace required between `<!DOCTYPE` and the name
	SpaceBeforeName,
	/// Whitespace seen, name has not started yet
	BeforeName,
	Name,
	/// After the name, before `[`, `>` or an external identifier
	AfterName,
	/// SYSTEM or PUBLIC keyword of the doctype external identifier
	ExternalKeyword,
	/// Whitespace before an external identifier literal; the counter is the
	/// number of literals which are still expected
	ExternalIdLiteralStart(u8),
	ExternalIdLiteral(u8, u8),
	/// Inside `[ .. ]`
	Subset,
	/// Encountered `<` inside the subset
	SubsetMarkupStart,
	/// Encountered `<!` inside the subset
	SubsetBang,
	/// Encountered `<!-` inside the subset
	SubsetCommentStart,
	/// Keyword of a markup declaration (ENTITY, ELEMENT, ATTLIST, NOTATION)
	DeclKeyword,
	/// Skipping a markup declaration which is not processed further; the
	/// inner value is the quote byte if the skip is inside a literal
	SkipDecl(Option<u8>),
	/// Encountered `]`, expecting whitespace and `>`
	AfterSubset,
	/// Final `>` has been read, emit the end token
	End,
	Entity(EntityDeclState),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum RefReturnState {
	AttributeValue(ElementKind, u8, &'static [ByteRange]),
	EntityValue(u8),
	Text,
}

impl RefReturnState {
	fn to_state(self) -> State {
		match self {
			Self::AttributeValue(kind, delim, selector) => State::Element{
				kind: kind,
				state: ElementState::AttributeValue(delim, selector, false),
			},
			Self::EntityValue(delim) => State::Doctype(DoctypeState::Entity(EntityDeclState::Value(delim, false))),
			Self::Text => State::Content(ContentState::Initial),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
	Content(ContentState),
	Element{ kind: ElementKind, state: ElementState },
	Comment{ ctx: MiscContext, state: CommentState },
	Pi{ ctx: MiscContext, state: PiState },
	Doctype(DoctypeState),

	/// encountered &
	Reference{ ctx: &'static str, ret: RefReturnState, kind: RefKind },

	Eof,
}

// longest valid decimal character reference is log(0x10ffff, 10) => 7
// longest valid hexadecimal character reference is 6.
const MAX_CHAR_REFERENCE_LENGTH: usize = 8usize;
// longest markup declaration keyword is NOTATION
const MAX_DECL_KEYWORD_LENGTH: usize = 10usize;

const TOK_XML_CDATA_START: &'static [u8] = b"<![CDATA[";
const TOK_XML_CDATA_END: &'static [u8] = b"]]>";
const TOK_XML_DOCTYPE_START: &'static [u8] = b"<!DOCTYPE";

/// Hold options to configure a [`Lexer`].
///
/// See also [`Lexer::with_options()`].
#[derive(Debug, Clone, PartialEq, Copy)]
pub struct LexerOptions {
	/// Maximum number of bytes which can form a token.
	///
	/// This exists to limit the memory use of the Lexer for tokens where the
	/// data needs to be buffered in memory (most notably
	/// [`Token::Text`] and [`Token::AttributeValue`]).
	///
	/// If token data exceeds this limit, it depends on the token type whether
	/// a partial token is emitted or the lexing fails with
	/// [`Error::Unsupported`](crate::Error::Unsupported): Text and CDATA
	/// section tokens are split and emitted in parts (and lexing continues),
	/// all other tokens exceeding this limit will cause an error.
	pub max_token_length: usize,
}

impl LexerOptions {
	/// Set the [`LexerOptions::max_token_length`] value.
	///
	/// # Example
	///
	/// ```
	/// use ixml::{Lexer, LexerOptions};
	/// let mut lexer = Lexer::with_options(LexerOptions::default().max_token_length(1024));
	/// ```
	pub fn max_token_length(mut self, v: usize) -> LexerOptions {
		self.max_token_length = v;
		self
	}
}

impl Default for LexerOptions {
	/// Constructs default lexer options.
	///
	/// The defaults are implementation-defined and should not be relied upon.
	fn default() -> Self {
		Self{
			max_token_length: 8192,
		}
	}
}

fn resolve_predefined_entity(name: &[u8]) -> Option<u8> {
	match name {
		b"amp" => Some(b'&'),
		b"lt" => Some(b'<'),
		b"gt" => Some(b'>'),
		b"apos" => Some(b'\''),
		b"quot" => Some(b'"'),
		_ => None,
	}
}

fn resolve_char_reference(s: &str, radix: CharRefRadix, into: &mut Vec<u8>) -> Result<()> {
	let radix = match radix {
		CharRefRadix::Decimal => 10,
		CharRefRadix::Hexadecimal => 16,
	};
	// cannot fail because the string is validated against the alphabet and limited in length by the lexer
	let codepoint = u32::from_str_radix(s, radix).unwrap();
	let ch = match std::char::from_u32(codepoint) {
		Some(ch) => ch,
		None => return Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_UNKNOWN, codepoint, true))),
	};
	if !CLASS_XML_NONCHAR.select(ch) {
		let mut buf = [0u8; 4];
		let s = ch.encode_utf8(&mut buf[..]);
		into.extend_from_slice(s.as_bytes());
		Ok(())
	} else {
		Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_UNKNOWN, codepoint, true)))
	}
}

fn add_context<T>(r: Result<T>, ctx: &'static str) -> Result<T> {
	r.or_else(|e| { Err(e.with_context(ctx)) })
}

fn handle_eof<T>(v: Option<T>, ctx: &'static str) -> Result<T> {
	v.ok_or_else(|| {
		Error::wfeof(ctx)
	})
}

struct ST(State, Option<Token>);

impl ST {
	fn splice<'a>(self, st: &'a mut State) -> Option<Token> {
		*st = self.0;
		self.1
	}
}


#[derive(Debug, Clone, PartialEq, Copy)]
enum Error {
	EndOfBuffer,
	NotWellFormed(WFError),
	InvalidUtf8Byte(u8),
	Unsupported(&'static str),
}

impl Error {
	fn wfeof(ctx: &'static str) -> Error {
		Error::NotWellFormed(WFError::InvalidEof(ctx))
	}

	fn utf8err(src: &[u8], e: &std::str::Utf8Error) -> Error {
		Error::InvalidUtf8Byte(src[e.valid_up_to()])
	}
}

impl ErrorWithContext for Error {
	fn with_context(self, ctx: &'static str) -> Self {
		match self {
			Self::EndOfBuffer => Self::EndOfBuffer,
			Self::NotWellFormed(e) => Self::NotWellFormed(e.with_context(ctx)),
			Self::InvalidUtf8Byte(b) => Self::InvalidUtf8Byte(b),
			Self::Unsupported(what) => Self::Unsupported(what),
		}
	}
}

impl From<WFError> for Error {
	fn from(other: WFError) -> Self {
		Self::NotWellFormed(other)
	}
}

impl From<ValidationError> for Error {
	fn from(other: ValidationError) -> Self {
		let e: WFError = other.into();
		e.into()
	}
}

impl From<Error> for crate::Error {
	fn from(other: Error) -> Self {
		match other {
			Error::EndOfBuffer => io::Error::new(io::ErrorKind::WouldBlock, "end of current buffer reached").into(),
			Error::NotWellFormed(e) => Self::NotWellFormed(e),
			Error::Unsupported(what) => Self::Unsupported(what),
			Error::InvalidUtf8Byte(b) => Self::InvalidUtf8Byte(b),
		}
	}
}

type Result<T> = std::result::Result<T, Error>;


/**
# XML 1.0 lexer

Tokenizes any XML 1.0 document, including comments, processing instructions
and the document type declaration with its internal subset. Constructs which
require DTD processing beyond entity declarations (parameter entities,
unparsed entities, conditional sections) are rejected with
[`Error::Unsupported`](crate::Error::Unsupported).
*/
pub struct Lexer {
	state: State,
	scratchpad: Vec<u8>,
	swap: Vec<u8>,
	ctr: usize,
	last_token_end: usize,
	/// offset of the `&` which opened the reference currently being lexed
	reference_start: usize,
	/// the bytes currently being lexed are entity replacement text; quote
	/// characters in replacement text do not terminate an attribute value
	/// (XML 1.0 § 4.4.5)
	in_replacement_text: bool,
	opts: LexerOptions,
	/// target of the processing instruction currently being lexed
	pi_target: Option<Name>,
	/// pieces of the entity declaration currently being lexed
	decl_name: Option<Name>,
	decl_value: Option<CData>,
	decl_public: Option<CData>,
	decl_system: Option<CData>,
	/// keep the scratchpad and state for debugging
	#[cfg(debug_assertions)]
	prev_state: (Vec<u8>, State),
	#[cfg(debug_assertions)]
	last_single_read: Option<u8>,
	err: Option<Error>,
	has_eof: bool,
}

impl Lexer {
	/// Construct a new Lexer based on [`LexerOptions::default()`].
	pub fn new() -> Self {
		Self::with_options(LexerOptions::default())
	}

	/// Construct a new Lexer with the given options.
	pub fn with_options(opts: LexerOptions) -> Self {
		Self {
			state: State::Content(ContentState::Initial),
			scratchpad: Vec::new(),
			swap: Vec::new(),
			ctr: 0,
			last_token_end: 0,
			reference_start: 0,
			in_replacement_text: false,
			opts: opts,
			pi_target: None,
			decl_name: None,
			decl_value: None,
			decl_public: None,
			decl_system: None,
			#[cfg(debug_assertions)]
			prev_state: (Vec::new(), State::Content(ContentState::Initial)),
			#[cfg(debug_assertions)]
			last_single_read: None,
			err: None,
			has_eof: false,
		}
	}

	fn demote_eof(&self, ep: Endbyte) -> Result<Endbyte> {
		match ep {
			Endbyte::Eof => if self.has_eof {
				Ok(Endbyte::Eof)
			} else {
				Err(Error::EndOfBuffer)
			},
			other => Ok(other),
		}
	}

	fn token_length_error() -> Error {
		Error::Unsupported("long name, reference or markup token")
	}

	fn eat_whitespace_metrics(&mut self, without: usize) -> () {
		self.last_token_end = self.ctr.wrapping_sub(without);
	}

	#[inline]
	fn prep_scratchpad(&mut self) {
		if self.scratchpad.capacity() < self.opts.max_token_length {
			// unless there is a bug, we should never exceed the capacity requested by max_token_length, so we go with reserve_exact
			self.scratchpad.reserve_exact(self.opts.max_token_length - self.scratchpad.capacity())
		}
	}

	fn read_validated<B: ByteSelect>(&mut self, r: &mut &[u8], selector: &B, limit: usize) -> Result<Endbyte> {
		let remaining = match limit.checked_sub(self.scratchpad.len()) {
			None => return Ok(Endbyte::Limit),
			Some(v) => v,
		};
		let old_len = self.scratchpad.len();
		self.prep_scratchpad();
		let ep = read_validated_bytes(
			r,
			selector,
			remaining,
			&mut self.scratchpad,
		);
		self.ctr = self.ctr.wrapping_add(self.scratchpad.len() - old_len);
		match ep {
			Endbyte::Delimiter(_) => self.ctr = self.ctr.wrapping_add(1),
			_ => (),
		}
		self.demote_eof(ep)
	}

	#[inline]
	fn read_single(&mut self, r: &mut &[u8]) -> Result<Option<u8>> {
		let last_read = match r.split_first() {
			Some((v, tail)) => {
				self.ctr = self.ctr.wrapping_add(1);
				*r = tail;
				Some(*v)
			},
			None => if self.has_eof {
				None
			} else {
				return Err(Error::EndOfBuffer)
			},
		};
		#[cfg(debug_assertions)]
		{
			self.last_single_read = last_read;
		}
		Ok(last_read)
	}

	#[inline]
	fn skip_matching<B: ByteSelect>(
		&mut self,
		r: &mut &[u8],
		selector: &B,
		) -> (usize, Result<Endbyte>)
	{
		let (nread, ep) = skip_matching_bytes(r, selector);
		self.ctr = self.ctr.wrapping_add(nread);
		match self.demote_eof(ep) {
			Ok(ep) => {
				if let Endbyte::Delimiter(_) = ep {
					self.ctr = self.ctr.wrapping_add(1)
				};
				(nread, Ok(ep))
			},
			Err(e) => (nread, Err(e)),
		}
	}

	fn drop_scratchpad(&mut self) -> Result<()> {
		self.scratchpad.clear();
		Ok(())
	}

	fn swap_scratchpad(&mut self) -> Result<()> {
		std::mem::swap(&mut self.scratchpad, &mut self.swap);
		Ok(())
	}

	fn read_swap(&mut self) -> Vec<u8> {
		let mut tmp = Vec::new();
		std::mem::swap(&mut tmp, &mut self.swap);
		tmp
	}

	/// Offset at which the token currently being lexed began (or at which
	/// the next token will begin, when none is in progress).
	pub(crate) fn next_token_start(&self) -> usize {
		self.last_token_end
	}

	/// Mark the bytes of subsequent `lex_bytes` calls as entity replacement
	/// text (or as literal input again).
	pub(crate) fn set_replacement_context(&mut self, active: bool) {
		self.in_replacement_text = active;
	}

	fn metrics(&mut self, without: usize) -> TokenMetrics {
		let start = self.last_token_end;
		let end = self.ctr.wrapping_sub(without);
		self.last_token_end = end;
		TokenMetrics{
			start: start,
			end: end,
		}
	}

	fn flush_scratchpad<U, T: FnOnce(&[u8]) -> Result<U>>(&mut self, conv: T) -> Result<U> {
		let result = conv(&self.scratchpad);
		self.scratchpad.clear();
		result
	}

	fn flush_scratchpad_as_name(&mut self) -> Result<Name> {
		self.flush_scratchpad(|bytes| -> Result<Name> {
			let s = match std::str::from_utf8(bytes) {
				Ok(s) => Ok(s),
				Err(e) => Err(Error::utf8err(bytes, &e)),
			}?;
			validate_name(s)?;
			Ok(unsafe { Name::from_string_unchecked(s) })
		})
	}

	fn flush_scratchpad_as_complete_cdata(&mut self) -> Result<CData> {
		self.flush_scratchpad(|bytes| -> Result<CData> {
			let s = match std::str::from_utf8(bytes) {
				Ok(s) => Ok(s),
				Err(e) => Err(Error::utf8err(bytes, &e)),
			}?;
			validate_cdata(s)?;
			Ok(unsafe { CData::from_string_unchecked(s) })
		})
	}

	fn flush_scratchpad_as_partial_cdata(&mut self) -> Result<CData> {
		let s = match std::str::from_utf8(&self.scratchpad[..]) {
			Ok(s) => s,
			Err(e) => {
				let valid_up_to = e.valid_up_to();
				if valid_up_to == 0 {
					// this means that we actually and truly have a broken utf-8 sequence.
					// return an error.
					return Err(Error::InvalidUtf8Byte(self.scratchpad[0]))
				} else {
					// okay, we can return the stuff up to here and then let the next call deal with it
					unsafe { std::str::from_utf8_unchecked(&self.scratchpad[..valid_up_to]) }
				}
			},
		};
		validate_cdata(s)?;
		let result = unsafe { CData::from_string_unchecked(s) };
		let to_drop = s.len();
		drop(s);
		self.scratchpad.drain(..to_drop);
		Ok(result)
	}

	fn maybe_flush_scratchpad_as_text(&mut self, without: usize) -> Result<Option<Token>> {
		if self.scratchpad.len() == 0 {
			self.eat_whitespace_metrics(without);
			Ok(None)
		} else {
			Ok(Some(Token::Text(self.metrics(without), self.flush_scratchpad_as_complete_cdata()?)))
		}
	}

	fn flush_limited_scratchpad_as_text(&mut self) -> Result<Option<Token>> {
		if self.scratchpad.len() >= self.opts.max_token_length {
			Ok(Some(Token::Text(self.metrics(0), self.flush_scratchpad_as_partial_cdata()?)))
		} else {
			Ok(None)
		}
	}

	fn maybe_flush_scratchpad_as_cdata_section(&mut self, without: usize) -> Result<Option<Token>> {
		if self.scratchpad.len() == 0 {
			self.eat_whitespace_metrics(without);
			Ok(None)
		} else {
			Ok(Some(Token::CDataSection(self.metrics(without), self.flush_scratchpad_as_complete_cdata()?)))
		}
	}

	fn flush_limited_scratchpad_as_cdata_section(&mut self) -> Result<Option<Token>> {
		if self.scratchpad.len() >= self.opts.max_token_length {
			Ok(Some(Token::CDataSection(self.metrics(0), self.flush_scratchpad_as_partial_cdata()?)))
		} else {
			Ok(None)
		}
	}

	/// Interpret a character found inside a text section.
	///
	/// If no interpretation can be found, an Ok result but no next state is
	/// returned.
	///
	/// THIS DOES NOT MEAN THAT THE CHAR IS VALID! IT MAY STILL BE A NUL
	/// BYTE OR SOMESUCH!
	fn lex_posttext_char(&mut self, b: u8) -> Result<Option<ST>> {
		match b {
			b'<' => Ok(Some(ST(
				State::Content(ContentState::MaybeElement(MaybeElementState::Initial)), self.maybe_flush_scratchpad_as_text(1)?,  // 1 == len("<")
			))),
			// begin of forbidden CDATA section end sequence (see XML 1.0 § 2.4 [14])
			b']' => Ok(Some(ST(
				State::Content(ContentState::MaybeCDataEnd(false, 1)),
				// no flush here to avoid needless reallocations on false alarm
				None,
			))),
			b'&' => {
				// We need to be careful here! First, we *have* to swap the scratchpad because that is part of the contract with the Reference state.
				// Second, we have to do this *after* we "maybe" flush the scratchpad as text -- otherwise, we would flush the empty text and then clobber the entity lookup.
				let tok = self.maybe_flush_scratchpad_as_text(1)?;  // 1 == len("&")
				self.reference_start = self.ctr.wrapping_sub(1);
				self.swap_scratchpad()?;
				Ok(Some(ST(
					State::Reference{
						ctx: ERRCTX_TEXT,
						ret: RefReturnState::Text,
						kind: RefKind::Entity,
					},
					tok,
				)))
			},
			b'\r' => {
				// CRLF needs to be folded to LF, and standalone LF needs, too
				Ok(Some(ST(
					State::Content(ContentState::MaybeCRLF(false)),
					None,
				)))
			},
			_ => Ok(None),
		}
	}

	fn lex_maybe_element(&mut self, state: MaybeElementState, r: &mut &[u8]) -> Result<ST> {
		match state {
			MaybeElementState::Initial => match self.read_single(r)? {
				Some(byte) => match byte {
					b'?' => {
						self.drop_scratchpad()?;
						Ok(ST(
							State::Pi{
								ctx: MiscContext::Content,
								state: PiState::Target,
							},
							None,
						))
					},
					b'!' => {
						self.drop_scratchpad()?;
						Ok(ST(
							State::Content(ContentState::MaybeElement(MaybeElementState::Bang)),
							None,
						))
					}
					b'/' => {
						self.drop_scratchpad()?;
						Ok(ST(
							State::Element{
								kind: ElementKind::Footer,
								state: ElementState::Start,
							},
							None,
						))
					},
					byte => if CLASS_XML_NAMESTART_BYTE.select(byte) {
						// add the first character to the scratchpad, because read_single does not do that
						self.prep_scratchpad();
						self.scratchpad.push(byte);
						Ok(ST(
							State::Element{
								kind: ElementKind::Header,
								state: ElementState::Start,
							},
							None,
						))
					} else {
						self.drop_scratchpad()?;
						Err(Error::NotWellFormed(WFError::UnexpectedByte(ERRCTX_NAMESTART, byte, None)))
					},
				},
				None => Err(Error::wfeof(ERRCTX_ELEMENT)),
			},
			MaybeElementState::Bang => match handle_eof(self.read_single(r)?, ERRCTX_ELEMENT)? {
				b'-' => Ok(ST(
					State::Content(ContentState::MaybeElement(MaybeElementState::CommentStart)),
					None,
				)),
				b'[' => Ok(ST(
					State::Content(ContentState::MaybeElement(MaybeElementState::CDataSectionStart(3))),
					None,
				)),
				b'D' => Ok(ST(
					State::Content(ContentState::MaybeElement(MaybeElementState::DoctypeStart(3))),
					None,
				)),
				b => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_ELEMENT,
					b,
					Some(&["-", "[", "D"]),
				))),
			},
			MaybeElementState::CommentStart => match handle_eof(self.read_single(r)?, ERRCTX_COMMENT)? {
				b'-' => {
					// see the CDATA section below for why the metrics are
					// eaten here
					self.eat_whitespace_metrics(4);
					Ok(ST(
						State::Comment{
							ctx: MiscContext::Content,
							state: CommentState::Data(false),
						},
						None,
					))
				},
				b => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_COMMENT,
					b,
					Some(&["-"]),
				))),
			},
			MaybeElementState::CDataSectionStart(i) => {
				debug_assert!(i < TOK_XML_CDATA_START.len());
				let b = handle_eof(self.read_single(r)?, ERRCTX_CDATA_SECTION_START)?;
				if b != TOK_XML_CDATA_START[i] {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax("malformed cdata section start")));
				}
				let next = i + 1;
				if next == TOK_XML_CDATA_START.len() {
					self.drop_scratchpad()?;
					// the pending text was flushed at the `<` already; this
					// realigns the metrics so that the section contents span
					// the entire `<![CDATA[ .. ]]>` construct
					Ok(ST(
						State::Content(ContentState::CDataSection),
						self.maybe_flush_scratchpad_as_text(TOK_XML_CDATA_START.len())?,
					))
				} else {
					Ok(ST(
						State::Content(ContentState::MaybeElement(MaybeElementState::CDataSectionStart(next))), None,
					))
				}
			},
			MaybeElementState::DoctypeStart(i) => {
				debug_assert!(i < TOK_XML_DOCTYPE_START.len());
				let b = handle_eof(self.read_single(r)?, ERRCTX_DOCTYPE)?;
				if b != TOK_XML_DOCTYPE_START[i] {
					return Err(Error::NotWellFormed(WFError::InvalidSyntax("malformed document type declaration start")));
				}
				let next = i + 1;
				if next == TOK_XML_DOCTYPE_START.len() {
					self.drop_scratchpad()?;
					Ok(ST(
						State::Doctype(DoctypeState::SpaceBeforeName),
						None,
					))
				} else {
					Ok(ST(
						State::Content(ContentState::MaybeElement(MaybeElementState::DoctypeStart(next))), None,
					))
				}
			},
		}
	}

	fn lex_resume_text(&mut self, b: u8) -> Result<ST> {
		match self.lex_posttext_char(b)? {
			// special delimiter char -> state transition
			Some(st) => Ok(st),
			// no special char -> check if it is possibly valid text and proceed accordingly
			None => if CLASS_XML_MAY_NONCHAR_BYTE.select(b) {
				// non-Char, error
				Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_TEXT, b as u32, false)))
			} else {
				// nothing special, push to scratchpad and return to initial content state
				self.prep_scratchpad();
				self.scratchpad.push(b);
				Ok(ST(
					State::Content(ContentState::Initial),
					None,
				))
			},
		}
	}

	fn lex_maybe_cdata_end(&mut self, in_cdata: bool, nend: usize, r: &mut &[u8]) -> Result<ST> {
		debug_assert!(nend < TOK_XML_CDATA_END.len());
		let ctx = if in_cdata {
			ERRCTX_CDATA_SECTION
		} else {
			ERRCTX_TEXT
		};
		let b = handle_eof(self.read_single(r)?, ctx)?;
		let expected = TOK_XML_CDATA_END[nend];
		if b == expected {
			// sequence continues
			match nend {
				1 => Ok(ST(
					State::Content(ContentState::MaybeCDataEnd(in_cdata, 2)),
					None,
				)),
				// ]]> read completely! Do something!
				2 => if !in_cdata {
					// ]]> is forbidden outside CDATA sections -> error
					Err(Error::NotWellFormed(WFError::InvalidSyntax("unescaped ']]>' forbidden in text")))
				} else {
					// we are inside the cdata section and the previous char we read was the last byte of the closing delimiter
					// this means that we can safely exit without interpreting the char.
					// and we must not subtract this char, because it is part of the CDATA section
					Ok(ST(
						State::Content(ContentState::Initial),
						self.maybe_flush_scratchpad_as_cdata_section(0)?,
					))
				},
				_ => panic!("unreachable state: cdata nend = {:?}", nend),
			}
		} else if b == b']' {
			// sequence was broken, but careful! this could just be `]]]]]]]>` sequence!
			// those we need to treat the same, no matter whether inside or outside CDATA the previously found ] is moved to the scratchpad and we return to this state
			self.prep_scratchpad();
			self.scratchpad.push(b']');
			Ok(ST(
				State::Content(ContentState::MaybeCDataEnd(in_cdata, nend)),
				if in_cdata {
					self.flush_limited_scratchpad_as_cdata_section()?
				} else {
					self.flush_limited_scratchpad_as_text()?
				},
			))
		} else {
			// sequence was broken
			self.prep_scratchpad();
			self.scratchpad.extend_from_slice(&TOK_XML_CDATA_END[..nend]);
			if in_cdata {
				if CLASS_XML_MAY_NONCHAR_BYTE.select(b) {
					// that’s a sneaky one!
					Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_CDATA_SECTION, b as u32, false)))
				} else {
					// broken sequence inside cdata section, that’s fine; just push whatever we read to the scratchpad and move on
					// no need for prep, we pushed above already
					self.scratchpad.push(b);
					Ok(ST(
						State::Content(ContentState::CDataSection),
						// enforce token size limits here, too
						self.flush_limited_scratchpad_as_cdata_section()?,
					))
				}
			} else {
				// broken sequence outside cdata section, need to analyze the next char carefully to handle entities and such
				self.lex_resume_text(b)
			}
		}
	}

	fn lex_content(&mut self, state: ContentState, r: &mut &[u8]) -> Result<ST>
	{
		match state {
			ContentState::MaybeElement(substate) => self.lex_maybe_element(substate, r),
			ContentState::MaybeCDataEnd(in_cdata, nend) => self.lex_maybe_cdata_end(in_cdata, nend, r),

			ContentState::MaybeCRLF(in_cdata) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_TEXT)?;
				match b {
					b'\n' => {
						// CRLF sequence, only insert the \n to the scratchpad.
						self.prep_scratchpad();
						self.scratchpad.push(b'\n');
						// return to the content state and curse a bit
						Ok(ST(
							if in_cdata {
								State::Content(ContentState::CDataSection)
							} else {
								State::Content(ContentState::Initial)
							},
							None,
						))
					},
					b'\r' => {
						// double CR, so this may still be followed by an LF; but the first CR gets converted to LF
						self.prep_scratchpad();
						self.scratchpad.push(b'\n');
						// stay in the same state, we may still get an LF here.
						Ok(ST(
							State::Content(ContentState::MaybeCRLF(in_cdata)),
							None,
						))
					},
					b => {
						// we read a single CR, so we push a \n to the scratchpad and hope for the best
						self.prep_scratchpad();
						self.scratchpad.push(b'\n');
						if in_cdata {
							// only special thing in CDATA is ']'
							if b == b']' {
								Ok(ST(
									State::Content(ContentState::MaybeCDataEnd(true, 1)),
									None,
								))
							} else if !CLASS_XML_MAY_NONCHAR_BYTE.select(b) {
								// ^ but of course we still need to check for a valid char. Thanks afl.
								// no need for prep as we pushed above already
								self.scratchpad.push(b);
								Ok(ST(
									State::Content(ContentState::CDataSection),
									None,
								))
							} else {
								Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_CDATA_SECTION, b as u32, false)))
							}
						} else {
							self.lex_resume_text(b)
						}
					},
				}
			},

			// read until next `<` or `&`, which are the only things which
			// can break us out of this state.
			ContentState::Initial => match self.read_validated(r, &CLASS_XML_TEXT_DELIMITED_BYTE, self.opts.max_token_length)? {
				Endbyte::Eof => {
					Ok(ST(
						State::Eof,
						self.maybe_flush_scratchpad_as_text(0)?,
					))
				},
				Endbyte::Limit => {
					Ok(ST(
						State::Content(ContentState::Initial),
						self.maybe_flush_scratchpad_as_text(0)?,
					))
				},
				Endbyte::Delimiter(b) => match self.lex_posttext_char(b)? {
					Some(st) => Ok(st),
					// not a "special" char but not text either -> error
					None => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_TEXT, b as u32, false))),
				},
			},
			ContentState::CDataSection => match self.read_validated(r, &CLASS_XML_CDATA_CDATASECTION_DELIMITED_BYTE, self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_CDATA_SECTION)),
				Endbyte::Limit => Ok(ST(
					State::Content(ContentState::CDataSection),
					self.maybe_flush_scratchpad_as_cdata_section(0)?,
				)),
				// -> transition into the "first delimiter found" state
				Endbyte::Delimiter(b) => match b {
					b']' => Ok(ST(
						State::Content(ContentState::MaybeCDataEnd(true, 1)),
						None,
					)),
					b'\r' => Ok(ST(
						State::Content(ContentState::MaybeCRLF(true)),
						None,
					)),
					_ => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_CDATA_SECTION, b as u32, false)))
				}
			},
			ContentState::Whitespace => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => {
					Ok(ST(
						State::Eof,
						None,
					))
				},
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'<' => Ok(ST(
						State::Content(ContentState::MaybeElement(MaybeElementState::Initial)), None,
					)),
					_ => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_XML_DECL_END,
						b,
						Some(&["Spaces", "<"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
		}
	}

	fn lex_element_postblank(&mut self, kind: ElementKind, b: u8) -> Result<ElementState> {
		match b {
			b' ' | b'\t' | b'\r' | b'\n' => Ok(ElementState::Blank),
			b'"' => Ok(ElementState::AttributeValue(b'"', &CLASS_XML_CDATA_ATT_QUOT_DELIMITED_BYTE, false)),
			b'\'' => Ok(ElementState::AttributeValue(b'\'', &CLASS_XML_CDATA_ATT_APOS_DELIMITED_BYTE, false)),
			b'=' => Ok(ElementState::Eq),
			b'>' => match kind {
				ElementKind::Footer | ElementKind::Header => Ok(ElementState::Close),
				ElementKind::XMLDecl => Err(Error::NotWellFormed(WFError::UnexpectedChar(ERRCTX_XML_DECL, '>', Some(&["?"])))),
			}
			b'?' => match kind {
				ElementKind::XMLDecl => Ok(ElementState::MaybeXMLDeclEnd),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedChar(ERRCTX_ELEMENT, '?', None))),
			},
			b'/' => match kind {
				ElementKind::Header => Ok(ElementState::MaybeHeadClose),
				ElementKind::Footer => Err(Error::NotWellFormed(WFError::UnexpectedChar(ERRCTX_ELEMENT_FOOT, '/', None))),
				ElementKind::XMLDecl => Err(Error::NotWellFormed(WFError::UnexpectedChar(ERRCTX_XML_DECL, '/', None))),
			},
			b if CLASS_XML_NAMESTART_BYTE.select(b) => {
				// write the char to scratchpad because it’ll be needed.
				self.prep_scratchpad();
				self.scratchpad.push(b);
				Ok(ElementState::Name)
			},
			_ => Err(Error::NotWellFormed(WFError::UnexpectedByte(
				match kind {
					ElementKind::XMLDecl => ERRCTX_XML_DECL,
					_ => ERRCTX_ELEMENT,
				},
				b,
				Some(&["whitespace", "\"", "'", "=", ">", "?", "/", "start of name"]),
			))),
		}
	}

	fn lex_attval_next(&mut self, delim: u8, selector: &'static [ByteRange], b: u8, element_kind: ElementKind) -> Result<ST> {
		match b {
			b'<' => Err(Error::NotWellFormed(WFError::UnexpectedChar(ERRCTX_ATTVAL, '<', None))),
			b'&' => {
				// must swap scratchpad here to avoid clobbering the
				// attribute value during entity read
				self.reference_start = self.ctr.wrapping_sub(1);
				self.swap_scratchpad()?;
				Ok(ST(
					State::Reference{
						ctx: ERRCTX_ATTVAL,
						ret: RefReturnState::AttributeValue(
							element_kind,
							delim,
							selector,
						),
						kind: RefKind::Entity,
					}, None
				))
			},
			b'\t' | b'\n' => {
				self.prep_scratchpad();
				self.scratchpad.push(b' ');
				Ok(ST(
					State::Element{
						kind: element_kind,
						state: ElementState::AttributeValue(delim, selector, false),
					},
					None,
				))
			},
			b'\r' => {
				Ok(ST(
					State::Element{
						kind: element_kind,
						state: ElementState::AttributeValue(delim, selector, true),
					},
					None,
				))
			},
			d if d == delim => {
				if self.in_replacement_text {
					// a quote arriving via entity replacement is included
					// in the literal, it does not close it
					// (XML 1.0 § 4.4.5)
					self.prep_scratchpad();
					self.scratchpad.push(d);
					return Ok(ST(
						State::Element{
							kind: element_kind,
							state: ElementState::AttributeValue(delim, selector, false),
						},
						None,
					));
				}
				Ok(ST(
					State::Element{
						kind: element_kind,
						state: ElementState::Blank,
					},
					Some(Token::AttributeValue(self.metrics(0), self.flush_scratchpad_as_complete_cdata()?)),
				))
			},
			other => Err(Error::NotWellFormed(WFError::InvalidChar(
				ERRCTX_ATTVAL,
				other as u32,
				false,
			)))
		}
	}

	fn lex_element(&mut self, kind: ElementKind, state: ElementState, r: &mut &[u8]) -> Result<ST> {
		match state {
			ElementState::Start | ElementState::Name => {
				if self.scratchpad.len() == 0 {
					// we are reading the first char; the first one is special because it must match CLASS_XML_NAMESTART, and not just CLASS_XML_NAME
					let b = handle_eof(self.read_single(r)?, ERRCTX_NAME)?;
					if !CLASS_XML_NAMESTART_BYTE.select(b) {
						Err(Error::NotWellFormed(WFError::UnexpectedByte(ERRCTX_NAME, b, None)))
					} else {
						self.prep_scratchpad();
						self.scratchpad.push(b);
						// continue in the same state; the branch below will be taken next and read_validated will take care of it if we’re done already
						Ok(ST(
							State::Element{
								kind: kind,
								state: state,
							},
							None,
						))
					}
				} else {
					match self.read_validated(r, &CLASS_XML_NAME_BYTE, self.opts.max_token_length)? {
						Endbyte::Eof => Err(Error::wfeof(ERRCTX_NAME)),
						Endbyte::Limit => Err(Self::token_length_error()),
						Endbyte::Delimiter(ch) => {
							let next_state = self.lex_element_postblank(kind, ch)?;
							let name = self.flush_scratchpad_as_name()?;
							let metrics = self.metrics(1);
							Ok(ST(
								State::Element{
									kind: kind,
									state: next_state,
								},
								Some(if state == ElementState::Name {
									Token::Name(metrics, name)
								} else {
									match kind {
										ElementKind::Header => Token::ElementHeadStart(metrics, name),
										ElementKind::Footer => Token::ElementFootStart(metrics, name),
										ElementKind::XMLDecl => panic!("invalid state"),
									}
								}),
							))
						}
					}
				}
			},
			ElementState::Blank => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_ELEMENT)),
				(_, Ok(Endbyte::Delimiter(b))) => {
					self.eat_whitespace_metrics(1);
					let next_state = self.lex_element_postblank(kind, b)?;
					Ok(ST(
						State::Element{
							kind: kind,
							state: next_state,
						},
						None,
					))
				},
				(_, Err(e)) => Err(e),
			},
			// XML 1.0 §2.3 [10] AttValue
			ElementState::AttributeValue(delim, selector, false) => match self.read_validated(r, &selector, self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_ATTVAL)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => self.lex_attval_next(delim, selector, b, kind),
			},
			// CRLF normalization for attributes; cannot reuse the content mechanism here because we have to carry around the delimiter and stuff
			ElementState::AttributeValue(delim, selector, true) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_ATTVAL)?;
				match b {
					b'\r' => {
						// the pending CR folds into a space, and the new one stays pending
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						Ok(ST(
							State::Element{
								kind: kind,
								state: ElementState::AttributeValue(delim, selector, true),
							},
							None,
						))
					},
					b'\n' => {
						// CRLF pair folds into a single space
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						Ok(ST(
							State::Element{
								kind: kind,
								state: ElementState::AttributeValue(delim, selector, false),
							},
							None,
						))
					},
					b if selector.select(b) => {
						// plain value byte after a bare CR
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						self.scratchpad.push(b);
						Ok(ST(
							State::Element{
								kind: kind,
								state: ElementState::AttributeValue(delim, selector, false),
							},
							None,
						))
					},
					b => {
						self.prep_scratchpad();
						self.scratchpad.push(b' ');
						self.lex_attval_next(delim, selector, b, kind)
					},
				}
			},
			ElementState::MaybeXMLDeclEnd => match self.read_single(r)? {
				Some(b) if b == b'>' => {
					self.drop_scratchpad()?;
					Ok(ST(
						State::Content(ContentState::Whitespace),
						Some(Token::XMLDeclEnd(self.metrics(0))),
					))
				},
				Some(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_XML_DECL_END,
					b,
					Some(&[">"]),
				))),
				None => Err(Error::wfeof(ERRCTX_XML_DECL_END)),
			},
			ElementState::MaybeHeadClose => match self.read_single(r)? {
				Some(b) if b == b'>' => {
					self.drop_scratchpad()?;
					Ok(ST(
						State::Content(ContentState::Initial),
						Some(Token::ElementHeadClose(self.metrics(0))),
					))
				},
				Some(b) => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_ELEMENT_CLOSE,
					b,
					Some(&[">"]),
				))),
				None => Err(Error::wfeof(ERRCTX_ELEMENT_CLOSE)),
			},
			// do NOT read anything here; this state is entered when
			// another state has read a '='. We can always transition to
			// Blank afterward, as that will read the next char and decide
			// (and potentially scratchpad) correctly.
			ElementState::Eq => Ok(ST(
				State::Element{
					kind: kind,
					state: ElementState::Blank,
				},
				Some(Token::Eq(self.metrics(0))),
			)),
			// like with Eq, no read here
			ElementState::Close => Ok(ST(
				State::Content(ContentState::Initial),
				Some(Token::ElementHFEnd(self.metrics(0))),
			)),
		}
	}

	fn lex_comment(&mut self, ctx: MiscContext, state: CommentState, r: &mut &[u8]) -> Result<ST> {
		match state {
			CommentState::Data(false) => match self.read_validated(r, &CLASS_XML_COMMENT_DELIMITED_BYTE, self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_COMMENT)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => match b {
					b'-' => Ok(ST(
						State::Comment{ctx: ctx, state: CommentState::MaybeEnd(1)},
						None,
					)),
					b'\r' => Ok(ST(
						State::Comment{ctx: ctx, state: CommentState::Data(true)},
						None,
					)),
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_COMMENT, other as u32, false))),
				},
			},
			CommentState::Data(true) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_COMMENT)?;
				// the pending CR folds into a line feed in any case
				self.prep_scratchpad();
				self.scratchpad.push(b'\n');
				match b {
					b'\n' => Ok(ST(
						State::Comment{ctx: ctx, state: CommentState::Data(false)},
						None,
					)),
					b'\r' => Ok(ST(
						State::Comment{ctx: ctx, state: CommentState::Data(true)},
						None,
					)),
					b'-' => Ok(ST(
						State::Comment{ctx: ctx, state: CommentState::MaybeEnd(1)},
						None,
					)),
					b if CLASS_XML_COMMENT_DELIMITED_BYTE.select(b) => {
						self.scratchpad.push(b);
						Ok(ST(
							State::Comment{ctx: ctx, state: CommentState::Data(false)},
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_COMMENT, other as u32, false))),
				}
			},
			CommentState::MaybeEnd(1) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_COMMENT)?;
				match b {
					b'-' => Ok(ST(
						State::Comment{ctx: ctx, state: CommentState::MaybeEnd(2)},
						None,
					)),
					b'\r' => {
						self.prep_scratchpad();
						self.scratchpad.push(b'-');
						Ok(ST(
							State::Comment{ctx: ctx, state: CommentState::Data(true)},
							None,
						))
					},
					b if CLASS_XML_COMMENT_DELIMITED_BYTE.select(b) => {
						self.prep_scratchpad();
						self.scratchpad.push(b'-');
						self.scratchpad.push(b);
						Ok(ST(
							State::Comment{ctx: ctx, state: CommentState::Data(false)},
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_COMMENT, other as u32, false))),
				}
			},
			CommentState::MaybeEnd(_) => match handle_eof(self.read_single(r)?, ERRCTX_COMMENT)? {
				b'>' => {
					let data = self.flush_scratchpad_as_complete_cdata()?;
					Ok(ST(
						ctx.return_state(),
						Some(Token::Comment(self.metrics(0), data)),
					))
				},
				// XML 1.0 § 2.5: `--` does not occur inside comments
				_ => Err(Error::NotWellFormed(WFError::InvalidSyntax("'--' forbidden inside comment"))),
			},
		}
	}

	fn lex_pi(&mut self, ctx: MiscContext, state: PiState, r: &mut &[u8]) -> Result<ST> {
		match state {
			PiState::Target => {
				if self.scratchpad.len() == 0 {
					let b = handle_eof(self.read_single(r)?, ERRCTX_PI)?;
					if !CLASS_XML_NAMESTART_BYTE.select(b) {
						return Err(Error::NotWellFormed(WFError::UnexpectedByte(ERRCTX_PI, b, None)));
					}
					self.prep_scratchpad();
					self.scratchpad.push(b);
					Ok(ST(
						State::Pi{ctx: ctx, state: PiState::Target},
						None,
					))
				} else {
					match self.read_validated(r, &CLASS_XML_NAME_BYTE, self.opts.max_token_length)? {
						Endbyte::Eof => Err(Error::wfeof(ERRCTX_PI)),
						Endbyte::Limit => Err(Self::token_length_error()),
						Endbyte::Delimiter(b) => {
							let target = self.flush_scratchpad_as_name()?;
							if target.as_str() == "xml" {
								if ctx != MiscContext::Content {
									return Err(Error::NotWellFormed(WFError::InvalidSyntax("xml declaration inside internal subset")));
								}
								let metrics = self.metrics(1);
								let next = match b {
									b' ' | b'\t' | b'\r' | b'\n' => ElementState::Blank,
									b'?' => ElementState::MaybeXMLDeclEnd,
									other => return Err(Error::NotWellFormed(WFError::UnexpectedByte(ERRCTX_XML_DECL, other, None))),
								};
								Ok(ST(
									State::Element{
										kind: ElementKind::XMLDecl,
										state: next,
									},
									Some(Token::XMLDeclStart(metrics)),
								))
							} else if target.as_str().eq_ignore_ascii_case("xml") {
								// XML 1.0 § 2.6: target names matching
								// (('X'|'x')('M'|'m')('L'|'l')) are reserved
								Err(Error::NotWellFormed(WFError::InvalidSyntax("reserved processing instruction target")))
							} else {
								self.pi_target = Some(target);
								match b {
									b' ' | b'\t' | b'\r' | b'\n' => Ok(ST(
										State::Pi{ctx: ctx, state: PiState::AfterTarget},
										None,
									)),
									b'?' => Ok(ST(
										State::Pi{ctx: ctx, state: PiState::MaybeEnd},
										None,
									)),
									other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
										ERRCTX_PI,
										other,
										Some(&["whitespace", "?"]),
									))),
								}
							}
						},
					}
				}
			},
			PiState::AfterTarget => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_PI)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'?' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::MaybeEnd},
						None,
					)),
					b'\r' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::Data(true)},
						None,
					)),
					b if CLASS_XML_PI_DELIMITED_BYTE.select(b) => {
						self.prep_scratchpad();
						self.scratchpad.push(b);
						Ok(ST(
							State::Pi{ctx: ctx, state: PiState::Data(false)},
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_PI, other as u32, false))),
				},
				(_, Err(e)) => Err(e),
			},
			PiState::Data(false) => match self.read_validated(r, &CLASS_XML_PI_DELIMITED_BYTE, self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_PI)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => match b {
					b'?' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::MaybeEnd},
						None,
					)),
					b'\r' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::Data(true)},
						None,
					)),
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_PI, other as u32, false))),
				},
			},
			PiState::Data(true) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_PI)?;
				self.prep_scratchpad();
				self.scratchpad.push(b'\n');
				match b {
					b'\n' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::Data(false)},
						None,
					)),
					b'\r' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::Data(true)},
						None,
					)),
					b'?' => Ok(ST(
						State::Pi{ctx: ctx, state: PiState::MaybeEnd},
						None,
					)),
					b if CLASS_XML_PI_DELIMITED_BYTE.select(b) => {
						self.scratchpad.push(b);
						Ok(ST(
							State::Pi{ctx: ctx, state: PiState::Data(false)},
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_PI, other as u32, false))),
				}
			},
			PiState::MaybeEnd => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_PI)?;
				match b {
					b'>' => {
						let target = match self.pi_target.take() {
							Some(t) => t,
							None => panic!("processing instruction state without target"),
						};
						let data = if self.scratchpad.len() > 0 {
							Some(self.flush_scratchpad_as_complete_cdata()?)
						} else {
							None
						};
						Ok(ST(
							ctx.return_state(),
							Some(Token::ProcessingInstruction(self.metrics(0), target, data)),
						))
					},
					b'?' => {
						// only the final `?` belongs to the delimiter
						self.prep_scratchpad();
						self.scratchpad.push(b'?');
						Ok(ST(
							State::Pi{ctx: ctx, state: PiState::MaybeEnd},
							None,
						))
					},
					b'\r' => {
						self.prep_scratchpad();
						self.scratchpad.push(b'?');
						Ok(ST(
							State::Pi{ctx: ctx, state: PiState::Data(true)},
							None,
						))
					},
					b if CLASS_XML_PI_DELIMITED_BYTE.select(b) => {
						self.prep_scratchpad();
						self.scratchpad.push(b'?');
						self.scratchpad.push(b);
						Ok(ST(
							State::Pi{ctx: ctx, state: PiState::Data(false)},
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_PI, other as u32, false))),
				}
			},
		}
	}

	fn entity_value_selector(delim: u8) -> &'static [ByteRange] {
		if delim == b'"' {
			&CLASS_XML_ENTITY_VALUE_QUOT_DELIMITED_BYTE
		} else {
			&CLASS_XML_ENTITY_VALUE_APOS_DELIMITED_BYTE
		}
	}

	fn literal_selector(delim: u8) -> &'static [ByteRange] {
		if delim == b'"' {
			&CLASS_XML_LITERAL_QUOT_DELIMITED_BYTE
		} else {
			&CLASS_XML_LITERAL_APOS_DELIMITED_BYTE
		}
	}

	fn lex_entity_value_next(&mut self, delim: u8, b: u8) -> Result<ST> {
		match b {
			b'&' => {
				// like in attribute values, the scratchpad must be swapped
				// to keep the partial literal safe during the reference read
				self.reference_start = self.ctr.wrapping_sub(1);
				self.swap_scratchpad()?;
				Ok(ST(
					State::Reference{
						ctx: ERRCTX_ENTITY_DECL,
						ret: RefReturnState::EntityValue(delim),
						kind: RefKind::Entity,
					},
					None,
				))
			},
			b'%' => Err(Error::Unsupported("parameter entities")),
			b'\r' => Ok(ST(
				State::Doctype(DoctypeState::Entity(EntityDeclState::Value(delim, true))),
				None,
			)),
			d if d == delim => {
				self.decl_value = Some(self.flush_scratchpad_as_complete_cdata()?);
				Ok(ST(
					State::Doctype(DoctypeState::Entity(EntityDeclState::AfterValue)),
					None,
				))
			},
			other => Err(Error::NotWellFormed(WFError::InvalidChar(
				ERRCTX_ENTITY_DECL,
				other as u32,
				false,
			))),
		}
	}

	fn take_entity_decl(&mut self) -> (Name, EntityDef) {
		let name = match self.decl_name.take() {
			Some(v) => v,
			None => panic!("entity declaration state without name"),
		};
		let def = match self.decl_value.take() {
			Some(v) => EntityDef::Internal(v),
			None => EntityDef::External{
				public_id: self.decl_public.take(),
				system_id: match self.decl_system.take() {
					Some(v) => v,
					None => panic!("external entity declaration without system id"),
				},
			},
		};
		(name, def)
	}

	fn lex_entity_decl(&mut self, state: EntityDeclState, r: &mut &[u8]) -> Result<ST> {
		match state {
			EntityDeclState::BeforeName => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'%' => Err(Error::Unsupported("parameter entities")),
					b if CLASS_XML_NAMESTART_BYTE.select(b) => {
						self.prep_scratchpad();
						self.scratchpad.push(b);
						Ok(ST(
							State::Doctype(DoctypeState::Entity(EntityDeclState::Name)),
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(ERRCTX_ENTITY_DECL, other, None))),
				},
				(_, Err(e)) => Err(e),
			},
			EntityDeclState::Name => match self.read_validated(r, &CLASS_XML_NAME_BYTE, self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => match b {
					b' ' | b'\t' | b'\r' | b'\n' => {
						self.decl_name = Some(self.flush_scratchpad_as_name()?);
						Ok(ST(
							State::Doctype(DoctypeState::Entity(EntityDeclState::AfterName)),
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ENTITY_DECL,
						other,
						Some(&["whitespace"]),
					))),
				},
			},
			EntityDeclState::AfterName => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'"' | b'\'' => Ok(ST(
						State::Doctype(DoctypeState::Entity(EntityDeclState::Value(b, false))),
						None,
					)),
					b if CLASS_XML_DECL_KEYWORD_BYTE.select(b) => {
						self.prep_scratchpad();
						self.scratchpad.push(b);
						Ok(ST(
							State::Doctype(DoctypeState::Entity(EntityDeclState::ExtKeyword)),
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ENTITY_DECL,
						other,
						Some(&["\"", "'", "SYSTEM", "PUBLIC"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
			EntityDeclState::Value(delim, false) => match self.read_validated(r, &Self::entity_value_selector(delim), self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => self.lex_entity_value_next(delim, b),
			},
			EntityDeclState::Value(delim, true) => {
				let b = handle_eof(self.read_single(r)?, ERRCTX_ENTITY_DECL)?;
				// pending CR folds into a line feed
				self.prep_scratchpad();
				self.scratchpad.push(b'\n');
				match b {
					b'\n' => Ok(ST(
						State::Doctype(DoctypeState::Entity(EntityDeclState::Value(delim, false))),
						None,
					)),
					b'\r' => Ok(ST(
						State::Doctype(DoctypeState::Entity(EntityDeclState::Value(delim, true))),
						None,
					)),
					b if Self::entity_value_selector(delim).select(b) => {
						self.scratchpad.push(b);
						Ok(ST(
							State::Doctype(DoctypeState::Entity(EntityDeclState::Value(delim, false))),
							None,
						))
					},
					b => self.lex_entity_value_next(delim, b),
				}
			},
			EntityDeclState::AfterValue => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'>' => {
						let (name, def) = self.take_entity_decl();
						Ok(ST(
							State::Doctype(DoctypeState::Subset),
							Some(Token::EntityDecl(self.metrics(0), name, def)),
						))
					},
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ENTITY_DECL,
						other,
						Some(&[">"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
			EntityDeclState::ExtKeyword => match self.read_validated(r, &CLASS_XML_DECL_KEYWORD_BYTE, MAX_DECL_KEYWORD_LENGTH)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				Endbyte::Limit => Err(Error::NotWellFormed(WFError::InvalidSyntax("expected SYSTEM or PUBLIC"))),
				Endbyte::Delimiter(b) => match b {
					b' ' | b'\t' | b'\r' | b'\n' => {
						let which = match &self.scratchpad[..] {
							b"SYSTEM" => EntityLiteral::System,
							b"PUBLIC" => EntityLiteral::Public,
							_ => return Err(Error::NotWellFormed(WFError::InvalidSyntax("expected SYSTEM or PUBLIC"))),
						};
						self.drop_scratchpad()?;
						Ok(ST(
							State::Doctype(DoctypeState::Entity(EntityDeclState::ExtLiteralStart(which))),
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ENTITY_DECL,
						other,
						Some(&["whitespace"]),
					))),
				},
			},
			EntityDeclState::ExtLiteralStart(which) => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'"' | b'\'' => Ok(ST(
						State::Doctype(DoctypeState::Entity(EntityDeclState::ExtLiteral(which, b))),
						None,
					)),
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ENTITY_DECL,
						other,
						Some(&["\"", "'"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
			EntityDeclState::ExtLiteral(which, delim) => match self.read_validated(r, &Self::literal_selector(delim), self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => if b == delim {
					let literal = self.flush_scratchpad_as_complete_cdata()?;
					match which {
						EntityLiteral::Public => {
							self.decl_public = Some(literal);
							Ok(ST(
								State::Doctype(DoctypeState::Entity(EntityDeclState::ExtLiteralStart(EntityLiteral::System))),
								None,
							))
						},
						EntityLiteral::System => {
							self.decl_system = Some(literal);
							Ok(ST(
								State::Doctype(DoctypeState::Entity(EntityDeclState::AfterExternalId)),
								None,
							))
						},
					}
				} else {
					Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_ENTITY_DECL, b as u32, false)))
				},
			},
			EntityDeclState::AfterExternalId => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_ENTITY_DECL)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'>' => {
						let (name, def) = self.take_entity_decl();
						Ok(ST(
							State::Doctype(DoctypeState::Subset),
							Some(Token::EntityDecl(self.metrics(0), name, def)),
						))
					},
					b'N' => Err(Error::Unsupported("unparsed entities")),
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_ENTITY_DECL,
						other,
						Some(&[">"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
		}
	}

	fn lex_doctype(&mut self, state: DoctypeState, r: &mut &[u8]) -> Result<ST> {
		match state {
			DoctypeState::SpaceBeforeName | DoctypeState::BeforeName => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(nmatching, Err(Error::EndOfBuffer)) if nmatching > 0 && state == DoctypeState::SpaceBeforeName => {
					// implicit retry of the buffer end; the space requirement
					// is satisfied now, which must be recorded to stay
					// resilient against chunking
					Ok(ST(
						State::Doctype(DoctypeState::BeforeName),
						None,
					))
				},
				(nmatching, Ok(Endbyte::Delimiter(b))) => {
					if nmatching == 0 && state == DoctypeState::SpaceBeforeName {
						return Err(Error::NotWellFormed(WFError::InvalidSyntax("space required after '<!DOCTYPE'")));
					}
					if CLASS_XML_NAMESTART_BYTE.select(b) {
						self.prep_scratchpad();
						self.scratchpad.push(b);
						Ok(ST(
							State::Doctype(DoctypeState::Name),
							None,
						))
					} else {
						Err(Error::NotWellFormed(WFError::UnexpectedByte(ERRCTX_DOCTYPE, b, None)))
					}
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::Name => match self.read_validated(r, &CLASS_XML_NAME_BYTE, self.opts.max_token_length)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				Endbyte::Limit => Err(Self::token_length_error()),
				Endbyte::Delimiter(b) => {
					let name = self.flush_scratchpad_as_name()?;
					let metrics = self.metrics(1);
					let next = match b {
						b' ' | b'\t' | b'\r' | b'\n' => DoctypeState::AfterName,
						b'[' => DoctypeState::Subset,
						b'>' => DoctypeState::End,
						other => return Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_DOCTYPE,
							other,
							Some(&["whitespace", "[", ">"]),
						))),
					};
					Ok(ST(
						State::Doctype(next),
						Some(Token::DoctypeStart(metrics, name)),
					))
				},
			},
			DoctypeState::AfterName => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Delimiter(b))) => {
					self.eat_whitespace_metrics(1);
					match b {
						b'[' => Ok(ST(State::Doctype(DoctypeState::Subset), None)),
						b'>' => Ok(ST(State::Doctype(DoctypeState::End), None)),
						b if CLASS_XML_DECL_KEYWORD_BYTE.select(b) => {
							self.prep_scratchpad();
							self.scratchpad.push(b);
							Ok(ST(State::Doctype(DoctypeState::ExternalKeyword), None))
						},
						other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_DOCTYPE,
							other,
							Some(&["[", ">", "SYSTEM", "PUBLIC"]),
						))),
					}
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::ExternalKeyword => match self.read_validated(r, &CLASS_XML_DECL_KEYWORD_BYTE, MAX_DECL_KEYWORD_LENGTH)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				Endbyte::Limit => Err(Error::NotWellFormed(WFError::InvalidSyntax("expected SYSTEM or PUBLIC"))),
				Endbyte::Delimiter(b) => match b {
					b' ' | b'\t' | b'\r' | b'\n' => {
						let nliterals = match &self.scratchpad[..] {
							b"SYSTEM" => 1,
							b"PUBLIC" => 2,
							_ => return Err(Error::NotWellFormed(WFError::InvalidSyntax("expected SYSTEM or PUBLIC"))),
						};
						self.drop_scratchpad()?;
						Ok(ST(
							State::Doctype(DoctypeState::ExternalIdLiteralStart(nliterals)),
							None,
						))
					},
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_DOCTYPE,
						other,
						Some(&["whitespace"]),
					))),
				},
			},
			DoctypeState::ExternalIdLiteralStart(remaining) => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'"' | b'\'' => Ok(ST(
						State::Doctype(DoctypeState::ExternalIdLiteral(remaining, b)),
						None,
					)),
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_DOCTYPE,
						other,
						Some(&["\"", "'"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::ExternalIdLiteral(remaining, delim) => match self.skip_matching(r, &Self::literal_selector(delim)) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Delimiter(b))) => if b == delim {
					// the doctype external identifier is not processed
					// further; entity declarations keep theirs
					if remaining <= 1 {
						Ok(ST(State::Doctype(DoctypeState::AfterName), None))
					} else {
						Ok(ST(State::Doctype(DoctypeState::ExternalIdLiteralStart(remaining - 1)), None))
					}
				} else {
					Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_DOCTYPE, b as u32, false)))
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::Subset => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Delimiter(b))) => {
					self.eat_whitespace_metrics(1);
					match b {
						b'<' => Ok(ST(State::Doctype(DoctypeState::SubsetMarkupStart), None)),
						b']' => Ok(ST(State::Doctype(DoctypeState::AfterSubset), None)),
						b'%' => Err(Error::Unsupported("parameter entities")),
						other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_DOCTYPE,
							other,
							Some(&["<", "]", "whitespace"]),
						))),
					}
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::SubsetMarkupStart => match handle_eof(self.read_single(r)?, ERRCTX_DOCTYPE)? {
				b'!' => Ok(ST(State::Doctype(DoctypeState::SubsetBang), None)),
				b'?' => Ok(ST(
					State::Pi{
						ctx: MiscContext::Subset,
						state: PiState::Target,
					},
					None,
				)),
				other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_DOCTYPE,
					other,
					Some(&["!", "?"]),
				))),
			},
			DoctypeState::SubsetBang => match handle_eof(self.read_single(r)?, ERRCTX_DOCTYPE)? {
				b'-' => Ok(ST(State::Doctype(DoctypeState::SubsetCommentStart), None)),
				b if CLASS_XML_DECL_KEYWORD_BYTE.select(b) => {
					self.prep_scratchpad();
					self.scratchpad.push(b);
					Ok(ST(State::Doctype(DoctypeState::DeclKeyword), None))
				},
				other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_DOCTYPE,
					other,
					Some(&["-", "ENTITY", "ELEMENT", "ATTLIST", "NOTATION"]),
				))),
			},
			DoctypeState::SubsetCommentStart => match handle_eof(self.read_single(r)?, ERRCTX_COMMENT)? {
				b'-' => Ok(ST(
					State::Comment{
						ctx: MiscContext::Subset,
						state: CommentState::Data(false),
					},
					None,
				)),
				other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
					ERRCTX_COMMENT,
					other,
					Some(&["-"]),
				))),
			},
			DoctypeState::DeclKeyword => match self.read_validated(r, &CLASS_XML_DECL_KEYWORD_BYTE, MAX_DECL_KEYWORD_LENGTH)? {
				Endbyte::Eof => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				Endbyte::Limit => Err(Error::NotWellFormed(WFError::InvalidSyntax("unknown markup declaration"))),
				Endbyte::Delimiter(b) => {
					#[derive(PartialEq)]
					enum Keyword {
						Entity,
						Skipped,
					}
					let keyword = match &self.scratchpad[..] {
						b"ENTITY" => Keyword::Entity,
						b"ELEMENT" | b"ATTLIST" | b"NOTATION" => Keyword::Skipped,
						_ => return Err(Error::NotWellFormed(WFError::InvalidSyntax("unknown markup declaration"))),
					};
					self.drop_scratchpad()?;
					match b {
						b' ' | b'\t' | b'\r' | b'\n' => Ok(ST(
							State::Doctype(match keyword {
								Keyword::Entity => DoctypeState::Entity(EntityDeclState::BeforeName),
								Keyword::Skipped => DoctypeState::SkipDecl(None),
							}),
							None,
						)),
						b'>' if keyword == Keyword::Skipped => Ok(ST(
							State::Doctype(DoctypeState::Subset),
							None,
						)),
						other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
							ERRCTX_DOCTYPE,
							other,
							Some(&["whitespace"]),
						))),
					}
				},
			},
			DoctypeState::SkipDecl(None) => match self.skip_matching(r, &CLASS_XML_DECL_SKIP_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'>' => Ok(ST(State::Doctype(DoctypeState::Subset), None)),
					b'"' | b'\'' => Ok(ST(State::Doctype(DoctypeState::SkipDecl(Some(b))), None)),
					other => Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_DOCTYPE, other as u32, false))),
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::SkipDecl(Some(delim)) => match self.skip_matching(r, &Self::literal_selector(delim)) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCTYPE)),
				(_, Ok(Endbyte::Delimiter(b))) => if b == delim {
					Ok(ST(State::Doctype(DoctypeState::SkipDecl(None)), None))
				} else {
					Err(Error::NotWellFormed(WFError::InvalidChar(ERRCTX_DOCTYPE, b as u32, false)))
				},
				(_, Err(e)) => Err(e),
			},
			DoctypeState::AfterSubset => match self.skip_matching(r, &CLASS_XML_SPACE_BYTE) {
				(_, Ok(Endbyte::Eof)) | (_, Ok(Endbyte::Limit)) => Err(Error::wfeof(ERRCTX_DOCEND)),
				(_, Ok(Endbyte::Delimiter(b))) => match b {
					b'>' => Ok(ST(
						State::Content(ContentState::Whitespace),
						Some(Token::DoctypeEnd(self.metrics(0))),
					)),
					other => Err(Error::NotWellFormed(WFError::UnexpectedByte(
						ERRCTX_DOCTYPE,
						other,
						Some(&[">"]),
					))),
				},
				(_, Err(e)) => Err(e),
			},
			// no read here; the final `>` was consumed by the previous state
			DoctypeState::End => Ok(ST(
				State::Content(ContentState::Whitespace),
				Some(Token::DoctypeEnd(self.metrics(0))),
			)),
			DoctypeState::Entity(substate) => self.lex_entity_decl(substate, r),
		}
	}

	fn lex_reference(&mut self, ctx: &'static str, ret: RefReturnState, kind: RefKind, r: &mut &[u8]) -> Result<ST> {
		let result = match kind {
			RefKind::Entity => self.read_validated(r, &CLASS_XML_NAME_BYTE, self.opts.max_token_length)?,
			RefKind::Char(CharRefRadix::Decimal) => self.read_validated(r, &CLASS_XML_DECIMAL_DIGIT_BYTE, MAX_CHAR_REFERENCE_LENGTH)?,
			RefKind::Char(CharRefRadix::Hexadecimal) => self.read_validated(r, &CLASS_XML_HEXADECIMAL_DIGIT_BYTE, MAX_CHAR_REFERENCE_LENGTH)?,
		};
		let result = match result {
			Endbyte::Eof => return Err(Error::wfeof(ERRCTX_REF)),
			Endbyte::Limit => return match kind {
				RefKind::Entity => Err(Self::token_length_error()),
				RefKind::Char(_) => Err(Error::NotWellFormed(WFError::InvalidSyntax("overlong character reference"))),
			},
			Endbyte::Delimiter(b) => match b {
				b'#' => {
					if self.scratchpad.len() > 0 {
						Err(b'#')
					} else {
						match kind {
							RefKind::Entity => {
								return Ok(ST(
									State::Reference{
										ctx: ctx,
										ret: ret,
										kind: RefKind::Char(CharRefRadix::Decimal),
									},
									None,
								))
							},
							_ => Err(b'#'),
						}
					}
				},
				b'x' => {
					if self.scratchpad.len() > 0 {
						Err(b'x')
					} else {
						match kind {
							RefKind::Char(CharRefRadix::Decimal) => {
								return Ok(ST(
									State::Reference{
										ctx: ctx,
										ret: ret,
										kind: RefKind::Char(CharRefRadix::Hexadecimal),
									},
									None,
								))
							},
							_ => Err(b'x'),
						}
					}
				},
				b';' => {
					if self.scratchpad.len() == 0 {
						return Err(Error::NotWellFormed(WFError::InvalidSyntax("empty reference")));
					}
					// return to main scratchpad
					self.swap_scratchpad()?;
					// the entity reference is now in the swap (which we have to clear now, too)
					let entity = self.read_swap();
					match kind {
						RefKind::Entity => match ret {
							RefReturnState::EntityValue(..) => {
								// within an entity value, general entity
								// references are carried over verbatim and
								// expand at the point of use
								// (XML 1.0 § 4.4.7)
								self.prep_scratchpad();
								self.scratchpad.push(b'&');
								self.scratchpad.extend_from_slice(&entity[..]);
								self.scratchpad.push(b';');
								Ok(())
							},
							_ => match resolve_predefined_entity(&entity[..]) {
								Some(b) => {
									self.prep_scratchpad();
									self.scratchpad.push(b);
									Ok(())
								},
								None => {
									// a general entity; the parser decides
									// whether and how it expands
									let s = match std::str::from_utf8(&entity[..]) {
										Ok(s) => Ok(s),
										Err(e) => Err(Error::utf8err(&entity[..], &e)),
									}?;
									add_context(validate_name(s).map_err(|e| e.into()), ctx)?;
									let name = unsafe { Name::from_string_unchecked(s) };
									// the reference spans `&` to `;`; bytes
									// of an interrupted attribute value stay
									// out of its metrics
									let metrics = TokenMetrics{
										start: self.reference_start,
										end: self.ctr,
									};
									self.last_token_end = self.ctr;
									return Ok(ST(
										ret.to_state(),
										Some(Token::Reference(metrics, name)),
									));
								},
							},
						},
						RefKind::Char(radix) => {
							// this is safe because the bytes allowed by the digit byte ranges are all plain ascii
							let entity = unsafe { std::str::from_utf8_unchecked(&entity[..]) };
							Ok(add_context(resolve_char_reference(entity, radix, &mut self.scratchpad), ctx)?)
						},
					}
				}
				c => Err(c),
			}
		};
		match result {
			Ok(_) => Ok(ST(ret.to_state(), None)),
			Err(b) => return Err(Error::NotWellFormed(WFError::UnexpectedByte(
				ERRCTX_REF,
				b,
				Some(&[";"]),
			))),
		}
	}

	fn lex_bytes_raw(&mut self, r: &mut &[u8]) -> Result<Option<Token>>
	{
		if let Some(e) = self.err {
			return Err(e)
		}

		loop {
			let stresult = match self.state {
				State::Content(substate) => self.lex_content(substate, r),
				State::Element{ kind, state: substate } => self.lex_element(kind, substate, r),
				State::Comment{ ctx, state: substate } => self.lex_comment(ctx, substate, r),
				State::Pi{ ctx, state: substate } => self.lex_pi(ctx, substate, r),
				State::Doctype(substate) => self.lex_doctype(substate, r),
				State::Reference{ ctx, ret, kind } => self.lex_reference(ctx, ret, kind, r),
				State::Eof => return Ok(None),
			};
			let st = match stresult {
				Err(Error::EndOfBuffer) => {
					// we do not cache I/O errors
					return Err(Error::EndOfBuffer);
				},
				Err(other) => {
					// we cache all other errors because we don't want to read / emit invalid data
					self.err = Some(other);
					return Err(other);
				},
				Ok(st) => st,
			};
			match st.splice(&mut self.state) {
				Some(tok) => {
					#[cfg(debug_assertions)]
					{
						// preserve the state for infinite loop detection
						self.prev_state = (self.scratchpad.clone(), self.state.clone());
					}
					return Ok(Some(tok));
				},
				None => (),
			};
			#[cfg(debug_assertions)]
			{
				// we did not leave the loop; assert that the state has
				// actually changed
				if self.prev_state.0 == self.scratchpad && self.prev_state.1 == self.state {
					panic!("state has not changed in the last iteration: {:?} {:?} last read: {:?}", self, self.scratchpad, self.last_single_read)
				} else {
					self.prev_state = (self.scratchpad.clone(), self.state.clone())
				}
			}
		}
	}

	/// Lex bytes from the buffer, advancing the slice for any byte consumed,
	/// until either an error occurs, a valid token is produced or the buffer
	/// is at its end.
	///
	/// **Note:** The lexer keeps some internal state which may cause a token
	/// to be emitted even for an empty buffer! That means that even if your
	/// backend currently has no more data available, you should call
	/// `lex_bytes` with a corresponding empty buffer and eof flag until you
	/// receive a non-token result.
	///
	/// # End-of-file handling
	///
	/// The `Lexer` can be used to process a streamed document. For this, it
	/// needs to know whether the end of the buffer passed to this function
	/// marks the end of the document or not. The caller signals this using
	/// the `at_eof` flag.
	///
	/// If `at_eof` is false, the end of buffer is treated as a temporary
	/// situation and a [`std::io::ErrorKind::WouldBlock`] I/O error is
	/// returned when it is reached. Otherwise, the end of buffer is treated
	/// as the end of file.
	///
	/// # Return value
	///
	/// Returns `None` if a valid end of file is reached, a token if a valid
	/// token is encountered or an error otherwise.
	#[inline]
	pub fn lex_bytes(&mut self, r: &mut &[u8], at_eof: bool) -> CrateResult<Option<Token>> {
		self.has_eof = at_eof;
		Ok(self.lex_bytes_raw(r)?)
	}

	/// Lex bytes from the reader until either an error occurs, a valid
	/// token is produced or a valid end-of-file situation is encountered.
	///
	/// This requires a [`std::io::BufRead`] for performance reasons. This
	/// function will issue exactly one call to the `fill_buf()` method of the
	/// reader.
	///
	/// # End-of-file handling
	///
	/// If `fill_buf()` returns an empty buffer, it is treated as the end of
	/// file. At end of file, either the return value `None` is produced or an
	/// error (usually a
	/// [`Error::NotWellFormed`][crate::Error::NotWellFormed]).
	///
	/// # I/O error handling
	///
	/// Any I/O error (except for WouldBlock) is passed back to the caller,
	/// without invoking the lexer internally. This allows any I/O error to be
	/// retried (though the success of that will obviously depend on the Read
	/// struct). The I/O error is wrapped in [`Error::IO`](crate::Error::IO).
	///
	/// If the reader returns an [`std::io::ErrorKind::WouldBlock`] error, the
	/// lexer *is* invoked, as even an empty buffer may emit a token in some
	/// edge cases (one important one being at the end of a closing element
	/// tag; here, a network-transmitted message may conceivably end and it is
	/// important for streaming parsing to emit that token even without
	/// further data arriving).
	///
	/// # Return value
	///
	/// Returns `None` if a valid end of file is reached, a token if a valid
	/// token is encountered or an error otherwise.
	pub fn lex<R: io::BufRead + ?Sized>(&mut self, r: &mut R) -> CrateResult<Option<Token>> {
		let (mut buf, eof): (&[u8], bool) = match r.fill_buf() {
			Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
				// if we have a wouldblock, we need to pretend we had an empty buffer, but without the eof flag
				// worst case it'll be converted to a wouldblock again
				// this matters in some cases where the internal state already allows to emit a token. most prominently, this happens on element closures: the closing byte (b'>') has been read already which is encoded in the internal state and a corresponding token will be emitted even without more data available.
				(&[], false)
			},
			Err(e) => return Err(e.into()),
			Ok(b) => (b, b.len() == 0),
		};
		let orig_len = buf.len();
		let result = self.lex_bytes(&mut buf, eof);
		let new_len = buf.len();
		r.consume(orig_len - new_len);
		Ok(result?)
	}

	/// Release all temporary buffers
	///
	/// This is sensible to call when it is expected that no more data will be
	/// processed by the lexer for a while and the memory is better used
	/// elsewhere.
	pub fn release_temporaries(&mut self) {
		self.scratchpad.shrink_to_fit();
		self.swap.shrink_to_fit();
	}
}

impl fmt::Debug for Lexer {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Lexer")
			.field("state", &self.state)
			.finish()
	}
}

pub trait Sink {
	type ErrorType;

	fn token(&mut self, token: Token);
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::Error as CrateError;
	use std::convert::TryInto;
	use std::error;
	use std::fmt;
	use std::io;

	/// Stream tokens to the sink until the end of stream is reached.
	fn stream_to_sink<'r, 's, 'l, R: io::BufRead, S: Sink>(l: &'l mut Lexer, r: &'r mut R, s: &'s mut S) -> CrateResult<()> {
		loop {
			match l.lex(r) {
				Ok(Some(tok)) => s.token(tok),
				Ok(None) => break,
				Err(CrateError::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => {
					if let Ok(buf) = r.fill_buf() {
						if buf.len() > 0 {
							continue
						}
						// the source ran dry before the lexer saw the eof
						// flag; one final pass lets it report an open
						// construct instead of asking for more data
						let mut empty: &[u8] = &[];
						match l.lex_bytes(&mut empty, true) {
							Ok(Some(tok)) => {
								s.token(tok);
								continue
							},
							Ok(None) => break,
							Err(e) => return Err(e),
						}
					}
					return Err(CrateError::IO(e))
				},
				Err(e) => return Err(e),
			}
		}
		Ok(())
	}

	fn stream_to_sink_from_bytes<'r, 's, 'l, R: io::BufRead, S: Sink>(l: &'l mut Lexer, r: &'r mut R, s: &'s mut S) -> CrateResult<()> {
		stream_to_sink(l, r, s)
	}

	struct VecSink {
		dest: Vec<Token>,
		limit: usize,
	}

	impl VecSink {
		fn new(limit: usize) -> VecSink {
			VecSink {
				dest: Vec::new(),
				limit: limit,
			}
		}
	}

	#[derive(Debug, Clone, PartialEq)]
	struct VecSinkError(String);

	impl fmt::Display for VecSinkError {
		fn fmt<'a>(&self, f: &'a mut fmt::Formatter) -> fmt::Result {
			f.write_str(self.0.as_str())
		}
	}

	impl error::Error for VecSinkError {
		fn source(&self) -> Option<&(dyn error::Error + 'static)> {
			None
		}
	}

	impl Sink for VecSink {
		type ErrorType = io::Error;

		fn token(&mut self, token: Token) {
			if self.dest.len() >= self.limit {
				panic!("token limit exceeded: {}", self.limit);
			}
			self.dest.push(token);
		}
	}

	struct NotQuote();

	impl ByteSelect for NotQuote {
		fn select(&self, b: u8) -> bool {
			b != b'"'
		}
	}

	#[test]
	fn read_validated_bytes_consumes_delimiter_without_copying() {
		let mut src = &b"abc\"def"[..];
		let mut out = Vec::new();
		let ep = read_validated_bytes(&mut src, &NotQuote(), 128, &mut out);
		assert_eq!(ep, Endbyte::Delimiter(b'"'));
		assert_eq!(&out[..], b"abc");
		assert_eq!(src, b"def");
	}

	#[test]
	fn read_validated_bytes_reports_limit_only_with_bytes_left() {
		let mut src = &b"abcdef"[..];
		let mut out = Vec::new();
		assert_eq!(
			read_validated_bytes(&mut src, &NotQuote(), 4, &mut out),
			Endbyte::Limit
		);
		assert_eq!(&out[..], b"abcd");
		assert_eq!(src, b"ef");
		// a limit landing exactly on the end of the window is not a limit
		// violation, more bytes may still arrive
		assert_eq!(
			read_validated_bytes(&mut src, &NotQuote(), 2, &mut out),
			Endbyte::Eof
		);
		assert_eq!(&out[..], b"abcdef");
		assert_eq!(src, b"");
	}

	#[test]
	fn skip_matching_bytes_stops_at_rejected_byte() {
		let mut src = &b"   \"rest"[..];
		assert_eq!(
			skip_matching_bytes(&mut src, &NotQuote()),
			(3, Endbyte::Delimiter(b'"'))
		);
		assert_eq!(src, b"rest");
		let mut src = &b"no delimiter here"[..];
		assert_eq!(
			skip_matching_bytes(&mut src, &NotQuote()),
			(17, Endbyte::Eof)
		);
		assert_eq!(src, b"");
	}

	fn lex(data: &[u8], token_limit: usize) -> (Vec<Token>, CrateResult<()>) {
		lex_with_options(data, token_limit, LexerOptions::default())
	}

	fn lex_with_options(data: &[u8], token_limit: usize, opts: LexerOptions) -> (Vec<Token>, CrateResult<()>) {
		let mut buff = io::BufReader::new(data);
		let mut lexer = Lexer::with_options(opts);
		let mut sink = VecSink::new(token_limit);
		let result = stream_to_sink(&mut lexer, &mut buff, &mut sink);
		(sink.dest, result)
	}

	fn lex_chunked(data: &[&[u8]], token_limit: usize) -> (Vec<Token>, CrateResult<()>) {
		let mut lexer = Lexer::new();
		let mut sink = VecSink::new(token_limit);
		for (i, chunk) in data.iter().enumerate() {
			let at_eof = i == data.len() - 1;
			let mut remaining = *chunk;
			loop {
				match lexer.lex_bytes(&mut remaining, at_eof) {
					Ok(Some(tok)) => sink.token(tok),
					Ok(None) => return (sink.dest, Ok(())),
					Err(CrateError::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => break,
					Err(e) => return (sink.dest, Err(e)),
				}
			}
		}
		(sink.dest, Ok(()))
	}

	fn lex_err(data: &[u8], token_limit: usize) -> Option<CrateError> {
		let (_, r) = lex(data, token_limit);
		r.err()
	}

	#[test]
	fn lexer_lex_xml_decl_start() {
		let mut src = "<?xml version='1.0'?>".as_bytes();
		let mut lexer = Lexer::new();
		let mut sink = VecSink::new(128);
		stream_to_sink_from_bytes(&mut lexer, &mut src, &mut sink).unwrap();

		assert_eq!(sink.dest[0], Token::XMLDeclStart(TokenMetrics{start: 0, end: 5}));
	}

	#[test]
	fn lexer_lex_xml_decl_complete() {
		let (toks, result) = lex(b"<?xml version='1.0'?>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::XMLDeclStart(TokenMetrics{start: 0, end: 5}));
		assert_eq!(toks[1], Token::Name(TokenMetrics{start: 6, end: 13}, "version".try_into().unwrap()));
		assert_eq!(toks[2], Token::Eq(TokenMetrics{start: 13, end: 14}));
		assert_eq!(toks[3], Token::AttributeValue(TokenMetrics{start: 14, end: 19}, "1.0".try_into().unwrap()));
		assert_eq!(toks[4], Token::XMLDeclEnd(TokenMetrics{start: 19, end: 21}));
		assert_eq!(toks.len(), 5);
	}

	#[test]
	fn lexer_lex_xml_decl_with_double_quotes() {
		let (toks, result) = lex(b"<?xml version=\"1.0\" encoding=\"utf-8\"?>", 128);
		result.unwrap();

		assert_eq!(toks[3], Token::AttributeValue(TokenMetrics{start: 14, end: 19}, "1.0".try_into().unwrap()));
		assert_eq!(toks[4], Token::Name(TokenMetrics{start: 20, end: 28}, "encoding".try_into().unwrap()));
		assert_eq!(toks[6], Token::AttributeValue(TokenMetrics{start: 29, end: 36}, "utf-8".try_into().unwrap()));
	}

	#[test]
	fn lexer_lex_xml_decl_without_attrs() {
		// not a valid XML declaration as far as the parser is concerned,
		// but the lexer passes it through
		let (toks, result) = lex(b"<?xml?>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::XMLDeclStart(TokenMetrics{start: 0, end: 5}));
		assert_eq!(toks[1], Token::XMLDeclEnd(TokenMetrics{start: 5, end: 7}));
	}

	#[test]
	fn lexer_lex_xml_decl_rejects_stray_byte_after_name() {
		let err = lex_err(b"<?xml=no?>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::UnexpectedByte(..))));
	}

	#[test]
	fn lexer_lex_element_with_attribute_and_text() {
		let (toks, result) = lex(b"<root a='x'>text</root>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::ElementHeadStart(TokenMetrics{start: 0, end: 5}, "root".try_into().unwrap()));
		assert_eq!(toks[1], Token::Name(TokenMetrics{start: 6, end: 7}, "a".try_into().unwrap()));
		assert_eq!(toks[2], Token::Eq(TokenMetrics{start: 7, end: 8}));
		assert_eq!(toks[3], Token::AttributeValue(TokenMetrics{start: 8, end: 11}, "x".try_into().unwrap()));
		assert_eq!(toks[4], Token::ElementHFEnd(TokenMetrics{start: 11, end: 12}));
		assert_eq!(toks[5], Token::Text(TokenMetrics{start: 12, end: 16}, "text".try_into().unwrap()));
		assert_eq!(toks[6], Token::ElementFootStart(TokenMetrics{start: 16, end: 22}, "root".try_into().unwrap()));
		assert_eq!(toks[7], Token::ElementHFEnd(TokenMetrics{start: 22, end: 23}));
		assert_eq!(toks.len(), 8);
	}

	#[test]
	fn lexer_lex_empty_element() {
		let (toks, result) = lex(b"<x/>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::ElementHeadStart(TokenMetrics{start: 0, end: 2}, "x".try_into().unwrap()));
		assert_eq!(toks[1], Token::ElementHeadClose(TokenMetrics{start: 2, end: 4}));
		assert_eq!(toks.len(), 2);
	}

	#[test]
	fn lexer_lex_predefined_entities_in_text() {
		let (toks, result) = lex(b"<a>&amp;&lt;&gt;&apos;&quot;</a>", 128);
		result.unwrap();

		// each reference flushes the preceding text
		let mut text = String::new();
		for tok in toks.iter() {
			if let Token::Text(_, cdata) = tok {
				text.push_str(cdata);
			}
		}
		assert_eq!(text, "&<>'\"");
	}

	#[test]
	fn lexer_lex_char_references_in_text() {
		let (toks, result) = lex(b"<a>&#60;&#x3e;</a>", 128);
		result.unwrap();

		let mut text = String::new();
		for tok in toks.iter() {
			if let Token::Text(_, cdata) = tok {
				text.push_str(cdata);
			}
		}
		assert_eq!(text, "<>");
	}

	#[test]
	fn lexer_lex_predefined_entity_in_attribute() {
		let (toks, result) = lex(b"<a b='x&amp;y'/>", 128);
		result.unwrap();

		// the metrics cover the delimited literal, starting at the opening
		// quote; the expanded entity takes more bytes on the wire than in
		// the CData
		assert_eq!(toks[3], Token::AttributeValue(TokenMetrics{start: 5, end: 14}, "x&y".try_into().unwrap()));
	}

	#[test]
	fn lexer_lex_general_entity_reference_in_text() {
		let (toks, result) = lex(b"<a>&e;</a>", 128);
		result.unwrap();

		assert_eq!(toks[2], Token::Reference(TokenMetrics{start: 3, end: 6}, "e".try_into().unwrap()));
	}

	#[test]
	fn lexer_lex_general_entity_reference_in_attribute() {
		let (toks, result) = lex(b"<a b=\"&e;\"/>", 128);
		result.unwrap();

		assert_eq!(toks[3], Token::Reference(TokenMetrics{start: 6, end: 9}, "e".try_into().unwrap()));
		assert!(matches!(&toks[4], Token::AttributeValue(_, v) if v.as_str() == ""));
	}

	#[test]
	fn lexer_lex_quote_from_replacement_text_does_not_close_attribute() {
		fn push(lexer: &mut Lexer, sink: &mut VecSink, mut data: &[u8], at_eof: bool) {
			loop {
				match lexer.lex_bytes(&mut data, at_eof) {
					Ok(Some(tok)) => sink.token(tok),
					Ok(None) => return,
					Err(CrateError::IO(e)) if e.kind() == io::ErrorKind::WouldBlock => return,
					Err(e) => panic!("unexpected error: {:?}", e),
				}
			}
		}

		let mut lexer = Lexer::new();
		let mut sink = VecSink::new(128);
		push(&mut lexer, &mut sink, b"<a b=\"x", false);
		lexer.set_replacement_context(true);
		push(&mut lexer, &mut sink, b"\"", false);
		lexer.set_replacement_context(false);
		push(&mut lexer, &mut sink, b"y\"/>", true);
		assert!(matches!(&sink.dest[3], Token::AttributeValue(_, v) if v.as_str() == "x\"y"));
		assert!(matches!(&sink.dest[4], Token::ElementHeadClose(..)));
	}

	#[test]
	fn lexer_lex_general_entity_reference_mixed_into_attribute() {
		let (toks, result) = lex(b"<a b='x&e;y'/>", 128);
		result.unwrap();

		assert!(matches!(&toks[3], Token::Reference(_, n) if n.as_str() == "e"));
		// with nothing spliced into the input, the pieces on either side of
		// the reference join up
		assert!(matches!(&toks[4], Token::AttributeValue(_, v) if v.as_str() == "xy"));
	}

	#[test]
	fn lexer_lex_cdata_section() {
		let (toks, result) = lex(b"<a><![CDATA[<b>]]></a>", 128);
		result.unwrap();

		assert_eq!(toks[2], Token::CDataSection(TokenMetrics{start: 3, end: 18}, "<b>".try_into().unwrap()));
	}

	#[test]
	fn lexer_lex_cdata_section_with_bracket_soup() {
		let (toks, result) = lex(b"<a><![CDATA[]] ]]]></a>", 128);
		result.unwrap();

		assert!(matches!(&toks[2], Token::CDataSection(_, v) if v.as_str() == "]] ]"));
	}

	#[test]
	fn lexer_lex_empty_cdata_section_emits_no_token() {
		let (toks, result) = lex(b"<a><![CDATA[]]></a>", 128);
		result.unwrap();

		for tok in toks.iter() {
			assert!(!matches!(tok, Token::CDataSection(..)));
			assert!(!matches!(tok, Token::Text(..)));
		}
	}

	#[test]
	fn lexer_lex_rejects_cdata_end_in_text() {
		let err = lex_err(b"<a>foo]]>bar</a>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidSyntax(_))));
	}

	#[test]
	fn lexer_lex_comment() {
		let (toks, result) = lex(b"<a><!-- foo --></a>", 128);
		result.unwrap();

		assert_eq!(toks[2], Token::Comment(TokenMetrics{start: 3, end: 15}, " foo ".try_into().unwrap()));
	}

	#[test]
	fn lexer_lex_comment_before_root() {
		let (toks, result) = lex(b"<!--x--><a/>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::Comment(TokenMetrics{start: 0, end: 8}, "x".try_into().unwrap()));
		assert!(matches!(&toks[1], Token::ElementHeadStart(_, n) if n.as_str() == "a"));
	}

	#[test]
	fn lexer_lex_comment_with_single_dashes() {
		let (toks, result) = lex(b"<!--a-b - c--><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::Comment(_, v) if v.as_str() == "a-b - c"));
	}

	#[test]
	fn lexer_lex_comment_folds_crlf() {
		let (toks, result) = lex(b"<!--a\r\nb\rc--><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::Comment(_, v) if v.as_str() == "a\nb\nc"));
	}

	#[test]
	fn lexer_lex_rejects_double_dash_in_comment() {
		let err = lex_err(b"<!-- a -- b -->", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidSyntax(_))));
	}

	#[test]
	fn lexer_lex_processing_instruction() {
		let (toks, result) = lex(b"<?instruction some data?><r/>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::ProcessingInstruction(
			TokenMetrics{start: 0, end: 25},
			"instruction".try_into().unwrap(),
			Some("some data".try_into().unwrap()),
		));
	}

	#[test]
	fn lexer_lex_processing_instruction_without_data() {
		let (toks, result) = lex(b"<?ping?><r/>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::ProcessingInstruction(
			TokenMetrics{start: 0, end: 8},
			"ping".try_into().unwrap(),
			None,
		));
	}

	#[test]
	fn lexer_lex_processing_instruction_with_question_marks_in_data() {
		let (toks, result) = lex(b"<?a b??><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::ProcessingInstruction(_, _, Some(v)) if v.as_str() == "b?"));
	}

	#[test]
	fn lexer_lex_rejects_reserved_pi_target() {
		let err = lex_err(b"<?XML version='1.0'?>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidSyntax(_))));
	}

	#[test]
	fn lexer_lex_allows_pi_target_with_xml_prefix() {
		// only the exact (case-insensitive) name `xml` is reserved
		let (toks, result) = lex(b"<?xmlish d?><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::ProcessingInstruction(_, t, Some(v)) if t.as_str() == "xmlish" && v.as_str() == "d"));
	}

	#[test]
	fn lexer_lex_doctype_without_subset() {
		let (toks, result) = lex(b"<!DOCTYPE html><r/>", 128);
		result.unwrap();

		assert_eq!(toks[0], Token::DoctypeStart(TokenMetrics{start: 0, end: 14}, "html".try_into().unwrap()));
		assert_eq!(toks[1], Token::DoctypeEnd(TokenMetrics{start: 14, end: 15}));
		assert!(matches!(&toks[2], Token::ElementHeadStart(_, n) if n.as_str() == "r"));
	}

	#[test]
	fn lexer_lex_doctype_skips_system_identifier() {
		let (toks, result) = lex(b"<!DOCTYPE html SYSTEM \"about:legacy-compat\"><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::DoctypeStart(_, n) if n.as_str() == "html"));
		assert!(matches!(&toks[1], Token::DoctypeEnd(_)));
	}

	#[test]
	fn lexer_lex_doctype_skips_public_identifier() {
		let (toks, result) = lex(b"<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0//EN\" 'http://www.w3.org/xhtml1.dtd'><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::DoctypeStart(_, n) if n.as_str() == "html"));
		assert!(matches!(&toks[1], Token::DoctypeEnd(_)));
	}

	#[test]
	fn lexer_lex_doctype_requires_space_before_name() {
		let err = lex_err(b"<!DOCTYPEhtml>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidSyntax(_))));
	}

	#[test]
	fn lexer_lex_internal_entity_declaration() {
		let (toks, result) = lex(b"<!DOCTYPE r [ <!ENTITY e \"v\"> ]><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::DoctypeStart(_, n) if n.as_str() == "r"));
		assert_eq!(toks[1], Token::EntityDecl(
			TokenMetrics{start: 14, end: 29},
			"e".try_into().unwrap(),
			EntityDef::Internal("v".try_into().unwrap()),
		));
		assert!(matches!(&toks[2], Token::DoctypeEnd(_)));
	}

	#[test]
	fn lexer_lex_entity_value_resolves_char_references() {
		let (toks, result) = lex(b"<!DOCTYPE r [<!ENTITY a \"&#65;&#x42;\">]><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[1], Token::EntityDecl(_, _, EntityDef::Internal(v)) if v.as_str() == "AB"));
	}

	#[test]
	fn lexer_lex_entity_value_keeps_entity_references_verbatim() {
		// XML 1.0 § 4.4.7: general entity references are bypassed in entity
		// values and expand at the point of use
		let (toks, result) = lex(b"<!DOCTYPE r [<!ENTITY b 'x&amp;y&next;'>]><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[1], Token::EntityDecl(_, _, EntityDef::Internal(v)) if v.as_str() == "x&amp;y&next;"));
	}

	#[test]
	fn lexer_lex_entity_value_folds_crlf() {
		let (toks, result) = lex(b"<!DOCTYPE r [<!ENTITY c 'a\r\nb\rc'>]><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[1], Token::EntityDecl(_, _, EntityDef::Internal(v)) if v.as_str() == "a\nb\nc"));
	}

	#[test]
	fn lexer_lex_external_entity_declaration() {
		let (toks, result) = lex(b"<!DOCTYPE r [<!ENTITY ext SYSTEM \"http://example.com/a.ent\">]><r/>", 128);
		result.unwrap();

		assert_eq!(toks[1], Token::EntityDecl(
			TokenMetrics{start: 13, end: 60},
			"ext".try_into().unwrap(),
			EntityDef::External{
				public_id: None,
				system_id: "http://example.com/a.ent".try_into().unwrap(),
			},
		));
	}

	#[test]
	fn lexer_lex_external_entity_declaration_with_public_id() {
		let (toks, result) = lex(b"<!DOCTYPE r [<!ENTITY ext PUBLIC '-//X//EN' 'http://example.com/b.ent'>]><r/>", 128);
		result.unwrap();

		assert!(matches!(
			&toks[1],
			Token::EntityDecl(_, n, EntityDef::External{public_id: Some(p), system_id: s})
				if n.as_str() == "ext" && p.as_str() == "-//X//EN" && s.as_str() == "http://example.com/b.ent"
		));
	}

	#[test]
	fn lexer_lex_rejects_parameter_entity_declaration() {
		let err = lex_err(b"<!DOCTYPE r [<!ENTITY % p 'v'>]><r/>", 128).unwrap();
		assert_eq!(err, CrateError::Unsupported("parameter entities"));
	}

	#[test]
	fn lexer_lex_rejects_parameter_entity_reference_in_subset() {
		let err = lex_err(b"<!DOCTYPE r [ %p; ]><r/>", 128).unwrap();
		assert_eq!(err, CrateError::Unsupported("parameter entities"));
	}

	#[test]
	fn lexer_lex_rejects_unparsed_entity_declaration() {
		let err = lex_err(b"<!DOCTYPE r [<!ENTITY i SYSTEM 'a.gif' NDATA gif>]><r/>", 128).unwrap();
		assert_eq!(err, CrateError::Unsupported("unparsed entities"));
	}

	#[test]
	fn lexer_lex_skips_element_and_attlist_declarations() {
		let (toks, result) = lex(b"<!DOCTYPE r [ <!ELEMENT r (#PCDATA)> <!ATTLIST r a CDATA \"d>q\"> <!NOTATION n SYSTEM 'x'> ]><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::DoctypeStart(..)));
		assert!(matches!(&toks[1], Token::DoctypeEnd(..)));
		assert!(matches!(&toks[2], Token::ElementHeadStart(..)));
	}

	#[test]
	fn lexer_lex_comment_and_pi_inside_subset() {
		let (toks, result) = lex(b"<!DOCTYPE r [ <!-- c --> <?p d?> ]><r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[1], Token::Comment(_, v) if v.as_str() == " c "));
		assert!(matches!(&toks[2], Token::ProcessingInstruction(_, t, Some(v)) if t.as_str() == "p" && v.as_str() == "d"));
		assert!(matches!(&toks[3], Token::DoctypeEnd(_)));
	}

	#[test]
	fn lexer_lex_full_prolog_sequence() {
		let (toks, result) = lex(b"<?xml version='1.0'?><!DOCTYPE r [<!ENTITY e 'v'>]><r>&e;</r>", 128);
		result.unwrap();

		let names: Vec<&'static str> = toks.iter().map(|t| t.name()).collect();
		assert_eq!(&names[..], &[
			Token::NAME_XMLDECLSTART,
			Token::NAME_NAME,
			Token::NAME_EQ,
			Token::NAME_ATTRIBUTEVALUE,
			Token::NAME_XMLDECLEND,
			Token::NAME_DOCTYPESTART,
			Token::NAME_ENTITYDECL,
			Token::NAME_DOCTYPEEND,
			Token::NAME_ELEMENTHEADSTART,
			Token::NAME_ELEMENTHFEND,
			Token::NAME_REFERENCE,
			Token::NAME_ELEMENTFOOTSTART,
			Token::NAME_ELEMENTHFEND,
		]);
	}

	#[test]
	fn lexer_lex_folds_crlf_in_text() {
		let (toks, result) = lex(b"<a>1\r\n2\r3</a>", 128);
		result.unwrap();

		assert!(matches!(&toks[2], Token::Text(_, v) if v.as_str() == "1\n2\n3"));
	}

	#[test]
	fn lexer_lex_normalizes_whitespace_in_attributes() {
		let (toks, result) = lex(b"<a b='1\r\n2\t3\r4'/>", 128);
		result.unwrap();

		assert!(matches!(&toks[3], Token::AttributeValue(_, v) if v.as_str() == "1 2 3 4"));
	}

	#[test]
	fn lexer_lex_splits_long_text() {
		let (toks, result) = lex_with_options(b"<a>aaaaaaaaaaaabbbb</a>", 128, LexerOptions::default().max_token_length(6));
		result.unwrap();

		let mut text = String::new();
		let mut ntexts = 0;
		for tok in toks.iter() {
			if let Token::Text(_, cdata) = tok {
				text.push_str(cdata);
				ntexts += 1;
			}
		}
		assert_eq!(text, "aaaaaaaaaaaabbbb");
		assert!(ntexts > 1);
	}

	#[test]
	fn lexer_lex_rejects_overlong_name() {
		let err = lex_err(b"<averylongelementname/>", 128);
		assert!(err.is_none());
		let (_, result) = lex_with_options(b"<averylongelementname/>", 128, LexerOptions::default().max_token_length(6));
		assert_eq!(result.err().unwrap(), CrateError::Unsupported("long name, reference or markup token"));
	}

	#[test]
	fn lexer_lex_chunked_comment() {
		let (toks, result) = lex_chunked(&[b"<a><!-- split ", b"comment --", b"></a>"], 128);
		result.unwrap();

		assert!(matches!(&toks[2], Token::Comment(_, v) if v.as_str() == " split comment "));
	}

	#[test]
	fn lexer_lex_chunked_doctype() {
		let (toks, result) = lex_chunked(&[b"<!DOCTYPE ", b"r [<!ENT", b"ITY e 'v'>]><r/>"], 128);
		result.unwrap();

		assert!(matches!(&toks[0], Token::DoctypeStart(_, n) if n.as_str() == "r"));
		assert!(matches!(&toks[1], Token::EntityDecl(_, n, EntityDef::Internal(v)) if n.as_str() == "e" && v.as_str() == "v"));
	}

	#[test]
	fn lexer_lex_truncated_comment_is_invalid_eof() {
		let err = lex_err(b"<!-- a", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidEof(ERRCTX_COMMENT))));
	}

	#[test]
	fn lexer_lex_truncated_pi_is_invalid_eof() {
		let err = lex_err(b"<?target data", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidEof(ERRCTX_PI))));
	}

	#[test]
	fn lexer_lex_truncated_doctype_is_invalid_eof() {
		let err = lex_err(b"<!DOCTYPE r [", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidEof(ERRCTX_DOCTYPE))));
	}

	#[test]
	fn lexer_lex_truncated_cdata_is_invalid_eof() {
		let err = lex_err(b"<a><![CDATA[foo", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidEof(ERRCTX_CDATA_SECTION))));
	}

	#[test]
	fn lexer_lex_rejects_empty_reference() {
		let err = lex_err(b"<a>&;</a>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidSyntax(_))));
	}

	#[test]
	fn lexer_lex_rejects_invalid_char_reference() {
		let err = lex_err(b"<a>&#0;</a>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::InvalidChar(_, 0, true))));
	}

	#[test]
	fn lexer_lex_rejects_lt_in_attribute() {
		let err = lex_err(b"<a b='<'/>", 128).unwrap();
		assert!(matches!(err, CrateError::NotWellFormed(WFError::UnexpectedChar(_, '<', _))));
	}

	#[test]
	fn lexer_lex_whitespace_between_decl_and_root() {
		let (toks, result) = lex(b"<?xml version='1.0'?>\n<r/>", 128);
		result.unwrap();

		assert!(matches!(&toks[5], Token::ElementHeadStart(_, n) if n.as_str() == "r"));
	}

	#[test]
	fn lexer_lex_caches_errors() {
		let mut src = io::BufReader::new(&b"<a>\x01</a>"[..]);
		let mut lexer = Lexer::new();
		let mut sink = VecSink::new(128);
		let e1 = stream_to_sink(&mut lexer, &mut src, &mut sink).err().unwrap();
		let e2 = lexer.lex(&mut src).err().unwrap();
		assert_eq!(e1, e2);
	}
}
