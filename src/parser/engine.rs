/*!
# Well-formedness engine

Drives the tokenizer over the input frame stack and converts
[`crate::lexer::Token`]s into [`Event`]s, enforcing the constraints which
span multiple tokens.
*/
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;

use crate::entity::{EntityDef, EntityMap, EntityResolver, NoResolver, ReplacementOrigin};
use crate::error::*;
use crate::input::{ExpansionGuard, InputFrame, InputStack, Position};
use crate::lexer::{Lexer, LexerOptions, Token};
use crate::strings::*;

use super::common::*;

#[derive(Clone, Copy, PartialEq, Debug)]
enum DeclSt {
	VersionName,
	VersionEq,
	VersionValue,
	EncodingName,
	EncodingEq,
	EncodingValue,
	StandaloneName,
	StandaloneEq,
	StandaloneValue,
	Close,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum ElementSt {
	AttrName,
	AttrEq,
	AttrValue,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum DocSt {
	Element(ElementSt),
	Content,
	ElementFoot,
}

#[derive(Clone, Copy, PartialEq, Debug)]
enum State {
	Initial,
	Decl {
		substate: DeclSt,
		version: Option<XMLVersion>,
	},
	/// After the XML declaration, before the root element.
	Prolog,
	/// Inside the internal subset of the document type declaration.
	Subset,
	Document(DocSt),
	/// After the root element.
	End,
	Eof,
}

/// An element which has been opened but not closed yet.
///
/// The input stack depth at the opening tag is kept to enforce that entity
/// replacement text is balanced: an element opened inside an entity must
/// also close inside it, and a closing tag inside an entity must close an
/// element opened in the same entity (XML 1.0 § 4.3.2).
struct OpenElement {
	name: Name,
	entity_depth: usize,
	/// Namespace prefixes declared by `xmlns:*` attributes of this element,
	/// in scope until the element closes.
	prefixes: Vec<CData>,
}

/// Part of the name before the first colon, if any.
fn name_prefix(name: &str) -> Option<&str> {
	match name.split_once(':') {
		Some(("", _)) => None,
		Some((prefix, _)) => Some(prefix),
		None => None,
	}
}

fn is_xml_whitespace(s: &CDataStr) -> bool {
	s.as_bytes()
		.iter()
		.all(|&c| c == b' ' || c == b'\t' || c == b'\n' || c == b'\r')
}

/**
# Incremental XML 1.0 well-formedness parser

The [`Parser`] accepts raw document bytes through [`Parser::feed`] and
produces [`Event`]s through [`Parser::read`]. Bytes run through encoding
detection and conversion (see [`crate::input::InputFrame`]), tokenization,
and the document grammar checks implemented here.

General entity references are resolved at the point of use: the replacement
text is pushed as a new input frame and tokenized in place, so events
generated from replacement text appear exactly where the reference stood.
Expansion is bounded by the configured depth and cumulative size limits.

If the fed data is not sufficient to produce an event, [`Parser::read`]
returns an I/O error of kind [`io::ErrorKind::WouldBlock`]; such errors may
be retried after feeding more data. All other errors are fatal and will be
returned again on every subsequent call.
*/
pub struct Parser {
	lexer: Lexer,
	inputs: InputStack,
	entities: EntityMap,
	guard: ExpansionGuard,
	resolver: Box<dyn EntityResolver>,
	state: State,
	element_stack: Vec<OpenElement>,
	attributes: HashMap<Name, CData>,
	attribute_name: Option<Name>,
	/// position of the opening `<` of the element currently being started
	element_position: Position,
	/// position of the `</` of the closing tag currently being parsed
	foot_position: Position,
	document_position: Position,
	version: Option<XMLVersion>,
	started: bool,
	seen_doctype: bool,
	/// position at which reading of the current token began
	token_start: Option<Position>,
	/// total bytes handed to the lexer, mirrors its internal byte counter
	lexed_total: usize,
	/// position of the most recently completed token
	last_position: Position,
	/// Internal queue for events which will be returned from the current
	/// and potentially future calls to `read()`.
	///
	/// In contrast to the lexer, the parser may come into situations where
	/// multiple events need to be pushed from a single token, which is why
	/// the queue exists as a buffer.
	eventq: VecDeque<Event>,
	err: Option<Box<Error>>,
	opts: ParserOptions,
}

impl Parser {
	/// Create a new parser with default options.
	pub fn new() -> Parser {
		Self::with_options(ParserOptions::default())
	}

	/// Create a new parser with the given options.
	pub fn with_options(opts: ParserOptions) -> Parser {
		let document = InputFrame::document(
			opts.max_buffer_capacity,
			opts.explicit_encoding,
			opts.default_encoding,
		);
		let start = Position {
			line: 1,
			column: 1,
			byte: 0,
		};
		Parser {
			lexer: Lexer::with_options(
				LexerOptions::default().max_token_length(opts.max_token_length),
			),
			inputs: InputStack::new(document),
			entities: EntityMap::new(),
			guard: ExpansionGuard::new(opts.max_entity_depth, opts.max_expansion_bytes),
			resolver: Box::new(NoResolver),
			state: State::Initial,
			element_stack: Vec::new(),
			attributes: HashMap::new(),
			attribute_name: None,
			element_position: start,
			foot_position: start,
			document_position: start,
			version: None,
			started: false,
			seen_doctype: false,
			token_start: None,
			lexed_total: 0,
			last_position: start,
			eventq: VecDeque::new(),
			err: None,
			opts: opts,
		}
	}

	/// Install the resolver through which external entity content is
	/// obtained.
	///
	/// The default resolver declines everything, making references to
	/// external entities behave like references to undeclared entities.
	pub fn set_resolver(&mut self, resolver: Box<dyn EntityResolver>) {
		self.resolver = resolver;
	}

	/// Current read position of the active input source.
	pub fn position(&self) -> Position {
		self.inputs.top().position()
	}

	/// Feed a chunk of document bytes to the parser.
	///
	/// The bytes are staged, decoded as far as possible and kept until
	/// consumed by calls to [`Parser::read`]. Decode failures do not
	/// surface here; [`Parser::read`] reports them once the text decoded
	/// before the failure has been processed, so [`Parser::position`]
	/// points at the offending byte.
	pub fn feed(&mut self, data: &[u8]) -> Result<()> {
		self.check_poison()?;
		self.inputs.document_mut().push_bytes(data);
		Ok(())
	}

	/// Signal the end of the document byte stream.
	pub fn feed_eof(&mut self) -> Result<()> {
		self.check_poison()?;
		self.inputs.document_mut().set_eof();
		Ok(())
	}

	/// Release all temporary buffers or other ephemeral allocations.
	///
	/// This is sensible to call when it is expected that no more data will
	/// be processed by the parser for a while and the memory is better used
	/// elsewhere.
	pub fn release_temporaries(&mut self) {
		self.lexer.release_temporaries();
		self.eventq.shrink_to_fit();
		self.element_stack.shrink_to_fit();
		self.attributes.shrink_to_fit();
	}

	/// Emit an event into the event queue.
	fn emit_event(&mut self, ev: Event) {
		self.eventq.push_back(ev);
	}

	/// Poison the parser, making it return the same error for all eternity.
	fn poison(&mut self, e: Error) {
		self.err = Some(Box::new(e))
	}

	/// Check if the parser is poisoned and return the corresponding error.
	fn check_poison(&self) -> Result<()> {
		if let Some(e) = self.err.as_ref() {
			Err((**e).clone())
		} else {
			Ok(())
		}
	}

	/// Fetch the next token from the active input frame.
	///
	/// Exhausted entity frames are popped here, which is what splices the
	/// surrounding source back in; a token interrupted by the end of an
	/// entity continues seamlessly in the outer frame.
	///
	/// Tokens are attributed to the position of their first byte. The lexer
	/// may consume further bytes past the end of the token it returns (most
	/// prominently the `<` which terminates character data), so the frame is
	/// advanced in segments, capturing the position wherever the lexer's
	/// token boundaries fall inside the consumed bytes.
	fn next_token(&mut self) -> Result<Option<Token>> {
		loop {
			if self.inputs.pop_exhausted() {
				if let Some(open) = self.element_stack.last() {
					if open.entity_depth > self.inputs.depth() {
						return Err(Error::NotWellFormed(WFError::UnbalancedEntity));
					}
				}
			}
			if let Some(e) = self.inputs.top_mut().take_decode_error() {
				// all text decoded before the failure has been lexed; the
				// frame position now names the byte where decoding stopped
				return Err(e);
			}
			let at_document_eof = self.inputs.depth() == 1 && self.inputs.top().at_eof();
			self.lexer.set_replacement_context(self.inputs.depth() > 1);
			let frame = self.inputs.top_mut();
			let lexed_before = self.lexed_total;
			let (result, consumed) = {
				let mut window = frame.window();
				let before = window.len();
				let result = self.lexer.lex_bytes(&mut window, at_document_eof);
				(result, before - window.len())
			};
			self.lexed_total = lexed_before.wrapping_add(consumed);
			match result {
				Ok(Some(tok)) => {
					let start_off = tok.metrics().start().wrapping_sub(lexed_before);
					let mut advanced = 0;
					let position = if start_off <= consumed {
						frame.advance(start_off);
						advanced = start_off;
						frame.position()
					} else {
						// the token began in an earlier call; the position
						// was captured when those bytes were consumed
						match self.token_start {
							Some(p) => p,
							None => frame.position(),
						}
					};
					self.token_start = None;
					let next_off = self.lexer.next_token_start().wrapping_sub(lexed_before);
					if next_off >= advanced && next_off <= consumed {
						frame.advance(next_off - advanced);
						advanced = next_off;
						self.token_start = Some(frame.position());
					}
					frame.advance(consumed - advanced);
					self.last_position = position;
					return Ok(Some(tok));
				}
				Ok(None) => {
					frame.advance(consumed);
					if let Some(e) = frame.take_decode_error() {
						return Err(e);
					}
					return Ok(None);
				}
				Err(Error::IO(ioerr)) => {
					let next_off = self.lexer.next_token_start().wrapping_sub(lexed_before);
					if next_off <= consumed {
						frame.advance(next_off);
						self.token_start = Some(frame.position());
						frame.advance(consumed - next_off);
					} else {
						frame.advance(consumed);
					}
					if ioerr.kind() == io::ErrorKind::WouldBlock {
						if self.inputs.depth() > 1 {
							// an entity frame ran dry mid-token; the token
							// continues in the outer frame
							continue;
						}
						if let Some(e) = self.inputs.top_mut().take_decode_error() {
							return Err(e);
						}
					}
					return Err(Error::IO(ioerr));
				}
				Err(e) => {
					frame.advance(consumed);
					// a truncated construct at the failure point is an
					// artifact of decoding having stopped there
					if let Some(decode_err) = frame.take_decode_error() {
						return Err(decode_err);
					}
					return Err(e);
				}
			}
		}
	}

	/// Emit the start-of-document event if it has not been emitted yet.
	fn ensure_started(&mut self) {
		if self.started {
			return;
		}
		self.started = true;
		self.emit_event(Event::StartDocument(
			self.last_position,
			self.version.unwrap_or(XMLVersion::V1_0),
		));
	}

	/// Push the element onto the open-element stack and prepare attribute
	/// collection.
	fn begin_element(&mut self, name: Name) -> Result<State> {
		self.ensure_started();
		self.element_position = self.last_position;
		debug_assert!(self.attributes.is_empty());
		self.element_stack.push(OpenElement {
			name: name,
			entity_depth: self.inputs.depth(),
			prefixes: Vec::new(),
		});
		Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
	}

	/// Emit the start-of-element event with the collected attributes.
	///
	/// Namespace declarations made by this element enter into scope before
	/// the element and attribute names are checked against the in-scope
	/// prefixes.
	fn finish_element_head(&mut self) -> Result<()> {
		let name = match self.element_stack.last() {
			Some(open) => open.name.clone(),
			None => panic!("element head without open element"),
		};
		let attributes = std::mem::take(&mut self.attributes);
		let mut declared = Vec::new();
		for attr in attributes.keys() {
			if let Some(prefix) = attr.as_str().strip_prefix("xmlns:") {
				if !prefix.is_empty() {
					// SAFETY: substring of a validated Name, all chars are
					// valid XML chars
					declared.push(unsafe { CData::from_str_unchecked(prefix) });
				}
			}
		}
		if let Some(open) = self.element_stack.last_mut() {
			open.prefixes = declared;
		}
		if let Some(prefix) = name_prefix(name.as_str()) {
			self.check_prefix(prefix)?;
		}
		for attr in attributes.keys() {
			if let Some(prefix) = name_prefix(attr.as_str()) {
				self.check_prefix(prefix)?;
			}
		}
		self.emit_event(Event::StartElement(self.element_position, name, attributes));
		Ok(())
	}

	/// Check a used namespace prefix against the declarations in scope.
	fn check_prefix(&mut self, prefix: &str) -> Result<()> {
		if prefix == "xml" || prefix == "xmlns" {
			return Ok(());
		}
		for open in self.element_stack.iter().rev() {
			if open.prefixes.iter().any(|p| p == prefix) {
				return Ok(());
			}
		}
		match self.opts.strictness {
			Strictness::Strict => Err(Error::NotWellFormed(WFError::UndeclaredNamespacePrefix)),
			Strictness::Permissive => {
				self.emit_event(Event::Warning(
					self.element_position,
					WFError::UndeclaredNamespacePrefix,
				));
				Ok(())
			}
		}
	}

	/// Pop an element off the stack and emit the corresponding EndElement
	/// event.
	fn close_element(&mut self, position: Position) -> State {
		let open = match self.element_stack.pop() {
			Some(open) => open,
			None => panic!("element close without open element"),
		};
		self.emit_event(Event::EndElement(position, open.name));
		if self.element_stack.is_empty() {
			State::End
		} else {
			State::Document(DocSt::Content)
		}
	}

	/// Resolve a general entity reference and splice its replacement in as
	/// a new input frame.
	fn expand_entity(&mut self, name: Name, in_attribute: bool) -> Result<()> {
		let position = self.last_position;
		let def = match self.entities.get(&name) {
			Some(def) => def.clone(),
			None => return self.skip_unresolvable(position),
		};
		match def {
			EntityDef::Internal(text) => {
				self.guard.check(self.inputs.depth() - 1, text.len())?;
				self.emit_event(Event::ReferenceResolved(
					position,
					name.clone(),
					ReplacementOrigin::Internal,
				));
				self.inputs.push(InputFrame::internal_entity(name, &text));
				Ok(())
			}
			EntityDef::External {
				public_id,
				system_id,
			} => {
				if in_attribute {
					return Err(Error::NotWellFormed(WFError::ExternalEntityForbidden));
				}
				let content = self
					.resolver
					.resolve(public_id.as_deref(), &system_id)
					.map_err(Error::io)?;
				let content = match content {
					Some(content) => content,
					None => return self.skip_unresolvable(position),
				};
				self.guard.check(self.inputs.depth() - 1, content.len())?;
				let mut frame = InputFrame::external_entity(
					name.clone(),
					self.opts.max_buffer_capacity,
					self.opts.default_encoding,
				);
				frame.push_bytes(&content);
				frame.set_eof();
				frame.strip_text_decl();
				self.emit_event(Event::ReferenceResolved(
					position,
					name,
					ReplacementOrigin::External,
				));
				self.inputs.push(frame);
				Ok(())
			}
		}
	}

	/// Handle a reference to an entity with no usable definition.
	fn skip_unresolvable(&mut self, position: Position) -> Result<()> {
		match self.opts.strictness {
			Strictness::Strict => Err(Error::NotWellFormed(WFError::UndeclaredEntity)),
			Strictness::Permissive => {
				self.emit_event(Event::Warning(position, WFError::UndeclaredEntity));
				Ok(())
			}
		}
	}

	/// Initial parser state.
	///
	/// See [`State::Initial`].
	fn parse_initial(&mut self) -> Result<State> {
		match self.next_token()? {
			Some(Token::XMLDeclStart(_)) => {
				self.document_position = self.last_position;
				Ok(State::Decl {
					substate: DeclSt::VersionName,
					version: None,
				})
			}
			Some(tok) => self.parse_prolog_token(tok),
			None => Err(Error::wfeof(ERRCTX_DOCBEGIN)),
		}
	}

	/// XML declaration state.
	///
	/// See [`State::Decl`].
	fn parse_decl(&mut self, state: DeclSt, version: Option<XMLVersion>) -> Result<State> {
		match self.next_token()? {
			None => Err(Error::wfeof(ERRCTX_XML_DECL)),
			Some(Token::Name(_, name)) => match state {
				DeclSt::VersionName => {
					if name == "version" {
						Ok(State::Decl {
							substate: DeclSt::VersionEq,
							version: version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"'<?xml' must be followed by version attribute",
						)))
					}
				}
				DeclSt::EncodingName => {
					if name == "encoding" {
						Ok(State::Decl {
							substate: DeclSt::EncodingEq,
							version: version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax("'version' attribute must be followed by '?>' or 'encoding' attribute")))
					}
				}
				DeclSt::StandaloneName => {
					if name == "standalone" {
						Ok(State::Decl {
							substate: DeclSt::StandaloneEq,
							version: version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax("'encoding' attribute must be followed by '?>' or 'standalone' attribute")))
					}
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_NAME,
					None,
				))),
			},
			Some(Token::Eq(_)) => Ok(State::Decl {
				substate: match state {
					DeclSt::VersionEq => Ok(DeclSt::VersionValue),
					DeclSt::EncodingEq => Ok(DeclSt::EncodingValue),
					DeclSt::StandaloneEq => Ok(DeclSt::StandaloneValue),
					_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
						ERRCTX_XML_DECL,
						Token::NAME_EQ,
						None,
					))),
				}?,
				version: version,
			}),
			Some(Token::AttributeValue(_, v)) => match state {
				DeclSt::VersionValue => {
					if v == "1.0" {
						Ok(State::Decl {
							substate: DeclSt::EncodingName,
							version: Some(XMLVersion::V1_0),
						})
					} else {
						Err(Error::Unsupported("XML versions other than 1.0"))
					}
				}
				DeclSt::EncodingValue => {
					// this confirms or switches the conversion applied to
					// the remaining document bytes; a conflict with the
					// detected encoding is fatal
					self.inputs
						.document_mut()
						.declare_encoding(&v)
						.map_err(Error::Encoding)?;
					Ok(State::Decl {
						substate: DeclSt::StandaloneName,
						version: version,
					})
				}
				DeclSt::StandaloneValue => {
					if v == "yes" || v == "no" {
						Ok(State::Decl {
							substate: DeclSt::Close,
							version: version,
						})
					} else {
						Err(Error::NotWellFormed(WFError::InvalidSyntax(
							"standalone must be 'yes' or 'no'",
						)))
					}
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_ATTRIBUTEVALUE,
					None,
				))),
			},
			Some(Token::XMLDeclEnd(_)) => match state {
				DeclSt::EncodingName | DeclSt::StandaloneName | DeclSt::Close => {
					let version = version.unwrap();
					self.version = Some(version);
					self.started = true;
					self.emit_event(Event::StartDocument(self.document_position, version));
					Ok(State::Prolog)
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_XML_DECL,
					Token::NAME_XMLDECLEND,
					None,
				))),
			},
			Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_XML_DECL,
				other.name(),
				None,
			))),
		}
	}

	/// Handle a token in prolog position (before the root element).
	fn parse_prolog_token(&mut self, tok: Token) -> Result<State> {
		match tok {
			Token::Comment(_, data) => {
				self.ensure_started();
				self.emit_event(Event::Comment(self.last_position, data));
				Ok(State::Prolog)
			}
			Token::ProcessingInstruction(_, target, data) => {
				self.ensure_started();
				self.emit_event(Event::ProcessingInstruction(
					self.last_position,
					target,
					data,
				));
				Ok(State::Prolog)
			}
			Token::DoctypeStart(_, _) => {
				self.ensure_started();
				if self.seen_doctype {
					Err(Error::NotWellFormed(WFError::UnexpectedToken(
						ERRCTX_DOCBEGIN,
						Token::NAME_DOCTYPESTART,
						Some(&[Token::NAME_ELEMENTHEADSTART]),
					)))
				} else {
					self.seen_doctype = true;
					Ok(State::Subset)
				}
			}
			Token::ElementHeadStart(_, name) => self.begin_element(name),
			Token::Text(_, s) if is_xml_whitespace(&s) => Ok(State::Prolog),
			tok => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_DOCBEGIN,
				tok.name(),
				Some(&[
					Token::NAME_ELEMENTHEADSTART,
					Token::NAME_DOCTYPESTART,
					Token::NAME_COMMENT,
					Token::NAME_PROCESSINGINSTRUCTION,
				]),
			))),
		}
	}

	/// Prolog state, between XML declaration and root element.
	///
	/// See [`State::Prolog`].
	fn parse_prolog(&mut self) -> Result<State> {
		match self.next_token()? {
			Some(tok) => self.parse_prolog_token(tok),
			None => Err(Error::wfeof(ERRCTX_DOCBEGIN)),
		}
	}

	/// Internal subset state.
	///
	/// See [`State::Subset`].
	fn parse_subset(&mut self) -> Result<State> {
		match self.next_token()? {
			Some(Token::EntityDecl(_, name, def)) => {
				// the first declaration binds; later ones for the same name
				// are ignored
				self.entities.declare(name, def);
				Ok(State::Subset)
			}
			Some(Token::Comment(_, data)) => {
				self.emit_event(Event::Comment(self.last_position, data));
				Ok(State::Subset)
			}
			Some(Token::ProcessingInstruction(_, target, data)) => {
				self.emit_event(Event::ProcessingInstruction(
					self.last_position,
					target,
					data,
				));
				Ok(State::Subset)
			}
			Some(Token::DoctypeEnd(_)) => Ok(State::Prolog),
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_DOCTYPE,
				tok.name(),
				None,
			))),
			None => Err(Error::wfeof(ERRCTX_DOCTYPE)),
		}
	}

	/// Element header state.
	///
	/// See [`DocSt::Element`].
	fn parse_element(&mut self, state: ElementSt) -> Result<State> {
		match self.next_token()? {
			None => Err(Error::wfeof(ERRCTX_ELEMENT)),
			Some(Token::Name(_, name)) => match state {
				ElementSt::AttrName => {
					if self.attributes.contains_key(&name) {
						return Err(Error::NotWellFormed(WFError::DuplicateAttribute));
					}
					self.attribute_name = Some(name);
					Ok(State::Document(DocSt::Element(ElementSt::AttrEq)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_NAME,
					None,
				))),
			},
			Some(Token::Eq(_)) => match state {
				ElementSt::AttrEq => Ok(State::Document(DocSt::Element(ElementSt::AttrValue))),
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_EQ,
					None,
				))),
			},
			Some(Token::AttributeValue(_, val)) => match state {
				ElementSt::AttrValue => {
					let name = match self.attribute_name.take() {
						Some(name) => name,
						None => panic!("attribute value without name"),
					};
					self.attributes.insert(name, val);
					Ok(State::Document(DocSt::Element(ElementSt::AttrName)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ATTRIBUTEVALUE,
					None,
				))),
			},
			Some(Token::Reference(_, name)) => match state {
				ElementSt::AttrValue => {
					self.expand_entity(name, true)?;
					Ok(State::Document(DocSt::Element(ElementSt::AttrValue)))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_REFERENCE,
					None,
				))),
			},
			Some(Token::ElementHFEnd(_)) => match state {
				ElementSt::AttrName => {
					self.finish_element_head()?;
					Ok(State::Document(DocSt::Content))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ELEMENTHFEND,
					None,
				))),
			},
			Some(Token::ElementHeadClose(_)) => match state {
				ElementSt::AttrName => {
					self.finish_element_head()?;
					Ok(self.close_element(self.last_position))
				}
				_ => Err(Error::NotWellFormed(WFError::UnexpectedToken(
					ERRCTX_ELEMENT,
					Token::NAME_ELEMENTHEADCLOSE,
					None,
				))),
			},
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_ELEMENT,
				tok.name(),
				None,
			))),
		}
	}

	/// Element content state.
	///
	/// See [`DocSt::Content`].
	fn parse_content(&mut self) -> Result<State> {
		match self.next_token()? {
			Some(Token::Text(_, s)) => {
				self.emit_event(Event::Text(self.last_position, s));
				Ok(State::Document(DocSt::Content))
			}
			Some(Token::CDataSection(_, s)) => {
				self.emit_event(Event::CDataSection(self.last_position, s));
				Ok(State::Document(DocSt::Content))
			}
			Some(Token::Comment(_, s)) => {
				self.emit_event(Event::Comment(self.last_position, s));
				Ok(State::Document(DocSt::Content))
			}
			Some(Token::ProcessingInstruction(_, target, data)) => {
				self.emit_event(Event::ProcessingInstruction(
					self.last_position,
					target,
					data,
				));
				Ok(State::Document(DocSt::Content))
			}
			Some(Token::Reference(_, name)) => {
				self.expand_entity(name, false)?;
				Ok(State::Document(DocSt::Content))
			}
			Some(Token::ElementHeadStart(_, name)) => self.begin_element(name),
			Some(Token::ElementFootStart(_, name)) => {
				let open = match self.element_stack.last() {
					Some(open) => open,
					None => panic!("content state without open element"),
				};
				if open.name != name {
					Err(Error::NotWellFormed(WFError::ElementMismatch))
				} else if open.entity_depth != self.inputs.depth() {
					Err(Error::NotWellFormed(WFError::UnbalancedEntity))
				} else {
					self.foot_position = self.last_position;
					Ok(State::Document(DocSt::ElementFoot))
				}
			}
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_TEXT,
				tok.name(),
				Some(&[
					Token::NAME_TEXT,
					Token::NAME_ELEMENTHEADSTART,
					Token::NAME_ELEMENTFOOTSTART,
				]),
			))),
			None => Err(Error::wfeof(ERRCTX_TEXT)),
		}
	}

	/// Closing tag state.
	///
	/// See [`DocSt::ElementFoot`].
	fn parse_element_foot(&mut self) -> Result<State> {
		match self.next_token()? {
			Some(Token::ElementHFEnd(_)) => Ok(self.close_element(self.foot_position)),
			Some(other) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_ELEMENT_FOOT,
				other.name(),
				Some(&[Token::NAME_ELEMENTHFEND]),
			))),
			None => Err(Error::wfeof(ERRCTX_ELEMENT_FOOT)),
		}
	}

	/// Epilog state, after the root element.
	///
	/// See [`State::End`].
	fn parse_end(&mut self) -> Result<State> {
		match self.next_token()? {
			None => {
				let position = self.inputs.top().position();
				self.emit_event(Event::EndDocument(position));
				Ok(State::Eof)
			}
			// whitespace after the root element is explicitly allowed
			Some(Token::Text(_, s)) if is_xml_whitespace(&s) => Ok(State::End),
			Some(Token::Comment(_, s)) => {
				self.emit_event(Event::Comment(self.last_position, s));
				Ok(State::End)
			}
			Some(Token::ProcessingInstruction(_, target, data)) => {
				self.emit_event(Event::ProcessingInstruction(
					self.last_position,
					target,
					data,
				));
				Ok(State::End)
			}
			Some(tok) => Err(Error::NotWellFormed(WFError::UnexpectedToken(
				ERRCTX_DOCEND,
				tok.name(),
				Some(&["end-of-file"]),
			))),
		}
	}

	/// Read a single event.
	///
	/// If the end of a well-formed document has been reached, `None` is
	/// returned. I/O errors (including [`io::ErrorKind::WouldBlock`] for
	/// starved input) may be retried, all other errors are fatal.
	pub fn read(&mut self) -> Result<Option<Event>> {
		self.check_poison()?;
		loop {
			if let Some(ev) = self.eventq.pop_front() {
				return Ok(Some(ev));
			}

			let result = match self.state {
				State::Initial => self.parse_initial(),
				State::Decl { substate, version } => self.parse_decl(substate, version),
				State::Prolog => self.parse_prolog(),
				State::Subset => self.parse_subset(),
				State::Document(DocSt::Element(substate)) => self.parse_element(substate),
				State::Document(DocSt::Content) => self.parse_content(),
				State::Document(DocSt::ElementFoot) => self.parse_element_foot(),
				State::End => self.parse_end(),
				State::Eof => return Ok(None),
			};
			self.state = match result {
				Ok(st) => st,
				// pass through I/O errors without poisoning the parser
				Err(Error::IO(ioerr)) => return Err(Error::IO(ioerr)),
				// poison the parser for everything else to avoid emitting
				// illegal data
				Err(other) => {
					self.poison(other.clone());
					return Err(other);
				}
			};
		}
	}
}

impl fmt::Debug for Parser {
	fn fmt<'f>(&self, f: &'f mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Parser").field("state", &self.state).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::encoding::Encoding;
	use std::convert::TryInto;

	fn drain(p: &mut Parser, evs: &mut Vec<Event>) -> Result<()> {
		loop {
			match p.read() {
				Ok(Some(ev)) => evs.push(ev),
				Ok(None) => return Ok(()),
				Err(e) => return Err(e),
			}
		}
	}

	fn parse_with(mut p: Parser, data: &[u8]) -> (Vec<Event>, Result<()>) {
		let mut evs = Vec::new();
		if let Err(e) = p.feed(data) {
			return (evs, Err(e));
		}
		if let Err(e) = p.feed_eof() {
			return (evs, Err(e));
		}
		let r = drain(&mut p, &mut evs);
		(evs, r)
	}

	fn parse_bytes(data: &[u8]) -> (Vec<Event>, Result<()>) {
		parse_with(Parser::new(), data)
	}

	fn parse_chunked(data: &[u8], chunk_size: usize) -> (Vec<Event>, Result<()>) {
		let mut p = Parser::new();
		let mut evs = Vec::new();
		for chunk in data.chunks(chunk_size) {
			if let Err(e) = p.feed(chunk) {
				return (evs, Err(e));
			}
			loop {
				match p.read() {
					Ok(Some(ev)) => evs.push(ev),
					Ok(None) => return (evs, Ok(())),
					Err(Error::IO(ioerr)) if ioerr.kind() == io::ErrorKind::WouldBlock => break,
					Err(e) => return (evs, Err(e)),
				}
			}
		}
		if let Err(e) = p.feed_eof() {
			return (evs, Err(e));
		}
		let r = drain(&mut p, &mut evs);
		(evs, r)
	}

	fn utf16le(s: &str) -> Vec<u8> {
		let mut out = vec![0xffu8, 0xfe];
		for unit in s.encode_utf16() {
			out.extend_from_slice(&unit.to_le_bytes());
		}
		out
	}

	#[test]
	fn parser_parse_minimal_document() {
		let (mut evs, r) = parse_bytes(b"<?xml version=\"1.0\"?><root attr=\"v\">text</root>");
		r.unwrap();
		match evs.remove(0) {
			Event::StartDocument(pos, XMLVersion::V1_0) => {
				assert_eq!(pos.byte, 0);
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match evs.remove(0) {
			Event::StartElement(pos, name, attributes) => {
				assert_eq!(name, "root");
				assert_eq!(pos.byte, 21);
				assert_eq!(pos.line, 1);
				assert_eq!(pos.column, 22);
				assert_eq!(attributes.len(), 1);
				let key: Name = "attr".try_into().unwrap();
				assert_eq!(attributes[&key], "v");
			}
			other => panic!("unexpected event: {:?}", other),
		}
		match evs.remove(0) {
			Event::Text(_, s) => assert_eq!(s, "text"),
			other => panic!("unexpected event: {:?}", other),
		}
		match evs.remove(0) {
			Event::EndElement(_, name) => assert_eq!(name, "root"),
			other => panic!("unexpected event: {:?}", other),
		}
		match evs.remove(0) {
			Event::EndDocument(_) => (),
			other => panic!("unexpected event: {:?}", other),
		}
		assert_eq!(evs.len(), 0);
	}

	#[test]
	fn parser_parse_empty_element_without_declaration() {
		let (evs, r) = parse_bytes(b"<root/>");
		r.unwrap();
		assert!(matches!(&evs[0], Event::StartDocument(_, XMLVersion::V1_0)));
		assert!(matches!(&evs[1], Event::StartElement(_, name, attrs) if name == "root" && attrs.is_empty()));
		assert!(matches!(&evs[2], Event::EndElement(_, name) if name == "root"));
		assert!(matches!(&evs[3], Event::EndDocument(_)));
		assert_eq!(evs.len(), 4);
	}

	#[test]
	fn parser_parse_comments_and_pis_around_root() {
		let (evs, r) =
			parse_bytes(b"<?xml version=\"1.0\"?>\n<!--before--><?target some data?><root/><!--after-->");
		r.unwrap();
		assert!(matches!(&evs[0], Event::StartDocument(..)));
		assert!(matches!(&evs[1], Event::Comment(_, s) if s == "before"));
		assert!(
			matches!(&evs[2], Event::ProcessingInstruction(_, t, Some(d)) if t == "target" && d == "some data")
		);
		assert!(matches!(&evs[3], Event::StartElement(..)));
		assert!(matches!(&evs[4], Event::EndElement(..)));
		assert!(matches!(&evs[5], Event::Comment(_, s) if s == "after"));
		assert!(matches!(&evs[6], Event::EndDocument(_)));
	}

	#[test]
	fn parser_parse_cdata_section() {
		let (evs, r) = parse_bytes(b"<r>a<![CDATA[<markup/> & stuff]]>b</r>");
		r.unwrap();
		assert!(matches!(&evs[2], Event::Text(_, s) if s == "a"));
		assert!(matches!(&evs[3], Event::CDataSection(_, s) if s == "<markup/> & stuff"));
		assert!(matches!(&evs[4], Event::Text(_, s) if s == "b"));
	}

	#[test]
	fn parser_rejects_mismatched_tags() {
		let (evs, r) = parse_bytes(b"<a><b></a></b>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::ElementMismatch)
		));
		// everything before the mismatched closing tag came through
		assert!(matches!(&evs[1], Event::StartElement(_, name, _) if name == "a"));
		assert!(matches!(&evs[2], Event::StartElement(_, name, _) if name == "b"));
		assert_eq!(evs.len(), 3);
	}

	#[test]
	fn parser_rejects_duplicate_attribute() {
		let (_, r) = parse_bytes(b"<a x=\"1\" x=\"2\"/>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::DuplicateAttribute)
		));
	}

	#[test]
	fn parser_rejects_text_after_root() {
		let (_, r) = parse_bytes(b"<r/>trailing");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCEND, ..))
		));
	}

	#[test]
	fn parser_allows_whitespace_epilog() {
		let (_, r) = parse_bytes(b"<r/>\n\t ");
		r.unwrap();
	}

	#[test]
	fn parser_reports_eof_inside_element() {
		let (_, r) = parse_bytes(b"<root attr=\"v");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::InvalidEof(_))
		));
	}

	#[test]
	fn parser_reports_eof_inside_content() {
		let (_, r) = parse_bytes(b"<root>text");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::InvalidEof(ERRCTX_TEXT))
		));
	}

	#[test]
	fn parser_expands_internal_entity_in_text() {
		let (evs, r) = parse_bytes(b"<!DOCTYPE r [<!ENTITY e \"foo\">]><r>&e;</r>");
		r.unwrap();
		assert!(matches!(&evs[1], Event::StartElement(_, name, _) if name == "r"));
		assert!(
			matches!(&evs[2], Event::ReferenceResolved(_, name, ReplacementOrigin::Internal) if name == "e")
		);
		assert!(matches!(&evs[3], Event::Text(_, s) if s == "foo"));
		assert!(matches!(&evs[4], Event::EndElement(..)));
	}

	#[test]
	fn parser_expands_nested_internal_entities() {
		let (evs, r) = parse_bytes(
			b"<!DOCTYPE r [<!ENTITY inner \"x\"><!ENTITY outer \"a&inner;b\">]><r>&outer;</r>",
		);
		r.unwrap();
		let text: String = evs
			.iter()
			.filter_map(|ev| match ev {
				Event::Text(_, s) => Some(s.as_str()),
				_ => None,
			})
			.collect();
		assert_eq!(text, "axb");
	}

	#[test]
	fn parser_expands_entity_in_attribute_value() {
		let (evs, r) = parse_bytes(b"<!DOCTYPE r [<!ENTITY e \"x\">]><r a=\"1&e;2\"/>");
		r.unwrap();
		let ev = evs
			.iter()
			.find(|ev| matches!(ev, Event::StartElement(..)))
			.unwrap();
		match ev {
			Event::StartElement(_, _, attributes) => {
				let key: Name = "a".try_into().unwrap();
				assert_eq!(attributes[&key], "1x2");
			}
			_ => unreachable!(),
		}
	}

	#[test]
	fn parser_keeps_quote_from_entity_replacement_in_attribute_value() {
		// the quote arrives via replacement text and must not close the
		// literal (XML 1.0 § 4.4.5)
		let (evs, r) = parse_bytes(b"<!DOCTYPE r [<!ENTITY q \"&#34;\">]><r a=\"x&q;y\"/>");
		r.unwrap();
		let ev = evs
			.iter()
			.find(|ev| matches!(ev, Event::StartElement(..)))
			.unwrap();
		match ev {
			Event::StartElement(_, _, attributes) => {
				let key: Name = "a".try_into().unwrap();
				assert_eq!(attributes[&key], "x\"y");
			}
			_ => unreachable!(),
		}
	}

	#[test]
	fn parser_end_element_position_points_at_closing_tag() {
		let (evs, r) = parse_bytes(b"<r>text\n</r>");
		r.unwrap();
		match &evs[3] {
			Event::EndElement(pos, _) => {
				assert_eq!(pos.line, 2);
				assert_eq!(pos.column, 1);
				assert_eq!(pos.byte, 8);
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_locates_malformed_byte_after_draining_decoded_text() {
		let mut p = Parser::new();
		p.feed(b"<a>x\xff").unwrap();
		let mut evs = Vec::new();
		let err = loop {
			match p.read() {
				Ok(Some(ev)) => evs.push(ev),
				Ok(None) => panic!("parser asked for more data instead of failing"),
				Err(e) => break e,
			}
		};
		assert!(matches!(
			err,
			Error::Encoding(EncodingError::Malformed(_, 0xff))
		));
		// everything decoded before the bad byte was still parsed
		assert!(matches!(&evs[1], Event::StartElement(..)));
		assert_eq!(
			p.position(),
			Position {
				line: 1,
				column: 5,
				byte: 4
			}
		);
	}

	#[test]
	fn parser_rejects_undeclared_entity_when_strict() {
		let (_, r) = parse_bytes(b"<r>&nope;</r>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UndeclaredEntity)
		));
	}

	#[test]
	fn parser_warns_about_undeclared_entity_when_permissive() {
		let p = Parser::with_options(ParserOptions::default().strictness(Strictness::Permissive));
		let (evs, r) = parse_with(p, b"<r>&nope;</r>");
		r.unwrap();
		assert!(matches!(
			&evs[2],
			Event::Warning(_, WFError::UndeclaredEntity)
		));
		assert!(matches!(&evs[3], Event::EndElement(..)));
	}

	#[test]
	fn parser_rejects_undeclared_prefix_when_strict() {
		let (_, r) = parse_bytes(b"<x:r attr='v'/>");
		assert_eq!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UndeclaredNamespacePrefix)
		);
	}

	#[test]
	fn parser_rejects_undeclared_attribute_prefix_when_strict() {
		let (_, r) = parse_bytes(b"<r x:attr='v'/>");
		assert_eq!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UndeclaredNamespacePrefix)
		);
	}

	#[test]
	fn parser_warns_about_undeclared_prefix_when_permissive() {
		let p = Parser::with_options(ParserOptions::default().strictness(Strictness::Permissive));
		let (evs, r) = parse_with(p, b"<x:r/>");
		r.unwrap();
		assert!(matches!(
			&evs[1],
			Event::Warning(_, WFError::UndeclaredNamespacePrefix)
		));
		assert!(matches!(&evs[2], Event::StartElement(..)));
	}

	#[test]
	fn parser_accepts_prefix_declared_on_same_element() {
		let (evs, r) = parse_bytes(b"<x:r xmlns:x='urn:x' x:attr='v'/>");
		r.unwrap();
		match &evs[1] {
			Event::StartElement(_, name, attrs) => {
				assert_eq!(name, "x:r");
				assert_eq!(attrs.len(), 2);
			}
			other => panic!("unexpected event: {:?}", other),
		}
	}

	#[test]
	fn parser_accepts_prefix_declared_on_ancestor() {
		let (_, r) = parse_bytes(b"<r xmlns:p='urn:p'><p:child/></r>");
		r.unwrap();
	}

	#[test]
	fn parser_prefix_scope_ends_with_declaring_element() {
		let (_, r) = parse_bytes(b"<r><a xmlns:p='urn:p'/><p:b/></r>");
		assert_eq!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UndeclaredNamespacePrefix)
		);
	}

	#[test]
	fn parser_accepts_predefined_xml_prefix() {
		let (_, r) = parse_bytes(b"<r xml:lang='en'/>");
		r.unwrap();
	}

	#[test]
	fn parser_rejects_recursive_expansion_at_depth_limit() {
		let p = Parser::with_options(ParserOptions::default().max_entity_depth(2));
		let (_, r) = parse_with(
			p,
			b"<!DOCTYPE r [<!ENTITY a \"&b;\"><!ENTITY b \"&c;\"><!ENTITY c \"boom\">]><r>&a;</r>",
		);
		assert_eq!(
			r.err().unwrap(),
			Error::ExpansionLimitExceeded(LimitKind::EntityDepth)
		);
	}

	#[test]
	fn parser_rejects_oversized_expansion() {
		let p = Parser::with_options(ParserOptions::default().max_expansion_bytes(16));
		let (_, r) = parse_with(
			p,
			b"<!DOCTYPE r [<!ENTITY e \"0123456789\">]><r>&e;&e;</r>",
		);
		assert_eq!(
			r.err().unwrap(),
			Error::ExpansionLimitExceeded(LimitKind::ExpansionBytes)
		);
	}

	#[test]
	fn parser_rejects_entity_bomb_with_tiny_depth_limit() {
		let p = Parser::with_options(ParserOptions::default().max_entity_depth(1));
		let (_, r) = parse_with(
			p,
			b"<!DOCTYPE r [<!ENTITY a \"&a;&a;&a;&a;\">]><r>&a;</r>",
		);
		assert_eq!(
			r.err().unwrap(),
			Error::ExpansionLimitExceeded(LimitKind::EntityDepth)
		);
	}

	#[test]
	fn parser_rejects_unbalanced_entity_replacement() {
		let (_, r) = parse_bytes(b"<!DOCTYPE r [<!ENTITY e \"</r><r>\">]><r>&e;</r>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UnbalancedEntity)
		));
	}

	#[test]
	fn parser_rejects_element_left_open_by_entity() {
		let (_, r) = parse_bytes(b"<!DOCTYPE r [<!ENTITY e \"<open>\">]><r>&e;</r>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UnbalancedEntity)
		));
	}

	#[test]
	fn parser_resolves_external_entity_through_resolver() {
		struct FixedResolver;

		impl EntityResolver for FixedResolver {
			fn resolve(
				&mut self,
				public_id: Option<&CDataStr>,
				system_id: &CDataStr,
			) -> io::Result<Option<Vec<u8>>> {
				assert!(public_id.is_none());
				assert_eq!(system_id, "urn:example:thing");
				Ok(Some(b"external content".to_vec()))
			}
		}

		let mut p = Parser::new();
		p.set_resolver(Box::new(FixedResolver));
		let (evs, r) = parse_with(
			p,
			b"<!DOCTYPE r [<!ENTITY e SYSTEM \"urn:example:thing\">]><r>&e;</r>",
		);
		r.unwrap();
		assert!(
			matches!(&evs[2], Event::ReferenceResolved(_, name, ReplacementOrigin::External) if name == "e")
		);
		assert!(matches!(&evs[3], Event::Text(_, s) if s == "external content"));
	}

	#[test]
	fn parser_strips_text_declaration_of_external_entity() {
		struct DeclResolver;

		impl EntityResolver for DeclResolver {
			fn resolve(
				&mut self,
				_public_id: Option<&CDataStr>,
				_system_id: &CDataStr,
			) -> io::Result<Option<Vec<u8>>> {
				Ok(Some(
					b"<?xml version='1.0' encoding='ISO-8859-1'?>caf\xe9".to_vec(),
				))
			}
		}

		let mut p = Parser::new();
		p.set_resolver(Box::new(DeclResolver));
		let (evs, r) = parse_with(
			p,
			b"<!DOCTYPE r [<!ENTITY e SYSTEM \"urn:x\">]><r>&e;</r>",
		);
		r.unwrap();
		assert!(matches!(&evs[3], Event::Text(_, s) if s == "caf\u{e9}"));
	}

	#[test]
	fn parser_rejects_external_entity_in_attribute() {
		let (_, r) = parse_bytes(b"<!DOCTYPE r [<!ENTITY e SYSTEM \"urn:x\">]><r a=\"&e;\"/>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::ExternalEntityForbidden)
		));
	}

	#[test]
	fn parser_rejects_doctype_after_root() {
		let (_, r) = parse_bytes(b"<r></r><!DOCTYPE r []>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCEND, ..))
		));
	}

	#[test]
	fn parser_rejects_second_doctype() {
		let (_, r) = parse_bytes(b"<!DOCTYPE r []><!DOCTYPE r []><r/>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCBEGIN, ..))
		));
	}

	#[test]
	fn parser_parse_utf16_document() {
		let (evs, r) = parse_bytes(&utf16le("<r a=\"v\">t</r>"));
		r.unwrap();
		assert!(matches!(&evs[1], Event::StartElement(_, name, attrs) if name == "r" && attrs.len() == 1));
		assert!(matches!(&evs[2], Event::Text(_, s) if s == "t"));
	}

	#[test]
	fn parser_rejects_conflicting_encoding_declaration() {
		let (evs, r) = parse_bytes(&utf16le("<?xml version=\"1.0\" encoding=\"UTF-8\"?><r/>"));
		assert!(matches!(
			r.err().unwrap(),
			Error::Encoding(EncodingError::DeclarationMismatch { .. })
		));
		// the conflict is fatal before any content event is emitted
		assert_eq!(evs.len(), 0);
	}

	#[test]
	fn parser_honors_latin1_encoding_declaration() {
		let (evs, r) =
			parse_bytes(b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><r>caf\xe9</r>");
		r.unwrap();
		assert!(matches!(&evs[2], Event::Text(_, s) if s == "caf\u{e9}"));
	}

	#[test]
	fn parser_explicit_encoding_takes_precedence() {
		let p = Parser::with_options(
			ParserOptions::default().explicit_encoding(Encoding::Latin1),
		);
		let (evs, r) = parse_with(p, b"<r>\xe9</r>");
		r.unwrap();
		assert!(matches!(&evs[2], Event::Text(_, s) if s == "\u{e9}"));
	}

	#[test]
	fn parser_events_are_chunk_invariant() {
		let doc: &[u8] = b"<?xml version=\"1.0\"?><!DOCTYPE r [<!ENTITY e \"spliced\">]>\n<r a=\"x&e;y\"><c/>text &e; more<!--note--></r>";
		let (reference, r) = parse_bytes(doc);
		r.unwrap();
		for chunk_size in &[1usize, 2, 3, 7, 19] {
			let (evs, r) = parse_chunked(doc, *chunk_size);
			r.unwrap();
			assert_eq!(evs, reference, "chunk size {}", chunk_size);
		}
	}

	#[test]
	fn parser_position_tracks_lines() {
		let (evs, r) = parse_bytes(b"<r>\n<c/>\n</r>");
		r.unwrap();
		let foot = evs
			.iter()
			.filter_map(|ev| match ev {
				Event::EndElement(pos, name) if name == "r" => Some(*pos),
				_ => None,
			})
			.next()
			.unwrap();
		assert_eq!(foot.line, 3);
		assert_eq!(foot.column, 1);
	}

	#[test]
	fn parser_caches_errors() {
		let mut p = Parser::new();
		p.feed(b"<a><b></a>").unwrap();
		p.feed_eof().unwrap();
		let mut evs = Vec::new();
		let e1 = drain(&mut p, &mut evs).err().unwrap();
		let e2 = p.read().err().unwrap();
		assert_eq!(e1, e2);
	}

	#[test]
	fn parser_rejects_xml_declaration_after_whitespace() {
		let (_, r) = parse_bytes(b"  <?xml version=\"1.0\"?><r/>");
		assert!(matches!(
			r.err().unwrap(),
			Error::NotWellFormed(WFError::UnexpectedToken(ERRCTX_DOCBEGIN, ..))
		));
	}
}
