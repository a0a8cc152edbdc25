/*!
# Input frames, the frame stack and expansion limits

An [`InputFrame`] is one source of document text: the top-level document, or
the replacement text of an entity spliced into it. Each frame owns the raw
byte staging area, the encoding converter and the decoded text buffer for its
source, plus the line/column/byte counters used in diagnostics.

Frames are kept on an [`InputStack`]; the top frame is the current read
position. Pushing frames for entity references is bounded by the
[`ExpansionGuard`], which is the defense against entity amplification
attacks.
*/
use bytes::BytesMut;

use crate::buf::ByteBuffer;
use crate::encoding::{detect_encoding, Detection, DetectionSource, Encoding, EncodingConverter};
use crate::error::{EncodingError, Error, LimitKind, Result};
use crate::strings::{CDataStr, Name};

/// Number of bytes probed for an `encoding` pseudo-attribute before
/// conversion falls back to the default encoding.
const DECL_SCAN_LIMIT: usize = 256;

/// Source position of the current read cursor, for diagnostics.
///
/// Lines and columns are 1-based; columns count characters, not bytes. The
/// byte counter counts decoded bytes consumed from this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
	pub line: u32,
	pub column: u32,
	pub byte: u64,
}

impl Position {
	fn new() -> Position {
		Position {
			line: 1,
			column: 1,
			byte: 0,
		}
	}
}

impl std::fmt::Display for Position {
	fn fmt<'f>(&self, f: &'f mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "line {}, column {}", self.line, self.column)
	}
}

/// What a frame is reading from, for diagnostics and scoping checks.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
	/// The top-level document.
	Document,
	/// Replacement text of an internal entity.
	InternalEntity(Name),
	/// Content of an external entity supplied by a resolver.
	ExternalEntity(Name),
}

/// Result of probing the staged bytes for an encoding declaration.
#[derive(Debug, Clone, Copy, PartialEq)]
enum DeclScan {
	NeedMore,
	NoDeclaration,
	Found { start: usize, len: usize },
}

fn is_decl_ws(b: u8) -> bool {
	b == b' ' || b == b'\t' || b == b'\r' || b == b'\n'
}

/// Probe the first bytes of a stream for the `encoding` pseudo-attribute of
/// an XML or text declaration.
///
/// This runs before the real encoding is known, so it must only rely on the
/// bytes being an ASCII superset; detection has already ruled out the
/// UTF-16 family at this point. The probe gives up (and the default encoding
/// applies) once [`DECL_SCAN_LIMIT`] bytes have been examined.
fn scan_declared_encoding(prefix: &[u8], at_eof: bool) -> DeclScan {
	let window = &prefix[..prefix.len().min(DECL_SCAN_LIMIT)];
	let give_up = at_eof || prefix.len() >= DECL_SCAN_LIMIT;
	let starved = if give_up {
		DeclScan::NoDeclaration
	} else {
		DeclScan::NeedMore
	};
	if window.len() < 5 {
		return if b"<?xml".starts_with(window) {
			starved
		} else {
			DeclScan::NoDeclaration
		};
	}
	if &window[..5] != b"<?xml" {
		return DeclScan::NoDeclaration;
	}
	let mut i = 5usize;
	while i < window.len() {
		match window[i] {
			b'"' | b'\'' => {
				// skip over quoted literals wholesale, they may contain
				// anything
				let q = window[i];
				i += 1;
				while i < window.len() && window[i] != q {
					i += 1;
				}
				if i >= window.len() {
					return starved;
				}
				i += 1;
			},
			b'?' => {
				if i + 1 >= window.len() {
					return starved;
				}
				if window[i + 1] == b'>' {
					return DeclScan::NoDeclaration;
				}
				i += 1;
			},
			b'e' => {
				let avail = window.len() - i;
				if avail < 8 {
					if &b"encoding"[..avail] == &window[i..] {
						return starved;
					}
					i += 1;
					continue;
				}
				if &window[i..i + 8] != b"encoding" {
					i += 1;
					continue;
				}
				i += 8;
				while i < window.len() && is_decl_ws(window[i]) {
					i += 1;
				}
				if i >= window.len() {
					return starved;
				}
				if window[i] != b'=' {
					continue;
				}
				i += 1;
				while i < window.len() && is_decl_ws(window[i]) {
					i += 1;
				}
				if i >= window.len() {
					return starved;
				}
				let q = window[i];
				if q != b'"' && q != b'\'' {
					continue;
				}
				i += 1;
				let start = i;
				while i < window.len() && window[i] != q {
					i += 1;
				}
				if i >= window.len() {
					return starved;
				}
				return DeclScan::Found {
					start,
					len: i - start,
				};
			},
			_ => i += 1,
		}
	}
	starved
}

/**
# One active source of document text

A frame accepts raw bytes through [`InputFrame::push_bytes`], establishes the
source encoding (explicit > byte order mark / first-bytes detection >
declared > default), converts incrementally to UTF-8 and exposes the decoded
text through [`InputFrame::window`]. Consumed text is acknowledged with
[`InputFrame::advance`], which also maintains the position counters.

Frames for internal entities skip the conversion pipeline entirely: their
replacement text is the product of earlier decoding and already UTF-8.
*/
pub struct InputFrame {
	kind: SourceKind,
	/// raw bytes staged until the encoding is established and converted
	raw: BytesMut,
	converter: Option<EncodingConverter>,
	explicit: Option<Encoding>,
	default: Encoding,
	buffer: ByteBuffer,
	position: Position,
	eof: bool,
	/// decode failure held back until the cursor reaches the failure point
	pending: Option<Error>,
}

impl InputFrame {
	/// Create the frame for the top-level document.
	///
	/// If `explicit` is given (e.g. from a transport header), it wins over
	/// anything found inside the stream; otherwise detection and the
	/// declared encoding apply, falling back to `default`.
	pub fn document(max_buffer_capacity: usize, explicit: Option<Encoding>, default: Encoding) -> InputFrame {
		InputFrame {
			kind: SourceKind::Document,
			raw: BytesMut::new(),
			converter: None,
			explicit,
			default,
			buffer: ByteBuffer::new(max_buffer_capacity),
			position: Position::new(),
			eof: false,
			pending: None,
		}
	}

	/// Create a frame for the replacement text of an internal entity.
	///
	/// The replacement text is already decoded; the frame is complete from
	/// the start and exhausts once the text has been consumed.
	pub fn internal_entity(name: Name, replacement: &CDataStr) -> InputFrame {
		InputFrame {
			kind: SourceKind::InternalEntity(name),
			raw: BytesMut::new(),
			converter: None,
			explicit: None,
			default: Encoding::Utf8,
			buffer: ByteBuffer::from_slice(replacement.as_bytes(), true),
			position: Position::new(),
			eof: true,
			pending: None,
		}
	}

	/// Create a frame for the content of an external entity.
	///
	/// The content bytes go through the same detection and conversion
	/// pipeline as the document.
	pub fn external_entity(name: Name, max_buffer_capacity: usize, default: Encoding) -> InputFrame {
		InputFrame {
			kind: SourceKind::ExternalEntity(name),
			raw: BytesMut::new(),
			converter: None,
			explicit: None,
			default,
			buffer: ByteBuffer::new(max_buffer_capacity),
			position: Position::new(),
			eof: false,
			pending: None,
		}
	}

	pub fn kind(&self) -> &SourceKind {
		&self.kind
	}

	pub fn position(&self) -> Position {
		self.position
	}

	/// The encoding currently in effect, once established.
	pub fn encoding(&self) -> Option<Encoding> {
		self.converter.as_ref().map(|c| c.encoding())
	}

	/// Decoded text which has not been consumed yet.
	pub fn window(&self) -> &[u8] {
		self.buffer.as_slice()
	}

	/// True once the end of this frame's byte stream has been signalled.
	pub fn at_eof(&self) -> bool {
		self.eof
	}

	/// True if the frame can never produce text again.
	pub fn exhausted(&self) -> bool {
		self.eof && self.buffer.is_empty()
	}

	/// Stage raw bytes and convert whatever can be converted already.
	///
	/// Decode failures are not reported here; they are recorded and
	/// surfaced by [`InputFrame::take_decode_error`] once the text decoded
	/// before the failure has been consumed.
	pub fn push_bytes(&mut self, data: &[u8]) {
		if self.pending.is_some() {
			return;
		}
		self.raw.extend_from_slice(data);
		let result = self.pump();
		self.record(result)
	}

	/// Signal the end of the raw byte stream.
	///
	/// Staged bytes ending in the middle of a multi-byte sequence, or
	/// detection never getting enough bytes to finish, become a deferred
	/// decode error.
	pub fn set_eof(&mut self) {
		self.eof = true;
		if self.pending.is_some() {
			return;
		}
		let result = self.pump();
		self.record(result)
	}

	fn record(&mut self, result: Result<()>) {
		if let Err(e) = result {
			self.pending = Some(e);
		}
	}

	/// Take the recorded decode failure, if the cursor has reached it.
	///
	/// The failure is withheld while decoded text is still in the window,
	/// so that by the time it surfaces the position counters point at the
	/// byte where decoding stopped.
	pub fn take_decode_error(&mut self) -> Option<Error> {
		if self.buffer.is_empty() {
			self.pending.take()
		} else {
			None
		}
	}

	/// Consume `amount` bytes from the front of the window, updating the
	/// position counters.
	pub fn advance(&mut self, amount: usize) {
		for &b in &self.buffer.as_slice()[..amount] {
			self.position.byte = self.position.byte.wrapping_add(1);
			if b == b'\n' {
				self.position.line = self.position.line.saturating_add(1);
				self.position.column = 1;
			} else if b & 0xc0 != 0x80 {
				// UTF-8 continuation bytes are not characters
				self.position.column = self.position.column.saturating_add(1);
			}
		}
		self.buffer.consume(amount);
	}

	/// Apply the encoding named by the XML declaration.
	///
	/// Frames without a converter (internal entities) have no encoding to
	/// confirm or switch and accept any label.
	pub fn declare_encoding(&mut self, label: &str) -> std::result::Result<(), EncodingError> {
		match self.converter {
			Some(ref mut conv) => conv.declare(label),
			None => Ok(()),
		}
	}

	/// Drop a leading text declaration (`<?xml ... ?>`) from the decoded
	/// window.
	///
	/// External entities may begin with one; its `encoding` pseudo-attribute
	/// has already been honored by the conversion pipeline, and the
	/// declaration itself must not reach the tokenizer.
	pub fn strip_text_decl(&mut self) {
		let end = {
			let window = self.buffer.as_slice();
			if !window.starts_with(b"<?xml") {
				None
			} else {
				match window.get(5) {
					Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(b'?') => window
						.windows(2)
						.position(|w| w == b"?>")
						.map(|pos| pos + 2),
					_ => None,
				}
			}
		};
		if let Some(end) = end {
			self.advance(end);
		}
	}

	fn pump(&mut self) -> Result<()> {
		if self.converter.is_none() {
			let (detected, bom_length) = match detect_encoding(&self.raw, self.eof) {
				Detection::NeedMoreData => return Ok(()),
				Detection::Done {
					encoding,
					bom_length,
				} => (encoding, bom_length),
			};
			let converter = match self.explicit {
				Some(enc) => {
					// an explicit encoding wins; a matching BOM is still
					// stripped so it does not reach the tokenizer
					if bom_length > 0 && detected == Some(enc) {
						let _ = self.raw.split_to(bom_length);
					}
					EncodingConverter::new(enc, DetectionSource::Explicit)
				},
				None => {
					if bom_length > 0 {
						let _ = self.raw.split_to(bom_length);
					}
					match detected {
						Some(enc) => EncodingConverter::new(enc, DetectionSource::Detected),
						None => match scan_declared_encoding(&self.raw, self.eof) {
							DeclScan::NeedMore => return Ok(()),
							DeclScan::NoDeclaration => {
								EncodingConverter::new(self.default, DetectionSource::Default)
							},
							DeclScan::Found { start, len } => {
								// the scanned region is ASCII by construction
								let enc = std::str::from_utf8(&self.raw[start..start + len])
									.ok()
									.and_then(Encoding::from_label)
									.ok_or(Error::Encoding(EncodingError::UnsupportedEncoding))?;
								EncodingConverter::new(enc, DetectionSource::Declared)
							},
						},
					}
				},
			};
			self.converter = Some(converter);
		}
		if self.raw.len() > 0 {
			// the converter holds back incomplete sequences internally, so
			// everything staged can be handed over
			let staged = self.raw.split();
			let mut decoded = Vec::new();
			let outcome = match self.converter {
				Some(ref mut conv) => conv.convert(&staged, &mut decoded),
				None => panic!("invalid state"),
			};
			// text decoded ahead of a failure still reaches the window; the
			// cursor must be able to walk up to the failing byte
			self.buffer.append(&decoded).map_err(Error::Buffer)?;
			outcome.map_err(Error::Encoding)?;
		}
		if self.eof {
			if let Some(ref conv) = self.converter {
				conv.finish().map_err(Error::Encoding)?;
			}
		}
		Ok(())
	}
}

impl std::fmt::Debug for InputFrame {
	fn fmt<'f>(&self, f: &'f mut std::fmt::Formatter) -> std::fmt::Result {
		f.debug_struct("InputFrame")
			.field("kind", &self.kind)
			.field("position", &self.position)
			.field("eof", &self.eof)
			.finish()
	}
}

/// Stack of input frames, document at the bottom.
///
/// The top frame is the current read position. The document frame is never
/// popped; entity frames are popped once exhausted.
#[derive(Debug)]
pub struct InputStack {
	frames: Vec<InputFrame>,
}

impl InputStack {
	pub fn new(document: InputFrame) -> InputStack {
		InputStack {
			frames: vec![document],
		}
	}

	/// Number of frames on the stack, including the document frame.
	pub fn depth(&self) -> usize {
		self.frames.len()
	}

	pub fn top(&self) -> &InputFrame {
		match self.frames.last() {
			Some(f) => f,
			None => panic!("invalid state: empty input stack"),
		}
	}

	pub fn top_mut(&mut self) -> &mut InputFrame {
		match self.frames.last_mut() {
			Some(f) => f,
			None => panic!("invalid state: empty input stack"),
		}
	}

	pub fn document_mut(&mut self) -> &mut InputFrame {
		match self.frames.first_mut() {
			Some(f) => f,
			None => panic!("invalid state: empty input stack"),
		}
	}

	pub fn push(&mut self, frame: InputFrame) {
		self.frames.push(frame);
	}

	/// Pop exhausted entity frames off the top, returning true if at least
	/// one was popped.
	pub fn pop_exhausted(&mut self) -> bool {
		let mut popped = false;
		while self.frames.len() > 1 && self.top().exhausted() {
			self.frames.pop();
			popped = true;
		}
		popped
	}
}

/// Bounds on entity expansion, enforced before a frame is pushed.
///
/// The cumulative byte count only ever grows over the lifetime of a
/// document; replacement text does not get "refunded" when its frame pops,
/// as otherwise repeated sequential expansion would evade the limit.
#[derive(Debug, Clone)]
pub struct ExpansionGuard {
	max_depth: usize,
	max_total_bytes: usize,
	total_bytes: usize,
}

impl ExpansionGuard {
	pub fn new(max_depth: usize, max_total_bytes: usize) -> ExpansionGuard {
		ExpansionGuard {
			max_depth: max_depth,
			max_total_bytes: max_total_bytes,
			total_bytes: 0,
		}
	}

	/// Check that pushing a frame with `additional` bytes of replacement
	/// text is within limits and account for it.
	///
	/// `entity_depth` is the number of entity frames already on the stack.
	/// The check happens before any byte of the new frame is converted or
	/// tokenized.
	pub fn check(&mut self, entity_depth: usize, additional: usize) -> Result<()> {
		if entity_depth >= self.max_depth {
			return Err(Error::ExpansionLimitExceeded(LimitKind::EntityDepth));
		}
		let total = self.total_bytes.saturating_add(additional);
		if total > self.max_total_bytes {
			return Err(Error::ExpansionLimitExceeded(LimitKind::ExpansionBytes));
		}
		self.total_bytes = total;
		Ok(())
	}

	/// Cumulative number of expansion bytes accounted so far.
	pub fn total_bytes(&self) -> usize {
		self.total_bytes
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::BufError;
	use std::convert::TryInto;

	fn doc_frame() -> InputFrame {
		InputFrame::document(65536, None, Encoding::Utf8)
	}

	fn feed(f: &mut InputFrame, chunks: &[&[u8]]) {
		for chunk in chunks {
			f.push_bytes(chunk);
		}
		f.set_eof();
	}

	/// Drain the window and collect the deferred decode failure.
	fn drain_to_error(f: &mut InputFrame) -> Error {
		let len = f.window().len();
		f.advance(len);
		match f.take_decode_error() {
			Some(e) => e,
			None => panic!("no decode error recorded"),
		}
	}

	#[test]
	fn frame_passes_utf8_through() {
		let mut f = doc_frame();
		feed(&mut f, &[b"<a/>"]);
		assert_eq!(f.window(), b"<a/>");
		assert!(f.at_eof());
		assert!(!f.exhausted());
	}

	#[test]
	fn frame_strips_utf8_bom() {
		let mut f = doc_frame();
		feed(&mut f, &[b"\xef\xbb\xbf<a/>"]);
		assert_eq!(f.window(), b"<a/>");
		assert_eq!(f.encoding(), Some(Encoding::Utf8));
	}

	#[test]
	fn frame_detects_utf16_from_bom() {
		let mut f = doc_frame();
		feed(&mut f, &[b"\xff\xfe<\x00a\x00/\x00>\x00"]);
		assert_eq!(f.window(), b"<a/>");
		assert_eq!(f.encoding(), Some(Encoding::Utf16Le));
	}

	#[test]
	fn frame_detects_utf16_without_bom() {
		let mut f = doc_frame();
		f.push_bytes(b"<\x00?\x00");
		assert_eq!(f.window(), b"<?");
		assert_eq!(f.encoding(), Some(Encoding::Utf16Le));
	}

	#[test]
	fn frame_converts_utf16_unit_split_across_chunks() {
		let mut f = doc_frame();
		f.push_bytes(b"\xff\xfe<\x00a");
		assert_eq!(f.window(), b"<");
		f.push_bytes(b"\x00");
		f.set_eof();
		assert_eq!(f.window(), b"<a");
	}

	#[test]
	fn frame_honors_declared_encoding() {
		let mut f = doc_frame();
		feed(
			&mut f,
			&[b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>caf\xe9</a>"],
		);
		assert_eq!(f.encoding(), Some(Encoding::Latin1));
		assert_eq!(
			f.window(),
			"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><a>café</a>".as_bytes()
		);
	}

	#[test]
	fn frame_finds_declaration_split_across_chunks() {
		let mut f = doc_frame();
		f.push_bytes(b"<?xml version='1.0' enco");
		// nothing converted yet, the declaration is still being probed
		assert_eq!(f.window(), b"");
		f.push_bytes(b"ding='ISO-8859-1'?><a>\xe9</a>");
		f.set_eof();
		assert_eq!(f.encoding(), Some(Encoding::Latin1));
		assert!(std::str::from_utf8(f.window()).unwrap().contains("é"));
	}

	#[test]
	fn frame_without_declaration_uses_default() {
		let mut f = InputFrame::document(65536, None, Encoding::Latin1);
		feed(&mut f, &[b"<a>\xe9</a>"]);
		assert_eq!(f.window(), "<a>é</a>".as_bytes());
	}

	#[test]
	fn frame_rejects_unknown_declared_encoding() {
		let mut f = doc_frame();
		feed(&mut f, &[b"<?xml version='1.0' encoding='EBCDIC'?><a/>"]);
		assert_eq!(
			drain_to_error(&mut f),
			Error::Encoding(EncodingError::UnsupportedEncoding)
		);
	}

	#[test]
	fn frame_explicit_encoding_wins() {
		let mut f = InputFrame::document(65536, Some(Encoding::Latin1), Encoding::Utf8);
		feed(&mut f, &[b"<a>\xe9</a>"]);
		assert_eq!(f.window(), "<a>é</a>".as_bytes());
		assert_eq!(f.encoding(), Some(Encoding::Latin1));
	}

	#[test]
	fn frame_rejects_truncated_sequence_at_eof() {
		let mut f = doc_frame();
		feed(&mut f, &[b"<a>\xc3"]);
		assert!(matches!(
			drain_to_error(&mut f),
			Error::Encoding(EncodingError::Malformed(..))
		));
	}

	#[test]
	fn frame_enforces_buffer_capacity() {
		let mut f = InputFrame::document(4, None, Encoding::Utf8);
		feed(&mut f, &[b"123456"]);
		assert_eq!(
			drain_to_error(&mut f),
			Error::Buffer(BufError::CapacityExceeded)
		);
	}

	#[test]
	fn frame_withholds_decode_error_until_window_consumed() {
		let mut f = doc_frame();
		f.push_bytes(b"abc\xff");
		// the text decoded before the bad byte stays readable
		assert_eq!(f.window(), b"abc");
		assert!(f.take_decode_error().is_none());
		f.advance(3);
		assert!(matches!(
			f.take_decode_error(),
			Some(Error::Encoding(EncodingError::Malformed(_, 0xff)))
		));
		assert_eq!(
			f.position(),
			Position {
				line: 1,
				column: 4,
				byte: 3
			}
		);
		// once taken, the failure does not come back
		assert!(f.take_decode_error().is_none());
	}

	#[test]
	fn frame_advance_tracks_position() {
		let mut f = doc_frame();
		feed(&mut f, &[b"ab\ncaf\xc3\xa9 x"]);
		assert_eq!(
			f.position(),
			Position {
				line: 1,
				column: 1,
				byte: 0
			}
		);
		f.advance(2);
		assert_eq!(
			f.position(),
			Position {
				line: 1,
				column: 3,
				byte: 2
			}
		);
		f.advance(1);
		assert_eq!(
			f.position(),
			Position {
				line: 2,
				column: 1,
				byte: 3
			}
		);
		// "café" is five bytes but four characters
		f.advance(5);
		assert_eq!(
			f.position(),
			Position {
				line: 2,
				column: 5,
				byte: 8
			}
		);
	}

	#[test]
	fn internal_entity_frame_is_preconverted() {
		let name: Name = "e".try_into().unwrap();
		let replacement: &CDataStr = "foo".try_into().unwrap();
		let mut f = InputFrame::internal_entity(name, replacement);
		assert!(f.at_eof());
		assert_eq!(f.window(), b"foo");
		f.advance(3);
		assert!(f.exhausted());
	}

	#[test]
	fn external_entity_frame_strips_text_decl() {
		let name: Name = "ext".try_into().unwrap();
		let mut f = InputFrame::external_entity(name, 65536, Encoding::Utf8);
		feed(&mut f, &[b"<?xml version='1.0' encoding='ISO-8859-1'?>caf\xe9"]);
		f.strip_text_decl();
		assert_eq!(f.window(), "café".as_bytes());
	}

	#[test]
	fn stack_pops_exhausted_entity_frames_only() {
		let mut doc = doc_frame();
		feed(&mut doc, &[b"<a/>"]);
		let mut stack = InputStack::new(doc);
		let name: Name = "e".try_into().unwrap();
		let replacement: &CDataStr = "x".try_into().unwrap();
		stack.push(InputFrame::internal_entity(name, replacement));
		assert_eq!(stack.depth(), 2);
		assert!(!stack.pop_exhausted());
		stack.top_mut().advance(1);
		assert!(stack.pop_exhausted());
		assert_eq!(stack.depth(), 1);
		// the document frame stays even once exhausted
		stack.top_mut().advance(4);
		assert!(!stack.pop_exhausted());
		assert_eq!(stack.depth(), 1);
	}

	#[test]
	fn guard_rejects_excess_depth() {
		let mut guard = ExpansionGuard::new(2, 1024);
		guard.check(0, 1).unwrap();
		guard.check(1, 1).unwrap();
		assert_eq!(
			guard.check(2, 1),
			Err(Error::ExpansionLimitExceeded(LimitKind::EntityDepth))
		);
	}

	#[test]
	fn guard_rejects_cumulative_expansion() {
		let mut guard = ExpansionGuard::new(8, 10);
		guard.check(0, 6).unwrap();
		assert_eq!(
			guard.check(0, 6),
			Err(Error::ExpansionLimitExceeded(LimitKind::ExpansionBytes))
		);
		// the account is not refunded by popped frames
		assert_eq!(guard.total_bytes(), 6);
		guard.check(0, 4).unwrap();
		assert_eq!(guard.total_bytes(), 10);
	}

	#[test]
	fn scan_finds_encoding_label() {
		assert_eq!(
			scan_declared_encoding(b"<?xml version='1.0' encoding='UTF-8'?><a/>", false),
			DeclScan::Found { start: 30, len: 5 }
		);
	}

	#[test]
	fn scan_requests_more_data_inside_declaration() {
		assert_eq!(
			scan_declared_encoding(b"<?xml version='1.0' enco", false),
			DeclScan::NeedMore
		);
		assert_eq!(
			scan_declared_encoding(b"<?x", false),
			DeclScan::NeedMore
		);
	}

	#[test]
	fn scan_reports_missing_declaration() {
		assert_eq!(
			scan_declared_encoding(b"<a>hello</a>", false),
			DeclScan::NoDeclaration
		);
		assert_eq!(
			scan_declared_encoding(b"<?xml version='1.0'?><a/>", false),
			DeclScan::NoDeclaration
		);
	}

	#[test]
	fn scan_ignores_encoding_text_inside_literals() {
		assert_eq!(
			scan_declared_encoding(b"<?xml version=\"encoding='x'\"?><a/>", false),
			DeclScan::NoDeclaration
		);
	}

	#[test]
	fn scan_gives_up_at_probe_limit() {
		let mut data = b"<?xml version='1.0' ".to_vec();
		data.extend(std::iter::repeat(b' ').take(300));
		assert_eq!(scan_declared_encoding(&data, false), DeclScan::NoDeclaration);
	}
}
