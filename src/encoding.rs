/*!
# Character encoding detection and incremental transcoding

Everything past the input frames works on UTF-8 exclusively. This module
detects the encoding of a raw byte stream and converts it to that canonical
form, incrementally and without ever splitting a code point across two
conversion calls: bytes which form an incomplete sequence at the end of a
chunk are carried over inside the converter until the next chunk arrives.
*/
use crate::error::EncodingError;

/// A character encoding this crate can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
	Utf8,
	Utf16Le,
	Utf16Be,
	Latin1,
	Ascii,
}

impl Encoding {
	/// The canonical label of the encoding.
	pub fn label(&self) -> &'static str {
		match self {
			Self::Utf8 => "UTF-8",
			Self::Utf16Le => "UTF-16LE",
			Self::Utf16Be => "UTF-16BE",
			Self::Latin1 => "ISO-8859-1",
			Self::Ascii => "US-ASCII",
		}
	}

	/// Look up an encoding by its label, case-insensitively.
	///
	/// The common aliases seen in XML declarations in the wild are
	/// accepted. Unknown labels return None; whether that is an error
	/// depends on the caller.
	pub fn from_label(label: &str) -> Option<Encoding> {
		// labels are short and ASCII; eq_ignore_ascii_case avoids an
		// allocation
		let eq = |s: &str| label.eq_ignore_ascii_case(s);
		if eq("UTF-8") || eq("UTF8") {
			Some(Self::Utf8)
		} else if eq("UTF-16LE") {
			Some(Self::Utf16Le)
		} else if eq("UTF-16BE") {
			Some(Self::Utf16Be)
		} else if eq("UTF-16") {
			// RFC 2781 defaults bare UTF-16 to big endian; detection will
			// usually have overridden this
			Some(Self::Utf16Be)
		} else if eq("ISO-8859-1") || eq("LATIN1") || eq("LATIN-1") || eq("ISO_8859-1") {
			Some(Self::Latin1)
		} else if eq("US-ASCII") || eq("ASCII") || eq("ANSI_X3.4-1968") {
			Some(Self::Ascii)
		} else {
			None
		}
	}

	/// True if `other` decodes every stream this encoding decodes to the
	/// same text, i.e. a declaration naming `other` does not contradict a
	/// detection which produced `self`.
	fn compatible_with(&self, other: Encoding) -> bool {
		match (self, other) {
			(a, b) if *a == b => true,
			// ASCII streams decode identically under all ASCII supersets
			(Self::Utf8, Encoding::Ascii)
			| (Self::Utf8, Encoding::Latin1)
			| (Self::Ascii, Encoding::Utf8)
			| (Self::Ascii, Encoding::Latin1)
			| (Self::Latin1, Encoding::Ascii)
			| (Self::Latin1, Encoding::Utf8) => true,
			_ => false,
		}
	}
}

/// How the active encoding of a frame was established.
///
/// The source decides whether a later XML declaration may still switch the
/// encoding and whether a contradicting declaration is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
	/// Supplied by the caller out of band (e.g. from an HTTP header). Wins
	/// over everything; a contradicting declaration is ignored.
	Explicit,
	/// Derived from a byte order mark or from the first bytes of the
	/// stream. A contradicting declaration is an error.
	Detected,
	/// Named by the `encoding` pseudo-attribute of the XML declaration.
	Declared,
	/// Nothing to go by; the configured default (normally UTF-8) is in
	/// effect and a declaration may still switch it.
	Default,
}

/// Result of probing the first bytes of a stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
	/// Not enough bytes yet to decide.
	NeedMoreData,
	/// Detection finished. `bom_length` bytes at the start of the stream
	/// are a byte order mark and must not be handed to the converter.
	Done {
		encoding: Option<Encoding>,
		bom_length: usize,
	},
}

/// Probe the first bytes of a stream for a byte order mark or a recognizable
/// encoding pattern.
///
/// XML makes this possible without heuristics: every conforming document
/// starts either with a BOM or with `<` (optionally preceded by nothing),
/// and the encoding of that `<?xml` sequence betrays the encoding family.
/// Returns [`Detection::NeedMoreData`] if fewer than four bytes are
/// available and `at_eof` is false.
pub fn detect_encoding(prefix: &[u8], at_eof: bool) -> Detection {
	if prefix.len() >= 3 && &prefix[..3] == b"\xef\xbb\xbf" {
		return Detection::Done {
			encoding: Some(Encoding::Utf8),
			bom_length: 3,
		};
	}
	if prefix.len() >= 2 {
		match &prefix[..2] {
			b"\xff\xfe" => {
				return Detection::Done {
					encoding: Some(Encoding::Utf16Le),
					bom_length: 2,
				}
			}
			b"\xfe\xff" => {
				return Detection::Done {
					encoding: Some(Encoding::Utf16Be),
					bom_length: 2,
				}
			}
			_ => (),
		}
	}
	if prefix.len() < 4 {
		if at_eof {
			return Detection::Done {
				encoding: None,
				bom_length: 0,
			};
		}
		return Detection::NeedMoreData;
	}
	match &prefix[..4] {
		b"\x3c\x00\x3f\x00" => Detection::Done {
			encoding: Some(Encoding::Utf16Le),
			bom_length: 0,
		},
		b"\x00\x3c\x00\x3f" => Detection::Done {
			encoding: Some(Encoding::Utf16Be),
			bom_length: 0,
		},
		_ => Detection::Done {
			encoding: None,
			bom_length: 0,
		},
	}
}

/// Incremental decoder from one [`Encoding`] to UTF-8.
pub struct EncodingConverter {
	encoding: Encoding,
	source: DetectionSource,
	/// Bytes of an incomplete sequence at the end of the previous chunk.
	pending: [u8; 4],
	pending_len: usize,
	/// False once any codepoint above U+007F has been produced; an
	/// encoding switch is only possible while this is true, because only
	/// then is the already-converted text identical under both encodings.
	ascii_only: bool,
}

impl EncodingConverter {
	pub fn new(encoding: Encoding, source: DetectionSource) -> EncodingConverter {
		EncodingConverter {
			encoding,
			source,
			pending: [0u8; 4],
			pending_len: 0,
			ascii_only: true,
		}
	}

	pub fn encoding(&self) -> Encoding {
		self.encoding
	}

	pub fn source(&self) -> DetectionSource {
		self.source
	}

	/// Apply the encoding named by the XML declaration.
	///
	/// Depending on how the active encoding was established this either
	/// switches the converter, confirms it, ignores the declaration
	/// (explicit caller encoding), or fails: a declaration contradicting a
	/// detected encoding is [`EncodingError::DeclarationMismatch`], and a
	/// switch after non-ASCII text has already been converted is
	/// [`EncodingError::LateSwitch`].
	pub fn declare(&mut self, label: &str) -> Result<(), EncodingError> {
		let mut declared = match Encoding::from_label(label) {
			Some(enc) => enc,
			None => return Err(EncodingError::UnsupportedEncoding),
		};
		// the endianness-agnostic "UTF-16" label matches whichever variant
		// the BOM established
		if label.eq_ignore_ascii_case("UTF-16")
			&& (self.encoding == Encoding::Utf16Le || self.encoding == Encoding::Utf16Be)
		{
			declared = self.encoding;
		}
		match self.source {
			DetectionSource::Explicit => Ok(()),
			DetectionSource::Detected | DetectionSource::Declared => {
				if self.encoding.compatible_with(declared) {
					Ok(())
				} else {
					Err(EncodingError::DeclarationMismatch {
						detected: self.encoding.label(),
						declared: declared.label(),
					})
				}
			}
			DetectionSource::Default => {
				if self.encoding == declared {
					self.source = DetectionSource::Declared;
					return Ok(());
				}
				if !self.ascii_only || self.pending_len > 0 {
					return Err(EncodingError::LateSwitch);
				}
				// everything converted so far was ASCII, which reads the
				// same under the old and the new encoding
				if !self.encoding.compatible_with(declared) {
					return Err(EncodingError::DeclarationMismatch {
						detected: self.encoding.label(),
						declared: declared.label(),
					});
				}
				self.encoding = declared;
				self.source = DetectionSource::Declared;
				Ok(())
			}
		}
	}

	/// Convert a chunk of raw bytes, appending UTF-8 to `out`.
	///
	/// All of `input` is consumed; an incomplete sequence at its end is
	/// held back inside the converter and completed by the next call.
	/// The output never ends in the middle of a code point.
	pub fn convert(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), EncodingError> {
		match self.encoding {
			Encoding::Utf8 => self.convert_utf8(input, out),
			Encoding::Utf16Le => self.convert_utf16(input, out, true),
			Encoding::Utf16Be => self.convert_utf16(input, out, false),
			Encoding::Latin1 => self.convert_latin1(input, out),
			Encoding::Ascii => self.convert_ascii(input, out),
		}
	}

	/// Assert that the stream may end here.
	///
	/// Fails if the converter still holds bytes of an incomplete sequence.
	pub fn finish(&self) -> Result<(), EncodingError> {
		if self.pending_len > 0 {
			Err(EncodingError::Malformed(
				self.encoding.label(),
				self.pending[0],
			))
		} else {
			Ok(())
		}
	}

	fn push_char(&mut self, ch: char, out: &mut Vec<u8>) {
		if ch as u32 >= 0x80 {
			self.ascii_only = false;
		}
		let mut tmp = [0u8; 4];
		out.extend_from_slice(ch.encode_utf8(&mut tmp).as_bytes());
	}

	fn convert_utf8(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), EncodingError> {
		// complete a sequence left over from the previous chunk bytewise;
		// this is rare and at most three iterations
		let mut offset = 0;
		while self.pending_len > 0 {
			if offset >= input.len() {
				return Ok(());
			}
			self.pending[self.pending_len] = input[offset];
			self.pending_len += 1;
			offset += 1;
			match std::str::from_utf8(&self.pending[..self.pending_len]) {
				Ok(s) => {
					self.ascii_only = false;
					out.extend_from_slice(s.as_bytes());
					self.pending_len = 0;
				}
				Err(e) if e.error_len().is_some() => {
					return Err(EncodingError::Malformed(
						self.encoding.label(),
						self.pending[0],
					));
				}
				Err(_) => (), // still incomplete
			}
		}
		let rest = &input[offset..];
		match std::str::from_utf8(rest) {
			Ok(s) => {
				if !s.is_ascii() {
					self.ascii_only = false;
				}
				out.extend_from_slice(s.as_bytes());
				Ok(())
			}
			Err(e) => {
				let (valid, tail) = rest.split_at(e.valid_up_to());
				if !valid.is_ascii() {
					self.ascii_only = false;
				}
				out.extend_from_slice(valid);
				match e.error_len() {
					Some(_) => Err(EncodingError::Malformed(self.encoding.label(), tail[0])),
					None => {
						// incomplete sequence at the end of the chunk
						debug_assert!(tail.len() < 4);
						self.pending[..tail.len()].copy_from_slice(tail);
						self.pending_len = tail.len();
						Ok(())
					}
				}
			}
		}
	}

	fn convert_utf16(
		&mut self,
		input: &[u8],
		out: &mut Vec<u8>,
		little_endian: bool,
	) -> Result<(), EncodingError> {
		let mut offset = 0;
		loop {
			// refill the staging area to one unit (or two when a high
			// surrogate is waiting for its partner)
			let want = if self.pending_len >= 2 && {
				let lead = if little_endian {
					u16::from_le_bytes([self.pending[0], self.pending[1]])
				} else {
					u16::from_be_bytes([self.pending[0], self.pending[1]])
				};
				(0xd800..0xdc00).contains(&lead)
			} {
				4
			} else {
				2
			};
			while self.pending_len < want && offset < input.len() {
				self.pending[self.pending_len] = input[offset];
				self.pending_len += 1;
				offset += 1;
			}
			if self.pending_len < 2 {
				return Ok(());
			}
			let unit = |i: usize| {
				if little_endian {
					u16::from_le_bytes([self.pending[i], self.pending[i + 1]])
				} else {
					u16::from_be_bytes([self.pending[i], self.pending[i + 1]])
				}
			};
			let lead = unit(0);
			if (0xdc00..0xe000).contains(&lead) {
				// lone trailing surrogate
				return Err(EncodingError::Malformed(
					self.encoding.label(),
					self.pending[0],
				));
			}
			if (0xd800..0xdc00).contains(&lead) {
				if self.pending_len < 4 {
					if offset >= input.len() {
						// wait for the low surrogate
						return Ok(());
					}
					// the refill above asked for one unit only; go round
					// again to stage the trail unit
					continue;
				}
				let trail = unit(2);
				if !(0xdc00..0xe000).contains(&trail) {
					return Err(EncodingError::Malformed(
						self.encoding.label(),
						self.pending[2],
					));
				}
				let cp =
					0x10000u32 + (((lead as u32 - 0xd800) << 10) | (trail as u32 - 0xdc00));
				// surrogate pairs always decode to a valid scalar value
				let ch = char::from_u32(cp)
					.ok_or(EncodingError::Malformed(self.encoding.label(), self.pending[0]))?;
				self.push_char(ch, out);
				self.pending_len = 0;
			} else {
				let ch = char::from_u32(lead as u32)
					.ok_or(EncodingError::Malformed(self.encoding.label(), self.pending[0]))?;
				self.push_char(ch, out);
				// a third byte may already be staged when the previous
				// iteration speculated on a surrogate pair
				if self.pending_len > 2 {
					self.pending.copy_within(2..self.pending_len, 0);
				}
				self.pending_len -= 2;
			}
		}
	}

	fn convert_latin1(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), EncodingError> {
		for &b in input {
			if b < 0x80 {
				out.push(b);
			} else {
				self.push_char(b as char, out);
			}
		}
		Ok(())
	}

	fn convert_ascii(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), EncodingError> {
		match input.iter().position(|&b| b >= 0x80) {
			Some(pos) => {
				out.extend_from_slice(&input[..pos]);
				Err(EncodingError::Malformed(self.encoding.label(), input[pos]))
			}
			None => {
				out.extend_from_slice(input);
				Ok(())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn convert_all(enc: Encoding, chunks: &[&[u8]]) -> Result<Vec<u8>, EncodingError> {
		let mut conv = EncodingConverter::new(enc, DetectionSource::Detected);
		let mut out = Vec::new();
		for chunk in chunks {
			conv.convert(chunk, &mut out)?;
		}
		conv.finish()?;
		Ok(out)
	}

	#[test]
	fn detect_utf8_bom() {
		assert_eq!(
			detect_encoding(b"\xef\xbb\xbf<?xml", false),
			Detection::Done {
				encoding: Some(Encoding::Utf8),
				bom_length: 3
			}
		);
	}

	#[test]
	fn detect_utf16_boms() {
		assert_eq!(
			detect_encoding(b"\xff\xfe<\x00", false),
			Detection::Done {
				encoding: Some(Encoding::Utf16Le),
				bom_length: 2
			}
		);
		assert_eq!(
			detect_encoding(b"\xfe\xff\x00<", false),
			Detection::Done {
				encoding: Some(Encoding::Utf16Be),
				bom_length: 2
			}
		);
	}

	#[test]
	fn detect_utf16_without_bom() {
		assert_eq!(
			detect_encoding(b"<\x00?\x00", false),
			Detection::Done {
				encoding: Some(Encoding::Utf16Le),
				bom_length: 0
			}
		);
		assert_eq!(
			detect_encoding(b"\x00<\x00?", false),
			Detection::Done {
				encoding: Some(Encoding::Utf16Be),
				bom_length: 0
			}
		);
	}

	#[test]
	fn detect_needs_four_bytes() {
		assert_eq!(detect_encoding(b"<?x", false), Detection::NeedMoreData);
		assert_eq!(
			detect_encoding(b"<?x", true),
			Detection::Done {
				encoding: None,
				bom_length: 0
			}
		);
	}

	#[test]
	fn detect_plain_ascii_start_gives_no_verdict() {
		assert_eq!(
			detect_encoding(b"<roo", false),
			Detection::Done {
				encoding: None,
				bom_length: 0
			}
		);
	}

	#[test]
	fn label_lookup_is_case_insensitive() {
		assert_eq!(Encoding::from_label("utf-8"), Some(Encoding::Utf8));
		assert_eq!(Encoding::from_label("UTF-8"), Some(Encoding::Utf8));
		assert_eq!(Encoding::from_label("iso-8859-1"), Some(Encoding::Latin1));
		assert_eq!(Encoding::from_label("EBCDIC"), None);
	}

	#[test]
	fn utf8_passthrough() {
		assert_eq!(
			convert_all(Encoding::Utf8, &[b"hello \xc3\xa4 world"]).unwrap(),
			b"hello \xc3\xa4 world"
		);
	}

	#[test]
	fn utf8_sequence_split_across_chunks() {
		assert_eq!(
			convert_all(Encoding::Utf8, &[b"a\xc3", b"\xa4b"]).unwrap(),
			b"a\xc3\xa4b"
		);
		// four byte sequence split at every position
		let full = "a😀b".as_bytes();
		for split in 1..full.len() {
			let (head, tail) = full.split_at(split);
			assert_eq!(convert_all(Encoding::Utf8, &[head, tail]).unwrap(), full);
		}
	}

	#[test]
	fn utf8_output_never_ends_mid_codepoint() {
		let mut conv = EncodingConverter::new(Encoding::Utf8, DetectionSource::Default);
		let mut out = Vec::new();
		conv.convert(b"a\xc3", &mut out).unwrap();
		assert_eq!(&out[..], b"a");
		conv.convert(b"\xa4", &mut out).unwrap();
		assert_eq!(&out[..], b"a\xc3\xa4");
	}

	#[test]
	fn utf8_invalid_byte_is_rejected() {
		assert!(matches!(
			convert_all(Encoding::Utf8, &[b"a\xffb"]),
			Err(EncodingError::Malformed(_, 0xff))
		));
	}

	#[test]
	fn utf8_truncated_sequence_at_eof_is_rejected() {
		assert!(matches!(
			convert_all(Encoding::Utf8, &[b"a\xc3"]),
			Err(EncodingError::Malformed(..))
		));
	}

	#[test]
	fn utf16le_basic() {
		assert_eq!(
			convert_all(Encoding::Utf16Le, &[b"<\x00a\x00/\x00>\x00"]).unwrap(),
			b"<a/>"
		);
	}

	#[test]
	fn utf16be_basic() {
		assert_eq!(
			convert_all(Encoding::Utf16Be, &[b"\x00<\x00a\x00/\x00>"]).unwrap(),
			b"<a/>"
		);
	}

	#[test]
	fn utf16_unit_split_across_chunks() {
		assert_eq!(
			convert_all(Encoding::Utf16Le, &[b"<", b"\x00a", b"\x00"]).unwrap(),
			b"<a"
		);
	}

	#[test]
	fn utf16_surrogate_pair() {
		// U+1F600 as UTF-16LE: d83d de00
		let bytes: &[u8] = b"\x3d\xd8\x00\xde";
		assert_eq!(
			convert_all(Encoding::Utf16Le, &[bytes]).unwrap(),
			"😀".as_bytes()
		);
		// split between the surrogates
		assert_eq!(
			convert_all(Encoding::Utf16Le, &[&bytes[..2], &bytes[2..]]).unwrap(),
			"😀".as_bytes()
		);
	}

	#[test]
	fn utf16_text_after_surrogate_pair_in_same_chunk() {
		assert_eq!(
			convert_all(Encoding::Utf16Le, &[b"\x3d\xd8\x00\xdea\x00b\x00"]).unwrap(),
			"\u{1f600}ab".as_bytes()
		);
	}

	#[test]
	fn utf16_lone_surrogate_is_rejected() {
		assert!(matches!(
			convert_all(Encoding::Utf16Le, &[b"\x3d\xd8a\x00"]),
			Err(EncodingError::Malformed(..))
		));
		assert!(matches!(
			convert_all(Encoding::Utf16Le, &[b"\x00\xdea\x00"]),
			Err(EncodingError::Malformed(..))
		));
	}

	#[test]
	fn utf16_odd_length_at_eof_is_rejected() {
		assert!(matches!(
			convert_all(Encoding::Utf16Le, &[b"a\x00b"]),
			Err(EncodingError::Malformed(..))
		));
	}

	#[test]
	fn latin1_maps_to_utf8() {
		assert_eq!(
			convert_all(Encoding::Latin1, &[b"caf\xe9"]).unwrap(),
			"café".as_bytes()
		);
	}

	#[test]
	fn ascii_rejects_high_bytes() {
		assert_eq!(convert_all(Encoding::Ascii, &[b"plain"]).unwrap(), b"plain");
		assert!(matches!(
			convert_all(Encoding::Ascii, &[b"caf\xe9"]),
			Err(EncodingError::Malformed(_, 0xe9))
		));
	}

	#[test]
	fn declare_switches_default_encoding() {
		let mut conv = EncodingConverter::new(Encoding::Utf8, DetectionSource::Default);
		let mut out = Vec::new();
		conv.convert(b"<?xml version=\"1.0\"?>", &mut out).unwrap();
		conv.declare("ISO-8859-1").unwrap();
		assert_eq!(conv.encoding(), Encoding::Latin1);
		out.clear();
		conv.convert(b"\xe9", &mut out).unwrap();
		assert_eq!(&out[..], "é".as_bytes());
	}

	#[test]
	fn declare_rejects_contradicting_detection() {
		let mut conv = EncodingConverter::new(Encoding::Utf16Le, DetectionSource::Detected);
		assert!(matches!(
			conv.declare("UTF-8"),
			Err(EncodingError::DeclarationMismatch { .. })
		));
	}

	#[test]
	fn declare_confirming_detection_is_fine() {
		let mut conv = EncodingConverter::new(Encoding::Utf16Le, DetectionSource::Detected);
		assert!(conv.declare("UTF-16LE").is_ok());
		assert!(conv.declare("utf-16").is_ok());
		assert!(matches!(
			conv.declare("UTF-16BE"),
			Err(EncodingError::DeclarationMismatch { .. })
		));
	}

	#[test]
	fn declare_after_non_ascii_content_is_late() {
		let mut conv = EncodingConverter::new(Encoding::Utf8, DetectionSource::Default);
		let mut out = Vec::new();
		conv.convert("text ä".as_bytes(), &mut out).unwrap();
		assert_eq!(conv.declare("ISO-8859-1"), Err(EncodingError::LateSwitch));
	}

	#[test]
	fn declare_is_ignored_for_explicit_encoding() {
		let mut conv = EncodingConverter::new(Encoding::Latin1, DetectionSource::Explicit);
		assert!(conv.declare("UTF-8").is_ok());
		assert_eq!(conv.encoding(), Encoding::Latin1);
	}

	#[test]
	fn declare_unknown_label_is_unsupported() {
		let mut conv = EncodingConverter::new(Encoding::Utf8, DetectionSource::Default);
		assert_eq!(
			conv.declare("KOI8-R"),
			Err(EncodingError::UnsupportedEncoding)
		);
	}
}
