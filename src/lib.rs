/*!
# Incremental XML 1.0 well-formedness parsing

This crate provides incremental, encoding-aware parsing of XML 1.0
documents, checking well-formedness as it goes.

## Features

* Streamed parsing (the parser emits a subset of SAX events)
* Can be driven push- and pull-based
* Incremental input: bytes may arrive in chunks of any size, and the
  resulting events do not depend on the chunk boundaries
* Automatic encoding detection (UTF-8, UTF-16, ISO-8859-1, US-ASCII) from
  byte order marks and the XML declaration
* General entity support with strict expansion limits, including external
  entities through a caller-supplied [`EntityResolver`]
* Exact source positions (line, column, byte offset) on every event and in
  error reports
* XML 1.0 only, well-formedness only (no validation)

## Example

```
use ixml::EventRead;
let doc = b"<?xml version='1.0'?><hello>World!</hello>";
let mut fp = ixml::FeedParser::new();
fp.feed(doc).unwrap();
fp.feed_eof().unwrap();
let result = fp.read_all_eof(|ev| {
	println!("got event: {:?}", ev);
});
// true indicates eof
assert_eq!(result.unwrap(), true);
```

## High-level usage

### Push-based usage

The [`FeedParser`] allows to push bits of XML into the parser as they arrive
in the application and process the resulting [`Event`]s as they happen.

### Pull-based usage

If the parser should block while waiting for more data to arrive, a
[`PullParser`] can be used instead. The `PullParser` requires a source which
implements [`io::BufRead`].
*/
use std::io;

pub mod error;
pub mod lexer;
pub mod parser;
pub mod strings;
pub mod selectors;
pub mod buf;
mod encoding;
mod entity;
mod errctx;
mod input;


#[doc(inline)]
pub use buf::ByteBuffer;
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use lexer::{Lexer, LexerOptions};
#[doc(inline)]
pub use parser::{Event, Parser, ParserOptions, Strictness, XMLVersion};
#[doc(inline)]
pub use encoding::Encoding;
#[doc(inline)]
pub use entity::{EntityDef, EntityResolver, NoResolver, ReplacementOrigin};
#[doc(inline)]
pub use input::Position;
pub use strings::{CData, CDataStr, Name, NameStr};

pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

/**
# Source for individual XML events

This trait is implemented by the different parser frontends. It is analogous
to the [`std::io::Read`] trait, but for [`Event`]s instead of bytes.
*/
pub trait EventRead {
	/// Read a single event from the parser.
	///
	/// If the EOF has been reached with a valid document, `None` is returned.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without reading
	/// further data from the source).
	fn read(&mut self) -> Result<Option<Event>>;

	/// Read all events which can be produced from the data source (at this
	/// point in time).
	///
	/// The given `cb` is invoked for each event.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without reading
	/// further data from the source).
	fn read_all<F>(&mut self, mut cb: F) -> Result<()>
		where F: FnMut(Event) -> ()
	{
		loop {
			match self.read()? {
				None => return Ok(()),
				Some(ev) => cb(ev),
			}
		}
	}

	/// Read all events which can be produced from the data source (at this
	/// point in time).
	///
	/// The given `cb` is invoked for each event.
	///
	/// If the data source indicates that it needs to block to read further
	/// data, `false` is returned. If the EOF is reached successfully, `true`
	/// is returned.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without reading
	/// further data from the source).
	fn read_all_eof<F>(&mut self, cb: F) -> Result<bool>
		where F: FnMut(Event) -> ()
	{
		as_eof_flag(self.read_all(cb))
	}
}

/// Convert end-of-file-ness of a result to a boolean flag.
///
/// If the result is ok, return true (EOF). If the result is not ok, but the
/// error is an I/O error indicating that the data source would have to block
/// to read further data, return false ("Ok, but not at eof yet").
///
/// All other errors are passed through.
pub fn as_eof_flag(r: Result<()>) -> Result<bool> {
	match r {
		Err(Error::IO(ioerr)) if ioerr.kind() == io::ErrorKind::WouldBlock => Ok(false),
		Err(e) => Err(e),
		Ok(()) => Ok(true),
	}
}

/**
# Non-blocking parsing

The [`FeedParser`] allows parsing XML documents as they arrive in the
application, giving back control to the caller immediately when not enough
data is available for processing. This is especially useful when streaming
data from sockets.

To read events from the `FeedParser` after feeding data, use its
[`EventRead`] trait.

## Example

```
use ixml::{FeedParser, Error, Event, XMLVersion, EventRead};
use std::io;
let doc = b"<?xml version='1.0'?><hello>World!</hello>";
let mut fp = FeedParser::new();
fp.feed(&doc[..10]).unwrap();
// We expect a WouldBlock, because the XML declaration is not complete yet
let ev = fp.read();
assert!(matches!(
    ev.err().unwrap(),
    Error::IO(e) if e.kind() == io::ErrorKind::WouldBlock
));

fp.feed(&doc[10..25]).unwrap();
// Now we passed the XML declaration (and some), so we expect a
// corresponding event
let ev = fp.read();
assert!(matches!(ev.unwrap().unwrap(), Event::StartDocument(_, XMLVersion::V1_0)));
```
*/
pub struct FeedParser {
	parser: Parser,
}

impl FeedParser {
	/// Create a new `FeedParser` with default options.
	pub fn new() -> FeedParser {
		Self::with_options(ParserOptions::default())
	}

	/// Create a new `FeedParser` with the given options.
	pub fn with_options(options: ParserOptions) -> FeedParser {
		FeedParser {
			parser: Parser::with_options(options),
		}
	}

	/// Install the resolver through which external entity content is
	/// obtained.
	pub fn set_resolver(&mut self, resolver: Box<dyn EntityResolver>) {
		self.parser.set_resolver(resolver);
	}

	/// Feed a chunk of data to the parser.
	///
	/// The data is staged and decoded, but events are only produced by
	/// calls to [`FeedParser::read()`] or [`FeedParser::read_all()`].
	pub fn feed(&mut self, data: &[u8]) -> Result<()> {
		self.parser.feed(data)
	}

	/// Feed the eof marker to the parser.
	///
	/// This is a prerequisite for parsing to terminate with an eof signal
	/// (returning `true`). Otherwise, `false` will be returned indefinitely
	/// without emitting any further events.
	pub fn feed_eof(&mut self) -> Result<()> {
		self.parser.feed_eof()
	}

	/// Current read position of the active input source.
	pub fn position(&self) -> Position {
		self.parser.position()
	}

	/// Release all temporary buffers
	///
	/// This is sensible to call when it is expected that no more data will be
	/// processed by the parser for a while and the memory is better used
	/// elsewhere.
	pub fn release_temporaries(&mut self) {
		self.parser.release_temporaries();
	}
}

impl EventRead for FeedParser {
	/// Read a single event from the parser.
	///
	/// If the EOF has been reached with a valid document, `None` is returned.
	///
	/// If the buffered data is not sufficient to create an event, an I/O
	/// error of [`std::io::ErrorKind::WouldBlock`] is returned.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without reading
	/// further data from the source).
	fn read(&mut self) -> Result<Option<Event>> {
		self.parser.read()
	}
}

/**
# Blocking parsing

The [`PullParser`] allows parsing XML documents from a [`io::BufRead`]
blockingly. The parser will block until the backing [`io::BufRead`] has
enough data available (or returns an error).

Interaction with a `PullParser` should happen exclusively via the
[`EventRead`] trait.

## Example

```
use ixml::{PullParser, Error, Event, XMLVersion, EventRead};
use std::io;
let mut doc = &b"<?xml version='1.0'?><hello>World!</hello>"[..];
// this converts the doc into an io::BufRead
let mut pp = PullParser::new(&mut doc);
// we expect the first event to be the document start
let ev = pp.read();
assert!(matches!(ev.unwrap().unwrap(), Event::StartDocument(_, XMLVersion::V1_0)));
```
*/
pub struct PullParser<T: io::BufRead> {
	reader: T,
	parser: Parser,
}

impl<T: io::BufRead> PullParser<T> {
	/// Create a new PullParser, wrapping the given reader.
	pub fn new(r: T) -> Self {
		Self::with_options(r, ParserOptions::default())
	}

	/// Create a new PullParser with the given options.
	pub fn with_options(r: T, options: ParserOptions) -> Self {
		PullParser {
			reader: r,
			parser: Parser::with_options(options),
		}
	}

	/// Install the resolver through which external entity content is
	/// obtained.
	pub fn set_resolver(&mut self, resolver: Box<dyn EntityResolver>) {
		self.parser.set_resolver(resolver);
	}
}

impl<T: io::BufRead> EventRead for PullParser<T> {
	/// Read a single event from the parser.
	///
	/// If the EOF has been reached with a valid document, `None` is returned.
	///
	/// All I/O errors from the source are passed on without modification.
	///
	/// I/O errors may be retried, all other errors are fatal (and will be
	/// returned again by the parser on the next invocation without reading
	/// further data from the source).
	fn read(&mut self) -> Result<Option<Event>> {
		loop {
			match self.parser.read() {
				Err(Error::IO(ioerr)) if ioerr.kind() == io::ErrorKind::WouldBlock => (),
				result => return result,
			}
			let buf = self.reader.fill_buf()?;
			if buf.len() == 0 {
				self.parser.feed_eof()?;
			} else {
				let len = buf.len();
				self.parser.feed(buf)?;
				self.reader.consume(len);
			}
		}
	}
}
