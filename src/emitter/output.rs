//! Output destination and charset encoding.
//!
//! The destination is opened on the first write. Character sinks receive the
//! text as is; byte sinks get it through the resolved [`Charset`]. Characters
//! the charset cannot represent are either written as character references
//! ([`Output::write_content`]) or rejected with `SERE0008`
//! ([`Output::write_markup`]).

use std::cell::RefCell;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use encoding_rs::{Encoder, EncoderResult, Encoding};
use log::debug;

use crate::FastHashMap;
use crate::error::{Error, Result};

/// Output charset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    /// UTF-16 big endian, always with byte order mark.
    Utf16,
    Utf16Be,
    Utf16Le,
    Ascii,
    Latin1,
    /// Any other charset `encoding_rs` can encode.
    Legacy(&'static Encoding),
}

impl Charset {
    /// Resolves an encoding name case-insensitively, including the usual
    /// legacy spellings (`UTF8`, `ISO8859_1`, `latin1`, `Cp1252`, ...).
    pub fn for_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let native = match lower.as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "utf-16" | "utf16" | "unicode" => Some(Self::Utf16),
            "utf-16be" | "utf16be" | "unicodebigunmarked" => Some(Self::Utf16Be),
            "utf-16le" | "utf16le" | "unicodelittleunmarked" => Some(Self::Utf16Le),
            "us-ascii" | "ascii" | "iso646-us" | "us" | "ansi_x3.4-1968" => Some(Self::Ascii),
            "iso-8859-1" | "iso8859-1" | "iso8859_1" | "iso_8859-1" | "8859_1" | "latin1"
            | "latin-1" | "l1" | "cp819" | "ibm819" => Some(Self::Latin1),
            _ => None,
        };
        if native.is_some() {
            return native;
        }
        // encoding_rs kennt die WHATWG-Labels; Java-Schreibweisen mit '_' nachziehen.
        let enc = Encoding::for_label(lower.as_bytes())
            .or_else(|| Encoding::for_label(lower.replace('_', "-").as_bytes()))?;
        if enc == encoding_rs::UTF_8 {
            Some(Self::Utf8)
        } else if enc == encoding_rs::UTF_16BE {
            Some(Self::Utf16Be)
        } else if enc == encoding_rs::UTF_16LE {
            Some(Self::Utf16Le)
        } else if enc == encoding_rs::REPLACEMENT || enc.output_encoding() != enc {
            None
        } else {
            Some(Self::Legacy(enc))
        }
    }

    /// Canonical name, as written into the XML declaration.
    pub fn name(self) -> &'static str {
        match self {
            Self::Utf8 => "UTF-8",
            Self::Utf16 => "UTF-16",
            Self::Utf16Be => "UTF-16BE",
            Self::Utf16Le => "UTF-16LE",
            Self::Ascii => "US-ASCII",
            Self::Latin1 => "ISO-8859-1",
            Self::Legacy(enc) => enc.name(),
        }
    }

    pub fn is_unicode(self) -> bool {
        matches!(self, Self::Utf8 | Self::Utf16 | Self::Utf16Be | Self::Utf16Le)
    }

    fn byte_order_mark(self) -> &'static [u8] {
        match self {
            Self::Utf8 => b"\xEF\xBB\xBF",
            Self::Utf16 | Self::Utf16Be => b"\xFE\xFF",
            Self::Utf16Le => b"\xFF\xFE",
            _ => b"",
        }
    }
}

/// Opens a byte stream for a destination URI.
pub trait DestinationResolver {
    fn resolve(&self, uri: &str) -> Result<Box<dyn Write>>;
}

/// Treats the URI as a file path (`file://` prefix allowed) and creates the
/// file and its parent directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileResolver;

impl DestinationResolver for FileResolver {
    fn resolve(&self, uri: &str) -> Result<Box<dyn Write>> {
        let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
        let fail = |e: io::Error| Error::Destination(format!("{uri}: {e}"));
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(fail)?;
        }
        let file = File::create(path).map_err(fail)?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

/// Where serialized output goes.
pub enum Destination {
    Chars(Box<dyn fmt::Write>),
    Bytes(Box<dyn Write>),
    /// Resolved on first write through a [`DestinationResolver`].
    Uri(String),
}

/// Character buffer shared with the caller.
pub type SharedString = Rc<RefCell<String>>;
/// Byte buffer shared with the caller.
pub type SharedBuffer = Rc<RefCell<Vec<u8>>>;

struct StringSink(SharedString);

impl fmt::Write for StringSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.borrow_mut().push_str(s);
        Ok(())
    }
}

struct BufferSink(SharedBuffer);

impl Write for BufferSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Destination {
    /// In-memory character destination.
    pub fn string() -> (Self, SharedString) {
        let buf = SharedString::default();
        (Self::Chars(Box::new(StringSink(Rc::clone(&buf)))), buf)
    }

    /// In-memory byte destination.
    pub fn buffer() -> (Self, SharedBuffer) {
        let buf = SharedBuffer::default();
        (Self::Bytes(Box::new(BufferSink(Rc::clone(&buf)))), buf)
    }

    pub fn uri(uri: impl Into<String>) -> Self {
        Self::Uri(uri.into())
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chars(_) => f.write_str("Chars(..)"),
            Self::Bytes(_) => f.write_str("Bytes(..)"),
            Self::Uri(u) => write!(f, "Uri({u:?})"),
        }
    }
}

enum Sink {
    Chars(Box<dyn fmt::Write>),
    Bytes { writer: Box<dyn Write>, encoder: Option<Encoder> },
}

enum State {
    Pending(Destination),
    Open(Sink),
    Closed,
}

fn unencodable(c: char, charset: Charset) -> Error {
    Error::serialization(
        "SERE0008",
        format!("character U+{:04X} cannot be represented in {}", u32::from(c), charset.name()),
    )
}

/// Encoded output stream of one serialization.
pub struct Output {
    state: State,
    resolver: Rc<dyn DestinationResolver>,
    charset: Charset,
    byte_order_mark: bool,
    scratch: Vec<u8>,
    /// Encodierbarkeit fuer Legacy-Charsets, pro Zeichen gemerkt.
    encodable: FastHashMap<char, bool>,
}

impl Output {
    pub fn new(destination: Destination, resolver: Rc<dyn DestinationResolver>) -> Self {
        Self {
            state: State::Pending(destination),
            resolver,
            charset: Charset::Utf8,
            byte_order_mark: false,
            scratch: Vec::new(),
            encodable: FastHashMap::default(),
        }
    }

    /// Sets the charset; only effective before the first write.
    pub fn set_charset(&mut self, charset: Charset, byte_order_mark: bool) {
        self.charset = charset;
        self.byte_order_mark = byte_order_mark;
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn can_encode(&mut self, c: char) -> bool {
        match self.charset {
            Charset::Utf8 | Charset::Utf16 | Charset::Utf16Be | Charset::Utf16Le => true,
            Charset::Ascii => c.is_ascii(),
            Charset::Latin1 => u32::from(c) <= 0xFF,
            Charset::Legacy(enc) => {
                c.is_ascii() || *self.encodable.entry(c).or_insert_with(|| legacy_can_encode(enc, c))
            }
        }
    }

    /// Writes markup; an unencodable character is fatal.
    pub fn write_markup(&mut self, s: &str) -> Result<()> {
        if !self.charset.is_unicode()
            && let Some(c) = s.chars().find(|&c| !self.can_encode(c))
        {
            return Err(unencodable(c, self.charset));
        }
        self.encode(s)
    }

    /// Writes escaped content; unencodable characters become `&#x..;`.
    pub fn write_content(&mut self, s: &str) -> Result<()> {
        if self.charset.is_unicode() {
            return self.encode(s);
        }
        let mut run_start = 0;
        for (i, c) in s.char_indices() {
            if !self.can_encode(c) {
                self.encode(&s[run_start..i])?;
                self.encode(&format!("&#x{:X};", u32::from(c)))?;
                run_start = i + c.len_utf8();
            }
        }
        self.encode(&s[run_start..])
    }

    fn sink(&mut self) -> Result<&mut Sink> {
        if let State::Pending(_) = self.state {
            self.state = match std::mem::replace(&mut self.state, State::Closed) {
                State::Pending(destination) => State::Open(self.open_destination(destination)?),
                other => other,
            };
        }
        match &mut self.state {
            State::Open(sink) => Ok(sink),
            _ => Err(Error::protocol("output written after close")),
        }
    }

    fn open_destination(&self, destination: Destination) -> Result<Sink> {
        let mut sink = match destination {
            Destination::Chars(w) => Sink::Chars(w),
            Destination::Bytes(writer) => self.byte_sink(writer),
            Destination::Uri(uri) => {
                debug!("opening output destination {uri}");
                let writer = self.resolver.resolve(&uri)?;
                self.byte_sink(writer)
            }
        };
        match &mut sink {
            Sink::Chars(w) if self.byte_order_mark => w.write_char('\u{feff}')?,
            Sink::Bytes { writer, .. } if self.byte_order_mark || self.charset == Charset::Utf16 => {
                writer.write_all(self.charset.byte_order_mark())?;
            }
            _ => {}
        }
        Ok(sink)
    }

    fn byte_sink(&self, writer: Box<dyn Write>) -> Sink {
        let encoder = match self.charset {
            Charset::Legacy(enc) => Some(enc.new_encoder()),
            _ => None,
        };
        Sink::Bytes { writer, encoder }
    }

    fn encode(&mut self, s: &str) -> Result<()> {
        if s.is_empty() {
            return Ok(());
        }
        let charset = self.charset;
        self.sink()?;
        let State::Open(sink) = &mut self.state else {
            return Err(Error::protocol("output written after close"));
        };
        match sink {
            Sink::Chars(w) => w.write_str(s)?,
            Sink::Bytes { writer, encoder } => {
                let scratch = &mut self.scratch;
                scratch.clear();
                match charset {
                    Charset::Utf8 => return Ok(writer.write_all(s.as_bytes())?),
                    Charset::Utf16 | Charset::Utf16Be => {
                        s.encode_utf16().for_each(|u| scratch.extend_from_slice(&u.to_be_bytes()));
                    }
                    Charset::Utf16Le => {
                        s.encode_utf16().for_each(|u| scratch.extend_from_slice(&u.to_le_bytes()));
                    }
                    Charset::Ascii | Charset::Latin1 => {
                        for c in s.chars() {
                            let b = u8::try_from(u32::from(c)).map_err(|_| unencodable(c, charset))?;
                            scratch.push(b);
                        }
                    }
                    Charset::Legacy(_) => {
                        let Some(encoder) = encoder else {
                            return Err(Error::protocol("legacy charset without encoder"));
                        };
                        return encode_legacy(encoder, writer, s, false, charset);
                    }
                }
                writer.write_all(scratch)?;
            }
        }
        Ok(())
    }

    /// Flushes the encoder and the destination. Opens the destination if
    /// nothing was written, so an empty result still exists.
    pub fn close(&mut self) -> Result<()> {
        if let State::Closed = self.state {
            return Ok(());
        }
        let charset = self.charset;
        self.sink()?;
        if let State::Open(sink) = std::mem::replace(&mut self.state, State::Closed) {
            match sink {
                Sink::Chars(_) => {}
                Sink::Bytes { mut writer, encoder } => {
                    if let Some(mut encoder) = encoder {
                        encode_legacy(&mut encoder, &mut writer, "", true, charset)?;
                    }
                    writer.flush()?;
                }
            }
        }
        Ok(())
    }
}

fn legacy_can_encode(enc: &'static Encoding, c: char) -> bool {
    let mut encoder = enc.new_encoder();
    let mut utf8 = [0u8; 4];
    let mut out = [0u8; 16];
    let (result, _, _) =
        encoder.encode_from_utf8_without_replacement(c.encode_utf8(&mut utf8), &mut out, true);
    matches!(result, EncoderResult::InputEmpty)
}

fn encode_legacy(
    encoder: &mut Encoder,
    writer: &mut Box<dyn Write>,
    s: &str,
    last: bool,
    charset: Charset,
) -> Result<()> {
    let mut buf = [0u8; 1024];
    let mut src = s;
    loop {
        let (result, read, written) =
            encoder.encode_from_utf8_without_replacement(src, &mut buf, last);
        writer.write_all(&buf[..written])?;
        src = &src[read..];
        match result {
            EncoderResult::InputEmpty => return Ok(()),
            EncoderResult::OutputFull => {}
            EncoderResult::Unmappable(c) => return Err(unencodable(c, charset)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_output(charset: Charset, bom: bool) -> (Output, SharedBuffer) {
        let (dest, buf) = Destination::buffer();
        let mut out = Output::new(dest, Rc::new(FileResolver));
        out.set_charset(charset, bom);
        (out, buf)
    }

    #[test]
    fn charset_namen_und_aliase() {
        assert_eq!(Charset::for_name("utf8"), Some(Charset::Utf8));
        assert_eq!(Charset::for_name("ISO8859_1"), Some(Charset::Latin1));
        assert_eq!(Charset::for_name("latin1"), Some(Charset::Latin1));
        assert_eq!(Charset::for_name("ASCII"), Some(Charset::Ascii));
        assert_eq!(Charset::for_name("UTF16"), Some(Charset::Utf16));
        assert_eq!(Charset::for_name("Cp1252").map(Charset::name), Some("windows-1252"));
        assert_eq!(Charset::for_name("Shift_JIS").map(Charset::name), Some("Shift_JIS"));
        assert_eq!(Charset::for_name("x-no-such-charset"), None);
        assert_eq!(Charset::for_name("replacement"), None);
    }

    #[test]
    fn zeichenreferenzen_im_inhalt() {
        let (mut out, buf) = bytes_output(Charset::Ascii, false);
        out.write_content("caf\u{e9} \u{20ac}").unwrap();
        out.close().unwrap();
        assert_eq!(&*buf.borrow(), b"caf&#xE9; &#x20AC;");
    }

    #[test]
    fn markup_ausserhalb_des_charsets_ist_fatal() {
        let (mut out, _) = bytes_output(Charset::Latin1, false);
        let err = out.write_markup("\u{20ac}").unwrap_err();
        assert_eq!(err.code(), Some("SERE0008"));
    }

    #[test]
    fn latin1_bytes() {
        let (mut out, buf) = bytes_output(Charset::Latin1, false);
        out.write_markup("<\u{e9}>").unwrap();
        out.close().unwrap();
        assert_eq!(&*buf.borrow(), &[b'<', 0xE9, b'>']);
    }

    #[test]
    fn utf16_mit_bom() {
        let (mut out, buf) = bytes_output(Charset::Utf16Le, true);
        out.write_markup("a").unwrap();
        out.close().unwrap();
        assert_eq!(&*buf.borrow(), &[0xFF, 0xFE, b'a', 0]);
    }

    #[test]
    fn legacy_charset_ueber_encoding_rs() {
        let charset = Charset::for_name("windows-1252").unwrap();
        let (mut out, buf) = bytes_output(charset, false);
        out.write_content("\u{20ac}\u{3042}").unwrap();
        out.close().unwrap();
        assert_eq!(&*buf.borrow(), b"\x80&#x3042;");
    }

    #[test]
    fn leere_ausgabe_wird_trotzdem_geoeffnet() {
        let (dest, text) = Destination::string();
        let mut out = Output::new(dest, Rc::new(FileResolver));
        out.close().unwrap();
        out.close().unwrap();
        assert!(text.borrow().is_empty());
    }

    #[test]
    fn nicht_schreibbares_ziel() {
        let mut out = Output::new(
            Destination::uri("/nonexistent-dir-xser/\0/out.xml"),
            Rc::new(FileResolver),
        );
        assert!(matches!(out.write_markup("x"), Err(Error::Destination(_))));
    }
}
