//! XML text as an event source, read with quick-xml's `NsReader`.
//!
//! Produces `StartDocument` .. `EndDocument` through `process` only; opening
//! and closing the receiver is left to the caller. Adjacent text, CDATA and
//! resolved references are delivered as one `Characters` event.

use std::borrow::Cow;
use std::io::Read;

use memchr::{memchr, memchr_iter};
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::name::{QName as XmlQName, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::{Error, Result};
use crate::event::{Event, TypeAnnotation};
use crate::location::{LocationId, LocationTable};
use crate::pipeline::Receiver;
use crate::properties::Properties;
use crate::qname::{NS_XML, QName};
use crate::whitespace::is_xml_whitespace;

/// Reads all of `input` and parses it like [`parse_str`].
pub fn parse_reader(
    mut input: impl Read,
    receiver: &mut dyn Receiver,
    locations: Option<&LocationTable>,
) -> Result<()> {
    let mut xml = String::new();
    input.read_to_string(&mut xml)?;
    parse_str(&xml, receiver, locations)
}

/// Parses `xml` and feeds the events to `receiver`. Element start positions
/// are recorded in `locations` when given.
pub fn parse_str(xml: &str, receiver: &mut dyn Receiver, locations: Option<&LocationTable>) -> Result<()> {
    let mut source = Source {
        xml,
        receiver,
        locations,
        lines: LineCounter::default(),
        pending_text: None,
        depth: 0,
    };
    source.run()
}

/// Zeilen/Spalten aus Byte-Offsets; scannt nur vorwaerts.
#[derive(Debug)]
struct LineCounter {
    line: u32,
    line_start: usize,
    scanned: usize,
}

impl Default for LineCounter {
    fn default() -> Self {
        Self { line: 1, line_start: 0, scanned: 0 }
    }
}

impl LineCounter {
    fn position(&mut self, xml: &str, offset: usize) -> (u32, u32) {
        let offset = offset.min(xml.len());
        if offset > self.scanned {
            for nl in memchr_iter(b'\n', &xml.as_bytes()[self.scanned..offset]) {
                self.line += 1;
                self.line_start = self.scanned + nl + 1;
            }
            self.scanned = offset;
        }
        let column = xml
            .get(self.line_start..offset)
            .map_or(0, |s| s.chars().count());
        (self.line, u32::try_from(column + 1).unwrap_or(u32::MAX))
    }
}

struct Source<'x, 'r> {
    xml: &'x str,
    receiver: &'r mut dyn Receiver,
    locations: Option<&'x LocationTable>,
    lines: LineCounter,
    /// Text-Coalescing: wird vor jedem anderen Event geflusht.
    pending_text: Option<String>,
    depth: usize,
}

impl Source<'_, '_> {
    fn run(&mut self) -> Result<()> {
        let mut reader = NsReader::from_str(self.xml);
        reader.config_mut().trim_text(false);

        self.receiver.process(Event::StartDocument)?;
        loop {
            let offset = reader.buffer_position() as usize;
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let (line, column) = self.lines.position(self.xml, reader.error_position() as usize);
                    return Err(Error::XmlParseError(format!("{line}:{column}: {e}")));
                }
            };
            match event {
                XmlEvent::Start(e) => {
                    self.start_element(&reader, &e, offset)?;
                    self.depth += 1;
                }
                XmlEvent::Empty(e) => {
                    self.start_element(&reader, &e, offset)?;
                    self.receiver.process(Event::EndElement)?;
                }
                XmlEvent::End(_) => {
                    self.flush_text()?;
                    self.depth = self
                        .depth
                        .checked_sub(1)
                        .ok_or_else(|| Error::XmlParseError("unexpected end tag".into()))?;
                    self.receiver.process(Event::EndElement)?;
                }
                XmlEvent::Text(e) => {
                    let raw = utf8(&e)?;
                    let text = unescape(raw).map_err(|er| Error::XmlParseError(er.to_string()))?;
                    self.push_text(&normalize_line_endings(&text), offset)?;
                }
                XmlEvent::CData(e) => {
                    let raw = utf8(&e)?;
                    self.push_text(&normalize_line_endings(raw), offset)?;
                }
                XmlEvent::GeneralRef(e) => {
                    let name = utf8(&e)?;
                    let resolved: Cow<'_, str> = if let Some(num) = name.strip_prefix('#') {
                        let c = resolve_char_reference(num).ok_or_else(|| {
                            Error::XmlParseError(format!("invalid character reference &{name};"))
                        })?;
                        Cow::Owned(c.to_string())
                    } else {
                        let s = resolve_predefined_entity(name).ok_or_else(|| {
                            Error::XmlParseError(format!("undeclared entity &{name};"))
                        })?;
                        Cow::Borrowed(s)
                    };
                    self.push_text(&resolved, offset)?;
                }
                XmlEvent::Comment(e) => {
                    self.flush_text()?;
                    let text = normalize_line_endings(utf8(&e)?);
                    self.receiver.process(Event::comment(&text))?;
                }
                XmlEvent::PI(e) => {
                    self.flush_text()?;
                    let target = utf8(e.target())?;
                    // Trenner zwischen Target und Daten gehoert nicht zu den Daten.
                    let data = normalize_line_endings(utf8(e.content())?.trim_start());
                    self.receiver.process(Event::processing_instruction(target, &data))?;
                }
                XmlEvent::Decl(_) | XmlEvent::DocType(_) => {}
                XmlEvent::Eof => break,
            }
        }
        self.flush_text()?;
        if self.depth > 0 {
            return Err(Error::XmlParseError(format!("{} unclosed element(s)", self.depth)));
        }
        self.receiver.process(Event::EndDocument)
    }

    fn location(&mut self, offset: usize) -> LocationId {
        match self.locations {
            Some(table) => {
                let (line, column) = self.lines.position(self.xml, offset);
                table.record(line, column)
            }
            None => LocationId::UNKNOWN,
        }
    }

    fn push_text(&mut self, text: &str, offset: usize) -> Result<()> {
        if self.depth == 0 {
            if is_xml_whitespace(text) {
                return Ok(());
            }
            let (line, column) = self.lines.position(self.xml, offset);
            return Err(Error::XmlParseError(format!(
                "{line}:{column}: character data outside the root element"
            )));
        }
        match &mut self.pending_text {
            Some(pending) => pending.push_str(text),
            None => self.pending_text = Some(text.to_owned()),
        }
        Ok(())
    }

    fn flush_text(&mut self) -> Result<()> {
        if let Some(text) = self.pending_text.take() {
            self.receiver.process(Event::characters(&text))?;
        }
        Ok(())
    }

    fn start_element(&mut self, reader: &NsReader<&[u8]>, e: &BytesStart<'_>, offset: usize) -> Result<()> {
        self.flush_text()?;
        let (ns, local) = reader.resolver().resolve_element(e.name());
        let name = make_qname(ns, local.as_ref(), e.name())?;
        let location = self.location(offset);
        self.receiver.process(Event::StartElement {
            name: &name,
            type_annotation: TypeAnnotation::Untyped,
            location,
            properties: Properties::NONE,
        })?;

        for attr in e.attributes() {
            let attr = attr.map_err(|er| Error::XmlParseError(er.to_string()))?;
            let key = attr.key.as_ref();
            let raw = utf8(&attr.value)?;
            let value = attribute_value(raw)?;
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                let prefix = utf8(key.get(6..).unwrap_or_default())?;
                self.receiver.process(Event::namespace(prefix, &value))?;
                continue;
            }
            let (ns, local) = reader.resolver().resolve_attribute(attr.key);
            let attr_name = make_qname(ns, local.as_ref(), attr.key)?;
            self.receiver.process(Event::Attribute {
                name: &attr_name,
                type_annotation: TypeAnnotation::Untyped,
                value: &value,
                location,
                properties: Properties::NONE,
            })?;
        }
        self.receiver.process(Event::StartContent)
    }
}

fn utf8(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes).map_err(|e| Error::XmlParseError(e.to_string()))
}

fn make_qname(ns: ResolveResult<'_>, local: &[u8], raw: XmlQName<'_>) -> Result<QName> {
    let uri = match ns {
        ResolveResult::Bound(ns) => utf8(ns.0)?,
        ResolveResult::Unbound => "",
        ResolveResult::Unknown(prefix) if prefix == b"xml" => NS_XML,
        ResolveResult::Unknown(prefix) => {
            return Err(Error::XmlParseError(format!(
                "undeclared namespace prefix '{}'",
                String::from_utf8_lossy(&prefix)
            )));
        }
    };
    let local = utf8(local)?;
    match raw.prefix() {
        Some(prefix) => Ok(QName::with_prefix(uri, local, utf8(prefix.as_ref())?)),
        None => Ok(QName::new(uri, local)),
    }
}

/// Attribute value normalization: line endings, then whitespace to spaces,
/// then references (so `&#xA;` survives as a newline).
fn attribute_value(raw: &str) -> Result<String> {
    let normalized = normalize_line_endings(raw).replace(['\t', '\n'], " ");
    let value = unescape(&normalized).map_err(|er| Error::XmlParseError(er.to_string()))?;
    Ok(value.into_owned())
}

/// XML 1.0 Sec. 2.11: \r\n -> \n, alleinstehende \r -> \n
fn normalize_line_endings(s: &str) -> Cow<'_, str> {
    if memchr(b'\r', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.replace("\r\n", "\n").replace('\r', "\n"))
}

fn resolve_char_reference(num: &str) -> Option<char> {
    let code = match num.strip_prefix('x') {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => num.parse().ok()?,
    };
    char::from_u32(code)
}
