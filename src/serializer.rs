//! Serializer facade: assembles the filter chain for a set of output
//! properties and drives it.
//!
//! # Beispiel
//!
//! ```
//! use xser::options::{OutputMethod, OutputProperties};
//! use xser::serializer::Serializer;
//!
//! let props = OutputProperties::default()
//!     .with_method(OutputMethod::Xml)
//!     .with_omit_xml_declaration(true);
//! let out = Serializer::new(props).serialize_xml_str("<a><b/></a>").unwrap();
//! assert_eq!(out, "<a><b/></a>");
//! ```

use std::cell::RefCell;
use std::fmt;
use std::io::Read;
use std::rc::Rc;

use log::debug;

use crate::charmap::CharacterMapExpander;
use crate::context::{HostLanguage, PipelineContext};
use crate::diagnostics::{DiagnosticsSink, LogDiagnostics};
use crate::emitter::{
    Destination, DestinationResolver, FileResolver, Flavor, MarkupEmitter, TextEmitter,
};
use crate::error::{Error, Result};
use crate::event::{Event, OwnedEvent};
use crate::html::{MetaTagAdjuster, UriEscaper};
use crate::indent::{HtmlClassifier, Indenter};
use crate::location::{LocationProvider, LocationTable, NoLocations};
use crate::namespace::NamespaceReducer;
use crate::negotiator::{ChainFactory, OutputMethodNegotiator};
use crate::options::{OutputMethod, OutputProperties, SharedProperties, Standalone};
use crate::pipeline::{CheckMode, Next, ProtocolChecker, Receiver};
use crate::qname::QName;
use crate::source;
use crate::whitespace::{StripSpace, WhitespaceStripper};

fn unsupported_method(name: &QName) -> Error {
    Error::serialization(
        "SEPM0016",
        format!("output method Q{} is not supported", name.clark()),
    )
}

/// Method-specific part of the chain, ending in the emitter.
fn method_chain(
    method: &OutputMethod,
    destination: Destination,
    props: &SharedProperties,
    resolver: Rc<dyn DestinationResolver>,
) -> Result<Next> {
    let (char_map, indent, indent_spaces, content_type, escape_uris) = {
        let p = props.borrow();
        (
            p.active_character_map(),
            p.effective_indent(),
            p.indent_spaces(),
            p.include_content_type(),
            p.escape_uri_attributes(),
        )
    };
    let with_char_map = |next: Next, flavor: Flavor| -> Next {
        match char_map {
            Some(map) => Box::new(CharacterMapExpander::new(next, map, flavor)),
            None => next,
        }
    };
    debug!("building {method} chain (indent={indent})");
    let chain: Next = match method {
        OutputMethod::Xml => {
            let emitter =
                MarkupEmitter::new(Flavor::Xml, destination, resolver, Rc::clone(props));
            let mut next = with_char_map(Box::new(emitter), Flavor::Xml);
            if indent {
                next = Box::new(Indenter::xml(next, indent_spaces));
            }
            next
        }
        OutputMethod::Html | OutputMethod::Xhtml => {
            let (flavor, classifier) = match method {
                OutputMethod::Html => (Flavor::Html, HtmlClassifier::html()),
                _ => (Flavor::Xhtml, HtmlClassifier::xhtml()),
            };
            let emitter = MarkupEmitter::new(flavor, destination, resolver, Rc::clone(props));
            let mut next = with_char_map(Box::new(emitter), flavor);
            if escape_uris {
                next = Box::new(UriEscaper::new(next, flavor));
            }
            if indent {
                next = Box::new(Indenter::new(next, Box::new(classifier), indent_spaces));
            }
            if content_type {
                next = Box::new(MetaTagAdjuster::new(next, flavor, Rc::clone(props)));
            }
            next
        }
        OutputMethod::Text => {
            with_char_map(
                Box::new(TextEmitter::new(destination, resolver, Rc::clone(props))),
                Flavor::Xml,
            )
        }
        OutputMethod::Custom(name) => return Err(unsupported_method(name)),
    };
    Ok(chain)
}

/// Configuration of a serialization; builds one [`SerializationPipeline`]
/// per result.
#[derive(Clone)]
pub struct Serializer {
    properties: OutputProperties,
    strip_space: StripSpace,
    host: HostLanguage,
    diagnostics: Rc<dyn DiagnosticsSink>,
    locations: Rc<dyn LocationProvider>,
    resolver: Rc<dyn DestinationResolver>,
    system_id: Option<String>,
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer")
            .field("properties", &self.properties)
            .field("strip_space", &self.strip_space)
            .field("host", &self.host)
            .field("system_id", &self.system_id)
            .finish_non_exhaustive()
    }
}

impl Default for Serializer {
    fn default() -> Self {
        Self::new(OutputProperties::default())
    }
}

impl Serializer {
    pub fn new(properties: OutputProperties) -> Self {
        Self {
            properties,
            strip_space: StripSpace::None,
            host: HostLanguage::default(),
            diagnostics: Rc::new(LogDiagnostics),
            locations: Rc::new(NoLocations),
            resolver: Rc::new(FileResolver),
            system_id: None,
        }
    }

    #[must_use]
    pub fn with_strip_space(mut self, strip_space: StripSpace) -> Self {
        self.strip_space = strip_space;
        self
    }

    #[must_use]
    pub fn with_host_language(mut self, host: HostLanguage) -> Self {
        self.host = host;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Rc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    #[must_use]
    pub fn with_locations(mut self, locations: Rc<dyn LocationProvider>) -> Self {
        self.locations = locations;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: Rc<dyn DestinationResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// System id reported in locations of parsed input.
    #[must_use]
    pub fn with_system_id(mut self, system_id: &str) -> Self {
        self.system_id = Some(system_id.to_owned());
        self
    }

    pub fn properties(&self) -> &OutputProperties {
        &self.properties
    }

    /// Builds the chain writing to `destination`.
    ///
    /// # Errors
    ///
    /// Invalid property combinations (see [`OutputProperties::validate`]) and
    /// `SEPM0016` for a custom method.
    pub fn pipeline(&self, destination: Destination) -> Result<SerializationPipeline> {
        self.properties.validate()?;
        let props: SharedProperties = Rc::new(RefCell::new(self.properties.clone()));
        let resolver = Rc::clone(&self.resolver);

        let mut next: Next = match self.properties.method() {
            Some(method) => method_chain(method, destination, &props, resolver)?,
            None => {
                let shared = Rc::clone(&props);
                let factory: ChainFactory = Box::new(move |method| {
                    shared.borrow_mut().set_method(Some(method.clone()));
                    method_chain(method, destination, &shared, resolver)
                });
                Box::new(OutputMethodNegotiator::new(
                    factory,
                    self.properties.effective_html_version(),
                ))
            }
        };
        if !matches!(self.strip_space, StripSpace::None) {
            next = Box::new(WhitespaceStripper::new(next, self.strip_space.clone()));
        }
        next = Box::new(NamespaceReducer::new(next));
        let mode = if self.properties.standalone() != Standalone::Omit
            || self.properties.doctype_system().is_some()
        {
            CheckMode::Document
        } else {
            CheckMode::Fragment
        };
        let mut head: Next = Box::new(ProtocolChecker::new(next, mode));

        let ctx = Rc::new(
            PipelineContext::new(self.host)
                .with_locations(Rc::clone(&self.locations))
                .with_diagnostics(Rc::clone(&self.diagnostics)),
        );
        head.set_pipeline_context(&ctx);
        Ok(SerializationPipeline { head, ctx, props })
    }

    /// Serializes owned events to `destination`; returns the recorded
    /// output properties.
    pub fn serialize(&self, events: &[OwnedEvent], destination: Destination) -> Result<OutputProperties> {
        let mut pipeline = self.pipeline(destination)?;
        let result = pipeline.open().and_then(|()| {
            events.iter().try_for_each(|event| pipeline.process(event.as_event()))
        });
        pipeline.complete(result)
    }

    pub fn serialize_to_string(&self, events: &[OwnedEvent]) -> Result<String> {
        let (destination, text) = Destination::string();
        self.serialize(events, destination)?;
        Ok(text.take())
    }

    pub fn serialize_to_bytes(&self, events: &[OwnedEvent]) -> Result<Vec<u8>> {
        let (destination, bytes) = Destination::buffer();
        self.serialize(events, destination)?;
        Ok(bytes.take())
    }

    /// Parses XML from `input` and serializes it to `destination`.
    pub fn serialize_xml(&self, input: impl Read, destination: Destination) -> Result<OutputProperties> {
        let table = Rc::new(LocationTable::new(self.system_id.as_deref()));
        let serializer = Self {
            locations: Rc::clone(&table) as Rc<dyn LocationProvider>,
            ..self.clone()
        };
        let mut pipeline = serializer.pipeline(destination)?;
        let result = pipeline
            .open()
            .and_then(|()| source::parse_reader(input, &mut pipeline, Some(&*table)));
        pipeline.complete(result)
    }

    pub fn serialize_xml_str(&self, xml: &str) -> Result<String> {
        let (destination, text) = Destination::string();
        self.serialize_xml(xml.as_bytes(), destination)?;
        Ok(text.take())
    }
}

/// An assembled chain: protocol check, namespace reduction, optional
/// whitespace stripping, then the method chain (or the negotiator).
pub struct SerializationPipeline {
    head: Next,
    ctx: Rc<PipelineContext>,
    props: SharedProperties,
}

impl SerializationPipeline {
    pub fn context(&self) -> &Rc<PipelineContext> {
        &self.ctx
    }

    /// Current state of the output properties (method and encoding may have
    /// been settled during the pass).
    pub fn properties(&self) -> OutputProperties {
        self.props.borrow().clone()
    }

    /// Closes the chain and returns the recorded output properties.
    pub fn finish(mut self) -> Result<OutputProperties> {
        self.head.close()?;
        Ok(self.properties())
    }

    fn complete(mut self, result: Result<()>) -> Result<OutputProperties> {
        match result {
            Ok(()) => self.finish(),
            Err(e) => {
                // Der erste Fehler gewinnt; close ist best effort.
                self.ctx.abort();
                if let Err(close_err) = self.head.close() {
                    debug!("close after failed pass: {close_err}");
                }
                Err(e)
            }
        }
    }
}

impl Receiver for SerializationPipeline {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
        self.head.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.head.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        self.head.process(event)
    }

    fn close(&mut self) -> Result<()> {
        self.head.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingDiagnostics;
    use crate::options::CharacterMap;

    fn xml_props() -> OutputProperties {
        OutputProperties::default().with_method(OutputMethod::Xml).with_omit_xml_declaration(true)
    }

    #[test]
    fn xml_mit_namespace_fixup() {
        let events = vec![
            OwnedEvent::start_element(QName::with_prefix("urn:a", "root", "a")),
            OwnedEvent::StartContent,
            OwnedEvent::start_element(QName::with_prefix("urn:a", "child", "a")),
            OwnedEvent::attribute(QName::new("urn:b", "x"), "1"),
            OwnedEvent::StartContent,
            OwnedEvent::EndElement,
            OwnedEvent::EndElement,
        ];
        let out = Serializer::new(xml_props()).serialize_to_string(&events).unwrap();
        assert_eq!(
            out,
            r#"<a:root xmlns:a="urn:a"><a:child xmlns:ns0="urn:b" ns0:x="1"/></a:root>"#
        );
    }

    #[test]
    fn html_wird_ausgehandelt_und_eingerueckt() {
        let out = Serializer::default()
            .serialize_xml_str("<html><head><title>T</title></head><body><p>x</p></body></html>")
            .unwrap();
        assert_eq!(
            out,
            "<!DOCTYPE html>\n<html>\n  <head>\n    \
             <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\">\n    \
             <title>T</title>\n  </head>\n  <body>\n    <p>x</p>\n  </body>\n</html>"
        );
    }

    #[test]
    fn eigene_methode_wird_abgelehnt() {
        let props = OutputProperties::default()
            .with_method(OutputMethod::Custom(QName::new("urn:m", "json")));
        let (dest, _) = Destination::string();
        let err = Serializer::new(props).pipeline(dest).err().unwrap();
        assert_eq!(err.code(), Some("SEPM0016"));
    }

    #[test]
    fn unbekanntes_encoding_faellt_auf_utf8_zurueck() {
        let sink = Rc::new(CollectingDiagnostics::new());
        let props = xml_props().with_encoding("x-no-such-charset");
        let serializer = Serializer::new(props).with_diagnostics(sink.clone());
        let (dest, bytes) = Destination::buffer();
        let recorded = serializer.serialize_xml("<a>\u{e9}</a>".as_bytes(), dest).unwrap();
        assert_eq!(&*bytes.borrow(), "<a>\u{e9}</a>".as_bytes());
        assert_eq!(recorded.encoding(), "UTF-8");
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.diagnostics()[0].code, "SESU0007");
    }

    #[test]
    fn dokumentmodus_bei_standalone() {
        let props = OutputProperties::default()
            .with_method(OutputMethod::Xml)
            .with_standalone(Standalone::Yes);
        let events = vec![
            OwnedEvent::StartDocument,
            OwnedEvent::start_element(QName::local("a")),
            OwnedEvent::StartContent,
            OwnedEvent::EndElement,
            OwnedEvent::start_element(QName::local("b")),
        ];
        let err = Serializer::new(props).serialize_to_string(&events).unwrap_err();
        assert_eq!(err.code(), Some("XTTE1550"));
    }

    #[test]
    fn text_methode() {
        let props = OutputProperties::default().with_method(OutputMethod::Text);
        let out = Serializer::new(props).serialize_xml_str("<a>1 &lt; 2<b>!</b></a>").unwrap();
        assert_eq!(out, "1 < 2!");
    }

    #[test]
    fn whitespace_wird_gestrippt() {
        let out = Serializer::new(xml_props())
            .with_strip_space(StripSpace::All)
            .serialize_xml_str("<a>\n  <b> x </b>\n  <c xml:space=\"preserve\"> </c>\n</a>")
            .unwrap();
        assert_eq!(out, "<a><b> x </b><c xml:space=\"preserve\"> </c></a>");
    }

    #[test]
    fn fehler_vor_dem_ersten_element_schreibt_nichts() {
        let events = vec![
            OwnedEvent::StartDocument,
            OwnedEvent::comment("c"),
            OwnedEvent::attribute(QName::local("x"), "1"),
        ];
        let (dest, text) = Destination::string();
        let err = Serializer::default().serialize(&events, dest).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "{err}");
        assert_eq!(text.take(), "");
    }

    #[test]
    fn zu_grosse_einrueckung_wird_abgelehnt() {
        let props = xml_props().with_indent(true).with_indent_spaces(usize::MAX);
        let err = Serializer::new(props).serialize_xml_str("<a><b/></a>").unwrap_err();
        assert!(matches!(err, Error::InvalidOption { .. }), "{err}");
    }

    #[test]
    fn xml_prefix_mit_fremder_uri_wird_umbenannt() {
        let events = vec![
            OwnedEvent::StartDocument,
            OwnedEvent::start_element(QName::with_prefix("urn:x", "e", "xml")),
            OwnedEvent::attribute(QName::with_prefix("urn:y", "a", "xml"), "1"),
            OwnedEvent::StartContent,
            OwnedEvent::EndElement,
            OwnedEvent::EndDocument,
        ];
        let out = Serializer::new(xml_props()).serialize_to_string(&events).unwrap();
        assert_eq!(out, r#"<ns0:e xmlns:ns0="urn:x" xmlns:ns1="urn:y" ns1:a="1"/>"#);
    }

    #[test]
    fn html_character_map_im_attribut() {
        let map = CharacterMap::new().with('\u{a7}', "&sect;");
        let props = OutputProperties::default()
            .with_method(OutputMethod::Html)
            .with_indent(false)
            .with_character_map("m", map);
        let out = Serializer::new(props).serialize_xml_str("<p title=\"a&lt;b \u{a7}\">x</p>").unwrap();
        assert_eq!(out, r#"<p title="a<b &sect;">x</p>"#);
    }
}
