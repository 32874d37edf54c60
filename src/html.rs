//! Filters specific to the html and xhtml output methods.

use std::rc::Rc;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

use crate::context::PipelineContext;
use crate::emitter::Flavor;
use crate::error::Result;
use crate::event::{Event, OwnedEvent};
use crate::options::SharedProperties;
use crate::pipeline::{Next, Receiver};
use crate::properties::Properties;
use crate::qname::{NS_XHTML, QName};

/// Attributes whose values are URIs in the HTML vocabulary.
const URI_ATTRIBUTES: &[&str] = &[
    "action", "archive", "background", "cite", "classid", "codebase", "data", "datasrc",
    "formaction", "href", "longdesc", "profile", "src", "usemap",
];

/// Steuerzeichen ausser Tab/LF/CR; Nicht-ASCII kodiert `utf8_percent_encode` immer.
const URI_ESCAPE: &AsciiSet = &CONTROLS.remove(b'\t').remove(b'\n').remove(b'\r');

fn is_html_element(flavor: Flavor, name: &QName) -> bool {
    match flavor {
        Flavor::Html => name.is_in_no_namespace(),
        Flavor::Xhtml => &*name.uri == NS_XHTML,
        Flavor::Xml => false,
    }
}

fn local_is(name: &QName, local: &str) -> bool {
    name.local.eq_ignore_ascii_case(local)
}

// ============================================================================
// UriEscaper
// ============================================================================

/// %-escapes non-ASCII characters in URI-valued attributes of HTML elements
/// (`escape-uri-attributes=yes`).
pub struct UriEscaper {
    next: Next,
    flavor: Flavor,
    in_html_element: bool,
}

impl UriEscaper {
    pub fn new(next: Next, flavor: Flavor) -> Self {
        Self { next, flavor, in_html_element: false }
    }
}

impl Receiver for UriEscaper {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::StartElement { name, .. } => {
                self.in_html_element = is_html_element(self.flavor, name);
                self.next.process(event)
            }
            Event::Attribute { name, type_annotation, value, location, properties }
                if self.in_html_element
                    && name.is_in_no_namespace()
                    && !properties.contains(Properties::DISABLE_ESCAPING)
                    && URI_ATTRIBUTES.iter().any(|a| local_is(name, a))
                    && !value.is_ascii() =>
            {
                let escaped = utf8_percent_encode(value, URI_ESCAPE).to_string();
                self.next.process(Event::Attribute {
                    name,
                    type_annotation,
                    value: &escaped,
                    location,
                    properties,
                })
            }
            _ => self.next.process(event),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.next.close()
    }
}

// ============================================================================
// MetaTagAdjuster
// ============================================================================

#[derive(Debug, Default)]
enum MetaState {
    #[default]
    Idle,
    /// Start-Tag eines `meta`-Elements gepuffert, bis StartContent entscheidet.
    Buffering { events: Vec<OwnedEvent>, content_type: bool },
    /// Innerhalb eines verworfenen `meta`; Zaehler offener Elemente.
    Skipping(usize),
    /// Start-Tag von `head` offen; meta folgt nach StartContent.
    InHeadStartTag(QName),
}

/// Replaces any `<meta http-equiv="Content-Type">` with one describing the
/// actual media type and encoding, inserted as the first child of `head`
/// (`include-content-type=yes`).
///
/// The encoding is read from the shared properties when `head` is reached,
/// so a fallback chosen by the emitter is reflected.
pub struct MetaTagAdjuster {
    next: Next,
    flavor: Flavor,
    props: SharedProperties,
    state: MetaState,
}

impl MetaTagAdjuster {
    pub fn new(next: Next, flavor: Flavor, props: SharedProperties) -> Self {
        Self { next, flavor, props, state: MetaState::Idle }
    }

    fn insert_meta(&mut self, head: &QName) -> Result<()> {
        let content = {
            let p = self.props.borrow();
            format!("{}; charset={}", p.effective_media_type(), p.encoding())
        };
        let meta = QName::with_prefix(&head.uri, "meta", &head.prefix);
        let http_equiv = QName::local("http-equiv");
        let content_attr = QName::local("content");
        self.next.process(Event::start_element(&meta))?;
        self.next.process(Event::attribute(&http_equiv, "Content-Type"))?;
        self.next.process(Event::attribute(&content_attr, &content))?;
        self.next.process(Event::StartContent)?;
        self.next.process(Event::EndElement)
    }
}

impl Receiver for MetaTagAdjuster {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match &mut self.state {
            MetaState::Skipping(depth) => {
                match event {
                    Event::StartElement { .. } => *depth += 1,
                    Event::EndElement => {
                        *depth -= 1;
                        if *depth == 0 {
                            self.state = MetaState::Idle;
                        }
                    }
                    _ => {}
                }
                return Ok(());
            }
            MetaState::Buffering { events, content_type } => {
                match event {
                    Event::StartContent => {}
                    Event::Attribute { name, value, .. }
                        if name.is_in_no_namespace() && local_is(name, "http-equiv") =>
                    {
                        *content_type |= value.trim().eq_ignore_ascii_case("content-type");
                        events.push(event.to_owned_event());
                        return Ok(());
                    }
                    _ => {
                        events.push(event.to_owned_event());
                        return Ok(());
                    }
                }
                let MetaState::Buffering { events, content_type } = std::mem::take(&mut self.state)
                else {
                    return Ok(());
                };
                if content_type {
                    self.state = MetaState::Skipping(1);
                    return Ok(());
                }
                for buffered in &events {
                    self.next.process(buffered.as_event())?;
                }
                return self.next.process(event);
            }
            MetaState::InHeadStartTag(_) if matches!(event, Event::StartContent) => {
                let MetaState::InHeadStartTag(head) = std::mem::take(&mut self.state) else {
                    return Ok(());
                };
                self.next.process(event)?;
                return self.insert_meta(&head);
            }
            MetaState::InHeadStartTag(_) | MetaState::Idle => {}
        }
        match event {
            Event::StartElement { name, .. }
                if is_html_element(self.flavor, name) && local_is(name, "meta") =>
            {
                self.state =
                    MetaState::Buffering { events: vec![event.to_owned_event()], content_type: false };
                Ok(())
            }
            Event::StartElement { name, .. }
                if is_html_element(self.flavor, name) && local_is(name, "head") =>
            {
                self.state = MetaState::InHeadStartTag(name.clone());
                self.next.process(event)
            }
            _ => self.next.process(event),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.next.close()
    }
}
