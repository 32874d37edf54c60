//! Output method negotiation.
//!
//! Without a configured method the output method is chosen from the first
//! element: `html` in no namespace gives html, `html` in the XHTML namespace
//! gives xhtml, anything else xml. Until that decision the negotiator keeps
//! owned copies of the leading comments, processing instructions and
//! whitespace text, then builds the concrete chain and replays them.

use std::rc::Rc;

use log::debug;

use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::location::LocationId;
use crate::options::OutputMethod;
use crate::pipeline::{Next, Receiver};
use crate::properties::Properties;
use crate::qname::{NS_XHTML, QName};
use crate::whitespace::is_xml_whitespace;

/// Builds the concrete chain once the method is known.
pub type ChainFactory = Box<dyn FnOnce(&OutputMethod) -> Result<Next>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Comment,
    ProcessingInstruction,
    Text,
}

/// Owned snapshot of a node seen before the method decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNode {
    pub kind: PendingKind,
    /// PI target.
    pub name: Option<String>,
    pub content: String,
    pub location: LocationId,
    pub properties: Properties,
}

impl PendingNode {
    fn as_event(&self) -> Event<'_> {
        match self.kind {
            PendingKind::Comment => Event::Comment {
                text: &self.content,
                location: self.location,
                properties: self.properties,
            },
            PendingKind::ProcessingInstruction => Event::ProcessingInstruction {
                target: self.name.as_deref().unwrap_or_default(),
                data: &self.content,
                location: self.location,
                properties: self.properties,
            },
            PendingKind::Text => Event::Characters {
                text: &self.content,
                location: self.location,
                properties: self.properties,
            },
        }
    }
}

/// Method implied by the first element's name.
///
/// A legacy `html_version` (below 5) keeps XHTML-namespace documents on the
/// xml method.
pub fn sniff_method(name: &QName, html_version: f64) -> OutputMethod {
    if !name.local.eq_ignore_ascii_case("html") {
        return OutputMethod::Xml;
    }
    if name.is_in_no_namespace() {
        OutputMethod::Html
    } else if &*name.uri == NS_XHTML && &*name.local == "html" && html_version >= 5.0 {
        OutputMethod::Xhtml
    } else {
        OutputMethod::Xml
    }
}

pub struct OutputMethodNegotiator {
    ctx: Rc<PipelineContext>,
    factory: Option<ChainFactory>,
    next: Option<Next>,
    pending: Vec<PendingNode>,
    saw_start_document: bool,
    html_version: f64,
}

impl OutputMethodNegotiator {
    pub fn new(factory: ChainFactory, html_version: f64) -> Self {
        Self {
            ctx: Rc::default(),
            factory: Some(factory),
            next: None,
            pending: Vec::new(),
            saw_start_document: false,
            html_version,
        }
    }

    pub fn is_committed(&self) -> bool {
        self.next.is_some()
    }

    /// Zahl der gepufferten Knoten.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn commit(&mut self, method: &OutputMethod) -> Result<&mut Next> {
        let factory = self
            .factory
            .take()
            .ok_or_else(|| Error::protocol("output method negotiated twice"))?;
        debug!("output method {method} chosen after {} buffered node(s)", self.pending.len());
        let mut next = factory(method)?;
        next.set_pipeline_context(&self.ctx);
        next.open()?;
        if self.saw_start_document {
            next.process(Event::StartDocument)?;
        }
        for node in self.pending.drain(..) {
            next.process(node.as_event())?;
        }
        Ok(self.next.insert(next))
    }

    fn buffer(&mut self, event: Event<'_>) -> bool {
        let node = match event {
            Event::Comment { text, location, properties } => PendingNode {
                kind: PendingKind::Comment,
                name: None,
                content: text.to_owned(),
                location,
                properties,
            },
            Event::ProcessingInstruction { target, data, location, properties } => PendingNode {
                kind: PendingKind::ProcessingInstruction,
                name: Some(target.to_owned()),
                content: data.to_owned(),
                location,
                properties,
            },
            Event::Characters { text, location, properties } if is_xml_whitespace(text) => {
                PendingNode {
                    kind: PendingKind::Text,
                    name: None,
                    content: text.to_owned(),
                    location,
                    properties,
                }
            }
            _ => return false,
        };
        self.pending.push(node);
        true
    }
}

impl Receiver for OutputMethodNegotiator {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
        if let Some(next) = self.next.as_mut() {
            next.set_pipeline_context(ctx);
        }
    }

    fn open(&mut self) -> Result<()> {
        match self.next.as_mut() {
            Some(next) => next.open(),
            None => Ok(()),
        }
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        if let Some(next) = self.next.as_mut() {
            return next.process(event);
        }
        let method = match event {
            Event::StartDocument => {
                self.saw_start_document = true;
                return Ok(());
            }
            Event::StartElement { name, .. } => sniff_method(name, self.html_version),
            Event::EndDocument | Event::Characters { .. } => OutputMethod::Xml,
            _ if self.buffer(event) => return Ok(()),
            // Namespace/Attribute/EndElement ohne Element: der Checker davor meldet das.
            _ => OutputMethod::Xml,
        };
        self.commit(&method)?.process(event)
    }

    fn close(&mut self) -> Result<()> {
        if self.next.is_none() && self.ctx.is_aborted() {
            debug!("pass aborted before commit, {} buffered node(s) discarded", self.pending.len());
            self.pending.clear();
            self.factory = None;
            return Ok(());
        }
        if self.next.is_none() && self.factory.is_some() {
            self.commit(&OutputMethod::Xml)?;
        }
        match self.next.as_mut() {
            Some(next) => next.close(),
            None => Ok(()),
        }
    }
}
