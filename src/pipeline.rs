//! Filter composition.
//!
//! Every stage implements [`Receiver`] and owns exactly one downstream stage
//! (a [`Next`]). A stage matches only the events it transforms and forwards
//! all others unchanged with `self.next.process(event)`.
//!
//! The producer calls `set_pipeline_context`, `open`, then `process` for each
//! event and finally `close`. Each call returns before the next is accepted,
//! so the producer's pace is the only pace.

use std::cell::RefCell;
use std::rc::Rc;

use crate::context::{Condition, PipelineContext};
use crate::error::{Error, Result};
use crate::event::{Event, OwnedEvent};
use crate::whitespace::is_xml_whitespace;

/// One stage of the pipeline.
pub trait Receiver {
    /// Hands the shared context to this stage; a filter passes it downstream
    /// before any event flows.
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>);

    /// Starts the pass.
    fn open(&mut self) -> Result<()>;

    /// Processes one event.
    fn process(&mut self, event: Event<'_>) -> Result<()>;

    /// Ends the pass. Best effort; must tolerate a missing `open`.
    fn close(&mut self) -> Result<()>;
}

/// The downstream stage a filter forwards to.
pub type Next = Box<dyn Receiver>;

impl<R: Receiver + ?Sized> Receiver for Box<R> {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        (**self).set_pipeline_context(ctx)
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        (**self).process(event)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Replays owned events into a receiver: context, `open`, events, `close`.
pub fn drive(
    events: &[OwnedEvent],
    receiver: &mut dyn Receiver,
    ctx: &Rc<PipelineContext>,
) -> Result<()> {
    receiver.set_pipeline_context(ctx);
    receiver.open()?;
    for event in events {
        receiver.process(event.as_event())?;
    }
    receiver.close()
}

// ============================================================================
// EventCollector
// ============================================================================

/// Shared buffer filled by an [`EventCollector`].
pub type CollectedEvents = Rc<RefCell<Vec<OwnedEvent>>>;

/// Terminal receiver recording every event as an [`OwnedEvent`].
#[derive(Debug, Default)]
pub struct EventCollector {
    events: CollectedEvents,
    opened: bool,
    closed: bool,
}

impl EventCollector {
    /// Erstellt einen Collector und gibt den geteilten Puffer mit zurueck.
    pub fn shared() -> (Self, CollectedEvents) {
        let events: CollectedEvents = Rc::default();
        (Self { events: Rc::clone(&events), opened: false, closed: false }, events)
    }

    pub fn is_open(&self) -> bool {
        self.opened && !self.closed
    }
}

impl Receiver for EventCollector {
    fn set_pipeline_context(&mut self, _ctx: &Rc<PipelineContext>) {}

    fn open(&mut self) -> Result<()> {
        self.opened = true;
        Ok(())
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        self.events.borrow_mut().push(event.to_owned_event());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

// ============================================================================
// ProtocolChecker
// ============================================================================

/// Whether the checker also enforces document-level validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckMode {
    /// Any number of top-level nodes (sequence/fragment output).
    #[default]
    Fragment,
    /// Exactly one element and no text at document level.
    Document,
}

/// Validates the event ordering contract.
///
/// Ordering faults are `Error::Protocol`; in [`CheckMode::Document`] a second
/// top-level element or non-whitespace text at document level is a validity
/// error with a host-language code.
pub struct ProtocolChecker {
    next: Next,
    ctx: Rc<PipelineContext>,
    mode: CheckMode,
    /// Tiefe offener Elemente.
    depth: usize,
    /// Start-Tag offen (zwischen StartElement und StartContent).
    start_tag_open: bool,
    in_document: bool,
    top_level_elements: usize,
}

impl ProtocolChecker {
    pub fn new(next: Next, mode: CheckMode) -> Self {
        Self {
            next,
            ctx: Rc::default(),
            mode,
            depth: 0,
            start_tag_open: false,
            in_document: false,
            top_level_elements: 0,
        }
    }

    fn require_open_start_tag(&self, event: &Event<'_>) -> Result<()> {
        if self.start_tag_open {
            Ok(())
        } else {
            Err(Error::protocol(format!("{}: no open start tag", event.kind())))
        }
    }

    fn require_content_position(&self, event: &Event<'_>) -> Result<()> {
        if self.start_tag_open {
            Err(Error::protocol(format!("{} before StartContent", event.kind())))
        } else {
            Ok(())
        }
    }

    fn checks_document(&self) -> bool {
        self.mode == CheckMode::Document && self.in_document && self.depth == 0
    }
}

impl Receiver for ProtocolChecker {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::StartDocument => {
                self.require_content_position(&event)?;
                if self.depth > 0 {
                    return Err(Error::protocol("StartDocument inside an element"));
                }
                self.in_document = true;
                self.top_level_elements = 0;
            }
            Event::EndDocument => {
                self.require_content_position(&event)?;
                if self.depth > 0 {
                    return Err(Error::protocol(format!(
                        "EndDocument with {} open element(s)",
                        self.depth
                    )));
                }
                self.in_document = false;
            }
            Event::StartElement { name, .. } => {
                self.require_content_position(&event)?;
                if self.checks_document() {
                    self.top_level_elements += 1;
                    if self.top_level_elements > 1 {
                        return Err(self.ctx.validity_error(
                            Condition::MultipleRoots,
                            format!("second top-level element <{name}> in document"),
                        ));
                    }
                }
                self.depth += 1;
                self.start_tag_open = true;
            }
            Event::Namespace { .. } | Event::Attribute { .. } => {
                self.require_open_start_tag(&event)?;
            }
            Event::StartContent => {
                self.require_open_start_tag(&event)?;
                self.start_tag_open = false;
            }
            Event::EndElement => {
                self.require_content_position(&event)?;
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::protocol("EndElement without open element"))?;
            }
            Event::Characters { text, .. } => {
                self.require_content_position(&event)?;
                if self.checks_document() && !is_xml_whitespace(text) {
                    return Err(self.ctx.validity_error(
                        Condition::TextAtDocumentLevel,
                        "text is not allowed at document level",
                    ));
                }
            }
            Event::ProcessingInstruction { .. } | Event::Comment { .. } => {
                self.require_content_position(&event)?;
            }
        }
        self.next.process(event)
    }

    fn close(&mut self) -> Result<()> {
        self.next.close()
    }
}
