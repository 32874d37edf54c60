//! Emitter for the text method: character content only, unescaped.

use std::rc::Rc;

use crate::context::PipelineContext;
use crate::error::Result;
use crate::event::Event;
use crate::options::SharedProperties;
use crate::pipeline::Receiver;

use super::output::{Destination, DestinationResolver, Output};
use super::resolve_charset;

/// Writes the string value of the result. Markup events are dropped.
///
/// There is no markup to fall back to, so a character outside the output
/// encoding is fatal (`SERE0008`).
pub struct TextEmitter {
    out: Output,
    props: SharedProperties,
    ctx: Rc<PipelineContext>,
}

impl TextEmitter {
    pub fn new(
        destination: Destination,
        resolver: Rc<dyn DestinationResolver>,
        props: SharedProperties,
    ) -> Self {
        Self { out: Output::new(destination, resolver), props, ctx: Rc::default() }
    }
}

impl Receiver for TextEmitter {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
    }

    fn open(&mut self) -> Result<()> {
        resolve_charset(&self.props, &self.ctx, &mut self.out);
        Ok(())
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::Characters { text, .. } => self.out.write_markup(text),
            _ => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.out.close()
    }
}
