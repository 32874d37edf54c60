//! Character map expansion (`use-character-maps`).

use std::rc::Rc;

use crate::context::PipelineContext;
use crate::emitter::{Flavor, escape_attribute, escape_html_attribute};
use crate::error::Result;
use crate::event::Event;
use crate::options::CharacterMap;
use crate::pipeline::{Next, Receiver};
use crate::properties::Properties;

/// Replaces mapped characters in text and attribute values.
///
/// Replacement strings are written verbatim: text is split into runs and the
/// replaced runs carry `DISABLE_ESCAPING`; an attribute value containing a
/// mapped character is escaped here, with the attribute rules of the
/// emitter's `flavor`, and forwarded with `DISABLE_ESCAPING`.
pub struct CharacterMapExpander {
    next: Next,
    map: CharacterMap,
    flavor: Flavor,
    buf: String,
}

impl CharacterMapExpander {
    pub fn new(next: Next, map: CharacterMap, flavor: Flavor) -> Self {
        Self { next, map, flavor, buf: String::new() }
    }

    fn has_mapped(&self, s: &str) -> bool {
        s.chars().any(|c| self.map.get(c).is_some())
    }

    fn expand_attribute(&mut self, value: &str) {
        let Self { map, flavor, buf, .. } = self;
        let flavor = *flavor;
        let escape = |buf: &mut String, s: &str| match flavor {
            Flavor::Html => escape_html_attribute(buf, s),
            Flavor::Xml | Flavor::Xhtml => escape_attribute(buf, s),
        };
        buf.clear();
        let mut run_start = 0;
        for (i, c) in value.char_indices() {
            if let Some(replacement) = map.get(c) {
                escape(buf, &value[run_start..i]);
                buf.push_str(replacement);
                run_start = i + c.len_utf8();
            }
        }
        escape(buf, &value[run_start..]);
    }
}

impl Receiver for CharacterMapExpander {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::Characters { text, location, properties }
                if !properties.contains(Properties::DISABLE_CHARACTER_MAPS)
                    && self.has_mapped(text) =>
            {
                let mut run_start = 0;
                for (i, c) in text.char_indices() {
                    let Some(replacement) = self.map.get(c) else {
                        continue;
                    };
                    if run_start < i {
                        self.next.process(Event::Characters {
                            text: &text[run_start..i],
                            location,
                            properties,
                        })?;
                    }
                    self.next.process(Event::Characters {
                        text: replacement,
                        location,
                        properties: properties | Properties::DISABLE_ESCAPING,
                    })?;
                    run_start = i + c.len_utf8();
                }
                if run_start < text.len() {
                    self.next.process(Event::Characters {
                        text: &text[run_start..],
                        location,
                        properties,
                    })?;
                }
                Ok(())
            }
            Event::Attribute { name, type_annotation, value, location, properties }
                if !properties.contains(Properties::DISABLE_CHARACTER_MAPS)
                    && !properties.contains(Properties::DISABLE_ESCAPING)
                    && self.has_mapped(value) =>
            {
                self.expand_attribute(value);
                let buf = std::mem::take(&mut self.buf);
                let result = self.next.process(Event::Attribute {
                    name,
                    type_annotation,
                    value: &buf,
                    location,
                    properties: properties | Properties::DISABLE_ESCAPING,
                });
                self.buf = buf;
                result
            }
            _ => self.next.process(event),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.next.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OwnedEvent;
    use crate::pipeline::{EventCollector, drive};
    use crate::qname::QName;

    fn run(events: &[OwnedEvent]) -> Vec<OwnedEvent> {
        run_as(Flavor::Xml, events)
    }

    fn run_as(flavor: Flavor, events: &[OwnedEvent]) -> Vec<OwnedEvent> {
        let (collector, out) = EventCollector::shared();
        let map = CharacterMap::new().with('\u{a0}', "&nbsp;").with('§', "<sect/>");
        let mut expander = CharacterMapExpander::new(Box::new(collector), map, flavor);
        drive(events, &mut expander, &Rc::new(PipelineContext::default())).unwrap();
        out.take()
    }

    #[test]
    fn text_wird_in_laeufe_zerlegt() {
        let out = run(&[OwnedEvent::characters("a\u{a0}b§")]);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], OwnedEvent::characters("a"));
        assert_eq!(out[2], OwnedEvent::characters("b"));
        for (i, expected) in [(1, "&nbsp;"), (3, "<sect/>")] {
            let OwnedEvent::Characters { text, properties, .. } = &out[i] else {
                panic!("expected characters, got {:?}", out[i]);
            };
            assert_eq!(text, expected);
            assert!(properties.contains(Properties::DISABLE_ESCAPING));
        }
    }

    #[test]
    fn attribut_wird_vorab_escaped() {
        let out = run(&[OwnedEvent::attribute(QName::local("a"), "x&y\u{a0}")]);
        let OwnedEvent::Attribute { value, properties, .. } = &out[0] else {
            panic!("expected attribute, got {:?}", out[0]);
        };
        assert_eq!(value, "x&amp;y&nbsp;");
        assert!(properties.contains(Properties::DISABLE_ESCAPING));
    }

    #[test]
    fn html_attribut_nach_html_regeln() {
        let out = run_as(Flavor::Html, &[OwnedEvent::attribute(QName::local("a"), "a<b&{c}\u{a0}")]);
        let OwnedEvent::Attribute { value, .. } = &out[0] else {
            panic!("expected attribute, got {:?}", out[0]);
        };
        assert_eq!(value, "a<b&{c}&nbsp;");
    }

    #[test]
    fn disable_character_maps_wird_respektiert() {
        let event = OwnedEvent::Characters {
            text: "\u{a0}".into(),
            location: crate::location::LocationId::UNKNOWN,
            properties: Properties::DISABLE_CHARACTER_MAPS,
        };
        assert_eq!(run(std::slice::from_ref(&event)), vec![event]);
        let plain = OwnedEvent::characters("nichts");
        assert_eq!(run(std::slice::from_ref(&plain)), vec![plain]);
    }
}
