//! Indentation filter.
//!
//! Inserts a newline plus `depth × indent` spaces before start tags, end
//! tags, comments and processing instructions that follow another tag. Mixed
//! content (an element with non-whitespace text) and preserved subtrees are
//! left alone. Existing whitespace-only text is held back until the next event
//! decides whether it is replaced by indentation or written verbatim.

use std::rc::Rc;

use crate::context::PipelineContext;
use crate::error::Result;
use crate::event::Event;
use crate::pipeline::{Next, Receiver};
use crate::options::MAX_INDENT_SPACES;
use crate::qname::{NS_XHTML, QName};
use crate::whitespace::is_xml_whitespace;

/// Element classification for indentation purposes.
pub trait ElementClassifier {
    /// No whitespace is added around the element or inside it.
    fn is_inline(&self, name: &QName) -> bool;
    /// Content is whitespace-sensitive and not indented.
    fn is_formatted(&self, name: &QName) -> bool;
}

/// Plain XML: every element is a block element.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlClassifier;

impl ElementClassifier for XmlClassifier {
    fn is_inline(&self, _name: &QName) -> bool {
        false
    }

    fn is_formatted(&self, _name: &QName) -> bool {
        false
    }
}

const HTML_INLINE: &[&str] = &[
    "a", "abbr", "acronym", "applet", "area", "audio", "b", "basefont", "bdi", "bdo", "big",
    "br", "button", "canvas", "cite", "code", "data", "datalist", "del", "dfn", "em", "embed",
    "font", "i", "iframe", "img", "input", "ins", "kbd", "label", "map", "mark", "math", "meter",
    "noscript", "object", "output", "picture", "progress", "q", "ruby", "s", "samp", "script",
    "select", "small", "span", "strike", "strong", "sub", "sup", "svg", "template", "textarea",
    "time", "tt", "u", "var", "video", "wbr",
];

const HTML_FORMATTED: &[&str] = &["pre", "script", "style", "textarea", "title", "xmp"];

/// HTML vocabulary: no-namespace names case-insensitively for the html
/// method, XHTML-namespace names for xhtml.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlClassifier {
    xhtml: bool,
}

impl HtmlClassifier {
    pub fn html() -> Self {
        Self { xhtml: false }
    }

    pub fn xhtml() -> Self {
        Self { xhtml: true }
    }

    fn html_local<'n>(&self, name: &'n QName) -> Option<&'n str> {
        let in_vocabulary =
            if self.xhtml { &*name.uri == NS_XHTML } else { name.is_in_no_namespace() };
        in_vocabulary.then_some(&*name.local)
    }

    fn in_list(&self, name: &QName, list: &[&str]) -> bool {
        self.html_local(name)
            .is_some_and(|local| list.iter().any(|n| n.eq_ignore_ascii_case(local)))
    }
}

impl ElementClassifier for HtmlClassifier {
    fn is_inline(&self, name: &QName) -> bool {
        self.in_list(name, HTML_INLINE)
    }

    fn is_formatted(&self, name: &QName) -> bool {
        self.in_list(name, HTML_FORMATTED)
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    /// Nicht-Whitespace-Text oder Inline-Kind gesehen.
    mixed: bool,
    inline: bool,
}

pub struct Indenter {
    next: Next,
    classifier: Box<dyn ElementClassifier>,
    indent_spaces: usize,
    level: usize,
    after_start_tag: bool,
    after_end_tag: bool,
    frames: Vec<Frame>,
    /// Level ab dem nicht mehr eingerueckt wird.
    suppressed_at: Option<usize>,
    pending_ws: String,
    indent_buf: String,
}

impl Indenter {
    pub fn new(next: Next, classifier: Box<dyn ElementClassifier>, indent_spaces: usize) -> Self {
        Self {
            next,
            classifier,
            indent_spaces: indent_spaces.min(MAX_INDENT_SPACES),
            level: 0,
            after_start_tag: false,
            after_end_tag: false,
            frames: Vec::new(),
            suppressed_at: None,
            pending_ws: String::new(),
            indent_buf: String::new(),
        }
    }

    pub fn xml(next: Next, indent_spaces: usize) -> Self {
        Self::new(next, Box::new(XmlClassifier), indent_spaces)
    }

    fn in_mixed_content(&self) -> bool {
        self.frames.last().is_some_and(|f| f.mixed)
    }

    fn applies(&self) -> bool {
        self.suppressed_at.is_none()
            && (self.after_start_tag || self.after_end_tag)
            && !self.in_mixed_content()
    }

    fn write_indent(&mut self, depth: usize) -> Result<()> {
        self.pending_ws.clear();
        self.indent_buf.clear();
        self.indent_buf.push('\n');
        self.indent_buf.extend(std::iter::repeat_n(' ', depth.saturating_mul(self.indent_spaces)));
        self.next.process(Event::characters(&self.indent_buf))
    }

    fn flush_pending(&mut self) -> Result<()> {
        if self.pending_ws.is_empty() {
            return Ok(());
        }
        let ws = std::mem::take(&mut self.pending_ws);
        self.next.process(Event::characters(&ws))
    }

    /// Before a node that may be indented at the current level.
    fn before_node(&mut self) -> Result<()> {
        if self.applies() {
            self.write_indent(self.level)
        } else {
            self.flush_pending()
        }
    }
}

impl Receiver for Indenter {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::StartElement { name, .. } => {
                let inline = self.classifier.is_inline(name);
                if inline {
                    self.flush_pending()?;
                    if let Some(parent) = self.frames.last_mut() {
                        parent.mixed = true;
                    }
                } else {
                    self.before_node()?;
                }
                self.next.process(event)?;
                self.level += 1;
                self.frames.push(Frame { mixed: false, inline });
                if self.suppressed_at.is_none() && (inline || self.classifier.is_formatted(name)) {
                    self.suppressed_at = Some(self.level);
                }
                self.after_start_tag = true;
                self.after_end_tag = false;
                Ok(())
            }
            Event::Attribute { name, value, .. } if name.is_xml_space() => {
                if value.trim() == "preserve" && self.suppressed_at.is_none() {
                    self.suppressed_at = Some(self.level);
                }
                self.next.process(event)
            }
            Event::EndElement => {
                let closes_suppression = self.suppressed_at == Some(self.level);
                if self.after_end_tag && self.applies() {
                    self.write_indent(self.level.saturating_sub(1))?;
                } else {
                    self.flush_pending()?;
                }
                let inline = self.frames.pop().is_some_and(|f| f.inline);
                self.level = self.level.saturating_sub(1);
                if closes_suppression {
                    self.suppressed_at = None;
                }
                self.next.process(event)?;
                self.after_start_tag = false;
                self.after_end_tag = !inline;
                Ok(())
            }
            Event::Characters { text, .. } => {
                if is_xml_whitespace(text) && self.suppressed_at.is_none() {
                    self.pending_ws.push_str(text);
                    return Ok(());
                }
                self.flush_pending()?;
                if !is_xml_whitespace(text)
                    && let Some(top) = self.frames.last_mut()
                {
                    top.mixed = true;
                }
                self.after_start_tag = false;
                self.after_end_tag = false;
                self.next.process(event)
            }
            Event::Comment { .. } | Event::ProcessingInstruction { .. } => {
                self.before_node()?;
                self.next.process(event)?;
                self.after_start_tag = false;
                self.after_end_tag = true;
                Ok(())
            }
            Event::EndDocument => {
                self.flush_pending()?;
                self.after_start_tag = false;
                self.after_end_tag = false;
                self.next.process(event)
            }
            _ => self.next.process(event),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.flush_pending()?;
        self.next.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::OwnedEvent;
    use crate::pipeline::{CollectedEvents, EventCollector};

    /// Rendert die Events grob als Markup, um Einrueckung sichtbar zu machen.
    fn render(events: &CollectedEvents) -> String {
        let mut out = String::new();
        let mut stack = Vec::new();
        for e in events.borrow().iter() {
            match e {
                OwnedEvent::StartElement { name, .. } => {
                    out.push('<');
                    out.push_str(&name.local);
                    out.push('>');
                    stack.push(name.local.to_string());
                }
                OwnedEvent::EndElement => {
                    out.push_str("</");
                    out.push_str(&stack.pop().unwrap_or_default());
                    out.push('>');
                }
                OwnedEvent::Characters { text, .. } => out.push_str(text),
                OwnedEvent::Comment { text, .. } => {
                    out.push_str("<!--");
                    out.push_str(text);
                    out.push_str("-->");
                }
                _ => {}
            }
        }
        out
    }

    fn run(indenter: &mut Indenter, events: &[OwnedEvent]) {
        for e in events {
            indenter.process(e.as_event()).unwrap();
        }
        indenter.close().unwrap();
    }

    fn start(name: &str) -> [OwnedEvent; 2] {
        [OwnedEvent::start_element(QName::local(name)), OwnedEvent::StartContent]
    }

    fn element(name: &str) -> Vec<OwnedEvent> {
        let mut v = start(name).to_vec();
        v.push(OwnedEvent::EndElement);
        v
    }

    #[test]
    fn geschwister_werden_eingerueckt() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::xml(Box::new(sink), 2);
        let mut input = start("root").to_vec();
        input.extend(element("a"));
        input.extend(element("b"));
        input.push(OwnedEvent::EndElement);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<root>\n  <a></a>\n  <b></b>\n</root>");
    }

    #[test]
    fn vorhandener_whitespace_wird_ersetzt() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::xml(Box::new(sink), 4);
        let mut input = start("root").to_vec();
        input.push(OwnedEvent::characters("\n\t\t"));
        input.extend(element("a"));
        input.push(OwnedEvent::characters(" "));
        input.push(OwnedEvent::EndElement);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<root>\n    <a></a>\n</root>");
    }

    #[test]
    fn gemischter_inhalt_bleibt_unveraendert() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::xml(Box::new(sink), 2);
        let mut input = start("p").to_vec();
        input.push(OwnedEvent::characters("text "));
        input.extend(element("a"));
        input.push(OwnedEvent::characters(" "));
        input.extend(element("b"));
        input.push(OwnedEvent::EndElement);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<p>text <a></a> <b></b></p>");
    }

    #[test]
    fn xml_space_preserve_unterdrueckt() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::xml(Box::new(sink), 2);
        let mut input = start("root").to_vec();
        input.push(OwnedEvent::start_element(QName::local("keep")));
        input.push(OwnedEvent::attribute(QName::xml("space"), "preserve"));
        input.push(OwnedEvent::StartContent);
        input.extend(element("x"));
        input.push(OwnedEvent::EndElement);
        input.extend(element("y"));
        input.push(OwnedEvent::EndElement);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<root>\n  <keep><x></x></keep>\n  <y></y>\n</root>");
    }

    #[test]
    fn html_inline_ohne_whitespace() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::new(Box::new(sink), Box::new(HtmlClassifier::html()), 2);
        let mut input = start("div").to_vec();
        input.extend(element("span"));
        input.extend(element("b"));
        input.push(OwnedEvent::EndElement);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<div><span></span><b></b></div>");
    }

    #[test]
    fn html_pre_wird_nicht_eingerueckt() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::new(Box::new(sink), Box::new(HtmlClassifier::html()), 2);
        let mut input = start("body").to_vec();
        input.extend(start("pre"));
        input.extend(element("p"));
        input.push(OwnedEvent::characters("\n  "));
        input.push(OwnedEvent::EndElement);
        input.extend(element("div"));
        input.push(OwnedEvent::EndElement);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<body>\n  <pre><p></p>\n  </pre>\n  <div></div>\n</body>");
    }

    #[test]
    fn kommentar_auf_dokumentebene() {
        let (sink, events) = EventCollector::shared();
        let mut ind = Indenter::xml(Box::new(sink), 2);
        let mut input = vec![OwnedEvent::StartDocument, OwnedEvent::comment("c")];
        input.extend(element("root"));
        input.push(OwnedEvent::EndDocument);
        run(&mut ind, &input);
        assert_eq!(render(&events), "<!--c-->\n<root></root>");
    }

    #[test]
    fn klassifikation() {
        let html = HtmlClassifier::html();
        assert!(html.is_inline(&QName::local("SPAN")));
        assert!(html.is_formatted(&QName::local("pre")));
        assert!(!html.is_inline(&QName::new(NS_XHTML, "span")));
        let xhtml = HtmlClassifier::xhtml();
        assert!(xhtml.is_inline(&QName::new(NS_XHTML, "span")));
        assert!(!xhtml.is_inline(&QName::local("span")));
    }
}
