//! Markup emitter for the xml, html and xhtml methods.
//!
//! A start tag stays open after `StartContent` until the first child or the
//! end tag arrives, so empty elements can be closed with `/>`.

use std::rc::Rc;

use crate::context::PipelineContext;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::options::{SharedProperties, Standalone};
use crate::pipeline::Receiver;
use crate::properties::Properties;
use crate::qname::{ExpandedName, NS_XHTML, QName};
use crate::FastHashSet;

use super::escape::{escape_attribute, escape_html_attribute, escape_html_text, escape_text};
use super::output::{Destination, DestinationResolver, Output};
use super::resolve_charset;

/// Markup syntax to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Xml,
    Html,
    Xhtml,
}

const HTML_VOID: &[&str] = &[
    "area", "base", "basefont", "br", "col", "command", "embed", "frame", "hr", "img", "input",
    "isindex", "keygen", "link", "meta", "param", "source", "track", "wbr",
];

const HTML_RAW_TEXT: &[&str] = &["script", "style"];

const HTML_BOOLEAN_ATTRIBUTES: &[&str] = &[
    "async", "autofocus", "autoplay", "checked", "compact", "controls", "declare", "defer",
    "disabled", "hidden", "ismap", "loop", "multiple", "muted", "nohref", "noresize", "noshade",
    "nowrap", "open", "readonly", "required", "reversed", "selected",
];

fn in_list(list: &[&str], local: &str) -> bool {
    list.iter().any(|n| n.eq_ignore_ascii_case(local))
}

#[derive(Debug)]
struct OpenElement {
    display_name: String,
    cdata: bool,
    raw_text: bool,
    void: bool,
}

/// Konfiguration, beim `open` aus den Output-Properties uebernommen.
#[derive(Debug, Default)]
struct Prolog {
    omit_declaration: bool,
    version: String,
    standalone: Standalone,
    doctype_public: Option<String>,
    doctype_system: Option<String>,
    html5: bool,
    newline_after_declaration: bool,
    undeclare_prefixes: bool,
}

pub struct MarkupEmitter {
    flavor: Flavor,
    out: Output,
    props: SharedProperties,
    ctx: Rc<PipelineContext>,
    prolog: Prolog,
    cdata_elements: FastHashSet<ExpandedName>,
    declaration_done: bool,
    seen_element: bool,
    start_tag_open: bool,
    stack: Vec<OpenElement>,
    scratch: String,
}

impl MarkupEmitter {
    pub fn new(
        flavor: Flavor,
        destination: Destination,
        resolver: Rc<dyn DestinationResolver>,
        props: SharedProperties,
    ) -> Self {
        Self {
            flavor,
            out: Output::new(destination, resolver),
            props,
            ctx: Rc::default(),
            prolog: Prolog::default(),
            cdata_elements: FastHashSet::default(),
            declaration_done: false,
            seen_element: false,
            start_tag_open: false,
            stack: Vec::new(),
            scratch: String::new(),
        }
    }

    fn load_properties(&mut self) {
        let p = self.props.borrow();
        self.prolog = Prolog {
            omit_declaration: self.flavor == Flavor::Html || p.omit_xml_declaration(),
            version: p.xml_version().to_owned(),
            standalone: p.standalone(),
            doctype_public: p.doctype_public().map(str::to_owned),
            doctype_system: p.doctype_system().map(str::to_owned),
            html5: p.effective_html_version() >= 5.0,
            newline_after_declaration: p.effective_indent(),
            undeclare_prefixes: p.undeclare_prefixes() && p.xml_version() == "1.1",
        };
        let mut names = self.ctx.names_mut();
        self.cdata_elements = p
            .cdata_section_elements()
            .iter()
            .map(|q| names.intern_expanded(&q.uri, &q.local))
            .collect();
    }

    /// Name im HTML-Vokabular der gewaehlten Syntax?
    fn html_local<'n>(&self, name: &'n QName) -> Option<&'n str> {
        let html = match self.flavor {
            Flavor::Html => name.is_in_no_namespace(),
            Flavor::Xhtml => &*name.uri == NS_XHTML,
            Flavor::Xml => false,
        };
        html.then_some(&*name.local)
    }

    fn close_start_tag(&mut self) -> Result<()> {
        if self.start_tag_open {
            self.start_tag_open = false;
            self.out.write_markup(">")?;
        }
        Ok(())
    }

    /// XML declaration before any output and the DOCTYPE before the first
    /// element.
    fn prolog(&mut self, first_element: Option<&QName>) -> Result<()> {
        if !self.declaration_done {
            self.declaration_done = true;
            if !self.prolog.omit_declaration {
                let mut decl = format!(
                    "<?xml version=\"{}\" encoding=\"{}\"",
                    self.prolog.version,
                    self.out.charset().name()
                );
                match self.prolog.standalone {
                    Standalone::Yes => decl.push_str(" standalone=\"yes\""),
                    Standalone::No => decl.push_str(" standalone=\"no\""),
                    Standalone::Omit => {}
                }
                decl.push_str("?>");
                if self.prolog.newline_after_declaration {
                    decl.push('\n');
                }
                self.out.write_markup(&decl)?;
            }
        }
        let Some(name) = first_element else {
            return Ok(());
        };
        if self.seen_element {
            return Ok(());
        }
        self.seen_element = true;
        let is_html_root = self.html_local(name).is_some_and(|l| l.eq_ignore_ascii_case("html"));
        let doctype_name = match self.flavor {
            Flavor::Html => "html".to_owned(),
            _ => name.to_string(),
        };
        let doctype = match (&self.prolog.doctype_public, &self.prolog.doctype_system) {
            (Some(public), Some(system)) => {
                Some(format!("<!DOCTYPE {doctype_name} PUBLIC \"{public}\" \"{system}\">\n"))
            }
            (None, Some(system)) => Some(format!("<!DOCTYPE {doctype_name} SYSTEM \"{system}\">\n")),
            (Some(public), None) if self.flavor == Flavor::Html => {
                Some(format!("<!DOCTYPE {doctype_name} PUBLIC \"{public}\">\n"))
            }
            _ if self.flavor != Flavor::Xml && self.prolog.html5 && is_html_root => {
                Some("<!DOCTYPE html>\n".to_owned())
            }
            _ => None,
        };
        if let Some(doctype) = doctype {
            self.out.write_markup(&doctype)?;
        }
        Ok(())
    }

    fn start_element(&mut self, name: &QName) -> Result<()> {
        self.close_start_tag()?;
        self.prolog(Some(name))?;
        let html_local = self.html_local(name);
        let cdata = self.flavor != Flavor::Html
            && self
                .ctx
                .names()
                .lookup_expanded(name)
                .is_some_and(|e| self.cdata_elements.contains(&e));
        let element = OpenElement {
            display_name: name.to_string(),
            cdata,
            raw_text: self.flavor == Flavor::Html
                && html_local.is_some_and(|l| in_list(HTML_RAW_TEXT, l)),
            void: match self.flavor {
                Flavor::Html => html_local.is_some_and(|l| in_list(HTML_VOID, l)),
                Flavor::Xhtml => html_local.is_some_and(|l| HTML_VOID.contains(&l)),
                Flavor::Xml => false,
            },
        };
        self.out.write_markup("<")?;
        self.out.write_markup(&element.display_name)?;
        self.stack.push(element);
        self.start_tag_open = true;
        Ok(())
    }

    fn namespace(&mut self, prefix: &str, uri: &str) -> Result<()> {
        if uri.is_empty() && !prefix.is_empty() && !self.prolog.undeclare_prefixes {
            // xmlns:p="" gibt es nur in XML 1.1.
            return Ok(());
        }
        self.scratch.clear();
        self.scratch.push_str(" xmlns");
        if !prefix.is_empty() {
            self.scratch.push(':');
            self.scratch.push_str(prefix);
        }
        self.scratch.push_str("=\"");
        self.out.write_markup(&self.scratch)?;
        self.scratch.clear();
        escape_attribute(&mut self.scratch, uri);
        self.out.write_content(&self.scratch)?;
        self.out.write_markup("\"")
    }

    fn attribute(&mut self, name: &QName, value: &str, properties: Properties) -> Result<()> {
        let display = name.to_string();
        self.out.write_markup(" ")?;
        self.out.write_markup(&display)?;
        if self.flavor == Flavor::Html
            && name.is_in_no_namespace()
            && in_list(HTML_BOOLEAN_ATTRIBUTES, &name.local)
            && value.eq_ignore_ascii_case(&name.local)
        {
            return Ok(());
        }
        self.out.write_markup("=\"")?;
        if properties.contains(Properties::DISABLE_ESCAPING) {
            self.out.write_content(value)?;
        } else {
            self.scratch.clear();
            match self.flavor {
                Flavor::Html => escape_html_attribute(&mut self.scratch, value),
                Flavor::Xml | Flavor::Xhtml => escape_attribute(&mut self.scratch, value),
            }
            self.out.write_content(&self.scratch)?;
        }
        self.out.write_markup("\"")
    }

    fn characters(&mut self, text: &str, properties: Properties) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.close_start_tag()?;
        self.prolog(None)?;
        let (cdata, raw_text) =
            self.stack.last().map_or((false, false), |e| (e.cdata, e.raw_text));
        if raw_text || properties.contains(Properties::DISABLE_ESCAPING) {
            return self.out.write_markup(text);
        }
        if cdata {
            return self.write_cdata(text);
        }
        if properties.contains(Properties::NO_SPECIAL_CHARS) {
            return self.out.write_content(text);
        }
        self.scratch.clear();
        match self.flavor {
            Flavor::Html => escape_html_text(&mut self.scratch, text),
            Flavor::Xml | Flavor::Xhtml => escape_text(&mut self.scratch, text),
        }
        self.out.write_content(&self.scratch)
    }

    /// CDATA-Abschnitt; `]]>` und nicht kodierbare Zeichen teilen ihn auf.
    fn write_cdata(&mut self, text: &str) -> Result<()> {
        self.out.write_markup("<![CDATA[")?;
        let mut run_start = 0;
        let mut iter = text.char_indices();
        while let Some((i, c)) = iter.next() {
            if text[i..].starts_with("]]>") {
                self.out.write_markup(&text[run_start..i + 2])?;
                self.out.write_markup("]]><![CDATA[")?;
                run_start = i + 2;
                iter.next();
            } else if !self.out.can_encode(c) {
                self.out.write_markup(&text[run_start..i])?;
                self.out.write_markup("]]>")?;
                self.out.write_content(&format!("&#x{:X};", u32::from(c)))?;
                self.out.write_markup("<![CDATA[")?;
                run_start = i + c.len_utf8();
            }
        }
        self.out.write_markup(&text[run_start..])?;
        self.out.write_markup("]]>")
    }

    fn comment(&mut self, text: &str) -> Result<()> {
        if text.contains("--") || text.ends_with('-') {
            return Err(Error::serialization(
                "SERE0012",
                "comment contains '--' or ends with '-'",
            ));
        }
        self.close_start_tag()?;
        self.prolog(None)?;
        self.out.write_markup("<!--")?;
        self.out.write_markup(text)?;
        self.out.write_markup("-->")
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<()> {
        if target.eq_ignore_ascii_case("xml") {
            return Err(Error::serialization(
                "SERE0012",
                format!("'{target}' is not a valid processing instruction target"),
            ));
        }
        let html = self.flavor == Flavor::Html;
        if html && data.contains('>') {
            return Err(Error::serialization(
                "SERE0015",
                "processing instruction data contains '>' in html output",
            ));
        }
        if !html && data.contains("?>") {
            return Err(Error::serialization(
                "SERE0012",
                "processing instruction data contains '?>'",
            ));
        }
        self.close_start_tag()?;
        self.prolog(None)?;
        self.out.write_markup("<?")?;
        self.out.write_markup(target)?;
        if !data.is_empty() {
            self.out.write_markup(" ")?;
            self.out.write_markup(data)?;
        }
        self.out.write_markup(if html { ">" } else { "?>" })
    }

    fn end_element(&mut self) -> Result<()> {
        let element = self
            .stack
            .pop()
            .ok_or_else(|| Error::protocol("EndElement without open element"))?;
        if self.start_tag_open {
            self.start_tag_open = false;
            match self.flavor {
                Flavor::Xml => return self.out.write_markup("/>"),
                Flavor::Xhtml if element.void => return self.out.write_markup(" />"),
                Flavor::Html if element.void => return self.out.write_markup(">"),
                _ => self.out.write_markup(">")?,
            }
        } else if self.flavor == Flavor::Html && element.void {
            return Ok(());
        }
        self.out.write_markup("</")?;
        self.out.write_markup(&element.display_name)?;
        self.out.write_markup(">")
    }
}

impl Receiver for MarkupEmitter {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
    }

    fn open(&mut self) -> Result<()> {
        resolve_charset(&self.props, &self.ctx, &mut self.out);
        self.load_properties();
        Ok(())
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::StartDocument | Event::StartContent => Ok(()),
            Event::EndDocument => self.close_start_tag(),
            Event::StartElement { name, .. } => self.start_element(name),
            Event::Namespace { .. } | Event::Attribute { .. } if !self.start_tag_open => {
                Err(Error::protocol(format!("{}: no open start tag", event.kind())))
            }
            Event::Namespace { prefix, uri, .. } => self.namespace(prefix, uri),
            Event::Attribute { name, value, properties, .. } => {
                self.attribute(name, value, properties)
            }
            Event::EndElement => self.end_element(),
            Event::Characters { text, properties, .. } => self.characters(text, properties),
            Event::Comment { text, .. } => self.comment(text),
            Event::ProcessingInstruction { target, data, .. } => {
                self.processing_instruction(target, data)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.close_start_tag()?;
        self.out.close()
    }
}
