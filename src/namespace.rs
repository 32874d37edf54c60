//! Namespace reduction and fixup.
//!
//! [`NamespaceReducer`] removes redundant namespace declarations, injects the
//! bindings element and attribute names require, emits undeclarations below
//! elements flagged [`Properties::DISINHERIT_NAMESPACES`] and validates the
//! prefixes used inside QName-valued attributes.
//!
//! Invariant: `counts.len()` equals the current element nesting depth and the
//! sum of `counts` equals `bindings.len()`.

use std::rc::Rc;

use log::debug;

use crate::context::{Condition, PipelineContext};
use crate::error::{Error, Result};
use crate::event::Event;
use crate::pipeline::{Next, Receiver};
use crate::properties::Properties;
use crate::qname::{NS_XML, NameTable, QName, Sym, split_lexical};

/// One active (prefix, URI) binding; an empty URI marks an undeclaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceBinding {
    pub prefix: Sym,
    pub uri: Sym,
}

/// Symbol des Prefix "xml" (in [`NameTable::new`] vorbelegt).
const XML_PREFIX: Sym = Sym(1);

fn is_reserved_prefix(prefix: &str) -> bool {
    prefix == "xml" || prefix == "xmlns"
}

pub struct NamespaceReducer {
    next: Next,
    ctx: Rc<PipelineContext>,
    /// Globaler Binding-Stack.
    bindings: Vec<NamespaceBinding>,
    /// Anzahl Bindings pro Tiefe.
    counts: Vec<usize>,
    /// Disinherit-Flag pro Tiefe.
    disinherit: Vec<bool>,
    /// Ausstehende Undeklarationen fuer das aktuelle Start-Tag.
    pending_undeclarations: Option<Vec<NamespaceBinding>>,
    /// QName-wertige Attribute, geprueft bei StartContent.
    qname_checks: Vec<(QName, String)>,
    synthetic_prefix_counter: usize,
}

impl NamespaceReducer {
    pub fn new(next: Next) -> Self {
        Self {
            next,
            ctx: Rc::default(),
            bindings: Vec::new(),
            counts: Vec::new(),
            disinherit: Vec::new(),
            pending_undeclarations: None,
            qname_checks: Vec::new(),
            synthetic_prefix_counter: 0,
        }
    }

    /// Current element nesting depth as seen by the reducer.
    pub fn depth(&self) -> usize {
        self.counts.len()
    }

    /// Number of bindings on the stack (including undeclarations).
    pub fn stack_len(&self) -> usize {
        self.bindings.len()
    }

    /// In-scope bindings as (prefix, uri), innermost declaration per prefix,
    /// undeclared prefixes omitted.
    pub fn in_scope_namespaces(&self) -> Vec<(String, String)> {
        let names = self.ctx.names();
        let mut seen: Vec<Sym> = Vec::new();
        let mut out = Vec::new();
        for b in self.bindings.iter().rev() {
            if seen.contains(&b.prefix) {
                continue;
            }
            seen.push(b.prefix);
            if b.uri != NameTable::EMPTY {
                out.push((names.resolve(b.prefix).to_owned(), names.resolve(b.uri).to_owned()));
            }
        }
        out.reverse();
        out
    }

    /// Active URI of `prefix`; `None` if unbound, `Some(EMPTY)` if undeclared.
    fn active_uri(&self, prefix: Sym) -> Option<Sym> {
        self.bindings.iter().rev().find(|b| b.prefix == prefix).map(|b| b.uri)
    }

    /// Bindings declared by the element whose start tag is open.
    fn declared_here(&self) -> &[NamespaceBinding] {
        let count = self.counts.last().copied().unwrap_or(0);
        &self.bindings[self.bindings.len() - count..]
    }

    /// A declaration is needed unless it repeats the active binding of its
    /// prefix, or undeclares a prefix that is not bound.
    fn is_needed(&self, binding: NamespaceBinding) -> bool {
        if binding.prefix == XML_PREFIX {
            return false;
        }
        match self.active_uri(binding.prefix) {
            Some(uri) => uri != binding.uri,
            None => binding.uri != NameTable::EMPTY,
        }
    }

    fn intern_binding(&self, prefix: &str, uri: &str) -> NamespaceBinding {
        let mut names = self.ctx.names_mut();
        NamespaceBinding { prefix: names.intern(prefix), uri: names.intern(uri) }
    }

    /// Dedup-Logik fuer explizite und synthetisierte Deklarationen.
    fn declare(&mut self, prefix: &str, uri: &str, properties: Properties) -> Result<()> {
        if prefix == "xml" || prefix == "xmlns" {
            return Ok(());
        }
        let binding = self.intern_binding(prefix, uri);

        // Rebinding vor StartContent hebt die Undeklaration auf (alle Eintraege).
        if let Some(pending) = self.pending_undeclarations.as_mut() {
            pending.retain(|b| b.prefix != binding.prefix);
        }

        if let Some(existing) = self.declared_here().iter().find(|b| b.prefix == binding.prefix) {
            if existing.uri == binding.uri {
                return Ok(());
            }
            if properties.contains(Properties::REJECT_DUPLICATES) {
                return Err(self.ctx.validity_error(
                    Condition::DuplicateNamespace,
                    format!("prefix '{prefix}' is bound to two different namespaces on one element"),
                ));
            }
            debug!("conflicting declaration of prefix '{prefix}' dropped, first binding wins");
            return Ok(());
        }

        if !self.is_needed(binding) {
            return Ok(());
        }
        self.push_binding(binding)?;
        self.next.process(Event::Namespace { prefix, uri, properties })
    }

    fn push_binding(&mut self, binding: NamespaceBinding) -> Result<()> {
        let count = self
            .counts
            .last_mut()
            .ok_or_else(|| Error::protocol("namespace declaration outside an element"))?;
        *count += 1;
        self.bindings.push(binding);
        Ok(())
    }

    /// Ensures an attribute in a namespace has a usable prefix; returns the
    /// renamed attribute name when the prefix had to change.
    fn fix_attribute_name(&mut self, name: &QName) -> Result<Option<QName>> {
        if &*name.uri == NS_XML {
            if &*name.prefix == "xml" {
                return Ok(None);
            }
            return Ok(Some(QName::xml(&name.local)));
        }

        if !name.prefix.is_empty() && !is_reserved_prefix(&name.prefix) {
            let binding = self.intern_binding(&name.prefix, &name.uri);
            let conflict = self
                .declared_here()
                .iter()
                .any(|b| b.prefix == binding.prefix && b.uri != binding.uri);
            if !conflict {
                self.declare(&name.prefix, &name.uri, Properties::NONE)?;
                return Ok(None);
            }
        }

        // Unprefixed attribute in a namespace, a reserved prefix or a prefix
        // clash on this start tag.
        if let Some(prefix) = self.prefix_in_scope_for(&name.uri) {
            return Ok(Some(QName::with_prefix(&name.uri, &name.local, &prefix)));
        }
        let prefix = self.synthesize_prefix();
        self.declare(&prefix, &name.uri, Properties::NONE)?;
        Ok(Some(QName::with_prefix(&name.uri, &name.local, &prefix)))
    }

    /// Element names using `xml`/`xmlns` with a foreign URI, or the XML
    /// namespace under another prefix, are renamed. The binding of the new
    /// prefix is declared afterwards like any element binding.
    fn fix_element_name(&mut self, name: &QName) -> Option<QName> {
        if &*name.uri == NS_XML {
            return (&*name.prefix != "xml").then(|| QName::xml(&name.local));
        }
        if !is_reserved_prefix(&name.prefix) {
            return None;
        }
        if name.uri.is_empty() {
            return Some(QName::local(&name.local));
        }
        let prefix = self
            .prefix_in_scope_for(&name.uri)
            .unwrap_or_else(|| self.synthesize_prefix());
        debug!("reserved prefix '{}' on element {{{}}}{} replaced by '{prefix}'", name.prefix, name.uri, name.local);
        Some(QName::with_prefix(&name.uri, &name.local, &prefix))
    }

    /// A non-empty prefix whose active binding is `uri`.
    fn prefix_in_scope_for(&self, uri: &str) -> Option<String> {
        let names = self.ctx.names();
        let uri = names.lookup(uri)?;
        self.bindings
            .iter()
            .rev()
            .filter(|b| b.uri == uri && b.prefix != NameTable::EMPTY)
            .find(|b| self.active_uri(b.prefix) == Some(uri))
            .map(|b| names.resolve(b.prefix).to_owned())
    }

    fn synthesize_prefix(&mut self) -> String {
        loop {
            let candidate = format!("ns{}", self.synthetic_prefix_counter);
            self.synthetic_prefix_counter += 1;
            let taken = self
                .ctx
                .names()
                .lookup(&candidate)
                .is_some_and(|sym| self.bindings.iter().any(|b| b.prefix == sym));
            if !taken {
                return candidate;
            }
        }
    }

    fn check_qname_content(&self, attribute: &QName, value: &str) -> Result<()> {
        for token in value.split_ascii_whitespace() {
            let (prefix, _) = split_lexical(token);
            if prefix.is_empty() || prefix == "xml" {
                continue;
            }
            let bound = self
                .ctx
                .names()
                .lookup(prefix)
                .and_then(|sym| self.active_uri(sym))
                .is_some_and(|uri| uri != NameTable::EMPTY);
            if !bound {
                return Err(self.ctx.validity_error(
                    Condition::UndeclaredPrefix,
                    format!("namespace prefix '{prefix}' used in attribute {attribute} has not been declared"),
                ));
            }
        }
        Ok(())
    }

    fn start_content(&mut self) -> Result<()> {
        if let Some(pending) = self.pending_undeclarations.take() {
            let prefixes: Vec<Rc<str>> = {
                let names = self.ctx.names();
                pending.iter().map(|b| names.resolve_rc(b.prefix)).collect()
            };
            for prefix in prefixes {
                self.declare(&prefix, "", Properties::NONE)?;
            }
        }
        for (attribute, value) in std::mem::take(&mut self.qname_checks) {
            self.check_qname_content(&attribute, &value)?;
        }
        self.next.process(Event::StartContent)
    }
}

impl Receiver for NamespaceReducer {
    fn set_pipeline_context(&mut self, ctx: &Rc<PipelineContext>) {
        self.ctx = Rc::clone(ctx);
        self.next.set_pipeline_context(ctx);
    }

    fn open(&mut self) -> Result<()> {
        self.next.open()
    }

    fn process(&mut self, event: Event<'_>) -> Result<()> {
        match event {
            Event::StartElement { name, type_annotation, location, properties } => {
                let parent_disinherits = self.disinherit.last().copied().unwrap_or(false);
                self.counts.push(0);
                self.disinherit.push(properties.contains(Properties::DISINHERIT_NAMESPACES));
                self.qname_checks.clear();
                self.pending_undeclarations = parent_disinherits.then(|| {
                    self.bindings
                        .iter()
                        .filter(|b| b.prefix != XML_PREFIX && b.uri != NameTable::EMPTY)
                        .copied()
                        .collect()
                });
                if properties.contains(Properties::NAMESPACE_OK) {
                    return self.next.process(event);
                }
                match self.fix_element_name(name) {
                    Some(renamed) => {
                        self.next.process(Event::StartElement {
                            name: &renamed,
                            type_annotation,
                            location,
                            properties,
                        })?;
                        self.declare(&renamed.prefix, &renamed.uri, Properties::NONE)
                    }
                    None => {
                        self.next.process(event)?;
                        self.declare(&name.prefix, &name.uri, Properties::NONE)
                    }
                }
            }
            Event::Namespace { prefix, uri, properties } => self.declare(prefix, uri, properties),
            Event::Attribute { name, type_annotation, value, location, properties } => {
                let renamed = if properties.contains(Properties::NAMESPACE_OK) {
                    None
                } else if name.uri.is_empty() {
                    // Prefix ohne Namespace ist nicht darstellbar.
                    (!name.prefix.is_empty()).then(|| QName::local(&name.local))
                } else {
                    self.fix_attribute_name(name)?
                };
                let name = renamed.as_ref().unwrap_or(name);
                if type_annotation.is_namespace_sensitive() {
                    self.qname_checks.push((name.clone(), value.to_owned()));
                }
                self.next.process(Event::Attribute { name, type_annotation, value, location, properties })
            }
            Event::StartContent => self.start_content(),
            Event::EndElement => {
                let count = self
                    .counts
                    .pop()
                    .ok_or_else(|| Error::protocol("EndElement without open element in namespace scope"))?;
                self.disinherit.pop();
                let remaining = self
                    .bindings
                    .len()
                    .checked_sub(count)
                    .ok_or_else(|| Error::protocol("namespace stack underflow"))?;
                self.bindings.truncate(remaining);
                self.next.process(event)
            }
            _ => self.next.process(event),
        }
    }

    fn close(&mut self) -> Result<()> {
        self.next.close()
    }
}
