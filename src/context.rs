//! Shared, read-mostly state of one pipeline pass.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::diagnostics::{Diagnostic, DiagnosticsSink, LogDiagnostics};
use crate::error::Error;
use crate::location::{LocationProvider, NoLocations};
use crate::qname::NameTable;

/// Host language of the pass; selects the error-code space for validity errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostLanguage {
    #[default]
    Xslt,
    XQuery,
}

/// Document-validity conditions with a code in each host language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// A second element at document level.
    MultipleRoots,
    /// Non-whitespace text at document level.
    TextAtDocumentLevel,
    /// A prefix used in QName-valued content is not in scope.
    UndeclaredPrefix,
    /// One element binds the same prefix to two URIs.
    DuplicateNamespace,
    /// Whitespace inside simple-typed content would have been stripped.
    StripSimpleContent,
}

impl Condition {
    pub fn code(self, host: HostLanguage) -> &'static str {
        use HostLanguage::*;
        match (self, host) {
            (Self::MultipleRoots | Self::TextAtDocumentLevel, Xslt) => "XTTE1550",
            (Self::MultipleRoots | Self::TextAtDocumentLevel, XQuery) => "XQDY0061",
            (Self::UndeclaredPrefix, Xslt) => "XTDE0290",
            (Self::UndeclaredPrefix, XQuery) => "XPST0081",
            (Self::DuplicateNamespace, Xslt) => "XTDE0430",
            (Self::DuplicateNamespace, XQuery) => "XQDY0102",
            (Self::StripSimpleContent, _) => "SXWN9016",
        }
    }
}

/// Name table, location provider, diagnostics and host language of one pass.
///
/// Shared by `Rc` between all stages; lifetime = longest-lived stage.
pub struct PipelineContext {
    names: RefCell<NameTable>,
    locations: Rc<dyn LocationProvider>,
    diagnostics: Rc<dyn DiagnosticsSink>,
    host: HostLanguage,
    aborted: Cell<bool>,
}

impl PipelineContext {
    pub fn new(host: HostLanguage) -> Self {
        Self {
            names: RefCell::new(NameTable::new()),
            locations: Rc::new(NoLocations),
            diagnostics: Rc::new(LogDiagnostics),
            host,
            aborted: Cell::new(false),
        }
    }

    #[must_use]
    pub fn with_locations(mut self, locations: Rc<dyn LocationProvider>) -> Self {
        self.locations = locations;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Rc<dyn DiagnosticsSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn host_language(&self) -> HostLanguage {
        self.host
    }

    pub fn names(&self) -> Ref<'_, NameTable> {
        self.names.borrow()
    }

    pub fn names_mut(&self) -> RefMut<'_, NameTable> {
        self.names.borrow_mut()
    }

    pub fn locations(&self) -> &dyn LocationProvider {
        &*self.locations
    }

    /// Meldet eine behebbare Diagnose an den Sink.
    pub fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.report(diagnostic, &*self.locations);
    }

    /// Marks the pass as failed; stages closing afterwards write nothing new.
    pub fn abort(&self) {
        self.aborted.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    /// Builds the fatal validity error for `condition` in this host language.
    pub fn validity_error(&self, condition: Condition, message: impl Into<String>) -> Error {
        Error::validity(condition.code(self.host), message)
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(HostLanguage::Xslt)
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("names", &*self.names.borrow())
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_host_language() {
        let xslt = PipelineContext::new(HostLanguage::Xslt);
        let xq = PipelineContext::new(HostLanguage::XQuery);
        assert_eq!(xslt.validity_error(Condition::MultipleRoots, "x").code(), Some("XTTE1550"));
        assert_eq!(xq.validity_error(Condition::MultipleRoots, "x").code(), Some("XQDY0061"));
        assert_eq!(Condition::UndeclaredPrefix.code(HostLanguage::XQuery), "XPST0081");
    }
}
