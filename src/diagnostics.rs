//! Diagnostics sink for recoverable conditions.
//!
//! Fatal errors travel as [`crate::Error`]; everything the pipeline can absorb
//! (unsupported encoding, whitespace that must not be stripped) is reported
//! here and processing continues.

use std::cell::RefCell;
use std::fmt;

use log::{error, warn};

use crate::location::{LocationId, LocationProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

/// One reported condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub location: LocationId,
}

impl Diagnostic {
    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, code, message: message.into(), location: LocationId::UNKNOWN }
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, code, message: message.into(), location: LocationId::UNKNOWN }
    }

    #[must_use]
    pub fn at(mut self, location: LocationId) -> Self {
        self.location = location;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}: {}", self.severity, self.code, self.message)
    }
}

/// Receives recoverable diagnostics.
///
/// Takes `&self`: the sink is shared by all stages through the pipeline context.
pub trait DiagnosticsSink {
    fn report(&self, diagnostic: Diagnostic, locations: &dyn LocationProvider);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticsSink for LogDiagnostics {
    fn report(&self, d: Diagnostic, locations: &dyn LocationProvider) {
        let at = locations.location(d.location).map(|l| format!(" at {l}")).unwrap_or_default();
        match d.severity {
            Severity::Warning => warn!("{}: {}{at}", d.code, d.message),
            Severity::Error | Severity::Fatal => error!("{}: {}{at}", d.code, d.message),
        }
    }
}

/// Keeps every diagnostic in memory (tests, CLI summary).
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    items: RefCell<Vec<Diagnostic>>,
}

impl CollectingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.items.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

impl DiagnosticsSink for CollectingDiagnostics {
    fn report(&self, diagnostic: Diagnostic, _locations: &dyn LocationProvider) {
        self.items.borrow_mut().push(diagnostic);
    }
}
