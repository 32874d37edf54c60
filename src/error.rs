//! Central error types for the serialization pipeline.
//!
//! Four families of failure exist:
//! - protocol violations (internal consistency faults, always fatal),
//! - document-validity errors carrying a host-language error code,
//! - serialization/environment errors (`SExx` codes, destinations, I/O),
//! - recoverable content-policy violations, which never surface as `Error`
//!   but are reported through [`crate::diagnostics::DiagnosticsSink`].

use core::fmt;
use std::borrow::Cow;

/// All fatal error types raised by pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The event stream violates the ordering contract (e.g. attribute after
    /// StartContent, EndElement without open element).
    Protocol(Cow<'static, str>),
    /// The document being written is not valid in the host language
    /// (multiple top-level elements, undeclared prefix in QName content, ...).
    Validity {
        /// Error code from the host-language code space.
        code: &'static str,
        /// Human readable description.
        message: String,
    },
    /// The events cannot be serialized with the chosen method/encoding.
    Serialization {
        /// Serialization error code (`SERE`, `SEPM`, `SESU`).
        code: &'static str,
        /// Human readable description.
        message: String,
    },
    /// An output property has an invalid value.
    InvalidOption {
        /// Property name as given.
        name: String,
        /// Rejected value.
        value: String,
    },
    /// The output destination could not be resolved or opened.
    Destination(String),
    /// Writing to the destination failed.
    IoError(String),
    /// XML parsing failed in the source adapter.
    XmlParseError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(msg) => write!(f, "event protocol violation: {msg}"),
            Self::Validity { code, message } => write!(f, "{code}: {message}"),
            Self::Serialization { code, message } => write!(f, "{code}: {message}"),
            Self::InvalidOption { name, value } => {
                write!(f, "SEPM0016: invalid value '{value}' for output property '{name}'")
            }
            Self::Destination(msg) => write!(f, "cannot open output destination: {msg}"),
            Self::IoError(msg) => write!(f, "IO error: {msg}"),
            Self::XmlParseError(msg) => write!(f, "XML parse error: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Self::IoError("character sink rejected output".into())
    }
}

impl Error {
    /// Erstellt einen `Protocol` Fehler.
    pub fn protocol(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Erstellt einen `Validity` Fehler mit Code aus dem Host-Code-Raum.
    pub fn validity(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validity { code, message: message.into() }
    }

    /// Erstellt einen `Serialization` Fehler.
    pub fn serialization(code: &'static str, message: impl Into<String>) -> Self {
        Self::Serialization { code, message: message.into() }
    }

    /// Erstellt einen `InvalidOption` Fehler.
    pub fn invalid_option(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidOption { name: name.into(), value: value.into() }
    }

    /// Error code of the failure, if it carries one.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::Validity { code, .. } | Self::Serialization { code, .. } => Some(code),
            Self::InvalidOption { .. } => Some("SEPM0016"),
            _ => None,
        }
    }
}

/// A convenience `Result` type alias using [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
