//! xser – streaming XML serialization pipeline
//!
//! Events flow through a chain of [`Receiver`] stages: protocol check,
//! namespace reduction, whitespace stripping, output method negotiation,
//! indentation, character maps and finally an emitter writing xml, html,
//! xhtml or text in the requested encoding.
//!
//! # Beispiel
//!
//! ```
//! use xser::{OutputProperties, OwnedEvent, QName, Serializer};
//!
//! let events = vec![
//!     OwnedEvent::StartDocument,
//!     OwnedEvent::start_element(QName::local("greeting")),
//!     OwnedEvent::StartContent,
//!     OwnedEvent::characters("Hello & bye"),
//!     OwnedEvent::EndElement,
//!     OwnedEvent::EndDocument,
//! ];
//! let xml = Serializer::new(OutputProperties::default()).serialize_to_string(&events).unwrap();
//! assert_eq!(xml, "<?xml version=\"1.0\" encoding=\"UTF-8\"?><greeting>Hello &amp; bye</greeting>");
//! ```

pub mod charmap;
pub mod context;
pub mod diagnostics;
pub mod emitter;
pub mod error;
pub mod event;
pub mod html;
pub mod indent;
pub mod location;
pub mod namespace;
pub mod negotiator;
pub mod options;
pub mod pipeline;
pub mod properties;
pub mod qname;
pub mod serializer;
pub mod source;
pub mod whitespace;

pub use error::{Error, Result};

/// HashMap mit ahash (schneller, nicht DoS-resistent, für interne Datenstrukturen).
pub(crate) type FastHashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;

/// HashSet mit ahash.
pub(crate) type FastHashSet<K> = hashbrown::HashSet<K, ahash::RandomState>;

/// IndexMap mit ahash (deterministische Iteration + schnelles Hashing).
pub(crate) type FastIndexMap<K, V> = indexmap::IndexMap<K, V, ahash::RandomState>;

// Public API: Events
pub use event::{Event, OwnedEvent, TypeAnnotation};
pub use properties::Properties;
pub use qname::QName;

// Public API: Pipeline
pub use context::{HostLanguage, PipelineContext};
pub use diagnostics::{CollectingDiagnostics, Diagnostic, DiagnosticsSink, Severity};
pub use pipeline::{Next, Receiver};

// Public API: Options
pub use options::{CharacterMap, OutputMethod, OutputProperties, Standalone};
pub use whitespace::StripSpace;

// Public API: Serializer
pub use emitter::Destination;
pub use serializer::{SerializationPipeline, Serializer};
