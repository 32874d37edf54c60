//! Event model of the serialization pipeline.
//!
//! [`Event`] borrows its content: producers hand out views into transient
//! buffers and every stage must copy what it wants to keep. [`OwnedEvent`]
//! is the owning mirror used by collectors, buffered replays and tests.
//!
//! Ordering per element: `StartElement`, any interleaving of `Namespace` and
//! `Attribute`, exactly one `StartContent`, children, exactly one `EndElement`.

use crate::location::LocationId;
use crate::properties::Properties;
use crate::qname::QName;

/// Type annotation of an element or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TypeAnnotation {
    /// No schema validation took place.
    #[default]
    Untyped,
    /// Validated, but the type is not known to the pipeline.
    Unknown,
    /// A simple (atomic or list) type.
    Simple,
    /// A complex type with simple content.
    SimpleContent,
    /// A complex type with element-only or mixed content.
    Complex,
    /// A namespace-sensitive simple type (xs:QName, xs:NOTATION and derived).
    QName,
}

impl TypeAnnotation {
    /// Content of this type is a scalar value: whitespace is significant.
    pub fn is_simple_content(self) -> bool {
        matches!(self, Self::Simple | Self::SimpleContent | Self::QName)
    }

    /// Values of this type contain lexical QNames whose prefixes must resolve.
    pub fn is_namespace_sensitive(self) -> bool {
        matches!(self, Self::QName)
    }
}

/// One structural event, borrowing its content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    StartDocument,
    EndDocument,
    StartElement {
        name: &'a QName,
        type_annotation: TypeAnnotation,
        location: LocationId,
        properties: Properties,
    },
    Namespace {
        prefix: &'a str,
        uri: &'a str,
        properties: Properties,
    },
    Attribute {
        name: &'a QName,
        type_annotation: TypeAnnotation,
        value: &'a str,
        location: LocationId,
        properties: Properties,
    },
    StartContent,
    EndElement,
    Characters {
        text: &'a str,
        location: LocationId,
        properties: Properties,
    },
    ProcessingInstruction {
        target: &'a str,
        data: &'a str,
        location: LocationId,
        properties: Properties,
    },
    Comment {
        text: &'a str,
        location: LocationId,
        properties: Properties,
    },
}

impl<'a> Event<'a> {
    /// Kurzform: StartElement ohne Typ, Location und Properties.
    pub fn start_element(name: &'a QName) -> Self {
        Event::StartElement {
            name,
            type_annotation: TypeAnnotation::Untyped,
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        }
    }

    pub fn namespace(prefix: &'a str, uri: &'a str) -> Self {
        Event::Namespace { prefix, uri, properties: Properties::NONE }
    }

    pub fn attribute(name: &'a QName, value: &'a str) -> Self {
        Event::Attribute {
            name,
            type_annotation: TypeAnnotation::Untyped,
            value,
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        }
    }

    pub fn characters(text: &'a str) -> Self {
        Event::Characters { text, location: LocationId::UNKNOWN, properties: Properties::NONE }
    }

    pub fn comment(text: &'a str) -> Self {
        Event::Comment { text, location: LocationId::UNKNOWN, properties: Properties::NONE }
    }

    pub fn processing_instruction(target: &'a str, data: &'a str) -> Self {
        Event::ProcessingInstruction {
            target,
            data,
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        }
    }

    /// Short name of the event kind, used in protocol error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::StartDocument => "StartDocument",
            Event::EndDocument => "EndDocument",
            Event::StartElement { .. } => "StartElement",
            Event::Namespace { .. } => "Namespace",
            Event::Attribute { .. } => "Attribute",
            Event::StartContent => "StartContent",
            Event::EndElement => "EndElement",
            Event::Characters { .. } => "Characters",
            Event::ProcessingInstruction { .. } => "ProcessingInstruction",
            Event::Comment { .. } => "Comment",
        }
    }

    /// Kopiert den Inhalt in ein [`OwnedEvent`].
    pub fn to_owned_event(&self) -> OwnedEvent {
        match *self {
            Event::StartDocument => OwnedEvent::StartDocument,
            Event::EndDocument => OwnedEvent::EndDocument,
            Event::StartElement { name, type_annotation, location, properties } => {
                OwnedEvent::StartElement { name: name.clone(), type_annotation, location, properties }
            }
            Event::Namespace { prefix, uri, properties } => OwnedEvent::Namespace {
                prefix: prefix.to_owned(),
                uri: uri.to_owned(),
                properties,
            },
            Event::Attribute { name, type_annotation, value, location, properties } => {
                OwnedEvent::Attribute {
                    name: name.clone(),
                    type_annotation,
                    value: value.to_owned(),
                    location,
                    properties,
                }
            }
            Event::StartContent => OwnedEvent::StartContent,
            Event::EndElement => OwnedEvent::EndElement,
            Event::Characters { text, location, properties } => {
                OwnedEvent::Characters { text: text.to_owned(), location, properties }
            }
            Event::ProcessingInstruction { target, data, location, properties } => {
                OwnedEvent::ProcessingInstruction {
                    target: target.to_owned(),
                    data: data.to_owned(),
                    location,
                    properties,
                }
            }
            Event::Comment { text, location, properties } => {
                OwnedEvent::Comment { text: text.to_owned(), location, properties }
            }
        }
    }
}

/// Owning mirror of [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnedEvent {
    StartDocument,
    EndDocument,
    StartElement {
        name: QName,
        type_annotation: TypeAnnotation,
        location: LocationId,
        properties: Properties,
    },
    Namespace {
        prefix: String,
        uri: String,
        properties: Properties,
    },
    Attribute {
        name: QName,
        type_annotation: TypeAnnotation,
        value: String,
        location: LocationId,
        properties: Properties,
    },
    StartContent,
    EndElement,
    Characters {
        text: String,
        location: LocationId,
        properties: Properties,
    },
    ProcessingInstruction {
        target: String,
        data: String,
        location: LocationId,
        properties: Properties,
    },
    Comment {
        text: String,
        location: LocationId,
        properties: Properties,
    },
}

impl OwnedEvent {
    /// Borrowed view for feeding a receiver.
    pub fn as_event(&self) -> Event<'_> {
        match self {
            OwnedEvent::StartDocument => Event::StartDocument,
            OwnedEvent::EndDocument => Event::EndDocument,
            OwnedEvent::StartElement { name, type_annotation, location, properties } => {
                Event::StartElement {
                    name,
                    type_annotation: *type_annotation,
                    location: *location,
                    properties: *properties,
                }
            }
            OwnedEvent::Namespace { prefix, uri, properties } => {
                Event::Namespace { prefix, uri, properties: *properties }
            }
            OwnedEvent::Attribute { name, type_annotation, value, location, properties } => {
                Event::Attribute {
                    name,
                    type_annotation: *type_annotation,
                    value,
                    location: *location,
                    properties: *properties,
                }
            }
            OwnedEvent::StartContent => Event::StartContent,
            OwnedEvent::EndElement => Event::EndElement,
            OwnedEvent::Characters { text, location, properties } => {
                Event::Characters { text, location: *location, properties: *properties }
            }
            OwnedEvent::ProcessingInstruction { target, data, location, properties } => {
                Event::ProcessingInstruction {
                    target,
                    data,
                    location: *location,
                    properties: *properties,
                }
            }
            OwnedEvent::Comment { text, location, properties } => {
                Event::Comment { text, location: *location, properties: *properties }
            }
        }
    }

    pub fn start_element(name: QName) -> Self {
        OwnedEvent::StartElement {
            name,
            type_annotation: TypeAnnotation::Untyped,
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        }
    }

    pub fn namespace(prefix: &str, uri: &str) -> Self {
        OwnedEvent::Namespace { prefix: prefix.into(), uri: uri.into(), properties: Properties::NONE }
    }

    pub fn attribute(name: QName, value: &str) -> Self {
        OwnedEvent::Attribute {
            name,
            type_annotation: TypeAnnotation::Untyped,
            value: value.into(),
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        }
    }

    pub fn characters(text: &str) -> Self {
        OwnedEvent::Characters { text: text.into(), location: LocationId::UNKNOWN, properties: Properties::NONE }
    }

    pub fn comment(text: &str) -> Self {
        OwnedEvent::Comment { text: text.into(), location: LocationId::UNKNOWN, properties: Properties::NONE }
    }

    pub fn processing_instruction(target: &str, data: &str) -> Self {
        OwnedEvent::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
            location: LocationId::UNKNOWN,
            properties: Properties::NONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_roundtrip_behaelt_inhalt() {
        let name = QName::with_prefix("urn:a", "item", "a");
        let owned = OwnedEvent::Attribute {
            name: name.clone(),
            type_annotation: TypeAnnotation::QName,
            value: "a:b".into(),
            location: LocationId(3),
            properties: Properties::IS_ID,
        };
        let view = owned.as_event();
        assert_eq!(view.kind(), "Attribute");
        assert_eq!(view.to_owned_event(), owned);
    }

    #[test]
    fn simple_content_klassifikation() {
        assert!(TypeAnnotation::Simple.is_simple_content());
        assert!(TypeAnnotation::SimpleContent.is_simple_content());
        assert!(!TypeAnnotation::Unknown.is_simple_content());
        assert!(!TypeAnnotation::Untyped.is_simple_content());
        assert!(TypeAnnotation::QName.is_namespace_sensitive());
        assert!(!TypeAnnotation::Simple.is_namespace_sensitive());
    }
}
