//! Output properties controlling method, encoding and layout of the result.
//!
//! # Beispiel
//!
//! ```
//! use xser::options::{OutputMethod, OutputProperties};
//!
//! let mut props = OutputProperties::default()
//!     .with_method(OutputMethod::Xml)
//!     .with_indent(true);
//! props.set("encoding", "iso-8859-1").unwrap();
//!
//! assert_eq!(props.method(), Some(&OutputMethod::Xml));
//! assert_eq!(props.encoding(), "iso-8859-1");
//! assert!(props.set("indent", "maybe").is_err());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::qname::QName;
use crate::{Error, FastIndexMap, Result};

/// Serialization method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMethod {
    Xml,
    Html,
    Xhtml,
    Text,
    /// Namespaced, implementation-defined method. Not supported by the bundled
    /// emitters.
    Custom(QName),
}

impl OutputMethod {
    /// Parses `xml`, `html`, `xhtml`, `text` or a namespaced name
    /// (`Q{uri}local`, `{uri}local`).
    pub fn parse(value: &str) -> Result<Self> {
        let v = value.trim();
        match v {
            "xml" => Ok(Self::Xml),
            "html" => Ok(Self::Html),
            "xhtml" => Ok(Self::Xhtml),
            "text" => Ok(Self::Text),
            _ => {
                let name = parse_eqname(v);
                if name.is_in_no_namespace() {
                    Err(Error::invalid_option("method", value))
                } else {
                    Ok(Self::Custom(name))
                }
            }
        }
    }

    /// Whether the method writes markup in HTML or XHTML vocabulary.
    pub fn is_html_family(&self) -> bool {
        matches!(self, Self::Html | Self::Xhtml)
    }
}

impl fmt::Display for OutputMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => f.write_str("xml"),
            Self::Html => f.write_str("html"),
            Self::Xhtml => f.write_str("xhtml"),
            Self::Text => f.write_str("text"),
            Self::Custom(name) => write!(f, "Q{}", name.clark()),
        }
    }
}

/// Value of the `standalone` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Standalone {
    Yes,
    No,
    /// Kein standalone-Pseudoattribut in der XML-Deklaration.
    #[default]
    Omit,
}

/// A named character map: single characters replaced by literal strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CharacterMap {
    mappings: FastIndexMap<char, String>,
}

impl CharacterMap {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, c: char, replacement: impl Into<String>) -> Self {
        self.mappings.insert(c, replacement.into());
        self
    }

    pub fn get(&self, c: char) -> Option<&str> {
        self.mappings.get(&c).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Fuegt `other` hinzu; spaetere Eintraege ueberschreiben fruehere.
    pub fn merge(&mut self, other: &CharacterMap) {
        for (c, s) in &other.mappings {
            self.mappings.insert(*c, s.clone());
        }
    }
}

/// Properties recorded during a pass; the emitter updates `encoding` after a
/// fallback and the serializer hands the final state back to the caller.
pub type SharedProperties = Rc<RefCell<OutputProperties>>;

/// Largest accepted `indent-spaces`.
pub const MAX_INDENT_SPACES: usize = 64;

/// Output properties of one serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputProperties {
    pub(crate) method: Option<OutputMethod>,
    pub(crate) encoding: String,
    pub(crate) indent: Option<bool>,
    pub(crate) indent_spaces: usize,
    pub(crate) cdata_section_elements: Vec<QName>,
    pub(crate) use_character_maps: Vec<String>,
    pub(crate) character_maps: FastIndexMap<String, CharacterMap>,
    pub(crate) include_content_type: bool,
    pub(crate) undeclare_prefixes: bool,
    pub(crate) escape_uri_attributes: bool,
    pub(crate) byte_order_mark: bool,
    pub(crate) standalone: Standalone,
    pub(crate) doctype_public: Option<String>,
    pub(crate) doctype_system: Option<String>,
    pub(crate) media_type: Option<String>,
    pub(crate) version: Option<String>,
    pub(crate) html_version: Option<f64>,
    pub(crate) omit_xml_declaration: bool,
}

impl Default for OutputProperties {
    fn default() -> Self {
        Self {
            method: None,
            encoding: "UTF-8".to_owned(),
            indent: None,
            indent_spaces: 2,
            cdata_section_elements: Vec::new(),
            use_character_maps: Vec::new(),
            character_maps: FastIndexMap::default(),
            include_content_type: true,
            undeclare_prefixes: false,
            escape_uri_attributes: true,
            byte_order_mark: false,
            standalone: Standalone::Omit,
            doctype_public: None,
            doctype_system: None,
            media_type: None,
            version: None,
            html_version: None,
            omit_xml_declaration: false,
        }
    }
}

impl OutputProperties {
    // --- Getter ---

    /// Configured method; `None` lets the negotiator decide.
    pub fn method(&self) -> Option<&OutputMethod> { self.method.as_ref() }
    pub fn encoding(&self) -> &str { &self.encoding }
    /// Explicit `indent` setting; `None` = method default.
    pub fn indent(&self) -> Option<bool> { self.indent }
    pub fn indent_spaces(&self) -> usize { self.indent_spaces }
    pub fn cdata_section_elements(&self) -> &[QName] { &self.cdata_section_elements }
    pub fn use_character_maps(&self) -> &[String] { &self.use_character_maps }
    pub fn include_content_type(&self) -> bool { self.include_content_type }
    pub fn undeclare_prefixes(&self) -> bool { self.undeclare_prefixes }
    pub fn escape_uri_attributes(&self) -> bool { self.escape_uri_attributes }
    pub fn byte_order_mark(&self) -> bool { self.byte_order_mark }
    pub fn standalone(&self) -> Standalone { self.standalone }
    pub fn doctype_public(&self) -> Option<&str> { self.doctype_public.as_deref() }
    pub fn doctype_system(&self) -> Option<&str> { self.doctype_system.as_deref() }
    pub fn media_type(&self) -> Option<&str> { self.media_type.as_deref() }
    pub fn version(&self) -> Option<&str> { self.version.as_deref() }
    pub fn html_version(&self) -> Option<f64> { self.html_version }
    pub fn omit_xml_declaration(&self) -> bool { self.omit_xml_declaration }

    // --- Builder-Setter (Fluent API) ---

    pub fn with_method(mut self, method: OutputMethod) -> Self { self.method = Some(method); self }
    pub fn with_encoding(mut self, encoding: &str) -> Self { self.encoding = encoding.to_owned(); self }
    pub fn with_indent(mut self, indent: bool) -> Self { self.indent = Some(indent); self }
    pub fn with_indent_spaces(mut self, n: usize) -> Self { self.indent_spaces = n; self }
    pub fn with_cdata_section_elements(mut self, names: Vec<QName>) -> Self { self.cdata_section_elements = names; self }
    /// Registriert eine benannte Character-Map und aktiviert sie.
    pub fn with_character_map(mut self, name: &str, map: CharacterMap) -> Self {
        self.character_maps.insert(name.to_owned(), map);
        if !self.use_character_maps.iter().any(|n| n == name) {
            self.use_character_maps.push(name.to_owned());
        }
        self
    }
    pub fn with_include_content_type(mut self, v: bool) -> Self { self.include_content_type = v; self }
    pub fn with_undeclare_prefixes(mut self, v: bool) -> Self { self.undeclare_prefixes = v; self }
    pub fn with_escape_uri_attributes(mut self, v: bool) -> Self { self.escape_uri_attributes = v; self }
    pub fn with_byte_order_mark(mut self, v: bool) -> Self { self.byte_order_mark = v; self }
    pub fn with_standalone(mut self, v: Standalone) -> Self { self.standalone = v; self }
    pub fn with_doctype_public(mut self, v: &str) -> Self { self.doctype_public = Some(v.to_owned()); self }
    pub fn with_doctype_system(mut self, v: &str) -> Self { self.doctype_system = Some(v.to_owned()); self }
    pub fn with_media_type(mut self, v: &str) -> Self { self.media_type = Some(v.to_owned()); self }
    pub fn with_version(mut self, v: &str) -> Self { self.version = Some(v.to_owned()); self }
    pub fn with_html_version(mut self, v: f64) -> Self { self.html_version = Some(v); self }
    pub fn with_omit_xml_declaration(mut self, v: bool) -> Self { self.omit_xml_declaration = v; self }

    // --- Mutable Setter ---

    pub fn set_method(&mut self, method: Option<OutputMethod>) { self.method = method; }
    /// Wird vom Emitter nach einem Encoding-Fallback aufgerufen.
    pub fn set_encoding(&mut self, encoding: &str) { self.encoding = encoding.to_owned(); }

    /// Sets a property from its lexical form as used in `xsl:output` and
    /// serialization parameter documents.
    ///
    /// # Errors
    ///
    /// `Error::InvalidOption` for unknown names and malformed values.
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let invalid = || Error::invalid_option(name, value);
        let v = value.trim();
        match name {
            "method" => self.method = Some(OutputMethod::parse(v)?),
            "encoding" => {
                if v.is_empty() {
                    return Err(invalid());
                }
                self.encoding = v.to_owned();
            }
            "indent" => self.indent = Some(parse_yes_no(v).ok_or_else(invalid)?),
            "indent-spaces" => {
                let n: usize = v.parse().map_err(|_| invalid())?;
                if n > MAX_INDENT_SPACES {
                    return Err(invalid());
                }
                self.indent_spaces = n;
            }
            "cdata-section-elements" => {
                self.cdata_section_elements = v
                    .split_ascii_whitespace()
                    .map(parse_eqname)
                    .collect();
            }
            "use-character-maps" => {
                self.use_character_maps = v.split_ascii_whitespace().map(str::to_owned).collect();
            }
            "include-content-type" => {
                self.include_content_type = parse_yes_no(v).ok_or_else(invalid)?;
            }
            "undeclare-prefixes" => {
                self.undeclare_prefixes = parse_yes_no(v).ok_or_else(invalid)?;
            }
            "escape-uri-attributes" => {
                self.escape_uri_attributes = parse_yes_no(v).ok_or_else(invalid)?;
            }
            "byte-order-mark" => self.byte_order_mark = parse_yes_no(v).ok_or_else(invalid)?,
            "standalone" => {
                self.standalone = match v {
                    "omit" => Standalone::Omit,
                    _ => match parse_yes_no(v).ok_or_else(invalid)? {
                        true => Standalone::Yes,
                        false => Standalone::No,
                    },
                }
            }
            "doctype-public" => self.doctype_public = Some(v.to_owned()),
            "doctype-system" => self.doctype_system = Some(v.to_owned()),
            "media-type" => self.media_type = Some(v.to_owned()),
            "version" => self.version = Some(v.to_owned()),
            "html-version" => {
                let n: f64 = v.parse().map_err(|_| invalid())?;
                if !n.is_finite() || n <= 0.0 {
                    return Err(invalid());
                }
                self.html_version = Some(n);
            }
            "omit-xml-declaration" => {
                self.omit_xml_declaration = parse_yes_no(v).ok_or_else(invalid)?;
            }
            _ => return Err(invalid()),
        }
        Ok(())
    }

    /// Checks combinations that cannot be serialized.
    ///
    /// # Errors
    ///
    /// - `SEPM0009`: `standalone` together with `omit-xml-declaration=yes`
    /// - `SEPM0010`: `undeclare-prefixes=yes` with XML version 1.0
    /// - `InvalidOption` for `indent-spaces` above [`MAX_INDENT_SPACES`]
    /// - `InvalidOption` for a `use-character-maps` entry naming no map
    pub fn validate(&self) -> Result<()> {
        let xml_like = matches!(self.method, None | Some(OutputMethod::Xml | OutputMethod::Xhtml));
        if xml_like && self.omit_xml_declaration && self.standalone != Standalone::Omit {
            return Err(Error::serialization(
                "SEPM0009",
                "standalone cannot be combined with omit-xml-declaration=yes",
            ));
        }
        if xml_like && self.undeclare_prefixes && self.xml_version() == "1.0" {
            return Err(Error::serialization(
                "SEPM0010",
                "undeclare-prefixes=yes requires XML version 1.1",
            ));
        }
        if self.indent_spaces > MAX_INDENT_SPACES {
            return Err(Error::invalid_option("indent-spaces", self.indent_spaces.to_string()));
        }
        if let Some(missing) =
            self.use_character_maps.iter().find(|n| !self.character_maps.contains_key(*n))
        {
            return Err(Error::invalid_option("use-character-maps", missing.clone()));
        }
        Ok(())
    }

    /// XML version for the declaration; `version` only applies to it for the
    /// xml and xhtml methods.
    pub fn xml_version(&self) -> &str {
        match self.method {
            Some(OutputMethod::Html | OutputMethod::Text) => "1.0",
            _ => self.version.as_deref().unwrap_or("1.0"),
        }
    }

    /// HTML version: `html-version`, else `version` for the html method, else 5.
    pub fn effective_html_version(&self) -> f64 {
        if let Some(v) = self.html_version {
            return v;
        }
        if self.method == Some(OutputMethod::Html)
            && let Some(v) = self.version.as_deref().and_then(|v| v.parse::<f64>().ok())
        {
            return v;
        }
        5.0
    }

    /// Explicit `indent`, else yes for html and no otherwise.
    pub fn effective_indent(&self) -> bool {
        self.indent.unwrap_or(matches!(self.method, Some(OutputMethod::Html)))
    }

    pub fn effective_media_type(&self) -> &str {
        if let Some(m) = self.media_type.as_deref() {
            return m;
        }
        match self.method {
            Some(OutputMethod::Html | OutputMethod::Xhtml) => "text/html",
            Some(OutputMethod::Text) => "text/plain",
            _ => "application/xml",
        }
    }

    /// Vereinigung der aktiven Character-Maps; `None` wenn keine aktiv ist.
    pub fn active_character_map(&self) -> Option<CharacterMap> {
        let mut combined = CharacterMap::new();
        for name in &self.use_character_maps {
            if let Some(map) = self.character_maps.get(name) {
                combined.merge(map);
            }
        }
        (!combined.is_empty()).then_some(combined)
    }
}

/// `Q{uri}local`, `{uri}local` or a plain local name.
fn parse_eqname(s: &str) -> QName {
    QName::from_clark(s.strip_prefix('Q').filter(|r| r.starts_with('{')).unwrap_or(s))
}

fn parse_yes_no(v: &str) -> Option<bool> {
    match v {
        "yes" | "true" | "1" => Some(true),
        "no" | "false" | "0" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let p = OutputProperties::default();
        assert_eq!(p.method(), None);
        assert_eq!(p.encoding(), "UTF-8");
        assert_eq!(p.indent_spaces(), 2);
        assert!(p.include_content_type());
        assert!(p.escape_uri_attributes());
        assert!(!p.byte_order_mark());
        assert_eq!(p.standalone(), Standalone::Omit);
        assert_eq!(p.xml_version(), "1.0");
        assert!(p.validate().is_ok());
    }

    #[test]
    fn method_parse() {
        assert_eq!(OutputMethod::parse("xhtml").unwrap(), OutputMethod::Xhtml);
        assert_eq!(
            OutputMethod::parse("Q{urn:m}json").unwrap(),
            OutputMethod::Custom(QName::new("urn:m", "json"))
        );
        let err = OutputMethod::parse("json").unwrap_err();
        assert_eq!(err.code(), Some("SEPM0016"));
    }

    #[test]
    fn set_aus_strings() {
        let mut p = OutputProperties::default();
        p.set("method", "html").unwrap();
        p.set("indent", "no").unwrap();
        p.set("standalone", "yes").unwrap();
        p.set("cdata-section-elements", "script {urn:x}code").unwrap();
        p.set("html-version", "4.01").unwrap();
        assert_eq!(p.method(), Some(&OutputMethod::Html));
        assert_eq!(p.indent(), Some(false));
        assert_eq!(p.standalone(), Standalone::Yes);
        assert_eq!(p.cdata_section_elements()[1], QName::new("urn:x", "code"));
        p.set("cdata-section-elements", "Quote Q{urn:q}x").unwrap();
        assert_eq!(p.cdata_section_elements()[0], QName::local("Quote"));
        assert_eq!(p.cdata_section_elements()[1], QName::new("urn:q", "x"));
        assert_eq!(p.effective_html_version(), 4.01);
    }

    #[test]
    fn set_lehnt_ungueltiges_ab() {
        let mut p = OutputProperties::default();
        assert!(matches!(p.set("indent", "sometimes"), Err(Error::InvalidOption { .. })));
        assert!(p.set("indent-spaces", "-1").is_err());
        assert!(p.set("indent-spaces", &usize::MAX.to_string()).is_err());
        assert!(p.set("indent-spaces", "65").is_err());
        p.set("indent-spaces", "64").unwrap();
        assert_eq!(p.indent_spaces(), 64);
        assert!(p.set("html-version", "0").is_err());
        assert!(p.set("no-such-property", "yes").is_err());
        assert!(p.set("encoding", " ").is_err());
    }

    #[test]
    fn html_default_indent_und_media_type() {
        let html = OutputProperties::default().with_method(OutputMethod::Html);
        assert!(html.effective_indent());
        assert_eq!(html.effective_media_type(), "text/html");
        let xml = OutputProperties::default().with_method(OutputMethod::Xml);
        assert!(!xml.effective_indent());
        assert_eq!(xml.effective_media_type(), "application/xml");
    }

    #[test]
    fn undeclare_prefixes_braucht_xml_11() {
        let p = OutputProperties::default().with_undeclare_prefixes(true);
        assert_eq!(p.validate().unwrap_err().code(), Some("SEPM0010"));
        assert!(p.with_version("1.1").validate().is_ok());
    }

    #[test]
    fn standalone_mit_omit_declaration() {
        let p = OutputProperties::default()
            .with_standalone(Standalone::Yes)
            .with_omit_xml_declaration(true);
        assert_eq!(p.validate().unwrap_err().code(), Some("SEPM0009"));
    }

    #[test]
    fn character_maps_vereinigt() {
        let p = OutputProperties::default()
            .with_character_map("a", CharacterMap::new().with('x', "X").with('y', "Y"))
            .with_character_map("b", CharacterMap::new().with('y', "&#121;"));
        let m = p.active_character_map().unwrap();
        assert_eq!(m.get('x'), Some("X"));
        assert_eq!(m.get('y'), Some("&#121;"));
        assert!(OutputProperties::default().active_character_map().is_none());

        let mut bad = OutputProperties::default();
        bad.set("use-character-maps", "missing").unwrap();
        assert!(matches!(bad.validate(), Err(Error::InvalidOption { .. })));
    }
}
