//! Qualified names and the shared name table.
//!
//! A [`QName`] carries prefix, namespace URI and local part as shared `Rc<str>`.
//! Two names compare equal when all three parts match; use
//! [`QName::same_expanded_name`] to ignore the prefix.
//!
//! ## Interning
//!
//! The [`NameTable`] maps strings to [`Sym`] indices and names to
//! [`NameCode`] / [`ExpandedName`]. These are `Copy` types (u32 indices only),
//! so namespace scopes and name sets compare integers instead of strings.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::FastHashMap;

/// Namespace URI bound to the `xml` prefix.
pub const NS_XML: &str = "http://www.w3.org/XML/1998/namespace";
/// XHTML namespace URI.
pub const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";

/// Index in den [`NameTable`]. `Copy`-Type, kein Heap.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sym(pub(crate) u32);

impl fmt::Debug for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

/// Identity of a name ignoring its prefix: URI + local part.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ExpandedName {
    pub uri: Sym,
    pub local: Sym,
}

/// Fully interned name including the prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NameCode {
    pub prefix: Sym,
    pub uri: Sym,
    pub local: Sym,
}

impl NameCode {
    /// Die Identitaet ohne Prefix.
    pub fn expanded(&self) -> ExpandedName {
        ExpandedName { uri: self.uri, local: self.local }
    }
}

const INTERN_CACHE_SLOTS: usize = 32;

/// Zentraler String-Pool fuer Namen, Prefixe und Namespace-URIs.
///
/// Jeder String liegt einmalig als `Rc<str>` vor; `strings` (Index→String) und
/// `lookup` (String→Index) teilen sich dieselbe Allokation. Ein Direct-Mapped
/// Cache vermeidet HashMap-Lookups fuer wiederkehrende Strings.
///
/// `Sym(0)` ist immer der leere String.
#[derive(Clone)]
pub struct NameTable {
    strings: Vec<Rc<str>>,
    lookup: FastHashMap<Rc<str>, u32>,
    cache: [(u64, Sym); INTERN_CACHE_SLOTS],
}

impl NameTable {
    /// The symbol of the empty string (no prefix / no namespace).
    pub const EMPTY: Sym = Sym(0);

    /// Erstellt eine neue Tabelle, vorbelegt mit "", "xml" und dem XML-Namespace.
    pub fn new() -> Self {
        let mut table = Self {
            strings: Vec::new(),
            lookup: FastHashMap::default(),
            cache: [(0, Sym(u32::MAX)); INTERN_CACHE_SLOTS],
        };
        table.intern("");
        table.intern("xml");
        table.intern(NS_XML);
        table
    }

    fn hash_str(s: &str) -> u64 {
        let mut hasher = ahash::AHasher::default();
        s.hash(&mut hasher);
        hasher.finish()
    }

    /// Interns a string and returns its symbol.
    pub fn intern(&mut self, s: &str) -> Sym {
        let hash = Self::hash_str(s);
        let slot = hash as usize % INTERN_CACHE_SLOTS;
        let (cached_hash, cached_id) = self.cache[slot];
        if cached_hash == hash
            && cached_id.0 != u32::MAX
            && self.strings.get(cached_id.0 as usize).is_some_and(|v| &**v == s)
        {
            return cached_id;
        }

        if let Some(&idx) = self.lookup.get(s) {
            let id = Sym(idx);
            self.cache[slot] = (hash, id);
            return id;
        }
        // Mehr als u32::MAX verschiedene Strings sind in einem Durchlauf nicht erreichbar.
        let idx = self.strings.len() as u32;
        let rc: Rc<str> = Rc::from(s);
        self.strings.push(Rc::clone(&rc));
        self.lookup.insert(rc, idx);
        let id = Sym(idx);
        self.cache[slot] = (hash, id);
        id
    }

    /// Looks a string up without interning it.
    pub fn lookup(&self, s: &str) -> Option<Sym> {
        self.lookup.get(s).map(|&idx| Sym(idx))
    }

    /// Loest ein Symbol zu `&str` auf.
    #[inline]
    pub fn resolve(&self, id: Sym) -> &str {
        &self.strings[id.0 as usize]
    }

    /// Gibt den internierten `Rc<str>` zurueck (nur Refcount-Inkrement).
    #[inline]
    pub fn resolve_rc(&self, id: Sym) -> Rc<str> {
        Rc::clone(&self.strings[id.0 as usize])
    }

    /// Number of interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether only the predefined strings are present.
    pub fn is_empty(&self) -> bool {
        self.strings.len() <= 3
    }

    /// Interns all three parts of a name.
    pub fn intern_name(&mut self, name: &QName) -> NameCode {
        NameCode {
            prefix: self.intern(&name.prefix),
            uri: self.intern(&name.uri),
            local: self.intern(&name.local),
        }
    }

    /// Interns URI and local part only.
    pub fn intern_expanded(&mut self, uri: &str, local: &str) -> ExpandedName {
        ExpandedName { uri: self.intern(uri), local: self.intern(local) }
    }

    /// Expanded name of `name` if both parts are already known.
    ///
    /// A name whose parts were never interned cannot be a member of any
    /// interned name set, so callers can treat `None` as "not found".
    pub fn lookup_expanded(&self, name: &QName) -> Option<ExpandedName> {
        Some(ExpandedName { uri: self.lookup(&name.uri)?, local: self.lookup(&name.local)? })
    }

    /// Baut einen QName aus einem NameCode (teilt die `Rc<str>` der Tabelle).
    pub fn to_qname(&self, code: NameCode) -> QName {
        QName {
            prefix: self.resolve_rc(code.prefix),
            uri: self.resolve_rc(code.uri),
            local: self.resolve_rc(code.local),
        }
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NameTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NameTable({} strings)", self.strings.len())
    }
}

/// A qualified name: prefix, namespace URI and local part.
///
/// An empty prefix means the default namespace (or none); an empty URI means
/// no namespace.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct QName {
    pub prefix: Rc<str>,
    pub uri: Rc<str>,
    pub local: Rc<str>,
}

impl fmt::Debug for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QName({})", self.clark())?;
        if !self.prefix.is_empty() {
            write!(f, "[{}]", self.prefix)?;
        }
        Ok(())
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{}:{}", self.prefix, self.local)
        }
    }
}

impl QName {
    /// Name ohne Prefix.
    pub fn new(uri: &str, local: &str) -> Self {
        Self { prefix: Rc::from(""), uri: Rc::from(uri), local: Rc::from(local) }
    }

    /// Name in keinem Namespace.
    pub fn local(local: &str) -> Self {
        Self::new("", local)
    }

    /// Name mit Prefix.
    pub fn with_prefix(uri: &str, local: &str, prefix: &str) -> Self {
        Self { prefix: Rc::from(prefix), uri: Rc::from(uri), local: Rc::from(local) }
    }

    /// `xml:<local>` in the XML namespace.
    pub fn xml(local: &str) -> Self {
        Self::with_prefix(NS_XML, local, "xml")
    }

    /// Parses Clark notation `{uri}local` or a plain local name.
    pub fn from_clark(s: &str) -> Self {
        if let Some(rest) = s.strip_prefix('{')
            && let Some(close) = rest.find('}')
        {
            return Self::new(&rest[..close], &rest[close + 1..]);
        }
        Self::local(s)
    }

    /// Clark notation `{uri}local` (just `local` without namespace).
    pub fn clark(&self) -> String {
        if self.uri.is_empty() {
            self.local.to_string()
        } else {
            format!("{{{}}}{}", self.uri, self.local)
        }
    }

    /// Lexical form `prefix:local`.
    pub fn display_name(&self) -> String {
        self.to_string()
    }

    /// Vergleicht nur URI und local part.
    pub fn same_expanded_name(&self, other: &QName) -> bool {
        self.uri == other.uri && self.local == other.local
    }

    pub fn is_in_no_namespace(&self) -> bool {
        self.uri.is_empty()
    }

    /// `xml:space`?
    pub fn is_xml_space(&self) -> bool {
        &*self.uri == NS_XML && &*self.local == "space"
    }
}

/// Splits a lexical QName `p:local` into (prefix, local).
pub fn split_lexical(name: &str) -> (&str, &str) {
    match name.find(':') {
        Some(pos) => (&name[..pos], &name[pos + 1..]),
        None => ("", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strukturelle_gleichheit_mit_prefix() {
        let a = QName::with_prefix("http://a", "x", "p");
        let b = QName::with_prefix("http://a", "x", "p");
        let c = QName::with_prefix("http://a", "x", "q");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.same_expanded_name(&c));
    }

    #[test]
    fn display_und_clark() {
        let q = QName::with_prefix("http://a", "x", "p");
        assert_eq!(q.to_string(), "p:x");
        assert_eq!(q.clark(), "{http://a}x");
        assert_eq!(QName::local("y").to_string(), "y");
        assert_eq!(QName::from_clark("{http://a}x"), QName::new("http://a", "x"));
        assert_eq!(QName::from_clark("plain"), QName::local("plain"));
    }

    #[test]
    fn intern_dedupliziert() {
        let mut table = NameTable::new();
        let a = table.intern("http://example.org");
        let b = table.intern("http://example.org");
        assert_eq!(a, b);
        assert_eq!(table.resolve(a), "http://example.org");
        assert_eq!(table.intern(""), NameTable::EMPTY);
    }

    #[test]
    fn lookup_ohne_intern() {
        let mut table = NameTable::new();
        assert!(table.lookup("nope").is_none());
        let q = QName::new("urn:x", "item");
        assert!(table.lookup_expanded(&q).is_none());
        let code = table.intern_name(&q);
        assert_eq!(table.lookup_expanded(&q), Some(code.expanded()));
        assert_eq!(table.to_qname(code), q);
    }

    #[test]
    fn split_lexical_name() {
        assert_eq!(split_lexical("a:b"), ("a", "b"));
        assert_eq!(split_lexical("b"), ("", "b"));
    }
}
