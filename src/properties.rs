//! Bit-significant property flags attached to events.
//!
//! Downstream stages read these to modulate behaviour (escaping, namespace
//! handling, ID markers, ...). The set is extensible: unknown bits pass through
//! every stage untouched.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of property flags on one event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Properties(u32);

impl Properties {
    pub const NONE: Self = Self(0);
    /// Text/attribute content is written without escaping.
    pub const DISABLE_ESCAPING: Self = Self(1 << 0);
    /// Character maps are not applied to this content.
    pub const DISABLE_CHARACTER_MAPS: Self = Self(1 << 1);
    /// Content is known to contain no character needing escaping.
    pub const NO_SPECIAL_CHARS: Self = Self(1 << 2);
    /// Attribute was supplied from a default in the schema/DTD.
    pub const DEFAULTED_ATTRIBUTE: Self = Self(1 << 3);
    /// Element has `xsi:nil="true"`.
    pub const NILLED_ELEMENT: Self = Self(1 << 4);
    /// Conflicting namespace declarations on one element are an error.
    pub const REJECT_DUPLICATES: Self = Self(1 << 5);
    /// The caller guarantees the element/attribute name is already in scope.
    pub const NAMESPACE_OK: Self = Self(1 << 6);
    /// Children of this element do not inherit its namespaces.
    pub const DISINHERIT_NAMESPACES: Self = Self(1 << 7);
    /// Content uses null markers for disabled escaping.
    pub const USE_NULL_MARKERS: Self = Self(1 << 8);
    /// Element is declared nillable.
    pub const NILLABLE_ELEMENT: Self = Self(1 << 9);
    /// Text event holds a complete text node.
    pub const WHOLE_TEXT_NODE: Self = Self(1 << 10);
    /// Attribute/element carries the ID property.
    pub const IS_ID: Self = Self(1 << 11);
    /// Attribute/element carries the IDREF property.
    pub const IS_IDREF: Self = Self(1 << 12);
    /// ID/IDREF flags have already been computed.
    pub const ID_IDREF_CHECKED: Self = Self(1 << 13);
    /// Terminates a message (message-termination marker).
    pub const TERMINATE: Self = Self(1 << 14);

    const NAMES: [(Self, &'static str); 15] = [
        (Self::DISABLE_ESCAPING, "disable-escaping"),
        (Self::DISABLE_CHARACTER_MAPS, "disable-character-maps"),
        (Self::NO_SPECIAL_CHARS, "no-special-characters"),
        (Self::DEFAULTED_ATTRIBUTE, "defaulted-attribute"),
        (Self::NILLED_ELEMENT, "nilled-element"),
        (Self::REJECT_DUPLICATES, "reject-duplicates"),
        (Self::NAMESPACE_OK, "namespace-ok"),
        (Self::DISINHERIT_NAMESPACES, "disinherit-namespaces"),
        (Self::USE_NULL_MARKERS, "use-null-markers"),
        (Self::NILLABLE_ELEMENT, "nillable-element"),
        (Self::WHOLE_TEXT_NODE, "whole-text-node"),
        (Self::IS_ID, "is-id"),
        (Self::IS_IDREF, "is-idref"),
        (Self::ID_IDREF_CHECKED, "id-idref-checked"),
        (Self::TERMINATE, "terminate"),
    ];

    /// Raw bit value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Alle Bits aus `other` gesetzt?
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for Properties {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Properties {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Properties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        let mut rest = self.0;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                set.entry(&name);
                rest &= !flag.0;
            }
        }
        if rest != 0 {
            set.entry(&format_args!("{rest:#x}"));
        }
        set.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kombinieren_und_pruefen() {
        let p = Properties::DISABLE_ESCAPING | Properties::IS_ID;
        assert!(p.contains(Properties::IS_ID));
        assert!(!p.contains(Properties::IS_IDREF));
        assert!(!p.without(Properties::IS_ID).contains(Properties::IS_ID));
        assert!(Properties::NONE.is_empty());
    }

    #[test]
    fn unbekannte_bits_bleiben_erhalten() {
        let p = Properties::from_bits(1 << 20).with(Properties::TERMINATE);
        assert_eq!(p.bits(), (1 << 20) | (1 << 14));
        assert!(format!("{p:?}").contains("terminate"));
    }
}
