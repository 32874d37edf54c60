//! Source locations.
//!
//! Events carry an opaque [`LocationId`]; a [`LocationProvider`] resolves it to
//! system id, line and column when a diagnostic needs it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Opaque location handle. `LocationId::UNKNOWN` means no location.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct LocationId(pub u32);

impl LocationId {
    pub const UNKNOWN: Self = Self(0);

    pub fn is_known(self) -> bool {
        self != Self::UNKNOWN
    }
}

/// A resolved source location.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Location {
    pub system_id: Option<Rc<str>>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.system_id {
            Some(uri) => write!(f, "{uri}:{}:{}", self.line, self.column),
            None => write!(f, "line {}, column {}", self.line, self.column),
        }
    }
}

/// Resolves location handles.
pub trait LocationProvider {
    fn location(&self, id: LocationId) -> Option<Location>;
}

/// Provider that knows no locations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocations;

impl LocationProvider for NoLocations {
    fn location(&self, _id: LocationId) -> Option<Location> {
        None
    }
}

/// Append-only table of locations, filled by a producer while it drives events.
#[derive(Debug, Default)]
pub struct LocationTable {
    system_id: Option<Rc<str>>,
    entries: RefCell<Vec<(u32, u32)>>,
}

impl LocationTable {
    pub fn new(system_id: Option<&str>) -> Self {
        Self { system_id: system_id.map(Rc::from), entries: RefCell::new(Vec::new()) }
    }

    /// Registriert eine Position und gibt deren Handle zurueck (nie `UNKNOWN`).
    pub fn record(&self, line: u32, column: u32) -> LocationId {
        let mut entries = self.entries.borrow_mut();
        entries.push((line, column));
        LocationId(entries.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl LocationProvider for LocationTable {
    fn location(&self, id: LocationId) -> Option<Location> {
        let idx = (id.0 as usize).checked_sub(1)?;
        let (line, column) = *self.entries.borrow().get(idx)?;
        Some(Location { system_id: self.system_id.clone(), line, column })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_resolves_recorded_positions() {
        let table = LocationTable::new(Some("in.xml"));
        let id = table.record(3, 7);
        assert!(id.is_known());
        let loc = table.location(id).unwrap();
        assert_eq!((loc.line, loc.column), (3, 7));
        assert_eq!(loc.to_string(), "in.xml:3:7");
        assert!(table.location(LocationId::UNKNOWN).is_none());
        assert!(table.location(LocationId(99)).is_none());
    }
}
