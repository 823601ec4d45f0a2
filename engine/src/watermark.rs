//! Per-table pull cursors.

use crate::{EntityKind, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// High-water `updated_at` of the changes already pulled, per entity kind.
///
/// Advances monotonically; a rewind happens only through an explicit
/// reset (full re-sync). Uses a `BTreeMap` for deterministic
/// serialization, as persisted state should diff cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermarks {
    marks: BTreeMap<EntityKind, Timestamp>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cursor for a kind, `None` before the first successful pull.
    pub fn get(&self, kind: EntityKind) -> Option<Timestamp> {
        self.marks.get(&kind).copied()
    }

    /// Move the cursor forward. Returns whether it actually moved;
    /// attempts to move backwards are ignored.
    pub fn advance(&mut self, kind: EntityKind, timestamp: Timestamp) -> bool {
        match self.marks.get(&kind) {
            Some(&current) if current >= timestamp => false,
            _ => {
                self.marks.insert(kind, timestamp);
                true
            }
        }
    }

    /// Forget one kind's cursor, forcing a full re-pull of that table.
    pub fn reset(&mut self, kind: EntityKind) {
        self.marks.remove(&kind);
    }

    /// Forget every cursor (full re-sync).
    pub fn reset_all(&mut self) {
        self.marks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let marks = Watermarks::new();
        assert_eq!(marks.get(EntityKind::Product), None);
    }

    #[test]
    fn advances_forward_only() {
        let mut marks = Watermarks::new();
        assert!(marks.advance(EntityKind::Product, 1_000));
        assert!(marks.advance(EntityKind::Product, 2_000));
        assert!(!marks.advance(EntityKind::Product, 1_500));
        assert!(!marks.advance(EntityKind::Product, 2_000));
        assert_eq!(marks.get(EntityKind::Product), Some(2_000));
    }

    #[test]
    fn kinds_are_independent() {
        let mut marks = Watermarks::new();
        marks.advance(EntityKind::Product, 1_000);
        marks.advance(EntityKind::Sale, 9_000);
        assert_eq!(marks.get(EntityKind::Product), Some(1_000));
        assert_eq!(marks.get(EntityKind::Sale), Some(9_000));
        assert_eq!(marks.get(EntityKind::StockMovement), None);
    }

    #[test]
    fn reset_rewinds() {
        let mut marks = Watermarks::new();
        marks.advance(EntityKind::Product, 1_000);
        marks.reset(EntityKind::Product);
        assert_eq!(marks.get(EntityKind::Product), None);

        marks.advance(EntityKind::Product, 1_000);
        marks.advance(EntityKind::Sale, 2_000);
        marks.reset_all();
        assert_eq!(marks.get(EntityKind::Product), None);
        assert_eq!(marks.get(EntityKind::Sale), None);
    }

    #[test]
    fn serialization_roundtrip() {
        let mut marks = Watermarks::new();
        marks.advance(EntityKind::Product, 1_000);
        marks.advance(EntityKind::StockMovement, 3_000);

        let json = serde_json::to_string(&marks).unwrap();
        let parsed: Watermarks = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, marks);
    }
}
