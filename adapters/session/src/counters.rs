use std::collections::BTreeMap;

use progression_core::{PayloadKind, Position, TargetPositionQuery};

/// Counter positions that never move, for headless sessions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FixedCounters {
    positions: BTreeMap<PayloadKind, Position>,
}

impl FixedCounters {
    /// Creates a query reporting no counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Places the counter for `kind` at `position`.
    #[must_use]
    pub fn with(mut self, kind: PayloadKind, position: Position) -> Self {
        let _ = self.positions.insert(kind, position);
        self
    }
}

impl TargetPositionQuery for FixedCounters {
    fn counter_position(&self, kind: PayloadKind) -> Option<Position> {
        self.positions.get(&kind).copied()
    }
}
