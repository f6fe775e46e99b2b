#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that resolves the deposit zone serving an actor position.

use progression_core::{DepositZone, Position, ZoneId};
use tracing::debug;

/// Outcome of a deposit target resolution.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedTarget {
    /// Zone that receives the deposit.
    pub zone: ZoneId,
    /// Point agents fly toward.
    pub drop_point: Position,
}

/// Spatial containment query over a fixed set of deposit zones.
#[derive(Clone, Debug, Default)]
pub struct TargetResolver {
    zones: Vec<DepositZone>,
    default_zone: Option<ZoneId>,
}

impl TargetResolver {
    /// Creates a resolver over `zones`, falling back to `default_zone`.
    ///
    /// Zones are stored in ascending identifier order so overlapping zones
    /// resolve deterministically.
    #[must_use]
    pub fn new(mut zones: Vec<DepositZone>, default_zone: Option<ZoneId>) -> Self {
        zones.sort_by_key(|zone| zone.id);
        zones.dedup_by_key(|zone| zone.id);
        Self {
            zones,
            default_zone,
        }
    }

    /// Resolves the zone serving `actor`.
    ///
    /// The first zone containing the actor wins. Otherwise the configured
    /// default zone is used, then the lowest zone identifier. `None` is only
    /// returned when no zones exist.
    #[must_use]
    pub fn resolve(&self, actor: Position) -> Option<ResolvedTarget> {
        if let Some(zone) = self.zones.iter().find(|zone| zone.bounds.contains(actor)) {
            return Some(target_of(zone));
        }

        let fallback = self
            .default_zone
            .and_then(|id| self.zone(id))
            .or_else(|| self.zones.first())?;
        debug!(
            zone = fallback.id.get(),
            x = actor.x(),
            y = actor.y(),
            "actor outside every deposit zone; using fallback zone"
        );
        Some(target_of(fallback))
    }

    /// Zones known to the resolver in ascending identifier order.
    #[must_use]
    pub fn zones(&self) -> &[DepositZone] {
        &self.zones
    }

    fn zone(&self, id: ZoneId) -> Option<&DepositZone> {
        self.zones
            .binary_search_by_key(&id, |zone| zone.id)
            .ok()
            .map(|index| &self.zones[index])
    }
}

fn target_of(zone: &DepositZone) -> ResolvedTarget {
    ResolvedTarget {
        zone: zone.id,
        drop_point: zone.drop_point,
    }
}
