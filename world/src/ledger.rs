//! Authoritative progression counters and their derivation rules.

use std::collections::BTreeMap;

use progression_core::{
    LedgerSnapshot, Level, LevelRewards, LevelThresholds, ResourceKind, ResourceSnapshot,
};
use tracing::{debug, warn};

/// Capacity assigned to resources that were not configured explicitly.
pub const DEFAULT_CAPACITY: u32 = 100;

/// Parameters required to construct a ledger.
#[derive(Clone, Debug)]
pub struct LedgerConfig {
    thresholds: LevelThresholds,
    rewards: LevelRewards,
    base_capacities: BTreeMap<ResourceKind, u32>,
}

impl LedgerConfig {
    /// Creates a configuration with no level rewards and default capacities.
    #[must_use]
    pub fn new(thresholds: LevelThresholds) -> Self {
        Self {
            thresholds,
            rewards: LevelRewards::default(),
            base_capacities: BTreeMap::new(),
        }
    }

    /// Replaces the rewards applied on every level-up.
    #[must_use]
    pub fn with_rewards(mut self, rewards: LevelRewards) -> Self {
        self.rewards = rewards;
        self
    }

    /// Overrides the starting capacity of a resource.
    #[must_use]
    pub fn with_capacity(mut self, kind: ResourceKind, capacity: u32) -> Self {
        let _ = self.base_capacities.insert(kind, capacity);
        self
    }

    /// Threshold table the ledger will use.
    #[must_use]
    pub fn thresholds(&self) -> &LevelThresholds {
        &self.thresholds
    }

    fn base_capacity(&self, kind: ResourceKind) -> u32 {
        self.base_capacities
            .get(&kind)
            .copied()
            .unwrap_or(DEFAULT_CAPACITY)
    }
}

/// Reason a level checkpoint was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointRejection {
    /// The requested level is not directly above the current level.
    OutOfSequence {
        /// Level held when the request arrived.
        current: Level,
    },
    /// The requested level exceeds the threshold table.
    BeyondMaxLevel {
        /// Highest level the table supports.
        max: Level,
    },
}

#[derive(Clone, Copy, Debug, Default)]
struct ResourceSlot {
    count: u32,
    capacity: u32,
}

/// Authoritative record of experience, level, and resource counts.
#[derive(Clone, Debug)]
pub struct ProgressionLedger {
    config: LedgerConfig,
    experience: u32,
    level: Level,
    attribute_points: u32,
    resources: [ResourceSlot; 3],
}

impl ProgressionLedger {
    /// Creates an empty ledger at the level implied by zero experience.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        let mut resources = [ResourceSlot::default(); 3];
        for kind in ResourceKind::ALL {
            resources[kind.index()].capacity = config.base_capacity(kind);
        }
        let level = config.thresholds.level_for_experience(0);
        Self {
            config,
            experience: 0,
            level,
            attribute_points: 0,
            resources,
        }
    }

    /// Experience currently held.
    #[must_use]
    pub const fn experience(&self) -> u32 {
        self.experience
    }

    /// Level currently held.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Unspent attribute points.
    #[must_use]
    pub const fn attribute_points(&self) -> u32 {
        self.attribute_points
    }

    /// Threshold table backing the ledger.
    #[must_use]
    pub fn thresholds(&self) -> &LevelThresholds {
        &self.config.thresholds
    }

    /// Amount of a resource currently held.
    #[must_use]
    pub fn count(&self, kind: ResourceKind) -> u32 {
        self.resources[kind.index()].count
    }

    /// Maximum amount of a resource the ledger may hold.
    #[must_use]
    pub fn capacity(&self, kind: ResourceKind) -> u32 {
        self.resources[kind.index()].capacity
    }

    /// Derives the level implied by `experience` using this ledger's table.
    #[must_use]
    pub fn level_for_experience(&self, experience: u32) -> Level {
        self.config.thresholds.level_for_experience(experience)
    }

    /// Fraction of the way from the current threshold to the next one.
    #[must_use]
    pub fn level_progress(&self) -> f32 {
        self.config.thresholds.level_progress(self.experience)
    }

    /// Adds experience without per-level processing.
    ///
    /// Returns `false` when nothing changed. Crossing a threshold this way
    /// re-derives the level without applying any level rewards.
    pub fn add_experience(&mut self, amount: u32) -> bool {
        if amount == 0 {
            return false;
        }

        self.experience = self.experience.saturating_add(amount);
        self.reconcile_level("add_experience");
        true
    }

    fn increase_capacity(&mut self, kind: ResourceKind, delta: u32) -> u32 {
        let slot = &mut self.resources[kind.index()];
        slot.capacity = slot.capacity.saturating_add(delta);
        slot.capacity
    }

    /// Advances exactly one level, pinning experience to the level's threshold.
    ///
    /// Level rewards are applied once. On success the capacities touched by
    /// the rewards are returned alongside their new values.
    pub fn checkpoint_level(
        &mut self,
        level: Level,
    ) -> Result<Vec<(ResourceKind, u32)>, CheckpointRejection> {
        let max = self.config.thresholds.max_level();
        if level > max {
            return Err(CheckpointRejection::BeyondMaxLevel { max });
        }
        if level != self.level.next() {
            return Err(CheckpointRejection::OutOfSequence {
                current: self.level,
            });
        }
        let Some(threshold) = self.config.thresholds.threshold(level) else {
            return Err(CheckpointRejection::BeyondMaxLevel { max });
        };

        self.experience = threshold;
        self.level = level;
        self.attribute_points = self
            .attribute_points
            .saturating_add(self.config.rewards.attribute_points);

        let bumps = self.config.rewards.capacity_bumps.clone();
        let mut raised = Vec::with_capacity(bumps.len());
        for bump in bumps {
            if bump.delta == 0 {
                continue;
            }
            let capacity = self.increase_capacity(bump.kind, bump.delta);
            raised.push((bump.kind, capacity));
        }

        debug!(
            level = level.get(),
            experience = threshold,
            "level checkpoint applied"
        );
        Ok(raised)
    }

    /// Sets experience to an exact value. Returns `false` when nothing changed.
    pub fn set_experience(&mut self, experience: u32) -> bool {
        if self.experience == experience {
            return false;
        }

        self.experience = experience;
        self.reconcile_level("set_experience");
        true
    }

    /// Deposits a resource, clamped to capacity, returning the amount applied.
    pub fn deposit(&mut self, kind: ResourceKind, amount: u32) -> u32 {
        let slot = &mut self.resources[kind.index()];
        let room = slot.capacity.saturating_sub(slot.count);
        let applied = amount.min(room);
        slot.count += applied;
        if applied < amount {
            warn!(
                ?kind,
                requested = amount,
                applied,
                capacity = slot.capacity,
                "resource deposit clamped to capacity"
            );
        }
        applied
    }

    /// Captures the persisted portion of the ledger.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            experience: self.experience,
            level: self.level,
            attribute_points: self.attribute_points,
            resources: ResourceKind::ALL
                .iter()
                .map(|kind| {
                    let slot = self.resources[kind.index()];
                    ResourceSnapshot {
                        kind: *kind,
                        count: slot.count,
                        capacity: slot.capacity,
                    }
                })
                .collect(),
        }
    }

    /// Restores persisted state, clamping anything inconsistent.
    pub fn restore(&mut self, snapshot: &LedgerSnapshot) {
        self.experience = snapshot.experience;
        self.level = snapshot.level;
        self.attribute_points = snapshot.attribute_points;
        self.reconcile_level("restore");

        for resource in &snapshot.resources {
            let base = self.config.base_capacity(resource.kind);
            let slot = &mut self.resources[resource.kind.index()];
            slot.capacity = resource.capacity.max(base);
            slot.count = resource.count.min(slot.capacity);
        }
    }

    fn reconcile_level(&mut self, origin: &'static str) {
        let derived = self.config.thresholds.level_for_experience(self.experience);
        if derived != self.level {
            warn!(
                origin,
                held = self.level.get(),
                derived = derived.get(),
                experience = self.experience,
                "ledger level disagreed with experience; clamping to derived level"
            );
            self.level = derived;
        }
    }
}
