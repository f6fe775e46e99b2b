#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the progression pipeline.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative ledger world, and pure systems. Adapters submit [`Command`]
//! values describing desired mutations, the world executes those commands via
//! its `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! views, and respond exclusively with new command batches.

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod thresholds;

pub use thresholds::{LevelThresholds, ThresholdError};

/// Commands that express all permissible ledger mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Requests that a resource grant be delivered through delivery agents.
    RequestGrant {
        /// Payload carried by the grant.
        kind: PayloadKind,
        /// Total amount to deliver.
        amount: u32,
        /// World position the reward originates from.
        source: Position,
    },
    /// Requests that experience be granted through staged level advancement.
    RequestLevelGrant {
        /// Experience to grant.
        amount: u32,
    },
    /// Signals that the external gate associated with a level has completed.
    CompleteGate {
        /// Level whose gate finished.
        level: Level,
    },
    /// Moves the actor that receives deposits.
    MoveActor {
        /// New world position of the actor.
        position: Position,
    },
    /// Adds experience directly, bypassing per-level processing.
    AddExperience {
        /// Experience to add.
        amount: u32,
    },
    /// Raises the ledger to the provided level and pins experience to its threshold.
    CheckpointLevel {
        /// Level to advance to. Must be exactly one above the current level.
        level: Level,
    },
    /// Sets the ledger experience to an exact value.
    SetExperience {
        /// Experience value the ledger should hold.
        experience: u32,
    },
    /// Applies the payload carried by a delivery agent to the ledger.
    CommitPayload {
        /// Agent carrying the payload.
        agent: AgentId,
        /// Payload being committed.
        kind: PayloadKind,
        /// Amount carried by the agent.
        amount: u32,
    },
    /// Reports that a delivery pool had to synthesize a new agent.
    ReportPoolGrowth {
        /// Payload kind whose pool grew.
        kind: PayloadKind,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Announces a validated resource grant awaiting delivery.
    GrantRequested {
        /// Payload carried by the grant.
        kind: PayloadKind,
        /// Total amount to deliver.
        amount: u32,
        /// World position the reward originates from.
        source: Position,
    },
    /// Announces a validated experience grant awaiting staged advancement.
    LevelGrantRequested {
        /// Experience to grant.
        amount: u32,
    },
    /// Reports the ledger's new experience value.
    ExperienceChanged {
        /// Experience held by the ledger after the change.
        experience: u32,
    },
    /// Announces that the ledger reached a new level.
    LevelUp {
        /// Level that was reached.
        level: Level,
    },
    /// Reports that a resource capacity increased.
    CapacityIncreased {
        /// Resource whose capacity grew.
        kind: ResourceKind,
        /// Capacity after the increase.
        capacity: u32,
    },
    /// Reports that a level checkpoint request was rejected by the ledger.
    LevelCheckpointRejected {
        /// Level that was requested.
        level: Level,
    },
    /// Confirms that the gate associated with a level completed.
    GateCompleted {
        /// Level whose gate finished.
        level: Level,
    },
    /// Confirms that a payload was applied to the ledger.
    PayloadCommitted {
        /// Payload that was applied.
        kind: PayloadKind,
        /// Amount that was applied.
        amount: u32,
    },
    /// Warns that a delivery pool was empty and had to grow.
    PoolGrowthWarning {
        /// Payload kind whose pool grew.
        kind: PayloadKind,
    },
    /// Confirms that the actor moved.
    ActorMoved {
        /// New world position of the actor.
        position: Position,
    },
}

/// Kinds of payload a delivery agent may carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PayloadKind {
    /// Experience that feeds level advancement.
    Experience,
    /// Currency.
    Coin,
    /// Chitin resource.
    Chitin,
    /// Crumb resource.
    Crumb,
}

impl PayloadKind {
    /// Every payload kind in declaration order.
    pub const ALL: [PayloadKind; 4] = [Self::Experience, Self::Coin, Self::Chitin, Self::Crumb];

    /// Returns the ledger resource backing this payload, if it is not experience.
    #[must_use]
    pub const fn resource(self) -> Option<ResourceKind> {
        match self {
            Self::Experience => None,
            Self::Coin => Some(ResourceKind::Coin),
            Self::Chitin => Some(ResourceKind::Chitin),
            Self::Crumb => Some(ResourceKind::Crumb),
        }
    }
}

/// Countable resources tracked by the ledger alongside experience.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Currency.
    Coin,
    /// Chitin resource.
    Chitin,
    /// Crumb resource.
    Crumb,
}

impl ResourceKind {
    /// Every resource kind in declaration order.
    pub const ALL: [ResourceKind; 3] = [Self::Coin, Self::Chitin, Self::Crumb];

    /// Returns the payload kind delivering this resource.
    #[must_use]
    pub const fn payload(self) -> PayloadKind {
        match self {
            Self::Coin => PayloadKind::Coin,
            Self::Chitin => PayloadKind::Chitin,
            Self::Crumb => PayloadKind::Crumb,
        }
    }

    /// Index of the resource inside dense per-resource tables.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Coin => 0,
            Self::Chitin => 1,
            Self::Crumb => 2,
        }
    }
}

/// One-based progression level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Level(u32);

impl Level {
    /// Lowest level a ledger can hold.
    pub const FIRST: Level = Level(1);

    /// Creates a new level wrapper.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric level.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }

    /// Level directly above this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Unique identifier assigned to a delivery agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Unique identifier assigned to a deposit zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(u32);

impl ZoneId {
    /// Creates a new zone identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Point in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    x: f32,
    y: f32,
}

impl Position {
    /// Creates a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Horizontal coordinate.
    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    /// Vertical coordinate.
    #[must_use]
    pub const fn y(&self) -> f32 {
        self.y
    }
}

/// Axis-aligned rectangle in world space.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneBounds {
    min: Position,
    max: Position,
}

impl ZoneBounds {
    /// Creates bounds spanning the two corners, normalising their order.
    #[must_use]
    pub fn from_corners(a: Position, b: Position) -> Self {
        Self {
            min: Position::new(a.x().min(b.x()), a.y().min(b.y())),
            max: Position::new(a.x().max(b.x()), a.y().max(b.y())),
        }
    }

    /// Lower corner of the bounds.
    #[must_use]
    pub const fn min(&self) -> Position {
        self.min
    }

    /// Upper corner of the bounds.
    #[must_use]
    pub const fn max(&self) -> Position {
        self.max
    }

    /// Reports whether the point lies inside the bounds, edges included.
    #[must_use]
    pub fn contains(&self, point: Position) -> bool {
        point.x() >= self.min.x()
            && point.x() <= self.max.x()
            && point.y() >= self.min.y()
            && point.y() <= self.max.y()
    }

    /// Center of the bounds.
    #[must_use]
    pub fn center(&self) -> Position {
        Position::new(
            (self.min.x() + self.max.x()) * 0.5,
            (self.min.y() + self.max.y()) * 0.5,
        )
    }
}

/// Deposit zone an actor may stand in when rewards are delivered.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositZone {
    /// Identifier of the zone.
    pub id: ZoneId,
    /// Region covered by the zone.
    pub bounds: ZoneBounds,
    /// Point agents fly toward when depositing into the zone.
    pub drop_point: Position,
}

/// Capacity raise applied as part of a level-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityBump {
    /// Resource whose capacity grows.
    pub kind: ResourceKind,
    /// Amount the capacity grows by.
    pub delta: u32,
}

/// Rewards applied exactly once every time the ledger reaches a new level.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRewards {
    /// Attribute points granted per level.
    #[serde(default)]
    pub attribute_points: u32,
    /// Capacity raises granted per level.
    #[serde(default)]
    pub capacity_bumps: Vec<CapacityBump>,
}

/// Persisted count and capacity of a single resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource described by the snapshot.
    pub kind: ResourceKind,
    /// Amount currently held.
    pub count: u32,
    /// Maximum amount the ledger may hold.
    pub capacity: u32,
}

/// Persisted ledger state exchanged with the external save collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Accumulated experience.
    pub experience: u32,
    /// Level held by the ledger.
    pub level: Level,
    /// Unspent attribute points.
    pub attribute_points: u32,
    /// Resource counts and capacities.
    pub resources: Vec<ResourceSnapshot>,
}

/// Read-only view into the progression ledger.
#[derive(Clone, Copy, Debug)]
pub struct LedgerView<'a> {
    experience: u32,
    level: Level,
    thresholds: &'a LevelThresholds,
}

impl<'a> LedgerView<'a> {
    /// Captures a new ledger view.
    #[must_use]
    pub fn new(experience: u32, level: Level, thresholds: &'a LevelThresholds) -> Self {
        Self {
            experience,
            level,
            thresholds,
        }
    }

    /// Experience currently held by the ledger.
    #[must_use]
    pub const fn experience(&self) -> u32 {
        self.experience
    }

    /// Level currently held by the ledger.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Threshold table backing the ledger.
    #[must_use]
    pub const fn thresholds(&self) -> &'a LevelThresholds {
        self.thresholds
    }
}

/// Narrow query surface owned by the collaborator that runs level gates.
pub trait GateRegistry {
    /// Reports whether reaching `level` starts a gate that must complete first.
    fn has_gate_at_level(&self, level: Level) -> bool;
}

/// Fixed set of gated levels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GateSchedule {
    levels: std::collections::BTreeSet<Level>,
}

impl GateSchedule {
    /// Creates a schedule gating the provided levels.
    #[must_use]
    pub fn new(levels: impl IntoIterator<Item = Level>) -> Self {
        Self {
            levels: levels.into_iter().collect(),
        }
    }
}

impl GateRegistry for GateSchedule {
    fn has_gate_at_level(&self, level: Level) -> bool {
        self.levels.contains(&level)
    }
}

/// Supplies the current coordinates of on-screen counters.
pub trait TargetPositionQuery {
    /// Position of the counter displaying `kind`, if one is currently laid out.
    fn counter_position(&self, kind: PayloadKind) -> Option<Position>;
}
