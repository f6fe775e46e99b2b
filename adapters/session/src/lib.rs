#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Cooperative scheduler that wires the ledger world to the progression systems.
//!
//! A [`Session`] owns the world, the level advancement sequencer and the
//! delivery system. Every inbound call is converted into a [`Command`], applied
//! to the world, and the resulting events are published on the [`EventBus`]
//! and handed to the systems. Commands the systems emit are applied in turn
//! until the batch is quiescent, so each call returns with the world settled.

use std::time::Duration;

use progression_core::{
    Command, Event, GateRegistry, LedgerSnapshot, Level, PayloadKind, Position,
    TargetPositionQuery,
};
use progression_system_advancement::{LevelAdvancementSequencer, SequencerState};
use progression_system_delivery::{Delivery, PoolStats};
use progression_world::{self as world, query, ProgressionLedger, World};
use tracing::{debug, info};

mod bus;
mod config;
mod counters;

pub use bus::{EventBus, Listener, SubscriptionId, Topic};
pub use config::{
    AdvancementSettings, CapacityConfig, ConfigError, DeliverySettings, SessionConfig, ZoneConfig,
};
pub use counters::FixedCounters;

/// Running progression session.
#[derive(Debug)]
pub struct Session {
    world: World,
    sequencer: LevelAdvancementSequencer,
    delivery: Delivery,
    bus: EventBus,
}

impl Session {
    /// Assembles a session with an empty ledger.
    pub fn new(
        config: &SessionConfig,
        gates: Box<dyn GateRegistry>,
        target_query: Box<dyn TargetPositionQuery>,
    ) -> Result<Self, ConfigError> {
        let world = World::new(config.ledger_config()?);
        Self::assemble(world, config, gates, target_query)
    }

    /// Assembles a session whose ledger resumes from `snapshot`.
    pub fn restore(
        config: &SessionConfig,
        snapshot: &LedgerSnapshot,
        gates: Box<dyn GateRegistry>,
        target_query: Box<dyn TargetPositionQuery>,
    ) -> Result<Self, ConfigError> {
        let world = World::from_snapshot(config.ledger_config()?, snapshot);
        Self::assemble(world, config, gates, target_query)
    }

    fn assemble(
        world: World,
        config: &SessionConfig,
        gates: Box<dyn GateRegistry>,
        target_query: Box<dyn TargetPositionQuery>,
    ) -> Result<Self, ConfigError> {
        let delivery = Delivery::new(
            config.delivery_config()?,
            config.pool(),
            config.resolver()?,
            target_query,
        );
        let sequencer = LevelAdvancementSequencer::new(config.advancement_config(), gates);
        let ledger = query::ledger(&world);
        info!(
            level = ledger.level().get(),
            experience = ledger.experience(),
            max_level = ledger.thresholds().max_level().get(),
            "progression session started"
        );

        Ok(Self {
            world,
            sequencer,
            delivery,
            bus: EventBus::new(),
        })
    }

    /// Registers a listener for outbound events on `topics`.
    pub fn subscribe(&mut self, topics: &[Topic], listener: Box<dyn Listener>) -> SubscriptionId {
        self.bus.subscribe(topics, listener)
    }

    /// Removes a listener, reporting whether it was registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Delivers `amount` of `kind` from `source` through delivery agents.
    pub fn request_grant(&mut self, kind: PayloadKind, amount: u32, source: Position) {
        self.pump(vec![Command::RequestGrant {
            kind,
            amount,
            source,
        }]);
    }

    /// Grants experience through staged level advancement.
    pub fn request_level_grant(&mut self, amount: u32) {
        self.pump(vec![Command::RequestLevelGrant { amount }]);
    }

    /// Signals that the gate associated with `level` completed.
    pub fn complete_gate(&mut self, level: Level) {
        self.pump(vec![Command::CompleteGate { level }]);
    }

    /// Moves the actor that receives resource deposits.
    pub fn move_actor(&mut self, position: Position) {
        self.pump(vec![Command::MoveActor { position }]);
    }

    /// Advances the simulation by one frame of `dt`.
    pub fn tick(&mut self, dt: Duration) {
        self.pump(vec![Command::Tick { dt }]);
    }

    /// Resolves all pending work immediately.
    ///
    /// Agents in flight commit their payloads and return to the pool, then the
    /// sequencer applies every remaining level without waiting.
    pub fn teardown(&mut self) {
        let mut commands = Vec::new();
        self.delivery.teardown(&mut commands);
        self.pump(commands);

        let mut commands = Vec::new();
        self.sequencer.flush(&mut commands);
        self.pump(commands);
        debug!(
            level = query::ledger(&self.world).level().get(),
            "session torn down"
        );
    }

    /// Reports whether no advancement or delivery is pending.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.sequencer.is_idle() && self.delivery.in_flight() == 0
    }

    /// Read-only access to the ledger.
    #[must_use]
    pub fn ledger(&self) -> &ProgressionLedger {
        query::ledger(&self.world)
    }

    /// Captures the persisted portion of the ledger.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        query::ledger_snapshot(&self.world)
    }

    /// Current phase of the sequencer.
    #[must_use]
    pub fn sequencer_state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Number of delivery agents in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.delivery.in_flight()
    }

    /// Pool counters for `kind`.
    #[must_use]
    pub fn pool_stats(&self, kind: PayloadKind) -> PoolStats {
        self.delivery.pool().stats(kind)
    }

    /// Drops idle agents beyond `keep` per payload kind.
    pub fn trim_pools(&mut self, keep: usize) -> usize {
        PayloadKind::ALL
            .into_iter()
            .map(|kind| self.delivery.pool_mut().trim(kind, keep))
            .sum()
    }

    /// Position of the actor receiving deposits.
    #[must_use]
    pub fn actor_position(&self) -> Position {
        query::actor_position(&self.world)
    }

    fn pump(&mut self, mut commands: Vec<Command>) {
        let mut events: Vec<Event> = Vec::new();
        while !commands.is_empty() {
            events.clear();
            for command in commands.drain(..) {
                world::apply(&mut self.world, command, &mut events);
            }
            if events.is_empty() {
                break;
            }

            self.bus.publish(&events);
            self.sequencer
                .handle(&events, query::ledger_view(&self.world), &mut commands);
            self.delivery
                .handle(&events, query::actor_position(&self.world), &mut commands);
        }
    }
}
