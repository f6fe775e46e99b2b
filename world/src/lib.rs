#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative progression state.
//!
//! The world owns the [`ProgressionLedger`] and the position of the actor that
//! receives deposits. Every mutation arrives as a [`Command`] through [`apply`],
//! which validates it, updates the ledger, and reports the outcome as
//! [`Event`] values.

use progression_core::{Command, Event, LedgerSnapshot, PayloadKind, Position};
use tracing::{debug, warn};

mod ledger;

pub use ledger::{CheckpointRejection, LedgerConfig, ProgressionLedger, DEFAULT_CAPACITY};

/// Represents the authoritative progression world state.
#[derive(Debug)]
pub struct World {
    ledger: ProgressionLedger,
    actor: Position,
    tick_index: u64,
}

impl World {
    /// Creates a world with an empty ledger and the actor at the origin.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            ledger: ProgressionLedger::new(config),
            actor: Position::default(),
            tick_index: 0,
        }
    }

    /// Creates a world whose ledger is restored from persisted state.
    #[must_use]
    pub fn from_snapshot(config: LedgerConfig, snapshot: &LedgerSnapshot) -> Self {
        let mut world = Self::new(config);
        world.ledger.restore(snapshot);
        world
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => {
            world.tick_index = world.tick_index.saturating_add(1);
            out_events.push(Event::TimeAdvanced { dt });
        }
        Command::RequestGrant {
            kind,
            amount,
            source,
        } => {
            if amount == 0 {
                debug!(?kind, "ignoring empty grant request");
                return;
            }
            out_events.push(Event::GrantRequested {
                kind,
                amount,
                source,
            });
        }
        Command::RequestLevelGrant { amount } => {
            if amount == 0 {
                debug!("ignoring empty level grant request");
                return;
            }
            out_events.push(Event::LevelGrantRequested { amount });
        }
        Command::CompleteGate { level } => {
            out_events.push(Event::GateCompleted { level });
        }
        Command::MoveActor { position } => {
            world.actor = position;
            out_events.push(Event::ActorMoved { position });
        }
        Command::AddExperience { amount } => {
            if world.ledger.add_experience(amount) {
                out_events.push(Event::ExperienceChanged {
                    experience: world.ledger.experience(),
                });
            }
        }
        Command::CheckpointLevel { level } => match world.ledger.checkpoint_level(level) {
            Ok(raised) => {
                out_events.push(Event::ExperienceChanged {
                    experience: world.ledger.experience(),
                });
                for (kind, capacity) in raised {
                    out_events.push(Event::CapacityIncreased { kind, capacity });
                }
                out_events.push(Event::LevelUp { level });
            }
            Err(rejection) => {
                warn!(
                    level = level.get(),
                    ?rejection,
                    "rejected out-of-range level checkpoint"
                );
                out_events.push(Event::LevelCheckpointRejected { level });
            }
        },
        Command::SetExperience { experience } => {
            if world.ledger.set_experience(experience) {
                out_events.push(Event::ExperienceChanged { experience });
            }
        }
        Command::CommitPayload {
            agent,
            kind,
            amount,
        } => {
            if amount == 0 {
                return;
            }
            match kind.resource() {
                None => {
                    debug!(agent = agent.get(), amount, "experience payload committed");
                    out_events.push(Event::PayloadCommitted {
                        kind: PayloadKind::Experience,
                        amount,
                    });
                    out_events.push(Event::LevelGrantRequested { amount });
                }
                Some(resource) => {
                    let applied = world.ledger.deposit(resource, amount);
                    debug!(agent = agent.get(), ?kind, applied, "resource payload committed");
                    if applied > 0 {
                        out_events.push(Event::PayloadCommitted {
                            kind,
                            amount: applied,
                        });
                    }
                }
            }
        }
        Command::ReportPoolGrowth { kind } => {
            out_events.push(Event::PoolGrowthWarning { kind });
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use progression_core::{LedgerSnapshot, LedgerView, Position};

    use super::{ProgressionLedger, World};

    /// Captures a read-only view of the ledger counters used by systems.
    #[must_use]
    pub fn ledger_view(world: &World) -> LedgerView<'_> {
        LedgerView::new(
            world.ledger.experience(),
            world.ledger.level(),
            world.ledger.thresholds(),
        )
    }

    /// Provides read-only access to the full ledger.
    #[must_use]
    pub fn ledger(world: &World) -> &ProgressionLedger {
        &world.ledger
    }

    /// Captures the persisted portion of the ledger.
    #[must_use]
    pub fn ledger_snapshot(world: &World) -> LedgerSnapshot {
        world.ledger.snapshot()
    }

    /// Current position of the actor receiving deposits.
    #[must_use]
    pub fn actor_position(world: &World) -> Position {
        world.actor
    }

    /// Number of ticks processed since the world was created.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use progression_core::{
        AgentId, CapacityBump, Level, LevelRewards, LevelThresholds, ResourceKind,
    };

    fn world() -> World {
        let thresholds = LevelThresholds::new(vec![0, 30, 75, 125, 200]).expect("valid thresholds");
        World::new(LedgerConfig::new(thresholds))
    }

    #[test]
    fn tick_advances_clock() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::Tick {
                dt: Duration::from_millis(16),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::TimeAdvanced {
                dt: Duration::from_millis(16),
            }]
        );
        assert_eq!(query::tick_index(&world), 1);
    }

    #[test]
    fn empty_grants_are_silent() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::RequestGrant {
                kind: PayloadKind::Coin,
                amount: 0,
                source: Position::default(),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::RequestLevelGrant { amount: 0 },
            &mut events,
        );
        apply(
            &mut world,
            Command::AddExperience { amount: 0 },
            &mut events,
        );
        assert!(events.is_empty());
    }

    #[test]
    fn checkpoint_emits_experience_before_level_up() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::CheckpointLevel {
                level: Level::new(2),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![
                Event::ExperienceChanged { experience: 30 },
                Event::LevelUp {
                    level: Level::new(2),
                },
            ]
        );
    }

    #[test]
    fn capacity_only_grows_through_level_checkpoints() {
        let thresholds = LevelThresholds::new(vec![0, 30, 75, 125, 200]).expect("valid thresholds");
        let config = LedgerConfig::new(thresholds).with_rewards(LevelRewards {
            attribute_points: 1,
            capacity_bumps: vec![CapacityBump {
                kind: ResourceKind::Chitin,
                delta: 5,
            }],
        });
        let mut world = World::new(config);
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::AddExperience { amount: 80 },
            &mut events,
        );
        apply(
            &mut world,
            Command::SetExperience { experience: 90 },
            &mut events,
        );
        assert_eq!(
            query::ledger(&world).capacity(ResourceKind::Chitin),
            DEFAULT_CAPACITY
        );

        events.clear();
        apply(
            &mut world,
            Command::CheckpointLevel {
                level: Level::new(4),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![
                Event::ExperienceChanged { experience: 125 },
                Event::CapacityIncreased {
                    kind: ResourceKind::Chitin,
                    capacity: DEFAULT_CAPACITY + 5,
                },
                Event::LevelUp {
                    level: Level::new(4),
                },
            ]
        );
        assert_eq!(query::ledger(&world).attribute_points(), 1);
    }

    #[test]
    fn skipped_checkpoint_is_rejected_without_mutation() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::CheckpointLevel {
                level: Level::new(3),
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::LevelCheckpointRejected {
                level: Level::new(3),
            }]
        );
        assert_eq!(query::ledger_view(&world).experience(), 0);
        assert_eq!(query::ledger_view(&world).level(), Level::FIRST);
    }

    #[test]
    fn experience_commits_are_rerouted_as_level_grants() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::CommitPayload {
                agent: AgentId::new(4),
                kind: PayloadKind::Experience,
                amount: 12,
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![
                Event::PayloadCommitted {
                    kind: PayloadKind::Experience,
                    amount: 12,
                },
                Event::LevelGrantRequested { amount: 12 },
            ]
        );
        assert_eq!(query::ledger_view(&world).experience(), 0);
    }

    #[test]
    fn resource_commits_deposit_into_ledger() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::CommitPayload {
                agent: AgentId::new(1),
                kind: PayloadKind::Crumb,
                amount: 9,
            },
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::PayloadCommitted {
                kind: PayloadKind::Crumb,
                amount: 9,
            }]
        );
        assert_eq!(query::ledger(&world).count(ResourceKind::Crumb), 9);
    }

    #[test]
    fn actor_moves_and_world_restores_from_snapshot() {
        let mut world = world();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::MoveActor {
                position: Position::new(3.0, 4.0),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::SetExperience { experience: 140 },
            &mut events,
        );
        assert_eq!(query::actor_position(&world), Position::new(3.0, 4.0));

        let snapshot = query::ledger_snapshot(&world);
        let thresholds = LevelThresholds::new(vec![0, 30, 75, 125, 200]).expect("valid thresholds");
        let restored = World::from_snapshot(LedgerConfig::new(thresholds), &snapshot);
        assert_eq!(query::ledger_view(&restored).experience(), 140);
        assert_eq!(query::ledger_view(&restored).level(), Level::new(4));
    }
}
