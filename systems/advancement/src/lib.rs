#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that stages large experience grants into individual level-ups.
//!
//! A grant that crosses one or more thresholds is replayed one level at a
//! time: the ledger is pinned to each level's exact threshold, the level-up is
//! announced, and the sequencer suspends either for a short pacing delay or
//! until the gate tied to that level reports completion. Once the final level
//! settles the remaining experience is applied exactly.

use std::{collections::BTreeSet, fmt, time::Duration};

use progression_core::{Command, Event, GateRegistry, LedgerView, Level};
use tracing::{debug, warn};

const DEFAULT_LEVEL_PACING: Duration = Duration::from_millis(500);
const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration parameters required to construct the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    level_pacing: Duration,
    gate_timeout: Duration,
}

impl Config {
    /// Creates a new configuration from the pacing delay and gate timeout.
    #[must_use]
    pub const fn new(level_pacing: Duration, gate_timeout: Duration) -> Self {
        Self {
            level_pacing,
            gate_timeout,
        }
    }

    /// Delay between consecutive ungated level-ups.
    #[must_use]
    pub const fn level_pacing(&self) -> Duration {
        self.level_pacing
    }

    /// Longest the sequencer waits for a gate before proceeding.
    #[must_use]
    pub const fn gate_timeout(&self) -> Duration {
        self.gate_timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_LEVEL_PACING, DEFAULT_GATE_TIMEOUT)
    }
}

/// Externally observable phase of the sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerState {
    /// No advancement is in progress.
    Idle,
    /// The provided level was reached and the next step is pending.
    Advancing(Level),
    /// The provided level was reached and its gate has not completed yet.
    WaitingForGate(Level),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Suspension {
    Ready,
    Pacing { remaining: Duration },
    Gate { level: Level, remaining: Duration },
}

#[derive(Clone, Copy, Debug)]
struct Advancement {
    start_level: Level,
    target_level: Level,
    target_experience: u32,
    reached: Level,
    suspension: Suspension,
}

/// Sequencer that owns at most one multi-level advancement at a time.
pub struct LevelAdvancementSequencer {
    config: Config,
    gates: Box<dyn GateRegistry>,
    session: Option<Advancement>,
    early_signals: BTreeSet<Level>,
}

impl fmt::Debug for LevelAdvancementSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelAdvancementSequencer")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("early_signals", &self.early_signals)
            .finish_non_exhaustive()
    }
}

impl LevelAdvancementSequencer {
    /// Creates an idle sequencer consulting `gates` for gated levels.
    #[must_use]
    pub fn new(config: Config, gates: Box<dyn GateRegistry>) -> Self {
        Self {
            config,
            gates,
            session: None,
            early_signals: BTreeSet::new(),
        }
    }

    /// Reports the current phase.
    #[must_use]
    pub fn state(&self) -> SequencerState {
        match self.session {
            None => SequencerState::Idle,
            Some(Advancement {
                suspension: Suspension::Gate { level, .. },
                ..
            }) => SequencerState::WaitingForGate(level),
            Some(session) => SequencerState::Advancing(session.reached),
        }
    }

    /// Reports whether no advancement is in progress.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    /// Level the in-flight advancement started from, if any.
    #[must_use]
    pub fn start_level(&self) -> Option<Level> {
        self.session.map(|session| session.start_level)
    }

    /// Level the in-flight advancement is heading toward, if any.
    #[must_use]
    pub fn target_level(&self) -> Option<Level> {
        self.session.map(|session| session.target_level)
    }

    /// Consumes world events and the ledger view to emit advancement commands.
    ///
    /// Grants observed in the same batch are merged. Elapsed time and gate
    /// signals settle the current suspension before new work is scheduled, and
    /// at most one level is processed per call.
    pub fn handle(&mut self, events: &[Event], ledger: LedgerView<'_>, out: &mut Vec<Command>) {
        let mut granted: u32 = 0;
        let mut elapsed = Duration::ZERO;
        let mut rejected = false;

        for event in events {
            match event {
                Event::LevelGrantRequested { amount } => {
                    granted = granted.saturating_add(*amount);
                }
                Event::TimeAdvanced { dt } => {
                    elapsed = elapsed.saturating_add(*dt);
                }
                Event::GateCompleted { level } => self.signal_gate(*level),
                Event::LevelCheckpointRejected { level } => {
                    if self.session.is_some() {
                        warn!(level = level.get(), "checkpoint rejected mid-advancement");
                        rejected = true;
                    }
                }
                _ => {}
            }
        }

        if rejected {
            self.abandon(out);
        }

        if !elapsed.is_zero() {
            self.advance_clock(elapsed);
        }

        if granted > 0 {
            self.absorb_grant(granted, ledger, out);
        }

        self.step(out);
    }

    /// Resolves the in-flight advancement immediately, skipping every wait.
    ///
    /// Used on teardown so granted experience is never lost.
    pub fn flush(&mut self, out: &mut Vec<Command>) {
        let Some(session) = self.session.take() else {
            return;
        };

        let mut level = session.reached;
        while level < session.target_level {
            level = level.next();
            out.push(Command::CheckpointLevel { level });
        }
        out.push(Command::SetExperience {
            experience: session.target_experience,
        });
        self.early_signals.clear();
        debug!(
            target_level = session.target_level.get(),
            "flushed advancement on teardown"
        );
    }

    fn absorb_grant(&mut self, amount: u32, ledger: LedgerView<'_>, out: &mut Vec<Command>) {
        let thresholds = ledger.thresholds();

        if let Some(session) = self.session.as_mut() {
            session.target_experience = session.target_experience.saturating_add(amount);
            session.target_level = thresholds.level_for_experience(session.target_experience);
            debug!(
                amount,
                target_level = session.target_level.get(),
                "extended in-flight advancement"
            );
            return;
        }

        let target_experience = ledger.experience().saturating_add(amount);
        let start_level = ledger.level();
        let target_level = thresholds.level_for_experience(target_experience);

        if target_level <= start_level {
            out.push(Command::AddExperience { amount });
            return;
        }

        debug!(
            start = start_level.get(),
            target_level = target_level.get(),
            target_experience,
            "starting staged advancement"
        );
        self.session = Some(Advancement {
            start_level,
            target_level,
            target_experience,
            reached: start_level,
            suspension: Suspension::Ready,
        });
    }

    fn signal_gate(&mut self, level: Level) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        match session.suspension {
            Suspension::Gate { level: waiting, .. } if waiting == level => {
                session.suspension = Suspension::Ready;
            }
            _ if level > session.reached => {
                let _ = self.early_signals.insert(level);
            }
            _ => debug!(level = level.get(), "ignoring stale gate signal"),
        }
    }

    fn advance_clock(&mut self, elapsed: Duration) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        session.suspension = match session.suspension {
            Suspension::Ready => Suspension::Ready,
            Suspension::Pacing { remaining } => {
                let remaining = remaining.saturating_sub(elapsed);
                if remaining.is_zero() {
                    Suspension::Ready
                } else {
                    Suspension::Pacing { remaining }
                }
            }
            Suspension::Gate { level, remaining } => {
                let remaining = remaining.saturating_sub(elapsed);
                if remaining.is_zero() {
                    let timeout_ms =
                        u64::try_from(self.config.gate_timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        level = level.get(),
                        timeout_ms,
                        "gate stalled; proceeding after timeout"
                    );
                    Suspension::Ready
                } else {
                    Suspension::Gate { level, remaining }
                }
            }
        };
    }

    fn step(&mut self, out: &mut Vec<Command>) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let ready = match session.suspension {
            Suspension::Ready => true,
            Suspension::Pacing { remaining } => remaining.is_zero(),
            Suspension::Gate { .. } => false,
        };
        if !ready {
            return;
        }

        if session.reached >= session.target_level {
            out.push(Command::SetExperience {
                experience: session.target_experience,
            });
            self.session = None;
            self.early_signals.clear();
            return;
        }

        let level = session.reached.next();
        out.push(Command::CheckpointLevel { level });
        session.reached = level;

        let gated = self.gates.has_gate_at_level(level) && !self.early_signals.remove(&level);
        session.suspension = if gated {
            Suspension::Gate {
                level,
                remaining: self.config.gate_timeout,
            }
        } else {
            Suspension::Pacing {
                remaining: self.config.level_pacing,
            }
        };
    }

    fn abandon(&mut self, out: &mut Vec<Command>) {
        if let Some(session) = self.session.take() {
            out.push(Command::SetExperience {
                experience: session.target_experience,
            });
        }
        self.early_signals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progression_core::{GateSchedule, LevelThresholds};

    fn thresholds() -> LevelThresholds {
        LevelThresholds::new(vec![0, 30, 75, 125, 200]).expect("valid thresholds")
    }

    #[test]
    fn grant_below_next_threshold_takes_fast_path() {
        let table = thresholds();
        let mut sequencer =
            LevelAdvancementSequencer::new(Config::default(), Box::new(GateSchedule::default()));
        let mut out = Vec::new();
        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 5 }],
            LedgerView::new(20, Level::new(1), &table),
            &mut out,
        );
        assert_eq!(out, vec![Command::AddExperience { amount: 5 }]);
        assert!(sequencer.is_idle());
    }

    #[test]
    fn crossing_grant_processes_first_level_immediately() {
        let table = thresholds();
        let mut sequencer =
            LevelAdvancementSequencer::new(Config::default(), Box::new(GateSchedule::default()));
        let mut out = Vec::new();
        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 150 }],
            LedgerView::new(20, Level::new(1), &table),
            &mut out,
        );
        assert_eq!(
            out,
            vec![Command::CheckpointLevel {
                level: Level::new(2),
            }]
        );
        assert_eq!(sequencer.state(), SequencerState::Advancing(Level::new(2)));
        assert_eq!(sequencer.start_level(), Some(Level::new(1)));
        assert_eq!(sequencer.target_level(), Some(Level::new(4)));
    }

    #[test]
    fn pacing_elapses_before_next_level() {
        let table = thresholds();
        let config = Config::new(Duration::from_millis(300), Duration::from_secs(1));
        let mut sequencer =
            LevelAdvancementSequencer::new(config, Box::new(GateSchedule::default()));
        let mut out = Vec::new();
        let view = LedgerView::new(20, Level::new(1), &table);
        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 60 }],
            view,
            &mut out,
        );
        out.clear();

        sequencer.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(200),
            }],
            view,
            &mut out,
        );
        assert!(out.is_empty());

        sequencer.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(100),
            }],
            view,
            &mut out,
        );
        assert_eq!(
            out,
            vec![Command::CheckpointLevel {
                level: Level::new(3),
            }]
        );
    }

    #[test]
    fn early_gate_signal_is_remembered() {
        let table = thresholds();
        let config = Config::new(Duration::from_millis(10), Duration::from_secs(5));
        let gates = GateSchedule::new([Level::new(3)]);
        let mut sequencer = LevelAdvancementSequencer::new(config, Box::new(gates));
        let mut out = Vec::new();
        let view = LedgerView::new(20, Level::new(1), &table);

        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 150 }],
            view,
            &mut out,
        );
        sequencer.handle(
            &[Event::GateCompleted {
                level: Level::new(3),
            }],
            view,
            &mut out,
        );
        sequencer.handle(
            &[Event::TimeAdvanced {
                dt: Duration::from_millis(10),
            }],
            view,
            &mut out,
        );
        assert_eq!(
            out,
            vec![
                Command::CheckpointLevel {
                    level: Level::new(2),
                },
                Command::CheckpointLevel {
                    level: Level::new(3),
                },
            ]
        );
        assert_eq!(sequencer.state(), SequencerState::Advancing(Level::new(3)));
    }

    #[test]
    fn zero_pacing_proceeds_on_the_next_batch() {
        let table = thresholds();
        let config = Config::new(Duration::ZERO, Duration::from_secs(5));
        let mut sequencer =
            LevelAdvancementSequencer::new(config, Box::new(GateSchedule::default()));
        let mut out = Vec::new();
        let view = LedgerView::new(20, Level::new(1), &table);

        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 60 }],
            view,
            &mut out,
        );
        sequencer.handle(
            &[Event::TimeAdvanced { dt: Duration::ZERO }],
            view,
            &mut out,
        );
        sequencer.handle(&[], view, &mut out);

        assert_eq!(
            out,
            vec![
                Command::CheckpointLevel {
                    level: Level::new(2),
                },
                Command::CheckpointLevel {
                    level: Level::new(3),
                },
                Command::SetExperience { experience: 80 },
            ]
        );
        assert!(sequencer.is_idle());
    }

    #[test]
    fn flush_emits_remaining_levels_and_final_experience() {
        let table = thresholds();
        let mut sequencer =
            LevelAdvancementSequencer::new(Config::default(), Box::new(GateSchedule::default()));
        let mut out = Vec::new();
        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 150 }],
            LedgerView::new(20, Level::new(1), &table),
            &mut out,
        );
        out.clear();

        sequencer.flush(&mut out);

        assert_eq!(
            out,
            vec![
                Command::CheckpointLevel {
                    level: Level::new(3),
                },
                Command::CheckpointLevel {
                    level: Level::new(4),
                },
                Command::SetExperience { experience: 170 },
            ]
        );
        assert!(sequencer.is_idle());
    }

    #[test]
    fn rejected_checkpoint_abandons_session_without_losing_experience() {
        let table = thresholds();
        let mut sequencer =
            LevelAdvancementSequencer::new(Config::default(), Box::new(GateSchedule::default()));
        let mut out = Vec::new();
        let view = LedgerView::new(20, Level::new(1), &table);
        sequencer.handle(
            &[Event::LevelGrantRequested { amount: 150 }],
            view,
            &mut out,
        );
        out.clear();

        sequencer.handle(
            &[Event::LevelCheckpointRejected {
                level: Level::new(2),
            }],
            view,
            &mut out,
        );

        assert_eq!(out, vec![Command::SetExperience { experience: 170 }]);
        assert!(sequencer.is_idle());
    }
}
