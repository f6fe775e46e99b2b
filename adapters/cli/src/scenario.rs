//! Scripted grant scenarios replayed against a headless session.

use std::{
    sync::mpsc::{self, Receiver},
    time::Duration,
};

use anyhow::{Context, Result};
use progression_core::{Event, GateSchedule, LedgerSnapshot, Level, PayloadKind, Position};
use progression_session::{FixedCounters, Session, SessionConfig, Topic};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Scenario file loaded from TOML.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    /// Levels that wait on an external gate.
    #[serde(default)]
    pub(crate) gates: Vec<u32>,
    /// Session wiring.
    pub(crate) session: SessionConfig,
    /// On-screen counters agents may fly toward.
    #[serde(default)]
    pub(crate) counters: Vec<CounterConfig>,
    /// Actions replayed in order.
    #[serde(default)]
    pub(crate) steps: Vec<Step>,
}

/// Fixed position of a payload counter.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CounterConfig {
    pub(crate) kind: PayloadKind,
    pub(crate) position: Position,
}

/// Single scripted action.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub(crate) enum Step {
    /// Delivers a payload through agents.
    Grant {
        kind: PayloadKind,
        amount: u32,
        #[serde(default)]
        source: Position,
    },
    /// Grants experience through staged advancement.
    LevelGrant { amount: u32 },
    /// Resolves the gate of a level.
    CompleteGate { level: u32 },
    /// Moves the actor receiving deposits.
    MoveActor { position: Position },
    /// Advances a fixed number of frames.
    Wait { ticks: u32 },
    /// Advances frames until no work is pending.
    Settle,
}

/// Replay limits.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RunOptions {
    pub(crate) frame: Duration,
    pub(crate) max_ticks: u32,
}

/// Outcome of a replayed scenario.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub(crate) struct Report {
    pub(crate) ticks: u32,
    pub(crate) level_ups: Vec<u32>,
    pub(crate) committed: Vec<(PayloadKind, u32)>,
    pub(crate) pool_growth: u32,
    pub(crate) torn_down_early: bool,
    pub(crate) level_progress: f32,
    pub(crate) snapshot: Option<LedgerSnapshot>,
}

impl Report {
    fn record(&mut self, event: &Event) {
        match event {
            Event::LevelUp { level } => self.level_ups.push(level.get()),
            Event::PayloadCommitted { kind, amount } => {
                match self.committed.iter_mut().find(|(seen, _)| seen == kind) {
                    Some((_, total)) => *total = total.saturating_add(*amount),
                    None => self.committed.push((*kind, *amount)),
                }
            }
            Event::PoolGrowthWarning { .. } => self.pool_growth += 1,
            _ => {}
        }
    }
}

impl Scenario {
    /// Parses a scenario from TOML text.
    pub(crate) fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid scenario TOML")
    }

    /// Replays the scenario, optionally resuming from `restore`.
    pub(crate) fn run(
        &self,
        options: RunOptions,
        restore: Option<&LedgerSnapshot>,
    ) -> Result<Report> {
        let gates = GateSchedule::new(self.gates.iter().copied().map(Level::new));
        let counters = self
            .counters
            .iter()
            .fold(FixedCounters::new(), |counters, counter| {
                counters.with(counter.kind, counter.position)
            });

        let mut session = match restore {
            Some(snapshot) => Session::restore(
                &self.session,
                snapshot,
                Box::new(gates),
                Box::new(counters),
            ),
            None => Session::new(&self.session, Box::new(gates), Box::new(counters)),
        }
        .context("invalid session configuration")?;

        let (sender, receiver) = mpsc::channel();
        let _ = session.subscribe(&Topic::ALL, Box::new(sender));

        let mut report = Report::default();
        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, ?step, "replaying step");
            match *step {
                Step::Grant {
                    kind,
                    amount,
                    source,
                } => session.request_grant(kind, amount, source),
                Step::LevelGrant { amount } => session.request_level_grant(amount),
                Step::CompleteGate { level } => session.complete_gate(Level::new(level)),
                Step::MoveActor { position } => session.move_actor(position),
                Step::Wait { ticks } => {
                    for _ in 0..ticks {
                        tick(&mut session, options, &mut report);
                    }
                }
                Step::Settle => {
                    while !session.is_idle() && report.ticks < options.max_ticks {
                        tick(&mut session, options, &mut report);
                    }
                }
            }
            drain(&receiver, &mut report);
        }

        if !session.is_idle() {
            warn!(
                ticks = report.ticks,
                in_flight = session.in_flight(),
                "scenario ended with pending work; tearing down"
            );
            report.torn_down_early = true;
        }
        session.teardown();
        drain(&receiver, &mut report);

        let snapshot = session.snapshot();
        report.level_progress = session.ledger().level_progress();
        info!(
            level = snapshot.level.get(),
            experience = snapshot.experience,
            ticks = report.ticks,
            "scenario finished"
        );
        report.snapshot = Some(snapshot);
        Ok(report)
    }
}

fn tick(session: &mut Session, options: RunOptions, report: &mut Report) {
    session.tick(options.frame);
    report.ticks = report.ticks.saturating_add(1);
}

fn drain(receiver: &Receiver<Event>, report: &mut Report) {
    for event in receiver.try_iter() {
        match &event {
            Event::LevelUp { level } => info!(level = level.get(), "level up"),
            Event::PoolGrowthWarning { kind } => debug!(?kind, "pool growth reported"),
            _ => debug!(?event, "outbound event"),
        }
        report.record(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: RunOptions = RunOptions {
        frame: Duration::from_millis(50),
        max_ticks: 1_000,
    };

    #[test]
    fn demo_scenario_replays() {
        let scenario = Scenario::parse(include_str!("../../../demos/scenario.toml"))
            .expect("demo scenario parses");
        let report = scenario.run(OPTIONS, None).expect("demo scenario runs");

        assert_eq!(report.level_ups, vec![2, 3, 4]);
        assert!(!report.torn_down_early);
        let snapshot = report.snapshot.expect("snapshot captured");
        assert_eq!(snapshot.experience, 170);
        assert!((report.level_progress - 0.6).abs() < 1e-6);
        let chitin = report
            .committed
            .iter()
            .find(|(kind, _)| *kind == PayloadKind::Chitin)
            .map(|(_, amount)| *amount);
        assert_eq!(chitin, Some(48));
    }

    #[test]
    fn unfinished_scenario_is_torn_down() {
        let scenario = Scenario::parse(
            r#"
            gates = [2]

            [session]
            thresholds = [0, 30, 75]

            [[steps]]
            action = "level_grant"
            amount = 80
            "#,
        )
        .expect("scenario parses");
        let report = scenario.run(OPTIONS, None).expect("scenario runs");

        assert!(report.torn_down_early);
        assert_eq!(report.level_ups, vec![2, 3]);
        assert_eq!(
            report.snapshot.map(|snapshot| snapshot.experience),
            Some(80)
        );
    }

    #[test]
    fn restored_snapshot_continues_progression() {
        let scenario = Scenario::parse(
            r#"
            [session]
            thresholds = [0, 30, 75]

            [[steps]]
            action = "level_grant"
            amount = 10

            [[steps]]
            action = "settle"
            "#,
        )
        .expect("scenario parses");
        let first = scenario
            .run(OPTIONS, None)
            .expect("scenario runs")
            .snapshot
            .expect("snapshot captured");
        let second = scenario.run(OPTIONS, Some(&first)).expect("scenario runs");

        assert_eq!(
            second.snapshot.map(|snapshot| snapshot.experience),
            Some(20)
        );
        assert!((second.level_progress - 20.0 / 30.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_actions_are_rejected() {
        let result = Scenario::parse(
            r#"
            [session]
            thresholds = [0, 30]

            [[steps]]
            action = "teleport"
            "#,
        );
        assert!(result.is_err());
    }
}
