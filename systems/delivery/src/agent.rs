//! Individual delivery agents carrying a share of a reward.

use std::time::Duration;

use glam::Vec2;
use progression_core::{AgentId, Command, PayloadKind, Position, TargetPositionQuery};

/// Normalized progress at which an agent applies its payload.
pub const COMMIT_THRESHOLD: f32 = 0.9;

/// Lifecycle phase of a delivery agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    /// Launched but not yet advanced by a tick.
    Spawned,
    /// Travelling toward its target.
    InFlight,
    /// Payload applied; the flight may still be finishing.
    Committed,
    /// Inactive and eligible for pooling.
    Released,
}

/// Destination an agent flies toward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Anchor {
    /// Fixed point in world space.
    World(Position),
    /// On-screen counter re-queried every frame.
    Counter {
        /// Payload whose counter is targeted.
        kind: PayloadKind,
        /// Last position reported for the counter.
        last_known: Position,
    },
}

impl Anchor {
    fn position(&self) -> Position {
        match self {
            Self::World(position) => *position,
            Self::Counter { last_known, .. } => *last_known,
        }
    }
}

/// Payload application produced by an agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Commit {
    /// Agent that carried the payload.
    pub agent: AgentId,
    /// Payload carried.
    pub kind: PayloadKind,
    /// Amount carried.
    pub amount: u32,
}

impl Commit {
    /// Converts the commit into the world command that applies it.
    #[must_use]
    pub fn into_command(self) -> Command {
        Command::CommitPayload {
            agent: self.agent,
            kind: self.kind,
            amount: self.amount,
        }
    }
}

/// One fractional share of a reward in transit.
///
/// The flight path is a quadratic curve whose control point is fixed at
/// launch. Only counter anchors move the end point while in flight.
#[derive(Debug)]
pub struct DeliveryAgent {
    id: AgentId,
    kind: PayloadKind,
    amount: u32,
    state: AgentState,
    committed: bool,
    source: Vec2,
    control: Vec2,
    anchor: Anchor,
    elapsed: Duration,
    duration: Duration,
    progress: f32,
    position: Vec2,
}

impl DeliveryAgent {
    pub(crate) fn idle(id: AgentId, kind: PayloadKind) -> Self {
        Self {
            id,
            kind,
            amount: 0,
            state: AgentState::Released,
            committed: false,
            source: Vec2::ZERO,
            control: Vec2::ZERO,
            anchor: Anchor::World(Position::default()),
            elapsed: Duration::ZERO,
            duration: Duration::ZERO,
            progress: 0.0,
            position: Vec2::ZERO,
        }
    }

    /// Launches an inactive agent from `source` toward `anchor`.
    ///
    /// Returns `false` and leaves the agent untouched when it is still active
    /// or `amount` is zero.
    pub fn spawn(
        &mut self,
        source: Position,
        anchor: Anchor,
        control: Position,
        amount: u32,
        duration: Duration,
    ) -> bool {
        if self.state != AgentState::Released || amount == 0 {
            return false;
        }

        self.amount = amount;
        self.state = AgentState::Spawned;
        self.committed = false;
        self.source = to_vec(source);
        self.control = to_vec(control);
        self.anchor = anchor;
        self.elapsed = Duration::ZERO;
        self.duration = duration;
        self.progress = 0.0;
        self.position = self.source;
        true
    }

    /// Advances the flight by `dt`, returning the commit once progress crosses
    /// [`COMMIT_THRESHOLD`].
    pub fn advance(&mut self, dt: Duration, counters: &dyn TargetPositionQuery) -> Option<Commit> {
        match self.state {
            AgentState::Released => return None,
            AgentState::Spawned => self.state = AgentState::InFlight,
            AgentState::InFlight | AgentState::Committed => {}
        }

        self.elapsed = self.elapsed.saturating_add(dt);
        self.progress = if self.duration.is_zero() {
            1.0
        } else {
            (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
        };

        if let Anchor::Counter { kind, last_known } = &mut self.anchor {
            if let Some(position) = counters.counter_position(*kind) {
                *last_known = position;
            }
        }

        let target = to_vec(self.anchor.position());
        self.position = quadratic(self.source, self.control, target, self.progress);

        if self.progress >= COMMIT_THRESHOLD {
            return self.commit();
        }
        None
    }

    /// Commits immediately if the payload has not been applied yet.
    pub fn force_commit(&mut self) -> Option<Commit> {
        if self.state == AgentState::Released {
            return None;
        }
        self.commit()
    }

    /// Deactivates the agent, resetting its visuals.
    ///
    /// An agent that never crossed the commit threshold commits here so no
    /// payload is dropped.
    pub fn finish(&mut self) -> Option<Commit> {
        let fallback = self.force_commit();
        self.state = AgentState::Released;
        self.amount = 0;
        self.elapsed = Duration::ZERO;
        self.progress = 0.0;
        self.position = self.source;
        fallback
    }

    /// Identifier assigned by the pool.
    #[must_use]
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Payload kind the agent carries.
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// Amount carried by the current flight.
    #[must_use]
    pub const fn amount(&self) -> u32 {
        self.amount
    }

    /// Lifecycle phase.
    #[must_use]
    pub const fn state(&self) -> AgentState {
        self.state
    }

    /// Normalized flight progress.
    #[must_use]
    pub const fn progress(&self) -> f32 {
        self.progress
    }

    /// Reports whether the flight reached its end.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state != AgentState::Released && self.progress >= 1.0
    }

    /// Current world position.
    #[must_use]
    pub fn position(&self) -> Position {
        Position::new(self.position.x, self.position.y)
    }

    /// Point the flight ends at, as of the last advance.
    #[must_use]
    pub fn target(&self) -> Position {
        self.anchor.position()
    }

    fn commit(&mut self) -> Option<Commit> {
        if self.committed {
            return None;
        }
        self.committed = true;
        self.state = AgentState::Committed;
        Some(Commit {
            agent: self.id,
            kind: self.kind,
            amount: self.amount,
        })
    }
}

pub(crate) fn to_vec(position: Position) -> Vec2 {
    Vec2::new(position.x(), position.y())
}

fn quadratic(start: Vec2, control: Vec2, end: Vec2, t: f32) -> Vec2 {
    let inverse = 1.0 - t;
    start * (inverse * inverse) + control * (2.0 * inverse * t) + end * (t * t)
}
