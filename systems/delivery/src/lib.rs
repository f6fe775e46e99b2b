#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure system that delivers resource grants through pooled delivery agents.
//!
//! Every validated grant is split into shares whose sum equals the granted
//! amount. Each share is carried by an agent checked out from the
//! [`ResourcePool`], flown toward the resolved deposit target on every tick,
//! and committed to the ledger exactly once through
//! `Command::CommitPayload`.

use std::{fmt, time::Duration};

use progression_core::{Command, Event, PayloadKind, Position, TargetPositionQuery};
use progression_system_target_resolver::TargetResolver;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, warn};

mod agent;
mod pool;

pub use agent::{AgentState, Anchor, Commit, DeliveryAgent, COMMIT_THRESHOLD};
pub use pool::{PoolError, PoolGrowth, PoolStats, Rejected, ResourcePool};

const DEFAULT_FLIGHT_DURATION: Duration = Duration::from_millis(800);
const DEFAULT_AGENTS_PER_GRANT: u32 = 7;
const DEFAULT_ARC_HEIGHT: f32 = 40.0;
const DEFAULT_RNG_SEED: u64 = 0x5eed_0f_a9e7;

/// Configuration parameters required to construct the delivery system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    flight_duration: Duration,
    agents_per_grant: u32,
    arc_height: f32,
    rng_seed: u64,
}

impl Config {
    /// Creates a new configuration.
    ///
    /// `arc_height` bounds the sideways offset of each flight's control point.
    #[must_use]
    pub const fn new(
        flight_duration: Duration,
        agents_per_grant: u32,
        arc_height: f32,
        rng_seed: u64,
    ) -> Self {
        Self {
            flight_duration,
            agents_per_grant,
            arc_height,
            rng_seed,
        }
    }

    /// Time an agent takes to reach its target.
    #[must_use]
    pub const fn flight_duration(&self) -> Duration {
        self.flight_duration
    }

    /// Maximum number of agents launched for a single grant.
    #[must_use]
    pub const fn agents_per_grant(&self) -> u32 {
        self.agents_per_grant
    }

    /// Maximum sideways offset of a flight's control point.
    #[must_use]
    pub const fn arc_height(&self) -> f32 {
        self.arc_height
    }

    /// Seed of the control point jitter.
    #[must_use]
    pub const fn rng_seed(&self) -> u64 {
        self.rng_seed
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            DEFAULT_FLIGHT_DURATION,
            DEFAULT_AGENTS_PER_GRANT,
            DEFAULT_ARC_HEIGHT,
            DEFAULT_RNG_SEED,
        )
    }
}

/// Splits `total` into at most `agents` positive shares summing to `total`.
///
/// Every share receives `total / n`; the remainder is added to the last one.
#[must_use]
pub fn split_payload(total: u32, agents: u32) -> Vec<u32> {
    if total == 0 {
        return Vec::new();
    }

    let count = agents.clamp(1, total);
    let base = total / count;
    let remainder = total - base * count;
    let mut shares = vec![base; count as usize];
    if let Some(last) = shares.last_mut() {
        *last += remainder;
    }
    shares
}

/// Delivery system that owns the agent pool and every agent in flight.
pub struct Delivery {
    config: Config,
    pool: ResourcePool,
    resolver: TargetResolver,
    counters: Box<dyn TargetPositionQuery>,
    in_flight: Vec<DeliveryAgent>,
    rng: ChaCha8Rng,
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .field("resolver", &self.resolver)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

impl Delivery {
    /// Creates a delivery system drawing agents from `pool`.
    #[must_use]
    pub fn new(
        config: Config,
        pool: ResourcePool,
        resolver: TargetResolver,
        counters: Box<dyn TargetPositionQuery>,
    ) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(config.rng_seed),
            config,
            pool,
            resolver,
            counters,
            in_flight: Vec::new(),
        }
    }

    /// Consumes world events to launch and advance agents.
    ///
    /// Agents already in flight advance by the elapsed time first; grants in
    /// the batch launch afterwards so they start moving on the next tick.
    pub fn handle(&mut self, events: &[Event], actor: Position, out: &mut Vec<Command>) {
        let mut elapsed = Duration::ZERO;
        let mut ticked = false;

        for event in events {
            if let Event::TimeAdvanced { dt } = event {
                elapsed = elapsed.saturating_add(*dt);
                ticked = true;
            }
        }

        if ticked {
            self.advance(elapsed, out);
        }

        for event in events {
            if let Event::GrantRequested {
                kind,
                amount,
                source,
            } = event
            {
                self.launch(*kind, *amount, *source, actor, out);
            }
        }
    }

    /// Resolves every agent in flight immediately and returns it to the pool.
    pub fn teardown(&mut self, out: &mut Vec<Command>) {
        let agents = std::mem::take(&mut self.in_flight);
        if !agents.is_empty() {
            debug!(count = agents.len(), "force-committing agents on teardown");
        }
        for mut agent in agents {
            if let Some(commit) = agent.force_commit() {
                out.push(commit.into_command());
            }
            self.retire(agent, out);
        }
    }

    /// Number of agents currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Agents currently in flight.
    #[must_use]
    pub fn agents(&self) -> &[DeliveryAgent] {
        &self.in_flight
    }

    /// Read-only access to the pool.
    #[must_use]
    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Mutable access to the pool for prewarming and trimming.
    pub fn pool_mut(&mut self) -> &mut ResourcePool {
        &mut self.pool
    }

    fn launch(
        &mut self,
        kind: PayloadKind,
        amount: u32,
        source: Position,
        actor: Position,
        out: &mut Vec<Command>,
    ) {
        let anchor = self.resolve_anchor(kind, actor);
        let shares = split_payload(amount, self.config.agents_per_grant);

        if anchor.is_none() {
            warn!(
                ?kind,
                amount,
                "no deposit target available; committing grant instantly"
            );
        }

        for share in shares {
            let (mut agent, growth) = self.pool.acquire(kind);
            if growth == PoolGrowth::Grew {
                out.push(Command::ReportPoolGrowth { kind });
            }

            let Some(anchor) = anchor else {
                let launched = agent.spawn(
                    source,
                    Anchor::World(source),
                    source,
                    share,
                    Duration::ZERO,
                );
                debug_assert!(launched, "pooled agents are inactive");
                if let Some(commit) = agent.finish() {
                    out.push(commit.into_command());
                }
                self.retire(agent, out);
                continue;
            };

            let target = match anchor {
                Anchor::World(position) => position,
                Anchor::Counter { last_known, .. } => last_known,
            };
            let control = self.control_point(source, target);
            if agent.spawn(source, anchor, control, share, self.config.flight_duration) {
                self.in_flight.push(agent);
            } else {
                error!(agent = agent.id().get(), "pooled agent refused to launch");
                if let Some(commit) = agent.finish() {
                    out.push(commit.into_command());
                }
                self.retire(agent, out);
            }
        }
    }

    fn advance(&mut self, dt: Duration, out: &mut Vec<Command>) {
        for agent in &mut self.in_flight {
            if let Some(commit) = agent.advance(dt, self.counters.as_ref()) {
                out.push(commit.into_command());
            }
        }

        let (finished, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(DeliveryAgent::is_finished);
        self.in_flight = active;

        for mut agent in finished {
            if let Some(commit) = agent.finish() {
                out.push(commit.into_command());
            }
            self.retire(agent, out);
        }
    }

    fn retire(&mut self, mut agent: DeliveryAgent, out: &mut Vec<Command>) {
        if agent.state() != AgentState::Released {
            if let Some(commit) = agent.finish() {
                out.push(commit.into_command());
            }
        }
        if let Err(rejected) = self.pool.release(agent) {
            error!(error = %rejected.error, "dropping agent the pool refused");
        }
    }

    fn resolve_anchor(&self, kind: PayloadKind, actor: Position) -> Option<Anchor> {
        let counter = if counter_anchored(kind) {
            self.counters
                .counter_position(kind)
                .map(|last_known| Anchor::Counter { kind, last_known })
        } else {
            None
        };

        counter.or_else(|| {
            self.resolver
                .resolve(actor)
                .map(|target| Anchor::World(target.drop_point))
        })
    }

    fn control_point(&mut self, source: Position, target: Position) -> Position {
        let start = agent::to_vec(source);
        let end = agent::to_vec(target);
        let midpoint = start.lerp(end, 0.5);
        let normal = (end - start).perp().normalize_or_zero();
        let arc = self.config.arc_height.abs();
        let offset = if arc > 0.0 {
            self.rng.gen_range(-arc..=arc)
        } else {
            0.0
        };
        let control = midpoint + normal * offset;
        Position::new(control.x, control.y)
    }
}

fn counter_anchored(kind: PayloadKind) -> bool {
    matches!(kind, PayloadKind::Experience | PayloadKind::Coin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shares_sum_exactly_with_remainder_on_last() {
        for agents in [1, 3, 7, 30] {
            let shares = split_payload(100, agents);
            assert_eq!(shares.len(), agents as usize);
            assert_eq!(shares.iter().sum::<u32>(), 100);
            let base = 100 / agents;
            let (last, rest) = shares.split_last().expect("at least one share");
            assert!(rest.iter().all(|share| *share == base));
            assert_eq!(*last, base + 100 % agents);
        }
    }

    #[test]
    fn share_count_never_exceeds_amount() {
        assert_eq!(split_payload(3, 7), vec![1, 1, 1]);
        assert_eq!(split_payload(5, 0), vec![5]);
        assert!(split_payload(0, 4).is_empty());
    }

    #[test]
    fn only_experience_and_coin_fly_to_counters() {
        assert!(counter_anchored(PayloadKind::Experience));
        assert!(counter_anchored(PayloadKind::Coin));
        assert!(!counter_anchored(PayloadKind::Chitin));
        assert!(!counter_anchored(PayloadKind::Crumb));
    }
}
