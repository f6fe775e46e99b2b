//! Grow-only reuse cache of delivery agents keyed by payload kind.

use std::collections::{BTreeMap, VecDeque};

use progression_core::{AgentId, PayloadKind};
use thiserror::Error;
use tracing::warn;

use crate::agent::{AgentState, DeliveryAgent};

/// Reasons an agent may be refused by the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The agent has not been deactivated with `finish`.
    #[error("agent {} is still active", .0.get())]
    StillActive(AgentId),
    /// The agent is not checked out from this pool.
    #[error("agent {} is not checked out from this pool", .0.get())]
    NotCheckedOut(AgentId),
}

/// Release refusal that hands the agent back to the caller.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct Rejected {
    /// Why the release was refused.
    pub error: PoolError,
    /// Agent returned to the caller.
    pub agent: DeliveryAgent,
}

/// Whether an acquisition reused an agent or synthesized a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolGrowth {
    /// An inactive agent was reused.
    Reused,
    /// The pool was empty and grew by one agent.
    Grew,
}

/// Agent counters for a single payload kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Agents ever synthesized, minus trimmed ones.
    pub created: u32,
    /// Inactive agents waiting in the pool.
    pub pooled: u32,
    /// Agents currently checked out.
    pub in_flight: u32,
}

/// Pool of inactive delivery agents.
#[derive(Debug, Default)]
pub struct ResourcePool {
    idle: BTreeMap<PayloadKind, VecDeque<DeliveryAgent>>,
    checked_out: BTreeMap<AgentId, PayloadKind>,
    created: BTreeMap<PayloadKind, u32>,
    next_id: u32,
}

impl ResourcePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesizes `count` inactive agents of `kind` up front.
    pub fn prewarm(&mut self, kind: PayloadKind, count: u32) {
        for _ in 0..count {
            let agent = self.synthesize(kind);
            self.idle.entry(kind).or_default().push_back(agent);
        }
    }

    /// Checks out an inactive agent, growing the pool when none is available.
    pub fn acquire(&mut self, kind: PayloadKind) -> (DeliveryAgent, PoolGrowth) {
        let reused = self
            .idle
            .get_mut(&kind)
            .and_then(|queue| queue.pop_front());

        let (agent, growth) = match reused {
            Some(agent) => (agent, PoolGrowth::Reused),
            None => {
                let agent = self.synthesize(kind);
                warn!(
                    ?kind,
                    agent = agent.id().get(),
                    created = self.stats(kind).created,
                    "delivery pool empty; synthesized new agent"
                );
                (agent, PoolGrowth::Grew)
            }
        };

        let _ = self.checked_out.insert(agent.id(), kind);
        (agent, growth)
    }

    /// Returns a deactivated agent to the pool.
    pub fn release(&mut self, agent: DeliveryAgent) -> Result<(), Rejected> {
        if agent.state() != AgentState::Released {
            warn!(agent = agent.id().get(), "refusing release of active agent");
            return Err(Rejected {
                error: PoolError::StillActive(agent.id()),
                agent,
            });
        }

        if self.checked_out.remove(&agent.id()).is_none() {
            warn!(
                agent = agent.id().get(),
                "refusing release of unknown agent"
            );
            return Err(Rejected {
                error: PoolError::NotCheckedOut(agent.id()),
                agent,
            });
        }

        self.idle.entry(agent.kind()).or_default().push_back(agent);
        Ok(())
    }

    /// Drops idle agents of `kind` beyond `keep`, returning how many were removed.
    pub fn trim(&mut self, kind: PayloadKind, keep: usize) -> usize {
        let Some(queue) = self.idle.get_mut(&kind) else {
            return 0;
        };
        let removed = queue.len().saturating_sub(keep);
        queue.truncate(keep);

        if let Some(created) = self.created.get_mut(&kind) {
            *created = created.saturating_sub(u32::try_from(removed).unwrap_or(u32::MAX));
        }
        removed
    }

    /// Counters for `kind`.
    #[must_use]
    pub fn stats(&self, kind: PayloadKind) -> PoolStats {
        let count = |len: usize| u32::try_from(len).unwrap_or(u32::MAX);
        PoolStats {
            created: self.created.get(&kind).copied().unwrap_or(0),
            pooled: count(self.idle.get(&kind).map_or(0, VecDeque::len)),
            in_flight: count(
                self.checked_out
                    .values()
                    .filter(|checked| **checked == kind)
                    .count(),
            ),
        }
    }

    fn synthesize(&mut self, kind: PayloadKind) -> DeliveryAgent {
        let id = AgentId::new(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        *self.created.entry(kind).or_default() += 1;
        DeliveryAgent::idle(id, kind)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::agent::Anchor;
    use progression_core::Position;

    #[test]
    fn empty_pool_synthesizes_valid_agent() {
        let mut pool = ResourcePool::new();
        let (agent, growth) = pool.acquire(PayloadKind::Chitin);
        assert_eq!(growth, PoolGrowth::Grew);
        assert_eq!(agent.kind(), PayloadKind::Chitin);
        assert_eq!(agent.state(), AgentState::Released);
        assert_eq!(
            pool.stats(PayloadKind::Chitin),
            PoolStats {
                created: 1,
                pooled: 0,
                in_flight: 1,
            }
        );
    }

    #[test]
    fn released_agents_are_reused() {
        let mut pool = ResourcePool::new();
        let (agent, _) = pool.acquire(PayloadKind::Coin);
        let id = agent.id();
        pool.release(agent).expect("inactive agent is accepted");

        let (again, growth) = pool.acquire(PayloadKind::Coin);
        assert_eq!(growth, PoolGrowth::Reused);
        assert_eq!(again.id(), id);
        assert_eq!(pool.stats(PayloadKind::Coin).created, 1);
    }

    #[test]
    fn active_agent_release_is_rejected_and_returned() {
        let mut pool = ResourcePool::new();
        let (mut agent, _) = pool.acquire(PayloadKind::Coin);
        assert!(agent.spawn(
            Position::default(),
            Anchor::World(Position::new(1.0, 1.0)),
            Position::default(),
            2,
            Duration::from_secs(1),
        ));

        let rejected = pool.release(agent).expect_err("active agent refused");
        assert_eq!(rejected.error, PoolError::StillActive(rejected.agent.id()));
        assert_eq!(pool.stats(PayloadKind::Coin).pooled, 0);
        assert_eq!(pool.stats(PayloadKind::Coin).in_flight, 1);
    }

    #[test]
    fn duplicate_release_is_rejected() {
        let mut pool = ResourcePool::new();
        let (agent, _) = pool.acquire(PayloadKind::Crumb);
        let duplicate = DeliveryAgent::idle(agent.id(), PayloadKind::Crumb);
        pool.release(agent).expect("first release accepted");

        let rejected = pool.release(duplicate).expect_err("second release refused");
        assert!(matches!(rejected.error, PoolError::NotCheckedOut(_)));
        assert_eq!(pool.stats(PayloadKind::Crumb).pooled, 1);
    }

    #[test]
    fn pooled_never_exceeds_created_minus_in_flight() {
        let mut pool = ResourcePool::new();
        pool.prewarm(PayloadKind::Experience, 2);
        let mut held = Vec::new();
        for _ in 0..5 {
            held.push(pool.acquire(PayloadKind::Experience).0);
            let stats = pool.stats(PayloadKind::Experience);
            assert!(stats.pooled <= stats.created - stats.in_flight);
        }
        for agent in held {
            pool.release(agent).expect("inactive agent is accepted");
            let stats = pool.stats(PayloadKind::Experience);
            assert!(stats.pooled <= stats.created - stats.in_flight);
        }
        assert_eq!(pool.stats(PayloadKind::Experience).created, 5);
    }

    #[test]
    fn trim_shrinks_idle_agents() {
        let mut pool = ResourcePool::new();
        pool.prewarm(PayloadKind::Coin, 6);
        assert_eq!(pool.trim(PayloadKind::Coin, 2), 4);
        assert_eq!(
            pool.stats(PayloadKind::Coin),
            PoolStats {
                created: 2,
                pooled: 2,
                in_flight: 0,
            }
        );
        assert_eq!(pool.trim(PayloadKind::Chitin, 0), 0);
    }
}
