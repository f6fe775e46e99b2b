//! Topic-routed synchronous bus that broadcasts outbound events.

use std::{fmt, sync::mpsc};

use progression_core::Event;
use tracing::trace;

/// Topics outbound events are routed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    /// Ledger changes such as level-ups and experience updates.
    Progression,
    /// Payloads applied by delivery agents.
    Delivery,
    /// Operational warnings such as pool growth.
    Diagnostics,
}

impl Topic {
    /// All topics in routing order.
    pub const ALL: [Self; 3] = [Self::Progression, Self::Delivery, Self::Diagnostics];

    /// Topic an event is published under, or `None` for internal events.
    #[must_use]
    pub fn of(event: &Event) -> Option<Self> {
        match event {
            Event::ExperienceChanged { .. }
            | Event::LevelUp { .. }
            | Event::CapacityIncreased { .. }
            | Event::LevelCheckpointRejected { .. } => Some(Self::Progression),
            Event::PayloadCommitted { .. } => Some(Self::Delivery),
            Event::PoolGrowthWarning { .. } => Some(Self::Diagnostics),
            Event::TimeAdvanced { .. }
            | Event::GrantRequested { .. }
            | Event::LevelGrantRequested { .. }
            | Event::GateCompleted { .. }
            | Event::ActorMoved { .. } => None,
        }
    }
}

/// Receiver of outbound events.
pub trait Listener {
    /// Called once for every published event on a subscribed topic.
    fn on_event(&mut self, event: &Event);
}

impl Listener for mpsc::Sender<Event> {
    fn on_event(&mut self, event: &Event) {
        if self.send(event.clone()).is_err() {
            trace!("listener channel closed; dropping event");
        }
    }
}

/// Handle identifying a subscription on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u32);

struct Subscription {
    id: SubscriptionId,
    topics: Vec<Topic>,
    listener: Box<dyn Listener>,
}

/// Synchronous bus forwarding events to listeners in subscription order.
#[derive(Default)]
pub struct EventBus {
    subscriptions: Vec<Subscription>,
    next_id: u32,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.subscriptions.len())
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Creates a bus without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for every event routed to one of `topics`.
    pub fn subscribe(&mut self, topics: &[Topic], listener: Box<dyn Listener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        let mut topics = topics.to_vec();
        topics.sort_unstable();
        topics.dedup();
        self.subscriptions.push(Subscription {
            id,
            topics,
            listener,
        });
        id
    }

    /// Removes a subscription, reporting whether it existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|subscription| subscription.id != id);
        self.subscriptions.len() != before
    }

    /// Number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Forwards each routed event to the matching listeners.
    pub fn publish(&mut self, events: &[Event]) {
        for event in events {
            let Some(topic) = Topic::of(event) else {
                continue;
            };
            for subscription in &mut self.subscriptions {
                if subscription.topics.contains(&topic) {
                    subscription.listener.on_event(event);
                }
            }
        }
    }
}
