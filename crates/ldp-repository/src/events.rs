//! Hand-off of committed domain events to an external dispatcher.

use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use ldp_container::{ContainerEvent, EventKind};

/// Receives events after the mutation that produced them has committed.
///
/// Dispatch is fire-and-forget from the repository's point of view: a
/// dispatcher that fails must handle (or log) the failure itself, since
/// the state change is already durable.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    async fn dispatch(&self, events: Vec<ContainerEvent>);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopDispatcher;

#[async_trait]
impl EventDispatcher for NoopDispatcher {
    async fn dispatch(&self, _events: Vec<ContainerEvent>) {}
}

/// Filter for subscribing to a subset of container events.
#[derive(Clone, Debug, Default)]
pub struct EventFilter {
    /// If set, only events for these containers are delivered.
    pub containers: Option<Vec<String>>,
    /// If set, only events of these kinds are delivered.
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    pub fn containers<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            containers: Some(ids.into_iter().map(Into::into).collect()),
            kinds: None,
        }
    }

    pub fn kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            containers: None,
            kinds: Some(kinds.into_iter().collect()),
        }
    }

    /// Returns `true` if the given event matches this filter.
    pub fn matches(&self, event: &ContainerEvent) -> bool {
        if let Some(ref ids) = self.containers {
            if !ids.contains(&event.container_id) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        true
    }
}

/// A broadcast channel receiver for container events.
pub type EventStream = broadcast::Receiver<ContainerEvent>;

struct Subscriber {
    filter: EventFilter,
    sender: broadcast::Sender<ContainerEvent>,
}

/// In-process fan-out to filtered subscribers over tokio broadcast
/// channels. Slow subscribers lag rather than block commits.
pub struct BroadcastDispatcher {
    subscribers: RwLock<Vec<Subscriber>>,
    capacity: usize,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber and return its receiver.
    pub fn subscribe(&self, filter: EventFilter) -> EventStream {
        let (sender, rx) = broadcast::channel(self.capacity);
        match self.subscribers.write() {
            Ok(mut subs) => subs.push(Subscriber { filter, sender }),
            Err(e) => warn!(error = %e, "subscriber list poisoned; subscription dropped"),
        }
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Route one event to all matching subscribers. Subscribers whose
    /// receivers are gone are pruned.
    fn route(&self, event: &ContainerEvent) {
        let Ok(mut subs) = self.subscribers.write() else {
            warn!(kind = %event.kind.as_str(), "subscriber list poisoned; event dropped");
            return;
        };
        subs.retain(|sub| {
            if sub.filter.matches(event) {
                sub.sender.send(event.clone()).is_ok()
            } else {
                sub.sender.receiver_count() > 0
            }
        });
    }
}

impl Default for BroadcastDispatcher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventDispatcher for BroadcastDispatcher {
    async fn dispatch(&self, events: Vec<ContainerEvent>) {
        for event in &events {
            self.route(event);
        }
        debug!(count = events.len(), "events dispatched");
    }
}

impl std::fmt::Debug for BroadcastDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastDispatcher")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use ldp_types::MemberType;

    fn event(kind: EventKind, container: &str) -> ContainerEvent {
        ContainerEvent::new(kind, container, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn filter_matching() {
        let e = event(EventKind::MemberAdded, "c1").with_member("m", MemberType::Resource);
        assert!(EventFilter::default().matches(&e));
        assert!(EventFilter::containers(["c1"]).matches(&e));
        assert!(!EventFilter::containers(["c2"]).matches(&e));
        assert!(EventFilter::kinds([EventKind::MemberAdded]).matches(&e));
        assert!(!EventFilter::kinds([EventKind::ContainerDeleted]).matches(&e));
    }

    #[tokio::test]
    async fn routes_to_matching_subscribers() {
        let dispatcher = BroadcastDispatcher::new(16);
        let mut all = dispatcher.subscribe(EventFilter::default());
        let mut deletes = dispatcher.subscribe(EventFilter::kinds([EventKind::ContainerDeleted]));

        dispatcher
            .dispatch(vec![
                event(EventKind::ContainerCreated, "a"),
                event(EventKind::ContainerDeleted, "a"),
            ])
            .await;

        assert_eq!(all.recv().await.unwrap().kind, EventKind::ContainerCreated);
        assert_eq!(all.recv().await.unwrap().kind, EventKind::ContainerDeleted);
        assert_eq!(deletes.recv().await.unwrap().kind, EventKind::ContainerDeleted);
        assert!(deletes.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let dispatcher = BroadcastDispatcher::new(4);
        let rx = dispatcher.subscribe(EventFilter::default());
        let _keep = dispatcher.subscribe(EventFilter::default());
        assert_eq!(dispatcher.subscriber_count(), 2);
        drop(rx);
        dispatcher.dispatch(vec![event(EventKind::ContainerUpdated, "x")]).await;
        assert_eq!(dispatcher.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn noop_accepts_everything() {
        NoopDispatcher
            .dispatch(vec![event(EventKind::ContainerCreated, "a")])
            .await;
    }
}
