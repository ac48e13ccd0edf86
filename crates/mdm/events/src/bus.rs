//! Broadcast-channel event bus.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::{Event, Topic};

/// Default per-topic buffer.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Cheaply cloneable handle to a shared bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    channels: DashMap<Topic, broadcast::Sender<Event>>,
    published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity: capacity.max(1),
                channels: DashMap::new(),
                published: AtomicU64::new(0),
            }),
        }
    }

    /// Publish an event on its topic.
    ///
    /// Returns the number of subscribers the event was handed to. Zero
    /// subscribers is not an error; the event is simply dropped.
    pub fn publish(&self, event: impl Into<Event>) -> usize {
        let event = event.into();
        let topic = event.topic();
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let notified = self
            .sender(topic)
            .send(event)
            .unwrap_or_default();

        tracing::trace!(%topic, notified, "published event");
        notified
    }

    /// Subscribe to every event published on `topic` from now on.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        tracing::debug!(%topic, "new subscription");
        Subscription {
            topic,
            rx: self.sender(topic).subscribe(),
        }
    }

    /// Total events published since creation.
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    fn sender(&self, topic: Topic) -> broadcast::Sender<Event> {
        self.inner
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Receiving end of a topic subscription.
pub struct Subscription {
    topic: Topic,
    rx: broadcast::Receiver<Event>,
}

impl Subscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next event. Events dropped because this subscriber lagged
    /// are logged and skipped. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(topic = %self.topic, missed, "subscriber lagged; events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(topic = %self.topic, missed, "subscriber lagged; events dropped");
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandCreated, CredentialUpdated, DeviceRef};

    fn command(udid: &str) -> CommandCreated {
        CommandCreated {
            device: DeviceRef::Udid(udid.into()),
            command_uuid: "cmd-1".into(),
            request_type: "InstallProfile".into(),
            payload: vec![],
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(command("u1")), 0);
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_only_see_their_topic() {
        let bus = EventBus::default();
        let mut commands = bus.subscribe(Topic::CommandCreated);
        let mut creds = bus.subscribe(Topic::CredentialUpdated);

        assert_eq!(bus.publish(command("u1")), 1);
        bus.publish(CredentialUpdated {
            consumer_key: "CK_1".into(),
            raw: b"{}".to_vec(),
        });

        let Some(Event::CommandCreated(ev)) = commands.recv().await else {
            panic!("expected command event");
        };
        assert_eq!(ev.device, DeviceRef::Udid("u1".into()));
        assert!(commands.try_recv().is_none());

        assert!(matches!(creds.recv().await, Some(Event::CredentialUpdated(_))));
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let bus = EventBus::default();
        bus.publish(command("early"));
        let mut sub = bus.subscribe(Topic::CommandCreated);
        bus.publish(command("late"));

        let Some(Event::CommandCreated(ev)) = sub.recv().await else {
            panic!("expected command event");
        };
        assert_eq!(ev.device, DeviceRef::Udid("late".into()));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block_publisher() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe(Topic::CommandCreated);
        for i in 0..5 {
            bus.publish(command(&format!("u{i}")));
        }

        let Some(Event::CommandCreated(ev)) = sub.recv().await else {
            panic!("expected command event");
        };
        assert_eq!(ev.device, DeviceRef::Udid("u3".into()));
    }
}
