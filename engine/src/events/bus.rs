//! Event bus for notification lifecycle events.
//!
//! Pub/sub on a Tokio broadcast channel. Publishing never blocks the write
//! path and an event with no subscribers is not an error; slow subscribers
//! miss events rather than applying backpressure to the engine.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::NotificationEvent;
use crate::model::NotificationId;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast bus for notification events.
pub struct EventBus {
    sender: broadcast::Sender<NotificationEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus.
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: NotificationEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "event published"),
            Err(_) => debug!(event_type, "event published (no receivers)"),
        }
    }

    /// Subscribe to every notification's events.
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.sender.subscribe()
    }

    /// Subscribe to a single notification's events.
    pub fn subscribe_notification(&self, notification_id: &str) -> NotificationReceiver {
        NotificationReceiver {
            receiver: self.sender.subscribe(),
            notification_id: notification_id.to_string(),
        }
    }

    /// Get the number of current subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver yielding only one notification's events.
pub struct NotificationReceiver {
    receiver: broadcast::Receiver<NotificationEvent>,
    notification_id: NotificationId,
}

impl NotificationReceiver {
    /// Receive the next matching event.
    pub async fn recv(&mut self) -> Result<NotificationEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.notification_id() == self.notification_id {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(NotificationEvent::Triggered {
            notification_id: "n-1".to_string(),
            tree_id: "tree-1".to_string(),
            timestamp: Utc::now(),
        });

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "triggered");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(NotificationEvent::Completed {
            notification_id: "n-1".to_string(),
            timestamp: Utc::now(),
        });
    }

    #[tokio::test]
    async fn test_notification_receiver_filters() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_notification("n-target");

        bus.publish(NotificationEvent::Completed {
            notification_id: "n-other".to_string(),
            timestamp: Utc::now(),
        });
        bus.publish(NotificationEvent::Completed {
            notification_id: "n-target".to_string(),
            timestamp: Utc::now(),
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.notification_id(), "n-target");
    }
}
