use crate::{CoreError, EventPublisher};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Sender};
use tracing::debug;

/// A message published on the in-memory bus.
#[derive(Clone, Debug)]
pub struct BusMessage {
    pub topic: String,
    pub event_type: String,
    pub payload: Arc<[u8]>,
}

/// In-memory EventPublisher built on Tokio broadcast channels, one per
/// topic. The notification dispatcher subscribes here in single-process
/// mode. A receiver that lags behind loses the oldest messages.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    channels: Arc<DashMap<String, Sender<BusMessage>>>,
    channel_capacity: usize,
}

impl InMemoryEventBus {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            channel_capacity,
        }
    }

    fn sender(&self, topic: &str) -> Sender<BusMessage> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .value()
            .clone()
    }

    /// Subscribe to a topic. Only messages published after this call are seen.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender(topic).subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError> {
        let message = BusMessage {
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload: Arc::from(event_payload),
        };
        // No subscriber is not an error: events are fire-and-forget here.
        if self.sender(topic).send(message).is_err() {
            debug!(topic, event_type, "published with no active subscribers");
        }
        Ok(())
    }
}
