//! Typed event bus for federation lifecycle notifications.
//!
//! Backed by a tokio broadcast channel. Publishing never blocks; slow
//! subscribers lag and lose the oldest events.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::AggregationStrategy;
use crate::types::{AgentId, Version};

pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FederatedEvent {
    Initialized { dimension: usize, strategy: AggregationStrategy, min_agents: usize },
    AgentRegistered { agent_id: AgentId },
    AgentUnregistered { agent_id: AgentId },
    PatternShared { agent_id: AgentId, category: String },
    UpdateReceived { agent_id: AgentId, pattern_count: u64, pending: usize },
    AggregationComplete { version: Version, contributors: usize, timestamp: i64 },
    AgentSynced { agent_id: AgentId, version: Version },
    Shutdown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("event bus closed")] Closed,
    #[error("receiver lagged by {0} events")] Lagged(u64),
    #[error("no event available")] Empty,
}

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<FederatedEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender: Arc::new(sender) }
    }

    pub fn publish(&self, event: FederatedEvent) {
        debug!(?event, "publishing federated event");
        if self.sender.send(event).is_err() { debug!("no subscribers listening to event"); }
    }

    pub fn subscribe(&self) -> EventReceiver { EventReceiver { receiver: self.sender.subscribe() } }

    pub fn subscriber_count(&self) -> usize { self.sender.receiver_count() }
}

impl Default for EventBus { fn default() -> Self { Self::new(DEFAULT_EVENT_CAPACITY) } }

pub struct EventReceiver {
    receiver: broadcast::Receiver<FederatedEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<FederatedEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => { warn!("event receiver lagged by {} events", n); EventBusError::Lagged(n) }
        })
    }

    pub fn try_recv(&mut self) -> Result<FederatedEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => { warn!("event receiver lagged by {} events", n); EventBusError::Lagged(n) }
        })
    }

    /// Drains every event currently buffered.
    pub fn drain(&mut self) -> Vec<FederatedEvent> {
        let mut out = Vec::new();
        loop {
            match self.try_recv() {
                Ok(evt) => out.push(evt),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(FederatedEvent::Shutdown);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscriber_receives_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        bus.publish(FederatedEvent::AgentRegistered { agent_id: "a".into() });
        bus.publish(FederatedEvent::Shutdown);
        assert_eq!(rx.recv().await.unwrap(), FederatedEvent::AgentRegistered { agent_id: "a".into() });
        assert_eq!(rx.recv().await.unwrap(), FederatedEvent::Shutdown);
        assert_eq!(rx.try_recv(), Err(EventBusError::Empty));
    }

    #[test]
    fn lagging_receiver_reports_loss() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..4 { bus.publish(FederatedEvent::AgentUnregistered { agent_id: format!("n{i}") }); }
        assert_eq!(rx.try_recv(), Err(EventBusError::Lagged(2)));
        assert_eq!(rx.drain().len(), 2);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&FederatedEvent::AgentSynced { agent_id: "a".into(), version: 3 }).unwrap();
        assert!(json.contains("\"type\":\"agent_synced\""));
    }
}
