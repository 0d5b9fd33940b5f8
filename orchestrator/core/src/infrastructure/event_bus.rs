// Event Bus Implementation - Pub/Sub for Domain Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Carries deployment lifecycle events and channel messages (the transport
// behind notification broadcasts, one channel per team).
//
// In-memory only: events published while nobody subscribes are dropped.

use crate::domain::events::{ChannelMessage, DeploymentEvent};
use crate::domain::tool::ToolId;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Deployment(DeploymentEvent),
    Channel(ChannelMessage),
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish a deployment lifecycle event
    pub fn publish_deployment_event(&self, event: DeploymentEvent) {
        self.publish(DomainEvent::Deployment(event));
    }

    /// Publish `payload` under `event` to every subscriber of `channel`
    pub fn publish_to_channel(&self, channel: &str, event: &str, payload: serde_json::Value) -> usize {
        self.publish(DomainEvent::Channel(ChannelMessage {
            channel: channel.to_string(),
            event: event.to_string(),
            payload,
            sent_at: Utc::now(),
        }))
    }

    fn publish(&self, event: DomainEvent) -> usize {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
        receiver_count
    }

    /// Subscribe to all domain events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to deployment events of a single tool
    pub fn subscribe_tool(&self, tool_id: ToolId) -> DeploymentEventReceiver {
        DeploymentEventReceiver {
            receiver: self.sender.subscribe(),
            tool_id,
        }
    }

    /// Subscribe to messages sent on one channel
    pub fn subscribe_channel(&self, channel: impl Into<String>) -> ChannelReceiver {
        ChannelReceiver {
            receiver: self.sender.subscribe(),
            channel: channel.into(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver for one tool's deployment events (filtered)
pub struct DeploymentEventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    tool_id: ToolId,
}

impl DeploymentEventReceiver {
    pub async fn recv(&mut self) -> Result<DeploymentEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Deployment(deployment_event) = event {
                if deployment_event.tool_id() == self.tool_id {
                    return Ok(deployment_event);
                }
            }
        }
    }
}

/// Receiver for one channel's messages (filtered)
pub struct ChannelReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
    channel: String,
}

impl ChannelReceiver {
    pub async fn recv(&mut self) -> Result<ChannelMessage, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let DomainEvent::Channel(message) = event {
                if message.channel == self.channel {
                    return Ok(message);
                }
            }
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
