//! Typed gateway events
//!
//! Replaces ad hoc global notifications with an explicit broadcast
//! bus. Listeners subscribe for a typed stream; lagging receivers drop
//! the oldest events rather than blocking the gateway.

use chrono::NaiveDate;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 128;

/// Events emitted by the gateway and submission flows
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// A booking was created remotely
    BookingCreated { id: String },
    /// A booking was overwritten remotely
    BookingUpdated { id: String },
    /// The shared bookings list was refreshed (fetch or subscription)
    BookingsRefreshed { count: usize },
    /// A booking write was attempted but failed
    BookingWriteFailed { id: String, reason: String },
    /// A submission was blocked as a duplicate
    SubmissionBlocked {
        pet_name: String,
        date: NaiveDate,
        time: String,
    },
}

/// Broadcast bus for gateway events
pub struct EventBus {
    sender: broadcast::Sender<GatewayEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    /// Subscribe to all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.sender.subscribe()
    }

    /// Emit an event. A bus with no listeners is not an error.
    pub fn emit(&self, event: GatewayEvent) {
        let _ = self.sender.send(event);
    }
}
