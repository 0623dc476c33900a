//! Internal event system
//!
//! The EventBus decouples record mutations and background claim propagation
//! from whoever wants to observe them. It uses `tokio::sync::broadcast`, so
//! publishing never blocks and never fails.
//!
//! # Architecture
//!
//! ```text
//! UserRepository ─────┐
//!                     ├──▶ EventBus::publish() ──▶ broadcast channel ──▶ subscribers
//! ClaimsPropagator ───┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let event_bus = EventBus::new(1024);
//! let mut rx = event_bus.subscribe();
//!
//! event_bus.publish(ServiceEvent::Record(RecordEvent::Deleted {
//!     entity_type: "users".to_string(),
//!     record_id: "42".to_string(),
//! }));
//!
//! if let Ok(envelope) = rx.recv().await {
//!     println!("Received: {:?}", envelope.event);
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events related to record mutations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecordEvent {
    /// A record was created
    Created {
        entity_type: String,
        record_id: String,
        data: serde_json::Value,
    },
    /// A record was updated; `data` is the public projection after the update
    Updated {
        entity_type: String,
        record_id: String,
        data: serde_json::Value,
    },
    /// A record was soft-deleted
    Deleted {
        entity_type: String,
        record_id: String,
    },
}

/// Outcome of a background claims propagation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClaimsEvent {
    /// The identity provider accepted the claims
    Propagated {
        subject_id: String,
        role: String,
        internal_id: String,
    },
    /// The identity provider rejected the claims or was unreachable
    Failed {
        subject_id: String,
        role: String,
        internal_id: String,
        error: String,
    },
}

/// Top-level event wrapping record and claims events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceEvent {
    Record(RecordEvent),
    Claims(ClaimsEvent),
}

impl ServiceEvent {
    pub fn event_kind(&self) -> &str {
        match self {
            ServiceEvent::Record(_) => "record",
            ServiceEvent::Claims(_) => "claims",
        }
    }

    /// Get the entity type this event relates to
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            ServiceEvent::Record(
                RecordEvent::Created { entity_type, .. }
                | RecordEvent::Updated { entity_type, .. }
                | RecordEvent::Deleted { entity_type, .. },
            ) => Some(entity_type),
            ServiceEvent::Claims(_) => None,
        }
    }

    /// Get the record id this event relates to
    ///
    /// For claims events this is the internal id carried in the claims.
    pub fn record_id(&self) -> &str {
        match self {
            ServiceEvent::Record(
                RecordEvent::Created { record_id, .. }
                | RecordEvent::Updated { record_id, .. }
                | RecordEvent::Deleted { record_id, .. },
            ) => record_id,
            ServiceEvent::Claims(
                ClaimsEvent::Propagated { internal_id, .. } | ClaimsEvent::Failed { internal_id, .. },
            ) => internal_id,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            ServiceEvent::Record(e) => match e {
                RecordEvent::Created { .. } => "created",
                RecordEvent::Updated { .. } => "updated",
                RecordEvent::Deleted { .. } => "deleted",
            },
            ServiceEvent::Claims(e) => match e {
                ClaimsEvent::Propagated { .. } => "propagated",
                ClaimsEvent::Failed { .. } => "failed",
            },
        }
    }
}

/// Envelope wrapping an event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event: ServiceEvent,
}

impl EventEnvelope {
    pub fn new(event: ServiceEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Broadcast-based event bus
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// Receivers that fall more than `capacity` events behind get a
    /// `Lagged` error on their next `recv()`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of receivers that will receive the event.
    pub fn publish(&self, event: ServiceEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
