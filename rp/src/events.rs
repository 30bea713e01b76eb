//! Pool observer notifications
//!
//! Each pool owns a broadcast bus. Status displays, loggers and tests
//! subscribe to it; the pool's actor is the only emitter. Emission is
//! fire-and-forget: with no subscribers the event is discarded, and a slow
//! subscriber loses the oldest events rather than stalling the pool.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::pool::{DropReason, PoolStatus, Priority};

/// Something observable happened in a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PoolEvent {
    /// Classified health changed
    StatusChanged {
        pool: String,
        from: PoolStatus,
        to: PoolStatus,
    },

    /// A submission was shed at admission or a queued request was cleared
    Dropped {
        pool: String,
        id: String,
        priority: Priority,
        reason: DropReason,
    },

    /// A queued request waited past its timeout
    Expired {
        pool: String,
        id: String,
        priority: Priority,
        #[serde(rename = "waited-ms")]
        waited_ms: u64,
    },
}

impl PoolEvent {
    /// Event type as a string (for logging)
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status-changed",
            Self::Dropped { .. } => "dropped",
            Self::Expired { .. } => "expired",
        }
    }

    /// Name of the pool that emitted the event
    pub fn pool(&self) -> &str {
        match self {
            Self::StatusChanged { pool, .. } | Self::Dropped { pool, .. } | Self::Expired { pool, .. } => pool,
        }
    }
}

/// Emitter bound to one pool
#[derive(Debug, Clone)]
pub struct PoolEventBus {
    tx: broadcast::Sender<PoolEvent>,
    pool: String,
}

impl PoolEventBus {
    pub fn new(pool: impl Into<String>, capacity: usize) -> Self {
        let pool = pool.into();
        debug!(%pool, capacity, "PoolEventBus::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, pool }
    }

    /// Receive every event emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emit(&self, event: PoolEvent) {
        debug!(pool = %self.pool, event_type = event.event_type(), "PoolEventBus::emit");
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn status_changed(&self, from: PoolStatus, to: PoolStatus) {
        self.emit(PoolEvent::StatusChanged {
            pool: self.pool.clone(),
            from,
            to,
        });
    }

    pub fn dropped(&self, id: &str, priority: Priority, reason: DropReason) {
        self.emit(PoolEvent::Dropped {
            pool: self.pool.clone(),
            id: id.to_string(),
            priority,
            reason,
        });
    }

    pub fn expired(&self, id: &str, priority: Priority, waited: Duration) {
        self.emit(PoolEvent::Expired {
            pool: self.pool.clone(),
            id: id.to_string(),
            priority,
            waited_ms: waited.as_millis() as u64,
        });
    }
}
