//! In-process events and change notifications
//!
//! Three kinds of events feed the sync coordinator:
//!
//! - `ChangeNotification` - pushed by the durable store when rows change
//! - `MutationEvent` - published after a local write completes
//! - `FocusEvent` - published when the app regains focus
//!
//! Local events travel over an `EventBus`, a thin publish/subscribe wrapper
//! around a tokio broadcast channel. Subscribers that fall behind see a lag
//! instead of blocking publishers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::models::ItemId;

/// Default channel capacity for event buses
pub const DEFAULT_BUS_CAPACITY: usize = 64;

// ============================================================================
// Event Bus
// ============================================================================

/// Publish/subscribe channel for in-process events
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    sender: broadcast::Sender<T>,
}

impl<T: Clone> EventBus<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: T) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

// ============================================================================
// Local events
// ============================================================================

/// Kind of local write that completed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Upsert,
    Delete,
}

/// Emitted after a local upsert/delete reaches the durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationEvent {
    pub user_id: String,
    pub item_id: ItemId,
    pub kind: MutationKind,
}

/// Emitted when the app regains focus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusEvent {
    pub at: DateTime<Utc>,
}

// ============================================================================
// Durable store change notifications
// ============================================================================

/// Row-level operation reported by the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
    /// The stream lost messages or reconnected; treat everything as changed
    Resync,
}

/// Change pushed by the durable store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub user_id: String,
    #[serde(default)]
    pub item_id: Option<String>,
    pub op: ChangeOp,
}

impl ChangeNotification {
    pub fn resync(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: None,
            op: ChangeOp::Resync,
        }
    }
}

/// Which notifications a subscriber wants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub user_id: String,
}

impl ChangeFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    pub fn matches(&self, notification: &ChangeNotification) -> bool {
        notification.user_id == self.user_id
    }
}

// ============================================================================
// Sync signals
// ============================================================================

/// Reason the coordinator was asked to refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSignal {
    Startup,
    StoreChanged,
    LocalMutation,
    FocusRegained,
}

impl SyncSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncSignal::Startup => "startup",
            SyncSignal::StoreChanged => "store_changed",
            SyncSignal::LocalMutation => "local_mutation",
            SyncSignal::FocusRegained => "focus_regained",
        }
    }
}

impl fmt::Display for SyncSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
