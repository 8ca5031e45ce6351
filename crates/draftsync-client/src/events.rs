//! User-visible sync signals
//!
//! Published on a tokio broadcast channel. The host application subscribes
//! and maps each event onto its UI: a modal for conflicts, a blocking prompt
//! for re-authentication, a banner for storage trouble.

use crate::conflict::ConflictContext;
use chrono::{DateTime, Utc};
use draftsync_core::{DraftId, EvictionNotice, UpdateReceipt};
use tokio::sync::broadcast;

/// Something the user may need to see
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A save was rejected; the user must choose how to resolve it
    ConflictDetected(ConflictContext),
    /// Session expired; remote saves are suspended until re-authentication
    ReauthRequired,
    /// Remote saves re-enabled after re-authentication
    Resumed,
    /// Local persistence failed; editing continues in memory
    StorageDegraded {
        /// Draft being saved
        draft_id: DraftId,
        /// What the medium reported
        reason: String,
    },
    /// Local persistence works again
    StorageRecovered {
        /// Draft being saved
        draft_id: DraftId,
    },
    /// Attachments were evicted from a draft
    EvictionNotice {
        /// Affected draft
        draft_id: DraftId,
        /// What was removed
        notice: EvictionNotice,
    },
    /// Draft persisted locally
    SavedLocally {
        /// Draft saved
        draft_id: DraftId,
        /// Stamp applied by the store
        at: DateTime<Utc>,
    },
    /// Draft accepted by the server
    SavedRemote {
        /// Draft saved
        draft_id: DraftId,
        /// Server response
        receipt: UpdateReceipt,
    },
}

/// Broadcast bus for [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Create a bus; slow subscribers lag after `capacity` events
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events published from now on
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn publish(&self, event: SyncEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No subscribers for sync event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
