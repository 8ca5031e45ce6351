//! Error types for draftsync
//!
//! [`SyncError`] is the taxonomy the host application sees. Each variant maps to
//! one user-visible behaviour:
//! - storage failures degrade to a warning banner
//! - network failures are retried on the next autosave tick
//! - conflicts open the resolution modal
//! - auth expiry opens the re-authentication prompt
//! - eviction losses are shown once, the next time the draft is opened

use crate::types::{DraftId, EvictionNotice, Marker, ReportId};
use std::path::PathBuf;

/// Main draftsync error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Local persistence failed; the session continues in memory
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Stored draft could not be decoded
    #[error("local draft is corrupt: {0}")]
    Corrupt(String),

    /// Remote call failed for a reason other than conflict or auth
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Server rejected a write made against a stale marker
    #[error("report {report_id} was modified by {updated_by} at {updated_at}")]
    Conflict {
        /// Report that was written
        report_id: ReportId,
        /// Editor of the write the caller missed
        updated_by: String,
        /// Current server marker
        updated_at: Marker,
    },

    /// Session expired; remote saves are suspended until re-authentication
    #[error("session expired")]
    AuthExpired,

    /// Attachments were stripped from a draft to respect the storage cap
    #[error("attachments evicted from draft {draft_id}: {notice}")]
    EvictionDataLoss {
        /// Affected draft
        draft_id: DraftId,
        /// What was removed
        notice: EvictionNotice,
    },

    /// Report or draft does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Autosave state machine rejected a transition
    #[error("invalid autosave transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state
        from: &'static str,
        /// Requested state
        to: &'static str,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Check if the failure clears up on its own and is retried by the next tick
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::NetworkFailure(_))
    }

    /// Check if the error interrupts autosave until the user decides something
    #[inline]
    #[must_use]
    pub fn requires_decision(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AuthExpired)
    }

    /// Check if the error originates from local storage
    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::Corrupt(_) | Self::EvictionDataLoss { .. }
        )
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config at {path:?}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values parse but are unusable
    #[error("invalid config: {0}")]
    Invalid(String),
}
