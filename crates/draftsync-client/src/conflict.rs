//! Conflict resolution types
//!
//! A rejected save produces a [`ConflictContext`]. Autosave stops retrying
//! the remote path until the user picks one of the two [`Resolution`]s.

use chrono::{DateTime, Utc};
use draftsync_core::{DraftId, Marker, ReportId};

/// Everything the conflict modal needs to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Local draft
    pub draft_id: DraftId,
    /// Server report
    pub report_id: ReportId,
    /// Marker the rejected save was based on
    pub local_marker: Option<Marker>,
    /// Editor of the write we missed
    pub server_updated_by: String,
    /// Current server marker
    pub server_updated_at: Marker,
    /// When the conflict was detected
    pub detected_at: DateTime<Utc>,
}

/// The user's choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Drop local changes and adopt the server copy
    DiscardLocal,
    /// Write the local copy unconditionally
    ForceOverwrite,
}

/// Result of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// What was done
    pub resolution: Resolution,
    /// Marker the draft now tracks
    pub marker: Marker,
    /// Version the draft now tracks
    pub version: u64,
}
