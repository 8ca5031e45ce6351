//! Error types for the report endpoint
//!
//! Every variant maps to exactly one HTTP status:
//! - `Conflict` -> 409 with the current editor and marker
//! - `NotFound` -> 404
//! - `Unauthorized` -> 401 with an empty body
//! - `BadRequest` -> 400

use draftsync_core::{ConfigError, ConflictDetails, ReportId, SyncError};

/// Server-side failures
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Precondition did not match the current report
    #[error(
        "report {report_id} was modified by {} at {}",
        .details.updated_by,
        .details.updated_at
    )]
    Conflict {
        /// Report that was targeted
        report_id: ReportId,
        /// Current editor and marker
        details: ConflictDetails,
    },

    /// Unknown report
    #[error("report {0} not found")]
    NotFound(ReportId),

    /// Missing, unknown or revoked session
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed request
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ServerError {
    /// HTTP status code for this error
    #[inline]
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Conflict { .. } => 409,
            Self::NotFound(_) => 404,
            Self::Unauthorized => 401,
            Self::BadRequest(_) => 400,
            Self::Config(_) => 500,
        }
    }

    /// Check if the caller has to involve the user before trying again
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Unauthorized)
    }
}

impl From<ServerError> for SyncError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Conflict { report_id, details } => SyncError::Conflict {
                report_id,
                updated_by: details.updated_by,
                updated_at: details.updated_at,
            },
            ServerError::NotFound(id) => SyncError::NotFound(format!("report {id}")),
            ServerError::Unauthorized => SyncError::AuthExpired,
            ServerError::BadRequest(message) => SyncError::NetworkFailure(message),
            ServerError::Config(err) => SyncError::Config(err),
        }
    }
}
