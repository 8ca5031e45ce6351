//! Remote report API seam
//!
//! The coordinator only talks to [`ReportApi`]; [`crate::http::HttpReportApi`]
//! is the production implementation and tests plug in a loopback.

use async_trait::async_trait;
use draftsync_core::{
    ConflictDetails, Precondition, ReportId, ReportPayload, ServerReport, SyncError, UpdateReceipt,
};
use std::fmt::Debug;

/// Failures of a remote call, classified the way the coordinator reacts to them
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The report moved on since the caller last observed it
    #[error(
        "report {report_id} was modified by {} at {}",
        .details.updated_by,
        .details.updated_at
    )]
    Conflict {
        /// Report that was written
        report_id: ReportId,
        /// Current editor and marker
        details: ConflictDetails,
    },

    /// Session expired or was revoked
    #[error("session expired")]
    AuthExpired,

    /// Report does not exist on the server
    #[error("report {0} not found")]
    NotFound(ReportId),

    /// Transport failure or unexpected response
    #[error("network failure: {0}")]
    Network(String),
}

impl RemoteError {
    /// Check if the next tick should simply try again
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::NotFound(_))
    }

    /// Check if the user has to decide something before saving resumes
    #[inline]
    #[must_use]
    pub fn requires_human(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AuthExpired)
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Conflict { report_id, details } => SyncError::Conflict {
                report_id,
                updated_by: details.updated_by,
                updated_at: details.updated_at,
            },
            RemoteError::AuthExpired => SyncError::AuthExpired,
            RemoteError::NotFound(id) => SyncError::NotFound(format!("report {id}")),
            RemoteError::Network(message) => SyncError::NetworkFailure(message),
        }
    }
}

/// Server-side report operations
#[async_trait]
pub trait ReportApi: Send + Sync + Debug {
    /// Write a report under an optimistic-concurrency precondition
    async fn update(
        &self,
        report_id: ReportId,
        payload: &ReportPayload,
        precondition: Precondition,
    ) -> Result<UpdateReceipt, RemoteError>;

    /// Create a report
    async fn create(&self, payload: &ReportPayload) -> Result<UpdateReceipt, RemoteError>;

    /// Fetch the authoritative copy of a report
    async fn fetch(&self, report_id: ReportId) -> Result<ServerReport, RemoteError>;

    /// Keep-alive; `AuthExpired` once the session is gone
    async fn ping(&self) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(RemoteError::Network("timeout".into()).is_retryable());
        assert!(RemoteError::NotFound(ReportId(4)).is_retryable());
        assert!(RemoteError::AuthExpired.requires_human());
        assert!(!RemoteError::AuthExpired.is_retryable());
    }

    #[test]
    fn maps_onto_sync_errors() {
        assert!(matches!(SyncError::from(RemoteError::AuthExpired), SyncError::AuthExpired));
        assert!(matches!(
            SyncError::from(RemoteError::Network("reset".into())),
            SyncError::NetworkFailure(_)
        ));
    }
}
