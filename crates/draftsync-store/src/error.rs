//! Error types for the local draft store

use draftsync_core::SyncError;
use std::path::PathBuf;

/// Local store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The storage medium failed (missing, read-only, full, ...)
    #[error("storage unavailable at {path:?}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Storage refused the operation without an io error
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored document could not be encoded or decoded
    #[error("corrupt draft at {path:?}: {source}")]
    Corrupt {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Whether the medium itself is the problem (as opposed to the data)
    #[inline]
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::Unavailable(_))
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            SyncError::StorageUnavailable(err.to_string())
        } else {
            SyncError::Corrupt(err.to_string())
        }
    }
}
