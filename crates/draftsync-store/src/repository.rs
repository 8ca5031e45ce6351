//! Storage seam for drafts
//!
//! The eviction engine and the store only see this trait, so any durable
//! embedded medium can back the client. Implementations keep an index ordered
//! by `last_modified_local` so retention can be planned without loading every
//! draft.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use draftsync_core::{Draft, DraftId};
use std::fmt::Debug;

/// Index row for one stored draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Draft key
    pub id: DraftId,
    /// When the draft was last saved locally
    pub last_modified_local: DateTime<Utc>,
    /// Attachment bytes charged to this draft
    pub attachment_bytes: u64,
}

impl IndexEntry {
    /// Index row describing a draft
    #[must_use]
    pub fn of(draft: &Draft) -> Self {
        Self {
            id: draft.id.clone(),
            last_modified_local: draft.last_modified_local,
            attachment_bytes: draft.attachment_bytes(),
        }
    }
}

/// Keyed draft storage
pub trait DraftRepository: Send + Sync + Debug {
    /// Insert or replace a draft exactly as given (no stamping, no eviction)
    ///
    /// # Errors
    /// `StoreError` if the medium rejects the write
    fn put(&self, draft: &Draft) -> Result<(), StoreError>;

    /// Fetch a draft by key
    ///
    /// # Errors
    /// `StoreError` if the medium cannot be read or the document is corrupt
    fn get(&self, id: &DraftId) -> Result<Option<Draft>, StoreError>;

    /// Remove a draft, returning whether it existed
    ///
    /// # Errors
    /// `StoreError` if the medium rejects the delete
    fn delete(&self, id: &DraftId) -> Result<bool, StoreError>;

    /// Index rows, least-recently-modified first (ties broken by id)
    ///
    /// # Errors
    /// `StoreError` if the index cannot be read
    fn by_last_modified(&self) -> Result<Vec<IndexEntry>, StoreError>;

    /// Every stored draft, least-recently-modified first
    ///
    /// # Errors
    /// `StoreError` if any draft cannot be read
    fn all(&self) -> Result<Vec<Draft>, StoreError> {
        let mut drafts = Vec::new();
        for entry in self.by_last_modified()? {
            if let Some(draft) = self.get(&entry.id)? {
                drafts.push(draft);
            }
        }
        Ok(drafts)
    }

    /// Remove every draft
    ///
    /// # Errors
    /// `StoreError` on the first failed delete
    fn clear(&self) -> Result<(), StoreError> {
        for entry in self.by_last_modified()? {
            self.delete(&entry.id)?;
        }
        Ok(())
    }
}

/// Order index rows oldest first, ties broken by id for determinism
pub(crate) fn sort_oldest_first(entries: &mut [IndexEntry]) {
    entries.sort_by(|a, b| {
        a.last_modified_local
            .cmp(&b.last_modified_local)
            .then_with(|| a.id.cmp(&b.id))
    });
}
