//! In-process draft repository
//!
//! Not durable. Used by tests and as the fallback medium when the device
//! refuses to give the app any persistent storage.

use crate::error::StoreError;
use crate::repository::{sort_oldest_first, DraftRepository, IndexEntry};
use draftsync_core::{Draft, DraftId};
use parking_lot::Mutex;
use std::collections::HashMap;

/// HashMap-backed repository
#[derive(Debug, Default)]
pub struct MemoryDraftRepository {
    drafts: Mutex<HashMap<DraftId, Draft>>,
}

impl MemoryDraftRepository {
    /// Create an empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored drafts
    #[must_use]
    pub fn len(&self) -> usize {
        self.drafts.lock().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drafts.lock().is_empty()
    }
}

impl DraftRepository for MemoryDraftRepository {
    fn put(&self, draft: &Draft) -> Result<(), StoreError> {
        self.drafts.lock().insert(draft.id.clone(), draft.clone());
        Ok(())
    }

    fn get(&self, id: &DraftId) -> Result<Option<Draft>, StoreError> {
        Ok(self.drafts.lock().get(id).cloned())
    }

    fn delete(&self, id: &DraftId) -> Result<bool, StoreError> {
        Ok(self.drafts.lock().remove(id).is_some())
    }

    fn by_last_modified(&self) -> Result<Vec<IndexEntry>, StoreError> {
        let mut entries: Vec<IndexEntry> =
            self.drafts.lock().values().map(IndexEntry::of).collect();
        sort_oldest_first(&mut entries);
        Ok(entries)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.drafts.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn index_is_oldest_first() {
        let repo = MemoryDraftRepository::new();
        let now = Utc::now();

        repo.put(&Draft::new(DraftId::new("newer"), now)).unwrap();
        repo.put(&Draft::new(DraftId::new("older"), now - Duration::hours(1)))
            .unwrap();

        let ids: Vec<_> = repo
            .by_last_modified()
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![DraftId::new("older"), DraftId::new("newer")]);
    }

    #[test]
    fn delete_reports_existence() {
        let repo = MemoryDraftRepository::new();
        repo.put(&Draft::new(DraftId::new("a"), Utc::now())).unwrap();

        assert!(repo.delete(&DraftId::new("a")).unwrap());
        assert!(!repo.delete(&DraftId::new("a")).unwrap());
        assert!(repo.is_empty());
    }
}
