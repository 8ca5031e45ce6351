//! Local draft store
//!
//! The contract the autosave coordinator talks to. Every [`LocalDraftStore::save`]
//! stamps the draft with the injected clock and then runs the eviction engine
//! before returning, so the retention caps hold after every mutation.

use crate::error::StoreError;
use crate::eviction::{EvictionPolicyEngine, EvictionReport};
use crate::file::{FileDraftRepository, WriteDurability};
use crate::memory::MemoryDraftRepository;
use crate::repository::DraftRepository;
use draftsync_core::{
    Clock, Draft, DraftId, EvictionNotice, RetentionPolicy, SyncConfig, SyncError,
};
use std::sync::Arc;

/// Snapshot of store usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    /// Drafts currently stored
    pub draft_count: usize,
    /// Draft count cap
    pub max_drafts: usize,
    /// Aggregate attachment estimate
    pub attachment_bytes: u64,
    /// Attachment cap
    pub max_attachment_bytes: u64,
    /// `attachment_bytes` as a rounded percentage of the cap
    pub usage_percent: u32,
}

/// A draft loaded for editing, with any eviction notice it was carrying
#[derive(Debug, Clone, PartialEq)]
pub struct OpenedDraft {
    /// The draft (notice already cleared)
    pub draft: Draft,
    /// Notice to show once
    pub notice: Option<EvictionNotice>,
}

impl OpenedDraft {
    /// The notice as an error the host can surface
    #[must_use]
    pub fn data_loss(&self) -> Option<SyncError> {
        self.notice.clone().map(|notice| SyncError::EvictionDataLoss {
            draft_id: self.draft.id.clone(),
            notice,
        })
    }
}

/// Durable, retention-enforcing draft cache
#[derive(Debug, Clone)]
pub struct LocalDraftStore {
    repo: Arc<dyn DraftRepository>,
    engine: EvictionPolicyEngine,
    clock: Arc<dyn Clock>,
}

impl LocalDraftStore {
    /// Create a store over any repository
    #[must_use]
    pub fn new(
        repo: Arc<dyn DraftRepository>,
        policy: RetentionPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            engine: EvictionPolicyEngine::new(policy),
            clock,
        }
    }

    /// Memory-only store
    #[must_use]
    pub fn in_memory(policy: RetentionPolicy, clock: Arc<dyn Clock>) -> Self {
        Self::new(Arc::new(MemoryDraftRepository::new()), policy, clock)
    }

    /// Build the store described by a configuration.
    ///
    /// Uses a [`FileDraftRepository`] under `store_dir`, or memory when no
    /// directory is configured.
    ///
    /// # Errors
    /// `StoreError` if the store directory cannot be opened
    pub fn from_config(config: &SyncConfig, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let repo: Arc<dyn DraftRepository> = match &config.store_dir {
            Some(dir) => {
                let durability = if config.durable_writes {
                    WriteDurability::Durable
                } else {
                    WriteDurability::Fast
                };
                Arc::new(FileDraftRepository::open(dir)?.with_durability(durability))
            }
            None => {
                tracing::warn!("No store directory configured, drafts will not survive restart");
                Arc::new(MemoryDraftRepository::new())
            }
        };
        Ok(Self::new(repo, config.retention, clock))
    }

    /// Retention policy in force
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        self.engine.policy()
    }

    /// Upsert a draft, stamping `last_modified_local`, then enforce retention.
    ///
    /// Returns the draft as stored after eviction.
    ///
    /// # Errors
    /// `StoreError` if the write itself fails; eviction failures are logged
    pub fn save(&self, draft: Draft) -> Result<Draft, StoreError> {
        self.save_with_report(draft).map(|(draft, _)| draft)
    }

    /// [`save`](Self::save), also returning what eviction did
    ///
    /// # Errors
    /// `StoreError` if the write itself fails
    pub fn save_with_report(
        &self,
        mut draft: Draft,
    ) -> Result<(Draft, EvictionReport), StoreError> {
        let now = self.clock.now();
        draft.last_modified_local = now;

        // Callers hold their own copy; an unread notice only exists on disk.
        if draft.eviction_notice.is_none() {
            match self.repo.get(&draft.id) {
                Ok(Some(stored)) => draft.eviction_notice = stored.eviction_notice,
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!("Could not read previous copy of {}: {}", draft.id, err)
                }
            }
        }

        self.repo.put(&draft)?;
        tracing::debug!("Saved draft {} locally", draft.id);

        let report = match self
            .engine
            .enforce_keeping(self.repo.as_ref(), now, Some(&draft.id))
        {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!("Retention pass failed after saving {}: {}", draft.id, err);
                return Ok((draft, EvictionReport::default()));
            }
        };

        if report.notice_for(&draft.id).is_some() {
            if let Some(stored) = self.repo.get(&draft.id)? {
                draft = stored;
            }
        }

        Ok((draft, report))
    }

    /// Fetch a draft
    ///
    /// # Errors
    /// `StoreError` if the medium cannot be read
    pub fn get(&self, id: &DraftId) -> Result<Option<Draft>, StoreError> {
        self.repo.get(id)
    }

    /// Delete a draft, returning whether it existed
    ///
    /// # Errors
    /// `StoreError` if the medium rejects the delete
    pub fn delete(&self, id: &DraftId) -> Result<bool, StoreError> {
        let existed = self.repo.delete(id)?;
        if existed {
            tracing::info!("Deleted draft {}", id);
        }
        Ok(existed)
    }

    /// Every draft, least-recently-modified first
    ///
    /// # Errors
    /// `StoreError` if any draft cannot be read
    pub fn all(&self) -> Result<Vec<Draft>, StoreError> {
        self.repo.all()
    }

    /// Whether a draft is stored
    ///
    /// # Errors
    /// `StoreError` if the index cannot be read
    pub fn exists(&self, id: &DraftId) -> Result<bool, StoreError> {
        Ok(self
            .repo
            .by_last_modified()?
            .iter()
            .any(|entry| entry.id == *id))
    }

    /// Delete every draft
    ///
    /// # Errors
    /// `StoreError` on the first failed delete
    pub fn clear(&self) -> Result<(), StoreError> {
        self.repo.clear()?;
        tracing::info!("Cleared all local drafts");
        Ok(())
    }

    /// Usage against the retention caps
    ///
    /// # Errors
    /// `StoreError` if the index cannot be read
    pub fn stats(&self) -> Result<StorageStats, StoreError> {
        let index = self.repo.by_last_modified()?;
        let policy = self.policy();
        let attachment_bytes: u64 = index.iter().map(|e| e.attachment_bytes).sum();
        let usage_percent = if policy.max_attachment_bytes == 0 {
            0
        } else {
            let scaled = (u128::from(attachment_bytes) * 100
                + u128::from(policy.max_attachment_bytes) / 2)
                / u128::from(policy.max_attachment_bytes);
            u32::try_from(scaled).unwrap_or(u32::MAX)
        };

        Ok(StorageStats {
            draft_count: index.len(),
            max_drafts: policy.max_drafts,
            attachment_bytes,
            max_attachment_bytes: policy.max_attachment_bytes,
            usage_percent,
        })
    }

    /// Load a draft for editing, consuming its eviction notice.
    ///
    /// The notice is cleared on disk without re-stamping the draft, so opening
    /// does not change its retention order.
    ///
    /// # Errors
    /// `StoreError` if the draft cannot be read or the cleared copy cannot be written
    pub fn open(&self, id: &DraftId) -> Result<Option<OpenedDraft>, StoreError> {
        let Some(mut draft) = self.repo.get(id)? else {
            return Ok(None);
        };

        let notice = draft.eviction_notice.take();
        if let Some(notice) = &notice {
            self.repo.put(&draft)?;
            tracing::info!("Delivered eviction notice for draft {}: {}", id, notice);
        }

        Ok(Some(OpenedDraft { draft, notice }))
    }

    /// Run a retention pass without saving anything
    ///
    /// # Errors
    /// `StoreError` on the first repository failure
    pub fn enforce_retention(&self) -> Result<EvictionReport, StoreError> {
        self.engine.enforce(self.repo.as_ref(), self.clock.now())
    }
}
