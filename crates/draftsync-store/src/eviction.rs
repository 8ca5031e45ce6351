//! Retention enforcement
//!
//! Three caps, always applied in this order:
//! 1. age: drafts untouched for longer than `max_age_days` are deleted
//! 2. count: only the `max_drafts` most recently modified drafts survive
//! 3. attachment bytes: attachments are stripped from the oldest drafts until
//!    the aggregate estimate is back under `max_attachment_bytes`
//!
//! [`EvictionPolicyEngine::plan`] is pure over an index snapshot;
//! [`EvictionPolicyEngine::enforce`] applies a plan to a repository.

use crate::error::StoreError;
use crate::repository::{DraftRepository, IndexEntry};
use chrono::{DateTime, Utc};
use draftsync_core::{DraftId, EvictionNotice, RetentionPolicy};

/// What a retention pass would do to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionPlan {
    /// Deleted for age
    pub expired: Vec<DraftId>,
    /// Deleted for count, oldest first
    pub over_count: Vec<DraftId>,
    /// Attachments stripped, oldest first
    pub strip: Vec<DraftId>,
}

impl EvictionPlan {
    /// Whether the plan changes nothing
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.over_count.is_empty() && self.strip.is_empty()
    }
}

/// What a retention pass actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Deleted for age
    pub expired: Vec<DraftId>,
    /// Deleted for count
    pub over_count: Vec<DraftId>,
    /// Stripped drafts and the notice each one received
    pub stripped: Vec<(DraftId, EvictionNotice)>,
}

impl EvictionReport {
    /// Whether nothing was evicted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.over_count.is_empty() && self.stripped.is_empty()
    }

    /// Whether `id` was deleted by this pass
    #[must_use]
    pub fn deleted(&self, id: &DraftId) -> bool {
        self.expired.contains(id) || self.over_count.contains(id)
    }

    /// Notice issued to `id` by this pass, if it was stripped
    #[must_use]
    pub fn notice_for(&self, id: &DraftId) -> Option<&EvictionNotice> {
        self.stripped
            .iter()
            .find(|(stripped, _)| stripped == id)
            .map(|(_, notice)| notice)
    }
}

/// Applies a [`RetentionPolicy`] to stored drafts
#[derive(Debug, Clone, Default)]
pub struct EvictionPolicyEngine {
    policy: RetentionPolicy,
}

impl EvictionPolicyEngine {
    /// Create an engine for a policy
    #[inline]
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    /// Policy in force
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Plan a retention pass over an index snapshot (any order).
    #[must_use]
    pub fn plan(&self, snapshot: &[IndexEntry], now: DateTime<Utc>) -> EvictionPlan {
        self.plan_keeping(snapshot, now, None)
    }

    /// Plan a retention pass that never deletes `keep`.
    ///
    /// `keep` is the draft that was just written. It ranks as the newest entry
    /// whatever its timestamp says, so a clock that stepped back or a shared
    /// timestamp cannot evict it; its attachments may still be stripped.
    #[must_use]
    pub fn plan_keeping(
        &self,
        snapshot: &[IndexEntry],
        now: DateTime<Utc>,
        keep: Option<&DraftId>,
    ) -> EvictionPlan {
        let mut entries: Vec<&IndexEntry> = snapshot.iter().collect();
        entries.sort_by(|a, b| {
            a.last_modified_local
                .cmp(&b.last_modified_local)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut plan = EvictionPlan::default();
        let cutoff = now - self.policy.max_age();

        let (expired, mut retained): (Vec<&IndexEntry>, Vec<&IndexEntry>) = entries
            .into_iter()
            .partition(|entry| entry.last_modified_local < cutoff && Some(&entry.id) != keep);
        plan.expired = expired.into_iter().map(|e| e.id.clone()).collect();

        if let Some(pos) = retained.iter().position(|e| Some(&e.id) == keep) {
            let kept = retained.remove(pos);
            retained.push(kept);
        }

        if retained.len() > self.policy.max_drafts {
            let excess = retained.len() - self.policy.max_drafts;
            plan.over_count = retained.drain(..excess).map(|e| e.id.clone()).collect();
        }

        let mut total: u64 = retained.iter().map(|e| e.attachment_bytes).sum();
        for entry in retained {
            if total <= self.policy.max_attachment_bytes {
                break;
            }
            if entry.attachment_bytes == 0 {
                continue;
            }
            total -= entry.attachment_bytes;
            plan.strip.push(entry.id.clone());
        }

        plan
    }

    /// Run a retention pass against a repository.
    ///
    /// Stripped drafts are written back with their original
    /// `last_modified_local` so they keep their place in the retention order.
    ///
    /// # Errors
    /// `StoreError` on the first repository failure; earlier steps stay applied
    pub fn enforce(
        &self,
        repo: &dyn DraftRepository,
        now: DateTime<Utc>,
    ) -> Result<EvictionReport, StoreError> {
        self.enforce_keeping(repo, now, None)
    }

    /// [`enforce`](Self::enforce) with [`plan_keeping`](Self::plan_keeping)
    ///
    /// # Errors
    /// `StoreError` on the first repository failure; earlier steps stay applied
    pub fn enforce_keeping(
        &self,
        repo: &dyn DraftRepository,
        now: DateTime<Utc>,
        keep: Option<&DraftId>,
    ) -> Result<EvictionReport, StoreError> {
        let snapshot = repo.by_last_modified()?;
        let plan = self.plan_keeping(&snapshot, now, keep);
        if plan.is_empty() {
            return Ok(EvictionReport::default());
        }

        let mut report = EvictionReport::default();

        for id in plan.expired {
            repo.delete(&id)?;
            tracing::info!("Evicted draft {} (older than {} days)", id, self.policy.max_age_days);
            report.expired.push(id);
        }

        for id in plan.over_count {
            repo.delete(&id)?;
            tracing::info!("Evicted draft {} (over {} drafts)", id, self.policy.max_drafts);
            report.over_count.push(id);
        }

        for id in plan.strip {
            let Some(mut draft) = repo.get(&id)? else {
                continue;
            };

            let (count, bytes) = draft.strip_attachments();
            let notice = EvictionNotice {
                stripped_attachments: count,
                reclaimed_bytes: bytes,
                at: now,
            };
            draft.eviction_notice = Some(match draft.eviction_notice.take() {
                Some(unread) => unread.merge(notice.clone()),
                None => notice.clone(),
            });
            repo.put(&draft)?;

            tracing::warn!("Stripped attachments from draft {}: {}", id, notice);
            report.stripped.push((id, notice));
        }

        Ok(report)
    }
}
