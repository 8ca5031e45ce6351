//! Autosave coordinator
//!
//! Owns the in-memory copy of one draft and decides, on every tick, whether it
//! is persisted locally, pushed to the server, or held back:
//! - local persistence always happens first and never blocks editing
//! - unlinked drafts (no server report yet) stay local
//! - a conflict or an expired session stops the remote path until the user acts
//! - transient failures keep the draft dirty for the next tick, without backoff
//!
//! The internal lock is never held across a network await, and at most one
//! remote save is in flight per draft.

use crate::api::{RemoteError, ReportApi};
use crate::conflict::{ConflictContext, Resolution, ResolutionOutcome};
use crate::events::{EventBus, SyncEvent};
use crate::session::SessionGuard;
use crate::state::{validate_transition, AutosaveState};
use draftsync_core::{
    Clock, Draft, DraftId, Precondition, ReportId, ReportPayload, SyncError, UpdateReceipt,
};
use draftsync_store::LocalDraftStore;
use parking_lot::Mutex;
use std::sync::Arc;

/// Collaborators shared by every coordinator of a session
#[derive(Debug, Clone)]
pub struct SyncContext {
    /// Local draft store
    pub store: LocalDraftStore,
    /// Remote report API
    pub api: Arc<dyn ReportApi>,
    /// Session gate shared across drafts
    pub guard: Arc<SessionGuard>,
    /// Event bus shared across drafts
    pub events: EventBus,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Why a tick stayed local
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOnlyReason {
    /// No server report exists yet
    Unlinked,
    /// Waiting for conflict resolution
    Conflicted,
    /// Session suspended
    Suspended,
}

/// What a tick did
#[derive(Debug)]
pub enum TickOutcome {
    /// A remote save was already in flight
    InFlight,
    /// Nothing to save
    Clean,
    /// The draft was cancelled or submitted
    Closed,
    /// Persisted (or tried to) without contacting the server
    LocalOnly {
        /// Why the remote path was skipped
        reason: LocalOnlyReason,
        /// Whether the local write succeeded
        persisted: bool,
    },
    /// Server accepted the save
    SavedRemote(UpdateReceipt),
    /// Server rejected the save; resolution required
    Conflict(ConflictContext),
    /// Session expired during the save
    AuthExpired,
    /// Transient failure; the draft stays dirty
    RetryLater(SyncError),
}

#[derive(Debug)]
struct Inner {
    draft: Draft,
    state: AutosaveState,
    dirty: bool,
    edit_generation: u64,
    in_flight: bool,
    conflict: Option<ConflictContext>,
    storage_degraded: bool,
    closed: bool,
}

impl Inner {
    fn transition(&mut self, to: AutosaveState) -> Result<(), SyncError> {
        validate_transition(self.state, to)?;
        tracing::debug!("Draft {}: {} -> {}", self.draft.id, self.state, to);
        self.state = to;
        Ok(())
    }

    /// Leave `Saving` after a remote call. The coordinator is the only writer
    /// of `state` while `in_flight` is set, so this cannot fail.
    fn finish(&mut self, to: AutosaveState) {
        self.in_flight = false;
        if let Err(err) = self.transition(to) {
            tracing::error!("Draft {}: {}", self.draft.id, err);
            self.state = to;
        }
    }
}

/// Snapshot taken under the lock before a remote call
struct Outgoing {
    report_id: ReportId,
    payload: ReportPayload,
    precondition: Precondition,
    generation: u64,
}

/// Drives autosave for one draft
#[derive(Debug)]
pub struct AutosaveCoordinator {
    ctx: SyncContext,
    inner: Mutex<Inner>,
}

impl AutosaveCoordinator {
    /// Coordinate an in-memory draft. It starts clean; call
    /// [`edit`](Self::edit) to mark changes.
    #[must_use]
    pub fn new(ctx: SyncContext, draft: Draft) -> Self {
        Self {
            ctx,
            inner: Mutex::new(Inner {
                draft,
                state: AutosaveState::Idle,
                dirty: false,
                edit_generation: 0,
                in_flight: false,
                conflict: None,
                storage_degraded: false,
                closed: false,
            }),
        }
    }

    /// Resume a stored draft, delivering any pending eviction notice once
    ///
    /// # Errors
    /// `SyncError::StorageUnavailable` / `SyncError::Corrupt` if the draft cannot be read
    pub fn open(ctx: SyncContext, id: &DraftId) -> Result<Option<Self>, SyncError> {
        let Some(opened) = ctx.store.open(id)? else {
            return Ok(None);
        };
        if let Some(notice) = opened.notice.clone() {
            ctx.events.publish(SyncEvent::EvictionNotice {
                draft_id: opened.draft.id.clone(),
                notice,
            });
        }
        Ok(Some(Self::new(ctx, opened.draft)))
    }

    /// Shared collaborators
    #[must_use]
    pub fn context(&self) -> &SyncContext {
        &self.ctx
    }

    /// Current autosave state
    #[must_use]
    pub fn state(&self) -> AutosaveState {
        self.inner.lock().state
    }

    /// Whether there are changes not yet accepted where they need to go
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    /// Copy of the in-memory draft
    #[must_use]
    pub fn draft(&self) -> Draft {
        self.inner.lock().draft.clone()
    }

    /// Local key of the draft
    #[must_use]
    pub fn draft_id(&self) -> DraftId {
        self.inner.lock().draft.id.clone()
    }

    /// Conflict awaiting a decision, if any
    #[must_use]
    pub fn pending_conflict(&self) -> Option<ConflictContext> {
        self.inner.lock().conflict.clone()
    }

    /// Apply a user edit and mark the draft dirty
    pub fn edit<R>(&self, f: impl FnOnce(&mut Draft) -> R) -> R {
        let mut inner = self.inner.lock();
        let result = f(&mut inner.draft);
        inner.dirty = true;
        inner.edit_generation += 1;
        result
    }

    /// Persist the in-memory draft. Storage failures degrade to a one-time
    /// warning; the session carries on in memory.
    fn persist_local(&self, inner: &mut Inner) -> bool {
        match self.ctx.store.save_with_report(inner.draft.clone()) {
            Ok((saved, report)) => {
                inner.draft.last_modified_local = saved.last_modified_local;
                if let Some(notice) = report.notice_for(&saved.id) {
                    inner.draft.attachments = saved.attachments.clone();
                    self.ctx.events.publish(SyncEvent::EvictionNotice {
                        draft_id: saved.id.clone(),
                        notice: notice.clone(),
                    });
                }
                if inner.storage_degraded {
                    inner.storage_degraded = false;
                    tracing::info!("Local storage recovered for draft {}", saved.id);
                    self.ctx.events.publish(SyncEvent::StorageRecovered {
                        draft_id: saved.id.clone(),
                    });
                }
                self.ctx.events.publish(SyncEvent::SavedLocally {
                    draft_id: saved.id,
                    at: saved.last_modified_local,
                });
                true
            }
            Err(err) => {
                if !inner.storage_degraded {
                    inner.storage_degraded = true;
                    tracing::warn!(
                        "Local storage unavailable for draft {}: {}",
                        inner.draft.id,
                        err
                    );
                    self.ctx.events.publish(SyncEvent::StorageDegraded {
                        draft_id: inner.draft.id.clone(),
                        reason: err.to_string(),
                    });
                } else {
                    tracing::debug!("Local storage still unavailable: {}", err);
                }
                false
            }
        }
    }

    /// One autosave tick
    pub async fn tick(&self) -> TickOutcome {
        self.run(false).await
    }

    /// Manual save, same path as a tick
    pub async fn save_now(&self) -> TickOutcome {
        self.tick().await
    }

    async fn run(&self, force_push: bool) -> TickOutcome {
        let outgoing = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return TickOutcome::Closed;
            }
            if inner.in_flight {
                return TickOutcome::InFlight;
            }
            if !inner.dirty && !force_push {
                return TickOutcome::Clean;
            }

            let persisted = self.persist_local(&mut inner);

            let Some(report_id) = inner.draft.report_id else {
                if persisted {
                    inner.dirty = false;
                }
                return TickOutcome::LocalOnly {
                    reason: LocalOnlyReason::Unlinked,
                    persisted,
                };
            };

            if inner.state == AutosaveState::Conflicted {
                return TickOutcome::LocalOnly {
                    reason: LocalOnlyReason::Conflicted,
                    persisted,
                };
            }
            if !self.ctx.guard.is_remote_allowed() {
                return TickOutcome::LocalOnly {
                    reason: LocalOnlyReason::Suspended,
                    persisted,
                };
            }
            if inner.state == AutosaveState::AuthExpired {
                tracing::info!("Draft {}: session restored, replaying save", inner.draft.id);
                if let Err(err) = inner.transition(AutosaveState::Idle) {
                    return TickOutcome::RetryLater(err);
                }
            }
            if let Err(err) = inner.transition(AutosaveState::Saving) {
                return TickOutcome::RetryLater(err);
            }
            inner.in_flight = true;

            Outgoing {
                report_id,
                payload: inner.draft.to_payload(),
                precondition: Precondition::observed(
                    inner.draft.last_known_server_marker,
                    inner.draft.last_known_server_version,
                ),
                generation: inner.edit_generation,
            }
        };

        let result = self
            .ctx
            .api
            .update(outgoing.report_id, &outgoing.payload, outgoing.precondition)
            .await;

        let mut inner = self.inner.lock();
        match result {
            Ok(receipt) => {
                inner.finish(AutosaveState::Idle);
                self.accept(&mut inner, receipt, outgoing.generation);
                TickOutcome::SavedRemote(receipt)
            }
            Err(RemoteError::Conflict { report_id, details }) => {
                inner.finish(AutosaveState::Conflicted);
                let context = ConflictContext {
                    draft_id: inner.draft.id.clone(),
                    report_id,
                    local_marker: outgoing.precondition.if_unmodified_since.map(|(m, _)| m),
                    server_updated_by: details.updated_by,
                    server_updated_at: details.updated_at,
                    detected_at: self.ctx.clock.now(),
                };
                tracing::warn!(
                    "Draft {}: report {} was modified by {} at {}",
                    context.draft_id,
                    report_id,
                    context.server_updated_by,
                    context.server_updated_at
                );
                inner.conflict = Some(context.clone());
                self.ctx.events.publish(SyncEvent::ConflictDetected(context.clone()));
                TickOutcome::Conflict(context)
            }
            Err(RemoteError::AuthExpired) => {
                inner.finish(AutosaveState::AuthExpired);
                drop(inner);
                self.ctx.guard.suspend();
                TickOutcome::AuthExpired
            }
            Err(err) => {
                inner.finish(AutosaveState::Idle);
                tracing::warn!(
                    "Draft {}: remote save failed, retrying next tick: {}",
                    inner.draft.id,
                    err
                );
                TickOutcome::RetryLater(err.into())
            }
        }
    }

    /// Record a server receipt on the in-memory draft and persist it
    fn accept(&self, inner: &mut Inner, receipt: UpdateReceipt, generation: u64) {
        inner.draft.record_server_marker(receipt.updated_at, receipt.version);
        if inner.edit_generation == generation {
            inner.dirty = false;
        }
        self.persist_local(inner);
        tracing::info!(
            "Draft {} saved as report {} (version {})",
            inner.draft.id,
            receipt.report_id,
            receipt.version
        );
        self.ctx.events.publish(SyncEvent::SavedRemote {
            draft_id: inner.draft.id.clone(),
            receipt,
        });
    }

    /// Create the server report for an unlinked draft and link it.
    ///
    /// A draft still keyed by the placeholder id is re-keyed to the report id.
    /// Already-linked drafts return their existing id.
    ///
    /// # Errors
    /// `SyncError::AuthExpired` if the session is suspended or expires,
    /// `SyncError::NetworkFailure` for transport failures,
    /// `SyncError::InvalidTransition` while another save is in flight
    pub async fn create_remote(&self) -> Result<ReportId, SyncError> {
        let (payload, generation) = {
            let mut inner = self.inner.lock();
            if let Some(report_id) = inner.draft.report_id {
                return Ok(report_id);
            }
            if !self.ctx.guard.is_remote_allowed() {
                return Err(SyncError::AuthExpired);
            }
            if inner.state == AutosaveState::AuthExpired {
                inner.transition(AutosaveState::Idle)?;
            }
            inner.transition(AutosaveState::Saving)?;
            inner.in_flight = true;
            (inner.draft.to_payload(), inner.edit_generation)
        };

        let result = self.ctx.api.create(&payload).await;

        let mut inner = self.inner.lock();
        match result {
            Ok(receipt) => {
                inner.finish(AutosaveState::Idle);
                inner.draft.report_id = Some(receipt.report_id);
                if inner.draft.id.is_unsaved() {
                    let placeholder = inner.draft.id.clone();
                    inner.draft.id = DraftId::new(receipt.report_id.to_string());
                    if let Err(err) = self.ctx.store.delete(&placeholder) {
                        tracing::warn!(
                            "Could not remove placeholder draft {}: {}",
                            placeholder,
                            err
                        );
                    }
                }
                self.accept(&mut inner, receipt, generation);
                Ok(receipt.report_id)
            }
            Err(RemoteError::AuthExpired) => {
                inner.finish(AutosaveState::AuthExpired);
                drop(inner);
                self.ctx.guard.suspend();
                Err(SyncError::AuthExpired)
            }
            Err(err) => {
                inner.finish(AutosaveState::Idle);
                Err(err.into())
            }
        }
    }

    /// Final save: push the draft (creating the report if needed) and drop
    /// the local copy once the server has it.
    ///
    /// # Errors
    /// Whatever stopped the final save; the draft stays local and dirty
    pub async fn submit(&self) -> Result<UpdateReceipt, SyncError> {
        if self.inner.lock().draft.report_id.is_none() {
            self.create_remote().await?;
        }

        match self.run(true).await {
            TickOutcome::SavedRemote(receipt) => {
                let id = {
                    let mut inner = self.inner.lock();
                    inner.closed = true;
                    inner.dirty = false;
                    inner.draft.id.clone()
                };
                if let Err(err) = self.ctx.store.delete(&id) {
                    tracing::warn!("Submitted draft {} could not be removed locally: {}", id, err);
                }
                tracing::info!("Draft {} submitted as report {}", id, receipt.report_id);
                Ok(receipt)
            }
            TickOutcome::Conflict(context) => Err(conflict_error(&context)),
            TickOutcome::LocalOnly {
                reason: LocalOnlyReason::Conflicted,
                ..
            } => match self.pending_conflict() {
                Some(context) => Err(conflict_error(&context)),
                None => Err(SyncError::InvalidTransition {
                    from: AutosaveState::Conflicted.as_str(),
                    to: AutosaveState::Saving.as_str(),
                }),
            },
            TickOutcome::AuthExpired
            | TickOutcome::LocalOnly {
                reason: LocalOnlyReason::Suspended,
                ..
            } => Err(SyncError::AuthExpired),
            TickOutcome::RetryLater(err) => Err(err),
            TickOutcome::InFlight => Err(SyncError::InvalidTransition {
                from: AutosaveState::Saving.as_str(),
                to: AutosaveState::Saving.as_str(),
            }),
            TickOutcome::Closed
            | TickOutcome::Clean
            | TickOutcome::LocalOnly {
                reason: LocalOnlyReason::Unlinked,
                ..
            } => Err(SyncError::NotFound(format!("draft {}", self.draft_id()))),
        }
    }

    /// Abandon the draft and delete its local copy
    ///
    /// # Errors
    /// `SyncError::StorageUnavailable` if the local delete fails
    pub fn cancel(&self) -> Result<(), SyncError> {
        let id = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            inner.dirty = false;
            inner.draft.id.clone()
        };
        self.ctx.store.delete(&id)?;
        tracing::info!("Draft {} cancelled", id);
        Ok(())
    }

    /// Apply the user's decision to a pending conflict.
    ///
    /// On failure the conflict stays pending so the choice can be offered again.
    ///
    /// # Errors
    /// - `SyncError::InvalidTransition` if no conflict is pending
    /// - `SyncError::AuthExpired` / `SyncError::NetworkFailure` if the remote call fails
    pub async fn resolve_conflict(
        &self,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome, SyncError> {
        let (context, payload, generation) = {
            let mut inner = self.inner.lock();
            let Some(context) = inner.conflict.clone() else {
                return Err(SyncError::InvalidTransition {
                    from: inner.state.as_str(),
                    to: AutosaveState::Idle.as_str(),
                });
            };
            if inner.in_flight {
                return Err(SyncError::InvalidTransition {
                    from: AutosaveState::Saving.as_str(),
                    to: AutosaveState::Idle.as_str(),
                });
            }
            inner.in_flight = true;
            (context, inner.draft.to_payload(), inner.edit_generation)
        };

        tracing::info!("Draft {}: resolving conflict with {:?}", context.draft_id, resolution);

        let outcome = match resolution {
            Resolution::DiscardLocal => self.ctx.api.fetch(context.report_id).await.map(|report| {
                let mut inner = self.inner.lock();
                inner.draft.apply_server_report(&report);
                inner.dirty = false;
                self.persist_local(&mut inner);
                ResolutionOutcome {
                    resolution,
                    marker: report.updated_at,
                    version: report.version,
                }
            }),
            Resolution::ForceOverwrite => self
                .ctx
                .api
                .update(context.report_id, &payload, Precondition::none())
                .await
                .map(|receipt| {
                    let mut inner = self.inner.lock();
                    self.accept(&mut inner, receipt, generation);
                    ResolutionOutcome {
                        resolution,
                        marker: receipt.updated_at,
                        version: receipt.version,
                    }
                }),
        };

        let mut inner = self.inner.lock();
        inner.in_flight = false;
        match outcome {
            Ok(outcome) => {
                inner.conflict = None;
                inner.transition(AutosaveState::Idle)?;
                Ok(outcome)
            }
            Err(RemoteError::AuthExpired) => {
                drop(inner);
                self.ctx.guard.suspend();
                Err(SyncError::AuthExpired)
            }
            Err(err) => {
                tracing::warn!("Draft {}: conflict resolution failed: {}", context.draft_id, err);
                Err(err.into())
            }
        }
    }
}

fn conflict_error(context: &ConflictContext) -> SyncError {
    SyncError::Conflict {
        report_id: context.report_id,
        updated_by: context.server_updated_by.clone(),
        updated_at: context.server_updated_at,
    }
}
