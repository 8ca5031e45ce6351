//! Testing utilities for draftsync workspace
//!
//! Shared fixtures, a loopback report API backed by the real concurrency
//! controller, and a repository whose medium can be switched off.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use draftsync_client::{EventBus, RemoteError, ReportApi, SessionGuard, SyncContext};
use draftsync_core::{
    AttachmentRef, Clock, Draft, DraftId, ManualClock, Precondition, ReportId, ReportPayload,
    RetentionPolicy, ServerReport, UpdateReceipt, MIB,
};
use draftsync_server::{ConcurrencyController, InMemoryReportRepository, ServerError};
use draftsync_store::{
    DraftRepository, IndexEntry, LocalDraftStore, MemoryDraftRepository, StoreError,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Editor name the loopback uses for the local user
pub const LOCAL_EDITOR: &str = "inspector";

/// Fixed starting instant for manual clocks
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 3, 8, 0, 0).unwrap()
}

/// Draft carrying one attachment of `mib` mebibytes (exact size)
pub fn draft_with_attachment(id: &str, mib: u64, now: DateTime<Utc>) -> Draft {
    let mut draft = Draft::new(DraftId::new(id), now);
    if mib > 0 {
        draft.add_attachment(
            AttachmentRef::from_preview(format!("{id}-photo"), "aGVsbG8=")
                .with_exact_size(mib * MIB),
        );
    }
    draft
}

/// Small payload with one field and one checklist response
pub fn sample_payload(note: &str) -> ReportPayload {
    let mut draft = Draft::new(DraftId::unsaved(), t0());
    draft.set_field("notes", note.into());
    draft.set_response("safety", "exits_clear", true.into());
    draft.to_payload()
}

fn remote(err: ServerError) -> RemoteError {
    match err {
        ServerError::Conflict { report_id, details } => {
            RemoteError::Conflict { report_id, details }
        }
        ServerError::NotFound(id) => RemoteError::NotFound(id),
        ServerError::Unauthorized => RemoteError::AuthExpired,
        other => RemoteError::Network(other.to_string()),
    }
}

/// In-process [`ReportApi`] over a real [`ConcurrencyController`]
#[derive(Debug)]
pub struct LoopbackReportApi {
    controller: ConcurrencyController,
    offline: AtomicBool,
    expired: AtomicBool,
    latency: Mutex<Option<std::time::Duration>>,
    update_calls: AtomicUsize,
    create_calls: AtomicUsize,
    preconditions: Mutex<Vec<Precondition>>,
}

impl LoopbackReportApi {
    pub fn new(controller: ConcurrencyController) -> Self {
        Self {
            controller,
            offline: AtomicBool::new(false),
            expired: AtomicBool::new(false),
            latency: Mutex::new(None),
            update_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            preconditions: Mutex::new(Vec::new()),
        }
    }

    /// Controller behind the loopback, for writes by other editors
    pub fn controller(&self) -> &ConcurrencyController {
        &self.controller
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn expire_session(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    pub fn restore_session(&self) {
        self.expired.store(false, Ordering::SeqCst);
    }

    /// Delay every call by `latency` (tokio time, so it respects pause)
    pub fn set_latency(&self, latency: Option<std::time::Duration>) {
        *self.latency.lock() = latency;
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Preconditions sent with each update, in order
    pub fn preconditions(&self) -> Vec<Precondition> {
        self.preconditions.lock().clone()
    }

    /// Write as another editor, moving the report past the local marker
    pub fn write_as(&self, editor: &str, report_id: ReportId, note: &str) -> UpdateReceipt {
        self.controller
            .update(report_id, sample_payload(note), Precondition::none(), editor)
            .unwrap()
    }

    async fn gate(&self) -> Result<(), RemoteError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Network("connection refused".into()));
        }
        if self.expired.load(Ordering::SeqCst) {
            return Err(RemoteError::AuthExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl ReportApi for LoopbackReportApi {
    async fn update(
        &self,
        report_id: ReportId,
        payload: &ReportPayload,
        precondition: Precondition,
    ) -> Result<UpdateReceipt, RemoteError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.preconditions.lock().push(precondition);
        self.gate().await?;
        self.controller
            .update(report_id, payload.clone(), precondition, LOCAL_EDITOR)
            .map_err(remote)
    }

    async fn create(&self, payload: &ReportPayload) -> Result<UpdateReceipt, RemoteError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;
        self.controller.create(payload.clone(), LOCAL_EDITOR).map_err(remote)
    }

    async fn fetch(&self, report_id: ReportId) -> Result<ServerReport, RemoteError> {
        self.gate().await?;
        self.controller.get(report_id).map_err(remote)
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.gate().await
    }
}

/// Memory repository whose medium can be made unavailable
#[derive(Debug, Default)]
pub struct FlakyDraftRepository {
    inner: MemoryDraftRepository,
    unavailable: AtomicBool,
}

impl FlakyDraftRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("storage quota exceeded".into()))
        } else {
            Ok(())
        }
    }
}

impl DraftRepository for FlakyDraftRepository {
    fn put(&self, draft: &Draft) -> Result<(), StoreError> {
        self.check()?;
        self.inner.put(draft)
    }

    fn get(&self, id: &DraftId) -> Result<Option<Draft>, StoreError> {
        self.check()?;
        self.inner.get(id)
    }

    fn delete(&self, id: &DraftId) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete(id)
    }

    fn by_last_modified(&self) -> Result<Vec<IndexEntry>, StoreError> {
        self.check()?;
        self.inner.by_last_modified()
    }
}

/// Fully wired client side over a loopback server
pub struct Harness {
    pub clock: ManualClock,
    pub repo: Arc<FlakyDraftRepository>,
    pub api: Arc<LoopbackReportApi>,
    pub guard: Arc<SessionGuard>,
    pub events: EventBus,
    pub ctx: SyncContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(RetentionPolicy::default())
    }

    pub fn with_policy(policy: RetentionPolicy) -> Self {
        let clock = ManualClock::new(t0());
        let controller = ConcurrencyController::new(
            Arc::new(InMemoryReportRepository::new()),
            Arc::new(clock.clone()),
        );
        let api = Arc::new(LoopbackReportApi::new(controller));
        let repo = Arc::new(FlakyDraftRepository::new());
        let events = EventBus::new(256);
        let guard = Arc::new(SessionGuard::new("session-token", events.clone()));

        let ctx = SyncContext {
            store: LocalDraftStore::new(repo.clone(), policy, Arc::new(clock.clone())),
            api: api.clone(),
            guard: guard.clone(),
            events: events.clone(),
            clock: Arc::new(clock.clone()),
        };

        Self {
            clock,
            repo,
            api,
            guard,
            events,
            ctx,
        }
    }

    /// Advance the shared clock
    pub fn advance(&self, seconds: i64) {
        self.clock.advance(Duration::seconds(seconds));
    }

    /// Create a server report and a linked local draft for it
    pub fn linked_draft(&self, note: &str) -> Draft {
        let receipt = self.api.controller().create(sample_payload(note), LOCAL_EDITOR).unwrap();
        let report = self.api.controller().get(receipt.report_id).unwrap();
        Draft::linked(DraftId::new(receipt.report_id.to_string()), &report, self.clock.now())
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
