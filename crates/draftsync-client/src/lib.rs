//! draftsync client - autosave, conflict handling and session gating
//!
//! Sits between the editing UI and the report server:
//! - [`AutosaveCoordinator`] persists locally first, then pushes with an
//!   optimistic-concurrency precondition
//! - [`AutosaveScheduler`] drives coordinators on a fixed interval
//! - [`SessionGuard`] suspends remote saves for every draft once the session
//!   expires and resumes them after re-authentication
//! - [`SyncEvent`]s tell the UI when a human has to step in
//!
//! # Example
//!
//! ```rust,no_run
//! use draftsync_client::prelude::*;
//! use draftsync_core::{Draft, DraftId, RetentionPolicy, SystemClock};
//! use draftsync_store::LocalDraftStore;
//! use std::sync::Arc;
//!
//! # async fn run() {
//! let events = EventBus::default();
//! let guard = Arc::new(SessionGuard::new("token", events.clone()));
//! let clock = Arc::new(SystemClock);
//! let ctx = SyncContext {
//!     store: LocalDraftStore::in_memory(RetentionPolicy::default(), clock.clone()),
//!     api: Arc::new(HttpReportApi::new("http://localhost:8080", guard.clone())),
//!     guard,
//!     events,
//!     clock: clock.clone(),
//! };
//!
//! let draft = Draft::new(DraftId::generate(), chrono::Utc::now());
//! let coordinator = Arc::new(AutosaveCoordinator::new(ctx, draft));
//! coordinator.edit(|d| d.set_field("notes", "first visit".into()));
//! coordinator.tick().await;
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod api;
pub mod conflict;
pub mod coordinator;
pub mod events;
pub mod http;
pub mod scheduler;
pub mod session;
pub mod state;

pub use api::{RemoteError, ReportApi};
pub use conflict::{ConflictContext, Resolution, ResolutionOutcome};
pub use coordinator::{AutosaveCoordinator, LocalOnlyReason, SyncContext, TickOutcome};
pub use events::{EventBus, SyncEvent};
pub use http::HttpReportApi;
pub use scheduler::{AutosaveScheduler, SchedulerHandle};
pub use session::SessionGuard;
pub use state::{allowed_transitions, validate_transition, AutosaveState};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving autosave
    pub use crate::{
        AutosaveCoordinator, AutosaveScheduler, AutosaveState, ConflictContext, EventBus,
        HttpReportApi, ReportApi, Resolution, SessionGuard, SyncContext, SyncEvent, TickOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
