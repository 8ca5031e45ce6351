//! draftsync core - shared model for offline-tolerant report drafts
//!
//! Everything both sides of the wire agree on lives here:
//! - Draft, attachment and server report types
//! - The concurrency [`Marker`] and its header encoding
//! - The [`SyncError`] taxonomy shared by the store, client and server
//! - [`SyncConfig`] and the retention limits enforced on the client
//! - An injectable [`Clock`] so timers and retention can be driven from tests
//!
//! # Example
//!
//! ```rust
//! use draftsync_core::{AttachmentRef, Draft, DraftId, SystemClock, Clock};
//!
//! let now = SystemClock.now();
//! let mut draft = Draft::new(DraftId::generate(), now);
//! draft.set_field("school_id", 7.into());
//! draft.add_attachment(AttachmentRef::from_preview("photo-1", "aGVsbG8="));
//! assert_eq!(draft.attachment_bytes(), 6);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod attachment;
pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use attachment::{estimate_preview_bytes, AttachmentRef, PreviewHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RetentionPolicy, SyncConfig, MIB};
pub use error::{ConfigError, SyncError};
pub use types::{
    ConflictDetails, Draft, DraftId, EvictionNotice, Marker, MarkerParseError, MarkerPrecision,
    Precondition, ReportId, ReportPayload, ServerReport, UpdateReceipt,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with draftsync types
    pub use crate::{
        AttachmentRef, Clock, Draft, DraftId, Marker, Precondition, ReportId, ReportPayload,
        ServerReport, SyncConfig, SyncError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
