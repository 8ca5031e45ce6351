//! draftsync local draft store
//!
//! Durable, keyed cache of in-progress report drafts with enforced retention:
//! - [`DraftRepository`]: storage seam (`put/get/delete/all` + ordered index)
//! - [`FileDraftRepository`]: one JSON document per draft, atomic writes
//! - [`MemoryDraftRepository`]: in-process repository for tests and degraded sessions
//! - [`EvictionPolicyEngine`]: age, count and attachment-size caps
//! - [`LocalDraftStore`]: the contract the autosave coordinator talks to
//!
//! # Example
//!
//! ```rust,ignore
//! use draftsync_store::LocalDraftStore;
//! use draftsync_core::{Draft, DraftId, SyncConfig, SystemClock};
//! use std::sync::Arc;
//!
//! let config = SyncConfig::new().with_store_dir("/var/lib/field-app/drafts");
//! let store = LocalDraftStore::from_config(&config, Arc::new(SystemClock))?;
//!
//! let saved = store.save(Draft::new(DraftId::unsaved(), chrono::Utc::now()))?;
//! assert!(store.exists(&saved.id)?);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod error;
pub mod eviction;
pub mod file;
pub mod memory;
pub mod repository;
pub mod store;

pub use error::StoreError;
pub use eviction::{EvictionPlan, EvictionPolicyEngine, EvictionReport};
pub use file::{FileDraftRepository, WriteDurability};
pub use memory::MemoryDraftRepository;
pub use repository::{DraftRepository, IndexEntry};
pub use store::{LocalDraftStore, OpenedDraft, StorageStats};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
