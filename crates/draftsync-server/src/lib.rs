//! draftsync server - optimistic-concurrency report endpoint
//!
//! Provides:
//! - [`ConcurrencyController`]: marker/version checked writes, atomic per report
//! - [`ReportRepository`] seam with a DashMap-backed [`InMemoryReportRepository`]
//! - [`Authenticator`] seam with a revocable [`StaticSessions`] table
//! - warp [`routes`](http::routes) for `PUT/POST/GET /reports` and `GET /me`
//!
//! # Example
//!
//! ```rust,ignore
//! use draftsync_server::{
//!     AppState, ConcurrencyController, InMemoryReportRepository, StaticSessions,
//! };
//! use draftsync_core::SystemClock;
//! use std::sync::Arc;
//!
//! let controller = ConcurrencyController::new(
//!     Arc::new(InMemoryReportRepository::new()),
//!     Arc::new(SystemClock),
//! );
//! let sessions = Arc::new(StaticSessions::from_pairs([("dev-token", "Dev User")]));
//! let state = AppState::new(controller, sessions);
//! let (addr, server) = draftsync_server::http::bind(state, ([127, 0, 0, 1], 0).into())?;
//! tokio::spawn(server);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod http;
pub mod repository;

pub use auth::{Authenticator, Principal, StaticSessions};
pub use config::ServerConfig;
pub use controller::ConcurrencyController;
pub use error::ServerError;
pub use http::{AppState, VERSION_HEADER};
pub use repository::{InMemoryReportRepository, ReportRepository};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
