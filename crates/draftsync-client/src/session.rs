//! Session guard
//!
//! One guard is shared by every coordinator of an authenticated session. The
//! first remote call that comes back auth-expired suspends remote saves for
//! all of them; local persistence keeps going. After re-authentication
//! [`SessionGuard::resume`] re-enables the remote path and each coordinator
//! replays its pending save on its next tick.

use crate::api::{RemoteError, ReportApi};
use crate::events::{EventBus, SyncEvent};
use draftsync_core::SyncError;
use parking_lot::RwLock;

#[derive(Debug)]
struct SessionState {
    token: Option<String>,
    suspended: bool,
}

/// Shared gate for the remote path
#[derive(Debug)]
pub struct SessionGuard {
    state: RwLock<SessionState>,
    events: EventBus,
}

impl SessionGuard {
    /// Guard for a session authenticated with `token`
    #[must_use]
    pub fn new(token: impl Into<String>, events: EventBus) -> Self {
        Self {
            state: RwLock::new(SessionState {
                token: Some(token.into()),
                suspended: false,
            }),
            events,
        }
    }

    /// Guard with no session yet; remote saves stay suspended until [`resume`](Self::resume)
    #[must_use]
    pub fn unauthenticated(events: EventBus) -> Self {
        Self {
            state: RwLock::new(SessionState {
                token: None,
                suspended: true,
            }),
            events,
        }
    }

    /// Current bearer token
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.read().token.clone()
    }

    /// Whether remote saves may be attempted
    #[must_use]
    pub fn is_remote_allowed(&self) -> bool {
        let state = self.state.read();
        !state.suspended && state.token.is_some()
    }

    /// Suspend remote saves.
    ///
    /// Publishes `ReauthRequired` only on the first suspension, so several
    /// coordinators hitting the same expiry produce a single prompt. Returns
    /// whether this call did the suspending.
    pub fn suspend(&self) -> bool {
        {
            let mut state = self.state.write();
            if state.suspended {
                return false;
            }
            state.suspended = true;
        }
        tracing::warn!("Session expired, remote saves suspended");
        self.events.publish(SyncEvent::ReauthRequired);
        true
    }

    /// Re-enable remote saves with a fresh token
    pub fn resume(&self, token: impl Into<String>) {
        {
            let mut state = self.state.write();
            state.token = Some(token.into());
            state.suspended = false;
        }
        tracing::info!("Session re-authenticated, remote saves resume on next tick");
        self.events.publish(SyncEvent::Resumed);
    }

    /// Keep-alive ping. Suspends the guard if the server reports expiry.
    ///
    /// Does nothing while already suspended.
    ///
    /// # Errors
    /// `SyncError::AuthExpired` on expiry, `SyncError::NetworkFailure` if the
    /// ping could not be delivered
    pub async fn pulse(&self, api: &dyn ReportApi) -> Result<(), SyncError> {
        if !self.is_remote_allowed() {
            return Ok(());
        }
        match api.ping().await {
            Ok(()) => {
                tracing::debug!("Session pulse ok");
                Ok(())
            }
            Err(RemoteError::AuthExpired) => {
                self.suspend();
                Err(SyncError::AuthExpired)
            }
            Err(err) => {
                tracing::debug!("Session pulse failed: {}", err);
                Err(err.into())
            }
        }
    }
}
