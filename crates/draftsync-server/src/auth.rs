//! Bearer-token sessions
//!
//! The endpoint only needs to know who is writing, for `updated_by`. Session
//! issuance lives elsewhere; this module checks tokens against a table that
//! can be revoked at runtime, which is how expiry is exercised in tests.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Display name recorded as `updated_by`
    pub name: String,
}

/// Token check seam
#[async_trait]
pub trait Authenticator: Send + Sync + Debug {
    /// Resolve a bearer token, `None` if it is unknown or expired
    async fn authenticate(&self, token: &str) -> Option<Principal>;
}

/// Fixed token table
#[derive(Debug, Default)]
pub struct StaticSessions {
    sessions: RwLock<HashMap<String, String>>,
}

impl StaticSessions {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(token, name)` pairs
    #[must_use]
    pub fn from_pairs<I, T, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, N)>,
        T: Into<String>,
        N: Into<String>,
    {
        let sessions = pairs
            .into_iter()
            .map(|(token, name)| (token.into(), name.into()))
            .collect();
        Self {
            sessions: RwLock::new(sessions),
        }
    }

    /// Register a token
    pub fn insert(&self, token: impl Into<String>, name: impl Into<String>) {
        self.sessions.write().insert(token.into(), name.into());
    }

    /// Expire a token, returning whether it was live
    pub fn revoke(&self, token: &str) -> bool {
        let revoked = self.sessions.write().remove(token).is_some();
        if revoked {
            tracing::info!("Revoked session token");
        }
        revoked
    }

    /// Number of live tokens
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no token is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticSessions {
    async fn authenticate(&self, token: &str) -> Option<Principal> {
        self.sessions
            .read()
            .get(token)
            .map(|name| Principal { name: name.clone() })
    }
}

/// Token from an `Authorization: Bearer <token>` header value
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
