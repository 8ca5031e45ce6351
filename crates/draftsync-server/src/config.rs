//! Server configuration

use draftsync_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;

/// Report endpoint configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Bearer token -> display name
    pub sessions: BTreeMap<String, String>,
}

impl ServerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    /// With an extra session
    #[inline]
    #[must_use]
    pub fn with_session(mut self, token: impl Into<String>, name: impl Into<String>) -> Self {
        self.sessions.insert(token.into(), name.into());
        self
    }

    /// Parse a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// empty tokens or names
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`ServerConfig::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject unusable sessions
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the offending entry
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (token, name) in &self.sessions {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("session token must not be empty".into()));
            }
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "session name for token '{token}' must not be empty"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            sessions: BTreeMap::new(),
        }
    }
}
