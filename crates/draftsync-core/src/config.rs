//! Client-side configuration
//!
//! Defaults match the limits the field app has always shipped with: ten drafts,
//! thirty days, 200 MiB of attachments, a 30 s autosave tick and a 5 min session
//! keep-alive. Any subset can be overridden from TOML:
//!
//! ```toml
//! autosave_interval_secs = 15
//!
//! [retention]
//! max_drafts = 5
//! ```

use crate::error::ConfigError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One mebibyte
pub const MIB: u64 = 1024 * 1024;

/// Limits enforced on the local draft store after every save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Maximum number of drafts kept
    pub max_drafts: usize,
    /// Drafts untouched for longer than this are deleted
    pub max_age_days: u32,
    /// Aggregate attachment estimate allowed across all drafts
    pub max_attachment_bytes: u64,
}

impl RetentionPolicy {
    /// Maximum age as a duration
    #[inline]
    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::days(i64::from(self.max_age_days))
    }

    /// With max draft count
    #[inline]
    #[must_use]
    pub fn with_max_drafts(mut self, max: usize) -> Self {
        self.max_drafts = max;
        self
    }

    /// With max age
    #[inline]
    #[must_use]
    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = days;
        self
    }

    /// With attachment cap
    #[inline]
    #[must_use]
    pub fn with_max_attachment_bytes(mut self, bytes: u64) -> Self {
        self.max_attachment_bytes = bytes;
        self
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_drafts: 10,
            max_age_days: 30,
            max_attachment_bytes: 200 * MIB,
        }
    }
}

/// draftsync client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Local store retention limits
    pub retention: RetentionPolicy,
    /// Autosave tick interval in seconds
    pub autosave_interval_secs: u64,
    /// Session keep-alive interval in seconds (0 disables)
    pub session_pulse_interval_secs: u64,
    /// Directory holding the local draft store
    pub store_dir: Option<PathBuf>,
    /// Fsync draft files on every write
    pub durable_writes: bool,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retention policy
    #[inline]
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// With autosave interval
    #[inline]
    #[must_use]
    pub fn with_autosave_interval_secs(mut self, secs: u64) -> Self {
        self.autosave_interval_secs = secs;
        self
    }

    /// With store directory
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// With fsync on every draft write
    #[inline]
    #[must_use]
    pub fn with_durable_writes(mut self, durable: bool) -> Self {
        self.durable_writes = durable;
        self
    }

    /// Autosave interval as a std duration
    #[inline]
    #[must_use]
    pub fn autosave_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.autosave_interval_secs)
    }

    /// Keep-alive interval, if enabled
    #[inline]
    #[must_use]
    pub fn session_pulse_interval(&self) -> Option<std::time::Duration> {
        (self.session_pulse_interval_secs > 0)
            .then(|| std::time::Duration::from_secs(self.session_pulse_interval_secs))
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// `ConfigError::Parse` for malformed TOML, `ConfigError::Invalid` for
    /// unusable values
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`SyncConfig::from_toml_str`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject values the engine cannot run with
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the offending setting
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention.max_drafts == 0 {
            return Err(ConfigError::Invalid("retention.max_drafts must be at least 1".into()));
        }
        if self.retention.max_age_days == 0 {
            return Err(ConfigError::Invalid("retention.max_age_days must be at least 1".into()));
        }
        if self.autosave_interval_secs == 0 {
            return Err(ConfigError::Invalid("autosave_interval_secs must be at least 1".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigError::Invalid("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retention: RetentionPolicy::default(),
            autosave_interval_secs: 30,
            session_pulse_interval_secs: 300,
            store_dir: None,
            durable_writes: false,
            event_capacity: 64,
        }
    }
}
