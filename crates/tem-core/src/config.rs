//! Session configuration

use crate::error::SessionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Editing session configuration
///
/// # Example
///
/// ```yaml
/// debounce_ms: 1500
/// rules_path: /etc/tem/impact-rules.yaml
/// status_history: 64
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Quiet period after the last edit before a save is issued
    pub debounce_ms: u64,
    /// Alternative impact rule table; the built-in table when unset
    pub rules_path: Option<PathBuf>,
    /// Number of status transitions kept for inspection
    pub status_history: usize,
}

impl SessionConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With debounce window
    #[inline]
    #[must_use]
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// With rule table file
    #[inline]
    #[must_use]
    pub fn with_rules_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rules_path = Some(path.into());
        self
    }

    /// With status history length
    #[inline]
    #[must_use]
    pub fn with_status_history(mut self, len: usize) -> Self {
        self.status_history = len;
        self
    }

    /// Debounce window as a duration
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Parse YAML configuration; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] on malformed YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SessionError> {
        serde_yaml::from_str(yaml).map_err(|e| SessionError::config(e.to_string()))
    }

    /// Load YAML configuration from a file
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| SessionError::config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2000,
            rules_path: None,
            status_history: 32,
        }
    }
}
