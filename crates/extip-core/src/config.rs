//! Configuration types for the extip controller

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Annotation a Service sets to opt in, naming the local interface to mirror
pub const DEFAULT_ANNOTATION_KEY: &str = "external-ip-interface";

/// Controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Annotation key naming the interface whose address a Service mirrors
    #[serde(default = "default_annotation_key")]
    pub annotation_key: String,

    /// Interval between periodic reconciliation passes (in seconds)
    ///
    /// This is the safety net for missed watch notifications. Event-driven
    /// passes happen in between whenever a Service is added or updated.
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Timeout applied to each cluster list/replace call (in seconds)
    ///
    /// Set to 0 to disable. A slow API server then simply delays the next
    /// pass.
    #[serde(default)]
    pub api_timeout_secs: u64,

    /// Capacity of the engine event channel
    ///
    /// When full, new engine events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ControllerConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            annotation_key: default_annotation_key(),
            resync_interval_secs: default_resync_interval_secs(),
            api_timeout_secs: 0,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the annotation key
    pub fn with_annotation_key(mut self, key: impl Into<String>) -> Self {
        self.annotation_key = key.into();
        self
    }

    /// Set the periodic resync interval
    pub fn with_resync_interval_secs(mut self, secs: u64) -> Self {
        self.resync_interval_secs = secs;
        self
    }

    /// Set the per-call API timeout (0 disables it)
    pub fn with_api_timeout_secs(mut self, secs: u64) -> Self {
        self.api_timeout_secs = secs;
        self
    }

    /// Periodic resync interval as a [`Duration`]
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Per-call API timeout, `None` when disabled
    pub fn api_timeout(&self) -> Option<Duration> {
        (self.api_timeout_secs > 0).then(|| Duration::from_secs(self.api_timeout_secs))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.annotation_key.trim().is_empty() {
            return Err(crate::Error::config("Annotation key cannot be empty"));
        }
        if self.resync_interval_secs == 0 {
            return Err(crate::Error::config("Resync interval must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn default_annotation_key() -> String {
    DEFAULT_ANNOTATION_KEY.to_string()
}

fn default_resync_interval_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    1000
}
