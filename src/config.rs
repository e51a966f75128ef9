//! Configuration for the TF client
//!
//! Every field is optional in YAML; anything missing or out of range falls
//! back to the defaults of the republishing service.

use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use crate::{messages::RosDuration, Result, TfError};

pub const DEFAULT_FIXED_FRAME: &str = "/base_link";
pub const DEFAULT_ANGULAR_THRESHOLD: f64 = 2.0;
pub const DEFAULT_TRANSLATION_THRESHOLD: f64 = 0.01;
pub const DEFAULT_RATE: f64 = 10.0;
pub const DEFAULT_GOAL_UPDATE_DELAY_MS: u64 = 50;
pub const DEFAULT_STREAM_TIMEOUT: f64 = 2.0;
pub const DEFAULT_REPUBLISH_SERVICE: &str = "/republish_tfs";
/// Largest timeout the wire format can carry, in seconds
pub const MAX_STREAM_TIMEOUT: f64 = i32::MAX as f64;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TfClientConfig {
    /// Reference frame every transform is expressed in
    pub fixed_frame: String,
    /// Minimum rotation change (degrees) before the server republishes
    pub angular_threshold: f64,
    /// Minimum translation change (meters) before the server republishes
    pub translation_threshold: f64,
    /// Maximum publish rate in Hz
    pub rate: f64,
    /// Debounce window for aggregate requests, in milliseconds
    pub goal_update_delay_ms: u64,
    /// Seconds without subscribers before the server drops the stream
    pub stream_timeout: f64,
    /// Name of the aggregate-subscription service
    pub republish_service: String,
}

impl Default for TfClientConfig {
    fn default() -> Self {
        Self {
            fixed_frame: DEFAULT_FIXED_FRAME.to_string(),
            angular_threshold: DEFAULT_ANGULAR_THRESHOLD,
            translation_threshold: DEFAULT_TRANSLATION_THRESHOLD,
            rate: DEFAULT_RATE,
            goal_update_delay_ms: DEFAULT_GOAL_UPDATE_DELAY_MS,
            stream_timeout: DEFAULT_STREAM_TIMEOUT,
            republish_service: DEFAULT_REPUBLISH_SERVICE.to_string(),
        }
    }
}

impl TfClientConfig {
    /// Load configuration from a YAML file
    pub fn load_from_path(config_path: &str) -> Result<Self> {
        let contents = fs::read_to_string(config_path)
            .map_err(|e| TfError::Config(format!("Failed to read {}: {}", config_path, e)))?;
        Self::load_from_str(&contents)
    }

    /// Parse configuration from a YAML string
    pub fn load_from_str(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: TfClientConfig = serde_yaml::from_str(contents)?;
        Ok(config.sanitized())
    }

    /// Replace empty or out-of-range values with their defaults
    pub fn sanitized(mut self) -> Self {
        if self.fixed_frame.trim().is_empty() {
            self.fixed_frame = DEFAULT_FIXED_FRAME.to_string();
        }
        if self.republish_service.trim().is_empty() {
            self.republish_service = DEFAULT_REPUBLISH_SERVICE.to_string();
        }
        self.angular_threshold =
            non_negative_or(self.angular_threshold, DEFAULT_ANGULAR_THRESHOLD);
        self.translation_threshold =
            non_negative_or(self.translation_threshold, DEFAULT_TRANSLATION_THRESHOLD);
        self.rate = non_negative_or(self.rate, DEFAULT_RATE);
        self.stream_timeout = non_negative_or(self.stream_timeout, DEFAULT_STREAM_TIMEOUT)
            .min(MAX_STREAM_TIMEOUT);
        self
    }

    /// Debounce window as a duration
    pub fn goal_update_delay(&self) -> Duration {
        Duration::from_millis(self.goal_update_delay_ms)
    }

    /// Stream timeout split into whole seconds and nanoseconds
    pub fn stream_timeout(&self) -> RosDuration {
        RosDuration::from_secs_f64(self.stream_timeout)
    }
}

fn non_negative_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        default
    }
}
