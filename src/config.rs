//! Pipeline configuration.
//!
//! Every deployment constant lives here: stage
//! and session timeouts, time-resolution bounds, meal-time defaults, retry
//! policy, and the meal-pairing table. Loaded from YAML with serde
//! defaults, so an empty document yields a fully working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::retry::RetryPolicy;
use crate::timeres::MealTimes;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Configuration for one voice pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Per-stage timeout for transcription/classification/extraction.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Session-wide timeout from Transcribing onward.
    #[serde(default = "default_global_timeout")]
    pub global_timeout_secs: u64,

    /// How long a session lingers in Completed before resetting to Idle.
    #[serde(default = "default_grace")]
    pub completed_grace_ms: u64,

    /// Resolved instants further in the past than this fall back to now.
    #[serde(default = "default_max_past_hours")]
    pub max_past_hours: i64,

    /// Resolved instants further in the future than this fall back to now.
    #[serde(default = "default_max_future_minutes")]
    pub max_future_minutes: i64,

    #[serde(default)]
    pub meal_times: MealTimes,

    /// Retry policy for transport-level calls to external services.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Conventionally paired food combinations for the meal-vs-separate
    /// tie-break. Matched on normalized names, both orders.
    #[serde(default = "default_meal_pairs")]
    pub meal_pairs: Vec<(String, String)>,
}

fn default_stage_timeout() -> u64 {
    15
}
fn default_global_timeout() -> u64 {
    30
}
fn default_grace() -> u64 {
    1500
}
fn default_max_past_hours() -> i64 {
    24
}
fn default_max_future_minutes() -> i64 {
    60
}

fn default_meal_pairs() -> Vec<(String, String)> {
    [
        ("porkchop", "potatoes"),
        ("steak", "potatoes"),
        ("eggs", "bacon"),
        ("eggs", "toast"),
        ("chicken", "rice"),
        ("fish", "chips"),
        ("burger", "fries"),
        ("spaghetti", "meatballs"),
        ("rice", "beans"),
        ("peanut butter", "jelly"),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
            global_timeout_secs: default_global_timeout(),
            completed_grace_ms: default_grace(),
            max_past_hours: default_max_past_hours(),
            max_future_minutes: default_max_future_minutes(),
            meal_times: MealTimes::default(),
            retry: RetryPolicy::default(),
            meal_pairs: default_meal_pairs(),
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout_secs)
    }

    pub fn completed_grace(&self) -> Duration {
        Duration::from_millis(self.completed_grace_ms)
    }

    pub fn max_past(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_past_hours)
    }

    pub fn max_future(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.max_future_minutes)
    }
}
