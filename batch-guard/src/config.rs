//! Run configuration.

use crate::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable overriding [`BatchConfig::batch_size`].
pub const ENV_BATCH_SIZE: &str = "BATCH_GUARD_BATCH_SIZE";
/// Environment variable overriding [`BatchConfig::stop_on_first_failure`].
pub const ENV_STOP_ON_FIRST_FAILURE: &str = "BATCH_GUARD_STOP_ON_FIRST_FAILURE";
/// Environment variable overriding [`BatchConfig::exists_strategy`].
pub const ENV_EXISTS_STRATEGY: &str = "BATCH_GUARD_EXISTS_STRATEGY";

/// Default number of records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// How `exists` rules query the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistsStrategy {
    /// One fetch per batch group; values missing from the returned set fail.
    #[default]
    PresentSet,
    /// One count query per distinct value; a zero count fails.
    PerValue,
}

impl fmt::Display for ExistsStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistsStrategy::PresentSet => write!(f, "present_set"),
            ExistsStrategy::PerValue => write!(f, "per_value"),
        }
    }
}

impl FromStr for ExistsStrategy {
    type Err = BatchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present_set" => Ok(ExistsStrategy::PresentSet),
            "per_value" => Ok(ExistsStrategy::PerValue),
            other => Err(BatchError::configuration(
                "exists_strategy",
                format!("unknown exists strategy '{other}' (expected present_set or per_value)"),
            )),
        }
    }
}

/// Configuration for a [`BatchValidator`](crate::engine::BatchValidator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Records per batch; one store query per rule group per batch
    pub batch_size: usize,
    /// Stop all further store queries once any failure is recorded
    pub stop_on_first_failure: bool,
    /// Query strategy for `exists` rules
    pub exists_strategy: ExistsStrategy,
    /// Id column used by `unique` exclusions when the rule doesn't name one
    pub default_id_column: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            stop_on_first_failure: false,
            exists_strategy: ExistsStrategy::default(),
            default_id_column: "id".to_string(),
        }
    }
}

impl BatchConfig {
    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets stop-on-first-failure.
    pub fn with_stop_on_first_failure(mut self, enabled: bool) -> Self {
        self.stop_on_first_failure = enabled;
        self
    }

    /// Sets the `exists` query strategy.
    pub fn with_exists_strategy(mut self, strategy: ExistsStrategy) -> Self {
        self.exists_strategy = strategy;
        self
    }

    /// Sets the default id column for `unique` exclusions.
    pub fn with_default_id_column(mut self, column: impl Into<String>) -> Self {
        self.default_id_column = column.into();
        self
    }

    /// Checks the configuration for unusable values.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BatchError::configuration(
                "batch_size",
                "batch size must be at least 1",
            ));
        }
        if self.default_id_column.trim().is_empty() {
            return Err(BatchError::configuration(
                "default_id_column",
                "default id column cannot be empty",
            ));
        }
        Ok(())
    }

    /// Parses a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds the default configuration overlaid with `BATCH_GUARD_*` variables.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlays values from a key lookup on top of `self`.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = raw.trim().parse().map_err(|_| {
                BatchError::configuration(
                    ENV_BATCH_SIZE,
                    format!("expected a positive integer, got '{raw}'"),
                )
            })?;
        }
        if let Some(raw) = lookup(ENV_STOP_ON_FIRST_FAILURE) {
            self.stop_on_first_failure = parse_flag(ENV_STOP_ON_FIRST_FAILURE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_EXISTS_STRATEGY) {
            self.exists_strategy = raw.parse()?;
        }
        self.validate()?;
        Ok(self)
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(BatchError::configuration(
            key,
            format!("expected a boolean, got '{raw}'"),
        )),
    }
}
