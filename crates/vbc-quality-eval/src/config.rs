//! Engine configuration
//!
//! Resolved once when the runner is built; evaluation never reads the
//! environment.

use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Runner and engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Patients evaluated per batch; cancellation is checked between batches
    pub batch_size: usize,
    /// Evaluate the patients of a batch on the rayon pool
    pub parallel: bool,
    /// Retries of transient fact store failures
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt
    pub retry_backoff_ms: u64,
    /// Recorded in every result's lineage
    pub engine_version: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: 256,
            parallel: true,
            max_retries: 3,
            retry_backoff_ms: 50,
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> EvalResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EvalError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| EvalError::Io {
            message: format!("{}: {}", path.display(), e),
        })?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> EvalResult<()> {
        if self.batch_size == 0 {
            return Err(EvalError::config("batch_size must be at least 1"));
        }
        if self.retry_backoff_ms > 60_000 {
            return Err(EvalError::config("retry_backoff_ms must not exceed 60000"));
        }
        if self.engine_version.trim().is_empty() {
            return Err(EvalError::config("engine_version must not be empty"));
        }
        Ok(())
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}
