//! Engine configuration, layered from an optional TOML file and
//! `CAMDAQ_`-prefixed environment variables.

use camdaq_core::error::{CamError, CamResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_event_timeout_ms() -> u64 {
    500
}

fn default_memory_budget_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("frames")
}

/// Runtime tuning for the acquisition engine and persistence sink.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Polling monitor tick interval, milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Bounded wait per tick for the event-driven monitor, milliseconds.
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,
    /// Memory budget for bulk frame retrieval, bytes.
    #[serde(default = "default_memory_budget_bytes")]
    pub memory_budget_bytes: usize,
    /// Directory frames are persisted into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            event_timeout_ms: default_event_timeout_ms(),
            memory_budget_bytes: default_memory_budget_bytes(),
            output_dir: default_output_dir(),
        }
    }
}

impl EngineConfig {
    /// Load configuration: file (optional) first, then `CAMDAQ_*` environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> CamResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("CAMDAQ"));
        let cfg = builder
            .build()
            .and_then(|c| c.try_deserialize::<EngineConfig>())
            .map_err(|e| CamError::Configuration(e.to_string()))?;
        Ok(cfg)
    }

    /// Polling tick interval as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Event wait timeout as a [`Duration`].
    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let cfg = EngineConfig::load(None).unwrap();
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
        assert_eq!(cfg.memory_budget_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camdaq.toml");
        std::fs::write(&path, "tick_interval_ms = 10\nmemory_budget_bytes = 1024\n").unwrap();
        let cfg = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.tick_interval(), Duration::from_millis(10));
        assert_eq!(cfg.memory_budget_bytes, 1024);
        // Unset fields keep their defaults.
        assert_eq!(cfg.event_timeout(), Duration::from_millis(500));
    }
}
