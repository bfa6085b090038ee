use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tunable thresholds for a drive session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Size of a speed-limit cache cell in degrees (~220m at 0.002)
    pub grid_resolution_deg: f64,

    /// Global spacing between remote speed-limit lookups
    pub lookup_min_interval_ms: u64,
    pub lookup_timeout_ms: u64,

    /// Point accrual cadence
    pub base_delay_ms: u64,
    pub penalty_scale_ms: u64,
    pub max_penalty_ratio: f64,
    pub severe_speeding_ratio: f64,
    pub speeding_pause_ms: u64,

    /// Backgrounding shorter than or equal to this is forgiven
    pub background_grace_ms: u64,
    /// Backgrounding this long ends the drive
    pub background_timeout_ms: u64,
    pub first_warning_delay_ms: u64,

    /// Refresh the in-progress drive marker every N awarded points
    pub heartbeat_every_points: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid_resolution_deg: 0.002,
            lookup_min_interval_ms: 10_000,
            lookup_timeout_ms: 5_000,
            base_delay_ms: 100,
            penalty_scale_ms: 2_000,
            max_penalty_ratio: 2.0,
            severe_speeding_ratio: 1.5,
            speeding_pause_ms: 3_600_000,
            background_grace_ms: 5_000,
            background_timeout_ms: 120_000,
            first_warning_delay_ms: 5_000,
            heartbeat_every_points: 50,
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file, falling back to defaults when it does not exist.
    /// Missing fields take their default values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse engine config at {}", path.display()))
    }

    pub fn lookup_min_interval(&self) -> Duration {
        Duration::from_millis(self.lookup_min_interval_ms)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn background_grace(&self) -> Duration {
        Duration::from_millis(self.background_grace_ms)
    }

    pub fn background_timeout(&self) -> Duration {
        Duration::from_millis(self.background_timeout_ms)
    }

    pub fn first_warning_delay(&self) -> Duration {
        Duration::from_millis(self.first_warning_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("engine.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, r#"{ "background_grace_ms": 3000, "base_delay_ms": 250 }"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.background_grace_ms, 3_000);
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.background_timeout_ms, 120_000);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        fs::write(&path, "not json").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
