//! Runtime configuration for the kernel, the metric store, and the built-in
//! processors (§6).

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Storage backend selection, standing in for "embedded SQL on disk" /
/// "embedded SQL in memory" per `fcd_data_storage` (§6, Open Question §10.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process `BTreeMap`-backed store, nothing written to disk.
    #[default]
    Memory,
    /// Append-only log on disk, replayed into an in-memory store on open.
    File,
}

/// Top-level kernel + processor configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// How often the eviction tick runs.
    #[serde(default = "Config::default_unit_removal_interval_seconds")]
    pub unit_removal_interval_seconds: u64,

    /// Max age of newest record before a vehicle is evicted.
    #[serde(default = "Config::default_unit_expiration_seconds")]
    pub unit_expiration_seconds: u64,

    /// When true, every incoming record is persisted to the records table.
    #[serde(default)]
    pub store_raw_fcd: bool,

    /// Choice of metric store backend.
    #[serde(default)]
    pub fcd_data_storage: StoreBackend,

    /// Location of durable storage when `fcd_data_storage == File`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// When false, truncate tables on startup.
    #[serde(default = "Config::default_is_persistent")]
    pub is_persistent: bool,

    /// Chunk size for equidistant spatial-mean-speed sampling.
    #[serde(default = "Config::default_spatial_mean_speed_chunk_m")]
    pub spatial_mean_speed_chunk_m: f64,

    /// Threshold processor trigger interval.
    #[serde(default = "Config::default_trigger_interval_seconds")]
    pub trigger_interval_seconds: u64,

    /// Additive red-light offset applied to the temporal percentile.
    #[serde(default = "Config::default_red_light_seconds")]
    pub default_red_light_seconds: f64,

    /// Minimum traversal count before a connection's thresholds are computed.
    #[serde(default = "Config::default_min_traversals_for_threshold")]
    pub min_traversals_for_threshold: usize,

    /// When true, every threshold tick recomputes RTSM for all stored traversals.
    #[serde(default)]
    pub recompute_all_rtsm_with_new_thresholds: bool,

    /// Lower bound on traversal count for red-light heuristic estimation (§4.3.3).
    #[serde(default = "Config::default_min_heuristic")]
    pub min_heuristic: usize,

    /// Upper bound on traversal count for red-light heuristic estimation (§4.3.3).
    #[serde(default = "Config::default_max_heuristic")]
    pub max_heuristic: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            unit_removal_interval_seconds: Self::default_unit_removal_interval_seconds(),
            unit_expiration_seconds: Self::default_unit_expiration_seconds(),
            store_raw_fcd: false,
            fcd_data_storage: StoreBackend::default(),
            database_path: None,
            is_persistent: Self::default_is_persistent(),
            spatial_mean_speed_chunk_m: Self::default_spatial_mean_speed_chunk_m(),
            trigger_interval_seconds: Self::default_trigger_interval_seconds(),
            default_red_light_seconds: Self::default_red_light_seconds(),
            min_traversals_for_threshold: Self::default_min_traversals_for_threshold(),
            recompute_all_rtsm_with_new_thresholds: false,
            min_heuristic: Self::default_min_heuristic(),
            max_heuristic: Self::default_max_heuristic(),
        }
    }
}

impl Config {
    const fn default_unit_removal_interval_seconds() -> u64 {
        30 * 60
    }

    const fn default_unit_expiration_seconds() -> u64 {
        60 * 60
    }

    const fn default_is_persistent() -> bool {
        true
    }

    const fn default_spatial_mean_speed_chunk_m() -> f64 {
        15.0
    }

    const fn default_trigger_interval_seconds() -> u64 {
        30 * 60
    }

    const fn default_red_light_seconds() -> f64 {
        45.0
    }

    const fn default_min_traversals_for_threshold() -> usize {
        10
    }

    const fn default_min_heuristic() -> usize {
        10
    }

    const fn default_max_heuristic() -> usize {
        400
    }

    pub fn unit_removal_interval(&self) -> Duration {
        Duration::from_secs(self.unit_removal_interval_seconds)
    }

    pub fn unit_expiration(&self) -> Duration {
        Duration::from_secs(self.unit_expiration_seconds)
    }

    pub fn trigger_interval(&self) -> Duration {
        Duration::from_secs(self.trigger_interval_seconds)
    }

    pub fn default_red_light(&self) -> Duration {
        Duration::from_secs_f64(self.default_red_light_seconds)
    }

    pub fn with_store_raw_fcd(mut self, store_raw_fcd: bool) -> Self {
        self.store_raw_fcd = store_raw_fcd;
        self
    }

    pub fn with_file_backend(mut self, path: impl Into<PathBuf>) -> Self {
        self.fcd_data_storage = StoreBackend::File;
        self.database_path = Some(path.into());
        self
    }

    pub fn with_is_persistent(mut self, is_persistent: bool) -> Self {
        self.is_persistent = is_persistent;
        self
    }

    pub fn with_trigger_interval(mut self, interval: Duration) -> Self {
        self.trigger_interval_seconds = interval.as_secs();
        self
    }

    pub fn with_spatial_mean_speed_chunk_m(mut self, chunk_m: f64) -> Self {
        self.spatial_mean_speed_chunk_m = chunk_m;
        self
    }

    pub fn with_recompute_all_rtsm(mut self, recompute: bool) -> Self {
        self.recompute_all_rtsm_with_new_thresholds = recompute;
        self
    }

    /// Validate configuration values, matching the teacher's `Config::validate` shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.spatial_mean_speed_chunk_m <= 0.0 || !self.spatial_mean_speed_chunk_m.is_finite() {
            return Err("spatial_mean_speed_chunk_m must be a positive, finite number".into());
        }
        if self.min_traversals_for_threshold == 0 {
            return Err("min_traversals_for_threshold must be greater than zero".into());
        }
        if self.min_heuristic == 0 || self.min_heuristic > self.max_heuristic {
            return Err("min_heuristic must be positive and not exceed max_heuristic".into());
        }
        if self.fcd_data_storage == StoreBackend::File && self.database_path.is_none() {
            return Err("database_path is required when fcd_data_storage is `file`".into());
        }
        if self.default_red_light_seconds < 0.0 || !self.default_red_light_seconds.is_finite() {
            return Err("default_red_light_seconds must be a non-negative, finite number".into());
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml-config")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = Config::default();
        assert_eq!(config.unit_removal_interval(), Duration::from_secs(1800));
        assert_eq!(config.unit_expiration(), Duration::from_secs(3600));
        assert_eq!(config.trigger_interval(), Duration::from_secs(1800));
        assert_eq!(config.default_red_light(), Duration::from_secs(45));
        assert_eq!(config.min_traversals_for_threshold, 10);
        assert_eq!(config.spatial_mean_speed_chunk_m, 15.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn file_backend_requires_path() {
        let mut config = Config::default();
        config.fcd_data_storage = StoreBackend::File;
        assert!(config.validate().is_err());
        config.database_path = Some("/tmp/store.log".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_chunk_size() {
        let config = Config::default().with_spatial_mean_speed_chunk_m(0.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_roundtrip_preserves_values() {
        let config = Config::default().with_spatial_mean_speed_chunk_m(20.0);
        let json = config.to_json().unwrap();
        let restored = Config::from_json(&json).unwrap();
        assert_eq!(restored.spatial_mean_speed_chunk_m, 20.0);
    }
}
