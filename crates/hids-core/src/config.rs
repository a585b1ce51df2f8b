//! TOML-backed configuration with CLI-flag → env-var → XDG-config-file →
//! `/etc` → defaults precedence (spec.md §6), following the shape of
//! `oisp-core::config::ConfigLoader`.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] io::Error),
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which reference collector to run (spec.md §6 `collector` option).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorKind {
    KernelProbe,
    LogTail,
}

impl Default for CollectorKind {
    fn default() -> Self {
        CollectorKind::KernelProbe
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub log_level: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    pub kind: CollectorKind,
    /// Path to the audit log the log-tail collector tails, when selected.
    pub audit_log_path: Option<PathBuf>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            kind: CollectorKind::default(),
            audit_log_path: Some(PathBuf::from("/var/log/audit/audit.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub risk_threshold: f64,
    pub warmup_period_seconds: f64,
    pub excluded_processes: Vec<String>,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            risk_threshold: 70.0,
            warmup_period_seconds: 180.0,
            excluded_processes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub beacon_variance_threshold: f64,
    pub min_connections_for_beacon: usize,
    pub min_beacon_interval: f64,
    pub port_scan_threshold: usize,
    pub port_scan_timeframe: f64,
    pub exfiltration_threshold: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            beacon_variance_threshold: 10.0,
            min_connections_for_beacon: 3,
            min_beacon_interval: 1.0,
            port_scan_threshold: 5,
            port_scan_timeframe: 60.0,
            exfiltration_threshold: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSettings {
    pub enable_responses: bool,
    pub enable_kill: bool,
    pub enable_isolation: bool,
    pub warn_threshold: f64,
    pub freeze_threshold: f64,
    pub isolate_threshold: f64,
    pub kill_threshold: f64,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            enable_responses: false,
            enable_kill: false,
            enable_isolation: false,
            warn_threshold: 70.0,
            freeze_threshold: 85.0,
            isolate_threshold: 90.0,
            kill_threshold: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSettings {
    pub primary_path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub interval_secs: f64,
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            primary_path: PathBuf::from("/tmp/security_agent_state.json"),
            fallback_path: None,
            interval_secs: 2.0,
        }
    }
}

/// Top-level agent configuration; covers the option table in spec.md §6
/// plus the ambient `agent`/`collector`/`snapshot` sections this
/// implementation needs to run at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HidsConfig {
    pub agent: AgentSettings,
    pub collector: CollectorSettings,
    pub detection: DetectionSettings,
    pub connection: ConnectionSettings,
    pub response: ResponseSettings,
    pub snapshot: SnapshotSettings,
}

impl HidsConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.agent.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid log_level: {}",
                self.agent.log_level
            )));
        }
        if !(0.0..=100.0).contains(&self.detection.risk_threshold) {
            return Err(ConfigError::ValidationError(
                "risk_threshold must be in [0, 100]".to_string(),
            ));
        }
        if self.detection.warmup_period_seconds < 0.0 {
            return Err(ConfigError::ValidationError(
                "warmup_period_seconds must be non-negative".to_string(),
            ));
        }
        if self.connection.min_connections_for_beacon < 2 {
            return Err(ConfigError::ValidationError(
                "min_connections_for_beacon must be >= 2".to_string(),
            ));
        }
        if self.connection.port_scan_threshold < 1 {
            return Err(ConfigError::ValidationError(
                "port_scan_threshold must be >= 1".to_string(),
            ));
        }
        for (name, threshold) in [
            ("warn_threshold", self.response.warn_threshold),
            ("freeze_threshold", self.response.freeze_threshold),
            ("isolate_threshold", self.response.isolate_threshold),
            ("kill_threshold", self.response.kill_threshold),
        ] {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(ConfigError::ValidationError(format!(
                    "response.{name} must be in [0, 100]"
                )));
            }
        }
        Ok(())
    }
}

/// Loads and validates a [`HidsConfig`], following the CLI-flag → env-var →
/// XDG-config-dir → `/etc` → defaults precedence of `oisp-core::config::ConfigLoader`.
pub struct ConfigLoader {
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    pub fn load(&self) -> ConfigResult<HidsConfig> {
        let config = match self.find_config_file() {
            Some(path) => Self::load_from_file(&path)?,
            None => HidsConfig::default(),
        };
        let config = Self::apply_env_overrides(config);
        config.validate()?;
        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = std::env::var("HIDS_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("hids-agent").join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/hids-agent/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    fn load_from_file(path: &Path) -> ConfigResult<HidsConfig> {
        let contents = std::fs::read_to_string(path)?;
        let config: HidsConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    fn apply_env_overrides(mut config: HidsConfig) -> HidsConfig {
        if let Ok(level) = std::env::var("HIDS_LOG_LEVEL") {
            config.agent.log_level = level;
        }
        if let Ok(threshold) = std::env::var("HIDS_RISK_THRESHOLD") {
            if let Ok(value) = threshold.parse() {
                config.detection.risk_threshold = value;
            }
        }
        if let Ok(warmup) = std::env::var("HIDS_WARMUP_SECONDS") {
            if let Ok(value) = warmup.parse() {
                config.detection.warmup_period_seconds = value;
            }
        }
        if let Ok(path) = std::env::var("HIDS_SNAPSHOT_PATH") {
            config.snapshot.primary_path = PathBuf::from(path);
        }
        config
    }

    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("hids-agent").join("config.toml"))
    }

    pub fn save(config: &HidsConfig, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(config)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = HidsConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [detection]
            risk_threshold = 80.0
        "#;
        let config: HidsConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.detection.risk_threshold, 80.0);
        assert_eq!(config.detection.warmup_period_seconds, 180.0);
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let mut config = HidsConfig::default();
        config.agent.log_level = "verbose".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validation_invalid_risk_threshold() {
        let mut config = HidsConfig::default();
        config.detection.risk_threshold = 150.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loader_falls_back_to_defaults_when_no_file() {
        let loader = ConfigLoader::new().with_cli_path(Some(PathBuf::from("/nonexistent/path.toml")));
        let config = loader.load().unwrap();
        assert_eq!(config.detection.risk_threshold, 70.0);
    }

    #[test]
    fn test_loader_reads_cli_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[detection]\nrisk_threshold = 55.0\n").unwrap();

        let loader = ConfigLoader::new().with_cli_path(Some(path));
        let config = loader.load().unwrap();
        assert_eq!(config.detection.risk_threshold, 55.0);
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = HidsConfig::default();
        ConfigLoader::save(&config, &path).unwrap();

        let loaded = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(loaded.detection.risk_threshold, config.detection.risk_threshold);
    }
}
