use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use steel_rain_common::logging::{LogLevel, ModuleConfig};

use crate::faults::PauseRange;
use crate::supervisor::{LaunchSpec, StopSignal};
use crate::topology::{PortBases, PortLayout};

/// Default values for configuration
pub mod defaults {
    use super::*;

    pub const LOG_LEVEL: LogLevel = LogLevel::Info;
    pub const FILENAME_LOG: &str = "steel-rain.log";
    pub const LOGS_PATH: &str = "logs/";

    pub const NETWORK_SIZE: usize = 5;
    pub const ROUTER_BINARY: &str = "skrouterd";
    pub const SKMANAGE: &str = "skmanage";
    pub const MOCK_SERVER_BINARY: &str = "mock-server";
    pub const MOCK_CLIENT_BINARY: &str = "mock-client";

    pub const ADMIN_TIMEOUT_SECS: u64 = 60;
    pub const STARTUP_GRACE_SECS: u64 = 5;
    pub const STOP_TIMEOUT_SECS: u64 = 10;

    pub const ROUTER_OUTAGE: PauseRange = PauseRange::from_secs(10, 25);
    pub const RESOURCE_PAUSE: PauseRange = PauseRange::from_secs(3, 8);
    pub const PROBE_INTERVAL: PauseRange = PauseRange::from_secs(3, 8);

    // Validation limits
    pub const MIN_TIMEOUT_SECS: u64 = 1;
    pub const MAX_TIMEOUT_SECS: u64 = 300;
}

/// Harness configuration, from the command line or a JSON file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidatedConfig {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default)]
    pub disable_file_logging: bool,

    #[serde(default)]
    pub disable_log_color: bool,

    #[serde(default = "default_filename_log")]
    pub filename_log: String,

    /// Per-module log level overrides
    #[serde(default)]
    pub logs_modules: Vec<ModuleConfig>,

    /// Harness log and per-router output logs
    #[serde(default = "default_logs_path")]
    pub logs_path: String,

    #[serde(default = "default_network_size")]
    pub network_size: usize,

    /// Defaults to `./cc_<N>_configs`
    #[serde(default)]
    pub config_dir: Option<String>,

    #[serde(default = "default_router_binary")]
    pub router_binary: String,

    #[serde(default = "default_skmanage")]
    pub skmanage: String,

    #[serde(default = "default_mock_server_binary")]
    pub mock_server_binary: String,

    #[serde(default = "default_mock_client_binary")]
    pub mock_client_binary: String,

    #[serde(default)]
    pub port_bases: PortBases,

    /// Run seed; `STEEL_RAIN_SEED` or a random seed when absent
    #[serde(default)]
    pub seed: Option<u64>,

    #[serde(default = "default_admin_timeout_secs")]
    pub admin_timeout_secs: u64,

    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,

    #[serde(default)]
    pub stop_signal: StopSignal,

    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,

    #[serde(default = "default_router_outage")]
    pub router_outage: PauseRange,

    #[serde(default = "default_resource_pause")]
    pub resource_pause: PauseRange,

    #[serde(default = "default_probe_interval")]
    pub probe_interval: PauseRange,

    #[serde(default = "default_true")]
    pub router_bounce: bool,

    #[serde(default = "default_true")]
    pub listener_bounce: bool,

    #[serde(default = "default_true")]
    pub connector_bounce: bool,

    #[serde(default = "default_true")]
    pub management_probe: bool,

    /// Launch the mock TCP servers and clients
    #[serde(default = "default_true")]
    pub traffic: bool,

    /// Reset out-of-range values to their defaults instead of failing
    #[serde(default)]
    pub auto_fix_config: bool,
}

// Default functions for serde
fn default_log_level() -> LogLevel {
    defaults::LOG_LEVEL
}
fn default_filename_log() -> String {
    defaults::FILENAME_LOG.to_string()
}
fn default_logs_path() -> String {
    defaults::LOGS_PATH.to_string()
}
fn default_network_size() -> usize {
    defaults::NETWORK_SIZE
}
fn default_router_binary() -> String {
    defaults::ROUTER_BINARY.to_string()
}
fn default_skmanage() -> String {
    defaults::SKMANAGE.to_string()
}
fn default_mock_server_binary() -> String {
    defaults::MOCK_SERVER_BINARY.to_string()
}
fn default_mock_client_binary() -> String {
    defaults::MOCK_CLIENT_BINARY.to_string()
}
fn default_admin_timeout_secs() -> u64 {
    defaults::ADMIN_TIMEOUT_SECS
}
fn default_startup_grace_secs() -> u64 {
    defaults::STARTUP_GRACE_SECS
}
fn default_stop_timeout_secs() -> u64 {
    defaults::STOP_TIMEOUT_SECS
}
fn default_router_outage() -> PauseRange {
    defaults::ROUTER_OUTAGE
}
fn default_resource_pause() -> PauseRange {
    defaults::RESOURCE_PAUSE
}
fn default_probe_interval() -> PauseRange {
    defaults::PROBE_INTERVAL
}
fn default_true() -> bool {
    true
}

impl Default for ValidatedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            disable_file_logging: false,
            disable_log_color: false,
            filename_log: default_filename_log(),
            logs_modules: Vec::new(),
            logs_path: default_logs_path(),
            network_size: default_network_size(),
            config_dir: None,
            router_binary: default_router_binary(),
            skmanage: default_skmanage(),
            mock_server_binary: default_mock_server_binary(),
            mock_client_binary: default_mock_client_binary(),
            port_bases: PortBases::default(),
            seed: None,
            admin_timeout_secs: default_admin_timeout_secs(),
            startup_grace_secs: default_startup_grace_secs(),
            stop_signal: StopSignal::default(),
            stop_timeout_secs: default_stop_timeout_secs(),
            router_outage: default_router_outage(),
            resource_pause: default_resource_pause(),
            probe_interval: default_probe_interval(),
            router_bounce: true,
            listener_bounce: true,
            connector_bounce: true,
            management_probe: true,
            traffic: true,
            auto_fix_config: false,
        }
    }
}

/// Configuration validation errors
#[derive(Error, Debug)]
pub enum ConfigValidationError {
    #[error("Invalid network size: {0} - must be at least 1")]
    InvalidNetworkSize(usize),

    #[error("Invalid port layout: {0}")]
    InvalidPortLayout(#[from] crate::error::TopologyError),

    #[error("Invalid {field}: {value} seconds - must be between {min} and {max} seconds")]
    InvalidTimeout {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Invalid {field}: minimum {min_ms} ms is above maximum {max_ms} ms")]
    InvalidPauseRange {
        field: &'static str,
        min_ms: u64,
        max_ms: u64,
    },

    #[error("Invalid {field}: '{path}' - {reason}")]
    InvalidPath {
        field: &'static str,
        path: String,
        reason: String,
    },

    #[error("Insufficient permissions for {operation}: '{path}' - check directory permissions")]
    InsufficientPermissions { path: String, operation: String },
}

pub type ValidationResult<T> = std::result::Result<T, ConfigValidationError>;

pub struct ConfigValidator {
    auto_fix: bool,
}

impl ConfigValidator {
    pub fn new(auto_fix: bool) -> Self {
        Self { auto_fix }
    }

    /// Validate `config`, creating its directories.
    ///
    /// Returns the list of adjustments made when auto-fix is enabled.
    pub fn validate(&self, config: &mut ValidatedConfig) -> ValidationResult<Vec<String>> {
        let mut fixed_issues = Vec::new();

        info!("Validating configuration...");

        if config.network_size == 0 {
            return Err(ConfigValidationError::InvalidNetworkSize(0));
        }
        // Rejects layouts that run past the last port
        PortLayout::new(config.network_size, config.port_bases)?;

        let timeouts: [(&'static str, &mut u64, u64); 3] = [
            (
                "admin_timeout",
                &mut config.admin_timeout_secs,
                defaults::ADMIN_TIMEOUT_SECS,
            ),
            (
                "startup_grace",
                &mut config.startup_grace_secs,
                defaults::STARTUP_GRACE_SECS,
            ),
            (
                "stop_timeout",
                &mut config.stop_timeout_secs,
                defaults::STOP_TIMEOUT_SECS,
            ),
        ];
        for (field, value, default) in timeouts {
            if let Err(e) = self.validate_timeout(field, *value) {
                if !self.auto_fix {
                    return Err(e);
                }
                if log::log_enabled!(log::Level::Warn) {
                    warn!("Auto-fixing {}: {}", field, e);
                }
                *value = default;
                fixed_issues.push(format!("{}; fixed to {} seconds", e, default));
            }
        }

        let pauses: [(&'static str, &mut PauseRange, PauseRange); 3] = [
            (
                "router_outage",
                &mut config.router_outage,
                defaults::ROUTER_OUTAGE,
            ),
            (
                "resource_pause",
                &mut config.resource_pause,
                defaults::RESOURCE_PAUSE,
            ),
            (
                "probe_interval",
                &mut config.probe_interval,
                defaults::PROBE_INTERVAL,
            ),
        ];
        for (field, range, default) in pauses {
            if range.is_valid() {
                continue;
            }
            let e = ConfigValidationError::InvalidPauseRange {
                field,
                min_ms: range.min_ms,
                max_ms: range.max_ms,
            };
            if !self.auto_fix {
                return Err(e);
            }
            if log::log_enabled!(log::Level::Warn) {
                warn!("Auto-fixing {}: {}", field, e);
            }
            *range = default;
            fixed_issues.push(format!(
                "{}; fixed to {}..={} ms",
                e, default.min_ms, default.max_ms
            ));
        }

        self.ensure_directory_exists(&config.logs_path, "logs", &mut fixed_issues)?;
        let config_dir = config.config_dir();
        self.ensure_directory_exists(&config_dir.to_string_lossy(), "config", &mut fixed_issues)?;

        if !fixed_issues.is_empty() && log::log_enabled!(log::Level::Info) {
            info!("Auto-fixed {} configuration issue(s):", fixed_issues.len());
            for fix in &fixed_issues {
                info!("  {}", fix);
            }
        }

        info!("Configuration validation completed successfully");
        Ok(fixed_issues)
    }

    fn validate_timeout(&self, field: &'static str, value: u64) -> ValidationResult<()> {
        if !(defaults::MIN_TIMEOUT_SECS..=defaults::MAX_TIMEOUT_SECS).contains(&value) {
            return Err(ConfigValidationError::InvalidTimeout {
                field,
                value,
                min: defaults::MIN_TIMEOUT_SECS,
                max: defaults::MAX_TIMEOUT_SECS,
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(
        &self,
        path: &str,
        dir_type: &'static str,
        fixed_issues: &mut Vec<String>,
    ) -> ValidationResult<()> {
        let path_buf = PathBuf::from(path);

        if !path_buf.exists() {
            if log::log_enabled!(log::Level::Info) {
                info!("Creating {} directory: {}", dir_type, path);
            }
            std::fs::create_dir_all(&path_buf).map_err(|e| ConfigValidationError::InvalidPath {
                field: dir_type,
                path: path.to_string(),
                reason: format!("cannot be created: {}", e),
            })?;
            fixed_issues.push(format!("Created {} directory: {}", dir_type, path));
        } else if !path_buf.is_dir() {
            return Err(ConfigValidationError::InvalidPath {
                field: dir_type,
                path: path.to_string(),
                reason: "exists but is not a directory".to_string(),
            });
        }

        let test_file = path_buf.join(".write_test");
        match std::fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(test_file);
            }
            Err(e) => {
                return Err(ConfigValidationError::InsufficientPermissions {
                    path: path.to_string(),
                    operation: format!("writing to the {} directory ({})", dir_type, e),
                });
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!("{} directory '{}' is writable", dir_type, path);
        }
        Ok(())
    }
}

impl ValidatedConfig {
    pub fn config_dir(&self) -> PathBuf {
        match &self.config_dir {
            Some(dir) => PathBuf::from(dir),
            None => PathBuf::from(format!("./cc_{}_configs", self.network_size)),
        }
    }

    pub fn port_layout(&self) -> std::result::Result<PortLayout, crate::error::TopologyError> {
        PortLayout::new(self.network_size, self.port_bases)
    }

    pub fn admin_timeout(&self) -> Duration {
        Duration::from_secs(self.admin_timeout_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            binary: PathBuf::from(&self.router_binary),
            log_dir: PathBuf::from(&self.logs_path),
            stop_signal: self.stop_signal,
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
        }
    }

    /// Read and parse a configuration file without validating it.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            anyhow!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        serde_json::from_str(&content).map_err(|e| {
            anyhow!(
                "Failed to parse config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })
    }

    /// Validate and load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P, auto_fix: bool) -> Result<Self> {
        let mut config = Self::read_file(path)?;
        config.auto_fix_config |= auto_fix;

        let validator = ConfigValidator::new(config.auto_fix_config);
        let messages = validator
            .validate(&mut config)
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        if !messages.is_empty() && log::log_enabled!(log::Level::Info) {
            info!(
                "Configuration loaded with {} adjustments",
                messages.len()
            );
        }

        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;

        std::fs::write(&path, content).map_err(|e| {
            anyhow!(
                "Failed to write config file '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        if log::log_enabled!(log::Level::Info) {
            info!("Configuration saved to: {}", path.as_ref().display());
        }
        Ok(())
    }

    /// Write the default configuration with a descriptive `_info` header.
    pub fn generate_template<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut template = serde_json::to_value(ValidatedConfig::default())?;
        if let Some(fields) = template.as_object_mut() {
            fields.insert(
                "_info".to_string(),
                serde_json::json!({
                    "description": "Steel Rain chaos harness configuration",
                    "version": "1.0",
                    "sections": {
                        "logging": "Controls log output and file generation",
                        "topology": "Network size, port bases and config directory",
                        "binaries": "Router, management CLI and mock TCP executables",
                        "faults": "Pause ranges (milliseconds) and enabled injectors"
                    }
                }),
            );
        }

        std::fs::write(&path, serde_json::to_string_pretty(&template)?).map_err(|e| {
            anyhow!(
                "Failed to write template to '{}': {}",
                path.as_ref().display(),
                e
            )
        })?;

        if log::log_enabled!(log::Level::Info) {
            info!(
                "Configuration template generated at: {}",
                path.as_ref().display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_config(dir: &Path) -> ValidatedConfig {
        ValidatedConfig {
            logs_path: dir.join("logs").to_string_lossy().into_owned(),
            config_dir: Some(dir.join("configs").to_string_lossy().into_owned()),
            network_size: 3,
            ..ValidatedConfig::default()
        }
    }

    #[test]
    fn test_default_config_dir() {
        let config = ValidatedConfig {
            network_size: 4,
            ..ValidatedConfig::default()
        };
        assert_eq!(config.config_dir(), PathBuf::from("./cc_4_configs"));
    }

    #[test]
    fn test_validate_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = scratch_config(dir.path());

        let messages = ConfigValidator::new(false).validate(&mut config).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(dir.path().join("logs").is_dir());
        assert!(dir.path().join("configs").is_dir());
    }

    #[test]
    fn test_rejects_empty_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ValidatedConfig {
            network_size: 0,
            ..scratch_config(dir.path())
        };
        assert!(matches!(
            ConfigValidator::new(true).validate(&mut config),
            Err(ConfigValidationError::InvalidNetworkSize(0))
        ));
    }

    #[test]
    fn test_rejects_overflowing_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ValidatedConfig {
            network_size: 10_000,
            ..scratch_config(dir.path())
        };
        assert!(matches!(
            ConfigValidator::new(false).validate(&mut config),
            Err(ConfigValidationError::InvalidPortLayout(_))
        ));
    }

    #[test]
    fn test_timeout_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ValidatedConfig {
            admin_timeout_secs: 0,
            ..scratch_config(dir.path())
        };
        let err = ConfigValidator::new(false)
            .validate(&mut config)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigValidationError::InvalidTimeout {
                field: "admin_timeout",
                ..
            }
        ));

        let messages = ConfigValidator::new(true).validate(&mut config).unwrap();
        assert_eq!(config.admin_timeout_secs, defaults::ADMIN_TIMEOUT_SECS);
        // The adjustment carries its cause so it can be logged later
        assert!(messages
            .iter()
            .any(|m| m.contains("Invalid admin_timeout: 0 seconds") && m.contains("fixed to 60")));
    }

    #[test]
    fn test_pause_range_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ValidatedConfig {
            resource_pause: PauseRange {
                min_ms: 8000,
                max_ms: 3000,
            },
            ..scratch_config(dir.path())
        };
        assert!(matches!(
            ConfigValidator::new(false).validate(&mut config),
            Err(ConfigValidationError::InvalidPauseRange {
                field: "resource_pause",
                ..
            })
        ));

        ConfigValidator::new(true).validate(&mut config).unwrap();
        assert_eq!(config.resource_pause, defaults::RESOURCE_PAUSE);
    }

    #[test]
    fn test_file_round_trip_and_template() {
        let dir = tempfile::tempdir().unwrap();
        let config = ValidatedConfig {
            seed: Some(0xabc),
            stop_signal: StopSignal::Term,
            listener_bounce: false,
            ..scratch_config(dir.path())
        };
        let path = dir.path().join("steel-rain.json");
        config.save_to_file(&path).unwrap();

        let loaded = ValidatedConfig::from_file(&path, false).unwrap();
        assert_eq!(loaded.seed, Some(0xabc));
        assert_eq!(loaded.stop_signal, StopSignal::Term);
        assert!(!loaded.listener_bounce);
        assert!(loaded.connector_bounce);

        let template = dir.path().join("template.json");
        ValidatedConfig::generate_template(&template).unwrap();
        let text = std::fs::read_to_string(&template).unwrap();
        assert!(text.contains("\"_info\""));
        let parsed: ValidatedConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.network_size, defaults::NETWORK_SIZE);
        assert_eq!(parsed.router_outage, defaults::ROUTER_OUTAGE);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: ValidatedConfig =
            serde_json::from_str(r#"{ "network_size": 2, "stop_signal": "term" }"#).unwrap();
        assert_eq!(parsed.network_size, 2);
        assert_eq!(parsed.stop_signal, StopSignal::Term);
        assert_eq!(parsed.skmanage, "skmanage");
        assert_eq!(parsed.admin_timeout_secs, 60);
        assert!(parsed.management_probe);
    }

    #[test]
    fn test_read_file_does_not_validate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steel-rain.json");
        let logs = dir.path().join("logs");
        let text = serde_json::json!({
            "logs_path": logs.to_string_lossy(),
            "config_dir": dir.path().join("configs").to_string_lossy(),
            "stop_timeout_secs": 0,
            "logs_modules": [{ "module": "steel_rain::admin", "level": "debug" }],
        });
        std::fs::write(&path, text.to_string()).unwrap();

        // Reading leaves the logger a chance to be installed before validation
        let config = ValidatedConfig::read_file(&path).unwrap();
        assert_eq!(config.stop_timeout_secs, 0);
        assert_eq!(config.logs_modules[0].level, LogLevel::Debug);
        assert!(!logs.exists());

        assert!(ValidatedConfig::from_file(&path, false).is_err());
        let fixed = ValidatedConfig::from_file(&path, true).unwrap();
        assert_eq!(fixed.stop_timeout_secs, defaults::STOP_TIMEOUT_SECS);
        assert!(logs.is_dir());
    }
}
