//! Monitor Configuration - hub, backend, thresholds and view limits as TOML
//!
//! Each section implements `Default` with the values in [`super::defaults`],
//! so a missing file or a partial file behaves exactly like the built-in
//! configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "LINEWATCH_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "linewatch.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a monitor deployment.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$LINEWATCH_CONFIG` env var
/// 2. `./linewatch.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Push hub connection
    #[serde(default)]
    pub hub: HubConfig,

    /// Remote backend (test triggers, acknowledgments, notifications)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Dashboard API server
    #[serde(default)]
    pub server: ServerConfig,

    /// Periodic refresh requests
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Threshold derivation from the static normal ranges
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Rolling history buffer
    #[serde(default)]
    pub history: HistoryConfig,

    /// Alert view
    #[serde(default)]
    pub alerts: AlertConfig,

    /// Notification side-channel
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Machine display names
    #[serde(default)]
    pub machines: MachineConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$LINEWATCH_CONFIG` environment variable
    /// 2. `./linewatch.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded monitor config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded monitor config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Monitor config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Every problem is collected so one run reports them all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let h = &self.hub;
        if h.addr.trim().is_empty() {
            errors.push("hub.addr must not be empty".to_string());
        }
        if h.sensor_event.is_empty() || h.anomaly_event.is_empty() {
            errors.push("hub event names must not be empty".to_string());
        }
        if h.sensor_event == h.anomaly_event {
            errors.push(format!(
                "hub.sensor_event and hub.anomaly_event must differ (both '{}')",
                h.sensor_event
            ));
        }
        if h.retry_delay_secs == 0 {
            errors.push("hub.retry_delay_secs must be > 0".to_string());
        }
        if h.keep_alive_secs == 0 {
            errors.push("hub.keep_alive_secs must be > 0".to_string());
        }
        if h.server_timeout_secs <= h.keep_alive_secs {
            errors.push(format!(
                "hub.server_timeout_secs ({}) must be > keep_alive_secs ({})",
                h.server_timeout_secs, h.keep_alive_secs
            ));
        }

        let base = &self.backend.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            errors.push(format!("backend.base_url must be an http(s) URL, got '{base}'"));
        }

        if self.refresh.interval_secs == 0 {
            errors.push("refresh.interval_secs must be > 0".to_string());
        }

        let t = &self.thresholds;
        if !t.warning_margin.is_finite() || !t.danger_margin.is_finite() {
            errors.push(format!(
                "thresholds: margins must be finite (got warning={}, danger={})",
                t.warning_margin, t.danger_margin
            ));
        } else if t.danger_margin <= t.warning_margin {
            errors.push(format!(
                "thresholds.danger_margin ({:.3}) must be > warning_margin ({:.3})",
                t.danger_margin, t.warning_margin
            ));
        }

        if self.history.capacity == 0 {
            errors.push("history.capacity must be > 0".to_string());
        }
        if self.alerts.max_alerts == 0 {
            errors.push("alerts.max_alerts must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Push hub connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub address (host:port).
    pub addr: String,
    /// Event carrying sensor readings.
    pub sensor_event: String,
    /// Event carrying upstream anomaly alerts.
    pub anomaly_event: String,
    /// Fixed delay between connection attempts.
    pub retry_delay_secs: u64,
    /// Client ping interval.
    pub keep_alive_secs: u64,
    /// Hub silence tolerated before the connection is considered lost.
    pub server_timeout_secs: u64,
    /// Connect + handshake deadline.
    pub handshake_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            addr: defaults::HUB_ADDR.to_string(),
            sensor_event: defaults::SENSOR_DATA_EVENT.to_string(),
            anomaly_event: defaults::ANOMALY_ALERT_EVENT.to_string(),
            retry_delay_secs: defaults::HUB_RETRY_DELAY_SECS,
            keep_alive_secs: defaults::HUB_KEEP_ALIVE_SECS,
            server_timeout_secs: defaults::HUB_SERVER_TIMEOUT_SECS,
            handshake_timeout_secs: defaults::HUB_HANDSHAKE_TIMEOUT_SECS,
        }
    }
}

impl HubConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Remote backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BACKEND_BASE_URL.to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Dashboard API bind address.
    ///
    /// Can be overridden by the `--addr` CLI flag.
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

/// Periodic "send me a fresh reading" requests on top of push delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: defaults::REFRESH_INTERVAL_SECS,
        }
    }
}

/// Threshold margins applied to every sensor's static normal range.
///
/// `warning = max + width * warning_margin`,
/// `danger = max + width * danger_margin`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub warning_margin: f64,
    pub danger_margin: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            warning_margin: defaults::WARNING_MARGIN,
            danger_margin: defaults::DANGER_MARGIN,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::HISTORY_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Upper bound on alerts returned by the active-alert view.
    pub max_alerts: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_alerts: defaults::MAX_ALERTS_TO_SHOW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub recipients: Vec<String>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            recipients: defaults::NOTIFICATION_RECIPIENTS
                .iter()
                .map(|r| (*r).to_string())
                .collect(),
        }
    }
}

/// Machine id → display name. Unknown ids display as the raw id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    pub names: BTreeMap<String, String>,
}

impl Default for MachineConfig {
    fn default() -> Self {
        let names = [
            ("MACHINE-001", "Packaging Line"),
            ("MACHINE-002", "Main Production Line"),
            ("MACHINE-003", "Secondary Line"),
        ]
        .into_iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect();
        Self { names }
    }
}

impl MachineConfig {
    pub fn display_name(&self, machine_id: &str) -> String {
        self.names
            .get(machine_id)
            .cloned()
            .unwrap_or_else(|| machine_id.to_string())
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),

    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, toml::de::Error),

    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Tests
// ============================================================================
