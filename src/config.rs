use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ServiceError, io_err};

/// System-wide settings file consulted when `MB_SERVICE_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mb-service/config.toml";

/// Environment variable overriding the settings file location.
pub const CONFIG_ENV: &str = "MB_SERVICE_CONFIG";

/// Naming and policy for the one managed service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// systemd unit name, also used for the sudoers drop-in file
    pub service_name: String,
    /// launchd label
    pub label: String,
    pub daemon_binary: String,
    pub package_manager: String,
    /// Directory under the owner's home holding storage and the log file.
    pub storage_dir: String,
    /// Directory under the owner's home holding plugins.
    pub plugin_dir: String,
    pub log_file: String,
    pub default_frontend_port: u16,
    pub restart_delay_ms: u64,
    pub log_rotation_interval_secs: u64,
    pub log_rotation_max_bytes: u64,
    pub tail_lines: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service_name: "matterbridge".to_string(),
            label: "com.matterbridge".to_string(),
            daemon_binary: "matterbridge".to_string(),
            package_manager: "npm".to_string(),
            storage_dir: ".matterbridge".to_string(),
            plugin_dir: "Matterbridge".to_string(),
            log_file: "matterbridge.log".to_string(),
            default_frontend_port: 8283,
            restart_delay_ms: 2000,
            log_rotation_interval_secs: 3600,
            log_rotation_max_bytes: 10 * 1024 * 1024,
            tail_lines: 32,
        }
    }
}

impl Settings {
    /// Load settings from `MB_SERVICE_CONFIG` or the system-wide default path.
    pub fn load() -> Result<Self, ServiceError> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// A missing file yields the defaults; a malformed one is fatal.
    pub fn load_from(path: &Path) -> Result<Self, ServiceError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No settings file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(io_err(path, e)),
        };

        let settings: Settings = toml::from_str(&raw).map_err(|e| ServiceError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        settings.validate(path)?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn validate(&self, path: &Path) -> Result<(), ServiceError> {
        let invalid = |message: &str| ServiceError::Config {
            path: path.to_path_buf(),
            message: message.to_string(),
        };
        if self.service_name.trim().is_empty() || self.label.trim().is_empty() {
            return Err(invalid("service_name and label must not be empty"));
        }
        if self.default_frontend_port == 0 {
            return Err(invalid("default_frontend_port must be between 1 and 65535"));
        }
        if self.log_rotation_interval_secs == 0 {
            return Err(invalid("log_rotation_interval_secs must be positive"));
        }
        Ok(())
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}
