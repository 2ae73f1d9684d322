//! Configuration management for Landau
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{LandauError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vendor cloud API credentials and endpoint
    pub api: ApiConfig,

    /// Polling cadence and night-window settings
    pub polling: PollingConfig,

    /// CAN sections exposed to the host platform
    pub can_sections: Vec<String>,

    /// IANA timezone used for the night window and daily counter rollover
    pub timezone: String,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Vendor cloud API parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Account email used for login
    pub email: String,

    /// Account password
    pub password: String,

    /// Base URL of the vendor cloud API
    pub base_url: String,
}

/// Polling cadence and throttling parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Scheduled refresh interval in minutes
    pub update_interval_minutes: u64,

    /// Per-call timeout for the CAN data endpoint in seconds
    pub can_bus_timeout_seconds: u64,

    /// Local hour at which the night window opens (inclusive)
    pub night_start_hour: u8,

    /// Local hour at which the night window closes (exclusive)
    pub night_end_hour: u8,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (or directory for daily rotation)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// CAN sections exposed when the config does not name any
pub const DEFAULT_CAN_SECTIONS: [&str; 9] = [
    "psuStatus1",
    "psuStatus2",
    "psuWarnings1",
    "psuWarnings2",
    "levels2",
    "levels3",
    "currentOptionsBank3",
    "currentOptionsBank1",
    "currentOptionsBank2",
];

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            password: String::new(),
            base_url: "https://www.swiftcommand.co.uk/api".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            update_interval_minutes: 60,
            can_bus_timeout_seconds: 15,
            night_start_hour: 20,
            night_end_hour: 8,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/landau.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            polling: PollingConfig::default(),
            can_sections: DEFAULT_CAN_SECTIONS.iter().map(|s| s.to_string()).collect(),
            timezone: "UTC".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "landau_config.yaml",
            "/data/landau_config.yaml",
            "/etc/landau/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Scheduled refresh interval
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.polling.update_interval_minutes * 60)
    }

    /// Per-call timeout for the CAN data endpoint
    pub fn can_bus_timeout(&self) -> Duration {
        Duration::from_secs(self.polling.can_bus_timeout_seconds)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.email.is_empty() {
            return Err(LandauError::validation(
                "api.email",
                "Account email cannot be empty",
            ));
        }

        if self.api.password.is_empty() {
            return Err(LandauError::validation(
                "api.password",
                "Account password cannot be empty",
            ));
        }

        if self.api.base_url.is_empty() {
            return Err(LandauError::validation(
                "api.base_url",
                "Base URL cannot be empty",
            ));
        }

        if !(5..=1440).contains(&self.polling.update_interval_minutes) {
            return Err(LandauError::validation(
                "polling.update_interval_minutes",
                "Must be between 5 and 1440",
            ));
        }

        if !(5..=60).contains(&self.polling.can_bus_timeout_seconds) {
            return Err(LandauError::validation(
                "polling.can_bus_timeout_seconds",
                "Must be between 5 and 60",
            ));
        }

        if self.polling.night_start_hour > 23 {
            return Err(LandauError::validation(
                "polling.night_start_hour",
                "Must be between 0 and 23",
            ));
        }

        if self.polling.night_end_hour > 23 {
            return Err(LandauError::validation(
                "polling.night_end_hour",
                "Must be between 0 and 23",
            ));
        }

        if self.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(LandauError::validation(
                "timezone",
                "Not a valid IANA timezone name",
            ));
        }

        Ok(())
    }
}
