//! Configuration file support.
//!
//! Settings for logging, header synthesis defaults and window/level
//! auto-ranging, stored as versioned JSON.

use serde::{Deserialize, Serialize};

/// Log level setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    #[default]
    Warn,
    /// Show errors, warnings, and info messages
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Get all log levels in order from least to most verbose.
    pub fn all() -> &'static [LogLevel] {
        &[
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ]
    }

    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Install the `env_logger` backend at the given level.
///
/// `RUST_LOG` still overrides per-module filters. Calling this again after
/// a logger is installed does nothing.
pub fn init_logging(level: LogLevel) {
    let result = env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .try_init();
    if result.is_err() {
        log::debug!("Logger already initialised, keeping existing backend");
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Default UID root for generated identifiers.
pub const DEFAULT_BASE_UID: &str = "1.2.826.0.1.3680043.9.1613";

/// Inputs for default header synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderDefaultsConfig {
    /// Root of generated study/series/instance UIDs
    #[serde(default = "default_base_uid")]
    pub base_uid: String,

    /// Station identifier, also embedded in generated UIDs
    #[serde(default = "default_station_id")]
    pub station_id: String,

    #[serde(default = "default_manufacturer")]
    pub manufacturer: String,

    /// Modality used when the source file names none
    #[serde(default = "default_modality")]
    pub modality: String,

    #[serde(default)]
    pub patient_name: String,

    /// Written as PatientOrientation when non-empty, e.g. `L\P`
    #[serde(default)]
    pub patient_orientation: String,
}

fn default_base_uid() -> String {
    DEFAULT_BASE_UID.to_string()
}

fn default_station_id() -> String {
    "0001".to_string()
}

fn default_manufacturer() -> String {
    "mvio".to_string()
}

fn default_modality() -> String {
    "OT".to_string()
}

impl Default for HeaderDefaultsConfig {
    fn default() -> Self {
        Self {
            base_uid: default_base_uid(),
            station_id: default_station_id(),
            manufacturer: default_manufacturer(),
            modality: default_modality(),
            patient_name: String::new(),
            patient_orientation: String::new(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub header: HeaderDefaultsConfig,

    /// Lower percentile of the window/level auto-range
    #[serde(default = "default_percentile_low")]
    pub percentile_low: f64,

    /// Upper percentile of the window/level auto-range
    #[serde(default = "default_percentile_high")]
    pub percentile_high: f64,
}

fn default_percentile_low() -> f64 {
    crate::constants::DEFAULT_PERCENTILE_LOW
}

fn default_percentile_high() -> f64 {
    crate::constants::DEFAULT_PERCENTILE_HIGH
}

impl IoConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            log_level: LogLevel::default(),
            header: HeaderDefaultsConfig::default(),
            percentile_low: default_percentile_low(),
            percentile_high: default_percentile_high(),
        }
    }

    /// Percentile bounds, ordered and clamped to `[0, 100]`.
    pub fn percentiles(&self) -> (f64, f64) {
        let low = self.percentile_low.clamp(0.0, 100.0);
        let high = self.percentile_high.clamp(0.0, 100.0);
        if low <= high { (low, high) } else { (high, low) }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "mvio-config.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<std::path::PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("mvio").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("mvio")
                    .join(Self::default_filename())
            })
        }
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load configuration from `path`, logging failures.
    pub fn load_from(path: &std::path::Path) -> Option<Self> {
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    log::info!("Loaded configuration from {:?}", path);
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse config file {:?}: {}", path, e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to the default path.
    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        let path = Self::default_path().ok_or_else(|| {
            ConfigError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config directory",
            ))
        })?;
        self.save_to(&path)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
