//! Configuration file support.
//!
//! Loader and transform defaults can be exported to and imported from a
//! versioned JSON file.

use std::path::Path;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_PERCENTILE_LOWER, DEFAULT_PERCENTILE_UPPER, ENVI_DATA_EXTENSIONS};
use crate::data::Layout;
use crate::transform::{Normalization, NormalizationMethod, NormalizationScope};

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Loader settings section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderSettings {
    /// Payload extensions probed next to an ENVI header, in order
    #[serde(default = "default_envi_data_extensions")]
    pub envi_data_extensions: Vec<String>,

    /// Rescale ENVI wavelengths given in micrometers to nanometers
    #[serde(default = "default_true")]
    pub convert_micrometers: bool,

    /// Layout used when the caller does not pick one
    #[serde(default)]
    pub default_layout: Layout,
}

fn default_envi_data_extensions() -> Vec<String> {
    ENVI_DATA_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_true() -> bool {
    true
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            envi_data_extensions: default_envi_data_extensions(),
            convert_micrometers: true,
            default_layout: Layout::Auto,
        }
    }
}

/// Transform settings section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Normalization applied when none is requested explicitly
    #[serde(default)]
    pub default_method: NormalizationMethod,

    #[serde(default)]
    pub scope: NormalizationScope,

    /// Percentile bounds offered for percentile clipping
    #[serde(default = "default_percentile_lower")]
    pub percentile_lower: f64,
    #[serde(default = "default_percentile_upper")]
    pub percentile_upper: f64,

    /// Keep integer element types when the result fits
    #[serde(default)]
    pub preserve_type: bool,
}

fn default_percentile_lower() -> f64 {
    DEFAULT_PERCENTILE_LOWER
}

fn default_percentile_upper() -> f64 {
    DEFAULT_PERCENTILE_UPPER
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            default_method: NormalizationMethod::default(),
            scope: NormalizationScope::default(),
            percentile_lower: DEFAULT_PERCENTILE_LOWER,
            percentile_upper: DEFAULT_PERCENTILE_UPPER,
            preserve_type: false,
        }
    }
}

impl TransformSettings {
    /// The default normalization described by these settings.
    pub fn normalization(&self) -> Normalization {
        Normalization {
            method: self.default_method,
            scope: self.scope,
            preserve_type: self.preserve_type,
        }
    }

    /// Percentile clipping with the configured bounds.
    pub fn percentile(&self) -> NormalizationMethod {
        NormalizationMethod::Percentile {
            lower: self.percentile_lower,
            upper: self.percentile_upper,
        }
    }
}

/// Configuration that can be exported and imported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Version of the configuration file format
    pub version: u32,

    #[serde(default)]
    pub loader: LoaderSettings,

    #[serde(default)]
    pub transform: TransformSettings,

    /// Maximum level passed on by the `log` macros of this crate
    #[serde(default = "default_log_level")]
    pub log_level: LevelFilter,
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

impl CoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            loader: LoaderSettings::default(),
            transform: TransformSettings::default(),
            log_level: default_log_level(),
        }
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

    /// Get the default filename for config export.
    pub fn default_filename() -> &'static str {
        "hsiview-config.json"
    }

    /// Cap the global `log` level at `log_level`.
    ///
    /// Installing a logger is left to the application.
    pub fn apply_log_level(&self) {
        log::set_max_level(self.log_level);
    }

    /// Load configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for CoreConfig {
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
