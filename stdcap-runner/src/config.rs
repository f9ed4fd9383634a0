//! Configuration file support for the stdcap runner.
//!
//! Configuration is read from TOML. Unknown fields are ignored, and settings are layered:
//! defaults < config file < command-line arguments.

use etcetera::BaseStrategy;
use std::path::{Path, PathBuf};

use stdcap_core::CaptureMethod;

use crate::args::{CommandLineArgs, OutputFormat};

/// Root configuration structure for the runner.
///
/// All fields are optional to support forward compatibility and partial configuration.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture configuration.
    pub capture: CaptureConfig,

    /// Output configuration.
    pub output: OutputConfig,
}

/// Capture configuration options.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Per-test capture method.
    pub method: Option<CaptureMethod>,
}

/// Output configuration options.
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Result reporting format.
    pub format: Option<OutputFormat>,

    /// Show setup and teardown of each case as it happens.
    #[serde(rename = "setup-show")]
    pub setup_show: Option<bool>,
}

/// Fully resolved settings for a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// Per-test capture method.
    pub method: CaptureMethod,
    /// Result reporting format.
    pub format: OutputFormat,
    /// Show setup and teardown of each case as it happens.
    pub setup_show: bool,
    /// Wait for the user after each failed case.
    pub pause_on_failure: bool,
}

impl Config {
    /// Resolves the settings for a run, merging with command-line arguments.
    ///
    /// Settings are applied with the following priority (highest to lowest):
    /// 1. CLI arguments (if provided)
    /// 2. Config file values
    /// 3. Default values
    pub fn to_settings(&self, args: &CommandLineArgs) -> Settings {
        let method = if args.no_capture {
            CaptureMethod::No
        } else {
            args.capture
                .or(self.capture.method)
                .unwrap_or_default()
        };

        Settings {
            method,
            format: args.format.or(self.output.format).unwrap_or_default(),
            setup_show: args.setup_show || self.output.setup_show.unwrap_or(false),
            pause_on_failure: args.pause_on_failure,
        }
    }
}

/// Result of attempting to load a configuration file.
#[derive(Debug)]
pub struct ConfigLoadResult {
    /// The loaded configuration, or default if loading failed.
    pub config: Config,

    /// The path that was used (or attempted) for loading.
    pub path: Option<PathBuf>,

    /// Any error that occurred during loading.
    pub error: Option<ConfigLoadError>,

    /// Whether the path was explicitly provided by the user (via `--config`).
    /// If true and there's an error, the run should fail rather than continue.
    pub explicit_path: bool,
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the TOML content.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Returns the default configuration file path for the current platform.
///
/// Returns `None` if the platform's config directory cannot be determined.
pub fn default_config_path() -> Option<PathBuf> {
    let strategy = etcetera::choose_base_strategy().ok()?;
    Some(strategy.config_dir().join("stdcap").join("config.toml"))
}

/// Loads configuration from the specified path.
pub fn load_from_path(path: &Path) -> ConfigLoadResult {
    let parsed = std::fs::read_to_string(path)
        .map_err(ConfigLoadError::from)
        .and_then(|content| toml::from_str(&content).map_err(ConfigLoadError::from));

    let (config, error) = match parsed {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    ConfigLoadResult {
        config,
        path: Some(path.to_path_buf()),
        error,
        explicit_path: false,
    }
}

/// Loads configuration based on the provided options.
///
/// # Arguments
///
/// * `disabled` - If true, skip loading and return defaults
/// * `explicit_path` - If provided, use this path instead of the default
pub fn load_config(disabled: bool, explicit_path: Option<&Path>) -> ConfigLoadResult {
    let defaults = |path| ConfigLoadResult {
        config: Config::default(),
        path,
        error: None,
        explicit_path: false,
    };

    if disabled {
        return defaults(None);
    }

    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => match default_config_path() {
            Some(p) => p,
            None => return defaults(None),
        },
    };

    // A missing file at the default location is not an error.
    if explicit_path.is_none() && !path.exists() {
        return defaults(Some(path));
    }

    let mut result = load_from_path(&path);
    result.explicit_path = explicit_path.is_some();
    result
}
