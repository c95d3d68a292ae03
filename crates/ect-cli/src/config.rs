//! Configuration file support.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Enable verbose output by default.
    pub verbose: bool,
    /// Enable quiet output by default.
    pub quiet: bool,
    /// Show progress for `run` without `--monitor`.
    pub monitor: bool,
    /// Log filter used when `RUST_LOG` is unset, e.g. "info" or "ect_core=debug".
    pub log_level: Option<String>,
}

impl Config {
    /// Load config from the default location (~/.config/ect/config.toml).
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path().as_deref())
    }

    /// Load config from a specific path.
    ///
    /// A missing file yields the defaults. An unreadable or invalid file
    /// prints a warning and yields the defaults.
    pub fn load_from_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ect").join("config.toml"))
    }
}
