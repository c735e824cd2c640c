//! Configuration file and presets support.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default CLI options.
    pub defaults: Defaults,
    /// User-defined presets.
    #[serde(default)]
    pub presets: HashMap<String, Preset>,
}

/// Default CLI options.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Enable verbose output by default.
    pub verbose: bool,
    /// Enable quiet output by default.
    pub quiet: bool,
    /// Stage selection and decorators used when no flag or preset sets them.
    #[serde(flatten)]
    pub stages: Preset,
}

/// A preset is a bundle of stage selections and decorator settings.
///
/// ```toml
/// [presets.nightly]
/// transform = "csv"
/// compression = "gzip"
/// format = "plain"
/// retry = 3
/// timeout_ms = 2000
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Preset {
    pub transform: Option<String>,
    pub compression: Option<String>,
    pub format: Option<String>,

    // Decorators applied to every stage
    pub log: Option<bool>,
    pub retry: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub per_attempt_timeout: Option<bool>,
}

impl Preset {
    /// Merge another preset into this one (other takes precedence).
    pub fn merge(&mut self, other: &Preset) {
        if other.transform.is_some() {
            self.transform = other.transform.clone();
        }
        if other.compression.is_some() {
            self.compression = other.compression.clone();
        }
        if other.format.is_some() {
            self.format = other.format.clone();
        }
        if other.log.is_some() {
            self.log = other.log;
        }
        if other.retry.is_some() {
            self.retry = other.retry;
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.per_attempt_timeout.is_some() {
            self.per_attempt_timeout = other.per_attempt_timeout;
        }
    }
}

impl Config {
    /// Load config from `path`, or the default location when `None`.
    ///
    /// A missing file yields the default config. Read and parse failures
    /// are returned so the caller can report them once logging is up.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };
        Self::load_from_path(path)
    }

    /// Load config from a specific path.
    pub fn load_from_path(path: Option<PathBuf>) -> Result<Self, String> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("strata").join("config.toml"))
    }

    /// Get a preset by name (user-defined or built-in).
    pub fn get_preset(&self, name: &str) -> Option<Preset> {
        // Check user-defined presets first
        if let Some(preset) = self.presets.get(name) {
            return Some(preset.clone());
        }

        // Fall back to built-in presets
        builtin_preset(name)
    }
}

/// Built-in presets.
fn builtin_preset(name: &str) -> Option<Preset> {
    match name {
        "web" => Some(Preset {
            transform: Some("json".into()),
            compression: Some("none".into()),
            format: Some("indent".into()),
            ..Default::default()
        }),
        "archive" => Some(Preset {
            transform: Some("csv".into()),
            compression: Some("gzip".into()),
            format: Some("plain".into()),
            ..Default::default()
        }),
        "legacy-xml" | "xml" => Some(Preset {
            transform: Some("xml".into()),
            compression: Some("none".into()),
            format: Some("xml-declaration".into()),
            ..Default::default()
        }),
        _ => None,
    }
}

/// List all available presets (built-in + user-defined).
pub fn list_presets(config: &Config) -> Vec<(String, String)> {
    let mut presets: Vec<(String, String)> = vec![
        ("web".into(), "JSON, uncompressed, indented".into()),
        ("archive".into(), "CSV, gzip, plain".into()),
        ("legacy-xml".into(), "XML with declaration".into()),
    ];

    let mut user: Vec<_> = config.presets.keys().cloned().collect();
    user.sort();
    presets.extend(user.into_iter().map(|name| (name, "user-defined".into())));
    presets
}
