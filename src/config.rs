//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/treemodel/treemodel.toml`
//! 3. Explicit config file passed by the caller
//! 4. Environment variables: `TREEMODEL_*` prefix

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::errors::{TreeError, TreeResult};

/// How ids are generated for input nodes that carry none.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Random decimal string
    #[default]
    Numeric,
    /// Hyphenated v4 UUID
    Uuid,
}

impl FromStr for IdStrategy {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" => Ok(IdStrategy::Numeric),
            "uuid" => Ok(IdStrategy::Uuid),
            other => Err(TreeError::Config(format!(
                "unknown id_strategy '{}', expected 'numeric' or 'uuid'",
                other
            ))),
        }
    }
}

impl fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdStrategy::Numeric => write!(f, "numeric"),
            IdStrategy::Uuid => write!(f, "uuid"),
        }
    }
}

/// Unified configuration for treemodel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Id generator used when an input node has no `id`
    pub id_strategy: IdStrategy,
    /// Pretty-print JSON output
    pub indent_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id_strategy: IdStrategy::default(),
            indent_json: true,
        }
    }
}

/// Raw settings for intermediate parsing (`None` means "not specified, inherit").
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub id_strategy: Option<IdStrategy>,
    pub indent_json: Option<bool>,
}

/// Get the XDG config directory for treemodel.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "treemodel").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("treemodel.toml"))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> TreeResult<RawSettings> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| TreeError::Config(format!("read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| TreeError::Config(format!("parse {}: {}", path.display(), e)))
}

fn config_err(e: ConfigError) -> TreeError {
    TreeError::Config(e.to_string())
}

impl Settings {
    /// Overlay wins where it specifies a value.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            id_strategy: overlay.id_strategy.unwrap_or(self.id_strategy),
            indent_json: overlay.indent_json.unwrap_or(self.indent_json),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `config_file` - Optional explicit config file; it must exist when given
    pub fn load(config_file: Option<&Path>) -> TreeResult<Self> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config
        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.merge_with(&raw);
            }
        }

        // 3. Explicit config file
        if let Some(path) = config_file {
            let raw = load_raw_settings(path)?;
            current = current.merge_with(&raw);
        }

        // 4. Environment variables
        Self::apply_env_overrides(current)
    }

    /// Apply TREEMODEL_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> TreeResult<Self> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("TREEMODEL")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("id_strategy") {
            settings.id_strategy = val.parse()?;
        }
        if let Ok(val) = config.get_bool("indent_json") {
            settings.indent_json = val;
        }

        Ok(settings)
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> TreeResult<String> {
        toml::to_string_pretty(self).map_err(|e| TreeError::Config(e.to_string()))
    }
}
