//! Keeper configuration (build-keeper.toml)
//!
//! Raw options are read from TOML and overridden by CLI flags, then
//! validated once against an explicit project root. Nothing touches the
//! filesystem until validation has succeeded.

mod paths;

pub use paths::{normalize_asset_prefix, resolve_within};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use keeper_model::DEFAULT_ASSET_PREFIX;

/// Default config file name, relative to the project root
pub const DEFAULT_CONFIG_FILE: &str = "build-keeper.toml";

/// Default output root
pub const DEFAULT_OUTPUT_ROOT: &str = "dist";

/// Ledger file name used when `ledger_path` is not set
pub const DEFAULT_LEDGER_FILE: &str = ".build-versions.json";

/// Name of the staging directory under the output root
pub const STAGING_DIR_NAME: &str = ".build-keeper-staging";

/// Default number of retained versions
pub const DEFAULT_MAX_VERSIONS: u32 = 3;

/// Accepted range for `max_versions`
pub const MAX_VERSIONS_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{field} resolves outside the project root: {path}")]
    PathEscapesRoot { field: &'static str, path: String },
}

/// Raw keeper options as written in build-keeper.toml.
///
/// Every field is optional; unset fields take the built-in default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeeperOptions {
    /// Run the retention cycle at all (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Log every retention decision (default: true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,

    /// Number of versions to retain, 1-100 (default: 3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_versions: Option<u32>,

    /// Build output directory (default: "dist")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_root: Option<PathBuf>,

    /// Ledger file (default: "<output_root>/.build-versions.json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_path: Option<PathBuf>,

    /// Path prefix of the retained subtree (default: "assets/")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_prefix: Option<String>,
}

impl KeeperOptions {
    /// Parse options from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load options from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load options from a file, or defaults if the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Overlay every field set in `other` on top of `self`.
    pub fn merge(mut self, other: KeeperOptions) -> Self {
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.verbose.is_some() {
            self.verbose = other.verbose;
        }
        if other.max_versions.is_some() {
            self.max_versions = other.max_versions;
        }
        if other.output_root.is_some() {
            self.output_root = other.output_root;
        }
        if other.ledger_path.is_some() {
            self.ledger_path = other.ledger_path;
        }
        if other.asset_prefix.is_some() {
            self.asset_prefix = other.asset_prefix;
        }
        self
    }

    /// Validate and resolve against `project_root`.
    ///
    /// `project_root` must be absolute; relative paths in the options are
    /// joined onto it and must stay inside it after normalization.
    pub fn validate(&self, project_root: &Path) -> Result<KeeperConfig, ConfigError> {
        if !project_root.is_absolute() {
            return Err(ConfigError::Validation(format!(
                "project root must be absolute: {}",
                project_root.display()
            )));
        }

        let max_versions = self.max_versions.unwrap_or(DEFAULT_MAX_VERSIONS);
        if !MAX_VERSIONS_RANGE.contains(&max_versions) {
            return Err(ConfigError::Validation(format!(
                "max_versions must be between {} and {}, got {}",
                MAX_VERSIONS_RANGE.start(),
                MAX_VERSIONS_RANGE.end(),
                max_versions
            )));
        }

        let output_root_raw = self
            .output_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_ROOT));
        let output_root = resolve_within(project_root, &output_root_raw, "output_root")?;
        if output_root == project_root {
            return Err(ConfigError::Validation(
                "output_root must be a subdirectory of the project root".to_string(),
            ));
        }

        let ledger_path = match &self.ledger_path {
            Some(p) => resolve_within(project_root, p, "ledger_path")?,
            None => output_root.join(DEFAULT_LEDGER_FILE),
        };

        let asset_prefix = normalize_asset_prefix(
            self.asset_prefix.as_deref().unwrap_or(DEFAULT_ASSET_PREFIX),
        )?;
        if asset_prefix.split('/').next() == Some(STAGING_DIR_NAME) {
            return Err(ConfigError::Validation(format!(
                "asset_prefix must not lie inside the staging directory {}",
                STAGING_DIR_NAME
            )));
        }
        if ledger_path.starts_with(output_root.join(STAGING_DIR_NAME)) {
            return Err(ConfigError::Validation(format!(
                "ledger_path must not lie inside the staging directory: {}",
                ledger_path.display()
            )));
        }

        let asset_dir = output_root.join(asset_prefix.trim_end_matches('/'));
        if ledger_path.starts_with(&asset_dir) {
            return Err(ConfigError::Validation(format!(
                "ledger_path must not lie inside the swept asset directory: {}",
                ledger_path.display()
            )));
        }

        Ok(KeeperConfig {
            enabled: self.enabled.unwrap_or(true),
            verbose: self.verbose.unwrap_or(true),
            max_versions: max_versions as usize,
            output_root,
            ledger_path,
            asset_prefix,
        })
    }
}

/// Validated keeper configuration with absolute paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeeperConfig {
    /// Whether the retention cycle runs at all
    pub enabled: bool,

    /// Diagnostic logging toggle
    pub verbose: bool,

    /// Retention bound, 1-100
    pub max_versions: usize,

    /// Absolute build output directory
    pub output_root: PathBuf,

    /// Absolute ledger file path
    pub ledger_path: PathBuf,

    /// Asset prefix, always ending in `/`
    pub asset_prefix: String,
}

impl KeeperConfig {
    /// Asset prefix as an output-root-relative directory ("assets/" -> "assets").
    pub fn asset_subdir(&self) -> &str {
        self.asset_prefix.trim_end_matches('/')
    }

    /// Absolute path of the swept asset directory.
    pub fn asset_dir(&self) -> PathBuf {
        self.output_root.join(self.asset_subdir())
    }

    /// Absolute path of the staging root.
    pub fn staging_root(&self) -> PathBuf {
        self.output_root.join(STAGING_DIR_NAME)
    }
}
