//! Configuration management for the alert tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (alerts.toml)
//! - Environment variables (ALERTS__*)
//!
//! ## Example config file (alerts.toml):
//! ```toml
//! [schema]
//! fragments = ["schema/cutout.avsc", "schema/candidate.avsc", "schema/alert.avsc"]
//!
//! [stamps]
//! output_dir = "output"
//! digest = "md5"
//!
//! [container]
//! codec = "deflate"
//!
//! [display]
//! format = "compact"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::checksum::DigestAlgorithm;
use crate::codec::ContainerCodec;
use crate::error::Result;
use crate::schema::{compose, compose_embedded, ResolvedSchema};

/// Main configuration for the alert tools
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Schema fragments
    #[serde(default)]
    pub schema: SchemaSettings,

    /// Stamp extraction settings
    #[serde(default)]
    pub stamps: StampSettings,

    /// Bulk container settings
    #[serde(default)]
    pub container: ContainerSettings,

    /// How decoded records are printed
    #[serde(default)]
    pub display: DisplaySettings,
}

/// Schema fragment list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSettings {
    /// Fragment files, lowest-level dependency first. Empty means the
    /// fragments embedded in the crate.
    #[serde(default)]
    pub fragments: Vec<PathBuf>,
}

/// Stamp extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampSettings {
    /// Directory extracted stamps are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Digest used when checking extracted stamps
    #[serde(default)]
    pub digest: DigestAlgorithm,
}

/// Bulk container configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Block compression
    #[serde(default)]
    pub codec: ContainerCodec,
}

/// Display configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisplaySettings {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for StampSettings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            digest: DigestAlgorithm::default(),
        }
    }
}

impl CodecConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["alerts.toml", ".alerts.toml", "config/alerts.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("org", "atlas", "alerts") {
            let xdg_config = config_dir.config_dir().join("alerts.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (ALERTS__STAMPS__OUTPUT_DIR etc.)
        builder = builder.add_source(
            Environment::with_prefix("ALERTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Compose the configured fragments, or the embedded ones if none are set
    pub fn compose_schema(&self) -> Result<ResolvedSchema> {
        if self.schema.fragments.is_empty() {
            compose_embedded()
        } else {
            compose(&self.schema.fragments)
        }
    }

    /// Compose `fragments` if any were given on the command line, else the
    /// configured ones
    pub fn compose_schema_from(&self, fragments: &[PathBuf]) -> Result<ResolvedSchema> {
        if fragments.is_empty() {
            self.compose_schema()
        } else {
            compose(fragments)
        }
    }
}
