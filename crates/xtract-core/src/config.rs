//! Configuration module

use crate::archive::ExtractOptions;
use crate::batch::BatchOptions;
use crate::security::SecurityOptions;
use crate::{Error, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Number of leading bytes inspected by format detection
pub const DEFAULT_READ_LIMIT: usize = 3072;

/// Smallest read limit that still reaches the tar magic at offset 257
pub const MIN_READ_LIMIT: usize = 265;

/// Number of archives extracted simultaneously
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Format detection settings
    #[serde(default)]
    pub detection: DetectionConfig,
    /// Batch scheduling settings
    #[serde(default)]
    pub batch: BatchConfig,
    /// Entry materialization settings
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// Format detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Header bytes read from each candidate file
    pub read_limit: usize,
}

/// Batch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum archives in flight
    pub concurrency: usize,
}

/// Extraction configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Apply recorded permission bits
    pub preserve_permissions: bool,
    /// Apply recorded access/modification times
    pub preserve_timestamps: bool,
    /// Extract archives with several top-level entries into a directory named after the archive
    pub nest_loose_archives: bool,
    /// Write symlink targets verbatim even when they point outside the destination
    pub allow_external_symlinks: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            read_limit: DEFAULT_READ_LIMIT,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            preserve_timestamps: true,
            nest_loose_archives: true,
            allow_external_symlinks: true,
        }
    }
}

impl Config {
    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = config_dir().ok_or_else(|| {
            Error::Config("Unable to determine config directory".to_string())
        })?;

        let xtract_dir = config_dir.join("xtract");
        if !xtract_dir.exists() {
            fs::create_dir_all(&xtract_dir)?;
        }

        Ok(xtract_dir.join("config.toml"))
    }

    /// Get default configuration content with comments
    pub fn default_config_content() -> String {
        r#"# Xtract Configuration File

[detection]
# Bytes read from the start of each file when matching signatures
read_limit = 3072

[batch]
# Number of archives extracted at the same time
concurrency = 4

[extraction]
# Apply permission bits recorded in the archive
preserve_permissions = true
# Apply access/modification times recorded in the archive
preserve_timestamps = true
# Archives whose entries do not share one top-level directory
# are extracted into <dest>/<archive name>
nest_loose_archives = true
# Write symlink targets verbatim, even absolute or escaping ones
allow_external_symlinks = true
"#
        .to_string()
    }

    /// Load configuration from the default location, creating it on first use
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            fs::write(&path, Self::default_config_content())?;
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&path, contents)?;
        Ok(())
    }

    /// Load configuration or use defaults if loading fails
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            return Err(Error::Config(
                "batch.concurrency must be at least 1".to_string(),
            ));
        }
        if self.detection.read_limit < MIN_READ_LIMIT {
            return Err(Error::Config(format!(
                "detection.read_limit must be at least {}",
                MIN_READ_LIMIT
            )));
        }
        Ok(())
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            preserve_permissions: self.extraction.preserve_permissions,
            preserve_timestamps: self.extraction.preserve_timestamps,
            nest_loose_archives: self.extraction.nest_loose_archives,
            security: SecurityOptions {
                allow_external_symlinks: self.extraction.allow_external_symlinks,
            },
            read_limit: self.detection.read_limit,
            cancel: None,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.batch.concurrency,
            extract: self.extract_options(),
        }
    }
}
