//! Configuration types for the download center.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Number of bytes read from the network per block.
pub const BLOCK_SIZE: usize = 8192;

/// Default bound on followed redirects.
pub const MAX_REDIRECTS: usize = 10;

/// Where a successful download is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delivery {
    /// Persist into a temporary file on disk.
    #[default]
    TempFile,
    /// Keep the whole body in memory.
    Memory,
}

/// Configuration shared by every batch submitted to a download center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Bytes per streamed block.
    pub block_size: usize,
    /// Maximum number of redirect hops followed per request.
    pub max_redirects: usize,
    /// PEM bundle with additional trust anchors.
    pub ca_bundle: Option<PathBuf>,
    /// Directory for persisted downloads; the system temp dir when unset.
    pub temp_dir: Option<PathBuf>,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            max_redirects: MAX_REDIRECTS,
            ca_bundle: None,
            temp_dir: None,
            user_agent: concat!("download-center/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the block size.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the redirect hop limit.
    #[must_use]
    pub const fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// Trusts the certificates in the given PEM bundle in addition to the
    /// system trust store.
    #[must_use]
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Sets the directory persisted downloads are created in.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Sets the `User-Agent` header.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Checks that the values can be used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the block size is zero.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be greater than 0".into()));
        }
        Ok(())
    }

    /// Default location of the configuration file.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("download-center")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from [`default_path`](Self::default_path), falling
    /// back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            log::info!("Loaded config from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
