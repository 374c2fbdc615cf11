//! Configuration service.
//!
//! Loads [`RootConfig`] from `config.toml`. The default location is optional
//! (a fresh install runs on defaults); an explicitly requested file must
//! exist.

use crate::paths::CourierPaths;
use courier_core::config::RootConfig;
use courier_core::{CourierError, Result};
use std::path::{Path, PathBuf};

/// Loads configuration and resolves storage locations against it.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config: RootConfig,
    source: Option<PathBuf>,
}

impl ConfigService {
    /// Loads configuration.
    ///
    /// # Arguments
    ///
    /// * `explicit` - Path given on the command line, if any
    ///
    /// # Errors
    ///
    /// - `CourierError::Config` when `explicit` does not exist
    /// - `CourierError::Serialization` when the file is not valid TOML
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let (path, required) = match explicit {
            Some(path) => (path.to_path_buf(), true),
            None => match CourierPaths::config_file() {
                Ok(path) => (path, false),
                Err(e) => {
                    tracing::warn!("Config directory unavailable, using defaults: {}", e);
                    return Ok(Self::from_config(RootConfig::default()));
                }
            },
        };

        if !path.exists() {
            if required {
                return Err(CourierError::config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::from_config(RootConfig::default()));
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: RootConfig = toml::from_str(&contents)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(Self {
            config,
            source: Some(path),
        })
    }

    pub fn from_config(config: RootConfig) -> Self {
        Self {
            config,
            source: None,
        }
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn into_config(self) -> RootConfig {
        self.config
    }

    /// File the configuration was read from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Directory for per-session update logs.
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        match &self.config.storage.sessions_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(CourierPaths::sessions_dir()?),
        }
    }

    /// Directory for conversation records.
    pub fn conversations_dir(&self) -> Result<PathBuf> {
        match &self.config.storage.conversations_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(CourierPaths::conversations_dir()?),
        }
    }
}
