//! Unified path management for Courier files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/courier/           # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/courier/      # Data directory
//! ├── sessions/                # Per-session update logs (<id>.jsonl)
//! ├── conversations/           # Conversation records (<id>.json)
//! └── logs/                    # Rolling log files
//!     └── courier.log.YYYY-MM-DD
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "courier";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for courier_core::CourierError {
    fn from(err: PathError) -> Self {
        courier_core::CourierError::config(err.to_string())
    }
}

/// Platform paths for Courier (XDG on Linux, the native locations elsewhere).
pub struct CourierPaths;

impl CourierPaths {
    /// Returns the Courier configuration directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to config directory (e.g., `~/.config/courier/`)
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine directory
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the Courier data directory.
    ///
    /// # Returns
    ///
    /// - `Ok(PathBuf)`: Path to data directory (e.g., `~/.local/share/courier/`)
    /// - `Err(PathError::HomeDirNotFound)`: Could not determine directory
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn sessions_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("sessions"))
    }

    pub fn conversations_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("conversations"))
    }

    pub fn logs_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("logs"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_app_dir() {
        // Only meaningful where a home directory exists.
        if let (Ok(data), Ok(sessions)) = (CourierPaths::data_dir(), CourierPaths::sessions_dir()) {
            assert!(data.ends_with(APP_DIR));
            assert_eq!(sessions.parent(), Some(data.as_path()));
        }
    }
}
