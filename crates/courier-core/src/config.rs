//! Configuration model loaded from `config.toml`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct RootConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Slash commands offered to the client.
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_agent_title")]
    pub title: String,
    /// Pause between streamed chunks of the built-in engine.
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            title: default_agent_title(),
            chunk_delay_ms: default_chunk_delay_ms(),
        }
    }
}

fn default_agent_name() -> String {
    "courier".to_string()
}

fn default_agent_title() -> String {
    "Courier".to_string()
}

fn default_chunk_delay_ms() -> u64 {
    15
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory of per-session update logs. Defaults to `<data_dir>/courier/sessions`.
    #[serde(default)]
    pub sessions_dir: Option<PathBuf>,
    /// Directory of conversation records. Defaults to `<data_dir>/courier/conversations`.
    #[serde(default)]
    pub conversations_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub persist_updates: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sessions_dir: None,
            conversations_dir: None,
            persist_updates: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// When set, logs are also written to a daily rolling file here.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A prompt template exposed as `/name`.
///
/// `content` may contain `{key}` placeholders. Values come from
/// `key=value` arguments on the command line, falling back to `defaults`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CommandConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}
