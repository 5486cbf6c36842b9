//! Server configuration, loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::pool::DEFAULT_MAX_IDLE;

/// Default listen address.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:1018";
/// Default request body limit (4 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`ServerConfig`].
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server settings. Every field is optional in the file.
///
/// ```toml
/// bind_address = "0.0.0.0:8080"
/// max_body_bytes = 1048576
/// static_dir = "./static"
/// template_dir = "./templates"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// Larger request bodies are answered with 413.
    pub max_body_bytes: usize,
    /// Idle contexts kept for reuse.
    pub max_idle_contexts: usize,
    /// Directory served under `/assets`, if any.
    pub static_dir: Option<PathBuf>,
    /// Directory templates are loaded from, if any.
    pub template_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_idle_contexts: DEFAULT_MAX_IDLE,
            static_dir: None,
            template_dir: None,
        }
    }
}

impl ServerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`ServerConfig::from_toml_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}
