use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SealstreamError, SealstreamResult};

/// Top-level configuration (loaded from sealstream.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealstreamConfig {
    pub log: LogConfig,
    pub key: KeyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level or filter directive (default: info)
    pub level: String,
    /// Log output format
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where the stream key comes from when no `--key-file` is given
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// File holding the base64-encoded key
    pub file: Option<PathBuf>,
    /// Environment variable holding the base64-encoded key
    pub env: String,
    /// Warn if the key file is readable by group or others (default: true)
    pub mode_check: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Text,
        }
    }
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            file: None,
            env: "SEALSTREAM_KEY".into(),
            mode_check: true,
        }
    }
}

impl SealstreamConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> SealstreamResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| SealstreamError::Config(format!("parsing {}: {e}", path.display())))
    }
}
