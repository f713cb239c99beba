use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to encode user snapshot: {0}")]
    EncodeSnapshot(#[from] serde_json::Error),
    #[error("failed to persist session: {0:#}")]
    Persist(anyhow::Error),
    #[error("failed to clear persisted session: {0:#}")]
    Clear(anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid api base url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}
