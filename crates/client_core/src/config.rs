use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use url::Url;

use crate::{error::ConfigError, list::DEFAULT_PAGE_LIMIT};

pub const DEFAULT_CONFIG_FILE: &str = "admin_client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub store_url: String,
    pub page_limit: u32,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:3000/api/".into(),
            store_url: "sqlite://./data/admin_client.db".into(),
            page_limit: DEFAULT_PAGE_LIMIT,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    api_base_url: Option<String>,
    store_url: Option<String>,
    page_limit: Option<u32>,
    request_timeout_secs: Option<u64>,
}

impl ClientSettings {
    /// Parsed base URL, always ending in `/` so relative endpoints join under it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let raw = self.api_base_url.trim();
        let with_slash = if raw.ends_with('/') {
            raw.to_string()
        } else {
            format!("{raw}/")
        };
        let url = Url::parse(&with_slash).map_err(|err| ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: raw.to_string(),
                reason: "scheme must be http or https".into(),
            });
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;
        if self.page_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "page_limit",
                value: self.page_limit.to_string(),
            });
        }
        if self.store_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "store_url",
                value: self.store_url.clone(),
            });
        }
        Ok(())
    }
}

/// Defaults, then `admin_client.toml` in the working directory if present, then the
/// process environment.
pub fn load_settings() -> Result<ClientSettings, ConfigError> {
    let path = PathBuf::from(DEFAULT_CONFIG_FILE);
    let file = path.exists().then_some(path.as_path());
    load_settings_from(file, |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    file: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientSettings, ConfigError> {
    let mut settings = ClientSettings::default();

    if let Some(path) = file {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file_cfg: FileSettings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(v) = file_cfg.api_base_url {
            settings.api_base_url = v;
        }
        if let Some(v) = file_cfg.store_url {
            settings.store_url = v;
        }
        if let Some(v) = file_cfg.page_limit {
            settings.page_limit = v;
        }
        if let Some(v) = file_cfg.request_timeout_secs {
            settings.request_timeout_secs = v;
        }
    }

    if let Some(v) = env("ADMIN_API_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = env("APP__API_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = env("ADMIN_STORE_URL") {
        settings.store_url = v;
    }
    if let Some(v) = env("APP__STORE_URL") {
        settings.store_url = v;
    }

    if let Some(v) = env("APP__PAGE_LIMIT") {
        settings.page_limit = v.parse().map_err(|_| ConfigError::InvalidValue {
            key: "APP__PAGE_LIMIT",
            value: v.clone(),
        })?;
    }
    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v.parse().map_err(|_| ConfigError::InvalidValue {
            key: "APP__REQUEST_TIMEOUT_SECS",
            value: v.clone(),
        })?;
    }

    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
