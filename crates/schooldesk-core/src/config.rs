//! Application configuration management.
//!
//! Configuration is read from `~/.config/schooldesk/config.json` when that
//! file exists, then overridden by `SCHOOLDESK_*` environment variables.
//! Every field has a default so a bare checkout talks to a local backend.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "schooldesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Base API address used when nothing else is configured.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Google's token endpoint; the identity provider used for sign-in.
pub const DEFAULT_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const ENV_API_URL: &str = "SCHOOLDESK_API_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "SCHOOLDESK_REQUEST_TIMEOUT_SECS";
pub const ENV_OAUTH_CLIENT_ID: &str = "SCHOOLDESK_OAUTH_CLIENT_ID";
pub const ENV_OAUTH_CLIENT_SECRET: &str = "SCHOOLDESK_OAUTH_CLIENT_SECRET";
pub const ENV_OAUTH_REDIRECT_URI: &str = "SCHOOLDESK_OAUTH_REDIRECT_URI";
pub const ENV_OAUTH_TOKEN_URL: &str = "SCHOOLDESK_OAUTH_TOKEN_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub token_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            oauth: OAuthConfig::default(),
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            token_url: DEFAULT_OAUTH_TOKEN_URL.to_string(),
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.api_base_url = normalize_base_url(&config.api_base_url);
        Ok(config)
    }

    /// Override fields from a variable lookup. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get(ENV_API_URL) {
            self.api_base_url = normalize_base_url(&url);
        }
        if let Some(secs) = get(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number of seconds", ENV_REQUEST_TIMEOUT))?;
        }
        if let Some(id) = get(ENV_OAUTH_CLIENT_ID) {
            self.oauth.client_id = Some(id);
        }
        if let Some(secret) = get(ENV_OAUTH_CLIENT_SECRET) {
            self.oauth.client_secret = Some(secret);
        }
        if let Some(uri) = get(ENV_OAUTH_REDIRECT_URI) {
            self.oauth.redirect_uri = Some(uri);
        }
        if let Some(url) = get(ENV_OAUTH_TOKEN_URL) {
            self.oauth.token_url = url;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}
