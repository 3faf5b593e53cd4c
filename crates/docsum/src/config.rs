//! Configuration for the summarization client

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::document::FileType;
use crate::types::summary::DEFAULT_METHOD;

/// Environment variable overriding [`ClientConfig::base_url`]
pub const BASE_URL_ENV: &str = "DOCSUM_API_BASE_URL";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Backend base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for status polls, document reads and job creation (default: 5s)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Timeout for uploads (default: 10s)
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
    /// Interval between status polls (default: 3s)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Consecutive transient poll failures before a degraded-connectivity notice
    #[serde(default = "default_degraded_after")]
    pub degraded_after_failures: u32,
    /// Maximum upload size in bytes (default: 15MB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Accepted file extensions, without the dot
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Accepted MIME types
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    /// Summarization method when none is given
    #[serde(default = "default_method")]
    pub default_method: String,
}

fn default_base_url() -> String { "http://localhost:8000".to_string() }
fn default_request_timeout_ms() -> u64 { 5_000 }
fn default_upload_timeout_ms() -> u64 { 10_000 }
fn default_poll_interval_ms() -> u64 { 3_000 }
fn default_degraded_after() -> u32 { 5 }
fn default_max_upload_bytes() -> u64 { 15 * 1024 * 1024 }  // 15MB
fn default_method() -> String { DEFAULT_METHOD.to_string() }

fn default_allowed_extensions() -> Vec<String> {
    FileType::ALL.iter().map(|t| t.extension().to_string()).collect()
}

fn default_allowed_mime_types() -> Vec<String> {
    FileType::ALL.iter().map(|t| t.mime_type().to_string()).collect()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            degraded_after_failures: default_degraded_after(),
            max_upload_bytes: default_max_upload_bytes(),
            allowed_extensions: default_allowed_extensions(),
            allowed_mime_types: default_allowed_mime_types(),
            default_method: default_method(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from an optional TOML file, then apply the
    /// `DOCSUM_API_BASE_URL` override and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                let config: ClientConfig = toml::from_str(&raw)?;
                tracing::debug!("Loaded configuration from {}", path.display());
                config
            }
            None => ClientConfig::default(),
        };

        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::config("base_url must not be empty"));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::config(format!(
                "base_url must start with http:// or https:// (got {})",
                self.base_url
            )));
        }
        if self.request_timeout_ms == 0 || self.upload_timeout_ms == 0 {
            return Err(Error::config("timeouts must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::config("poll_interval_ms must be greater than zero"));
        }
        if self.degraded_after_failures == 0 {
            return Err(Error::config("degraded_after_failures must be greater than zero"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn api_root(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
