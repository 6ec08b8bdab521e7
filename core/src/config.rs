//! Client configuration.
//!
//! The core reads no environment variables or files; callers build a
//! `ClientConfig` (or deserialize one from their own settings) and pass it to
//! [`ApiClient::new`](crate::client::ApiClient::new).

use serde::{Deserialize, Serialize};

/// Base URL every endpoint is appended to.
pub const DEFAULT_BASE_URL: &str = "http://0.0.0.0:5000/api/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for every request URL. Endpoints are concatenated onto it as-is,
    /// so it normally ends with `/`.
    pub base_url: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    /// Full URL for an endpoint path.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}
