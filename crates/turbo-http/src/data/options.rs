use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::status::AcceptedStatusCodes;
use crate::error::{Error, Result};

/// Configuration for an `HttpSession` and its transport.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```
/// use turbo_http::SessionConfig;
///
/// let config = SessionConfig::from_toml_str(r#"
///     user_agent = "turbo/2.0"
///     accepted_status_codes = ["200-299", "304"]
///     log_traffic = true
/// "#).unwrap();
///
/// assert!(config.accepted_status_codes.contains(304));
/// assert_eq!(config.pool_max_idle_per_host, 8);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// `User-Agent` sent with every request.
    pub user_agent: String,

    /// Time allowed to establish a connection.
    ///
    /// Default: 10s
    pub connect_timeout_ms: u64,

    /// Total time allowed per request, body included. `None` leaves requests
    /// unbounded unless the request itself carries a timeout, which suits
    /// large downloads.
    ///
    /// Default: None
    pub request_timeout_ms: Option<u64>,

    /// How long an idle pooled connection is kept.
    ///
    /// Default: 90s
    pub pool_idle_timeout_ms: u64,

    /// Default: 8
    pub pool_max_idle_per_host: usize,

    /// Status codes treated as success. Snapshotted by each operation when it
    /// starts.
    ///
    /// Default: 200-299
    pub accepted_status_codes: AcceptedStatusCodes,

    /// Directory that receives download files.
    ///
    /// Default: `<temp dir>/turbo-downloads`
    pub download_dir: PathBuf,

    /// Skip TLS certificate validation. Only for test servers.
    pub accept_invalid_certs: bool,

    /// Headers added to every request.
    pub default_headers: BTreeMap<String, String>,

    /// Dump request and response heads at debug level.
    pub log_traffic: bool,

    /// Credential rounds per request before the challenge response is handed
    /// to the caller as-is.
    ///
    /// Default: 3
    pub max_auth_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("turbo-http/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: None,
            pool_idle_timeout_ms: 90_000,
            pool_max_idle_per_host: 8,
            accepted_status_codes: AcceptedStatusCodes::success(),
            download_dir: std::env::temp_dir().join("turbo-downloads"),
            accept_invalid_certs: false,
            default_headers: BTreeMap::new(),
            log_traffic: false,
            max_auth_attempts: 3,
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn connect_timeout(&self) -> Duration { Duration::from_millis(self.connect_timeout_ms) }

    pub fn request_timeout(&self) -> Option<Duration> { self.request_timeout_ms.map(Duration::from_millis) }

    pub fn pool_idle_timeout(&self) -> Duration { Duration::from_millis(self.pool_idle_timeout_ms) }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn request_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn accepted_status_codes(mut self, codes: AcceptedStatusCodes) -> Self {
        self.accepted_status_codes = codes;
        self
    }

    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn log_traffic(mut self, enabled: bool) -> Self {
        self.log_traffic = enabled;
        self
    }

    #[must_use]
    pub fn max_auth_attempts(mut self, attempts: u32) -> Self {
        self.max_auth_attempts = attempts;
        self
    }
}
