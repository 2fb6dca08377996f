use crate::credential::{Credential, SecretString, lenient_opt_string};
use crate::error::RelayError;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Plain environment variables read without a prefix.
pub const PLAIN_ENV_KEYS: [&str; 3] = ["PORT", "CLIENT_ID", "CLIENT_SECRET"];

/// Prefix for nested overrides, e.g. `STATRELAY_UPSTREAM__STATISTICS_URL`.
pub const ENV_PREFIX: &str = "STATRELAY_";

pub const DEFAULT_TOKEN_URL: &str =
    "https://services.sentinel-hub.com/auth/realms/main/protocol/openid-connect/token";
pub const DEFAULT_STATISTICS_URL: &str = "https://services.sentinel-hub.com/api/v1/statistics";

/// Inbound route of the relay.
pub const STATISTICS_PATH: &str = "/get-statistics";

/// Top-level relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<SecretString>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub token_cache: TokenCacheConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Inbound listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Upper bound on a buffered request body.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Identity and statistics endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_statistics_url")]
    pub statistics_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds before expiry at which a cached token is treated as stale.
    #[serde(default = "default_refresh_skew")]
    pub refresh_skew_secs: u64,
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Plain,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// When false, no prometheus counters are updated on the hot path.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// ── Defaults ──────────────────────────────────────────────────

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "0.0.0.0".into() }
fn default_max_body_bytes() -> usize { 2 * 1024 * 1024 }
fn default_token_url() -> String { DEFAULT_TOKEN_URL.into() }
fn default_statistics_url() -> String { DEFAULT_STATISTICS_URL.into() }
fn default_connect_timeout() -> u64 { 5000 }
fn default_request_timeout() -> u64 { 30000 }
fn default_true() -> bool { true }
fn default_refresh_skew() -> u64 { 60 }
fn default_metrics_path() -> String { "/metrics".into() }

// ── Impls ─────────────────────────────────────────────────────

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            client_id: None,
            client_secret: None,
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
            token_cache: TokenCacheConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            token_url: default_token_url(),
            statistics_url: default_statistics_url(),
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_skew_secs: default_refresh_skew(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Plain,
            prometheus: PrometheusConfig::default(),
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_metrics_path(),
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl TokenCacheConfig {
    /// Skew capped at one day.
    pub fn refresh_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_skew_secs.min(86_400) as i64)
    }
}

impl RelayConfig {
    /// Provider stack: YAML file, then `PORT`/`CLIENT_ID`/`CLIENT_SECRET`,
    /// then `STATRELAY_`-prefixed nested overrides. A missing file is skipped.
    pub fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::raw().only(&PLAIN_ENV_KEYS))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load configuration from YAML file + env overrides.
    pub fn load(path: &Path) -> Result<Self, RelayError> {
        let config: RelayConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the router cannot be built from.
    pub fn validate(&self) -> Result<(), RelayError> {
        let prometheus = &self.observability.prometheus;
        if prometheus.enabled {
            let path = prometheus.path.as_str();
            if !path.starts_with('/') || path.len() < 2 {
                return Err(RelayError::Config(format!(
                    "observability.prometheus.path must start with '/' and name a route, got {path:?}"
                )));
            }
            if path.contains(['{', '}', '*']) {
                return Err(RelayError::Config(format!(
                    "observability.prometheus.path must be a literal path, got {path:?}"
                )));
            }
            if path == STATISTICS_PATH {
                return Err(RelayError::Config(format!(
                    "observability.prometheus.path conflicts with {STATISTICS_PATH}"
                )));
            }
        }
        Ok(())
    }

    /// Validated credential pair. Empty or whitespace values count as missing.
    pub fn credential(&self) -> Result<Credential, RelayError> {
        let client_id = self
            .client_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(RelayError::MissingCredential("CLIENT_ID"))?;
        let client_secret = self
            .client_secret
            .as_ref()
            .filter(|secret| !secret.is_empty())
            .ok_or(RelayError::MissingCredential("CLIENT_SECRET"))?;
        Ok(Credential::new(client_id, client_secret.clone()))
    }

    /// `host:port` string the listener binds to.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
