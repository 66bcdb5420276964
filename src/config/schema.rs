//! Configuration schema definitions.
//!
//! Every table and field is optional in the file; missing values take the
//! defaults below. All types derive Serde traits for TOML round-tripping.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the media proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Upstream fetch limits.
    pub fetch: FetchConfig,

    /// Hosts exempt from the `https` and private-address rules.
    pub allow_list: AllowListConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Inbound caller authentication.
    pub auth: AuthConfig,

    /// Seed entries for the in-memory record store.
    pub records: Vec<RecordConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Upstream fetch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Cap applied when the caller does not ask for one.
    pub default_max_bytes: u64,

    /// Lowest cap a caller may request.
    pub min_max_bytes: u64,

    /// Highest cap a caller may request.
    pub max_max_bytes: u64,

    /// Redirects followed before giving up.
    pub hop_limit: u32,

    /// Wall-clock budget for resolution, every hop and the body.
    pub timeout_secs: u64,

    /// `User-Agent` sent upstream.
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_max_bytes: 50 * 1024 * 1024,
            min_max_bytes: 1024 * 1024,
            max_max_bytes: 500 * 1024 * 1024,
            hop_limit: 3,
            timeout_secs: 30,
            user_agent: concat!("media-proxy/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    /// Clamp a caller-supplied cap into `[min_max_bytes, max_max_bytes]`.
    pub fn clamp_max_bytes(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default_max_bytes)
            .max(self.min_max_bytes)
            .min(self.max_max_bytes)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Allow-list configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AllowListConfig {
    /// Host patterns: `host`, `*.suffix` (subdomains) or `.suffix` (apex and
    /// subdomains). IP literals match exactly.
    pub hosts: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Caller authentication. Disabled when no token is set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bearer_token: Option<String>,
}

/// One record store entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecordConfig {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub filename: String,
}
