//! Gateway configuration.
//!
//! Loaded from the JSON file named by `JOURNEY_GATEWAY_CONFIG`, or defaulted
//! when the variable is unset. The defaults serve a single coverage with
//! crow-fly street networks and an HTTP planner on localhost.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{FallbackMode, FeedPublisher};
use crate::providers::{HttpConfig, ProviderError};
use crate::request::RequestDefaults;

/// Environment variable holding the configuration file path.
pub const CONFIG_ENV_VAR: &str = "JOURNEY_GATEWAY_CONFIG";

/// Errors raised while loading or applying the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// No connector is registered under this kind.
    #[error("unknown {role} connector kind: {kind}")]
    UnknownConnector { role: &'static str, kind: String },

    #[error("connector setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Selects a connector implementation and configures it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Registry key, e.g. `"crowfly"` or `"http"`.
    pub kind: String,
    /// Identifier reported by the connector; defaults to `kind`.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub http: Option<HttpConfig>,
    #[serde(default)]
    pub feed_publisher: Option<FeedPublisher>,
}

impl ConnectorConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: None,
            http: None,
            feed_publisher: None,
        }
    }

    pub fn http(base_url: impl Into<String>) -> Self {
        Self {
            http: Some(HttpConfig::new(base_url)),
            ..Self::new("http")
        }
    }

    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.kind)
    }

    /// HTTP settings, required by HTTP connectors.
    pub fn require_http(&self) -> Result<&HttpConfig, ConfigError> {
        self.http.as_ref().ok_or_else(|| {
            ConfigError::Invalid(format!("connector {} needs an `http` section", self.id()))
        })
    }
}

/// Collaborators serving one coverage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageConfig {
    pub name: String,
    pub planner: ConnectorConfig,
    /// Street-network connector per fallback mode.
    #[serde(default)]
    pub street_networks: HashMap<FallbackMode, ConnectorConfig>,
    #[serde(default)]
    pub fare: Option<ConnectorConfig>,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        let crowfly = ConnectorConfig::new("crowfly");
        Self {
            name: "default".to_string(),
            planner: ConnectorConfig::http("http://127.0.0.1:9000"),
            street_networks: FallbackMode::ALL
                .into_iter()
                .map(|mode| (mode, crowfly.clone()))
                .collect(),
            fare: None,
        }
    }
}

/// Settings of the moka cache in front of the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_capacity: 10_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address of the HTTP surface.
    pub bind: String,
    /// Concurrent external calls per request.
    pub future_pool_size: usize,
    /// How long to wait for the best of several direct-path candidates, in
    /// milliseconds. No limit when unset.
    pub direct_path_timeout_ms: Option<u64>,
    pub request_defaults: RequestDefaults,
    pub cache: CacheSettings,
    pub coverage: CoverageConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            future_pool_size: 8,
            direct_path_timeout_ms: None,
            request_defaults: RequestDefaults::default(),
            cache: CacheSettings::default(),
            coverage: CoverageConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path`, then validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the file named by [`CONFIG_ENV_VAR`], or use the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.future_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "future_pool_size must be at least 1".to_string(),
            ));
        }
        if self.coverage.street_networks.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "coverage {} has no street network",
                self.coverage.name
            )));
        }
        Ok(())
    }

    pub fn with_future_pool_size(mut self, n: usize) -> Self {
        self.future_pool_size = n;
        self
    }

    pub fn with_direct_path_timeout(mut self, timeout: Duration) -> Self {
        self.direct_path_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn direct_path_timeout(&self) -> Option<Duration> {
        self.direct_path_timeout_ms.map(Duration::from_millis)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}
