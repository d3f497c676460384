//! Connector selection by string identifier.
//!
//! Configuration names a connector `kind`; the registry maps each kind to a
//! factory building the connector from its [`ConnectorConfig`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, ConnectorConfig, CoverageConfig};

use super::{
    Coverage, CrowflyStreetNetwork, FareBackend, HttpFareBackend, HttpPtPlanner,
    HttpStreetNetwork, JsonHttpClient, PtPlanner, StreetNetworkProvider,
};

pub type PtPlannerFactory =
    Arc<dyn Fn(&ConnectorConfig) -> Result<Arc<dyn PtPlanner>, ConfigError> + Send + Sync>;

pub type StreetNetworkFactory = Arc<
    dyn Fn(&ConnectorConfig) -> Result<Arc<dyn StreetNetworkProvider>, ConfigError> + Send + Sync,
>;

pub type FareBackendFactory =
    Arc<dyn Fn(&ConnectorConfig) -> Result<Arc<dyn FareBackend>, ConfigError> + Send + Sync>;

/// Known connector implementations, keyed by kind.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    planners: HashMap<String, PtPlannerFactory>,
    street_networks: HashMap<String, StreetNetworkFactory>,
    fares: HashMap<String, FareBackendFactory>,
}

impl ConnectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the connectors shipped with the gateway:
    /// `"http"` for every role and `"crowfly"` for street networks.
    pub fn with_builtins() -> Self {
        Self::new()
            .register_planner("http", |config| {
                let client = JsonHttpClient::new(config.require_http()?)?;
                Ok(Arc::new(HttpPtPlanner::new(client)))
            })
            .register_street_network("http", |config| {
                let client = JsonHttpClient::new(config.require_http()?)?;
                let mut sn = HttpStreetNetwork::new(config.id(), client);
                if let Some(fp) = &config.feed_publisher {
                    sn = sn.with_feed_publisher(fp.clone());
                }
                Ok(Arc::new(sn))
            })
            .register_street_network("crowfly", |config| {
                let mut sn = CrowflyStreetNetwork::new(config.id());
                if let Some(fp) = &config.feed_publisher {
                    sn = sn.with_feed_publisher(fp.clone());
                }
                Ok(Arc::new(sn))
            })
            .register_fare("http", |config| {
                let client = JsonHttpClient::new(config.require_http()?)?;
                Ok(Arc::new(HttpFareBackend::new(client)))
            })
    }

    pub fn register_planner<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn PtPlanner>, ConfigError> + Send + Sync + 'static,
    {
        self.planners.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn register_street_network<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn StreetNetworkProvider>, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        self.street_networks.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn register_fare<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ConnectorConfig) -> Result<Arc<dyn FareBackend>, ConfigError> + Send + Sync + 'static,
    {
        self.fares.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn build_planner(&self, config: &ConnectorConfig) -> Result<Arc<dyn PtPlanner>, ConfigError> {
        let factory = self
            .planners
            .get(&config.kind)
            .ok_or_else(|| unknown("planner", config))?;
        factory(config)
    }

    pub fn build_street_network(
        &self,
        config: &ConnectorConfig,
    ) -> Result<Arc<dyn StreetNetworkProvider>, ConfigError> {
        let factory = self
            .street_networks
            .get(&config.kind)
            .ok_or_else(|| unknown("street network", config))?;
        factory(config)
    }

    pub fn build_fare(&self, config: &ConnectorConfig) -> Result<Arc<dyn FareBackend>, ConfigError> {
        let factory = self
            .fares
            .get(&config.kind)
            .ok_or_else(|| unknown("fare", config))?;
        factory(config)
    }

    /// Build every collaborator of a coverage.
    ///
    /// Modes configured with identical connector settings share one instance.
    pub fn build_coverage(&self, config: &CoverageConfig) -> Result<Coverage, ConfigError> {
        let mut coverage = Coverage::new(&config.name, self.build_planner(&config.planner)?);

        let mut built: Vec<(&ConnectorConfig, Arc<dyn StreetNetworkProvider>)> = Vec::new();
        for (mode, sn_config) in &config.street_networks {
            let provider = match built.iter().find(|(c, _)| *c == sn_config) {
                Some((_, provider)) => Arc::clone(provider),
                None => {
                    let provider = self.build_street_network(sn_config)?;
                    built.push((sn_config, Arc::clone(&provider)));
                    provider
                }
            };
            coverage = coverage.with_street_network(*mode, provider);
        }

        if let Some(fare) = &config.fare {
            coverage = coverage.with_fare_backend(self.build_fare(fare)?);
        }

        info!(coverage = %config.name, street_networks = built.len(), "coverage ready");
        Ok(coverage)
    }
}

fn unknown(role: &'static str, config: &ConnectorConfig) -> ConfigError {
    ConfigError::UnknownConnector {
        role,
        kind: config.kind.clone(),
    }
}
