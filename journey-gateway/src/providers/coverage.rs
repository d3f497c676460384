//! The set of collaborators serving one coverage area.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::{FallbackMode, FeedPublisher};

use super::{FareBackend, PtPlanner, StreetNetworkProvider};

/// All the collaborators needed to answer requests on one coverage area.
#[derive(Clone)]
pub struct Coverage {
    name: String,
    planner: Arc<dyn PtPlanner>,
    street_networks: HashMap<FallbackMode, Arc<dyn StreetNetworkProvider>>,
    fare_backend: Option<Arc<dyn FareBackend>>,
}

impl Coverage {
    pub fn new(name: impl Into<String>, planner: Arc<dyn PtPlanner>) -> Self {
        Self {
            name: name.into(),
            planner,
            street_networks: HashMap::new(),
            fare_backend: None,
        }
    }

    /// Route `mode` through `provider`, replacing any previous provider for it.
    pub fn with_street_network(
        mut self,
        mode: FallbackMode,
        provider: Arc<dyn StreetNetworkProvider>,
    ) -> Self {
        self.street_networks.insert(mode, provider);
        self
    }

    /// Replace the planner, e.g. to put a cache in front of it.
    pub fn with_planner(mut self, planner: Arc<dyn PtPlanner>) -> Self {
        self.planner = planner;
        self
    }

    pub fn with_fare_backend(mut self, backend: Arc<dyn FareBackend>) -> Self {
        self.fare_backend = Some(backend);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn planner(&self) -> Arc<dyn PtPlanner> {
        Arc::clone(&self.planner)
    }

    pub fn street_network(&self, mode: FallbackMode) -> Option<Arc<dyn StreetNetworkProvider>> {
        self.street_networks.get(&mode).cloned()
    }

    pub fn fare_backend(&self) -> Option<Arc<dyn FareBackend>> {
        self.fare_backend.clone()
    }

    /// Feed publishers of the street networks serving the given modes.
    pub fn feed_publishers(&self, modes: &[FallbackMode]) -> Vec<FeedPublisher> {
        let mut publishers: Vec<FeedPublisher> = Vec::new();
        for mode in modes {
            if let Some(fp) = self.street_network(*mode).and_then(|sn| sn.feed_publisher())
                && !publishers.contains(&fp)
            {
                publishers.push(fp);
            }
        }
        publishers
    }
}

impl fmt::Debug for Coverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modes: Vec<_> = self
            .street_networks
            .iter()
            .map(|(mode, sn)| format!("{mode}:{}", sn.id()))
            .collect();
        modes.sort();
        f.debug_struct("Coverage")
            .field("name", &self.name)
            .field("street_networks", &modes)
            .field("fare_backend", &self.fare_backend.is_some())
            .finish()
    }
}
