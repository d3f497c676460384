//! Caching layer in front of the public transport planner.
//!
//! Place details and the stop points of a place only change when the
//! planner's data is reloaded, so they are cached for a short TTL and shared
//! between requests. Time-dependent operations (journeys, isochrones,
//! crow-fly searches) always go through to the planner.

use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use moka::future::Cache as MokaCache;

use crate::domain::{Coord, Place, PlannerResponse};
use crate::providers::{
    CrowFlyRequest, ProviderError, ProximityCandidate, PtJourneysRequest, PtPlanner,
};

/// Configuration for the cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for cached entries.
    pub ttl: Duration,

    /// Maximum number of cached entries per lookup kind.
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            max_capacity: 10_000,
        }
    }
}

/// Planner with cached static lookups.
///
/// Wraps any `PtPlanner`. Unknown places are cached too, as `None`.
pub struct CachedPlanner {
    inner: Arc<dyn PtPlanner>,
    places: MokaCache<String, Option<Place>>,
    stop_points: MokaCache<String, Arc<Vec<Place>>>,
}

impl CachedPlanner {
    /// Create a new cached planner.
    pub fn new(inner: Arc<dyn PtPlanner>, config: &CacheConfig) -> Self {
        Self {
            inner,
            places: MokaCache::builder()
                .time_to_live(config.ttl)
                .max_capacity(config.max_capacity)
                .build(),
            stop_points: MokaCache::builder()
                .time_to_live(config.ttl)
                .max_capacity(config.max_capacity)
                .build(),
        }
    }

    /// Get cache statistics (for monitoring).
    pub fn entry_count(&self) -> u64 {
        self.places.entry_count() + self.stop_points.entry_count()
    }

    /// Invalidate all cached entries, e.g. after a data reload.
    pub fn invalidate_all(&self) {
        self.places.invalidate_all();
        self.stop_points.invalidate_all();
    }

    async fn cached_place(&self, uri: &str, request_id: &str) -> Result<Option<Place>, ProviderError> {
        if let Some(cached) = self.places.get(uri).await {
            return Ok(cached);
        }
        let place = self.inner.place_by_uri(uri, request_id).await?;
        self.places.insert(uri.to_string(), place.clone()).await;
        Ok(place)
    }

    async fn cached_stop_points(&self, uri: &str, request_id: &str) -> Result<Vec<Place>, ProviderError> {
        if let Some(cached) = self.stop_points.get(uri).await {
            return Ok(cached.as_ref().clone());
        }
        let stop_points = self.inner.stop_points_of(uri, request_id).await?;
        self.stop_points
            .insert(uri.to_string(), Arc::new(stop_points.clone()))
            .await;
        Ok(stop_points)
    }
}

impl PtPlanner for CachedPlanner {
    fn place_by_uri<'a>(
        &'a self,
        uri: &'a str,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Place>, ProviderError>> {
        self.cached_place(uri, request_id).boxed()
    }

    fn stop_points_of<'a>(
        &'a self,
        uri: &'a str,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>> {
        self.cached_stop_points(uri, request_id).boxed()
    }

    fn odt_stop_points<'a>(
        &'a self,
        coord: Coord,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>> {
        self.inner.odt_stop_points(coord, request_id)
    }

    fn crow_fly(
        &self,
        request: CrowFlyRequest,
    ) -> BoxFuture<'_, Result<Vec<ProximityCandidate>, ProviderError>> {
        self.inner.crow_fly(request)
    }

    fn journeys(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        self.inner.journeys(request)
    }

    fn graphical_isochrones(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        self.inner.graphical_isochrones(request)
    }
}
