//! Street-network paths, computed at most once per key.
//!
//! Direct paths, fallbacks and transfer paths all go through the
//! [`StreetNetworkPathPool`]. The provider decides what makes two requests
//! identical through [`StreetNetworkProvider::make_path_key`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::domain::{FallbackMode, Place, PlannerResponse, generate_id};
use crate::providers::{
    DirectPathRequest, PathKey, StreetNetworkPathType, StreetNetworkProvider,
};
use crate::request::PeriodExtremity;

use super::context::RequestContext;
use super::error::ScenarioError;
use super::future_manager::TaskFuture;

/// One origin/destination candidate pair and the path found between them.
struct Candidate {
    origin: Place,
    destination: Place,
    response: PlannerResponse,
}

impl Candidate {
    fn duration(&self) -> Option<u32> {
        self.response.journeys.first().map(|j| j.duration)
    }
}

/// Deduplicating pool of street-network path computations.
pub struct StreetNetworkPathPool {
    ctx: Arc<RequestContext>,
    paths: Mutex<HashMap<PathKey, TaskFuture<PlannerResponse>>>,
    direct_paths_by_mode: Mutex<Vec<(FallbackMode, TaskFuture<PlannerResponse>)>>,
}

impl StreetNetworkPathPool {
    pub fn new(ctx: Arc<RequestContext>) -> Self {
        Self {
            ctx,
            paths: Mutex::new(HashMap::new()),
            direct_paths_by_mode: Mutex::new(Vec::new()),
        }
    }

    fn key(
        &self,
        provider: &dyn StreetNetworkProvider,
        origin: &Place,
        destination: &Place,
        mode: FallbackMode,
        extremity: PeriodExtremity,
        path_type: StreetNetworkPathType,
    ) -> PathKey {
        provider.make_path_key(mode, &origin.uri, &destination.uri, path_type, extremity)
    }

    /// Start computing a path unless an identical one is already known.
    ///
    /// Returns `None` when no street network serves `mode`.
    pub fn add_async_request(
        &self,
        origin: &Place,
        destination: &Place,
        mode: FallbackMode,
        extremity: PeriodExtremity,
        path_type: StreetNetworkPathType,
    ) -> Option<TaskFuture<PlannerResponse>> {
        let Some(provider) = self.ctx.coverage.street_network(mode) else {
            warn!(mode = %mode, "no street network for mode");
            return None;
        };
        let key = self.key(provider.as_ref(), origin, destination, mode, extremity, path_type);

        let mut paths = lock(&self.paths);
        if let Some(future) = paths.get(&key) {
            debug!(mode = %mode, origin = %origin.uri, destination = %destination.uri, "path already requested");
            return Some(future.clone());
        }
        let future = self.ctx.fm.create_future(compute_path(
            Arc::clone(&self.ctx),
            provider,
            origin.clone(),
            destination.clone(),
            mode,
            extremity,
            path_type,
        ));
        paths.insert(key, future.clone());
        Some(future)
    }

    /// Request the direct path of `mode` between the requested places.
    pub fn add_direct_path(
        &self,
        origin: &Place,
        destination: &Place,
        mode: FallbackMode,
        extremity: PeriodExtremity,
    ) {
        if let Some(future) = self.add_async_request(
            origin,
            destination,
            mode,
            extremity,
            StreetNetworkPathType::Direct,
        ) {
            let mut by_mode = lock(&self.direct_paths_by_mode);
            if !by_mode.iter().any(|(m, _)| *m == mode) {
                by_mode.push((mode, future));
            }
        }
    }

    /// The path for these parameters, if it was requested.
    pub async fn wait_and_get(
        &self,
        origin: &Place,
        destination: &Place,
        mode: FallbackMode,
        extremity: PeriodExtremity,
        path_type: StreetNetworkPathType,
    ) -> Option<Arc<PlannerResponse>> {
        let provider = self.ctx.coverage.street_network(mode)?;
        let key = self.key(provider.as_ref(), origin, destination, mode, extremity, path_type);
        let future = lock(&self.paths).get(&key).cloned()?;
        settle(&future).await
    }

    /// The direct path of `mode`, if one was requested.
    pub async fn direct_path(&self, mode: FallbackMode) -> Option<Arc<PlannerResponse>> {
        let future = lock(&self.direct_paths_by_mode)
            .iter()
            .find(|(m, _)| *m == mode)
            .map(|(_, f)| f.clone())?;
        settle(&future).await
    }

    /// Duration of the direct path of `mode`, if one was found.
    pub async fn direct_path_duration(&self, mode: FallbackMode) -> Option<u32> {
        let response = self.direct_path(mode).await?;
        response.journeys.first().map(|j| j.duration)
    }

    /// Every requested direct path, in request order.
    pub async fn get_all_direct_paths(&self) -> Vec<(FallbackMode, Arc<PlannerResponse>)> {
        let futures: Vec<_> = lock(&self.direct_paths_by_mode).clone();
        let mut result = Vec::with_capacity(futures.len());
        for (mode, future) in futures {
            if let Some(response) = settle(&future).await {
                result.push((mode, response));
            }
        }
        result
    }

    /// Whether at least one direct path has a journey.
    pub async fn has_valid_direct_paths(&self) -> bool {
        self.get_all_direct_paths()
            .await
            .iter()
            .any(|(_, response)| response.has_journeys())
    }
}

pub(super) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

async fn settle(future: &TaskFuture<PlannerResponse>) -> Option<Arc<PlannerResponse>> {
    match future.wait_and_get().await {
        Ok(response) => Some(response),
        Err(e) => {
            error!(error = %e, "street network path task failed");
            None
        }
    }
}

async fn call_provider(
    ctx: &RequestContext,
    provider: &dyn StreetNetworkProvider,
    origin: Place,
    destination: Place,
    mode: FallbackMode,
    extremity: PeriodExtremity,
    path_type: StreetNetworkPathType,
) -> Candidate {
    let request = DirectPathRequest {
        mode,
        origin: origin.clone(),
        destination: destination.clone(),
        datetime: extremity.datetime,
        represents_start: extremity.represents_start,
        path_type,
        speeds: ctx.request.speeds(),
        request_id: ctx.request_id().to_string(),
    };
    let _slot = ctx.fm.acquire(mode.scheduling_weight()).await;
    let response = match provider.direct_path(request).await {
        Ok(response) => response,
        Err(e) => {
            error!(
                mode = %mode,
                origin = %origin.uri,
                destination = %destination.uri,
                error = %e,
                "street network path failed"
            );
            PlannerResponse::default()
        }
    };
    Candidate {
        origin,
        destination,
        response,
    }
}

async fn compute_path(
    ctx: Arc<RequestContext>,
    provider: Arc<dyn StreetNetworkProvider>,
    origin: Place,
    destination: Place,
    mode: FallbackMode,
    extremity: PeriodExtremity,
    path_type: StreetNetworkPathType,
) -> Result<PlannerResponse, ScenarioError> {
    let poi_access_points = ctx.request.poi_access_points;
    let origins = origin.path_candidates(poi_access_points, true);
    let destinations = destination.path_candidates(poi_access_points, false);

    let best = if origins.len() == 1 && destinations.len() == 1 {
        let (o, d) = (origins[0].clone(), destinations[0].clone());
        Some(call_provider(&ctx, provider.as_ref(), o, d, mode, extremity, path_type).await)
    } else {
        best_candidate(&ctx, &provider, &origins, &destinations, mode, extremity, path_type).await
    };

    let Some(best) = best else {
        warn!(mode = %mode, origin = %origin.uri, destination = %destination.uri, "no path candidate completed in time");
        return Ok(PlannerResponse::default());
    };
    Ok(finish_path(best, &origin, &destination, mode, provider.as_ref()))
}

/// Race every candidate pair and keep the fastest one completed before the timeout.
async fn best_candidate(
    ctx: &Arc<RequestContext>,
    provider: &Arc<dyn StreetNetworkProvider>,
    origins: &[Place],
    destinations: &[Place],
    mode: FallbackMode,
    extremity: PeriodExtremity,
    path_type: StreetNetworkPathType,
) -> Option<Candidate> {
    let mut pending = FuturesUnordered::new();
    for o in origins {
        for d in destinations {
            let (ctx2, provider, o, d) = (Arc::clone(ctx), Arc::clone(provider), o.clone(), d.clone());
            let future = ctx.fm.create_future(async move {
                Ok(call_provider(&ctx2, provider.as_ref(), o, d, mode, extremity, path_type).await)
            });
            pending.push(async move { future.wait_and_get().await });
        }
    }
    debug!(mode = %mode, candidates = pending.len(), "racing path candidates");

    let deadline = ctx.direct_path_timeout.map(|t| Instant::now() + t);
    let mut best: Option<Arc<Candidate>> = None;
    loop {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(mode = %mode, "path candidates timed out");
                    break;
                }
            },
            None => pending.next().await,
        };
        let Some(result) = next else { break };
        let Ok(candidate) = result else { continue };
        let Some(duration) = candidate.duration() else { continue };
        if best
            .as_ref()
            .and_then(|b| b.duration())
            .is_none_or(|current| duration < current)
        {
            best = Some(candidate);
        }
    }

    best.map(|c| Candidate {
        origin: c.origin.clone(),
        destination: c.destination.clone(),
        response: c.response.clone(),
    })
}

/// Make the chosen path start and end at the requested places.
fn finish_path(
    candidate: Candidate,
    origin: &Place,
    destination: &Place,
    mode: FallbackMode,
    provider: &dyn StreetNetworkProvider,
) -> PlannerResponse {
    let Candidate {
        origin: from,
        destination: to,
        mut response,
    } = candidate;

    for journey in &mut response.journeys {
        journey.internal_id = Some(generate_id());

        if from.uri != origin.uri
            && let Some(first) = journey.sections.first_mut()
        {
            first.geometry.insert(0, origin.coord);
            first.vias.push(from.uri.clone());
            first.origin = origin.clone();
        }
        if to.uri != destination.uri
            && let Some(last) = journey.sections.last_mut()
        {
            last.geometry.push(destination.coord);
            last.vias.push(to.uri.clone());
            last.destination = destination.clone();
        }

        if mode == FallbackMode::Ridesharing {
            for section in &mut journey.sections {
                if section.mode == Some(FallbackMode::Car) {
                    section.mode = Some(FallbackMode::Ridesharing);
                }
            }
            journey.recompute_totals();
        }
    }

    if response.has_journeys()
        && let Some(fp) = provider.feed_publisher()
    {
        response.add_feed_publisher(fp);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessPoint, Coord, PlaceKind};
    use crate::scenario::test_support::{
        MockPlanner, MockStreetNetwork, address, at, context, coverage, request,
    };
    use std::time::Duration;

    fn pool(sn: Arc<MockStreetNetwork>) -> (Arc<RequestContext>, StreetNetworkPathPool) {
        let ctx = context(request("o", "d"), coverage(Arc::new(MockPlanner::new()), sn));
        (ctx.clone(), StreetNetworkPathPool::new(ctx))
    }

    fn gate(uri: &str, lon: f64) -> AccessPoint {
        AccessPoint {
            uri: uri.to_string(),
            name: uri.to_string(),
            coord: Coord::new(lon, 48.85),
            traversal_time: 0,
            length: 0,
            is_entrance: true,
            is_exit: true,
        }
    }

    #[tokio::test]
    async fn identical_requests_are_computed_once() {
        let sn = Arc::new(MockStreetNetwork::new());
        let (ctx, pool) = pool(sn.clone());
        let o = address("o", 2.35, 48.85);
        let d = address("d", 2.36, 48.85);
        let extremity = PeriodExtremity::new(at(0), true);

        let first = pool
            .add_async_request(&o, &d, FallbackMode::Walking, extremity, StreetNetworkPathType::Direct)
            .unwrap();
        let second = pool
            .add_async_request(&o, &d, FallbackMode::Walking, extremity, StreetNetworkPathType::Direct)
            .unwrap();

        let a = first.wait_and_get().await.unwrap();
        let b = second.wait_and_get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(sn.calls("direct_path"), 1);
        assert!(a.journeys[0].internal_id.is_some());

        // A different period is a different path for a time-dependent provider.
        let later = PeriodExtremity::new(at(3600), true);
        pool.add_async_request(&o, &d, FallbackMode::Walking, later, StreetNetworkPathType::Direct)
            .unwrap()
            .wait_and_get()
            .await
            .unwrap();
        assert_eq!(sn.calls("direct_path"), 2);
        ctx.fm.drain().await;
    }

    #[tokio::test]
    async fn direct_paths_are_tracked_by_mode() {
        let sn = Arc::new(MockStreetNetwork::new().with_path_duration(420));
        let (_ctx, pool) = pool(sn);
        let o = address("o", 2.35, 48.85);
        let d = address("d", 2.36, 48.85);
        pool.add_direct_path(&o, &d, FallbackMode::Bike, PeriodExtremity::new(at(0), true));

        assert_eq!(pool.direct_path_duration(FallbackMode::Bike).await, Some(420));
        assert_eq!(pool.direct_path_duration(FallbackMode::Walking).await, None);
        assert!(pool.has_valid_direct_paths().await);
        assert_eq!(pool.get_all_direct_paths().await.len(), 1);
    }

    #[tokio::test]
    async fn provider_failure_is_an_empty_path() {
        let sn = Arc::new(MockStreetNetwork::new().with_failing_paths());
        let (_ctx, pool) = pool(sn);
        let o = address("o", 2.35, 48.85);
        let d = address("d", 2.36, 48.85);
        pool.add_direct_path(&o, &d, FallbackMode::Walking, PeriodExtremity::new(at(0), true));

        let response = pool.direct_path(FallbackMode::Walking).await.unwrap();
        assert!(!response.has_journeys());
        assert!(!pool.has_valid_direct_paths().await);
    }

    #[tokio::test]
    async fn fastest_access_point_wins() {
        let sn = Arc::new(MockStreetNetwork::new());
        let ctx = {
            let mut req = request("poi", "d");
            req.poi_access_points = true;
            context(req, coverage(Arc::new(MockPlanner::new()), sn.clone()))
        };
        let pool = StreetNetworkPathPool::new(ctx);
        let poi = Place::new(
            "poi",
            Coord::new(2.34, 48.85),
            PlaceKind::Poi {
                poi_type: None,
                children: Vec::new(),
                access_points: vec![gate("gate:far", 2.30), gate("gate:near", 2.355)],
            },
        );
        let d = address("d", 2.36, 48.85);
        pool.add_direct_path(&poi, &d, FallbackMode::Walking, PeriodExtremity::new(at(0), true));

        let response = pool.direct_path(FallbackMode::Walking).await.unwrap();
        let section = &response.journeys[0].sections[0];
        assert_eq!(section.vias, vec!["gate:near"]);
        assert_eq!(section.origin.uri, "poi");
        assert_eq!(section.geometry[0], poi.coord);
        assert_eq!(sn.calls("direct_path"), 2);
    }

    #[tokio::test]
    async fn slow_candidates_are_abandoned_after_timeout() {
        let sn = Arc::new(
            MockStreetNetwork::new()
                .with_path_delay("gate:a", Duration::from_secs(5))
                .with_path_delay("gate:b", Duration::from_secs(5)),
        );
        let mut req = request("poi", "d");
        req.poi_access_points = true;
        let ctx = Arc::new(
            RequestContext::new(
                req,
                coverage(Arc::new(MockPlanner::new()), sn),
                crate::scenario::future_manager::FutureManager::new(4),
            )
            .with_direct_path_timeout(Some(Duration::from_millis(20))),
        );
        let pool = StreetNetworkPathPool::new(ctx);
        let poi = Place::new(
            "poi",
            Coord::new(2.34, 48.85),
            PlaceKind::Poi {
                poi_type: None,
                children: Vec::new(),
                access_points: vec![gate("gate:a", 2.33), gate("gate:b", 2.35)],
            },
        );
        let d = address("d", 2.36, 48.85);
        pool.add_direct_path(&poi, &d, FallbackMode::Walking, PeriodExtremity::new(at(0), true));

        let started = std::time::Instant::now();
        let response = pool.direct_path(FallbackMode::Walking).await.unwrap();
        assert!(!response.has_journeys());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn ridesharing_paths_are_relabelled() {
        let sn = Arc::new(MockStreetNetwork::new());
        let (_ctx, pool) = pool(sn);
        let o = address("o", 2.35, 48.85);
        let d = address("d", 2.40, 48.85);
        pool.add_direct_path(&o, &d, FallbackMode::Ridesharing, PeriodExtremity::new(at(0), true));

        let response = pool.direct_path(FallbackMode::Ridesharing).await.unwrap();
        let journey = &response.journeys[0];
        assert_eq!(journey.sections[0].mode, Some(FallbackMode::Ridesharing));
        assert!(journey.durations.ridesharing > 0);
        assert_eq!(journey.durations.car, 0);
    }
}
