//! Stop points (or car parks) near a place, found by straight-line search.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{FallbackMode, Place};
use crate::providers::{CrowFlyRequest, CrowFlyTarget, ProximityCandidate};
use crate::request::JourneyRequest;

use super::context::RequestContext;
use super::error::ScenarioError;
use super::future_manager::TaskFuture;
use super::street_network_path::StreetNetworkPathPool;

/// Upper bound of a fallback for `mode`: the configured maximum, or the
/// direct path's duration when a direct path is faster.
///
/// Waits for the direct path of `mode` if one was requested.
pub async fn max_fallback_duration(
    request: &JourneyRequest,
    mode: FallbackMode,
    paths: &StreetNetworkPathPool,
) -> u32 {
    let max = request.max_duration_to_pt(mode);
    match paths.direct_path_duration(mode).await {
        Some(direct) => max.min(direct),
        None => max,
    }
}

/// One crow-fly search per fallback mode around a place.
pub struct ProximitiesByCrowflyPool {
    futures: HashMap<FallbackMode, TaskFuture<Vec<ProximityCandidate>>>,
}

impl ProximitiesByCrowflyPool {
    pub fn new(
        ctx: &Arc<RequestContext>,
        place: &Place,
        modes: &[FallbackMode],
        paths: &Arc<StreetNetworkPathPool>,
    ) -> Self {
        let futures = modes
            .iter()
            .map(|&mode| {
                let future = ctx.fm.create_future(search(
                    Arc::clone(ctx),
                    place.clone(),
                    mode,
                    Arc::clone(paths),
                ));
                (mode, future)
            })
            .collect();
        Self { futures }
    }

    pub fn future(&self, mode: FallbackMode) -> Option<TaskFuture<Vec<ProximityCandidate>>> {
        self.futures.get(&mode).cloned()
    }

    pub async fn wait_and_get(
        &self,
        mode: FallbackMode,
    ) -> Result<Arc<Vec<ProximityCandidate>>, ScenarioError> {
        match self.futures.get(&mode) {
            Some(future) => future.wait_and_get().await,
            None => Ok(Arc::new(Vec::new())),
        }
    }
}

async fn search(
    ctx: Arc<RequestContext>,
    place: Place,
    mode: FallbackMode,
    paths: Arc<StreetNetworkPathPool>,
) -> Result<Vec<ProximityCandidate>, ScenarioError> {
    let request = &ctx.request;
    let mut max_duration = max_fallback_duration(request, mode, &paths).await;
    if mode == FallbackMode::Bss {
        max_duration = max_duration.saturating_sub(request.bss_overhead());
    }

    if max_duration == 0 {
        return Ok(if place.is_stop_point() {
            vec![ProximityCandidate::new(place, 0.0)]
        } else {
            Vec::new()
        });
    }
    if !place.coord.is_valid() {
        debug!(place = %place.uri, "no coordinate, skipping crow-fly search");
        return Ok(Vec::new());
    }

    let target = if mode.uses_car_park() {
        CrowFlyTarget::CarParks {
            park_and_ride_only: request.park_and_ride_only,
            nearby_duration: request.max_duration_to_pt(FallbackMode::Walking),
        }
    } else {
        CrowFlyTarget::StopPoints
    };
    let crow_fly = CrowFlyRequest {
        place: place.clone(),
        mode,
        max_duration,
        max_count: request.max_nb_crowfly(mode),
        target,
        depth: if request.access_points { 2 } else { 1 },
        forbidden_uris: request.forbidden_uris.clone(),
        allowed_ids: request.allowed_ids.clone(),
        speeds: request.speeds(),
        request_id: ctx.request_id().to_string(),
    };

    let planner = ctx.planner();
    let _slot = ctx.fm.acquire(mode.scheduling_weight()).await;
    let candidates = planner
        .crow_fly(crow_fly)
        .await
        .map_err(|e| ScenarioError::planner(&e))?;
    debug!(place = %place.uri, mode = %mode, max_duration, found = candidates.len(), "crow-fly search done");
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::PeriodExtremity;
    use crate::scenario::test_support::{
        MockPlanner, MockStreetNetwork, address, at, context, coverage, request, stop_point,
    };

    fn near(uri: &str) -> ProximityCandidate {
        ProximityCandidate::new(stop_point(uri, 2.351, 48.85), 80.0)
    }

    #[tokio::test]
    async fn search_is_bounded_by_the_direct_path() {
        let planner = Arc::new(MockPlanner::new().with_crow_fly("o", vec![near("sp:1")]));
        let sn = Arc::new(MockStreetNetwork::new().with_path_duration(600));
        let ctx = context(request("o", "d"), coverage(planner.clone(), sn));
        let paths = Arc::new(StreetNetworkPathPool::new(ctx.clone()));
        let o = address("o", 2.35, 48.85);
        let d = address("d", 2.36, 48.85);
        paths.add_direct_path(&o, &d, FallbackMode::Walking, PeriodExtremity::new(at(0), true));

        let pool = ProximitiesByCrowflyPool::new(
            &ctx,
            &o,
            &[FallbackMode::Walking, FallbackMode::Bike],
            &paths,
        );
        assert_eq!(pool.wait_and_get(FallbackMode::Walking).await.unwrap().len(), 1);
        pool.wait_and_get(FallbackMode::Bike).await.unwrap();

        let requests = planner.crow_fly_requests();
        let walking = requests.iter().find(|r| r.mode == FallbackMode::Walking).unwrap();
        assert_eq!(walking.max_duration, 600);
        let bike = requests.iter().find(|r| r.mode == FallbackMode::Bike).unwrap();
        assert_eq!(bike.max_duration, 1800);
        assert_eq!(walking.target, CrowFlyTarget::StopPoints);
    }

    #[tokio::test]
    async fn bss_bound_excludes_rent_and_return() {
        let planner = Arc::new(MockPlanner::new());
        let ctx = context(
            request("o", "d"),
            coverage(planner.clone(), Arc::new(MockStreetNetwork::new())),
        );
        let paths = Arc::new(StreetNetworkPathPool::new(ctx.clone()));
        let pool = ProximitiesByCrowflyPool::new(
            &ctx,
            &address("o", 2.35, 48.85),
            &[FallbackMode::Bss],
            &paths,
        );
        pool.wait_and_get(FallbackMode::Bss).await.unwrap();
        assert_eq!(planner.crow_fly_requests()[0].max_duration, 1800 - 180);
    }

    #[tokio::test]
    async fn zero_bound_keeps_only_the_stop_point_itself() {
        let planner = Arc::new(MockPlanner::new().with_crow_fly("sp:o", vec![near("sp:1")]));
        let mut req = request("sp:o", "d");
        req.max_duration_to_pt.insert(FallbackMode::Walking, 0);
        let ctx = context(req, coverage(planner.clone(), Arc::new(MockStreetNetwork::new())));
        let paths = Arc::new(StreetNetworkPathPool::new(ctx.clone()));

        let pool = ProximitiesByCrowflyPool::new(
            &ctx,
            &stop_point("sp:o", 2.35, 48.85),
            &[FallbackMode::Walking],
            &paths,
        );
        let found = pool.wait_and_get(FallbackMode::Walking).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].place.uri, "sp:o");
        assert_eq!(planner.calls("crow_fly"), 0);
    }

    #[tokio::test]
    async fn car_searches_park_and_ride() {
        let planner = Arc::new(MockPlanner::new());
        let mut req = request("o", "d");
        req.park_and_ride_only = true;
        req.access_points = true;
        let ctx = context(req, coverage(planner.clone(), Arc::new(MockStreetNetwork::new())));
        let paths = Arc::new(StreetNetworkPathPool::new(ctx.clone()));
        let pool = ProximitiesByCrowflyPool::new(
            &ctx,
            &address("o", 2.35, 48.85),
            &[FallbackMode::Car],
            &paths,
        );
        pool.wait_and_get(FallbackMode::Car).await.unwrap();

        let sent = &planner.crow_fly_requests()[0];
        assert_eq!(
            sent.target,
            CrowFlyTarget::CarParks {
                park_and_ride_only: true,
                nearby_duration: 1800,
            }
        );
        assert_eq!(sent.depth, 2);
    }

    #[tokio::test]
    async fn planner_failure_is_shared() {
        let planner = Arc::new(MockPlanner::new().failing("crow_fly"));
        let ctx = context(
            request("o", "d"),
            coverage(planner, Arc::new(MockStreetNetwork::new())),
        );
        let paths = Arc::new(StreetNetworkPathPool::new(ctx.clone()));
        let pool = ProximitiesByCrowflyPool::new(
            &ctx,
            &address("o", 2.35, 48.85),
            &[FallbackMode::Walking],
            &paths,
        );
        assert!(matches!(
            pool.wait_and_get(FallbackMode::Walking).await,
            Err(ScenarioError::Pt(_))
        ));
    }
}
