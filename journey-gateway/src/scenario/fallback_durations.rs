//! Access and egress durations between a requested place and stop points.
//!
//! For each fallback mode, the candidates found by the crow-fly search are
//! routed through the street network's matrix. Car candidates are car
//! parks, whose duration is carried over to the stop points near them;
//! stop points with entrances (or exits) are routed through each of them.
//! Every path is merged into one duration per stop point, keeping the
//! minimum.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::{
    AccessPoint, BestFallbackDurations, Coord, DurationElement, FallbackDurations, FallbackMode,
    Place, RoutingStatus, keep_min, manhattan_duration,
};
use crate::providers::{
    MatrixCell, MatrixRequest, NearbyStopPoint, ProximityCandidate, StreetNetworkProvider,
};

use super::context::RequestContext;
use super::error::ScenarioError;
use super::free_access::{FreeAccessSets, PlacesFreeAccess};
use super::future_manager::TaskFuture;
use super::proximities::{ProximitiesByCrowflyPool, max_fallback_duration};
use super::street_network_path::StreetNetworkPathPool;

/// Fallback durations of one mode.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeFallback {
    /// Stop point uri → best duration.
    pub durations: FallbackDurations,
    /// Stop points within the free radius of the place.
    pub free_radius: HashSet<String>,
}

/// What a matrix cell routes to.
#[derive(Debug, Clone)]
enum Target {
    StopPoint(Place),
    /// An entrance or exit, with the stop points it serves.
    AccessPoint {
        access_point: AccessPoint,
        stop_points: Vec<String>,
    },
    CarPark {
        place: Place,
        nearby: Vec<NearbyStopPoint>,
    },
}

impl Target {
    fn place(&self) -> Place {
        match self {
            Target::StopPoint(place) | Target::CarPark { place, .. } => place.clone(),
            Target::AccessPoint { access_point, .. } => Place::from_access_point(access_point),
        }
    }

    fn coord(&self) -> Coord {
        match self {
            Target::StopPoint(place) | Target::CarPark { place, .. } => place.coord,
            Target::AccessPoint { access_point, .. } => access_point.coord,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DurationParams {
    max_duration: u32,
    speed: f64,
    walking_speed: f64,
    car_park_duration: u32,
}

/// Turn proximity candidates into matrix targets, skipping free stop points.
fn build_targets(
    candidates: &[ProximityCandidate],
    mode: FallbackMode,
    is_beginning: bool,
    use_access_points: bool,
    free: &HashSet<String>,
) -> Vec<Target> {
    if mode.uses_car_park() {
        return candidates
            .iter()
            .map(|c| Target::CarPark {
                place: c.place.clone(),
                nearby: c.nearby_stop_points.clone(),
            })
            .collect();
    }

    let mut targets: Vec<Target> = Vec::new();
    let mut by_access_point: HashMap<String, usize> = HashMap::new();
    for candidate in candidates {
        let stop_point = &candidate.place;
        if free.contains(&stop_point.uri) {
            continue;
        }
        let access_points = if use_access_points {
            stop_point.stop_point_access_points(is_beginning)
        } else {
            Vec::new()
        };
        if access_points.is_empty() {
            targets.push(Target::StopPoint(stop_point.clone()));
            continue;
        }
        for ap in access_points {
            match by_access_point.get(&ap.uri) {
                Some(&i) => {
                    if let Target::AccessPoint { stop_points, .. } = &mut targets[i] {
                        stop_points.push(stop_point.uri.clone());
                    }
                }
                None => {
                    by_access_point.insert(ap.uri.clone(), targets.len());
                    targets.push(Target::AccessPoint {
                        access_point: ap.clone(),
                        stop_points: vec![stop_point.uri.clone()],
                    });
                }
            }
        }
    }
    targets
}

/// Durations to stop points from one center.
///
/// `cells` is `None` when the matrix could not be computed: every target then
/// gets its manhattan estimate.
fn durations_from_cells(
    targets: &[Target],
    cells: Option<&[MatrixCell]>,
    center: &Place,
    params: &DurationParams,
) -> FallbackDurations {
    let mut durations = FallbackDurations::new();
    for (i, target) in targets.iter().enumerate() {
        let estimate = || manhattan_duration(center.coord.distance_to(&target.coord()), params.speed);
        let (duration, status) = match cells.map(|c| c[i]) {
            None => (estimate(), RoutingStatus::Unknown),
            Some(MatrixCell {
                status: RoutingStatus::Unreached,
                ..
            }) => continue,
            Some(MatrixCell {
                status: RoutingStatus::Reached,
                duration,
            }) => (duration, RoutingStatus::Reached),
            Some(MatrixCell {
                status: RoutingStatus::Unknown,
                ..
            }) => (estimate(), RoutingStatus::Unknown),
        };
        // The bound applies to the routed leg, not to the traversal or
        // car park time added below.
        if cells.is_some() && duration >= params.max_duration {
            continue;
        }

        match target {
            Target::StopPoint(stop_point) => {
                keep_min(&mut durations, &stop_point.uri, DurationElement::new(duration, status));
            }
            Target::AccessPoint {
                access_point,
                stop_points,
            } => {
                for uri in stop_points {
                    let mut element = DurationElement::new(
                        duration.saturating_add(access_point.traversal_time),
                        status,
                    );
                    element.access_point = Some(access_point.clone());
                    keep_min(&mut durations, uri, element);
                }
            }
            Target::CarPark { place, nearby } => {
                for sp in nearby {
                    let walk = manhattan_duration(sp.distance, params.walking_speed);
                    let mut element = DurationElement::new(
                        duration
                            .saturating_add(params.car_park_duration)
                            .saturating_add(walk),
                        status,
                    );
                    element.car_park = Some(place.clone());
                    element.car_park_crowfly_duration = Some(walk);
                    keep_min(&mut durations, &sp.stop_point.uri, element);
                }
            }
        }
    }
    durations
}

/// Merge per-center durations. On ties the earlier center wins.
fn merge_centers(per_center: Vec<(String, FallbackDurations)>) -> FallbackDurations {
    let several = per_center.len() > 1;
    let mut merged = FallbackDurations::new();
    for (center, durations) in per_center {
        for (uri, mut element) in durations {
            if several {
                element.via = Some(center.clone());
            }
            keep_min(&mut merged, &uri, element);
        }
    }
    merged
}

/// Fallback durations of every requested mode around one place.
pub struct FallbackDurationsPool {
    place: Place,
    requested_modes: Vec<FallbackMode>,
    free_access: TaskFuture<FreeAccessSets>,
    futures: HashMap<FallbackMode, TaskFuture<ModeFallback>>,
}

impl FallbackDurationsPool {
    /// `is_beginning` selects access (place to stop points) over egress.
    pub fn new(
        ctx: &Arc<RequestContext>,
        place: &Place,
        modes: &[FallbackMode],
        is_beginning: bool,
        proximities: &ProximitiesByCrowflyPool,
        free_access: &PlacesFreeAccess,
        paths: &Arc<StreetNetworkPathPool>,
    ) -> Self {
        let futures = modes
            .iter()
            .map(|&mode| {
                let candidates = proximities
                    .future(mode)
                    .unwrap_or_else(|| TaskFuture::ready(Vec::new()));
                let future = ctx.fm.create_future(compute(
                    Arc::clone(ctx),
                    place.clone(),
                    mode,
                    is_beginning,
                    candidates,
                    free_access.future(),
                    Arc::clone(paths),
                ));
                (mode, future)
            })
            .collect();
        Self {
            place: place.clone(),
            requested_modes: modes.to_vec(),
            free_access: free_access.future(),
            futures,
        }
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    pub fn modes(&self) -> &[FallbackMode] {
        &self.requested_modes
    }

    pub async fn free_access(&self) -> Result<Arc<FreeAccessSets>, ScenarioError> {
        self.free_access.wait_and_get().await
    }

    /// Durations of `mode` alone; empty for a mode that was not requested.
    pub async fn wait_and_get(
        &self,
        mode: FallbackMode,
    ) -> Result<Arc<ModeFallback>, ScenarioError> {
        match self.futures.get(&mode) {
            Some(future) => future.wait_and_get().await,
            None => Ok(Arc::new(ModeFallback::default())),
        }
    }

    /// Durations of `mode`, improved by the requested modes overriding it.
    pub async fn get_best_fallback_durations(
        &self,
        mode: FallbackMode,
    ) -> Result<BestFallbackDurations, ScenarioError> {
        let main = self.wait_and_get(mode).await?;
        let mut best = BestFallbackDurations {
            durations: main.durations.clone(),
            real_modes: HashMap::new(),
        };
        for other in mode.overriding_modes(&self.requested_modes) {
            let overriding = self.wait_and_get(other).await?;
            for (uri, element) in &overriding.durations {
                if keep_min(&mut best.durations, uri, element.clone()) {
                    best.real_modes.insert(uri.clone(), other);
                }
            }
        }
        Ok(best)
    }

    /// The mode actually used to reach `uri` when `mode` was requested.
    pub async fn get_real_mode(
        &self,
        mode: FallbackMode,
        uri: &str,
    ) -> Result<FallbackMode, ScenarioError> {
        let best = self.get_best_fallback_durations(mode).await?;
        Ok(best.real_modes.get(uri).copied().unwrap_or(mode))
    }

    /// Whether no stop point is reachable with any requested mode.
    pub async fn is_empty(&self) -> Result<bool, ScenarioError> {
        for mode in &self.requested_modes {
            if !self.wait_and_get(*mode).await?.durations.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

async fn compute(
    ctx: Arc<RequestContext>,
    place: Place,
    mode: FallbackMode,
    is_beginning: bool,
    candidates: TaskFuture<Vec<ProximityCandidate>>,
    free_access: TaskFuture<FreeAccessSets>,
    paths: Arc<StreetNetworkPathPool>,
) -> Result<ModeFallback, ScenarioError> {
    let candidates = candidates.wait_and_get().await?;
    let free = free_access.wait_and_get().await?;
    let request = &ctx.request;

    let radius = if is_beginning {
        request.free_radius_from
    } else {
        request.free_radius_to
    };
    let free_radius: HashSet<String> = if radius == 0 {
        HashSet::new()
    } else {
        candidates
            .iter()
            .filter(|c| c.place.is_stop_point() && c.distance <= f64::from(radius))
            .map(|c| c.place.uri.clone())
            .collect()
    };
    let all_free = free.all(&free_radius);

    let max_duration = max_fallback_duration(request, mode, &paths).await;
    let mut durations = if max_duration == 0 {
        FallbackDurations::new()
    } else {
        route(&ctx, &place, mode, is_beginning, &candidates, &all_free, max_duration).await
    };

    if place.is_stop_point() {
        durations.insert(place.uri.clone(), DurationElement::free());
    }
    for uri in &all_free {
        durations.insert(uri.clone(), DurationElement::free());
    }
    debug!(place = %place.uri, mode = %mode, stop_points = durations.len(), "fallback durations computed");
    Ok(ModeFallback {
        durations,
        free_radius,
    })
}

async fn route(
    ctx: &RequestContext,
    place: &Place,
    mode: FallbackMode,
    is_beginning: bool,
    candidates: &[ProximityCandidate],
    free: &HashSet<String>,
    max_duration: u32,
) -> FallbackDurations {
    let provider = ctx.coverage.street_network(mode);
    let candidates = match &provider {
        Some(provider) => provider.filter_places_isochrone(candidates.to_vec()),
        None => {
            warn!(mode = %mode, "no street network for mode, estimating durations");
            candidates.to_vec()
        }
    };
    let targets = build_targets(
        &candidates,
        mode,
        is_beginning,
        ctx.request.access_points,
        free,
    );
    if targets.is_empty() {
        return FallbackDurations::new();
    }

    let places: Vec<Place> = targets.iter().map(Target::place).collect();
    let params = DurationParams {
        max_duration,
        speed: ctx.request.speed(mode),
        walking_speed: ctx.request.speed(FallbackMode::Walking),
        car_park_duration: ctx.request.car_park_duration(),
    };
    let centers = place.duration_centers(ctx.request.poi_access_points);
    let router = provider.as_deref();
    let places = &places;
    let lines = join_all(centers.iter().map(|center| async move {
        match router {
            Some(router) => {
                matrix_line(ctx, router, center, places, mode, is_beginning, max_duration).await
            }
            None => None,
        }
    }))
    .await;

    let per_center = centers
        .iter()
        .zip(lines)
        .map(|(center, cells)| {
            (
                center.uri.clone(),
                durations_from_cells(&targets, cells.as_deref(), center, &params),
            )
        })
        .collect();
    merge_centers(per_center)
}

async fn matrix_line(
    ctx: &RequestContext,
    provider: &dyn StreetNetworkProvider,
    center: &Place,
    places: &[Place],
    mode: FallbackMode,
    is_beginning: bool,
    max_duration: u32,
) -> Option<Vec<MatrixCell>> {
    let (origins, destinations) = if is_beginning {
        (vec![center.clone()], places.to_vec())
    } else {
        (places.to_vec(), vec![center.clone()])
    };
    let request = MatrixRequest {
        origins,
        destinations,
        mode,
        max_duration,
        speeds: ctx.request.speeds(),
        request_id: ctx.request_id().to_string(),
    };

    let _slot = ctx.fm.acquire(mode.scheduling_weight()).await;
    match provider.routing_matrix(request).await {
        Ok(matrix) => {
            let line = matrix.line(places.len(), is_beginning);
            if line.is_none() {
                warn!(mode = %mode, center = %center.uri, "malformed routing matrix, using manhattan estimates");
            }
            line
        }
        Err(e) => {
            warn!(mode = %mode, center = %center.uri, error = %e, "routing matrix failed, using manhattan estimates");
            None
        }
    }
}
