//! Public transport journeys, one planner call per mode pair.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::{BestFallbackDurations, ErrorId, FallbackMode, PlannerResponse, generate_id};
use crate::providers::{JourneyParameters, PtJourneysRequest};
use crate::request::{ModeCall, RequestType};

use super::context::RequestContext;
use super::error::ScenarioError;
use super::fallback_durations::FallbackDurationsPool;
use super::future_manager::TaskFuture;
use super::street_network_path::StreetNetworkPathPool;

/// The planner's answer for one mode pair, `None` when it was not asked.
pub type PtJourneyResult = Option<PlannerResponse>;

/// Planner calls for every requested (departure, arrival) mode pair.
///
/// Calls are started cheapest pair first and compete for pool slots with
/// their pair's weight as priority.
pub struct PtJourneyPool {
    futures: Vec<(ModeCall, TaskFuture<PtJourneyResult>)>,
}

impl PtJourneyPool {
    /// Either side may be left out for isochrones.
    pub fn new(
        ctx: &Arc<RequestContext>,
        calls: &[ModeCall],
        request_type: RequestType,
        origins: Option<&Arc<FallbackDurationsPool>>,
        destinations: Option<&Arc<FallbackDurationsPool>>,
        paths: &Arc<StreetNetworkPathPool>,
    ) -> Self {
        let datetime = ctx.request.datetime;
        Self::at(ctx, calls, request_type, origins, destinations, paths, datetime)
    }

    /// Like [`new`](Self::new), searching from `datetime` instead of the
    /// requested one.
    pub fn at(
        ctx: &Arc<RequestContext>,
        calls: &[ModeCall],
        request_type: RequestType,
        origins: Option<&Arc<FallbackDurationsPool>>,
        destinations: Option<&Arc<FallbackDurationsPool>>,
        paths: &Arc<StreetNetworkPathPool>,
        datetime: DateTime<Utc>,
    ) -> Self {
        let mut calls: Vec<ModeCall> = calls
            .iter()
            .filter(|c| !c.direct_path_only)
            .copied()
            .collect();
        calls.sort_by_key(ModeCall::priority);

        let futures = calls
            .into_iter()
            .map(|call| {
                let future = ctx.fm.create_future(compute(
                    Arc::clone(ctx),
                    call,
                    request_type,
                    datetime,
                    origins.cloned(),
                    destinations.cloned(),
                    Arc::clone(paths),
                ));
                (call, future)
            })
            .collect();
        Self { futures }
    }

    pub fn len(&self) -> usize {
        self.futures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Every pair's result, in scheduling order.
    pub async fn wait_all(&self) -> Result<Vec<(ModeCall, Arc<PtJourneyResult>)>, ScenarioError> {
        let mut results = Vec::with_capacity(self.futures.len());
        for (call, future) in &self.futures {
            results.push((*call, future.wait_and_get().await?));
        }
        Ok(results)
    }
}

async fn side_durations(
    pool: Option<&FallbackDurationsPool>,
    mode: FallbackMode,
) -> Result<HashMap<String, u32>, ScenarioError> {
    let Some(pool) = pool else {
        return Ok(HashMap::new());
    };
    let BestFallbackDurations { durations, .. } = pool.get_best_fallback_durations(mode).await?;
    Ok(durations
        .into_iter()
        .map(|(uri, element)| (uri, element.duration))
        .collect())
}

fn empty_side_error(origin_empty: bool, destination_empty: bool) -> PlannerResponse {
    match (origin_empty, destination_empty) {
        (true, true) => PlannerResponse::with_error(
            ErrorId::NoOriginNorDestination,
            "no origin point nor destination point",
        ),
        (true, false) => PlannerResponse::with_error(ErrorId::NoOrigin, "no origin point"),
        _ => PlannerResponse::with_error(ErrorId::NoDestination, "no destination point"),
    }
}

async fn compute(
    ctx: Arc<RequestContext>,
    call: ModeCall,
    request_type: RequestType,
    datetime: DateTime<Utc>,
    origins: Option<Arc<FallbackDurationsPool>>,
    destinations: Option<Arc<FallbackDurationsPool>>,
    paths: Arc<StreetNetworkPathPool>,
) -> Result<PtJourneyResult, ScenarioError> {
    let request = &ctx.request;
    if request.max_duration == 0 {
        return Ok(None);
    }

    let orig = side_durations(origins.as_deref(), call.dep_mode).await?;
    let dest = side_durations(destinations.as_deref(), call.arr_mode).await?;
    let origin_missing = origins.is_some() && orig.is_empty();
    let destination_missing = destinations.is_some() && dest.is_empty();
    if origin_missing || destination_missing {
        debug!(dep_mode = %call.dep_mode, arr_mode = %call.arr_mode, "no stop point reachable, planner not called");
        return Ok(Some(empty_side_error(origin_missing, destination_missing)));
    }

    let pt_request = PtJourneysRequest {
        origins: orig,
        destinations: dest,
        datetime,
        clockwise: request.clockwise,
        params: JourneyParameters {
            max_duration: request.max_duration,
            min_duration: request.min_duration,
            max_transfers: request.max_transfers,
            wheelchair: request.wheelchair,
            realtime_level: request.realtime_level,
            max_extra_second_pass: request.max_extra_second_pass,
            walking_transfer_penalty: request.walking_transfer_penalty,
            forbidden_uris: request.forbidden_uris.clone(),
            allowed_ids: request.allowed_ids.clone(),
            direct_path_duration: paths.direct_path_duration(call.dep_mode).await,
        },
        bike_in_pt: call.dep_mode == FallbackMode::Bike && call.arr_mode == FallbackMode::Bike,
        request_id: format!("{}_{}_{}", ctx.request_id(), call.dep_mode, call.arr_mode),
    };

    let planner = ctx.planner();
    let result = {
        let _slot = ctx.fm.acquire(call.priority()).await;
        match request_type {
            RequestType::GraphicalIsochrone => planner.graphical_isochrones(pt_request).await,
            RequestType::Journeys | RequestType::Isochrone => planner.journeys(pt_request).await,
        }
    };

    let mut response = match result {
        Ok(response) => response,
        Err(e) => {
            warn!(dep_mode = %call.dep_mode, arr_mode = %call.arr_mode, error = %e, "planner call failed");
            return Ok(Some(ScenarioError::planner(&e).to_response()));
        }
    };
    for journey in &mut response.journeys {
        journey.internal_id = Some(generate_id());
    }
    debug!(
        dep_mode = %call.dep_mode,
        arr_mode = %call.arr_mode,
        journeys = response.journeys.len(),
        error = ?response.error_id(),
        "public transport journeys computed"
    );
    Ok(Some(response))
}
