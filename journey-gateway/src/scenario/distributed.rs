//! The distributed journey computation.
//!
//! A request is answered in two phases. [`Orchestrator::compute_journeys`]
//! starts every external call at once, collects public transport journeys
//! for each mode pair and connects them to the requested places with
//! crow-fly sections. Once the caller has filtered those journeys,
//! [`JourneySession::finalise_journeys`] replaces the crow-flies of the
//! survivors with street-network paths and adds transfer paths and fares
//! when asked to.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::domain::{ErrorId, FallbackMode, Journey, Place, PlannerResponse, TO_DELETE_TAG};
use crate::providers::Coverage;
use crate::request::{DirectPathPolicy, JourneyRequest, ModeCall, RequestDefaults, RequestType};

use super::context::RequestContext;
use super::error::ScenarioError;
use super::fallback::{FallbackSide, add_crow_flies, tag_low_emission_zone};
use super::fallback_durations::FallbackDurationsPool;
use super::fare::PtJourneyFarePool;
use super::free_access::PlacesFreeAccess;
use super::future_manager::FutureManager;
use super::proximities::ProximitiesByCrowflyPool;
use super::pt_journey::PtJourneyPool;
use super::street_network_path::StreetNetworkPathPool;
use super::transfer::TransferPool;

/// Answers journey and isochrone requests on one coverage.
///
/// Shared by every request; each request gets its own context and task pool.
pub struct Orchestrator {
    coverage: Coverage,
    pool_size: usize,
    direct_path_timeout: Option<Duration>,
    request_defaults: RequestDefaults,
}

/// Outcome of the first phase.
pub enum FirstPass {
    /// Only direct paths were wanted; there is nothing to finalise.
    DirectPathsOnly(Vec<PlannerResponse>),
    Journeys {
        session: JourneySession,
        responses: Vec<PlannerResponse>,
    },
}

/// The fallback data of one request, kept between the two phases.
pub struct JourneySession {
    ctx: Arc<RequestContext>,
    paths: Arc<StreetNetworkPathPool>,
    origin: Arc<FallbackDurationsPool>,
    destination: Arc<FallbackDurationsPool>,
    calls: Vec<ModeCall>,
    /// Internal journey id → (departure mode, arrival mode).
    journey_modes: HashMap<String, (FallbackMode, FallbackMode)>,
}

impl Drop for JourneySession {
    fn drop(&mut self) {
        if !self.ctx.fm.has_pending() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let fm = self.ctx.fm.clone();
                handle.spawn(async move { fm.drain().await });
            }
            Err(_) => {
                warn!(request_id = %self.ctx.request_id(), "session dropped outside a runtime, tasks left undrained");
            }
        }
    }
}

/// Public transport responses of one pass, split by outcome.
#[derive(Default)]
struct PtPass {
    found: Vec<PlannerResponse>,
    errors: Vec<PlannerResponse>,
}

impl Orchestrator {
    pub fn new(coverage: Coverage, config: &GatewayConfig) -> Self {
        Self {
            coverage,
            pool_size: config.future_pool_size,
            direct_path_timeout: config.direct_path_timeout(),
            request_defaults: config.request_defaults.clone(),
        }
    }

    pub fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    fn context(&self, mut request: JourneyRequest) -> Arc<RequestContext> {
        request.apply_defaults(&self.request_defaults);
        let fm = FutureManager::new(self.pool_size);
        Arc::new(
            RequestContext::new(request, self.coverage.clone(), fm)
                .with_direct_path_timeout(self.direct_path_timeout),
        )
    }

    /// First phase: journeys with crow-fly fallbacks, plus direct paths.
    ///
    /// On error every task of the request is drained before returning.
    /// Otherwise the returned [`JourneySession`] owns them: call
    /// [`JourneySession::close`] once done with it. A session dropped without
    /// being closed drains in the background.
    pub async fn compute_journeys(
        &self,
        request: JourneyRequest,
    ) -> Result<FirstPass, ScenarioError> {
        let ctx = self.context(request);
        info!(request_id = %ctx.request_id(), coverage = %self.coverage.name(), "computing journeys");
        let result = first_pass(&ctx).await;
        match &result {
            Ok(FirstPass::Journeys { responses, .. }) => {
                debug!(responses = responses.len(), "first pass done");
            }
            Ok(FirstPass::DirectPathsOnly(_)) => ctx.fm.drain().await,
            Err(e) => {
                warn!(request_id = %ctx.request_id(), error = %e, "journey computation failed");
                ctx.fm.drain().await;
            }
        }
        result
    }

    /// Reachable stop points from the origin, or to the destination when
    /// no origin is given.
    pub async fn isochrone(
        &self,
        request: JourneyRequest,
    ) -> Result<Vec<PlannerResponse>, ScenarioError> {
        let ctx = self.context(request);
        let result = isochrone_responses(&ctx, RequestType::Isochrone).await;
        ctx.fm.drain().await;
        let responses = result?;

        if let Some(response) = responses
            .iter()
            .find(|r| r.error_id() == Some(ErrorId::DateOutOfBounds))
        {
            return Err(ScenarioError::Pt(response.clone()));
        }
        let (found, errors): (Vec<_>, Vec<_>) =
            responses.into_iter().partition(PlannerResponse::has_journeys);
        if !found.is_empty() {
            return Ok(found);
        }
        let errors: Vec<_> = errors.into_iter().filter(|r| r.error.is_some()).collect();
        if errors.is_empty() {
            return Ok(vec![no_solution()]);
        }
        Ok(errors)
    }

    /// Reachability polygons from the origin, or to the destination.
    pub async fn graphical_isochrone(
        &self,
        request: JourneyRequest,
    ) -> Result<PlannerResponse, ScenarioError> {
        let ctx = self.context(request);
        let result = isochrone_responses(&ctx, RequestType::GraphicalIsochrone).await;
        ctx.fm.drain().await;

        let mut merged = PlannerResponse::default();
        for response in result? {
            if let Some(error) = &response.error
                && error.id == ErrorId::DateOutOfBounds
            {
                return Err(ScenarioError::InvalidDateBound(error.message.clone()));
            }
            merged.graphical_isochrones.extend(response.graphical_isochrones);
            for fp in response.feed_publishers {
                merged.add_feed_publisher(fp);
            }
        }
        if merged.graphical_isochrones.is_empty() {
            return Err(ScenarioError::NoGraphicalIsochroneFound);
        }
        Ok(merged)
    }
}

impl JourneySession {
    pub fn request(&self) -> &JourneyRequest {
        &self.ctx.request
    }

    pub fn journey_modes(&self) -> &HashMap<String, (FallbackMode, FallbackMode)> {
        &self.journey_modes
    }

    /// Another public transport pass from `datetime`, reusing the fallback
    /// durations and direct paths of the first pass.
    ///
    /// Direct paths are not returned again.
    pub async fn compute_more_journeys(
        &mut self,
        datetime: DateTime<Utc>,
    ) -> Result<Vec<PlannerResponse>, ScenarioError> {
        let PtPass { mut found, .. } = self.pt_journeys(datetime).await?;
        let publishers = self.feed_publishers();
        for response in &mut found {
            for fp in &publishers {
                response.add_feed_publisher(fp.clone());
            }
        }
        Ok(found)
    }

    /// Second phase, on the journeys that survived the caller's filtering.
    ///
    /// Failures of one journey's fallback or transfer leave that journey with
    /// its crow-flies. Any other failure is reported as
    /// [`ScenarioError::Finalise`], with `responses` possibly half-completed.
    pub async fn finalise_journeys(
        &self,
        responses: &mut [PlannerResponse],
    ) -> Result<(), ScenarioError> {
        self.finalise(responses).await.map_err(|e| match e {
            ScenarioError::Finalise(_) => e,
            other => ScenarioError::Finalise(other.to_string()),
        })
    }

    /// Wait for every task of the request.
    pub async fn close(self) {
        self.ctx.fm.drain().await;
    }

    fn is_survivor(&self, journey: &Journey) -> bool {
        !journey.is_tagged(TO_DELETE_TAG)
            && journey
                .internal_id
                .as_ref()
                .is_some_and(|id| self.journey_modes.contains_key(id))
    }

    async fn finalise(&self, responses: &mut [PlannerResponse]) -> Result<(), ScenarioError> {
        let survivors: Vec<(usize, usize, FallbackMode, FallbackMode)> = responses
            .iter()
            .enumerate()
            .flat_map(|(r, response)| {
                response
                    .journeys
                    .iter()
                    .enumerate()
                    .filter(|(_, journey)| !journey.is_tagged(TO_DELETE_TAG))
                    .filter_map(move |(j, journey)| {
                        let &(dep, arr) = self.journey_modes.get(journey.internal_id.as_ref()?)?;
                        Some((r, j, dep, arr))
                    })
            })
            .collect();
        if survivors.is_empty() {
            return Ok(());
        }
        debug!(journeys = survivors.len(), "finalising journeys");

        let transfers = self
            .ctx
            .request
            .transfer_path
            .then(|| TransferPool::new(Arc::clone(&self.ctx), Arc::clone(&self.paths)));
        if let Some(transfers) = &transfers {
            for &(r, j, _, _) in &survivors {
                transfers.launch(&responses[r].journeys[j]);
            }
        }
        let fares = PtJourneyFarePool::new(&self.ctx, responses, |j| self.is_survivor(j));

        // Every path is requested before any is waited for.
        let car_park_duration = self.ctx.request.car_park_duration();
        let mut pending = Vec::new();
        for &(r, j, dep, arr) in &survivors {
            let journey = &responses[r].journeys[j];
            let origin = FallbackSide::load(&self.origin, dep, true).await?;
            let destination = FallbackSide::load(&self.destination, arr, false).await?;
            for side in [&origin, &destination] {
                if let Some(fallback) = side.launch(journey, &self.paths, car_park_duration) {
                    pending.push((r, j, fallback));
                }
            }
        }
        for (r, j, fallback) in pending {
            let journey = &mut responses[r].journeys[j];
            if let Err(e) = fallback.complete(journey).await {
                warn!(journey = ?journey.internal_id, error = %e, "fallback failed, keeping crow-fly");
            }
        }

        for &(r, j, dep, arr) in &survivors {
            let journey = &mut responses[r].journeys[j];
            tag_low_emission_zone(journey, dep, arr);
            if let Some(transfers) = &transfers
                && let Err(e) = transfers.complete(journey).await
            {
                warn!(journey = ?journey.internal_id, error = %e, "transfer paths failed");
            }
        }
        fares.complete(responses).await;
        Ok(())
    }

    async fn pt_journeys(&mut self, datetime: DateTime<Utc>) -> Result<PtPass, ScenarioError> {
        let pool = PtJourneyPool::at(
            &self.ctx,
            &self.calls,
            RequestType::Journeys,
            Some(&self.origin),
            Some(&self.destination),
            &self.paths,
            datetime,
        );
        let mut pass = PtPass::default();
        for (call, result) in pool.wait_all().await? {
            let Some(response) = Option::as_ref(&result) else {
                continue;
            };
            let mut response = response.clone();
            if response.error_id() == Some(ErrorId::DateOutOfBounds) {
                return Err(ScenarioError::Pt(response));
            }
            if response.error_id() == Some(ErrorId::NoSolution)
                && self.paths.has_valid_direct_paths().await
            {
                debug!(dep_mode = %call.dep_mode, arr_mode = %call.arr_mode, "no solution, a direct path stands in");
                response.error = None;
            }
            if !response.has_journeys() {
                if response.error.is_some() {
                    pass.errors.push(response);
                }
                continue;
            }

            let origin = FallbackSide::load(&self.origin, call.dep_mode, true).await?;
            let destination = FallbackSide::load(&self.destination, call.arr_mode, false).await?;
            for journey in &mut response.journeys {
                add_crow_flies(journey, &origin, &destination);
                if let Some(id) = &journey.internal_id {
                    self.journey_modes
                        .insert(id.clone(), (call.dep_mode, call.arr_mode));
                }
            }
            pass.found.push(response);
        }
        Ok(pass)
    }

    /// Why nothing was found: an unreachable side, else the planner's errors.
    async fn explain_empty(
        &self,
        errors: Vec<PlannerResponse>,
    ) -> Result<Vec<PlannerResponse>, ScenarioError> {
        let no_origin = self.origin.is_empty().await?;
        let no_destination = self.destination.is_empty().await?;
        match (no_origin, no_destination) {
            (true, true) => Err(ScenarioError::entry_point(
                ErrorId::NoOriginNorDestination,
                "no origin point nor destination point",
            )),
            (true, false) => Err(ScenarioError::entry_point(ErrorId::NoOrigin, "no origin point")),
            (false, true) => Err(ScenarioError::entry_point(
                ErrorId::NoDestination,
                "no destination point",
            )),
            (false, false) if errors.is_empty() => Ok(vec![no_solution()]),
            (false, false) => Ok(errors),
        }
    }

    fn feed_publishers(&self) -> Vec<crate::domain::FeedPublisher> {
        let mut modes = self.origin.modes().to_vec();
        modes.extend_from_slice(self.destination.modes());
        self.ctx.coverage.feed_publishers(&modes)
    }
}

async fn first_pass(ctx: &Arc<RequestContext>) -> Result<FirstPass, ScenarioError> {
    let request = &ctx.request;
    let (origin, destination) = futures::try_join!(
        resolve(ctx, request.origin.as_deref(), ErrorId::NoOrigin, "no origin point"),
        resolve(
            ctx,
            request.destination.as_deref(),
            ErrorId::NoDestination,
            "no destination point"
        ),
    )?;

    let calls = request.mode_calls();
    let paths = Arc::new(StreetNetworkPathPool::new(Arc::clone(ctx)));
    if request.direct_path != DirectPathPolicy::None {
        for mode in distinct(calls.iter().map(|c| c.dep_mode)) {
            paths.add_direct_path(&origin, &destination, mode, request.period_extremity());
        }
    }

    if request.wants_direct_path_only() {
        debug!("direct paths only");
        return Ok(FirstPass::DirectPathsOnly(direct_path_responses(ctx, &paths).await));
    }

    debug!(
        origin = %origin.uri,
        destination = %destination.uri,
        distance = origin.coord.distance_to(&destination.coord),
        "crow-fly distance"
    );
    let pt_calls: Vec<ModeCall> = calls.into_iter().filter(|c| !c.direct_path_only).collect();
    let origin_modes = distinct(pt_calls.iter().map(|c| c.dep_mode));
    let destination_modes = distinct(pt_calls.iter().map(|c| c.arr_mode));
    let origin_pool = fallback_pool(ctx, &origin, &origin_modes, true, &paths);
    let destination_pool = fallback_pool(ctx, &destination, &destination_modes, false, &paths);

    let mut session = JourneySession {
        ctx: Arc::clone(ctx),
        paths,
        origin: origin_pool,
        destination: destination_pool,
        calls: pt_calls,
        journey_modes: HashMap::new(),
    };
    let PtPass { found, errors } = session.pt_journeys(request.datetime).await?;

    let mut responses = direct_path_responses(ctx, &session.paths).await;
    responses.extend(found);
    if responses.is_empty() {
        responses = session.explain_empty(errors).await?;
    }

    let publishers = session.feed_publishers();
    for response in &mut responses {
        for fp in &publishers {
            response.add_feed_publisher(fp.clone());
        }
    }
    Ok(FirstPass::Journeys { session, responses })
}

/// One side's public transport responses for an isochrone.
async fn isochrone_responses(
    ctx: &Arc<RequestContext>,
    request_type: RequestType,
) -> Result<Vec<PlannerResponse>, ScenarioError> {
    let request = &ctx.request;
    let (uri, is_beginning) = match (&request.origin, &request.destination) {
        (Some(uri), _) => (uri.as_str(), true),
        (None, Some(uri)) => (uri.as_str(), false),
        (None, None) => {
            return Err(ScenarioError::entry_point(
                ErrorId::NoOriginNorDestination,
                "an origin or a destination is required",
            ));
        }
    };
    let place = resolve(ctx, Some(uri), ErrorId::UnknownObject, "").await?;

    let modes = distinct(
        request
            .mode_calls()
            .iter()
            .filter(|c| !c.direct_path_only)
            .map(|c| if is_beginning { c.dep_mode } else { c.arr_mode }),
    );
    let calls: Vec<ModeCall> = modes.iter().map(|&m| ModeCall::new(m, m)).collect();
    let paths = Arc::new(StreetNetworkPathPool::new(Arc::clone(ctx)));
    let pool = fallback_pool(ctx, &place, &modes, is_beginning, &paths);
    let (origins, destinations) = if is_beginning {
        (Some(&pool), None)
    } else {
        (None, Some(&pool))
    };
    let pt = PtJourneyPool::new(ctx, &calls, request_type, origins, destinations, &paths);

    let mut responses = Vec::with_capacity(pt.len());
    for (_, result) in pt.wait_all().await? {
        if let Some(response) = Option::as_ref(&result) {
            responses.push(response.clone());
        }
    }
    if pool.is_empty().await? {
        return Err(if is_beginning {
            ScenarioError::entry_point(ErrorId::NoOrigin, "no origin point")
        } else {
            ScenarioError::entry_point(ErrorId::NoDestination, "no destination point")
        });
    }

    let publishers = ctx.coverage.feed_publishers(&modes);
    for response in &mut responses {
        for fp in &publishers {
            response.add_feed_publisher(fp.clone());
        }
    }
    Ok(responses)
}

async fn resolve(
    ctx: &RequestContext,
    uri: Option<&str>,
    missing: ErrorId,
    missing_message: &str,
) -> Result<Place, ScenarioError> {
    let Some(uri) = uri else {
        return Err(ScenarioError::entry_point(missing, missing_message));
    };
    match ctx.planner().place_by_uri(uri, ctx.request_id()).await {
        Ok(Some(place)) => Ok(place),
        Ok(None) => Err(ScenarioError::entry_point(
            ErrorId::UnknownObject,
            format!("The entry point: {uri} is not valid"),
        )),
        Err(e) => Err(ScenarioError::planner(&e)),
    }
}

fn fallback_pool(
    ctx: &Arc<RequestContext>,
    place: &Place,
    modes: &[FallbackMode],
    is_beginning: bool,
    paths: &Arc<StreetNetworkPathPool>,
) -> Arc<FallbackDurationsPool> {
    let proximities = ProximitiesByCrowflyPool::new(ctx, place, modes, paths);
    let free_access = PlacesFreeAccess::new(ctx, place);
    Arc::new(FallbackDurationsPool::new(
        ctx,
        place,
        modes,
        is_beginning,
        &proximities,
        &free_access,
        paths,
    ))
}

/// Direct paths that found a journey, with their street network's publisher.
async fn direct_path_responses(
    ctx: &RequestContext,
    paths: &StreetNetworkPathPool,
) -> Vec<PlannerResponse> {
    let mut responses = Vec::new();
    for (mode, response) in paths.get_all_direct_paths().await {
        if !response.has_journeys() {
            continue;
        }
        let mut response = (*response).clone();
        for fp in ctx.coverage.feed_publishers(&[mode]) {
            response.add_feed_publisher(fp);
        }
        responses.push(response);
    }
    responses
}

fn no_solution() -> PlannerResponse {
    PlannerResponse::with_error(ErrorId::NoSolution, "no solution found for this journey")
}

/// Modes in first-seen order, without repetition.
fn distinct(modes: impl IntoIterator<Item = FallbackMode>) -> Vec<FallbackMode> {
    let mut result = Vec::new();
    for mode in modes {
        if !result.contains(&mode) {
            result.push(mode);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GraphicalIsochrone, SectionType};
    use crate::providers::ProximityCandidate;
    use crate::scenario::test_support::{
        MockFare, MockPlanner, MockStreetNetwork, address, at, coverage, pt_journey, request,
        stop_point,
    };

    fn origin() -> Place {
        address("o", 2.35, 48.85)
    }

    fn destination() -> Place {
        address("d", 2.45, 48.85)
    }

    fn stop_a() -> Place {
        stop_point("sp:A", 2.351, 48.85)
    }

    fn stop_b() -> Place {
        stop_point("sp:B", 2.449, 48.85)
    }

    fn planner() -> MockPlanner {
        MockPlanner::new()
            .with_place(origin())
            .with_place(destination())
            .with_crow_fly("o", vec![ProximityCandidate::new(stop_a(), 70.0)])
            .with_crow_fly("d", vec![ProximityCandidate::new(stop_b(), 70.0)])
    }

    fn bus_journeys(count: usize) -> PlannerResponse {
        PlannerResponse::with_journeys(
            (0..count)
                .map(|_| pt_journey(&stop_a(), &stop_b(), 600, 1800))
                .collect(),
        )
    }

    fn street_network() -> MockStreetNetwork {
        MockStreetNetwork::new()
            .with_duration("sp:A", 120)
            .with_duration("sp:B", 90)
            .with_feed_publisher("osm")
    }

    fn walking_request() -> JourneyRequest {
        let mut req = request("o", "d");
        req.origin_mode = vec![FallbackMode::Walking];
        req.destination_mode = vec![FallbackMode::Walking];
        req
    }

    fn setup(
        planner: MockPlanner,
        sn: MockStreetNetwork,
    ) -> (Orchestrator, Arc<MockPlanner>, Arc<MockStreetNetwork>) {
        let planner = Arc::new(planner);
        let sn = Arc::new(sn);
        let coverage = coverage(planner.clone(), sn.clone());
        (
            Orchestrator::new(coverage, &GatewayConfig::default()),
            planner,
            sn,
        )
    }

    async fn journeys(
        orchestrator: &Orchestrator,
        req: JourneyRequest,
    ) -> (JourneySession, Vec<PlannerResponse>) {
        match orchestrator.compute_journeys(req).await {
            Ok(FirstPass::Journeys { session, responses }) => (session, responses),
            Ok(FirstPass::DirectPathsOnly(_)) => panic!("expected public transport journeys"),
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    async fn failure(orchestrator: &Orchestrator, req: JourneyRequest) -> ScenarioError {
        match orchestrator.compute_journeys(req).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        }
    }

    #[tokio::test]
    async fn direct_path_only_skips_public_transport() {
        let (orchestrator, planner, _) = setup(planner(), street_network());
        let mut req = walking_request();
        req.origin_mode = vec![FallbackMode::Walking, FallbackMode::Bike];
        req.direct_path = DirectPathPolicy::Only;
        req.max_duration = 0;

        let Ok(FirstPass::DirectPathsOnly(responses)) = orchestrator.compute_journeys(req).await
        else {
            panic!("expected direct paths only");
        };
        assert_eq!(responses.len(), 2);
        let modes: Vec<_> = responses
            .iter()
            .map(|r| r.journeys[0].sections[0].mode)
            .collect();
        assert!(modes.contains(&Some(FallbackMode::Walking)));
        assert!(modes.contains(&Some(FallbackMode::Bike)));
        assert_eq!(responses[0].feed_publishers[0].id, "osm");
        assert_eq!(planner.calls("journeys"), 0);
        assert_eq!(planner.calls("crow_fly"), 0);
    }

    #[tokio::test]
    async fn public_transport_journeys_get_crow_fly_fallbacks() {
        let (orchestrator, planner, _) =
            setup(planner().with_journeys(bus_journeys(1)), street_network());
        let (session, responses) = journeys(&orchestrator, walking_request()).await;

        // The walking direct path comes first.
        assert_eq!(responses.len(), 2);
        assert_eq!(
            responses[0].journeys[0].sections[0].section_type,
            SectionType::StreetNetwork
        );

        let journey = &responses[1].journeys[0];
        assert_eq!(journey.sections.len(), 3);
        assert!(journey.sections[0].is_crow_fly());
        assert!(journey.sections[2].is_crow_fly());
        assert_eq!(journey.departure_date_time, at(480));
        assert_eq!(journey.arrival_date_time, at(1890));
        assert_eq!(
            session.journey_modes()[journey.internal_id.as_ref().unwrap()],
            (FallbackMode::Walking, FallbackMode::Walking)
        );
        assert_eq!(responses[1].feed_publishers[0].id, "osm");
        assert_eq!(planner.calls("journeys"), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn no_solution_is_dropped_when_a_direct_path_exists() {
        let no_solution = PlannerResponse::with_error(ErrorId::NoSolution, "no solution");
        let (orchestrator, _, _) =
            setup(planner().with_journeys(no_solution), street_network());
        let (session, responses) = journeys(&orchestrator, walking_request()).await;

        assert_eq!(responses.len(), 1);
        assert!(responses[0].error.is_none());
        assert!(responses[0].has_journeys());
        session.close().await;
    }

    #[tokio::test]
    async fn no_solution_is_returned_without_direct_path() {
        let no_solution = PlannerResponse::with_error(ErrorId::NoSolution, "no solution");
        let (orchestrator, _, _) =
            setup(planner().with_journeys(no_solution), street_network());
        let mut req = walking_request();
        req.direct_path = DirectPathPolicy::None;
        let (session, responses) = journeys(&orchestrator, req).await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].error_id(), Some(ErrorId::NoSolution));
        session.close().await;
    }

    #[tokio::test]
    async fn date_out_of_bounds_aborts_the_request() {
        let out = PlannerResponse::with_error(
            ErrorId::DateOutOfBounds,
            "date is not in data production period",
        );
        let (orchestrator, _, _) = setup(planner().with_journeys(out), street_network());
        let err = failure(&orchestrator, walking_request()).await;
        let ScenarioError::Pt(response) = &err else {
            panic!("expected a planner error, got {err}");
        };
        assert_eq!(response.error_id(), Some(ErrorId::DateOutOfBounds));
    }

    #[tokio::test]
    async fn unreachable_destination_is_classified() {
        let planner = MockPlanner::new()
            .with_place(origin())
            .with_place(destination())
            .with_crow_fly("o", vec![ProximityCandidate::new(stop_a(), 70.0)])
            .with_journeys(bus_journeys(1));
        let (orchestrator, planner, _) = setup(planner, street_network());
        let mut req = walking_request();
        req.direct_path = DirectPathPolicy::None;

        let err = failure(&orchestrator, req).await;
        assert_eq!(err.to_response().error_id(), Some(ErrorId::NoDestination));
        assert_eq!(planner.calls("journeys"), 0);
    }

    #[tokio::test]
    async fn unreachable_origin_and_destination_are_classified() {
        let planner = MockPlanner::new()
            .with_place(origin())
            .with_place(destination());
        let (orchestrator, _, _) = setup(planner, street_network());
        let mut req = walking_request();
        req.direct_path = DirectPathPolicy::None;

        let err = failure(&orchestrator, req).await;
        assert_eq!(
            err.to_response().error_id(),
            Some(ErrorId::NoOriginNorDestination)
        );
    }

    #[tokio::test]
    async fn unknown_entry_point() {
        let planner = MockPlanner::new().with_place(origin());
        let (orchestrator, _, _) = setup(planner, street_network());
        let err = failure(&orchestrator, walking_request()).await;
        let ScenarioError::EntryPoint { id, message } = &err else {
            panic!("expected an entry point error, got {err}");
        };
        assert_eq!(*id, ErrorId::UnknownObject);
        assert_eq!(message, "The entry point: d is not valid");
    }

    #[tokio::test]
    async fn finalise_replaces_crow_flies_of_survivors() {
        let planner = Arc::new(planner().with_journeys(bus_journeys(2)));
        let sn = Arc::new(street_network().with_path_duration(100));
        let fare = Arc::new(MockFare::default());
        let coverage = coverage(planner, sn).with_fare_backend(fare.clone());
        let orchestrator = Orchestrator::new(coverage, &GatewayConfig::default());
        let mut req = walking_request();
        req.direct_path = DirectPathPolicy::None;
        req.compute_pt_journey_fare = true;

        let (session, mut responses) = journeys(&orchestrator, req).await;
        responses[0].journeys[1].tags.push(TO_DELETE_TAG.to_string());
        session.finalise_journeys(&mut responses).await.unwrap();

        let kept = &responses[0].journeys[0];
        assert!(kept.sections.iter().all(|s| !s.is_crow_fly()));
        assert_eq!(kept.departure_date_time, at(500));
        assert_eq!(kept.arrival_date_time, at(1900));
        assert!(kept.fare.is_some());

        let deleted = &responses[0].journeys[1];
        assert!(deleted.sections[0].is_crow_fly());
        assert!(deleted.fare.is_none());
        assert_eq!(fare.calls("journey_fares"), 1);
        session.close().await;
    }

    #[tokio::test]
    async fn failing_street_network_keeps_crow_flies() {
        let (orchestrator, _, _) = setup(
            planner().with_journeys(bus_journeys(1)),
            street_network().with_failing_paths(),
        );
        let mut req = walking_request();
        req.direct_path = DirectPathPolicy::None;

        let (session, mut responses) = journeys(&orchestrator, req).await;
        session.finalise_journeys(&mut responses).await.unwrap();
        let journey = &responses[0].journeys[0];
        assert!(journey.sections[0].is_crow_fly());
        assert_eq!(journey.departure_date_time, at(480));
        session.close().await;
    }

    #[tokio::test]
    async fn more_journeys_reuse_the_fallbacks() {
        let (orchestrator, planner, _) =
            setup(planner().with_journeys(bus_journeys(1)), street_network());
        let (mut session, responses) = journeys(&orchestrator, walking_request()).await;
        assert_eq!(responses.len(), 2);
        let searches = planner.calls("crow_fly");

        let more = session.compute_more_journeys(at(3600)).await.unwrap();
        assert_eq!(more.len(), 1);
        assert!(more[0].journeys[0].sections[0].is_crow_fly());
        assert_eq!(planner.calls("crow_fly"), searches);
        assert_eq!(planner.calls("journeys"), 2);
        assert_eq!(planner.pt_requests()[1].datetime, at(3600));
        assert_eq!(session.journey_modes().len(), 2);
        session.close().await;
    }

    #[tokio::test]
    async fn dropped_session_drains_its_tasks() {
        let (orchestrator, _, _) =
            setup(planner().with_journeys(bus_journeys(1)), street_network());
        let (session, _) = journeys(&orchestrator, walking_request()).await;
        let fm = session.ctx.fm.clone();
        assert!(fm.has_pending());

        drop(session);
        tokio::time::timeout(Duration::from_secs(5), async {
            while fm.has_pending() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn closed_session_leaves_nothing_pending() {
        let (orchestrator, _, _) =
            setup(planner().with_journeys(bus_journeys(1)), street_network());
        let (session, _) = journeys(&orchestrator, walking_request()).await;
        let fm = session.ctx.fm.clone();
        session.close().await;
        assert!(!fm.has_pending());
    }

    #[tokio::test]
    async fn isochrone_uses_the_origin_only() {
        let (orchestrator, planner, _) =
            setup(planner().with_journeys(bus_journeys(1)), street_network());
        let mut req = walking_request();
        req.destination = None;

        let responses = orchestrator.isochrone(req).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].has_journeys());
        let sent = &planner.pt_requests()[0];
        assert!(sent.origins.contains_key("sp:A"));
        assert!(sent.destinations.is_empty());
    }

    fn polygons() -> PlannerResponse {
        PlannerResponse {
            graphical_isochrones: vec![GraphicalIsochrone {
                min_duration: 0,
                max_duration: 1800,
                geojson: serde_json::json!({"type": "MultiPolygon", "coordinates": []}),
            }],
            ..PlannerResponse::default()
        }
    }

    #[tokio::test]
    async fn graphical_isochrone_from_the_destination() {
        let (orchestrator, planner, _) = setup(
            planner().with_graphical_isochrones(polygons()),
            street_network(),
        );
        let mut req = walking_request();
        req.origin = None;

        let response = orchestrator.graphical_isochrone(req).await.unwrap();
        assert_eq!(response.graphical_isochrones.len(), 1);
        assert_eq!(planner.calls("graphical_isochrones"), 1);
        assert!(planner.pt_requests()[0].origins.is_empty());
    }

    #[tokio::test]
    async fn graphical_isochrone_errors() {
        let (orchestrator, _, _) = setup(planner(), street_network());
        let mut req = walking_request();
        req.destination = None;
        let err = orchestrator.graphical_isochrone(req.clone()).await.unwrap_err();
        assert!(matches!(err, ScenarioError::NoGraphicalIsochroneFound));

        let out = PlannerResponse::with_error(ErrorId::DateOutOfBounds, "too late");
        let (orchestrator, _, _) =
            setup(planner().with_graphical_isochrones(out), street_network());
        let err = orchestrator.graphical_isochrone(req).await.unwrap_err();
        assert!(matches!(err, ScenarioError::InvalidDateBound(ref m) if m == "too late"));
    }
}
