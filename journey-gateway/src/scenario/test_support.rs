//! Mock collaborators and fixtures for scenario tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::domain::{
    Coord, Fare, FallbackMode, FeedPublisher, Journey, Place, PlannerResponse, RoutingStatus,
    Section, SectionType, Ticket,
};
use crate::providers::{
    Coverage, CrowFlyRequest, DirectPathRequest, FareBackend, FareRequest, FareResponse,
    JourneyParameters, MatrixCell, MatrixRequest, ProviderError, ProximityCandidate,
    PtJourneysRequest, PtPlanner, RoutingMatrix, StreetNetworkProvider,
};
use crate::request::{JourneyRequest, RealtimeLevel, RequestDefaults};

use super::context::RequestContext;
use super::future_manager::FutureManager;

/// Base time of every fixture.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 8, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

pub fn stop_point(uri: &str, lon: f64, lat: f64) -> Place {
    Place::stop_point(uri, Coord::new(lon, lat))
}

pub fn address(uri: &str, lon: f64, lat: f64) -> Place {
    Place::address(uri, Coord::new(lon, lat))
}

/// A request from `origin` to `destination` at [`at(0)`](at), defaults applied.
pub fn request(origin: &str, destination: &str) -> JourneyRequest {
    let mut request = JourneyRequest::new(origin, destination, at(0));
    request.apply_defaults(&RequestDefaults::default());
    request
}

pub fn pt_request() -> PtJourneysRequest {
    PtJourneysRequest {
        origins: HashMap::from([("stop_point:A".to_string(), 60)]),
        destinations: HashMap::from([("stop_point:B".to_string(), 120)]),
        datetime: at(0),
        clockwise: true,
        params: JourneyParameters {
            max_duration: 86_400,
            min_duration: 0,
            max_transfers: 10,
            wheelchair: false,
            realtime_level: RealtimeLevel::BaseSchedule,
            max_extra_second_pass: 0,
            walking_transfer_penalty: 120,
            forbidden_uris: Vec::new(),
            allowed_ids: Vec::new(),
            direct_path_duration: None,
        },
        bike_in_pt: false,
        request_id: "test".to_string(),
    }
}

/// A one-section public transport journey.
pub fn pt_journey(from: &Place, to: &Place, begin: i64, end: i64) -> Journey {
    let mut section = Section::new(
        SectionType::PublicTransport,
        from.clone(),
        to.clone(),
        at(begin),
        at(end),
    );
    section.physical_mode = Some("physical_mode:Bus".to_string());
    let mut journey = Journey::from_sections(vec![section]).unwrap();
    journey.internal_id = None;
    journey
}

pub fn context(request: JourneyRequest, coverage: Coverage) -> Arc<RequestContext> {
    Arc::new(RequestContext::new(request, coverage, FutureManager::new(4)))
}

/// A coverage routing every mode through `sn`.
pub fn coverage(planner: Arc<MockPlanner>, sn: Arc<MockStreetNetwork>) -> Coverage {
    FallbackMode::ALL
        .into_iter()
        .fold(Coverage::new("test", planner), |coverage, mode| {
            coverage.with_street_network(mode, sn.clone())
        })
}

#[derive(Default)]
struct Calls(Mutex<HashMap<&'static str, usize>>);

impl Calls {
    fn record(&self, op: &'static str) {
        *self.0.lock().unwrap().entry(op).or_default() += 1;
    }

    fn get(&self, op: &str) -> usize {
        self.0.lock().unwrap().get(op).copied().unwrap_or(0)
    }
}

/// In-memory planner recording every call.
#[derive(Default)]
pub struct MockPlanner {
    places: HashMap<String, Place>,
    stop_points: HashMap<String, Vec<Place>>,
    odt: Vec<Place>,
    crow_fly: HashMap<(String, Option<FallbackMode>), Vec<ProximityCandidate>>,
    journeys: Option<PlannerResponse>,
    isochrones: Option<PlannerResponse>,
    failing: HashSet<&'static str>,
    calls: Calls,
    pt_requests: Mutex<Vec<PtJourneysRequest>>,
    crow_fly_requests: Mutex<Vec<CrowFlyRequest>>,
}

impl MockPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, place: Place) -> Self {
        self.places.insert(place.uri.clone(), place);
        self
    }

    pub fn with_stop_points(mut self, uri: &str, stop_points: Vec<Place>) -> Self {
        self.stop_points.insert(uri.to_string(), stop_points);
        self
    }

    pub fn with_odt(mut self, stop_points: Vec<Place>) -> Self {
        self.odt = stop_points;
        self
    }

    /// Candidates returned for any mode around `uri`.
    pub fn with_crow_fly(mut self, uri: &str, candidates: Vec<ProximityCandidate>) -> Self {
        self.crow_fly.insert((uri.to_string(), None), candidates);
        self
    }

    pub fn with_crow_fly_for(
        mut self,
        uri: &str,
        mode: FallbackMode,
        candidates: Vec<ProximityCandidate>,
    ) -> Self {
        self.crow_fly.insert((uri.to_string(), Some(mode)), candidates);
        self
    }

    /// Response returned by every `journeys` call.
    pub fn with_journeys(mut self, response: PlannerResponse) -> Self {
        self.journeys = Some(response);
        self
    }

    pub fn with_graphical_isochrones(mut self, response: PlannerResponse) -> Self {
        self.isochrones = Some(response);
        self
    }

    /// Make `op` fail with a technical error.
    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op)
    }

    pub fn pt_requests(&self) -> Vec<PtJourneysRequest> {
        self.pt_requests.lock().unwrap().clone()
    }

    pub fn crow_fly_requests(&self) -> Vec<CrowFlyRequest> {
        self.crow_fly_requests.lock().unwrap().clone()
    }

    fn check(&self, op: &'static str) -> Result<(), ProviderError> {
        self.calls.record(op);
        if self.failing.contains(op) {
            return Err(ProviderError::Unavailable(format!("{op} is down")));
        }
        Ok(())
    }
}

impl PtPlanner for MockPlanner {
    fn place_by_uri<'a>(
        &'a self,
        uri: &'a str,
        _request_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Place>, ProviderError>> {
        let result = self.check("place_by_uri").map(|()| self.places.get(uri).cloned());
        async move { result }.boxed()
    }

    fn stop_points_of<'a>(
        &'a self,
        uri: &'a str,
        _request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>> {
        let result = self
            .check("stop_points_of")
            .map(|()| self.stop_points.get(uri).cloned().unwrap_or_default());
        async move { result }.boxed()
    }

    fn odt_stop_points<'a>(
        &'a self,
        _coord: Coord,
        _request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>> {
        let result = self.check("odt_stop_points").map(|()| self.odt.clone());
        async move { result }.boxed()
    }

    fn crow_fly(
        &self,
        request: CrowFlyRequest,
    ) -> BoxFuture<'_, Result<Vec<ProximityCandidate>, ProviderError>> {
        let result = self.check("crow_fly").map(|()| {
            let uri = request.place.uri.clone();
            self.crow_fly
                .get(&(uri.clone(), Some(request.mode)))
                .or_else(|| self.crow_fly.get(&(uri, None)))
                .cloned()
                .unwrap_or_default()
        });
        self.crow_fly_requests.lock().unwrap().push(request);
        async move { result }.boxed()
    }

    fn journeys(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        let result = self
            .check("journeys")
            .map(|()| self.journeys.clone().unwrap_or_default());
        self.pt_requests.lock().unwrap().push(request);
        async move { result }.boxed()
    }

    fn graphical_isochrones(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        let result = self
            .check("graphical_isochrones")
            .map(|()| self.isochrones.clone().unwrap_or_default());
        self.pt_requests.lock().unwrap().push(request);
        async move { result }.boxed()
    }
}

/// How the mock answers routing matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixBehaviour {
    Normal,
    /// A matrix with the wrong shape.
    Garbage,
    Failing,
}

/// Street network with configurable durations, recording every call.
pub struct MockStreetNetwork {
    id: String,
    /// Place uri → (seconds, status) for matrix cells involving it.
    durations: HashMap<String, (u32, RoutingStatus)>,
    /// Seconds per path when set, else straight line at the mode speed.
    path_duration: Option<u32>,
    path_delays: HashMap<String, Duration>,
    empty_paths: bool,
    failing_paths: bool,
    low_emission_zone: Option<bool>,
    matrix: MatrixBehaviour,
    feed_publisher: Option<FeedPublisher>,
    calls: Calls,
    path_requests: Mutex<Vec<DirectPathRequest>>,
}

impl Default for MockStreetNetwork {
    fn default() -> Self {
        Self {
            id: "mock".to_string(),
            durations: HashMap::new(),
            path_duration: None,
            path_delays: HashMap::new(),
            empty_paths: false,
            failing_paths: false,
            low_emission_zone: None,
            matrix: MatrixBehaviour::Normal,
            feed_publisher: None,
            calls: Calls::default(),
            path_requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockStreetNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, uri: &str, seconds: u32) -> Self {
        self.durations
            .insert(uri.to_string(), (seconds, RoutingStatus::Reached));
        self
    }

    pub fn with_status(mut self, uri: &str, status: RoutingStatus) -> Self {
        self.durations.insert(uri.to_string(), (0, status));
        self
    }

    pub fn with_path_duration(mut self, seconds: u32) -> Self {
        self.path_duration = Some(seconds);
        self
    }

    /// Delay paths starting or ending at `uri`.
    pub fn with_path_delay(mut self, uri: &str, delay: Duration) -> Self {
        self.path_delays.insert(uri.to_string(), delay);
        self
    }

    pub fn with_empty_paths(mut self) -> Self {
        self.empty_paths = true;
        self
    }

    pub fn with_failing_paths(mut self) -> Self {
        self.failing_paths = true;
        self
    }

    pub fn with_low_emission_zone(mut self, on_path: bool) -> Self {
        self.low_emission_zone = Some(on_path);
        self
    }

    pub fn with_matrix(mut self, behaviour: MatrixBehaviour) -> Self {
        self.matrix = behaviour;
        self
    }

    pub fn with_feed_publisher(mut self, id: &str) -> Self {
        self.feed_publisher = Some(FeedPublisher {
            id: id.to_string(),
            name: id.to_string(),
            license: String::new(),
            url: String::new(),
        });
        self
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op)
    }

    pub fn path_requests(&self) -> Vec<DirectPathRequest> {
        self.path_requests.lock().unwrap().clone()
    }

    fn cell(&self, origin: &Place, destination: &Place, request: &MatrixRequest) -> MatrixCell {
        let configured = self
            .durations
            .get(&destination.uri)
            .or_else(|| self.durations.get(&origin.uri));
        match configured {
            Some(&(duration, status)) => MatrixCell { duration, status },
            None => {
                let speed = request.speeds.for_mode(request.mode);
                let duration = (origin.coord.distance_to(&destination.coord) / speed) as u32;
                MatrixCell {
                    duration,
                    status: if duration <= request.max_duration {
                        RoutingStatus::Reached
                    } else {
                        RoutingStatus::Unreached
                    },
                }
            }
        }
    }

    fn path(&self, request: &DirectPathRequest) -> PlannerResponse {
        if self.empty_paths {
            return PlannerResponse::default();
        }
        let distance = request.origin.coord.distance_to(&request.destination.coord);
        let seconds = self
            .path_duration
            .unwrap_or((distance / request.speeds.for_mode(request.mode)) as u32);
        let duration = TimeDelta::seconds(seconds as i64);
        let (begin, end) = if request.represents_start {
            (request.datetime, request.datetime + duration)
        } else {
            (request.datetime - duration, request.datetime)
        };
        let mut section = Section::new(
            SectionType::StreetNetwork,
            request.origin.clone(),
            request.destination.clone(),
            begin,
            end,
        );
        section.mode = Some(match request.mode {
            FallbackMode::Ridesharing | FallbackMode::CarNoPark => FallbackMode::Car,
            mode => mode,
        });
        section.length = distance as u32;
        section.geometry = vec![request.origin.coord, request.destination.coord];
        section.low_emission_zone_on_path = self.low_emission_zone;
        let mut response = PlannerResponse::with_journeys(vec![
            Journey::from_sections(vec![section]).unwrap(),
        ]);
        if let Some(fp) = &self.feed_publisher {
            response.add_feed_publisher(fp.clone());
        }
        response
    }
}

impl StreetNetworkProvider for MockStreetNetwork {
    fn id(&self) -> &str {
        &self.id
    }

    fn routing_matrix(
        &self,
        request: MatrixRequest,
    ) -> BoxFuture<'_, Result<RoutingMatrix, ProviderError>> {
        self.calls.record("routing_matrix");
        let result = match self.matrix {
            MatrixBehaviour::Failing => Err(ProviderError::Api {
                status: 500,
                message: "matrix failed".to_string(),
            }),
            MatrixBehaviour::Garbage => Ok(RoutingMatrix::default()),
            MatrixBehaviour::Normal => Ok(RoutingMatrix {
                rows: request
                    .origins
                    .iter()
                    .map(|o| {
                        request
                            .destinations
                            .iter()
                            .map(|d| self.cell(o, d, &request))
                            .collect()
                    })
                    .collect(),
            }),
        };
        async move { result }.boxed()
    }

    fn direct_path(
        &self,
        request: DirectPathRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        self.calls.record("direct_path");
        self.path_requests.lock().unwrap().push(request.clone());
        let delay = self
            .path_delays
            .get(&request.origin.uri)
            .or_else(|| self.path_delays.get(&request.destination.uri))
            .copied();
        let result = if self.failing_paths {
            Err(ProviderError::Unavailable("router down".to_string()))
        } else {
            Ok(self.path(&request))
        };
        async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        }
        .boxed()
    }

    fn feed_publisher(&self) -> Option<FeedPublisher> {
        self.feed_publisher.clone()
    }
}

/// Fare backend pricing every journey at 2.0 with one shared ticket.
#[derive(Default)]
pub struct MockFare {
    calls: Calls,
}

impl MockFare {
    pub fn calls(&self, op: &str) -> usize {
        self.calls.get(op)
    }
}

impl FareBackend for MockFare {
    fn journey_fares(
        &self,
        request: FareRequest,
    ) -> BoxFuture<'_, Result<FareResponse, ProviderError>> {
        self.calls.record("journey_fares");
        let fares = request
            .journeys
            .iter()
            .filter_map(|j| j.internal_id.clone())
            .map(|id| {
                let fare = Fare {
                    found: true,
                    total: Some(crate::domain::Cost {
                        value: 2.0,
                        currency: "EUR".to_string(),
                    }),
                    ticket_ids: vec!["ticket:t+".to_string()],
                };
                (id, fare)
            })
            .collect();
        let tickets = vec![Ticket {
            id: "ticket:t+".to_string(),
            name: "Ticket t+".to_string(),
            found: true,
            cost: None,
            section_ids: Vec::new(),
        }];
        async move { Ok(FareResponse { fares, tickets }) }.boxed()
    }
}
