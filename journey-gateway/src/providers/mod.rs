//! External collaborators of the orchestrator.
//!
//! The orchestrator never talks to a transit engine, a street-network router
//! or a fare service directly. It goes through the capability traits defined
//! here, one implementation per backend, selected at configuration time by
//! the [`ConnectorRegistry`].
//!
//! Trait methods return boxed futures so implementations can be shared as
//! `Arc<dyn Trait>` between concurrently running tasks.

mod coverage;
mod crowfly;
mod error;
mod http;
mod registry;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Coord, Fare, FallbackMode, FeedPublisher, Journey, Place, PlannerResponse, RoutingStatus,
    Ticket,
};
use crate::request::{PeriodExtremity, RealtimeLevel, Speeds};

pub use coverage::Coverage;
pub use crowfly::CrowflyStreetNetwork;
pub use error::ProviderError;
pub use http::{HttpConfig, HttpFareBackend, HttpPtPlanner, HttpStreetNetwork, JsonHttpClient};
pub use registry::{
    ConnectorRegistry, FareBackendFactory, PtPlannerFactory, StreetNetworkFactory,
};

/// Where a street-network path sits in a journey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreetNetworkPathType {
    /// From the requested origin to the requested destination, no public transport.
    Direct,
    /// From the requested origin to the first public transport stop.
    BeginningFallback,
    /// From the last public transport stop to the requested destination.
    EndingFallback,
}

/// Identity of a street-network path computation.
///
/// Two requests with the same key produce the same path, so it is computed
/// at most once per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub mode: FallbackMode,
    pub origin_uri: String,
    pub destination_uri: String,
    pub path_type: StreetNetworkPathType,
    /// `None` for providers whose paths do not depend on time.
    pub extremity: Option<PeriodExtremity>,
}

/// What a crow-fly proximity search looks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrowFlyTarget {
    StopPoints,
    /// Car parks, each with the stop points within walking reach.
    CarParks {
        park_and_ride_only: bool,
        /// Walking seconds allowed between a car park and a stop point.
        nearby_duration: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowFlyRequest {
    pub place: Place,
    pub mode: FallbackMode,
    pub max_duration: u32,
    pub max_count: u32,
    pub target: CrowFlyTarget,
    pub depth: u32,
    pub forbidden_uris: Vec<String>,
    pub allowed_ids: Vec<String>,
    pub speeds: Speeds,
    pub request_id: String,
}

/// A stop point near a car park.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyStopPoint {
    pub stop_point: Place,
    /// Meters.
    pub distance: f64,
}

/// A place found by a crow-fly proximity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximityCandidate {
    pub place: Place,
    /// Straight-line meters from the searched place.
    pub distance: f64,
    /// For car parks: stop points within walking reach, closest first.
    #[serde(default)]
    pub nearby_stop_points: Vec<NearbyStopPoint>,
}

impl ProximityCandidate {
    pub fn new(place: Place, distance: f64) -> Self {
        Self {
            place,
            distance,
            nearby_stop_points: Vec::new(),
        }
    }
}

/// Constraints forwarded to the public transport planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyParameters {
    pub max_duration: u32,
    pub min_duration: u32,
    pub max_transfers: u32,
    pub wheelchair: bool,
    pub realtime_level: RealtimeLevel,
    pub max_extra_second_pass: u32,
    pub walking_transfer_penalty: u32,
    pub forbidden_uris: Vec<String>,
    pub allowed_ids: Vec<String>,
    /// Duration of the direct path for the departure mode, if one exists.
    pub direct_path_duration: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PtJourneysRequest {
    /// Stop point uri → seconds from the origin.
    pub origins: HashMap<String, u32>,
    /// Stop point uri → seconds to the destination.
    pub destinations: HashMap<String, u32>,
    pub datetime: DateTime<Utc>,
    pub clockwise: bool,
    pub params: JourneyParameters,
    pub bike_in_pt: bool,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRequest {
    pub origins: Vec<Place>,
    pub destinations: Vec<Place>,
    pub mode: FallbackMode,
    pub max_duration: u32,
    pub speeds: Speeds,
    pub request_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub duration: u32,
    pub status: RoutingStatus,
}

/// `rows[origin][destination]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingMatrix {
    pub rows: Vec<Vec<MatrixCell>>,
}

impl RoutingMatrix {
    /// Cells for a one-to-many or many-to-one matrix, in candidate order.
    ///
    /// Returns `None` when the matrix does not have the expected shape.
    pub fn line(&self, len: usize, one_to_many: bool) -> Option<Vec<MatrixCell>> {
        if one_to_many {
            let row = self.rows.first()?;
            (row.len() == len).then(|| row.clone())
        } else {
            if self.rows.len() != len {
                return None;
            }
            self.rows.iter().map(|r| r.first().copied()).collect()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectPathRequest {
    pub mode: FallbackMode,
    pub origin: Place,
    pub destination: Place,
    pub datetime: DateTime<Utc>,
    pub represents_start: bool,
    pub path_type: StreetNetworkPathType,
    pub speeds: Speeds,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareRequest {
    pub journeys: Vec<Journey>,
    pub request_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FareResponse {
    /// Journey internal id → fare.
    pub fares: HashMap<String, Fare>,
    pub tickets: Vec<Ticket>,
}

/// The public transport routing engine.
pub trait PtPlanner: Send + Sync {
    /// Resolve a uri into a place, `None` if it is unknown.
    fn place_by_uri<'a>(
        &'a self,
        uri: &'a str,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Place>, ProviderError>>;

    /// Stop points belonging to a place: itself if it is a stop point, those
    /// of its stop area, or those of an administrative region's main stop areas.
    fn stop_points_of<'a>(
        &'a self,
        uri: &'a str,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>>;

    /// On-demand-transport stop points serving a coordinate.
    fn odt_stop_points<'a>(
        &'a self,
        coord: Coord,
        request_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Place>, ProviderError>>;

    fn crow_fly(
        &self,
        request: CrowFlyRequest,
    ) -> BoxFuture<'_, Result<Vec<ProximityCandidate>, ProviderError>>;

    fn journeys(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>>;

    fn graphical_isochrones(
        &self,
        request: PtJourneysRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>>;
}

/// A street-network router for one or more fallback modes.
pub trait StreetNetworkProvider: Send + Sync {
    fn id(&self) -> &str;

    fn routing_matrix(
        &self,
        request: MatrixRequest,
    ) -> BoxFuture<'_, Result<RoutingMatrix, ProviderError>>;

    fn direct_path(
        &self,
        request: DirectPathRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>>;

    fn make_path_key(
        &self,
        mode: FallbackMode,
        origin_uri: &str,
        destination_uri: &str,
        path_type: StreetNetworkPathType,
        extremity: PeriodExtremity,
    ) -> PathKey {
        PathKey {
            mode,
            origin_uri: origin_uri.to_string(),
            destination_uri: destination_uri.to_string(),
            path_type,
            extremity: Some(extremity),
        }
    }

    /// Drop candidates this provider cannot route to.
    fn filter_places_isochrone(&self, candidates: Vec<ProximityCandidate>) -> Vec<ProximityCandidate> {
        candidates
    }

    fn feed_publisher(&self) -> Option<FeedPublisher> {
        None
    }
}

/// Computes fares for public transport journeys.
pub trait FareBackend: Send + Sync {
    fn journey_fares(&self, request: FareRequest) -> BoxFuture<'_, Result<FareResponse, ProviderError>>;
}
