//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::domain::{GraphicalIsochrone, PlannerResponse};

/// Response of `POST /journeys` and `POST /isochrones`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JourneysResponse {
    /// One itinerary set per direct path and per mode pair that found journeys.
    pub responses: Vec<PlannerResponse>,

    /// Whether street-network fallbacks replaced the crow-fly placeholders.
    pub finalised: bool,
}

impl JourneysResponse {
    pub fn new(responses: Vec<PlannerResponse>, finalised: bool) -> Self {
        Self {
            responses,
            finalised,
        }
    }

    /// Number of journeys across every response.
    pub fn journey_count(&self) -> usize {
        self.responses.iter().map(|r| r.journeys.len()).sum()
    }
}

/// Response of `POST /graphical_isochrones`.
#[derive(Debug, Serialize)]
pub struct GraphicalIsochroneResponse {
    pub isochrones: Vec<GraphicalIsochrone>,
    pub feed_publishers: Vec<crate::domain::FeedPublisher>,
}

impl From<PlannerResponse> for GraphicalIsochroneResponse {
    fn from(response: PlannerResponse) -> Self {
        Self {
            isochrones: response.graphical_isochrones,
            feed_publishers: response.feed_publishers,
        }
    }
}

/// Error response for requests rejected before any computation.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}
