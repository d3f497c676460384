//! Itinerary sets returned by collaborators and by the orchestrator.

use serde::{Deserialize, Serialize};

use super::error::{ErrorId, ResponseError};
use super::journey::{Cost, Journey};

/// Publisher of the data a response was computed from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedPublisher {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub name: String,
    pub found: bool,
    #[serde(default)]
    pub cost: Option<Cost>,
    /// Sections covered by this ticket.
    #[serde(default)]
    pub section_ids: Vec<String>,
}

/// A reachability polygon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphicalIsochrone {
    pub min_duration: u32,
    pub max_duration: u32,
    /// GeoJSON multi-polygon.
    pub geojson: serde_json::Value,
}

/// A set of itineraries, possibly carrying an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlannerResponse {
    #[serde(default)]
    pub journeys: Vec<Journey>,
    #[serde(default)]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub feed_publishers: Vec<FeedPublisher>,
    #[serde(default)]
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub graphical_isochrones: Vec<GraphicalIsochrone>,
}

impl PlannerResponse {
    pub fn with_journeys(journeys: Vec<Journey>) -> Self {
        Self {
            journeys,
            ..Self::default()
        }
    }

    pub fn with_error(id: ErrorId, message: impl Into<String>) -> Self {
        Self {
            error: Some(ResponseError::new(id, message)),
            ..Self::default()
        }
    }

    pub fn has_journeys(&self) -> bool {
        !self.journeys.is_empty()
    }

    pub fn error_id(&self) -> Option<ErrorId> {
        self.error.as_ref().map(|e| e.id)
    }

    /// Add a feed publisher unless it is already listed.
    pub fn add_feed_publisher(&mut self, publisher: FeedPublisher) {
        if !self.feed_publishers.contains(&publisher) {
            self.feed_publishers.push(publisher);
        }
    }
}
