//! Domain types for the journey gateway.
//!
//! Places, fallback modes, durations and the journeys assembled from them.
//! These are plain values shared by the providers and the orchestration core.

mod duration;
mod error;
mod journey;
mod mode;
mod place;
mod response;

pub use duration::{
    BestFallbackDurations, DurationElement, FallbackDurations, RoutingStatus, keep_min,
    manhattan_duration,
};
pub use error::{ErrorId, ResponseError};
pub use journey::{
    Cost, Distances, Durations, Fare, Journey, Section, SectionType, TO_DELETE_TAG, generate_id,
};
pub use mode::{FallbackMode, InvalidFallbackMode};
pub use place::{AccessPoint, Coord, Place, PlaceKind};
pub use response::{FeedPublisher, GraphicalIsochrone, PlannerResponse, Ticket};
