//! Journey orchestration.
//!
//! Every external call of a request runs as a task of the request's
//! [`FutureManager`]. Tasks depend on each other through [`TaskFuture`]s:
//! fallback durations wait for proximity searches, which wait for direct
//! paths to bound their radius, and public transport calls wait for the
//! fallback durations of both sides. The [`Orchestrator`] wires them
//! together.

mod context;
mod distributed;
mod error;
mod fallback;
mod fallback_durations;
mod fare;
mod free_access;
mod future_manager;
mod proximities;
mod pt_journey;
mod street_network_path;
mod transfer;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::RequestContext;
pub use distributed::{FirstPass, JourneySession, Orchestrator};
pub use error::ScenarioError;
pub use fallback::{FallbackSide, PendingFallback, add_crow_flies, tag_low_emission_zone};
pub use fallback_durations::{FallbackDurationsPool, ModeFallback};
pub use fare::PtJourneyFarePool;
pub use free_access::{FreeAccessSets, PlacesFreeAccess};
pub use future_manager::{
    FutureManager, PRIORITY_BACKGROUND, PRIORITY_URGENT, PrioritySlots, SlotGuard, TaskFuture,
};
pub use proximities::{ProximitiesByCrowflyPool, max_fallback_duration};
pub use pt_journey::{PtJourneyPool, PtJourneyResult};
pub use street_network_path::StreetNetworkPathPool;
pub use transfer::{TransferPath, TransferPool};
