//! Web layer of the journey gateway.
//!
//! Exposes the orchestrator over HTTP: journeys, isochrones and a health check.

mod dto;
mod routes;
mod state;

pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;
