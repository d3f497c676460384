//! Errors aborting a journey computation.

use crate::domain::{ErrorId, PlannerResponse};
use crate::providers::ProviderError;

/// Why a computation stopped.
///
/// Cloneable so that a failed shared task can report its error to every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScenarioError {
    /// The planner answered with an error that must be returned as-is.
    #[error("planner error: {}", describe(.0))]
    Pt(PlannerResponse),

    /// Origin or destination is invalid or unreachable.
    #[error("{id}: {message}")]
    EntryPoint { id: ErrorId, message: String },

    /// A street-network backend failed and no estimate can stand in for it.
    #[error("street network error: {0}")]
    StreetNetwork(String),

    /// Completing the surviving journeys failed.
    #[error("finalise failed: {0}")]
    Finalise(String),

    #[error("no graphical isochrone found")]
    NoGraphicalIsochroneFound,

    #[error("date out of bounds: {0}")]
    InvalidDateBound(String),

    /// A task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

fn describe(response: &PlannerResponse) -> String {
    match &response.error {
        Some(error) => error.to_string(),
        None => "unknown".to_string(),
    }
}

impl ScenarioError {
    pub fn entry_point(id: ErrorId, message: impl Into<String>) -> Self {
        ScenarioError::EntryPoint {
            id,
            message: message.into(),
        }
    }

    /// A planner call that failed before producing a response.
    pub fn planner(err: &ProviderError) -> Self {
        let id = if err.is_technical() {
            ErrorId::ServiceUnavailable
        } else {
            ErrorId::InternalError
        };
        ScenarioError::Pt(PlannerResponse::with_error(id, err.to_string()))
    }

    pub fn street_network(err: &ProviderError) -> Self {
        ScenarioError::StreetNetwork(err.to_string())
    }

    /// The structured response returned to the caller for this error.
    pub fn to_response(&self) -> PlannerResponse {
        match self {
            ScenarioError::Pt(response) => response.clone(),
            ScenarioError::EntryPoint { id, message } => PlannerResponse::with_error(*id, message),
            ScenarioError::StreetNetwork(message) => {
                PlannerResponse::with_error(ErrorId::ServiceUnavailable, message)
            }
            ScenarioError::Finalise(message) | ScenarioError::Task(message) => {
                PlannerResponse::with_error(ErrorId::InternalError, message)
            }
            ScenarioError::NoGraphicalIsochroneFound => {
                PlannerResponse::with_error(ErrorId::NoSolution, self.to_string())
            }
            ScenarioError::InvalidDateBound(message) => {
                PlannerResponse::with_error(ErrorId::DateOutOfBounds, message)
            }
        }
    }
}
