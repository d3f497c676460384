//! HTTP route handlers.

use axum::body::Bytes;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tracing::{error, info, warn};

use crate::domain::ErrorId;
use crate::request::JourneyRequest;
use crate::scenario::{FirstPass, ScenarioError};

use super::dto::*;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/journeys", post(journeys))
        .route("/isochrones", post(isochrones))
        .route("/graphical_isochrones", post(graphical_isochrones))
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Parse the body by hand so that malformed requests are logged.
fn parse_request(body: &Bytes) -> Result<JourneyRequest, AppError> {
    let request: JourneyRequest = serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, body = %String::from_utf8_lossy(body), "invalid request body");
        AppError::BadRequest {
            message: format!("Invalid JSON: {e}"),
        }
    })?;
    if request.origin_mode.is_empty() || request.destination_mode.is_empty() {
        return Err(AppError::BadRequest {
            message: "origin_mode and destination_mode must not be empty".to_string(),
        });
    }
    Ok(request)
}

/// Compute journeys and complete them.
///
/// Every journey survives: filtering happens upstream of this gateway. When
/// completion fails, the journeys are returned with their crow-fly fallbacks.
async fn journeys(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JourneysResponse>, AppError> {
    let request = parse_request(&body)?;
    let request_id = request.request_id.clone();

    let response = match state.orchestrator.compute_journeys(request).await? {
        FirstPass::DirectPathsOnly(responses) => JourneysResponse::new(responses, true),
        FirstPass::Journeys {
            session,
            mut responses,
        } => {
            let finalised = match session.finalise_journeys(&mut responses).await {
                Ok(()) => true,
                Err(e) => {
                    error!(request_id = %request_id, error = %e, "journeys left with crow-fly fallbacks");
                    false
                }
            };
            session.close().await;
            JourneysResponse::new(responses, finalised)
        }
    };
    info!(request_id = %request_id, journeys = response.journey_count(), "journeys answered");
    Ok(Json(response))
}

async fn isochrones(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<JourneysResponse>, AppError> {
    let request = parse_request(&body)?;
    let responses = state.orchestrator.isochrone(request).await?;
    Ok(Json(JourneysResponse::new(responses, false)))
}

async fn graphical_isochrones(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GraphicalIsochroneResponse>, AppError> {
    let request = parse_request(&body)?;
    let response = state.orchestrator.graphical_isochrone(request).await?;
    Ok(Json(response.into()))
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    BadRequest { message: String },
    /// The computation stopped; answered with its structured error response.
    Scenario(ScenarioError),
}

impl From<ScenarioError> for AppError {
    fn from(e: ScenarioError) -> Self {
        AppError::Scenario(e)
    }
}

fn status_for(id: Option<ErrorId>) -> StatusCode {
    match id {
        Some(
            ErrorId::NoOrigin
            | ErrorId::NoDestination
            | ErrorId::NoOriginNorDestination
            | ErrorId::NoSolution
            | ErrorId::UnknownObject,
        ) => StatusCode::NOT_FOUND,
        Some(ErrorId::DateOutOfBounds | ErrorId::BadFilter) => StatusCode::BAD_REQUEST,
        Some(ErrorId::ServiceUnavailable) => StatusCode::SERVICE_UNAVAILABLE,
        Some(ErrorId::InternalError) | None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::BadRequest { message } => {
                warn!(status = %StatusCode::BAD_REQUEST, %message, "request rejected");
                let body = Json(ErrorResponse { error: message });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::Scenario(e) => {
                let body = e.to_response();
                let status = status_for(body.error_id());
                if status.is_server_error() {
                    error!(%status, error = %e, "request failed");
                } else {
                    info!(%status, error = %e, "request answered with an error");
                }
                (status, Json(JourneysResponse::new(vec![body], false))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::domain::PlannerResponse;
    use crate::providers::ProximityCandidate;
    use crate::scenario::Orchestrator;
    use crate::scenario::test_support::{
        MockPlanner, MockStreetNetwork, address, coverage, pt_journey, stop_point,
    };

    fn state(planner: MockPlanner) -> AppState {
        let coverage = coverage(Arc::new(planner), Arc::new(MockStreetNetwork::new()));
        AppState::new(Orchestrator::new(coverage, &GatewayConfig::default()))
    }

    fn body(json: serde_json::Value) -> Bytes {
        Bytes::from(serde_json::to_vec(&json).unwrap())
    }

    fn planner() -> MockPlanner {
        let a = stop_point("sp:A", 2.351, 48.85);
        let b = stop_point("sp:B", 2.449, 48.85);
        MockPlanner::new()
            .with_place(address("o", 2.35, 48.85))
            .with_place(address("d", 2.45, 48.85))
            .with_crow_fly("o", vec![ProximityCandidate::new(a.clone(), 70.0)])
            .with_crow_fly("d", vec![ProximityCandidate::new(b.clone(), 70.0)])
            .with_journeys(PlannerResponse::with_journeys(vec![pt_journey(&a, &b, 600, 1800)]))
    }

    #[tokio::test]
    async fn health_check() {
        assert_eq!(health().await, "ok");
    }

    #[tokio::test]
    async fn journeys_are_finalised() {
        let request = body(serde_json::json!({
            "origin": "o",
            "destination": "d",
            "datetime": "2024-03-15T08:00:00Z",
            "direct_path": "none",
        }));
        let Json(response) = journeys(State(state(planner())), request).await.unwrap();
        assert!(response.finalised);
        assert_eq!(response.responses.len(), 1);
        let journey = &response.responses[0].journeys[0];
        assert!(journey.sections.iter().all(|s| !s.is_crow_fly()));
    }

    #[tokio::test]
    async fn malformed_body_is_a_bad_request() {
        let result = journeys(State(state(planner())), Bytes::from_static(b"{")).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_modes_are_rejected() {
        let request = body(serde_json::json!({
            "origin": "o",
            "destination": "d",
            "datetime": "2024-03-15T08:00:00Z",
            "origin_mode": [],
        }));
        let result = journeys(State(state(planner())), request).await;
        assert!(matches!(result, Err(AppError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn unknown_entry_point_is_not_found() {
        let request = body(serde_json::json!({
            "origin": "nowhere",
            "destination": "d",
            "datetime": "2024-03-15T08:00:00Z",
        }));
        let result = journeys(State(state(planner())), request).await;
        let response = result.unwrap_err().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn error_statuses() {
        assert_eq!(status_for(Some(ErrorId::NoOrigin)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(Some(ErrorId::DateOutOfBounds)), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(Some(ErrorId::ServiceUnavailable)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_for(None), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
