//! Fares of the journeys that survived filtering.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{Journey, PlannerResponse};
use crate::providers::{FareRequest, FareResponse};

use super::context::RequestContext;
use super::error::ScenarioError;
use super::future_manager::{PRIORITY_BACKGROUND, TaskFuture};

/// One fare request per response, over its surviving journeys.
pub struct PtJourneyFarePool {
    futures: Vec<(usize, TaskFuture<Option<FareResponse>>)>,
}

impl PtJourneyFarePool {
    /// Nothing is requested unless fares were asked for and a fare backend
    /// serves the coverage.
    pub fn new(
        ctx: &Arc<RequestContext>,
        responses: &[PlannerResponse],
        is_survivor: impl Fn(&Journey) -> bool,
    ) -> Self {
        let mut futures = Vec::new();
        if !ctx.request.compute_pt_journey_fare || ctx.coverage.fare_backend().is_none() {
            return Self { futures };
        }
        for (index, response) in responses.iter().enumerate() {
            let journeys: Vec<Journey> = response
                .journeys
                .iter()
                .filter(|j| is_survivor(j))
                .cloned()
                .collect();
            if journeys.is_empty() {
                continue;
            }
            let request = FareRequest {
                journeys,
                request_id: format!("{}_fare_{index}", ctx.request_id()),
            };
            futures.push((index, ctx.fm.create_future(compute(Arc::clone(ctx), request))));
        }
        Self { futures }
    }

    pub fn is_empty(&self) -> bool {
        self.futures.is_empty()
    }

    /// Attach fares to their journeys and merge the tickets of each response.
    pub async fn complete(&self, responses: &mut [PlannerResponse]) {
        for (index, future) in &self.futures {
            let Some(response) = responses.get_mut(*index) else {
                continue;
            };
            let fares = match future.wait_and_get().await {
                Ok(fares) => fares,
                Err(e) => {
                    warn!(error = %e, "fare task failed");
                    continue;
                }
            };
            let Some(fares) = Option::as_ref(&fares) else {
                continue;
            };
            for journey in &mut response.journeys {
                if let Some(fare) = journey.internal_id.as_ref().and_then(|id| fares.fares.get(id)) {
                    journey.fare = Some(fare.clone());
                }
            }
            for ticket in &fares.tickets {
                if !response.tickets.iter().any(|t| t.id == ticket.id) {
                    response.tickets.push(ticket.clone());
                }
            }
        }
    }
}

async fn compute(
    ctx: Arc<RequestContext>,
    request: FareRequest,
) -> Result<Option<FareResponse>, ScenarioError> {
    let Some(backend) = ctx.coverage.fare_backend() else {
        return Ok(None);
    };
    let journeys = request.journeys.len();
    let _slot = ctx.fm.acquire(PRIORITY_BACKGROUND).await;
    match backend.journey_fares(request).await {
        Ok(fares) => {
            debug!(journeys, priced = fares.fares.len(), "fares computed");
            Ok(Some(fares))
        }
        Err(e) => {
            warn!(error = %e, "fare backend failed, journeys left without fare");
            Ok(None)
        }
    }
}
