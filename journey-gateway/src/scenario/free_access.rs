//! Stop points reachable from a place at no cost.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::domain::{Place, PlaceKind};

use super::context::RequestContext;
use super::error::ScenarioError;
use super::future_manager::{PRIORITY_URGENT, TaskFuture};

/// Stop points reached for free from a place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeAccessSets {
    /// The place itself if it is a stop point, or the stop points of its
    /// stop area or administrative region.
    pub crowfly: HashSet<String>,
    /// On-demand transport stop points serving the place.
    pub odt: HashSet<String>,
}

impl FreeAccessSets {
    /// Every free stop point, including those within `free_radius`.
    pub fn all(&self, free_radius: &HashSet<String>) -> HashSet<String> {
        self.crowfly
            .iter()
            .chain(&self.odt)
            .chain(free_radius)
            .cloned()
            .collect()
    }
}

/// Free-access computation for one place, run as a single task.
pub struct PlacesFreeAccess {
    future: TaskFuture<FreeAccessSets>,
}

impl PlacesFreeAccess {
    pub fn new(ctx: &Arc<RequestContext>, place: &Place) -> Self {
        let future = ctx
            .fm
            .create_future(compute(Arc::clone(ctx), place.clone()));
        Self { future }
    }

    pub fn future(&self) -> TaskFuture<FreeAccessSets> {
        self.future.clone()
    }

    pub async fn wait_and_get(&self) -> Result<Arc<FreeAccessSets>, ScenarioError> {
        self.future.wait_and_get().await
    }
}

async fn compute(ctx: Arc<RequestContext>, place: Place) -> Result<FreeAccessSets, ScenarioError> {
    let planner = ctx.planner();
    let request_id = ctx.request_id();
    let _slot = ctx.fm.acquire(PRIORITY_URGENT).await;

    let crowfly = match &place.kind {
        PlaceKind::StopPoint { .. } => HashSet::from([place.uri.clone()]),
        PlaceKind::StopArea | PlaceKind::AdministrativeRegion => planner
            .stop_points_of(&place.uri, request_id)
            .await
            .map_err(|e| ScenarioError::planner(&e))?
            .into_iter()
            .map(|sp| sp.uri)
            .collect(),
        _ => HashSet::new(),
    };

    let odt = if place.coord.is_valid() {
        planner
            .odt_stop_points(place.coord, request_id)
            .await
            .map_err(|e| ScenarioError::planner(&e))?
            .into_iter()
            .map(|sp| sp.uri)
            .collect()
    } else {
        HashSet::new()
    };

    debug!(place = %place.uri, crowfly = crowfly.len(), odt = odt.len(), "free access computed");
    Ok(FreeAccessSets { crowfly, odt })
}
