//! Walking paths for the transfers of public transport journeys.
//!
//! A transfer between two vehicles reached from the street (buses, trams)
//! is a plain walking path. A transfer involving a station (train, metro)
//! goes through the station's best exit or entrance, picked with a routing
//! matrix on walking duration plus traversal time. Transfers between two
//! stations are left as the planner returned them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::domain::{
    AccessPoint, Coord, FallbackMode, Journey, Place, RoutingStatus, Section, SectionType,
};
use crate::providers::{MatrixRequest, StreetNetworkPathType};
use crate::request::PeriodExtremity;

use super::context::RequestContext;
use super::error::ScenarioError;
use super::future_manager::TaskFuture;
use super::street_network_path::{StreetNetworkPathPool, lock};

const STREET_LEVEL_MODES: [&str; 5] = ["Bus", "Tramway", "BusRapidTransit", "Coach", "Shuttle"];
const STATION_MODES: [&str; 5] = [
    "LongDistanceTrain",
    "LocalTrain",
    "Train",
    "RapidTransit",
    "Metro",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boarding {
    Street,
    Station,
}

fn boarding(section: &Section) -> Option<Boarding> {
    let mode = section.physical_mode.as_deref()?;
    let mode = mode.strip_prefix("physical_mode:").unwrap_or(mode);
    if STREET_LEVEL_MODES.contains(&mode) {
        Some(Boarding::Street)
    } else if STATION_MODES.contains(&mode) {
        Some(Boarding::Station)
    } else {
        None
    }
}

/// How a transfer is routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Walk,
    /// Leaving the origin station through one of its exits.
    ThroughExit,
    /// Entering the destination station through one of its entrances.
    ThroughEntrance,
}

fn transfer_kind(previous: &Section, next: &Section) -> Option<TransferKind> {
    match (boarding(previous)?, boarding(next)?) {
        (Boarding::Street, Boarding::Street) => Some(TransferKind::Walk),
        (Boarding::Station, Boarding::Street) => Some(TransferKind::ThroughExit),
        (Boarding::Street, Boarding::Station) => Some(TransferKind::ThroughEntrance),
        (Boarding::Station, Boarding::Station) => None,
    }
}

/// A computed transfer walk.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferPath {
    pub geometry: Vec<Coord>,
    pub length: u32,
    pub access_point: Option<String>,
}

type TransferKey = (String, String);

/// Transfer paths, computed once per (origin, destination) pair.
pub struct TransferPool {
    ctx: Arc<RequestContext>,
    paths: Arc<StreetNetworkPathPool>,
    transfers: Mutex<HashMap<TransferKey, TaskFuture<Option<TransferPath>>>>,
}

impl TransferPool {
    pub fn new(ctx: Arc<RequestContext>, paths: Arc<StreetNetworkPathPool>) -> Self {
        Self {
            ctx,
            paths,
            transfers: Mutex::new(HashMap::new()),
        }
    }

    fn key(section: &Section) -> TransferKey {
        (section.origin.uri.clone(), section.destination.uri.clone())
    }

    fn transfer(&self, key: &TransferKey) -> Option<TaskFuture<Option<TransferPath>>> {
        lock(&self.transfers).get(key).cloned()
    }

    /// Start computing the paths of every transfer of `journey`.
    pub fn launch(&self, journey: &Journey) {
        let sections = &journey.sections;
        for index in 1..sections.len().saturating_sub(1) {
            let section = &sections[index];
            if section.section_type != SectionType::Transfer {
                continue;
            }
            let previous = &sections[index - 1];
            let next_index = if sections[index + 1].section_type == SectionType::Waiting {
                index + 2
            } else {
                index + 1
            };
            let Some(next) = sections.get(next_index) else {
                continue;
            };
            let Some(kind) = transfer_kind(previous, next) else {
                continue;
            };

            let key = Self::key(section);
            let mut transfers = lock(&self.transfers);
            if transfers.contains_key(&key) {
                continue;
            }
            let future = self.ctx.fm.create_future(compute(
                Arc::clone(&self.ctx),
                Arc::clone(&self.paths),
                section.clone(),
                kind,
            ));
            transfers.insert(key, future);
        }
    }

    /// Give every launched transfer of `journey` its walking path.
    pub async fn complete(&self, journey: &mut Journey) -> Result<(), ScenarioError> {
        for section in &mut journey.sections {
            if section.section_type != SectionType::Transfer {
                continue;
            }
            let Some(future) = self.transfer(&Self::key(section)) else {
                continue;
            };
            let Some(path) = (*future.wait_and_get().await?).clone() else {
                continue;
            };
            section.geometry = path.geometry;
            section.length = path.length;
            section.mode = Some(FallbackMode::Walking);
            if let Some(access_point) = path.access_point {
                section.vias.push(access_point);
            }
        }
        journey.recompute_totals();
        Ok(())
    }
}

async fn compute(
    ctx: Arc<RequestContext>,
    paths: Arc<StreetNetworkPathPool>,
    section: Section,
    kind: TransferKind,
) -> Result<Option<TransferPath>, ScenarioError> {
    let (origin, destination, access_point) = match kind {
        TransferKind::Walk => (section.origin.clone(), section.destination.clone(), None),
        TransferKind::ThroughExit | TransferKind::ThroughEntrance => {
            let Some(access_point) = best_access_point(&ctx, &section, kind).await? else {
                return Ok(None);
            };
            let entrance = Place::from_access_point(&access_point);
            if kind == TransferKind::ThroughExit {
                (entrance, section.destination.clone(), Some(access_point.uri))
            } else {
                (section.origin.clone(), entrance, Some(access_point.uri))
            }
        }
    };

    let extremity = PeriodExtremity::new(section.end_date_time, false);
    let Some(future) = paths.add_async_request(
        &origin,
        &destination,
        FallbackMode::Walking,
        extremity,
        StreetNetworkPathType::Direct,
    ) else {
        return Ok(None);
    };
    let response = future.wait_and_get().await?;
    let Some(walk) = response.journeys.first().and_then(|j| j.sections.first()) else {
        debug!(origin = %origin.uri, destination = %destination.uri, "no transfer path");
        return Ok(None);
    };

    let geometry = std::iter::once(origin.coord)
        .chain(walk.geometry.iter().copied())
        .chain(std::iter::once(destination.coord))
        .collect();
    Ok(Some(TransferPath {
        geometry,
        length: walk.length,
        access_point,
    }))
}

/// Access points of the station side of a transfer.
async fn station_access_points(
    ctx: &RequestContext,
    station: &Place,
    entering: bool,
) -> Result<Vec<AccessPoint>, ScenarioError> {
    let known: Vec<AccessPoint> = station
        .stop_point_access_points(entering)
        .into_iter()
        .cloned()
        .collect();
    if !known.is_empty() {
        return Ok(known);
    }
    let stop_points = ctx
        .planner()
        .stop_points_of(&station.uri, ctx.request_id())
        .await
        .map_err(|e| ScenarioError::planner(&e))?;
    Ok(stop_points
        .first()
        .map(|sp| {
            sp.stop_point_access_points(entering)
                .into_iter()
                .cloned()
                .collect()
        })
        .unwrap_or_default())
}

async fn best_access_point(
    ctx: &RequestContext,
    section: &Section,
    kind: TransferKind,
) -> Result<Option<AccessPoint>, ScenarioError> {
    let leaving = kind == TransferKind::ThroughExit;
    let station = if leaving {
        &section.origin
    } else {
        &section.destination
    };
    let mut access_points = station_access_points(ctx, station, !leaving).await?;
    if access_points.len() <= 1 {
        return Ok(access_points.pop());
    }

    let Some(provider) = ctx.coverage.street_network(FallbackMode::Walking) else {
        warn!("no walking street network for transfers");
        return Ok(None);
    };
    let candidates: Vec<Place> = access_points.iter().map(Place::from_access_point).collect();
    let (origins, destinations) = if leaving {
        (candidates, vec![section.destination.clone()])
    } else {
        (vec![section.origin.clone()], candidates)
    };
    let request = MatrixRequest {
        origins,
        destinations,
        mode: FallbackMode::Walking,
        max_duration: section.duration.saturating_mul(3),
        speeds: ctx.request.speeds(),
        request_id: format!("{}_transfer_matrix", ctx.request_id()),
    };
    let matrix = {
        let _slot = ctx.fm.acquire(FallbackMode::Walking.scheduling_weight()).await;
        provider.routing_matrix(request).await
    };
    let cells = match matrix {
        Ok(matrix) => matrix.line(access_points.len(), !leaving),
        Err(e) => {
            warn!(station = %station.uri, error = %e, "transfer matrix failed");
            None
        }
    };
    let Some(cells) = cells else {
        return Ok(None);
    };

    let best = access_points
        .into_iter()
        .zip(cells)
        .filter(|(_, cell)| cell.status == RoutingStatus::Reached)
        .min_by_key(|(access_point, cell)| cell.duration.saturating_add(access_point.traversal_time))
        .map(|(access_point, _)| access_point);
    if best.is_none() {
        warn!(station = %station.uri, "no access point reachable for transfer");
    }
    Ok(best)
}
