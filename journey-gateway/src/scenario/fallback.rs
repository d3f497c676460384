//! Fallback sections at both ends of public transport journeys.
//!
//! The first pass only adds crow-fly sections, built from the durations
//! already known. The second pass replaces them with real street-network
//! paths for the journeys that survived filtering.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::domain::{
    AccessPoint, BestFallbackDurations, DurationElement, FallbackMode, Journey, Place,
    PlannerResponse, RoutingStatus, Section, SectionType, generate_id,
};
use crate::providers::StreetNetworkPathType;
use crate::request::PeriodExtremity;

use super::error::ScenarioError;
use super::fallback_durations::FallbackDurationsPool;
use super::free_access::FreeAccessSets;
use super::future_manager::TaskFuture;
use super::street_network_path::StreetNetworkPathPool;

/// Everything known about one end of the journeys of one mode.
#[derive(Debug, Clone)]
pub struct FallbackSide {
    place: Place,
    mode: FallbackMode,
    is_beginning: bool,
    best: BestFallbackDurations,
    free: Arc<FreeAccessSets>,
    free_radius: HashSet<String>,
}

impl FallbackSide {
    pub fn new(
        place: Place,
        mode: FallbackMode,
        is_beginning: bool,
        best: BestFallbackDurations,
        free: Arc<FreeAccessSets>,
        free_radius: HashSet<String>,
    ) -> Self {
        Self {
            place,
            mode,
            is_beginning,
            best,
            free,
            free_radius,
        }
    }

    pub async fn load(
        pool: &FallbackDurationsPool,
        mode: FallbackMode,
        is_beginning: bool,
    ) -> Result<Self, ScenarioError> {
        let best = pool.get_best_fallback_durations(mode).await?;
        let free = pool.free_access().await?;
        let free_radius = pool.wait_and_get(mode).await?.free_radius.clone();
        Ok(Self::new(
            pool.place().clone(),
            mode,
            is_beginning,
            best,
            free,
            free_radius,
        ))
    }

    pub fn place(&self) -> &Place {
        &self.place
    }

    pub fn element(&self, uri: &str) -> Option<&DurationElement> {
        self.best.durations.get(uri)
    }

    /// The mode that actually reached `uri`.
    pub fn real_mode(&self, uri: &str) -> FallbackMode {
        self.best.real_modes.get(uri).copied().unwrap_or(self.mode)
    }

    pub fn is_free(&self, uri: &str) -> bool {
        self.free.crowfly.contains(uri)
            || self.free.odt.contains(uri)
            || self.free_radius.contains(uri)
    }

    /// Index of the public transport section this side connects to.
    fn boundary(&self, journey: &Journey) -> Option<usize> {
        if self.is_beginning {
            journey.sections.iter().position(|s| !s.is_crow_fly())
        } else {
            journey.sections.iter().rposition(|s| !s.is_crow_fly())
        }
    }

    fn boundary_place<'a>(&self, section: &'a Section) -> &'a Place {
        if self.is_beginning {
            &section.origin
        } else {
            &section.destination
        }
    }

    fn boundary_datetime(&self, section: &Section) -> DateTime<Utc> {
        if self.is_beginning {
            section.begin_date_time
        } else {
            section.end_date_time
        }
    }

    /// Connect `journey` to the requested place with a crow-fly section.
    ///
    /// Nothing is added when public transport already starts (or ends) at the
    /// place. On-demand transport is rewritten to serve the place directly.
    /// Totals are left to the caller.
    pub fn add_crow_fly(&self, journey: &mut Journey) {
        let Some(index) = self.boundary(journey) else {
            return;
        };
        let pt = &journey.sections[index];
        let stop = self.boundary_place(pt).clone();
        if stop.uri == self.place.uri {
            return;
        }
        if self.free.odt.contains(&stop.uri) {
            let section = &mut journey.sections[index];
            if self.is_beginning {
                section.origin = self.place.clone();
            } else {
                section.destination = self.place.clone();
            }
            return;
        }

        let duration = self.element(&stop.uri).map_or(0, |e| e.duration);
        let delta = TimeDelta::seconds(i64::from(duration));
        let (origin, destination, begin, end) = if self.is_beginning {
            (
                self.place.clone(),
                stop.clone(),
                journey.departure_date_time - delta,
                pt.begin_date_time,
            )
        } else {
            (
                stop.clone(),
                self.place.clone(),
                pt.end_date_time,
                journey.arrival_date_time + delta,
            )
        };
        let length = origin.coord.distance_to(&destination.coord) as u32;
        let geometry = vec![origin.coord, destination.coord];
        let mut section = Section::new(SectionType::CrowFly, origin, destination, begin, end);
        // A free crow-fly is a teleport, always walked.
        section.mode = Some(if section.duration > 0 {
            self.real_mode(&stop.uri)
        } else {
            FallbackMode::Walking
        });
        section.length = length;
        section.geometry = geometry;
        journey.sections.push(section);
    }

    /// Request the street-network path replacing this side's crow-fly.
    ///
    /// Returns `None` when the crow-fly stays: the stop is the place itself,
    /// it is reached for free, or the place could not be projected.
    pub fn launch(
        &self,
        journey: &Journey,
        paths: &StreetNetworkPathPool,
        car_park_duration: u32,
    ) -> Option<PendingFallback> {
        let pt = &journey.sections[self.boundary(journey)?];
        let stop = self.boundary_place(pt).clone();
        if stop.uri == self.place.uri || self.is_free(&stop.uri) {
            return None;
        }
        let element = self.element(&stop.uri);
        if element.is_some_and(|e| e.status == RoutingStatus::Unknown) {
            debug!(stop_point = %stop.uri, "unknown projection, keeping crow-fly");
            return None;
        }

        let pt_datetime = self.boundary_datetime(pt);
        let extremity = PeriodExtremity::new(pt_datetime, !self.is_beginning);
        let path_type = if self.is_beginning {
            StreetNetworkPathType::BeginningFallback
        } else {
            StreetNetworkPathType::EndingFallback
        };
        // Ending paths run from the stop to the place.
        let request = |from_place: &Place, to_stop: &Place, mode: FallbackMode| {
            if self.is_beginning {
                paths.add_async_request(from_place, to_stop, mode, extremity, path_type)
            } else {
                paths.add_async_request(to_stop, from_place, mode, extremity, path_type)
            }
        };

        let mode = self.real_mode(&stop.uri);
        let kind = match element {
            Some(DurationElement {
                car_park: Some(car_park),
                ..
            }) if mode.uses_car_park() => FallbackKind::CarPark {
                car: request(&self.place, car_park, mode)?,
                walk: request(car_park, &stop, FallbackMode::Walking)?,
                car_park: car_park.clone(),
                duration: car_park_duration,
            },
            Some(DurationElement {
                access_point: Some(access_point),
                ..
            }) => FallbackKind::AccessPoint {
                path: request(&self.place, &Place::from_access_point(access_point), mode)?,
                access_point: access_point.clone(),
            },
            _ => FallbackKind::Street(request(&self.place, &stop, mode)?),
        };
        Some(PendingFallback {
            is_beginning: self.is_beginning,
            stop,
            pt_datetime,
            kind,
        })
    }
}

/// Connect both ends of `journey` with crow-fly sections.
pub fn add_crow_flies(journey: &mut Journey, origin: &FallbackSide, destination: &FallbackSide) {
    origin.add_crow_fly(journey);
    destination.add_crow_fly(journey);
    journey.sort_sections();
    journey.recompute_totals();
}

enum FallbackKind {
    Street(TaskFuture<PlannerResponse>),
    /// Driving to a car park, parking, then walking to the stop point.
    CarPark {
        car: TaskFuture<PlannerResponse>,
        walk: TaskFuture<PlannerResponse>,
        car_park: Place,
        duration: u32,
    },
    /// Reaching an entrance (or leaving through an exit) of the stop point.
    AccessPoint {
        path: TaskFuture<PlannerResponse>,
        access_point: AccessPoint,
    },
}

/// A fallback path requested for one end of one journey.
pub struct PendingFallback {
    is_beginning: bool,
    stop: Place,
    pt_datetime: DateTime<Utc>,
    kind: FallbackKind,
}

impl PendingFallback {
    /// Replace the journey's crow-fly with the computed path.
    ///
    /// The crow-fly is kept when the street network found no path.
    pub async fn complete(self, journey: &mut Journey) -> Result<(), ScenarioError> {
        let Some(mut sections) = self.sections().await? else {
            debug!(stop_point = %self.stop.uri, "no street-network path, keeping crow-fly");
            return Ok(());
        };

        if self.is_beginning {
            chain_before(&mut sections, self.pt_datetime);
            if let Some(last) = sections.last_mut() {
                last.destination = self.stop.clone();
            }
        } else {
            chain_after(&mut sections, self.pt_datetime);
            if let Some(first) = sections.first_mut() {
                first.origin = self.stop.clone();
            }
        }
        for section in &mut sections {
            section.id = generate_id();
        }

        let crow_fly = if self.is_beginning {
            journey.sections.first().filter(|s| s.is_crow_fly()).map(|_| 0)
        } else {
            journey
                .sections
                .last()
                .filter(|s| s.is_crow_fly())
                .map(|_| journey.sections.len() - 1)
        };
        if let Some(index) = crow_fly {
            journey.sections.remove(index);
        }
        journey.sections.extend(sections);
        journey.sort_sections();
        journey.recompute_totals();
        Ok(())
    }

    async fn sections(&self) -> Result<Option<Vec<Section>>, ScenarioError> {
        match &self.kind {
            FallbackKind::Street(path) => path_sections(path).await,
            FallbackKind::CarPark {
                car,
                walk,
                car_park,
                duration,
            } => {
                let car = path_sections(car).await?;
                let walk = path_sections(walk).await?;
                let (Some(car), Some(walk)) = (car, walk) else {
                    return Ok(None);
                };
                let park = Section::new(
                    SectionType::Park,
                    car_park.clone(),
                    car_park.clone(),
                    self.pt_datetime,
                    self.pt_datetime + TimeDelta::seconds(i64::from(*duration)),
                );
                let (first, last) = if self.is_beginning { (car, walk) } else { (walk, car) };
                Ok(Some(
                    first
                        .into_iter()
                        .chain(std::iter::once(park))
                        .chain(last)
                        .collect(),
                ))
            }
            FallbackKind::AccessPoint { path, access_point } => {
                let Some(path) = path_sections(path).await? else {
                    return Ok(None);
                };
                let traversal = self.traversal(access_point);
                Ok(Some(if self.is_beginning {
                    path.into_iter().chain(std::iter::once(traversal)).collect()
                } else {
                    std::iter::once(traversal).chain(path).collect()
                }))
            }
        }
    }

    /// Walking between an access point and its stop point.
    fn traversal(&self, access_point: &AccessPoint) -> Section {
        let entrance = Place::from_access_point(access_point);
        let (origin, destination) = if self.is_beginning {
            (entrance, self.stop.clone())
        } else {
            (self.stop.clone(), entrance)
        };
        let geometry = vec![origin.coord, destination.coord];
        let mut section = Section::new(
            SectionType::StreetNetwork,
            origin,
            destination,
            self.pt_datetime,
            self.pt_datetime + TimeDelta::seconds(i64::from(access_point.traversal_time)),
        );
        section.mode = Some(FallbackMode::Walking);
        section.length = access_point.length;
        section.geometry = geometry;
        section.vias = vec![access_point.uri.clone()];
        section
    }
}

async fn path_sections(
    future: &TaskFuture<PlannerResponse>,
) -> Result<Option<Vec<Section>>, ScenarioError> {
    let response = future.wait_and_get().await?;
    Ok(response
        .journeys
        .first()
        .filter(|j| !j.sections.is_empty())
        .map(|j| j.sections.clone()))
}

/// Lay `sections` end to end, the last one ending at `end`.
fn chain_before(sections: &mut [Section], end: DateTime<Utc>) {
    let mut cursor = end;
    for section in sections.iter_mut().rev() {
        section.shift(cursor - section.end_date_time);
        cursor = section.begin_date_time;
    }
}

/// Lay `sections` end to end, the first one starting at `begin`.
fn chain_after(sections: &mut [Section], begin: DateTime<Utc>) {
    let mut cursor = begin;
    for section in sections.iter_mut() {
        section.shift(cursor - section.begin_date_time);
        cursor = section.end_date_time;
    }
}

/// Flag journeys driving through a low-emission zone.
///
/// Only journeys with a car fallback are flagged, and only when the street
/// network annotated at least one section.
pub fn tag_low_emission_zone(
    journey: &mut Journey,
    dep_mode: FallbackMode,
    arr_mode: FallbackMode,
) {
    if !dep_mode.is_car() && !arr_mode.is_car() {
        return;
    }
    let mut annotated = journey
        .sections
        .iter()
        .filter_map(|s| s.low_emission_zone_on_path)
        .peekable();
    if annotated.peek().is_none() {
        return;
    }
    journey.low_emission_zone = Some(annotated.any(|on_path| on_path));
}
