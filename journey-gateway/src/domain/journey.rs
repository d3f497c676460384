//! Journey types.
//!
//! A `Journey` is a sequence of sections from the requested origin to the
//! requested destination: public transport legs, transfers, waits and the
//! street-network (or crow-fly) fallbacks at both ends.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::mode::FallbackMode;
use super::place::{Coord, Place};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate an identifier unique within this process.
pub fn generate_id() -> String {
    format!("{:08x}", NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Tag set by journey filtering on journeys that must not be completed.
pub const TO_DELETE_TAG: &str = "to_delete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    PublicTransport,
    StreetNetwork,
    /// Straight-line placeholder, or a free "teleport" when its duration is 0.
    CrowFly,
    Transfer,
    Waiting,
    Park,
    OnDemandTransport,
}

/// One part of a journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub section_type: SectionType,
    pub origin: Place,
    pub destination: Place,
    pub begin_date_time: DateTime<Utc>,
    pub end_date_time: DateTime<Utc>,
    /// Seconds.
    pub duration: u32,
    /// Meters.
    #[serde(default)]
    pub length: u32,
    /// Street-network mode, for street-network and crow-fly sections.
    #[serde(default)]
    pub mode: Option<FallbackMode>,
    /// e.g. `physical_mode:Metro`, for public transport sections.
    #[serde(default)]
    pub physical_mode: Option<String>,
    #[serde(default)]
    pub geometry: Vec<Coord>,
    /// Whether the path crosses a low-emission zone, when the provider knows.
    #[serde(default)]
    pub low_emission_zone_on_path: Option<bool>,
    /// Access points the section goes through.
    #[serde(default)]
    pub vias: Vec<String>,
}

impl Section {
    pub fn new(
        section_type: SectionType,
        origin: Place,
        destination: Place,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        let duration = (end - begin).num_seconds().max(0) as u32;
        Self {
            id: generate_id(),
            section_type,
            origin,
            destination,
            begin_date_time: begin,
            end_date_time: end,
            duration,
            length: 0,
            mode: None,
            physical_mode: None,
            geometry: Vec::new(),
            low_emission_zone_on_path: None,
            vias: Vec::new(),
        }
    }

    pub fn is_crow_fly(&self) -> bool {
        self.section_type == SectionType::CrowFly
    }

    pub fn shift(&mut self, delta: TimeDelta) {
        self.begin_date_time += delta;
        self.end_date_time += delta;
    }
}

/// Seconds spent per mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Durations {
    pub total: u32,
    pub walking: u32,
    pub bike: u32,
    pub car: u32,
    pub ridesharing: u32,
    pub taxi: u32,
}

impl Durations {
    pub fn add(&mut self, mode: FallbackMode, seconds: u32) {
        match mode {
            FallbackMode::Walking => self.walking += seconds,
            FallbackMode::Bike | FallbackMode::Bss => self.bike += seconds,
            FallbackMode::Car | FallbackMode::CarNoPark => self.car += seconds,
            FallbackMode::Ridesharing => self.ridesharing += seconds,
            FallbackMode::Taxi => self.taxi += seconds,
        }
    }
}

/// Meters travelled per mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distances {
    pub walking: u32,
    pub bike: u32,
    pub car: u32,
    pub ridesharing: u32,
    pub taxi: u32,
}

impl Distances {
    pub fn add(&mut self, mode: FallbackMode, meters: u32) {
        match mode {
            FallbackMode::Walking => self.walking += meters,
            FallbackMode::Bike | FallbackMode::Bss => self.bike += meters,
            FallbackMode::Car | FallbackMode::CarNoPark => self.car += meters,
            FallbackMode::Ridesharing => self.ridesharing += meters,
            FallbackMode::Taxi => self.taxi += meters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub value: f64,
    pub currency: String,
}

/// Fare attached to a journey once fares are completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fare {
    pub found: bool,
    #[serde(default)]
    pub total: Option<Cost>,
    #[serde(default)]
    pub ticket_ids: Vec<String>,
}

/// A complete or partial trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Journey {
    /// Identifier used to re-attach fallback, transfer and fare data.
    #[serde(default)]
    pub internal_id: Option<String>,
    pub departure_date_time: DateTime<Utc>,
    pub arrival_date_time: DateTime<Utc>,
    /// Seconds.
    pub duration: u32,
    #[serde(default)]
    pub durations: Durations,
    #[serde(default)]
    pub distances: Distances,
    pub sections: Vec<Section>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub low_emission_zone: Option<bool>,
    #[serde(default)]
    pub fare: Option<Fare>,
}

impl Journey {
    /// Build a journey spanning the given sections.
    pub fn from_sections(sections: Vec<Section>) -> Option<Self> {
        let departure = sections.first()?.begin_date_time;
        let arrival = sections.last()?.end_date_time;
        let mut journey = Self {
            internal_id: None,
            departure_date_time: departure,
            arrival_date_time: arrival,
            duration: 0,
            durations: Durations::default(),
            distances: Distances::default(),
            sections,
            tags: Vec::new(),
            low_emission_zone: None,
            fare: None,
        };
        journey.recompute_totals();
        Some(journey)
    }

    pub fn is_tagged(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// First section that is not a crow-fly.
    pub fn first_non_crow_fly(&self) -> Option<&Section> {
        self.sections.iter().find(|s| !s.is_crow_fly())
    }

    /// Last section that is not a crow-fly.
    pub fn last_non_crow_fly(&self) -> Option<&Section> {
        self.sections.iter().rev().find(|s| !s.is_crow_fly())
    }

    /// Sort sections chronologically.
    ///
    /// A zero-length section sorts before a section starting at the same time,
    /// so a free crow-fly at the origin stays first.
    pub fn sort_sections(&mut self) {
        self.sections
            .sort_by_key(|s| (s.begin_date_time, s.end_date_time));
    }

    /// Recompute bounds, duration and per-mode durations/distances from the sections.
    pub fn recompute_totals(&mut self) {
        if let (Some(first), Some(last)) = (self.sections.first(), self.sections.last()) {
            self.departure_date_time = first.begin_date_time;
            self.arrival_date_time = last.end_date_time;
        }
        self.duration = (self.arrival_date_time - self.departure_date_time)
            .num_seconds()
            .max(0) as u32;

        let mut durations = Durations {
            total: self.duration,
            ..Durations::default()
        };
        let mut distances = Distances::default();
        for section in &self.sections {
            let Some(mode) = section.mode else { continue };
            match section.section_type {
                SectionType::StreetNetwork | SectionType::CrowFly => {
                    durations.add(mode, section.duration);
                    distances.add(mode, section.length);
                }
                SectionType::Transfer => {
                    durations.add(FallbackMode::Walking, section.duration);
                    distances.add(FallbackMode::Walking, section.length);
                }
                _ => {}
            }
        }
        self.durations = durations;
        self.distances = distances;
    }

    /// Distinct street-network modes used by the journey's fallback sections.
    pub fn street_network_modes(&self) -> Vec<FallbackMode> {
        let mut modes: Vec<FallbackMode> = self
            .sections
            .iter()
            .filter(|s| {
                matches!(
                    s.section_type,
                    SectionType::StreetNetwork | SectionType::CrowFly
                ) && s.duration > 0
            })
            .filter_map(|s| s.mode)
            .collect();
        modes.sort();
        modes.dedup();
        modes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn place(uri: &str) -> Place {
        Place::stop_point(uri, Coord::new(2.0, 48.0))
    }

    fn section(kind: SectionType, begin: i64, end: i64) -> Section {
        Section::new(kind, place("a"), place("b"), at(begin), at(end))
    }

    #[test]
    fn section_duration_from_bounds() {
        let s = section(SectionType::PublicTransport, 0, 600);
        assert_eq!(s.duration, 600);
        assert!(!s.id.is_empty());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn sorting_keeps_free_crow_fly_first() {
        let pt = section(SectionType::PublicTransport, 100, 700);
        let free = section(SectionType::CrowFly, 100, 100);
        let walk_out = section(SectionType::StreetNetwork, 700, 900);
        let mut journey = Journey::from_sections(vec![pt, walk_out, free]).unwrap();
        journey.sort_sections();
        assert_eq!(journey.sections[0].section_type, SectionType::CrowFly);
        assert_eq!(journey.sections[2].section_type, SectionType::StreetNetwork);
    }

    #[test]
    fn totals_follow_sections() {
        let mut walk_in = section(SectionType::StreetNetwork, 0, 120);
        walk_in.mode = Some(FallbackMode::Walking);
        walk_in.length = 150;
        let pt = section(SectionType::PublicTransport, 120, 720);
        let mut bike_out = section(SectionType::CrowFly, 720, 900);
        bike_out.mode = Some(FallbackMode::Bike);
        bike_out.length = 600;

        let journey = Journey::from_sections(vec![walk_in, pt, bike_out]).unwrap();
        assert_eq!(journey.duration, 900);
        assert_eq!(journey.durations.total, 900);
        assert_eq!(journey.durations.walking, 120);
        assert_eq!(journey.durations.bike, 180);
        assert_eq!(journey.distances.walking, 150);
        assert_eq!(journey.distances.bike, 600);
        assert_eq!(
            journey.street_network_modes(),
            vec![FallbackMode::Walking, FallbackMode::Bike]
        );
    }

    #[test]
    fn first_and_last_non_crow_fly() {
        let crow = section(SectionType::CrowFly, 0, 60);
        let pt = section(SectionType::PublicTransport, 60, 600);
        let journey = Journey::from_sections(vec![crow, pt]).unwrap();
        assert_eq!(
            journey.first_non_crow_fly().unwrap().section_type,
            SectionType::PublicTransport
        );
        assert_eq!(
            journey.last_non_crow_fly().unwrap().section_type,
            SectionType::PublicTransport
        );
    }

    #[test]
    fn empty_sections_make_no_journey() {
        assert!(Journey::from_sections(Vec::new()).is_none());
    }
}
