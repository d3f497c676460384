//! Journey requests as consumed by the orchestrator.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{FallbackMode, generate_id};

/// Default bound on a fallback duration, in seconds.
pub const DEFAULT_MAX_DURATION_TO_PT: u32 = 30 * 60;

/// Default maximum number of candidate stop points per crow-fly search.
pub const DEFAULT_MAX_NB_CROWFLY: u32 = 5000;

/// Speeds in meters per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Speeds {
    pub walking: f64,
    pub bike: f64,
    pub bss: f64,
    pub car: f64,
    pub car_no_park: f64,
    pub ridesharing: f64,
    pub taxi: f64,
}

impl Speeds {
    pub fn for_mode(&self, mode: FallbackMode) -> f64 {
        match mode {
            FallbackMode::Walking => self.walking,
            FallbackMode::Bike => self.bike,
            FallbackMode::Bss => self.bss,
            FallbackMode::Car => self.car,
            FallbackMode::CarNoPark => self.car_no_park,
            FallbackMode::Ridesharing => self.ridesharing,
            FallbackMode::Taxi => self.taxi,
        }
    }
}

impl Default for Speeds {
    fn default() -> Self {
        Self {
            walking: 1.12,
            bike: 4.1,
            bss: 4.1,
            car: 11.11,
            car_no_park: 11.11,
            ridesharing: 6.94,
            taxi: 11.11,
        }
    }
}

/// Whether direct paths (without public transport) are wanted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectPathPolicy {
    #[default]
    Indifferent,
    None,
    Only,
    OnlyWithAlternatives,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeLevel {
    #[default]
    BaseSchedule,
    AdaptedSchedule,
    Realtime,
}

/// What the public transport planner is asked to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Journeys,
    /// Reachable stop points from one side only.
    Isochrone,
    /// Reachability polygons from one side only.
    GraphicalIsochrone,
}

/// A datetime and whether it is the start of the period it bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodExtremity {
    pub datetime: DateTime<Utc>,
    pub represents_start: bool,
}

impl PeriodExtremity {
    pub fn new(datetime: DateTime<Utc>, represents_start: bool) -> Self {
        Self {
            datetime,
            represents_start,
        }
    }
}

/// One (departure mode, arrival mode) combination to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeCall {
    pub dep_mode: FallbackMode,
    pub arr_mode: FallbackMode,
    /// Only a direct path is wanted for this combination, no public transport.
    pub direct_path_only: bool,
}

impl ModeCall {
    pub fn new(dep_mode: FallbackMode, arr_mode: FallbackMode) -> Self {
        Self {
            dep_mode,
            arr_mode,
            direct_path_only: false,
        }
    }

    /// Lower runs first.
    pub fn priority(&self) -> u32 {
        self.dep_mode.scheduling_weight() + self.arr_mode.scheduling_weight()
    }
}

/// Defaults applied to every request, from the gateway configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub speeds: Speeds,
    pub max_duration_to_pt: u32,
    pub car_park_duration: u32,
    pub bss_rent_duration: u32,
    pub bss_return_duration: u32,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            speeds: Speeds::default(),
            max_duration_to_pt: DEFAULT_MAX_DURATION_TO_PT,
            car_park_duration: 300,
            bss_rent_duration: 120,
            bss_return_duration: 60,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_duration() -> u32 {
    86_400
}

fn default_max_transfers() -> u32 {
    10
}

fn default_walking_transfer_penalty() -> u32 {
    120
}

fn default_modes() -> Vec<FallbackMode> {
    vec![FallbackMode::Walking]
}

fn default_pt_planner() -> String {
    "kraken".to_string()
}

/// A point-to-point journey (or isochrone) request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneyRequest {
    #[serde(default = "generate_id")]
    pub request_id: String,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    pub datetime: DateTime<Utc>,
    /// `true`: depart after `datetime`; `false`: arrive before it.
    #[serde(default = "default_true")]
    pub clockwise: bool,
    /// Maximum time spent in public transport; 0 disables public transport.
    #[serde(default = "default_max_duration")]
    pub max_duration: u32,
    /// Lower bound for graphical isochrones.
    #[serde(default)]
    pub min_duration: u32,
    /// `max_{mode}_duration_to_pt`, per mode.
    #[serde(default)]
    pub max_duration_to_pt: HashMap<FallbackMode, u32>,
    #[serde(default = "default_modes")]
    pub origin_mode: Vec<FallbackMode>,
    #[serde(default = "default_modes")]
    pub destination_mode: Vec<FallbackMode>,
    #[serde(default)]
    pub direct_path: DirectPathPolicy,
    /// Extra modes for which a direct path is wanted.
    #[serde(default)]
    pub direct_path_mode: Vec<FallbackMode>,
    #[serde(default = "default_max_transfers")]
    pub max_transfers: u32,
    #[serde(default)]
    pub wheelchair: bool,
    #[serde(default)]
    pub realtime_level: RealtimeLevel,
    #[serde(default)]
    pub max_extra_second_pass: u32,
    #[serde(default = "default_walking_transfer_penalty")]
    pub walking_transfer_penalty: u32,
    #[serde(default, rename = "forbidden_uris[]")]
    pub forbidden_uris: Vec<String>,
    #[serde(default, rename = "allowed_id[]")]
    pub allowed_ids: Vec<String>,
    #[serde(default = "default_pt_planner", rename = "_pt_planner")]
    pub pt_planner: String,
    #[serde(default, rename = "_transfer_path")]
    pub transfer_path: bool,
    #[serde(default, rename = "_loki_compute_pt_journey_fare")]
    pub compute_pt_journey_fare: bool,
    #[serde(default, rename = "_access_points")]
    pub access_points: bool,
    #[serde(default, rename = "_poi_access_points")]
    pub poi_access_points: bool,
    /// Stop points within this many meters of the origin are reached for free.
    #[serde(default)]
    pub free_radius_from: u32,
    /// Stop points within this many meters of the destination are reached for free.
    #[serde(default)]
    pub free_radius_to: u32,
    #[serde(default)]
    pub speeds: Option<Speeds>,
    #[serde(default)]
    pub bss_rent_duration: Option<u32>,
    #[serde(default)]
    pub bss_return_duration: Option<u32>,
    #[serde(default)]
    pub car_park_duration: Option<u32>,
    /// Restrict car parks to park-and-ride ones.
    #[serde(default)]
    pub park_and_ride_only: bool,
    #[serde(default)]
    pub max_nb_crowfly_by_mode: HashMap<FallbackMode, u32>,
}

impl JourneyRequest {
    /// A request with every optional parameter left at its default.
    pub fn new(
        origin: impl Into<String>,
        destination: impl Into<String>,
        datetime: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: generate_id(),
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            datetime,
            clockwise: true,
            max_duration: default_max_duration(),
            min_duration: 0,
            max_duration_to_pt: HashMap::new(),
            origin_mode: default_modes(),
            destination_mode: default_modes(),
            direct_path: DirectPathPolicy::default(),
            direct_path_mode: Vec::new(),
            max_transfers: default_max_transfers(),
            wheelchair: false,
            realtime_level: RealtimeLevel::default(),
            max_extra_second_pass: 0,
            walking_transfer_penalty: default_walking_transfer_penalty(),
            forbidden_uris: Vec::new(),
            allowed_ids: Vec::new(),
            pt_planner: default_pt_planner(),
            transfer_path: false,
            compute_pt_journey_fare: false,
            access_points: false,
            poi_access_points: false,
            free_radius_from: 0,
            free_radius_to: 0,
            speeds: None,
            bss_rent_duration: None,
            bss_return_duration: None,
            car_park_duration: None,
            park_and_ride_only: false,
            max_nb_crowfly_by_mode: HashMap::new(),
        }
    }

    /// Fill every parameter left unset by the caller.
    pub fn apply_defaults(&mut self, defaults: &RequestDefaults) {
        if self.speeds.is_none() {
            self.speeds = Some(defaults.speeds.clone());
        }
        for mode in FallbackMode::ALL {
            self.max_duration_to_pt
                .entry(mode)
                .or_insert(defaults.max_duration_to_pt);
        }
        self.bss_rent_duration.get_or_insert(defaults.bss_rent_duration);
        self.bss_return_duration
            .get_or_insert(defaults.bss_return_duration);
        self.car_park_duration.get_or_insert(defaults.car_park_duration);
    }

    pub fn speed(&self, mode: FallbackMode) -> f64 {
        match &self.speeds {
            Some(speeds) => speeds.for_mode(mode),
            None => Speeds::default().for_mode(mode),
        }
    }

    pub fn speeds(&self) -> Speeds {
        self.speeds.clone().unwrap_or_default()
    }

    pub fn max_duration_to_pt(&self, mode: FallbackMode) -> u32 {
        self.max_duration_to_pt
            .get(&mode)
            .copied()
            .unwrap_or(DEFAULT_MAX_DURATION_TO_PT)
    }

    pub fn max_nb_crowfly(&self, mode: FallbackMode) -> u32 {
        self.max_nb_crowfly_by_mode
            .get(&mode)
            .copied()
            .unwrap_or(DEFAULT_MAX_NB_CROWFLY)
    }

    pub fn car_park_duration(&self) -> u32 {
        self.car_park_duration.unwrap_or(300)
    }

    /// Time lost renting and returning a shared bike.
    pub fn bss_overhead(&self) -> u32 {
        self.bss_rent_duration.unwrap_or(120) + self.bss_return_duration.unwrap_or(60)
    }

    pub fn period_extremity(&self) -> PeriodExtremity {
        PeriodExtremity::new(self.datetime, self.clockwise)
    }

    pub fn wants_direct_path_only(&self) -> bool {
        self.direct_path == DirectPathPolicy::Only || self.max_duration == 0
    }

    /// The mode combinations to compute for this request.
    pub fn mode_calls(&self) -> Vec<ModeCall> {
        if self.direct_path == DirectPathPolicy::Only {
            let mut modes = self.origin_mode.clone();
            modes.extend(self.direct_path_mode.iter().copied());
            modes.sort();
            modes.dedup();
            return modes
                .into_iter()
                .map(|m| ModeCall {
                    dep_mode: m,
                    arr_mode: m,
                    direct_path_only: true,
                })
                .collect();
        }

        let mut calls = Vec::new();
        for &dep in &self.origin_mode {
            for &arr in &self.destination_mode {
                calls.push(ModeCall::new(dep, arr));
            }
        }
        for &mode in &self.direct_path_mode {
            if !self.origin_mode.contains(&mode) {
                calls.push(ModeCall {
                    dep_mode: mode,
                    arr_mode: mode,
                    direct_path_only: true,
                });
            }
        }
        calls
    }
}
