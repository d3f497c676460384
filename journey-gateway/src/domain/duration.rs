//! Access/egress durations between a requested place and stop points.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::mode::FallbackMode;
use super::place::{AccessPoint, Place};

/// Outcome of routing one cell of a street-network matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStatus {
    Reached,
    Unreached,
    /// The place could not be projected on the street network.
    Unknown,
}

/// Best known fallback cost to one stop point for one mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationElement {
    /// Seconds.
    pub duration: u32,
    pub status: RoutingStatus,
    /// Car park the fallback goes through (car mode only).
    #[serde(default)]
    pub car_park: Option<Place>,
    /// Walking seconds between the car park and the stop point.
    #[serde(default)]
    pub car_park_crowfly_duration: Option<u32>,
    /// Entrance/exit of the stop point the fallback goes through.
    #[serde(default)]
    pub access_point: Option<AccessPoint>,
    /// Uri of the sub-place of the requested place the fallback starts from.
    #[serde(default)]
    pub via: Option<String>,
}

impl DurationElement {
    pub fn new(duration: u32, status: RoutingStatus) -> Self {
        Self {
            duration,
            status,
            car_park: None,
            car_park_crowfly_duration: None,
            access_point: None,
            via: None,
        }
    }

    /// Zero-cost access to a stop point.
    pub fn free() -> Self {
        Self::new(0, RoutingStatus::Reached)
    }
}

/// Stop point uri → best fallback duration.
pub type FallbackDurations = HashMap<String, DurationElement>;

/// Keep `candidate` for `uri` only if it beats what is already known.
///
/// Returns whether the map was updated. Ties keep the existing element.
pub fn keep_min(durations: &mut FallbackDurations, uri: &str, candidate: DurationElement) -> bool {
    match durations.get(uri) {
        Some(current) if current.duration <= candidate.duration => false,
        _ => {
            durations.insert(uri.to_string(), candidate);
            true
        }
    }
}

/// Manhattan estimate of a fallback: `distance * sqrt(2) / speed`.
pub fn manhattan_duration(distance_meters: f64, speed_meters_per_second: f64) -> u32 {
    if speed_meters_per_second <= 0.0 {
        return u32::MAX;
    }
    (distance_meters * std::f64::consts::SQRT_2 / speed_meters_per_second) as u32
}

/// Best fallback durations for one main mode, after overriding modes were applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestFallbackDurations {
    pub durations: FallbackDurations,
    /// Stop points whose best duration was obtained with another mode.
    pub real_modes: HashMap<String, FallbackMode>,
}
