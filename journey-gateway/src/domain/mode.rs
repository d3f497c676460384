//! Fallback modes used to reach or leave the public transport network.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an unknown fallback mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown fallback mode: {0}")]
pub struct InvalidFallbackMode(pub String);

/// A street-network mode used for the first/last mile of a journey,
/// or for a direct path without public transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackMode {
    Walking,
    Bike,
    /// Bike-share: rent a bike at a station, return it at another one.
    Bss,
    /// Drive to a car park, then walk to the stop point.
    Car,
    /// Drive (or be dropped off) directly at the stop point.
    CarNoPark,
    Ridesharing,
    Taxi,
}

impl FallbackMode {
    pub const ALL: [FallbackMode; 7] = [
        FallbackMode::Walking,
        FallbackMode::Bike,
        FallbackMode::Bss,
        FallbackMode::Car,
        FallbackMode::CarNoPark,
        FallbackMode::Ridesharing,
        FallbackMode::Taxi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackMode::Walking => "walking",
            FallbackMode::Bike => "bike",
            FallbackMode::Bss => "bss",
            FallbackMode::Car => "car",
            FallbackMode::CarNoPark => "car_no_park",
            FallbackMode::Ridesharing => "ridesharing",
            FallbackMode::Taxi => "taxi",
        }
    }

    /// Scheduling weight of a mode when computing public transport journeys.
    ///
    /// Fallback durations for walking are much cheaper to obtain than for
    /// bike, which are cheaper than bike-share, which are cheaper than any
    /// driven mode. Pairs with a lower total weight are started first.
    pub fn scheduling_weight(&self) -> u32 {
        match self {
            FallbackMode::Walking => 1,
            FallbackMode::Bike => 100,
            FallbackMode::Bss => 500,
            FallbackMode::Car
            | FallbackMode::CarNoPark
            | FallbackMode::Ridesharing
            | FallbackMode::Taxi => 1000,
        }
    }

    /// Whether fallbacks with this mode go through a car park.
    pub fn uses_car_park(&self) -> bool {
        matches!(self, FallbackMode::Car)
    }

    /// Whether this mode drives a car for at least part of the fallback.
    pub fn is_car(&self) -> bool {
        matches!(self, FallbackMode::Car | FallbackMode::CarNoPark)
    }

    /// Modes whose fallback durations may replace this mode's durations when
    /// they are strictly better, restricted to the modes actually requested.
    ///
    /// A car fallback can always be replaced by a drop-off at the stop point,
    /// and the passenger of a taxi or a shared ride can simply walk.
    pub fn overriding_modes(&self, requested: &[FallbackMode]) -> Vec<FallbackMode> {
        let candidates: &[FallbackMode] = match self {
            FallbackMode::Car => &[FallbackMode::CarNoPark],
            FallbackMode::Taxi | FallbackMode::Ridesharing => &[FallbackMode::Walking],
            _ => &[],
        };
        candidates
            .iter()
            .filter(|m| requested.contains(m))
            .copied()
            .collect()
    }
}

impl fmt::Display for FallbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackMode {
    type Err = InvalidFallbackMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FallbackMode::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| InvalidFallbackMode(s.to_string()))
    }
}
