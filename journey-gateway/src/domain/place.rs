//! Places: origins, destinations and the stop points in between.

use serde::{Deserialize, Serialize};

const DEG_TO_RAD: f64 = 0.017_453_292_38;
const EARTH_RADIUS_IN_METERS: f64 = 6_372_797.560_856;

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// A coordinate of (0, 0) means the place could not be located.
    pub fn is_valid(&self) -> bool {
        self.lon != 0.0 && self.lat != 0.0
    }

    /// Great-circle distance in meters.
    pub fn distance_to(&self, other: &Coord) -> f64 {
        let lon_h = ((self.lon - other.lon) * DEG_TO_RAD * 0.5).sin().powi(2);
        let lat_h = ((self.lat - other.lat) * DEG_TO_RAD * 0.5).sin().powi(2);
        let tmp = (self.lat * DEG_TO_RAD).cos() * (other.lat * DEG_TO_RAD).cos();
        EARTH_RADIUS_IN_METERS * 2.0 * (lat_h + tmp * lon_h).sqrt().asin()
    }
}

/// A named entrance or exit of a stop point or of a POI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    pub coord: Coord,
    /// Seconds needed to go from the access point to the platform (or back).
    #[serde(default)]
    pub traversal_time: u32,
    /// Meters between the access point and the platform.
    #[serde(default)]
    pub length: u32,
    #[serde(default = "default_true")]
    pub is_entrance: bool,
    #[serde(default = "default_true")]
    pub is_exit: bool,
}

fn default_true() -> bool {
    true
}

/// What kind of object a place is, with the details each kind carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "embedded_type", rename_all = "snake_case")]
pub enum PlaceKind {
    StopPoint {
        #[serde(default)]
        stop_area: Option<String>,
        #[serde(default)]
        access_points: Vec<AccessPoint>,
    },
    StopArea,
    Poi {
        #[serde(default)]
        poi_type: Option<String>,
        /// Sub-places evaluated independently when computing fallback durations.
        #[serde(default)]
        children: Vec<Place>,
        #[serde(default)]
        access_points: Vec<AccessPoint>,
    },
    Address,
    AdministrativeRegion,
    AccessPoint,
    Coord,
}

/// An origin, a destination, or any object the street network can route to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub uri: String,
    #[serde(default)]
    pub name: String,
    pub coord: Coord,
    #[serde(flatten)]
    pub kind: PlaceKind,
}

impl Place {
    pub fn new(uri: impl Into<String>, coord: Coord, kind: PlaceKind) -> Self {
        let uri = uri.into();
        Self {
            name: uri.clone(),
            uri,
            coord,
            kind,
        }
    }

    pub fn stop_point(uri: impl Into<String>, coord: Coord) -> Self {
        Self::new(
            uri,
            coord,
            PlaceKind::StopPoint {
                stop_area: None,
                access_points: Vec::new(),
            },
        )
    }

    pub fn address(uri: impl Into<String>, coord: Coord) -> Self {
        Self::new(uri, coord, PlaceKind::Address)
    }

    pub fn from_access_point(access_point: &AccessPoint) -> Self {
        Self {
            uri: access_point.uri.clone(),
            name: access_point.name.clone(),
            coord: access_point.coord,
            kind: PlaceKind::AccessPoint,
        }
    }

    pub fn is_stop_point(&self) -> bool {
        matches!(self.kind, PlaceKind::StopPoint { .. })
    }

    /// Access points of a stop point usable in the given direction.
    ///
    /// `entering` selects entrances (going from the street to the platform),
    /// otherwise exits.
    pub fn stop_point_access_points(&self, entering: bool) -> Vec<&AccessPoint> {
        match &self.kind {
            PlaceKind::StopPoint { access_points, .. } => access_points
                .iter()
                .filter(|ap| if entering { ap.is_entrance } else { ap.is_exit })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Places from which fallback durations are computed.
    ///
    /// With POI access points enabled, a POI with children is split into its
    /// children, each evaluated as an independent center.
    pub fn duration_centers(&self, poi_access_points: bool) -> Vec<Place> {
        match &self.kind {
            PlaceKind::Poi { children, .. } if poi_access_points && !children.is_empty() => {
                children.clone()
            }
            _ => vec![self.clone()],
        }
    }

    /// Candidate endpoints for a street-network path touching this place.
    ///
    /// `leaving` selects the POI's exits (the place is the path's origin),
    /// otherwise its entrances.
    pub fn path_candidates(&self, poi_access_points: bool, leaving: bool) -> Vec<Place> {
        if let PlaceKind::Poi { access_points, .. } = &self.kind
            && poi_access_points
        {
            let candidates: Vec<Place> = access_points
                .iter()
                .filter(|ap| if leaving { ap.is_exit } else { ap.is_entrance })
                .map(Place::from_access_point)
                .collect();
            if !candidates.is_empty() {
                return candidates;
            }
        }
        vec![self.clone()]
    }
}
