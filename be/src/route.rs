use serde::{Deserialize, Serialize};

use crate::geo::LatLng;

/// A stop as served to the dashboard. `sequence` is 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    pub sequence: u32,
}

impl StopRecord {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// One direction of one route: the shape to animate along and the stops it serves.
/// `coordinates` are `[latitude, longitude]` pairs, not GeoJSON order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePath {
    pub route_id: String,
    pub direction: u32,
    pub coordinates: Vec<[f64; 2]>,
    pub stops: Vec<StopRecord>,
}

impl RoutePath {
    pub fn polyline(&self) -> Vec<LatLng> {
        self.coordinates.iter().copied().map(LatLng::from_pair).collect()
    }
}
