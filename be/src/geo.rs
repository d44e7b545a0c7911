use serde::{Deserialize, Serialize};

// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 point. Wire formats that carry `[lat, lng]` pairs are converted
/// into this at the edges; nothing inside the animator sees bare arrays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn from_pair(pair: [f64; 2]) -> Self {
        Self {
            lat: pair[0],
            lng: pair[1],
        }
    }

    pub fn to_pair(self) -> [f64; 2] {
        [self.lat, self.lng]
    }

    /// Finite and within [-90, 90] / [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// Great-circle distance in meters. `None` when either point is malformed.
pub fn haversine_m(from: LatLng, to: LatLng) -> Option<f64> {
    if !from.is_valid() || !to.is_valid() {
        return None;
    }
    let dlat = (to.lat - from.lat).to_radians();
    let dlon = (to.lng - from.lng).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();
    let d = EARTH_RADIUS_M * c;
    d.is_finite().then_some(d)
}

/// Seconds needed to cover `distance_m` at a constant `speed_kmh`.
pub fn travel_time_s(distance_m: f64, speed_kmh: f64) -> Option<f64> {
    if !(speed_kmh > 0.0) || !distance_m.is_finite() {
        return None;
    }
    Some(distance_m / (speed_kmh / 3.6))
}
