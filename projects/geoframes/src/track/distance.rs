use super::{GeoFix, Track};

/// Sphere radius used for all distances (WGS84 equatorial radius).
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance in kilometers between two (lat, lon) points in degrees.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c / 1000.0
}

pub fn fix_distance_km(a: &GeoFix, b: &GeoFix) -> f64 {
    distance_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Distance of the segment ending at each fix. Entry 0 is always 0.
///
/// Tracks carrying an odometer use its deltas; all others use haversine.
pub fn segment_distances(track: &Track) -> Vec<f64> {
    let n = track.len();
    let mut out = vec![0.0; n];
    match track.odometer_km() {
        Some(odo) => {
            for i in 1..n {
                out[i] = odo[i] - odo[i - 1];
            }
        }
        None => {
            let fixes = track.fixes();
            for i in 1..n {
                out[i] = fix_distance_km(&fixes[i - 1], &fixes[i]);
            }
        }
    }
    out
}

pub fn total_distance_km(track: &Track) -> f64 {
    segment_distances(track).iter().sum()
}
