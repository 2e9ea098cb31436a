// src/services/geo.rs
use crate::models::Location;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance metric between two locations, in kilometres.
///
/// Implementations must return a non-negative value. Symmetry is expected but
/// callers do not rely on it: the matcher always measures from the vehicle to
/// the pickup point.
pub trait DistanceProvider: Send + Sync {
    fn distance_km(&self, from: &Location, to: &Location) -> f64;
}

/// Great-circle distance on a spherical earth.
#[derive(Debug, Default, Clone, Copy)]
pub struct HaversineDistance;

impl DistanceProvider for HaversineDistance {
    fn distance_km(&self, from: &Location, to: &Location) -> f64 {
        let lat1_rad = from.latitude.to_radians();
        let lat2_rad = to.latitude.to_radians();
        let delta_lat = (to.latitude - from.latitude).to_radians();
        let delta_lon = (to.longitude - from.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_KM * c
    }
}
