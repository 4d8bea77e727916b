//! Great-circle geometry for bot/POI proximity.
//!
//! Coordinates are signed decimal degrees. `distance_km` does not validate its
//! input: out-of-range values produce meaningless distances (or NaN), not errors.
//! Use `Coordinate::checked` where validation is wanted.

use serde::{Deserialize, Serialize};

use crate::error::TravelError;

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a coordinate, rejecting NaN and out-of-range values.
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self, TravelError> {
        let valid = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
        if valid {
            Ok(Self::new(latitude, longitude))
        } else {
            Err(TravelError::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }
}

/// Haversine distance between two points, in kilometers.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + a.latitude.to_radians().cos()
            * b.latitude.to_radians().cos()
            * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Whether a distance (km) falls inside a radius given in meters.
/// Strict: a point exactly on the boundary is outside.
pub fn within_radius(distance_km: f64, radius_meters: f64) -> bool {
    distance_km < radius_meters / 1000.0
}
