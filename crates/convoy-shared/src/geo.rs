use serde::{Deserialize, Serialize};

use crate::constants::EARTH_RADIUS_KM;
use crate::error::DecodeError;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build a point, rejecting non-finite or out-of-range coordinates.
    pub fn checked(lat: f64, lng: f64) -> Result<Self, DecodeError> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        if !valid {
            return Err(DecodeError::InvalidCoordinate { lat, lng });
        }
        Ok(Self { lat, lng })
    }

    /// Great-circle distance to `other`, in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }
}

/// Haversine great-circle distance between two points, in kilometres.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Axis-aligned box used to frame several points at once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south_west: GeoPoint,
    pub north_east: GeoPoint,
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty input.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a GeoPoint>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bbox = Self {
            south_west: *first,
            north_east: *first,
        };
        for p in iter {
            bbox.south_west.lat = bbox.south_west.lat.min(p.lat);
            bbox.south_west.lng = bbox.south_west.lng.min(p.lng);
            bbox.north_east.lat = bbox.north_east.lat.max(p.lat);
            bbox.north_east.lng = bbox.north_east.lng.max(p.lng);
        }
        Some(bbox)
    }

    pub fn contains(&self, p: &GeoPoint) -> bool {
        (self.south_west.lat..=self.north_east.lat).contains(&p.lat)
            && (self.south_west.lng..=self.north_east.lng).contains(&p.lng)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.south_west.lat + self.north_east.lat) / 2.0,
            (self.south_west.lng + self.north_east.lng) / 2.0,
        )
    }
}
