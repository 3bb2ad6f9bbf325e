//! # Geographic Utilities
//!
//! Pure geographic math for the nearby-report pipeline: great-circle
//! distance, radius-to-bounding-box conversion, and the web-mercator
//! projection used for heatmap feature coordinates.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance_km`] | Great-circle distance between two points in km |
//! | [`bounding_box_deltas`] | Lat/lon half-widths enclosing a radius |
//! | [`web_mercator`] | Project a point to EPSG:3857 map coordinates |
//!
//! ## Coordinate System
//!
//! All inputs are WGS84 latitude/longitude in degrees, the system used by
//! GPS receivers and by the document store's location fields.

use geo::{Distance, Haversine, Point};

use crate::{GeoPoint, ProjectedPoint};

/// Mean Earth radius in kilometers. Shared by the bounding-box math so
/// box deltas stay consistent with the distance function.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// WGS84 semi-major axis in meters, the sphere radius of the EPSG:3857
/// web-mercator projection.
const MERCATOR_RADIUS_M: f64 = 6_378_137.0;

/// Latitude/longitude half-widths (in degrees) of a bounding box that
/// encloses a given radius around a point.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct BoxDeltas {
    pub lat_delta: f64,
    pub lon_delta: f64,
}

/// Calculate the great-circle distance between two points in kilometers
/// using the haversine formula.
///
/// Symmetric, zero for identical points, never negative.
///
/// # Example
///
/// ```rust
/// use report_heatmap::{geo_utils, GeoPoint};
///
/// let pisa = GeoPoint::new(43.7228, 10.4017);
/// let florence = GeoPoint::new(43.7696, 11.2558);
///
/// let distance = geo_utils::distance_km(&pisa, &florence);
/// assert!((distance - 69.0).abs() < 2.0); // ~69 km
/// ```
#[inline]
pub fn distance_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let p1 = Point::new(a.longitude, a.latitude);
    let p2 = Point::new(b.longitude, b.latitude);
    Haversine::distance(p1, p2) / 1000.0
}

/// Calculate the latitude/longitude half-widths of a bounding box that
/// encloses `radius_km` around a point at `at_latitude`.
///
/// `lat_delta = radius/R * 180/π`; `lon_delta` additionally divides by
/// `cos(latitude)` because meridians converge away from the equator.
///
/// The longitude delta blows up as `at_latitude` approaches ±90°: callers
/// must not invoke this near the poles. Not handled here.
///
/// # Example
///
/// ```rust
/// use report_heatmap::geo_utils;
///
/// let deltas = geo_utils::bounding_box_deltas(10.0, 43.7);
/// // Away from the equator the longitude span is the wider one.
/// assert!(deltas.lon_delta > deltas.lat_delta);
/// ```
#[inline]
pub fn bounding_box_deltas(radius_km: f64, at_latitude: f64) -> BoxDeltas {
    let lat_delta = (radius_km / EARTH_RADIUS_KM).to_degrees();
    let lon_delta = (radius_km / (EARTH_RADIUS_KM * at_latitude.to_radians().cos())).to_degrees();
    BoxDeltas { lat_delta, lon_delta }
}

/// Project a point to web-mercator (EPSG:3857) coordinates in meters.
///
/// This is the projection the map surface renders in; every heatmap
/// feature goes through it before being handed to the layer. Latitudes
/// beyond the projection's ±85.05° limit are clamped.
pub fn web_mercator(point: &GeoPoint) -> ProjectedPoint {
    // Web-mercator is undefined at the poles; clamp to its standard extent.
    let lat = point.latitude.clamp(-85.051_128, 85.051_128);
    let x = MERCATOR_RADIUS_M * point.longitude.to_radians();
    let y = MERCATOR_RADIUS_M * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    ProjectedPoint { x, y }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_distance_same_point() {
        let p = GeoPoint::new(43.7228, 10.4017);
        assert_eq!(distance_km(&p, &p), 0.0);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = GeoPoint::new(43.7228, 10.4017);
        let b = GeoPoint::new(41.9028, 12.4964);
        assert_eq!(distance_km(&a, &b), distance_km(&b, &a));
    }

    #[test]
    fn test_distance_never_negative() {
        let a = GeoPoint::new(-33.8688, 151.2093);
        let b = GeoPoint::new(51.5074, -0.1278);
        assert!(distance_km(&a, &b) > 0.0);
    }

    #[test]
    fn test_distance_known_value() {
        // Pisa to Florence is roughly 69 km
        let pisa = GeoPoint::new(43.7228, 10.4017);
        let florence = GeoPoint::new(43.7696, 11.2558);
        let dist = distance_km(&pisa, &florence);
        assert!(approx_eq(dist, 69.0, 2.0), "got {dist}");
    }

    #[test]
    fn test_deltas_equal_at_equator() {
        let deltas = bounding_box_deltas(10.0, 0.0);
        assert!(approx_eq(deltas.lat_delta, deltas.lon_delta, 1e-12));
    }

    #[test]
    fn test_lon_delta_grows_with_latitude() {
        let low = bounding_box_deltas(10.0, 10.0);
        let high = bounding_box_deltas(10.0, 60.0);
        assert!(high.lon_delta > low.lon_delta);
        assert!(approx_eq(high.lat_delta, low.lat_delta, 1e-12));
    }

    #[test]
    fn test_point_at_radius_due_north_is_inside_lat_bounds() {
        let center = GeoPoint::new(43.7, 10.4);
        let radius_km = 10.0;
        let deltas = bounding_box_deltas(radius_km, center.latitude);

        // Walk exactly radius_km due north: one degree of latitude is
        // EARTH_RADIUS_KM * π/180 km.
        let north = GeoPoint::new(
            center.latitude + (radius_km / EARTH_RADIUS_KM).to_degrees(),
            center.longitude,
        );
        assert!(approx_eq(distance_km(&center, &north), radius_km, 0.05));

        let max_lat = center.latitude + deltas.lat_delta;
        let min_lat = center.latitude - deltas.lat_delta;
        assert!(north.latitude >= min_lat && north.latitude <= max_lat);
    }

    #[test]
    fn test_web_mercator_origin() {
        let origin = web_mercator(&GeoPoint::new(0.0, 0.0));
        assert!(approx_eq(origin.x, 0.0, 1e-9));
        assert!(approx_eq(origin.y, 0.0, 1e-9));
    }

    #[test]
    fn test_web_mercator_x_spans_half_circumference() {
        let edge = web_mercator(&GeoPoint::new(0.0, 180.0));
        assert!(approx_eq(edge.x, 20_037_508.34, 1.0));
    }

    #[test]
    fn test_web_mercator_hemispheres_mirror() {
        let n = web_mercator(&GeoPoint::new(43.7, 10.4));
        assert!(n.y > 0.0);
        let s = web_mercator(&GeoPoint::new(-43.7, 10.4));
        assert!(approx_eq(n.y, -s.y, 1e-6));
    }
}
