//! Great-circle distance.

use shared_types::GeoPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two coordinates, rounded to whole meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    (EARTH_RADIUS_M * c).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(-23.55, -46.63);
        assert_eq!(haversine_m(p, p), 0.0);
    }

    #[test]
    fn test_sao_paulo_block_distance() {
        // Roughly 1.5 km between these two points in São Paulo.
        let a = GeoPoint::new(-23.55, -46.63);
        let b = GeoPoint::new(-23.56, -46.64);
        let d = haversine_m(a, b);
        assert!((1400.0..1700.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_equator_degree() {
        // One degree of longitude at the equator is ~111.2 km.
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.0, 1.0);
        let d = haversine_m(a, b);
        assert!((110_000.0..112_500.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_symmetric() {
        let a = GeoPoint::new(10.0, 20.0);
        let b = GeoPoint::new(-5.0, 33.3);
        assert_eq!(haversine_m(a, b), haversine_m(b, a));
    }
}
