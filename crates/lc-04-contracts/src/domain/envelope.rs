//! Route envelope geometry.
//!
//! The envelope a checkpoint must fall inside is the union of discs of
//! radius `tolerance_radius_m` centered on the pickup, the delivery, and
//! linear-interpolation samples between them spaced at most `max_step_km`
//! apart.

use lc_coordinate_grid::haversine_m;
use shared_types::GeoPoint;

/// Precomputed sample points for one contract's route.
#[derive(Clone, Debug)]
pub struct RouteEnvelope {
    samples: Vec<GeoPoint>,
    tolerance_radius_m: f64,
}

impl RouteEnvelope {
    pub fn new(
        pickup: GeoPoint,
        delivery: GeoPoint,
        tolerance_radius_m: f64,
        max_step_km: f64,
    ) -> Self {
        let route_m = haversine_m(pickup, delivery);
        let step_m = max_step_km * 1000.0;
        // Segments needed so neighboring samples are at most one step apart.
        let segments = (route_m / step_m).ceil().max(1.0) as usize;

        let mut samples = Vec::with_capacity(segments + 1);
        for i in 0..=segments {
            let t = i as f64 / segments as f64;
            samples.push(GeoPoint::new(
                pickup.lat + (delivery.lat - pickup.lat) * t,
                pickup.lng + (delivery.lng - pickup.lng) * t,
            ));
        }
        Self {
            samples,
            tolerance_radius_m,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Distance from a point to the nearest route sample, in meters.
    pub fn distance_m(&self, point: GeoPoint) -> f64 {
        self.samples
            .iter()
            .map(|s| haversine_m(*s, point))
            .fold(f64::INFINITY, f64::min)
    }

    /// True when the point lies inside some envelope disc.
    pub fn contains(&self, point: GeoPoint) -> bool {
        self.distance_m(point) <= self.tolerance_radius_m
    }
}
