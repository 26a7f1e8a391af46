//! Proximity evaluation
//!
//! Distance is the planar Euclidean distance over the raw coordinate values.
//! It is not a geodesic distance: a range of 200 means 200 units of raw
//! coordinate difference, and that is what decides who is "nearby".

use crate::types::Coordinates;

/// Delivery radius used when no other range is configured
pub const DEFAULT_RANGE: f64 = 200.0;

/// Planar distance between two positions
pub fn distance(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = a.lat - b.lat;
    let d_lon = a.lon - b.lon;
    (d_lat * d_lat + d_lon * d_lon).sqrt()
}

// ----------------------------------------------------------------------------
// Proximity Policy
// ----------------------------------------------------------------------------

/// Decides whether two positions are close enough for direct delivery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityPolicy {
    range: f64,
}

impl ProximityPolicy {
    pub fn new(range: f64) -> Self {
        Self { range }
    }

    pub fn range(&self) -> f64 {
        self.range
    }

    /// Inclusive: a distance equal to the range is in range
    pub fn within_range(&self, a: Coordinates, b: Coordinates) -> bool {
        distance(a, b) <= self.range
    }
}

impl Default for ProximityPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RANGE)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create_test_coords(lat: f64, lon: f64) -> Coordinates {
        Coordinates::new(lat, lon).unwrap()
    }

    #[test]
    fn test_distance_is_planar() {
        let a = create_test_coords(0.0, 0.0);
        let b = create_test_coords(3.0, 4.0);
        assert_eq!(distance(a, b), 5.0);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let policy = ProximityPolicy::default();
        let a = create_test_coords(0.0, 0.0);

        assert!(policy.within_range(a, create_test_coords(200.0, 0.0)));
        assert!(policy.within_range(a, create_test_coords(0.0, -200.0)));
        assert!(policy.within_range(a, create_test_coords(120.0, 160.0)));
        assert!(!policy.within_range(a, create_test_coords(200.000_001, 0.0)));
    }

    #[test]
    fn test_custom_range() {
        let policy = ProximityPolicy::new(10.0);
        let a = create_test_coords(0.0, 0.0);
        assert!(policy.within_range(a, create_test_coords(6.0, 8.0)));
        assert!(!policy.within_range(a, create_test_coords(6.0, 8.1)));
        assert_eq!(policy.range(), 10.0);
    }

    proptest! {
        #[test]
        fn prop_distance_is_symmetric(
            lat1 in -1.0e6f64..1.0e6,
            lon1 in -1.0e6f64..1.0e6,
            lat2 in -1.0e6f64..1.0e6,
            lon2 in -1.0e6f64..1.0e6,
        ) {
            let a = create_test_coords(lat1, lon1);
            let b = create_test_coords(lat2, lon2);
            prop_assert_eq!(distance(a, b), distance(b, a));
        }

        #[test]
        fn prop_distance_to_self_is_zero(lat in -1.0e6f64..1.0e6, lon in -1.0e6f64..1.0e6) {
            let a = create_test_coords(lat, lon);
            prop_assert_eq!(distance(a, a), 0.0);
        }

        #[test]
        fn prop_within_range_matches_distance(
            lat in -500.0f64..500.0,
            lon in -500.0f64..500.0,
        ) {
            let policy = ProximityPolicy::default();
            let origin = Coordinates::origin();
            let point = create_test_coords(lat, lon);
            prop_assert_eq!(
                policy.within_range(origin, point),
                distance(origin, point) <= DEFAULT_RANGE
            );
        }
    }
}
