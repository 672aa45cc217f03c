pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates via the haversine formula.
/// NaN or infinite inputs propagate into the result rather than erroring.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_METERS * a.sqrt().atan2((1.0 - a).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance_for_identical_points() {
        assert_eq!(distance_meters(23.8010, 90.4490, 23.8010, 90.4490), 0.0);
        assert_eq!(distance_meters(0.0, 0.0, 0.0, 0.0), 0.0);
        assert_eq!(distance_meters(-45.0, 179.9, -45.0, 179.9), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let forward = distance_meters(23.8010, 90.4490, 23.7678, 90.4258);
        let backward = distance_meters(23.7678, 90.4258, 23.8010, 90.4490);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_known_distance() {
        // One degree of latitude is roughly 111.2 km
        let d = distance_meters(23.0, 90.0, 24.0, 90.0);
        assert!((d - 111_195.0).abs() < 100.0, "got {}", d);
    }

    #[test]
    fn test_close_points_are_under_cluster_radius() {
        // Two reports from the same physical bus (example from Kuril)
        let d = distance_meters(23.8010, 90.4490, 23.8011, 90.4491);
        assert!(d < 20.0, "got {}", d);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_meters(f64::NAN, 90.0, 23.0, 90.0).is_nan());
    }
}
