use serde::{Deserialize, Serialize};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 coordinate pair.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_M * c
    }
}

/// Human-readable distance for reply lists: meters below one kilometer,
/// one-decimal kilometers above.
pub fn format_distance(meters: f64) -> String {
    if meters < 1_000.0 {
        format!("{} m", meters.round() as i64)
    } else {
        format!("{:.1} km", meters / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{format_distance, GeoPoint};

    #[test]
    fn distance_to_self_is_zero() {
        let point = GeoPoint::new(6.45, 3.39);
        assert!(point.distance_m(&point) < f64::EPSILON);
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(1.0, 0.0);
        let distance = a.distance_m(&b);

        assert!((distance - 111_195.0).abs() < 100.0, "got {distance}");
    }

    #[test]
    fn distance_is_symmetric() {
        let a = GeoPoint::new(6.5244, 3.3792);
        let b = GeoPoint::new(6.4550, 3.3841);

        assert!((a.distance_m(&b) - b.distance_m(&a)).abs() < 1e-6);
    }

    #[test]
    fn formats_meters_and_kilometers() {
        assert_eq!(format_distance(340.2), "340 m");
        assert_eq!(format_distance(1_540.0), "1.5 km");
    }
}
