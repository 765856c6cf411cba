//! Geographic utilities: great-circle distance, centroids, bounds.

/// Earth's mean radius in kilometers (WGS-84 sphere approximation).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two coordinates in kilometers, using the
/// haversine formula on a sphere of radius [`EARTH_RADIUS_KM`].
///
/// Inputs are not validated; NaN coordinates yield NaN. The result is
/// symmetric in its arguments to within IEEE-754 rounding.
///
/// # Example
/// ```
/// use staygraph::geo_utils::haversine_distance_km;
/// let d = haversine_distance_km(51.5074, -0.1278, 48.8566, 2.3522);
/// assert!((d - 343.5).abs() < 5.0); // London -> Paris
/// ```
pub fn haversine_distance_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Arithmetic-mean centroid of a set of `(lat, lng)` pairs.
///
/// Returns `(0.0, 0.0)` for an empty slice.
pub fn centroid(coords: &[(f64, f64)]) -> (f64, f64) {
    if coords.is_empty() {
        return (0.0, 0.0);
    }
    let (sum_lat, sum_lng) = coords
        .iter()
        .fold((0.0, 0.0), |(la, ln), &(lat, lng)| (la + lat, ln + lng));
    let n = coords.len() as f64;
    (sum_lat / n, sum_lng / n)
}

/// Kilometers per degree of arc on the haversine sphere (pi * R / 180).
pub const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Convert a distance in kilometers to degrees of latitude.
pub fn km_to_lat_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// Convert a distance in kilometers to degrees of longitude at a latitude.
///
/// The cosine is floored so the conversion stays finite near the poles; the
/// resulting span is an overestimate there, never an underestimate.
pub fn km_to_lng_degrees(km: f64, lat: f64) -> f64 {
    let cos_lat = lat.to_radians().cos().abs().max(1e-6);
    km / (KM_PER_DEGREE * cos_lat)
}
