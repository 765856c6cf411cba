//! Stay-point detection.
//!
//! Converts a time-ordered GPS stream into dwells: places where the trace
//! stayed within a distance threshold for longer than a time threshold.

use crate::geo_utils::haversine_distance_km;
use crate::{GpsFix, StayPoint, StayPointConfig, Trajectory};

/// Detect stay points in a sequence of GPS fixes.
///
/// A sliding-anchor scan: from each anchor fix `i`, advance `j` while
/// `fixes[j]` stays within `max_distance_m` of the anchor (ties inclusive).
/// If the furthest such fix `j*` is more than `min_duration` after the
/// anchor (strict), a stay point is emitted with the arithmetic-mean
/// centroid of `fixes[i..=j*]` and the scan resumes at `j* + 1`; otherwise
/// the anchor advances by one.
///
/// Fixes are sorted by timestamp before scanning, so unsorted input is
/// tolerated. Fewer than two fixes yield no stay points. The emitted stay
/// points carry zero ids; callers attach user/trajectory identity.
///
/// # Example
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use staygraph::{staypoint::detect_stay_points, GpsFix, StayPointConfig};
///
/// let t0 = Utc.with_ymd_and_hms(2009, 4, 12, 9, 0, 0).unwrap();
/// let fixes: Vec<GpsFix> = (0..5)
///     .map(|i| GpsFix::new(39.9, 116.4, 50.0, t0 + Duration::minutes(i * 11)))
///     .collect();
///
/// let stays = detect_stay_points(&fixes, &StayPointConfig::default());
/// assert_eq!(stays.len(), 1);
/// assert_eq!(stays[0].duration(), Duration::minutes(44));
/// ```
pub fn detect_stay_points(fixes: &[GpsFix], config: &StayPointConfig) -> Vec<StayPoint> {
    let mut stay_points = Vec::new();
    if fixes.len() < 2 {
        return stay_points;
    }

    let mut fixes: Vec<GpsFix> = fixes.to_vec();
    fixes.sort_by_key(|f| f.timestamp);

    let n = fixes.len();
    let mut i = 0;
    while i < n - 1 {
        let anchor = &fixes[i];

        // Furthest fix still within the distance threshold of the anchor.
        let scan_end = n.min(i + 1 + config.scan_window);
        let mut j_star = i;
        for (j, fix) in fixes.iter().enumerate().take(scan_end).skip(i + 1) {
            let dist_m =
                haversine_distance_km(anchor.latitude, anchor.longitude, fix.latitude, fix.longitude)
                    * 1000.0;
            if dist_m <= config.max_distance_m {
                j_star = j;
            } else {
                break;
            }
        }

        if j_star > i && fixes[j_star].timestamp - anchor.timestamp > config.min_duration {
            let window = &fixes[i..=j_star];
            let count = window.len() as f64;
            let (sum_lat, sum_lng) = window
                .iter()
                .fold((0.0, 0.0), |(la, ln), f| (la + f.latitude, ln + f.longitude));

            stay_points.push(StayPoint {
                id: 0,
                user_id: 0,
                trajectory_id: 0,
                latitude: sum_lat / count,
                longitude: sum_lng / count,
                arrival: fixes[i].timestamp,
                departure: fixes[j_star].timestamp,
            });

            i = j_star + 1;
        } else {
            i += 1;
        }
    }

    stay_points
}

/// Detect stay points for a stored trajectory, stamping user and trajectory
/// identity onto the results.
pub fn detect_for_trajectory(trajectory: &Trajectory, config: &StayPointConfig) -> Vec<StayPoint> {
    let mut stay_points = detect_stay_points(&trajectory.fixes, config);
    for sp in &mut stay_points {
        sp.user_id = trajectory.user_id;
        sp.trajectory_id = trajectory.id;
    }
    stay_points
}
