//! Spatio-temporal grouping of one user's stay points.
//!
//! Groups contiguous runs of stay points that are close in space and time.
//! A group captures repeat visits to one place during a single outing; the
//! user-graph builder maps each group to a bottom-layer cluster.

use crate::geo_utils::haversine_distance_km;
use crate::{GroupingConfig, StayPoint};

/// Group one user's stay points by spatial and temporal proximity.
///
/// Stay points are sorted by arrival, then walked once: a stay point joins
/// the current group when it is within `max_distance_m` meters and within
/// `max_gap` of the group's previous member (measured member-to-member, not
/// against the group head); otherwise it starts a new group. Only groups of
/// at least two stay points are emitted.
pub fn group_stay_points(stay_points: &[StayPoint], config: &GroupingConfig) -> Vec<Vec<StayPoint>> {
    if stay_points.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<StayPoint> = stay_points.to_vec();
    sorted.sort_by_key(|sp| sp.arrival);

    let mut groups = Vec::new();
    let mut last = sorted[0].clone();
    let mut current: Vec<StayPoint> = vec![last.clone()];

    for sp in sorted.into_iter().skip(1) {
        let dist_m =
            haversine_distance_km(last.latitude, last.longitude, sp.latitude, sp.longitude)
                * 1000.0;
        let gap = sp.arrival - last.arrival;
        last = sp.clone();

        if dist_m <= config.max_distance_m && gap <= config.max_gap {
            current.push(sp);
        } else {
            if current.len() >= 2 {
                groups.push(current);
            }
            current = vec![sp];
        }
    }

    if current.len() >= 2 {
        groups.push(current);
    }

    groups
}
