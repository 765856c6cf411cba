//! Tests for spatio-temporal grouping

use chrono::{DateTime, Duration, TimeZone, Utc};
use staygraph::{group_stay_points, GroupingConfig, StayPoint};

fn t(hours: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2009, 4, 12, 0, 0, 0).unwrap() + Duration::hours(hours)
}

fn sp(id: u64, lat: f64, lng: f64, arrival_h: i64) -> StayPoint {
    StayPoint {
        id,
        user_id: 1,
        trajectory_id: 1,
        latitude: lat,
        longitude: lng,
        arrival: t(arrival_h),
        departure: t(arrival_h) + Duration::minutes(40),
    }
}

#[test]
fn test_nearby_run_groups() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 39.9001, 116.4, 2),
        sp(3, 39.9, 116.4001, 4),
    ];

    let groups = group_stay_points(&stay_points, &GroupingConfig::default());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 3);
}

/// A spatial jump starts a new group; singleton runs are dropped.
#[test]
fn test_spatial_gap_splits() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 39.9, 116.4, 2),
        sp(3, 39.95, 116.4, 4), // ~5.5 km away
        sp(4, 39.9, 116.4, 6),
        sp(5, 39.9, 116.4, 8),
    ];

    let groups = group_stay_points(&stay_points, &GroupingConfig::default());
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(groups[1].iter().map(|s| s.id).collect::<Vec<_>>(), vec![4, 5]);
}

/// More than 24 hours between arrivals starts a new group.
#[test]
fn test_temporal_gap_splits() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 39.9, 116.4, 10),
        sp(3, 39.9, 116.4, 40), // 30 h after the previous arrival
        sp(4, 39.9, 116.4, 42),
    ];

    let groups = group_stay_points(&stay_points, &GroupingConfig::default());
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(groups[1].iter().map(|s| s.id).collect::<Vec<_>>(), vec![3, 4]);
}

/// The gap is measured member-to-member, so a long chain of small steps
/// stays one group even when its ends are far apart in time.
#[test]
fn test_chained_gaps_stay_grouped() {
    let stay_points: Vec<StayPoint> =
        (0..4).map(|i| sp(i + 1, 39.9, 116.4, i as i64 * 20)).collect();
    // 60 h end to end, 20 h between consecutive arrivals

    let groups = group_stay_points(&stay_points, &GroupingConfig::default());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 4);
}

#[test]
fn test_all_isolated_yields_nothing() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 10.0, 10.0, 2),
        sp(3, 50.0, 50.0, 4),
    ];

    let groups = group_stay_points(&stay_points, &GroupingConfig::default());
    assert!(groups.is_empty());
}

#[test]
fn test_unsorted_input_sorted_by_arrival() {
    let stay_points = vec![
        sp(2, 39.9, 116.4, 2),
        sp(1, 39.9, 116.4, 0),
        sp(3, 39.9, 116.4, 4),
    ];

    let groups = group_stay_points(&stay_points, &GroupingConfig::default());
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].iter().map(|s| s.id).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_empty_input() {
    assert!(group_stay_points(&[], &GroupingConfig::default()).is_empty());
}
