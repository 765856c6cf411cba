//! Tests for the stay-point detector

use chrono::{DateTime, Duration, TimeZone, Utc};
use staygraph::{staypoint::detect_stay_points, GpsFix, StayPointConfig};

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2009, 4, 12, 9, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn fix(lat: f64, lng: f64, minutes: i64) -> GpsFix {
    GpsFix::new(lat, lng, 50.0, t(minutes))
}

/// Five fixes at one spot over 45 minutes produce exactly one stay point.
#[test]
fn test_stationary_dwell_detected() {
    let fixes: Vec<GpsFix> = (0..5).map(|i| fix(39.9, 116.4, i * 11 + (i / 4))).collect();
    // Timestamps 0, 11, 22, 33, 45 minutes

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert_eq!(stays.len(), 1);

    let sp = &stays[0];
    assert!((sp.latitude - 39.9).abs() < 1e-9);
    assert!((sp.longitude - 116.4).abs() < 1e-9);
    assert_eq!(sp.arrival, t(0));
    assert_eq!(sp.departure, t(45));
    assert_eq!(sp.duration(), Duration::minutes(45));
}

/// Twenty minutes at one spot is below the 30-minute threshold.
#[test]
fn test_short_dwell_ignored() {
    let fixes: Vec<GpsFix> = (0..5).map(|i| fix(39.9, 116.4, i * 5)).collect();
    // Spans 20 minutes

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert!(stays.is_empty());
}

/// Drifting north for 10 minutes, then parking near (39.95, 116.4) for
/// more than half an hour, yields one stay point at the parking spot.
#[test]
fn test_moving_then_stopping() {
    let mut fixes: Vec<GpsFix> = (0..10)
        .map(|i| fix(39.9455 + i as f64 * 0.0005, 116.4, i))
        .collect();
    fixes.extend((0..8).map(|i| fix(39.95, 116.4, 10 + i * 5)));

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert_eq!(stays.len(), 1);

    let sp = &stays[0];
    assert!((sp.latitude - 39.95).abs() < 0.0005);
    assert!((sp.longitude - 116.4).abs() < 0.0005);
    assert!(sp.duration() > Duration::minutes(30));
}

/// A fix exactly at the distance threshold counts as within the dwell.
#[test]
fn test_distance_tie_is_inclusive() {
    let far = fix(39.9017, 116.4, 40);
    let exact_m = staygraph::geo_utils::haversine_distance_km(39.9, 116.4, far.latitude, far.longitude)
        * 1000.0;
    let config = StayPointConfig {
        max_distance_m: exact_m,
        ..StayPointConfig::default()
    };
    let fixes = vec![fix(39.9, 116.4, 0), fix(39.9, 116.4, 20), far];

    let stays = detect_stay_points(&fixes, &config);
    assert_eq!(stays.len(), 1);
    assert_eq!(stays[0].departure, t(40));
}

/// The time threshold is strict: exactly 30 minutes does not qualify.
#[test]
fn test_time_threshold_is_strict() {
    let fixes: Vec<GpsFix> = (0..4).map(|i| fix(39.9, 116.4, i * 10)).collect();
    // Spans exactly 30 minutes

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert!(stays.is_empty());

    // One more minute and it qualifies
    let mut fixes = fixes;
    fixes.push(fix(39.9, 116.4, 31));
    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert_eq!(stays.len(), 1);
}

#[test]
fn test_fewer_than_two_fixes() {
    let config = StayPointConfig::default();
    assert!(detect_stay_points(&[], &config).is_empty());
    assert!(detect_stay_points(&[fix(39.9, 116.4, 0)], &config).is_empty());
}

/// Unsorted input is sorted before scanning.
#[test]
fn test_unsorted_input_tolerated() {
    let mut fixes: Vec<GpsFix> = (0..5).map(|i| fix(39.9, 116.4, i * 11)).collect();
    fixes.swap(0, 4);
    fixes.swap(1, 3);

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert_eq!(stays.len(), 1);
    assert_eq!(stays[0].arrival, t(0));
    assert_eq!(stays[0].departure, t(44));
}

/// Two separate dwells split by a relocation are both detected, and the
/// scan resumes past each emitted stay point.
#[test]
fn test_two_dwells() {
    let mut fixes: Vec<GpsFix> = (0..4).map(|i| fix(39.9, 116.4, i * 11)).collect();
    // 50 km away, second dwell
    fixes.extend((0..4).map(|i| fix(40.35, 116.4, 120 + i * 11)));

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert_eq!(stays.len(), 2);
    assert!((stays[0].latitude - 39.9).abs() < 1e-9);
    assert!((stays[1].latitude - 40.35).abs() < 1e-9);
    assert!(stays[0].departure <= stays[1].arrival);
}

/// Identical timestamps are permitted and not deduplicated.
#[test]
fn test_duplicate_timestamps() {
    let fixes = vec![
        fix(39.9, 116.4, 0),
        fix(39.9, 116.4, 0),
        fix(39.9, 116.4, 40),
    ];

    let stays = detect_stay_points(&fixes, &StayPointConfig::default());
    assert_eq!(stays.len(), 1);
}
