//! Tests for the user-graph builder

use chrono::{DateTime, Duration, TimeZone, Utc};
use staygraph::{
    build_user_graph, Cluster, Framework, GroupingConfig, Layer, StayPoint,
};

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
        departure: t(arrival_h) + Duration::minutes(45),
    }
}

fn cluster(id: u64, lat: f64, lng: f64, radius_km: f64) -> Cluster {
    Cluster {
        id,
        framework_id: 1,
        layer_id: 1,
        center_lat: lat,
        center_lng: lng,
        radius_km,
        visit_count: 1,
    }
}

fn framework(clusters: Vec<Cluster>) -> Framework {
    Framework {
        id: 1,
        layers: vec![Layer {
            id: 1,
            framework_id: 1,
            level: 1,
            clusters,
        }],
    }
}

/// Two visits to one place on separate days merge into a single node whose
/// window spans both and whose count sums both groups.
#[test]
fn test_repeat_visits_merge_into_one_node() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 39.9, 116.4, 2),
        // Second outing, 3 days later (new group, same place)
        sp(3, 39.9, 116.4, 72),
        sp(4, 39.9, 116.4, 74),
    ];
    let fw = framework(vec![cluster(1, 39.9, 116.4, 0.5)]);

    let graph = build_user_graph(1, &stay_points, &fw, &GroupingConfig::default());
    assert_eq!(graph.nodes.len(), 1);
    assert!(graph.edges.is_empty());

    let node = &graph.nodes[0];
    assert_eq!(node.cluster_id, 1);
    assert_eq!(node.visit_count, 4);
    assert_eq!(node.first_visit_at, t(0));
    assert_eq!(node.last_visit_at, t(74) + Duration::minutes(45));

    graph.validate(&fw).unwrap();
}

/// Two visited places produce two nodes connected by one edge in visit
/// order, with a non-negative transition time.
#[test]
fn test_edge_between_consecutive_visits() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 39.9, 116.4, 2),
        sp(3, 39.99, 116.4, 5),
        sp(4, 39.99, 116.4, 7),
    ];
    let fw = framework(vec![
        cluster(1, 39.9, 116.4, 0.5),
        cluster(2, 39.99, 116.4, 0.5),
    ]);

    let graph = build_user_graph(1, &stay_points, &fw, &GroupingConfig::default());
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);

    let edge = &graph.edges[0];
    assert_eq!(graph.nodes[edge.from].cluster_id, 1);
    assert_eq!(graph.nodes[edge.to].cluster_id, 2);

    // leave cluster 1 at t(2)+45min, arrive cluster 2 at t(5)
    let expected = (t(5) - (t(2) + Duration::minutes(45))).num_seconds();
    assert_eq!(edge.transition_secs, expected);
    assert!(edge.transition_secs >= 0);

    graph.validate(&fw).unwrap();
}

/// Overlapping visit windows clamp the transition to zero.
#[test]
fn test_transition_clamped_to_zero() {
    let stay_points = vec![
        // Long dwell at place A spanning the whole day
        sp(1, 39.9, 116.4, 0),
        StayPoint {
            departure: t(20),
            ..sp(2, 39.9, 116.4, 1)
        },
        // Visit to B in the middle of A's window
        sp(3, 39.99, 116.4, 5),
        sp(4, 39.99, 116.4, 6),
    ];
    let fw = framework(vec![
        cluster(1, 39.9, 116.4, 0.5),
        cluster(2, 39.99, 116.4, 0.5),
    ]);

    let graph = build_user_graph(1, &stay_points, &fw, &GroupingConfig::default());
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.edges[0].transition_secs, 0);
}

/// The best cluster is the one containing most group members; ties go to
/// the lower cluster id.
#[test]
fn test_best_cluster_tie_breaks_low_id() {
    let stay_points = vec![sp(1, 39.9, 116.4, 0), sp(2, 39.9, 116.4, 2)];
    // Two identical overlapping clusters; ids deliberately out of order.
    let fw = framework(vec![
        cluster(9, 39.9, 116.4, 0.5),
        cluster(3, 39.9, 116.4, 0.5),
    ]);

    let graph = build_user_graph(1, &stay_points, &fw, &GroupingConfig::default());
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].cluster_id, 3);
}

/// Groups outside every cluster are skipped.
#[test]
fn test_uncovered_group_skipped() {
    let stay_points = vec![
        sp(1, 39.9, 116.4, 0),
        sp(2, 39.9, 116.4, 2),
        sp(3, 10.0, 10.0, 5),
        sp(4, 10.0, 10.0, 7),
    ];
    let fw = framework(vec![cluster(1, 39.9, 116.4, 0.5)]);

    let graph = build_user_graph(1, &stay_points, &fw, &GroupingConfig::default());
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].cluster_id, 1);
}

#[test]
fn test_empty_framework_yields_empty_graph() {
    let fw = Framework {
        id: 1,
        layers: vec![],
    };
    let graph = build_user_graph(1, &[sp(1, 39.9, 116.4, 0)], &fw, &GroupingConfig::default());
    assert!(graph.is_empty());
    assert!(graph.edges.is_empty());
}

#[test]
fn test_no_stay_points_yields_empty_graph() {
    let fw = framework(vec![cluster(1, 39.9, 116.4, 0.5)]);
    let graph = build_user_graph(1, &[], &fw, &GroupingConfig::default());
    assert!(graph.is_empty());
}

/// Nodes come out sorted by first visit, edges chained in that order.
#[test]
fn test_nodes_sorted_and_chained() {
    let stay_points = vec![
        sp(1, 39.99, 116.4, 0),
        sp(2, 39.99, 116.4, 1),
        sp(3, 39.9, 116.4, 30),
        sp(4, 39.9, 116.4, 31),
        sp(5, 39.95, 116.5, 60),
        sp(6, 39.95, 116.5, 61),
    ];
    let fw = framework(vec![
        cluster(1, 39.9, 116.4, 0.5),
        cluster(2, 39.99, 116.4, 0.5),
        cluster(3, 39.95, 116.5, 0.5),
    ]);

    let graph = build_user_graph(1, &stay_points, &fw, &GroupingConfig::default());
    assert_eq!(graph.nodes.len(), 3);
    assert_eq!(graph.edges.len(), 2);

    let visited: Vec<u64> = graph.nodes.iter().map(|n| n.cluster_id).collect();
    assert_eq!(visited, vec![2, 1, 3]);
    assert_eq!((graph.edges[0].from, graph.edges[0].to), (0, 1));
    assert_eq!((graph.edges[1].from, graph.edges[1].to), (1, 2));

    graph.validate(&fw).unwrap();
}
