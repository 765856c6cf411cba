//! Per-user temporal graph builder.
//!
//! Maps one user's grouped stay points onto the framework's bottom layer and
//! links the visited clusters in temporal order.

use std::collections::HashMap;

use crate::grouping::group_stay_points;
use crate::{
    Cluster, Framework, GraphEdge, GraphNode, GroupingConfig, StayPoint, UserGraph,
};

/// Build a user's temporal graph over a framework.
///
/// Stay points are grouped spatio-temporally, each group is mapped to the
/// bottom-layer cluster containing the most of its members (ties broken by
/// lower cluster id; groups contained by no cluster are skipped), and one
/// node is kept per visited cluster. Repeat visits extend the node's visit
/// window and add to its visit count. Nodes are ordered by first visit and
/// consecutive nodes are linked by an edge whose transition time is the gap
/// between leaving one and arriving at the next, clamped to zero.
///
/// A framework without layers, or a user without stay points, yields an
/// empty graph. Node and edge ids are zero until a store assigns them.
pub fn build_user_graph(
    user_id: u64,
    stay_points: &[StayPoint],
    framework: &Framework,
    config: &GroupingConfig,
) -> UserGraph {
    let mut graph = UserGraph {
        id: 0,
        user_id,
        framework_id: framework.id,
        nodes: Vec::new(),
        edges: Vec::new(),
    };

    let Some(bottom) = framework.bottom_layer() else {
        return graph;
    };
    if stay_points.is_empty() {
        return graph;
    }

    // One node per visited cluster, merged across groups.
    let mut by_cluster: HashMap<u64, GraphNode> = HashMap::new();

    for group in group_stay_points(stay_points, config) {
        let Some(cluster) = best_cluster(&group, bottom.clusters.as_slice()) else {
            log::debug!(
                "user {}: group of {} stay points matches no bottom-layer cluster",
                user_id,
                group.len()
            );
            continue;
        };

        let first = group.iter().map(|sp| sp.arrival).min();
        let last = group.iter().map(|sp| sp.departure).max();
        let (Some(first), Some(last)) = (first, last) else {
            continue;
        };

        by_cluster
            .entry(cluster.id)
            .and_modify(|node| {
                node.first_visit_at = node.first_visit_at.min(first);
                node.last_visit_at = node.last_visit_at.max(last);
                node.visit_count += group.len() as u32;
            })
            .or_insert(GraphNode {
                id: 0,
                cluster_id: cluster.id,
                visit_count: group.len() as u32,
                first_visit_at: first,
                last_visit_at: last,
            });
    }

    let mut nodes: Vec<GraphNode> = by_cluster.into_values().collect();
    nodes.sort_by_key(|n| (n.first_visit_at, n.cluster_id));

    let edges = nodes
        .windows(2)
        .enumerate()
        .map(|(i, pair)| GraphEdge {
            id: 0,
            from: i,
            to: i + 1,
            transition_secs: (pair[1].first_visit_at - pair[0].last_visit_at)
                .num_seconds()
                .max(0),
            visit_count: 1,
        })
        .collect();

    graph.nodes = nodes;
    graph.edges = edges;
    graph
}

/// The cluster containing the most of a group's stay points; ties go to the
/// lower cluster id. `None` when no cluster contains any member.
fn best_cluster<'a>(group: &[StayPoint], clusters: &'a [Cluster]) -> Option<&'a Cluster> {
    let mut best: Option<(&Cluster, usize)> = None;

    for cluster in clusters {
        let contained = group
            .iter()
            .filter(|sp| cluster.contains(sp.latitude, sp.longitude))
            .count();
        if contained == 0 {
            continue;
        }
        let better = match best {
            None => true,
            Some((prev, prev_count)) => {
                contained > prev_count || (contained == prev_count && cluster.id < prev.id)
            }
        };
        if better {
            best = Some((cluster, contained));
        }
    }

    best.map(|(cluster, _)| cluster)
}
