//! Hierarchical framework builder.
//!
//! Runs the DBSCAN kernel over the full stay-point set once per layer scale,
//! producing independent coarse-grainings of the same points. Layers do not
//! store parent/child links; containment is computed on demand from cluster
//! centers and radii.

use std::collections::BTreeSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::dbscan::{cluster_members, dbscan, DbscanPoint};
use crate::geo_utils::haversine_distance_km;
use crate::{Cluster, Framework, FrameworkConfig, Layer, StayPoint};

/// Build a hierarchical framework from all users' stay points.
///
/// Layer `level` (1-based) clusters with radius `eps_km * scales[level-1]`.
/// Per cluster: center = arithmetic mean of member coordinates, radius = max
/// great-circle distance from center to any member, visit count = distinct
/// users among the members. Clusters with no distinct users are discarded;
/// noise points are never persisted as clusters.
///
/// Ids are assigned deterministically: layers 1..=L, clusters numbered in
/// layer order then scan order, starting at 1. A store re-assigns ids on
/// persistence; relative order is preserved either way.
pub fn build_framework(stay_points: &[StayPoint], config: &FrameworkConfig) -> Framework {
    let points: Vec<DbscanPoint> = stay_points
        .iter()
        .map(|sp| DbscanPoint {
            id: sp.id,
            user_id: sp.user_id,
            lat: sp.latitude,
            lng: sp.longitude,
        })
        .collect();

    let build_layer = |(level_idx, scale): (usize, &f64)| -> Layer {
        let eps = config.eps_km * scale;
        let clusters = cluster_layer(&points, eps, config.min_pts);
        log::info!(
            "layer {}: eps {:.3} km, {} clusters from {} stay points",
            level_idx + 1,
            eps,
            clusters.len(),
            points.len()
        );
        Layer {
            id: 0,
            framework_id: 0,
            level: (level_idx + 1) as u32,
            clusters,
        }
    };

    #[cfg(feature = "parallel")]
    let mut layers: Vec<Layer> = config.scales.par_iter().enumerate().map(build_layer).collect();
    #[cfg(not(feature = "parallel"))]
    let mut layers: Vec<Layer> = config.scales.iter().enumerate().map(build_layer).collect();

    // Deterministic provisional ids, in layer order then scan order.
    let mut next_cluster_id = 1u64;
    for (layer_idx, layer) in layers.iter_mut().enumerate() {
        layer.id = (layer_idx + 1) as u64;
        for cluster in &mut layer.clusters {
            cluster.id = next_cluster_id;
            cluster.layer_id = layer.id;
            next_cluster_id += 1;
        }
    }

    Framework { id: 0, layers }
}

/// Run one DBSCAN pass and convert member sets into clusters.
fn cluster_layer(points: &[DbscanPoint], eps_km: f64, min_pts: usize) -> Vec<Cluster> {
    let assignments = dbscan(points, eps_km, min_pts);

    cluster_members(&assignments)
        .into_iter()
        .filter_map(|members| {
            if members.is_empty() {
                return None;
            }

            let n = members.len() as f64;
            let (sum_lat, sum_lng) = members.iter().fold((0.0, 0.0), |(la, ln), &i| {
                (la + points[i].lat, ln + points[i].lng)
            });
            let center_lat = sum_lat / n;
            let center_lng = sum_lng / n;

            let radius_km = members
                .iter()
                .map(|&i| haversine_distance_km(center_lat, center_lng, points[i].lat, points[i].lng))
                .fold(0.0, f64::max);

            let users: BTreeSet<u64> = members.iter().map(|&i| points[i].user_id).collect();
            if users.is_empty() {
                return None;
            }

            Some(Cluster {
                id: 0,
                framework_id: 0,
                layer_id: 0,
                center_lat,
                center_lng,
                radius_km,
                visit_count: users.len() as u32,
            })
        })
        .collect()
}

/// Find the parent of a cluster at a coarser layer, by containment.
///
/// The parent is the first cluster (lowest id) in `parent_layer` whose
/// radius covers the child's center.
pub fn parent_of<'a>(child: &Cluster, parent_layer: &'a Layer) -> Option<&'a Cluster> {
    parent_layer
        .clusters
        .iter()
        .find(|parent| parent.contains(child.center_lat, child.center_lng))
}

/// Find all children of a cluster in a finer layer, by containment.
pub fn children_of<'a>(parent: &Cluster, child_layer: &'a Layer) -> Vec<&'a Cluster> {
    child_layer
        .clusters
        .iter()
        .filter(|child| parent.contains(child.center_lat, child.center_lng))
        .collect()
}

/// All stay points lying within a cluster's radius of its center.
pub fn stay_points_in_cluster<'a>(
    cluster: &Cluster,
    stay_points: &'a [StayPoint],
) -> Vec<&'a StayPoint> {
    stay_points
        .iter()
        .filter(|sp| cluster.contains(sp.latitude, sp.longitude))
        .collect()
}
