//! Geodesic DBSCAN kernel.
//!
//! Density clustering of geographic points with the haversine metric. The
//! scan order is fixed by ascending point id and neighborhoods are
//! enumerated in that same order, so cluster numbering is reproducible for
//! a given input regardless of caller ordering.

use std::collections::VecDeque;

use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::{haversine_distance_km, km_to_lat_degrees, km_to_lng_degrees};

/// A point participating in a DBSCAN run.
#[derive(Debug, Clone, Copy)]
pub struct DbscanPoint {
    pub id: u64,
    pub user_id: u64,
    pub lat: f64,
    pub lng: f64,
}

/// Cluster assignment for one input point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterAssignment {
    /// Not density-reachable from any core point.
    Noise,
    /// Member of the cluster with this 0-based ordinal.
    Cluster(usize),
}

impl ClusterAssignment {
    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterAssignment::Noise)
    }

    pub fn cluster(&self) -> Option<usize> {
        match self {
            ClusterAssignment::Noise => None,
            ClusterAssignment::Cluster(c) => Some(*c),
        }
    }
}

/// A point with its input index, for R-tree neighborhood queries.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

/// Run DBSCAN over `points` with neighborhood radius `eps_km` (inclusive)
/// and core threshold `min_pts` (neighbors, excluding the point itself).
///
/// Returns one assignment per input point, in input order. Cluster ordinals
/// are dense, starting at 0, numbered in ascending-id scan order.
///
/// Border points are allowed: a point tentatively labeled noise joins a
/// cluster if it later turns out to be density-reachable from a core point.
///
/// The ε-query runs against an R-tree with a degree-padded envelope wide
/// enough that every point with `d <= eps_km` is examined, so assignments
/// are identical to a naive O(n²) scan, equal-distance ties included.
pub fn dbscan(points: &[DbscanPoint], eps_km: f64, min_pts: usize) -> Vec<ClusterAssignment> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }

    let tree = RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedPoint {
                idx,
                lat: p.lat,
                lng: p.lng,
            })
            .collect(),
    );

    // Scan order fixed by ascending point id.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| points[i].id);

    let mut visited = vec![false; n];
    let mut assignment: Vec<Option<usize>> = vec![None; n];
    let mut next_cluster = 0usize;

    for &seed in &order {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;

        let neighbors = region_query(points, &tree, seed, eps_km);
        if neighbors.len() < min_pts {
            // Tentative noise; may still become a border point later.
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        assignment[seed] = Some(cluster);

        let mut queue: VecDeque<usize> = neighbors.into();
        while let Some(q) = queue.pop_front() {
            if !visited[q] {
                visited[q] = true;
                let q_neighbors = region_query(points, &tree, q, eps_km);
                if q_neighbors.len() >= min_pts {
                    queue.extend(q_neighbors);
                }
            }
            if assignment[q].is_none() {
                assignment[q] = Some(cluster);
            }
        }
    }

    assignment
        .into_iter()
        .map(|a| match a {
            Some(c) => ClusterAssignment::Cluster(c),
            None => ClusterAssignment::Noise,
        })
        .collect()
}

/// Collect cluster member indices from an assignment vector.
///
/// Element `c` of the result lists the input indices assigned to cluster
/// ordinal `c`, in input order.
pub fn cluster_members(assignments: &[ClusterAssignment]) -> Vec<Vec<usize>> {
    let count = assignments
        .iter()
        .filter_map(|a| a.cluster())
        .max()
        .map_or(0, |c| c + 1);

    let mut members = vec![Vec::new(); count];
    for (idx, assignment) in assignments.iter().enumerate() {
        if let Some(c) = assignment.cluster() {
            members[c].push(idx);
        }
    }
    members
}

/// All points within `eps_km` of `points[center]`, excluding the point
/// itself, ordered by ascending point id.
fn region_query(
    points: &[DbscanPoint],
    tree: &RTree<IndexedPoint>,
    center: usize,
    eps_km: f64,
) -> Vec<usize> {
    // The envelope must never exclude a point within eps; pad the linear
    // degree conversion and evaluate the cosine at the band edge, where one
    // degree of longitude is shortest.
    const PAD_MARGIN: f64 = 1.01;

    let p = &points[center];
    let lat_pad = km_to_lat_degrees(eps_km) * PAD_MARGIN;
    let band_lat = (p.lat.abs() + lat_pad).min(90.0);
    let lng_pad = km_to_lng_degrees(eps_km, band_lat) * PAD_MARGIN;

    let min_lng = p.lng - lng_pad;
    let max_lng = p.lng + lng_pad;

    // A window crossing the antimeridian is split into two envelopes so the
    // index query sees the same candidates the naive scan would.
    let mut envelopes = vec![AABB::from_corners(
        [p.lat - lat_pad, min_lng.max(-180.0)],
        [p.lat + lat_pad, max_lng.min(180.0)],
    )];
    if min_lng < -180.0 {
        envelopes.push(AABB::from_corners(
            [p.lat - lat_pad, min_lng + 360.0],
            [p.lat + lat_pad, 180.0],
        ));
    }
    if max_lng > 180.0 {
        envelopes.push(AABB::from_corners(
            [p.lat - lat_pad, -180.0],
            [p.lat + lat_pad, max_lng - 360.0],
        ));
    }

    let mut neighbors: Vec<usize> = envelopes
        .iter()
        .flat_map(|envelope| tree.locate_in_envelope_intersecting(envelope))
        .filter(|q| {
            q.idx != center && haversine_distance_km(p.lat, p.lng, q.lat, q.lng) <= eps_km
        })
        .map(|q| q.idx)
        .collect();

    neighbors.sort_unstable_by_key(|&i| points[i].id);
    neighbors.dedup();
    neighbors
}
