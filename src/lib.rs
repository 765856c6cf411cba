//! # staygraph
//!
//! Mining of personal location history from raw GPS trajectories.
//!
//! This library provides:
//! - Stay-point detection from time-ordered GPS streams
//! - Density-based multi-scale clustering of stay points (geodesic DBSCAN)
//! - Hierarchical shared frameworks of nested regions of interest
//! - Per-user temporal graphs over the framework's bottom layer
//! - IDF-weighted sequence similarity between users
//! - Collaborative top-N recommendation of unvisited regions
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel batch phases with rayon (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use staygraph::{staypoint::detect_stay_points, GpsFix, StayPointConfig};
//!
//! // Five fixes at one spot, spanning 44 minutes
//! let t0 = Utc.with_ymd_and_hms(2009, 4, 12, 9, 0, 0).unwrap();
//! let fixes: Vec<GpsFix> = (0..5)
//!     .map(|i| GpsFix::new(39.9, 116.4, 50.0, t0 + Duration::minutes(i * 11)))
//!     .collect();
//!
//! let stays = detect_stay_points(&fixes, &StayPointConfig::default());
//! assert_eq!(stays.len(), 1);
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{MiningError, Result};

// Geographic utilities (haversine distance, centroids, bounds)
pub mod geo_utils;

// Stay-point detection from GPS streams
pub mod staypoint;
pub use staypoint::detect_stay_points;

// Geodesic DBSCAN kernel
pub mod dbscan;
pub use dbscan::{dbscan, ClusterAssignment, DbscanPoint};

// Hierarchical framework builder (multi-scale clustering)
pub mod framework;
pub use framework::build_framework;

// Spatio-temporal grouping of one user's stay points
pub mod grouping;
pub use grouping::group_stay_points;

// Per-user temporal graph builder
pub mod graph;
pub use graph::build_user_graph;

// Sequence similarity between users
pub mod similarity;
pub use similarity::similarity_score;

// Collaborative recommendation
pub mod recommend;
pub use recommend::{recommend, Recommendation};

// Geolife .plt trajectory source
pub mod geolife;

// Store boundary: persistence trait, cancellation, in-memory reference store
pub mod store;
pub use store::{CancelToken, MemoryStore, Store, StoreError, StoreResult};

// Batch pipeline orchestration and query surface
pub mod engine;
pub use engine::MiningEngine;

// ============================================================================
// Core Types
// ============================================================================

/// A single GPS observation.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use staygraph::GpsFix;
/// let fix = GpsFix::new(39.9, 116.4, 55.0, Utc.with_ymd_and_hms(2009, 4, 12, 9, 0, 0).unwrap());
/// assert!(fix.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude in meters
    pub altitude: f64,
    pub timestamp: DateTime<Utc>,
}

impl GpsFix {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            timestamp,
        }
    }

    /// Check whether the fix carries plausible coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// An imported user, keyed by the stable Geolife folder name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    /// Natural key: the `Data/<folder>` directory name the user was imported from.
    pub folder: String,
}

/// A time-ordered GPS trajectory. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trajectory {
    pub id: u64,
    pub user_id: u64,
    /// Fixes sorted by timestamp ascending.
    pub fixes: Vec<GpsFix>,
}

/// A dwell synthesized from a run of nearby fixes.
///
/// The centroid is the arithmetic mean of the forming fixes; `arrival` and
/// `departure` are the bounding fixes' timestamps, with `arrival < departure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StayPoint {
    pub id: u64,
    pub user_id: u64,
    pub trajectory_id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub arrival: DateTime<Utc>,
    pub departure: DateTime<Utc>,
}

impl StayPoint {
    /// Dwell duration.
    pub fn duration(&self) -> Duration {
        self.departure - self.arrival
    }
}

/// A DBSCAN output region at one framework layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: u64,
    pub framework_id: u64,
    pub layer_id: u64,
    pub center_lat: f64,
    pub center_lng: f64,
    /// Maximum great-circle distance from the center to any member, in km.
    pub radius_km: f64,
    /// Number of distinct users with a stay point in this cluster.
    pub visit_count: u32,
}

impl Cluster {
    /// Whether a coordinate lies within the cluster's radius of its center.
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        geo_utils::haversine_distance_km(self.center_lat, self.center_lng, lat, lng)
            <= self.radius_km
    }
}

/// One level of a hierarchical framework. All clusters in a layer were
/// produced with the same `eps * scale` radius parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Layer {
    pub id: u64,
    pub framework_id: u64,
    /// 1-based level; level 1 is the finest scale.
    pub level: u32,
    pub clusters: Vec<Cluster>,
}

/// The shared multi-scale clustering of all users' stay points.
///
/// Layers are independent coarse-grainings of the same stay-point set; no
/// parent/child links are stored. Containment relations are computed on
/// demand from centers and radii.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Framework {
    pub id: u64,
    /// Ordered by level ascending, level 1 first.
    pub layers: Vec<Layer>,
}

impl Framework {
    /// The finest layer (level 1), if any.
    pub fn bottom_layer(&self) -> Option<&Layer> {
        self.layers.first()
    }

    /// The layer at a 1-based level.
    pub fn layer_at(&self, level: u32) -> Option<&Layer> {
        self.layers.iter().find(|l| l.level == level)
    }

    /// Look up a cluster anywhere in the framework by id.
    pub fn cluster(&self, cluster_id: u64) -> Option<&Cluster> {
        self.layers
            .iter()
            .flat_map(|l| l.clusters.iter())
            .find(|c| c.id == cluster_id)
    }

    /// Structural invariant check: finite non-negative radii, at least one
    /// distinct user per cluster, strictly ascending levels.
    pub fn validate(&self) -> Result<()> {
        let mut prev_level = 0u32;
        for layer in &self.layers {
            if layer.level <= prev_level {
                return Err(MiningError::InvariantViolated(format!(
                    "layer levels not strictly ascending at level {}",
                    layer.level
                )));
            }
            prev_level = layer.level;
            for cluster in &layer.clusters {
                if !cluster.radius_km.is_finite() || cluster.radius_km < 0.0 {
                    return Err(MiningError::InvariantViolated(format!(
                        "cluster {} has invalid radius {}",
                        cluster.id, cluster.radius_km
                    )));
                }
                if cluster.visit_count == 0 {
                    return Err(MiningError::InvariantViolated(format!(
                        "cluster {} has zero distinct users",
                        cluster.id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A node in a user's graph: one visited bottom-layer cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: u64,
    /// References a bottom-layer (level 1) cluster of the framework.
    pub cluster_id: u64,
    /// Number of stay points aggregated into this node for this user.
    pub visit_count: u32,
    pub first_visit_at: DateTime<Utc>,
    pub last_visit_at: DateTime<Utc>,
}

/// A temporal transition between two consecutive visits.
///
/// Endpoints are indices into the owning graph's node arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: u64,
    pub from: usize,
    pub to: usize,
    /// Gap between leaving `from` and arriving at `to`, clamped to zero.
    pub transition_secs: i64,
    pub visit_count: u32,
}

/// A user's temporal graph over one framework. Exactly one per
/// `(user, framework)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGraph {
    pub id: u64,
    pub user_id: u64,
    pub framework_id: u64,
    /// Node arena, emitted in `first_visit_at` order.
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl UserGraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Check node/edge invariants against the owning framework: every node
    /// references an existing bottom-layer cluster, visit windows are
    /// ordered, and edges are temporally consistent.
    pub fn validate(&self, framework: &Framework) -> Result<()> {
        let bottom = framework.bottom_layer();
        for node in &self.nodes {
            let known = bottom
                .map(|l| l.clusters.iter().any(|c| c.id == node.cluster_id))
                .unwrap_or(false);
            if !known {
                return Err(MiningError::InvariantViolated(format!(
                    "graph node {} references unknown bottom-layer cluster {}",
                    node.id, node.cluster_id
                )));
            }
            if node.first_visit_at > node.last_visit_at {
                return Err(MiningError::InvariantViolated(format!(
                    "graph node {} has first_visit_at after last_visit_at",
                    node.id
                )));
            }
        }
        for edge in &self.edges {
            let (Some(from), Some(to)) = (self.nodes.get(edge.from), self.nodes.get(edge.to))
            else {
                return Err(MiningError::InvariantViolated(format!(
                    "graph edge {} references out-of-range node index",
                    edge.id
                )));
            };
            // Merged revisit nodes may overlap in time; the transition is
            // clamped at build, so only ordering of first visits is strict.
            if edge.transition_secs < 0 || from.first_visit_at > to.first_visit_at {
                return Err(MiningError::InvariantViolated(format!(
                    "graph edge {} is temporally inconsistent",
                    edge.id
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for stay-point detection.
#[derive(Debug, Clone)]
pub struct StayPointConfig {
    /// Maximum distance from the anchor fix for a dwell, in meters.
    /// Default: 200.0
    pub max_distance_m: f64,

    /// Minimum dwell duration; the comparison is strict (`>`).
    /// Default: 30 minutes
    pub min_duration: Duration,

    /// Cap on the inner scan window, in fixes. Bounds worst-case work on
    /// pathological traces; the scan normally breaks far earlier.
    /// Default: 1000
    pub scan_window: usize,
}

impl Default for StayPointConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 200.0,
            min_duration: Duration::minutes(30),
            scan_window: 1000,
        }
    }
}

/// Configuration for the hierarchical framework build.
#[derive(Debug, Clone)]
pub struct FrameworkConfig {
    /// Base DBSCAN neighborhood radius in kilometers.
    /// Default: 0.1
    pub eps_km: f64,

    /// Minimum neighborhood size (excluding the point itself) for a core point.
    /// Default: 2
    pub min_pts: usize,

    /// Multiplicative factors applied to `eps_km` per layer; the length
    /// fixes the number of layers L. Default: [1.0, 2.0, 4.0]
    pub scales: Vec<f64>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            eps_km: 0.1,
            min_pts: 2,
            scales: vec![1.0, 2.0, 4.0],
        }
    }
}

/// Configuration for spatio-temporal grouping of one user's stay points.
#[derive(Debug, Clone)]
pub struct GroupingConfig {
    /// Maximum distance between consecutive group members, in meters.
    /// Default: 200.0
    pub max_distance_m: f64,

    /// Maximum arrival gap between consecutive group members.
    /// Default: 24 hours
    pub max_gap: Duration,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            max_distance_m: 200.0,
            max_gap: Duration::hours(24),
        }
    }
}

/// Configuration for the similarity engine.
#[derive(Debug, Clone)]
pub struct SimilarityConfig {
    /// Upper clip for the IDF term, guarding against single-user clusters
    /// dominating the score. Default: 3.5
    pub idf_clip: f64,

    /// Maximum gap between consecutive nodes within one session.
    /// Default: 24 hours
    pub session_gap: Duration,

    /// Sessions longer than this are skipped during sequence matching.
    /// Default: 8
    pub max_match_len: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            idf_clip: 3.5,
            session_gap: Duration::hours(24),
            max_match_len: 8,
        }
    }
}

/// Configuration for the recommender.
#[derive(Debug, Clone)]
pub struct RecommendConfig {
    /// Minimum similarity for another user to count as a potential friend.
    /// Default: 0.5
    pub min_similarity: f64,

    /// Maximum number of recommended clusters returned.
    /// Default: 5
    pub top_n: usize,
}

impl Default for RecommendConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.5,
            top_n: 5,
        }
    }
}

/// Bundle of all pipeline configuration, with spec defaults.
#[derive(Debug, Clone, Default)]
pub struct MiningConfig {
    pub stay_point: StayPointConfig,
    pub framework: FrameworkConfig,
    pub grouping: GroupingConfig,
    pub similarity: SimilarityConfig,
    pub recommend: RecommendConfig,
}
