//! # Mining Engine
//!
//! Orchestrates the offline batch pipeline over a [`Store`] and serves the
//! two queries the derived artifacts exist for: hot-spot lookup and
//! collaborative recommendation.
//!
//! ## Phases
//!
//! 1. `import` - walk a Geolife directory, persist trajectories, detect and
//!    persist stay points
//! 2. `build_framework` - multi-scale clustering over all stay points
//! 3. `build_user_graphs` - one temporal graph per user, computed in
//!    parallel over the shared immutable framework, persisted sequentially
//!
//! Failure policy: malformed input is skipped; a failed store call is
//! retried once, then fails that user's unit of work and the batch moves
//! on; invariant violations abort the phase; cancellation surfaces from
//! any store call.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use log::{info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{MiningError, Result};
use crate::geo_utils::{haversine_distance_km, km_to_lat_degrees, km_to_lng_degrees};
use crate::recommend::{rank_candidates, Recommendation};
use crate::similarity::similarity_score;
use crate::store::{CancelToken, Store, StoreError, StoreResult};
use crate::{
    build_framework, build_user_graph, geolife, staypoint, Cluster, Framework, MiningConfig,
    UserGraph,
};

/// Counters reported by an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub users_imported: u32,
    pub users_skipped: u32,
    pub users_failed: u32,
    pub trajectories: u32,
    pub stay_points: u32,
}

/// Cluster center wrapper for the hot-spot R-tree.
#[derive(Debug, Clone)]
struct ClusterPoint {
    cluster_idx: usize,
    lat: f64,
    lng: f64,
}

impl RTreeObject for ClusterPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lng])
    }
}

/// Batch pipeline orchestrator and query surface.
///
/// The framework and the per-user graphs are loaded once and shared
/// immutably across similarity and recommendation computations; pairwise
/// similarities are memoized in a read-mostly map keyed by `(low, high)`
/// user id.
pub struct MiningEngine<S: Store> {
    store: S,
    config: MiningConfig,

    framework: Option<Arc<Framework>>,
    graphs: Option<Arc<Vec<UserGraph>>>,
    hotspot_tree: Option<RTree<ClusterPoint>>,
    similarity_cache: RwLock<HashMap<(u64, u64), f64>>,
}

impl<S: Store> MiningEngine<S> {
    /// Create an engine with default configuration.
    pub fn new(store: S) -> Self {
        Self::with_config(store, MiningConfig::default())
    }

    /// Create an engine with custom configuration.
    pub fn with_config(store: S, config: MiningConfig) -> Self {
        Self {
            store,
            config,
            framework: None,
            graphs: None,
            hotspot_tree: None,
            similarity_cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    // ========================================================================
    // Phase 1: import
    // ========================================================================

    /// Import a Geolife directory tree: find-or-create each user, persist
    /// trajectories, detect and persist stay points.
    ///
    /// Users whose data was already imported are skipped. Malformed `.plt`
    /// files are logged and skipped. A store failure after one retry fails
    /// the user's remaining work and the import continues with the next
    /// user.
    pub fn import(&mut self, root: &Path, cancel: &CancelToken) -> Result<ImportStats> {
        let folders = geolife::user_folders(root)?;
        info!("importing {} user folders from {}", folders.len(), root.display());

        let mut stats = ImportStats::default();
        for (folder, files) in folders {
            match self.import_user(&folder, &files, cancel) {
                Ok(Some((trajectories, stay_points))) => {
                    stats.users_imported += 1;
                    stats.trajectories += trajectories;
                    stats.stay_points += stay_points;
                }
                Ok(None) => stats.users_skipped += 1,
                Err(e) if e.is_cancelled() => return Err(MiningError::Cancelled),
                Err(e) => {
                    warn!("user {folder}: import failed: {e}");
                    stats.users_failed += 1;
                }
            }
        }

        info!(
            "import done: {} users, {} trajectories, {} stay points ({} skipped, {} failed)",
            stats.users_imported,
            stats.trajectories,
            stats.stay_points,
            stats.users_skipped,
            stats.users_failed
        );
        Ok(stats)
    }

    /// Import one user folder. `Ok(None)` when the user was already imported.
    fn import_user(
        &self,
        folder: &str,
        files: &[std::path::PathBuf],
        cancel: &CancelToken,
    ) -> Result<Option<(u32, u32)>> {
        let (user, already_imported) =
            with_retry(|| self.store.find_or_create_user(folder, cancel))?;
        if already_imported {
            info!("user {folder}: already imported, skipping");
            return Ok(None);
        }

        let mut trajectories = 0u32;
        let mut stay_point_total = 0u32;

        for path in files {
            let fixes = match geolife::parse_plt(path) {
                Ok(fixes) => fixes,
                Err(e) => {
                    warn!("skipping {}: {e}", path.display());
                    continue;
                }
            };
            let Some((start, end)) = geolife::time_span(&fixes) else {
                continue;
            };

            let trajectory_id = with_retry(|| {
                self.store
                    .insert_trajectory(user.id, fixes.clone(), start, end, cancel)
            })?;
            trajectories += 1;

            let mut stay_points =
                staypoint::detect_stay_points(&fixes, &self.config.stay_point);
            for sp in &mut stay_points {
                sp.user_id = user.id;
                sp.trajectory_id = trajectory_id;
            }
            if !stay_points.is_empty() {
                stay_point_total += stay_points.len() as u32;
                with_retry(|| self.store.batch_insert_stay_points(stay_points.clone(), cancel))?;
            }
        }

        Ok(Some((trajectories, stay_point_total)))
    }

    // ========================================================================
    // Phase 2: framework build
    // ========================================================================

    /// Cluster all stay points into a hierarchical framework and persist it.
    ///
    /// The built framework is validated before anything is written; a
    /// violation refuses to emit the artifact.
    pub fn build_framework(&mut self, cancel: &CancelToken) -> Result<Arc<Framework>> {
        let stay_points = with_retry(|| self.store.all_stay_points(cancel))?;
        info!("building framework from {} stay points", stay_points.len());

        let framework = build_framework(&stay_points, &self.config.framework);
        framework.validate()?;

        let stored = with_retry(|| self.store.create_framework(framework.clone(), cancel))?;
        let framework = Arc::new(stored);

        self.install_framework(Arc::clone(&framework));
        Ok(framework)
    }

    /// Build and persist one graph per user over the current framework.
    ///
    /// Graphs are computed in parallel from read-only inputs, then written
    /// sequentially. One user's failure never poisons another's graph.
    /// Returns the number of graphs persisted.
    pub fn build_user_graphs(&mut self, cancel: &CancelToken) -> Result<usize> {
        let framework = self.ensure_framework(cancel)?;
        let users = with_retry(|| self.store.users(cancel))?;

        // Gather inputs up front so the compute fan-out never touches the store.
        let mut inputs = Vec::with_capacity(users.len());
        for user in &users {
            match with_retry(|| self.store.stay_points_for_user(user.id, cancel)) {
                Ok(stay_points) => inputs.push((user.id, stay_points)),
                Err(StoreError::Cancelled) => return Err(MiningError::Cancelled),
                Err(e) => warn!("user {}: skipping graph build: {e}", user.id),
            }
        }

        let grouping = &self.config.grouping;
        let build = |(user_id, stay_points): &(u64, Vec<crate::StayPoint>)| {
            build_user_graph(*user_id, stay_points, &framework, grouping)
        };

        #[cfg(feature = "parallel")]
        let graphs: Vec<UserGraph> = inputs.par_iter().map(build).collect();
        #[cfg(not(feature = "parallel"))]
        let graphs: Vec<UserGraph> = inputs.iter().map(build).collect();

        let mut persisted = 0usize;
        for graph in graphs {
            let user_id = graph.user_id;
            if let Err(e) = graph.validate(&framework) {
                warn!("user {user_id}: graph failed validation: {e}");
                continue;
            }
            match with_retry(|| self.store.create_user_graph(graph.clone(), cancel)) {
                Ok(_) => persisted += 1,
                Err(StoreError::Cancelled) => return Err(MiningError::Cancelled),
                Err(e) => warn!("user {user_id}: graph not persisted: {e}"),
            }
        }

        info!("persisted {persisted} user graphs");
        self.graphs = None; // force reload including the new graphs
        if let Ok(mut cache) = self.similarity_cache.write() {
            cache.clear();
        }
        Ok(persisted)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Similarity `S(p, q)` between two users over the current framework,
    /// memoized per unordered user pair. Users without a graph score 0.
    pub fn similarity(&mut self, user_p: u64, user_q: u64, cancel: &CancelToken) -> Result<f64> {
        self.ensure_artifacts(cancel)?;
        let total_users = with_retry(|| self.store.user_count(cancel))?;
        Ok(self.similarity_cached(user_p, user_q, total_users))
    }

    /// Top-N recommendation of unvisited clusters for a user.
    pub fn recommend(&mut self, user_id: u64, cancel: &CancelToken) -> Result<Vec<Recommendation>> {
        self.ensure_artifacts(cancel)?;
        let total_users = with_retry(|| self.store.user_count(cancel))?;

        let (Some(framework), Some(graphs)) = (self.framework.clone(), self.graphs.clone()) else {
            return Ok(Vec::new());
        };

        let Some(user_graph) = graphs.iter().find(|g| g.user_id == user_id) else {
            return Ok(Vec::new());
        };

        let mut friends: Vec<(f64, &UserGraph)> = graphs
            .iter()
            .filter(|g| g.user_id != user_id)
            .filter_map(|g| {
                let s = self.similarity_cached(user_id, g.user_id, total_users);
                (s >= self.config.recommend.min_similarity).then_some((s, g))
            })
            .collect();
        friends.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.user_id.cmp(&b.1.user_id))
        });

        Ok(rank_candidates(
            user_graph,
            &friends,
            &framework,
            &self.config.recommend,
        ))
    }

    /// Bottom-layer clusters whose center lies within `radius_km` of the
    /// query coordinate, ordered by distinct-user count descending then id.
    pub fn hotspots(
        &mut self,
        lat: f64,
        lng: f64,
        radius_km: f64,
        cancel: &CancelToken,
    ) -> Result<Vec<Cluster>> {
        let framework = self.ensure_framework(cancel)?;
        let Some(bottom) = framework.bottom_layer() else {
            return Ok(Vec::new());
        };
        let Some(tree) = &self.hotspot_tree else {
            return Ok(Vec::new());
        };

        // Slightly over-cover the search window; candidates are filtered by
        // exact distance below.
        let lat_pad = km_to_lat_degrees(radius_km) * 1.01;
        let lng_pad = km_to_lng_degrees(radius_km, (lat.abs() + lat_pad).min(90.0)) * 1.01;
        let envelope =
            AABB::from_corners([lat - lat_pad, lng - lng_pad], [lat + lat_pad, lng + lng_pad]);

        let mut hits: Vec<Cluster> = tree
            .locate_in_envelope_intersecting(&envelope)
            .filter(|p| haversine_distance_km(lat, lng, p.lat, p.lng) <= radius_km)
            .map(|p| bottom.clusters[p.cluster_idx].clone())
            .collect();

        hits.sort_by(|a, b| b.visit_count.cmp(&a.visit_count).then(a.id.cmp(&b.id)));
        Ok(hits)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Load the latest framework from the store if none is cached.
    fn ensure_framework(&mut self, cancel: &CancelToken) -> Result<Arc<Framework>> {
        if let Some(framework) = &self.framework {
            return Ok(Arc::clone(framework));
        }
        let Some(framework) = with_retry(|| self.store.latest_framework(cancel))? else {
            return Err(MiningError::InvariantViolated(
                "no framework has been built".into(),
            ));
        };
        let framework = Arc::new(framework);
        self.install_framework(Arc::clone(&framework));
        Ok(framework)
    }

    /// Warm the framework and graph caches from the store.
    fn ensure_artifacts(&mut self, cancel: &CancelToken) -> Result<()> {
        let framework = self.ensure_framework(cancel)?;
        if self.graphs.is_none() {
            let graphs = with_retry(|| self.store.user_graphs(framework.id, cancel))?;
            self.graphs = Some(Arc::new(graphs));
        }
        Ok(())
    }

    /// Replace the cached framework and dependent indices.
    fn install_framework(&mut self, framework: Arc<Framework>) {
        self.hotspot_tree = framework.bottom_layer().map(|bottom| {
            RTree::bulk_load(
                bottom
                    .clusters
                    .iter()
                    .enumerate()
                    .map(|(cluster_idx, c)| ClusterPoint {
                        cluster_idx,
                        lat: c.center_lat,
                        lng: c.center_lng,
                    })
                    .collect(),
            )
        });
        self.framework = Some(framework);
        self.graphs = None;
        if let Ok(mut cache) = self.similarity_cache.write() {
            cache.clear();
        }
    }

    /// Memoized pairwise similarity over the cached artifacts. Per-pair
    /// failures (missing graphs, poisoned cache) degrade to 0.
    fn similarity_cached(&self, user_p: u64, user_q: u64, total_users: usize) -> f64 {
        let key = (user_p.min(user_q), user_p.max(user_q));
        if let Ok(cache) = self.similarity_cache.read() {
            if let Some(&score) = cache.get(&key) {
                return score;
            }
        }

        let (Some(framework), Some(graphs)) = (&self.framework, &self.graphs) else {
            return 0.0;
        };
        let (Some(graph_p), Some(graph_q)) = (
            graphs.iter().find(|g| g.user_id == user_p),
            graphs.iter().find(|g| g.user_id == user_q),
        ) else {
            return 0.0;
        };

        let score = similarity_score(
            graph_p,
            graph_q,
            framework,
            total_users,
            &self.config.similarity,
        );
        if let Ok(mut cache) = self.similarity_cache.write() {
            cache.insert(key, score);
        }
        score
    }
}

/// Run a store operation, retrying exactly once on transient failure.
/// Cancellation and write-once conflicts are never retried.
fn with_retry<T>(mut op: impl FnMut() -> StoreResult<T>) -> StoreResult<T> {
    match op() {
        Ok(value) => Ok(value),
        Err(StoreError::Cancelled) => Err(StoreError::Cancelled),
        Err(StoreError::Conflict(msg)) => Err(StoreError::Conflict(msg)),
        Err(first) => {
            warn!("store operation failed, retrying once: {first}");
            op()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::{GpsFix, StayPoint};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(day: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2009, 4, day, 9, 0, 0).unwrap() + Duration::minutes(minute as i64)
    }

    /// Seed a user with a cluster-worth of stay points at (lat, lng).
    fn seed_user(store: &MemoryStore, folder: &str, lat: f64, lng: f64, day: u32) -> u64 {
        let cancel = CancelToken::new();
        let (user, _) = store.find_or_create_user(folder, &cancel).unwrap();
        let fixes: Vec<GpsFix> = (0..3)
            .map(|i| GpsFix::new(lat, lng, 50.0, t(day, i * 20)))
            .collect();
        let trajectory_id = store
            .insert_trajectory(user.id, fixes, t(day, 0), t(day, 40), &cancel)
            .unwrap();

        let stay_points: Vec<StayPoint> = (0..3)
            .map(|i| StayPoint {
                id: 0,
                user_id: user.id,
                trajectory_id,
                latitude: lat,
                longitude: lng,
                arrival: t(day, i * 60),
                departure: t(day, i * 60 + 40),
            })
            .collect();
        store.batch_insert_stay_points(stay_points, &cancel).unwrap();
        user.id
    }

    #[test]
    fn test_framework_then_graphs() {
        let store = MemoryStore::new();
        let a = seed_user(&store, "000", 39.90, 116.40, 10);
        let b = seed_user(&store, "001", 39.90, 116.40, 11);

        let mut engine = MiningEngine::new(store);
        let cancel = CancelToken::new();

        let framework = engine.build_framework(&cancel).unwrap();
        assert!(!framework.layers.is_empty());
        let bottom = framework.bottom_layer().unwrap();
        assert_eq!(bottom.clusters.len(), 1);
        assert_eq!(bottom.clusters[0].visit_count, 2);

        let built = engine.build_user_graphs(&cancel).unwrap();
        assert_eq!(built, 2);

        let graph_a = engine
            .store()
            .user_graph(a, framework.id, &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(graph_a.nodes.len(), 1);
        assert_eq!(graph_a.nodes[0].visit_count, 3);

        let graph_b = engine
            .store()
            .user_graph(b, framework.id, &cancel)
            .unwrap()
            .unwrap();
        assert_eq!(graph_b.nodes[0].cluster_id, graph_a.nodes[0].cluster_id);
    }

    #[test]
    fn test_hotspots_ordered_by_popularity() {
        let store = MemoryStore::new();
        seed_user(&store, "000", 39.90, 116.40, 10);
        seed_user(&store, "001", 39.90, 116.40, 11);
        seed_user(&store, "002", 39.95, 116.40, 12);

        let mut engine = MiningEngine::new(store);
        let cancel = CancelToken::new();
        engine.build_framework(&cancel).unwrap();

        let hits = engine.hotspots(39.92, 116.40, 10.0, &cancel).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].visit_count >= hits[1].visit_count);
        assert_eq!(hits[0].visit_count, 2);

        let none = engine.hotspots(0.0, 0.0, 10.0, &cancel).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_cancellation_surfaces() {
        let store = MemoryStore::new();
        seed_user(&store, "000", 39.90, 116.40, 10);

        let mut engine = MiningEngine::new(store);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = engine.build_framework(&cancel).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_recommend_without_graph_is_empty() {
        let store = MemoryStore::new();
        seed_user(&store, "000", 39.90, 116.40, 10);

        let mut engine = MiningEngine::new(store);
        let cancel = CancelToken::new();
        engine.build_framework(&cancel).unwrap();
        engine.build_user_graphs(&cancel).unwrap();

        // User id 99 has no graph.
        let recs = engine.recommend(99, &cancel).unwrap();
        assert!(recs.is_empty());
    }
}
