//! In-memory reference store.
//!
//! Backs the batch pipeline in tests and the debug CLI. All records live in
//! a single `RwLock`-guarded state; reads take snapshots, writes assign ids
//! from per-entity sequences in insertion order so re-runs are reproducible.

use std::collections::BTreeSet;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{CancelToken, Store, StoreError, StoreResult};
use crate::{Framework, GpsFix, StayPoint, Trajectory, User, UserGraph};

#[derive(Debug, Clone)]
struct TrajectoryRecord {
    trajectory: Trajectory,
    #[allow(dead_code)]
    start_time: DateTime<Utc>,
    #[allow(dead_code)]
    end_time: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: Vec<User>,
    trajectories: Vec<TrajectoryRecord>,
    stay_points: Vec<StayPoint>,
    frameworks: Vec<Framework>,
    graphs: Vec<UserGraph>,

    next_user_id: u64,
    next_trajectory_id: u64,
    next_stay_point_id: u64,
    next_framework_id: u64,
    next_layer_id: u64,
    next_cluster_id: u64,
    next_graph_id: u64,
    next_node_id: u64,
    next_edge_id: u64,
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }
}

impl Store for MemoryStore {
    fn find_or_create_user(
        &self,
        folder: &str,
        cancel: &CancelToken,
    ) -> StoreResult<(User, bool)> {
        cancel.check()?;
        let mut state = self.write()?;

        if let Some(user) = state.users.iter().find(|u| u.folder == folder).cloned() {
            let imported = state
                .trajectories
                .iter()
                .any(|t| t.trajectory.user_id == user.id);
            return Ok((user, imported));
        }

        state.next_user_id += 1;
        let user = User {
            id: state.next_user_id,
            folder: folder.to_string(),
        };
        state.users.push(user.clone());
        Ok((user, false))
    }

    fn users(&self, cancel: &CancelToken) -> StoreResult<Vec<User>> {
        cancel.check()?;
        let state = self.read()?;
        let mut users = state.users.clone();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    fn user_count(&self, cancel: &CancelToken) -> StoreResult<usize> {
        cancel.check()?;
        Ok(self.read()?.users.len())
    }

    fn insert_trajectory(
        &self,
        user_id: u64,
        fixes: Vec<GpsFix>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> StoreResult<u64> {
        cancel.check()?;
        let mut state = self.write()?;

        if !state.users.iter().any(|u| u.id == user_id) {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }

        state.next_trajectory_id += 1;
        let id = state.next_trajectory_id;
        state.trajectories.push(TrajectoryRecord {
            trajectory: Trajectory {
                id,
                user_id,
                fixes,
            },
            start_time,
            end_time,
        });
        Ok(id)
    }

    fn trajectories_for_user(
        &self,
        user_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<Trajectory>> {
        cancel.check()?;
        let state = self.read()?;
        Ok(state
            .trajectories
            .iter()
            .filter(|t| t.trajectory.user_id == user_id)
            .map(|t| t.trajectory.clone())
            .collect())
    }

    fn batch_insert_stay_points(
        &self,
        stay_points: Vec<StayPoint>,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<u64>> {
        cancel.check()?;
        let mut state = self.write()?;

        let mut ids = Vec::with_capacity(stay_points.len());
        for mut sp in stay_points {
            state.next_stay_point_id += 1;
            sp.id = state.next_stay_point_id;
            ids.push(sp.id);
            state.stay_points.push(sp);
        }
        Ok(ids)
    }

    fn all_stay_points(&self, cancel: &CancelToken) -> StoreResult<Vec<StayPoint>> {
        cancel.check()?;
        let state = self.read()?;
        let mut stay_points = state.stay_points.clone();
        stay_points.sort_by_key(|sp| (sp.user_id, sp.arrival, sp.id));
        Ok(stay_points)
    }

    fn stay_points_for_user(
        &self,
        user_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<StayPoint>> {
        cancel.check()?;
        let state = self.read()?;
        let mut stay_points: Vec<StayPoint> = state
            .stay_points
            .iter()
            .filter(|sp| sp.user_id == user_id)
            .cloned()
            .collect();
        stay_points.sort_by_key(|sp| (sp.arrival, sp.id));
        Ok(stay_points)
    }

    fn create_framework(
        &self,
        mut framework: Framework,
        cancel: &CancelToken,
    ) -> StoreResult<Framework> {
        cancel.check()?;
        let mut state = self.write()?;

        state.next_framework_id += 1;
        framework.id = state.next_framework_id;
        for layer in &mut framework.layers {
            state.next_layer_id += 1;
            layer.id = state.next_layer_id;
            layer.framework_id = framework.id;
            for cluster in &mut layer.clusters {
                state.next_cluster_id += 1;
                cluster.id = state.next_cluster_id;
                cluster.framework_id = framework.id;
                cluster.layer_id = layer.id;
            }
        }

        state.frameworks.push(framework.clone());
        Ok(framework)
    }

    fn latest_framework(&self, cancel: &CancelToken) -> StoreResult<Option<Framework>> {
        cancel.check()?;
        Ok(self.read()?.frameworks.last().cloned())
    }

    fn create_user_graph(
        &self,
        mut graph: UserGraph,
        cancel: &CancelToken,
    ) -> StoreResult<UserGraph> {
        cancel.check()?;
        let mut state = self.write()?;

        if state
            .graphs
            .iter()
            .any(|g| g.user_id == graph.user_id && g.framework_id == graph.framework_id)
        {
            return Err(StoreError::Conflict(format!(
                "graph for user {} over framework {} already exists",
                graph.user_id, graph.framework_id
            )));
        }

        state.next_graph_id += 1;
        graph.id = state.next_graph_id;
        for node in &mut graph.nodes {
            state.next_node_id += 1;
            node.id = state.next_node_id;
        }
        for edge in &mut graph.edges {
            state.next_edge_id += 1;
            edge.id = state.next_edge_id;
        }

        state.graphs.push(graph.clone());
        Ok(graph)
    }

    fn user_graph(
        &self,
        user_id: u64,
        framework_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Option<UserGraph>> {
        cancel.check()?;
        let state = self.read()?;
        Ok(state
            .graphs
            .iter()
            .find(|g| g.user_id == user_id && g.framework_id == framework_id)
            .cloned())
    }

    fn user_graphs(
        &self,
        framework_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<UserGraph>> {
        cancel.check()?;
        let state = self.read()?;
        let mut graphs: Vec<UserGraph> = state
            .graphs
            .iter()
            .filter(|g| g.framework_id == framework_id)
            .cloned()
            .collect();
        graphs.sort_by_key(|g| g.user_id);
        Ok(graphs)
    }

    fn visited_clusters(
        &self,
        user_id: u64,
        framework_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<BTreeSet<u64>> {
        cancel.check()?;
        let state = self.read()?;
        Ok(state
            .graphs
            .iter()
            .filter(|g| g.user_id == user_id && g.framework_id == framework_id)
            .flat_map(|g| g.nodes.iter().map(|n| n.cluster_id))
            .collect())
    }

    fn cluster_user_count(&self, cluster_id: u64, cancel: &CancelToken) -> StoreResult<u32> {
        cancel.check()?;
        let state = self.read()?;
        state
            .frameworks
            .iter()
            .flat_map(|f| f.layers.iter())
            .flat_map(|l| l.clusters.iter())
            .find(|c| c.id == cluster_id)
            .map(|c| c.visit_count)
            .ok_or_else(|| StoreError::NotFound(format!("cluster {cluster_id}")))
    }
}
