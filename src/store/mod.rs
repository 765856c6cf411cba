//! Store boundary: abstract persistence for users, trajectories, stay
//! points, frameworks and user graphs.
//!
//! The analytical core is compute-bound; the store is its only suspension
//! point. Every operation takes a [`CancelToken`] and must return promptly
//! once cancellation is observed. Implementations are expected to be
//! swappable (relational backend, in-memory mock) behind this trait.

mod memory;
pub use memory::MemoryStore;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{Framework, GpsFix, StayPoint, Trajectory, User, UserGraph};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not serve the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A write-once record was written twice.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Cooperative cancellation was observed before the operation ran.
    #[error("operation cancelled")]
    Cancelled,
}

/// Cooperative cancellation signal shared between a controller and the
/// batch pipeline. Cloning shares the underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; visible to all clones.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail fast with [`StoreError::Cancelled`] once cancellation is set.
    pub fn check(&self) -> StoreResult<()> {
        if self.is_cancelled() {
            Err(StoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Abstract persistence used by the mining pipeline.
///
/// Implementations must be `Send + Sync`; the pipeline shares one store
/// across parallel phases. Writes are write-once: records are never mutated
/// after creation, and idempotency of full re-runs is the recovery contract
/// (no rollback on cancellation).
pub trait Store: Send + Sync {
    /// Find a user by folder natural key, creating one if absent. The
    /// second result is true when the user already has at least one
    /// trajectory (data previously imported).
    fn find_or_create_user(&self, folder: &str, cancel: &CancelToken)
        -> StoreResult<(User, bool)>;

    /// All users, ordered by id.
    fn users(&self, cancel: &CancelToken) -> StoreResult<Vec<User>>;

    /// Total number of users in the system.
    fn user_count(&self, cancel: &CancelToken) -> StoreResult<usize>;

    /// Atomically insert a trajectory with its fixes and time span.
    fn insert_trajectory(
        &self,
        user_id: u64,
        fixes: Vec<GpsFix>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> StoreResult<u64>;

    /// A user's trajectories, ordered by id.
    fn trajectories_for_user(
        &self,
        user_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<Trajectory>>;

    /// Atomically insert one trajectory's stay points. Returns assigned ids.
    fn batch_insert_stay_points(
        &self,
        stay_points: Vec<StayPoint>,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<u64>>;

    /// All stay points, in stable `(user_id, arrival)` order.
    fn all_stay_points(&self, cancel: &CancelToken) -> StoreResult<Vec<StayPoint>>;

    /// One user's stay points, ordered by arrival.
    fn stay_points_for_user(
        &self,
        user_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Vec<StayPoint>>;

    /// Persist a framework, assigning ids to it, its layers and clusters
    /// (relative order preserved). Write-once: stored frameworks are never
    /// mutated.
    fn create_framework(
        &self,
        framework: Framework,
        cancel: &CancelToken,
    ) -> StoreResult<Framework>;

    /// The most recently created framework, if any.
    fn latest_framework(&self, cancel: &CancelToken) -> StoreResult<Option<Framework>>;

    /// Persist a user graph, assigning ids to it, its nodes and edges.
    /// Write-once per `(user, framework)` pair; a second write conflicts.
    fn create_user_graph(
        &self,
        graph: UserGraph,
        cancel: &CancelToken,
    ) -> StoreResult<UserGraph>;

    /// One user's graph over a framework, if built.
    fn user_graph(
        &self,
        user_id: u64,
        framework_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<Option<UserGraph>>;

    /// All graphs over a framework, ordered by user id.
    fn user_graphs(&self, framework_id: u64, cancel: &CancelToken)
        -> StoreResult<Vec<UserGraph>>;

    /// Bottom-layer cluster ids a user has a graph node for.
    fn visited_clusters(
        &self,
        user_id: u64,
        framework_id: u64,
        cancel: &CancelToken,
    ) -> StoreResult<BTreeSet<u64>>;

    /// Distinct users visiting a cluster (precomputed at framework build).
    fn cluster_user_count(&self, cluster_id: u64, cancel: &CancelToken) -> StoreResult<u32>;
}
