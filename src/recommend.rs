//! Collaborative recommendation of unvisited clusters.
//!
//! Ranks bottom-layer clusters a user has never visited by how often and
//! how enthusiastically similar users ("potential friends") visit them.

use std::collections::{BTreeSet, HashMap};

use crate::similarity::similarity_score;
use crate::{Framework, RecommendConfig, SimilarityConfig, UserGraph};

/// A recommended cluster with its predicted score.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Recommendation {
    pub cluster_id: u64,
    pub score: f64,
}

/// Recommend up to `top_n` unvisited bottom-layer clusters for a user.
///
/// `graphs` holds every user graph over `framework` (the target user's
/// included). Potential friends are the other users with similarity at or
/// above `min_similarity`, in descending similarity order. Candidate
/// clusters are those visited by any friend but not by the user; each is
/// scored
///
/// ```text
/// score(c) = cluster.visit_count * sum_{v : friend visiting c} S(u, v) * node_visit_count(v, c)
/// ```
///
/// and the top `top_n` by descending score (ties to the lower cluster id)
/// are returned. A user without a graph, or without qualifying friends,
/// gets an empty result; neither case is an error.
pub fn recommend(
    user_id: u64,
    graphs: &[UserGraph],
    framework: &Framework,
    total_users: usize,
    sim_config: &SimilarityConfig,
    config: &RecommendConfig,
) -> Vec<Recommendation> {
    let Some(user_graph) = graphs.iter().find(|g| g.user_id == user_id) else {
        return Vec::new();
    };

    let mut friends: Vec<(f64, &UserGraph)> = graphs
        .iter()
        .filter(|g| g.user_id != user_id)
        .filter_map(|g| {
            let s = similarity_score(user_graph, g, framework, total_users, sim_config);
            (s >= config.min_similarity).then_some((s, g))
        })
        .collect();
    friends.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.1.user_id.cmp(&b.1.user_id))
    });

    rank_candidates(user_graph, &friends, framework, config)
}

/// Rank unvisited clusters given precomputed friend similarities.
///
/// Exposed for callers that cache the pairwise similarity matrix.
pub fn rank_candidates(
    user_graph: &UserGraph,
    friends: &[(f64, &UserGraph)],
    framework: &Framework,
    config: &RecommendConfig,
) -> Vec<Recommendation> {
    if friends.is_empty() {
        return Vec::new();
    }

    let visited: BTreeSet<u64> = user_graph.nodes.iter().map(|n| n.cluster_id).collect();

    // Candidate clusters and, per candidate, the weighted friend visits.
    let mut weighted: HashMap<u64, f64> = HashMap::new();
    for (similarity, friend) in friends {
        for node in &friend.nodes {
            if visited.contains(&node.cluster_id) {
                continue;
            }
            *weighted.entry(node.cluster_id).or_insert(0.0) +=
                similarity * f64::from(node.visit_count);
        }
    }

    let mut scored: Vec<Recommendation> = weighted
        .into_iter()
        .filter_map(|(cluster_id, friend_weight)| {
            let cluster = framework.cluster(cluster_id)?;
            Some(Recommendation {
                cluster_id,
                score: f64::from(cluster.visit_count) * friend_weight,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cluster_id.cmp(&b.cluster_id))
    });
    scored.truncate(config.top_n);
    scored
}
