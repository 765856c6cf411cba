//! Sequence-based user similarity.
//!
//! Two users are similar when their graphs share ordered runs of cluster
//! visits. Matched sessions are weighted by layer depth, sequence length
//! and an inverse-user-frequency term, then normalized and squashed into
//! `[0, 1)`.

use std::collections::HashMap;

use crate::{Framework, GraphNode, SimilarityConfig, UserGraph};

/// One session: a temporally contiguous run of cluster visits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Bottom-layer cluster id per position.
    pub clusters: Vec<u64>,
    /// Node visit count per position.
    pub counts: Vec<u32>,
}

impl Session {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Split a graph's nodes into sessions.
///
/// Nodes are sorted by first visit; consecutive nodes stay in one session
/// while the gap from the previous node's last visit to the next node's
/// first visit is at most `session_gap`. Sessions of length one are
/// discarded.
pub fn sessionize(graph: &UserGraph, config: &SimilarityConfig) -> Vec<Session> {
    let mut nodes: Vec<&GraphNode> = graph.nodes.iter().collect();
    nodes.sort_by_key(|n| (n.first_visit_at, n.cluster_id));

    let mut sessions = Vec::new();
    let mut current: Vec<&GraphNode> = Vec::new();

    for node in nodes {
        let extends = current
            .last()
            .map(|prev| node.first_visit_at - prev.last_visit_at <= config.session_gap);
        match extends {
            Some(true) => current.push(node),
            Some(false) => {
                if current.len() >= 2 {
                    sessions.push(to_session(&current));
                }
                current = vec![node];
            }
            None => current = vec![node],
        }
    }
    if current.len() >= 2 {
        sessions.push(to_session(&current));
    }

    sessions
}

fn to_session(nodes: &[&GraphNode]) -> Session {
    Session {
        clusters: nodes.iter().map(|n| n.cluster_id).collect(),
        counts: nodes.iter().map(|n| n.visit_count).collect(),
    }
}

/// Similarity score `S(p, q)` in `[0, 1)` between two user graphs over the
/// same framework.
///
/// ```text
/// raw   = sum_l alpha(l) * sum_matched beta(|S|) * sum_i idf_i * min(count_p, count_q)
/// final = (raw / (|sessions_p| * |sessions_q|)) squashed by x / (1 + x)
/// ```
///
/// with `alpha(l) = 1 / (l + 1)`, `beta(k) = ln(k + 1)` and
/// `idf(c) = min(idf_clip, ln(total_users / user_count_c))` (zero when the
/// cluster has no recorded users). A match is an exact ordered comparison
/// of bottom-layer cluster ids between equal-length sessions; every layer
/// weighs the same matched set by its `alpha(l)`. Sessions longer than
/// `max_match_len` are skipped during matching but still count toward the
/// normalizer.
pub fn similarity_score(
    graph_p: &UserGraph,
    graph_q: &UserGraph,
    framework: &Framework,
    total_users: usize,
    config: &SimilarityConfig,
) -> f64 {
    let sessions_p = sessionize(graph_p, config);
    let sessions_q = sessionize(graph_q, config);

    let norm = (sessions_p.len() * sessions_q.len()) as f64;
    if norm == 0.0 {
        return 0.0;
    }

    // Distinct-user count per bottom-layer cluster id.
    let user_counts: HashMap<u64, u32> = framework
        .bottom_layer()
        .map(|l| l.clusters.iter().map(|c| (c.id, c.visit_count)).collect())
        .unwrap_or_default();

    // Matched sequences are found once, on bottom-layer cluster ids.
    let mut matched_total = 0.0;
    for sp in &sessions_p {
        if sp.len() > config.max_match_len {
            continue;
        }
        for sq in &sessions_q {
            if sq.len() != sp.len() || sq.clusters != sp.clusters {
                continue;
            }

            let beta = ((sp.len() + 1) as f64).ln();
            let seq_score: f64 = sp
                .clusters
                .iter()
                .zip(sp.counts.iter().zip(&sq.counts))
                .map(|(cluster_id, (&count_p, &count_q))| {
                    let users = user_counts.get(cluster_id).copied().unwrap_or(0);
                    idf(users, total_users, config.idf_clip) * f64::from(count_p.min(count_q))
                })
                .sum();
            matched_total += beta * seq_score;
        }
    }

    // Layers reweight the same matched set.
    let raw: f64 = framework
        .layers
        .iter()
        .map(|layer| matched_total / (layer.level as f64 + 1.0))
        .sum();

    let score = raw / norm;
    score / (1.0 + score)
}

/// Inverse user frequency of a cluster, clipped.
fn idf(user_count: u32, total_users: usize, clip: f64) -> f64 {
    if user_count == 0 {
        return 0.0;
    }
    clip.min((total_users as f64 / f64::from(user_count)).ln())
}
