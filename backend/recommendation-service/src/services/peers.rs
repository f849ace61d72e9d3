//! Peer similarity over interacted-post sets
//!
//! similarity(u, v) = |posts(u) ∩ posts(v)| / sqrt(|posts(u)| * |posts(v)|)
//!
//! Pairs where either side has no history are excluded, not scored zero.

use super::Stores;
use crate::error::{RecommendationError, Result};
use crate::models::{PeerSimilarity, PostId, Stage, UserId};
use crate::store::StoreError;
use crate::utils::fan_out;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// Normalized overlap of two interacted-post sets, `None` when either is empty
pub fn similarity(a: &HashSet<PostId>, b: &HashSet<PostId>) -> Option<f64> {
    let denominator = a.len() * b.len();
    if denominator == 0 {
        return None;
    }

    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let shared = small.iter().filter(|post| large.contains(*post)).count();

    Some(shared as f64 / (denominator as f64).sqrt())
}

pub struct PeerSimilarityFinder {
    stores: Stores,
    limit: usize,
}

impl PeerSimilarityFinder {
    pub fn new(stores: Stores, limit: usize) -> Self {
        Self { stores, limit }
    }

    /// Up to `limit` other users, most similar first. Equal scores keep the
    /// activity store's enumeration order.
    pub async fn find(&self, user_id: &str) -> Result<Vec<PeerSimilarity>> {
        let target = self
            .stores
            .interacted_posts(user_id)
            .await
            .map_err(RecommendationError::at(Stage::FindPeers))?;

        // Every pair would be excluded anyway
        if target.is_empty() {
            debug!(user_id = %user_id, "No history, skipping peer search");
            return Ok(Vec::new());
        }

        let candidates: Vec<UserId> = self
            .stores
            .distinct_user_ids()
            .await
            .map_err(RecommendationError::at(Stage::FindPeers))?
            .into_iter()
            .filter(|candidate| candidate != user_id)
            .collect();

        let stores = &self.stores;
        let histories = fan_out(candidates, stores.concurrency, |candidate| async move {
            let posts = stores.interacted_posts(&candidate).await?;
            Ok::<_, StoreError>((candidate, posts))
        })
        .await
        .map_err(RecommendationError::at(Stage::FindPeers))?;

        let mut peers: Vec<PeerSimilarity> = histories
            .into_iter()
            .filter_map(|(candidate, posts)| {
                similarity(&target, &posts).map(|score| PeerSimilarity {
                    user_id: candidate,
                    score,
                })
            })
            .collect();

        let considered = peers.len();
        peers.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        peers.truncate(self.limit);

        debug!(
            user_id = %user_id,
            considered,
            peers = peers.len(),
            "Ranked peers"
        );
        Ok(peers)
    }
}
