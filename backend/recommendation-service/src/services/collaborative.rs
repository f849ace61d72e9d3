//! Collaborative signal: how often similar users touched each post

use super::Stores;
use crate::error::{RecommendationError, Result};
use crate::models::{ActivityEvent, PeerSimilarity, PostId, Stage, UserId};
use std::collections::HashMap;
use tracing::debug;

/// Peer event count per post. Posts no peer touched score 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollaborativeScores {
    counts: HashMap<PostId, u32>,
}

impl CollaborativeScores {
    /// One point per event, so a peer revisiting a post counts again
    pub fn from_events(events: &[ActivityEvent]) -> Self {
        let mut counts: HashMap<PostId, u32> = HashMap::new();
        for event in events {
            *counts.entry(event.post_id.clone()).or_insert(0) += 1;
        }
        Self { counts }
    }

    pub fn score(&self, post_id: &str) -> f64 {
        self.counts.get(post_id).copied().unwrap_or(0) as f64
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

pub struct CollaborativeScorer {
    stores: Stores,
}

impl CollaborativeScorer {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn score(&self, peers: &[PeerSimilarity]) -> Result<CollaborativeScores> {
        if peers.is_empty() {
            return Ok(CollaborativeScores::default());
        }

        let peer_ids: Vec<UserId> = peers.iter().map(|p| p.user_id.clone()).collect();
        let events = self
            .stores
            .activity_of(&peer_ids)
            .await
            .map_err(RecommendationError::at(Stage::ScoreCollaborative))?;

        debug!(peers = peer_ids.len(), events = events.len(), "Scored peer activity");
        Ok(CollaborativeScores::from_events(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryActivityStore, InMemoryContentStore};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn peer(id: &str) -> PeerSimilarity {
        PeerSimilarity {
            user_id: id.to_string(),
            score: 0.5,
        }
    }

    fn scorer(activity: Arc<InMemoryActivityStore>) -> CollaborativeScorer {
        CollaborativeScorer::new(Stores::new(
            activity,
            Arc::new(InMemoryContentStore::new()),
            Duration::from_secs(1),
            4,
        ))
    }

    #[tokio::test]
    async fn test_counts_events_not_peers() {
        let now = Utc::now();
        let activity = Arc::new(InMemoryActivityStore::with_events(vec![
            ActivityEvent::new("a", "p1", now),
            ActivityEvent::new("a", "p1", now),
            ActivityEvent::new("b", "p1", now),
            ActivityEvent::new("b", "p2", now),
            ActivityEvent::new("stranger", "p3", now),
        ]));

        let scores = scorer(activity)
            .score(&[peer("a"), peer("b")])
            .await
            .unwrap();

        assert_eq!(scores.score("p1"), 3.0);
        assert_eq!(scores.score("p2"), 1.0);
        assert_eq!(scores.score("p3"), 0.0);
    }

    #[tokio::test]
    async fn test_no_peers_no_query() {
        let activity = Arc::new(InMemoryActivityStore::new());
        let scores = scorer(activity.clone()).score(&[]).await.unwrap();

        assert!(scores.is_empty());
        assert_eq!(activity.calls().query_by_users, 0);
    }
}
