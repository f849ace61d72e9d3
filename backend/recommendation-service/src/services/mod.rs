//! Recommendation pipeline
//!
//! Scorers are leaf-first: affinity and peers read the activity log,
//! collaborative consumes the peer list, engagement reads the corpus, the
//! composer merges everything. The orchestrator sequences them behind the
//! result cache and is the only entry point callers use.

pub mod affinity;
pub mod collaborative;
pub mod composer;
pub mod engagement;
pub mod orchestrator;
pub mod peers;
pub mod visual;

pub use affinity::{AffinityProfile, ContentAffinityScorer, ResolvedActivity};
pub use collaborative::{CollaborativeScorer, CollaborativeScores};
pub use composer::{ScoreComposer, ScoreWeights, Signals};
pub use engagement::{engagement_score, CorpusMaxima, EngagementNormalizer, EngagementWeights};
pub use orchestrator::RecommendationOrchestrator;
pub use peers::{similarity, PeerSimilarityFinder};
pub use visual::{BruteForceVectorIndex, VectorSearch, VisualScorer, VisualScores};

use crate::models::{ActivityEvent, Post, PostId, User, UserId};
use crate::store::{ActivityQuery, ActivityStore, ContentStore, StoreResult};
use crate::utils::{bounded, fan_out};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Store handles shared by every scorer. Each call carries its own timeout;
/// per-item lookups fan out with a fixed cap.
#[derive(Clone)]
pub struct Stores {
    pub activity: Arc<dyn ActivityStore>,
    pub content: Arc<dyn ContentStore>,
    pub call_timeout: Duration,
    pub concurrency: usize,
}

impl Stores {
    pub fn new(
        activity: Arc<dyn ActivityStore>,
        content: Arc<dyn ContentStore>,
        call_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            activity,
            content,
            call_timeout,
            concurrency,
        }
    }

    pub async fn recent_activity(&self, user_id: &str, limit: usize) -> StoreResult<Vec<ActivityEvent>> {
        bounded(
            self.call_timeout,
            self.activity.query_by_user(user_id, ActivityQuery::recent(limit)),
        )
        .await
    }

    /// Distinct posts a user has ever interacted with
    pub async fn interacted_posts(&self, user_id: &str) -> StoreResult<HashSet<PostId>> {
        let events = bounded(
            self.call_timeout,
            self.activity.query_by_user(user_id, ActivityQuery::all()),
        )
        .await?;
        Ok(events.into_iter().map(|e| e.post_id).collect())
    }

    pub async fn distinct_user_ids(&self) -> StoreResult<Vec<UserId>> {
        bounded(self.call_timeout, self.activity.distinct_user_ids()).await
    }

    pub async fn activity_of(&self, user_ids: &[UserId]) -> StoreResult<Vec<ActivityEvent>> {
        bounded(self.call_timeout, self.activity.query_by_users(user_ids)).await
    }

    pub async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>> {
        bounded(self.call_timeout, self.content.get_post(post_id)).await
    }

    pub async fn all_posts(&self) -> StoreResult<Vec<Post>> {
        bounded(self.call_timeout, self.content.all_posts()).await
    }

    /// Resolve each id once; ids with no post are left out of the map
    pub async fn resolve_posts<'a, I>(&self, post_ids: I) -> StoreResult<HashMap<PostId, Post>>
    where
        I: IntoIterator<Item = &'a PostId>,
    {
        let unique = dedup(post_ids);
        let found = fan_out(unique, self.concurrency, |id| async move {
            self.get_post(id).await
        })
        .await?;

        Ok(found
            .into_iter()
            .flatten()
            .map(|post| (post.id.clone(), post))
            .collect())
    }

    /// Resolve each owner once; unknown users are left out of the map
    pub async fn resolve_users<'a, I>(&self, user_ids: I) -> StoreResult<HashMap<UserId, User>>
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        let unique = dedup(user_ids);
        let found = fan_out(unique, self.concurrency, |id| async move {
            bounded(self.call_timeout, self.content.get_user(id)).await
        })
        .await?;

        Ok(found
            .into_iter()
            .flatten()
            .map(|user| (user.id.clone(), user))
            .collect())
    }
}

/// First-seen order, duplicates dropped
fn dedup<'a, I>(ids: I) -> Vec<&'a String>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryActivityStore, InMemoryContentStore};

    #[tokio::test]
    async fn test_resolve_posts_fetches_each_id_once() {
        let content = Arc::new(InMemoryContentStore::with_data(
            vec![Post::new("p1", "u1"), Post::new("p2", "u1")],
            vec![],
        ));
        let stores = Stores::new(
            Arc::new(InMemoryActivityStore::new()),
            content.clone(),
            Duration::from_secs(1),
            4,
        );

        let ids: Vec<PostId> = ["p1", "p2", "p1", "missing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let posts = stores.resolve_posts(&ids).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert!(posts.contains_key("p1"));
        assert_eq!(content.calls().get_post, 3);
    }
}
