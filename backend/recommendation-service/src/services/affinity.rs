//! Content affinity: tag profile from a user's recent activity

use super::Stores;
use crate::error::{RecommendationError, Result};
use crate::models::{ActivityEvent, Post, PostId, Stage};
use std::collections::HashMap;
use tracing::debug;

/// Recent events plus the posts they resolved to
#[derive(Debug, Clone, Default)]
pub struct ResolvedActivity {
    /// Newest first
    pub events: Vec<ActivityEvent>,
    pub posts: HashMap<PostId, Post>,
}

impl ResolvedActivity {
    /// Distinct resolved posts, most recently visited first
    pub fn posts_newest_first(&self) -> Vec<&Post> {
        let mut seen = std::collections::HashSet::new();
        self.events
            .iter()
            .filter(|e| seen.insert(e.post_id.as_str()))
            .filter_map(|e| self.posts.get(&e.post_id))
            .collect()
    }
}

/// Tag -> number of visits to posts carrying that tag
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffinityProfile {
    weights: HashMap<String, u32>,
}

impl AffinityProfile {
    /// Every event whose post resolved contributes each of that post's
    /// distinct tags once. Visiting the same post twice counts twice.
    pub fn from_activity(activity: &ResolvedActivity) -> Self {
        let mut weights: HashMap<String, u32> = HashMap::new();
        for event in &activity.events {
            let Some(post) = activity.posts.get(&event.post_id) else {
                continue;
            };
            for tag in post.distinct_tags() {
                *weights.entry(tag.to_string()).or_insert(0) += 1;
            }
        }
        Self { weights }
    }

    pub fn weight(&self, tag: &str) -> u32 {
        self.weights.get(tag).copied().unwrap_or(0)
    }

    /// Sum of profile weights over the post's tags
    pub fn content_score(&self, post: &Post) -> f64 {
        post.distinct_tags()
            .map(|tag| self.weight(tag) as f64)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

pub struct ContentAffinityScorer {
    stores: Stores,
    window: usize,
}

impl ContentAffinityScorer {
    pub fn new(stores: Stores, window: usize) -> Self {
        Self { stores, window }
    }

    /// Most recent `window` events, newest first
    pub async fn fetch_recent(&self, user_id: &str) -> Result<Vec<ActivityEvent>> {
        let events = self
            .stores
            .recent_activity(user_id, self.window)
            .await
            .map_err(RecommendationError::at(Stage::FetchActivity))?;

        debug!(user_id = %user_id, events = events.len(), "Fetched recent activity");
        Ok(events)
    }

    /// Look up the posts behind `events`; unknown posts are dropped
    pub async fn resolve(&self, events: Vec<ActivityEvent>) -> Result<ResolvedActivity> {
        let posts = self
            .stores
            .resolve_posts(events.iter().map(|e| &e.post_id))
            .await
            .map_err(RecommendationError::at(Stage::ScoreContent))?;

        Ok(ResolvedActivity { events, posts })
    }

    pub async fn profile(&self, user_id: &str) -> Result<AffinityProfile> {
        let events = self.fetch_recent(user_id).await?;
        let resolved = self.resolve(events).await?;
        Ok(AffinityProfile::from_activity(&resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryActivityStore, InMemoryContentStore};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;
    use std::time::Duration;

    fn scorer(
        activity: InMemoryActivityStore,
        content: InMemoryContentStore,
        window: usize,
    ) -> ContentAffinityScorer {
        let stores = Stores::new(
            Arc::new(activity),
            Arc::new(content),
            Duration::from_secs(1),
            8,
        );
        ContentAffinityScorer::new(stores, window)
    }

    fn posts() -> Vec<Post> {
        vec![
            Post::new("p1", "owner").with_tags(["boho", "denim"]),
            Post::new("p2", "owner").with_tags(["boho"]),
            Post::new("p3", "owner").with_tags(["formal"]),
        ]
    }

    fn corpus() -> InMemoryContentStore {
        InMemoryContentStore::with_data(posts(), vec![])
    }

    #[tokio::test]
    async fn test_profile_counts_tags_per_visit() {
        let now = Utc::now();
        let activity = InMemoryActivityStore::with_events(vec![
            ActivityEvent::new("u", "p1", now - ChronoDuration::seconds(2)),
            ActivityEvent::new("u", "p2", now - ChronoDuration::seconds(1)),
        ]);
        let profile = scorer(activity, corpus(), 50).profile("u").await.unwrap();

        assert_eq!(profile.weight("boho"), 2);
        assert_eq!(profile.weight("denim"), 1);

        let posts = posts();
        assert_eq!(profile.content_score(&posts[0]), 2.0 + 1.0);
        assert_eq!(profile.content_score(&posts[1]), 2.0);
        assert_eq!(profile.content_score(&posts[2]), 0.0);
    }

    #[tokio::test]
    async fn test_no_activity_gives_empty_profile() {
        let profile = scorer(InMemoryActivityStore::new(), corpus(), 50)
            .profile("nobody")
            .await
            .unwrap();
        assert!(profile.is_empty());
    }

    #[tokio::test]
    async fn test_window_keeps_most_recent_only() {
        let now = Utc::now();
        let activity = InMemoryActivityStore::with_events(vec![
            ActivityEvent::new("u", "p3", now - ChronoDuration::seconds(10)),
            ActivityEvent::new("u", "p1", now - ChronoDuration::seconds(1)),
        ]);
        let profile = scorer(activity, corpus(), 1).profile("u").await.unwrap();

        assert_eq!(profile.weight("formal"), 0);
        assert_eq!(profile.weight("denim"), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_posts_are_skipped() {
        let now = Utc::now();
        let activity = InMemoryActivityStore::with_events(vec![
            ActivityEvent::new("u", "deleted", now),
            ActivityEvent::new("u", "p3", now - ChronoDuration::seconds(1)),
        ]);
        let profile = scorer(activity, corpus(), 50).profile("u").await.unwrap();

        assert_eq!(profile.len(), 1);
        assert_eq!(profile.weight("formal"), 1);
    }

    #[test]
    fn test_repeated_tag_on_one_post_counts_once() {
        let post = Post::new("p", "o").with_tags(["boho", "boho"]);
        let activity = ResolvedActivity {
            events: vec![ActivityEvent::new("u", "p", Utc::now())],
            posts: HashMap::from([("p".to_string(), post.clone())]),
        };
        let profile = AffinityProfile::from_activity(&activity);

        assert_eq!(profile.weight("boho"), 1);
        assert_eq!(profile.content_score(&post), 1.0);
    }

    #[test]
    fn test_posts_newest_first_dedups() {
        let now = Utc::now();
        let activity = ResolvedActivity {
            events: vec![
                ActivityEvent::new("u", "p2", now),
                ActivityEvent::new("u", "p1", now - ChronoDuration::seconds(1)),
                ActivityEvent::new("u", "p2", now - ChronoDuration::seconds(2)),
            ],
            posts: HashMap::from([
                ("p1".to_string(), Post::new("p1", "o")),
                ("p2".to_string(), Post::new("p2", "o")),
            ]),
        };
        let ids: Vec<&str> = activity
            .posts_newest_first()
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["p2", "p1"]);
    }
}
