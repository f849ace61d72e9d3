//! In-process store adapters
//!
//! Insertion order is the natural enumeration order. Every adapter counts
//! its calls and can be told to fail or stall, which is what the pipeline
//! tests lean on.

use super::{ActivityQuery, ActivityStore, ContentStore, StoreError, StoreResult};
use crate::models::{ActivityEvent, Post, User, UserId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Shared failure/latency injection for the fakes
#[derive(Debug, Default)]
struct Faults {
    fail_next: AtomicUsize,
    latency_ms: AtomicU64,
}

impl Faults {
    async fn apply(&self) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let armed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityCallCounts {
    pub query_by_user: usize,
    pub distinct_user_ids: usize,
    pub query_by_users: usize,
}

impl ActivityCallCounts {
    pub fn total(&self) -> usize {
        self.query_by_user + self.distinct_user_ids + self.query_by_users
    }
}

#[derive(Debug, Default)]
pub struct InMemoryActivityStore {
    events: RwLock<Vec<ActivityEvent>>,
    query_by_user_calls: AtomicUsize,
    distinct_user_ids_calls: AtomicUsize,
    query_by_users_calls: AtomicUsize,
    faults: Faults,
}

impl InMemoryActivityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: impl IntoIterator<Item = ActivityEvent>) -> Self {
        let store = Self::new();
        store.events.write().extend(events);
        store
    }

    pub fn calls(&self) -> ActivityCallCounts {
        ActivityCallCounts {
            query_by_user: self.query_by_user_calls.load(Ordering::SeqCst),
            distinct_user_ids: self.distinct_user_ids_calls.load(Ordering::SeqCst),
            query_by_users: self.query_by_users_calls.load(Ordering::SeqCst),
        }
    }

    /// Make the next `n` calls fail with `StoreError::Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ActivityStore for InMemoryActivityStore {
    async fn query_by_user(
        &self,
        user_id: &str,
        query: ActivityQuery,
    ) -> StoreResult<Vec<ActivityEvent>> {
        self.query_by_user_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply().await?;

        let mut events: Vec<ActivityEvent> = self
            .events
            .read()
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();

        if query.newest_first {
            events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        if let Some(limit) = query.limit {
            events.truncate(limit);
        }
        Ok(events)
    }

    async fn distinct_user_ids(&self) -> StoreResult<Vec<UserId>> {
        self.distinct_user_ids_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply().await?;

        let mut seen: HashSet<UserId> = HashSet::new();
        let ids = self
            .events
            .read()
            .iter()
            .filter(|e| seen.insert(e.user_id.clone()))
            .map(|e| e.user_id.clone())
            .collect();
        Ok(ids)
    }

    async fn query_by_users(&self, user_ids: &[UserId]) -> StoreResult<Vec<ActivityEvent>> {
        self.query_by_users_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply().await?;

        let wanted: HashSet<&str> = user_ids.iter().map(String::as_str).collect();
        let events = self
            .events
            .read()
            .iter()
            .filter(|e| wanted.contains(e.user_id.as_str()))
            .cloned()
            .collect();
        Ok(events)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentCallCounts {
    pub get_post: usize,
    pub all_posts: usize,
    pub get_user: usize,
}

impl ContentCallCounts {
    pub fn total(&self) -> usize {
        self.get_post + self.all_posts + self.get_user
    }
}

#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    posts: RwLock<Vec<Post>>,
    users: RwLock<HashMap<UserId, User>>,
    get_post_calls: AtomicUsize,
    all_posts_calls: AtomicUsize,
    get_user_calls: AtomicUsize,
    faults: Faults,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(
        posts: impl IntoIterator<Item = Post>,
        users: impl IntoIterator<Item = User>,
    ) -> Self {
        let store = Self::new();
        store.posts.write().extend(posts);
        store
            .users
            .write()
            .extend(users.into_iter().map(|u| (u.id.clone(), u)));
        store
    }

    /// Insert or replace a post, keeping its original position on replace
    pub fn upsert_post(&self, post: Post) {
        let mut posts = self.posts.write();
        match posts.iter_mut().find(|p| p.id == post.id) {
            Some(existing) => *existing = post,
            None => posts.push(post),
        }
    }

    pub fn calls(&self) -> ContentCallCounts {
        ContentCallCounts {
            get_post: self.get_post_calls.load(Ordering::SeqCst),
            all_posts: self.all_posts_calls.load(Ordering::SeqCst),
            get_user: self.get_user_calls.load(Ordering::SeqCst),
        }
    }

    /// Make the next `n` calls fail with `StoreError::Unavailable`
    pub fn fail_next(&self, n: usize) {
        self.faults.fail_next.store(n, Ordering::SeqCst);
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>> {
        self.get_post_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply().await?;

        Ok(self.posts.read().iter().find(|p| p.id == post_id).cloned())
    }

    async fn all_posts(&self) -> StoreResult<Vec<Post>> {
        self.all_posts_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply().await?;

        Ok(self.posts.read().clone())
    }

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        self.faults.apply().await?;

        Ok(self.users.read().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn event(user: &str, post: &str, secs_ago: i64) -> ActivityEvent {
        ActivityEvent::new(user, post, Utc::now() - ChronoDuration::seconds(secs_ago))
    }

    #[tokio::test]
    async fn test_query_by_user_recent_window() {
        let store = InMemoryActivityStore::with_events(vec![
            event("u1", "p1", 30),
            event("u2", "p9", 25),
            event("u1", "p2", 10),
            event("u1", "p3", 20),
        ]);

        let recent = store
            .query_by_user("u1", ActivityQuery::recent(2))
            .await
            .unwrap();
        let ids: Vec<&str> = recent.iter().map(|e| e.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p2", "p3"]);

        let all = store.query_by_user("u1", ActivityQuery::all()).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|e| e.post_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn test_distinct_user_ids_in_first_seen_order() {
        let store = InMemoryActivityStore::with_events(vec![
            event("u2", "p1", 3),
            event("u1", "p1", 2),
            event("u2", "p2", 1),
        ]);

        assert_eq!(store.distinct_user_ids().await.unwrap(), vec!["u2", "u1"]);
        assert_eq!(store.calls().distinct_user_ids, 1);
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let store = InMemoryContentStore::with_data(vec![Post::new("p1", "u1")], vec![]);
        store.fail_next(1);

        assert!(matches!(
            store.get_post("p1").await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get_post("p1").await.unwrap().is_some());
        assert_eq!(store.calls().get_post, 2);
    }

    #[tokio::test]
    async fn test_upsert_post_keeps_position() {
        let store = InMemoryContentStore::with_data(
            vec![Post::new("p1", "u1"), Post::new("p2", "u1")],
            vec![],
        );
        store.upsert_post(Post::new("p1", "u1").with_counters(5, 0, 0));

        let posts = store.all_posts().await.unwrap();
        assert_eq!(posts[0].id, "p1");
        assert_eq!(posts[0].likes, 5);
        assert_eq!(posts.len(), 2);
    }
}
