//! Read-only adapters over the activity log and the content store
//!
//! The pipeline only ever reads through these traits, so any backend (the
//! in-memory fakes, PostgreSQL) can be injected into the orchestrator.

mod memory;
mod postgres;

pub use memory::{ActivityCallCounts, ContentCallCounts, InMemoryActivityStore, InMemoryContentStore};
pub use postgres::{PgActivityStore, PgContentStore};

use crate::models::{ActivityEvent, Post, User, UserId};
use async_trait::async_trait;
use resilience::TimeoutError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<TimeoutError> for StoreError {
    fn from(e: TimeoutError) -> Self {
        match e {
            TimeoutError::Elapsed(d) => StoreError::Timeout(d),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Shape of a per-user activity query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityQuery {
    /// Cap on returned events, `None` for full history
    pub limit: Option<usize>,
    /// Sort by timestamp descending instead of store order
    pub newest_first: bool,
}

impl ActivityQuery {
    /// Full history in store order
    pub fn all() -> Self {
        Self::default()
    }

    /// Most recent `limit` events, newest first
    pub fn recent(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            newest_first: true,
        }
    }
}

#[async_trait]
pub trait ActivityStore: Send + Sync {
    async fn query_by_user(&self, user_id: &str, query: ActivityQuery)
        -> StoreResult<Vec<ActivityEvent>>;

    /// Every user with at least one event, in the store's natural order
    async fn distinct_user_ids(&self) -> StoreResult<Vec<UserId>>;

    async fn query_by_users(&self, user_ids: &[UserId]) -> StoreResult<Vec<ActivityEvent>>;
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn get_post(&self, post_id: &str) -> StoreResult<Option<Post>>;

    /// Whole corpus, in the store's natural order
    async fn all_posts(&self) -> StoreResult<Vec<Post>>;

    async fn get_user(&self, user_id: &str) -> StoreResult<Option<User>>;
}
