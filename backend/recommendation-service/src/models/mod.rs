use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub type UserId = String;
pub type PostId = String;

/// Account that owns posts. Counters missing from the stored record default to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub profile_views: u64,
}

/// Content item as read from the content store.
///
/// `tags` is a set: order is irrelevant and repeated entries count once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Owning user
    pub user_id: UserId,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub saves: u64,
    #[serde(default)]
    pub views: u64,
    /// Image embedding, present only for posts that went through feature extraction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Post {
    pub fn new(id: impl Into<PostId>, user_id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            tags: Vec::new(),
            likes: 0,
            saves: 0,
            views: 0,
            embedding: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_counters(mut self, likes: u64, saves: u64, views: u64) -> Self {
        self.likes = likes;
        self.saves = saves;
        self.views = views;
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Tags with duplicates removed, first occurrence wins
    pub fn distinct_tags(&self) -> impl Iterator<Item = &str> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.tags.len());
        self.tags
            .iter()
            .map(String::as_str)
            .filter(move |tag| seen.insert(*tag))
    }
}

/// One interaction of a user with a post. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub user_id: UserId,
    pub post_id: PostId,
    pub timestamp: DateTime<Utc>,
}

impl ActivityEvent {
    pub fn new(
        user_id: impl Into<UserId>,
        post_id: impl Into<PostId>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            post_id: post_id.into(),
            timestamp,
        }
    }
}

/// Behavioural similarity of another user to the request's user, in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerSimilarity {
    pub user_id: UserId,
    pub score: f64,
}

/// Post snapshot annotated with its final score. This is what callers get
/// back and what the result cache stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPost {
    pub id: PostId,
    pub user_id: UserId,
    pub tags: Vec<String>,
    pub likes: u64,
    pub saves: u64,
    pub views: u64,
    pub score: f64,
}

impl ScoredPost {
    pub fn from_post(post: Post, score: f64) -> Self {
        Self {
            id: post.id,
            user_id: post.user_id,
            tags: post.tags,
            likes: post.likes,
            saves: post.saves,
            views: post.views,
            score,
        }
    }
}

/// Cache payload for one user's recommendation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRecommendations {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub posts: Vec<ScoredPost>,
}

impl CachedRecommendations {
    pub const CURRENT_SCHEMA_VERSION: u32 = 1;

    pub fn new(posts: Vec<ScoredPost>, generated_at: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self {
            schema_version: Self::CURRENT_SCHEMA_VERSION,
            generated_at,
            expires_at: recs_cache::expiry_after(generated_at, ttl_secs),
            posts,
        }
    }

    /// Servable at `now`: current schema and not yet expired
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.schema_version == Self::CURRENT_SCHEMA_VERSION && now < self.expires_at
    }
}

/// Pipeline stages, used to label failures and log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    CacheCheck,
    FetchActivity,
    ScoreContent,
    FindPeers,
    ScoreCollaborative,
    NormalizeEngagement,
    Compose,
    CacheWrite,
    VisualSearch,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CacheCheck => "cache_check",
            Stage::FetchActivity => "fetch_activity",
            Stage::ScoreContent => "score_content",
            Stage::FindPeers => "find_peers",
            Stage::ScoreCollaborative => "score_collaborative",
            Stage::NormalizeEngagement => "normalize_engagement",
            Stage::Compose => "compose",
            Stage::CacheWrite => "cache_write",
            Stage::VisualSearch => "visual_search",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
