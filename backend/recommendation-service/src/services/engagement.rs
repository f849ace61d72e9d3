//! Engagement normalizer
//!
//! Interaction counters are scaled by corpus maxima and weighted to sum to
//! 1.0. Owner followers and profile views are added as raw counts, so a
//! popular account dominates the composite. The owner terms stay raw until
//! the ranking formula itself is revised.

use super::Stores;
use crate::error::{RecommendationError, Result};
use crate::models::{Post, Stage, User};
use crate::utils::ratio;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngagementWeights {
    pub likes: f64,
    pub saves: f64,
    pub views: f64,
    pub followers: f64,
    pub profile_views: f64,
}

impl Default for EngagementWeights {
    fn default() -> Self {
        Self {
            likes: 0.4,
            saves: 0.3,
            views: 0.3,
            followers: 0.1,
            profile_views: 0.1,
        }
    }
}

/// Corpus-wide counter maxima; a zero or missing maximum reads as 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorpusMaxima {
    pub likes: u64,
    pub saves: u64,
    pub views: u64,
}

impl CorpusMaxima {
    pub fn from_posts(posts: &[Post]) -> Self {
        let max_of = |field: fn(&Post) -> u64| posts.iter().map(field).max().unwrap_or(0).max(1);
        Self {
            likes: max_of(|p| p.likes),
            saves: max_of(|p| p.saves),
            views: max_of(|p| p.views),
        }
    }
}

/// Score for one post. Owner terms are only added when the owner resolved.
pub fn engagement_score(
    post: &Post,
    maxima: &CorpusMaxima,
    owner: Option<&User>,
    weights: &EngagementWeights,
) -> f64 {
    let mut score = weights.likes * ratio(post.likes, maxima.likes)
        + weights.saves * ratio(post.saves, maxima.saves)
        + weights.views * ratio(post.views, maxima.views);

    if let Some(owner) = owner {
        score += weights.followers * owner.followers_count as f64
            + weights.profile_views * owner.profile_views as f64;
    }
    score
}

pub struct EngagementNormalizer {
    stores: Stores,
    weights: EngagementWeights,
}

impl EngagementNormalizer {
    pub fn new(stores: Stores, weights: EngagementWeights) -> Self {
        Self { stores, weights }
    }

    /// Scores aligned index-for-index with `posts`
    pub async fn score(&self, posts: &[Post]) -> Result<Vec<f64>> {
        let maxima = CorpusMaxima::from_posts(posts);
        let owners = self
            .stores
            .resolve_users(posts.iter().map(|p| &p.user_id))
            .await
            .map_err(RecommendationError::at(Stage::NormalizeEngagement))?;

        debug!(
            posts = posts.len(),
            owners = owners.len(),
            max_likes = maxima.likes,
            max_saves = maxima.saves,
            max_views = maxima.views,
            "Normalized engagement"
        );

        Ok(posts
            .iter()
            .map(|post| engagement_score(post, &maxima, owners.get(&post.user_id), &self.weights))
            .collect())
    }
}
