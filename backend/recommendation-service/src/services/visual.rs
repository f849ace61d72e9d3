/// Visual similarity
///
/// Provides the nearest-neighbour seam the composer can blend in, plus an
/// in-process index for deployments without a dedicated vector database.
///
/// Features:
/// - `VectorSearch` trait over any index returning post ids by similarity
/// - Brute-force cosine index (inner product over L2-normalised rows)
/// - Rank-decayed visual score seeded from a user's recent posts
use super::Stores;
use crate::error::{RecommendationError, Result};
use crate::models::{Post, PostId, Stage};
use crate::store::StoreResult;
use crate::utils::bounded;
use async_trait::async_trait;
use ndarray::{Array1, Array2, ArrayView1};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Up to `top_n` post ids, most similar first
    async fn find_similar_by_vector(&self, embedding: &[f32], top_n: usize)
        -> StoreResult<Vec<PostId>>;
}

/// Exact cosine search over every indexed embedding
pub struct BruteForceVectorIndex {
    ids: Vec<PostId>,
    // one L2-normalised row per id
    matrix: Array2<f32>,
}

impl BruteForceVectorIndex {
    /// Index every post carrying an embedding. The first embedding fixes the
    /// dimension; mismatched or all-zero vectors are skipped.
    pub fn from_posts(posts: &[Post]) -> Self {
        let dim = posts
            .iter()
            .find_map(|p| p.embedding.as_ref().map(Vec::len))
            .unwrap_or(0);

        let mut ids = Vec::new();
        let mut rows: Vec<Array1<f32>> = Vec::new();
        for post in posts {
            let Some(embedding) = post.embedding.as_ref() else {
                continue;
            };
            if embedding.len() != dim {
                warn!(
                    post_id = %post.id,
                    expected = dim,
                    actual = embedding.len(),
                    "Skipping embedding with mismatched dimension"
                );
                continue;
            }
            if let Some(row) = normalize(ArrayView1::from(embedding.as_slice())) {
                ids.push(post.id.clone());
                rows.push(row);
            }
        }

        let mut matrix = Array2::<f32>::zeros((rows.len(), dim));
        for (i, row) in rows.iter().enumerate() {
            matrix.row_mut(i).assign(row);
        }

        debug!(indexed = ids.len(), dim, "Built vector index");
        Self { ids, matrix }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    /// `(post_id, cosine)` pairs, best first; equal scores keep index order
    pub fn search(&self, query: &[f32], top_n: usize) -> Vec<(PostId, f32)> {
        if self.is_empty() || query.len() != self.dim() {
            return Vec::new();
        }
        let Some(query) = normalize(ArrayView1::from(query)) else {
            return Vec::new();
        };

        let scores = self.matrix.dot(&query);
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        ranked
            .into_iter()
            .take(top_n)
            .map(|(i, score)| (self.ids[i].clone(), score))
            .collect()
    }
}

fn normalize(v: ArrayView1<f32>) -> Option<Array1<f32>> {
    let norm = v.dot(&v).sqrt();
    if norm <= f32::EPSILON || !norm.is_finite() {
        return None;
    }
    Some(v.mapv(|x| x / norm))
}

#[async_trait]
impl VectorSearch for BruteForceVectorIndex {
    async fn find_similar_by_vector(
        &self,
        embedding: &[f32],
        top_n: usize,
    ) -> StoreResult<Vec<PostId>> {
        Ok(self
            .search(embedding, top_n)
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }
}

/// Summed rank-decayed visual score per post
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VisualScores {
    scores: HashMap<PostId, f64>,
}

impl VisualScores {
    pub fn score(&self, post_id: &str) -> f64 {
        self.scores.get(post_id).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

pub struct VisualScorer {
    search: Arc<dyn VectorSearch>,
    seed_posts: usize,
    top_n: usize,
    call_timeout: Duration,
}

impl VisualScorer {
    pub fn new(search: Arc<dyn VectorSearch>, seed_posts: usize, top_n: usize, call_timeout: Duration) -> Self {
        Self {
            search,
            seed_posts,
            top_n,
            call_timeout,
        }
    }

    /// Query the index with the embeddings of up to `seed_posts` of `seeds`
    /// (most recent first). A hit at rank r earns 1/(r+1); seeds never score.
    pub async fn score(&self, seeds: &[&Post]) -> Result<VisualScores> {
        let seeds: Vec<(&PostId, &Vec<f32>)> = seeds
            .iter()
            .filter_map(|p| p.embedding.as_ref().map(|e| (&p.id, e)))
            .take(self.seed_posts)
            .collect();
        let seed_ids: HashSet<&str> = seeds.iter().map(|(id, _)| id.as_str()).collect();

        let mut scores: HashMap<PostId, f64> = HashMap::new();
        for (_, embedding) in &seeds {
            let hits = bounded(
                self.call_timeout,
                self.search.find_similar_by_vector(embedding, self.top_n),
            )
            .await
            .map_err(RecommendationError::at(Stage::VisualSearch))?;

            for (rank, post_id) in hits.into_iter().enumerate() {
                if seed_ids.contains(post_id.as_str()) {
                    continue;
                }
                *scores.entry(post_id).or_insert(0.0) += 1.0 / (rank as f64 + 1.0);
            }
        }

        debug!(seeds = seeds.len(), scored = scores.len(), "Scored visual neighbours");
        Ok(VisualScores { scores })
    }

    /// Posts visually closest to `post_id`, excluding itself. Unknown posts
    /// and posts without an embedding have no neighbours.
    pub async fn similar_posts(&self, stores: &Stores, post_id: &str, top_n: usize) -> Result<Vec<Post>> {
        let Some(embedding) = stores
            .get_post(post_id)
            .await
            .map_err(RecommendationError::at(Stage::VisualSearch))?
            .and_then(|p| p.embedding)
        else {
            return Ok(Vec::new());
        };

        let ids: Vec<PostId> = bounded(
            self.call_timeout,
            self.search.find_similar_by_vector(&embedding, top_n.saturating_add(1)),
        )
        .await
        .map_err(RecommendationError::at(Stage::VisualSearch))?
        .into_iter()
        .filter(|id| id != post_id)
        .take(top_n)
        .collect();

        let mut found = stores
            .resolve_posts(&ids)
            .await
            .map_err(RecommendationError::at(Stage::VisualSearch))?;

        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryActivityStore, InMemoryContentStore};

    fn corpus() -> Vec<Post> {
        vec![
            Post::new("red", "o").with_embedding(vec![1.0, 0.0, 0.0]),
            Post::new("crimson", "o").with_embedding(vec![0.9, 0.1, 0.0]),
            Post::new("blue", "o").with_embedding(vec![0.0, 0.0, 1.0]),
            Post::new("plain", "o"),
            Post::new("blank", "o").with_embedding(vec![0.0, 0.0, 0.0]),
            Post::new("short", "o").with_embedding(vec![1.0]),
        ]
    }

    #[test]
    fn test_index_skips_unusable_embeddings() {
        let index = BruteForceVectorIndex::from_posts(&corpus());
        assert_eq!(index.len(), 3);
        assert_eq!(index.dim(), 3);
    }

    #[test]
    fn test_search_ranks_by_cosine() {
        let index = BruteForceVectorIndex::from_posts(&corpus());
        let hits = index.search(&[2.0, 0.0, 0.0], 2);

        assert_eq!(hits[0].0, "red");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, "crimson");
        assert!(index.search(&[1.0, 0.0], 2).is_empty());
    }

    #[tokio::test]
    async fn test_visual_scores_exclude_seeds_and_decay() {
        let posts = corpus();
        let index = Arc::new(BruteForceVectorIndex::from_posts(&posts));
        let scorer = VisualScorer::new(index, 3, 3, Duration::from_secs(1));

        let seeds = vec![&posts[0]];
        let scores = scorer.score(&seeds).await.unwrap();

        // red (rank 0) is the seed itself
        assert_eq!(scores.score("red"), 0.0);
        assert_eq!(scores.score("crimson"), 0.5);
        assert!((scores.score("blue") - 1.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_similar_posts_drops_query_post() {
        let posts = corpus();
        let index = Arc::new(BruteForceVectorIndex::from_posts(&posts));
        let scorer = VisualScorer::new(index, 3, 3, Duration::from_secs(1));
        let stores = Stores::new(
            Arc::new(InMemoryActivityStore::new()),
            Arc::new(InMemoryContentStore::with_data(posts, vec![])),
            Duration::from_secs(1),
            4,
        );

        let similar = scorer.similar_posts(&stores, "red", 1).await.unwrap();
        let ids: Vec<&str> = similar.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["crimson"]);

        assert!(scorer.similar_posts(&stores, "plain", 5).await.unwrap().is_empty());
        assert!(scorer.similar_posts(&stores, "missing", 5).await.unwrap().is_empty());

        let all = scorer.similar_posts(&stores, "red", usize::MAX).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["crimson", "blue"]);
    }
}
