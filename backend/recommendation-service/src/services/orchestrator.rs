//! Recommendation orchestrator
//!
//! CacheCheck -> hit: return the cached list
//!            -> miss: FetchActivity -> ScoreContent -> FindPeers ->
//!               ScoreCollaborative -> NormalizeEngagement -> Compose ->
//!               CacheWrite -> return
//!
//! The cache is written only after Compose succeeds. A cache that cannot be
//! read is treated as a miss and is not written back for that request.

use super::{
    AffinityProfile, CollaborativeScorer, ContentAffinityScorer, EngagementNormalizer,
    EngagementWeights, PeerSimilarityFinder, ScoreComposer, ScoreWeights, Signals, Stores,
    VectorSearch, VisualScorer,
};
use crate::config::PipelineConfig;
use crate::error::{RecommendationError, Result};
use crate::models::{CachedRecommendations, PeerSimilarity, Post, ScoredPost, Stage};
use crate::store::{ActivityStore, ContentStore};
use dashmap::DashMap;
use recs_cache::{CacheKey, Clock, ResultCache, SystemClock};
use resilience::{with_retry_if, with_timeout, RetryError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

enum CacheLookup {
    Hit(Vec<ScoredPost>),
    Miss,
    /// The cache could not be reached; skip write-back
    Unavailable,
}

pub struct RecommendationOrchestrator {
    stores: Stores,
    cache: Arc<dyn ResultCache>,
    keys: CacheKey,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    affinity: ContentAffinityScorer,
    peers: PeerSimilarityFinder,
    collaborative: CollaborativeScorer,
    engagement: EngagementNormalizer,
    composer: ScoreComposer,
    visual: Option<VisualScorer>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl RecommendationOrchestrator {
    pub fn new(
        activity: Arc<dyn ActivityStore>,
        content: Arc<dyn ContentStore>,
        cache: Arc<dyn ResultCache>,
        config: PipelineConfig,
    ) -> Self {
        let stores = Stores::new(
            activity,
            content,
            config.store_timeout(),
            config.fanout_concurrency,
        );
        let weights = ScoreWeights {
            visual: config.visual_weight,
            ..Default::default()
        };

        Self {
            affinity: ContentAffinityScorer::new(stores.clone(), config.recent_activity_limit),
            peers: PeerSimilarityFinder::new(stores.clone(), config.peer_limit),
            collaborative: CollaborativeScorer::new(stores.clone()),
            engagement: EngagementNormalizer::new(stores.clone(), EngagementWeights::default()),
            composer: ScoreComposer::new(weights, config.result_limit),
            keys: CacheKey::new(config.cache_key_prefix.clone()),
            clock: Arc::new(SystemClock),
            visual: None,
            in_flight: DashMap::new(),
            stores,
            cache,
            config,
        }
    }

    /// Clock used to stamp and check cached payloads
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enable visual blending and `similar_posts`
    pub fn with_vector_search(mut self, search: Arc<dyn VectorSearch>) -> Self {
        self.visual = Some(VisualScorer::new(
            search,
            self.config.visual_seed_posts,
            self.config.visual_top_n,
            self.config.store_timeout(),
        ));
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Store adapters with this pipeline's timeout and fan-out limits
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Ranked recommendations for `user_id`, served from cache while fresh.
    /// An empty list is a normal outcome.
    pub async fn get_recommendations(&self, user_id: &str) -> Result<Vec<ScoredPost>> {
        let started = Instant::now();
        let key = self.keys.recommendations(user_id);

        let writable = match self.read_cache(&key).await {
            CacheLookup::Hit(posts) => {
                info!(
                    user_id = %user_id,
                    cache = "hit",
                    results = posts.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Served recommendations"
                );
                return Ok(posts);
            }
            CacheLookup::Miss => true,
            CacheLookup::Unavailable => false,
        };

        let posts = if self.config.single_flight {
            self.refresh_single_flight(user_id, &key, writable).await?
        } else {
            self.refresh(user_id, &key, writable).await?
        };

        info!(
            user_id = %user_id,
            cache = if writable { "miss" } else { "unavailable" },
            results = posts.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Served recommendations"
        );
        Ok(posts)
    }

    /// Recompute and overwrite the cached list regardless of freshness. A
    /// failed recompute leaves the previous entry in place.
    pub async fn recompute(&self, user_id: &str) -> Result<Vec<ScoredPost>> {
        let key = self.keys.recommendations(user_id);
        self.refresh(user_id, &key, true).await
    }

    pub async fn invalidate(&self, user_id: &str) -> Result<()> {
        let key = self.keys.recommendations(user_id);
        self.cache.invalidate(&key).await?;
        debug!(user_id = %user_id, "Invalidated recommendations");
        Ok(())
    }

    /// Peer list for `user_id`, uncached
    pub async fn similar_users(&self, user_id: &str) -> Result<Vec<PeerSimilarity>> {
        self.peers.find(user_id).await
    }

    /// Posts visually closest to `post_id`. Empty without a vector index.
    pub async fn similar_posts(&self, post_id: &str, top_n: usize) -> Result<Vec<Post>> {
        match &self.visual {
            Some(visual) => visual.similar_posts(&self.stores, post_id, top_n).await,
            None => Ok(Vec::new()),
        }
    }

    async fn refresh(&self, user_id: &str, key: &str, writable: bool) -> Result<Vec<ScoredPost>> {
        let posts = self.compute_with_retry(user_id).await?;
        if writable {
            self.write_cache(key, &posts).await;
        }
        Ok(posts)
    }

    async fn refresh_single_flight(
        &self,
        user_id: &str,
        key: &str,
        writable: bool,
    ) -> Result<Vec<ScoredPost>> {
        let lock = self.in_flight.entry(key.to_string()).or_default().clone();

        let result = {
            let _guard = lock.clone().lock_owned().await;

            // the previous holder may have just filled the cache
            let lookup = if writable {
                self.read_cache(key).await
            } else {
                CacheLookup::Unavailable
            };
            match lookup {
                CacheLookup::Hit(posts) => Ok(posts),
                CacheLookup::Miss => self.refresh(user_id, key, true).await,
                CacheLookup::Unavailable => self.refresh(user_id, key, false).await,
            }
        };

        drop(lock);
        self.in_flight
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn compute_with_retry(&self, user_id: &str) -> Result<Vec<ScoredPost>> {
        let outcome = with_retry_if(
            self.config.retry_config(),
            RecommendationError::is_retryable,
            || self.compute(user_id),
        )
        .await;

        match outcome {
            Ok(posts) => Ok(posts),
            Err(RetryError::Exhausted { attempts, last }) if attempts > 1 => {
                warn!(
                    user_id = %user_id,
                    attempts,
                    stage = ?last.stage(),
                    error = %last,
                    "Recommendation compute failed"
                );
                Err(RecommendationError::RetriesExhausted {
                    attempts,
                    source: Box::new(last),
                })
            }
            Err(e) => {
                let e = e.into_inner();
                warn!(user_id = %user_id, stage = ?e.stage(), error = %e, "Recommendation compute failed");
                Err(e)
            }
        }
    }

    async fn compute(&self, user_id: &str) -> Result<Vec<ScoredPost>> {
        let started = Instant::now();

        let events = self.affinity.fetch_recent(user_id).await?;
        let recent = self.affinity.resolve(events).await?;
        let profile = AffinityProfile::from_activity(&recent);
        debug!(user_id = %user_id, stage = %Stage::ScoreContent, tags = profile.len());

        let peers = self.peers.find(user_id).await?;
        debug!(user_id = %user_id, stage = %Stage::FindPeers, peers = peers.len());

        let collaborative = self.collaborative.score(&peers).await?;
        debug!(user_id = %user_id, stage = %Stage::ScoreCollaborative);

        let posts = self
            .stores
            .all_posts()
            .await
            .map_err(RecommendationError::at(Stage::NormalizeEngagement))?;
        let engagement = self.engagement.score(&posts).await?;
        debug!(user_id = %user_id, stage = %Stage::NormalizeEngagement, corpus = posts.len());

        let visual = match &self.visual {
            Some(visual) if self.composer.weights().visual > 0.0 => {
                Some(visual.score(&recent.posts_newest_first()).await?)
            }
            _ => None,
        };

        let ranked = self.composer.compose(
            posts,
            &Signals {
                profile: &profile,
                collaborative: &collaborative,
                engagement: &engagement,
                visual: visual.as_ref(),
            },
        );
        debug!(
            user_id = %user_id,
            stage = %Stage::Compose,
            results = ranked.len(),
            elapsed_ms = started.elapsed().as_millis() as u64
        );
        Ok(ranked)
    }

    async fn read_cache(&self, key: &str) -> CacheLookup {
        let bytes = match with_timeout(self.stores.call_timeout, self.cache.get(key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return CacheLookup::Miss,
            Ok(Err(e)) => {
                warn!(key = %key, stage = %Stage::CacheCheck, error = %e, "Cache unavailable, computing fresh");
                return CacheLookup::Unavailable;
            }
            Err(e) => {
                warn!(key = %key, stage = %Stage::CacheCheck, error = %e, "Cache read timed out, computing fresh");
                return CacheLookup::Unavailable;
            }
        };

        match serde_json::from_slice::<CachedRecommendations>(&bytes) {
            Ok(cached) if cached.is_live(self.clock.now()) => CacheLookup::Hit(cached.posts),
            Ok(_) => {
                debug!(key = %key, "Cached entry expired or from another schema");
                CacheLookup::Miss
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Undecodable cache entry");
                CacheLookup::Miss
            }
        }
    }

    /// Best effort; a failed write never fails the request
    async fn write_cache(&self, key: &str, posts: &[ScoredPost]) {
        let ttl = self.config.cache_ttl_secs;
        let payload = CachedRecommendations::new(posts.to_vec(), self.clock.now(), ttl);
        let bytes = match serde_json::to_vec(&payload) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode recommendations");
                return;
            }
        };

        match with_timeout(self.stores.call_timeout, self.cache.set_with_ttl(key, &bytes, ttl)).await {
            Ok(Ok(())) => debug!(key = %key, stage = %Stage::CacheWrite, ttl, "Cached recommendations"),
            Ok(Err(e)) => warn!(key = %key, stage = %Stage::CacheWrite, error = %e, "Cache write failed"),
            Err(e) => warn!(key = %key, stage = %Stage::CacheWrite, error = %e, "Cache write timed out"),
        }
    }
}
