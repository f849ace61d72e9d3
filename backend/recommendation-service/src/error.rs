use crate::models::Stage;
use crate::store::StoreError;
use recs_cache::CacheError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecommendationError {
    #[error("{stage} failed: {source}")]
    StoreUnavailable {
        stage: Stage,
        #[source]
        source: StoreError,
    },

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<RecommendationError>,
    },
}

impl RecommendationError {
    /// Adapter for `map_err` at a given pipeline stage
    pub fn at(stage: Stage) -> impl FnOnce(StoreError) -> Self {
        move |source| RecommendationError::StoreUnavailable { stage, source }
    }

    /// Store outages and timeouts are worth another attempt; nothing else is
    pub fn is_retryable(&self) -> bool {
        match self {
            RecommendationError::StoreUnavailable { source, .. } => source.is_retryable(),
            RecommendationError::CacheUnavailable(_) => false,
            RecommendationError::RetriesExhausted { .. } => false,
        }
    }

    /// Stage that failed, if the failure came from the pipeline
    pub fn stage(&self) -> Option<Stage> {
        match self {
            RecommendationError::StoreUnavailable { stage, .. } => Some(*stage),
            // raised only by invalidate
            RecommendationError::CacheUnavailable(_) => None,
            RecommendationError::RetriesExhausted { source, .. } => source.stage(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecommendationError>;
