pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

pub use config::{Config, PipelineConfig};
pub use error::{RecommendationError, Result};
pub use models::{ActivityEvent, PeerSimilarity, Post, ScoredPost, Stage, User};
pub use services::{BruteForceVectorIndex, RecommendationOrchestrator, VectorSearch};
