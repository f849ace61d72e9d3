use anyhow::{bail, Context};
use recommendation_service::{
    jobs::{run_warm_cycle, start_cache_warmer},
    store::{ActivityStore, ContentStore, PgActivityStore, PgContentStore},
    BruteForceVectorIndex, Config, RecommendationOrchestrator,
};
use recs_cache::{InMemoryResultCache, RedisResultCache, ResultCache};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

enum Command {
    /// Periodic cache warming until ctrl-c
    Serve,
    /// One warm cycle, then exit
    WarmOnce,
    Recommend(String),
    SimilarUsers(String),
    SimilarPosts(String, usize),
}

fn parse_args() -> anyhow::Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    Ok(match args.as_slice() {
        [] => Command::Serve,
        ["--once"] => Command::WarmOnce,
        ["recommend", user_id] => Command::Recommend(user_id.to_string()),
        ["similar-users", user_id] => Command::SimilarUsers(user_id.to_string()),
        ["similar-posts", post_id] => Command::SimilarPosts(post_id.to_string(), 10),
        ["similar-posts", post_id, top_n] => Command::SimilarPosts(
            post_id.to_string(),
            top_n.parse().context("top_n must be a positive integer")?,
        ),
        _ => bail!(
            "usage: recommendation-service [--once | recommend <user_id> | \
             similar-users <user_id> | similar-posts <post_id> [top_n]]"
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load config")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.service.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    let command = parse_args()?;

    info!(
        "Starting {} v{}",
        config.service.service_name,
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to create database pool")?;

    let activity: Arc<dyn ActivityStore> = Arc::new(PgActivityStore::new(db_pool.clone()));
    let content: Arc<dyn ContentStore> = Arc::new(PgContentStore::new(db_pool));

    let redis = match RedisResultCache::connect(&config.redis.url).await {
        Ok(redis) => redis.ping().await.map(|_| redis),
        Err(e) => Err(e),
    };
    let cache: Arc<dyn ResultCache> = match redis {
        Ok(redis) => {
            info!("Connected to Redis result cache");
            Arc::new(redis)
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, falling back to in-process cache");
            Arc::new(InMemoryResultCache::new())
        }
    };

    let mut orchestrator = RecommendationOrchestrator::new(
        activity,
        content.clone(),
        cache,
        config.pipeline.clone(),
    );

    let wants_index = config.pipeline.visual_weight > 0.0 || matches!(command, Command::SimilarPosts(..));
    if wants_index {
        let posts = content
            .all_posts()
            .await
            .context("Failed to load posts for the vector index")?;
        let index = BruteForceVectorIndex::from_posts(&posts);
        info!(indexed = index.len(), dim = index.dim(), "Vector index ready");
        orchestrator = orchestrator.with_vector_search(Arc::new(index));
    }
    let orchestrator = Arc::new(orchestrator);

    match command {
        Command::Recommend(user_id) => {
            let posts = orchestrator.get_recommendations(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
        }
        Command::SimilarUsers(user_id) => {
            let peers = orchestrator.similar_users(&user_id).await?;
            println!("{}", serde_json::to_string_pretty(&peers)?);
        }
        Command::SimilarPosts(post_id, top_n) => {
            let posts = orchestrator.similar_posts(&post_id, top_n).await?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
        }
        Command::WarmOnce => {
            let report = run_warm_cycle(&orchestrator, &config.warmer).await?;
            info!(
                candidates = report.candidates,
                warmed = report.warmed,
                failed = report.failed,
                "Warm cycle finished"
            );
        }
        Command::Serve => {
            tokio::select! {
                _ = start_cache_warmer(orchestrator.clone(), config.warmer.clone()) => {
                    info!("Cache warmer exited");
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                }
            }
        }
    }

    Ok(())
}
