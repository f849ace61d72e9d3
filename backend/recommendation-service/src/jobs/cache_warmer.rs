//! Cache warmer background job
//!
//! Refreshes cached recommendation lists for users with activity, so most
//! requests are served from cache instead of paying the full-corpus
//! rescoring cost. Each cycle:
//!
//! 1. Enumerates users with any activity (store enumeration order)
//! 2. Recomputes and overwrites the cached list for up to
//!    `max_users_per_cycle` of them
//!
//! A user whose recompute fails keeps their previous entry until it expires.

use crate::config::WarmerConfig;
use crate::error::{RecommendationError, Result};
use crate::models::Stage;
use crate::services::RecommendationOrchestrator;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::sleep;

/// Outcome of one warm cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmCycleReport {
    pub candidates: usize,
    pub warmed: usize,
    pub failed: usize,
}

/// Run warm cycles forever, `config.interval()` apart
pub async fn start_cache_warmer(
    orchestrator: Arc<RecommendationOrchestrator>,
    config: WarmerConfig,
) {
    if !config.enabled {
        tracing::info!("Cache warmer disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval_secs,
        max_users = config.max_users_per_cycle,
        "Starting cache warmer background job"
    );

    loop {
        let cycle_start = Instant::now();

        match run_warm_cycle(&orchestrator, &config).await {
            Ok(report) => {
                tracing::info!(
                    candidates = report.candidates,
                    users_warmed = report.warmed,
                    users_failed = report.failed,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Cache warm cycle completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    duration_ms = cycle_start.elapsed().as_millis() as u64,
                    "Cache warm cycle failed"
                );
            }
        }

        sleep(config.interval()).await;
    }
}

/// Run a single cache warming cycle
pub async fn run_warm_cycle(
    orchestrator: &RecommendationOrchestrator,
    config: &WarmerConfig,
) -> Result<WarmCycleReport> {
    let candidates = orchestrator
        .stores()
        .distinct_user_ids()
        .await
        .map_err(RecommendationError::at(Stage::FetchActivity))?;

    let mut report = WarmCycleReport {
        candidates: candidates.len(),
        ..Default::default()
    };
    if candidates.is_empty() {
        tracing::debug!("No warm candidates found");
        return Ok(report);
    }

    for user_id in candidates.into_iter().take(config.max_users_per_cycle) {
        match orchestrator.recompute(&user_id).await {
            Ok(posts) => {
                tracing::trace!(user_id = %user_id, results = posts.len(), "Warmed recommendations");
                report.warmed += 1;
            }
            Err(e) => {
                tracing::debug!(
                    user_id = %user_id,
                    error = %e,
                    "Failed to warm recommendations for user"
                );
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
