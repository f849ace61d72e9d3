// Utility functions for recommendation-service

use crate::store::StoreResult;
use futures::stream::{self, StreamExt, TryStreamExt};
use resilience::with_timeout_result;
use std::future::Future;
use std::time::Duration;

/// Run `f` over `items` with at most `concurrency` calls in flight.
///
/// Results come back in input order regardless of completion order. The
/// first error wins and drops every call still pending.
pub async fn fan_out<I, T, F, Fut, R, E>(items: I, concurrency: usize, f: F) -> Result<Vec<R>, E>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    stream::iter(items)
        .map(f)
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}

/// Bound a single store round-trip; elapsing becomes `StoreError::Timeout`
pub async fn bounded<F, T>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    with_timeout_result(limit, call).await
}

/// `value / max` with a zero max treated as 1
pub fn ratio(value: u64, max: u64) -> f64 {
    value as f64 / max.max(1) as f64
}
