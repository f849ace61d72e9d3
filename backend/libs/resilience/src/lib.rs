/// Resilience patterns for the recommendation pipeline
///
/// - **Timeout**: every store round-trip carries its own deadline
/// - **Retry**: exponential backoff with jitter, gated on a retryability predicate
///
/// # Example: store call with timeout and retry
///
/// ```rust,no_run
/// use resilience::{with_retry_if, with_timeout, RetryConfig};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_retry_if(
///         RetryConfig::default(),
///         |_err: &String| true,
///         || async {
///             with_timeout(Duration::from_millis(500), async { 42 })
///                 .await
///                 .map_err(|e| e.to_string())
///         },
///     )
///     .await;
///     assert!(result.is_ok());
/// }
/// ```

pub mod retry;
pub mod timeout;

pub use retry::{with_retry, with_retry_if, RetryConfig, RetryError};
pub use timeout::{with_timeout, with_timeout_result, TimeoutError};
