/// Timeout wrapper for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TimeoutError {
    #[error("Operation timed out after {0:?}")]
    Elapsed(Duration),
}

/// Execute a future with timeout
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    timeout(duration, future)
        .await
        .map_err(|_| TimeoutError::Elapsed(duration))
}

/// Execute a fallible future with timeout, folding the elapsed case into the
/// caller's own error type
pub async fn with_timeout_result<F, T, E>(duration: Duration, future: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<TimeoutError>,
{
    match timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(TimeoutError::Elapsed(duration).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum CallError {
        Failed(&'static str),
        TimedOut(Duration),
    }

    impl From<TimeoutError> for CallError {
        fn from(e: TimeoutError) -> Self {
            match e {
                TimeoutError::Elapsed(d) => CallError::TimedOut(d),
            }
        }
    }

    #[tokio::test]
    async fn test_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { 42 }).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_elapsed() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            42
        })
        .await;

        assert_eq!(result, Err(TimeoutError::Elapsed(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_timeout_result_passes_through_inner_error() {
        let result: Result<i32, CallError> = with_timeout_result(Duration::from_secs(1), async {
            Err(CallError::Failed("boom"))
        })
        .await;

        assert_eq!(result, Err(CallError::Failed("boom")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_result_maps_elapsed() {
        let result: Result<i32, CallError> =
            with_timeout_result(Duration::from_millis(5), async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok(1)
            })
            .await;

        assert_eq!(result, Err(CallError::TimedOut(Duration::from_millis(5))));
    }
}
