//! Convenience helpers around classified failures
//!
//! Small, stateless companions to the executor: a parallel fan-out that
//! stops at the first failure, and a wrapper that absorbs a failure into an
//! `Option` after reporting it. Neither carries cancellation or retry
//! logic.

use std::future::Future;

use futures::future::try_join_all;

use crate::error::{classify, AppError, BoxError};

/// Await every operation concurrently and return all results, or the first
/// failure classified through the default classifier.
///
/// Naive fan-out: remaining operations are dropped once one fails.
pub async fn safe_all<T, E, I>(ops: I) -> Result<Vec<T>, AppError>
where
    I: IntoIterator,
    I::Item: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    try_join_all(
        ops.into_iter().map(|fut| async move { fut.await.map_err(|raw| classify(raw.into())) }),
    )
    .await
}

/// Await one future, absorbing its failure.
///
/// On success returns `Some(value)`. On failure the raw error is classified,
/// handed to `on_error`, and `None` is returned.
pub async fn swallow<T, E, Fut, H>(fut: Fut, on_error: H) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
    H: FnOnce(&AppError),
{
    match fut.await {
        Ok(value) => Some(value),
        Err(raw) => {
            let classified = classify(raw.into());
            on_error(&classified);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the convenience helpers.

    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use crate::error::ErrorKind;

    use super::*;

    /// Tests all values come back in order when every operation succeeds.
    #[tokio::test]
    async fn test_safe_all_collects_in_order() {
        let ops = (0..4).map(|n| async move { Ok::<_, BoxError>(n * 10) });

        let results = safe_all(ops).await;
        assert_eq!(results.ok(), Some(vec![0, 10, 20, 30]));
    }

    /// Tests the first failure surfaces as a classified error.
    #[tokio::test]
    async fn test_safe_all_returns_first_error() {
        let ops = (0..4).map(|n| async move {
            if n == 2 {
                Err(format!("operation {n} failed"))
            } else {
                Ok(n)
            }
        });

        let error = safe_all(ops).await.expect_err("one op failed");
        assert_eq!(error.kind(), ErrorKind::Unknown);
    }

    /// Tests the empty fan-out resolves to an empty vector.
    #[tokio::test]
    async fn test_safe_all_empty() {
        let ops: Vec<std::future::Ready<Result<u32, BoxError>>> = Vec::new();

        let results = safe_all(ops).await;
        assert_eq!(results.ok(), Some(Vec::new()));
    }

    /// Tests a successful future passes through untouched.
    #[tokio::test]
    async fn test_swallow_success() {
        let observed = Arc::new(AtomicU32::new(0));
        let observed_clone = Arc::clone(&observed);

        let value = swallow(async { Ok::<_, BoxError>(5) }, move |_error| {
            observed_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(value, Some(5));
        assert_eq!(observed.load(Ordering::SeqCst), 0);
    }

    /// Tests a failure is absorbed and reported exactly once.
    #[tokio::test]
    async fn test_swallow_failure() {
        let observed = Arc::new(AtomicU32::new(0));
        let observed_clone = Arc::clone(&observed);

        let value: Option<u32> = swallow(async { Err("boom") }, move |error| {
            assert_eq!(error.kind(), ErrorKind::Unknown);
            observed_clone.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(value, None);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }
}
