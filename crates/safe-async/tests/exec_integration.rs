//! Integration tests for guarded execution
//!
//! Exercises the executor together with real timers, external signals and
//! signal merging under various failure scenarios.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use safe_async::{
    merge, safe_async, safe_async_with_outcome, AppError, CancelSignal, ErrorKind, Interrupted,
    SafeAsyncConfig, TimeoutSource,
};

/// Custom error type for testing
#[derive(Debug, Clone)]
struct TestError {
    message: String,
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for TestError {}

/// Validates a slow operation is cut off by its per-attempt timeout.
///
/// # Test Steps
/// 1. Configure a 10ms timeout with no retry budget
/// 2. Run an operation that needs 100ms, selecting on its signal
/// 3. Verify the call rejects with a Timeout-kind error
/// 4. Verify the signal the operation received had fired
#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_cuts_off_slow_operation() {
    let seen_signal: Arc<Mutex<Option<CancelSignal>>> = Arc::new(Mutex::new(None));
    let seen_signal_clone = Arc::clone(&seen_signal);

    let config = SafeAsyncConfig::builder()
        .timeout(Duration::from_millis(10))
        .build()
        .expect("valid config");

    let result: Result<(), AppError> = safe_async(
        |ctx| {
            let seen_signal = Arc::clone(&seen_signal_clone);
            async move {
                let signal = ctx.signal.expect("timeout configured");
                *seen_signal.lock() = Some(signal.clone());
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(100)) => Ok(()),
                    () = signal.cancelled() => Err(Interrupted),
                }
            }
        },
        config,
    )
    .await;

    let error = result.expect_err("should time out");
    assert_eq!(error.kind(), ErrorKind::Timeout);

    let signal = seen_signal.lock().clone().expect("operation ran");
    assert!(signal.is_fired());
}

/// Validates each attempt gets a fresh timeout and a fast retry succeeds.
///
/// # Test Steps
/// 1. Configure a 20ms timeout and one retry
/// 2. First attempt blocks until interrupted; second returns immediately
/// 3. Verify the call succeeds with two invocations
#[tokio::test(flavor = "multi_thread")]
async fn test_fresh_timer_per_attempt() -> anyhow::Result<()> {
    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_clone = Arc::clone(&invocations);

    let config = SafeAsyncConfig::builder()
        .timeout(Duration::from_millis(20))
        .retry(1)
        .build()?;

    let outcome = safe_async_with_outcome(
        |ctx| {
            let invocations = Arc::clone(&invocations_clone);
            async move {
                let attempt = invocations.fetch_add(1, Ordering::SeqCst);
                if attempt == 0 {
                    let signal = ctx.signal.expect("timeout configured");
                    signal.cancelled().await;
                    Err(Interrupted)
                } else {
                    Ok("recovered")
                }
            }
        },
        config,
    )
    .await;

    assert_eq!(outcome.result?, "recovered");
    assert_eq!(outcome.attempts, 2);
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
    Ok(())
}

/// Validates external cancellation mid-flight surfaces as Aborted, not
/// Timeout, even with a timeout configured.
///
/// # Test Steps
/// 1. Configure a generous 5s timeout plus an external signal
/// 2. Fire the external signal from a separate task after 10ms
/// 3. Verify the operation observed the merged signal and the error kind
///    is Aborted
#[tokio::test(flavor = "multi_thread")]
async fn test_external_cancellation_mid_flight() {
    let external = CancelSignal::new();
    let firing = external.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        firing.fire();
    });

    let config = SafeAsyncConfig::builder()
        .timeout(Duration::from_secs(5))
        .signal(external)
        .build()
        .expect("valid config");

    let result: Result<(), AppError> = safe_async(
        |ctx| async move {
            let signal = ctx.signal.expect("signal configured");
            signal.cancelled().await;
            Err(Interrupted)
        },
        config,
    )
    .await;

    let error = result.expect_err("should abort");
    assert_eq!(error.kind(), ErrorKind::Aborted);
}

/// Validates retries stop consuming the budget once the caller cancels.
///
/// A permanently failing operation with a large retry budget still runs the
/// full budget; this test only pins down the invariant that the surfaced
/// error is the last attempt's classification.
///
/// # Test Steps
/// 1. Configure retry = 2 with a classifier tagging each attempt
/// 2. Fail every attempt with a distinct message
/// 3. Verify three invocations and that the surfaced error is attempt 2's
#[tokio::test(flavor = "multi_thread")]
async fn test_last_attempt_error_surfaces() {
    let invocations = Arc::new(AtomicU32::new(0));
    let invocations_clone = Arc::clone(&invocations);

    let config = SafeAsyncConfig::builder().retry(2).build().expect("valid config");

    let result: Result<(), AppError> = safe_async(
        |_ctx| {
            let invocations = Arc::clone(&invocations_clone);
            async move {
                let attempt = invocations.fetch_add(1, Ordering::SeqCst);
                Err(TestError { message: format!("failure {attempt}") })
            }
        },
        config,
    )
    .await;

    assert_eq!(invocations.load(Ordering::SeqCst), 3);
    let error = result.expect_err("exhausted");
    assert_eq!(error.kind(), ErrorKind::Unknown);
    let cause = std::error::Error::source(&error).map(ToString::to_string);
    assert_eq!(cause.as_deref(), Some("failure 2"));
}

/// Validates the executor composes with a standalone timeout source used as
/// the external signal.
///
/// # Test Steps
/// 1. Build a TimeoutSource outside the executor and pass its signal in
/// 2. Run an operation that outlives the external deadline
/// 3. Verify the failure classifies as Aborted (the external deadline is
///    not the attempt's own timeout)
#[tokio::test(flavor = "multi_thread")]
async fn test_external_deadline_is_aborted_not_timeout() {
    let deadline = TimeoutSource::start(Duration::from_millis(10));

    let config = SafeAsyncConfig::builder()
        .signal(deadline.signal().clone())
        .build()
        .expect("valid config");

    let result: Result<(), AppError> = safe_async(
        |ctx| async move {
            let signal = ctx.signal.expect("signal configured");
            signal.cancelled().await;
            Err(Interrupted)
        },
        config,
    )
    .await;

    let error = result.expect_err("deadline hit");
    assert_eq!(error.kind(), ErrorKind::Aborted);
}

/// Validates merged signals propagate the first firing to a waiting
/// operation.
///
/// # Test Steps
/// 1. Merge two live signals
/// 2. Fire one from a separate task
/// 3. Verify a task waiting on the combination wakes exactly once
#[tokio::test(flavor = "multi_thread")]
async fn test_merge_wakes_waiter_once() {
    let a = CancelSignal::new();
    let b = CancelSignal::new();
    let merged = merge(&[a.clone(), b.clone()]);
    let combined = merged.signal().clone();

    let notifications = Arc::new(AtomicU32::new(0));
    let notifications_clone = Arc::clone(&notifications);
    combined.subscribe(move || {
        notifications_clone.fetch_add(1, Ordering::SeqCst);
    });

    tokio::spawn(async move {
        a.fire();
        b.fire();
    });

    combined.cancelled().await;
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
}

/// Validates fallback resolution together with a timeout, end to end.
///
/// # Test Steps
/// 1. Configure a 10ms timeout, one retry and a fallback value
/// 2. Run an operation that always outlives the timeout
/// 3. Verify the call resolves to the fallback and on_error saw a
///    Timeout-kind error exactly once
#[tokio::test(flavor = "multi_thread")]
async fn test_timeout_then_fallback() {
    let observed_kinds = Arc::new(Mutex::new(Vec::new()));
    let observed_clone = Arc::clone(&observed_kinds);

    let config = SafeAsyncConfig::builder()
        .timeout(Duration::from_millis(10))
        .retry(1)
        .fallback("cached")
        .on_error(move |error: &AppError| {
            observed_clone.lock().push(error.kind());
        })
        .build()
        .expect("valid config");

    let result = safe_async(
        |ctx| async move {
            let signal = ctx.signal.expect("timeout configured");
            signal.cancelled().await;
            Err::<&str, _>(Interrupted)
        },
        config,
    )
    .await;

    assert_eq!(result.ok(), Some("cached"));
    assert_eq!(*observed_kinds.lock(), vec![ErrorKind::Timeout]);
}
