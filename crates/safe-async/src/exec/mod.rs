//! Guarded execution of asynchronous operations
//!
//! [`safe_async`] runs one operation under a composable set of cancellation
//! sources (an external [`CancelSignal`], a per-attempt timeout) and a
//! bounded retry budget, resolving to the operation's value, a
//! caller-supplied fallback, or a classified [`AppError`].
//!
//! Per attempt the executor owns a fresh [`TimeoutSource`] and (when both an
//! external signal and a timeout are configured) a [`MergedSignal`]; both
//! are released before the next attempt starts, so repeated attempts can
//! never pile up timers or listeners. Cancellation is cooperative: the
//! operation receives the effective signal through its [`OpContext`] and is
//! expected to stop with [`Interrupted`] when it observes a firing.

pub mod helpers;

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::error::{classify, AppError, BoxError, ErrorKind};
use crate::signal::merge::{merge, MergedSignal};
use crate::signal::timeout::TimeoutSource;
use crate::signal::{CancelSignal, Interrupted};

/// What the operation sees of one attempt.
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Effective cancellation signal for this attempt, if any source is
    /// configured. Operations observe it at their own checkpoints and stop
    /// with [`Interrupted`].
    pub signal: Option<CancelSignal>,
    /// 0-based attempt index.
    pub attempt: u32,
}

type ErrorHook = Box<dyn FnMut(&AppError) + Send>;
type Classifier = Box<dyn Fn(BoxError) -> AppError + Send + Sync>;

/// Configuration for one [`safe_async`] call.
///
/// Immutable for the call's lifetime. Built through
/// [`SafeAsyncConfig::builder`]; [`SafeAsyncConfig::default`] is one attempt
/// with no timeout, no signal and no fallback.
pub struct SafeAsyncConfig<T> {
    timeout: Option<Duration>,
    signal: Option<CancelSignal>,
    retry: u32,
    fallback: Option<T>,
    on_error: Option<ErrorHook>,
    map_error: Option<Classifier>,
}

impl<T> Default for SafeAsyncConfig<T> {
    fn default() -> Self {
        Self {
            timeout: None,
            signal: None,
            retry: 0,
            fallback: None,
            on_error: None,
            map_error: None,
        }
    }
}

impl<T> SafeAsyncConfig<T> {
    /// Create a configuration builder.
    pub fn builder() -> SafeAsyncConfigBuilder<T> {
        SafeAsyncConfigBuilder { config: Self::default() }
    }
}

impl<T> std::fmt::Debug for SafeAsyncConfig<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafeAsyncConfig")
            .field("timeout", &self.timeout)
            .field("signal", &self.signal)
            .field("retry", &self.retry)
            .field("fallback_present", &self.fallback.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("map_error", &self.map_error.is_some())
            .finish()
    }
}

/// Builder for [`SafeAsyncConfig`] with fluent API.
pub struct SafeAsyncConfigBuilder<T> {
    config: SafeAsyncConfig<T>,
}

impl<T> Default for SafeAsyncConfigBuilder<T> {
    fn default() -> Self {
        SafeAsyncConfig::builder()
    }
}

impl<T> SafeAsyncConfigBuilder<T> {
    /// Per-attempt timeout. Each attempt gets its own fresh timer.
    #[must_use]
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.config.timeout = Some(duration);
        self
    }

    /// External cancellation signal, merged with the per-attempt timeout.
    #[must_use]
    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.config.signal = Some(signal);
        self
    }

    /// Retry budget: number of re-attempts after the first failure.
    /// `retry(2)` means up to three invocations total.
    #[must_use]
    pub fn retry(mut self, budget: u32) -> Self {
        self.config.retry = budget;
        self
    }

    /// Value to resolve with when every attempt has failed.
    ///
    /// Presence is what matters: `fallback(None)` with `T = Option<U>`
    /// still counts as a supplied fallback and resolves the call to `None`
    /// on exhaustion.
    #[must_use]
    pub fn fallback(mut self, value: T) -> Self {
        self.config.fallback = Some(value);
        self
    }

    /// Observer invoked with the classified error, at most once, only on
    /// terminal failure. Observability hook only; it cannot alter control
    /// flow.
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&AppError) + Send + 'static,
    {
        self.config.on_error = Some(Box::new(hook));
        self
    }

    /// Replace the default classifier. The function receives the boxed raw
    /// failure unmodified.
    #[must_use]
    pub fn map_error<F>(mut self, classifier: F) -> Self
    where
        F: Fn(BoxError) -> AppError + Send + Sync + 'static,
    {
        self.config.map_error = Some(Box::new(classifier));
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<SafeAsyncConfig<T>, AppError> {
        if self.config.timeout.is_some_and(|duration| duration.is_zero()) {
            return Err(AppError::validation("timeout must be greater than zero"));
        }
        Ok(self.config)
    }
}

/// Result of a [`safe_async_with_outcome`] call including summary
/// statistics.
#[derive(Debug)]
pub struct ExecOutcome<T> {
    /// The call's resolution: value or fallback on `Ok`, the last attempt's
    /// classified error on `Err`.
    pub result: Result<T, AppError>,
    /// Number of operation invocations that happened.
    pub attempts: u32,
    /// Wall-clock time from first attempt to resolution.
    pub elapsed: Duration,
}

impl<T> ExecOutcome<T> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> Result<T, AppError> {
        self.result
    }
}

/// Run one asynchronous operation under cancellation and retry guards.
///
/// The operation is invoked with a fresh [`OpContext`] per attempt and
/// awaited to completion. On failure the executor disposes the attempt's
/// timer, classifies the failure, and either re-attempts (within the retry
/// budget), resolves with the configured fallback, or returns the
/// classified error. `on_error` observes the final classified error exactly
/// once.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use safe_async::{safe_async, Interrupted, SafeAsyncConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let config = SafeAsyncConfig::builder()
///         .timeout(Duration::from_millis(200))
///         .retry(2)
///         .fallback(0u64)
///         .build()
///         .unwrap();
///
///     let total = safe_async(
///         |ctx| async move {
///             // A cooperative operation: bail out if the signal fires.
///             if let Some(signal) = &ctx.signal {
///                 signal.check()?;
///             }
///             Ok::<u64, Interrupted>(42)
///         },
///         config,
///     )
///     .await;
///
///     assert_eq!(total.unwrap(), 42);
/// }
/// ```
pub async fn safe_async<T, F, Fut, E>(op: F, config: SafeAsyncConfig<T>) -> Result<T, AppError>
where
    F: FnMut(OpContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    safe_async_with_outcome(op, config).await.into_result()
}

/// Like [`safe_async`], additionally reporting attempt count and elapsed
/// time.
#[instrument(skip(op, config), fields(retry = config.retry))]
pub async fn safe_async_with_outcome<T, F, Fut, E>(
    mut op: F,
    config: SafeAsyncConfig<T>,
) -> ExecOutcome<T>
where
    F: FnMut(OpContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<BoxError>,
{
    let SafeAsyncConfig { timeout, signal, retry, mut fallback, mut on_error, map_error } = config;

    let started = Instant::now();
    let mut failures: u32 = 0;

    loop {
        let attempt = failures;
        let mut timer = timeout.map(TimeoutSource::start);
        let mut merged: Option<MergedSignal> = None;

        let effective = match (signal.as_ref(), timer.as_ref()) {
            (Some(external), Some(timer)) => {
                let combination = merge(&[external.clone(), timer.signal().clone()]);
                let combined = combination.signal().clone();
                merged = Some(combination);
                Some(combined)
            }
            (Some(external), None) => Some(external.clone()),
            (None, Some(timer)) => Some(timer.signal().clone()),
            (None, None) => None,
        };

        debug!(attempt, "invoking operation");

        match op(OpContext { signal: effective, attempt }).await {
            Ok(value) => {
                if let Some(timer) = timer.as_mut() {
                    timer.dispose();
                }
                if failures > 0 {
                    debug!(attempts = failures + 1, "operation succeeded after retries");
                }
                return ExecOutcome {
                    result: Ok(value),
                    attempts: failures + 1,
                    elapsed: started.elapsed(),
                };
            }
            Err(raw) => {
                // Record whether this attempt's own timer had fired before
                // releasing it; the external signal firing at the same
                // moment must not be mistaken for a timeout.
                let timer_fired = timer.as_ref().is_some_and(|timer| timer.signal().is_fired());
                if let Some(timer) = timer.as_mut() {
                    timer.dispose();
                }

                let raw: BoxError = raw.into();
                let classified = if timer_fired && raw.is::<Interrupted>() {
                    let message = timeout.map_or_else(
                        || "operation timed out".to_owned(),
                        |duration| format!("operation timed out after {duration:?}"),
                    );
                    AppError::new(ErrorKind::Timeout, message).with_cause(raw)
                } else if let Some(classifier) = map_error.as_ref() {
                    classifier(raw)
                } else {
                    classify(raw)
                };

                failures += 1;

                if failures > retry {
                    warn!(attempts = failures, kind = ?classified.kind(), error = %classified, "attempts exhausted");
                    if let Some(hook) = on_error.as_mut() {
                        hook(&classified);
                    }
                    if let Some(value) = fallback.take() {
                        debug!("resolving with fallback");
                        return ExecOutcome {
                            result: Ok(value),
                            attempts: failures,
                            elapsed: started.elapsed(),
                        };
                    }
                    return ExecOutcome {
                        result: Err(classified),
                        attempts: failures,
                        elapsed: started.elapsed(),
                    };
                }

                debug!(attempt = failures, error = %classified, "attempt failed, retrying");

                // Release this attempt's listeners before the next attempt
                // allocates its own; timers and combinations never overlap
                // across attempts.
                if let Some(merged) = merged.take() {
                    merged.detach();
                }
            }
        }
    }
}
