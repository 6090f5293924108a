//! Guarded execution for asynchronous operations.
//!
//! This crate runs a single async operation under a composable set of
//! cancellation sources (an external [`CancelSignal`], a per-attempt
//! timeout) and a bounded retry budget, resolving to the operation's value,
//! a caller-supplied fallback, or a classified [`AppError`].
//!
//! The pieces compose but stand alone:
//! - [`CancelSignal`]: one-shot subscribe/fire cancellation primitive
//! - [`TimeoutSource`]: a deadline that owns its timer and fires a signal
//! - [`merge`]: first-wins combination of several signals with leak-free
//!   listener teardown
//! - [`classify`] / [`AppError`]: stable failure classification
//! - [`safe_async`]: the retrying executor tying them together
//! - [`safe_all`] / [`swallow`]: stateless conveniences for fan-out and
//!   failure absorption
//!
//! Cancellation is cooperative. An operation receives the effective signal
//! in its [`OpContext`], observes it at its own checkpoints (or selects on
//! [`CancelSignal::cancelled`]) and stops with [`Interrupted`]; the executor
//! releases its own timers and listeners promptly whether or not the
//! operation cooperates.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod error;
pub mod exec;
pub mod signal;

// Re-export commonly used types for convenience
// ------------------------------
pub use error::{classify, AppError, BoxError, ErrorKind};
pub use exec::helpers::{safe_all, swallow};
pub use exec::{
    safe_async, safe_async_with_outcome, ExecOutcome, OpContext, SafeAsyncConfig,
    SafeAsyncConfigBuilder,
};
pub use signal::merge::{merge, MergedSignal};
pub use signal::timeout::TimeoutSource;
pub use signal::{CancelSignal, Interrupted, Subscription};
