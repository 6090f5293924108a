//! Classified errors
//!
//! Raw failures coming out of an operation can be anything that converts
//! into a [`BoxError`]. Before they reach callers or observers they are
//! classified into an [`AppError`]: a stable kind for telemetry and retry
//! decisions, a human-readable message, an optional cause chain, and an
//! optional metadata map.
//!
//! [`classify`] is the default classifier. Callers can replace it wholesale
//! through the executor configuration; a replacement receives the boxed raw
//! failure unmodified.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal::Interrupted;

/// Boxed raw failure type accepted at every fallible boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/* -------------------------------------------------------------------------- */
/* Stable error kinds for telemetry */
/* -------------------------------------------------------------------------- */

/// Stable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorKind {
    /// Failure with no recognized shape.
    Unknown,
    /// The attempt's own timeout elapsed.
    Timeout,
    /// A cancellation signal fired and the operation stopped.
    Aborted,
    /// Connectivity or remote-service failure (produced by custom
    /// classifiers).
    Network,
    /// Input or configuration rejected before any work happened.
    Validation,
}

/* -------------------------------------------------------------------------- */
/* Classified error value */
/* -------------------------------------------------------------------------- */

/// A classified failure surfaced to callers and observers.
///
/// Immutable once built; cheap to clone (the cause is shared). The stored
/// cause is reachable through [`std::error::Error::source`] so standard
/// error-chain tooling keeps working.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AppError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    meta: Option<HashMap<String, serde_json::Value>>,
}

impl AppError {
    /// Build an error with a kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause: None, meta: None }
    }

    /// Shorthand for a [`ErrorKind::Validation`] error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for a [`ErrorKind::Network`] error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// Attach the raw failure this error was classified from.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.get_or_insert_with(HashMap::new).insert(key.into(), value);
        self
    }

    /// The stable kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The metadata map, if any entries were attached.
    pub fn meta(&self) -> Option<&HashMap<String, serde_json::Value>> {
        self.meta.as_ref()
    }

    /// Indicates whether the error represents a transient failure that
    /// callers can safely retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::Network)
    }
}

/* -------------------------------------------------------------------------- */
/* Default classifier */
/* -------------------------------------------------------------------------- */

/// Map an arbitrary raw failure to an [`AppError`].
///
/// - An [`AppError`] passes through unchanged (classification is
///   idempotent).
/// - [`Interrupted`] becomes [`ErrorKind::Aborted`] with the raw failure as
///   cause.
/// - Anything else becomes [`ErrorKind::Unknown`] with the raw failure as
///   cause and a fixed generic message.
pub fn classify(raw: BoxError) -> AppError {
    let raw = match raw.downcast::<AppError>() {
        Ok(already_classified) => return *already_classified,
        Err(raw) => raw,
    };

    if raw.is::<Interrupted>() {
        AppError::new(ErrorKind::Aborted, "operation aborted").with_cause(raw)
    } else {
        AppError::new(ErrorKind::Unknown, "unknown error").with_cause(raw)
    }
}
