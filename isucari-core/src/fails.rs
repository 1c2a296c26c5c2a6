//! Thread-safe sink for failures observed during a run.

use crate::error::{Error, FailureKind};
use parking_lot::Mutex;
use tracing::{error, warn};

/// Message shown to the operator in place of an internal error's detail.
pub const INTERNAL_FAILURE_MESSAGE: &str =
    "internal benchmarker error; please contact the organizers";

/// Per-kind failure counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureCounts {
    /// Critical failures
    pub critical: usize,
    /// Application failures
    pub application: usize,
    /// Trivial failures
    pub trivial: usize,
}

#[derive(Debug, Default)]
struct Inner {
    messages: Vec<String>,
    counts: FailureCounts,
}

/// Append-only failure aggregator.
///
/// Messages keep call order. No order is promised between scenarios running
/// on different tasks.
#[derive(Debug, Default)]
pub struct FailureAggregator {
    inner: Mutex<Inner>,
}

impl FailureAggregator {
    /// Create an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure.
    ///
    /// Domain failures keep their message. Internal failures are logged with
    /// full detail and recorded as [`INTERNAL_FAILURE_MESSAGE`]; they count as
    /// critical since the run can no longer be trusted.
    pub fn add(&self, err: &Error) {
        let (message, kind) = match err.kind() {
            Some(kind) => {
                if let Error::Application { detail: Some(detail), .. } = err {
                    warn!(%detail, "{err}");
                } else {
                    warn!("{err}");
                }
                (err.to_string(), kind)
            },
            None => {
                error!(error = %err, "internal failure");
                (INTERNAL_FAILURE_MESSAGE.to_string(), FailureKind::Critical)
            },
        };

        let mut inner = self.inner.lock();
        match kind {
            FailureKind::Critical => inner.counts.critical += 1,
            FailureKind::Application => inner.counts.application += 1,
            FailureKind::Trivial => inner.counts.trivial += 1,
        }
        inner.messages.push(message);
    }

    /// Record the error of a result, if any.
    pub fn add_result<T>(&self, result: &Result<T, Error>) {
        if let Err(err) = result {
            self.add(err);
        }
    }

    /// All messages in call order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.inner.lock().messages.clone()
    }

    /// Current per-kind counters.
    #[must_use]
    pub fn counts(&self) -> FailureCounts {
        self.inner.lock().counts
    }

    /// Messages and counters read under one lock.
    #[must_use]
    pub fn snapshot(&self) -> (Vec<String>, FailureCounts) {
        let inner = self.inner.lock();
        (inner.messages.clone(), inner.counts)
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().messages.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sort and deduplicate messages for the final report.
#[must_use]
pub fn unique_messages(mut messages: Vec<String>) -> Vec<String> {
    messages.sort();
    messages.dedup();
    messages
}
