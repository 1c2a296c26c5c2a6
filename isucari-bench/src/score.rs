//! Verdict and score of a run.

use isucari_core::{unique_messages, FailureCounts};
use serde::{Deserialize, Serialize};

/// Application failures that fail a run.
pub const MAX_APPLICATION_FAILURES: usize = 10;
/// Points lost per application failure.
pub const APPLICATION_PENALTY: i64 = 500;
/// Trivial failures tolerated before they cost points.
pub const TRIVIAL_ALLOWANCE: usize = 200;
/// Trivial failures per penalty step past the allowance.
pub const TRIVIAL_STEP: usize = 100;
/// Points lost per trivial penalty step.
pub const TRIVIAL_PENALTY: i64 = 5000;

/// The JSON line printed at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchOutput {
    /// Whether the target passed
    pub pass: bool,
    /// Final score, 0 when failed
    pub score: i64,
    /// Campaign level reported by `/initialize`
    pub campaign: i64,
    /// Implementation language reported by `/initialize`
    pub language: String,
    /// Contestant-facing failure messages
    pub messages: Vec<String>,
}

impl BenchOutput {
    /// A failed run.
    #[must_use]
    pub fn failed(campaign: i64, language: impl Into<String>, messages: Vec<String>) -> Self {
        Self { pass: false, score: 0, campaign, language: language.into(), messages }
    }
}

/// Whether failures seen before the final check already fail the run.
#[must_use]
pub const fn disqualified(counts: &FailureCounts) -> bool {
    counts.critical > 0 || counts.application >= MAX_APPLICATION_FAILURES
}

/// Points deducted for `application` and `trivial` failures.
#[must_use]
pub fn penalty(application: usize, trivial: usize) -> i64 {
    let to_i64 = |n: usize| i64::try_from(n).unwrap_or(i64::MAX);
    let mut penalty = APPLICATION_PENALTY.saturating_mul(to_i64(application));
    if trivial > TRIVIAL_ALLOWANCE {
        let steps = 1 + (trivial - TRIVIAL_ALLOWANCE) / TRIVIAL_STEP;
        penalty = penalty.saturating_add(TRIVIAL_PENALTY.saturating_mul(to_i64(steps)));
    }
    penalty
}

/// Failures of one phase: messages in call order and counters.
pub type PhaseFailures = (Vec<String>, FailureCounts);

/// Combine the raw score with the failures of the run and of the final
/// check into the verdict.
#[must_use]
pub fn settle(raw: i64, run: PhaseFailures, final_check: PhaseFailures, campaign: i64, language: &str) -> BenchOutput {
    let (run_messages, run_counts) = run;
    let (final_messages, final_counts) = final_check;

    let mut messages = unique_messages(run_messages);
    messages.extend(final_messages);

    if disqualified(&run_counts) {
        return BenchOutput::failed(campaign, language, messages);
    }
    let application = run_counts.application + final_counts.application;
    if application >= MAX_APPLICATION_FAILURES {
        return BenchOutput::failed(campaign, language, messages);
    }

    let score = raw.saturating_sub(penalty(application, run_counts.trivial));
    if score <= 0 {
        return BenchOutput::failed(campaign, language, messages);
    }
    BenchOutput { pass: true, score, campaign, language: language.to_string(), messages }
}
