//! Metrics for dispatch monitoring.
//!
//! Counters are emitted through the `metrics` facade; the embedding
//! application decides whether and where to export them. Without an
//! installed recorder every call here is a no-op.
//!
//! - `barrage_jobs_total{outcome}`: jobs finished, by final outcome
//! - `barrage_attempts_total{result}`: individual worker calls, by result
//! - `barrage_retries_total{reason}`: attempts followed by a retry

use ::metrics::counter;

use crate::dispatch::JobOutcome;

pub const JOBS_TOTAL: &str = "barrage_jobs_total";
pub const ATTEMPTS_TOTAL: &str = "barrage_attempts_total";
pub const RETRIES_TOTAL: &str = "barrage_retries_total";

/// Count a finished job under `success` or its failure kind.
pub fn record_job_outcome(outcome: &JobOutcome) {
    let label = match outcome {
        JobOutcome::Succeeded { .. } => "success",
        JobOutcome::Failed { reason } => reason.kind(),
    };
    counter!(JOBS_TOTAL, "outcome" => label).increment(1);
}

/// Count one worker call: `ok`, `http_status`, `connection` or `unexpected`.
pub fn record_attempt(result: &'static str) {
    counter!(ATTEMPTS_TOTAL, "result" => result).increment(1);
}

pub fn record_retry(reason: &'static str) {
    counter!(RETRIES_TOTAL, "reason" => reason).increment(1);
}
