//! Job identity, worker wire types and per-job outcomes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The `status` value a worker reports for a completed extraction.
pub const WORKER_SUCCESS_STATUS: &str = "Success";

/// Unique identifier for one dispatched job, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for JobId {
    fn from(uuid: Uuid) -> Self {
        JobId(uuid)
    }
}

impl std::ops::Deref for JobId {
    type Target = Uuid;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A single POST to the worker, fully serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRequest {
    pub job_id: JobId,
    /// Worker endpoint URL
    pub url: String,
    /// Job label (template name and dates), used as the mock lookup key
    pub label: String,
    /// JSON-encoded job payload
    pub body: String,
}

/// Body the worker answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub request_data: Option<serde_json::Value>,
}

impl WorkerResponse {
    pub fn is_success(&self) -> bool {
        self.status == WORKER_SUCCESS_STATUS
    }
}

/// Why a job ended without a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum FailureReason {
    /// Every attempt hit a non-2xx status or a connection error.
    RetriesExhausted {
        attempts: u32,
        /// Status of the last response, if any attempt got one.
        last_status: Option<u16>,
        last_error: String,
    },

    /// The worker answered 2xx but reported a status other than "Success".
    WorkerReportedFailure {
        status: String,
        message: Option<String>,
    },

    /// The worker answered 2xx with a body that is not a worker response.
    MalformedResponse { status: u16, body: String },

    /// Anything else raised inside the job task, including panics.
    Unexpected { error: String },
}

impl FailureReason {
    /// Returns a human-readable error message for this failure reason.
    pub fn to_error_message(&self) -> String {
        match self {
            FailureReason::RetriesExhausted {
                attempts,
                last_status,
                last_error,
            } => match last_status {
                Some(status) => format!(
                    "Unable to load data after {} retries (last response status {}): {}",
                    attempts, status, last_error
                ),
                None => format!(
                    "Unable to load data after {} retries: {}",
                    attempts, last_error
                ),
            },
            FailureReason::WorkerReportedFailure { status, message } => format!(
                "Worker reported status '{}': {}",
                status,
                message.as_deref().unwrap_or("no message")
            ),
            FailureReason::MalformedResponse { status, body } => {
                format!("Worker returned an unreadable response ({}): {}", status, body)
            }
            FailureReason::Unexpected { error } => format!("Unexpected job error: {}", error),
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::RetriesExhausted { .. } => "retries_exhausted",
            FailureReason::WorkerReportedFailure { .. } => "worker_reported_failure",
            FailureReason::MalformedResponse { .. } => "malformed_response",
            FailureReason::Unexpected { .. } => "unexpected",
        }
    }
}

/// Final result of one job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded {
        attempts: u32,
        response: WorkerResponse,
    },
    Failed {
        reason: FailureReason,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }
}

/// Order-independent tallies for one dispatch call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Number of jobs submitted (not HTTP calls made)
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
}

impl DispatchSummary {
    /// Tally a set of outcomes; `failures` is always `attempts - successes`.
    pub fn from_outcomes<'a>(
        attempts: usize,
        outcomes: impl IntoIterator<Item = &'a JobOutcome>,
    ) -> Self {
        let successes = outcomes.into_iter().filter(|o| o.is_success()).count();
        Self {
            attempts,
            successes,
            failures: attempts.saturating_sub(successes),
        }
    }
}
