//! Fan-out of job payloads to the worker with bounded concurrency and retries.
//!
//! Every job runs as its own task in a [`JoinSet`]. Tasks share two limits:
//! a semaphore capping how many worker calls are in flight at once, and a
//! token bucket capping how many calls start per window. Within a job,
//! attempts are strictly sequential:
//!
//! ```text
//! rate limit ─> connection permit ─> POST ─┬─ 2xx + "Success" ──> Succeeded
//!      ^                                   ├─ 2xx, other body ──> Failed (no retry)
//!      │                                   ├─ non-2xx / connect error
//!      └──── sleep(retry_delay) <──────────┘     └─ budget spent ──> Failed
//!                                          └─ other error ──────> Failed (unexpected)
//! ```
//!
//! The dispatcher never fails as a whole: a job that errors or panics is
//! logged and tallied as a failure while its siblings run to completion.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::domain::JobPayload;
use crate::error::Result;
use crate::http::{HttpClient, HttpResponse};
use crate::metrics;

pub mod types;

pub use types::{
    DispatchSummary, FailureReason, JobId, JobOutcome, WORKER_SUCCESS_STATUS, WorkerRequest,
    WorkerResponse,
};

/// Longest slice of a response body kept in diagnostics.
const MAX_DIAGNOSTIC_BODY_CHARS: usize = 200;

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Worker endpoint every job is posted to
    pub worker_url: String,

    /// Maximum number of worker calls in flight at once
    pub max_connections: usize,

    /// Requests allowed per rate limit window, across all jobs
    pub rate_limit_requests: u32,

    /// Length of the rate limit window in milliseconds
    pub rate_limit_window_ms: u64,

    /// Attempts per job, including the first
    pub max_attempts: u32,

    /// Fixed delay between attempts of the same job in milliseconds
    pub retry_delay_ms: u64,

    /// Time allowed to establish a connection to the worker in milliseconds.
    /// There is no limit on the request as a whole.
    pub connect_timeout_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_url: "http://localhost:8081".to_string(),
            max_connections: 8,
            rate_limit_requests: 600,
            rate_limit_window_ms: 60_000,
            max_attempts: 3,
            retry_delay_ms: 1000,
            connect_timeout_ms: 300_000,
        }
    }
}

impl DispatchConfig {
    fn rate_limit_quota(&self) -> Result<Quota> {
        let burst = NonZeroU32::new(self.rate_limit_requests).ok_or_else(|| {
            anyhow::anyhow!("rate_limit_requests must be greater than zero")
        })?;
        let period = Duration::from_millis(self.rate_limit_window_ms) / burst.get();
        let quota = Quota::with_period(period).ok_or_else(|| {
            anyhow::anyhow!(
                "rate limit window of {}ms is too short for {} requests",
                self.rate_limit_window_ms,
                burst
            )
        })?;
        Ok(quota.allow_burst(burst))
    }

    fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than zero").into());
        }
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("max_attempts must be greater than zero").into());
        }
        Ok(())
    }
}

/// Outcome of one job, with enough identity to report on it.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    pub label: String,
    pub outcome: JobOutcome,
}

/// Everything a dispatch call produced.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub summary: DispatchSummary,
    /// Per-job outcomes in completion order. A job whose task panicked has
    /// no entry here but is still counted as a failure in `summary`.
    pub jobs: Vec<JobReport>,
}

/// Sends job payloads to the worker.
///
/// The connection semaphore and the rate limiter live as long as the
/// dispatcher, so limits hold across concurrent `dispatch` calls on the same
/// instance.
pub struct Dispatcher<H>
where
    H: HttpClient,
{
    http_client: H,
    config: DispatchConfig,
    connections: Arc<Semaphore>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    requests_in_flight: Arc<AtomicUsize>,
}

impl<H> Dispatcher<H>
where
    H: HttpClient + 'static,
{
    /// Create a new dispatcher, rejecting limits that could never admit a request.
    pub fn new(http_client: H, config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        let quota = config.rate_limit_quota()?;

        Ok(Self {
            http_client,
            connections: Arc::new(Semaphore::new(config.max_connections)),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            requests_in_flight: Arc::new(AtomicUsize::new(0)),
            config,
        })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Number of worker calls currently holding a connection permit.
    pub fn requests_in_flight(&self) -> usize {
        self.requests_in_flight.load(Ordering::Relaxed)
    }

    /// Send every job and wait for all of them to finish.
    pub async fn dispatch(&self, jobs: Vec<JobPayload>) -> DispatchSummary {
        self.dispatch_with_report(jobs).await.summary
    }

    /// Like [`Dispatcher::dispatch`], also returning each job's outcome.
    #[tracing::instrument(skip(self, jobs), fields(jobs = jobs.len(), worker_url = %self.config.worker_url))]
    pub async fn dispatch_with_report(&self, jobs: Vec<JobPayload>) -> DispatchReport {
        let total = jobs.len();
        tracing::info!(total, "Sending payloads to worker");

        let mut reports = Vec::with_capacity(total);
        let mut join_set = JoinSet::new();

        for job in jobs {
            let job_id = JobId::from(uuid::Uuid::new_v4());
            let label = job.label();

            let body = match serde_json::to_string(&job) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!(
                        job_id = %job_id,
                        job = %label,
                        error = %e,
                        "Failed to serialize job payload"
                    );
                    let outcome = JobOutcome::Failed {
                        reason: FailureReason::Unexpected {
                            error: e.to_string(),
                        },
                    };
                    metrics::record_job_outcome(&outcome);
                    reports.push(JobReport {
                        job_id,
                        label,
                        outcome,
                    });
                    continue;
                }
            };

            let request = WorkerRequest {
                job_id,
                url: self.config.worker_url.clone(),
                label,
                body,
            };

            let http_client = self.http_client.clone();
            let connections = self.connections.clone();
            let rate_limiter = self.rate_limiter.clone();
            let requests_in_flight = self.requests_in_flight.clone();
            let max_attempts = self.config.max_attempts;
            let retry_delay = Duration::from_millis(self.config.retry_delay_ms);

            join_set.spawn(async move {
                let outcome = match run_job(
                    &http_client,
                    &request,
                    &connections,
                    &rate_limiter,
                    &requests_in_flight,
                    max_attempts,
                    retry_delay,
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::error!(
                            job_id = %request.job_id,
                            job = %request.label,
                            error = %e,
                            "Unexpected error processing job"
                        );
                        JobOutcome::Failed {
                            reason: FailureReason::Unexpected {
                                error: e.to_string(),
                            },
                        }
                    }
                };

                metrics::record_job_outcome(&outcome);
                match &outcome {
                    JobOutcome::Succeeded { attempts, .. } => {
                        tracing::info!(
                            job_id = %request.job_id,
                            job = %request.label,
                            attempts,
                            "Data successfully loaded"
                        );
                    }
                    JobOutcome::Failed { reason } => {
                        tracing::warn!(
                            job_id = %request.job_id,
                            job = %request.label,
                            reason = %reason.to_error_message(),
                            "Data failed to load"
                        );
                    }
                }

                JobReport {
                    job_id: request.job_id,
                    label: request.label,
                    outcome,
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    // Panicked task; the summary still counts it as a failure
                    tracing::error!(error = %e, "Job task terminated unexpectedly");
                    metrics::record_job_outcome(&JobOutcome::Failed {
                        reason: FailureReason::Unexpected {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        let summary = DispatchSummary::from_outcomes(total, reports.iter().map(|r| &r.outcome));

        tracing::info!(
            attempts = summary.attempts,
            successes = summary.successes,
            failures = summary.failures,
            "Dispatch finished"
        );

        DispatchReport {
            summary,
            jobs: reports,
        }
    }
}

/// Run one job's attempts until success, a terminal failure, or an unexpected error.
async fn run_job<H: HttpClient>(
    http_client: &H,
    request: &WorkerRequest,
    connections: &Semaphore,
    rate_limiter: &DefaultDirectRateLimiter,
    requests_in_flight: &Arc<AtomicUsize>,
    max_attempts: u32,
    retry_delay: Duration,
) -> Result<JobOutcome> {
    let mut last_status = None;
    let mut attempt = 0;

    loop {
        attempt += 1;

        rate_limiter.until_ready().await;
        let result = {
            // Permit is held only while the call is in flight, not across the backoff sleep
            let _permit = connections
                .acquire()
                .await
                .map_err(|e| anyhow::anyhow!("connection pool closed: {}", e))?;

            requests_in_flight.fetch_add(1, Ordering::Relaxed);
            let in_flight = requests_in_flight.clone();
            let _guard = scopeguard::guard((), move |_| {
                in_flight.fetch_sub(1, Ordering::Relaxed);
            });

            tracing::debug!(
                job_id = %request.job_id,
                job = %request.label,
                attempt,
                "Posting job to worker"
            );
            http_client.execute(request).await
        };

        let (last_error, retry_reason) = match result {
            Ok(response) if response.is_ok() => {
                metrics::record_attempt("ok");
                return Ok(interpret_success_response(attempt, response));
            }
            Ok(response) => {
                metrics::record_attempt("http_status");
                last_status = Some(response.status);
                let error = format!(
                    "response status {}: {}",
                    response.status,
                    truncate(&response.body)
                );
                (error, "http_status")
            }
            Err(e) if e.is_connection() => {
                metrics::record_attempt("connection");
                (e.to_string(), "connection")
            }
            Err(e) => {
                metrics::record_attempt("unexpected");
                return Err(e);
            }
        };

        if attempt >= max_attempts {
            return Ok(JobOutcome::Failed {
                reason: FailureReason::RetriesExhausted {
                    attempts: attempt,
                    last_status,
                    last_error,
                },
            });
        }

        tracing::warn!(
            job_id = %request.job_id,
            job = %request.label,
            attempt,
            max_attempts,
            error = %last_error,
            delay_ms = retry_delay.as_millis() as u64,
            "Worker attempt failed, retrying after delay"
        );
        metrics::record_retry(retry_reason);
        tokio::time::sleep(retry_delay).await;
    }
}

/// Decide the outcome of a 2xx response from the worker's body.
fn interpret_success_response(attempts: u32, response: HttpResponse) -> JobOutcome {
    match serde_json::from_str::<WorkerResponse>(&response.body) {
        Ok(worker) if worker.is_success() => JobOutcome::Succeeded {
            attempts,
            response: worker,
        },
        Ok(worker) => JobOutcome::Failed {
            reason: FailureReason::WorkerReportedFailure {
                status: worker.status,
                message: worker.message,
            },
        },
        Err(_) => JobOutcome::Failed {
            reason: FailureReason::MalformedResponse {
                status: response.status,
                body: truncate(&response.body),
            },
        },
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(MAX_DIAGNOSTIC_BODY_CHARS).collect()
}
