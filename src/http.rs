//! HTTP client abstraction for posting jobs to the worker.
//!
//! This module defines the `HttpClient` trait to abstract HTTP request execution,
//! enabling testability with mock implementations.

use crate::dispatch::WorkerRequest;
use crate::error::{BarrageError, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as a string
    pub body: String,
}

impl HttpResponse {
    /// Whether the status code is in the 2xx range.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for executing HTTP requests.
///
/// Implementations must report failures to reach the worker as
/// [`BarrageError::Connection`]; the dispatcher retries only those. Any other
/// error is treated as unexpected and ends the job.
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// POST the request body as JSON to `request.url`.
    async fn execute(&self, request: &WorkerRequest) -> Result<HttpResponse>;
}

// ============================================================================
// Production Implementation using reqwest
// ============================================================================

/// Production HTTP client using reqwest.
///
/// Only the connect phase is bounded; an established request may run for as
/// long as the worker takes.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Create a client whose connections must be established within `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }
}

/// Split reqwest failures into retriable connection errors and everything else.
fn classify_reqwest_error(error: reqwest::Error) -> BarrageError {
    if error.is_connect() || error.is_timeout() || error.is_request() {
        BarrageError::Connection(error.to_string())
    } else {
        BarrageError::HttpClient(error)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[tracing::instrument(skip(self, request), fields(job_id = %request.job_id, url = %request.url))]
    async fn execute(&self, request: &WorkerRequest) -> Result<HttpResponse> {
        tracing::debug!(body_len = request.body.len(), "Posting job to worker");

        let response = self
            .client
            .post(&request.url)
            .header("Content-Type", "application/json")
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(job = %request.label, error = %e, "Worker request failed");
                classify_reqwest_error(e)
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        tracing::debug!(
            job = %request.label,
            status = status,
            response_len = body.len(),
            "Worker request completed"
        );

        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::oneshot;

/// Mock HTTP client for testing.
///
/// Responses are queued per job label (see [`crate::JobPayload::label`]) and
/// consumed in FIFO order. Labels without a queued response fall back to the
/// default response, if one is set.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.set_default_response(MockHttpClient::success_response());
/// mock.add_response(
///     "sessions for dates of 2023-01-01 to 2023-01-01",
///     Ok(HttpResponse { status: 503, body: "unavailable".to_string() }),
/// );
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    default_response: Arc<Mutex<Option<HttpResponse>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait for a trigger before completing.
enum MockResponse {
    /// Immediate response
    Immediate(Result<HttpResponse>),
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub label: String,
    pub url: String,
    pub body: String,
    /// When the call started, on the tokio clock (pausable in tests)
    pub started_at: tokio::time::Instant,
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            default_response: Arc::new(Mutex::new(None)),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A 200 response carrying the worker's success body.
    pub fn success_response() -> HttpResponse {
        HttpResponse {
            status: 200,
            body: r#"{"status":"Success","message":"Load complete!","request_data":{}}"#
                .to_string(),
        }
    }

    /// Add a predetermined response for a job label.
    ///
    /// Multiple responses can be added for the same label - they will be
    /// returned in FIFO order.
    pub fn add_response(&self, label: &str, response: Result<HttpResponse>) {
        self.responses
            .lock()
            .entry(label.to_string())
            .or_default()
            .push(MockResponse::Immediate(response));
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the HTTP request to complete with the given response.
    pub fn add_response_with_trigger(
        &self,
        label: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses
            .lock()
            .entry(label.to_string())
            .or_default()
            .push(MockResponse::Triggered {
                response,
                trigger: rx,
            });
        tx
    }

    /// Response returned for labels with nothing queued.
    pub fn set_default_response(&self, response: HttpResponse) {
        *self.default_response.lock() = Some(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Calls made for one job label, in order.
    pub fn calls_for(&self, label: &str) -> Vec<MockCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.label == label)
            .cloned()
            .collect()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of requests currently in-flight (executing).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of requests that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: &WorkerRequest) -> Result<HttpResponse> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        // Guard to ensure we decrement even if cancelled/panicked
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockCall {
            label: request.label.clone(),
            url: request.url.clone(),
            body: request.body.clone(),
            started_at: tokio::time::Instant::now(),
        });

        let mock_response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&request.label) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered { response, trigger }) => {
                // Proceed whether the sender fired or was dropped
                let _ = trigger.await;
                response
            }
            None => match self.default_response.lock().clone() {
                Some(response) => Ok(response),
                None => Err(BarrageError::Other(anyhow::anyhow!(
                    "No mock response configured for {}",
                    request.label
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::JobId;

    fn request(label: &str) -> WorkerRequest {
        WorkerRequest {
            job_id: JobId::from(uuid::Uuid::new_v4()),
            url: "https://worker.example.com".to_string(),
            label: label.to_string(),
            body: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_mock_client_basic() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "job-a",
            Ok(HttpResponse {
                status: 200,
                body: "success".to_string(),
            }),
        );

        let response = mock.execute(&request("job-a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "success");

        let calls = mock.get_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].label, "job-a");
        assert_eq!(calls[0].url, "https://worker.example.com");
    }

    #[tokio::test]
    async fn test_mock_client_fifo_then_default() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "job-a",
            Ok(HttpResponse {
                status: 500,
                body: "first".to_string(),
            }),
        );
        mock.set_default_response(MockHttpClient::success_response());

        let first = mock.execute(&request("job-a")).await.unwrap();
        assert_eq!(first.status, 500);
        let second = mock.execute(&request("job-a")).await.unwrap();
        assert!(second.is_ok());
        assert_eq!(mock.calls_for("job-a").len(), 2);
    }

    #[tokio::test]
    async fn test_mock_client_no_response() {
        let mock = MockHttpClient::new();
        let result = mock.execute(&request("unknown")).await;
        assert!(matches!(result, Err(BarrageError::Other(_))));
    }

    #[tokio::test]
    async fn test_mock_client_with_trigger_tracks_in_flight() {
        let mock = MockHttpClient::new();
        let trigger =
            mock.add_response_with_trigger("job-a", Ok(MockHttpClient::success_response()));

        let mock_clone = mock.clone();
        let handle = tokio::spawn(async move { mock_clone.execute(&request("job-a")).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        assert_eq!(mock.in_flight_count(), 1);

        trigger.send(()).unwrap();
        let response = handle.await.unwrap().unwrap();
        assert!(response.is_ok());
        assert_eq!(mock.in_flight_count(), 0);
        assert_eq!(mock.max_in_flight(), 1);
    }

    #[test]
    fn test_status_ranges() {
        let ok = HttpResponse {
            status: 204,
            body: String::new(),
        };
        let err = HttpResponse {
            status: 302,
            body: String::new(),
        };
        assert!(ok.is_ok());
        assert!(!err.is_ok());
    }
}
