//! The extractions manager: one trigger in, one aggregated response out.
//!
//! ```text
//! trigger body ─> validate ─> fetch credentials ─> fetch config (with credentials)
//!              ─> select templates ─> plan date batches ─> dispatch ─> response
//! ```
//!
//! Validation, storage and config failures end the invocation with a
//! `Failed` response. Job failures never do: they only show up in the
//! response's failure count.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::ExtractionConfig;
use crate::dispatch::{DispatchSummary, Dispatcher, JobOutcome};
use crate::domain::GeneralRequestConfig;
use crate::error::{BarrageError, Result};
use crate::http::HttpClient;
use crate::planner::{self, SkippedTemplate};
use crate::storage::{Credentials, ObjectStore};

pub mod request;

pub use request::{AccountCriteria, ConfigFilesLocation, TriggerRequest};

/// Value of `status` in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// JSON body returned to the trigger caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_load_attempts: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_load_successes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_load_failures: Option<usize>,
    /// Templates that produced no jobs, each with the planning error
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_templates: Vec<SkippedTemplate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

impl ManagerResponse {
    pub fn failed(message: impl Into<String>, request_data: Option<Value>) -> Self {
        Self {
            status: ResponseStatus::Failed,
            message: Some(message.into()),
            data_load_attempts: None,
            data_load_successes: None,
            data_load_failures: None,
            skipped_templates: Vec::new(),
            request_data,
        }
    }

    pub fn completed(
        summary: DispatchSummary,
        skipped_templates: Vec<SkippedTemplate>,
        request_data: Value,
    ) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: None,
            data_load_attempts: Some(summary.attempts),
            data_load_successes: Some(summary.successes),
            data_load_failures: Some(summary.failures),
            skipped_templates,
            request_data: Some(request_data),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// Runs one extraction request end to end.
pub struct ExtractionManager<S, H>
where
    S: ObjectStore,
    H: HttpClient,
{
    store: Arc<S>,
    dispatcher: Arc<Dispatcher<H>>,
}

impl<S, H> ExtractionManager<S, H>
where
    S: ObjectStore + 'static,
    H: HttpClient + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<Dispatcher<H>>) -> Self {
        Self { store, dispatcher }
    }

    /// Handle a trigger body. `None` means the body was absent or not JSON.
    ///
    /// Always produces a response; errors are reported through its `status`.
    pub async fn handle(&self, body: Option<&Value>) -> ManagerResponse {
        let Some(request_data) = body.filter(|b| b.is_object()) else {
            tracing::warn!("Trigger received without a JSON payload");
            return ManagerResponse::failed("No request payload", None);
        };

        match self.run(request_data).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Extraction request failed");
                ManagerResponse::failed(e.to_string(), Some(request_data.clone()))
            }
        }
    }

    #[tracing::instrument(skip(self, request_data))]
    async fn run(&self, request_data: &Value) -> Result<ManagerResponse> {
        let request = TriggerRequest::from_json(request_data)?;
        let requested = request.date_range()?;

        tracing::info!(
            view_id = %request.account.view_id,
            range = %requested,
            "Starting extraction request"
        );

        let config = self.load_config(&request.config_files).await?;

        let selected = config.select_templates(
            request.standard_templates.as_ref(),
            request.custom_templates.as_ref(),
        );
        if selected.is_empty() {
            return Err(BarrageError::NoTemplates);
        }
        tracing::info!(
            templates = ?selected.iter().map(|s| s.template.name.as_str()).collect::<Vec<_>>(),
            "Templates selected"
        );

        let general = GeneralRequestConfig {
            view_id: request.account.view_id.clone(),
            view_name: request.account.view_name.clone(),
            property_id: request.account.property_id.clone(),
            property_name: request.account.property_name.clone(),
            account_id: request.account.account_id.clone(),
            account_name: request.account.account_name.clone(),
            target_project: config.target_project.clone(),
            target_bucket: config.target_bucket.clone(),
            target_bucket_folder: config.target_bucket_folder.clone(),
            config_files_location: request.config_files.auth_file(),
        };

        let plan = planner::plan_jobs(&selected, &general, requested);
        let report = self.dispatcher.dispatch_with_report(plan.jobs).await;
        for job in &report.jobs {
            if let JobOutcome::Failed { reason } = &job.outcome {
                tracing::warn!(
                    job_id = %job.job_id,
                    job = %job.label,
                    reason = %reason.to_error_message(),
                    "Job failed"
                );
            }
        }

        tracing::info!(
            data_load_attempts = report.summary.attempts,
            data_load_successes = report.summary.successes,
            data_load_failures = report.summary.failures,
            "Extraction request finished"
        );

        Ok(ManagerResponse::completed(
            report.summary,
            plan.skipped,
            request_data.clone(),
        ))
    }

    /// Fetch the credential blob, then the config using those credentials.
    async fn load_config(&self, files: &ConfigFilesLocation) -> Result<ExtractionConfig> {
        let auth_location = files.auth_location();
        tracing::debug!(location = %auth_location, "Downloading credential blob");
        let credentials = Credentials::new(self.store.fetch(&auth_location, None).await?);

        let config_location = files.config_location();
        tracing::debug!(location = %config_location, "Downloading extraction config");
        let raw = self.store.fetch(&config_location, Some(&credentials)).await?;
        let text = String::from_utf8(raw).map_err(|e| {
            BarrageError::Storage(format!("config {} is not UTF-8: {}", config_location, e))
        })?;

        ExtractionConfig::from_yaml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchConfig;
    use crate::http::MockHttpClient;
    use crate::storage::InMemoryObjectStore;
    use serde_json::json;

    const CONFIG: &str = r#"
target_project: analytics-project
target_bucket: analytics-landing
target_bucket_folder: ga_ua/
data:
  standard_extraction_templates:
    - name: sessions
      metrics: ["ga:sessions"]
      batch_freq: daily
  custom_extraction_templates:
    - name: broken
      metrics: ["ga:users"]
      batch_freq: hourly
"#;

    fn manager(
        mock: &MockHttpClient,
        store: InMemoryObjectStore,
    ) -> ExtractionManager<InMemoryObjectStore, MockHttpClient> {
        let dispatcher = Dispatcher::new(mock.clone(), DispatchConfig::default()).unwrap();
        ExtractionManager::new(Arc::new(store), Arc::new(dispatcher))
    }

    fn store() -> InMemoryObjectStore {
        let store = InMemoryObjectStore::new();
        store.put("cfg", "auth.json", b"{}".to_vec());
        store.put("cfg", "config.yaml", CONFIG.as_bytes().to_vec());
        store
    }

    fn body(custom: Value) -> Value {
        json!({
            "config_files_location": {
                "bucket": "cfg",
                "auth_blob": "auth.json",
                "config_blob": "config.yaml"
            },
            "ga_account_criteria": {"view_id": "123"},
            "date_range_criteria": {"start_date": "2023-01-01", "end_date": "2023-01-02"},
            "standard_extraction_templates": {"load_all": true},
            "custom_extraction_templates": custom
        })
    }

    #[tokio::test]
    async fn test_no_payload() {
        let mock = MockHttpClient::new();
        let response = manager(&mock, store()).handle(None).await;
        assert_eq!(response.status, ResponseStatus::Failed);
        assert_eq!(response.message.as_deref(), Some("No request payload"));
        assert!(response.request_data.is_none());
    }

    #[tokio::test]
    async fn test_unplannable_template_is_reported_and_skipped() {
        let mock = MockHttpClient::new();
        mock.set_default_response(MockHttpClient::success_response());

        let body = body(json!({"include": ["broken"]}));
        let response = manager(&mock, store()).handle(Some(&body)).await;

        assert!(response.is_success());
        assert_eq!(response.data_load_attempts, Some(2));
        assert_eq!(response.data_load_successes, Some(2));
        assert_eq!(
            serde_json::to_value(&response).unwrap()["skipped_templates"],
            json!([{"name": "broken", "reason": "Invalid batch frequency: 'hourly'"}])
        );
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_invalid_requested_range_aborts_before_dispatch() {
        let mock = MockHttpClient::new();
        let mut body = body(Value::Null);
        body["date_range_criteria"]["start_date"] = json!("2023-02-01");

        let response = manager(&mock, store()).handle(Some(&body)).await;

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.message.unwrap().starts_with("Invalid date range"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_config_blob_fails_with_request_echo() {
        let mock = MockHttpClient::new();
        let store = InMemoryObjectStore::new();
        store.put("cfg", "auth.json", b"{}".to_vec());

        let body = body(Value::Null);
        let response = manager(&mock, store).handle(Some(&body)).await;

        assert_eq!(response.status, ResponseStatus::Failed);
        assert!(response.message.unwrap().contains("config.yaml"));
        assert_eq!(response.request_data, Some(body));
    }

    #[test]
    fn test_success_response_shape() {
        let summary = DispatchSummary {
            attempts: 3,
            successes: 2,
            failures: 1,
        };
        let json = serde_json::to_value(ManagerResponse::completed(
            summary,
            vec![],
            json!({"a": 1}),
        ))
        .unwrap();
        assert_eq!(
            json,
            json!({
                "status": "Success",
                "data_load_attempts": 3,
                "data_load_successes": 2,
                "data_load_failures": 1,
                "request_data": {"a": 1}
            })
        );
    }
}
