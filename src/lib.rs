//! Date-batched fan-out of analytics extraction jobs.
//!
//! A trigger names an account, a date range and the extraction templates to
//! load. The manager reads its YAML config from object storage, splits the
//! range into per-template batches ([`planner`]) and posts one job per batch
//! to a worker endpoint ([`dispatch`]), bounded by a connection cap and a
//! shared rate limit, with fixed-delay retries.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod http;
pub mod manager;
pub mod metrics;
pub mod planner;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use config::{ExtractionConfig, TemplateCatalog, TemplateCriteria};
pub use dispatch::{
    DispatchConfig, DispatchReport, DispatchSummary, Dispatcher, FailureReason, JobId, JobOutcome,
    JobReport,
};
pub use domain::*;
pub use error::{BarrageError, Result};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use manager::{ExtractionManager, ManagerResponse, ResponseStatus, TriggerRequest};
pub use planner::{JobPlan, SkippedTemplate, plan_jobs};
pub use storage::{BlobLocation, Credentials, InMemoryObjectStore, LocalObjectStore, ObjectStore};
