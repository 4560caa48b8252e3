//! Error types for the extraction manager.

use thiserror::Error;

/// Result type alias using the barrage error type.
pub type Result<T> = std::result::Result<T, BarrageError>;

/// Main error type for planning and dispatching extraction jobs.
#[derive(Error, Debug)]
pub enum BarrageError {
    /// A required field of the inbound trigger body was absent.
    #[error("A required variable was not set: '{0}'")]
    MissingField(String),

    /// Start date after end date, or a date that is not `YYYY-MM-DD`.
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// A `batch_freq` value other than daily, weekly or monthly.
    #[error("Invalid batch frequency: '{0}'")]
    InvalidFrequency(String),

    /// No template matched the request's template criteria.
    #[error(
        "The request data did not include any templates to load or the requested templates are not valid templates"
    )]
    NoTemplates,

    /// The worker could not be reached (connect failure or connect timeout).
    ///
    /// This is the only transport error the dispatcher retries.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object store read failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Extraction config could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BarrageError {
    /// Whether a dispatch attempt that hit this error may be retried.
    pub fn is_connection(&self) -> bool {
        matches!(self, BarrageError::Connection(_))
    }
}
