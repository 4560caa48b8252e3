//! Extraction templates and the job payloads built from them.
//!
//! A template names a set of metrics and dimensions to pull for a view. The
//! manager merges each selected template with the fields shared by the whole
//! invocation ([`GeneralRequestConfig`]) and one date batch, producing a
//! [`JobPayload`] that is posted to the worker as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::date_range::DateRange;

/// A named extraction definition from the config document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    pub name: String,
    /// Validated by the worker, not at config load.
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub dimensions: Vec<String>,
    /// One of `daily`, `weekly`, `monthly`; absent means a single batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_freq: Option<String>,
    /// Any other template keys, forwarded to the worker untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Which config list a template was selected from.
///
/// The worker uses this as a path segment when naming its output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateType {
    #[serde(rename = "standard_templates")]
    Standard,
    #[serde(rename = "custom_templates")]
    Custom,
}

impl TemplateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::Standard => "standard_templates",
            TemplateType::Custom => "custom_templates",
        }
    }
}

/// A template chosen for this invocation, tagged with the list it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedTemplate {
    pub template_type: TemplateType,
    pub template: ExtractionTemplate,
}

/// Location of the service-account blob the worker authenticates with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthFileLocation {
    pub bucket: String,
    pub auth_blob: String,
}

/// Fields shared by every payload of one manager invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralRequestConfig {
    pub view_id: String,
    pub view_name: Option<String>,
    pub property_id: Option<String>,
    pub property_name: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub target_project: String,
    pub target_bucket: String,
    pub target_bucket_folder: String,
    pub config_files_location: AuthFileLocation,
}

/// Keys owned by the general config, the template type or the date batch.
///
/// A template's extra fields never shadow these.
const RESERVED_KEYS: &[&str] = &[
    "view_id",
    "view_name",
    "property_id",
    "property_name",
    "account_id",
    "account_name",
    "target_project",
    "target_bucket",
    "target_bucket_folder",
    "config_files_location",
    "template_type",
    "start_date",
    "end_date",
    "date_range_batches",
];

/// One unit of work for the worker: a template, the shared fields and one
/// date batch, serialized as a single flat JSON object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPayload {
    #[serde(flatten)]
    template: ExtractionTemplate,
    #[serde(flatten)]
    general: GeneralRequestConfig,
    template_type: TemplateType,
    #[serde(flatten)]
    date_range: DateRange,
}

impl JobPayload {
    /// Merge a template with the shared fields and one date batch.
    ///
    /// The template is taken by value; callers clone per batch so no two
    /// payloads share state.
    pub fn new(
        mut template: ExtractionTemplate,
        general: GeneralRequestConfig,
        template_type: TemplateType,
        date_range: DateRange,
    ) -> Self {
        template
            .extra
            .retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Self {
            template,
            general,
            template_type,
            date_range,
        }
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn template(&self) -> &ExtractionTemplate {
        &self.template
    }

    pub fn general(&self) -> &GeneralRequestConfig {
        &self.general
    }

    pub fn template_type(&self) -> TemplateType {
        self.template_type
    }

    pub fn date_range(&self) -> DateRange {
        self.date_range
    }

    /// Human-readable job identity used in logs and diagnostics.
    pub fn label(&self) -> String {
        format!("{} for dates of {}", self.template.name, self.date_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn general() -> GeneralRequestConfig {
        GeneralRequestConfig {
            view_id: "70747477".to_string(),
            view_name: Some("1 - Production View".to_string()),
            property_id: None,
            property_name: None,
            account_id: None,
            account_name: None,
            target_project: "analytics-project".to_string(),
            target_bucket: "analytics-landing".to_string(),
            target_bucket_folder: "ga_ua/".to_string(),
            config_files_location: AuthFileLocation {
                bucket: "config-bucket".to_string(),
                auth_blob: "ga_ua/auth.json".to_string(),
            },
        }
    }

    fn template() -> ExtractionTemplate {
        serde_yaml::from_str(
            r#"
name: sessions_by_day
metrics: ["ga:sessions", "ga:users"]
dimensions: ["ga:date"]
batch_freq: daily
sampling: none
view_id: "should-not-win"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_template_keeps_unknown_fields() {
        let template = template();
        assert_eq!(template.batch_freq.as_deref(), Some("daily"));
        assert_eq!(template.extra.get("sampling"), Some(&Value::from("none")));
    }

    #[test]
    fn test_payload_serializes_flat() {
        let range = DateRange::parse("2023-01-01", "2023-01-01").unwrap();
        let payload = JobPayload::new(template(), general(), TemplateType::Standard, range);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["name"], "sessions_by_day");
        assert_eq!(json["metrics"], serde_json::json!(["ga:sessions", "ga:users"]));
        assert_eq!(json["view_id"], "70747477");
        assert_eq!(json["view_name"], "1 - Production View");
        assert_eq!(json["property_id"], Value::Null);
        assert_eq!(json["template_type"], "standard_templates");
        assert_eq!(json["start_date"], "2023-01-01");
        assert_eq!(json["end_date"], "2023-01-01");
        assert_eq!(json["config_files_location"]["auth_blob"], "ga_ua/auth.json");
        assert_eq!(json["sampling"], "none");
    }

    #[test]
    fn test_general_fields_win_over_template_extras() {
        let range = DateRange::parse("2023-01-01", "2023-01-31").unwrap();
        let payload = JobPayload::new(template(), general(), TemplateType::Custom, range);
        assert!(!payload.template().extra.contains_key("view_id"));
        assert_eq!(payload.label(), "sessions_by_day for dates of 2023-01-01 to 2023-01-31");
    }
}
