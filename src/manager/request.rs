//! Inbound trigger body.
//!
//! The body is parsed by hand from a [`serde_json::Value`] rather than
//! derived, so that a missing field can be reported by name and the inbound
//! body echoed back unchanged.

use serde_json::Value;

use crate::config::TemplateCriteria;
use crate::domain::{AuthFileLocation, DateRange};
use crate::error::{BarrageError, Result};
use crate::storage::BlobLocation;

/// Where the credential and config blobs live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFilesLocation {
    pub bucket: String,
    pub auth_blob: String,
    pub config_blob: String,
}

impl ConfigFilesLocation {
    pub fn auth_location(&self) -> BlobLocation {
        BlobLocation::new(&self.bucket, &self.auth_blob)
    }

    pub fn config_location(&self) -> BlobLocation {
        BlobLocation::new(&self.bucket, &self.config_blob)
    }

    /// The part of the location forwarded to the worker.
    pub fn auth_file(&self) -> AuthFileLocation {
        AuthFileLocation {
            bucket: self.bucket.clone(),
            auth_blob: self.auth_blob.clone(),
        }
    }
}

/// The analytics view to extract from, plus descriptive metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCriteria {
    pub view_id: String,
    pub view_name: Option<String>,
    pub property_id: Option<String>,
    pub property_name: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
}

/// A validated trigger body.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRequest {
    pub config_files: ConfigFilesLocation,
    pub account: AccountCriteria,
    pub start_date: String,
    pub end_date: String,
    pub standard_templates: Option<TemplateCriteria>,
    pub custom_templates: Option<TemplateCriteria>,
}

impl TriggerRequest {
    /// Extract every field the manager needs, failing on the first missing
    /// required one.
    pub fn from_json(body: &Value) -> Result<Self> {
        let config_files = ConfigFilesLocation {
            bucket: required(body, &["config_files_location", "bucket"])?,
            auth_blob: required(body, &["config_files_location", "auth_blob"])?,
            config_blob: required(body, &["config_files_location", "config_blob"])?,
        };
        let view_id = required(body, &["ga_account_criteria", "view_id"])?;
        let start_date = required(body, &["date_range_criteria", "start_date"])?;
        let end_date = required(body, &["date_range_criteria", "end_date"])?;

        let account = AccountCriteria {
            view_id,
            view_name: optional(body, &["ga_account_criteria", "view_name"]),
            property_id: optional(body, &["ga_account_criteria", "property_id"]),
            property_name: optional(body, &["ga_account_criteria", "property_name"]),
            account_id: optional(body, &["ga_account_criteria", "account_id"]),
            account_name: optional(body, &["ga_account_criteria", "account_name"]),
        };

        Ok(Self {
            config_files,
            account,
            start_date,
            end_date,
            standard_templates: criteria(body, "standard_extraction_templates")?,
            custom_templates: criteria(body, "custom_extraction_templates")?,
        })
    }

    /// The requested range, validated.
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start_date, &self.end_date)
    }
}

/// Scalar at `path` as a string. Identifiers are sometimes sent as numbers.
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Walk `path`, naming the first key that is absent.
fn required(body: &Value, path: &[&str]) -> Result<String> {
    let mut current = body;
    for key in path {
        current = current
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| BarrageError::MissingField(key.to_string()))?;
    }
    scalar_string(current).ok_or_else(|| {
        BarrageError::MissingField(path.last().copied().unwrap_or_default().to_string())
    })
}

fn optional(body: &Value, path: &[&str]) -> Option<String> {
    path.iter()
        .try_fold(body, |current, key| current.get(key))
        .and_then(scalar_string)
}

fn criteria(body: &Value, key: &str) -> Result<Option<TemplateCriteria>> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> Value {
        json!({
            "config_files_location": {
                "bucket": "config-bucket",
                "config_blob": "ga_ua/config.yaml",
                "auth_blob": "ga_ua/auth.json"
            },
            "date_range_criteria": {
                "start_date": "2023-01-01",
                "end_date": "2023-01-31"
            },
            "ga_account_criteria": {
                "view_id": 70747477,
                "view_name": "1 - Production View",
                "account_id": "26305999"
            },
            "standard_extraction_templates": {"load_all": true, "include": []},
            "custom_extraction_templates": {"load_all": false, "include": ["goals"]}
        })
    }

    #[test]
    fn test_parses_complete_body() {
        let request = TriggerRequest::from_json(&body()).unwrap();
        assert_eq!(request.config_files.config_blob, "ga_ua/config.yaml");
        assert_eq!(request.account.view_id, "70747477");
        assert_eq!(request.account.view_name.as_deref(), Some("1 - Production View"));
        assert_eq!(request.account.property_id, None);
        assert_eq!(request.standard_templates.as_ref().unwrap().load_all, Some(true));
        assert_eq!(
            request.custom_templates.as_ref().unwrap().include,
            Some(vec!["goals".to_string()])
        );
        assert_eq!(request.date_range().unwrap().num_days(), 31);
    }

    #[test]
    fn test_missing_nested_field_is_named() {
        let mut body = body();
        body["config_files_location"]
            .as_object_mut()
            .unwrap()
            .remove("config_blob");
        let err = TriggerRequest::from_json(&body).unwrap_err();
        assert!(matches!(err, BarrageError::MissingField(field) if field == "config_blob"));
    }

    #[test]
    fn test_missing_parent_object_is_named() {
        let mut body = body();
        body.as_object_mut().unwrap().remove("date_range_criteria");
        let err = TriggerRequest::from_json(&body).unwrap_err();
        assert!(matches!(err, BarrageError::MissingField(field) if field == "date_range_criteria"));
    }

    #[test]
    fn test_template_criteria_are_optional() {
        let mut body = body();
        body.as_object_mut()
            .unwrap()
            .remove("standard_extraction_templates");
        let request = TriggerRequest::from_json(&body).unwrap();
        assert!(request.standard_templates.is_none());
    }
}
