//! Core domain types for the extraction manager.
//!
//! This module contains pure domain types with no I/O:
//! - Calendar date ranges and batch frequencies
//! - Extraction templates and the job payloads built from them

pub mod date_range;
pub mod template;

pub use date_range::{BatchFrequency, DATE_FORMAT, DateRange, parse_date};
pub use template::{
    AuthFileLocation, ExtractionTemplate, GeneralRequestConfig, JobPayload, SelectedTemplate,
    TemplateType,
};
