//! Extraction config document and template selection.
//!
//! The config is a YAML document kept in object storage:
//!
//! ```yaml
//! target_project: analytics-project
//! target_bucket: analytics-landing
//! target_bucket_folder: ga_ua/
//! data:
//!   standard_extraction_templates:
//!     - name: sessions_by_day
//!       metrics: ["ga:sessions"]
//!       dimensions: ["ga:date"]
//!       batch_freq: daily
//!   custom_extraction_templates: []
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::{ExtractionTemplate, SelectedTemplate, TemplateType};
use crate::error::Result;

/// Parsed extraction config.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractionConfig {
    pub target_project: String,
    pub target_bucket: String,
    pub target_bucket_folder: String,
    pub data: TemplateCatalog,
}

/// The two named template lists.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TemplateCatalog {
    #[serde(default)]
    pub standard_extraction_templates: Vec<ExtractionTemplate>,
    #[serde(default)]
    pub custom_extraction_templates: Vec<ExtractionTemplate>,
}

/// Which templates of one kind a request asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateCriteria {
    #[serde(default)]
    pub load_all: Option<bool>,
    #[serde(default)]
    pub include: Option<Vec<String>>,
}

impl TemplateCriteria {
    fn selects(&self, template: &ExtractionTemplate) -> bool {
        self.load_all == Some(true)
            || self
                .include
                .as_ref()
                .is_some_and(|names| names.iter().any(|name| *name == template.name))
    }
}

impl ExtractionConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Pick templates for a request, standard ones first, each in config order.
    ///
    /// Absent criteria select nothing of that kind. Names in `include` that
    /// match no template are ignored.
    pub fn select_templates(
        &self,
        standard: Option<&TemplateCriteria>,
        custom: Option<&TemplateCriteria>,
    ) -> Vec<SelectedTemplate> {
        let standard = select(
            &self.data.standard_extraction_templates,
            standard,
            TemplateType::Standard,
        );
        let custom = select(
            &self.data.custom_extraction_templates,
            custom,
            TemplateType::Custom,
        );
        standard.chain(custom).collect()
    }
}

fn select<'a>(
    templates: &'a [ExtractionTemplate],
    criteria: Option<&'a TemplateCriteria>,
    template_type: TemplateType,
) -> impl Iterator<Item = SelectedTemplate> + 'a {
    templates
        .iter()
        .filter(move |template| criteria.is_some_and(|c| c.selects(template)))
        .map(move |template| SelectedTemplate {
            template_type,
            template: template.clone(),
        })
}
