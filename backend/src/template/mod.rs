//! Template resolution: from a workbook's identity to a validation schema.
//!
//! A template has one row per species it applies to. A row with no species
//! applies to any survey. Among the rows that apply, the first one in
//! repository order is used.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ResolutionError;
use crate::models::{SummaryTemplate, TemplateIdentity, TemplateSpeciesRecord};
use crate::schema::ValidationSchemaParser;
use crate::store::TemplateRepository;

/// Workbook custom property holding the template name.
pub const TEMPLATE_NAME_PROPERTY: &str = "sims_name";
/// Workbook custom property holding the template version.
pub const TEMPLATE_VERSION_PROPERTY: &str = "sims_version";

/// The template selected for a submission, with its parsed schema.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub template: SummaryTemplate,
    pub record: TemplateSpeciesRecord,
    pub parser: ValidationSchemaParser,
}

/// Template identity from workbook custom properties.
pub fn identity_from_properties(properties: &BTreeMap<String, String>) -> Option<TemplateIdentity> {
    let get = |key: &str| {
        properties
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Some(TemplateIdentity {
        name: get(TEMPLATE_NAME_PROPERTY)?,
        version: get(TEMPLATE_VERSION_PROPERTY)?,
    })
}

pub struct TemplateResolver {
    repository: Arc<dyn TemplateRepository>,
}

impl TemplateResolver {
    pub fn new(repository: Arc<dyn TemplateRepository>) -> Self {
        Self { repository }
    }

    /// Pick the schema for `identity` that applies to the survey's species.
    pub async fn resolve(
        &self,
        identity: &TemplateIdentity,
        species_ids: &[i64],
    ) -> Result<ResolvedTemplate, ResolutionError> {
        let not_found = || ResolutionError::ValidationRulesNotFound {
            name: identity.name.clone(),
            version: identity.version.clone(),
        };

        let template = self
            .repository
            .find_template(&identity.name, &identity.version)
            .await?
            .ok_or_else(not_found)?;

        let records = self.repository.get_template_species_records(template.id).await?;

        let applies = |record: &TemplateSpeciesRecord| match record.wldtaxonomic_units_id {
            None => true,
            Some(species) => species_ids.contains(&species),
        };

        let Some(record) = records.iter().find(|r| applies(r)).cloned() else {
            let species_specific = records.iter().any(|r| r.wldtaxonomic_units_id.is_some());
            return Err(if !species_ids.is_empty() && species_specific {
                ResolutionError::SpeciesMismatch {
                    name: identity.name.clone(),
                    version: identity.version.clone(),
                    species_ids: species_ids.to_vec(),
                }
            } else {
                not_found()
            });
        };

        let parser = ValidationSchemaParser::from_value(record.validation.clone())?;
        tracing::debug!(
            template_id = template.id,
            record_id = record.id,
            species = ?record.wldtaxonomic_units_id,
            "Resolved validation template"
        );

        Ok(ResolvedTemplate {
            template,
            record,
            parser,
        })
    }
}
