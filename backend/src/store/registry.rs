//! Template Registry - validation templates stored as JSON files
//!
//! Each template lives in `<dir>/<id>-<slug>.json` and carries its
//! per-species validation schemas in repository order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RepositoryError, RepositoryResult};
use crate::models::{SummaryTemplate, TemplateSpeciesRecord};
use crate::schema::ValidationSchemaParser;

use super::TemplateRepository;

/// Directory where templates are stored (relative to current dir)
pub const DEFAULT_TEMPLATE_DIR: &str = ".sims/templates";

/// One species row of a stored template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSpeciesSchema {
    pub id: i64,
    /// `None` applies to any species
    #[serde(default)]
    pub wldtaxonomic_units_id: Option<i64>,
    pub validation: Value,
}

/// A template file on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredTemplate {
    pub id: i64,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    #[serde(default)]
    pub species: Vec<StoredSpeciesSchema>,
}

impl StoredTemplate {
    pub fn summary(&self) -> SummaryTemplate {
        SummaryTemplate {
            id: self.id,
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
        }
    }

    fn records(&self) -> Vec<TemplateSpeciesRecord> {
        self.species
            .iter()
            .map(|s| TemplateSpeciesRecord {
                id: s.id,
                template_id: self.id,
                wldtaxonomic_units_id: s.wldtaxonomic_units_id,
                validation: s.validation.clone(),
            })
            .collect()
    }
}

/// Registry for managing validation templates
pub struct TemplateRegistry {
    /// Directory where templates are stored
    registry_dir: PathBuf,
    /// Loaded templates (id -> template)
    templates: BTreeMap<i64, StoredTemplate>,
}

impl TemplateRegistry {
    /// Create a registry, loading existing templates from disk
    pub fn new() -> Self {
        Self::with_dir(DEFAULT_TEMPLATE_DIR)
    }

    /// Create a registry with a custom directory
    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        let mut registry = Self {
            registry_dir: dir.as_ref().to_path_buf(),
            templates: BTreeMap::new(),
        };
        registry.load_all();
        registry
    }

    /// Load all templates from the registry directory.
    /// Unreadable files are skipped with a warning.
    fn load_all(&mut self) {
        let entries = match fs::read_dir(&self.registry_dir) {
            Ok(e) => e,
            Err(_) => return,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|e| e == "json") {
                continue;
            }
            let loaded = fs::read_to_string(&path)
                .map_err(RepositoryError::from)
                .and_then(|content| serde_json::from_str::<StoredTemplate>(&content).map_err(RepositoryError::from));
            match loaded {
                Ok(template) => {
                    self.templates.insert(template.id, template);
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable template file"),
            }
        }
    }

    /// Get all stored templates, ordered by id
    pub fn list(&self) -> Vec<&StoredTemplate> {
        self.templates.values().collect()
    }

    pub fn get(&self, id: i64) -> Option<&StoredTemplate> {
        self.templates.get(&id)
    }

    /// Exact name/version lookup
    pub fn find(&self, name: &str, version: &str) -> Option<&StoredTemplate> {
        self.templates
            .values()
            .find(|t| t.name == name && t.version == version)
    }

    /// Add a validation schema for a species to a template.
    ///
    /// The template is created if no template with this name and version
    /// exists. The schema is appended after any existing species rows.
    pub fn save(
        &mut self,
        name: &str,
        version: &str,
        species: Option<i64>,
        validation: Value,
    ) -> RepositoryResult<i64> {
        ValidationSchemaParser::from_value(validation.clone())
            .map_err(|e| RepositoryError::InvalidTemplate(e.to_string()))?;

        fs::create_dir_all(&self.registry_dir)?;

        let next_species_id = self
            .templates
            .values()
            .flat_map(|t| t.species.iter().map(|s| s.id))
            .max()
            .unwrap_or(0)
            + 1;

        let (name, version) = (name.trim(), version.trim());
        let existing = self.find(name, version).map(|t| t.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.templates.keys().next_back().copied().unwrap_or(0) + 1;
                self.templates.insert(
                    id,
                    StoredTemplate {
                        id,
                        name: name.to_string(),
                        version: version.to_string(),
                        description: None,
                        created_at: chrono::Utc::now().to_rfc3339(),
                        species: Vec::new(),
                    },
                );
                id
            }
        };

        let template = self
            .templates
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::TemplateNotFound(id.to_string()))?;
        template.species.push(StoredSpeciesSchema {
            id: next_species_id,
            wldtaxonomic_units_id: species,
            validation,
        });

        fs::write(template_path(&self.registry_dir, template), serde_json::to_string_pretty(template)?)?;

        Ok(id)
    }

    /// Import a validation schema from a JSON file
    pub fn import(
        &mut self,
        path: &Path,
        name: Option<&str>,
        version: &str,
        species: Option<i64>,
    ) -> RepositoryResult<i64> {
        let content = fs::read_to_string(path)?;
        let validation: Value = serde_json::from_str(&content)?;

        let template_name = name
            .map(str::to_string)
            .or_else(|| validation.get("name").and_then(Value::as_str).map(str::to_string))
            .or_else(|| path.file_stem().and_then(|s| s.to_str()).map(str::to_string))
            .unwrap_or_else(|| "imported".to_string());

        self.save(&template_name, version, species, validation)
    }

    /// Delete a template from the registry
    pub fn delete(&mut self, id: i64) -> RepositoryResult<()> {
        let template = self
            .templates
            .remove(&id)
            .ok_or_else(|| RepositoryError::TemplateNotFound(id.to_string()))?;
        fs::remove_file(template_path(&self.registry_dir, &template))?;
        Ok(())
    }
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TemplateRepository for TemplateRegistry {
    async fn find_template(&self, name: &str, version: &str) -> RepositoryResult<Option<SummaryTemplate>> {
        Ok(self.find(name, version).map(StoredTemplate::summary))
    }

    async fn get_template_species_records(&self, template_id: i64) -> RepositoryResult<Vec<TemplateSpeciesRecord>> {
        Ok(self
            .templates
            .get(&template_id)
            .map(StoredTemplate::records)
            .unwrap_or_default())
    }
}

fn template_path(dir: &Path, template: &StoredTemplate) -> PathBuf {
    dir.join(format!("{}.json", file_stem(template.id, &template.name, &template.version)))
}

/// File stem from an id, name and version
fn file_stem(id: i64, name: &str, version: &str) -> String {
    format!("{} {} {}", id, name, version)
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
