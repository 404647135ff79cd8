//! Typed accessors over a parsed validation schema.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::SchemaParseError;

use super::config::{
    ColumnSchema, ColumnValidator, FileSchema, FileValidator, SubmissionValidator, ValidationSchema,
    WorkbookValidator,
};

/// Parsed validation schema with per-scope validator lookup.
///
/// Every regular expression in the schema is compiled up front, so a bad
/// pattern fails here rather than halfway through a validation run.
/// Accessors return empty slices when nothing is configured for a scope.
#[derive(Debug, Clone)]
pub struct ValidationSchemaParser {
    schema: ValidationSchema,
    regexes: HashMap<String, Regex>,
}

impl ValidationSchemaParser {
    /// Parse a schema from JSON text.
    pub fn from_str(json: &str) -> Result<Self, SchemaParseError> {
        let schema: ValidationSchema = serde_json::from_str(json)?;
        Self::new(schema)
    }

    /// Parse a schema from an already-decoded JSON value.
    pub fn from_value(value: Value) -> Result<Self, SchemaParseError> {
        let schema: ValidationSchema = serde_json::from_value(value)?;
        Self::new(schema)
    }

    pub fn new(schema: ValidationSchema) -> Result<Self, SchemaParseError> {
        let mut regexes = HashMap::new();

        let mut compile = |pattern: &str, flags: Option<&str>| -> Result<(), SchemaParseError> {
            let key = regex_key(pattern, flags)?;
            if !regexes.contains_key(&key) {
                let re = Regex::new(&key).map_err(|e| SchemaParseError::Regex {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                })?;
                regexes.insert(key, re);
            }
            Ok(())
        };

        for validator in &schema.validations {
            if let SubmissionValidator::Mimetype(config) = validator {
                for pattern in &config.reg_exps {
                    compile(pattern, None)?;
                }
            }
        }

        for file in schema.files.iter().chain(schema.default_file.iter()) {
            for column in &file.columns {
                for validator in &column.validations {
                    if let ColumnValidator::Format(config) = validator {
                        compile(&config.reg_exp, config.reg_exp_flags.as_deref())?;
                    }
                }
            }
        }

        Ok(Self { schema, regexes })
    }

    pub fn schema(&self) -> &ValidationSchema {
        &self.schema
    }

    pub fn submission_validators(&self) -> &[SubmissionValidator] {
        &self.schema.validations
    }

    pub fn workbook_validators(&self) -> &[WorkbookValidator] {
        &self.schema.workbook_validations
    }

    /// Schema for a sheet: exact name match (case-insensitive), else `defaultFile`.
    pub fn file_schema(&self, file_name: &str) -> Option<&FileSchema> {
        let wanted = file_name.trim();
        self.schema
            .files
            .iter()
            .find(|f| f.name.trim().eq_ignore_ascii_case(wanted))
            .or(self.schema.default_file.as_ref())
    }

    pub fn file_validators(&self, file_name: &str) -> &[FileValidator] {
        self.file_schema(file_name)
            .map(|f| f.validations.as_slice())
            .unwrap_or(&[])
    }

    pub fn file_columns(&self, file_name: &str) -> &[ColumnSchema] {
        self.file_schema(file_name)
            .map(|f| f.columns.as_slice())
            .unwrap_or(&[])
    }

    pub fn column_validators(&self, file_name: &str, column_name: &str) -> &[ColumnValidator] {
        let wanted = column_name.trim();
        self.file_columns(file_name)
            .iter()
            .find(|c| c.name.trim().eq_ignore_ascii_case(wanted))
            .map(|c| c.validations.as_slice())
            .unwrap_or(&[])
    }

    /// Compiled expression for a pattern declared in this schema.
    pub fn regex(&self, pattern: &str, flags: Option<&str>) -> Option<&Regex> {
        regex_key(pattern, flags).ok().and_then(|key| self.regexes.get(&key))
    }
}

/// Translate JavaScript-style flags into an inline group prefix.
fn regex_key(pattern: &str, flags: Option<&str>) -> Result<String, SchemaParseError> {
    let mut inline = String::new();
    for flag in flags.unwrap_or("").chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => {
                if !inline.contains(flag) {
                    inline.push(flag);
                }
            }
            // Global, sticky and unicode change nothing for a whole-cell test.
            'g' | 'y' | 'u' => {}
            other => {
                return Err(SchemaParseError::Regex {
                    pattern: pattern.to_string(),
                    message: format!("unsupported flag '{}'", other),
                })
            }
        }
    }

    if inline.is_empty() {
        Ok(pattern.to_string())
    } else {
        Ok(format!("(?{}){}", inline, pattern))
    }
}
