//! Validation schema DSL.
//!
//! A schema document looks like:
//!
//! ```json
//! {
//!   "name": "Moose SRB",
//!   "files": [
//!     {
//!       "name": "Effort & Site Conditions",
//!       "validations": [
//!         { "file_required_columns_validator": { "required_columns": ["Study Area"] } },
//!         { "file_duplicate_columns_validator": {} }
//!       ],
//!       "columns": [
//!         { "name": "Study Area", "validations": [ { "column_required_validator": {} } ] }
//!       ]
//!     }
//!   ],
//!   "defaultFile": { "validations": [], "columns": [] },
//!   "validations": [ { "mimetype_validator": { "reg_exps": ["^text/csv$"] } } ],
//!   "workbookValidations": []
//! }
//! ```
//!
//! Every validator entry is an object with exactly one key naming its kind.
//! Serde's externally tagged enums give us that rule for free: zero keys,
//! several keys or an unknown key all fail deserialization.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of a validation schema document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSchema {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<FileSchema>,
    /// Applies to any sheet not named in `files`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_file: Option<FileSchema>,
    /// Submission-level validators.
    #[serde(default)]
    pub validations: Vec<SubmissionValidator>,
    #[serde(default)]
    pub workbook_validations: Vec<WorkbookValidator>,
}

/// Rules for one sheet / file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub validations: Vec<FileValidator>,
}

/// Rules for one column of a sheet.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub validations: Vec<ColumnValidator>,
}

// =============================================================================
// Validator kinds
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum SubmissionValidator {
    #[serde(rename = "submission_required_files_validator")]
    RequiredFiles(RequiredFilesConfig),
    #[serde(rename = "mimetype_validator")]
    Mimetype(MimetypeConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum WorkbookValidator {
    #[serde(rename = "workbook_parent_child_key_match_validator")]
    ParentChildKeyMatch(ParentChildKeyMatchConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FileValidator {
    #[serde(rename = "file_required_columns_validator")]
    RequiredColumns(RequiredColumnsConfig),
    #[serde(rename = "file_recommended_columns_validator")]
    RecommendedColumns(RecommendedColumnsConfig),
    #[serde(rename = "file_duplicate_columns_validator")]
    DuplicateColumns(BasicConfig),
    #[serde(rename = "file_valid_columns_validator")]
    ValidColumns(ValidColumnsConfig),
    #[serde(rename = "file_column_unique_validator")]
    ColumnUnique(ColumnUniqueConfig),
}

impl FileValidator {
    /// Header validators run before any row is looked at.
    pub fn is_header_validator(&self) -> bool {
        !matches!(self, FileValidator::ColumnUnique(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ColumnValidator {
    #[serde(rename = "column_required_validator")]
    Required(BasicConfig),
    #[serde(rename = "column_format_validator")]
    Format(FormatConfig),
    #[serde(rename = "column_numeric_validator")]
    Numeric(BasicConfig),
    #[serde(rename = "column_range_validator")]
    Range(RangeConfig),
    #[serde(rename = "column_code_validator")]
    Code(CodeConfig),
}

// =============================================================================
// Validator configs
// =============================================================================

/// Optional `name` and `description`, accepted by every validator config.
///
/// Parameterless validators use it as their whole config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BasicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequiredFilesConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub required_files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MimetypeConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub reg_exps: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParentChildKeyMatchConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub child_worksheet_name: String,
    pub parent_worksheet_name: String,
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RequiredColumnsConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub required_columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecommendedColumnsConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub recommended_columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ValidColumnsConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub valid_columns: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ColumnUniqueConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FormatConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub reg_exp: String,
    /// JavaScript-style flags; `i`, `m`, `s` and `x` are honored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reg_exp_flags: Option<String>,
    /// Human description of the format, used in error messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_format: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RangeConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CodeConfig {
    #[serde(flatten)]
    pub info: BasicConfig,
    pub allowed_code_values: Vec<AllowedCode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllowedCode {
    pub name: CodeName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Code names are strings or numbers in the DSL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CodeName {
    Text(String),
    Number(f64),
}

impl fmt::Display for CodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeName::Text(s) => f.write_str(s.trim()),
            CodeName::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CodeName::Number(n) => write!(f, "{}", n),
        }
    }
}
