//! Domain models for the submission validation service.
//!
//! - [`Submission`] - An uploaded file tracked through the pipeline
//! - [`SubmissionStatus`] - Forward-only lifecycle of a submission
//! - [`SubmissionMessage`] - Persisted, append-only validation message
//! - [`SubmissionMessageType`] - Stable message-type codes
//! - [`SummaryTemplate`] / [`TemplateSpeciesRecord`] - Stored validation templates
//! - [`SurveySpecies`] - Focal and ancillary species of a survey

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Message Types
// =============================================================================

/// Stable code attached to every validation error and persisted message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionMessageType {
    DuplicateHeader,
    UnknownHeader,
    MissingRequiredHeader,
    MissingRecommendedHeader,
    MissingRequiredField,
    UnexpectedFormat,
    InvalidValue,
    OutOfRange,
    NonUniqueKey,
    DanglingParentChildKey,
    InvalidMimetype,
    MissingRequiredFile,
    UnsupportedFileType,
    InvalidMedia,
    FailedGetFileFromStorage,
    FailedToGetTemplateNameVersion,
    FailedGetValidationRules,
    FailedParseValidationSchema,
    MismatchedTemplateSurveySpecies,
}

impl SubmissionMessageType {
    /// The persisted code, e.g. `FAILED_GET_VALIDATION_RULES`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateHeader => "DUPLICATE_HEADER",
            Self::UnknownHeader => "UNKNOWN_HEADER",
            Self::MissingRequiredHeader => "MISSING_REQUIRED_HEADER",
            Self::MissingRecommendedHeader => "MISSING_RECOMMENDED_HEADER",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::UnexpectedFormat => "UNEXPECTED_FORMAT",
            Self::InvalidValue => "INVALID_VALUE",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::NonUniqueKey => "NON_UNIQUE_KEY",
            Self::DanglingParentChildKey => "DANGLING_PARENT_CHILD_KEY",
            Self::InvalidMimetype => "INVALID_MIMETYPE",
            Self::MissingRequiredFile => "MISSING_REQUIRED_FILE",
            Self::UnsupportedFileType => "UNSUPPORTED_FILE_TYPE",
            Self::InvalidMedia => "INVALID_MEDIA",
            Self::FailedGetFileFromStorage => "FAILED_GET_FILE_FROM_STORAGE",
            Self::FailedToGetTemplateNameVersion => "FAILED_TO_GET_TEMPLATE_NAME_VERSION",
            Self::FailedGetValidationRules => "FAILED_GET_VALIDATION_RULES",
            Self::FailedParseValidationSchema => "FAILED_PARSE_VALIDATION_SCHEMA",
            Self::MismatchedTemplateSurveySpecies => "MISMATCHED_TEMPLATE_SURVEY_SPECIES",
        }
    }
}

impl fmt::Display for SubmissionMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Severity class of a persisted message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageClass {
    Error,
    Warning,
    Notice,
}

/// A persisted validation message. Only the submission tracker creates these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMessage {
    pub id: i64,
    pub submission_id: i64,
    pub class: MessageClass,
    #[serde(rename = "type")]
    pub message_type: SubmissionMessageType,
    pub message: String,
}

// =============================================================================
// Submission Status
// =============================================================================

/// Lifecycle of a submission.
///
/// ```text
/// UPLOADED -> PREPARING -> (FAILED_SUMMARY_PREPARATION | PREPARED)
///          -> VALIDATING -> (FAILED_VALIDATION | VALIDATED)
///          -> (REJECTED | ACCEPTED)
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Uploaded,
    Preparing,
    FailedSummaryPreparation,
    Prepared,
    Validating,
    FailedValidation,
    Validated,
    Rejected,
    Accepted,
}

impl SubmissionStatus {
    /// Whether moving from `self` to `next` is a legal forward step.
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        use SubmissionStatus as S;
        matches!(
            (self, next),
            (S::Uploaded, S::Preparing)
                | (S::Preparing, S::FailedSummaryPreparation)
                | (S::Preparing, S::Prepared)
                | (S::Prepared, S::Validating)
                | (S::Validating, S::FailedValidation)
                | (S::Validating, S::Validated)
                | (S::Validated, S::Accepted)
                | (S::Validated, S::Rejected)
                | (S::FailedSummaryPreparation, S::Rejected)
                | (S::FailedValidation, S::Rejected)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "UPLOADED",
            Self::Preparing => "PREPARING",
            Self::FailedSummaryPreparation => "FAILED_SUMMARY_PREPARATION",
            Self::Prepared => "PREPARED",
            Self::Validating => "VALIDATING",
            Self::FailedValidation => "FAILED_VALIDATION",
            Self::Validated => "VALIDATED",
            Self::Rejected => "REJECTED",
            Self::Accepted => "ACCEPTED",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Submission
// =============================================================================

/// Which pipeline a submission belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionKind {
    Occurrence,
    #[default]
    Summary,
}

/// Template name and version, as embedded in a workbook or declared on upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplateIdentity {
    pub name: String,
    pub version: String,
}

/// An uploaded file tracked through preparation and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: i64,
    pub survey_id: i64,
    pub kind: SubmissionKind,
    pub file_name: String,
    /// Object storage key of the raw upload.
    pub storage_key: String,
    /// Mimetype declared by the uploader, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_mimetype: Option<String>,
    pub status: SubmissionStatus,
    /// Used when the file itself carries no template properties (CSV, ZIP).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_template: Option<TemplateIdentity>,
    pub created_at: String,
}

/// Fields needed to register a new upload.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub survey_id: i64,
    pub kind: SubmissionKind,
    pub file_name: String,
    pub storage_key: String,
    pub declared_mimetype: Option<String>,
    pub declared_template: Option<TemplateIdentity>,
}

// =============================================================================
// Templates and Species
// =============================================================================

/// A stored `summary_template` row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SummaryTemplate {
    pub id: i64,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A stored `summary_template_species` row.
///
/// A null `wldtaxonomic_units_id` means the schema applies to any species.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSpeciesRecord {
    pub id: i64,
    pub template_id: i64,
    pub wldtaxonomic_units_id: Option<i64>,
    /// The validation schema document, as stored.
    pub validation: serde_json::Value,
}

/// Species attached to a survey.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SurveySpecies {
    #[serde(default)]
    pub focal_species: Vec<i64>,
    #[serde(default)]
    pub ancillary_species: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_moves_forward_only() {
        use SubmissionStatus as S;
        assert!(S::Uploaded.can_transition_to(S::Preparing));
        assert!(S::Preparing.can_transition_to(S::FailedSummaryPreparation));
        assert!(S::Validating.can_transition_to(S::Validated));
        assert!(S::Validated.can_transition_to(S::Accepted));

        assert!(!S::Validated.can_transition_to(S::Validating));
        assert!(!S::Rejected.can_transition_to(S::Uploaded));
        assert!(!S::FailedSummaryPreparation.can_transition_to(S::Validating));
        assert!(!S::FailedValidation.can_transition_to(S::Accepted));
    }

    #[test]
    fn test_message_type_code_matches_serde() {
        let json = serde_json::to_string(&SubmissionMessageType::FailedGetValidationRules).unwrap();
        assert_eq!(json, "\"FAILED_GET_VALIDATION_RULES\"");
        assert_eq!(
            SubmissionMessageType::FailedGetValidationRules.code(),
            "FAILED_GET_VALIDATION_RULES"
        );
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&SubmissionStatus::FailedSummaryPreparation).unwrap();
        assert_eq!(json, "\"FAILED_SUMMARY_PREPARATION\"");
    }
}
