//! Error types for the submission validation pipeline.
//!
//! One enum per pipeline stage:
//!
//! - [`MediaParseError`] - Corrupt or structurally invalid uploads
//! - [`SchemaParseError`] - Malformed validation schema documents
//! - [`ResolutionError`] - Template lookup failures
//! - [`PreparationError`] - Failures before validation can start
//! - [`StorageError`] - Object storage failures
//! - [`RepositoryError`] - Persistence failures (not submission outcomes)
//! - [`TrackerError`] - Errors surfaced by the submission tracker
//! - [`ServerError`] - HTTP layer errors
//!
//! Domain errors expose `message_type()`, the stable code the tracker
//! persists. Conversion is via `From`, so `?` works across stages.

use thiserror::Error;

use crate::models::{SubmissionMessageType, SubmissionStatus};

// =============================================================================
// Media Parsing Errors
// =============================================================================

/// The upload was recognized but could not be read.
#[derive(Debug, Error)]
pub enum MediaParseError {
    /// Zip container could not be opened or read.
    #[error("Corrupt archive: {0}")]
    Archive(String),

    /// A required workbook part is absent.
    #[error("Workbook part missing: {0}")]
    MissingPart(String),

    /// XML in a workbook part is malformed.
    #[error("Invalid XML in '{part}': {message}")]
    Xml { part: String, message: String },

    /// CSV content could not be decoded or split.
    #[error("Invalid CSV: {0}")]
    Csv(String),

    /// Empty file.
    #[error("File '{0}' is empty")]
    EmptyFile(String),

    /// A cell reference lies beyond the last addressable column.
    #[error("Cell reference '{reference}' in '{part}' is out of range")]
    CellReference { part: String, reference: String },

    /// A zip entry decompresses past the size limit.
    #[error("'{name}' exceeds the {limit} byte limit")]
    TooLarge { name: String, limit: u64 },
}

impl MediaParseError {
    pub fn message_type(&self) -> SubmissionMessageType {
        SubmissionMessageType::InvalidMedia
    }
}

// =============================================================================
// Schema Errors
// =============================================================================

/// A validation schema document could not be parsed.
#[derive(Debug, Error)]
pub enum SchemaParseError {
    /// Not JSON, or not the expected shape (including validator entries
    /// with zero, several, or unknown keys).
    #[error("Invalid validation schema: {0}")]
    Json(#[from] serde_json::Error),

    /// A format validator carries an expression that does not compile.
    #[error("Invalid regular expression '{pattern}': {message}")]
    Regex { pattern: String, message: String },
}

impl SchemaParseError {
    pub fn message_type(&self) -> SubmissionMessageType {
        SubmissionMessageType::FailedParseValidationSchema
    }
}

// =============================================================================
// Template Resolution Errors
// =============================================================================

/// No usable validation schema could be selected for a workbook.
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// No template or no species row matched.
    #[error("Failed to get validation rules for template '{name}' version '{version}'")]
    ValidationRulesNotFound { name: String, version: String },

    /// The template only has species-specific rules, none for this survey.
    #[error("Template '{name}' version '{version}' does not apply to survey species {species_ids:?}")]
    SpeciesMismatch {
        name: String,
        version: String,
        species_ids: Vec<i64>,
    },

    /// The selected schema document is malformed.
    #[error("Failed to parse validation schema: {0}")]
    Schema(#[from] SchemaParseError),

    /// Lookup itself failed; not a submission outcome.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ResolutionError {
    /// Code for domain outcomes; `None` for infrastructure failures.
    pub fn message_type(&self) -> Option<SubmissionMessageType> {
        match self {
            Self::ValidationRulesNotFound { .. } => Some(SubmissionMessageType::FailedGetValidationRules),
            Self::SpeciesMismatch { .. } => Some(SubmissionMessageType::MismatchedTemplateSurveySpecies),
            Self::Schema(e) => Some(e.message_type()),
            Self::Repository(_) => None,
        }
    }
}

// =============================================================================
// Preparation Errors
// =============================================================================

/// Failures while preparing a submission for validation.
#[derive(Debug, Error)]
pub enum PreparationError {
    /// Raw bytes could not be fetched.
    #[error("Failed to get file from storage: {0}")]
    Storage(#[from] StorageError),

    /// Byte signature and mimetype are not CSV, XLSX or ZIP.
    #[error("Unsupported file type: '{0}'")]
    UnsupportedFileType(String),

    /// File was recognized but is unreadable.
    #[error(transparent)]
    InvalidMedia(#[from] MediaParseError),

    /// Neither the file nor the submission names a template.
    #[error("Failed to get template name and version from file")]
    MissingTemplateIdentity,
}

impl PreparationError {
    pub fn message_type(&self) -> SubmissionMessageType {
        match self {
            Self::Storage(_) => SubmissionMessageType::FailedGetFileFromStorage,
            Self::UnsupportedFileType(_) => SubmissionMessageType::UnsupportedFileType,
            Self::InvalidMedia(e) => e.message_type(),
            Self::MissingTemplateIdentity => SubmissionMessageType::FailedToGetTemplateNameVersion,
        }
    }
}

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Object storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Key cannot be mapped to a storage location.
    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    /// IO error.
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors. These are infrastructure failures, never persisted as messages.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Submission not found: {0}")]
    SubmissionNotFound(i64),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Repository IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Repository JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Tracker Errors (top-level)
// =============================================================================

/// Errors returned by the submission tracker.
///
/// Submission outcomes (failed preparation, failed validation) are not
/// errors; they are persisted and returned as an outcome. Only defects and
/// infrastructure failures end up here.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Illegal status transition for submission {id}: {from} -> {to}")]
    InvalidTransition {
        id: i64,
        from: SubmissionStatus,
        to: SubmissionStatus,
    },

    #[error("Submission {submission_id} does not belong to survey {survey_id}")]
    SurveyMismatch { submission_id: i64, survey_id: i64 },

    /// A parsing or dispatch task panicked or was cancelled.
    #[error("Validation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for ServerError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::SubmissionNotFound(id) => Self::NotFound(format!("submission {}", id)),
            other => Self::Tracker(TrackerError::Repository(other)),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for media parsing.
pub type MediaResult<T> = Result<T, MediaParseError>;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
