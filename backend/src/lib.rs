//! # SIMS Validate - species inventory submission validation
//!
//! Validates uploaded survey workbooks (XLSX, CSV, or ZIP archives of them)
//! against the validation schema of the template they were filled in from,
//! and tracks each submission through preparation and validation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Upload    │────▶│   Parser    │────▶│  Template   │────▶│ Validation  │
//! │ (XLSX/CSV)  │     │ (worksheets)│     │ (resolver)  │     │ (dispatch)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                              ▲                                     │
//!                              └──────── Submission tracker ◀────────┘
//!                                    (status + persisted messages)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sims_validate::{parse_media, read_worksheets, validate_submission, ValidationSchemaParser};
//!
//! let media = parse_media(bytes, "moose.xlsx", None)?.expect("supported file");
//! let set = read_worksheets(&media)?;
//! let schema = ValidationSchemaParser::from_str(&schema_json)?;
//!
//! let report = validate_submission(&set, &schema);
//! println!("valid: {}", report.is_valid());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types per pipeline stage
//! - [`models`] - Domain models (Submission, SubmissionStatus, messages)
//! - [`parser`] - CSV/XLSX/ZIP parsing into worksheets
//! - [`schema`] - Validation schema DSL and its parser
//! - [`validation`] - Validator dispatch engine
//! - [`template`] - Template resolution by name, version and species
//! - [`submission`] - Submission state tracker
//! - [`store`] - Collaborator traits and local implementations
//! - [`api`] - HTTP API server
//! - [`config`] / [`logging`] - Runtime configuration and tracing setup

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;
pub mod schema;

// Validation
pub mod template;
pub mod validation;

// Submission workflow
pub mod store;
pub mod submission;

// HTTP API
pub mod api;

// Runtime
pub mod config;
pub mod logging;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    MediaParseError, PreparationError, RepositoryError, ResolutionError, SchemaParseError, ServerError,
    StorageError, TrackerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    MessageClass, Submission, SubmissionKind, SubmissionMessage, SubmissionMessageType, SubmissionStatus,
    SummaryTemplate, SurveySpecies, TemplateIdentity, TemplateSpeciesRecord,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{parse_media, read_worksheets, CellValue, UploadedMedia, Worksheet, WorksheetSet};

// =============================================================================
// Re-exports - Schema
// =============================================================================

pub use schema::{check_config, ValidationSchema, ValidationSchemaParser};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{validate_content, validate_media, validate_submission, CsvState, MediaState, ValidationReport};

// =============================================================================
// Re-exports - Templates and Submissions
// =============================================================================

pub use submission::{SubmissionTracker, Upload, ValidationOutcome};
pub use template::{ResolvedTemplate, TemplateResolver};
