//! Collaborator interfaces and their local implementations.
//!
//! The submission tracker only talks to these traits:
//!
//! - [`ObjectStore`] - Raw upload bytes by key
//! - [`SubmissionRepository`] - Submissions, status, and messages
//! - [`TemplateRepository`] - Templates and their per-species schemas
//! - [`SurveyRepository`] - Survey species
//!
//! Implementations:
//!
//! - [`MemoryStore`] - Everything in memory (tests, `serve`)
//! - [`DirectoryObjectStore`] - Objects as files under a root directory
//! - [`TemplateRegistry`] - Templates as JSON files in a directory

pub mod memory;
pub mod object;
pub mod registry;

pub use memory::MemoryStore;
pub use object::DirectoryObjectStore;
pub use registry::{StoredSpeciesSchema, StoredTemplate, TemplateRegistry};

use async_trait::async_trait;

use crate::error::{RepositoryResult, StorageResult};
use crate::models::{
    MessageClass, NewSubmission, Submission, SubmissionMessage, SubmissionMessageType, SubmissionStatus,
    SummaryTemplate, SurveySpecies, TemplateSpeciesRecord,
};

/// Object storage holding raw uploads.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes stored under `key`.
    async fn get_file(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Store `bytes` under `key`, replacing any existing object.
    async fn put_file(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()>;
}

/// Persistence for submissions and their messages.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Register an upload. New submissions start as `UPLOADED`.
    async fn create_submission(&self, new: NewSubmission) -> RepositoryResult<Submission>;

    async fn find_submission_by_id(&self, id: i64) -> RepositoryResult<Submission>;

    /// Append a message. Messages are never updated or deleted.
    async fn insert_submission_message(
        &self,
        submission_id: i64,
        class: MessageClass,
        message_type: SubmissionMessageType,
        message: &str,
    ) -> RepositoryResult<SubmissionMessage>;

    /// Record a status. Transition rules are the tracker's job.
    async fn update_submission_status(&self, id: i64, status: SubmissionStatus) -> RepositoryResult<()>;

    /// Messages in insertion order.
    async fn get_submission_messages(&self, id: i64) -> RepositoryResult<Vec<SubmissionMessage>>;
}

/// Read access to validation templates.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_template(&self, name: &str, version: &str) -> RepositoryResult<Option<SummaryTemplate>>;

    /// Species rows of a template, in repository order.
    async fn get_template_species_records(&self, template_id: i64) -> RepositoryResult<Vec<TemplateSpeciesRecord>>;
}

/// Species attached to surveys.
#[async_trait]
pub trait SurveyRepository: Send + Sync {
    /// Species of a survey; empty lists when none are recorded.
    async fn get_species_data(&self, survey_id: i64) -> RepositoryResult<SurveySpecies>;

    async fn set_species_data(&self, survey_id: i64, species: SurveySpecies) -> RepositoryResult<()>;
}
