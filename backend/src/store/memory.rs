//! In-memory store for submissions, messages, survey species and objects.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::{RepositoryError, RepositoryResult, StorageError, StorageResult};
use crate::models::{
    MessageClass, NewSubmission, Submission, SubmissionMessage, SubmissionMessageType, SubmissionStatus,
    SurveySpecies,
};

use super::{ObjectStore, SubmissionRepository, SurveyRepository};

#[derive(Default)]
struct MemoryState {
    next_submission_id: i64,
    next_message_id: i64,
    submissions: BTreeMap<i64, Submission>,
    messages: Vec<SubmissionMessage>,
    species: HashMap<i64, SurveySpecies>,
    objects: HashMap<String, Vec<u8>>,
}

/// Process-local store. Ids start at 1 and increase.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionRepository for MemoryStore {
    async fn create_submission(&self, new: NewSubmission) -> RepositoryResult<Submission> {
        let mut state = self.state.write().await;
        state.next_submission_id += 1;

        let submission = Submission {
            id: state.next_submission_id,
            survey_id: new.survey_id,
            kind: new.kind,
            file_name: new.file_name,
            storage_key: new.storage_key,
            declared_mimetype: new.declared_mimetype,
            status: SubmissionStatus::Uploaded,
            declared_template: new.declared_template,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        state.submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn find_submission_by_id(&self, id: i64) -> RepositoryResult<Submission> {
        let state = self.state.read().await;
        state
            .submissions
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::SubmissionNotFound(id))
    }

    async fn insert_submission_message(
        &self,
        submission_id: i64,
        class: MessageClass,
        message_type: SubmissionMessageType,
        message: &str,
    ) -> RepositoryResult<SubmissionMessage> {
        let mut state = self.state.write().await;
        if !state.submissions.contains_key(&submission_id) {
            return Err(RepositoryError::SubmissionNotFound(submission_id));
        }

        state.next_message_id += 1;
        let message = SubmissionMessage {
            id: state.next_message_id,
            submission_id,
            class,
            message_type,
            message: message.to_string(),
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    async fn update_submission_status(&self, id: i64, status: SubmissionStatus) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        let submission = state
            .submissions
            .get_mut(&id)
            .ok_or(RepositoryError::SubmissionNotFound(id))?;
        submission.status = status;
        Ok(())
    }

    async fn get_submission_messages(&self, id: i64) -> RepositoryResult<Vec<SubmissionMessage>> {
        let state = self.state.read().await;
        if !state.submissions.contains_key(&id) {
            return Err(RepositoryError::SubmissionNotFound(id));
        }
        Ok(state
            .messages
            .iter()
            .filter(|m| m.submission_id == id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SurveyRepository for MemoryStore {
    async fn get_species_data(&self, survey_id: i64) -> RepositoryResult<SurveySpecies> {
        let state = self.state.read().await;
        Ok(state.species.get(&survey_id).cloned().unwrap_or_default())
    }

    async fn set_species_data(&self, survey_id: i64, species: SurveySpecies) -> RepositoryResult<()> {
        let mut state = self.state.write().await;
        state.species.insert(survey_id, species);
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        let state = self.state.read().await;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put_file(&self, key: &str, bytes: Vec<u8>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.objects.insert(key.to_string(), bytes);
        Ok(())
    }
}
