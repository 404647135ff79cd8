//! REST API types.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{Submission, SubmissionMessage, SubmissionStatus, SurveySpecies};
use crate::submission::ValidationOutcome;
use crate::validation::{CsvState, MediaState};

/// Response sent after an upload has been validated.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub submission_id: i64,
    pub status: SubmissionStatus,
    /// Absent when preparation or template resolution stopped the run.
    /// The report keys keep the `media_state`/`csv_state` wire names.
    #[serde(rename = "media_state", skip_serializing_if = "Option::is_none")]
    pub media_state: Option<MediaState>,
    #[serde(rename = "csv_state", skip_serializing_if = "Option::is_none")]
    pub csv_state: Option<Vec<CsvState>>,
    pub messages: Vec<SubmissionMessage>,
}

impl SubmissionResponse {
    pub fn new(outcome: ValidationOutcome, messages: Vec<SubmissionMessage>) -> Self {
        let (media_state, csv_state) = match outcome.report {
            Some(report) => (Some(report.media_state), Some(report.csv_state)),
            None => (None, None),
        };
        Self {
            submission_id: outcome.submission_id,
            status: outcome.status,
            media_state,
            csv_state,
            messages,
        }
    }
}

/// A submission with its persisted messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDetail {
    pub submission: Submission,
    pub messages: Vec<SubmissionMessage>,
}

/// Body of `PUT /api/surveys/{survey_id}/species`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeciesRequest {
    #[serde(default)]
    pub focal_species: Vec<i64>,
    #[serde(default)]
    pub ancillary_species: Vec<i64>,
}

impl From<SpeciesRequest> for SurveySpecies {
    fn from(req: SpeciesRequest) -> Self {
        SurveySpecies {
            focal_species: req.focal_species,
            ancillary_species: req.ancillary_species,
        }
    }
}

/// Create an error response body
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}
