//! Submission state tracker.
//!
//! Drives one submission through preparation and validation, persisting
//! every outcome as status changes and messages:
//!
//! ```text
//! UPLOADED ─▶ PREPARING ─┬─▶ FAILED_SUMMARY_PREPARATION
//!                        └─▶ PREPARED ─▶ VALIDATING ─┬─▶ FAILED_VALIDATION
//!                                                    └─▶ VALIDATED
//! VALIDATED ─▶ ACCEPTED | REJECTED        FAILED_* ─▶ REJECTED
//! ```
//!
//! Submission problems (bad file, unknown template, invalid rows) are
//! outcomes, not errors: they end in a failed status with messages.
//! `Err` is reserved for repository and storage failures and illegal
//! transitions, which leave the status where it was.

use std::sync::Arc;

use tracing::{info_span, Instrument};

use crate::api::logs::{LogBroadcaster, LogEntry};
use crate::error::{PreparationError, ResolutionError, TrackerError, TrackerResult};
use crate::models::{
    MessageClass, NewSubmission, Submission, SubmissionKind, SubmissionMessageType, SubmissionStatus,
    TemplateIdentity,
};
use crate::parser::{self, WorksheetSet};
use crate::store::{ObjectStore, SubmissionRepository, SurveyRepository, TemplateRepository};
use crate::template::{identity_from_properties, TemplateResolver};
use crate::validation::{self, ValidationReport};

/// Result of one `validate_file` run.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub submission_id: i64,
    pub status: SubmissionStatus,
    /// Present when dispatch ran; absent when preparation or template
    /// resolution stopped the run.
    pub report: Option<ValidationReport>,
    /// Number of messages persisted by this run.
    pub message_count: usize,
}

/// A file to register as a new submission.
#[derive(Debug, Clone)]
pub struct Upload {
    pub survey_id: i64,
    pub kind: SubmissionKind,
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub declared_mimetype: Option<String>,
    pub declared_template: Option<TemplateIdentity>,
}

/// Everything preparation produces for the validation stage.
struct Prepared {
    set: WorksheetSet,
    identity: TemplateIdentity,
}

pub struct SubmissionTracker {
    objects: Arc<dyn ObjectStore>,
    submissions: Arc<dyn SubmissionRepository>,
    surveys: Arc<dyn SurveyRepository>,
    resolver: TemplateResolver,
    logs: Arc<LogBroadcaster>,
}

impl SubmissionTracker {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        submissions: Arc<dyn SubmissionRepository>,
        surveys: Arc<dyn SurveyRepository>,
        templates: Arc<dyn TemplateRepository>,
        logs: Arc<LogBroadcaster>,
    ) -> Self {
        Self {
            objects,
            submissions,
            surveys,
            resolver: TemplateResolver::new(templates),
            logs,
        }
    }

    /// Store the raw bytes and register an `UPLOADED` submission.
    pub async fn upload(&self, upload: Upload) -> TrackerResult<Submission> {
        let storage_key = format!(
            "surveys/{}/submissions/{}/{}",
            upload.survey_id,
            uuid::Uuid::new_v4(),
            sanitize_file_name(&upload.file_name)
        );
        self.objects.put_file(&storage_key, upload.bytes).await?;

        let submission = self
            .submissions
            .create_submission(NewSubmission {
                survey_id: upload.survey_id,
                kind: upload.kind,
                file_name: upload.file_name,
                storage_key,
                declared_mimetype: upload.declared_mimetype,
                declared_template: upload.declared_template,
            })
            .await?;

        self.logs.log(
            LogEntry::info(format!("Received {} for survey {}", submission.file_name, submission.survey_id))
                .for_submission(submission.id),
        );
        Ok(submission)
    }

    /// Prepare and validate an uploaded submission.
    pub async fn validate_file(&self, submission_id: i64, survey_id: i64) -> TrackerResult<ValidationOutcome> {
        let span = info_span!("validate_file", submission_id, survey_id);
        self.run_validation(submission_id, survey_id).instrument(span).await
    }

    async fn run_validation(&self, submission_id: i64, survey_id: i64) -> TrackerResult<ValidationOutcome> {
        let mut submission = self.submissions.find_submission_by_id(submission_id).await?;
        if submission.survey_id != survey_id {
            return Err(TrackerError::SurveyMismatch {
                submission_id,
                survey_id,
            });
        }

        self.transition(&mut submission, SubmissionStatus::Preparing).await?;
        self.logs
            .log(LogEntry::info(format!("Preparing {}", submission.file_name)).for_submission(submission_id));

        let prepared = match self.prepare(&submission).await? {
            Ok(prepared) => prepared,
            Err(e) => {
                self.record(submission_id, MessageClass::Error, e.message_type(), &e.to_string())
                    .await?;
                self.transition(&mut submission, SubmissionStatus::FailedSummaryPreparation)
                    .await?;
                self.logs.log(
                    LogEntry::error(format!("Preparation failed: {}", e)).for_submission(submission_id),
                );
                return Ok(ValidationOutcome {
                    submission_id,
                    status: submission.status,
                    report: None,
                    message_count: 1,
                });
            }
        };

        self.transition(&mut submission, SubmissionStatus::Prepared).await?;
        self.transition(&mut submission, SubmissionStatus::Validating).await?;

        // Templates are chosen by focal species only.
        let species_ids = self.surveys.get_species_data(survey_id).await?.focal_species;

        let resolved = match self.resolver.resolve(&prepared.identity, &species_ids).await {
            Ok(resolved) => resolved,
            Err(ResolutionError::Repository(e)) => return Err(e.into()),
            Err(e) => {
                let message_type = e.message_type().unwrap_or(SubmissionMessageType::FailedGetValidationRules);
                self.record(submission_id, MessageClass::Error, message_type, &e.to_string())
                    .await?;
                self.transition(&mut submission, SubmissionStatus::FailedValidation)
                    .await?;
                self.logs.log(LogEntry::error(e.to_string()).for_submission(submission_id));
                return Ok(ValidationOutcome {
                    submission_id,
                    status: submission.status,
                    report: None,
                    message_count: 1,
                });
            }
        };

        let span = info_span!("dispatch", template_id = resolved.template.id);
        let (set, parser) = (prepared.set, resolved.parser);
        let report = run_blocking(move || span.in_scope(|| validation::validate_submission(&set, &parser))).await?;

        let valid = report.is_valid();
        let messages = report_messages(&report);
        for (class, message_type, text) in &messages {
            self.record(submission_id, *class, *message_type, text).await?;
        }

        let status = if valid {
            SubmissionStatus::Validated
        } else {
            SubmissionStatus::FailedValidation
        };
        self.transition(&mut submission, status).await?;

        let summary = format!("{} with {} message(s)", status, messages.len());
        let entry = if valid {
            LogEntry::success(summary)
        } else {
            LogEntry::warning(summary)
        };
        self.logs.log(entry.for_submission(submission_id));

        Ok(ValidationOutcome {
            submission_id,
            status,
            report: Some(report),
            message_count: messages.len(),
        })
    }

    /// Fetch, classify and parse the upload, and settle its template identity.
    ///
    /// The outer `Err` is a failed parsing task; the inner one is a
    /// preparation outcome to record.
    async fn prepare(&self, submission: &Submission) -> TrackerResult<Result<Prepared, PreparationError>> {
        let bytes = match self.objects.get_file(&submission.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => return Ok(Err(e.into())),
        };

        let span = info_span!("prepare", bytes = bytes.len());
        let submission = submission.clone();
        run_blocking(move || span.in_scope(|| prepare_upload(bytes, &submission))).await
    }

    /// Mark a validated submission as accepted.
    pub async fn accept(&self, submission_id: i64) -> TrackerResult<Submission> {
        let mut submission = self.submissions.find_submission_by_id(submission_id).await?;
        self.transition(&mut submission, SubmissionStatus::Accepted).await?;
        self.logs.log(LogEntry::success("Submission accepted").for_submission(submission_id));
        Ok(submission)
    }

    /// Reject a validated or failed submission.
    pub async fn reject(&self, submission_id: i64) -> TrackerResult<Submission> {
        let mut submission = self.submissions.find_submission_by_id(submission_id).await?;
        self.transition(&mut submission, SubmissionStatus::Rejected).await?;
        self.logs.log(LogEntry::warning("Submission rejected").for_submission(submission_id));
        Ok(submission)
    }

    async fn transition(&self, submission: &mut Submission, next: SubmissionStatus) -> TrackerResult<()> {
        if !submission.status.can_transition_to(next) {
            return Err(TrackerError::InvalidTransition {
                id: submission.id,
                from: submission.status,
                to: next,
            });
        }

        self.submissions.update_submission_status(submission.id, next).await?;
        tracing::info!(submission_id = submission.id, from = %submission.status, status = %next, "Status changed");
        submission.status = next;
        Ok(())
    }

    async fn record(
        &self,
        submission_id: i64,
        class: MessageClass,
        message_type: SubmissionMessageType,
        text: &str,
    ) -> TrackerResult<()> {
        self.submissions
            .insert_submission_message(submission_id, class, message_type, text)
            .await?;
        Ok(())
    }
}

/// Parse the raw upload into worksheets and find its template identity.
fn prepare_upload(bytes: Vec<u8>, submission: &Submission) -> Result<Prepared, PreparationError> {
    let media = parser::parse_media(bytes, &submission.file_name, submission.declared_mimetype.as_deref())?
        .ok_or_else(|| PreparationError::UnsupportedFileType(submission.file_name.clone()))?;
    let set = WorksheetSet::from_media(&media)?;

    let identity = identity_from_properties(&set.custom_properties)
        .or_else(|| submission.declared_template.clone())
        .ok_or(PreparationError::MissingTemplateIdentity)?;

    tracing::debug!(
        worksheets = set.worksheets.len(),
        template = %identity.name,
        version = %identity.version,
        "Prepared submission"
    );
    Ok(Prepared { set, identity })
}

/// Run CPU-bound parsing or dispatch off the async workers.
async fn run_blocking<T, F>(f: F) -> TrackerResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

/// Messages to persist for a dispatch report.
///
/// For an invalid report every error is an ERROR and header warnings are
/// WARNINGs. For a valid report only key errors and header warnings can be
/// present; both are WARNINGs.
pub fn report_messages(report: &ValidationReport) -> Vec<(MessageClass, SubmissionMessageType, String)> {
    let error_class = if report.is_valid() {
        MessageClass::Warning
    } else {
        MessageClass::Error
    };

    let mut messages = Vec::new();
    for error in &report.media_state.file_errors {
        messages.push((MessageClass::Error, error.error_code, error.message.clone()));
    }

    for sheet in &report.csv_state {
        for error in &sheet.header_errors {
            messages.push((
                MessageClass::Error,
                error.error_code,
                format!("{}: column {}: {}", sheet.file_name, error.col, error.message),
            ));
        }
        for warning in &sheet.header_warnings {
            messages.push((
                MessageClass::Warning,
                warning.error_code,
                format!("{}: column {}: {}", sheet.file_name, warning.col, warning.message),
            ));
        }
        for error in &sheet.row_errors {
            messages.push((
                MessageClass::Error,
                error.error_code,
                format!("{}: row {}, column {}: {}", sheet.file_name, error.row, error.col, error.message),
            ));
        }
        for error in &sheet.key_errors {
            let rows: Vec<String> = error.rows.iter().map(|r| r.to_string()).collect();
            messages.push((
                error_class,
                error.error_code,
                format!("{}: rows {}: {}", sheet.file_name, rows.join(", "), error.message),
            ));
        }
    }

    messages
}

fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SubmissionMessageType as T;
    use crate::validation::{CsvState, KeyError, MediaState};

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("moose.xlsx"), "moose.xlsx");
        assert_eq!(sanitize_file_name("C:\\data\\moose.xlsx"), "moose.xlsx");
        assert_eq!(sanitize_file_name("../.."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
    }

    fn key_error() -> KeyError {
        KeyError {
            error_code: T::DanglingParentChildKey,
            message: "dangling".into(),
            col_names: vec!["KEY".into()],
            rows: vec![2, 5],
        }
    }

    #[test]
    fn test_valid_report_messages_are_warnings() {
        let mut sheet = CsvState::new("Observations");
        sheet.add_key_error(key_error());
        sheet.add_header_warning(T::MissingRecommendedHeader, "COMMENTS", "missing");
        let report = ValidationReport {
            media_state: MediaState::new("f.xlsx"),
            csv_state: vec![sheet],
        };

        let messages = report_messages(&report);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|(class, _, _)| *class == MessageClass::Warning));
        assert!(messages.iter().any(|(_, _, text)| text.contains("rows 2, 5")));
    }

    #[test]
    fn test_invalid_report_messages() {
        let mut sheet = CsvState::new("Observations");
        sheet.add_key_error(key_error());
        sheet.add_header_warning(T::MissingRecommendedHeader, "COMMENTS", "missing");
        sheet.add_row_error(T::OutOfRange, "COUNT", 3, "too big");
        let report = ValidationReport {
            media_state: MediaState::new("f.xlsx"),
            csv_state: vec![sheet],
        };

        let classes: Vec<_> = report_messages(&report).into_iter().map(|(c, t, _)| (c, t)).collect();
        assert_eq!(
            classes,
            vec![
                (MessageClass::Warning, T::MissingRecommendedHeader),
                (MessageClass::Error, T::OutOfRange),
                (MessageClass::Error, T::DanglingParentChildKey),
            ]
        );
    }
}
