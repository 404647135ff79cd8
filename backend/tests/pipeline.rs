//! End-to-end submission pipeline: upload, prepare, resolve, validate, persist.

mod common;

use common::*;
use serde_json::json;
use sims_validate::api::LogLevel;
use sims_validate::models::NewSubmission;
use sims_validate::parser::media::MAX_ENTRY_BYTES;
use sims_validate::store::{SubmissionRepository, SurveyRepository};
use sims_validate::{
    MessageClass, SubmissionKind, SubmissionMessageType as T, SubmissionStatus, SurveySpecies, TemplateIdentity,
    TrackerError,
};

const SURVEY: i64 = 1;

#[tokio::test]
async fn valid_workbook_is_validated_then_accepted() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(
        MOOSE_PROPERTIES,
        &[
            effort_sheet(),
            observation_sheet(&[
                &["North", "1", "0", "2024-01-01", ""],
                &["North", "2", "10", "2024-01-02", "bull"],
            ]),
        ],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::Validated);
    assert_eq!(outcome.message_count, 0);
    assert!(outcome.report.unwrap().is_valid());

    let accepted = harness.tracker.accept(id).await.unwrap();
    assert_eq!(accepted.status, SubmissionStatus::Accepted);

    let err = harness.tracker.reject(id).await.unwrap_err();
    assert!(matches!(err, TrackerError::InvalidTransition { .. }));
}

#[tokio::test]
async fn missing_validation_schema_fails_validation_with_one_message() {
    let harness = Harness::new(&[]);
    let bytes = xlsx(MOOSE_PROPERTIES, &[effort_sheet()]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);
    assert!(outcome.report.is_none());

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::FailedGetValidationRules);
    assert_eq!(messages[0].class, MessageClass::Error);

    let stored = harness.store.find_submission_by_id(id).await.unwrap();
    assert_eq!(stored.status, SubmissionStatus::FailedValidation);
}

#[tokio::test]
async fn missing_required_header_is_reported() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(
        MOOSE_PROPERTIES,
        &[
            effort_sheet(),
            sheet(
                "Observations",
                &[&["Study Area", "Block ID", "Count"], &["North", "1", "3"]],
            ),
        ],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let report = outcome.report.unwrap();
    let observations = report
        .csv_state
        .iter()
        .find(|s| s.file_name == "Observations")
        .unwrap();
    assert_eq!(observations.header_errors.len(), 1);
    assert_eq!(observations.header_errors[0].col, "DATE");
    assert!(observations.row_errors.is_empty());

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert!(messages
        .iter()
        .any(|m| m.message_type == T::MissingRequiredHeader && m.class == MessageClass::Error));
    assert!(messages
        .iter()
        .any(|m| m.message_type == T::MissingRecommendedHeader && m.class == MessageClass::Warning));

    let rejected = harness.tracker.reject(id).await.unwrap();
    assert_eq!(rejected.status, SubmissionStatus::Rejected);
}

#[tokio::test]
async fn row_errors_become_error_messages() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(
        MOOSE_PROPERTIES,
        &[
            effort_sheet(),
            observation_sheet(&[
                &["North", "1", "11", "2024-01-01", ""],
                &["North", "2", "-1", "Jan 2", ""],
            ]),
        ],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    let types: Vec<_> = messages.iter().map(|m| m.message_type).collect();
    assert_eq!(types, vec![T::OutOfRange, T::OutOfRange, T::UnexpectedFormat]);
    assert!(messages.iter().all(|m| m.class == MessageClass::Error));
    assert!(messages[0].message.contains("row 2"));
}

#[tokio::test]
async fn dangling_key_is_a_warning_on_an_otherwise_valid_workbook() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(
        MOOSE_PROPERTIES,
        &[
            effort_sheet(),
            observation_sheet(&[
                &["North", "1", "2", "2024-01-01", ""],
                &["K1", "9", "2", "2024-01-01", ""],
            ]),
        ],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::Validated);

    let report = outcome.report.unwrap();
    let key_errors = &report.csv_state[1].key_errors;
    assert_eq!(key_errors.len(), 1);
    assert_eq!(key_errors[0].rows, vec![3]);
    assert!(key_errors[0].message.contains("K1"));

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::DanglingParentChildKey);
    assert_eq!(messages[0].class, MessageClass::Warning);
}

#[tokio::test]
async fn missing_required_sheet_skips_content() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(MOOSE_PROPERTIES, &[effort_sheet()]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let report = outcome.report.unwrap();
    assert!(!report.media_state.is_valid);
    assert!(report.csv_state.is_empty());

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::MissingRequiredFile);
}

#[tokio::test]
async fn unsupported_file_fails_preparation() {
    let harness = Harness::with_moose_template();
    let id = harness.upload(SURVEY, "report.pdf", b"%PDF-1.7\0binary".to_vec()).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedSummaryPreparation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::UnsupportedFileType);
}

#[tokio::test]
async fn workbook_without_template_properties_fails_preparation() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(&[], &[effort_sheet()]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedSummaryPreparation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages[0].message_type, T::FailedToGetTemplateNameVersion);
}

async fn assert_invalid_media(harness: &Harness, id: i64) {
    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedSummaryPreparation);
    assert!(outcome.report.is_none());

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::InvalidMedia);
    assert_eq!(messages[0].class, MessageClass::Error);

    let stored = harness.store.find_submission_by_id(id).await.unwrap();
    assert_eq!(stored.status, SubmissionStatus::FailedSummaryPreparation);
}

#[tokio::test]
async fn corrupt_workbook_is_invalid_media() {
    let harness = Harness::with_moose_template();
    let id = harness.upload(SURVEY, "moose.xlsx", b"PK\x03\x04garbage".to_vec()).await;
    assert_invalid_media(&harness, id).await;
}

#[tokio::test]
async fn declared_workbook_that_is_not_a_zip_is_invalid_media() {
    let harness = Harness::with_moose_template();
    let id = harness
        .upload_as(SURVEY, "moose.xlsx", b"Study Area,Block ID\nNorth,1\n".to_vec(), XLSX_MIMETYPE)
        .await;
    assert_invalid_media(&harness, id).await;
}

#[tokio::test]
async fn out_of_range_cell_reference_is_invalid_media() {
    let harness = Harness::with_moose_template();
    let far = r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>Study Area</t></is></c><c r="ZZZZZ1" t="inlineStr"><is><t>Block ID</t></is></c></row></sheetData></worksheet>"#;
    let bytes = xlsx_from_parts(MOOSE_PROPERTIES, &[("Effort", far.to_string())]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;
    assert_invalid_media(&harness, id).await;
}

#[tokio::test]
async fn oversized_sheet_part_is_invalid_media() {
    let harness = Harness::with_moose_template();
    let padding = " ".repeat(MAX_ENTRY_BYTES as usize + 1);
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">{}<sheetData/></worksheet>"#,
        padding
    );
    let bytes = xlsx_from_parts(MOOSE_PROPERTIES, &[("Effort", xml)]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;
    assert_invalid_media(&harness, id).await;
}

#[tokio::test]
async fn template_name_must_match_exactly() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(
        &[("sims_name", "MOOSE srb"), ("sims_version", "1.0")],
        &[effort_sheet(), observation_sheet(&[&["North", "1", "0", "2024-01-01", ""]])],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::FailedGetValidationRules);
}

#[tokio::test]
async fn csv_uses_declared_template() {
    let schema = json!({
        "files": [ {
            "name": "counts",
            "validations": [ { "file_required_columns_validator": { "required_columns": ["Count"] } } ],
            "columns": [ { "name": "Count", "validations": [ { "column_numeric_validator": {} } ] } ]
        } ]
    });
    let harness = Harness::new(&[("Counts", "2", None, schema)]);
    let identity = TemplateIdentity {
        name: "Counts".into(),
        version: "2".into(),
    };

    let id = harness
        .upload_with(SURVEY, "counts.csv", b"Count\n3\nmany\n".to_vec(), Some(identity))
        .await;
    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::InvalidValue);
    assert!(messages[0].message.contains("row 3"));
}

#[tokio::test]
async fn missing_object_fails_preparation() {
    let harness = Harness::with_moose_template();
    let submission = harness
        .store
        .create_submission(NewSubmission {
            survey_id: SURVEY,
            kind: SubmissionKind::Summary,
            file_name: "gone.xlsx".into(),
            storage_key: "surveys/1/gone.xlsx".into(),
            declared_mimetype: None,
            declared_template: None,
        })
        .await
        .unwrap();

    let outcome = harness.tracker.validate_file(submission.id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedSummaryPreparation);

    let messages = harness.store.get_submission_messages(submission.id).await.unwrap();
    assert_eq!(messages[0].message_type, T::FailedGetFileFromStorage);
}

#[tokio::test]
async fn species_specific_template_must_match_survey() {
    let harness = Harness::new(&[("Moose SRB", "1.0", Some(2065), moose_schema())]);
    harness
        .store
        .set_species_data(
            SURVEY,
            SurveySpecies {
                focal_species: vec![4000],
                ancillary_species: vec![],
            },
        )
        .await
        .unwrap();

    let bytes = xlsx(MOOSE_PROPERTIES, &[effort_sheet()]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::MismatchedTemplateSurveySpecies);
}

#[tokio::test]
async fn ancillary_species_do_not_select_the_template() {
    let harness = Harness::new(&[("Moose SRB", "1.0", Some(2065), moose_schema())]);
    harness
        .store
        .set_species_data(
            SURVEY,
            SurveySpecies {
                focal_species: vec![4000],
                ancillary_species: vec![2065],
            },
        )
        .await
        .unwrap();

    let bytes = xlsx(
        MOOSE_PROPERTIES,
        &[effort_sheet(), observation_sheet(&[&["North", "1", "1", "2024-02-01", ""]])],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::FailedValidation);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::MismatchedTemplateSurveySpecies);
}

#[tokio::test]
async fn focal_species_select_the_template() {
    let harness = Harness::new(&[("Moose SRB", "1.0", Some(2065), moose_schema())]);
    harness
        .store
        .set_species_data(
            SURVEY,
            SurveySpecies {
                focal_species: vec![4000, 2065],
                ancillary_species: vec![],
            },
        )
        .await
        .unwrap();

    let bytes = xlsx(
        MOOSE_PROPERTIES,
        &[effort_sheet(), observation_sheet(&[&["North", "1", "1", "2024-02-01", ""]])],
    );
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::Validated);
}

#[tokio::test]
async fn submission_runs_only_once() {
    let harness = Harness::with_moose_template();
    let bytes = xlsx(MOOSE_PROPERTIES, &[effort_sheet()]);
    let id = harness.upload(SURVEY, "moose.xlsx", bytes).await;

    harness.tracker.validate_file(id, SURVEY).await.unwrap();
    let err = harness.tracker.validate_file(id, SURVEY).await.unwrap_err();
    assert!(matches!(err, TrackerError::InvalidTransition { .. }));

    let err = harness.tracker.accept(id).await.unwrap_err();
    assert!(matches!(err, TrackerError::InvalidTransition { .. }));
}

#[tokio::test]
async fn submission_must_belong_to_survey() {
    let harness = Harness::with_moose_template();
    let id = harness.upload(SURVEY, "moose.xlsx", xlsx(MOOSE_PROPERTIES, &[])).await;

    let err = harness.tracker.validate_file(id, SURVEY + 1).await.unwrap_err();
    assert!(matches!(err, TrackerError::SurveyMismatch { .. }));

    let stored = harness.store.find_submission_by_id(id).await.unwrap();
    assert_eq!(stored.status, SubmissionStatus::Uploaded);
}

#[tokio::test]
async fn progress_is_broadcast() {
    let harness = Harness::new(&[]);
    let mut rx = harness.logs.subscribe();

    let id = harness.upload(SURVEY, "moose.xlsx", xlsx(MOOSE_PROPERTIES, &[])).await;
    harness.tracker.validate_file(id, SURVEY).await.unwrap();

    let mut levels = Vec::new();
    while let Ok(entry) = rx.try_recv() {
        assert_eq!(entry.submission_id, Some(id));
        levels.push(entry.level);
    }
    assert_eq!(levels.first(), Some(&LogLevel::Info));
    assert_eq!(levels.last(), Some(&LogLevel::Error));
}

#[tokio::test]
async fn archive_of_csv_files_is_validated_as_a_workbook() {
    use std::io::{Cursor, Write};

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("Effort.csv", options).unwrap();
    writer.write_all(b"Study Area,Block ID\nNorth,1\n").unwrap();
    writer.start_file("Observations.csv", options).unwrap();
    writer
        .write_all(b"Study Area,Block ID,Count,Date,Comments\nNorth,1,4,2024-03-01,\nSouth,7,4,2024-03-01,\n")
        .unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let harness = Harness::with_moose_template();
    let identity = TemplateIdentity {
        name: "Moose SRB".into(),
        version: "1.0".into(),
    };
    let id = harness.upload_with(SURVEY, "moose.zip", bytes, Some(identity)).await;

    let outcome = harness.tracker.validate_file(id, SURVEY).await.unwrap();
    assert_eq!(outcome.status, SubmissionStatus::Validated);

    let messages = harness.store.get_submission_messages(id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, T::DanglingParentChildKey);
    assert!(messages[0].message.contains("rows 3"));
}
