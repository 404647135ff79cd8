//! Schema-driven validation of worksheet sets.
//!
//! Validators run in four scopes, each in declared order and without
//! short-circuiting inside a scope:
//!
//! | Scope      | Runs against        | Result          |
//! |------------|---------------------|-----------------|
//! | submission | the uploaded media  | [`MediaState`]  |
//! | header     | each sheet's header | [`CsvState`]    |
//! | row/file   | each sheet's rows   | [`CsvState`]    |
//! | workbook   | pairs of sheets     | child [`CsvState`] |
//!
//! Row validators are skipped for a sheet with header errors, and content
//! validation is skipped entirely when the media itself is invalid.
//!
//! # Example
//!
//! ```rust,ignore
//! use sims_validate::{parser, schema::ValidationSchemaParser, validation};
//!
//! let media = parser::parse_media(bytes, "Observations.csv", None)?.unwrap();
//! let set = parser::read_worksheets(&media)?;
//! let schema = ValidationSchemaParser::from_str(&json)?;
//!
//! let report = validation::validate_submission(&set, &schema);
//! assert!(report.is_valid());
//! ```

pub mod column;
pub mod file;
pub mod header;
pub mod state;
pub mod submission;
pub mod workbook;

pub use state::{CsvState, HeaderError, KeyError, MediaError, MediaState, RowError, ValidationReport};

use crate::parser::{CellValue, Worksheet, WorksheetSet};
use crate::schema::{FileValidator, SubmissionValidator, ValidationSchemaParser, WorkbookValidator};

use column::CellRef;

/// Run the submission-level validators.
pub fn validate_media(set: &WorksheetSet, parser: &ValidationSchemaParser) -> MediaState {
    let mut state = MediaState::new(&set.file_name);

    for validator in parser.submission_validators() {
        match validator {
            SubmissionValidator::RequiredFiles(config) => submission::required_files(set, config, &mut state),
            SubmissionValidator::Mimetype(config) => submission::mimetype(set, config, parser, &mut state),
        }
    }

    state
}

/// Validate one sheet: header validators, then (with a clean header) the
/// column validators and the uniqueness checks.
pub fn validate_worksheet(sheet: &Worksheet, parser: &ValidationSchemaParser) -> CsvState {
    let mut state = CsvState::new(&sheet.name);
    let file_validators = parser.file_validators(&sheet.name);

    for validator in file_validators.iter().filter(|v| v.is_header_validator()) {
        match validator {
            FileValidator::RequiredColumns(config) => header::required_columns(sheet, config, &mut state),
            FileValidator::RecommendedColumns(config) => header::recommended_columns(sheet, config, &mut state),
            FileValidator::DuplicateColumns(_) => header::duplicate_columns(sheet, &mut state),
            FileValidator::ValidColumns(config) => header::valid_columns(sheet, config, &mut state),
            FileValidator::ColumnUnique(_) => {}
        }
    }

    if state.has_header_errors() {
        return state;
    }

    validate_rows(sheet, parser, &mut state);

    for validator in file_validators {
        if let FileValidator::ColumnUnique(config) = validator {
            file::column_unique(sheet, config, &mut state);
        }
    }

    state
}

/// Row-major pass over the configured columns present in the sheet.
fn validate_rows(sheet: &Worksheet, parser: &ValidationSchemaParser, state: &mut CsvState) {
    let columns: Vec<(usize, String, &[crate::schema::ColumnValidator])> = parser
        .file_columns(&sheet.name)
        .iter()
        .filter(|c| !c.validations.is_empty())
        .filter_map(|c| {
            sheet
                .column_index(&c.name)
                .map(|idx| (idx, sheet.headers[idx].clone(), c.validations.as_slice()))
        })
        .collect();

    if columns.is_empty() {
        return;
    }

    for (row_index, row) in sheet.rows.iter().enumerate() {
        let row_number = Worksheet::row_number(row_index);
        for (idx, col, validators) in &columns {
            let cell = row.get(*idx).unwrap_or(&CellValue::Empty);
            let at = CellRef { col, row: row_number };
            for validator in validators.iter() {
                column::check_cell(validator, cell, at, parser, state);
            }
        }
    }
}

/// Validate every sheet, then apply the workbook validators.
///
/// States come back in worksheet order. Workbook validators whose sheets
/// are missing are skipped; the required-files validator reports those.
pub fn validate_content(set: &WorksheetSet, parser: &ValidationSchemaParser) -> Vec<CsvState> {
    let mut states: Vec<CsvState> = set
        .worksheets
        .iter()
        .map(|sheet| validate_worksheet(sheet, parser))
        .collect();

    for validator in parser.workbook_validators() {
        match validator {
            WorkbookValidator::ParentChildKeyMatch(config) => {
                let child = set
                    .worksheets
                    .iter()
                    .position(|w| w.name.trim().eq_ignore_ascii_case(config.child_worksheet_name.trim()));
                let parent = set.worksheet(&config.parent_worksheet_name);

                if let (Some(child), Some(parent)) = (child, parent) {
                    let errors = workbook::parent_child_key_match(parent, &set.worksheets[child], config);
                    for error in errors {
                        states[child].add_key_error(error);
                    }
                }
            }
        }
    }

    states
}

/// Full validation run: media first, content only if the media is valid.
pub fn validate_submission(set: &WorksheetSet, parser: &ValidationSchemaParser) -> ValidationReport {
    let media_state = validate_media(set, parser);
    let csv_state = if media_state.is_valid {
        validate_content(set, parser)
    } else {
        Vec::new()
    };

    ValidationReport { media_state, csv_state }
}
