//! Validation result objects.

use serde::Serialize;

use crate::models::SubmissionMessageType;

/// File-level problem (mimetype, missing file, ...).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaError {
    pub error_code: SubmissionMessageType,
    pub message: String,
}

/// Problem with a sheet's header row.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeaderError {
    pub error_code: SubmissionMessageType,
    pub message: String,
    pub col: String,
}

/// Problem with a single cell. `row` is the spreadsheet row number.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RowError {
    pub error_code: SubmissionMessageType,
    pub message: String,
    pub col: String,
    pub row: usize,
}

/// Problem with a key spanning rows or sheets.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeyError {
    pub error_code: SubmissionMessageType,
    pub message: String,
    pub col_names: Vec<String>,
    pub rows: Vec<usize>,
}

/// Verdict for the submission as a file (or archive of files).
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    pub file_name: String,
    pub file_errors: Vec<MediaError>,
    pub is_valid: bool,
}

impl MediaState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            file_errors: Vec::new(),
            is_valid: true,
        }
    }

    pub fn add_error(&mut self, error_code: SubmissionMessageType, message: impl Into<String>) {
        self.file_errors.push(MediaError {
            error_code,
            message: message.into(),
        });
        self.is_valid = false;
    }
}

/// Verdict for one worksheet.
///
/// `is_valid` reflects header and row errors only. Header warnings
/// (recommended columns) and workbook-scoped key errors are reported
/// alongside but never flip it.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CsvState {
    pub file_name: String,
    pub header_errors: Vec<HeaderError>,
    pub header_warnings: Vec<HeaderError>,
    pub row_errors: Vec<RowError>,
    pub key_errors: Vec<KeyError>,
    pub is_valid: bool,
}

impl CsvState {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            header_errors: Vec::new(),
            header_warnings: Vec::new(),
            row_errors: Vec::new(),
            key_errors: Vec::new(),
            is_valid: true,
        }
    }

    pub fn add_header_error(&mut self, error_code: SubmissionMessageType, col: impl Into<String>, message: impl Into<String>) {
        self.header_errors.push(HeaderError {
            error_code,
            message: message.into(),
            col: col.into(),
        });
        self.is_valid = false;
    }

    pub fn add_header_warning(&mut self, error_code: SubmissionMessageType, col: impl Into<String>, message: impl Into<String>) {
        self.header_warnings.push(HeaderError {
            error_code,
            message: message.into(),
            col: col.into(),
        });
    }

    pub fn add_row_error(
        &mut self,
        error_code: SubmissionMessageType,
        col: impl Into<String>,
        row: usize,
        message: impl Into<String>,
    ) {
        self.row_errors.push(RowError {
            error_code,
            message: message.into(),
            col: col.into(),
            row,
        });
        self.is_valid = false;
    }

    pub fn add_key_error(&mut self, error: KeyError) {
        self.key_errors.push(error);
    }

    pub fn has_header_errors(&self) -> bool {
        !self.header_errors.is_empty()
    }
}

/// Full result of one validation run.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ValidationReport {
    pub media_state: MediaState,
    pub csv_state: Vec<CsvState>,
}

impl ValidationReport {
    /// Valid iff the media state and every sheet state are valid.
    pub fn is_valid(&self) -> bool {
        self.media_state.is_valid && self.csv_state.iter().all(|s| s.is_valid)
    }

    /// Total number of errors and warnings of every kind.
    pub fn issue_count(&self) -> usize {
        self.media_state.file_errors.len()
            + self
                .csv_state
                .iter()
                .map(|s| s.header_errors.len() + s.header_warnings.len() + s.row_errors.len() + s.key_errors.len())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_and_key_errors_keep_sheet_valid() {
        let mut state = CsvState::new("s");
        state.add_header_warning(SubmissionMessageType::MissingRecommendedHeader, "X", "missing");
        state.add_key_error(KeyError {
            error_code: SubmissionMessageType::DanglingParentChildKey,
            message: "dangling".into(),
            col_names: vec!["K".into()],
            rows: vec![2],
        });
        assert!(state.is_valid);

        state.add_row_error(SubmissionMessageType::InvalidValue, "C", 3, "bad");
        assert!(!state.is_valid);
    }

    #[test]
    fn test_report_validity() {
        let mut report = ValidationReport {
            media_state: MediaState::new("f.xlsx"),
            csv_state: vec![CsvState::new("a"), CsvState::new("b")],
        };
        assert!(report.is_valid());

        report.csv_state[1].add_header_error(SubmissionMessageType::DuplicateHeader, "A", "dup");
        assert!(!report.is_valid());
        assert_eq!(report.issue_count(), 1);
    }
}
