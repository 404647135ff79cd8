//! Header validators. These only look at a sheet's header row.

use std::collections::HashSet;

use crate::models::SubmissionMessageType;
use crate::parser::{normalize_header, Worksheet};
use crate::schema::{RecommendedColumnsConfig, RequiredColumnsConfig, ValidColumnsConfig};

use super::state::CsvState;

/// Every required column must be present (case-insensitive).
pub fn required_columns(sheet: &Worksheet, config: &RequiredColumnsConfig, state: &mut CsvState) {
    for column in &config.required_columns {
        if !sheet.has_column(column) {
            let col = normalize_header(column);
            state.add_header_error(
                SubmissionMessageType::MissingRequiredHeader,
                col.clone(),
                format!("Missing required header: {}", col),
            );
        }
    }
}

/// Missing recommended columns are warnings only.
pub fn recommended_columns(sheet: &Worksheet, config: &RecommendedColumnsConfig, state: &mut CsvState) {
    for column in &config.recommended_columns {
        if !sheet.has_column(column) {
            let col = normalize_header(column);
            state.add_header_warning(
                SubmissionMessageType::MissingRecommendedHeader,
                col.clone(),
                format!("Missing recommended header: {}", col),
            );
        }
    }
}

/// No header may appear twice. Each repeated name is reported once.
pub fn duplicate_columns(sheet: &Worksheet, state: &mut CsvState) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();

    for header in sheet.headers.iter().filter(|h| !h.is_empty()) {
        if !seen.insert(header.as_str()) && reported.insert(header.as_str()) {
            state.add_header_error(
                SubmissionMessageType::DuplicateHeader,
                header.clone(),
                format!("Duplicate header: {}", header),
            );
        }
    }
}

/// Every header must be in the allow-list.
pub fn valid_columns(sheet: &Worksheet, config: &ValidColumnsConfig, state: &mut CsvState) {
    let allowed: HashSet<String> = config.valid_columns.iter().map(|c| normalize_header(c)).collect();
    let mut reported = HashSet::new();

    for header in sheet.headers.iter().filter(|h| !h.is_empty()) {
        if !allowed.contains(header) && reported.insert(header.as_str()) {
            state.add_header_error(
                SubmissionMessageType::UnknownHeader,
                header.clone(),
                format!("Unsupported header: {}", header),
            );
        }
    }
}
