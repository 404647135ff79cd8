//! File-level row validators.

use std::collections::HashMap;

use crate::models::SubmissionMessageType;
use crate::parser::{normalize_header, Worksheet};
use crate::schema::ColumnUniqueConfig;

use super::state::CsvState;

/// Composite key of a row, `|` joined. `None` when every part is empty.
pub(crate) fn row_key(sheet: &Worksheet, row: usize, columns: &[String]) -> Option<String> {
    let parts: Vec<String> = columns
        .iter()
        .map(|c| sheet.cell(row, c).map(|v| v.to_string()).unwrap_or_default())
        .collect();

    if parts.iter().all(|p| p.is_empty()) {
        None
    } else {
        Some(parts.join("|"))
    }
}

/// Each key built from `column_names` must be unique across the sheet.
///
/// Every repeat is a row error pointing back to the first row holding the
/// key. Skipped when any key column is absent from the sheet.
pub fn column_unique(sheet: &Worksheet, config: &ColumnUniqueConfig, state: &mut CsvState) {
    if config.column_names.is_empty() || !config.column_names.iter().all(|c| sheet.has_column(c)) {
        return;
    }

    let col = config
        .column_names
        .iter()
        .map(|c| normalize_header(c))
        .collect::<Vec<_>>()
        .join(", ");

    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for row in 0..sheet.rows.len() {
        let Some(key) = row_key(sheet, row, &config.column_names) else {
            continue;
        };
        let row_number = Worksheet::row_number(row);

        match first_seen.get(&key) {
            Some(first) => state.add_row_error(
                SubmissionMessageType::NonUniqueKey,
                col.clone(),
                row_number,
                format!("Duplicate key {} in columns [{}], first seen on row {}", key, col, first),
            ),
            None => {
                first_seen.insert(key, row_number);
            }
        }
    }
}
