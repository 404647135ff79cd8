//! Workbook validators: rules spanning several sheets.

use std::collections::HashSet;

use crate::models::SubmissionMessageType;
use crate::parser::{normalize_header, Worksheet};
use crate::schema::ParentChildKeyMatchConfig;

use super::file::row_key;
use super::state::KeyError;

/// Every key tuple in the child sheet must exist in the parent sheet.
///
/// Returns one error per dangling tuple, listing every child row holding
/// it, in first-seen order. Rows with a blank key are ignored.
pub fn parent_child_key_match(
    parent: &Worksheet,
    child: &Worksheet,
    config: &ParentChildKeyMatchConfig,
) -> Vec<KeyError> {
    let columns = &config.column_names;
    if columns.is_empty() {
        return Vec::new();
    }

    let parent_keys: HashSet<String> = (0..parent.rows.len())
        .filter_map(|row| row_key(parent, row, columns))
        .collect();

    // (key, rows) in first-seen order
    let mut dangling: Vec<(String, Vec<usize>)> = Vec::new();
    for row in 0..child.rows.len() {
        let Some(key) = row_key(child, row, columns) else {
            continue;
        };
        if parent_keys.contains(&key) {
            continue;
        }
        let row_number = Worksheet::row_number(row);
        match dangling.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(row_number),
            None => dangling.push((key, vec![row_number])),
        }
    }

    let col_names: Vec<String> = columns.iter().map(|c| normalize_header(c)).collect();
    dangling
        .into_iter()
        .map(|(key, rows)| KeyError {
            error_code: SubmissionMessageType::DanglingParentChildKey,
            message: format!(
                "{} key [{}] has no matching row in {}",
                child.name, key, parent.name
            ),
            col_names: col_names.clone(),
            rows,
        })
        .collect()
}
