//! Column validators. Each one looks at a single cell.

use crate::models::SubmissionMessageType;
use crate::parser::CellValue;
use crate::schema::{CodeConfig, ColumnValidator, FormatConfig, RangeConfig, ValidationSchemaParser};

use super::state::CsvState;

/// Location of the cell under test.
#[derive(Debug, Clone, Copy)]
pub struct CellRef<'a> {
    pub col: &'a str,
    /// Spreadsheet row number.
    pub row: usize,
}

/// Run one column validator against one cell.
///
/// Empty cells are only seen by the required validator.
pub fn check_cell(
    validator: &ColumnValidator,
    cell: &CellValue,
    at: CellRef<'_>,
    parser: &ValidationSchemaParser,
    state: &mut CsvState,
) {
    if cell.is_empty() {
        if let ColumnValidator::Required(_) = validator {
            state.add_row_error(
                SubmissionMessageType::MissingRequiredField,
                at.col,
                at.row,
                format!("Missing required value for column {}", at.col),
            );
        }
        return;
    }

    match validator {
        ColumnValidator::Required(_) => {}
        ColumnValidator::Format(config) => check_format(config, cell, at, parser, state),
        ColumnValidator::Numeric(_) => {
            if cell.as_number().is_none() {
                state.add_row_error(
                    SubmissionMessageType::InvalidValue,
                    at.col,
                    at.row,
                    format!("Invalid value: {}. Must be a number", cell),
                );
            }
        }
        ColumnValidator::Range(config) => check_range(config, cell, at, state),
        ColumnValidator::Code(config) => check_code(config, cell, at, state),
    }
}

fn check_format(
    config: &FormatConfig,
    cell: &CellValue,
    at: CellRef<'_>,
    parser: &ValidationSchemaParser,
    state: &mut CsvState,
) {
    // Patterns are compiled with the schema; a miss means a parser built
    // from a different schema, which matches nothing.
    let matched = parser
        .regex(&config.reg_exp, config.reg_exp_flags.as_deref())
        .map(|re| re.is_match(&cell.to_string()))
        .unwrap_or(false);

    if !matched {
        let message = match &config.expected_format {
            Some(expected) => format!("Unexpected format: {}. {}", cell, expected),
            None => format!("Unexpected format: {}. Must match {}", cell, config.reg_exp),
        };
        state.add_row_error(SubmissionMessageType::UnexpectedFormat, at.col, at.row, message);
    }
}

fn check_range(config: &RangeConfig, cell: &CellValue, at: CellRef<'_>, state: &mut CsvState) {
    let Some(value) = cell.as_number() else {
        state.add_row_error(
            SubmissionMessageType::InvalidValue,
            at.col,
            at.row,
            format!("Invalid value: {}. Must be a number", cell),
        );
        return;
    };

    let below = config.min_value.is_some_and(|min| value < min);
    let above = config.max_value.is_some_and(|max| value > max);
    if !below && !above {
        return;
    }

    let bounds = match (config.min_value, config.max_value) {
        (Some(min), Some(max)) => format!("between {} and {}", min, max),
        (Some(min), None) => format!("greater than or equal to {}", min),
        (None, Some(max)) => format!("less than or equal to {}", max),
        (None, None) => return,
    };
    state.add_row_error(
        SubmissionMessageType::OutOfRange,
        at.col,
        at.row,
        format!("Value {} is out of range. Must be {}", cell, bounds),
    );
}

fn check_code(config: &CodeConfig, cell: &CellValue, at: CellRef<'_>, state: &mut CsvState) {
    let value = cell.to_string();
    if config.allowed_code_values.iter().any(|code| code.name.to_string() == value) {
        return;
    }

    let allowed: Vec<String> = config.allowed_code_values.iter().map(|c| c.name.to_string()).collect();
    state.add_row_error(
        SubmissionMessageType::InvalidValue,
        at.col,
        at.row,
        format!("Invalid value: {}. Must be one of [{}]", value, allowed.join(", ")),
    );
}
