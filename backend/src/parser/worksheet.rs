//! In-memory worksheet representation shared by the CSV and XLSX readers.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A single cell, typed at parse time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl CellValue {
    /// Build a text cell; blank strings become `Empty`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Numeric view of the cell. Text is parsed, dates are not numbers.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            CellValue::Empty | CellValue::Date(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => f.write_str(s.trim()),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Date(d) if d.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", d.format("%Y-%m-%d"))
            }
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

/// A data row; cells are positional and aligned with the sheet's headers.
pub type Row = Vec<CellValue>;

/// One parsed sheet: upper-cased headers plus positional rows.
#[derive(Debug, Clone, Serialize)]
pub struct Worksheet {
    pub name: String,
    /// Headers in file order, trimmed and upper-cased. Repeats are kept.
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Worksheet {
    /// Build a worksheet, normalizing headers and padding short rows.
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Row>) -> Self {
        let headers: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();

        let mut index = HashMap::with_capacity(headers.len());
        for (i, header) in headers.iter().enumerate() {
            index.entry(header.clone()).or_insert(i);
        }

        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, CellValue::Empty);
                row
            })
            .collect();

        Self {
            name: name.into(),
            headers,
            rows,
            index,
        }
    }

    /// Position of a header (case-insensitive). First occurrence wins.
    pub fn column_index(&self, header: &str) -> Option<usize> {
        self.index.get(&normalize_header(header)).copied()
    }

    pub fn has_column(&self, header: &str) -> bool {
        self.column_index(header).is_some()
    }

    /// Cell lookup by row position and header name.
    pub fn cell(&self, row: usize, header: &str) -> Option<&CellValue> {
        let col = self.column_index(header)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Spreadsheet row number of a data row (the header is row 1).
    pub fn row_number(row_index: usize) -> usize {
        row_index + 2
    }
}

/// Trim and upper-case a header name.
pub fn normalize_header(header: &str) -> String {
    header.trim().trim_start_matches('\u{feff}').trim().to_uppercase()
}

/// A file contained in a submission, as seen by the mimetype validator.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaEntry {
    pub file_name: String,
    pub mimetype: String,
}

/// All worksheets of one uploaded submission file.
#[derive(Debug, Clone, Serialize)]
pub struct WorksheetSet {
    pub file_name: String,
    pub mimetype: String,
    /// Workbook custom properties (XLSX only), e.g. `sims_name`.
    pub custom_properties: BTreeMap<String, String>,
    pub worksheets: Vec<Worksheet>,
    /// Every file in the submission: the upload itself, or each archive entry.
    pub media: Vec<MediaEntry>,
}

impl WorksheetSet {
    /// Sheet lookup by name (case-insensitive).
    pub fn worksheet(&self, name: &str) -> Option<&Worksheet> {
        self.worksheets
            .iter()
            .find(|w| w.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn custom_property(&self, key: &str) -> Option<&str> {
        self.custom_properties
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_normalized() {
        let sheet = Worksheet::new("s", vec![" name ".into(), "Count".into()], vec![]);
        assert_eq!(sheet.headers, vec!["NAME", "COUNT"]);
        assert_eq!(sheet.column_index("count"), Some(1));
        assert!(!sheet.has_column("date"));
    }

    #[test]
    fn test_short_rows_are_padded() {
        let sheet = Worksheet::new(
            "s",
            vec!["A".into(), "B".into()],
            vec![vec![CellValue::text("1")]],
        );
        assert_eq!(sheet.cell(0, "B"), Some(&CellValue::Empty));
    }

    #[test]
    fn test_first_duplicate_header_wins() {
        let sheet = Worksheet::new("s", vec!["A".into(), "a".into()], vec![]);
        assert_eq!(sheet.headers.len(), 2);
        assert_eq!(sheet.column_index("A"), Some(0));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Number(10.0).to_string(), "10");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::text("  x ").to_string(), "x");
        assert_eq!(CellValue::text("   "), CellValue::Empty);
    }

    #[test]
    fn test_as_number() {
        assert_eq!(CellValue::text("3.5").as_number(), Some(3.5));
        assert_eq!(CellValue::text("abc").as_number(), None);
        assert_eq!(CellValue::Empty.as_number(), None);
    }
}
