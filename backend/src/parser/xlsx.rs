//! XLSX reader.
//!
//! An XLSX workbook is a zip of XML parts. We read:
//!
//! | Part                          | Used for                              |
//! |-------------------------------|---------------------------------------|
//! | `docProps/custom.xml`         | custom properties (`sims_name`, ...)  |
//! | `xl/workbook.xml`             | sheet names, order, 1904 date system  |
//! | `xl/_rels/workbook.xml.rels`  | sheet name -> part path               |
//! | `xl/sharedStrings.xml`        | shared string table                   |
//! | `xl/styles.xml`               | which cell styles are dates           |
//! | `xl/worksheets/*.xml`         | cell data                             |
//!
//! The first non-empty row of a sheet is its header row.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;

use crate::error::{MediaParseError, MediaResult};

use super::media::{read_limited, MediaFile, MAX_ENTRY_BYTES};
use super::worksheet::{CellValue, Worksheet};

/// Workbook contents relevant to validation.
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    pub custom_properties: BTreeMap<String, String>,
    pub worksheets: Vec<Worksheet>,
}

type Archive<'a> = zip::ZipArchive<Cursor<&'a [u8]>>;

/// Read every sheet and the custom properties of an XLSX media file.
pub fn parse_xlsx(media: &MediaFile) -> MediaResult<XlsxWorkbook> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(media.buffer.as_slice())).map_err(|e| MediaParseError::Archive(e.to_string()))?;

    let custom_properties = match read_part(&mut archive, "docProps/custom.xml")? {
        Some(xml) => parse_custom_properties(&xml)?,
        None => BTreeMap::new(),
    };

    let workbook_xml = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| MediaParseError::MissingPart("xl/workbook.xml".into()))?;
    let workbook = parse_workbook(&workbook_xml)?;

    let rels = match read_part(&mut archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    let shared_strings = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let date_styles = match read_part(&mut archive, "xl/styles.xml")? {
        Some(xml) => parse_date_styles(&xml)?,
        None => Vec::new(),
    };

    let context = SheetContext {
        shared_strings: &shared_strings,
        date_styles: &date_styles,
        date_1904: workbook.date_1904,
    };

    let mut worksheets = Vec::with_capacity(workbook.sheets.len());
    for (index, sheet) in workbook.sheets.iter().enumerate() {
        let path = rels
            .get(&sheet.rel_id)
            .map(|target| resolve_target(target))
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1));

        let xml = read_part(&mut archive, &path)?.ok_or_else(|| MediaParseError::MissingPart(path.clone()))?;
        worksheets.push(parse_sheet(&sheet.name, &path, &xml, &context)?);
    }

    Ok(XlsxWorkbook {
        custom_properties,
        worksheets,
    })
}

fn read_part(archive: &mut Archive<'_>, name: &str) -> MediaResult<Option<String>> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(MediaParseError::Archive(format!("{}: {}", name, e))),
    };

    let bytes = read_limited(&mut file, name, MAX_ENTRY_BYTES)?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|e| MediaParseError::Archive(format!("{}: {}", name, e)))
}

/// Relationship targets are relative to `xl/` unless absolute.
fn resolve_target(target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("xl/{}", target.trim_start_matches("./")),
    }
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> MediaParseError {
    MediaParseError::Xml {
        part: part.to_string(),
        message: e.to_string(),
    }
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

// =============================================================================
// Workbook-level parts
// =============================================================================

fn parse_custom_properties(xml: &str) -> MediaResult<BTreeMap<String, String>> {
    const PART: &str = "docProps/custom.xml";
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut props = BTreeMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"property" => {
                current = attr(e, b"name");
            }
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"property" => {
                current = None;
            }
            Ok(Event::Text(e)) => {
                if let Some(name) = &current {
                    let value = e.unescape().map_err(|e| xml_error(PART, e))?;
                    props.entry(name.clone()).or_insert_with(String::new).push_str(&value);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PART, e)),
            _ => {}
        }
    }

    Ok(props)
}

struct SheetRef {
    name: String,
    rel_id: String,
}

struct WorkbookInfo {
    sheets: Vec<SheetRef>,
    date_1904: bool,
}

fn parse_workbook(xml: &str) -> MediaResult<WorkbookInfo> {
    const PART: &str = "xl/workbook.xml";
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut info = WorkbookInfo {
        sheets: Vec::new(),
        date_1904: false,
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr(e, b"name").unwrap_or_default();
                    let rel_id = attr(e, b"id").unwrap_or_default();
                    info.sheets.push(SheetRef { name, rel_id });
                }
                b"workbookPr" => {
                    info.date_1904 = matches!(attr(e, b"date1904").as_deref(), Some("1") | Some("true"));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PART, e)),
            _ => {}
        }
    }

    Ok(info)
}

fn parse_relationships(xml: &str) -> MediaResult<HashMap<String, String>> {
    const PART: &str = "xl/_rels/workbook.xml.rels";
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut rels = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                    rels.insert(id, target);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PART, e)),
            _ => {}
        }
    }

    Ok(rels)
}

fn parse_shared_strings(xml: &str) -> MediaResult<Vec<String>> {
    const PART: &str = "xl/sharedStrings.xml";
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {}
            },
            Ok(Event::Text(e)) if in_item && in_text && !in_phonetic => {
                current.push_str(&e.unescape().map_err(|e| xml_error(PART, e))?);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PART, e)),
            _ => {}
        }
    }

    Ok(strings)
}

/// Built-in number formats that render as dates or times.
fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// A custom format is a date if it uses date/time tokens outside quotes and brackets.
fn is_date_format_code(code: &str) -> bool {
    let mut in_quotes = false;
    let mut in_brackets = false;
    let mut escaped = false;

    for c in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => in_brackets = true,
            ']' if !in_quotes => in_brackets = false,
            'd' | 'D' | 'm' | 'M' | 'y' | 'Y' | 'h' | 'H' | 's' | 'S' if !in_quotes && !in_brackets => {
                return true;
            }
            _ => {}
        }
    }
    false
}

/// For each entry of `cellXfs`, whether it formats its value as a date.
fn parse_date_styles(xml: &str) -> MediaResult<Vec<bool>> {
    const PART: &str = "xl/styles.xml";
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut custom_formats: HashMap<u32, bool> = HashMap::new();
    let mut styles = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"numFmt" => {
                    if let (Some(id), Some(code)) = (attr(e, b"numFmtId"), attr(e, b"formatCode")) {
                        if let Ok(id) = id.parse::<u32>() {
                            custom_formats.insert(id, is_date_format_code(&code));
                        }
                    }
                }
                b"cellXfs" => in_cell_xfs = true,
                b"xf" if in_cell_xfs => {
                    let id = attr(e, b"numFmtId").and_then(|v| v.parse::<u32>().ok()).unwrap_or(0);
                    let is_date = custom_formats
                        .get(&id)
                        .copied()
                        .unwrap_or_else(|| is_builtin_date_format(id));
                    styles.push(is_date);
                }
                _ => {}
            },
            Ok(Event::End(ref e)) if e.local_name().as_ref() == b"cellXfs" => in_cell_xfs = false,
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(PART, e)),
            _ => {}
        }
    }

    Ok(styles)
}

// =============================================================================
// Sheets
// =============================================================================

struct SheetContext<'a> {
    shared_strings: &'a [String],
    date_styles: &'a [bool],
    date_1904: bool,
}

/// Last column a worksheet can address (`XFD`).
const MAX_COLUMN: usize = 16_383;

fn out_of_range(part: &str, reference: &str) -> MediaParseError {
    MediaParseError::CellReference {
        part: part.to_string(),
        reference: reference.to_string(),
    }
}

/// Column index (0-based) from a cell reference such as `AB12`.
///
/// `Ok(None)` when the reference has no column letters.
fn column_from_ref(part: &str, cell_ref: &str) -> MediaResult<Option<usize>> {
    let mut col = 0usize;
    let mut letters = 0;
    for c in cell_ref.chars().take_while(char::is_ascii_alphabetic) {
        letters += 1;
        let digit = (c.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        col = col
            .checked_mul(26)
            .and_then(|v| v.checked_add(digit))
            .filter(|v| letters <= 3 && v - 1 <= MAX_COLUMN)
            .ok_or_else(|| out_of_range(part, cell_ref))?;
    }
    Ok((letters > 0).then(|| col - 1))
}

/// Convert an Excel serial date to a timestamp.
pub fn excel_serial_to_datetime(serial: f64, date_1904: bool) -> Option<NaiveDateTime> {
    // 2958465 is 9999-12-31, the last date Excel can represent.
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let base = if date_1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else {
        // 1899-12-30 absorbs the phantom 1900-02-29 for every serial after it.
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    base.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::days(days))?
        .checked_add_signed(Duration::seconds(seconds))
}

#[derive(Default)]
struct PendingCell {
    col: usize,
    cell_type: String,
    style: usize,
    raw: String,
}

fn finish_cell(cell: &PendingCell, ctx: &SheetContext<'_>) -> CellValue {
    let raw = cell.raw.as_str();
    match cell.cell_type.as_str() {
        "s" => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| ctx.shared_strings.get(i))
            .map(|s| CellValue::text(s.clone()))
            .unwrap_or(CellValue::Empty),
        "inlineStr" | "str" | "e" => CellValue::text(raw),
        "b" => CellValue::text(if raw.trim() == "1" { "TRUE" } else { "FALSE" }),
        "d" => chrono::DateTime::parse_from_rfc3339(raw.trim())
            .map(|d| d.naive_utc())
            .or_else(|_| NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%dT%H:%M:%S"))
            .or_else(|_| {
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
            })
            .map(CellValue::Date)
            .unwrap_or_else(|_| CellValue::text(raw)),
        _ => match raw.trim().parse::<f64>() {
            Ok(n) if ctx.date_styles.get(cell.style).copied().unwrap_or(false) => {
                excel_serial_to_datetime(n, ctx.date_1904)
                    .map(CellValue::Date)
                    .unwrap_or(CellValue::Number(n))
            }
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::text(raw),
        },
    }
}

fn parse_sheet(name: &str, part: &str, xml: &str, ctx: &SheetContext<'_>) -> MediaResult<Worksheet> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut grid: Vec<BTreeMap<usize, CellValue>> = Vec::new();
    let mut row: Option<BTreeMap<usize, CellValue>> = None;
    let mut cell: Option<PendingCell> = None;
    let mut next_col = 0usize;
    let mut in_value = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"row" => {
                    row = Some(BTreeMap::new());
                    next_col = 0;
                }
                b"c" => cell = Some(start_cell(part, e, &mut next_col)?),
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"row" => grid.push(BTreeMap::new()),
                b"c" => {
                    start_cell(part, e, &mut next_col)?;
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_value => {
                if let Some(c) = cell.as_mut() {
                    c.raw.push_str(&e.unescape().map_err(|e| xml_error(part, e))?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let (Some(c), Some(r)) = (cell.take(), row.as_mut()) {
                        let value = finish_cell(&c, ctx);
                        if !value.is_empty() {
                            r.insert(c.col, value);
                        }
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        grid.push(r);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
    }

    Ok(grid_to_worksheet(name, grid))
}

fn start_cell(part: &str, e: &BytesStart<'_>, next_col: &mut usize) -> MediaResult<PendingCell> {
    let reference = attr(e, b"r");
    let col = match &reference {
        Some(r) => column_from_ref(part, r)?.unwrap_or(*next_col),
        None => *next_col,
    };
    if col > MAX_COLUMN {
        let reference = reference.unwrap_or_else(|| format!("column {}", col + 1));
        return Err(out_of_range(part, &reference));
    }

    *next_col = col + 1;
    Ok(PendingCell {
        col,
        cell_type: attr(e, b"t").unwrap_or_default(),
        style: attr(e, b"s").and_then(|s| s.parse().ok()).unwrap_or(0),
        raw: String::new(),
    })
}

fn grid_to_worksheet(name: &str, grid: Vec<BTreeMap<usize, CellValue>>) -> Worksheet {
    let mut rows = grid.into_iter().filter(|r| !r.is_empty());

    let header_row = match rows.next() {
        Some(r) => r,
        None => return Worksheet::new(name, Vec::new(), Vec::new()),
    };

    let width = header_row.keys().next_back().map(|c| c + 1).unwrap_or(0);
    let headers: Vec<String> = (0..width)
        .map(|i| header_row.get(&i).map(|v| v.to_string()).unwrap_or_default())
        .collect();

    let data = rows
        .map(|r| {
            (0..width)
                .map(|i| r.get(&i).cloned().unwrap_or(CellValue::Empty))
                .collect::<Vec<_>>()
        })
        .filter(|r| r.iter().any(|c| !c.is_empty()))
        .collect();

    Worksheet::new(name, headers, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_from_ref() {
        let col = |r: &str| column_from_ref("sheet1.xml", r).unwrap();
        assert_eq!(col("A1"), Some(0));
        assert_eq!(col("Z9"), Some(25));
        assert_eq!(col("AA3"), Some(26));
        assert_eq!(col("XFD7"), Some(MAX_COLUMN));
        assert_eq!(col("12"), None);
    }

    #[test]
    fn test_column_from_ref_out_of_range() {
        for r in ["XFE1", "ZZZZZ1", "ZZZZZZZZZZZZZZZ1"] {
            let err = column_from_ref("sheet1.xml", r).unwrap_err();
            assert!(matches!(err, MediaParseError::CellReference { ref reference, .. } if reference == r));
        }
    }

    #[test]
    fn test_excel_serial_dates() {
        let d = excel_serial_to_datetime(45292.0, false).unwrap();
        assert_eq!(d.date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let noon = excel_serial_to_datetime(45292.5, false).unwrap();
        assert_eq!(noon.format("%H:%M").to_string(), "12:00");

        let d1904 = excel_serial_to_datetime(0.0, true).unwrap();
        assert_eq!(d1904.date(), NaiveDate::from_ymd_opt(1904, 1, 1).unwrap());
    }

    #[test]
    fn test_date_format_codes() {
        assert!(is_date_format_code("yyyy-mm-dd"));
        assert!(is_date_format_code("[$-409]d-mmm-yy"));
        assert!(!is_date_format_code("0.00"));
        assert!(!is_date_format_code("\"days\" 0"));
        assert!(!is_date_format_code("[Red]0.0"));
    }

    #[test]
    fn test_custom_properties() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties"
                    xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">
            <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="2" name="sims_name">
                <vt:lpwstr>Moose SRB</vt:lpwstr>
            </property>
            <property fmtid="{D5CDD505-2E9C-101B-9397-08002B2CF9AE}" pid="3" name="sims_version">
                <vt:lpwstr>1.0</vt:lpwstr>
            </property>
        </Properties>"#;

        let props = parse_custom_properties(xml).unwrap();
        assert_eq!(props.get("sims_name").map(String::as_str), Some("Moose SRB"));
        assert_eq!(props.get("sims_version").map(String::as_str), Some("1.0"));
    }

    #[test]
    fn test_shared_strings_with_runs() {
        let xml = r#"<sst><si><t>Plain</t></si><si><r><t>Ri</t></r><r><t>ch</t></r><rPh><t>x</t></rPh></si><si/></sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Plain", "Rich", ""]);
    }

    #[test]
    fn test_sheet_with_gaps_and_types() {
        let shared = vec!["Site".to_string(), "Count".to_string(), "Date".to_string(), "A".to_string()];
        let styles = vec![false, true];
        let ctx = SheetContext {
            shared_strings: &shared,
            date_styles: &styles,
            date_1904: false,
        };
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="s"><v>1</v></c><c r="C1" t="s"><v>2</v></c></row>
            <row r="2"></row>
            <row r="3"><c r="A3" t="s"><v>3</v></c><c r="C3" s="1"><v>45292</v></c></row>
            <row r="4"><c r="A4" t="inlineStr"><is><t>B</t></is></c><c r="B4"><v>7</v></c></row>
        </sheetData></worksheet>"#;

        let sheet = parse_sheet("Obs", "xl/worksheets/sheet1.xml", xml, &ctx).unwrap();
        assert_eq!(sheet.headers, vec!["SITE", "COUNT", "DATE"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.cell(0, "COUNT"), Some(&CellValue::Empty));
        assert!(matches!(sheet.cell(0, "DATE"), Some(CellValue::Date(_))));
        assert_eq!(sheet.cell(1, "SITE"), Some(&CellValue::Text("B".into())));
        assert_eq!(sheet.cell(1, "COUNT"), Some(&CellValue::Number(7.0)));
    }

    #[test]
    fn test_sheet_with_far_column_is_rejected() {
        let ctx = SheetContext {
            shared_strings: &[],
            date_styles: &[],
            date_1904: false,
        };
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Site</t></is></c><c r="ZZZZZ1"><v>1</v></c></row>
        </sheetData></worksheet>"#;

        let err = parse_sheet("Obs", "xl/worksheets/sheet1.xml", xml, &ctx).unwrap_err();
        assert!(matches!(err, MediaParseError::CellReference { .. }));
    }

    #[test]
    fn test_unreferenced_cells_stop_at_last_column() {
        let ctx = SheetContext {
            shared_strings: &[],
            date_styles: &[],
            date_1904: false,
        };
        let xml = r#"<worksheet><sheetData><row r="1"><c r="XFD1"><v>1</v></c><c><v>2</v></c></row></sheetData></worksheet>"#;

        let err = parse_sheet("Obs", "xl/worksheets/sheet1.xml", xml, &ctx).unwrap_err();
        assert!(matches!(err, MediaParseError::CellReference { .. }));
    }
}
