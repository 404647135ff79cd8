//! CSV reader with encoding and delimiter auto-detection.
//!
//! A CSV file becomes a single worksheet named after the file stem.

use crate::error::{MediaParseError, MediaResult};

use super::media::MediaFile;
use super::worksheet::{CellValue, Worksheet};

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    if bytes.starts_with(b"\xEF\xBB\xBF") {
        return "utf-8".to_string();
    }

    let charset = chardet::detect(bytes).0;

    // Normalize charset names
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes to string using the specified encoding. A UTF-8 BOM is dropped.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let decoded = match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };

    match decoded.strip_prefix('\u{feff}') {
        Some(rest) => rest.to_string(),
        None => decoded,
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> u8 {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [b',', b';', b'\t', b'|'];
    let mut best_sep = b',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep as char).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse a CSV media file into one worksheet.
pub fn parse_csv_worksheet(media: &MediaFile) -> MediaResult<Worksheet> {
    if media.buffer.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(MediaParseError::EmptyFile(media.file_name.clone()));
    }

    let encoding = detect_encoding(&media.buffer);
    let content = decode_content(&media.buffer, &encoding);
    let delimiter = detect_delimiter(&content);

    parse_csv_str(&media.stem(), &content, delimiter)
}

/// Parse CSV text with an explicit delimiter. Blank lines are skipped.
pub fn parse_csv_str(sheet_name: &str, content: &str, delimiter: u8) -> MediaResult<Worksheet> {
    let mut reader = ::csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = reader.records();

    let headers: Vec<String> = loop {
        match records.next() {
            Some(record) => {
                let record = record.map_err(|e| MediaParseError::Csv(e.to_string()))?;
                if record.iter().any(|v| !v.is_empty()) {
                    break record.iter().map(str::to_string).collect();
                }
            }
            None => return Err(MediaParseError::EmptyFile(sheet_name.to_string())),
        }
    };

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| MediaParseError::Csv(e.to_string()))?;
        if record.iter().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(record.iter().map(CellValue::text).collect());
    }

    Ok(Worksheet::new(sheet_name, headers, rows))
}
