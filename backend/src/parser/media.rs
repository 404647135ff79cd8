//! Upload classification: CSV, XLSX, or a ZIP archive of those.
//!
//! Classification only looks at bytes, file name and declared mimetype.
//! Unrecognized input yields `None`; callers report it as
//! `UNSUPPORTED_FILE_TYPE`.

use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::{MediaParseError, MediaResult};

pub const CSV_MIMETYPE: &str = "text/csv";
pub const XLSX_MIMETYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ZIP_MIMETYPE: &str = "application/zip";

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";

/// Largest decompressed size accepted for one zip entry or workbook part.
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Largest decompressed size accepted for all entries of one archive.
pub const MAX_ARCHIVE_BYTES: u64 = 4 * MAX_ENTRY_BYTES;

/// A single uploaded (or archive-contained) file.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub mimetype: String,
    pub buffer: Vec<u8>,
}

impl MediaFile {
    pub fn is_csv(&self) -> bool {
        self.mimetype == CSV_MIMETYPE
    }

    pub fn is_xlsx(&self) -> bool {
        self.mimetype == XLSX_MIMETYPE
    }

    /// File name without directory or extension.
    pub fn stem(&self) -> String {
        Path::new(&self.file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.file_name)
            .to_string()
    }
}

/// A ZIP upload and the files inside it.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub file_name: String,
    pub mimetype: String,
    pub entries: Vec<MediaFile>,
}

/// Result of classifying an upload.
#[derive(Debug, Clone)]
pub enum UploadedMedia {
    File(MediaFile),
    Archive(ArchiveFile),
}

impl UploadedMedia {
    pub fn file_name(&self) -> &str {
        match self {
            UploadedMedia::File(f) => &f.file_name,
            UploadedMedia::Archive(a) => &a.file_name,
        }
    }

    pub fn mimetype(&self) -> &str {
        match self {
            UploadedMedia::File(f) => &f.mimetype,
            UploadedMedia::Archive(a) => &a.mimetype,
        }
    }
}

/// Classify raw upload bytes.
///
/// Returns `Ok(None)` when the content is not CSV, XLSX or ZIP, and an error
/// when a ZIP container is recognized but cannot be read.
///
/// # Example
/// ```ignore
/// let media = parse_media(b"a,b\n1,2".to_vec(), "counts.csv", Some("text/csv"))?;
/// assert!(matches!(media, Some(UploadedMedia::File(_))));
/// ```
pub fn parse_media(
    buffer: Vec<u8>,
    file_name: &str,
    declared_mimetype: Option<&str>,
) -> MediaResult<Option<UploadedMedia>> {
    let xlsx_declared = declared_mimetype.is_some_and(|m| m.trim().eq_ignore_ascii_case(XLSX_MIMETYPE));
    let xlsx = |buffer| {
        Some(UploadedMedia::File(MediaFile {
            file_name: file_name.to_string(),
            mimetype: XLSX_MIMETYPE.to_string(),
            buffer,
        }))
    };

    if buffer.starts_with(ZIP_SIGNATURE) {
        if xlsx_declared || is_xlsx_container(&buffer)? {
            return Ok(xlsx(buffer));
        }
        let entries = read_archive_entries(&buffer)?;
        return Ok(Some(UploadedMedia::Archive(ArchiveFile {
            file_name: file_name.to_string(),
            mimetype: ZIP_MIMETYPE.to_string(),
            entries,
        })));
    }

    // Declared workbooks that are not zips fail later, when the sheets are read.
    if xlsx_declared {
        return Ok(xlsx(buffer));
    }

    Ok(classify_plain(buffer, file_name, declared_mimetype).map(UploadedMedia::File))
}

/// Classify a non-zip file. Archive entries go through here as well.
fn classify_plain(buffer: Vec<u8>, file_name: &str, declared_mimetype: Option<&str>) -> Option<MediaFile> {
    let declared = declared_mimetype.map(|m| m.trim().to_lowercase());
    let csv_declared = matches!(
        declared.as_deref(),
        Some("text/csv") | Some("application/csv") | Some("text/comma-separated-values")
    ) || (declared.as_deref() == Some("application/vnd.ms-excel") && has_extension(file_name, "csv"));

    if (csv_declared || has_extension(file_name, "csv")) && looks_textual(&buffer) {
        return Some(MediaFile {
            file_name: file_name.to_string(),
            mimetype: CSV_MIMETYPE.to_string(),
            buffer,
        });
    }

    None
}

fn has_extension(file_name: &str, ext: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Text files have no NUL bytes in their leading block.
fn looks_textual(buffer: &[u8]) -> bool {
    !buffer.iter().take(8192).any(|b| *b == 0)
}

fn open_archive(buffer: &[u8]) -> MediaResult<zip::ZipArchive<Cursor<&[u8]>>> {
    zip::ZipArchive::new(Cursor::new(buffer)).map_err(|e| MediaParseError::Archive(e.to_string()))
}

fn is_xlsx_container(buffer: &[u8]) -> MediaResult<bool> {
    let archive = open_archive(buffer)?;
    let names: Vec<&str> = archive.file_names().collect();
    Ok(names.contains(&"[Content_Types].xml") && names.contains(&"xl/workbook.xml"))
}

fn read_archive_entries(buffer: &[u8]) -> MediaResult<Vec<MediaFile>> {
    let mut archive = open_archive(buffer)?;
    let mut entries = Vec::new();
    let mut total = 0u64;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| MediaParseError::Archive(e.to_string()))?;

        let name = entry.name().to_string();
        if entry.is_dir() || name.starts_with("__MACOSX/") || is_hidden(&name) {
            continue;
        }

        let content = read_limited(&mut entry, &name, MAX_ENTRY_BYTES)?;
        total += content.len() as u64;
        if total > MAX_ARCHIVE_BYTES {
            return Err(MediaParseError::TooLarge {
                name: "archive".to_string(),
                limit: MAX_ARCHIVE_BYTES,
            });
        }

        let file_name = Path::new(&name)
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string();

        let media = if content.starts_with(ZIP_SIGNATURE) && is_xlsx_container(&content)? {
            MediaFile {
                file_name,
                mimetype: XLSX_MIMETYPE.to_string(),
                buffer: content,
            }
        } else {
            match classify_plain(content, &file_name, None) {
                Some(media) => media,
                None => MediaFile {
                    mimetype: guess_mimetype(&file_name),
                    file_name,
                    buffer: Vec::new(),
                },
            }
        };

        entries.push(media);
    }

    Ok(entries)
}

/// Read a zip entry, failing once it decompresses past `limit` bytes.
///
/// The size declared in the entry header is not trusted.
pub(crate) fn read_limited(reader: impl Read, name: &str, limit: u64) -> MediaResult<Vec<u8>> {
    let mut content = Vec::new();
    reader
        .take(limit + 1)
        .read_to_end(&mut content)
        .map_err(|e| MediaParseError::Archive(format!("{}: {}", name, e)))?;

    if content.len() as u64 > limit {
        return Err(MediaParseError::TooLarge {
            name: name.to_string(),
            limit,
        });
    }
    Ok(content)
}

fn is_hidden(name: &str) -> bool {
    Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.starts_with('.'))
}

/// Mimetype reported for archive entries that are neither CSV nor XLSX.
fn guess_mimetype(file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" => "text/plain",
        "json" => "application/json",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "xls" => "application/vnd.ms-excel",
        "zip" => ZIP_MIMETYPE,
        _ => "application/octet-stream",
    }
    .to_string()
}
