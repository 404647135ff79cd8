//! Media parsing: raw upload bytes to worksheets.
//!
//! ```text
//! bytes ──▶ parse_media ──▶ UploadedMedia ──▶ read_worksheets ──▶ WorksheetSet
//!           (classify)      File | Archive     (CSV / XLSX)
//! ```
//!
//! No I/O happens here; everything works on in-memory buffers.

pub mod csv;
pub mod media;
pub mod worksheet;
pub mod xlsx;

pub use self::csv::{decode_content, detect_delimiter, detect_encoding, parse_csv_str, parse_csv_worksheet};
pub use media::{parse_media, ArchiveFile, MediaFile, UploadedMedia, CSV_MIMETYPE, XLSX_MIMETYPE, ZIP_MIMETYPE};
pub use worksheet::{normalize_header, CellValue, MediaEntry, Row, Worksheet, WorksheetSet};
pub use xlsx::{parse_xlsx, XlsxWorkbook};

use std::collections::BTreeMap;

use crate::error::MediaResult;

/// Build the worksheet set for a classified upload.
///
/// - CSV: one worksheet named after the file stem
/// - XLSX: one worksheet per sheet, plus custom properties
/// - Archive: the worksheets of every CSV/XLSX entry; other entries are
///   only listed in `media`
pub fn read_worksheets(media: &UploadedMedia) -> MediaResult<WorksheetSet> {
    let mut set = WorksheetSet {
        file_name: media.file_name().to_string(),
        mimetype: media.mimetype().to_string(),
        custom_properties: BTreeMap::new(),
        worksheets: Vec::new(),
        media: Vec::new(),
    };

    match media {
        UploadedMedia::File(file) => {
            set.media.push(entry_of(file));
            read_file_into(file, &mut set)?;
        }
        UploadedMedia::Archive(archive) => {
            for file in &archive.entries {
                set.media.push(entry_of(file));
                read_file_into(file, &mut set)?;
            }
        }
    }

    Ok(set)
}

impl WorksheetSet {
    pub fn from_media(media: &UploadedMedia) -> MediaResult<Self> {
        read_worksheets(media)
    }
}

fn entry_of(file: &MediaFile) -> MediaEntry {
    MediaEntry {
        file_name: file.file_name.clone(),
        mimetype: file.mimetype.clone(),
    }
}

fn read_file_into(file: &MediaFile, set: &mut WorksheetSet) -> MediaResult<()> {
    if file.is_csv() {
        set.worksheets.push(parse_csv_worksheet(file)?);
    } else if file.is_xlsx() {
        let workbook = parse_xlsx(file)?;
        for (key, value) in workbook.custom_properties {
            set.custom_properties.entry(key).or_insert(value);
        }
        set.worksheets.extend(workbook.worksheets);
    }
    Ok(())
}
