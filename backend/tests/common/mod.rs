//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::sync::Arc;

use serde_json::{json, Value};
use sims_validate::api::LogBroadcaster;
use sims_validate::store::{MemoryStore, TemplateRegistry};
use sims_validate::{SubmissionKind, SubmissionTracker, TemplateIdentity, Upload};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const XLSX_MIMETYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A worksheet fixture: name plus rows, the first row being the header.
pub struct SheetFixture<'a> {
    pub name: &'a str,
    pub rows: Vec<Vec<&'a str>>,
}

pub fn sheet<'a>(name: &'a str, rows: &[&[&'a str]]) -> SheetFixture<'a> {
    SheetFixture {
        name,
        rows: rows.iter().map(|r| r.to_vec()).collect(),
    }
}

fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'A' + (index % 26) as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn sheet_xml(rows: &[Vec<&str>]) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
    );
    for (r, row) in rows.iter().enumerate() {
        xml.push_str(&format!(r#"<row r="{}">"#, r + 1));
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let reference = format!("{}{}", column_letter(c), r + 1);
            if value.parse::<f64>().is_ok() {
                xml.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, value));
            } else {
                xml.push_str(&format!(
                    r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                    reference,
                    escape(value)
                ));
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData></worksheet>");
    xml
}

/// Build an XLSX workbook in memory.
pub fn xlsx(properties: &[(&str, &str)], sheets: &[SheetFixture<'_>]) -> Vec<u8> {
    let parts: Vec<(&str, String)> = sheets.iter().map(|s| (s.name, sheet_xml(&s.rows))).collect();
    xlsx_from_parts(properties, &parts)
}

/// Build an XLSX workbook from raw worksheet XML, one `(name, xml)` per sheet.
pub fn xlsx_from_parts(properties: &[(&str, &str)], sheets: &[(&str, String)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut put = |name: &str, content: String| {
        writer.start_file(name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    };

    put(
        "[Content_Types].xml",
        r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/></Types>"#.to_string(),
    );

    let mut workbook = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
    );
    let mut rels = String::from(
        r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    );
    for (i, (name, _)) in sheets.iter().enumerate() {
        workbook.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(name),
            i + 1,
            i + 1
        ));
        rels.push_str(&format!(
            r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{}.xml"/>"#,
            i + 1,
            i + 1
        ));
    }
    workbook.push_str("</sheets></workbook>");
    rels.push_str("</Relationships>");

    put("xl/workbook.xml", workbook);
    put("xl/_rels/workbook.xml.rels", rels);
    for (i, (_, xml)) in sheets.iter().enumerate() {
        put(&format!("xl/worksheets/sheet{}.xml", i + 1), xml.clone());
    }

    if !properties.is_empty() {
        let mut custom = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/custom-properties" xmlns:vt="http://schemas.openxmlformats.org/officeDocument/2006/docPropsVTypes">"#,
        );
        for (pid, (name, value)) in properties.iter().enumerate() {
            custom.push_str(&format!(
                r#"<property fmtid="{{D5CDD505-2E9C-101B-9397-08002B2CF9AE}}" pid="{}" name="{}"><vt:lpwstr>{}</vt:lpwstr></property>"#,
                pid + 2,
                escape(name),
                escape(value)
            ));
        }
        custom.push_str("</Properties>");
        put("docProps/custom.xml", custom);
    }

    writer.finish().unwrap().into_inner()
}

/// Template properties for the moose workbook.
pub const MOOSE_PROPERTIES: &[(&str, &str)] = &[("sims_name", "Moose SRB"), ("sims_version", "1.0")];

/// Validation schema used across the pipeline tests.
pub fn moose_schema() -> Value {
    json!({
        "name": "Moose SRB",
        "validations": [
            { "submission_required_files_validator": { "required_files": ["Effort", "Observations"] } }
        ],
        "files": [
            {
                "name": "Effort",
                "validations": [
                    { "file_required_columns_validator": { "required_columns": ["Study Area", "Block ID"] } },
                    { "file_duplicate_columns_validator": {} },
                    { "file_column_unique_validator": { "column_names": ["Study Area", "Block ID"] } }
                ],
                "columns": []
            },
            {
                "name": "Observations",
                "validations": [
                    { "file_required_columns_validator": { "required_columns": ["Study Area", "Block ID", "Count", "Date"] } },
                    { "file_recommended_columns_validator": { "recommended_columns": ["Comments"] } },
                    { "file_duplicate_columns_validator": {} }
                ],
                "columns": [
                    { "name": "Count", "validations": [
                        { "column_numeric_validator": {} },
                        { "column_range_validator": { "min_value": 0, "max_value": 10 } }
                    ] },
                    { "name": "Date", "validations": [
                        { "column_format_validator": {
                            "reg_exp": "^\\d{4}-\\d{2}-\\d{2}$",
                            "expected_format": "Dates must be formatted YYYY-MM-DD"
                        } }
                    ] }
                ]
            }
        ],
        "workbookValidations": [
            { "workbook_parent_child_key_match_validator": {
                "parent_worksheet_name": "Effort",
                "child_worksheet_name": "Observations",
                "column_names": ["Study Area", "Block ID"]
            } }
        ]
    })
}

pub fn effort_sheet() -> SheetFixture<'static> {
    sheet(
        "Effort",
        &[&["Study Area", "Block ID"], &["North", "1"], &["North", "2"]],
    )
}

pub fn observation_sheet(rows: &[&[&'static str]]) -> SheetFixture<'static> {
    let header: &[&'static str] = &["Study Area", "Block ID", "Count", "Date", "Comments"];
    let mut all = vec![header];
    all.extend_from_slice(rows);
    sheet("Observations", &all)
}

/// A tracker wired to in-memory stores and a template registry in a temp dir.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub logs: Arc<LogBroadcaster>,
    pub tracker: SubmissionTracker,
    _templates: TempDir,
}

impl Harness {
    /// `templates`: (name, version, species, schema) rows, in repository order.
    pub fn new(templates: &[(&str, &str, Option<i64>, Value)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = TemplateRegistry::with_dir(dir.path());
        for (name, version, species, schema) in templates {
            registry.save(name, version, *species, schema.clone()).unwrap();
        }

        let store = Arc::new(MemoryStore::new());
        let logs = Arc::new(LogBroadcaster::new());
        let tracker = SubmissionTracker::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(registry),
            logs.clone(),
        );

        Self {
            store,
            logs,
            tracker,
            _templates: dir,
        }
    }

    pub fn with_moose_template() -> Self {
        Self::new(&[("Moose SRB", "1.0", None, moose_schema())])
    }

    pub async fn upload(&self, survey_id: i64, file_name: &str, bytes: Vec<u8>) -> i64 {
        self.upload_with(survey_id, file_name, bytes, None).await
    }

    pub async fn upload_as(&self, survey_id: i64, file_name: &str, bytes: Vec<u8>, mimetype: &str) -> i64 {
        self.tracker
            .upload(Upload {
                survey_id,
                kind: SubmissionKind::Summary,
                file_name: file_name.to_string(),
                bytes,
                declared_mimetype: Some(mimetype.to_string()),
                declared_template: None,
            })
            .await
            .unwrap()
            .id
    }

    pub async fn upload_with(
        &self,
        survey_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
        declared_template: Option<TemplateIdentity>,
    ) -> i64 {
        self.tracker
            .upload(Upload {
                survey_id,
                kind: SubmissionKind::Summary,
                file_name: file_name.to_string(),
                bytes,
                declared_mimetype: None,
                declared_template,
            })
            .await
            .unwrap()
            .id
    }
}
