//! Parsers for BESAPI replies from the console REST API.
//!
//! Replies look like:
//!
//! ```xml
//! <BESAPI>
//!   <FileUpload Resource="...">
//!     <Name>Firefox.dmg</Name><URL>http://...</URL><Size>123</Size>
//!     <SHA1>...</SHA1><SHA256>...</SHA256>
//!   </FileUpload>
//! </BESAPI>
//! ```
//!
//! Only attributes and direct child text of the requested element are kept.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use besengine_shared::{BesEngineError, Result};

/// Attributes and direct-child text of one element.
#[derive(Debug, Default, Clone)]
struct Record {
    attrs: HashMap<String, String>,
    fields: HashMap<String, String>,
}

impl Record {
    fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    fn require(&self, element: &str, name: &str) -> Result<String> {
        self.field(name)
            .map(str::to_string)
            .ok_or_else(|| BesEngineError::parse(format!("{element} reply has no {name}")))
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn xml_error(e: impl std::fmt::Display) -> BesEngineError {
    BesEngineError::parse(format!("malformed console reply: {e}"))
}

/// Collect every `element` in document order.
fn collect(xml: &str, element: &str) -> Result<Vec<Record>> {
    let mut reader = Reader::from_str(xml);
    let mut records = Vec::new();
    let mut current: Option<Record> = None;
    // Depth below the current record, and the field open at depth 1.
    let mut depth = 0usize;
    let mut field: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => match current.as_mut() {
                None if local_name(&e) == element => {
                    current = Some(open_record(&e)?);
                    depth = 0;
                }
                None => {}
                Some(record) => {
                    depth += 1;
                    if depth == 1 {
                        let name = local_name(&e);
                        record.fields.entry(name.clone()).or_default();
                        field = Some(name);
                    }
                }
            },
            Event::Empty(e) => match current.as_mut() {
                None if local_name(&e) == element => records.push(open_record(&e)?),
                None => {}
                Some(record) => {
                    if depth == 0 {
                        record.fields.entry(local_name(&e)).or_default();
                    }
                }
            },
            Event::End(_) => {
                if let Some(record) = current.take() {
                    if depth == 0 {
                        records.push(record);
                    } else {
                        depth -= 1;
                        if depth == 0 {
                            field = None;
                        }
                        current = Some(record);
                    }
                }
            }
            Event::Text(t) => {
                if let (Some(record), Some(name), 1) = (current.as_mut(), field.as_ref(), depth) {
                    let text = t.unescape().map_err(xml_error)?;
                    record.fields.entry(name.clone()).or_default().push_str(&text);
                }
            }
            Event::CData(c) => {
                if let (Some(record), Some(name), 1) = (current.as_mut(), field.as_ref(), depth) {
                    let raw = c.into_inner();
                    let text = std::str::from_utf8(&raw).map_err(xml_error)?;
                    record.fields.entry(name.clone()).or_default().push_str(text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

fn open_record(start: &BytesStart<'_>) -> Result<Record> {
    let mut record = Record::default();
    for attr in start.attributes() {
        let attr = attr.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value().map_err(xml_error)?.into_owned();
        record.attrs.insert(key, value);
    }
    Ok(record)
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// What the console reports for an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub name: String,
    /// Console-hosted download URL.
    pub url: String,
    pub size: String,
    pub sha1: String,
    pub sha256: String,
}

impl UploadResult {
    /// Prefetch statement for the uploaded file; `file_name` defaults to the upload name.
    pub fn prefetch(&self, file_name: Option<&str>) -> String {
        format!(
            "prefetch {} sha1:{} size:{} {} sha256:{}",
            file_name.unwrap_or(&self.name),
            self.sha1,
            self.size,
            self.url,
            self.sha256
        )
    }
}

/// Parse an `/api/upload` reply. The last `FileUpload` element wins.
pub fn parse_upload_response(xml: &str) -> Result<UploadResult> {
    let record = collect(xml, "FileUpload")?
        .pop()
        .ok_or_else(|| BesEngineError::parse("upload reply has no FileUpload element"))?;

    Ok(UploadResult {
        name: record.require("FileUpload", "Name")?,
        url: record.require("FileUpload", "URL")?,
        size: record.require("FileUpload", "Size")?,
        sha1: record.require("FileUpload", "SHA1")?,
        sha256: record.require("FileUpload", "SHA256")?,
    })
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// A task as listed or returned by the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub id: String,
    pub name: String,
    pub last_modified: Option<String>,
}

fn task_record(record: &Record) -> Result<TaskRecord> {
    Ok(TaskRecord {
        id: record.require("Task", "ID")?,
        name: record.field("Name").unwrap_or_default().to_string(),
        last_modified: record.attrs.get("LastModified").cloned(),
    })
}

/// Parse a site task listing.
pub fn parse_task_list(xml: &str) -> Result<Vec<TaskRecord>> {
    collect(xml, "Task")?.iter().map(task_record).collect()
}

/// Parse the reply to a task import; the first `Task` is the created one.
pub fn parse_import_response(xml: &str) -> Result<TaskRecord> {
    let records = collect(xml, "Task")?;
    let first = records
        .first()
        .ok_or_else(|| BesEngineError::parse("import reply has no Task element"))?;
    task_record(first)
}
