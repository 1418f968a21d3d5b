//! Multipart request detection and parsing.
//!
//! When a [`MultipartResolver`] is configured the dispatcher parses
//! `multipart/*` requests before route lookup and publishes the parts as a
//! [`MultipartForm`] attribute. Parse failures on an error dispatch are
//! recorded as [`MultipartFailure`] so that a nested error dispatch does not
//! parse the same broken body again.

use crate::error::{Error, Result};
use crate::http::HttpRequest;
use crate::logging::debug;
use std::collections::HashMap;

/// Detects and parses multipart requests.
pub trait MultipartResolver: Send + Sync + 'static {
    fn is_multipart(&self, request: &HttpRequest) -> bool;

    /// Parse the body and publish a [`MultipartForm`] on the request.
    fn resolve(&self, request: &mut HttpRequest) -> Result<()>;

    /// Release resources held for a request parsed by this dispatch.
    fn cleanup(&self, request: &mut HttpRequest) {
        request.attributes.remove::<MultipartForm>();
    }
}

/// Parsed multipart parts.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: Vec<FormField>,
}

impl MultipartForm {
    /// First text value named `name`.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.value.as_deref())
    }

    /// Text fields as a map; later duplicates win.
    pub fn values(&self) -> HashMap<&str, &str> {
        self.fields
            .iter()
            .filter_map(|f| f.value.as_deref().map(|v| (f.name.as_str(), v)))
            .collect()
    }

    pub fn file(&self, name: &str) -> Option<&FormFile> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.file.as_ref())
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &FormFile)> {
        self.fields
            .iter()
            .filter_map(|f| f.file.as_ref().map(|file| (f.name.as_str(), file)))
    }
}

/// Marker left by a failed parse.
#[derive(Debug, Clone)]
pub struct MultipartFailure(pub String);

/// One part of a multipart body.
#[derive(Debug, Clone)]
pub struct FormField {
    pub name: String,
    /// Set for text parts.
    pub value: Option<String>,
    /// Set for file parts.
    pub file: Option<FormFile>,
}

/// Uploaded file.
#[derive(Debug, Clone)]
pub struct FormFile {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl FormFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn extension(&self) -> Option<&str> {
        self.filename.rsplit_once('.').map(|(_, ext)| ext)
    }
}

/// In-memory `multipart/form-data` parser.
#[derive(Debug, Clone, Default)]
pub struct StandardMultipartResolver {
    max_upload_size: Option<usize>,
}

impl StandardMultipartResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject bodies larger than `bytes`.
    pub fn max_upload_size(mut self, bytes: usize) -> Self {
        self.max_upload_size = Some(bytes);
        self
    }
}

impl MultipartResolver for StandardMultipartResolver {
    fn is_multipart(&self, request: &HttpRequest) -> bool {
        request
            .content_type()
            .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/"))
    }

    fn resolve(&self, request: &mut HttpRequest) -> Result<()> {
        if let Some(max) = self.max_upload_size
            && request.body.len() > max
        {
            return Err(Error::Multipart(format!(
                "body of {} bytes exceeds the {} byte limit",
                request.body.len(),
                max
            )));
        }
        let content_type = request.content_type().unwrap_or_default();
        let boundary = boundary(content_type)?;
        let fields = parse_parts(&request.body, &boundary)?;
        debug!(parts = fields.len(), "Parsed multipart request");
        request.attributes.insert(MultipartForm { fields });
        Ok(())
    }
}

fn boundary(content_type: &str) -> Result<String> {
    content_type
        .split(';')
        .find_map(|part| {
            part.trim()
                .strip_prefix("boundary=")
                .map(|b| b.trim_matches('"').to_string())
        })
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::Multipart("missing boundary in Content-Type".to_string()))
}

fn parse_parts(body: &[u8], boundary: &str) -> Result<Vec<FormField>> {
    let body = String::from_utf8_lossy(body);
    let marker = format!("--{}", boundary);
    let mut sections = body.split(marker.as_str());
    if sections.next().is_none() {
        return Ok(Vec::new());
    }

    let mut fields = Vec::new();
    let mut closed = false;
    for section in sections {
        if section.starts_with("--") {
            closed = true;
            break;
        }
        let section = section
            .strip_prefix("\r\n")
            .or_else(|| section.strip_prefix('\n'))
            .unwrap_or(section);
        fields.push(parse_part(section)?);
    }
    if !closed {
        return Err(Error::Multipart("body is missing the closing boundary".to_string()));
    }
    Ok(fields)
}

fn parse_part(part: &str) -> Result<FormField> {
    let (head, content) = part
        .split_once("\r\n\r\n")
        .or_else(|| part.split_once("\n\n"))
        .ok_or_else(|| Error::Multipart("part without header block".to_string()))?;
    let content = content
        .strip_suffix("\r\n")
        .or_else(|| content.strip_suffix('\n'))
        .unwrap_or(content);

    let mut name = None;
    let mut filename = None;
    let mut content_type = None;
    for line in head.lines() {
        let Some((header, value)) = line.split_once(':') else {
            continue;
        };
        if header.eq_ignore_ascii_case("Content-Disposition") {
            for attr in value.split(';').map(str::trim) {
                if let Some(v) = attr.strip_prefix("name=") {
                    name = Some(v.trim_matches('"').to_string());
                } else if let Some(v) = attr.strip_prefix("filename=") {
                    filename = Some(v.trim_matches('"').to_string());
                }
            }
        } else if header.eq_ignore_ascii_case("Content-Type") {
            content_type = Some(value.trim().to_string());
        }
    }

    let name = name.ok_or_else(|| Error::Multipart("part without a field name".to_string()))?;
    Ok(match filename {
        Some(filename) => FormField {
            name,
            value: None,
            file: Some(FormFile {
                filename,
                content_type: content_type.unwrap_or_else(|| "application/octet-stream".to_string()),
                data: content.as_bytes().to_vec(),
            }),
        },
        None => FormField {
            name,
            value: Some(content.to_string()),
            file: None,
        },
    })
}
