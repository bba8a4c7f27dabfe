//! Content items for synchronous (inline) inspection.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Declared type of a byte payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ByteContentType {
    TextUtf8,
    ImageJpeg,
    ImagePng,
    ImageBmp,
    Image,
}

impl ByteContentType {
    /// Pick a content type from a file extension (case-insensitive).
    ///
    /// Unknown or missing extensions are treated as UTF-8 text.
    pub fn from_extension(ext: Option<&str>) -> Self {
        match ext.map(|e| e.to_ascii_lowercase()).as_deref() {
            Some("png") => Self::ImagePng,
            Some("jpg") | Some("jpeg") => Self::ImageJpeg,
            Some("bmp") => Self::ImageBmp,
            Some("gif") | Some("tif") | Some("tiff") | Some("webp") => Self::Image,
            _ => Self::TextUtf8,
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Self::TextUtf8)
    }
}

/// Tabular content: header names plus rows of string cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Every row must have exactly one cell per header.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> DomainResult<Self> {
        if headers.is_empty() {
            return Err(DomainError::validation("table has no headers"));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != headers.len()) {
            return Err(DomainError::validation(format!(
                "row {i} has {} cells, expected {}",
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

/// A payload the service can inspect inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentItem {
    Text(String),
    Table(Table),
    Bytes { kind: ByteContentType, data: Vec<u8> },
}
