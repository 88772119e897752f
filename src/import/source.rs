//! Record types and errors for dump extraction

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// A page as reconstructed from the dump, before cleaning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Page title. `None` if the page never opened a `<title>` element,
    /// `Some("")` if it opened an empty one.
    pub identifier: Option<String>,
    /// Page namespace (0 = articles)
    pub namespace: Option<i32>,
    /// Raw wikitext body
    pub body: String,
}

impl RawRecord {
    pub fn new(identifier: impl Into<String>, namespace: Option<i32>, body: impl Into<String>) -> Self {
        Self {
            identifier: Some(identifier.into()),
            namespace,
            body: body.into(),
        }
    }

    /// Identifier for display and keying; absent maps to the empty string
    pub fn key(&self) -> &str {
        self.identifier.as_deref().unwrap_or("")
    }
}

/// A page after the transform has been applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanedRecord {
    pub identifier: String,
    pub body: String,
}

impl CleanedRecord {
    /// Build from a raw record and its transformed body
    pub fn from_raw(raw: RawRecord, body: String) -> Self {
        Self {
            identifier: raw.identifier.unwrap_or_default(),
            body,
        }
    }
}

/// Malformed input framing. Fatal for the run.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parse error at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("Invalid text encoding at byte {position}: {message}")]
    Encoding { position: u64, message: String },

    #[error("Invalid namespace value {value:?} in page {title:?}")]
    InvalidNamespace { value: String, title: Option<String> },

    #[error("Input ended inside an open <{open}> element")]
    Truncated { open: String },
}

/// A single record's transform failed. The record is skipped.
#[derive(Debug, Clone, Error)]
#[error("transform failed: {0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Supported dump encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DumpFormat {
    /// MediaWiki XML compressed with bzip2 (`.xml.bz2`, single or multistream)
    Bzip2Xml,
    /// Uncompressed MediaWiki XML
    PlainXml,
}

impl DumpFormat {
    /// Detect format from file path
    pub fn detect(path: &Path) -> Self {
        let is_bz2 = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("bz2"))
            .unwrap_or(false);

        if is_bz2 {
            DumpFormat::Bzip2Xml
        } else {
            DumpFormat::PlainXml
        }
    }
}
