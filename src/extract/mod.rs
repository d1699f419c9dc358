//! Table extraction service boundary.
//!
//! The pipeline never talks HTTP directly. It calls a [`TableExtractor`],
//! which turns document bytes into zero or more [`RawTable`]s or an
//! [`ExtractionError`] whose kind tells the batch what to do next:
//!
//! | Kind | Retried | Cached as sentinel | Batch continues |
//! |------|---------|--------------------|-----------------|
//! | `Permanent`   | no  | yes | yes |
//! | `Transient`   | yes | no  | yes |
//! | `Unavailable` | no  | no  | **no** |
//!
//! [`azure::AzureLayoutExtractor`] is the production implementation. Tests
//! supply their own.

pub mod azure;

use crate::error::{ExtractionError, ExtractionErrorKind};
use crate::model::{RawTable, SourceDocument};
use async_trait::async_trait;

pub use azure::AzureLayoutExtractor;

/// What the service returned for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Tables in page order.
    pub tables: Vec<RawTable>,
    /// Plain-text rendering of the document, if the service provides one.
    /// Persisted next to the tables for debugging.
    pub content: Option<String>,
}

impl Extraction {
    pub fn new(tables: Vec<RawTable>) -> Self {
        Self {
            tables,
            content: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Tables that hold at least one non-blank cell.
    pub fn non_blank_tables(&self) -> impl Iterator<Item = &RawTable> {
        self.tables.iter().filter(|t| !t.is_blank())
    }

    /// `true` when no table holds any value.
    pub fn has_no_tables(&self) -> bool {
        self.non_blank_tables().next().is_none()
    }
}

/// A document-analysis backend that finds tables in document bytes.
#[async_trait]
pub trait TableExtractor: Send + Sync {
    /// Short identifier recorded in cache metadata, e.g. `"azure-layout"`.
    fn name(&self) -> &str;

    /// Analyse one document. Zero tables is a valid, successful result.
    async fn analyze(&self, document: &SourceDocument) -> Result<Extraction, ExtractionError>;
}

/// Service messages that mean the document itself will never be accepted.
const PERMANENT_MESSAGES: &[&str] = &[
    "target: 0",
    "document format not supported",
    "file is corrupted",
    "unable to process document",
    "invalid file format",
    "document too large",
    "unsupported document type",
    "invalid content",
    "password protected",
    "encrypted",
];

/// Throttling: the request is fine, just too early.
const THROTTLED_MESSAGES: &[&str] = &[
    "quota exceeded",
    "rate limit",
    "too many requests",
    "throttl",
];

/// Service messages that mean the service or our credentials are the problem.
const UNAVAILABLE_MESSAGES: &[&str] = &[
    "access denied",
    "invalid subscription key",
    "unauthorized",
    "resource not found",
    "out of call volume quota",
    "quota has been exhausted",
    "subscription has been disabled",
];

/// Classify a free-text service error message. Unknown messages are
/// `Transient`: retrying costs time, caching a wrong failure costs data.
pub fn classify_service_message(message: &str) -> ExtractionErrorKind {
    let lower = message.to_lowercase();
    if PERMANENT_MESSAGES.iter().any(|p| lower.contains(p)) {
        ExtractionErrorKind::Permanent
    } else if THROTTLED_MESSAGES.iter().any(|p| lower.contains(p)) {
        ExtractionErrorKind::Transient
    } else if UNAVAILABLE_MESSAGES.iter().any(|p| lower.contains(p)) {
        ExtractionErrorKind::Unavailable
    } else {
        ExtractionErrorKind::Transient
    }
}
