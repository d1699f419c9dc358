//! Error types for the rollcall library.
//!
//! Failures are split by how far they reach:
//!
//! * [`RollcallError`]: **Fatal**. The batch cannot proceed at all
//!   (no extractor configured, extraction service rejected our credentials,
//!   cache directory unusable). Returned as `Err(RollcallError)` from the
//!   top-level `process_*` functions.
//!
//! * [`DocumentError`]: **Non-fatal**. One document failed (unreadable,
//!   rejected by the service, transient failure after retries) but the rest
//!   of the batch is fine. Stored inside [`crate::output::DocumentOutcome`].
//!
//! * [`ExtractionError`]: what a [`crate::extract::TableExtractor`] returns.
//!   Its [`ExtractionErrorKind`] decides whether the batch retries, caches a
//!   sentinel, or aborts.
//!
//! * [`CacheError`]: a cache read or write failed. A failed write is
//!   recorded on the document, never fatal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the rollcall library.
///
/// Document-level failures use [`DocumentError`] and are stored in
/// [`crate::output::DocumentOutcome`] rather than propagated here.
#[derive(Debug, Error)]
pub enum RollcallError {
    // ── Extraction service ────────────────────────────────────────────────
    /// No extractor was supplied and none could be built from the environment.
    #[error("No table extractor is configured.\n{hint}")]
    ExtractorNotConfigured { hint: String },

    /// The extraction service is unreachable or refuses our credentials.
    /// Every remaining document would fail the same way, so the batch stops.
    #[error("Extraction service '{extractor}' is unavailable: {detail}")]
    ServiceUnavailable { extractor: String, detail: String },

    // ── Cache ─────────────────────────────────────────────────────────────
    /// The cache directory could not be created or read.
    #[error("Cache directory '{path}' is unusable: {source}")]
    CacheUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Inputs ────────────────────────────────────────────────────────────
    /// A synonym lexicon file could not be read or parsed.
    #[error("Failed to load lexicon '{path}': {detail}")]
    LexiconLoad { path: PathBuf, detail: String },

    /// Could not create or write the output dataset file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DocumentError {
    /// The input file could not be read.
    #[error("{name}: could not be read: {detail}")]
    Unreadable { name: String, detail: String },

    /// The document exceeds `max_document_bytes`.
    #[error("{name}: {bytes} bytes exceeds the {limit}-byte limit")]
    TooLarge { name: String, bytes: usize, limit: usize },

    /// The service rejected the document. Retrying will not help; the
    /// rejection is cached so it is not resubmitted.
    #[error("{name}: rejected by the extraction service: {detail}")]
    ExtractionRejected { name: String, detail: String },

    /// Transient extraction failure that outlived the retry budget.
    /// Not cached: the next run tries again.
    #[error("{name}: extraction failed after {retries} retries: {detail}")]
    ExtractionFailed {
        name: String,
        retries: u32,
        detail: String,
    },

    /// Results were produced but could not be persisted to the cache.
    #[error("{name}: cache write failed: {detail}")]
    CacheWrite { name: String, detail: String },
}

impl DocumentError {
    /// `true` if processing the same bytes again would fail the same way.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            DocumentError::ExtractionRejected { .. } | DocumentError::TooLarge { .. }
        )
    }
}

// ── Extraction errors ────────────────────────────────────────────────────

/// How an extraction failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    /// The document itself is the problem (unsupported format, corrupt,
    /// too large). Cached as a sentinel, never retried.
    Permanent,
    /// Timeouts, throttling, 5xx. Retried with backoff, never cached.
    Transient,
    /// Service unreachable or credentials refused. Aborts the batch.
    Unavailable,
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExtractionErrorKind::Permanent => "permanent",
            ExtractionErrorKind::Transient => "transient",
            ExtractionErrorKind::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Error returned by a [`crate::extract::TableExtractor`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} extraction error: {message}")]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub message: String,
}

impl ExtractionError {
    pub fn new(kind: ExtractionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::Permanent, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::Transient, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ExtractionErrorKind::Unavailable, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ExtractionErrorKind::Transient
    }
}

/// A service-reported table too large to materialise.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("table of {rows} × {columns} cells exceeds the {limit}-cell limit")]
pub struct OversizedTable {
    pub rows: usize,
    pub columns: usize,
    pub limit: usize,
}

impl From<OversizedTable> for ExtractionError {
    fn from(e: OversizedTable) -> Self {
        ExtractionError::permanent(e.to_string())
    }
}

// ── Cache errors ─────────────────────────────────────────────────────────

/// A cache store operation failed.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not serialise cache artifact '{path}': {detail}")]
    Serialize { path: PathBuf, detail: String },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_unavailable_display() {
        let e = RollcallError::ServiceUnavailable {
            extractor: "azure-layout".into(),
            detail: "HTTP 401".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("azure-layout"), "got: {msg}");
        assert!(msg.contains("401"), "got: {msg}");
    }

    #[test]
    fn document_error_display_names_the_document() {
        let e = DocumentError::ExtractionFailed {
            name: "roster.pdf".into(),
            retries: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("roster.pdf"));
        assert!(msg.contains("3 retries"));
    }

    #[test]
    fn permanence() {
        let rejected = DocumentError::ExtractionRejected {
            name: "a.pdf".into(),
            detail: "corrupt".into(),
        };
        let failed = DocumentError::ExtractionFailed {
            name: "a.pdf".into(),
            retries: 1,
            detail: "timeout".into(),
        };
        assert!(rejected.is_permanent());
        assert!(!failed.is_permanent());
    }

    #[test]
    fn extraction_error_display_includes_kind() {
        let e = ExtractionError::transient("HTTP 429");
        assert_eq!(e.to_string(), "transient extraction error: HTTP 429");
        assert!(e.is_retryable());
        assert!(!ExtractionError::permanent("x").is_retryable());
    }

    #[test]
    fn document_error_round_trips_through_json() {
        let e = DocumentError::TooLarge {
            name: "big.pdf".into(),
            bytes: 10,
            limit: 5,
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: DocumentError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
