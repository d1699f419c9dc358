//! Result types returned by the batch driver.

use crate::error::DocumentError;
use crate::model::{ClassifiedTable, ContentFingerprint};
use serde::{Deserialize, Serialize};

/// Where a document's tables came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Replayed from the cache; the service was not contacted.
    Cache,
    /// Produced by the extraction service during this run.
    Service,
    /// Never reached the service (unreadable input, size limit).
    Local,
}

/// What a document produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    /// One or more normalised tables, in extraction order.
    Tables { tables: Vec<ClassifiedTable> },
    /// The document holds no tables.
    NoTables,
    /// The document failed; see the error for whether it is permanent.
    Failed { error: DocumentError },
}

/// Outcome of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOutcome {
    /// 0-based position in the input.
    pub index: usize,
    pub name: String,
    /// `None` only if the document could not be read.
    pub fingerprint: Option<ContentFingerprint>,
    pub origin: Origin,
    pub status: DocumentStatus,
    /// Extraction calls made for this document (0 on a cache hit).
    pub attempts: u32,
    /// Set when results were produced but could not be cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_error: Option<DocumentError>,
    pub duration_ms: u64,
}

impl DocumentOutcome {
    pub fn tables(&self) -> &[ClassifiedTable] {
        match &self.status {
            DocumentStatus::Tables { tables } => tables,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&DocumentError> {
        match &self.status {
            DocumentStatus::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        self.origin == Origin::Cache
    }
}

/// One row of the unified dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedRow {
    /// Display name of the source document.
    pub source: String,
    pub table_index: usize,
    /// One value per [`UnifiedDataset::columns`] entry.
    pub cells: Vec<String>,
}

/// All data rows of all tables under one shared header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnifiedDataset {
    pub columns: Vec<String>,
    pub rows: Vec<UnifiedRow>,
}

impl UnifiedDataset {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Counters for a completed batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub documents: usize,
    pub cache_hits: usize,
    /// Hashed documents not served from the cache.
    pub cache_misses: usize,
    /// Documents sent to the extraction service at least once.
    pub fresh_extractions: usize,
    pub no_tables: usize,
    pub errors: usize,
    pub cache_write_errors: usize,
    pub tables: usize,
    pub rows: usize,
    pub rows_with_identifier: usize,
    /// `cache_hits / documents`; 0 for an empty batch.
    pub cache_hit_ratio: f64,
    /// `rows_with_identifier / rows`; 0 when there are no rows.
    pub identifier_fill_ratio: f64,
    pub duration_ms: u64,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub dataset: UnifiedDataset,
    /// Per-document outcomes, in input order.
    pub documents: Vec<DocumentOutcome>,
    pub stats: BatchStats,
}

impl BatchResult {
    /// Documents that failed, in input order.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.documents.iter().filter(|d| d.error().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: DocumentStatus) -> DocumentOutcome {
        DocumentOutcome {
            index: 0,
            name: "a.pdf".into(),
            fingerprint: None,
            origin: Origin::Service,
            status,
            attempts: 1,
            cache_error: None,
            duration_ms: 3,
        }
    }

    #[test]
    fn status_serialises_with_tag() {
        let json = serde_json::to_value(outcome(DocumentStatus::NoTables)).unwrap();
        assert_eq!(json["status"]["status"], "no_tables");
        assert_eq!(json["origin"], "service");
        assert!(json.get("cache_error").is_none());
    }

    #[test]
    fn accessors() {
        let failed = outcome(DocumentStatus::Failed {
            error: DocumentError::Unreadable {
                name: "a.pdf".into(),
                detail: "gone".into(),
            },
        });
        assert!(failed.error().is_some());
        assert!(failed.tables().is_empty());
        assert!(!failed.is_cache_hit());
    }

    #[test]
    fn column_lookup() {
        let ds = UnifiedDataset {
            columns: vec!["ID".into(), "First Name".into()],
            rows: vec![],
        };
        assert_eq!(ds.column_index("First Name"), Some(1));
        assert_eq!(ds.column_index("Last Name"), None);
        assert!(ds.is_empty());
    }
}
