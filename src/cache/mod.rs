//! Content-addressed result cache.
//!
//! ## Why content-addressed?
//!
//! Every extraction call costs money and seconds. Keying results by a hash
//! of the document bytes means unchanged documents are never re-submitted,
//! however often the batch is re-run, renamed or moved. Only the bytes
//! matter.
//!
//! ## Entry lifecycle
//!
//! A [`CacheEntry`] is either a successful result (raw tables plus their
//! normalised form) or a **sentinel**: a durable record that the document
//! has no tables, or was permanently rejected by the service. Sentinels are
//! what make "no tables" cheap on the second run.
//!
//! An entry is visible to [`CacheStore::lookup`] only once it is complete.
//! A half-written entry reads as [`MissReason::Partial`] and is simply
//! recomputed and overwritten.

pub mod fs;
pub mod memory;

use crate::error::CacheError;
use crate::model::{ClassifiedTable, ContentFingerprint, RawTable, SourceDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use fs::FsCacheStore;
pub use memory::InMemoryCacheStore;

/// Hex characters of the fingerprint used in artifact names.
pub const FINGERPRINT_PREFIX_LEN: usize = 8;

/// Identity of a cache entry.
///
/// Only `fingerprint` decides a hit. `base_name` makes artifact files
/// recognisable to a human browsing the cache directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub fingerprint: ContentFingerprint,
    pub base_name: String,
}

impl CacheKey {
    pub fn new(fingerprint: ContentFingerprint, base_name: impl Into<String>) -> Self {
        Self {
            fingerprint,
            base_name: base_name.into(),
        }
    }

    pub fn for_document(document: &SourceDocument, fingerprint: ContentFingerprint) -> Self {
        Self::new(fingerprint, document.base_name())
    }

    /// `{base_name}-{first 8 hex chars}`: the shared prefix of an entry's
    /// artifact file names.
    pub fn stem(&self) -> String {
        format!("{}-{}", self.base_name, self.fingerprint.prefix(FINGERPRINT_PREFIX_LEN))
    }
}

/// Why a document produced no tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentinelKind {
    /// The service found no table in the document.
    NoTables,
    /// The service permanently rejected the document.
    ExtractionError,
}

/// The cached result of processing one document.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutcome {
    Tables(Vec<ClassifiedTable>),
    Sentinel {
        kind: SentinelKind,
        detail: Option<String>,
    },
}

/// Version of rollcall stamped into every entry it writes.
pub const PRODUCER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provenance recorded with every entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub fingerprint: ContentFingerprint,
    pub timestamp: DateTime<Utc>,
    /// Extractor that produced the entry, e.g. `"azure-layout"`.
    pub processed_by: String,
    /// rollcall version that wrote the entry. Empty for entries written
    /// before the field existed.
    pub version: String,
}

impl EntryMetadata {
    fn now(fingerprint: ContentFingerprint, processed_by: String) -> Self {
        Self {
            fingerprint,
            timestamp: Utc::now(),
            processed_by,
            version: PRODUCER_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub metadata: EntryMetadata,
    /// Tables exactly as the service returned them.
    pub raw_tables: Vec<RawTable>,
    pub outcome: CachedOutcome,
    /// The service's plain-text rendering, if kept.
    pub debug_text: Option<String>,
}

impl CacheEntry {
    pub fn tables(
        fingerprint: ContentFingerprint,
        processed_by: impl Into<String>,
        raw_tables: Vec<RawTable>,
        tables: Vec<ClassifiedTable>,
    ) -> Self {
        Self {
            metadata: EntryMetadata::now(fingerprint, processed_by.into()),
            raw_tables,
            outcome: CachedOutcome::Tables(tables),
            debug_text: None,
        }
    }

    pub fn sentinel(
        fingerprint: ContentFingerprint,
        processed_by: impl Into<String>,
        kind: SentinelKind,
        detail: Option<String>,
    ) -> Self {
        Self {
            metadata: EntryMetadata::now(fingerprint, processed_by.into()),
            raw_tables: Vec::new(),
            outcome: CachedOutcome::Sentinel { kind, detail },
            debug_text: None,
        }
    }

    pub fn with_raw_tables(mut self, raw_tables: Vec<RawTable>) -> Self {
        self.raw_tables = raw_tables;
        self
    }

    pub fn with_debug_text(mut self, text: Option<String>) -> Self {
        self.debug_text = text;
        self
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.outcome, CachedOutcome::Sentinel { .. })
    }
}

/// Why a lookup did not hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// Nothing stored for this fingerprint.
    Absent,
    /// Some artifacts exist but the entry was never committed.
    Partial,
    /// An artifact exists but cannot be parsed or fails validation.
    Corrupt(String),
}

impl fmt::Display for MissReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissReason::Absent => f.write_str("absent"),
            MissReason::Partial => f.write_str("partial entry"),
            MissReason::Corrupt(detail) => write!(f, "corrupt entry: {detail}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Summary of what a store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Committed entries.
    pub entries: usize,
    /// Sentinel entries among `entries`.
    pub sentinels: usize,
    /// Bytes used by all artifacts, partial ones included.
    pub total_bytes: u64,
}

/// Durable fingerprint → result mapping.
///
/// Methods are synchronous; async callers run them on the blocking pool.
/// Implementations must make [`CacheStore::store`] all-or-nothing from the
/// point of view of [`CacheStore::lookup`], including across a crash
/// mid-write.
pub trait CacheStore: Send + Sync {
    fn lookup(&self, key: &CacheKey) -> CacheLookup;

    /// Persist `entry`, replacing any previous entry for the same key.
    fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError>;

    /// Record that a document has no usable tables.
    fn mark_sentinel(
        &self,
        key: &CacheKey,
        processed_by: &str,
        kind: SentinelKind,
        detail: Option<String>,
    ) -> Result<(), CacheError> {
        let entry = CacheEntry::sentinel(key.fingerprint.clone(), processed_by, kind, detail);
        self.store(key, &entry)
    }

    /// Remove every entry.
    fn clear(&self) -> Result<(), CacheError>;

    fn stats(&self) -> Result<CacheStats, CacheError>;
}
