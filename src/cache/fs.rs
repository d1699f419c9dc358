//! File-system cache store.
//!
//! ## Layout
//!
//! Each entry is up to three files in one flat directory, all sharing the
//! stem `{base_name}-{fingerprint[..8]}`:
//!
//! | File | Contents |
//! |------|----------|
//! | `{stem}_tables.json`      | raw tables as extracted, plus the full fingerprint |
//! | `{stem}_ocr_results.txt`  | the service's text rendering (optional) |
//! | `{stem}_final_table.json` | normalised tables or a sentinel, plus metadata |
//!
//! ## Atomicity
//!
//! Every file is written to a temporary file in the cache directory and
//! renamed into place, so no file is ever observed half-written. The
//! normalised artifact is written **last**: its presence is the commit
//! marker. A crash between files leaves a raw artifact without a normalised
//! one, which [`FsCacheStore::lookup`] reports as [`MissReason::Partial`].
//!
//! ## Renamed documents
//!
//! Lookup tries the exact stem first, then any stem ending in the same
//! 8-character fingerprint prefix. A candidate only hits if the full
//! fingerprint stored inside it matches, so a prefix collision is a miss,
//! never a wrong answer.

use crate::cache::{
    CacheEntry, CacheKey, CacheLookup, CacheStats, CacheStore, CachedOutcome, EntryMetadata,
    MissReason, SentinelKind, FINGERPRINT_PREFIX_LEN,
};
use crate::error::CacheError;
use crate::model::{ClassifiedTable, ContentFingerprint, RawTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const RAW_SUFFIX: &str = "_tables.json";
const TEXT_SUFFIX: &str = "_ocr_results.txt";
const NORMALIZED_SUFFIX: &str = "_final_table.json";

// ── Artifact formats ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct RawArtifact {
    fingerprint: ContentFingerprint,
    #[serde(default)]
    tables: Vec<RawArtifactTable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawArtifactTable {
    #[serde(default)]
    table_index: usize,
    #[serde(default)]
    row_count: usize,
    #[serde(default)]
    column_count: usize,
    rows: RawTable,
}

/// Raw artifacts written before the fingerprint was embedded were a bare
/// array of tables.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawArtifactFile {
    Current(RawArtifact),
    Legacy(Vec<RawArtifactTable>),
}

#[derive(Debug, Serialize, Deserialize)]
struct NormalizedArtifact {
    metadata: ArtifactMetadata,
    #[serde(default)]
    tables: Vec<ClassifiedTable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactMetadata {
    #[serde(default)]
    no_table_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    extraction_error: Option<String>,
    fingerprint: ContentFingerprint,
    timestamp: DateTime<Utc>,
    processed_by: String,
    #[serde(default)]
    version: String,
}

impl NormalizedArtifact {
    fn from_entry(entry: &CacheEntry) -> Self {
        let (no_table_data, extraction_error, tables) = match &entry.outcome {
            CachedOutcome::Tables(tables) => (false, None, tables.clone()),
            CachedOutcome::Sentinel {
                kind: SentinelKind::NoTables,
                ..
            } => (true, None, Vec::new()),
            CachedOutcome::Sentinel {
                kind: SentinelKind::ExtractionError,
                detail,
            } => (true, Some(detail.clone().unwrap_or_default()), Vec::new()),
        };
        Self {
            metadata: ArtifactMetadata {
                no_table_data,
                extraction_error,
                fingerprint: entry.metadata.fingerprint.clone(),
                timestamp: entry.metadata.timestamp,
                processed_by: entry.metadata.processed_by.clone(),
                version: entry.metadata.version.clone(),
            },
            tables,
        }
    }

    fn into_outcome(self) -> Result<(EntryMetadata, CachedOutcome), String> {
        let outcome = match (self.metadata.no_table_data, self.metadata.extraction_error) {
            (true, Some(detail)) => CachedOutcome::Sentinel {
                kind: SentinelKind::ExtractionError,
                detail: Some(detail).filter(|d| !d.is_empty()),
            },
            (true, None) => CachedOutcome::Sentinel {
                kind: SentinelKind::NoTables,
                detail: None,
            },
            (false, _) => {
                if self.tables.is_empty() {
                    return Err("no tables and no sentinel flag".into());
                }
                if let Some(t) = self.tables.iter().find(|t| !t.is_canonical()) {
                    return Err(format!("table {} is not in canonical form", t.table_index));
                }
                CachedOutcome::Tables(self.tables)
            }
        };
        let metadata = EntryMetadata {
            fingerprint: self.metadata.fingerprint,
            timestamp: self.metadata.timestamp,
            processed_by: self.metadata.processed_by,
            version: self.metadata.version,
        };
        Ok((metadata, outcome))
    }
}

// ── Store ────────────────────────────────────────────────────────────────

/// Cache store over a flat directory of JSON and text artifacts.
#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    /// Open (creating if needed) a cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| CacheError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact(&self, stem: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{stem}{suffix}"))
    }

    /// Stems that may hold `key`: the exact stem, then every other stem with
    /// the same fingerprint prefix, in name order.
    fn candidate_stems(&self, key: &CacheKey) -> Vec<String> {
        let exact = key.stem();
        let mut stems = vec![exact.clone()];
        let tail = format!("-{}", key.fingerprint.prefix(FINGERPRINT_PREFIX_LEN));

        let Ok(entries) = fs::read_dir(&self.root) else {
            return stems;
        };
        let mut others: Vec<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_suffix(NORMALIZED_SUFFIX)
                    .or_else(|| name.strip_suffix(RAW_SUFFIX))
                    .map(str::to_string)
            })
            .filter(|stem| stem.ends_with(&tail) && *stem != exact)
            .collect();
        others.sort();
        others.dedup();
        stems.extend(others);
        stems
    }

    fn read_entry(&self, stem: &str, fingerprint: &ContentFingerprint) -> CacheLookup {
        let normalized_path = self.artifact(stem, NORMALIZED_SUFFIX);
        let raw_path = self.artifact(stem, RAW_SUFFIX);

        let normalized_text = match fs::read_to_string(&normalized_path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return if raw_path.exists() {
                    CacheLookup::Miss(MissReason::Partial)
                } else {
                    CacheLookup::Miss(MissReason::Absent)
                };
            }
            Err(e) => return CacheLookup::Miss(MissReason::Corrupt(e.to_string())),
        };
        let normalized: NormalizedArtifact = match serde_json::from_str(&normalized_text) {
            Ok(n) => n,
            Err(e) => {
                return CacheLookup::Miss(MissReason::Corrupt(format!(
                    "{}: {e}",
                    normalized_path.display()
                )))
            }
        };
        if &normalized.metadata.fingerprint != fingerprint {
            // Prefix collision or stale file under a reused name.
            return CacheLookup::Miss(MissReason::Absent);
        }
        let (metadata, outcome) = match normalized.into_outcome() {
            Ok(parts) => parts,
            Err(detail) => return CacheLookup::Miss(MissReason::Corrupt(detail)),
        };

        let raw_tables = match fs::read_to_string(&raw_path) {
            Ok(text) => match serde_json::from_str::<RawArtifactFile>(&text) {
                Ok(RawArtifactFile::Current(raw)) if &raw.fingerprint != fingerprint => {
                    return CacheLookup::Miss(MissReason::Partial);
                }
                Ok(RawArtifactFile::Current(raw)) => raw.tables,
                Ok(RawArtifactFile::Legacy(tables)) => tables,
                Err(e) => {
                    return CacheLookup::Miss(MissReason::Corrupt(format!(
                        "{}: {e}",
                        raw_path.display()
                    )))
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return CacheLookup::Miss(MissReason::Partial);
            }
            Err(e) => return CacheLookup::Miss(MissReason::Corrupt(e.to_string())),
        };

        let debug_text = fs::read_to_string(self.artifact(stem, TEXT_SUFFIX)).ok();

        CacheLookup::Hit(CacheEntry {
            metadata,
            raw_tables: raw_tables.into_iter().map(|t| t.rows).collect(),
            outcome,
            debug_text,
        })
    }

    /// Write `bytes` to `path` via a temporary file in the cache directory.
    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| CacheError::io(&self.root, e))?;
        tmp.write_all(bytes).map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| CacheError::io(path, e.error))?;
        Ok(())
    }

    fn to_json<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec_pretty(value).map_err(|e| CacheError::Serialize {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn is_artifact(name: &str) -> bool {
        name.ends_with(RAW_SUFFIX) || name.ends_with(TEXT_SUFFIX) || name.ends_with(NORMALIZED_SUFFIX)
    }
}

impl CacheStore for FsCacheStore {
    fn lookup(&self, key: &CacheKey) -> CacheLookup {
        let mut first_miss: Option<MissReason> = None;
        for stem in self.candidate_stems(key) {
            match self.read_entry(&stem, &key.fingerprint) {
                CacheLookup::Hit(entry) => {
                    debug!("cache hit for {} under '{}'", key.fingerprint.prefix(12), stem);
                    return CacheLookup::Hit(entry);
                }
                CacheLookup::Miss(reason) => {
                    if let MissReason::Corrupt(detail) = &reason {
                        warn!("ignoring corrupt cache entry '{}': {}", stem, detail);
                    }
                    first_miss.get_or_insert(reason);
                }
            }
        }
        CacheLookup::Miss(first_miss.unwrap_or(MissReason::Absent))
    }

    fn store(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), CacheError> {
        let stem = key.stem();

        let raw_path = self.artifact(&stem, RAW_SUFFIX);
        let raw = RawArtifact {
            fingerprint: key.fingerprint.clone(),
            tables: entry
                .raw_tables
                .iter()
                .enumerate()
                .map(|(i, t)| RawArtifactTable {
                    table_index: i,
                    row_count: t.row_count(),
                    column_count: t.column_count(),
                    rows: t.clone(),
                })
                .collect(),
        };
        self.write_atomic(&raw_path, &Self::to_json(&raw_path, &raw)?)?;

        let text_path = self.artifact(&stem, TEXT_SUFFIX);
        match &entry.debug_text {
            Some(text) => self.write_atomic(&text_path, text.as_bytes())?,
            None => match fs::remove_file(&text_path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::io(&text_path, e)),
            },
        }

        let normalized_path = self.artifact(&stem, NORMALIZED_SUFFIX);
        let normalized = NormalizedArtifact::from_entry(entry);
        self.write_atomic(&normalized_path, &Self::to_json(&normalized_path, &normalized)?)?;

        debug!("cached {} as '{}'", key.fingerprint.prefix(12), stem);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if Self::is_artifact(&name) || name.starts_with(".tmp") {
                fs::remove_file(entry.path()).map_err(|e| CacheError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CacheStats::default()),
            Err(e) => return Err(CacheError::io(&self.root, e)),
        };
        let mut stats = CacheStats::default();
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !Self::is_artifact(&name) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                stats.total_bytes += meta.len();
            }
            if name.ends_with(NORMALIZED_SUFFIX) {
                stats.entries += 1;
                let sentinel = fs::read_to_string(entry.path())
                    .ok()
                    .and_then(|t| serde_json::from_str::<NormalizedArtifact>(&t).ok())
                    .is_some_and(|n| n.metadata.no_table_data);
                if sentinel {
                    stats.sentinels += 1;
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PRODUCER_VERSION;
    use crate::model::{ColumnRole, HeaderSource, Orientation};
    use crate::pipeline::fingerprint::fingerprint;

    fn raw() -> RawTable {
        RawTable::new(vec![
            vec!["שם פרטי".into(), "תז".into()],
            vec!["Rachel".into(), "519499492".into()],
        ])
    }

    fn classified() -> ClassifiedTable {
        ClassifiedTable {
            table_index: 0,
            orientation: Orientation::Normal,
            header: HeaderSource::Original,
            roles: vec![ColumnRole::Identifier, ColumnRole::FirstName],
            rows: RawTable::new(vec![
                vec!["תז".into(), "שם פרטי".into()],
                vec!["519499492".into(), "Rachel".into()],
            ]),
        }
    }

    fn setup() -> (tempfile::TempDir, FsCacheStore, CacheKey) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCacheStore::open(dir.path()).unwrap();
        let key = CacheKey::new(fingerprint(b"roster bytes"), "roster");
        (dir, store, key)
    }

    fn entry(key: &CacheKey) -> CacheEntry {
        CacheEntry::tables(key.fingerprint.clone(), "test", vec![raw()], vec![classified()])
            .with_debug_text(Some("תז שם פרטי".into()))
    }

    #[test]
    fn store_then_lookup_hits() {
        let (_dir, store, key) = setup();
        assert_eq!(store.lookup(&key), CacheLookup::Miss(MissReason::Absent));

        store.store(&key, &entry(&key)).unwrap();
        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert_eq!(hit.outcome, CachedOutcome::Tables(vec![classified()]));
        assert_eq!(hit.raw_tables, vec![raw()]);
        assert_eq!(hit.debug_text.as_deref(), Some("תז שם פרטי"));
        assert_eq!(hit.metadata.processed_by, "test");
    }

    #[test]
    fn producer_version_is_written_and_read_back() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        let text =
            fs::read_to_string(dir.path().join(format!("{}{}", key.stem(), NORMALIZED_SUFFIX))).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["metadata"]["version"], env!("CARGO_PKG_VERSION"));

        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert_eq!(hit.metadata.version, PRODUCER_VERSION);
    }

    #[test]
    fn entries_without_version_still_hit() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        let path = dir.path().join(format!("{}{}", key.stem(), NORMALIZED_SUFFIX));
        let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        json["metadata"].as_object_mut().unwrap().remove("version");
        fs::write(&path, serde_json::to_vec(&json).unwrap()).unwrap();

        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert_eq!(hit.metadata.version, "");
    }

    #[test]
    fn artifact_names_follow_the_stem() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        let stem = key.stem();
        for suffix in [RAW_SUFFIX, TEXT_SUFFIX, NORMALIZED_SUFFIX] {
            assert!(dir.path().join(format!("{stem}{suffix}")).exists(), "{suffix}");
        }
    }

    #[test]
    fn renamed_document_hits_by_fingerprint() {
        let (_dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        let renamed = CacheKey::new(key.fingerprint.clone(), "completely different name");
        assert!(store.lookup(&renamed).is_hit());
    }

    #[test]
    fn prefix_collision_is_a_miss() {
        let (_dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        // Same 8-char prefix, different full fingerprint.
        let mut other = key.fingerprint.as_str().to_string();
        other.replace_range(63..64, if other.ends_with('0') { "1" } else { "0" });
        let other_key = CacheKey::new(ContentFingerprint::from_hex(&other).unwrap(), "roster");
        assert!(!store.lookup(&other_key).is_hit());
    }

    #[test]
    fn missing_normalized_artifact_is_partial() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        fs::remove_file(dir.path().join(format!("{}{}", key.stem(), NORMALIZED_SUFFIX))).unwrap();
        assert_eq!(store.lookup(&key), CacheLookup::Miss(MissReason::Partial));
    }

    #[test]
    fn missing_raw_artifact_is_partial() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        fs::remove_file(dir.path().join(format!("{}{}", key.stem(), RAW_SUFFIX))).unwrap();
        assert_eq!(store.lookup(&key), CacheLookup::Miss(MissReason::Partial));
    }

    #[test]
    fn garbage_normalized_artifact_is_corrupt() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        fs::write(
            dir.path().join(format!("{}{}", key.stem(), NORMALIZED_SUFFIX)),
            b"{ not json",
        )
        .unwrap();
        assert!(matches!(store.lookup(&key), CacheLookup::Miss(MissReason::Corrupt(_))));
    }

    #[test]
    fn sentinels_round_trip() {
        let (_dir, store, key) = setup();
        store
            .mark_sentinel(&key, "test", SentinelKind::NoTables, None)
            .unwrap();
        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert_eq!(
            hit.outcome,
            CachedOutcome::Sentinel {
                kind: SentinelKind::NoTables,
                detail: None
            }
        );

        store
            .mark_sentinel(&key, "test", SentinelKind::ExtractionError, Some("HTTP 400: corrupt".into()))
            .unwrap();
        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert_eq!(
            hit.outcome,
            CachedOutcome::Sentinel {
                kind: SentinelKind::ExtractionError,
                detail: Some("HTTP 400: corrupt".into())
            }
        );
        assert!(hit.debug_text.is_none());
    }

    #[test]
    fn sentinel_metadata_uses_no_table_data_flag() {
        let (dir, store, key) = setup();
        store
            .mark_sentinel(&key, "azure-layout", SentinelKind::NoTables, None)
            .unwrap();
        let text =
            fs::read_to_string(dir.path().join(format!("{}{}", key.stem(), NORMALIZED_SUFFIX))).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["metadata"]["no_table_data"], true);
        assert_eq!(json["metadata"]["processed_by"], "azure-layout");
        assert!(json["metadata"]["timestamp"].is_string());
    }

    #[test]
    fn legacy_bare_array_raw_artifact_is_accepted() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        fs::write(
            dir.path().join(format!("{}{}", key.stem(), RAW_SUFFIX)),
            r#"[{"table_index": 0, "rows": [["a", "b"], ["c"]]}]"#,
        )
        .unwrap();
        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert_eq!(hit.raw_tables[0].cell(1, 1), Some(""));
    }

    #[test]
    fn clear_and_stats() {
        let (dir, store, key) = setup();
        store.store(&key, &entry(&key)).unwrap();
        let other = CacheKey::new(fingerprint(b"empty scan"), "scan");
        store.mark_sentinel(&other, "test", SentinelKind::NoTables, None).unwrap();
        fs::write(dir.path().join("notes.md"), b"keep me").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.sentinels, 1);
        assert!(stats.total_bytes > 0);

        store.clear().unwrap();
        assert_eq!(store.stats().unwrap(), CacheStats::default());
        assert!(!store.lookup(&key).is_hit());
        assert!(dir.path().join("notes.md").exists());
    }

    #[test]
    fn overwrite_replaces_previous_entry() {
        let (_dir, store, key) = setup();
        store.mark_sentinel(&key, "test", SentinelKind::NoTables, None).unwrap();
        store.store(&key, &entry(&key)).unwrap();
        let CacheLookup::Hit(hit) = store.lookup(&key) else {
            panic!("expected hit");
        };
        assert!(!hit.is_sentinel());
    }
}
