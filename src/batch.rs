//! Eager (whole-batch) entry points.
//!
//! ## Why eager vs. streaming?
//!
//! This module waits for every document, then returns one [`BatchResult`]
//! with the unified dataset and statistics. Use
//! [`crate::stream::process_stream`] instead to receive each
//! [`DocumentOutcome`] as soon as it is recorded.
//!
//! ## Per-document flow
//!
//! ```text
//! read ─▶ fingerprint ─▶ cache lookup ─┬─ hit ──────────────────────────────▶ outcome
//!                                      └─ miss ─▶ extract ─▶ normalise ─▶ store ─▶ outcome
//! ```
//!
//! Documents are independent and run concurrently up to
//! `config.concurrency`. A document's failure is recorded on its outcome;
//! only an unavailable extraction service aborts the batch.

use crate::aggregate;
use crate::cache::{
    CacheEntry, CacheKey, CacheLookup, CacheStore, CachedOutcome, FsCacheStore, MissReason,
    SentinelKind,
};
use crate::config::BatchConfig;
use crate::error::{CacheError, DocumentError, ExtractionErrorKind, RollcallError};
use crate::extract::{AzureLayoutExtractor, TableExtractor};
use crate::model::{display_name, RawTable, SourceDocument};
use crate::output::{BatchResult, BatchStats, DocumentOutcome, DocumentStatus, Origin};
use crate::pipeline::extract::extract_with_retry;
use crate::pipeline::fingerprint::fingerprint;
use crate::pipeline::Normalizer;
use crate::progress::DocumentStage;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Process in-memory documents.
///
/// # Returns
/// `Ok(BatchResult)` even if some documents failed (check
/// `result.stats.errors`).
///
/// # Errors
/// Returns `Err(RollcallError)` only for fatal errors:
/// - no extractor configured
/// - cache directory unusable
/// - extraction service unavailable (bad credentials, wrong endpoint)
pub async fn process_batch(
    documents: Vec<SourceDocument>,
    config: &BatchConfig,
) -> Result<BatchResult, RollcallError> {
    run(documents.into_iter().map(PendingDocument::Loaded).collect(), config).await
}

/// Process documents read from disk. Unreadable files become failed
/// outcomes, not fatal errors.
pub async fn process_files<P: AsRef<Path>>(
    paths: &[P],
    config: &BatchConfig,
) -> Result<BatchResult, RollcallError> {
    let inputs = paths
        .iter()
        .map(|p| PendingDocument::Path(p.as_ref().to_path_buf()))
        .collect();
    run(inputs, config).await
}

/// Process files and write the result to `output_path`.
///
/// A `.tsv` extension writes the unified dataset as tab-separated text;
/// anything else writes the full [`BatchResult`] as JSON. Uses an atomic
/// write (temp file + rename) so a crash never leaves a truncated file.
pub async fn process_files_to_file<P: AsRef<Path>>(
    paths: &[P],
    output_path: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<BatchStats, RollcallError> {
    let result = process_files(paths, config).await?;
    write_result(&result, output_path.as_ref()).await?;
    Ok(result.stats)
}

/// Synchronous wrapper around [`process_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_batch_sync(
    documents: Vec<SourceDocument>,
    config: &BatchConfig,
) -> Result<BatchResult, RollcallError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| RollcallError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_batch(documents, config))
}

/// Write a batch result; see [`process_files_to_file`] for the format rule.
pub async fn write_result(result: &BatchResult, path: &Path) -> Result<(), RollcallError> {
    let is_tsv = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("tsv"));
    let body = if is_tsv {
        aggregate::to_tsv(&result.dataset)
    } else {
        serde_json::to_string_pretty(result)
            .map_err(|e| RollcallError::Internal(format!("serialising result: {e}")))?
    };

    let write_err = |e| RollcallError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let tmp_path = path.with_extension("rollcall.tmp");
    tokio::fs::write(&tmp_path, body).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

pub(crate) enum PendingDocument {
    Loaded(SourceDocument),
    Path(PathBuf),
}

impl PendingDocument {
    fn name(&self) -> String {
        match self {
            PendingDocument::Loaded(doc) => doc.name.clone(),
            PendingDocument::Path(path) => display_name(path),
        }
    }
}

async fn run(inputs: Vec<PendingDocument>, config: &BatchConfig) -> Result<BatchResult, RollcallError> {
    let start = Instant::now();
    let total = inputs.len();
    info!("Starting batch: {} documents", total);

    let ctx = BatchContext::new(config, total)?;
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let outcomes: Vec<DocumentOutcome> = stream::iter(inputs.into_iter().enumerate().map(|(index, input)| {
        let ctx = ctx.clone();
        async move { ctx.process(index, input).await }
    }))
    .buffer_unordered(config.concurrency)
    .try_collect()
    .await?;

    let result = aggregate::aggregate(outcomes, start.elapsed().as_millis() as u64);
    info!(
        "Batch complete: {} documents, {} cache hits, {} extracted, {} errors, {}ms",
        result.stats.documents,
        result.stats.cache_hits,
        result.stats.fresh_extractions,
        result.stats.errors,
        result.stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&result.stats);
    }
    Ok(result)
}

/// Resolve the extractor: a pre-built one from the config, else Azure from
/// the environment.
pub(crate) fn resolve_extractor(config: &BatchConfig) -> Result<Arc<dyn TableExtractor>, RollcallError> {
    if let Some(ref extractor) = config.extractor {
        return Ok(Arc::clone(extractor));
    }
    Ok(Arc::new(AzureLayoutExtractor::from_env()?))
}

/// Resolve the cache: a pre-built store from the config, else a file-system
/// store at `config.cache_dir`.
pub(crate) fn resolve_cache(config: &BatchConfig) -> Result<Arc<dyn CacheStore>, RollcallError> {
    if let Some(ref cache) = config.cache {
        return Ok(Arc::clone(cache));
    }
    let store = FsCacheStore::open(&config.cache_dir).map_err(|e| match e {
        CacheError::Io { path, source } => RollcallError::CacheUnavailable { path, source },
        other => RollcallError::Internal(other.to_string()),
    })?;
    Ok(Arc::new(store))
}

/// Everything a document task needs, cheap to clone.
#[derive(Clone)]
pub(crate) struct BatchContext {
    extractor: Arc<dyn TableExtractor>,
    cache: Arc<dyn CacheStore>,
    normalizer: Arc<Normalizer>,
    config: BatchConfig,
    total: usize,
}

impl BatchContext {
    pub(crate) fn new(config: &BatchConfig, total: usize) -> Result<Self, RollcallError> {
        Ok(Self {
            extractor: resolve_extractor(config)?,
            cache: resolve_cache(config)?,
            normalizer: Arc::new(Normalizer::from_config(config)?),
            config: config.clone(),
            total,
        })
    }

    fn stage(&self, index: usize, name: &str, stage: DocumentStage) {
        debug!("[{}] {}: {}", index, name, stage);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_stage(index, name, stage);
        }
    }

    fn finish(&self, outcome: DocumentOutcome) -> DocumentOutcome {
        self.stage(outcome.index, &outcome.name, DocumentStage::Recorded);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_document_complete(&outcome, self.total);
        }
        outcome
    }

    /// Carry one document from `Pending` to `Recorded`.
    ///
    /// `Err` only when the extraction service is unavailable.
    pub(crate) async fn process(
        &self,
        index: usize,
        input: PendingDocument,
    ) -> Result<DocumentOutcome, RollcallError> {
        let start = Instant::now();
        let name = input.name();
        self.stage(index, &name, DocumentStage::Pending);

        let mut outcome = DocumentOutcome {
            index,
            name: name.clone(),
            fingerprint: None,
            origin: Origin::Local,
            status: DocumentStatus::NoTables,
            attempts: 0,
            cache_error: None,
            duration_ms: 0,
        };

        // ── Step 1: Read ─────────────────────────────────────────────────
        let document = match input {
            PendingDocument::Loaded(doc) => doc,
            PendingDocument::Path(path) => match SourceDocument::read(&path).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("{}: unreadable: {}", name, e);
                    self.stage(index, &name, DocumentStage::Error);
                    outcome.status = DocumentStatus::Failed {
                        error: DocumentError::Unreadable {
                            name,
                            detail: e.to_string(),
                        },
                    };
                    outcome.duration_ms = start.elapsed().as_millis() as u64;
                    return Ok(self.finish(outcome));
                }
            },
        };

        // ── Step 2: Fingerprint (CPU-bound) ──────────────────────────────
        let (document, fp) = tokio::task::spawn_blocking(move || {
            let fp = fingerprint(&document.bytes);
            (document, fp)
        })
        .await
        .map_err(|e| RollcallError::Internal(format!("fingerprint task failed: {e}")))?;
        outcome.fingerprint = Some(fp.clone());
        self.stage(index, &name, DocumentStage::Hashed);

        if document.len() > self.config.max_document_bytes {
            warn!(
                "{}: {} bytes exceeds limit of {}",
                name,
                document.len(),
                self.config.max_document_bytes
            );
            self.stage(index, &name, DocumentStage::Error);
            outcome.status = DocumentStatus::Failed {
                error: DocumentError::TooLarge {
                    name,
                    bytes: document.len(),
                    limit: self.config.max_document_bytes,
                },
            };
            outcome.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(self.finish(outcome));
        }

        // ── Step 3: Cache lookup ─────────────────────────────────────────
        let key = CacheKey::for_document(&document, fp.clone());
        match self.lookup(key.clone()).await {
            CacheLookup::Hit(entry) => {
                self.stage(index, &name, DocumentStage::CacheHit);
                outcome.origin = Origin::Cache;
                outcome.status = match entry.outcome {
                    CachedOutcome::Tables(tables) => DocumentStatus::Tables { tables },
                    CachedOutcome::Sentinel {
                        kind: SentinelKind::NoTables,
                        ..
                    } => DocumentStatus::NoTables,
                    CachedOutcome::Sentinel {
                        kind: SentinelKind::ExtractionError,
                        detail,
                    } => DocumentStatus::Failed {
                        error: DocumentError::ExtractionRejected {
                            name,
                            detail: detail.unwrap_or_else(|| "previously rejected".into()),
                        },
                    },
                };
                outcome.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(self.finish(outcome));
            }
            CacheLookup::Miss(reason) => {
                if reason != MissReason::Absent {
                    debug!("{}: cache miss ({})", name, reason);
                }
            }
        }

        // ── Step 4: Extract ──────────────────────────────────────────────
        self.stage(index, &name, DocumentStage::NeedsExtraction);
        outcome.origin = Origin::Service;
        let attempt = extract_with_retry(self.extractor.as_ref(), &document, &self.config).await;
        outcome.attempts = attempt.attempts;
        let producer = self.extractor.name().to_string();

        // ── Step 5: Normalise or record the failure ──────────────────────
        let entry = match attempt.result {
            Ok(extraction) => {
                let debug_text = if self.config.write_debug_text {
                    extraction.content.clone()
                } else {
                    None
                };
                let raw: Vec<RawTable> = extraction.non_blank_tables().cloned().collect();
                if raw.is_empty() {
                    info!("{}: no tables found", name);
                    self.stage(index, &name, DocumentStage::Sentinel);
                    outcome.status = DocumentStatus::NoTables;
                    Some(
                        CacheEntry::sentinel(fp, producer, SentinelKind::NoTables, None)
                            .with_raw_tables(extraction.tables)
                            .with_debug_text(debug_text),
                    )
                } else {
                    let tables: Vec<_> = raw
                        .iter()
                        .enumerate()
                        .map(|(i, t)| self.normalizer.normalize(i, t))
                        .collect();
                    self.stage(index, &name, DocumentStage::Classified);
                    outcome.status = DocumentStatus::Tables {
                        tables: tables.clone(),
                    };
                    Some(CacheEntry::tables(fp, producer, raw, tables).with_debug_text(debug_text))
                }
            }
            Err(e) => match e.kind {
                ExtractionErrorKind::Permanent => {
                    warn!("{}: rejected: {}", name, e.message);
                    self.stage(index, &name, DocumentStage::Error);
                    outcome.status = DocumentStatus::Failed {
                        error: DocumentError::ExtractionRejected {
                            name: name.clone(),
                            detail: e.message.clone(),
                        },
                    };
                    Some(CacheEntry::sentinel(
                        fp,
                        producer,
                        SentinelKind::ExtractionError,
                        Some(e.message),
                    ))
                }
                ExtractionErrorKind::Transient => {
                    warn!(
                        "{}: extraction failed after {} attempts: {}",
                        name, attempt.attempts, e.message
                    );
                    self.stage(index, &name, DocumentStage::Error);
                    outcome.status = DocumentStatus::Failed {
                        error: DocumentError::ExtractionFailed {
                            name: name.clone(),
                            retries: attempt.attempts.saturating_sub(1),
                            detail: e.message,
                        },
                    };
                    None
                }
                ExtractionErrorKind::Unavailable => {
                    return Err(RollcallError::ServiceUnavailable {
                        extractor: producer,
                        detail: e.message,
                    });
                }
            },
        };

        // ── Step 6: Persist ──────────────────────────────────────────────
        if let Some(entry) = entry {
            if let Err(detail) = self.store(key, entry).await {
                warn!("{}: cache write failed: {}", name, detail);
                outcome.cache_error = Some(DocumentError::CacheWrite {
                    name: name.clone(),
                    detail,
                });
            }
        }

        outcome.duration_ms = start.elapsed().as_millis() as u64;
        Ok(self.finish(outcome))
    }

    async fn lookup(&self, key: CacheKey) -> CacheLookup {
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.lookup(&key)).await {
            Ok(lookup) => lookup,
            Err(e) => CacheLookup::Miss(MissReason::Corrupt(format!("lookup task failed: {e}"))),
        }
    }

    async fn store(&self, key: CacheKey, entry: CacheEntry) -> Result<(), String> {
        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.store(&key, &entry)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("store task failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::error::ExtractionError;
    use crate::extract::Extraction;
    use async_trait::async_trait;

    struct Fixed(Result<Extraction, ExtractionError>);

    #[async_trait]
    impl TableExtractor for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn analyze(&self, _document: &SourceDocument) -> Result<Extraction, ExtractionError> {
            self.0.clone()
        }
    }

    fn config(extractor: Fixed) -> BatchConfig {
        BatchConfig::builder()
            .extractor(Arc::new(extractor))
            .cache(Arc::new(InMemoryCacheStore::new()))
            .retry_backoff_ms(1)
            .max_retries(1)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn unavailable_service_aborts_the_batch() {
        let cfg = config(Fixed(Err(ExtractionError::unavailable("HTTP 401"))));
        let docs = vec![SourceDocument::new("a.pdf", b"a".to_vec())];
        let err = process_batch(docs, &cfg).await.unwrap_err();
        assert!(matches!(err, RollcallError::ServiceUnavailable { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn oversized_documents_are_rejected_before_extraction() {
        let mut cfg = config(Fixed(Ok(Extraction::default())));
        cfg.max_document_bytes = 2;
        let docs = vec![SourceDocument::new("big.pdf", b"abc".to_vec())];
        let result = process_batch(docs, &cfg).await.unwrap();
        let outcome = &result.documents[0];
        assert!(matches!(outcome.error(), Some(DocumentError::TooLarge { .. })));
        assert_eq!(outcome.origin, Origin::Local);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.fingerprint.is_some());
    }

    #[tokio::test]
    async fn unreadable_file_is_a_document_error() {
        let cfg = config(Fixed(Ok(Extraction::default())));
        let result = process_files(&["/nonexistent/roster.pdf"], &cfg).await.unwrap();
        let outcome = &result.documents[0];
        assert_eq!(outcome.name, "roster.pdf");
        assert!(matches!(outcome.error(), Some(DocumentError::Unreadable { .. })));
        assert!(outcome.fingerprint.is_none());
    }

    #[tokio::test]
    async fn missing_extractor_is_fatal() {
        use crate::extract::azure::{API_KEY_ENV, ENDPOINT_ENV};
        if std::env::var(ENDPOINT_ENV).is_ok() && std::env::var(API_KEY_ENV).is_ok() {
            return;
        }
        let cfg = BatchConfig::builder()
            .cache(Arc::new(InMemoryCacheStore::new()))
            .build()
            .unwrap();
        let err = process_batch(vec![], &cfg).await.unwrap_err();
        assert!(matches!(err, RollcallError::ExtractorNotConfigured { .. }));
    }

    #[tokio::test]
    async fn write_result_as_tsv_and_json() {
        let cfg = config(Fixed(Ok(Extraction::new(vec![RawTable::new(vec![
            vec!["ID".into(), "First Name".into()],
            vec!["519499492".into(), "Rachel".into()],
        ])]))));
        let result = process_batch(vec![SourceDocument::new("a.pdf", b"a".to_vec())], &cfg)
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();

        let tsv = dir.path().join("out/roster.tsv");
        write_result(&result, &tsv).await.unwrap();
        let text = std::fs::read_to_string(&tsv).unwrap();
        assert!(text.starts_with("Source File\tID\tFirst Name"));
        assert!(text.contains("a.pdf\t519499492\tRachel"));

        let json = dir.path().join("roster.json");
        write_result(&result, &json).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(value["stats"]["documents"], 1);
    }
}
