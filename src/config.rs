//! Configuration types for a normalisation batch.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Classification thresholds live in a separate
//! [`Heuristics`] struct so they can be loaded from JSON, logged, and diffed
//! between runs without touching the I/O knobs.
//!
//! # Design choice: builder over constructor
//! The builder lets callers set only what they care about and rely on the
//! documented defaults for the rest. `build()` is the single place where
//! cross-field constraints are checked.

use crate::cache::CacheStore;
use crate::error::RollcallError;
use crate::extract::TableExtractor;
use crate::pipeline::lexicon::Lexicon;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".rollcall/cache";

/// Upper bound on `max_retries`.
pub const MAX_RETRIES: u32 = 10;

/// Tunable thresholds for orientation detection and column classification.
///
/// Defaults match Israeli ID numbers (9 digits) and passport numbers with an
/// optional letter prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heuristics {
    /// Minimum digit count of an identifier-shaped value. Default: 7.
    pub identifier_min_digits: usize,

    /// Maximum digit count of an identifier-shaped value. Default: 10.
    pub identifier_max_digits: usize,

    /// Single-character prefixes allowed before the digits. Default: `['A']`.
    ///
    /// Matching is case-insensitive.
    pub identifier_prefixes: Vec<char>,

    /// Accept spaces between digits, e.g. `"519 499 492"`. Default: true.
    pub identifier_allow_spaces: bool,

    /// Fraction of non-empty data cells that must be identifier-shaped before
    /// an unrecognised column is classified as Identifier. Default: 0.5.
    ///
    /// The comparison is strict: exactly half is not a majority.
    pub sniff_majority: f64,

    /// Minimum non-empty data cells before content sniffing is attempted.
    /// Default: 1.
    pub sniff_min_cells: usize,

    /// Weight of identifier-shaped values against a line's header score.
    /// Default: 1.0.
    pub identifier_penalty: f64,

    /// How much the first column must out-score the first row before a table
    /// is treated as transposed. Default: 0.0 (strictly greater wins).
    pub transpose_margin: f64,

    /// Run the column-quality pass after reordering: drop blank and
    /// data-headed `Other` columns, move stray identifiers into the ID
    /// column. Default: true.
    pub column_quality: bool,
}

impl Default for Heuristics {
    fn default() -> Self {
        Self {
            identifier_min_digits: 7,
            identifier_max_digits: 10,
            identifier_prefixes: vec!['A'],
            identifier_allow_spaces: true,
            sniff_majority: 0.5,
            sniff_min_cells: 1,
            identifier_penalty: 1.0,
            transpose_margin: 0.0,
            column_quality: true,
        }
    }
}

impl Heuristics {
    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), RollcallError> {
        if self.identifier_min_digits == 0 {
            return Err(RollcallError::InvalidConfig(
                "identifier_min_digits must be ≥ 1".into(),
            ));
        }
        if self.identifier_min_digits > self.identifier_max_digits {
            return Err(RollcallError::InvalidConfig(format!(
                "identifier digit range is empty: {}..={}",
                self.identifier_min_digits, self.identifier_max_digits
            )));
        }
        if !(0.0..1.0).contains(&self.sniff_majority) {
            return Err(RollcallError::InvalidConfig(format!(
                "sniff_majority must be in [0, 1), got {}",
                self.sniff_majority
            )));
        }
        if self.identifier_penalty < 0.0 || !self.identifier_penalty.is_finite() {
            return Err(RollcallError::InvalidConfig(format!(
                "identifier_penalty must be a finite value ≥ 0, got {}",
                self.identifier_penalty
            )));
        }
        if self.transpose_margin < 0.0 || !self.transpose_margin.is_finite() {
            return Err(RollcallError::InvalidConfig(format!(
                "transpose_margin must be a finite value ≥ 0, got {}",
                self.transpose_margin
            )));
        }
        Ok(())
    }
}

/// Configuration for a normalisation batch.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use rollcall::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .concurrency(8)
///     .cache_dir("/tmp/rollcall-cache")
///     .max_retries(5)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Documents processed at once. Default: 4.
    ///
    /// The extraction service is the bottleneck and usually throttles per
    /// key; a handful of in-flight documents keeps it busy without tripping
    /// HTTP 429.
    pub concurrency: usize,

    /// Retry attempts after a transient extraction failure. Default: 3,
    /// at most [`MAX_RETRIES`].
    ///
    /// Permanent failures are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds. Doubles per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-extraction-call timeout in seconds, polling included. Default: 120.
    pub api_timeout_secs: u64,

    /// Documents larger than this are rejected before extraction. Default: 50 MiB.
    pub max_document_bytes: usize,

    /// Where the file-system cache lives. Default: `.rollcall/cache`.
    ///
    /// Ignored when a pre-built [`CacheStore`] is supplied via `cache`.
    pub cache_dir: PathBuf,

    /// Also persist the service's plain-text rendering next to the tables.
    /// Default: true.
    pub write_debug_text: bool,

    /// Classification thresholds.
    pub heuristics: Heuristics,

    /// Header synonym lexicon. Default: [`Lexicon::bilingual`].
    pub lexicon: Arc<Lexicon>,

    /// Pre-constructed extractor. If `None`, the Azure layout extractor is
    /// built from `ROLLCALL_ENDPOINT` / `ROLLCALL_API_KEY`.
    pub extractor: Option<Arc<dyn TableExtractor>>,

    /// Pre-constructed cache store. If `None`, a file-system store is opened
    /// at `cache_dir`.
    pub cache: Option<Arc<dyn CacheStore>>,

    /// Progress events. If `None`, events are dropped.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 120,
            max_document_bytes: 50 * 1024 * 1024,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            write_debug_text: true,
            heuristics: Heuristics::default(),
            lexicon: Arc::new(Lexicon::bilingual()),
            extractor: None,
            cache: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("cache_dir", &self.cache_dir)
            .field("write_debug_text", &self.write_debug_text)
            .field("heuristics", &self.heuristics)
            .field("lexicon_synonyms", &self.lexicon.len())
            .field("extractor", &self.extractor.as_ref().map(|e| e.name().to_string()))
            .field("cache", &self.cache.as_ref().map(|_| "<dyn CacheStore>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_document_bytes(mut self, bytes: usize) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn write_debug_text(mut self, v: bool) -> Self {
        self.config.write_debug_text = v;
        self
    }

    pub fn heuristics(mut self, heuristics: Heuristics) -> Self {
        self.config.heuristics = heuristics;
        self
    }

    pub fn lexicon(mut self, lexicon: Lexicon) -> Self {
        self.config.lexicon = Arc::new(lexicon);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn TableExtractor>) -> Self {
        self.config.extractor = Some(extractor);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.config.cache = Some(cache);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, RollcallError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(RollcallError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_document_bytes == 0 {
            return Err(RollcallError::InvalidConfig(
                "max_document_bytes must be ≥ 1".into(),
            ));
        }
        if c.max_retries > MAX_RETRIES {
            return Err(RollcallError::InvalidConfig(format!(
                "max_retries must be ≤ {MAX_RETRIES}, got {}",
                c.max_retries
            )));
        }
        if c.lexicon.is_empty() {
            return Err(RollcallError::InvalidConfig(
                "Lexicon has no synonyms; canonical columns could never be found".into(),
            ));
        }
        c.heuristics.validate()?;
        Ok(self.config)
    }
}
