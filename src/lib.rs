//! # rollcall
//!
//! Turn scanned rosters (often bilingual Hebrew/English) into one table of
//! canonical `ID`, `First Name`, `Last Name` columns, calling the paid
//! table-extraction service at most once per distinct document.
//!
//! ## Why this crate?
//!
//! Table OCR returns whatever grid it sees: headers in the first column
//! instead of the first row, `ת.ז` in one file and `Student ID` in the
//! next, identifiers split across two columns, a row of spreadsheet letters
//! above the real header. This crate decides each table's orientation,
//! classifies its columns against a bilingual lexicon (falling back to
//! content sniffing for identifiers), and reorders them into a fixed
//! schema. Results are cached by a SHA-256 of the document bytes, so a
//! re-run over an unchanged folder costs nothing, renamed files included.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document bytes
//!  │
//!  ├─ 1. Hash       SHA-256 content fingerprint
//!  ├─ 2. Cache      fingerprint lookup; hit ⇒ skip to 6
//!  ├─ 3. Extract    table-extraction service, retried on transient errors
//!  ├─ 4. Structure  orientation + header-row repair
//!  ├─ 5. Classify   roles per column, merge + reorder, drop debris columns;
//!  │               stored in cache
//!  └─ 6. Aggregate  unified dataset + run statistics
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rollcall::{process_files, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Extractor from ROLLCALL_ENDPOINT / ROLLCALL_API_KEY, cache in .rollcall/cache
//!     let config = BatchConfig::default();
//!     let result = process_files(&["class-3.pdf", "class-4.pdf"], &config).await?;
//!     println!("{}", rollcall::aggregate::to_tsv(&result.dataset));
//!     eprintln!(
//!         "cache hits: {} / {}",
//!         result.stats.cache_hits, result.stats.documents
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rollcall` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! rollcall = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::aggregate;
pub use batch::{process_batch, process_batch_sync, process_files, process_files_to_file};
pub use cache::{CacheStore, FsCacheStore, InMemoryCacheStore};
pub use config::{BatchConfig, BatchConfigBuilder, Heuristics};
pub use error::{DocumentError, ExtractionError, ExtractionErrorKind, RollcallError};
pub use extract::{AzureLayoutExtractor, Extraction, TableExtractor};
pub use model::{ClassifiedTable, ColumnRole, ContentFingerprint, Orientation, RawTable, SourceDocument};
pub use output::{BatchResult, BatchStats, DocumentOutcome, DocumentStatus, Origin, UnifiedDataset};
pub use pipeline::lexicon::Lexicon;
pub use pipeline::Normalizer;
pub use progress::{BatchProgressCallback, DocumentStage, NoopProgressCallback, ProgressCallback};
pub use stream::{process_files_stream, process_stream, OutcomeStream};
