//! Progress-callback trait for per-document batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive events
//! as each document moves through the pipeline.
//!
//! # Example
//!
//! ```rust
//! use rollcall::{BatchConfig, BatchProgressCallback, DocumentOutcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, outcome: &DocumentOutcome, total: usize) {
//!         let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}/{total}: {}", outcome.name);
//!     }
//! }
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchStats, DocumentOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a document is in the pipeline.
///
/// Every document starts at `Pending` and ends at `Recorded`. In between it
/// takes exactly one path:
///
/// ```text
/// Pending → Hashed → CacheHit                          → Recorded
/// Pending → Hashed → NeedsExtraction → Classified      → Recorded
/// Pending → Hashed → NeedsExtraction → Sentinel        → Recorded
/// Pending → Hashed → NeedsExtraction → Error           → Recorded
/// Pending → Hashed → Error                             → Recorded
/// Pending → Error                                      → Recorded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    Pending,
    Hashed,
    CacheHit,
    NeedsExtraction,
    Classified,
    Sentinel,
    Error,
    Recorded,
}

impl fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStage::Pending => "pending",
            DocumentStage::Hashed => "hashed",
            DocumentStage::CacheHit => "cache hit",
            DocumentStage::NeedsExtraction => "extracting",
            DocumentStage::Classified => "classified",
            DocumentStage::Sentinel => "no tables",
            DocumentStage::Error => "error",
            DocumentStage::Recorded => "recorded",
        };
        f.write_str(s)
    }
}

/// Called by the batch driver as it processes each document.
///
/// Implementations must be `Send + Sync`: documents are processed
/// concurrently, so every method except the batch-level ones may be called
/// from several tasks at once. All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any document is read.
    fn on_batch_start(&self, total_documents: usize) {
        let _ = total_documents;
    }

    /// Called on every stage transition.
    ///
    /// # Arguments
    /// * `index`: 0-based position of the document in the input
    /// * `name`: display name of the document
    /// * `stage`: the stage just entered
    fn on_document_stage(&self, index: usize, name: &str, stage: DocumentStage) {
        let _ = (index, name, stage);
    }

    /// Called once per document after its outcome is final.
    fn on_document_complete(&self, outcome: &DocumentOutcome, total_documents: usize) {
        let _ = (outcome, total_documents);
    }

    /// Called once after every document has been recorded.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StageRecorder {
        stages: Mutex<Vec<(usize, DocumentStage)>>,
    }

    impl BatchProgressCallback for StageRecorder {
        fn on_document_stage(&self, index: usize, _name: &str, stage: DocumentStage) {
            self.stages.lock().unwrap().push((index, stage));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_document_stage(0, "a.pdf", DocumentStage::Pending);
        cb.on_batch_complete(&BatchStats::default());
    }

    #[test]
    fn recorder_sees_stages_in_order() {
        let rec = StageRecorder::default();
        for stage in [
            DocumentStage::Pending,
            DocumentStage::Hashed,
            DocumentStage::CacheHit,
            DocumentStage::Recorded,
        ] {
            rec.on_document_stage(0, "a.pdf", stage);
        }
        let stages = rec.stages.lock().unwrap();
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[3], (0, DocumentStage::Recorded));
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(10);
        cb.on_document_stage(3, "x.pdf", DocumentStage::NeedsExtraction);
    }

    #[test]
    fn stage_display() {
        assert_eq!(DocumentStage::CacheHit.to_string(), "cache hit");
        assert_eq!(DocumentStage::Sentinel.to_string(), "no tables");
    }
}
