//! Pipeline stages for roster normalisation.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and [`Normalizer`] is just their composition.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ fingerprint ──▶ (cache) ──▶ extract ──▶ structure ──▶ classify ──▶ reorder ──▶ quality
//!           (SHA-256)                  (service)   (orient,      (lexicon,    (canonical  (drop debris,
//!                                                   header)       sniffing)    columns)    stray IDs)
//! ```
//!
//! 1. [`fingerprint`]: content hash; the cache key
//! 2. [`extract`]: service call with timeout and retry; the only stage
//!    with network I/O
//! 3. [`structure`]: orientation scoring and header-row repair
//! 4. [`classify`]: one role per column from the [`lexicon`] and
//!    [`identifier`] shape
//! 5. [`reorder`]: merge duplicate canonical columns, canonical order
//! 6. [`quality`]: drop empty and data-headed columns, move stray
//!    identifiers into the ID column

pub mod classify;
pub mod extract;
pub mod fingerprint;
pub mod identifier;
pub mod lexicon;
pub mod quality;
pub mod reorder;
pub mod structure;

use crate::config::{BatchConfig, Heuristics};
use crate::error::RollcallError;
use crate::model::{ClassifiedTable, RawTable};
use classify::ColumnClassifier;
use identifier::IdentifierShape;
use lexicon::Lexicon;
use quality::ColumnQuality;
use std::sync::Arc;
use structure::TableStructureAnalyzer;
use tracing::debug;

/// Structure analysis, classification and reordering for one batch.
///
/// Holds the compiled identifier pattern so it is built once, not per table.
#[derive(Debug, Clone)]
pub struct Normalizer {
    lexicon: Arc<Lexicon>,
    shape: IdentifierShape,
    heuristics: Heuristics,
}

impl Normalizer {
    pub fn new(lexicon: Arc<Lexicon>, heuristics: Heuristics) -> Result<Self, RollcallError> {
        heuristics.validate()?;
        let shape = IdentifierShape::new(&heuristics)?;
        Ok(Self {
            lexicon,
            shape,
            heuristics,
        })
    }

    pub fn from_config(config: &BatchConfig) -> Result<Self, RollcallError> {
        Self::new(Arc::clone(&config.lexicon), config.heuristics.clone())
    }

    pub fn analyzer(&self) -> TableStructureAnalyzer<'_> {
        TableStructureAnalyzer::new(&self.lexicon, &self.shape, &self.heuristics)
    }

    pub fn classifier(&self) -> ColumnClassifier<'_> {
        ColumnClassifier::new(&self.lexicon, &self.shape, &self.heuristics)
    }

    pub fn quality(&self) -> ColumnQuality<'_> {
        ColumnQuality::new(&self.lexicon, &self.shape)
    }

    /// Normalise one extracted table.
    pub fn normalize(&self, table_index: usize, raw: &RawTable) -> ClassifiedTable {
        let structured = self.analyzer().analyze(raw);
        let roles = self.classifier().classify(&structured.table);
        debug!("table {}: roles {:?}", table_index, roles);
        let reordered = reorder::reorder(&ClassifiedTable {
            table_index,
            orientation: structured.orientation,
            header: structured.header,
            roles,
            rows: structured.table,
        });
        if !self.heuristics.column_quality {
            return reordered;
        }
        let (cleaned, report) = self.quality().apply(reordered);
        if report.moved_identifiers > 0 || !report.dropped.is_empty() {
            debug!(
                "table {}: moved {} identifiers, dropped columns {:?}",
                table_index, report.moved_identifiers, report.dropped
            );
        }
        if !report.unrecognised.is_empty() {
            debug!("table {}: unrecognised columns {:?}", table_index, report.unrecognised);
        }
        cleaned
    }
}
