//! Table structure: orientation and header-row detection.
//!
//! ## Orientation scoring
//!
//! A header line is full of cells that are exactly lexicon synonyms and free
//! of identifier-shaped values; a data line is the opposite. `"Class 3"`
//! only contains a header word, so it counts as data. Each candidate
//! header line (the first row and the first column) is scored as
//!
//! ```text
//! score = header_tokens / non_empty  −  penalty × identifier_values / non_empty
//! ```
//!
//! and the table is transposed only when the first column out-scores the
//! first row by more than `transpose_margin` and itself carries positive
//! header evidence. Ties stay `Normal`, and so does a headerless table whose
//! first row merely holds identifiers.
//!
//! ## Header-row repair
//!
//! After orientation two OCR artefacts are repaired:
//!
//! * a row of spreadsheet column letters (`A B C D`) above the real header
//!   is dropped;
//! * a table whose first row is already data (identifier-shaped values, no
//!   header words) gets a synthetic `Column_1..N` header row.

use crate::config::Heuristics;
use crate::model::{is_blank, HeaderSource, Orientation, RawTable};
use crate::pipeline::identifier::IdentifierShape;
use crate::pipeline::lexicon::Lexicon;
use tracing::debug;

/// Scores of the two candidate header lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationScore {
    pub first_row: f64,
    pub first_column: f64,
}

/// Result of structure analysis: the re-oriented, header-repaired table.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredTable {
    pub table: RawTable,
    pub orientation: Orientation,
    pub header: HeaderSource,
    pub score: OrientationScore,
}

/// Decides orientation and repairs the header row.
#[derive(Debug, Clone, Copy)]
pub struct TableStructureAnalyzer<'a> {
    lexicon: &'a Lexicon,
    shape: &'a IdentifierShape,
    heuristics: &'a Heuristics,
}

impl<'a> TableStructureAnalyzer<'a> {
    pub fn new(lexicon: &'a Lexicon, shape: &'a IdentifierShape, heuristics: &'a Heuristics) -> Self {
        Self {
            lexicon,
            shape,
            heuristics,
        }
    }

    /// Header-likeness of one line of cells. Blank cells are ignored; a line
    /// with no values scores 0.
    pub fn line_score<'c>(&self, cells: impl IntoIterator<Item = &'c str>) -> f64 {
        let mut total = 0usize;
        let mut headers = 0usize;
        let mut identifiers = 0usize;
        for cell in cells.into_iter().filter(|c| !is_blank(c)) {
            total += 1;
            if self.shape.matches(cell) {
                identifiers += 1;
            } else if self.lexicon.is_header_token(cell) {
                headers += 1;
            }
        }
        if total == 0 {
            return 0.0;
        }
        let n = total as f64;
        headers as f64 / n - self.heuristics.identifier_penalty * identifiers as f64 / n
    }

    pub fn score(&self, table: &RawTable) -> OrientationScore {
        let first_row = table
            .rows()
            .first()
            .map(|r| self.line_score(r.iter().map(String::as_str)))
            .unwrap_or(0.0);
        let first_column = self.line_score(table.column(0));
        OrientationScore {
            first_row,
            first_column,
        }
    }

    /// Decide whether the table's semantic rows are its physical columns.
    pub fn detect_orientation(&self, table: &RawTable) -> (Orientation, OrientationScore) {
        let score = self.score(table);
        let orientation = if score.first_column > 0.0
            && score.first_column > score.first_row + self.heuristics.transpose_margin
        {
            Orientation::Transposed
        } else {
            Orientation::Normal
        };
        (orientation, score)
    }

    /// Orient the table and repair its header row.
    pub fn analyze(&self, table: &RawTable) -> StructuredTable {
        let (orientation, score) = self.detect_orientation(table);
        let oriented = match orientation {
            Orientation::Normal => table.clone(),
            Orientation::Transposed => table.transpose(),
        };
        debug!(
            "orientation {:?} (row {:.2}, column {:.2})",
            orientation, score.first_row, score.first_column
        );
        let (table, header) = self.repair_header(oriented);
        StructuredTable {
            table,
            orientation,
            header,
            score,
        }
    }

    fn repair_header(&self, table: RawTable) -> (RawTable, HeaderSource) {
        if is_spreadsheet_letter_row(&table) {
            debug!("dropping spreadsheet column-letter row");
            let rows = table.into_rows().into_iter().skip(1).collect();
            return (RawTable::new(rows), HeaderSource::PromotedRow);
        }
        if self.first_row_is_data(&table) {
            debug!("first row holds data; synthesising Column_N header");
            let columns = table.column_count();
            let mut rows = Vec::with_capacity(table.row_count() + 1);
            rows.push((1..=columns).map(|i| format!("Column_{i}")).collect());
            rows.extend(table.into_rows());
            return (RawTable::new(rows), HeaderSource::Synthesized);
        }
        (table, HeaderSource::Original)
    }

    fn first_row_is_data(&self, table: &RawTable) -> bool {
        let Some(first) = table.rows().first() else {
            return false;
        };
        let mut has_identifier = false;
        for cell in first.iter().filter(|c| !is_blank(c)) {
            if self.lexicon.is_header_token(cell) {
                return false;
            }
            has_identifier |= self.shape.matches(cell);
        }
        has_identifier
    }
}

/// Row 0 is spreadsheet column letters and row 1 is a real header.
///
/// Requires more than two columns, single uppercase ASCII letters in over
/// half of row 0, and text (something beyond a lone letter) in at least
/// 60% of row 1.
fn is_spreadsheet_letter_row(table: &RawTable) -> bool {
    let columns = table.column_count();
    if columns <= 2 || table.row_count() < 2 {
        return false;
    }
    let rows = table.rows();
    let letters = rows[0]
        .iter()
        .filter(|c| {
            let c = c.trim();
            c.len() == 1 && c.bytes().all(|b| b.is_ascii_uppercase())
        })
        .count();
    if letters * 2 <= columns {
        return false;
    }
    let meaningful = rows[1]
        .iter()
        .filter(|c| {
            let c = c.trim();
            c.chars().count() > 1 && c.chars().any(char::is_alphabetic)
        })
        .count();
    meaningful as f64 >= columns as f64 * 0.6
}
