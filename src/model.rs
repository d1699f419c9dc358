//! Core data model: documents, fingerprints, tables and column roles.
//!
//! Every stage of the pipeline speaks in these types. [`RawTable`] is what
//! the extraction service hands back (or what the cache replays), and
//! [`ClassifiedTable`] is a raw table after orientation, role assignment
//! and canonical reordering.

use crate::error::OversizedTable;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// `true` when a cell holds no value: empty or whitespace only.
///
/// This is the single definition of "missing value" used by the classifier,
/// the reorderer and the aggregator.
pub fn is_blank(cell: &str) -> bool {
    cell.trim().is_empty()
}

// ── SourceDocument ───────────────────────────────────────────────────────

/// A document to process: opaque bytes plus a display name.
///
/// The name is only used for reporting and for naming cache artifacts.
/// Cache identity is the [`ContentFingerprint`] of `bytes`.
#[derive(Clone)]
pub struct SourceDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk; the display name is the file name.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(display_name(path), bytes))
    }

    /// File-name-safe stem of the display name, used in cache artifact names.
    ///
    /// `"rosters/Class 3.pdf"` → `"Class 3"`. Characters that are unsafe in
    /// file names are replaced by `_`; an empty stem becomes `"document"`.
    pub fn base_name(&self) -> String {
        let file = self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name);
        let stem = match file.rfind('.') {
            Some(pos) if pos > 0 => &file[..pos],
            _ => file,
        };
        let cleaned: String = stem
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .collect();
        let cleaned = cleaned.trim();
        if cleaned.is_empty() {
            "document".to_string()
        } else {
            cleaned.to_string()
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("name", &self.name)
            .field("bytes", &format_args!("<{} bytes>", self.bytes.len()))
            .finish()
    }
}

pub(crate) fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ── ContentFingerprint ───────────────────────────────────────────────────

/// Lowercase hex SHA-256 digest of a document's bytes.
///
/// Produced by [`crate::pipeline::fingerprint::fingerprint`]; the only cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Length of the hex string.
    pub const HEX_LEN: usize = 64;

    pub(crate) fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    /// Parse a previously rendered fingerprint. Accepts exactly 64 hex digits.
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.len() == Self::HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(s.to_ascii_lowercase()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first `len` hex characters (the whole string if `len` is larger).
    pub fn prefix(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentFingerprint {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("not a 64-digit hex fingerprint: '{value}'"))
    }
}

impl From<ContentFingerprint> for String {
    fn from(fp: ContentFingerprint) -> Self {
        fp.0
    }
}

// ── RawTable ─────────────────────────────────────────────────────────────

/// Largest grid [`RawTable::from_cells`] will allocate.
pub const MAX_TABLE_CELLS: usize = 1 << 20;

/// A rectangular grid of cell text, row-major.
///
/// Construction pads short rows with empty cells so every row has
/// `column_count` cells. Serialises as a bare array of rows.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Vec<String>>", into = "Vec<Vec<String>>")]
pub struct RawTable {
    rows: Vec<Vec<String>>,
    columns: usize,
}

impl RawTable {
    pub fn new(mut rows: Vec<Vec<String>>) -> Self {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut rows {
            row.resize(columns, String::new());
        }
        Self { rows, columns }
    }

    /// Build a table from positioned cells `(row, column, content)`.
    ///
    /// Content is trimmed, later cells at the same position win, and rows
    /// that are blank in every cell are dropped. Fails before allocating if
    /// the indices span more than [`MAX_TABLE_CELLS`] cells.
    pub fn from_cells<I, S>(cells: I) -> Result<Self, OversizedTable>
    where
        I: IntoIterator<Item = (usize, usize, S)>,
        S: AsRef<str>,
    {
        let cells: Vec<(usize, usize, S)> = cells.into_iter().collect();
        let rows = cells.iter().map(|(r, _, _)| r.saturating_add(1)).max().unwrap_or(0);
        let columns = cells.iter().map(|(_, c, _)| c.saturating_add(1)).max().unwrap_or(0);
        if rows.checked_mul(columns).map_or(true, |n| n > MAX_TABLE_CELLS) {
            return Err(OversizedTable {
                rows,
                columns,
                limit: MAX_TABLE_CELLS,
            });
        }

        let mut grid = vec![vec![String::new(); columns]; rows];
        for (r, c, content) in &cells {
            grid[*r][*c] = content.as_ref().trim().to_string();
        }
        grid.retain(|row| row.iter().any(|cell| !is_blank(cell)));

        Ok(Self::new(grid))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<String>> {
        self.rows
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row).and_then(|r| r.get(column)).map(String::as_str)
    }

    /// The cells of column `index`, top to bottom.
    pub fn column(&self, index: usize) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|r| r.get(index).map(String::as_str))
            .collect()
    }

    /// No rows, or every cell blank.
    pub fn is_blank(&self) -> bool {
        self.rows.iter().flatten().all(|c| is_blank(c))
    }

    /// Swap rows and columns.
    pub fn transpose(&self) -> Self {
        let rows = (0..self.columns)
            .map(|c| self.rows.iter().map(|r| r[c].clone()).collect())
            .collect();
        Self::new(rows)
    }
}

impl From<Vec<Vec<String>>> for RawTable {
    fn from(rows: Vec<Vec<String>>) -> Self {
        Self::new(rows)
    }
}

impl From<RawTable> for Vec<Vec<String>> {
    fn from(table: RawTable) -> Self {
        table.rows
    }
}

// ── Orientation / roles ──────────────────────────────────────────────────

/// Whether a table's semantic rows match its physical rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Normal,
    Transposed,
}

/// Canonical role of a column.
///
/// Declaration order is the canonical output order and the tie-break order
/// for lexicon matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnRole {
    Identifier,
    FirstName,
    LastName,
    Other,
}

impl ColumnRole {
    /// The roles that are merged down to a single column, in output order.
    pub const CANONICAL: [ColumnRole; 3] = [
        ColumnRole::Identifier,
        ColumnRole::FirstName,
        ColumnRole::LastName,
    ];

    /// Column title used in the unified dataset; `None` for `Other`.
    pub fn label(self) -> Option<&'static str> {
        match self {
            ColumnRole::Identifier => Some("ID"),
            ColumnRole::FirstName => Some("First Name"),
            ColumnRole::LastName => Some("Last Name"),
            ColumnRole::Other => None,
        }
    }
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnRole::Identifier => "Identifier",
            ColumnRole::FirstName => "FirstName",
            ColumnRole::LastName => "LastName",
            ColumnRole::Other => "Other",
        };
        f.write_str(s)
    }
}

/// Where row 0 of a classified table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderSource {
    /// Row 0 as extracted (after re-orientation).
    #[default]
    Original,
    /// Row 0 was spreadsheet column letters and was replaced by row 1.
    PromotedRow,
    /// Row 0 held data; a `Column_N` header row was inserted above it.
    Synthesized,
}

// ── ClassifiedTable ──────────────────────────────────────────────────────

/// A table with a decided orientation and one role per column.
///
/// Row 0 is the header row. After [`crate::pipeline::reorder::reorder`] at
/// most one column carries each of Identifier, FirstName and LastName and
/// they lead the table in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedTable {
    /// Position of the table in the extraction response.
    pub table_index: usize,
    pub orientation: Orientation,
    #[serde(default)]
    pub header: HeaderSource,
    pub roles: Vec<ColumnRole>,
    pub rows: RawTable,
}

impl ClassifiedTable {
    pub fn header_row(&self) -> &[String] {
        self.rows.rows().first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rows after the header.
    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.rows().get(1..).unwrap_or(&[])
    }

    /// Column indices carrying `role`, left to right.
    pub fn columns_with(&self, role: ColumnRole) -> Vec<usize> {
        self.roles
            .iter()
            .enumerate()
            .filter(|(_, r)| **r == role)
            .map(|(i, _)| i)
            .collect()
    }

    /// Roles line up with columns, each canonical role appears at most once,
    /// and canonical roles precede every `Other` column in canonical order.
    pub fn is_canonical(&self) -> bool {
        if self.roles.len() != self.rows.column_count() {
            return false;
        }
        self.roles.windows(2).all(|w| {
            w[0] < w[1] || (w[0] == ColumnRole::Other && w[1] == ColumnRole::Other)
        })
    }
}
