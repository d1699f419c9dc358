//! Column classification: one [`ColumnRole`] per column.
//!
//! The header cell is looked up in the lexicon first. Only a header the
//! lexicon does not recognise falls through to content sniffing: if a strict
//! majority of the column's non-empty data cells are identifier-shaped, the
//! column is an Identifier. A recognised header is never overridden by its
//! contents.

use crate::config::Heuristics;
use crate::model::{is_blank, ColumnRole, RawTable};
use crate::pipeline::identifier::IdentifierShape;
use crate::pipeline::lexicon::Lexicon;

#[derive(Debug, Clone, Copy)]
pub struct ColumnClassifier<'a> {
    lexicon: &'a Lexicon,
    shape: &'a IdentifierShape,
    heuristics: &'a Heuristics,
}

impl<'a> ColumnClassifier<'a> {
    pub fn new(lexicon: &'a Lexicon, shape: &'a IdentifierShape, heuristics: &'a Heuristics) -> Self {
        Self {
            lexicon,
            shape,
            heuristics,
        }
    }

    /// Roles for every column of `table`, whose row 0 is the header.
    pub fn classify(&self, table: &RawTable) -> Vec<ColumnRole> {
        (0..table.column_count())
            .map(|c| self.classify_column(table, c))
            .collect()
    }

    pub fn classify_column(&self, table: &RawTable, column: usize) -> ColumnRole {
        let header = table.cell(0, column).unwrap_or("");
        if let Some(role) = self.lexicon.lookup(header) {
            return role;
        }
        if self.looks_like_identifiers(table.column(column).into_iter().skip(1)) {
            ColumnRole::Identifier
        } else {
            ColumnRole::Other
        }
    }

    fn looks_like_identifiers<'c>(&self, cells: impl Iterator<Item = &'c str>) -> bool {
        let (mut total, mut shaped) = (0usize, 0usize);
        for cell in cells.filter(|c| !is_blank(c)) {
            total += 1;
            if self.shape.matches(cell) {
                shaped += 1;
            }
        }
        total >= self.heuristics.sniff_min_cells.max(1)
            && shaped as f64 > self.heuristics.sniff_majority * total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    fn roles(t: &RawTable) -> Vec<ColumnRole> {
        let heuristics = Heuristics::default();
        let lexicon = Lexicon::bilingual();
        let shape = IdentifierShape::new(&heuristics).unwrap();
        ColumnClassifier::new(&lexicon, &shape, &heuristics).classify(t)
    }

    #[test]
    fn hebrew_headers_by_lexicon() {
        let t = table(&[&["שם פרטי", "תז", "שם משפחה"], &["Rachel", "519499492", "Adar"]]);
        assert_eq!(
            roles(&t),
            vec![ColumnRole::FirstName, ColumnRole::Identifier, ColumnRole::LastName]
        );
    }

    #[test]
    fn unknown_header_with_identifier_majority_is_sniffed() {
        let t = table(&[
            &["Column_1", "Whatever"],
            &["519499492", "x"],
            &["301234567", "y"],
            &["n/a", "z"],
        ]);
        assert_eq!(roles(&t), vec![ColumnRole::Identifier, ColumnRole::Other]);
    }

    #[test]
    fn exactly_half_is_not_a_majority() {
        let t = table(&[&["Code"], &["519499492"], &["n/a"]]);
        assert_eq!(roles(&t), vec![ColumnRole::Other]);
    }

    #[test]
    fn blank_cells_do_not_count() {
        let t = table(&[&["Code"], &["519499492"], &[""], &["  "]]);
        assert_eq!(roles(&t), vec![ColumnRole::Identifier]);
    }

    #[test]
    fn recognised_header_is_not_overridden_by_content() {
        let t = table(&[&["Phone"], &["0521234567"], &["0539876543"]]);
        assert_eq!(roles(&t), vec![ColumnRole::Other]);
    }

    #[test]
    fn empty_column_is_other() {
        let t = table(&[&["", "ID"], &["", "519499492"]]);
        assert_eq!(roles(&t), vec![ColumnRole::Other, ColumnRole::Identifier]);
    }
}
