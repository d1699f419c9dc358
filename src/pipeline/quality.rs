//! Column quality: a clean-up pass over `Other` columns after reordering.
//!
//! OCR leaves debris that classification alone cannot remove:
//!
//! * columns with a header but no values at all;
//! * columns whose "header" is really a data value (an ID number, a date,
//!   a phone number) promoted into row 0;
//! * identifiers that landed in an unlabelled neighbour of the ID column.
//!
//! The pass runs in that order of concern, but mechanically it first moves
//! stray identifiers out of unlabelled columns (blank, `Column_N`, or
//! data-valued header) into blank cells of the ID column, then drops `Other`
//! columns that are empty or data-headed. Canonical columns are never
//! dropped, and a table whose every column would go is left alone.
//!
//! Surviving `Other` columns the lexicon does not recognise are reported,
//! so new header spellings can be added to a lexicon file.

use crate::model::{is_blank, ClassifiedTable, ColumnRole, RawTable};
use crate::pipeline::identifier::IdentifierShape;
use crate::pipeline::lexicon::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;

static RE_SYNTHETIC_HEADER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^Column_\d+$").unwrap());

static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,2}[/.]\d{1,2}[/.]\d{2,4}|\d{4}-\d{2}-\d{2})$").unwrap()
});

static RE_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0\d{1,2}-?\d{7}|\d{3}-\d{3}-\d{4})$").unwrap());

static RE_LONG_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{7,}$").unwrap());

/// What one pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualityReport {
    /// Identifier values moved into the ID column.
    pub moved_identifiers: usize,
    /// Headers of the dropped columns.
    pub dropped: Vec<String>,
    /// Headers of kept `Other` columns the lexicon does not know.
    pub unrecognised: Vec<String>,
}

impl QualityReport {
    pub fn is_empty(&self) -> bool {
        self.moved_identifiers == 0 && self.dropped.is_empty() && self.unrecognised.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnQuality<'a> {
    lexicon: &'a Lexicon,
    shape: &'a IdentifierShape,
}

impl<'a> ColumnQuality<'a> {
    pub fn new(lexicon: &'a Lexicon, shape: &'a IdentifierShape) -> Self {
        Self { lexicon, shape }
    }

    /// `true` if a header cell holds a value rather than a column title.
    pub fn is_data_header(&self, header: &str) -> bool {
        let h = header.trim();
        !h.is_empty()
            && (self.shape.matches(h)
                || RE_LONG_NUMBER.is_match(h)
                || RE_DATE.is_match(h)
                || RE_PHONE.is_match(h))
    }

    fn is_unlabelled(&self, header: &str) -> bool {
        is_blank(header) || RE_SYNTHETIC_HEADER.is_match(header.trim()) || self.is_data_header(header)
    }

    /// Clean a reordered table. The result is still canonical, and applying
    /// the pass again changes nothing.
    pub fn apply(&self, table: ClassifiedTable) -> (ClassifiedTable, QualityReport) {
        let mut report = QualityReport::default();
        let mut rows = table.rows.rows().to_vec();
        let header: Vec<String> = table.header_row().to_vec();
        let others = table.columns_with(ColumnRole::Other);

        if let Some(id) = table.columns_with(ColumnRole::Identifier).first().copied() {
            for &c in others.iter().filter(|&&c| self.is_unlabelled(&header[c])) {
                for row in rows.iter_mut().skip(1) {
                    if is_blank(&row[id]) && self.shape.matches(&row[c]) {
                        row[id] = row[c].trim().to_string();
                        row[c].clear();
                        report.moved_identifiers += 1;
                    }
                }
            }
        }

        let drop: Vec<usize> = others
            .iter()
            .copied()
            .filter(|&c| {
                self.is_data_header(&header[c]) || rows.iter().skip(1).all(|r| is_blank(&r[c]))
            })
            .collect();
        let keep: Vec<usize> = (0..table.roles.len()).filter(|c| !drop.contains(c)).collect();
        let (keep, drop) = if keep.is_empty() {
            ((0..table.roles.len()).collect(), Vec::new())
        } else {
            (keep, drop)
        };

        report.dropped = drop.iter().map(|&c| header[c].clone()).collect();
        report.unrecognised = keep
            .iter()
            .filter(|&&c| table.roles[c] == ColumnRole::Other)
            .map(|&c| header[c].as_str())
            .filter(|h| !self.is_unlabelled(h) && self.lexicon.lookup(h).is_none())
            .map(str::to_string)
            .collect();

        let rows = rows
            .into_iter()
            .map(|row| keep.iter().map(|&c| row[c].clone()).collect())
            .collect();
        let roles = keep.iter().map(|&c| table.roles[c]).collect();
        (
            ClassifiedTable {
                roles,
                rows: RawTable::new(rows),
                ..table
            },
            report,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Heuristics;
    use crate::model::{HeaderSource, Orientation};
    use ColumnRole::*;

    fn classified(rows: &[&[&str]], roles: Vec<ColumnRole>) -> ClassifiedTable {
        ClassifiedTable {
            table_index: 0,
            orientation: Orientation::Normal,
            header: HeaderSource::Original,
            roles,
            rows: RawTable::new(
                rows.iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            ),
        }
    }

    fn run(t: ClassifiedTable) -> (ClassifiedTable, QualityReport) {
        let lexicon = Lexicon::bilingual();
        let shape = IdentifierShape::new(&Heuristics::default()).unwrap();
        ColumnQuality::new(&lexicon, &shape).apply(t)
    }

    #[test]
    fn empty_other_columns_are_dropped() {
        let t = classified(
            &[&["תז", "חתימה", "", "Grade"], &["519499492", "", " ", "90"], &["301234567", "", "", ""]],
            vec![Identifier, Other, Other, Other],
        );
        let (out, report) = run(t);
        assert_eq!(out.roles, vec![Identifier, Other]);
        assert_eq!(out.rows.rows()[0], vec!["תז", "Grade"]);
        assert_eq!(report.dropped, vec!["חתימה", ""]);
        assert!(out.is_canonical());
    }

    #[test]
    fn data_valued_headers_are_dropped() {
        let t = classified(
            &[
                &["ID", "First Name", "12/09/2023", "052-1234567", "Notes"],
                &["519499492", "Rachel", "present", "x", "ok"],
            ],
            vec![Identifier, FirstName, Other, Other, Other],
        );
        let (out, report) = run(t);
        assert_eq!(out.rows.rows()[0], vec!["ID", "First Name", "Notes"]);
        assert_eq!(report.dropped.len(), 2);
    }

    #[test]
    fn stray_identifiers_move_into_blank_id_cells() {
        let t = classified(
            &[
                &["תז", "שם פרטי", "519499492", "Column_4"],
                &["", "Rachel", "", "301234567"],
                &["", "Dana", "204512345", ""],
                &["111111118", "Noa", "222222226", ""],
            ],
            vec![Identifier, FirstName, Other, Other],
        );
        let (out, report) = run(t);
        assert_eq!(report.moved_identifiers, 2);
        assert_eq!(out.roles, vec![Identifier, FirstName]);
        assert_eq!(out.rows.column(0), vec!["תז", "301234567", "204512345", "111111118"]);
    }

    #[test]
    fn labelled_number_columns_keep_their_values() {
        let t = classified(
            &[&["ID", "Employee Number"], &["", "1234567"], &["519499492", "7654321"]],
            vec![Identifier, Other],
        );
        let (out, report) = run(t.clone());
        assert_eq!(report.moved_identifiers, 0);
        assert_eq!(out, t);
    }

    #[test]
    fn unknown_headers_are_reported() {
        let t = classified(
            &[&["ID", "Allergies", "Phone"], &["519499492", "none", "052"]],
            vec![Identifier, Other, Other],
        );
        let (out, report) = run(t.clone());
        assert_eq!(out, t);
        assert_eq!(report.unrecognised, vec!["Allergies"]);
    }

    #[test]
    fn table_is_kept_when_every_column_would_go() {
        let t = classified(&[&["Notes", "Signature"], &["", ""]], vec![Other, Other]);
        let (out, report) = run(t.clone());
        assert_eq!(out, t);
        assert!(report.dropped.is_empty());
    }

    #[test]
    fn second_pass_changes_nothing() {
        let t = classified(
            &[
                &["ID", "Column_2", "", "Grade"],
                &["", "519499492", "", "90"],
                &["301234567", "A1234567", "", "85"],
            ],
            vec![Identifier, Other, Other, Other],
        );
        let (once, _) = run(t);
        let (twice, report) = run(once.clone());
        assert_eq!(once, twice);
        assert!(report.dropped.is_empty());
        assert_eq!(report.moved_identifiers, 0);
    }

    #[test]
    fn data_header_detection() {
        let lexicon = Lexicon::bilingual();
        let shape = IdentifierShape::new(&Heuristics::default()).unwrap();
        let q = ColumnQuality::new(&lexicon, &shape);
        for h in ["519499492", "12/09/2023", "2023-09-12", "1.9.24", "052-1234567", "555-123-4567"] {
            assert!(q.is_data_header(h), "{h}");
        }
        for h in ["", "Grade", "Class 3", "90", "Column_2", "Date"] {
            assert!(!q.is_data_header(h), "{h}");
        }
    }
}
