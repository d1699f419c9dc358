//! Canonical reordering: Identifier, FirstName, LastName, then the rest.
//!
//! When several columns share a canonical role (a roster with both a
//! `ת.ז` and a `Passport` column, say) they are merged into one: each row
//! takes the first non-empty value among the candidate columns, left to
//! right, and the secondary candidates are dropped. The header row is merged
//! the same way, so the surviving header is the leftmost candidate's.
//!
//! `Other` columns keep their relative order. Reordering a table that is
//! already canonical returns it unchanged.

use crate::model::{is_blank, ClassifiedTable, ColumnRole, RawTable};
use tracing::debug;

pub fn reorder(table: &ClassifiedTable) -> ClassifiedTable {
    let source = table.rows.rows();
    let mut columns: Vec<Vec<String>> = Vec::with_capacity(table.roles.len());
    let mut roles = Vec::with_capacity(table.roles.len());

    for role in ColumnRole::CANONICAL {
        let candidates = table.columns_with(role);
        if candidates.is_empty() {
            continue;
        }
        if candidates.len() > 1 {
            debug!(
                "merging {} {} columns (indices {:?})",
                candidates.len(),
                role,
                candidates
            );
        }
        let merged = source
            .iter()
            .map(|row| first_filled(row, &candidates))
            .collect();
        columns.push(merged);
        roles.push(role);
    }

    for index in table.columns_with(ColumnRole::Other) {
        columns.push(source.iter().map(|row| row[index].clone()).collect());
        roles.push(ColumnRole::Other);
    }

    let rows = (0..source.len())
        .map(|r| columns.iter().map(|col| col[r].clone()).collect())
        .collect();

    ClassifiedTable {
        table_index: table.table_index,
        orientation: table.orientation,
        header: table.header,
        roles,
        rows: RawTable::new(rows),
    }
}

/// First non-blank cell among `candidates`; the first candidate's cell if
/// all are blank.
fn first_filled(row: &[String], candidates: &[usize]) -> String {
    candidates
        .iter()
        .map(|&c| &row[c])
        .find(|cell| !is_blank(cell))
        .unwrap_or(&row[candidates[0]])
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn canonical_columns_lead_in_order() {
        let t = classified(
            &[&["שם פרטי", "תז", "שם משפחה"], &["Rachel", "519499492", "Adar"]],
            vec![FirstName, Identifier, LastName],
        );
        let out = reorder(&t);
        assert_eq!(out.roles, vec![Identifier, FirstName, LastName]);
        assert_eq!(out.rows.rows()[0], vec!["תז", "שם פרטי", "שם משפחה"]);
        assert_eq!(out.rows.rows()[1], vec!["519499492", "Rachel", "Adar"]);
        assert!(out.is_canonical());
    }

    #[test]
    fn duplicate_identifier_columns_are_merged() {
        let t = classified(
            &[&["ID", "Passport"], &["1", ""], &["", "2"], &["3", "9"]],
            vec![Identifier, Identifier],
        );
        let out = reorder(&t);
        assert_eq!(out.roles, vec![Identifier]);
        assert_eq!(out.rows.column(0), vec!["ID", "1", "2", "3"]);
    }

    #[test]
    fn other_columns_keep_relative_order() {
        let t = classified(
            &[&["Sign", "Last", "Phone", "ID"], &["s", "Adar", "052", "519499492"]],
            vec![Other, LastName, Other, Identifier],
        );
        let out = reorder(&t);
        assert_eq!(out.roles, vec![Identifier, LastName, Other, Other]);
        assert_eq!(out.rows.rows()[0], vec!["ID", "Last", "Sign", "Phone"]);
    }

    #[test]
    fn reorder_is_a_fixed_point() {
        let t = classified(
            &[
                &["Phone", "שם", "ID", "Passport", "משפחה"],
                &["052", "Dana", "", "A1234567", "Levi"],
            ],
            vec![Other, FirstName, Identifier, Identifier, LastName],
        );
        let once = reorder(&t);
        let twice = reorder(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn all_blank_candidates_keep_first_value() {
        let t = classified(&[&["ID", "ת.ז"], &[" ", ""]], vec![Identifier, Identifier]);
        let out = reorder(&t);
        assert_eq!(out.rows.rows()[1], vec![" "]);
    }

    #[test]
    fn table_without_canonical_columns_is_unchanged() {
        let t = classified(&[&["Score", "Grade"], &["90", "A"]], vec![Other, Other]);
        assert_eq!(reorder(&t), t);
    }
}
