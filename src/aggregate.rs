//! Folds per-document outcomes into the unified dataset and run statistics.
//!
//! Aggregation is order-independent: outcomes are sorted by input index
//! first, so the same batch always yields the same dataset regardless of
//! which document finished first.

use crate::model::{is_blank, ClassifiedTable, ColumnRole};
use crate::output::{
    BatchResult, BatchStats, DocumentOutcome, DocumentStatus, Origin, UnifiedDataset, UnifiedRow,
};

/// Title of the provenance column in tabular exports.
pub const SOURCE_COLUMN: &str = "Source File";

/// Build a [`BatchResult`] from outcomes in any order.
pub fn aggregate(mut outcomes: Vec<DocumentOutcome>, duration_ms: u64) -> BatchResult {
    outcomes.sort_by_key(|o| o.index);
    let dataset = unify(&outcomes);
    let stats = compute_stats(&outcomes, &dataset, duration_ms);
    BatchResult {
        dataset,
        documents: outcomes,
        stats,
    }
}

/// Merge every table of every outcome under one header.
///
/// Columns are `ID`, `First Name`, `Last Name` (those present in at least
/// one table), then every other header in first-seen order. Columns of one
/// table that map to the same unified column are merged, first non-blank
/// value wins.
pub fn unify(outcomes: &[DocumentOutcome]) -> UnifiedDataset {
    let tables: Vec<(&str, &ClassifiedTable)> = outcomes
        .iter()
        .flat_map(|o| o.tables().iter().map(move |t| (o.name.as_str(), t)))
        .collect();

    let mut columns: Vec<String> = ColumnRole::CANONICAL
        .iter()
        .filter(|role| tables.iter().any(|(_, t)| t.roles.contains(role)))
        .filter_map(|role| role.label())
        .map(String::from)
        .collect();

    // Per table: unified column index for each of its columns.
    let mut plans: Vec<Vec<usize>> = Vec::with_capacity(tables.len());
    for (_, table) in &tables {
        let plan = table
            .header_row()
            .iter()
            .zip(&table.roles)
            .enumerate()
            .map(|(pos, (header, role))| {
                let name = column_name(pos, header, *role);
                match columns.iter().position(|c| *c == name) {
                    Some(i) => i,
                    None => {
                        columns.push(name);
                        columns.len() - 1
                    }
                }
            })
            .collect();
        plans.push(plan);
    }

    let mut rows = Vec::new();
    for ((source, table), plan) in tables.iter().zip(&plans) {
        for row in table.data_rows() {
            if row.iter().all(|c| is_blank(c)) {
                continue;
            }
            let mut cells = vec![String::new(); columns.len()];
            for (value, target) in row.iter().zip(plan) {
                let cell = &mut cells[*target];
                if is_blank(cell) && !is_blank(value) {
                    *cell = value.trim().to_string();
                }
            }
            rows.push(UnifiedRow {
                source: source.to_string(),
                table_index: table.table_index,
                cells,
            });
        }
    }

    UnifiedDataset { columns, rows }
}

fn column_name(pos: usize, header: &str, role: ColumnRole) -> String {
    if let Some(label) = role.label() {
        return label.to_string();
    }
    let cleaned = header.split_whitespace().collect::<Vec<_>>().join(" ");
    if cleaned.is_empty() {
        format!("Column_{}", pos + 1)
    } else {
        cleaned
    }
}

fn compute_stats(outcomes: &[DocumentOutcome], dataset: &UnifiedDataset, duration_ms: u64) -> BatchStats {
    let mut stats = BatchStats {
        documents: outcomes.len(),
        duration_ms,
        rows: dataset.rows.len(),
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome.origin {
            Origin::Cache => stats.cache_hits += 1,
            Origin::Service => stats.fresh_extractions += 1,
            Origin::Local => {}
        }
        if outcome.origin != Origin::Cache && outcome.fingerprint.is_some() {
            stats.cache_misses += 1;
        }
        match &outcome.status {
            DocumentStatus::Tables { tables } => stats.tables += tables.len(),
            DocumentStatus::NoTables => stats.no_tables += 1,
            DocumentStatus::Failed { .. } => stats.errors += 1,
        }
        if outcome.cache_error.is_some() {
            stats.cache_write_errors += 1;
        }
    }

    if let Some(id) = ColumnRole::Identifier
        .label()
        .and_then(|label| dataset.column_index(label))
    {
        stats.rows_with_identifier = dataset
            .rows
            .iter()
            .filter(|r| r.cells.get(id).is_some_and(|c| !is_blank(c)))
            .count();
    }
    stats.cache_hit_ratio = ratio(stats.cache_hits, stats.documents);
    stats.identifier_fill_ratio = ratio(stats.rows_with_identifier, stats.rows);
    stats
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Render the dataset as tab-separated text with a leading
/// [`SOURCE_COLUMN`]. Tabs and line breaks inside cells become spaces.
pub fn to_tsv(dataset: &UnifiedDataset) -> String {
    fn clean(cell: &str) -> String {
        cell.replace(['\t', '\r', '\n'], " ")
    }

    let mut out = String::new();
    out.push_str(SOURCE_COLUMN);
    for column in &dataset.columns {
        out.push('\t');
        out.push_str(&clean(column));
    }
    out.push('\n');
    for row in &dataset.rows {
        out.push_str(&clean(&row.source));
        for cell in &row.cells {
            out.push('\t');
            out.push_str(&clean(cell));
        }
        out.push('\n');
    }
    out
}
