//! Table formatting utilities for structured output.

use std::collections::BTreeMap;

use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};

use crate::lid::ProfileStats;
use crate::results::TrialResult;
use crate::sweep::{Algorithm, GridEntry, SweepReport, format_alpha};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Right-align the given columns (numbers).
    pub fn align_right(mut self, columns: &[usize]) -> Self {
        for &index in columns {
            if let Some(column) = self.table.column_mut(index) {
                column.set_cell_alignment(CellAlignment::Right);
            }
        }
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// One row per LID profile.
pub fn create_lid_stats_table(profiles: &[(String, ProfileStats)]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "Profile", "Count", "Mean", "Std", "Min", "Max", "Median",
    ]);
    for (name, s) in profiles {
        builder = builder.add_row(vec![
            name.clone(),
            s.count.to_string(),
            format!("{:.3}", s.mean),
            format!("{:.3}", s.std),
            format!("{:.3}", s.min),
            format!("{:.3}", s.max),
            format!("{:.3}", s.median),
        ]);
    }
    builder.align_right(&[1, 2, 3, 4, 5, 6]).build()
}

/// The expanded grid, as shown by a dry run.
pub fn create_grid_table(grid: &[GridEntry]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec![
        "#", "Dataset", "R", "Algorithm", "Alpha", "L values", "Artifact prefix",
    ]);
    for (index, entry) in grid.iter().enumerate() {
        let c = &entry.config;
        let alpha = match c.algorithm {
            Algorithm::Baseline => "-".to_string(),
            Algorithm::Adaptive => {
                format!("[{}, {}]", format_alpha(c.alpha.min), format_alpha(c.alpha.max))
            }
        };
        let ls: Vec<String> = entry.l_values.iter().map(u32::to_string).collect();
        builder = builder.add_row(vec![
            (index + 1).to_string(),
            c.dataset.clone(),
            c.r.to_string(),
            c.algorithm.label().to_string(),
            alpha,
            ls.join(","),
            c.artifact_prefix(),
        ]);
    }
    builder.align_right(&[0, 2]).build()
}

/// Counters of a finished sweep; failures are highlighted.
pub fn create_sweep_report_table(report: &SweepReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(vec![
        Cell::new("Metric").add_attribute(Attribute::Bold),
        Cell::new("Count").add_attribute(Attribute::Bold),
    ]);

    let rows = [
        ("Configurations", report.configurations, false),
        ("Skipped (recorded)", report.skipped, false),
        ("Inputs unavailable", report.unavailable, true),
        ("Indexes built", report.built, false),
        ("Indexes reused", report.reused, false),
        ("Build failures", report.build_failed, true),
        ("Searches", report.searches, false),
        ("Search failures", report.search_failed, true),
        ("Rows recorded", report.recorded, false),
    ];
    for (label, count, is_failure) in rows {
        let mut cell = Cell::new(count);
        if is_failure && count > 0 {
            cell = cell.fg(Color::Red).add_attribute(Attribute::Bold);
        }
        table.add_row(vec![Cell::new(label), cell]);
    }
    table.to_string()
}

/// Best recall per configuration, with the L and QPS it was reached at.
///
/// Ties on recall go to the higher QPS.
pub fn create_ledger_summary_table(rows: &[TrialResult]) -> String {
    let mut best: BTreeMap<(String, u32, String, String, &'static str), &TrialResult> =
        BTreeMap::new();
    for row in rows {
        let c = &row.config;
        let key = (
            c.dataset.clone(),
            c.r,
            format_alpha(c.alpha.min),
            format_alpha(c.alpha.max),
            c.algorithm.label(),
        );
        best.entry(key)
            .and_modify(|current| {
                let better = row.recall > current.recall
                    || (row.recall == current.recall && row.qps > current.qps);
                if better {
                    *current = row;
                }
            })
            .or_insert(row);
    }

    let mut builder = TableBuilder::new().set_headers(vec![
        "Dataset",
        "R",
        "Algorithm",
        "Alpha",
        "Best Recall",
        "at L",
        "QPS",
        "Latency",
    ]);
    for ((dataset, r, amin, amax, label), row) in &best {
        builder = builder.add_row(vec![
            dataset.clone(),
            r.to_string(),
            (*label).to_string(),
            format!("[{amin}, {amax}]"),
            format!("{:.2}", row.recall),
            row.search_l.to_string(),
            format!("{:.1}", row.qps),
            format!("{:.1}", row.latency),
        ]);
    }
    builder.align_right(&[1, 4, 5, 6, 7]).build()
}
