//! Batch aggregation of result files into a summary CSV.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{ErrorContext, PipelineError, PipelineResult};
use crate::results::filename::{FileName, parse_file_name};
use crate::results::ledger::{Ledger, TrialResult};
use crate::results::parse::parse_sections;
use crate::sweep::{Algorithm, ParameterConfiguration};

/// Counters describing one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateReport {
    pub files_seen: usize,
    /// Files whose names did not match the grammar
    pub files_skipped: usize,
    pub rows: usize,
    pub duplicates_dropped: usize,
    /// Candidate rows that failed to parse
    pub rows_skipped: usize,
    /// Rows outside any recognized algorithm section
    pub unlabeled_rows: usize,
}

/// All `*.txt` files under `dirs` (non-recursive), sorted by path.
pub fn collect_result_files(dirs: &[PathBuf]) -> PipelineResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            warn!("Result directory {} does not exist", dir.display());
            continue;
        }
        for entry in std::fs::read_dir(dir).read_context(dir)? {
            let path = entry.read_context(dir)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "txt") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Parses every recognized result file into trial rows.
///
/// Files are visited in lexicographic path order. The output is sorted by
/// (dataset, R, alpha_min, alpha_max, algorithm, L); when two files report
/// the same key, the row from the earlier file wins.
pub fn aggregate_results(
    dirs: &[PathBuf],
) -> PipelineResult<(Vec<TrialResult>, AggregateReport)> {
    let files = collect_result_files(dirs)?;
    let mut report = AggregateReport {
        files_seen: files.len(),
        ..AggregateReport::default()
    };
    let mut rows = Vec::new();

    for path in &files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let FileName::Meta(meta) = parse_file_name(name) else {
            warn!("Skipping {}: file name does not describe a configuration", path.display());
            report.files_skipped += 1;
            continue;
        };

        let text = std::fs::read_to_string(path).read_context(path)?;
        let run = parse_sections(&text, &path.display().to_string());
        report.rows_skipped += run.skipped.len();

        for section in &run.sections {
            let Some(algorithm) = section.algorithm else {
                report.unlabeled_rows += section.rows.len();
                continue;
            };
            // Baseline rows carry the sentinel alpha whatever the file name says
            let config = match algorithm {
                Algorithm::Baseline => ParameterConfiguration::baseline(&meta.dataset, meta.r),
                Algorithm::Adaptive => ParameterConfiguration {
                    dataset: meta.dataset.clone(),
                    r: meta.r,
                    alpha: meta.alpha,
                    algorithm,
                },
            };
            for m in &section.rows {
                // Single-L files only contribute their own L
                if meta.search_l.is_some_and(|l| l != m.search_l) {
                    continue;
                }
                rows.push(TrialResult {
                    config: config.clone(),
                    search_l: m.search_l,
                    qps: m.qps,
                    latency: m.latency,
                    recall: m.recall,
                });
            }
        }
    }

    rows.sort_by(compare_rows);
    let mut seen = HashSet::new();
    let before = rows.len();
    rows.retain(|row| seen.insert(row.key()));
    report.duplicates_dropped = before - rows.len();
    report.rows = rows.len();

    Ok((rows, report))
}

fn compare_rows(a: &TrialResult, b: &TrialResult) -> Ordering {
    a.config
        .dataset
        .cmp(&b.config.dataset)
        .then(a.config.r.cmp(&b.config.r))
        .then(a.config.alpha.min.total_cmp(&b.config.alpha.min))
        .then(a.config.alpha.max.total_cmp(&b.config.alpha.max))
        .then(a.config.algorithm.label().cmp(b.config.algorithm.label()))
        .then(a.search_l.cmp(&b.search_l))
}

/// Writes `rows` to a fresh summary CSV at `output`, replacing any old one.
pub fn write_summary(rows: &[TrialResult], output: &Path) -> PipelineResult<()> {
    if output.exists() {
        std::fs::remove_file(output).map_err(|source| PipelineError::LedgerUnwritable {
            path: output.to_path_buf(),
            source,
        })?;
    }
    let mut ledger = Ledger::open(output)?;
    for row in rows {
        ledger.record(row)?;
    }
    info!("Wrote {} rows to {}", ledger.len(), output.display());
    Ok(())
}
