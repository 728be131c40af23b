//! Append-only CSV ledger of trial results.
//!
//! The header is written once when the file is created and never rewritten.
//! Each row is flushed as soon as it is recorded, so an interrupted sweep
//! loses at most the measurement in flight.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ErrorContext, PipelineError, PipelineResult};
use crate::sweep::{Algorithm, AlphaBounds, ParameterConfiguration, format_alpha};

/// Fixed ledger columns.
pub const LEDGER_HEADER: [&str; 9] = [
    "Dataset",
    "R",
    "Alpha_Min",
    "Alpha_Max",
    "Algorithm",
    "L",
    "QPS",
    "Latency",
    "Recall",
];

/// One recorded measurement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialResult {
    pub config: ParameterConfiguration,
    pub search_l: u32,
    pub qps: f64,
    pub latency: f64,
    pub recall: f64,
}

/// Identity of a row; no two ledger rows share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrialKey {
    pub dataset: String,
    pub r: u32,
    pub alpha_min: String,
    pub alpha_max: String,
    pub algorithm: Algorithm,
    pub search_l: u32,
}

impl TrialKey {
    #[must_use]
    pub fn new(config: &ParameterConfiguration, search_l: u32) -> Self {
        Self {
            dataset: config.dataset.clone(),
            r: config.r,
            alpha_min: format_alpha(config.alpha.min),
            alpha_max: format_alpha(config.alpha.max),
            algorithm: config.algorithm,
            search_l,
        }
    }
}

impl TrialResult {
    #[must_use]
    pub fn key(&self) -> TrialKey {
        TrialKey::new(&self.config, self.search_l)
    }

    /// CSV line without the trailing newline.
    #[must_use]
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{}",
            self.config.dataset,
            self.config.r,
            format_alpha(self.config.alpha.min),
            format_alpha(self.config.alpha.max),
            self.config.algorithm.label(),
            self.search_l,
            self.qps,
            self.latency,
            self.recall
        )
    }

    /// Parses one CSV data line.
    pub fn from_csv_row(line: &str, origin: &str) -> PipelineResult<Self> {
        let bad = |reason: String| PipelineError::ParseError {
            origin: origin.to_string(),
            reason,
        };

        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let &[dataset, r, amin, amax, algo, l, qps, latency, recall] = fields.as_slice() else {
            return Err(bad(format!(
                "expected {} columns, found {}",
                LEDGER_HEADER.len(),
                fields.len()
            )));
        };

        let int = |name: &str, v: &str| {
            v.parse::<u32>()
                .map_err(|_| bad(format!("{name} '{v}' is not an unsigned integer")))
        };
        let float = |name: &str, v: &str| {
            v.parse::<f64>()
                .map_err(|_| bad(format!("{name} '{v}' is not a number")))
        };
        let algorithm =
            Algorithm::from_label(algo).ok_or_else(|| bad(format!("unknown algorithm '{algo}'")))?;

        Ok(Self {
            config: ParameterConfiguration {
                dataset: dataset.to_string(),
                r: int("R", r)?,
                alpha: AlphaBounds::new(float("Alpha_Min", amin)?, float("Alpha_Max", amax)?),
                algorithm,
            },
            search_l: int("L", l)?,
            qps: float("QPS", qps)?,
            latency: float("Latency", latency)?,
            recall: float("Recall", recall)?,
        })
    }
}

fn header_line() -> String {
    LEDGER_HEADER.join(",")
}

/// Open, append-only ledger file.
pub struct Ledger {
    path: PathBuf,
    writer: BufWriter<File>,
    keys: HashSet<TrialKey>,
}

impl Ledger {
    /// Opens `path`, creating it with the header when absent or empty.
    ///
    /// Existing rows are indexed so that `record` never duplicates one. A
    /// file whose first line is not the ledger header is refused.
    pub fn open(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let existing = if path.is_file() {
            read_rows(&path)?
        } else {
            None
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| PipelineError::LedgerUnwritable {
                path: path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| PipelineError::LedgerUnwritable {
                path: path.clone(),
                source,
            })?;

        let mut ledger = Self {
            path,
            writer: BufWriter::new(file),
            keys: HashSet::new(),
        };

        match existing {
            Some(rows) => {
                ledger.keys.extend(rows.iter().map(TrialResult::key));
                debug!(
                    "Ledger {} holds {} rows",
                    ledger.path.display(),
                    ledger.keys.len()
                );
            }
            None => ledger.write_line(&header_line())?,
        }
        Ok(ledger)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct rows in the ledger.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &TrialKey) -> bool {
        self.keys.contains(key)
    }

    /// Appends `result` and flushes. Returns `false` if its key was
    /// already recorded, in which case nothing is written.
    pub fn record(&mut self, result: &TrialResult) -> PipelineResult<bool> {
        let key = result.key();
        if self.keys.contains(&key) {
            return Ok(false);
        }
        self.write_line(&result.to_csv_row())?;
        self.keys.insert(key);
        Ok(true)
    }

    fn write_line(&mut self, line: &str) -> PipelineResult<()> {
        writeln!(self.writer, "{line}")
            .and_then(|()| self.writer.flush())
            .map_err(|source| PipelineError::LedgerUnwritable {
                path: self.path.clone(),
                source,
            })
    }
}

/// Loads every data row of the ledger at `path`.
///
/// Rows that fail to parse are logged and skipped.
pub fn load_ledger(path: &Path) -> PipelineResult<Vec<TrialResult>> {
    if !path.is_file() {
        return Err(PipelineError::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(read_rows(path)?.unwrap_or_default())
}

/// `None` for an empty file, otherwise the parsed data rows.
fn read_rows(path: &Path) -> PipelineResult<Option<Vec<TrialResult>>> {
    let reader = BufReader::new(File::open(path).read_context(path)?);
    let mut lines = reader.lines();

    let Some(first) = lines.next().transpose().read_context(path)? else {
        return Ok(None);
    };
    if first.trim() != header_line() {
        return Err(PipelineError::ConfigError {
            reason: format!(
                "'{}' is not a results ledger: header is '{}', expected '{}'",
                path.display(),
                first.trim(),
                header_line()
            ),
        });
    }

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let line = line.read_context(path)?;
        if line.trim().is_empty() {
            continue;
        }
        let origin = format!("{}:{}", path.display(), index + 2);
        match TrialResult::from_csv_row(&line, &origin) {
            Ok(row) => rows.push(row),
            Err(e) => warn!("Skipping ledger row: {e}"),
        }
    }
    Ok(Some(rows))
}
