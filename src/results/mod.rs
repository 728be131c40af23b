//! Benchmark result parsing and recording.
//!
//! - `parse`: section-marked run logs and raw searcher output
//! - `filename`: configuration metadata from result file names
//! - `ledger`: append-only CSV of trial results
//! - `aggregate`: batch conversion of result directories into a summary

pub mod aggregate;
pub mod filename;
pub mod ledger;
pub mod parse;

pub use aggregate::{AggregateReport, aggregate_results, collect_result_files, write_summary};
pub use filename::{FileName, FileNameMeta, parse_file_name};
pub use ledger::{LEDGER_HEADER, Ledger, TrialKey, TrialResult, load_ledger};
pub use parse::{Measurement, ParsedRun, Section, parse_search_output, parse_sections};
