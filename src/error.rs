//! Error types for the benchmarking pipeline
//!
//! This module provides structured error types using thiserror. Codec and
//! adapter errors abort a single conversion task, engine errors are caught per
//! sweep configuration, and only ledger failures are fatal to a whole run.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Input file is missing, or a download of it is still in progress
    #[error("Dataset '{path}' not found or not fully available")]
    DatasetNotFound { path: PathBuf },

    /// Header and payload disagree, or the foreign layout is malformed
    #[error("Corrupt dataset '{path}': {reason} (expected {expected}, found {actual})")]
    CorruptDataset {
        path: PathBuf,
        reason: String,
        expected: u64,
        actual: u64,
    },

    /// Stream ended before the declared payload size
    #[error("Incomplete read of '{path}': expected {expected} bytes, stream ended after {actual}")]
    IncompleteRead {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Insufficient data in '{path}': {required} points required, {available} available")]
    InsufficientData {
        path: PathBuf,
        required: usize,
        available: usize,
    },

    /// External builder failed or produced no artifact
    #[error("Build failed for {config}: {reason}\n  command: {command}")]
    BuildFailed {
        config: String,
        reason: String,
        command: String,
    },

    /// External searcher failed or produced unusable output
    #[error("Search failed for {config} at L={search_l}: {reason}\n  command: {command}")]
    SearchFailed {
        config: String,
        search_l: u32,
        reason: String,
        command: String,
    },

    /// One result line or result file could not be interpreted
    #[error("Parse error in {origin}: {reason}")]
    ParseError { origin: String, reason: String },

    #[error("Ledger '{path}' is not writable: {source}")]
    LedgerUnwritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid configuration: {reason}")]
    ConfigError { reason: String },
}

impl PipelineError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON output
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::DatasetNotFound { .. } => "DATASET_NOT_FOUND",
            Self::CorruptDataset { .. } => "CORRUPT_DATASET",
            Self::IncompleteRead { .. } => "INCOMPLETE_READ",
            Self::InsufficientData { .. } => "INSUFFICIENT_DATA",
            Self::BuildFailed { .. } => "BUILD_FAILED",
            Self::SearchFailed { .. } => "SEARCH_FAILED",
            Self::ParseError { .. } => "PARSE_ERROR",
            Self::LedgerUnwritable { .. } => "LEDGER_UNWRITABLE",
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::FileWrite { .. } => "FILE_WRITE_ERROR",
            Self::ConfigError { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Whether a sweep may log this error and move on to the next configuration.
    pub fn is_configuration_local(&self) -> bool {
        matches!(
            self,
            Self::DatasetNotFound { .. }
                | Self::BuildFailed { .. }
                | Self::SearchFailed { .. }
                | Self::ParseError { .. }
        )
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::DatasetNotFound { .. } => vec![
                "Check the path, or wait for the download to finish (a .partial file is still present)",
                "Run 'adasweep convert' to produce the canonical file first",
            ],
            Self::CorruptDataset { .. } => vec![
                "Re-run the conversion from the raw source file",
                "Use 'adasweep inspect' to compare header and file size",
            ],
            Self::IncompleteRead { .. } => vec![
                "The file was truncated while being read; re-create it",
            ],
            Self::InsufficientData { .. } => vec![
                "Lower k or the sample size, or use a larger dataset",
            ],
            Self::BuildFailed { .. } => vec![
                "Re-run the logged command by hand and inspect the build log",
                "Check builder_bin in .adasweep/settings.toml",
            ],
            Self::SearchFailed { .. } => vec![
                "Re-run the logged command by hand",
                "Check searcher_bin and the query/ground-truth files",
            ],
            Self::LedgerUnwritable { .. } => vec![
                "Check disk space and permissions of the ledger directory",
            ],
            Self::ConfigError { .. } => vec![
                "Run 'adasweep config' to inspect the effective settings",
            ],
            _ => vec![],
        }
    }
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Helper trait for attaching file paths to I/O errors
pub trait ErrorContext<T> {
    /// Tag an error raised while reading `path`
    fn read_context(self, path: &Path) -> PipelineResult<T>;

    /// Tag an error raised while writing `path`
    fn write_context(self, path: &Path) -> PipelineResult<T>;
}

impl<T> ErrorContext<T> for Result<T, std::io::Error> {
    fn read_context(self, path: &Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::FileRead {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_context(self, path: &Path) -> PipelineResult<T> {
        self.map_err(|source| PipelineError::FileWrite {
            path: path.to_path_buf(),
            source,
        })
    }
}
