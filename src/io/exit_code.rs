//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - the run cannot continue (ledger unwritable)
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::PipelineError;
use crate::sweep::SweepReport;

/// Standard exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Input missing or still downloading (code 3)
    NotFound = 3,

    /// Result text could not be interpreted (code 4)
    ParseError = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Header and payload disagree (code 7)
    DatasetCorrupted = 7,

    /// External builder or searcher failed (code 8)
    EngineFailed = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        std::process::ExitCode::from(code as u8)
    }
}

impl ExitCode {
    /// Convert a `PipelineError` to the appropriate exit code.
    pub fn from_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::DatasetNotFound { .. } => ExitCode::NotFound,

            PipelineError::CorruptDataset { .. } | PipelineError::IncompleteRead { .. } => {
                ExitCode::DatasetCorrupted
            }

            PipelineError::ParseError { .. } => ExitCode::ParseError,
            PipelineError::FileRead { .. } | PipelineError::FileWrite { .. } => ExitCode::IoError,
            PipelineError::ConfigError { .. } => ExitCode::ConfigError,

            PipelineError::BuildFailed { .. } | PipelineError::SearchFailed { .. } => {
                ExitCode::EngineFailed
            }

            // Nothing further can be recorded
            PipelineError::LedgerUnwritable { .. } => ExitCode::BlockingError,

            PipelineError::InsufficientData { .. } => ExitCode::GeneralError,
        }
    }

    /// Exit code for a sweep that ran to the end.
    ///
    /// Engine failures take precedence over unavailable inputs.
    pub fn from_sweep_report(report: &SweepReport) -> Self {
        if report.build_failed + report.search_failed > 0 {
            ExitCode::EngineFailed
        } else if report.unavailable > 0 {
            ExitCode::NotFound
        } else {
            ExitCode::Success
        }
    }

    /// Exit code for an error that surfaced through `anyhow`.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        error
            .downcast_ref::<PipelineError>()
            .map_or(ExitCode::GeneralError, Self::from_error)
    }

    /// Check if this exit code indicates a blocking error.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::ParseError => "Parse error",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::DatasetCorrupted => "Dataset corrupted",
            ExitCode::EngineFailed => "Index engine failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success as u8, 0);
        assert_eq!(ExitCode::GeneralError as u8, 1);
        assert_eq!(ExitCode::BlockingError as u8, 2);
        assert_eq!(ExitCode::NotFound as u8, 3);
        assert_eq!(ExitCode::EngineFailed as u8, 8);
    }

    #[test]
    fn test_from_error() {
        let missing = PipelineError::DatasetNotFound {
            path: PathBuf::from("sift_base.bin"),
        };
        assert_eq!(ExitCode::from_error(&missing), ExitCode::NotFound);

        let ledger = PipelineError::LedgerUnwritable {
            path: PathBuf::from("ledger.csv"),
            source: std::io::Error::other("read-only"),
        };
        assert!(ExitCode::from_error(&ledger).is_blocking());

        let wrapped = anyhow::Error::new(PipelineError::ConfigError {
            reason: "k must be at least 2".to_string(),
        });
        assert_eq!(ExitCode::from_anyhow(&wrapped), ExitCode::ConfigError);
        assert_eq!(
            ExitCode::from_anyhow(&anyhow::anyhow!("plain")),
            ExitCode::GeneralError
        );
    }

    #[test]
    fn test_from_sweep_report() {
        let mut report = SweepReport::default();
        assert!(ExitCode::from_sweep_report(&report).is_success());

        report.unavailable = 1;
        assert_eq!(ExitCode::from_sweep_report(&report), ExitCode::NotFound);

        report.search_failed = 2;
        assert_eq!(ExitCode::from_sweep_report(&report), ExitCode::EngineFailed);
    }
}
