// Exit codes stay in the range shells leave to programs (0-125).

use std::path::PathBuf;

use adasweep::PipelineError;
use adasweep::io::ExitCode;

#[test]
fn verify_exit_codes_are_unix_compliant() {
    let codes = [
        ExitCode::Success,
        ExitCode::GeneralError,
        ExitCode::BlockingError,
        ExitCode::NotFound,
        ExitCode::ParseError,
        ExitCode::IoError,
        ExitCode::ConfigError,
        ExitCode::DatasetCorrupted,
        ExitCode::EngineFailed,
    ];
    for code in codes {
        let value: i32 = code.into();
        assert!(value < 126, "{code:?} = {value}");
        assert!(!code.description().is_empty());
    }
}

#[test]
fn every_error_kind_has_a_distinct_identity() {
    let path = PathBuf::from("toy_base.bin");
    let errors = vec![
        PipelineError::DatasetNotFound { path: path.clone() },
        PipelineError::CorruptDataset {
            path: path.clone(),
            reason: "short payload".to_string(),
            expected: 104,
            actual: 100,
        },
        PipelineError::IncompleteRead {
            path: path.clone(),
            expected: 8,
            actual: 3,
        },
        PipelineError::BuildFailed {
            config: "toy R=16 Baseline".to_string(),
            reason: "exit status 1".to_string(),
            command: "build_disk_index -R 16".to_string(),
        },
        PipelineError::ParseError {
            origin: "run.txt:3".to_string(),
            reason: "QPS 'x' is not a number".to_string(),
        },
        PipelineError::LedgerUnwritable {
            path,
            source: std::io::Error::other("disk full"),
        },
    ];

    let mut codes: Vec<String> = errors.iter().map(PipelineError::status_code).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), errors.len());

    // Only the ledger failure stops a sweep
    let fatal: Vec<_> = errors
        .iter()
        .filter(|e| !e.is_configuration_local())
        .map(ExitCode::from_error)
        .collect();
    assert!(fatal.contains(&ExitCode::BlockingError));
    assert!(errors[3].is_configuration_local());
    assert!(errors[4].is_configuration_local());
}
