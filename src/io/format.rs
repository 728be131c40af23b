//! Format definitions for CLI output.
//!
//! Every command can print either human-readable text or one JSON envelope
//! carrying the command's summary, so sweeps can be scripted.

use crate::error::PipelineError;
use crate::io::exit_code::ExitCode;
use serde::{Deserialize, Serialize};

/// Output format for CLI commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text (default)
    Text,
    /// JSON for scripting
    Json,
}

impl OutputFormat {
    /// Create format from JSON flag.
    #[must_use]
    pub fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }

    /// Check if format is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Standard JSON response format.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonResponse<T = serde_json::Value>
where
    T: Serialize,
{
    /// Status: "success" or "error"
    pub status: String,

    /// Result code (e.g., "OK", "DATASET_NOT_FOUND", "BUILD_FAILED")
    pub code: String,

    /// Human-readable message
    pub message: String,

    /// Actual data payload (only for success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,

    /// Error details and suggestions (only for errors)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    /// Exit code for shell scripts
    pub exit_code: u8,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

/// Error details for JSON responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Recovery suggestions
    pub suggestions: Vec<String>,
}

/// Response metadata.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ResponseMeta {
    /// Metadata stamped with this crate's version.
    pub fn new(execution_time_ms: Option<u64>) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            execution_time_ms,
        }
    }
}

impl<T> JsonResponse<T>
where
    T: Serialize,
{
    /// Create a success response with data.
    pub fn success(data: T) -> Self {
        Self {
            status: "success".to_string(),
            code: "OK".to_string(),
            message: "Operation completed successfully".to_string(),
            data: Some(data),
            error: None,
            exit_code: ExitCode::Success as u8,
            meta: None,
        }
    }

    /// Success payload that still carries a non-zero exit code,
    /// e.g. a sweep in which some configurations failed.
    pub fn partial(data: T, code: ExitCode, message: &str) -> Self {
        Self {
            status: if code.is_success() { "success" } else { "partial" }.to_string(),
            code: format!("{code:?}").to_uppercase(),
            message: message.to_string(),
            data: Some(data),
            error: None,
            exit_code: code as u8,
            meta: None,
        }
    }

    /// Add metadata to the response.
    pub fn with_meta(mut self, meta: ResponseMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

impl JsonResponse<serde_json::Value> {
    /// Create a generic error response.
    pub fn error(code: ExitCode, message: &str, suggestions: Vec<&str>) -> Self {
        Self {
            status: "error".to_string(),
            code: format!("{code:?}").to_uppercase(),
            message: message.to_string(),
            data: None,
            error: Some(ErrorDetails {
                suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
            }),
            exit_code: code as u8,
            meta: None,
        }
    }

    /// Create an error response from a `PipelineError`.
    pub fn from_error(error: &PipelineError) -> Self {
        Self {
            status: "error".to_string(),
            code: error.status_code(),
            message: error.to_string(),
            data: None,
            error: Some(ErrorDetails {
                suggestions: error
                    .recovery_suggestions()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            }),
            exit_code: ExitCode::from_error(error) as u8,
            meta: None,
        }
    }

    /// Create an error response from any error reaching the CLI.
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        match error.downcast_ref::<PipelineError>() {
            Some(pipeline) => Self::from_error(pipeline),
            None => Self::error(ExitCode::GeneralError, &format!("{error:#}"), vec![]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_success_envelope() {
        let response = JsonResponse::success(vec![1, 2, 3]).with_meta(ResponseMeta::new(Some(5)));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["exit_code"], 0);
        assert_eq!(json["data"][2], 3);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_carries_suggestions() {
        let err = PipelineError::DatasetNotFound {
            path: PathBuf::from("data/sift/sift_base.bin"),
        };
        let json = serde_json::to_value(JsonResponse::from_error(&err)).unwrap();
        assert_eq!(json["code"], "DATASET_NOT_FOUND");
        assert_eq!(json["exit_code"], 3);
        assert!(!json["error"]["suggestions"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_partial_envelope() {
        let response = JsonResponse::partial("report", ExitCode::EngineFailed, "2 builds failed");
        assert_eq!(response.status, "partial");
        assert_eq!(response.exit_code, 8);
        assert_eq!(response.code, "ENGINEFAILED");
    }

    #[test]
    fn test_output_format_from_flag() {
        assert!(OutputFormat::from_json_flag(true).is_json());
        assert!(!OutputFormat::from_json_flag(false).is_json());
    }
}
