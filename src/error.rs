//! Structured error handling and exit codes.

use serde::Serialize;

use crate::config::ConfigError;

/// Process exit codes.
///
/// - 0: Success (archive uploaded, or nothing to do)
/// - 1: General error (any fatal pipeline failure)
/// - 2: Configuration error (missing or invalid step input)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: uploaded, or exited early because nothing changed.
    Success = 0,
    /// General error: a pipeline phase failed.
    GeneralError = 1,
    /// Configuration error: the step inputs were rejected before any work.
    ConfigError = 2,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CP000",
            Self::GeneralError => "CP001",
            Self::ConfigError => "CP002",
        }
    }

    /// Exit code for an error that ended the run.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err.chain().any(|cause| cause.is::<ConfigError>()) {
            Self::ConfigError
        } else {
            Self::GeneralError
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CP001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, outermost context first
    pub message: String,
    /// Every cause in the chain, outermost first
    pub causes: Vec<String>,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            causes: err.chain().map(ToString::to_string).collect(),
        }
    }
}
