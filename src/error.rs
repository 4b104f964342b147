//! Error types for the edgequake-docconv library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`DocConvError`] — **Batch-level**: the batch cannot be delivered
//!   (no files, bad mode, a file failed under fail-fast, disk full).
//!   Returned as `Err(DocConvError)` from the top-level `convert*` functions.
//!
//! * [`EngineError`] — **Invocation-level**: one call to the external
//!   conversion engine failed. Under [`crate::config::FailurePolicy::FailFast`]
//!   it is wrapped into [`DocConvError::ConversionFailed`] and aborts the
//!   batch; under [`crate::config::FailurePolicy::Continue`] it is recorded in
//!   [`crate::output::ConversionOutcome::Failed`] and the batch goes on.
//!
//! Every batch-level error falls into one of three classes (see
//! [`ErrorClass`]) which the HTTP layer maps onto status codes.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`DocConvError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is invalid; the batch never started.
    Validation,
    /// The engine rejected or could not process a file.
    Conversion,
    /// Local disk or archive I/O failed, or the server is misconfigured.
    Io,
}

/// All fatal errors returned by the edgequake-docconv library.
#[derive(Debug, Error)]
pub enum DocConvError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The batch contained no files.
    #[error("No files were uploaded")]
    NoFiles,

    /// The batch exceeds the configured file count.
    #[error("Too many files: {count} uploaded, at most {max} allowed per batch")]
    TooManyFiles { count: usize, max: usize },

    /// The requested mode is neither `office` nor `pdf`.
    #[error("Invalid target format '{mode}': must be 'office' or 'pdf'")]
    InvalidMode { mode: String },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The external engine failed on a file.
    #[error("Conversion failed for '{file}': {source}")]
    ConversionFailed {
        file: String,
        #[source]
        source: EngineError,
    },

    /// The engine reported success but the expected output file is absent.
    #[error("Conversion failed for '{file}': engine produced no output at '{expected}'")]
    MissingOutput { file: String, expected: PathBuf },

    /// Every file of a continue-on-error batch failed.
    #[error("All {total} files failed to convert.\nFirst error: {first_error}")]
    AllFilesFailed { total: usize, first_error: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading, writing, copying or removing a file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Building the ZIP archive failed.
    #[error("Failed to build archive '{path}': {detail}")]
    Archive { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocConvError {
    /// Build an [`DocConvError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocConvError::Io {
            path: path.into(),
            source,
        }
    }

    /// Classify the error for transport-level mapping.
    pub fn class(&self) -> ErrorClass {
        match self {
            DocConvError::NoFiles
            | DocConvError::TooManyFiles { .. }
            | DocConvError::InvalidMode { .. } => ErrorClass::Validation,
            DocConvError::ConversionFailed { .. }
            | DocConvError::MissingOutput { .. }
            | DocConvError::AllFilesFailed { .. } => ErrorClass::Conversion,
            DocConvError::Io { .. }
            | DocConvError::Archive { .. }
            | DocConvError::InvalidConfig(_)
            | DocConvError::Internal(_) => ErrorClass::Io,
        }
    }

    /// `true` when the caller, not the server, is at fault.
    pub fn is_client_error(&self) -> bool {
        self.class() == ErrorClass::Validation
    }
}

/// A failure of a single external-engine invocation.
///
/// Diagnostic output from the engine is kept as plain text; it is meant for
/// logs and human-readable error messages, not for programmatic inspection.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum EngineError {
    /// The engine binary could not be started.
    #[error("could not launch engine '{engine}': {detail}")]
    Launch { engine: String, detail: String },

    /// The engine ran and exited with a failure status.
    #[error("engine exited with {status}{}", stderr_suffix(.stderr))]
    NonZeroExit { status: String, stderr: String },

    /// The engine did not finish within the configured bound and was killed.
    #[error("engine timed out after {secs}s")]
    Timeout { secs: u64 },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_failed_names_the_file_and_diagnostic() {
        let e = DocConvError::ConversionFailed {
            file: "report.doc".into(),
            source: EngineError::NonZeroExit {
                status: "exit status: 1".into(),
                stderr: "Error: source file could not be loaded".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("report.doc"), "got: {msg}");
        assert!(msg.contains("could not be loaded"), "got: {msg}");
        assert_eq!(e.class(), ErrorClass::Conversion);
    }

    #[test]
    fn non_zero_exit_without_stderr_has_no_trailing_colon() {
        let e = EngineError::NonZeroExit {
            status: "exit status: 77".into(),
            stderr: String::new(),
        };
        assert_eq!(e.to_string(), "engine exited with exit status: 77");
    }

    #[test]
    fn validation_errors_are_client_errors() {
        assert!(DocConvError::NoFiles.is_client_error());
        assert!(DocConvError::InvalidMode { mode: "xml".into() }.is_client_error());
        assert!(DocConvError::TooManyFiles { count: 9, max: 3 }.is_client_error());
    }

    #[test]
    fn io_errors_are_server_errors() {
        let e = DocConvError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(e.class(), ErrorClass::Io);
        assert!(!e.is_client_error());
        assert!(e.to_string().contains("/tmp/x"));
    }

    #[test]
    fn config_errors_are_server_errors() {
        let e = DocConvError::InvalidConfig("max_files must be at least 1".into());
        assert_eq!(e.class(), ErrorClass::Io);
        assert!(!e.is_client_error());
    }

    #[test]
    fn timeout_display() {
        let e = EngineError::Timeout { secs: 120 };
        assert!(e.to_string().contains("120s"));
    }
}
