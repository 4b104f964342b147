//! Data types flowing through a batch: inputs, per-file outcomes, results.

use crate::config::ConversionTarget;
use crate::error::EngineError;
use crate::pipeline::assemble::Deliverable;
use crate::pipeline::route::RoutingDecision;
use crate::pipeline::sanitize::SanitizedName;
use crate::workspace::RequestWorkspace;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One uploaded file: the client's name plus its raw bytes.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// A staged file waiting for (or undergoing) conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// 1-indexed position in upload order.
    pub index: usize,
    /// The name as the client sent it.
    pub original_filename: String,
    /// The sanitized (and possibly de-duplicated) working name.
    pub name: SanitizedName,
    /// Where the upload was staged.
    pub source_path: PathBuf,
    pub target: ConversionTarget,
    pub decision: RoutingDecision,
}

/// The result of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// The engine produced `path`.
    Converted { original_filename: String, path: PathBuf },
    /// The input was copied to `path` unchanged.
    Copied { original_filename: String, path: PathBuf },
    /// The job failed; only recorded under `FailurePolicy::Continue`.
    Failed {
        original_filename: String,
        error: EngineFailure,
    },
}

impl ConversionOutcome {
    /// Output path, if the job produced one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConversionOutcome::Converted { path, .. } | ConversionOutcome::Copied { path, .. } => {
                Some(path)
            }
            ConversionOutcome::Failed { .. } => None,
        }
    }

    pub fn original_filename(&self) -> &str {
        match self {
            ConversionOutcome::Converted {
                original_filename, ..
            }
            | ConversionOutcome::Copied {
                original_filename, ..
            }
            | ConversionOutcome::Failed {
                original_filename, ..
            } => original_filename,
        }
    }

    pub fn is_success(&self) -> bool {
        self.path().is_some()
    }
}

/// Why a job failed, in a form that can go into a JSON manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineFailure {
    /// The engine call itself failed.
    Engine { detail: EngineError },
    /// The engine exited cleanly without writing the expected file.
    MissingOutput { expected: PathBuf },
}

impl std::fmt::Display for EngineFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineFailure::Engine { detail } => write!(f, "{detail}"),
            EngineFailure::MissingOutput { expected } => {
                write!(f, "engine produced no output at '{}'", expected.display())
            }
        }
    }
}

/// Ordered outcomes of a batch, in upload order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResult {
    pub outcomes: Vec<ConversionOutcome>,
}

impl BatchResult {
    /// Produced files, in upload order.
    pub fn output_paths(&self) -> Vec<&PathBuf> {
        self.outcomes.iter().filter_map(|o| o.path()).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ConversionOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Counters and timings for one batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub converted_files: usize,
    pub copied_files: usize,
    pub failed_files: usize,
    /// Wall-clock time spent inside the engine.
    pub engine_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything a finished batch hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub workspace: RequestWorkspace,
    pub result: BatchResult,
    pub deliverable: Deliverable,
    pub stats: BatchStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converted(name: &str) -> ConversionOutcome {
        ConversionOutcome::Converted {
            original_filename: name.into(),
            path: PathBuf::from(format!("/out/{name}")),
        }
    }

    #[test]
    fn batch_result_counts() {
        let result = BatchResult {
            outcomes: vec![
                converted("a.docx"),
                ConversionOutcome::Failed {
                    original_filename: "b.doc".into(),
                    error: EngineFailure::Engine {
                        detail: EngineError::Timeout { secs: 5 },
                    },
                },
                ConversionOutcome::Copied {
                    original_filename: "c.txt".into(),
                    path: PathBuf::from("/out/c.txt"),
                },
            ],
        };
        assert_eq!(result.len(), 3);
        assert_eq!(result.success_count(), 2);
        assert_eq!(result.failure_count(), 1);
        assert_eq!(
            result.output_paths(),
            vec![&PathBuf::from("/out/a.docx"), &PathBuf::from("/out/c.txt")]
        );
        assert_eq!(result.failures().next().unwrap().original_filename(), "b.doc");
    }

    #[test]
    fn outcome_serialises_with_status_tag() {
        let json = serde_json::to_value(converted("a.pdf")).unwrap();
        assert_eq!(json["status"], "converted");
        assert_eq!(json["original_filename"], "a.pdf");
    }

    #[test]
    fn failure_display() {
        let f = EngineFailure::MissingOutput {
            expected: PathBuf::from("/out/x.pdf"),
        };
        assert!(f.to_string().contains("/out/x.pdf"));
    }
}
