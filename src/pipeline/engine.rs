//! Engine invocation: one headless LibreOffice run per file.
//!
//! The pipeline talks to the engine only through [`DocumentConverter`], so
//! tests and alternative back-ends can stand in for the real binary.
//! [`SofficeConverter`] is the production implementation:
//!
//! ```text
//! <engine> --headless --convert-to <format> <input> --outdir <dir>
//! ```
//!
//! ## Serialised access
//!
//! LibreOffice keeps a single user profile with a lock file; two instances
//! started against the same profile at once either fail or silently hand the
//! job to each other. Every `SofficeConverter` invocation therefore holds a
//! process-wide async mutex for the lifetime of the child, so independent
//! batches may run concurrently while engine runs stay strictly one at a time.
//!
//! ## Bounded wait
//!
//! Each run is wrapped in [`tokio::time::timeout`]. On expiry the child is
//! killed (`kill_on_drop`) and the call returns [`EngineError::Timeout`].
//! There is no retry: failures here are corrupt or unsupported inputs, which
//! do not get better on a second attempt.

use crate::config::BatchConfig;
use crate::error::EngineError;
use crate::pipeline::route::TargetFormat;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Longest stderr excerpt carried inside an [`EngineError`].
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

static ENGINE_LOCK: Mutex<()> = Mutex::const_new(());

/// A capability that converts one file into `out_dir` as `<stem>.<format>`.
///
/// Implementations must return only after the output is fully written (or
/// the attempt has definitively failed).
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert `input` into `out_dir` using `format`.
    async fn convert(
        &self,
        input: &Path,
        out_dir: &Path,
        format: TargetFormat,
    ) -> Result<(), EngineError>;

    /// Short identifier used in logs.
    fn name(&self) -> &str {
        "converter"
    }
}

/// Runs the LibreOffice `soffice` binary as a headless subprocess.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    engine_path: PathBuf,
    timeout: Duration,
}

impl SofficeConverter {
    pub fn new(engine_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            engine_path: engine_path.into(),
            timeout,
        }
    }

    /// Build from the engine path and timeout in `config`.
    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(
            config.engine_path.clone(),
            Duration::from_secs(config.engine_timeout_secs),
        )
    }

    pub fn engine_path(&self) -> &Path {
        &self.engine_path
    }

    fn command(&self, input: &Path, out_dir: &Path, format: TargetFormat) -> Command {
        let mut cmd = Command::new(&self.engine_path);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(format.as_str())
            .arg(input)
            .arg("--outdir")
            .arg(out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DocumentConverter for SofficeConverter {
    async fn convert(
        &self,
        input: &Path,
        out_dir: &Path,
        format: TargetFormat,
    ) -> Result<(), EngineError> {
        let _guard = ENGINE_LOCK.lock().await;
        let start = Instant::now();
        debug!(
            "Running {} --headless --convert-to {} {} --outdir {}",
            self.engine_path.display(),
            format,
            input.display(),
            out_dir.display()
        );

        let child = self
            .command(input, out_dir, format)
            .spawn()
            .map_err(|e| EngineError::Launch {
                engine: self.engine_path.display().to_string(),
                detail: e.to_string(),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| EngineError::Launch {
                engine: self.engine_path.display().to_string(),
                detail: e.to_string(),
            })?,
            Err(_) => {
                warn!(
                    "Engine timed out after {:?} on {}",
                    self.timeout,
                    input.display()
                );
                return Err(EngineError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!("engine stdout: {}", stdout.trim());
        }

        if output.status.success() {
            debug!(
                "Converted {} → {} in {}ms",
                input.display(),
                format,
                start.elapsed().as_millis()
            );
            Ok(())
        } else {
            let stderr = diagnostic(&output.stderr);
            warn!(
                "Engine failed on {} ({}): {}",
                input.display(),
                output.status,
                stderr
            );
            Err(EngineError::NonZeroExit {
                status: output.status.to_string(),
                stderr,
            })
        }
    }

    fn name(&self) -> &str {
        "soffice"
    }
}

/// Trimmed, length-capped engine diagnostic text.
fn diagnostic(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.chars().count() > MAX_DIAGNOSTIC_CHARS {
        let cut: String = text.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
        format!("{cut}\u{2026}")
    } else {
        text.to_string()
    }
}

// ── Health probe ─────────────────────────────────────────────────────────

/// Whether the configured engine binary can be found. No conversion is run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStatus {
    /// The path or command name as configured.
    pub engine_path: PathBuf,
    /// Where the binary was found, if anywhere.
    pub resolved_path: Option<PathBuf>,
    pub available: bool,
}

/// Check for the engine binary.
///
/// A bare command name (`soffice`) is looked up on `PATH`; anything with a
/// directory component is checked as a file path.
pub fn probe_engine(engine_path: &Path) -> EngineStatus {
    let is_bare = engine_path.components().count() == 1 && !engine_path.is_absolute();
    let resolved_path = if is_bare {
        which::which(engine_path).ok()
    } else if engine_path.is_file() {
        Some(engine_path.to_path_buf())
    } else {
        None
    };
    EngineStatus {
        engine_path: engine_path.to_path_buf(),
        available: resolved_path.is_some(),
        resolved_path,
    }
}
