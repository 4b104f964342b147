//! Configuration types for batch document conversion.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The config is constructed once (at server start or
//! from CLI flags) and passed by reference into every stage; no stage reads
//! process-wide state on its own.

use crate::error::DocConvError;
use crate::pipeline::engine::DocumentConverter;
use crate::progress::ProgressCallback;
use crate::workspace::WorkspacePaths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for a batch conversion.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_docconv::{BatchConfig, FailurePolicy};
///
/// let config = BatchConfig::builder()
///     .engine_path("/opt/libreoffice/program/soffice")
///     .engine_timeout_secs(60)
///     .failure_policy(FailurePolicy::FailFast)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Path (or bare command name) of the headless conversion engine. Default: `soffice`.
    pub engine_path: PathBuf,

    /// Upper bound on a single engine invocation, in seconds. Default: 120.
    ///
    /// A stuck engine is killed when the bound expires and the file is
    /// reported as a conversion failure.
    pub engine_timeout_secs: u64,

    /// Directory layout used for staging uploads, outputs and archives.
    pub workspace: WorkspacePaths,

    /// Pre-constructed converter. Takes precedence over `engine_path`.
    pub converter: Option<Arc<dyn DocumentConverter>>,

    /// What to do when a file fails. Default: [`FailurePolicy::FailFast`].
    pub failure_policy: FailurePolicy,

    /// What to do when two uploads map to the same output name.
    /// Default: [`DuplicateNamePolicy::Overwrite`].
    pub duplicate_names: DuplicateNamePolicy,

    /// Maximum number of files accepted in one batch. Default: 100.
    pub max_files: usize,

    /// Optional progress callback for per-file events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("soffice"),
            engine_timeout_secs: 120,
            workspace: WorkspacePaths::default(),
            converter: None,
            failure_policy: FailurePolicy::default(),
            duplicate_names: DuplicateNamePolicy::default(),
            max_files: 100,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("engine_path", &self.engine_path)
            .field("engine_timeout_secs", &self.engine_timeout_secs)
            .field("workspace", &self.workspace)
            .field(
                "converter",
                &self.converter.as_ref().map(|_| "<dyn DocumentConverter>"),
            )
            .field("failure_policy", &self.failure_policy)
            .field("duplicate_names", &self.duplicate_names)
            .field("max_files", &self.max_files)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl fmt::Debug for BatchConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl BatchConfigBuilder {
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.engine_path = path.into();
        self
    }

    pub fn engine_timeout_secs(mut self, secs: u64) -> Self {
        self.config.engine_timeout_secs = secs;
        self
    }

    pub fn workspace(mut self, workspace: WorkspacePaths) -> Self {
        self.config.workspace = workspace;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn DocumentConverter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn duplicate_names(mut self, policy: DuplicateNamePolicy) -> Self {
        self.config.duplicate_names = policy;
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, DocConvError> {
        let c = &self.config;
        if c.engine_timeout_secs == 0 {
            return Err(DocConvError::InvalidConfig(
                "Engine timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_files == 0 {
            return Err(DocConvError::InvalidConfig(
                "Max files per batch must be ≥ 1".into(),
            ));
        }
        if c.converter.is_none() && c.engine_path.as_os_str().is_empty() {
            return Err(DocConvError::InvalidConfig(
                "Engine path must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The conversion mode selected once per batch; every file shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionTarget {
    /// Normalise legacy binary Office files to their XML successors.
    #[serde(rename = "office")]
    OfficeModern,
    /// Render every Office document to PDF.
    Pdf,
}

impl ConversionTarget {
    /// The wire name used by the HTTP form field and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionTarget::OfficeModern => "office",
            ConversionTarget::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ConversionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConversionTarget {
    type Err = DocConvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "office" => Ok(ConversionTarget::OfficeModern),
            "pdf" => Ok(ConversionTarget::Pdf),
            _ => Err(DocConvError::InvalidMode {
                mode: s.to_string(),
            }),
        }
    }
}

/// How a batch reacts to a file that fails to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the whole batch on the first failure; deliver nothing. (default)
    #[default]
    FailFast,
    /// Record the failure, keep going, and ship a failure manifest with the
    /// successful files.
    Continue,
}

/// How a batch reacts when two uploads produce the same output file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicateNamePolicy {
    /// The later file silently replaces the earlier one. (default)
    #[default]
    Overwrite,
    /// The later file is renamed `<stem>_<k>.<ext>` before conversion.
    Suffix,
}
