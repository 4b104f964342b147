//! Batch conversion entry points.
//!
//! [`convert_batch`] is what the HTTP layer calls: it owns a request-scoped
//! workspace under the configured roots and leaves the deliverable on disk
//! for the caller to stream and clean up. [`convert_paths`] is the
//! filesystem-to-filesystem variant used by the CLI; it stages everything in
//! a temporary directory and copies only the deliverable out.

use crate::config::{BatchConfig, ConversionTarget};
use crate::error::DocConvError;
use crate::output::{BatchOutput, BatchStats, UploadedFile};
use crate::pipeline::assemble::assemble;
use crate::pipeline::batch::{run_batch, validate_batch};
use crate::pipeline::engine::{DocumentConverter, SofficeConverter};
use crate::workspace::WorkspacePaths;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert a batch of uploaded files.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `files`  — uploads in the order the client sent them
/// * `target` — conversion mode shared by every file
/// * `config` — batch configuration
///
/// # Returns
/// The per-file outcomes plus the [`Deliverable`](crate::pipeline::assemble::Deliverable):
/// either the single converted file or a ZIP archive. The request workspace
/// is left in place; call [`RequestWorkspace::cleanup`](crate::workspace::RequestWorkspace::cleanup)
/// once the deliverable has been sent.
///
/// # Errors
/// - [`DocConvError::NoFiles`] / [`DocConvError::TooManyFiles`] before any work
/// - [`DocConvError::ConversionFailed`] naming the first failing file under
///   fail-fast (nothing is delivered and the workspace is removed)
/// - [`DocConvError::AllFilesFailed`] under continue-on-error
pub async fn convert_batch(
    files: Vec<UploadedFile>,
    target: ConversionTarget,
    config: &BatchConfig,
) -> Result<BatchOutput, DocConvError> {
    let start = Instant::now();
    validate_batch(&files, config)?;

    config.workspace.ensure().await?;
    let workspace = config.workspace.for_request().await?;
    let converter = resolve_converter(config);
    debug!(
        "Request {} staged under {}",
        workspace.request_id,
        workspace.upload_dir.display()
    );

    let (result, mut stats) =
        match run_batch(files, target, &workspace, converter.as_ref(), config).await {
            Ok(r) => r,
            Err(e) => {
                workspace.cleanup().await;
                return Err(e);
            }
        };

    let deliverable = match assemble(&result, &workspace).await {
        Ok(d) => d,
        Err(e) => {
            workspace.cleanup().await;
            return Err(e);
        }
    };

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Request {} → {} ({:?})",
        workspace.request_id, deliverable.filename, deliverable.kind
    );

    Ok(BatchOutput {
        workspace,
        result,
        deliverable,
        stats,
    })
}

/// Convert files on disk and write the deliverable into `out_dir`.
///
/// Staging happens in a temporary directory that is removed on return. The
/// deliverable is written atomically (temp file + rename).
///
/// Returns the path of the written deliverable.
pub async fn convert_paths(
    paths: &[PathBuf],
    target: ConversionTarget,
    out_dir: impl AsRef<Path>,
    config: &BatchConfig,
) -> Result<(PathBuf, BatchStats), DocConvError> {
    let out_dir = out_dir.as_ref();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| DocConvError::io(path, e))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(UploadedFile::new(filename, bytes));
    }

    let staging = tempfile::tempdir()
        .map_err(|e| DocConvError::Internal(format!("tempdir: {e}")))?;
    let mut scoped = config.clone();
    scoped.workspace = WorkspacePaths::under(staging.path());

    let output = convert_batch(files, target, &scoped).await?;

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| DocConvError::io(out_dir, e))?;
    let dest = out_dir.join(&output.deliverable.filename);
    let tmp = out_dir.join(format!(".{}.tmp", output.deliverable.filename));
    tokio::fs::copy(&output.deliverable.path, &tmp)
        .await
        .map_err(|e| DocConvError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, &dest)
        .await
        .map_err(|e| DocConvError::io(&dest, e))?;

    // `staging` is dropped (and every intermediate file deleted) here.
    Ok((dest, output.stats))
}

/// Synchronous wrapper around [`convert_batch`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_batch_sync(
    files: Vec<UploadedFile>,
    target: ConversionTarget,
    config: &BatchConfig,
) -> Result<BatchOutput, DocConvError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocConvError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_batch(files, target, config))
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Pick the converter: a pre-built one from the config, else the `soffice`
/// subprocess at `config.engine_path`.
pub(crate) fn resolve_converter(config: &BatchConfig) -> Arc<dyn DocumentConverter> {
    if let Some(ref converter) = config.converter {
        return Arc::clone(converter);
    }
    Arc::new(SofficeConverter::from_config(config))
}
