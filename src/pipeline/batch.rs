//! The per-file loop: stage → route → convert or copy → clean up.
//!
//! Files are processed strictly in upload order, one at a time. For each:
//!
//! 1. the client name is sanitised (with an `unnamed_<n>` fallback) and, if
//!    [`DuplicateNamePolicy::Suffix`] is set, de-duplicated against earlier
//!    outputs of the batch
//! 2. the bytes are written to the request's upload directory
//! 3. the router decides between an engine run and a plain copy
//! 4. the staged upload is removed, whatever happened in step 3
//!
//! Engine failures abort the batch under [`FailurePolicy::FailFast`] (and
//! every output produced so far is deleted) or are recorded and skipped under
//! [`FailurePolicy::Continue`]. Local I/O failures always abort.

use crate::config::{BatchConfig, ConversionTarget, DuplicateNamePolicy, FailurePolicy};
use crate::error::{DocConvError, EngineError};
use crate::output::{
    BatchResult, BatchStats, ConversionJob, ConversionOutcome, EngineFailure, UploadedFile,
};
use crate::pipeline::engine::DocumentConverter;
use crate::pipeline::route::{output_name, route_file, RoutingDecision};
use crate::pipeline::sanitize::SanitizedName;
use crate::progress::{BatchProgressCallback, NoopProgressCallback};
use crate::workspace::RequestWorkspace;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a single job did not produce an output.
enum JobFailure {
    Engine(EngineError),
    MissingOutput(PathBuf),
    Io(DocConvError),
}

/// Reject empty and oversized batches before any work is done.
pub fn validate_batch(files: &[UploadedFile], config: &BatchConfig) -> Result<(), DocConvError> {
    if files.is_empty() {
        return Err(DocConvError::NoFiles);
    }
    if files.len() > config.max_files {
        return Err(DocConvError::TooManyFiles {
            count: files.len(),
            max: config.max_files,
        });
    }
    Ok(())
}

/// Run every file of a batch through the pipeline inside `workspace`.
///
/// Returns the outcomes in upload order. On a fatal error the request's
/// output and archive directories are removed before the error is returned.
pub async fn run_batch(
    files: Vec<UploadedFile>,
    target: ConversionTarget,
    workspace: &RequestWorkspace,
    converter: &dyn DocumentConverter,
    config: &BatchConfig,
) -> Result<(BatchResult, BatchStats), DocConvError> {
    validate_batch(&files, config)?;

    let noop = NoopProgressCallback;
    let cb: &dyn BatchProgressCallback = match config.progress_callback {
        Some(ref cb) => cb.as_ref(),
        None => &noop,
    };

    let total = files.len();
    let start = Instant::now();
    let mut stats = BatchStats {
        total_files: total,
        ..Default::default()
    };
    let mut result = BatchResult::default();
    let mut used_outputs: HashSet<String> = HashSet::new();

    info!(
        "Batch {}: {} files → {} via {}",
        workspace.request_id,
        total,
        target,
        converter.name()
    );
    cb.on_batch_start(total);

    for (i, file) in files.into_iter().enumerate() {
        let index = i + 1;
        let name = SanitizedName::sanitize_or_fallback(&file.filename, index);
        let decision = route_file(&name, target);
        let name = resolve_collision(name, decision, &mut used_outputs, config.duplicate_names);

        cb.on_file_start(index, total, name.as_str());

        let source_path = workspace.upload_dir.join(name.as_str());
        if let Err(e) = tokio::fs::write(&source_path, &file.bytes).await {
            let err = DocConvError::io(&source_path, e);
            cb.on_file_error(index, total, &err.to_string());
            return abort(workspace, cb, total, &result, err).await;
        }

        let job = ConversionJob {
            index,
            original_filename: file.filename,
            name,
            source_path,
            target,
            decision,
        };
        debug!(
            "Job {}/{}: '{}' staged as {} ({:?})",
            index,
            total,
            job.original_filename,
            job.source_path.display(),
            job.decision
        );

        let engine_start = Instant::now();
        let step = process_job(&job, workspace, converter).await;
        if matches!(job.decision, RoutingDecision::ConvertTo(_)) {
            stats.engine_duration_ms += engine_start.elapsed().as_millis() as u64;
        }

        remove_staged(&job.source_path).await;

        let failure = match step {
            Ok(outcome) => {
                match outcome {
                    ConversionOutcome::Converted { .. } => stats.converted_files += 1,
                    ConversionOutcome::Copied { .. } => stats.copied_files += 1,
                    ConversionOutcome::Failed { .. } => {}
                }
                let produced = outcome
                    .path()
                    .and_then(|p| p.file_name())
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                cb.on_file_complete(index, total, &produced);
                result.outcomes.push(outcome);
                continue;
            }
            Err(JobFailure::Io(err)) => {
                cb.on_file_error(index, total, &err.to_string());
                return abort(workspace, cb, total, &result, err).await;
            }
            Err(JobFailure::Engine(detail)) => EngineFailure::Engine { detail },
            Err(JobFailure::MissingOutput(expected)) => EngineFailure::MissingOutput { expected },
        };

        cb.on_file_error(index, total, &failure.to_string());
        stats.failed_files += 1;

        match config.failure_policy {
            FailurePolicy::FailFast => {
                let err = batch_error(job.original_filename, failure);
                return abort(workspace, cb, total, &result, err).await;
            }
            FailurePolicy::Continue => {
                warn!(
                    "Skipping '{}' after failure: {}",
                    job.original_filename, failure
                );
                result.outcomes.push(ConversionOutcome::Failed {
                    original_filename: job.original_filename,
                    error: failure,
                });
            }
        }
    }

    if result.success_count() == 0 {
        let first_error = result
            .failures()
            .find_map(|o| match o {
                ConversionOutcome::Failed {
                    original_filename,
                    error,
                } => Some(format!("{original_filename}: {error}")),
                _ => None,
            })
            .unwrap_or_else(|| "Unknown error".to_string());
        let err = DocConvError::AllFilesFailed { total, first_error };
        return abort(workspace, cb, total, &result, err).await;
    }

    stats.total_duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Batch {} complete: {} converted, {} copied, {} failed, {}ms",
        workspace.request_id,
        stats.converted_files,
        stats.copied_files,
        stats.failed_files,
        stats.total_duration_ms
    );
    cb.on_batch_complete(total, result.success_count());

    Ok((result, stats))
}

/// Convert or copy one staged file into the output directory.
async fn process_job(
    job: &ConversionJob,
    workspace: &RequestWorkspace,
    converter: &dyn DocumentConverter,
) -> Result<ConversionOutcome, JobFailure> {
    match job.decision {
        RoutingDecision::CopyThrough => {
            let dest = workspace.output_dir.join(job.name.as_str());
            tokio::fs::copy(&job.source_path, &dest)
                .await
                .map_err(|e| JobFailure::Io(DocConvError::io(&dest, e)))?;
            Ok(ConversionOutcome::Copied {
                original_filename: job.original_filename.clone(),
                path: dest,
            })
        }
        RoutingDecision::ConvertTo(format) => {
            let expected = workspace
                .output_dir
                .join(output_name(&job.name, job.decision));
            converter
                .convert(&job.source_path, &workspace.output_dir, format)
                .await
                .map_err(JobFailure::Engine)?;
            if !tokio::fs::try_exists(&expected).await.unwrap_or(false) {
                return Err(JobFailure::MissingOutput(expected));
            }
            Ok(ConversionOutcome::Converted {
                original_filename: job.original_filename.clone(),
                path: expected,
            })
        }
    }
}

/// Apply the duplicate-name policy and record the resulting output name.
fn resolve_collision(
    name: SanitizedName,
    decision: RoutingDecision,
    used: &mut HashSet<String>,
    policy: DuplicateNamePolicy,
) -> SanitizedName {
    let out = output_name(&name, decision);
    if !used.contains(&out) {
        used.insert(out);
        return name;
    }
    match policy {
        DuplicateNamePolicy::Overwrite => {
            warn!("Output '{}' appears twice in the batch; the later file wins", out);
            name
        }
        DuplicateNamePolicy::Suffix => {
            let mut k = 1;
            loop {
                let candidate = name.with_counter(k);
                let out = output_name(&candidate, decision);
                if used.insert(out) {
                    debug!("Renamed '{}' to '{}' to avoid a collision", name, candidate);
                    return candidate;
                }
                k += 1;
            }
        }
    }
}

fn batch_error(file: String, failure: EngineFailure) -> DocConvError {
    match failure {
        EngineFailure::Engine { detail } => DocConvError::ConversionFailed {
            file,
            source: detail,
        },
        EngineFailure::MissingOutput { expected } => DocConvError::MissingOutput { file, expected },
    }
}

/// Drop every output of the batch and surface `err`.
async fn abort<T>(
    workspace: &RequestWorkspace,
    cb: &dyn BatchProgressCallback,
    total: usize,
    result: &BatchResult,
    err: DocConvError,
) -> Result<T, DocConvError> {
    warn!("Batch {} aborted: {}", workspace.request_id, err);
    cb.on_batch_complete(total, result.success_count());
    workspace.discard_outputs().await;
    Err(err)
}

async fn remove_staged(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staged upload {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::route::TargetFormat;
    use crate::workspace::WorkspacePaths;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Writes `<stem>.<format>` unless the input stem is listed as failing.
    struct FakeConverter {
        fail_stems: Vec<&'static str>,
        skip_output_stems: Vec<&'static str>,
        calls: Mutex<Vec<(PathBuf, TargetFormat)>>,
    }

    impl FakeConverter {
        fn new() -> Self {
            Self {
                fail_stems: vec![],
                skip_output_stems: vec![],
                calls: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl DocumentConverter for FakeConverter {
        async fn convert(
            &self,
            input: &Path,
            out_dir: &Path,
            format: TargetFormat,
        ) -> Result<(), EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push((input.to_path_buf(), format));
            let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
            if self.fail_stems.contains(&stem.as_str()) {
                return Err(EngineError::NonZeroExit {
                    status: "exit status: 1".into(),
                    stderr: "Error: source file could not be loaded".into(),
                });
            }
            if !self.skip_output_stems.contains(&stem.as_str()) {
                let out = out_dir.join(format!("{stem}.{format}"));
                tokio::fs::write(out, b"converted").await.unwrap();
            }
            Ok(())
        }
    }

    async fn workspace() -> (tempfile::TempDir, RequestWorkspace) {
        let tmp = tempfile::tempdir().unwrap();
        let ws = WorkspacePaths::under(tmp.path())
            .for_request_id("test")
            .await
            .unwrap();
        (tmp, ws)
    }

    fn files(names: &[&str]) -> Vec<UploadedFile> {
        names
            .iter()
            .map(|n| UploadedFile::new(*n, format!("bytes of {n}").into_bytes()))
            .collect()
    }

    #[tokio::test]
    async fn converts_and_copies_in_upload_order() {
        let (_tmp, ws) = workspace().await;
        let conv = FakeConverter::new();
        let config = BatchConfig::default();

        let (result, stats) = run_batch(
            files(&["b.ppt", "a.xlsx", "notes.txt"]),
            ConversionTarget::OfficeModern,
            &ws,
            &conv,
            &config,
        )
        .await
        .unwrap();

        let names: Vec<_> = result
            .output_paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.pptx", "a.xlsx", "notes.txt"]);
        assert_eq!(stats.converted_files, 1);
        assert_eq!(stats.copied_files, 2);
        assert_eq!(conv.calls.lock().unwrap().len(), 1);

        // Copied files keep their bytes.
        let copied = tokio::fs::read(ws.output_dir.join("a.xlsx")).await.unwrap();
        assert_eq!(copied, b"bytes of a.xlsx");
    }

    #[tokio::test]
    async fn staged_uploads_are_removed() {
        let (_tmp, ws) = workspace().await;
        let conv = FakeConverter::new();
        run_batch(
            files(&["a.doc", "b.txt"]),
            ConversionTarget::Pdf,
            &ws,
            &conv,
            &BatchConfig::default(),
        )
        .await
        .unwrap();
        let mut entries = tokio::fs::read_dir(&ws.upload_dir).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fail_fast_aborts_and_discards_outputs() {
        let (_tmp, ws) = workspace().await;
        let mut conv = FakeConverter::new();
        conv.fail_stems = vec!["b"];

        let err = run_batch(
            files(&["a.doc", "b.doc", "c.doc"]),
            ConversionTarget::Pdf,
            &ws,
            &conv,
            &BatchConfig::default(),
        )
        .await
        .unwrap_err();

        match &err {
            DocConvError::ConversionFailed { file, source } => {
                assert_eq!(file, "b.doc");
                assert!(source.to_string().contains("could not be loaded"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // c.doc is never attempted; a.pdf is gone.
        assert_eq!(conv.calls.lock().unwrap().len(), 2);
        assert!(!ws.output_dir.join("a.pdf").exists());
        // The staged copy of the failing file was still removed.
        assert!(!ws.upload_dir.join("b.doc").exists());
    }

    #[tokio::test]
    async fn continue_policy_records_failures() {
        let (_tmp, ws) = workspace().await;
        let mut conv = FakeConverter::new();
        conv.fail_stems = vec!["b"];
        let config = BatchConfig::builder()
            .failure_policy(FailurePolicy::Continue)
            .build()
            .unwrap();

        let (result, stats) = run_batch(
            files(&["a.doc", "b.doc", "c.doc"]),
            ConversionTarget::Pdf,
            &ws,
            &conv,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result.success_count(), 2);
        assert_eq!(stats.failed_files, 1);
        assert!(matches!(result.outcomes[1], ConversionOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn continue_policy_with_no_success_is_an_error() {
        let (_tmp, ws) = workspace().await;
        let mut conv = FakeConverter::new();
        conv.fail_stems = vec!["a", "b"];
        let config = BatchConfig::builder()
            .failure_policy(FailurePolicy::Continue)
            .build()
            .unwrap();

        let err = run_batch(
            files(&["a.doc", "b.xls"]),
            ConversionTarget::OfficeModern,
            &ws,
            &conv,
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocConvError::AllFilesFailed { total: 2, .. }));
        assert!(err.to_string().contains("a.doc"));
    }

    #[tokio::test]
    async fn engine_success_without_output_is_a_failure() {
        let (_tmp, ws) = workspace().await;
        let mut conv = FakeConverter::new();
        conv.skip_output_stems = vec!["ghost"];

        let err = run_batch(
            files(&["ghost.doc"]),
            ConversionTarget::OfficeModern,
            &ws,
            &conv,
            &BatchConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocConvError::MissingOutput { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let (_tmp, ws) = workspace().await;
        let err = run_batch(
            vec![],
            ConversionTarget::Pdf,
            &ws,
            &FakeConverter::new(),
            &BatchConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DocConvError::NoFiles));
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let config = BatchConfig::builder().max_files(2).build().unwrap();
        let err = validate_batch(&files(&["a", "b", "c"]), &config).unwrap_err();
        assert!(matches!(err, DocConvError::TooManyFiles { count: 3, max: 2 }));
    }

    #[tokio::test]
    async fn unnamed_uploads_get_a_fallback_name() {
        let (_tmp, ws) = workspace().await;
        let (result, _) = run_batch(
            files(&["###"]),
            ConversionTarget::Pdf,
            &ws,
            &FakeConverter::new(),
            &BatchConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(
            result.output_paths()[0].file_name().unwrap(),
            "unnamed_1"
        );
    }

    #[tokio::test]
    async fn overwrite_policy_lets_later_file_win() {
        let (_tmp, ws) = workspace().await;
        let batch = vec![
            UploadedFile::new("a.txt", b"first".to_vec()),
            UploadedFile::new("a.txt", b"second".to_vec()),
        ];
        let (result, _) = run_batch(
            batch,
            ConversionTarget::Pdf,
            &ws,
            &FakeConverter::new(),
            &BatchConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(result.output_paths()[0], result.output_paths()[1]);
        let content = tokio::fs::read(ws.output_dir.join("a.txt")).await.unwrap();
        assert_eq!(content, b"second");
    }

    #[tokio::test]
    async fn suffix_policy_keeps_both_files() {
        let (_tmp, ws) = workspace().await;
        let config = BatchConfig::builder()
            .duplicate_names(DuplicateNamePolicy::Suffix)
            .build()
            .unwrap();
        let (result, _) = run_batch(
            files(&["a.doc", "a.doc", "a.docx"]),
            ConversionTarget::OfficeModern,
            &ws,
            &FakeConverter::new(),
            &config,
        )
        .await
        .unwrap();
        let names: Vec<_> = result
            .output_paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.docx", "a_1.docx", "a_2.docx"]);
    }
}
