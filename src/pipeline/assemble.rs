//! Response assembly: pick the single converted file, or zip them all.
//!
//! * One output and no failures → that file is the deliverable, sent as an
//!   attachment whose name is percent-encoded in an RFC 5987
//!   `filename*=utf-8''…` parameter (CJK names survive every browser).
//! * Anything else → a deflated ZIP named `converted_files_<YYYYmmdd_HHMMSS>.zip`
//!   with every output at the archive root. A continue-on-error batch adds a
//!   `conversion_failures.json` manifest next to the files.
//!
//! ZIP writing is blocking file I/O and runs in `spawn_blocking`.

use crate::error::DocConvError;
use crate::output::BatchResult;
use crate::workspace::RequestWorkspace;
use chrono::{DateTime, Local};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Name of the failure manifest inside an archive.
pub const FAILURE_MANIFEST_NAME: &str = "conversion_failures.json";

/// Characters left unescaped in an encoded filename: ASCII alphanumerics
/// plus `_ . - ~ /`.
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Whether the deliverable is a lone converted file or an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableKind {
    Single,
    Archive,
}

/// The artifact returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    pub kind: DeliverableKind,
    /// Where the artifact lives on disk.
    pub path: PathBuf,
    /// Name presented to the client.
    pub filename: String,
    pub content_type: String,
}

impl Deliverable {
    /// Value for the `Content-Disposition` header.
    pub fn content_disposition(&self) -> String {
        match self.kind {
            DeliverableKind::Single => content_disposition(&self.filename),
            DeliverableKind::Archive => format!("attachment; filename=\"{}\"", self.filename),
        }
    }
}

/// `attachment; filename*=utf-8''<percent-encoded name>`.
pub fn content_disposition(filename: &str) -> String {
    format!(
        "attachment; filename*=utf-8''{}",
        utf8_percent_encode(filename, FILENAME_ENCODE_SET)
    )
}

/// `converted_files_<YYYYmmdd_HHMMSS>.zip` for the given instant.
pub fn archive_name(at: DateTime<Local>) -> String {
    format!("converted_files_{}.zip", at.format("%Y%m%d_%H%M%S"))
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    original_filename: &'a str,
    error: String,
}

/// Turn a finished batch into its deliverable.
pub async fn assemble(
    result: &BatchResult,
    workspace: &RequestWorkspace,
) -> Result<Deliverable, DocConvError> {
    let mut seen = HashSet::new();
    let paths: Vec<PathBuf> = result
        .output_paths()
        .into_iter()
        .filter(|p| {
            let fresh = seen.insert((*p).clone());
            if !fresh {
                warn!("Duplicate output {} listed once", p.display());
            }
            fresh
        })
        .cloned()
        .collect();

    if paths.is_empty() {
        return Err(DocConvError::Internal(
            "batch produced no output files".into(),
        ));
    }

    // Two uploads sharing an output name still make a multi-file batch.
    if result.outcomes.len() == 1 && paths.len() == 1 {
        let path = paths.into_iter().next().unwrap_or_default();
        let filename = entry_name(&path)?;
        return Ok(Deliverable {
            kind: DeliverableKind::Single,
            content_type: "application/octet-stream".into(),
            filename,
            path,
        });
    }

    let manifest = if result.failure_count() > 0 {
        let entries: Vec<ManifestEntry<'_>> = result
            .outcomes
            .iter()
            .filter_map(|o| match o {
                crate::output::ConversionOutcome::Failed {
                    original_filename,
                    error,
                } => Some(ManifestEntry {
                    original_filename,
                    error: error.to_string(),
                }),
                _ => None,
            })
            .collect();
        Some(
            serde_json::to_vec_pretty(&entries)
                .map_err(|e| DocConvError::Internal(format!("manifest: {e}")))?,
        )
    } else {
        None
    };

    let filename = archive_name(Local::now());
    let zip_path = workspace.archive_dir.join(&filename);
    let entry_count = paths.len();

    let zip_path_blocking = zip_path.clone();
    tokio::task::spawn_blocking(move || write_zip(&zip_path_blocking, &paths, manifest.as_deref()))
        .await
        .map_err(|e| DocConvError::Internal(format!("Archive task panicked: {e}")))??;

    info!("Archived {} files into {}", entry_count, zip_path.display());

    Ok(Deliverable {
        kind: DeliverableKind::Archive,
        content_type: "application/zip".into(),
        filename,
        path: zip_path,
    })
}

/// Archive entry / attachment name of an output path.
fn entry_name(path: &Path) -> Result<String, DocConvError> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| DocConvError::Internal(format!("output path has no file name: {}", path.display())))
}

/// Blocking implementation of archive writing.
fn write_zip(
    zip_path: &Path,
    entries: &[PathBuf],
    manifest: Option<&[u8]>,
) -> Result<(), DocConvError> {
    let archive_err = |detail: String| DocConvError::Archive {
        path: zip_path.to_path_buf(),
        detail,
    };

    let file = File::create(zip_path).map_err(|e| DocConvError::io(zip_path, e))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in entries {
        let name = entry_name(path)?;
        zip.start_file(name.as_str(), options)
            .map_err(|e| archive_err(format!("add '{name}': {e}")))?;
        let mut src = File::open(path).map_err(|e| DocConvError::io(path, e))?;
        std::io::copy(&mut src, &mut zip).map_err(|e| DocConvError::io(path, e))?;
    }

    if let Some(manifest) = manifest {
        zip.start_file(FAILURE_MANIFEST_NAME, options)
            .map_err(|e| archive_err(format!("add manifest: {e}")))?;
        zip.write_all(manifest)
            .map_err(|e| DocConvError::io(zip_path, e))?;
    }

    zip.finish()
        .map_err(|e| archive_err(format!("finalize: {e}")))?;
    Ok(())
}
