//! On-disk layout: staging, output and archive directories.
//!
//! [`WorkspacePaths`] names the three process-wide roots and creates them
//! idempotently at startup. Every batch then works inside a
//! [`RequestWorkspace`]: one subdirectory per root, named after a fresh
//! request id, so concurrent batches never see each other's files even when
//! their uploads share a name.

use crate::error::DocConvError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// The three root directories used by the converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspacePaths {
    /// Where uploaded bytes are staged before conversion.
    pub uploads: PathBuf,
    /// Where converted (or copied-through) files are written.
    pub files: PathBuf,
    /// Where multi-file ZIP archives are written.
    pub zips: PathBuf,
}

impl Default for WorkspacePaths {
    fn default() -> Self {
        Self {
            uploads: PathBuf::from("uploads"),
            files: PathBuf::from("downloads/files"),
            zips: PathBuf::from("downloads/zips"),
        }
    }
}

impl WorkspacePaths {
    /// Lay out all three roots under a single base directory.
    pub fn under(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        Self {
            uploads: base.join("uploads"),
            files: base.join("downloads").join("files"),
            zips: base.join("downloads").join("zips"),
        }
    }

    /// Create the three roots if they do not exist yet.
    pub async fn ensure(&self) -> Result<(), DocConvError> {
        for dir in [&self.uploads, &self.files, &self.zips] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DocConvError::io(dir, e))?;
        }
        debug!(
            "Workspace ready: uploads={} files={} zips={}",
            self.uploads.display(),
            self.files.display(),
            self.zips.display()
        );
        Ok(())
    }

    /// Allocate and create a request-scoped workspace with a fresh id.
    pub async fn for_request(&self) -> Result<RequestWorkspace, DocConvError> {
        self.for_request_id(Uuid::new_v4().to_string()).await
    }

    /// Allocate and create a request-scoped workspace with a known id.
    pub async fn for_request_id(
        &self,
        request_id: impl Into<String>,
    ) -> Result<RequestWorkspace, DocConvError> {
        let request_id = request_id.into();
        let ws = RequestWorkspace {
            upload_dir: self.uploads.join(&request_id),
            output_dir: self.files.join(&request_id),
            archive_dir: self.zips.join(&request_id),
            request_id,
        };
        for dir in [&ws.upload_dir, &ws.output_dir, &ws.archive_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| DocConvError::io(dir, e))?;
        }
        Ok(ws)
    }
}

/// Directories owned by one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestWorkspace {
    pub request_id: String,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub archive_dir: PathBuf,
}

impl RequestWorkspace {
    /// Remove every produced output and archive of this batch.
    ///
    /// Used when a fail-fast batch aborts so no partial file set survives.
    pub async fn discard_outputs(&self) {
        for dir in [&self.output_dir, &self.archive_dir] {
            remove_dir_logged(dir).await;
        }
    }

    /// Remove all three request directories.
    pub async fn cleanup(&self) {
        for dir in [&self.upload_dir, &self.output_dir, &self.archive_dir] {
            remove_dir_logged(dir).await;
        }
    }
}

async fn remove_dir_logged(dir: &Path) {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => debug!("Removed {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::under(tmp.path());
        paths.ensure().await.unwrap();
        paths.ensure().await.unwrap();
        assert!(paths.uploads.is_dir());
        assert!(paths.files.is_dir());
        assert!(paths.zips.is_dir());
    }

    #[tokio::test]
    async fn request_workspaces_are_disjoint() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::under(tmp.path());
        let a = paths.for_request().await.unwrap();
        let b = paths.for_request().await.unwrap();
        assert_ne!(a.request_id, b.request_id);
        assert_ne!(a.output_dir, b.output_dir);
        assert!(a.upload_dir.starts_with(&paths.uploads));
        assert!(a.output_dir.starts_with(&paths.files));
        assert!(a.archive_dir.starts_with(&paths.zips));
        assert!(a.output_dir.is_dir());
    }

    #[tokio::test]
    async fn cleanup_removes_request_dirs_only() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::under(tmp.path());
        let ws = paths.for_request_id("req-1").await.unwrap();
        tokio::fs::write(ws.output_dir.join("a.pdf"), b"x")
            .await
            .unwrap();

        ws.cleanup().await;

        assert!(!ws.upload_dir.exists());
        assert!(!ws.output_dir.exists());
        assert!(!ws.archive_dir.exists());
        assert!(paths.files.is_dir());
        // A second cleanup is a no-op.
        ws.cleanup().await;
    }

    #[tokio::test]
    async fn discard_outputs_keeps_upload_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = WorkspacePaths::under(tmp.path());
        let ws = paths.for_request_id("req-2").await.unwrap();
        ws.discard_outputs().await;
        assert!(ws.upload_dir.is_dir());
        assert!(!ws.output_dir.exists());
    }
}
