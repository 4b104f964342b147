//! Request handlers.

use super::{AppState, ServerError};
use crate::config::ConversionTarget;
use crate::convert::convert_batch;
use crate::error::DocConvError;
use crate::output::UploadedFile;
use crate::pipeline::engine::probe_engine;
use crate::workspace::RequestWorkspace;
use axum::body::Body;
use axum::extract::{Multipart, State};
use axum::http::{header, Response, StatusCode};
use axum::response::Html;
use axum::Json;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Upload page.
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Heartbeat plus engine discovery.
///
/// Returns `{"status": "ok", "engine_available": bool, "engine_path": "...",
/// "version": "..."}`. Never runs a conversion.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let engine = probe_engine(&state.config.engine_path);
    Json(json!({
        "status": "ok",
        "engine_available": engine.available,
        "engine_path": engine.engine_path,
        "resolved_path": engine.resolved_path,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Convert an uploaded batch and stream back the deliverable.
pub async fn convert(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response<Body>, ServerError> {
    let (files, target) = read_form(multipart).await?;
    if files.is_empty() {
        return Err(DocConvError::NoFiles.into());
    }
    let target: ConversionTarget = target
        .ok_or_else(|| ServerError::BadRequest("Missing form field 'target_format'".into()))?
        .parse()?;

    info!("Received {} files for '{}' conversion", files.len(), target);
    let output = convert_batch(files, target, &state.config).await?;

    let deliverable = output.deliverable;
    let guard = if state.keep_outputs {
        debug!(
            "Keeping request {} outputs under {}",
            output.workspace.request_id,
            output.workspace.output_dir.display()
        );
        CleanupGuard(None)
    } else {
        CleanupGuard(Some(output.workspace))
    };
    // On failure the guard drops here and removes the request directories.
    let file = tokio::fs::File::open(&deliverable.path)
        .await
        .map_err(|e| DocConvError::io(&deliverable.path, e))?;

    let body_stream = ReaderStream::new(file).map(move |chunk| {
        let _workspace = &guard;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, deliverable.content_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            deliverable.content_disposition().as_str(),
        )
        .body(Body::from_stream(body_stream))
        .map_err(|e| ServerError::Internal(format!("Failed to build response: {}", e)))
}

/// Removes a request's directories once the response body is dropped,
/// whether it was sent in full or the client went away.
struct CleanupGuard(Option<RequestWorkspace>);

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(workspace) = self.0.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { workspace.cleanup().await });
            }
            Err(_) => warn!(
                "No runtime to clean request {}; leaving {}",
                workspace.request_id,
                workspace.output_dir.display()
            ),
        }
    }
}

/// Collect the `files` parts (in order) and the `target_format` field.
async fn read_form(
    mut multipart: Multipart,
) -> Result<(Vec<UploadedFile>, Option<String>), ServerError> {
    let mut files = Vec::new();
    let mut target = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("Failed to read multipart: {}", e)))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();
        match field_name.as_str() {
            "files" => {
                let filename = field.file_name().map(|s| s.to_string()).unwrap_or_default();
                let data = field.bytes().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read file data: {}", e))
                })?;
                // An empty file input still submits one nameless, empty part.
                if filename.is_empty() && data.is_empty() {
                    continue;
                }
                files.push(UploadedFile::new(filename, data.to_vec()));
            }
            "target_format" => {
                let value = field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("Failed to read target_format: {}", e))
                })?;
                target = Some(value);
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok((files, target))
}

#[cfg(test)]
mod tests {
    use crate::config::BatchConfig;
    use crate::error::EngineError;
    use crate::pipeline::engine::DocumentConverter;
    use crate::pipeline::route::TargetFormat;
    use crate::server::{router, AppState};
    use crate::workspace::WorkspacePaths;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BOUNDARY: &str = "docconv-test-boundary";

    struct StubConverter {
        fail_stem: Option<&'static str>,
    }

    #[async_trait]
    impl DocumentConverter for StubConverter {
        async fn convert(
            &self,
            input: &Path,
            out_dir: &Path,
            format: TargetFormat,
        ) -> Result<(), EngineError> {
            let stem = input.file_stem().unwrap().to_string_lossy().into_owned();
            if self.fail_stem == Some(stem.as_str()) {
                return Err(EngineError::NonZeroExit {
                    status: "exit status: 1".into(),
                    stderr: "general input/output error".into(),
                });
            }
            tokio::fs::write(out_dir.join(format!("{stem}.{format}")), b"converted")
                .await
                .unwrap();
            Ok(())
        }
    }

    fn app(root: &Path, fail_stem: Option<&'static str>) -> Router {
        let config = BatchConfig::builder()
            .converter(Arc::new(StubConverter { fail_stem }))
            .workspace(WorkspacePaths::under(root))
            .build()
            .unwrap();
        router(AppState::new(config))
    }

    fn multipart(files: &[(&str, &str)], target: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        if let Some(target) = target {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"target_format\"\r\n\r\n{target}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/convert")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_status_and_version() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert!(body["engine_available"].is_boolean());
        assert_eq!(body["engine_path"], "soffice");
        assert!(!body["version"].as_str().unwrap_or("").is_empty());
    }

    #[tokio::test]
    async fn index_serves_the_upload_page() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("target_format"));
    }

    #[tokio::test]
    async fn single_file_is_returned_as_attachment() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(multipart(&[("memo.doc", "legacy")], Some("pdf")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename*=utf-8''memo.pdf"
        );
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"converted");
    }

    #[tokio::test]
    async fn several_files_are_returned_as_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(multipart(
                &[("a.xlsx", "modern"), ("b.ppt", "legacy")],
                Some("office"),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/zip");
        let disposition = resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"converted_files_"));
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    /// Cleanup runs on a spawned task after the body is dropped.
    async fn wait_until_roots_empty(root: &Path) {
        for _ in 0..100 {
            let empty = ["uploads", "downloads/files", "downloads/zips"]
                .iter()
                .all(|dir| std::fs::read_dir(root.join(dir)).unwrap().next().is_none());
            if empty {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("request directories were not removed");
    }

    #[tokio::test]
    async fn workspace_is_cleaned_after_response() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(multipart(&[("a.doc", "x"), ("b.doc", "y")], Some("pdf")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], b"PK");
        wait_until_roots_empty(tmp.path()).await;
    }

    #[tokio::test]
    async fn workspace_is_cleaned_when_body_is_abandoned() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(multipart(&[("memo.doc", "legacy")], Some("pdf")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        drop(resp);
        wait_until_roots_empty(tmp.path()).await;
    }

    #[tokio::test]
    async fn keep_outputs_leaves_the_deliverable() {
        let tmp = tempfile::tempdir().unwrap();
        let config = BatchConfig::builder()
            .converter(Arc::new(StubConverter { fail_stem: None }))
            .workspace(WorkspacePaths::under(tmp.path()))
            .build()
            .unwrap();
        let resp = router(AppState::new(config).keep_outputs(true))
            .oneshot(multipart(&[("memo.doc", "legacy")], Some("pdf")))
            .await
            .unwrap();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"converted");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let requests: Vec<_> = std::fs::read_dir(tmp.path().join("downloads/files"))
            .unwrap()
            .collect();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn missing_files_is_a_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(multipart(&[], Some("pdf")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert!(body["error"].as_str().unwrap().contains("No files"));
    }

    #[tokio::test]
    async fn invalid_mode_is_a_bad_request() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), None)
            .oneshot(multipart(&[("a.doc", "x")], Some("png")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = json_body(resp).await;
        assert!(body["error"].as_str().unwrap().contains("png"));
    }

    #[tokio::test]
    async fn conversion_failure_names_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let resp = app(tmp.path(), Some("b"))
            .oneshot(multipart(
                &[("a.doc", "x"), ("b.doc", "y"), ("c.doc", "z")],
                Some("pdf"),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(resp).await;
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("b.doc"), "{message}");
        assert!(message.contains("general input/output error"), "{message}");
    }
}
