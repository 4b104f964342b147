//! # edgequake-docconv
//!
//! Batch-convert Office documents with a headless LibreOffice engine.
//!
//! Two modes are supported, chosen once per batch:
//!
//! * **office**: upgrade legacy binary files (`.doc`, `.xls`, `.ppt`) to their
//!   XML successors (`.docx`, `.xlsx`, `.pptx`); files already in a modern
//!   format pass through untouched.
//! * **pdf**: render every Office document (legacy or modern) to PDF.
//!
//! Anything the engine does not handle is copied into the result unchanged,
//! so a stray `.txt` in an upload never aborts a batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! uploads
//!  │
//!  ├─ 1. Sanitize  client file name → safe basename (CJK kept)
//!  ├─ 2. Stage     bytes written to a per-request upload directory
//!  ├─ 3. Route     convert (and to what) or copy through
//!  ├─ 4. Engine    soffice --headless --convert-to …, one run at a time
//!  └─ 5. Assemble  single file, or converted_files_<timestamp>.zip
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docconv::{convert_batch, BatchConfig, ConversionTarget, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::default();
//!     let files = vec![UploadedFile::new("report.doc", std::fs::read("report.doc")?)];
//!     let output = convert_batch(files, ConversionTarget::Pdf, &config).await?;
//!     println!("{}", output.deliverable.path.display());
//!     output.workspace.cleanup().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | via cli | axum router: upload page, `/api/convert`, `/api/health` |
//! | `cli`    | on      | Enables the `docconv` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable default features when using only the library:
//! ```toml
//! edgequake-docconv = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BatchConfig, BatchConfigBuilder, ConversionTarget, DuplicateNamePolicy, FailurePolicy,
};
pub use convert::{convert_batch, convert_batch_sync, convert_paths};
pub use error::{DocConvError, EngineError, ErrorClass};
pub use output::{
    BatchOutput, BatchResult, BatchStats, ConversionJob, ConversionOutcome, EngineFailure,
    UploadedFile,
};
pub use pipeline::assemble::{content_disposition, Deliverable, DeliverableKind};
pub use pipeline::engine::{probe_engine, DocumentConverter, EngineStatus, SofficeConverter};
pub use pipeline::route::{route, route_file, RoutingDecision, TargetFormat};
pub use pipeline::sanitize::{sanitize_filename, SanitizedName};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use workspace::{RequestWorkspace, WorkspacePaths};
