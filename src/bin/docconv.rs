//! CLI binary for edgequake-docconv.
//!
//! A thin shim over the library crate: `serve` runs the HTTP service,
//! `convert` runs one batch against local files, `check` reports whether the
//! conversion engine can be found.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docconv::server::{router, AppState};
use edgequake_docconv::{
    convert_paths, probe_engine, BatchConfig, BatchProgressCallback, ConversionTarget,
    DuplicateNamePolicy, FailurePolicy, ProgressCallback, WorkspacePaths,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar for the batch plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    file_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            file_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.file_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_files} files…"))
        ));
    }

    fn on_file_start(&self, _index: usize, _total: usize, filename: &str) {
        if let Ok(mut t) = self.file_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(filename.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, output_name: &str) {
        let secs = self.elapsed_secs();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index,
            total,
            output_name,
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, error: &str) {
        let secs = self.elapsed_secs();
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Keep one line per file.
        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        if failed == 0 && success_count == total_files {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if success_count == 0 { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the web service on the default port (7788)
  docconv serve

  # Upgrade legacy Office files into ./out
  docconv convert report.doc budget.xls slides.ppt --to office -o out

  # Render to PDF, keep going past broken files
  docconv convert *.docx --to pdf -o pdfs --continue-on-error

  # Is LibreOffice installed?
  docconv check

ENVIRONMENT VARIABLES:
  DOCCONV_ENGINE          Path or command name of the soffice binary
  DOCCONV_ENGINE_TIMEOUT  Seconds before a stuck engine run is killed
  DOCCONV_BIND            Listen address for `serve`
  DOCCONV_UPLOAD_DIR      Staging root for uploads
  DOCCONV_FILES_DIR       Root for converted files
  DOCCONV_ZIPS_DIR        Root for ZIP archives
  DOCCONV_MAX_BODY_MB     Request body limit for `serve`
  DOCCONV_LOG_JSON        Emit JSON log lines
  DOCCONV_KEEP_OUTPUTS    Keep request directories after responding
  RUST_LOG                Override the log filter
"#;

/// Batch-convert Office documents with headless LibreOffice.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Batch-convert Office documents to modern Office formats or PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCCONV_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Convert local files and write the result into a directory.
    Convert(ConvertArgs),
    /// Report whether the conversion engine can be found.
    Check(EngineArgs),
}

#[derive(Args, Debug)]
struct EngineArgs {
    /// Path or command name of the LibreOffice binary.
    #[arg(long, env = "DOCCONV_ENGINE", default_value = "soffice")]
    engine: PathBuf,

    /// Seconds before a single engine run is killed.
    #[arg(long, env = "DOCCONV_ENGINE_TIMEOUT", default_value_t = 120)]
    engine_timeout: u64,
}

#[derive(Args, Debug)]
struct PolicyArgs {
    /// Skip files that fail and ship the rest with a failure manifest.
    #[arg(long, env = "DOCCONV_CONTINUE_ON_ERROR")]
    continue_on_error: bool,

    /// Rename colliding outputs to `<stem>_<k>.<ext>` instead of overwriting.
    #[arg(long, env = "DOCCONV_SUFFIX_DUPLICATES")]
    suffix_duplicates: bool,

    /// Maximum number of files per batch.
    #[arg(long, env = "DOCCONV_MAX_FILES", default_value_t = 100)]
    max_files: usize,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "DOCCONV_BIND", default_value = "0.0.0.0:7788")]
    bind: SocketAddr,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    /// Staging root for uploads.
    #[arg(long, env = "DOCCONV_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Root for converted files.
    #[arg(long, env = "DOCCONV_FILES_DIR", default_value = "downloads/files")]
    files_dir: PathBuf,

    /// Root for ZIP archives.
    #[arg(long, env = "DOCCONV_ZIPS_DIR", default_value = "downloads/zips")]
    zips_dir: PathBuf,

    /// Request body limit in MiB.
    #[arg(long, env = "DOCCONV_MAX_BODY_MB", default_value_t = 200)]
    max_body_mb: usize,

    /// Emit JSON log lines.
    #[arg(long, env = "DOCCONV_LOG_JSON")]
    log_json: bool,

    /// Keep request directories on disk after responding.
    #[arg(long, env = "DOCCONV_KEEP_OUTPUTS")]
    keep_outputs: bool,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Files to convert, in order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Conversion mode.
    #[arg(long, value_enum)]
    to: TargetArg,

    /// Directory that receives the converted file or archive.
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    #[command(flatten)]
    engine: EngineArgs,

    #[command(flatten)]
    policy: PolicyArgs,

    /// Print the result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCCONV_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum TargetArg {
    /// .doc/.xls/.ppt → .docx/.xlsx/.pptx
    Office,
    /// every Office document → .pdf
    Pdf,
}

impl From<TargetArg> for ConversionTarget {
    fn from(v: TargetArg) -> Self {
        match v {
            TargetArg::Office => ConversionTarget::OfficeModern,
            TargetArg::Pdf => ConversionTarget::Pdf,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let filter = log_filter(cli.verbose, cli.quiet, "info");
            init_tracing(filter, args.log_json);
            serve(args).await
        }
        Command::Convert(args) => {
            // The progress bar replaces INFO-level library logs.
            let show_progress = !cli.quiet && !args.no_progress && !args.json;
            let default = if show_progress { "error" } else { "info" };
            init_tracing(log_filter(cli.verbose, cli.quiet, default), false);
            convert(args, show_progress, cli.quiet).await
        }
        Command::Check(args) => {
            init_tracing(log_filter(cli.verbose, cli.quiet, "warn"), false);
            check(&args)
        }
    }
}

fn log_filter(verbose: bool, quiet: bool, default: &'static str) -> &'static str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        default
    }
}

fn init_tracing(filter: &str, json: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn serve(args: ServeArgs) -> Result<()> {
    let workspace = WorkspacePaths {
        uploads: args.upload_dir.clone(),
        files: args.files_dir.clone(),
        zips: args.zips_dir.clone(),
    };
    let config = build_config(&args.engine, &args.policy, workspace, None)?;
    config
        .workspace
        .ensure()
        .await
        .context("Failed to create working directories")?;

    let engine = probe_engine(&config.engine_path);
    match engine.resolved_path {
        Some(ref path) => info!(engine = %path.display(), "conversion engine found"),
        None => warn!(
            engine = %engine.engine_path.display(),
            "conversion engine not found; every conversion will fail until it is installed"
        ),
    }

    let state = AppState::new(config)
        .keep_outputs(args.keep_outputs)
        .max_body_bytes(args.max_body_mb.saturating_mul(1024 * 1024));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    info!(addr = %args.bind, version = env!("CARGO_PKG_VERSION"), "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("docconv stopped");
    Ok(())
}

/// Resolves when SIGINT (Ctrl-C) or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install CTRL+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received; starting graceful shutdown");
}

// ── convert ──────────────────────────────────────────────────────────────────

async fn convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(
        &args.engine,
        &args.policy,
        WorkspacePaths::default(),
        progress_cb,
    )?;

    let engine = probe_engine(&config.engine_path);
    if !engine.available {
        anyhow::bail!(
            "Conversion engine '{}' not found. Install LibreOffice or set DOCCONV_ENGINE.",
            engine.engine_path.display()
        );
    }

    let (written, stats) = convert_paths(&args.files, args.to.into(), &args.output, &config)
        .await
        .context("Conversion failed")?;

    if args.json {
        let out = json!({ "output": written, "stats": stats });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).context("Failed to serialise output")?
        );
    } else if !quiet {
        eprintln!(
            "{}  {} converted, {} copied, {} failed  {}ms  →  {}",
            if stats.failed_files == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.converted_files,
            stats.copied_files,
            stats.failed_files,
            stats.total_duration_ms,
            bold(&written.display().to_string()),
        );
    }

    Ok(())
}

// ── check ────────────────────────────────────────────────────────────────────

fn check(args: &EngineArgs) -> Result<()> {
    let status = probe_engine(&args.engine);
    match status.resolved_path {
        Some(ref path) => {
            println!("{} engine: {}", green("✔"), path.display());
            Ok(())
        }
        None => anyhow::bail!(
            "engine '{}' not found on PATH or disk",
            status.engine_path.display()
        ),
    }
}

/// Map CLI args to `BatchConfig`.
fn build_config(
    engine: &EngineArgs,
    policy: &PolicyArgs,
    workspace: WorkspacePaths,
    progress: Option<ProgressCallback>,
) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .engine_path(engine.engine.clone())
        .engine_timeout_secs(engine.engine_timeout)
        .workspace(workspace)
        .max_files(policy.max_files)
        .failure_policy(if policy.continue_on_error {
            FailurePolicy::Continue
        } else {
            FailurePolicy::FailFast
        })
        .duplicate_names(if policy.suffix_duplicates {
            DuplicateNamePolicy::Suffix
        } else {
            DuplicateNamePolicy::Overwrite
        });

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
