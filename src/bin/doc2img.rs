//! CLI binary for edgequake-doc2img.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and a storage backend, then runs one job, serves HTTP,
//! or inspects a job namespace.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_doc2img::server::{self, ServerConfig};
use edgequake_doc2img::{
    ConversionPipeline, JobId, JobState, LocalStore, LocatorStyle, MemoryStore, ObjectStore,
    PipelineConfig, PipelineProgressCallback, ProgressCallback, ResultView, SupabaseConfig,
    SupabaseStore,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while the document is staged and rendered, then a bar counting
/// uploads.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(style);
        self.bar.set_prefix("Uploading");
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job_id: JobId, filename: &str) {
        self.bar.set_message(format!("{filename}  {}", dim(&job_id.to_string())));
    }

    fn on_stage(&self, _job_id: JobId, state: JobState) {
        match state {
            JobState::Validated => self.bar.set_prefix("Rendering"),
            JobState::Published => self.bar.set_prefix("Finishing"),
            _ => {}
        }
    }

    fn on_page_rendered(&self, index: usize, total: usize) {
        if index == 0 {
            self.bar.println(format!(
                "  {} Rendered {} pages",
                green("✓"),
                bold(&total.to_string())
            ));
            self.activate_bar(total);
        }
    }

    fn on_page_published(&self, _index: usize, _total: usize, key: &str) {
        self.bar.set_message(key.to_string());
        self.bar.inc(1);
    }

    fn on_job_complete(&self, _job_id: JobId, published: usize, error: Option<&str>) {
        self.bar.finish_and_clear();
        match error {
            None => eprintln!("{} {} pages published", green("✔"), bold(&published.to_string())),
            Some(_) if published > 0 => eprintln!(
                "{} failed after {} page(s) were uploaded",
                red("✘"),
                bold(&published.to_string())
            ),
            Some(_) => eprintln!("{} failed", red("✘")),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a PDF and upload to Supabase (credentials from env)
  doc2img convert report.pdf

  # Slide deck, JSON output with public URLs
  doc2img convert --public-urls --json deck.pptx

  # Dry run: render everything, keep nothing
  doc2img --store memory convert deck.pptx

  # Publish into a local directory instead
  doc2img --store local --local-root ./out convert report.pdf

  # HTTP service compatible with POST /upload/
  doc2img serve --addr 0.0.0.0:8000

  # Garbage-collect a job namespace
  doc2img list 4f7c1f0e-0b5e-4c36-9b7e-3c3f1f9f6a10
  doc2img delete --yes 4f7c1f0e-0b5e-4c36-9b7e-3c3f1f9f6a10

ENVIRONMENT VARIABLES:
  SUPABASE_URL            Supabase project URL
  SUPABASE_KEY            Supabase service key
  SUPABASE_BUCKET         Bucket name (default: images)
  DOC2IMG_STORE           supabase | local | memory
  DOC2IMG_SOFFICE         LibreOffice binary (default: soffice)
  PDFIUM_LIB_PATH         Path to libpdfium
  RUST_LOG                Overrides the log filter
"#;

/// Convert PDFs and slide decks to per-page PNGs in object storage.
#[derive(Parser, Debug)]
#[command(
    name = "doc2img",
    version,
    about = "Convert PDFs and slide decks to per-page PNGs in object storage",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    store: StoreArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOC2IMG_VERBOSE", global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOC2IMG_QUIET", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one local file and publish its pages.
    Convert {
        /// PDF, PPTX, PPT or ODP file.
        file: PathBuf,

        /// Declared MIME type. Inferred from the extension when omitted.
        #[arg(long)]
        mime: Option<String>,

        /// Result shape printed with --json.
        #[arg(long, value_enum, default_value = "assets")]
        view: ViewArg,

        /// Print the result as JSON instead of one locator per line.
        #[arg(long, env = "DOC2IMG_JSON")]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "DOC2IMG_NO_PROGRESS")]
        no_progress: bool,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Serve the HTTP upload endpoint.
    Serve {
        /// Listen address.
        #[arg(long, env = "DOC2IMG_ADDR", default_value = "0.0.0.0:8000")]
        addr: SocketAddr,

        /// Response shape when a request has no ?view= parameter.
        #[arg(long, value_enum, env = "DOC2IMG_VIEW", default_value = "assets")]
        view: ViewArg,

        /// Maximum upload size in MiB.
        #[arg(long, env = "DOC2IMG_BODY_LIMIT_MB", default_value_t = 50)]
        body_limit_mb: usize,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// List the objects stored for a job.
    List {
        job_id: String,

        #[arg(long, env = "DOC2IMG_KEY_PREFIX", default_value = "images")]
        key_prefix: String,
    },

    /// Delete every object stored for a job.
    Delete {
        job_id: String,

        #[arg(long, env = "DOC2IMG_KEY_PREFIX", default_value = "images")]
        key_prefix: String,

        /// Actually delete; without it the keys are only printed.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Storage backend.
    #[arg(long, value_enum, env = "DOC2IMG_STORE", default_value = "supabase", global = true)]
    store: StoreKind,

    /// Supabase project URL.
    #[arg(long, env = "SUPABASE_URL", global = true)]
    supabase_url: Option<String>,

    /// Supabase service key.
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true, global = true)]
    supabase_key: Option<String>,

    /// Supabase bucket.
    #[arg(long, env = "SUPABASE_BUCKET", default_value = "images", global = true)]
    supabase_bucket: String,

    /// Per-request storage timeout in seconds.
    #[arg(long, env = "DOC2IMG_STORAGE_TIMEOUT", default_value_t = 30, global = true)]
    storage_timeout: u64,

    /// Root directory for --store local.
    #[arg(long, env = "DOC2IMG_LOCAL_ROOT", default_value = "./published", global = true)]
    local_root: PathBuf,

    /// Base URL the local root (or memory store) is served under.
    #[arg(long, env = "DOC2IMG_PUBLIC_BASE", global = true)]
    public_base: Option<String>,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Rendering DPI (72–400).
    #[arg(long, env = "DOC2IMG_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Maximum rendered edge in pixels.
    #[arg(long, env = "DOC2IMG_MAX_PIXELS", default_value_t = 4000)]
    max_pixels: u32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOC2IMG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Explicit path to libpdfium.
    #[arg(long, env = "DOC2IMG_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Parent directory for per-job temp directories.
    #[arg(long, env = "DOC2IMG_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// First segment of every storage key.
    #[arg(long, env = "DOC2IMG_KEY_PREFIX", default_value = "images")]
    key_prefix: String,

    /// Return public URLs instead of storage keys as locators.
    #[arg(long, env = "DOC2IMG_PUBLIC_URLS")]
    public_urls: bool,

    /// LibreOffice binary used for slide decks.
    #[arg(long, env = "DOC2IMG_SOFFICE", default_value = "soffice")]
    soffice: PathBuf,

    /// Office conversion timeout in seconds.
    #[arg(long, env = "DOC2IMG_BRIDGE_TIMEOUT", default_value_t = 120)]
    bridge_timeout: u64,

    /// Maximum concurrent office processes (default: unbounded).
    #[arg(long, env = "DOC2IMG_BRIDGE_MAX_CONCURRENT")]
    bridge_max_concurrent: Option<usize>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StoreKind {
    Supabase,
    Local,
    Memory,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ViewArg {
    JobId,
    FolderUrl,
    Assets,
}

impl From<ViewArg> for ResultView {
    fn from(v: ViewArg) -> Self {
        match v {
            ViewArg::JobId => ResultView::JobId,
            ViewArg::FolderUrl => ResultView::FolderUrl,
            ViewArg::Assets => ResultView::AssetList,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during `convert`.
    let show_progress = match &cli.command {
        Command::Convert {
            json, no_progress, ..
        } => !cli.quiet && !no_progress && !json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let store = build_store(&cli.store)?;

    match cli.command {
        Command::Convert {
            file,
            mime,
            view,
            json,
            pipeline,
            ..
        } => {
            let progress: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
            } else {
                None
            };
            let config = build_config(&pipeline, progress)?;
            let pipeline = ConversionPipeline::new(config, store);

            let output = pipeline
                .process_file(&file, mime.as_deref())
                .await
                .with_context(|| format!("Conversion of {} failed", file.display()))?;

            if json {
                let body = serde_json::to_string_pretty(&output.project(view.into()))
                    .context("Failed to serialise output")?;
                println!("{body}");
            } else {
                for locator in output.locators() {
                    println!("{locator}");
                }
            }
            if !cli.quiet && !json && !show_progress {
                eprintln!(
                    "{}  {} pages  {}ms  →  {}",
                    green("✔"),
                    output.stats.page_count,
                    output.stats.total_duration_ms,
                    bold(&output.namespace),
                );
            }
        }

        Command::Serve {
            addr,
            view,
            body_limit_mb,
            pipeline,
        } => {
            let config = build_config(&pipeline, None)?;
            let pipeline = ConversionPipeline::new(config, store);
            let server_config = ServerConfig {
                default_view: view.into(),
                body_limit_bytes: body_limit_mb.max(1) * 1024 * 1024,
            };
            server::serve(addr, pipeline, server_config)
                .await
                .with_context(|| format!("Server on {addr} failed"))?;
        }

        Command::List { job_id, key_prefix } => {
            let pipeline = admin_pipeline(store, &key_prefix)?;
            let id = parse_job_id(&job_id)?;
            let keys = pipeline.list_job(id).await.context("Listing failed")?;
            for key in &keys {
                println!("{key}");
            }
            if !cli.quiet {
                eprintln!("{} object(s)", keys.len());
            }
        }

        Command::Delete {
            job_id,
            key_prefix,
            yes,
        } => {
            let pipeline = admin_pipeline(store, &key_prefix)?;
            let id = parse_job_id(&job_id)?;
            if yes {
                let removed = pipeline.delete_job(id).await.context("Delete failed")?;
                if !cli.quiet {
                    eprintln!("{} removed {} object(s)", green("✔"), removed);
                }
            } else {
                let keys = pipeline.list_job(id).await.context("Listing failed")?;
                for key in &keys {
                    println!("{key}");
                }
                eprintln!(
                    "{} object(s) would be deleted; re-run with {} to delete them",
                    keys.len(),
                    bold("--yes")
                );
            }
        }
    }

    Ok(())
}

fn build_store(args: &StoreArgs) -> Result<Arc<dyn ObjectStore>> {
    Ok(match args.store {
        StoreKind::Supabase => {
            let (Some(url), Some(key)) = (&args.supabase_url, &args.supabase_key) else {
                anyhow::bail!(
                    "SUPABASE_URL and SUPABASE_KEY are required for --store supabase \
                     (or use --store local / --store memory)"
                );
            };
            let config = SupabaseConfig::new(url, key)
                .bucket(&args.supabase_bucket)
                .timeout_secs(args.storage_timeout);
            Arc::new(SupabaseStore::new(config).context("Invalid Supabase configuration")?)
        }
        StoreKind::Local => {
            let mut store = LocalStore::new(&args.local_root);
            if let Some(base) = &args.public_base {
                store = store.with_public_base(base);
            }
            Arc::new(store)
        }
        StoreKind::Memory => {
            let mut store = MemoryStore::new();
            if let Some(base) = &args.public_base {
                store = store.with_public_base(base);
            }
            Arc::new(store)
        }
    })
}

/// Map CLI args to `PipelineConfig`.
fn build_config(args: &PipelineArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(args.dpi)
        .max_rendered_pixels(args.max_pixels)
        .key_prefix(&args.key_prefix)
        .locator_style(if args.public_urls {
            LocatorStyle::PublicUrl
        } else {
            LocatorStyle::Key
        })
        .bridge_program(&args.soffice)
        .bridge_timeout_secs(args.bridge_timeout);

    if let Some(pwd) = &args.password {
        builder = builder.password(pwd);
    }
    if let Some(lib) = &args.pdfium_lib {
        builder = builder.pdfium_library(lib);
    }
    if let Some(dir) = &args.temp_dir {
        builder = builder.temp_root(dir);
    }
    if let Some(n) = args.bridge_max_concurrent {
        builder = builder.bridge_max_concurrent(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// A pipeline used only for namespace listing and deletion.
fn admin_pipeline(store: Arc<dyn ObjectStore>, key_prefix: &str) -> Result<ConversionPipeline> {
    let config = PipelineConfig::builder()
        .key_prefix(key_prefix)
        .build()
        .context("Invalid configuration")?;
    Ok(ConversionPipeline::new(config, store))
}

fn parse_job_id(s: &str) -> Result<JobId> {
    JobId::parse(s).with_context(|| format!("'{s}' is not a job id (expected a UUID)"))
}
