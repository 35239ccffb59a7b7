//! # edgequake-doc2img
//!
//! Convert PDF documents and slide decks into one PNG per page and publish
//! them to object storage.
//!
//! ## Why this crate?
//!
//! Viewers, thumbnails and vision models all want pages as images, and they
//! want them somewhere addressable. This crate takes a document and its
//! declared MIME type, rasterises every page, uploads the images under a
//! fresh per-job namespace and returns their locators in page order. Either
//! every page is published or the caller gets one error naming the stage
//! that failed.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document + MIME
//!  │
//!  ├─ 1. Validate  PDF or slide deck? (declared type only, no I/O)
//!  ├─ 2. Stage     write bytes into a per-job temp directory
//!  ├─ 3. Bridge    slides only: soffice --headless --convert-to pdf
//!  ├─ 4. Render    rasterise pages via pdfium (spawn_blocking), PNG-encode
//!  ├─ 5. Publish   upload images/{job_id}/{index}.png, in order
//!  └─ 6. Cleanup   remove the temp directory on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_doc2img::{ConversionPipeline, MemoryStore, PipelineConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder().dpi(150).build()?;
//!     let pipeline = ConversionPipeline::new(config, Arc::new(MemoryStore::new()));
//!     let output = pipeline.process_file("slides.pdf", None).await?;
//!     for locator in output.locators() {
//!         println!("{locator}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP wrapper (`POST /upload/`) |
//! | `cli`    | on      | Enables the `doc2img` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable both when using only the library:
//! ```toml
//! edgequake-doc2img = { version = "0.1", default-features = false }
//! ```
//!
//! ## Runtime requirements
//!
//! | Input | Needs |
//! |-------|-------|
//! | PDF   | libpdfium (`PDFIUM_LIB_PATH`, working dir, or system path) |
//! | PPTX / PPT / ODP | libpdfium and LibreOffice (`soffice`) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod document;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BridgeConfig, LocatorStyle, PipelineConfig, PipelineConfigBuilder};
pub use convert::ConversionPipeline;
pub use document::{DocumentFormat, SourceDocument};
pub use error::{
    FailedStage, Fault, PipelineError, PublishError, RenderError, RenderStage, StorageError,
};
pub use job::{ConversionJob, JobId, JobState};
pub use output::{
    ConversionOutput, ConversionStats, PageImageFormat, ProjectedResult, PublishedAsset,
    RenderedPage, ResultView,
};
pub use pipeline::render::{OfficeRenderer, PageRenderer, PdfRenderer, RendererSet};
pub use pipeline::temp::{CleanupReport, TempArtifactStore};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use storage::{
    LocalStore, MemoryStore, ObjectStore, StoredObject, SupabaseConfig, SupabaseStore,
};
