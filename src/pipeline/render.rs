//! Page rendering: source document → ordered PNG pages in the temp store.
//!
//! Two renderers sit behind the [`PageRenderer`] trait:
//!
//! * [`PdfRenderer`] rasterises every page with pdfium.
//! * [`OfficeRenderer`] hands the deck to the [`OfficeBridge`] and feeds the
//!   resulting PDF to a [`PdfRenderer`].
//!
//! [`RendererSet::select`] picks one from the declared format alone; there is
//! no content sniffing and no placeholder fallback. If slides cannot be
//! rendered for real, the job fails with `bridge-unavailable`.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which is synchronous and
//! CPU-bound. Rendering runs on the blocking pool so the Tokio workers keep
//! serving other jobs.
//!
//! ## Why cap pixels as well as DPI?
//!
//! Page sizes vary wildly: an A0 poster at 150 DPI is ~7,000 × 10,000 px.
//! `max_rendered_pixels` caps both edges regardless of physical size.

use crate::config::PipelineConfig;
use crate::document::DocumentFormat;
use crate::error::{RenderError, RenderStage};
use crate::output::{PageImageFormat, RenderedPage};
use crate::pipeline::bridge::OfficeBridge;
use crate::pipeline::encode;
use crate::pipeline::temp::TempArtifactStore;
use async_trait::async_trait;
use pdfium_render::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a staged source file into page images.
///
/// Implementations write every file they produce through `temp`, so the
/// pipeline's single `release_all` removes them. Pages are returned in
/// source order with `pages[i].index == i`, and never empty.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        source: &Path,
        temp: &mut TempArtifactStore,
    ) -> Result<Vec<RenderedPage>, RenderError>;
}

// ── PDF ───────────────────────────────────────────────────────────────────

/// Rasterises PDFs with pdfium.
#[derive(Clone)]
pub struct PdfRenderer {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
    library: Option<PathBuf>,
}

impl fmt::Debug for PdfRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfRenderer")
            .field("dpi", &self.dpi)
            .field("max_pixels", &self.max_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("library", &self.library)
            .finish()
    }
}

impl PdfRenderer {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            library: config.pdfium_library.clone(),
        }
    }
}

#[async_trait]
impl PageRenderer for PdfRenderer {
    async fn render(
        &self,
        source: &Path,
        temp: &mut TempArtifactStore,
    ) -> Result<Vec<RenderedPage>, RenderError> {
        let pages_dir = temp
            .acquire_dir("pages")
            .map_err(|e| RenderError::staging(format!("create page directory: {e}")))?;

        let source = source.to_path_buf();
        let out_dir = pages_dir.clone();
        let renderer = self.clone();

        let result = tokio::task::spawn_blocking(move || renderer.render_blocking(&source, &out_dir))
            .await
            .map_err(|e| RenderError::rasterize(format!("rasterisation task aborted: {e}")))?;

        // Track whatever was written, including pages before a failure, so
        // release_all removes each file individually.
        if let Ok(entries) = std::fs::read_dir(&pages_dir) {
            for entry in entries.flatten() {
                temp.track(entry.path());
            }
        }

        result
    }
}

impl PdfRenderer {
    fn render_blocking(&self, source: &Path, out_dir: &Path) -> Result<Vec<RenderedPage>, RenderError> {
        let pdfium = bind_engine(self.library.as_deref())?;

        let document = pdfium
            .load_pdf_from_file(source, self.password.as_deref())
            .map_err(|e| classify_load_error(&e, self.password.is_some()))?;

        let pages = document.pages();
        let total = pages.len() as usize;
        if total == 0 {
            return Err(RenderError::rasterize("document has no pages"));
        }
        info!(pages = total, dpi = self.dpi, "PDF loaded");

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut rendered = Vec::with_capacity(total);
        for (index, page) in pages.iter().enumerate() {
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                RenderError::rasterize(format!("page {}: {:?}", index + 1, e))
            })?;
            let image = bitmap.as_image();

            let path = out_dir.join(format!("{index}.{}", PageImageFormat::Png.extension()));
            let byte_len = encode::write_png(&image, &path).map_err(|e| match e {
                image::ImageError::IoError(io) => {
                    RenderError::staging(format!("write {}: {io}", path.display()))
                }
                other => RenderError::rasterize(format!("encode page {}: {other}", index + 1)),
            })?;

            debug!(
                page = index,
                width = image.width(),
                height = image.height(),
                bytes = byte_len,
                "Rendered page"
            );
            rendered.push(RenderedPage {
                index,
                format: PageImageFormat::Png,
                width: image.width(),
                height: image.height(),
                byte_len,
                path,
            });
        }

        Ok(rendered)
    }
}

/// Bind libpdfium: explicit path, then `PDFIUM_LIB_PATH`, then the working
/// directory, then the system library search path.
fn bind_engine(library: Option<&Path>) -> Result<Pdfium, RenderError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => match std::env::var_os("PDFIUM_LIB_PATH") {
            Some(path) => Pdfium::bind_to_library(PathBuf::from(path)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        },
    };
    bindings.map(Pdfium::new).map_err(|e| {
        RenderError::new(
            RenderStage::PdfEngineUnavailable,
            format!(
                "cannot load libpdfium: {e}\nSet PDFIUM_LIB_PATH or --pdfium-lib to the library path."
            ),
        )
    })
}

fn classify_load_error(e: &PdfiumError, have_password: bool) -> RenderError {
    let err_str = format!("{:?}", e);
    if err_str.contains("Password") || err_str.contains("password") {
        if have_password {
            RenderError::rasterize("incorrect PDF password")
        } else {
            RenderError::rasterize("PDF is encrypted; configure a password")
        }
    } else {
        RenderError::rasterize(format!("cannot open PDF: {err_str}"))
    }
}

// ── Office slides ─────────────────────────────────────────────────────────

/// Renders slide decks by converting them to PDF first.
#[derive(Debug, Clone)]
pub struct OfficeRenderer {
    bridge: OfficeBridge,
    pdf: PdfRenderer,
}

impl OfficeRenderer {
    pub fn new(bridge: OfficeBridge, pdf: PdfRenderer) -> Self {
        Self { bridge, pdf }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(OfficeBridge::new(&config.bridge), PdfRenderer::from_config(config))
    }
}

#[async_trait]
impl PageRenderer for OfficeRenderer {
    async fn render(
        &self,
        source: &Path,
        temp: &mut TempArtifactStore,
    ) -> Result<Vec<RenderedPage>, RenderError> {
        let out_dir = temp
            .acquire_dir("bridge")
            .map_err(|e| RenderError::staging(format!("create bridge directory: {e}")))?;
        let pdf = self.bridge.to_pdf(source, &out_dir).await?;
        self.pdf.render(&pdf, temp).await
    }
}

// ── Selection ─────────────────────────────────────────────────────────────

/// One renderer per supported format.
#[derive(Clone)]
pub struct RendererSet {
    pdf: Arc<dyn PageRenderer>,
    office: Arc<dyn PageRenderer>,
}

impl fmt::Debug for RendererSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererSet").finish_non_exhaustive()
    }
}

impl RendererSet {
    pub fn new(pdf: Arc<dyn PageRenderer>, office: Arc<dyn PageRenderer>) -> Self {
        Self { pdf, office }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            Arc::new(PdfRenderer::from_config(config)),
            Arc::new(OfficeRenderer::from_config(config)),
        )
    }

    pub fn select(&self, format: DocumentFormat) -> Arc<dyn PageRenderer> {
        match format {
            DocumentFormat::Pdf => Arc::clone(&self.pdf),
            DocumentFormat::OfficeSlides => Arc::clone(&self.office),
        }
    }
}
