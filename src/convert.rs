//! The conversion pipeline: one document in, ordered page assets out.
//!
//! ```text
//! Received ─▶ Validated ─▶ Rendered ─▶ Published ─▶ Done
//!  (MIME)      (temp dir,    (upload      (assemble
//!               render)       per page)    output)
//! ```
//!
//! A job is single-shot. Nothing is retried here; the first error moves the
//! job to `Failed{stage}` and is returned as-is. The job's temp directory is
//! released on every exit path after it was created, and by `Drop` if the
//! `process` future is cancelled.
//!
//! The pipeline holds no per-job state of its own, so one instance (cheap to
//! clone) can serve any number of concurrent jobs.

use crate::config::PipelineConfig;
use crate::document::{DocumentFormat, SourceDocument};
use crate::error::{PipelineError, RenderError, StorageError};
use crate::job::{ConversionJob, InvalidTransition, JobId, JobState};
use crate::output::{ConversionOutput, ConversionStats, RenderedPage};
use crate::pipeline::publish::{job_namespace, AssetPublisher};
use crate::pipeline::render::RendererSet;
use crate::pipeline::temp::TempArtifactStore;
use crate::storage::ObjectStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Converts documents to page images and publishes them.
#[derive(Clone)]
pub struct ConversionPipeline {
    config: Arc<PipelineConfig>,
    renderers: RendererSet,
    publisher: AssetPublisher,
}

impl std::fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field("config", &self.config)
            .field("store", &self.publisher.store().name())
            .finish_non_exhaustive()
    }
}

impl ConversionPipeline {
    /// Build a pipeline with the pdfium and office-bridge renderers.
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        let renderers = RendererSet::from_config(&config);
        Self::with_renderers(config, store, renderers)
    }

    /// Build a pipeline with caller-supplied renderers.
    pub fn with_renderers(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        renderers: RendererSet,
    ) -> Self {
        let publisher = AssetPublisher::from_config(&config, store);
        Self {
            config: Arc::new(config),
            renderers,
            publisher,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        self.publisher.store()
    }

    /// Run one job to completion.
    ///
    /// # Returns
    /// Every page of the document as a published asset, in page order.
    ///
    /// # Errors
    /// A single [`PipelineError`] naming the stage that failed. On a publish
    /// failure, pages before `failed_at_index` remain in storage under the
    /// job's namespace.
    pub async fn process(&self, document: SourceDocument) -> Result<ConversionOutput, PipelineError> {
        let total_start = Instant::now();
        let mut job = ConversionJob::receive(document);
        let job_id = job.id();

        info!(
            job_id = %job_id,
            filename = job.document().filename(),
            mime = job.document().mime_type(),
            bytes = job.document().len(),
            "Job received"
        );
        if let Some(cb) = &self.config.progress_callback {
            cb.on_job_start(job_id, job.document().filename());
            cb.on_stage(job_id, JobState::Received);
        }

        let result = self.run(&mut job, total_start).await;

        match &result {
            Ok(output) => {
                info!(
                    job_id = %job_id,
                    pages = output.assets.len(),
                    total_ms = output.stats.total_duration_ms,
                    "Job done"
                );
                if let Some(cb) = &self.config.progress_callback {
                    cb.on_job_complete(job_id, output.assets.len(), None);
                }
            }
            Err(e) => {
                let stage = e.failed_stage();
                if let Err(t) = job.failed(stage) {
                    warn!(job_id = %job_id, error = %t, "Could not record failure state");
                } else {
                    self.announce(job_id, JobState::Failed(stage));
                }
                warn!(
                    job_id = %job_id,
                    stage = e.stage_label(),
                    retryable = e.is_retryable(),
                    error = %e,
                    "Job failed"
                );
                if let Some(cb) = &self.config.progress_callback {
                    let published = match e {
                        PipelineError::Publish(p) => p.uploaded,
                        _ => 0,
                    };
                    cb.on_job_complete(job_id, published, Some(e.to_string().as_str()));
                }
            }
        }
        result
    }

    /// Read a local file and run it as one job.
    ///
    /// When `mime` is `None` the type is inferred from the file extension.
    pub async fn process_file(
        &self,
        path: impl AsRef<Path>,
        mime: Option<&str>,
    ) -> Result<ConversionOutput, PipelineError> {
        let path = path.as_ref();
        let mime = match mime {
            Some(m) => m.to_string(),
            None => DocumentFormat::mime_for_path(path)
                .map(String::from)
                .ok_or_else(|| PipelineError::UnsupportedFormat {
                    mime: format!(
                        "unknown (extension '{}')",
                        path.extension().and_then(|e| e.to_str()).unwrap_or("")
                    ),
                })?,
        };
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::ReadInput {
                path: path.to_path_buf(),
                source: e,
            })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.process(SourceDocument::new(data, mime, filename)).await
    }

    /// Keys stored under a job's namespace.
    pub async fn list_job(&self, job_id: JobId) -> Result<Vec<String>, StorageError> {
        self.store()
            .list(&job_namespace(self.publisher.key_prefix(), job_id))
            .await
    }

    /// Delete every object under a job's namespace. Returns how many were removed.
    pub async fn delete_job(&self, job_id: JobId) -> Result<usize, StorageError> {
        let keys = self.list_job(job_id).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed = self.store().delete(&keys).await?;
        info!(job_id = %job_id, removed, "Deleted job namespace");
        Ok(removed)
    }

    // ── Stages ────────────────────────────────────────────────────────────

    async fn run(
        &self,
        job: &mut ConversionJob,
        total_start: Instant,
    ) -> Result<ConversionOutput, PipelineError> {
        // Validation touches nothing on disk or on the network.
        let format = DocumentFormat::from_mime(job.document().mime_type()).ok_or_else(|| {
            PipelineError::UnsupportedFormat {
                mime: job.document().mime_type().to_string(),
            }
        })?;
        self.transition(job.id(), JobState::Validated, job.validated(format))?;

        let mut temp = TempArtifactStore::new(&self.config.temp_root, job.id()).map_err(|e| {
            RenderError::staging(format!(
                "create job directory under {}: {e}",
                self.config.temp_root.display()
            ))
        })?;

        let outcome = self.render_and_publish(job, format, &mut temp, total_start).await;

        // Cleanup never replaces the outcome; failures are logged by the store.
        let report = temp.release_all();
        debug!(
            job_id = %job.id(),
            removed = report.removed,
            clean = report.is_clean(),
            "Job cleanup finished"
        );
        outcome
    }

    async fn render_and_publish(
        &self,
        job: &mut ConversionJob,
        format: DocumentFormat,
        temp: &mut TempArtifactStore,
        total_start: Instant,
    ) -> Result<ConversionOutput, PipelineError> {
        let job_id = job.id();

        // ── Render ───────────────────────────────────────────────────────
        let render_start = Instant::now();
        let source = self.stage_source(job, format, temp).await?;
        let pages = self.renderers.select(format).render(&source, temp).await?;
        check_page_order(&pages)?;
        let render_duration_ms = render_start.elapsed().as_millis() as u64;

        let total = pages.len();
        if let Some(cb) = &self.config.progress_callback {
            for page in &pages {
                cb.on_page_rendered(page.index, total);
            }
        }
        info!(job_id = %job_id, pages = total, render_ms = render_duration_ms, "Rendered document");
        let total_bytes: u64 = pages.iter().map(|p| p.byte_len).sum();
        self.transition(job_id, JobState::Rendered, job.rendered(pages))?;

        // ── Publish ──────────────────────────────────────────────────────
        let publish_start = Instant::now();
        let assets = self
            .publisher
            .publish(
                job_id,
                job.pages(),
                temp,
                self.config.progress_callback.as_ref(),
            )
            .await?;
        let publish_duration_ms = publish_start.elapsed().as_millis() as u64;
        self.transition(job_id, JobState::Published, job.published(assets))?;

        // ── Done ─────────────────────────────────────────────────────────
        self.transition(job_id, JobState::Done, job.done())?;

        Ok(ConversionOutput {
            job_id,
            filename: job.document().filename().to_string(),
            format,
            namespace: job_namespace(self.publisher.key_prefix(), job_id),
            folder_url: self.publisher.folder_url(job_id),
            assets: job.assets().to_vec(),
            stats: ConversionStats {
                page_count: total,
                total_bytes,
                render_duration_ms,
                publish_duration_ms,
                total_duration_ms: total_start.elapsed().as_millis() as u64,
            },
        })
    }

    /// Write the uploaded bytes into the job directory for the renderer.
    async fn stage_source(
        &self,
        job: &ConversionJob,
        format: DocumentFormat,
        temp: &mut TempArtifactStore,
    ) -> Result<std::path::PathBuf, RenderError> {
        let doc = job.document();
        let name = format!("{}.{}", doc.stem(), format.staging_extension(doc.mime_type()));
        let path = temp.acquire(&name);
        tokio::fs::write(&path, doc.data())
            .await
            .map_err(|e| RenderError::staging(format!("write {}: {e}", path.display())))?;
        debug!(job_id = %job.id(), path = %path.display(), "Staged source document");
        Ok(path)
    }

    fn transition(
        &self,
        job_id: JobId,
        state: JobState,
        result: Result<(), InvalidTransition>,
    ) -> Result<(), PipelineError> {
        result.map_err(|e| PipelineError::Internal(e.to_string()))?;
        self.announce(job_id, state);
        Ok(())
    }

    fn announce(&self, job_id: JobId, state: JobState) {
        info!(job_id = %job_id, state = %state, "Job state changed");
        if let Some(cb) = &self.config.progress_callback {
            cb.on_stage(job_id, state);
        }
    }
}

/// Renderers must return at least one page, numbered 0..n in order.
fn check_page_order(pages: &[RenderedPage]) -> Result<(), PipelineError> {
    if pages.is_empty() {
        return Err(RenderError::rasterize("document has no pages").into());
    }
    if let Some((pos, page)) = pages.iter().enumerate().find(|(i, p)| p.index != *i) {
        return Err(PipelineError::Internal(format!(
            "renderer returned page index {} at position {pos}",
            page.index
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageImageFormat;
    use std::path::PathBuf;

    fn page(index: usize) -> RenderedPage {
        RenderedPage {
            index,
            format: PageImageFormat::Png,
            width: 1,
            height: 1,
            byte_len: 1,
            path: PathBuf::from(format!("{index}.png")),
        }
    }

    #[test]
    fn empty_render_is_rasterize_failure() {
        let err = check_page_order(&[]).unwrap_err();
        assert_eq!(err.stage_label(), "pdf-rasterize");
    }

    #[test]
    fn out_of_order_pages_are_rejected() {
        assert!(check_page_order(&[page(0), page(1)]).is_ok());
        let err = check_page_order(&[page(1), page(0)]).unwrap_err();
        assert!(matches!(err, PipelineError::Internal(_)));
    }
}
