//! Error types for the edgequake-doc2img library.
//!
//! Every job ends in exactly one of two ways: a complete, ordered list of
//! published assets, or a single [`PipelineError`] naming the stage that
//! failed. There is no partial success.
//!
//! * [`PipelineError`] — the terminal error returned by
//!   [`crate::convert::ConversionPipeline::process`].
//! * [`RenderError`] — produced by the renderers and the office bridge; its
//!   [`RenderStage`] tells input problems apart from environment problems.
//! * [`PublishError`] — produced by the asset publisher; records which page
//!   index failed and how many pages had already been uploaded.
//! * [`StorageError`] — produced by [`crate::storage::ObjectStore`] backends.
//!
//! Cleanup failures are deliberately absent: they are logged by
//! [`crate::pipeline::temp::TempArtifactStore`] and never replace the
//! primary outcome of a job.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The pipeline stage a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Validation,
    Render,
    Publish,
}

impl FailedStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailedStage::Validation => "validation",
            FailedStage::Render => "render",
            FailedStage::Publish => "publish",
        }
    }
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is at fault for a failure: the submitted document or the deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// The caller sent something we cannot convert. Retrying will not help.
    Input,
    /// Storage, network, renderer installation or a transient process failure.
    Infrastructure,
}

/// Terminal error for one conversion job.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Validation ────────────────────────────────────────────────────────
    /// The declared MIME type is outside the supported set.
    #[error("Unsupported content type '{mime}'\nSupported: {}", crate::document::SUPPORTED_MIME_TYPES.join(", "))]
    UnsupportedFormat { mime: String },

    /// A local source file could not be read (`process_file` only).
    #[error("Cannot read '{path}': {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Render ────────────────────────────────────────────────────────────
    #[error(transparent)]
    Render(#[from] RenderError),

    // ── Publish ───────────────────────────────────────────────────────────
    #[error(transparent)]
    Publish(#[from] PublishError),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (job directory creation, task panic).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// The stage this error aborted.
    ///
    /// Internal errors are attributed to the render stage: the only internal
    /// failures the pipeline can hit happen while staging the source document
    /// or joining a rasterisation task.
    pub fn failed_stage(&self) -> FailedStage {
        match self {
            PipelineError::UnsupportedFormat { .. }
            | PipelineError::ReadInput { .. }
            | PipelineError::InvalidConfig(_) => FailedStage::Validation,
            PipelineError::Render(_) | PipelineError::Internal(_) => FailedStage::Render,
            PipelineError::Publish(_) => FailedStage::Publish,
        }
    }

    /// Whether resubmitting the whole request may succeed.
    ///
    /// A retried request always receives a fresh job identifier, so a retry
    /// after a partial publish never overwrites the earlier namespace.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::UnsupportedFormat { .. }
            | PipelineError::ReadInput { .. }
            | PipelineError::InvalidConfig(_) => false,
            PipelineError::Render(e) => e.stage.is_retryable(),
            PipelineError::Publish(_) => true,
            PipelineError::Internal(_) => true,
        }
    }

    pub fn fault(&self) -> Fault {
        match self {
            PipelineError::UnsupportedFormat { .. } | PipelineError::ReadInput { .. } => {
                Fault::Input
            }
            PipelineError::Render(e) => e.stage.fault(),
            _ => Fault::Infrastructure,
        }
    }

    /// Short machine-readable stage label, e.g. `bridge-failed` or `publish`.
    pub fn stage_label(&self) -> &'static str {
        match self {
            PipelineError::Render(e) => e.stage.as_str(),
            other => other.failed_stage().as_str(),
        }
    }
}

/// Where inside the render stage a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum RenderStage {
    /// The office suite binary is not installed or not executable.
    #[serde(rename = "bridge-unavailable")]
    BridgeUnavailable,
    /// The office suite exited non-zero or timed out.
    #[serde(rename = "bridge-failed")]
    BridgeFailed,
    /// The office suite reported success but wrote no PDF.
    #[serde(rename = "bridge-no-output")]
    BridgeNoOutput,
    /// pdfium could not open or rasterise the PDF (corrupt, encrypted, empty).
    #[serde(rename = "pdf-rasterize")]
    PdfRasterize,
    /// The pdfium library could not be located or bound.
    #[serde(rename = "pdf-engine-unavailable")]
    PdfEngineUnavailable,
    /// Writing the source or page images to the job's temp directory failed.
    #[serde(rename = "staging")]
    Staging,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::BridgeUnavailable => "bridge-unavailable",
            RenderStage::BridgeFailed => "bridge-failed",
            RenderStage::BridgeNoOutput => "bridge-no-output",
            RenderStage::PdfRasterize => "pdf-rasterize",
            RenderStage::PdfEngineUnavailable => "pdf-engine-unavailable",
            RenderStage::Staging => "staging",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RenderStage::BridgeFailed | RenderStage::BridgeNoOutput | RenderStage::Staging
        )
    }

    pub fn fault(&self) -> Fault {
        match self {
            RenderStage::PdfRasterize => Fault::Input,
            _ => Fault::Infrastructure,
        }
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure while turning the source document into page images.
#[derive(Debug, Clone, Error)]
#[error("Render failed at stage '{stage}': {detail}")]
pub struct RenderError {
    pub stage: RenderStage,
    pub detail: String,
}

impl RenderError {
    pub fn new(stage: RenderStage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            detail: detail.into(),
        }
    }

    pub fn rasterize(detail: impl Into<String>) -> Self {
        Self::new(RenderStage::PdfRasterize, detail)
    }

    pub fn staging(detail: impl Into<String>) -> Self {
        Self::new(RenderStage::Staging, detail)
    }
}

/// Uploading page `failed_at_index` failed; the job is aborted.
///
/// Pages `0..failed_at_index` were uploaded before the failure and remain in
/// storage. They are not rolled back.
#[derive(Debug, Error)]
#[error("Publish failed at page index {failed_at_index} ({uploaded} page(s) already uploaded): {source}")]
pub struct PublishError {
    pub failed_at_index: usize,
    pub uploaded: usize,
    #[source]
    pub source: StorageError,
}

/// Errors returned by [`crate::storage::ObjectStore`] backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend answered with a non-success HTTP status.
    #[error("Storage returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never produced a response (DNS, TLS, timeout, reset).
    #[error("Storage request failed: {0}")]
    Transport(String),

    /// An object already exists at the key; objects are never overwritten.
    #[error("Object already exists at '{key}'")]
    Conflict { key: String },

    /// The key is empty, absolute or contains `..` segments.
    #[error("Invalid object key '{key}'")]
    InvalidKey { key: String },

    /// Reading the local page file before upload failed.
    #[error("Failed to read local artifact '{path}': {source}")]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backend was configured with an unusable URL, bucket or credential.
    #[error("Storage configuration error: {0}")]
    Config(String),

    /// Local filesystem backend I/O failure.
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        StorageError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_validation_input_fault() {
        let e = PipelineError::UnsupportedFormat {
            mime: "image/gif".into(),
        };
        assert_eq!(e.failed_stage(), FailedStage::Validation);
        assert_eq!(e.fault(), Fault::Input);
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("image/gif"));
    }

    #[test]
    fn unsupported_format_lists_every_accepted_type() {
        let msg = PipelineError::UnsupportedFormat {
            mime: "text/plain".into(),
        }
        .to_string();
        for mime in [
            "application/pdf",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            "application/vnd.ms-powerpoint",
            "application/vnd.oasis.opendocument.presentation",
        ] {
            assert!(msg.contains(mime), "{mime} missing from: {msg}");
            assert!(crate::document::DocumentFormat::from_mime(mime).is_some());
        }
    }

    #[test]
    fn bridge_unavailable_is_not_retryable() {
        let e: PipelineError = RenderError::new(RenderStage::BridgeUnavailable, "soffice").into();
        assert_eq!(e.failed_stage(), FailedStage::Render);
        assert_eq!(e.stage_label(), "bridge-unavailable");
        assert_eq!(e.fault(), Fault::Infrastructure);
        assert!(!e.is_retryable());
    }

    #[test]
    fn bridge_failed_and_no_output_are_retryable() {
        assert!(RenderStage::BridgeFailed.is_retryable());
        assert!(RenderStage::BridgeNoOutput.is_retryable());
        assert!(!RenderStage::PdfRasterize.is_retryable());
        assert!(!RenderStage::PdfEngineUnavailable.is_retryable());
    }

    #[test]
    fn rasterize_failure_blames_input() {
        let e: PipelineError = RenderError::rasterize("document has no pages").into();
        assert_eq!(e.fault(), Fault::Input);
        assert!(e.to_string().contains("pdf-rasterize"), "got: {e}");
    }

    #[test]
    fn publish_error_display() {
        let e = PublishError {
            failed_at_index: 2,
            uploaded: 2,
            source: StorageError::Http {
                status: 503,
                body: "unavailable".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("index 2"), "got: {msg}");
        assert!(msg.contains("503"), "got: {msg}");

        let e: PipelineError = e.into();
        assert_eq!(e.failed_stage(), FailedStage::Publish);
        assert_eq!(e.stage_label(), "publish");
        assert!(e.is_retryable());
    }

    #[test]
    fn render_stage_serialises_as_kebab_label() {
        let json = serde_json::to_string(&RenderStage::BridgeNoOutput).unwrap();
        assert_eq!(json, "\"bridge-no-output\"");
    }
}
