//! Output types: rendered pages, published assets and the job result.
//!
//! [`ConversionOutput`] is the single canonical result of a successful job.
//! The response shapes callers have historically asked for (a bare folder
//! id, a folder URL, a list of per-image locators) are pure projections of
//! it via [`ConversionOutput::project`], not separate code paths.

use crate::document::DocumentFormat;
use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Raster format of rendered pages. Fixed to PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageImageFormat {
    #[default]
    Png,
}

impl PageImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            PageImageFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            PageImageFormat::Png => "image/png",
        }
    }
}

/// One page or slide rasterised to an image.
///
/// The encoded bytes live in a file inside the job's temp store so that
/// publishing holds at most one page in memory and can delete each local
/// copy as soon as it is uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 0-based position in the source document.
    pub index: usize,
    pub format: PageImageFormat,
    pub width: u32,
    pub height: u32,
    /// Size of the encoded image in bytes.
    pub byte_len: u64,
    /// Local file holding the encoded image.
    pub path: PathBuf,
}

impl RenderedPage {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A rendered page after durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedAsset {
    /// Same index as the [`RenderedPage`] it came from.
    pub index: usize,
    /// Storage key, always `{prefix}/{job_id}/{index}.png`.
    pub key: String,
    /// Opaque identifier or fully-qualified URL, depending on
    /// [`crate::config::LocatorStyle`].
    pub locator: String,
}

/// Timing and size figures for a finished job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub page_count: usize,
    /// Sum of encoded PNG sizes.
    pub total_bytes: u64,
    /// Includes the office bridge for slide documents.
    pub render_duration_ms: u64,
    pub publish_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of a successful job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    pub job_id: JobId,
    pub filename: String,
    pub format: DocumentFormat,
    /// Storage prefix shared by every asset of this job, with trailing `/`.
    pub namespace: String,
    /// Public URL of `namespace`, when the store exposes one.
    pub folder_url: Option<String>,
    /// Published assets in page order; `assets[i].index == i`.
    pub assets: Vec<PublishedAsset>,
    pub stats: ConversionStats,
}

/// Which response shape to produce from a [`ConversionOutput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultView {
    /// `{"folder_id": "<job id>"}`
    JobId,
    /// `{"folder_url": "<url or namespace>"}`
    FolderUrl,
    /// `{"job_id": "...", "assets": [...]}` (default)
    #[default]
    AssetList,
}

impl ResultView {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id" | "job_id" | "folder_id" => Some(ResultView::JobId),
            "folder" | "folder_url" | "url" => Some(ResultView::FolderUrl),
            "assets" | "list" | "asset_list" => Some(ResultView::AssetList),
            _ => None,
        }
    }
}

/// A projected response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectedResult {
    JobId {
        folder_id: String,
    },
    FolderUrl {
        folder_url: String,
    },
    AssetList {
        job_id: String,
        assets: Vec<PublishedAsset>,
    },
}

impl ConversionOutput {
    /// Locators in page order.
    pub fn locators(&self) -> Vec<&str> {
        self.assets.iter().map(|a| a.locator.as_str()).collect()
    }

    /// Project the canonical result into one of the response shapes.
    ///
    /// `FolderUrl` falls back to the bare namespace when the store has no
    /// public URLs.
    pub fn project(&self, view: ResultView) -> ProjectedResult {
        match view {
            ResultView::JobId => ProjectedResult::JobId {
                folder_id: self.job_id.to_string(),
            },
            ResultView::FolderUrl => ProjectedResult::FolderUrl {
                folder_url: self
                    .folder_url
                    .clone()
                    .unwrap_or_else(|| self.namespace.clone()),
            },
            ResultView::AssetList => ProjectedResult::AssetList {
                job_id: self.job_id.to_string(),
                assets: self.assets.clone(),
            },
        }
    }
}
