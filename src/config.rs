//! Configuration types for the conversion pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The config is created once at process
//! start and passed into [`crate::convert::ConversionPipeline::new`]; the
//! pipeline keeps no other global state.

use crate::error::PipelineError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for the conversion pipeline.
///
/// # Example
/// ```rust
/// use edgequake_doc2img::{LocatorStyle, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .dpi(200)
///     .locator_style(LocatorStyle::PublicUrl)
///     .bridge_timeout_secs(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 200);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Rasterisation DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 4000.
    ///
    /// Caps either edge independently of DPI so a poster-sized page cannot
    /// exhaust memory.
    pub max_rendered_pixels: u32,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Explicit path to libpdfium. When `None`, `PDFIUM_LIB_PATH` is tried,
    /// then the platform library in the working directory, then the system
    /// library search path.
    pub pdfium_library: Option<PathBuf>,

    /// Parent directory of the per-job temp directories. Default: system temp dir.
    pub temp_root: PathBuf,

    /// First segment of every storage key. Default: `images`.
    pub key_prefix: String,

    /// What kind of locator to return for each asset. Default: [`LocatorStyle::Key`].
    pub locator_style: LocatorStyle,

    /// Office suite invocation settings.
    pub bridge: BridgeConfig,

    /// Optional per-job progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 4000,
            password: None,
            pdfium_library: None,
            temp_root: std::env::temp_dir(),
            key_prefix: "images".to_string(),
            locator_style: LocatorStyle::default(),
            bridge: BridgeConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pdfium_library", &self.pdfium_library)
            .field("temp_root", &self.temp_root)
            .field("key_prefix", &self.key_prefix)
            .field("locator_style", &self.locator_style)
            .field("bridge", &self.bridge)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Settings for the external office suite process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Executable name or path. Default: `soffice`.
    pub program: PathBuf,

    /// Wall-clock limit for one conversion. Default: 120 s.
    pub timeout_secs: u64,

    /// Maximum number of simultaneous office processes. `None` = unbounded.
    ///
    /// Set to 1 for deployments where the suite cannot run concurrently.
    pub max_concurrent: Option<usize>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("soffice"),
            timeout_secs: 120,
            max_concurrent: None,
        }
    }
}

/// Shape of [`crate::output::PublishedAsset::locator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStyle {
    /// The storage key itself, as an opaque identifier. (default)
    #[default]
    Key,
    /// The store's public URL for the key.
    PublicUrl,
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = dir.into();
        self
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    pub fn locator_style(mut self, style: LocatorStyle) -> Self {
        self.config.locator_style = style;
        self
    }

    pub fn bridge_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.config.bridge.program = program.into();
        self
    }

    pub fn bridge_timeout_secs(mut self, secs: u64) -> Self {
        self.config.bridge.timeout_secs = secs;
        self
    }

    pub fn bridge_max_concurrent(mut self, n: usize) -> Self {
        self.config.bridge.max_concurrent = Some(n);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(PipelineError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        let prefix = c.key_prefix.trim();
        if prefix.is_empty() || prefix.starts_with('/') || prefix.ends_with('/') {
            return Err(PipelineError::InvalidConfig(format!(
                "Key prefix must be non-empty without leading/trailing '/', got '{}'",
                c.key_prefix
            )));
        }
        if prefix.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
            return Err(PipelineError::InvalidConfig(format!(
                "Key prefix contains an empty or relative segment: '{}'",
                c.key_prefix
            )));
        }
        if c.bridge.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Bridge timeout must be ≥ 1 second".into(),
            ));
        }
        if c.bridge.max_concurrent == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "Bridge concurrency limit must be ≥ 1".into(),
            ));
        }
        if c.bridge.program.as_os_str().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Bridge program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let c = PipelineConfig::builder().build().unwrap();
        assert_eq!(c.dpi, 150);
        assert_eq!(c.key_prefix, "images");
        assert_eq!(c.locator_style, LocatorStyle::Key);
        assert_eq!(c.bridge.program, PathBuf::from("soffice"));
        assert_eq!(c.bridge.max_concurrent, None);
    }

    #[test]
    fn dpi_is_clamped() {
        assert_eq!(PipelineConfig::builder().dpi(10).build().unwrap().dpi, 72);
        assert_eq!(PipelineConfig::builder().dpi(9000).build().unwrap().dpi, 400);
    }

    #[test]
    fn rejects_bad_prefix() {
        for p in ["", "/images", "images/", "a//b", "a/../b"] {
            let err = PipelineConfig::builder().key_prefix(p).build().unwrap_err();
            assert!(matches!(err, PipelineError::InvalidConfig(_)), "prefix {p:?}");
        }
        assert!(PipelineConfig::builder().key_prefix("tenant/images").build().is_ok());
    }

    #[test]
    fn rejects_zero_timeout_and_concurrency() {
        assert!(PipelineConfig::builder().bridge_timeout_secs(0).build().is_err());
        assert!(PipelineConfig::builder().bridge_max_concurrent(0).build().is_err());
        assert!(PipelineConfig::builder().bridge_max_concurrent(1).build().is_ok());
    }

    #[test]
    fn debug_redacts_password() {
        let c = PipelineConfig::builder().password("hunter2").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
