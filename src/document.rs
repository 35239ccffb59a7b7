//! The submitted document and its declared format.
//!
//! Format selection looks only at the declared MIME type. The bytes are
//! never sniffed: a PDF declared as a slide deck goes to the office bridge,
//! and the bridge decides what to make of it.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_ODP: &str = "application/vnd.oasis.opendocument.presentation";

/// Every declared type [`DocumentFormat::from_mime`] accepts.
pub const SUPPORTED_MIME_TYPES: [&str; 4] = [MIME_PDF, MIME_PPTX, MIME_PPT, MIME_ODP];

/// The fixed set of formats the pipeline can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Rasterised directly by pdfium.
    Pdf,
    /// Converted to PDF by the office suite first.
    OfficeSlides,
}

impl DocumentFormat {
    /// Map a declared MIME type to a format.
    ///
    /// MIME parameters (`; charset=...`) and ASCII case are ignored.
    /// Returns `None` for anything outside the supported set.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        if essence.eq_ignore_ascii_case(MIME_PDF) {
            Some(DocumentFormat::Pdf)
        } else if [MIME_PPTX, MIME_PPT, MIME_ODP]
            .iter()
            .any(|m| essence.eq_ignore_ascii_case(m))
        {
            Some(DocumentFormat::OfficeSlides)
        } else {
            None
        }
    }

    /// Guess the MIME type from a file extension. Used by the CLI only;
    /// the pipeline itself never looks at file names to pick a renderer.
    pub fn mime_for_path(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MIME_PDF),
            "pptx" => Some(MIME_PPTX),
            "ppt" => Some(MIME_PPT),
            "odp" => Some(MIME_ODP),
            _ => None,
        }
    }

    /// File extension used when staging the source on disk.
    ///
    /// The office suite picks its import filter partly from the extension,
    /// so the staged copy keeps one that matches the declared type.
    pub fn staging_extension(&self, mime: &str) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::OfficeSlides => {
                let essence = mime.split(';').next().unwrap_or("").trim();
                if essence.eq_ignore_ascii_case(MIME_PPT) {
                    "ppt"
                } else if essence.eq_ignore_ascii_case(MIME_ODP) {
                    "odp"
                } else {
                    "pptx"
                }
            }
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Pdf => f.write_str("pdf"),
            DocumentFormat::OfficeSlides => f.write_str("office-slides"),
        }
    }
}

/// An uploaded document: bytes, declared content type and original filename.
///
/// Immutable once constructed. `Bytes` makes clones cheap when the HTTP
/// layer hands the payload over.
#[derive(Clone)]
pub struct SourceDocument {
    data: Bytes,
    mime_type: String,
    filename: String,
}

impl SourceDocument {
    pub fn new(
        data: impl Into<Bytes>,
        mime_type: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            filename: filename.into(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Filename without directory components or extension, e.g. `deck` for
    /// `C:\uploads\deck.pptx`. Empty when the upload carried no name.
    pub fn stem(&self) -> &str {
        let base = self
            .filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename);
        match base.rfind('.') {
            Some(0) | None => base,
            Some(i) => &base[..i],
        }
    }
}

impl fmt::Debug for SourceDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceDocument")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}
