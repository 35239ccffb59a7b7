//! Pipeline stages for document-to-image conversion.
//!
//! Each submodule implements exactly one step; [`crate::convert`] strings
//! them together and owns the job state machine.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ pdf ────────────────────────┐
//! source ──▶ │                              ├──▶ render ──▶ encode ──▶ publish
//!            └─ slides ──▶ bridge (soffice) ┘    (pdfium)   (PNG)      (store)
//! ```
//!
//! 1. [`temp`]    — per-job directory; every local file goes through it
//! 2. [`bridge`]  — slide deck → PDF via a headless office suite, with timeout
//! 3. [`render`]  — rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is synchronous
//! 4. [`encode`]  — PNG-encode each page into the temp directory
//! 5. [`publish`] — upload pages in order under `{prefix}/{job_id}/{index}.png`

pub mod bridge;
pub mod encode;
pub mod publish;
pub mod render;
pub mod temp;
