//! Job identity and the per-request state machine.
//!
//! ```text
//! Received ──▶ Validated ──▶ Rendered ──▶ Published ──▶ Done
//!    │             │             │             │
//!    └─────────────┴─────────────┴─────────────┴──▶ Failed{stage}
//! ```
//!
//! `Done` and `Failed` are absorbing. Transitions are checked: the pipeline
//! can only move forward one step at a time, so a bug that skips a stage
//! shows up as an `Internal` error instead of a silently wrong result.

use crate::document::{DocumentFormat, SourceDocument};
use crate::error::FailedStage;
use crate::output::{PublishedAsset, RenderedPage};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one conversion request (random 128-bit UUID v4).
///
/// Doubles as the storage namespace: every asset of the job lives under
/// `{prefix}/{job_id}/`. Generated exactly once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job id supplied by an operator (CLI `list`/`delete`).
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s.trim()).ok().map(Self)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// Where a job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum JobState {
    Received,
    Validated,
    Rendered,
    Published,
    Done,
    Failed(FailedStage),
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed(_))
    }

    fn can_advance_to(&self, next: &JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Received, Validated) | (Validated, Rendered) | (Rendered, Published) | (Published, Done) => true,
            (Received, Failed(FailedStage::Validation)) => true,
            (Validated, Failed(FailedStage::Render)) => true,
            (Rendered, Failed(FailedStage::Publish)) | (Published, Failed(FailedStage::Publish)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Received => f.write_str("received"),
            JobState::Validated => f.write_str("validated"),
            JobState::Rendered => f.write_str("rendered"),
            JobState::Published => f.write_str("published"),
            JobState::Done => f.write_str("done"),
            JobState::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

/// Attempted a transition the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job transition {} → {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// The unit of work for one request.
///
/// Lives only for the duration of [`crate::convert::ConversionPipeline::process`];
/// nothing about the job itself is persisted, only its published assets.
#[derive(Debug)]
pub struct ConversionJob {
    id: JobId,
    document: SourceDocument,
    format: Option<DocumentFormat>,
    state: JobState,
    pages: Vec<RenderedPage>,
    assets: Vec<PublishedAsset>,
}

impl ConversionJob {
    /// Receive a document and assign it a fresh job id.
    pub fn receive(document: SourceDocument) -> Self {
        Self {
            id: JobId::new(),
            document,
            format: None,
            state: JobState::Received,
            pages: Vec::new(),
            assets: Vec::new(),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn document(&self) -> &SourceDocument {
        &self.document
    }

    pub fn format(&self) -> Option<DocumentFormat> {
        self.format
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn pages(&self) -> &[RenderedPage] {
        &self.pages
    }

    pub fn assets(&self) -> &[PublishedAsset] {
        &self.assets
    }

    pub fn validated(&mut self, format: DocumentFormat) -> Result<(), InvalidTransition> {
        self.advance(JobState::Validated)?;
        self.format = Some(format);
        Ok(())
    }

    pub fn rendered(&mut self, pages: Vec<RenderedPage>) -> Result<(), InvalidTransition> {
        self.advance(JobState::Rendered)?;
        self.pages = pages;
        Ok(())
    }

    pub fn published(&mut self, assets: Vec<PublishedAsset>) -> Result<(), InvalidTransition> {
        self.advance(JobState::Published)?;
        self.assets = assets;
        Ok(())
    }

    pub fn done(&mut self) -> Result<(), InvalidTransition> {
        self.advance(JobState::Done)
    }

    /// Move into `Failed{stage}`. A failure after a terminal state is ignored
    /// as long as it names the same stage; anything else is a bug.
    pub fn failed(&mut self, stage: FailedStage) -> Result<(), InvalidTransition> {
        if self.state == JobState::Failed(stage) {
            return Ok(());
        }
        self.advance(JobState::Failed(stage))
    }

    fn advance(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance_to(&next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }
}
