//! Per-job temporary artifacts with guaranteed cleanup.
//!
//! Every job gets its own directory, `{temp_root}/doc2img-{job_id}-XXXXXX`,
//! created by [`tempfile`]. All local files the job writes (the staged
//! upload, the bridge's intermediate PDF, the office profile, page PNGs) are
//! acquired through this store, so one [`TempArtifactStore::release_all`]
//! call removes everything regardless of which stage the job reached.
//!
//! Removal is best-effort: a path that cannot be removed is recorded in the
//! [`CleanupReport`] and logged, and the remaining paths are still attempted.
//! Cleanup never turns into an error for the job.
//!
//! If the store is dropped without `release_all` (the request future was
//! cancelled mid-flight), `Drop` performs the same release.

use crate::job::JobId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

const MAX_NAME_LEN: usize = 80;

/// Outcome of [`TempArtifactStore::release_all`].
#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    /// Paths removed (or already gone).
    pub removed: usize,
    /// Paths that could not be removed, with the error message.
    pub failures: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Scoped temp storage for one job.
#[derive(Debug)]
pub struct TempArtifactStore {
    job_id: JobId,
    dir: Option<TempDir>,
    path: PathBuf,
    acquired: Vec<PathBuf>,
    names: HashSet<String>,
}

impl TempArtifactStore {
    /// Create the job directory under `root`.
    pub fn new(root: &Path, job_id: JobId) -> io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("doc2img-{job_id}-"))
            .tempdir_in(root)?;
        let path = dir.path().to_path_buf();
        debug!(job_id = %job_id, dir = %path.display(), "Created job temp dir");
        Ok(Self {
            job_id,
            dir: Some(dir),
            path,
            acquired: Vec::new(),
            names: HashSet::new(),
        })
    }

    /// The job directory.
    pub fn root(&self) -> &Path {
        &self.path
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Paths currently held by the store.
    pub fn acquired(&self) -> &[PathBuf] {
        &self.acquired
    }

    /// Reserve a writable file path inside the job directory.
    ///
    /// The file is not created. `name_hint` is sanitised; a hint that was
    /// already used gets a numeric suffix, so two acquisitions never alias.
    pub fn acquire(&mut self, name_hint: &str) -> PathBuf {
        let name = self.unique_name(name_hint);
        let path = self.path.join(name);
        self.acquired.push(path.clone());
        path
    }

    /// Create and reserve a sub-directory inside the job directory.
    pub fn acquire_dir(&mut self, name_hint: &str) -> io::Result<PathBuf> {
        let name = self.unique_name(name_hint);
        let path = self.path.join(name);
        std::fs::create_dir(&path)?;
        self.acquired.push(path.clone());
        Ok(path)
    }

    /// Start tracking a path some other component created inside the job
    /// directory (pdfium writing into an acquired sub-directory, for
    /// instance). Paths outside the job directory are refused.
    pub fn track(&mut self, path: PathBuf) -> bool {
        if !path.starts_with(&self.path) || self.acquired.contains(&path) {
            return false;
        }
        self.acquired.push(path);
        true
    }

    /// Remove one acquired path now instead of at the end of the job.
    ///
    /// Returns `true` when the path is gone. On failure the path stays
    /// tracked so that `release_all` tries again.
    pub fn release(&mut self, path: &Path) -> bool {
        let Some(pos) = self.acquired.iter().position(|p| p == path) else {
            return false;
        };
        match remove_path(path) {
            Ok(()) => {
                self.acquired.swap_remove(pos);
                true
            }
            Err(e) => {
                warn!(job_id = %self.job_id, path = %path.display(), error = %e, "Failed to remove temp artifact");
                false
            }
        }
    }

    /// Remove every acquired path, then the job directory itself.
    ///
    /// Continues past individual failures. Safe to call more than once.
    pub fn release_all(&mut self) -> CleanupReport {
        let mut report = CleanupReport::default();

        // Newest first: files acquired inside a sub-directory go before it.
        for path in self.acquired.drain(..).rev() {
            match remove_path(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => report.failures.push((path, e.to_string())),
            }
        }
        self.names.clear();

        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                if e.kind() != io::ErrorKind::NotFound {
                    report.failures.push((self.path.clone(), e.to_string()));
                }
            }
        }

        for (path, err) in &report.failures {
            warn!(job_id = %self.job_id, path = %path.display(), error = %err, "Temp cleanup failed");
        }
        debug!(
            job_id = %self.job_id,
            removed = report.removed,
            failed = report.failures.len(),
            "Released temp artifacts"
        );
        report
    }

    fn unique_name(&mut self, hint: &str) -> String {
        let base = sanitize_name(hint);
        let mut candidate = base.clone();
        let mut n = 1;
        while self.names.contains(&candidate) {
            candidate = match base.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{n}.{ext}"),
                _ => format!("{base}-{n}"),
            };
            n += 1;
        }
        self.names.insert(candidate.clone());
        candidate
    }
}

impl Drop for TempArtifactStore {
    fn drop(&mut self) {
        if self.dir.is_some() || !self.acquired.is_empty() {
            self.release_all();
        }
    }
}

/// Reduce a name hint to a safe single path component.
pub(crate) fn sanitize_name(hint: &str) -> String {
    let base = hint.rsplit(['/', '\\']).next().unwrap_or(hint);
    let cleaned = RE_UNSAFE_CHARS.replace_all(base, "_");
    let trimmed = cleaned.trim_start_matches('.');
    let mut name: String = trimmed.chars().take(MAX_NAME_LEN).collect();
    if name.is_empty() || name.chars().all(|c| c == '_') {
        name = "artifact".to_string();
    }
    name
}

fn remove_path(path: &Path) -> io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
