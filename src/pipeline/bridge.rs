//! Office-document → PDF conversion through a headless office suite.
//!
//! Slide layout needs a full rendering engine, so slide decks are handed to
//! LibreOffice (`soffice --headless --convert-to pdf`) and the resulting PDF
//! goes through the normal pdfium path. This module owns the subprocess and
//! every way it can go wrong:
//!
//! | Situation | Stage |
//! |-----------|-------|
//! | binary missing / not executable | `bridge-unavailable` |
//! | non-zero exit, timeout | `bridge-failed` |
//! | exit 0 but no PDF written | `bridge-no-output` |
//!
//! Each invocation gets its own output directory and its own office user
//! profile inside the job's temp directory, so concurrent jobs never share
//! a lock file or an output path.
//!
//! `soffice` is a launcher that forks the real renderer (`soffice.bin`), so
//! killing the direct child is not enough. On unix the child leads its own
//! process group, and the whole group is sent `SIGKILL` on timeout, after
//! the process exits, and when the caller's future is dropped. The child
//! itself is reaped before a timeout error is returned.

use crate::config::BridgeConfig;
use crate::error::{RenderError, RenderStage};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Sub-directory of the output directory used as the office user profile.
const PROFILE_DIR: &str = ".office-profile";

/// Upper bound on stderr kept for error messages.
const STDERR_TAIL_CHARS: usize = 600;

/// How long to wait for stderr to drain after the process exits.
const STDERR_DRAIN: Duration = Duration::from_secs(2);

/// Wrapper around the external office suite.
///
/// Cheap to clone; clones share the concurrency limit.
#[derive(Debug, Clone)]
pub struct OfficeBridge {
    program: PathBuf,
    timeout: Duration,
    permits: Option<Arc<Semaphore>>,
}

impl OfficeBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            permits: config
                .max_concurrent
                .map(|n| Arc::new(Semaphore::new(n.max(1)))),
        }
    }

    /// Convert `input` to PDF, writing only inside `output_dir`.
    ///
    /// Returns the path of the produced PDF. Not retried here: a
    /// `bridge-failed` error is surfaced and the caller decides.
    pub async fn to_pdf(&self, input: &Path, output_dir: &Path) -> Result<PathBuf, RenderError> {
        let _permit = match &self.permits {
            Some(sem) => Some(Arc::clone(sem).acquire_owned().await.map_err(|_| {
                RenderError::new(RenderStage::BridgeUnavailable, "office bridge is shutting down")
            })?),
            None => None,
        };

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| RenderError::staging(format!("create {}: {e}", output_dir.display())))?;
        let profile_dir = output_dir.join(PROFILE_DIR);

        let mut cmd = Command::new(&self.program);
        cmd.arg("--headless")
            .arg("--norestore")
            .arg("--nolockcheck")
            .arg(format!("-env:UserInstallation={}", file_url(&profile_dir)))
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(output_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        info!(
            program = %self.program.display(),
            input = %input.display(),
            "Converting office document to PDF"
        );

        let mut child = cmd.spawn().map_err(|e| spawn_error(&self.program, e))?;
        let mut group = GroupKill::new(child.id());

        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(RenderError::new(
                    RenderStage::BridgeFailed,
                    format!("waiting for '{}' failed: {e}", self.program.display()),
                ));
            }
            Err(_) => {
                warn!(
                    program = %self.program.display(),
                    timeout_secs = self.timeout.as_secs(),
                    "Office conversion timed out; killing process"
                );
                group.kill();
                if let Some(task) = &stderr_task {
                    task.abort();
                }
                // kill() also waits, so the child is reaped before we return.
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill timed-out office process");
                }
                return Err(RenderError::new(
                    RenderStage::BridgeFailed,
                    format!(
                        "'{}' timed out after {}s",
                        self.program.display(),
                        self.timeout.as_secs()
                    ),
                ));
            }
        };

        // Helpers the launcher left behind would keep stderr open.
        group.kill();

        let stderr = match stderr_task {
            Some(task) => match tokio::time::timeout(STDERR_DRAIN, task).await {
                Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
                _ => String::new(),
            },
            None => String::new(),
        };

        debug!(
            status = %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Office process exited"
        );

        if !status.success() {
            let tail = tail(stderr.trim(), STDERR_TAIL_CHARS);
            return Err(RenderError::new(
                RenderStage::BridgeFailed,
                if tail.is_empty() {
                    format!("'{}' exited with {status}", self.program.display())
                } else {
                    format!("'{}' exited with {status}: {tail}", self.program.display())
                },
            ));
        }

        match locate_output(input, output_dir).await {
            Some(pdf) => {
                info!(
                    pdf = %pdf.display(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Office conversion complete"
                );
                Ok(pdf)
            }
            None => Err(RenderError::new(
                RenderStage::BridgeNoOutput,
                format!(
                    "'{}' exited successfully but wrote no PDF to {}",
                    self.program.display(),
                    output_dir.display()
                ),
            )),
        }
    }
}

/// Sends `SIGKILL` to the child's process group once, at the latest on drop.
struct GroupKill {
    pgid: Option<u32>,
}

impl GroupKill {
    fn new(pid: Option<u32>) -> Self {
        Self { pgid: pid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
        }
    }
}

impl Drop for GroupKill {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    if pgid <= 0 {
        return;
    }
    // SAFETY: kill(2) takes no pointers; a negative pid addresses the group.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pgid, error = %err, "Failed to kill office process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

fn spawn_error(program: &Path, e: io::Error) -> RenderError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => RenderError::new(
            RenderStage::BridgeUnavailable,
            format!(
                "cannot execute '{}': {e}\nInstall LibreOffice or point --soffice at the binary.",
                program.display()
            ),
        ),
        _ => RenderError::new(
            RenderStage::BridgeFailed,
            format!("failed to start '{}': {e}", program.display()),
        ),
    }
}

/// Find the PDF the suite wrote: `{stem}.pdf`, else the only non-empty PDF
/// in the directory. Zero-byte files do not count.
async fn locate_output(input: &Path, output_dir: &Path) -> Option<PathBuf> {
    if let Some(stem) = input.file_stem() {
        let expected = output_dir.join(format!("{}.pdf", stem.to_string_lossy()));
        if non_empty_file(&expected).await {
            return Some(expected);
        }
    }

    let mut entries = tokio::fs::read_dir(output_dir).await.ok()?;
    let mut found = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf && non_empty_file(&path).await {
            found.push(path);
        }
    }
    if found.len() == 1 {
        found.pop()
    } else {
        None
    }
}

async fn non_empty_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(m) if m.is_file() && m.len() > 0)
}

fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    let skip = count - max_chars;
    match s.char_indices().nth(skip) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_forms() {
        assert_eq!(file_url(Path::new("/tmp/job/p")), "file:///tmp/job/p");
        assert_eq!(file_url(Path::new("C:\\tmp\\p")), "file:///C:/tmp/p");
    }

    #[test]
    fn tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("ééé", 2), "éé");
    }

    #[tokio::test]
    async fn missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = OfficeBridge::new(&BridgeConfig {
            program: PathBuf::from("/nonexistent/doc2img-soffice"),
            timeout_secs: 5,
            max_concurrent: None,
        });
        let input = dir.path().join("deck.pptx");
        std::fs::write(&input, b"PK").unwrap();
        let err = bridge
            .to_pdf(&input, &dir.path().join("out"))
            .await
            .unwrap_err();
        assert_eq!(err.stage, RenderStage::BridgeUnavailable);
    }

    #[tokio::test]
    async fn locate_output_prefers_stem_then_single_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let input = Path::new("/in/deck.pptx");
        assert_eq!(locate_output(input, dir.path()).await, None);

        std::fs::write(dir.path().join("other.pdf"), b"%PDF").unwrap();
        assert_eq!(
            locate_output(input, dir.path()).await,
            Some(dir.path().join("other.pdf"))
        );

        std::fs::write(dir.path().join("deck.pdf"), b"%PDF").unwrap();
        assert_eq!(
            locate_output(input, dir.path()).await,
            Some(dir.path().join("deck.pdf"))
        );
    }

    #[tokio::test]
    async fn empty_pdf_is_not_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("deck.pdf"), b"").unwrap();
        assert_eq!(locate_output(Path::new("deck.pptx"), dir.path()).await, None);
    }
}
