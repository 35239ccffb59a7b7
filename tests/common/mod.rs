//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use edgequake_doc2img::pipeline::encode;
use edgequake_doc2img::{
    MemoryStore, ObjectStore, PageImageFormat, PageRenderer, PipelineConfig, RenderError,
    RenderedPage, RendererSet, StorageError, StoredObject, TempArtifactStore,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimal PDF header; the fake renderer never parses it.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n";

/// Writes `pages` solid-colour PNGs without touching pdfium.
pub struct FakeRenderer {
    pub pages: usize,
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn render(
        &self,
        source: &Path,
        temp: &mut TempArtifactStore,
    ) -> Result<Vec<RenderedPage>, RenderError> {
        assert!(source.exists(), "source was not staged");
        let mut out = Vec::with_capacity(self.pages);
        for index in 0..self.pages {
            let shade = (index * 40 % 256) as u8;
            let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                8,
                6,
                Rgba([shade, 0, 255 - shade, 255]),
            ));
            let path = temp.acquire(&format!("page-{index}.png"));
            let byte_len = encode::write_png(&img, &path)
                .map_err(|e| RenderError::staging(e.to_string()))?;
            out.push(RenderedPage {
                index,
                format: PageImageFormat::Png,
                width: 8,
                height: 6,
                byte_len,
                path,
            });
        }
        Ok(out)
    }
}

/// Both formats rendered by a [`FakeRenderer`] with `pages` pages.
pub fn fake_renderers(pages: usize) -> RendererSet {
    let r: Arc<dyn PageRenderer> = Arc::new(FakeRenderer { pages });
    RendererSet::new(Arc::clone(&r), r)
}

/// A memory store whose `fail_at`-th put (0-based) fails with a transport error.
pub struct FlakyStore {
    pub inner: MemoryStore,
    fail_at: usize,
    puts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(fail_at: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_at,
            puts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        if self.puts.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(StorageError::Transport("connection reset by peer".into()));
        }
        self.inner.put(key, data, content_type).await
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.inner.public_url(key)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
        self.inner.delete(keys).await
    }
}

/// Counts every call; stores nothing.
#[derive(Default)]
pub struct CountingStore {
    pub calls: AtomicUsize,
}

impl CountingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn put(
        &self,
        key: &str,
        _data: Bytes,
        _content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StoredObject {
            key: key.to_string(),
            locator: key.to_string(),
        })
    }

    fn public_url(&self, _key: &str) -> Option<String> {
        None
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<String>, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keys.len())
    }
}

/// Config with its temp root inside `dir`.
pub fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .temp_root(dir)
        .build()
        .expect("valid config")
}

/// Entries left under a temp root.
pub fn leftovers(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .map(|rd| rd.flatten().map(|e| e.path()).collect())
        .unwrap_or_default()
}

/// Write an executable shell script (unix only).
#[cfg(unix)]
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    let mut perms = std::fs::metadata(&path).expect("stat script").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod script");
    path
}

/// Poll `path` until a script has written a pid into it.
#[cfg(unix)]
pub async fn read_pid(path: &Path, within: Duration) -> i32 {
    let deadline = Instant::now() + within;
    loop {
        if let Ok(s) = std::fs::read_to_string(path) {
            if let Ok(pid) = s.trim().parse() {
                return pid;
            }
        }
        assert!(Instant::now() < deadline, "no pid written to {}", path.display());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Alive means running; a zombie waiting to be reaped counts as gone.
#[cfg(unix)]
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z')),
        Err(_) if Path::new("/proc/self").exists() => false,
        // SAFETY: signal 0 only checks that the pid exists.
        Err(_) => unsafe { libc::kill(pid, 0) == 0 },
    }
}

/// Wait up to `within` for `pid` to die.
#[cfg(unix)]
pub async fn process_gone(pid: i32, within: Duration) -> bool {
    let deadline = Instant::now() + within;
    while process_alive(pid) {
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    true
}
