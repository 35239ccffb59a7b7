//! Asset publishing: rendered pages → durable objects, one upload per page.
//!
//! Uploads are sequential and in page order, so the returned assets are in
//! page order by construction. The first failed upload aborts the job with a
//! [`PublishError`]; pages uploaded before it stay in storage (there is no
//! rollback) and the error says how many there were.
//!
//! Each page's local PNG is released from the temp store as soon as its
//! upload succeeds, so a long deck never holds more than one encoded page
//! in memory and the job directory shrinks as publishing proceeds.

use crate::config::{LocatorStyle, PipelineConfig};
use crate::error::{PublishError, StorageError};
use crate::job::JobId;
use crate::output::{PublishedAsset, RenderedPage};
use crate::pipeline::temp::TempArtifactStore;
use crate::progress::ProgressCallback;
use crate::storage::ObjectStore;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Storage key of page `index` of `job_id`: `{prefix}/{job_id}/{index}.png`.
pub fn asset_key(prefix: &str, job_id: JobId, index: usize) -> String {
    format!("{prefix}/{job_id}/{index}.png")
}

/// Storage prefix holding every asset of `job_id`, with trailing `/`.
pub fn job_namespace(prefix: &str, job_id: JobId) -> String {
    format!("{prefix}/{job_id}/")
}

/// Uploads rendered pages to an [`ObjectStore`].
#[derive(Clone)]
pub struct AssetPublisher {
    store: Arc<dyn ObjectStore>,
    key_prefix: String,
    locator_style: LocatorStyle,
}

impl AssetPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, key_prefix: impl Into<String>, locator_style: LocatorStyle) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
            locator_style,
        }
    }

    pub fn from_config(config: &PipelineConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self::new(store, config.key_prefix.trim(), config.locator_style)
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Upload every page of `job_id` in index order.
    pub async fn publish(
        &self,
        job_id: JobId,
        pages: &[RenderedPage],
        temp: &mut TempArtifactStore,
        progress: Option<&ProgressCallback>,
    ) -> Result<Vec<PublishedAsset>, PublishError> {
        let mut ordered: Vec<&RenderedPage> = pages.iter().collect();
        ordered.sort_by_key(|p| p.index);

        let total = ordered.len();
        let start = Instant::now();
        let mut assets = Vec::with_capacity(total);
        let mut warned_no_public_url = false;

        for page in ordered {
            let fail = |uploaded: usize, source: StorageError| PublishError {
                failed_at_index: page.index,
                uploaded,
                source,
            };

            let data = tokio::fs::read(page.path()).await.map_err(|e| {
                fail(
                    assets.len(),
                    StorageError::LocalRead {
                        path: page.path().to_path_buf(),
                        source: e,
                    },
                )
            })?;

            let key = asset_key(&self.key_prefix, job_id, page.index);
            let stored = self
                .store
                .put(&key, Bytes::from(data), page.format.content_type())
                .await
                .map_err(|e| {
                    warn!(
                        job_id = %job_id,
                        page = page.index,
                        key = %key,
                        error = %e,
                        "Upload failed"
                    );
                    fail(assets.len(), e)
                })?;

            let locator = match self.locator_style {
                LocatorStyle::Key => stored.key,
                LocatorStyle::PublicUrl if stored.locator != stored.key => stored.locator,
                LocatorStyle::PublicUrl => {
                    if !warned_no_public_url {
                        warn!(
                            job_id = %job_id,
                            store = self.store.name(),
                            "Store has no public URLs; returning storage keys as locators"
                        );
                        warned_no_public_url = true;
                    }
                    stored.key
                }
            };

            temp.release(page.path());
            debug!(job_id = %job_id, page = page.index, key = %key, "Published page");
            if let Some(cb) = progress {
                cb.on_page_published(page.index, total, &key);
            }

            assets.push(PublishedAsset {
                index: page.index,
                key,
                locator,
            });
        }

        info!(
            job_id = %job_id,
            assets = assets.len(),
            store = self.store.name(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Published job assets"
        );
        Ok(assets)
    }

    /// Public URL of the job namespace, if the store serves objects publicly.
    pub fn folder_url(&self, job_id: JobId) -> Option<String> {
        self.store
            .public_url(&format!("{}/{job_id}", self.key_prefix))
            .map(|url| format!("{url}/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageImageFormat;
    use crate::storage::{MemoryStore, StoredObject};

    fn pages(temp: &mut TempArtifactStore, n: usize) -> Vec<RenderedPage> {
        (0..n)
            .map(|index| {
                let path = temp.acquire(&format!("{index}.png"));
                std::fs::write(&path, format!("png-{index}")).unwrap();
                RenderedPage {
                    index,
                    format: PageImageFormat::Png,
                    width: 1,
                    height: 1,
                    byte_len: 5,
                    path,
                }
            })
            .collect()
    }

    #[test]
    fn key_scheme() {
        let id = JobId::new();
        assert_eq!(asset_key("images", id, 3), format!("images/{id}/3.png"));
        assert_eq!(job_namespace("images", id), format!("images/{id}/"));
    }

    #[tokio::test]
    async fn publishes_in_order_and_releases_local_copies() {
        let root = tempfile::tempdir().unwrap();
        let job_id = JobId::new();
        let mut temp = TempArtifactStore::new(root.path(), job_id).unwrap();
        let mut rendered = pages(&mut temp, 3);
        rendered.reverse();

        let store = Arc::new(MemoryStore::new());
        let publisher = AssetPublisher::new(store.clone(), "images", LocatorStyle::Key);
        let assets = publisher
            .publish(job_id, &rendered, &mut temp, None)
            .await
            .unwrap();

        let indices: Vec<usize> = assets.iter().map(|a| a.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(assets[2].key, format!("images/{job_id}/2.png"));
        assert_eq!(assets[2].locator, assets[2].key);
        assert_eq!(store.get(&assets[1].key).unwrap(), Bytes::from("png-1"));
        assert!(rendered.iter().all(|p| !p.path.exists()));
        assert!(temp.acquired().is_empty());
    }

    #[tokio::test]
    async fn public_url_style_falls_back_to_key() {
        let root = tempfile::tempdir().unwrap();
        let job_id = JobId::new();
        let mut temp = TempArtifactStore::new(root.path(), job_id).unwrap();
        let rendered = pages(&mut temp, 2);

        let publisher = AssetPublisher::new(Arc::new(MemoryStore::new()), "images", LocatorStyle::PublicUrl);
        let assets = publisher.publish(job_id, &rendered, &mut temp, None).await.unwrap();
        assert_eq!(assets[0].locator, assets[0].key);
        assert_eq!(publisher.folder_url(job_id), None);

        let mut temp = TempArtifactStore::new(root.path(), job_id).unwrap();
        let rendered = pages(&mut temp, 1);
        let store = Arc::new(MemoryStore::new().with_public_base("https://cdn.test"));
        let publisher = AssetPublisher::new(store, "images", LocatorStyle::PublicUrl);
        let assets = publisher.publish(job_id, &rendered, &mut temp, None).await.unwrap();
        assert_eq!(
            assets[0].locator,
            format!("https://cdn.test/images/{job_id}/0.png")
        );
        assert_eq!(
            publisher.folder_url(job_id),
            Some(format!("https://cdn.test/images/{job_id}/"))
        );
    }

    /// Hands out its own locators from `put` and has no public base.
    struct SigningStore(MemoryStore);

    #[async_trait::async_trait]
    impl ObjectStore for SigningStore {
        fn name(&self) -> &'static str {
            "signing"
        }

        async fn put(
            &self,
            key: &str,
            data: Bytes,
            content_type: &str,
        ) -> Result<StoredObject, StorageError> {
            self.0.put(key, data, content_type).await?;
            Ok(StoredObject {
                key: key.to_string(),
                locator: format!("https://signed.test/{key}?token=abc"),
            })
        }

        fn public_url(&self, _key: &str) -> Option<String> {
            None
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
            self.0.list(prefix).await
        }

        async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
            self.0.delete(keys).await
        }
    }

    #[tokio::test]
    async fn public_url_style_uses_locator_returned_by_put() {
        let root = tempfile::tempdir().unwrap();
        let job_id = JobId::new();
        let mut temp = TempArtifactStore::new(root.path(), job_id).unwrap();
        let rendered = pages(&mut temp, 1);

        let store = Arc::new(SigningStore(MemoryStore::new()));
        let publisher = AssetPublisher::new(store, "images", LocatorStyle::PublicUrl);
        let assets = publisher.publish(job_id, &rendered, &mut temp, None).await.unwrap();
        assert_eq!(
            assets[0].locator,
            format!("https://signed.test/images/{job_id}/0.png?token=abc")
        );
        assert_eq!(assets[0].key, format!("images/{job_id}/0.png"));
    }

    #[tokio::test]
    async fn missing_local_file_fails_at_that_index() {
        let root = tempfile::tempdir().unwrap();
        let job_id = JobId::new();
        let mut temp = TempArtifactStore::new(root.path(), job_id).unwrap();
        let rendered = pages(&mut temp, 3);
        std::fs::remove_file(&rendered[1].path).unwrap();

        let store = Arc::new(MemoryStore::new());
        let publisher = AssetPublisher::new(store.clone(), "images", LocatorStyle::Key);
        let err = publisher
            .publish(job_id, &rendered, &mut temp, None)
            .await
            .unwrap_err();
        assert_eq!(err.failed_at_index, 1);
        assert_eq!(err.uploaded, 1);
        assert!(matches!(err.source, StorageError::LocalRead { .. }));
        assert_eq!(store.len(), 1);
    }
}
