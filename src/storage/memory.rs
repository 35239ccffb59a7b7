use super::{validate_key, validate_prefix, ObjectStore, StoredObject};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: String,
}

/// In-process object store.
///
/// Behaves like the real backends (write-once, key validation) so tests
/// exercise the same error paths. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, MemoryObject>>,
    public_base: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report public URLs as `{base}/{key}`.
    pub fn with_public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.read().get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.read().get(key).map(|o| o.content_type.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, MemoryObject>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, MemoryObject>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let mut objects = self.write();
        if objects.contains_key(key) {
            return Err(StorageError::Conflict {
                key: key.to_string(),
            });
        }
        objects.insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(StoredObject {
            key: key.to_string(),
            locator: self.public_url(key).unwrap_or_else(|| key.to_string()),
        })
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.public_base.as_ref().map(|base| format!("{base}/{key}"))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_prefix(prefix)?;
        Ok(self
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
        let mut objects = self.write();
        Ok(keys.iter().filter(|k| objects.remove(k.as_str()).is_some()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_is_write_once() {
        let store = MemoryStore::new();
        store
            .put("images/a/0.png", Bytes::from_static(b"one"), "image/png")
            .await
            .unwrap();
        let err = store
            .put("images/a/0.png", Bytes::from_static(b"two"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert_eq!(store.get("images/a/0.png").unwrap(), Bytes::from_static(b"one"));
        assert_eq!(store.content_type("images/a/0.png").as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn list_and_delete_by_namespace() {
        let store = MemoryStore::new();
        for key in ["images/a/0.png", "images/a/1.png", "images/ab/0.png"] {
            store.put(key, Bytes::from_static(b"x"), "image/png").await.unwrap();
        }
        let keys = store.list("images/a/").await.unwrap();
        assert_eq!(keys, vec!["images/a/0.png", "images/a/1.png"]);

        assert_eq!(store.delete(&keys).await.unwrap(), 2);
        assert_eq!(store.delete(&keys).await.unwrap(), 0);
        assert_eq!(store.keys(), vec!["images/ab/0.png"]);
    }

    #[tokio::test]
    async fn locator_uses_public_base_when_set() {
        let store = MemoryStore::new().with_public_base("https://cdn.test/");
        let obj = store
            .put("images/a/0.png", Bytes::from_static(b"x"), "image/png")
            .await
            .unwrap();
        assert_eq!(obj.locator, "https://cdn.test/images/a/0.png");
        assert_eq!(MemoryStore::new().public_url("k"), None);
    }
}
