//! Object storage backends for published page images.
//!
//! The pipeline only needs `put` and `public_url`; `list` and `delete` exist
//! for operators garbage-collecting job namespaces (`{prefix}/{job_id}/`)
//! that nobody claimed.
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SupabaseStore`] | Supabase Storage over HTTPS (production) |
//! | [`LocalStore`]    | a directory on disk, optionally served by a CDN |
//! | [`MemoryStore`]   | in-process map for tests and dry runs |
//!
//! Objects are write-once: `put` on an existing key returns
//! [`StorageError::Conflict`] and leaves the stored object untouched.

mod local;
mod memory;
mod supabase;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use supabase::{SupabaseConfig, SupabaseStore};

use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub key: String,
    /// Durable identifier for the object: its public URL when the backend
    /// has one, otherwise the key.
    pub locator: String,
}

/// A durable key/value blob store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Store `data` under `key`. Never overwrites.
    async fn put(&self, key: &str, data: Bytes, content_type: &str)
        -> Result<StoredObject, StorageError>;

    /// Public URL for `key`, if this backend serves objects publicly.
    ///
    /// Pure string construction; does not check that the object exists.
    fn public_url(&self, key: &str) -> Option<String>;

    /// Keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Remove `keys`. Missing keys are not an error. Returns how many were removed.
    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError>;
}

/// Reject keys that could escape the bucket or a local root.
///
/// A key is one or more `/`-separated segments, none empty, `.` or `..`, and
/// no backslashes.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key.contains('\\')
        || key
            .split('/')
            .any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Like [`validate_key`] but allows the trailing `/` of a namespace prefix.
pub(crate) fn validate_prefix(prefix: &str) -> Result<(), StorageError> {
    validate_key(prefix.strip_suffix('/').unwrap_or(prefix))
}
