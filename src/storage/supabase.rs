//! Supabase Storage backend.
//!
//! Uploads go to `POST {url}/storage/v1/object/{bucket}/{key}` with
//! `x-upsert: false`, so an existing object is reported as a conflict and
//! never replaced. Public URLs follow the Supabase public-bucket layout
//! `{url}/storage/v1/object/public/{bucket}/{key}`; whether the bucket is
//! actually public is a deployment decision outside this crate.

use super::{validate_key, validate_prefix, ObjectStore, StoredObject};
use crate::error::StorageError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Page size for list requests.
const LIST_PAGE: usize = 1000;

/// Upper bound on error bodies kept in [`StorageError::Http`].
const MAX_ERROR_BODY: usize = 500;

/// Connection settings for [`SupabaseStore`].
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://abcd.supabase.co`.
    pub url: String,
    /// Service or anon key; sent as bearer token and `apikey` header.
    pub api_key: String,
    /// Bucket name. Default: `images`.
    pub bucket: String,
    /// Per-request timeout. Default: 30 s.
    pub timeout_secs: u64,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            bucket: "images".to_string(),
            timeout_secs: 30,
        }
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Object store backed by a Supabase Storage bucket.
#[derive(Clone)]
pub struct SupabaseStore {
    client: Client,
    base: Url,
    bucket: String,
    api_key: String,
}

impl fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base", &self.base.as_str())
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Deserialize)]
struct ListEntry {
    name: String,
    /// `null` for folders.
    id: Option<String>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    prefixes: &'a [String],
}

impl SupabaseStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, StorageError> {
        let base = Url::parse(config.url.trim())
            .map_err(|e| StorageError::Config(format!("invalid Supabase URL '{}': {e}", config.url)))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "Supabase URL must be http(s), got '{}'",
                config.url
            )));
        }
        if config.api_key.trim().is_empty() {
            return Err(StorageError::Config("Supabase API key is empty".into()));
        }
        let bucket = config.bucket.trim().to_string();
        if bucket.is_empty() || bucket.contains('/') {
            return Err(StorageError::Config(format!(
                "invalid bucket name '{}'",
                config.bucket
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| StorageError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            bucket,
            api_key: config.api_key,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `{base}/storage/v1/object/{extra...}/{key segments}`, percent-encoded.
    fn endpoint(&self, extra: &[&str], key: &str) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Config(format!("unusable base URL '{}'", self.base)))?;
            segments
                .pop_if_empty()
                .extend(["storage", "v1", "object"])
                .extend(extra);
            if !key.is_empty() {
                segments.extend(key.split('/'));
            }
        }
        Ok(url)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.api_key).header("apikey", &self.api_key)
    }
}

async fn error_for(response: Response, key: &str) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    // Supabase reports duplicates as 409, or as 400 with a 409 statusCode body.
    let duplicate = status == StatusCode::CONFLICT
        || body.contains("\"409\"")
        || body.contains("Duplicate")
        || body.contains("already exists");
    if duplicate {
        return StorageError::Conflict {
            key: key.to_string(),
        };
    }
    StorageError::Http {
        status: status.as_u16(),
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn put(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        validate_key(key)?;
        let url = self.endpoint(&[self.bucket.as_str()], key)?;
        let len = data.len();

        let response = self
            .authed(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .header("cache-control", "max-age=3600")
            .body(data)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for(response, key).await);
        }

        debug!(key, bytes = len, bucket = %self.bucket, "Uploaded object");
        Ok(StoredObject {
            key: key.to_string(),
            locator: self.public_url(key).unwrap_or_else(|| key.to_string()),
        })
    }

    fn public_url(&self, key: &str) -> Option<String> {
        self.endpoint(&["public", self.bucket.as_str()], key)
            .ok()
            .map(String::from)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        validate_prefix(prefix)?;
        // Supabase lists one folder at a time; names come back relative to it.
        let (folder, name_prefix) = match prefix.rfind('/') {
            Some(i) => (&prefix[..i], &prefix[i + 1..]),
            None => ("", prefix),
        };
        let url = self.endpoint(&["list", self.bucket.as_str()], "")?;

        let mut keys = Vec::new();
        let mut offset = 0;
        loop {
            let body = ListRequest {
                prefix: folder,
                limit: LIST_PAGE,
                offset,
                sort_by: SortBy {
                    column: "name",
                    order: "asc",
                },
            };
            let response = self
                .authed(self.client.post(url.clone()))
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(error_for(response, prefix).await);
            }
            let page: Vec<ListEntry> = response
                .json()
                .await
                .map_err(|e| StorageError::Transport(format!("invalid list response: {e}")))?;
            let n = page.len();
            keys.extend(
                page.into_iter()
                    .filter(|e| e.id.is_some() && e.name.starts_with(name_prefix))
                    .map(|e| {
                        if folder.is_empty() {
                            e.name
                        } else {
                            format!("{folder}/{}", e.name)
                        }
                    }),
            );
            if n < LIST_PAGE {
                break;
            }
            offset += n;
        }
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize, StorageError> {
        if keys.is_empty() {
            return Ok(0);
        }
        for key in keys {
            validate_key(key)?;
        }
        let url = self.endpoint(&[self.bucket.as_str()], "")?;
        let response = self
            .authed(self.client.delete(url))
            .json(&DeleteRequest { prefixes: keys })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for(response, &keys[0]).await);
        }
        let removed: Vec<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| StorageError::Transport(format!("invalid delete response: {e}")))?;
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SupabaseStore {
        SupabaseStore::new(SupabaseConfig::new("https://proj.supabase.co", "key")).unwrap()
    }

    #[test]
    fn public_url_layout() {
        assert_eq!(
            store().public_url("images/abc/0.png").as_deref(),
            Some("https://proj.supabase.co/storage/v1/object/public/images/images/abc/0.png")
        );
    }

    #[test]
    fn endpoint_encodes_segments() {
        let url = store().endpoint(&["images"], "tenant one/0.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://proj.supabase.co/storage/v1/object/images/tenant%20one/0.png"
        );
    }

    #[test]
    fn base_url_with_trailing_slash() {
        let s = SupabaseStore::new(SupabaseConfig::new("https://proj.supabase.co/", "key")).unwrap();
        assert_eq!(
            s.endpoint(&["list", "images"], "").unwrap().as_str(),
            "https://proj.supabase.co/storage/v1/object/list/images"
        );
    }

    #[test]
    fn rejects_bad_config() {
        assert!(SupabaseStore::new(SupabaseConfig::new("not a url", "key")).is_err());
        assert!(SupabaseStore::new(SupabaseConfig::new("ftp://x", "key")).is_err());
        assert!(SupabaseStore::new(SupabaseConfig::new("https://x", " ")).is_err());
        assert!(SupabaseStore::new(SupabaseConfig::new("https://x", "k").bucket("a/b")).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let dbg = format!("{:?}", SupabaseConfig::new("https://x", "super-secret"));
        assert!(!dbg.contains("super-secret"));
    }
}
