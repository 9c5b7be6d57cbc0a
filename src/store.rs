// src/store.rs
//! Dedup-state persistence: an opaque blob store plus the seen-id set client.
//!
//! The blob store is an external collaborator (S3-shaped get/put); the bot
//! only ever reads and writes one JSON document per run:
//! `{"processed_posts": ["<source_id>", ...]}`.

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` means the key does not exist; that is not an error.
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;
}

/// Filesystem-backed store: bucket maps to a directory, key to a file.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(key)
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(bucket, key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading blob {}", path.display())),
        }
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path(bucket, key);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating bucket dir {}", dir.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing blob {}", path.display()))
    }
}

/// In-memory store for tests and local dry runs.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let blobs = self.blobs.lock().expect("blob store lock poisoned");
        Ok(blobs.get(&(bucket.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut blobs = self.blobs.lock().expect("blob store lock poisoned");
        blobs.insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct SeenFile {
    processed_posts: Vec<String>,
}

/// The set of already-delivered `source_id`s. Loaded once at the start of a
/// polling run, mutated in memory, persisted once at the end (best-effort).
#[derive(Debug, Default)]
pub struct SeenPosts {
    ids: HashSet<String>,
}

impl SeenPosts {
    /// Missing blob or an unreadable payload starts fresh with a warning;
    /// dedup state is a cache of history, never a reason to abort a run.
    pub async fn load(store: &dyn BlobStore, bucket: &str, key: &str) -> Self {
        let bytes = match store.get(bucket, key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::warn!(bucket, key, "processed posts blob not found, starting fresh");
                return Self::default();
            }
            Err(e) => {
                tracing::warn!(error = ?e, bucket, key, "failed to load processed posts");
                return Self::default();
            }
        };
        match serde_json::from_slice::<SeenFile>(&bytes) {
            Ok(file) => Self {
                ids: file.processed_posts.into_iter().collect(),
            },
            Err(e) => {
                tracing::warn!(error = ?e, bucket, key, "malformed processed posts blob");
                Self::default()
            }
        }
    }

    pub async fn save(&self, store: &dyn BlobStore, bucket: &str, key: &str) -> Result<()> {
        // Sorted for a stable blob across runs with unchanged content.
        let mut processed_posts: Vec<String> = self.ids.iter().cloned().collect();
        processed_posts.sort();
        let bytes =
            serde_json::to_vec(&SeenFile { processed_posts }).context("encoding seen posts")?;
        store.put(bucket, key, bytes).await
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns true when the id was not present before.
    pub fn insert(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    pub fn ids(&self) -> &HashSet<String> {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
