//! Disk cache for remote images.
//!
//! Files are named by the SHA-256 of their URI and listed in `index.json`
//! inside the cache directory. A hit whose file has vanished counts as a
//! miss. Concurrent requests for one URI share a single download, and with
//! a byte bound the oldest entries are evicted after each insert. Entries
//! whose download is still in flight are never evicted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

const INDEX_FILE: &str = "index.json";
const FALLBACK_EXTENSION: &str = "img";

/// Errors raised by the image cache.
#[derive(Debug, Error)]
pub enum ImageCacheError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("download of {uri} returned status {status}")]
    Status { uri: String, status: u16 },
    #[error("corrupt cache index {path}: {source}")]
    Index {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ImageCacheError + '_ {
    move |source| ImageCacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    file: String,
    size: u64,
    seq: u64,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheIndex {
    next_seq: u64,
    entries: HashMap<String, IndexEntry>,
}

impl CacheIndex {
    fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    fn insert(&mut self, uri: &str, file: String, size: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            uri.to_string(),
            IndexEntry {
                file,
                size,
                seq,
                stored_at: Utc::now(),
            },
        );
    }

    /// Drop oldest entries until under `max_bytes`, never evicting a key in
    /// `keep`. Returns the file names that should be deleted.
    fn evict(&mut self, max_bytes: u64, keep: &HashSet<String>) -> Vec<String> {
        let mut evicted = Vec::new();

        while self.total_bytes() > max_bytes {
            let oldest = self
                .entries
                .iter()
                .filter(|(uri, _)| !keep.contains(uri.as_str()))
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(uri, _)| uri.clone());

            let Some(uri) = oldest else { break };
            if let Some(entry) = self.entries.remove(&uri) {
                debug!(uri = %uri, size = entry.size, "Evicting cached image");
                evicted.push(entry.file);
            }
        }

        evicted
    }
}

/// File name for `uri`: hex SHA-256 plus the URI's extension when it has a
/// short alphanumeric one.
fn file_name(uri: &str) -> String {
    let hash = format!("{:x}", Sha256::digest(uri.as_bytes()));

    let extension = url::Url::parse(uri)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_owned))
        })
        .and_then(|last| last.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
        .filter(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    format!("{hash}.{extension}")
}

type InflightMap = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Held by the one caller downloading a URI. Dropping it, on completion or
/// cancellation, removes the in-flight entry before waiters are released.
struct DownloadSlot<'a> {
    inflight: &'a InflightMap,
    uri: String,
    lock: Arc<Mutex<()>>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for DownloadSlot<'_> {
    fn drop(&mut self) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if inflight
            .get(&self.uri)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock))
        {
            inflight.remove(&self.uri);
        }
    }
}

/// Disk-backed image cache.
pub struct ImageCache {
    http: reqwest::Client,
    dir: PathBuf,
    max_bytes: Option<u64>,
    index: Mutex<CacheIndex>,
    inflight: InflightMap,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("dir", &self.dir)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Open the cache in `dir`, loading its index if one exists.
    ///
    /// The directory is created lazily on the first download.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing index cannot be read or parsed.
    pub fn open(
        http: reqwest::Client,
        dir: impl Into<PathBuf>,
        max_bytes: Option<u64>,
    ) -> Result<Self, ImageCacheError> {
        let dir = dir.into();
        let index_path = dir.join(INDEX_FILE);

        let index = match std::fs::read(&index_path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| ImageCacheError::Index {
                    path: index_path.clone(),
                    source,
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => CacheIndex::default(),
            Err(e) => return Err(io_error(&index_path)(e)),
        };

        Ok(Self {
            http,
            dir,
            max_bytes,
            index: Mutex::new(index),
            inflight: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Local path for `uri`, downloading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the download fails or the file or index cannot be
    /// written.
    #[instrument(skip(self))]
    pub async fn get_or_fetch(&self, uri: &str) -> Result<PathBuf, ImageCacheError> {
        loop {
            if let Some(path) = self.cached_path(uri).await {
                debug!("Image cache hit");
                return Ok(path);
            }

            match self.claim(uri) {
                Ok(slot) => {
                    // A previous download may have finished between the
                    // lookup above and the claim
                    if let Some(path) = self.cached_path(uri).await {
                        return Ok(path);
                    }
                    let result = self.download(uri).await;
                    drop(slot);
                    return result;
                }
                Err(lock) => {
                    // Wait for the current download, then look again. A
                    // failed download leaves a miss and the loop claims anew.
                    drop(lock.lock().await);
                }
            }
        }
    }

    /// Become the downloader for `uri`, or get the lock of the caller that
    /// already is.
    fn claim(&self, uri: &str) -> Result<DownloadSlot<'_>, Arc<Mutex<()>>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = inflight.get(uri) {
            return Err(Arc::clone(lock));
        }

        let lock = Arc::new(Mutex::new(()));
        let guard = Arc::clone(&lock)
            .try_lock_owned()
            .map_err(|_| Arc::clone(&lock))?;
        inflight.insert(uri.to_string(), Arc::clone(&lock));

        Ok(DownloadSlot {
            inflight: &self.inflight,
            uri: uri.to_string(),
            lock,
            _guard: guard,
        })
    }

    fn inflight_uris(&self) -> HashSet<String> {
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Local path for `uri` if cached and the file still exists.
    pub async fn cached_path(&self, uri: &str) -> Option<PathBuf> {
        let mut index = self.index.lock().await;
        let path = self.dir.join(&index.entries.get(uri)?.file);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Some(path);
        }

        warn!(uri, "Cached image file missing, treating as a miss");
        index.entries.remove(uri);
        if let Err(e) = self.persist(&index).await {
            warn!(error = %e, "Failed to persist image cache index");
        }
        None
    }

    /// Forget `uri` and delete its file. Returns whether it was cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub async fn remove(&self, uri: &str) -> Result<bool, ImageCacheError> {
        let mut index = self.index.lock().await;
        let Some(entry) = index.entries.remove(uri) else {
            return Ok(false);
        };

        self.delete_file(&entry.file).await;
        self.persist(&index).await?;
        Ok(true)
    }

    /// Delete every cached image.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be written.
    pub async fn clear(&self) -> Result<(), ImageCacheError> {
        let mut index = self.index.lock().await;
        let entries = std::mem::take(&mut index.entries);

        for entry in entries.values() {
            self.delete_file(&entry.file).await;
        }

        self.persist(&index).await?;
        info!(removed = entries.len(), "Image cache cleared");
        Ok(())
    }

    /// Number of cached images.
    pub async fn len(&self) -> usize {
        self.index.lock().await.entries.len()
    }

    /// Whether the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.index.lock().await.entries.is_empty()
    }

    /// Total bytes of cached images.
    pub async fn total_bytes(&self) -> u64 {
        self.index.lock().await.total_bytes()
    }

    async fn download(&self, uri: &str) -> Result<PathBuf, ImageCacheError> {
        let response = self.http.get(uri).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageCacheError::Status {
                uri: uri.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let name = file_name(uri);
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!("{name}.tmp"));
        tokio::fs::write(&tmp, &bytes).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(io_error(&path))?;

        let mut index = self.index.lock().await;
        index.insert(uri, name, bytes.len() as u64);

        if let Some(max_bytes) = self.max_bytes {
            let mut keep = self.inflight_uris();
            keep.insert(uri.to_string());
            for file in index.evict(max_bytes, &keep) {
                self.delete_file(&file).await;
            }
        }

        self.persist(&index).await?;
        info!(size = bytes.len(), "Image cached");
        Ok(path)
    }

    async fn delete_file(&self, file: &str) {
        let path = self.dir.join(file);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "Failed to delete cached image");
        }
    }

    async fn persist(&self, index: &CacheIndex) -> Result<(), ImageCacheError> {
        let index_path = self.dir.join(INDEX_FILE);
        let json = serde_json::to_vec_pretty(index).map_err(|source| ImageCacheError::Index {
            path: index_path.clone(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_error(&self.dir))?;

        let tmp = index_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(io_error(&tmp))?;
        tokio::fs::rename(&tmp, &index_path)
            .await
            .map_err(io_error(&index_path))
    }
}
