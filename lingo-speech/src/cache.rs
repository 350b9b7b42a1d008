//! On-device speech cache
//!
//! One MP3 file per `(text, language)` key in a flat directory. Entries are
//! written once through a temp file + rename, so a reader never sees a
//! partial file and a failed write leaves nothing behind.
//!
//! With a capacity set, each write evicts the least recently used entries.
//! Recency is the file modification time; cache hits touch it.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Extension of cached audio files
pub const AUDIO_EXTENSION: &str = "mp3";

/// Longest file name most filesystems accept
const MAX_FILE_NAME_LEN: usize = 255;

/// Speech cache rooted at a single directory
#[derive(Debug)]
pub struct SpeechCache {
    dir: PathBuf,
    capacity: Option<usize>,
    /// Sequence for unique temp file names
    write_seq: AtomicU64,
}

impl SpeechCache {
    /// Create a cache handle. The directory is created lazily on first write.
    ///
    /// # Arguments
    /// * `dir` - Cache directory
    /// * `capacity` - Maximum number of entries (None = unbounded)
    pub fn new(dir: impl Into<PathBuf>, capacity: Option<usize>) -> Self {
        Self {
            dir: dir.into(),
            capacity,
            write_seq: AtomicU64::new(0),
        }
    }

    /// Cache directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Configured capacity
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Deterministic file name for a key
    ///
    /// `urlencode(text) + urlencode(language) + ".mp3"`. Names that would
    /// exceed the filesystem limit fall back to a SHA-256 of the key.
    pub fn file_name(text: &str, language: &str) -> String {
        let name = format!(
            "{}{}.{}",
            urlencoding::encode(text),
            urlencoding::encode(language),
            AUDIO_EXTENSION
        );

        if name.len() <= MAX_FILE_NAME_LEN {
            return name;
        }

        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update([0u8]);
        hasher.update(language.as_bytes());
        format!("{:x}.{}", hasher.finalize(), AUDIO_EXTENSION)
    }

    /// Full path of the entry for a key
    pub fn path_for(&self, text: &str, language: &str) -> PathBuf {
        self.dir.join(Self::file_name(text, language))
    }

    /// Create the cache directory if missing (recursive, idempotent)
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// True if an entry exists for `file_name`
    pub async fn contains(&self, file_name: &str) -> bool {
        tokio::fs::try_exists(self.dir.join(file_name))
            .await
            .unwrap_or(false)
    }

    /// Read a cached entry
    ///
    /// # Returns
    /// * `Ok(Some(bytes))` - Cache hit (entry recency refreshed)
    /// * `Ok(None)` - No entry for this key
    /// * `Err(_)` - Entry exists but could not be read
    pub async fn lookup(&self, file_name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.dir.join(file_name);

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!(file = %file_name, bytes = bytes.len(), "Speech cache hit");
                if self.capacity.is_some() {
                    touch(path).await;
                }
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %file_name, "Speech cache miss");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write an entry and enforce the capacity
    ///
    /// # Returns
    /// Path of the written entry
    pub async fn store(&self, file_name: &str, audio: &[u8]) -> Result<PathBuf> {
        self.ensure_dir().await?;

        let target = self.dir.join(file_name);
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.dir.join(format!("{}.{}.part", file_name, seq));

        if let Err(e) = tokio::fs::write(&tmp, audio).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(file = %file_name, bytes = audio.len(), "Speech cache entry written");

        if let Some(capacity) = self.capacity {
            self.evict_to(capacity, &target).await;
        }

        Ok(target)
    }

    /// Number of cached entries
    pub async fn len(&self) -> Result<usize> {
        Ok(self.entries().await?.len())
    }

    /// True if the cache holds no entries
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// All cached entries with their modification time
    async fn entries(&self) -> Result<Vec<(PathBuf, SystemTime)>> {
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(AUDIO_EXTENSION) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            entries.push((path, modified));
        }

        Ok(entries)
    }

    /// Remove least recently used entries until at most `capacity` remain.
    /// `keep` (the entry just written) is never evicted.
    async fn evict_to(&self, capacity: usize, keep: &Path) {
        let mut entries = match self.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Speech cache eviction skipped, listing failed: {}", e);
                return;
            }
        };

        if entries.len() <= capacity {
            return;
        }

        entries.retain(|(path, _)| path != keep);
        entries.sort_by_key(|(_, modified)| *modified);

        // `keep` occupies one slot of the capacity
        let excess = entries.len() + 1 - capacity.max(1);
        for (path, _) in entries.into_iter().take(excess) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!(file = %path.display(), "Evicted speech cache entry"),
                Err(e) => warn!("Failed to evict {}: {}", path.display(), e),
            }
        }
    }
}

/// Refresh an entry's modification time (best-effort)
async fn touch(path: PathBuf) {
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(SystemTime::now()))
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Failed to refresh speech cache entry: {}", e),
        Err(e) => warn!("Speech cache touch task failed: {}", e),
    }
}
