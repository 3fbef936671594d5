//! Capacity-aware bucket directory allocation.
//!
//! Archives are grouped by a coarse time bucket (a calendar day). Each bucket
//! is split across directories `<bucket><letter>` so that no single directory
//! grows far past a byte threshold. Directory sizes are cached in memory: a
//! directory is scanned at most once, then maintained incrementally from the
//! declared sizes of the archives stored into it.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::error::AllocateError;

/// Default soft cap per bucket directory (18 GiB).
pub const DEFAULT_DIR_SIZE_THRESHOLD: u64 = 18 << 30;

/// Final letter suffix tried for a bucket.
const LAST_SUFFIX: char = 'z';

#[cfg(unix)]
const DIR_MODE: u32 = 0o775;

/// A directory chosen for an incoming archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Bucket directory the archive should be written into.
    pub dir: PathBuf,
    /// Cached size of the directory at selection time.
    pub cached_size: u64,
}

/// Maps time buckets to storage directories under a byte threshold.
///
/// The admission check compares the directory's *current* cached size with
/// the threshold and ignores the incoming archive's size, so a directory may
/// end up above the threshold by up to one archive.
///
/// When every suffix `a..=z` is at or above the threshold, the `z` directory
/// is returned anyway.
#[derive(Debug)]
pub struct DirectoryAllocator {
    root: PathBuf,
    threshold: u64,
    /// Cached cumulative size per directory. One lock for every read or update.
    sizes: Mutex<HashMap<PathBuf, u64>>,
}

impl DirectoryAllocator {
    /// Creates an allocator rooted at `root`. The root must already exist.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, threshold: u64) -> Self {
        Self {
            root: root.into(),
            threshold,
            sizes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the per-directory byte threshold.
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Returns the bucket directory path for a given suffix.
    #[must_use]
    pub fn bucket_dir(&self, bucket_key: &str, suffix: char) -> PathBuf {
        self.root.join(format!("{bucket_key}{suffix}"))
    }

    /// Selects the first directory of `bucket_key` whose cached size is below
    /// the threshold, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`AllocateError`] if a directory cannot be created or scanned.
    #[instrument(skip(self), fields(threshold = self.threshold))]
    pub async fn allocate(&self, bucket_key: &str) -> Result<Allocation, AllocateError> {
        for suffix in 'a'..LAST_SUFFIX {
            let dir = self.bucket_dir(bucket_key, suffix);
            let cached_size = self.create_or_get_size(&dir).await?;
            if cached_size < self.threshold {
                debug!(dir = %dir.display(), cached_size, "allocated bucket directory");
                return Ok(Allocation { dir, cached_size });
            }
            debug!(dir = %dir.display(), cached_size, "bucket directory full");
        }

        let dir = self.bucket_dir(bucket_key, LAST_SUFFIX);
        let cached_size = self.create_or_get_size(&dir).await?;
        if cached_size >= self.threshold {
            warn!(
                dir = %dir.display(),
                cached_size,
                "all bucket directories at capacity; overflowing last directory"
            );
        }
        Ok(Allocation { dir, cached_size })
    }

    /// Adds `declared_size` to the cached size of `dir` and returns the new total.
    pub async fn record_stored(&self, dir: &Path, declared_size: u64) -> u64 {
        let mut sizes = self.sizes.lock().await;
        let total = sizes.entry(dir.to_path_buf()).or_insert(0);
        *total = total.saturating_add(declared_size);
        debug!(dir = %dir.display(), declared_size, total = *total, "updated directory size");
        *total
    }

    /// Returns the cached size of `dir`, if it has been seen.
    pub async fn cached_size(&self, dir: &Path) -> Option<u64> {
        self.sizes.lock().await.get(dir).copied()
    }

    async fn create_or_get_size(&self, dir: &Path) -> Result<u64, AllocateError> {
        let mut sizes = self.sizes.lock().await;

        match create_bucket_dir(dir).await {
            Ok(()) => {
                debug!(dir = %dir.display(), "created bucket directory");
                sizes.insert(dir.to_path_buf(), 0);
                return Ok(0);
            }
            // Another worker or a previous run created it first.
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(AllocateError::create_dir(dir, e)),
        }

        if let Some(size) = sizes.get(dir) {
            return Ok(*size);
        }

        let size = scan_dir_size(dir).await?;
        debug!(dir = %dir.display(), size, "scanned existing bucket directory");
        sizes.insert(dir.to_path_buf(), size);
        Ok(size)
    }
}

async fn create_bucket_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(dir).await
}

/// Sums the sizes of the regular files directly inside `dir`.
async fn scan_dir_size(dir: &Path) -> Result<u64, AllocateError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AllocateError::scan(dir, e))?;

    let mut total: u64 = 0;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AllocateError::scan(dir, e))?
    {
        let metadata = entry
            .metadata()
            .await
            .map_err(|e| AllocateError::scan(entry.path(), e))?;
        if metadata.is_file() {
            total = total.saturating_add(metadata.len());
        }
    }
    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    fn write_file(dir: &Path, name: &str, len: usize) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), vec![0u8; len]).unwrap();
    }

    #[tokio::test]
    async fn test_allocate_creates_first_directory() {
        let root = TempDir::new().unwrap();
        let allocator = DirectoryAllocator::new(root.path(), DEFAULT_DIR_SIZE_THRESHOLD);

        let allocation = allocator.allocate("20240101").await.unwrap();

        assert_eq!(allocation.dir, root.path().join("20240101a"));
        assert_eq!(allocation.cached_size, 0);
        assert!(allocation.dir.is_dir());
        assert_eq!(allocator.cached_size(&allocation.dir).await, Some(0));
    }

    #[tokio::test]
    async fn test_allocate_is_idempotent_without_writes() {
        let root = TempDir::new().unwrap();
        write_file(&root.path().join("20240101a"), "x.car", 7);
        let allocator = DirectoryAllocator::new(root.path(), 100);

        let first = allocator.allocate("20240101").await.unwrap();
        let second = allocator.allocate("20240101").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.cached_size, 7);
    }

    #[tokio::test]
    async fn test_allocate_selects_directory_below_threshold() {
        let root = TempDir::new().unwrap();
        write_file(&root.path().join("20240101a"), "x.car", 17);
        let allocator = DirectoryAllocator::new(root.path(), 18);

        let allocation = allocator.allocate("20240101").await.unwrap();

        assert_eq!(allocation.dir, root.path().join("20240101a"));
        assert_eq!(allocation.cached_size, 17);
    }

    #[tokio::test]
    async fn test_allocate_advances_when_directory_at_threshold() {
        let root = TempDir::new().unwrap();
        write_file(&root.path().join("20240101a"), "x.car", 18);
        let allocator = DirectoryAllocator::new(root.path(), 18);

        let allocation = allocator.allocate("20240101").await.unwrap();

        assert_eq!(allocation.dir, root.path().join("20240101b"));
        assert_eq!(allocation.cached_size, 0);
        assert!(allocation.dir.is_dir());
    }

    #[tokio::test]
    async fn test_admission_ignores_incoming_size_and_overshoots() {
        let root = TempDir::new().unwrap();
        let allocator = DirectoryAllocator::new(root.path(), 18);

        let first = allocator.allocate("20240101").await.unwrap();
        allocator.record_stored(&first.dir, 17).await;

        // 17 < 18, so the directory is still admitted for a 20-unit archive
        let second = allocator.allocate("20240101").await.unwrap();
        assert_eq!(second.dir, first.dir);
        assert_eq!(second.cached_size, 17);

        let total = allocator.record_stored(&second.dir, 20).await;
        assert_eq!(total, 37);
        assert!(total > allocator.threshold());

        let third = allocator.allocate("20240101").await.unwrap();
        assert_eq!(third.dir, root.path().join("20240101b"));
    }

    #[tokio::test]
    async fn test_allocate_overflows_last_suffix_when_all_full() {
        let root = TempDir::new().unwrap();
        for suffix in 'a'..='z' {
            write_file(&root.path().join(format!("20240101{suffix}")), "x.car", 2);
        }
        let allocator = DirectoryAllocator::new(root.path(), 1);

        let allocation = allocator.allocate("20240101").await.unwrap();

        assert_eq!(allocation.dir, root.path().join("20240101z"));
        assert_eq!(allocation.cached_size, 2);
    }

    #[tokio::test]
    async fn test_scan_is_not_recursive() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("20240101a");
        write_file(&dir, "top.car", 5);
        write_file(&dir.join("nested"), "deep.car", 1000);
        let allocator = DirectoryAllocator::new(root.path(), 100);

        let allocation = allocator.allocate("20240101").await.unwrap();

        assert_eq!(allocation.cached_size, 5);
    }

    #[tokio::test]
    async fn test_directory_is_scanned_only_once() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("20240101a");
        write_file(&dir, "a.car", 5);
        let allocator = DirectoryAllocator::new(root.path(), 100);

        assert_eq!(allocator.allocate("20240101").await.unwrap().cached_size, 5);

        write_file(&dir, "b.car", 50);
        assert_eq!(allocator.allocate("20240101").await.unwrap().cached_size, 5);
    }

    #[tokio::test]
    async fn test_concurrent_allocations_share_directory() {
        let root = TempDir::new().unwrap();
        let allocator = Arc::new(DirectoryAllocator::new(root.path(), 100));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = Arc::clone(&allocator);
            handles.push(tokio::spawn(async move {
                allocator.allocate("20240101").await
            }));
        }

        for handle in handles {
            let allocation = handle.await.unwrap().unwrap();
            assert_eq!(allocation.dir, root.path().join("20240101a"));
        }
    }

    #[tokio::test]
    async fn test_missing_root_is_a_create_error() {
        let root = TempDir::new().unwrap();
        let allocator = DirectoryAllocator::new(root.path().join("missing"), 100);

        let result = allocator.allocate("20240101").await;

        assert!(matches!(result, Err(AllocateError::CreateDir { .. })));
    }
}
