//! Size-budget eviction of cached files, newest kept first.

use std::sync::Arc;

use tiercache_storage::{collect_entries, path, FileStat, Storage, StorageError};
use tracing::{debug, warn};

/// A regular file found by a tree scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Storage path, relative to the storage root.
    pub path: String,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: i64,
    /// Size in bytes.
    pub size: u64,
}

/// Pick the files to evict so the retained files fit in `size_limit`.
///
/// Files are visited newest first (stable for equal mtimes). Each visited
/// file is kept while the running total plus its size stays within the
/// limit; the first file that does not fit and every older file after it
/// are selected.
///
/// # Arguments
/// * `files` - Scanned files, in scan order
/// * `size_limit` - Budget in bytes
///
/// # Returns
/// Paths to evict, newest first.
pub fn select_for_eviction(mut files: Vec<FileRecord>, size_limit: u64) -> Vec<String> {
    files.sort_by(|a, b| b.mtime.cmp(&a.mtime));

    let mut retained: u64 = 0;
    let mut kept: usize = 0;
    for file in &files {
        match retained.checked_add(file.size) {
            Some(total) if total <= size_limit => {
                retained = total;
                kept += 1;
            }
            _ => break,
        }
    }

    files
        .into_iter()
        .skip(kept)
        .map(|file: FileRecord| file.path)
        .collect()
}

/// Deletes the oldest files of a storage until it fits a size budget.
pub struct Evictor {
    storage: Arc<dyn Storage>,
    size_limit: u64,
}

impl Evictor {
    /// Create an evictor.
    ///
    /// # Arguments
    /// * `storage` - Storage to trim, usually a cache tier
    /// * `size_limit` - Budget in bytes
    pub fn new(storage: Arc<dyn Storage>, size_limit: u64) -> Self {
        Self {
            storage,
            size_limit,
        }
    }

    /// Every regular file below `root`, recursively.
    ///
    /// Directories are traversed but not recorded.
    pub fn scan_tree(&self, root: &str) -> Result<Vec<FileRecord>, StorageError> {
        let mut files: Vec<FileRecord> = Vec::new();
        self.scan_into(&path::normalize(root), &mut files)?;
        Ok(files)
    }

    fn scan_into(&self, dir: &str, files: &mut Vec<FileRecord>) -> Result<(), StorageError> {
        let Some(mut listing) = self.storage.opendir(dir)? else {
            return Ok(());
        };
        for name in collect_entries(listing.as_mut())? {
            let child: String = path::join(dir, &name);
            let Some(stat) = self.storage.stat(&child)? else {
                continue;
            };
            if stat.is_dir() {
                self.scan_into(&child, files)?;
            } else {
                files.push(Self::record(child, stat));
            }
        }
        Ok(())
    }

    fn record(path: String, stat: FileStat) -> FileRecord {
        FileRecord {
            path,
            mtime: stat.mtime,
            size: stat.size,
        }
    }

    /// Files that have to go for the storage to fit its budget.
    pub fn files_to_evict(&self) -> Result<Vec<String>, StorageError> {
        let files: Vec<FileRecord> = self.scan_tree("")?;
        Ok(select_for_eviction(files, self.size_limit))
    }

    /// Delete every file selected by [`Evictor::files_to_evict`].
    ///
    /// Deletion is best effort: failures are logged and not retried.
    ///
    /// # Returns
    /// Number of files selected for eviction.
    pub fn evict(&self) -> Result<usize, StorageError> {
        let files: Vec<String> = self.files_to_evict()?;
        for file in &files {
            match self.storage.unlink(file) {
                Ok(true) => debug!("Evicted {} from {}", file, self.storage.id()),
                Ok(false) => warn!("Could not evict {}: already gone", file),
                Err(e) => warn!("Could not evict {}: {}", file, e),
            }
        }
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiercache_storage::LocalStorage;

    const NOW: i64 = 1_700_000_000;

    fn record(path: &str, mtime: i64, size: u64) -> FileRecord {
        FileRecord {
            path: path.to_string(),
            mtime,
            size,
        }
    }

    fn sorted(mut paths: Vec<String>) -> Vec<String> {
        paths.sort();
        paths
    }

    fn storage() -> (TempDir, Arc<LocalStorage>) {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("cache")).unwrap());
        (dir, storage)
    }

    /// foo.txt (3B, now), bar.txt (6B, now-100), sub/asd.txt (6B, now-150).
    fn populated() -> (TempDir, Arc<LocalStorage>) {
        let (dir, storage) = storage();
        storage.mkdir("sub").unwrap();
        storage.write_all("foo.txt", b"asd").unwrap();
        storage.write_all("bar.txt", b"foobar").unwrap();
        storage.write_all("sub/asd.txt", b"qwerty").unwrap();
        storage.touch("foo.txt", Some(NOW)).unwrap();
        storage.touch("bar.txt", Some(NOW - 100)).unwrap();
        storage.touch("sub/asd.txt", Some(NOW - 150)).unwrap();
        (dir, storage)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    #[test]
    fn test_select_keeps_newest_within_budget() {
        let files: Vec<FileRecord> = vec![
            record("old", 100, 6),
            record("mid", 200, 6),
            record("new", 300, 3),
        ];

        assert_eq!(sorted(select_for_eviction(files, 6)), vec!["mid", "old"]);
    }

    #[test]
    fn test_select_stops_at_first_overflow() {
        let files: Vec<FileRecord> = vec![
            record("big", 300, 10),
            record("small", 200, 1),
        ];

        assert_eq!(select_for_eviction(files, 5), vec!["big", "small"]);
    }

    #[test]
    fn test_select_exact_budget_is_kept() {
        let files: Vec<FileRecord> = vec![record("a", 2, 3), record("b", 1, 3)];

        assert!(select_for_eviction(files, 6).is_empty());
    }

    #[test]
    fn test_select_ties_keep_scan_order() {
        let files: Vec<FileRecord> = vec![record("first", 5, 4), record("second", 5, 4)];

        assert_eq!(select_for_eviction(files, 4), vec!["second"]);
    }

    #[test]
    fn test_select_empty() {
        assert!(select_for_eviction(Vec::new(), 0).is_empty());
    }

    // ========================================================================
    // Storage scans
    // ========================================================================

    #[test]
    fn test_empty_storage() {
        let (_dir, storage) = storage();
        let evictor = Evictor::new(storage, 100);

        assert!(evictor.files_to_evict().unwrap().is_empty());
    }

    #[test]
    fn test_everything_fits() {
        let (_dir, storage) = populated();
        let evictor = Evictor::new(storage, 100);

        assert!(evictor.files_to_evict().unwrap().is_empty());
    }

    #[test]
    fn test_scan_records_files_only() {
        let (_dir, storage) = populated();
        let evictor = Evictor::new(storage, 100);

        let mut files: Vec<FileRecord> = evictor.scan_tree("").unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            files,
            vec![
                record("bar.txt", NOW - 100, 6),
                record("foo.txt", NOW, 3),
                record("sub/asd.txt", NOW - 150, 6),
            ]
        );
    }

    #[test]
    fn test_root_files() {
        let (_dir, storage) = storage();
        storage.write_all("foo.txt", b"asd").unwrap();
        storage.write_all("bar.txt", b"foobar").unwrap();
        storage.touch("foo.txt", Some(NOW)).unwrap();
        storage.touch("bar.txt", Some(NOW - 100)).unwrap();

        let evictor = Evictor::new(storage.clone(), 6);
        assert_eq!(evictor.files_to_evict().unwrap(), vec!["bar.txt"]);

        storage.touch("foo.txt", Some(NOW - 200)).unwrap();
        let evictor = Evictor::new(storage, 6);
        assert_eq!(evictor.files_to_evict().unwrap(), vec!["foo.txt"]);
    }

    #[test]
    fn test_nested_files() {
        let (_dir, storage) = populated();

        let evictor = Evictor::new(storage.clone(), 9);
        assert_eq!(evictor.files_to_evict().unwrap(), vec!["sub/asd.txt"]);

        let evictor = Evictor::new(storage, 6);
        assert_eq!(
            sorted(evictor.files_to_evict().unwrap()),
            vec!["bar.txt", "sub/asd.txt"]
        );
    }

    #[test]
    fn test_evict_deletes_selected_files() {
        let (_dir, storage) = populated();
        let evictor = Evictor::new(storage.clone(), 9);

        assert_eq!(evictor.evict().unwrap(), 1);
        assert!(storage.exists("foo.txt").unwrap());
        assert!(storage.exists("bar.txt").unwrap());
        assert!(!storage.exists("sub/asd.txt").unwrap());
        assert!(storage.is_dir("sub").unwrap());
    }
}
