//! Storage backed by a directory on the local filesystem.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::debug;

use crate::directory::MemoryDirectory;
use crate::error::StorageError;
use crate::path;
use crate::stream::LocalFileStream;
use crate::traits::{DirectoryListing, FileStream, Storage};
use crate::types::{FileKind, FileStat, LockType, OpenMode, Permissions};

/// Capability tag reported by every `LocalStorage`.
pub const LOCAL_CAPABILITY: &str = "local";

/// State of a path lock in the in-process lock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockState {
    Shared(usize),
    Exclusive,
}

/// Storage rooted at a local directory.
///
/// # Directory Structure
/// ```text
/// root/
/// ├── foo.txt          # storage path "foo.txt"
/// └── sub/
///     └── bar.txt      # storage path "sub/bar.txt"
/// ```
pub struct LocalStorage {
    root: PathBuf,
    /// Whether the root lives on this machine (false for network mounts).
    local: bool,
    locks: Mutex<HashMap<String, LockState>>,
}

impl LocalStorage {
    /// Create a storage rooted at `root`, creating the directory if needed.
    ///
    /// # Arguments
    /// * `root` - Root directory
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::build(root.into(), true)
    }

    /// Create a storage over a directory that is a network mount.
    ///
    /// Behaves like [`LocalStorage::new`] but reports `is_local() == false`.
    ///
    /// # Arguments
    /// * `root` - Root directory of the mount
    pub fn network(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        Self::build(root.into(), false)
    }

    fn build(root: PathBuf, local: bool) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&root)
            .map_err(|e| StorageError::io(root.display().to_string(), e))?;
        debug!("Opened local storage at {}", root.display());
        Ok(Self {
            root,
            local,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Root directory of this storage.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage path to a filesystem path below the root.
    ///
    /// # Arguments
    /// * `path` - Storage path
    fn full_path(&self, path: &str) -> Result<PathBuf, StorageError> {
        let normalized: String = path::normalize(path);
        let relative: &Path = Path::new(&normalized);
        let escapes: bool = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(StorageError::InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn stat_path(full_path: &Path) -> Result<Option<FileStat>, std::io::Error> {
        let metadata: std::fs::Metadata = match std::fs::metadata(full_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let mtime: i64 = metadata
            .modified()
            .ok()
            .and_then(|t: SystemTime| t.duration_since(UNIX_EPOCH).ok())
            .map(|d: Duration| d.as_secs() as i64)
            .unwrap_or(0);
        let kind: FileKind = if metadata.is_dir() {
            FileKind::Directory
        } else {
            FileKind::File
        };
        Ok(Some(FileStat {
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mtime,
            kind,
        }))
    }

    /// Recursively copy a directory tree.
    fn copy_dir(source: &Path, target: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(target)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            let destination: PathBuf = target.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                Self::copy_dir(&entry.path(), &destination)?;
            } else {
                std::fs::copy(entry.path(), &destination)?;
            }
        }
        Ok(())
    }
}

impl Storage for LocalStorage {
    fn id(&self) -> String {
        format!("local::{}/", self.root.display())
    }

    fn mkdir(&self, path: &str) -> Result<bool, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        match std::fs::create_dir(&full_path) {
            Ok(()) => Ok(true),
            Err(e) if matches!(e.kind(), ErrorKind::AlreadyExists | ErrorKind::NotFound) => {
                Ok(false)
            }
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn rmdir(&self, path: &str) -> Result<bool, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        if path::normalize(path).is_empty() || !full_path.is_dir() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&full_path).map_err(|e| StorageError::io(path, e))?;
        Ok(true)
    }

    fn opendir(&self, path: &str) -> Result<Option<Box<dyn DirectoryListing>>, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        if !full_path.is_dir() {
            return Ok(None);
        }
        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&full_path).map_err(|e| StorageError::io(path, e))? {
            let entry = entry.map_err(|e| StorageError::io(path, e))?;
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(Some(Box::new(MemoryDirectory::new(names))))
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        Self::stat_path(&full_path).map_err(|e| StorageError::io(path, e))
    }

    fn open(
        &self,
        path: &str,
        mode: OpenMode,
    ) -> Result<Option<Box<dyn FileStream>>, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        if full_path.is_dir() {
            return Ok(None);
        }

        let mut options: OpenOptions = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::ReadWrite => options.read(true).write(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
            OpenMode::WriteRead => options.read(true).write(true).create(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };

        match options.open(&full_path) {
            Ok(file) => Ok(Some(Box::new(LocalFileStream::new(file)))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn unlink(&self, path: &str) -> Result<bool, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        if full_path.is_dir() {
            return self.rmdir(path);
        }
        match std::fs::remove_file(&full_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn rename(&self, source: &str, target: &str) -> Result<bool, StorageError> {
        let source_path: PathBuf = self.full_path(source)?;
        let target_path: PathBuf = self.full_path(target)?;
        if !source_path.exists() {
            return Ok(false);
        }
        std::fs::rename(&source_path, &target_path).map_err(|e| StorageError::io(source, e))?;
        Ok(true)
    }

    fn copy(&self, source: &str, target: &str) -> Result<bool, StorageError> {
        let source_path: PathBuf = self.full_path(source)?;
        let target_path: PathBuf = self.full_path(target)?;
        if source_path.is_dir() {
            Self::copy_dir(&source_path, &target_path).map_err(|e| StorageError::io(source, e))?;
            return Ok(true);
        }
        match std::fs::copy(&source_path, &target_path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(source, e)),
        }
    }

    fn touch(&self, path: &str, mtime: Option<i64>) -> Result<bool, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        let time: SystemTime = match mtime {
            Some(seconds) if seconds >= 0 => {
                UNIX_EPOCH.checked_add(Duration::from_secs(seconds as u64))
            }
            Some(seconds) => UNIX_EPOCH.checked_sub(Duration::from_secs(seconds.unsigned_abs())),
            None => Some(SystemTime::now()),
        }
        .ok_or_else(|| {
            StorageError::InvalidArgument(format!("mtime {:?} is out of range", mtime))
        })?;
        if !full_path.exists() {
            File::create(&full_path).map_err(|e| StorageError::io(path, e))?;
        }
        let file: File = File::open(&full_path).map_err(|e| StorageError::io(path, e))?;
        file.set_modified(time)
            .map_err(|e| StorageError::io(path, e))?;
        Ok(true)
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn permissions(&self, path: &str) -> Result<Option<Permissions>, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        let metadata: std::fs::Metadata = match std::fs::metadata(&full_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        let mut permissions: Permissions = Permissions::READ | Permissions::SHARE;
        if !metadata.permissions().readonly() {
            permissions = permissions | Permissions::UPDATE | Permissions::DELETE;
            if metadata.is_dir() {
                permissions = permissions | Permissions::CREATE;
            }
        }
        Ok(Some(permissions))
    }

    fn local_file(&self, path: &str) -> Result<Option<PathBuf>, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        Ok(full_path.exists().then_some(full_path))
    }

    fn free_space(&self, path: &str) -> Result<Option<u64>, StorageError> {
        let full_path: PathBuf = self.full_path(path)?;
        let existing: &Path = if full_path.exists() {
            &full_path
        } else {
            &self.root
        };
        fs2::available_space(existing)
            .map(Some)
            .map_err(|e| StorageError::io(path, e))
    }

    fn has_capability(&self, tag: &str) -> bool {
        tag == LOCAL_CAPABILITY
    }

    fn acquire_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        let key: String = path::normalize(path);
        let mut locks = self.locks.lock();
        let next: LockState = match (locks.get(&key).copied(), lock_type) {
            (None, LockType::Shared) => LockState::Shared(1),
            (None, LockType::Exclusive) => LockState::Exclusive,
            (Some(LockState::Shared(count)), LockType::Shared) => LockState::Shared(count + 1),
            (held, _) => {
                debug!("Lock conflict on {}: held {:?}, wanted {:?}", key, held, lock_type);
                return Err(StorageError::Locked {
                    path: path.to_string(),
                })
            }
        };
        locks.insert(key, next);
        Ok(())
    }

    fn release_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        let key: String = path::normalize(path);
        let mut locks = self.locks.lock();
        match (locks.get(&key).copied(), lock_type) {
            (Some(LockState::Shared(count)), LockType::Shared) if count > 1 => {
                locks.insert(key, LockState::Shared(count - 1));
            }
            (Some(LockState::Shared(_)), LockType::Shared)
            | (Some(LockState::Exclusive), LockType::Exclusive) => {
                locks.remove(&key);
            }
            _ => {}
        }
        Ok(())
    }

    fn change_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        let key: String = path::normalize(path);
        let mut locks = self.locks.lock();
        let next: LockState = match (locks.get(&key).copied(), lock_type) {
            (Some(LockState::Shared(1)), LockType::Exclusive) => LockState::Exclusive,
            (Some(LockState::Exclusive), LockType::Shared) => LockState::Shared(1),
            (Some(state @ LockState::Exclusive), LockType::Exclusive)
            | (Some(state @ LockState::Shared(_)), LockType::Shared) => state,
            _ => {
                return Err(StorageError::Locked {
                    path: path.to_string(),
                })
            }
        };
        locks.insert(key, next);
        Ok(())
    }
}
