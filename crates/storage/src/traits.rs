//! Storage traits/interfaces.

use std::io::{Read, Seek, Write};
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::error::StorageError;
use crate::path;
use crate::types::{
    mime_type_for, FileMetadata, FileStat, HashAlgorithm, LockType, OpenMode, Permissions,
    DIRECTORY_MIME_TYPE,
};

/// An open byte stream on a storage entry.
///
/// Closing is explicit so wrappers can run completion logic; dropping an
/// unclosed stream closes it and discards any close error.
pub trait FileStream: Read + Write + Seek + Send {
    /// Whether the stream is still open.
    fn is_open(&self) -> bool;

    /// Whether the read position is at or past the end of the content.
    ///
    /// Unlike a zero-length read this does not require reading past the end.
    fn is_eof(&mut self) -> std::io::Result<bool>;

    /// Flush and release the stream. Closing twice is a no-op.
    fn close(&mut self) -> std::io::Result<()>;
}

/// Enumeration of the entry names of one directory.
pub trait DirectoryListing: Send {
    /// Next entry name, or None once the listing is exhausted.
    fn next_entry(&mut self) -> Result<Option<String>, StorageError>;

    /// Restart the listing from its first entry.
    fn rewind(&mut self) -> Result<(), StorageError>;
}

/// Read every remaining entry of a listing, skipping `.` and `..`.
///
/// # Arguments
/// * `listing` - Listing to drain
pub fn collect_entries(listing: &mut dyn DirectoryListing) -> Result<Vec<String>, StorageError> {
    let mut entries: Vec<String> = Vec::new();
    while let Some(name) = listing.next_entry()? {
        if name != "." && name != ".." {
            entries.push(name);
        }
    }
    Ok(entries)
}

/// A storage backend.
///
/// Paths are slash-separated and relative to the storage root; the same path
/// on two storages denotes the same logical file. A missing path is reported
/// as `Ok(None)` / `Ok(false)`, never as an error.
pub trait Storage: Send + Sync {
    /// Opaque stable identifier of this storage.
    fn id(&self) -> String;

    /// Create a single directory. Returns false if it exists or the parent
    /// is missing.
    fn mkdir(&self, path: &str) -> Result<bool, StorageError>;

    /// Remove a directory and everything below it.
    fn rmdir(&self, path: &str) -> Result<bool, StorageError>;

    /// Open a directory listing, None if the directory doesn't exist.
    fn opendir(&self, path: &str) -> Result<Option<Box<dyn DirectoryListing>>, StorageError>;

    /// Stat an entry, None if it doesn't exist.
    fn stat(&self, path: &str) -> Result<Option<FileStat>, StorageError>;

    /// Open a stream. Read modes return None for missing files.
    fn open(&self, path: &str, mode: OpenMode)
        -> Result<Option<Box<dyn FileStream>>, StorageError>;

    /// Delete a file (directories are removed recursively).
    fn unlink(&self, path: &str) -> Result<bool, StorageError>;

    /// Rename an entry within this storage.
    fn rename(&self, source: &str, target: &str) -> Result<bool, StorageError>;

    /// Copy an entry within this storage.
    fn copy(&self, source: &str, target: &str) -> Result<bool, StorageError>;

    /// Set the modification time, creating an empty file if missing.
    ///
    /// # Arguments
    /// * `path` - Entry to touch
    /// * `mtime` - Seconds since the Unix epoch, None for now
    fn touch(&self, path: &str, mtime: Option<i64>) -> Result<bool, StorageError>;

    /// Whether the storage lives on the local machine.
    fn is_local(&self) -> bool;

    /// Whether an entry exists.
    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.stat(path)?.is_some())
    }

    /// Whether an entry exists and is a directory.
    fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.stat(path)?.map(|s: FileStat| s.is_dir()).unwrap_or(false))
    }

    /// Whether an entry exists and is a regular file.
    fn is_file(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.stat(path)?.map(|s: FileStat| s.is_file()).unwrap_or(false))
    }

    /// Modification time in seconds since the Unix epoch.
    fn mtime(&self, path: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.stat(path)?.map(|s: FileStat| s.mtime))
    }

    /// Permission bitmask of an entry.
    fn permissions(&self, path: &str) -> Result<Option<Permissions>, StorageError> {
        Ok(self.stat(path)?.map(|s: FileStat| {
            if s.is_dir() {
                Permissions::ALL
            } else {
                Permissions::ALL.without(Permissions::CREATE)
            }
        }))
    }

    /// Mime type of an entry.
    fn mime_type(&self, path: &str) -> Result<Option<String>, StorageError> {
        Ok(self.stat(path)?.map(|s: FileStat| {
            if s.is_dir() {
                DIRECTORY_MIME_TYPE.to_string()
            } else {
                mime_type_for(path).to_string()
            }
        }))
    }

    /// Read the whole content of a file.
    fn read_all(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let Some(mut stream) = self.open(path, OpenMode::Read)? else {
            return Ok(None);
        };
        let mut data: Vec<u8> = Vec::new();
        stream
            .read_to_end(&mut data)
            .map_err(|e| StorageError::io(path, e))?;
        stream.close().map_err(|e| StorageError::io(path, e))?;
        Ok(Some(data))
    }

    /// Replace the whole content of a file.
    fn write_all(&self, path: &str, data: &[u8]) -> Result<bool, StorageError> {
        let Some(mut stream) = self.open(path, OpenMode::Write)? else {
            return Ok(false);
        };
        stream
            .write_all(data)
            .map_err(|e| StorageError::io(path, e))?;
        stream.close().map_err(|e| StorageError::io(path, e))?;
        Ok(true)
    }

    /// Path of the entry on the local filesystem, if it has one.
    fn local_file(&self, _path: &str) -> Result<Option<PathBuf>, StorageError> {
        Ok(None)
    }

    /// Entity tag that changes whenever the entry changes.
    fn etag(&self, path: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .stat(path)?
            .map(|s: FileStat| format!("{:x}-{:x}", s.mtime, s.size)))
    }

    /// Stat, etag, mime type and permissions of an entry in one call.
    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let Some(stat) = self.stat(path)? else {
            return Ok(None);
        };
        Ok(Some(FileMetadata {
            stat,
            mime_type: self.mime_type(path)?.unwrap_or_default(),
            etag: self.etag(path)?.unwrap_or_default(),
            permissions: self.permissions(path)?.unwrap_or(Permissions::NONE),
        }))
    }

    /// Hex digest of a file's content.
    fn hash(&self, algorithm: HashAlgorithm, path: &str) -> Result<Option<String>, StorageError> {
        let Some(data) = self.read_all(path)? else {
            return Ok(None);
        };
        match algorithm {
            HashAlgorithm::Sha256 => Ok(Some(format!("{:x}", Sha256::digest(&data)))),
        }
    }

    /// Free bytes available below a path, None if unknown.
    fn free_space(&self, _path: &str) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }

    /// Whether the entry was modified after `since` (seconds since epoch).
    fn has_updated(&self, path: &str, since: i64) -> Result<bool, StorageError> {
        Ok(self.mtime(path)?.map(|mtime: i64| mtime > since).unwrap_or(false))
    }

    /// Check that the storage is reachable.
    fn test(&self) -> Result<bool, StorageError> {
        self.exists("")
    }

    /// Whether the storage is, wraps or contains a storage with the given
    /// capability tag.
    fn has_capability(&self, _tag: &str) -> bool {
        false
    }

    /// Whether `file_name` may be created inside `path`.
    fn verify_path(&self, _path: &str, file_name: &str) -> Result<bool, StorageError> {
        Ok(!file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(&['/', '\\', '\0'][..]))
    }

    /// Copy an entry from another storage into this one.
    ///
    /// Directories are copied recursively; file content is streamed.
    ///
    /// # Arguments
    /// * `source` - Storage to copy from
    /// * `source_path` - Path on the source storage
    /// * `target_path` - Path on this storage
    fn copy_from_storage(
        &self,
        source: &dyn Storage,
        source_path: &str,
        target_path: &str,
    ) -> Result<bool, StorageError> {
        if source.is_dir(source_path)? {
            if !self.is_dir(target_path)? && !self.mkdir(target_path)? {
                return Ok(false);
            }
            let Some(mut listing) = source.opendir(source_path)? else {
                return Ok(false);
            };
            let mut result: bool = true;
            for name in collect_entries(listing.as_mut())? {
                let copied: bool = self.copy_from_storage(
                    source,
                    &path::join(source_path, &name),
                    &path::join(target_path, &name),
                )?;
                result = result && copied;
            }
            return Ok(result);
        }

        let Some(mut reader) = source.open(source_path, OpenMode::Read)? else {
            return Ok(false);
        };
        let Some(mut writer) = self.open(target_path, OpenMode::Write)? else {
            return Ok(false);
        };
        std::io::copy(&mut reader, &mut writer).map_err(|e| StorageError::io(target_path, e))?;
        writer.close().map_err(|e| StorageError::io(target_path, e))?;
        reader.close().map_err(|e| StorageError::io(source_path, e))?;
        Ok(true)
    }

    /// Move an entry from another storage into this one.
    ///
    /// # Arguments
    /// * `source` - Storage to move from
    /// * `source_path` - Path on the source storage
    /// * `target_path` - Path on this storage
    fn move_from_storage(
        &self,
        source: &dyn Storage,
        source_path: &str,
        target_path: &str,
    ) -> Result<bool, StorageError> {
        if !self.copy_from_storage(source, source_path, target_path)? {
            return Ok(false);
        }
        if source.is_dir(source_path)? {
            source.rmdir(source_path)
        } else {
            source.unlink(source_path)
        }
    }

    /// Acquire a lock on a path.
    fn acquire_lock(&self, _path: &str, _lock_type: LockType) -> Result<(), StorageError> {
        Ok(())
    }

    /// Release a lock previously acquired on a path.
    fn release_lock(&self, _path: &str, _lock_type: LockType) -> Result<(), StorageError> {
        Ok(())
    }

    /// Convert a held lock to another lock type.
    fn change_lock(&self, _path: &str, _lock_type: LockType) -> Result<(), StorageError> {
        Ok(())
    }
}
