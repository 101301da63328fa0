//! N-tier storage presented as one storage.

use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tiercache_storage::{
    path, DirectoryListing, FileMetadata, FileStat, FileStream, HashAlgorithm, LockType,
    OpenMode, Permissions, Storage, StorageError,
};
use tracing::{debug, warn};

use crate::error::OverlayError;
use crate::merged_dir::MergedDirectory;
use crate::routing::{Operation, Route};

/// Capability tag of every layered storage.
pub const LAYERED_CAPABILITY: &str = "layered";

/// Create every missing ancestor directory of `path` on `storage`.
///
/// # Arguments
/// * `storage` - Storage to create directories on
/// * `path` - File or directory path whose parents must exist
pub fn ensure_parent_dirs(storage: &dyn Storage, path: &str) -> Result<(), StorageError> {
    for dir in path::ancestors(path) {
        if !storage.is_dir(&dir)? && !storage.mkdir(&dir)? {
            debug!("Could not create {} on {}", dir, storage.id());
        }
    }
    Ok(())
}

/// Ordered list of storages acting as one.
///
/// Tier 0 is the fastest and most preferred; higher tiers are slower and
/// more authoritative. Each operation is dispatched by its [`Route`]:
///
/// ```text
/// read   ──► first tier holding the path (tier 0 → tier N-1)
/// write  ──► tier 0, parents created on demand
/// delete ──► every tier, results ANDed
/// list   ──► every tier, merged and deduplicated
/// ```
pub struct LayeredStorage {
    tiers: Vec<Arc<dyn Storage>>,
}

impl LayeredStorage {
    /// Compose storages, fastest first.
    ///
    /// # Arguments
    /// * `tiers` - Non-empty list of tiers
    pub fn new(tiers: Vec<Arc<dyn Storage>>) -> Result<Self, OverlayError> {
        if tiers.is_empty() {
            return Err(OverlayError::InvalidConfiguration(
                "a layered storage needs at least one tier".to_string(),
            ));
        }
        Ok(Self { tiers })
    }

    /// Tiers in priority order.
    pub fn tiers(&self) -> &[Arc<dyn Storage>] {
        &self.tiers
    }

    /// Index of the first tier where `path` exists.
    pub fn tier_for_path(&self, path: &str) -> Result<Option<usize>, StorageError> {
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.exists(path)? {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    fn nearest(&self) -> &dyn Storage {
        self.tiers[0].as_ref()
    }

    fn farthest(&self) -> &dyn Storage {
        self.tiers[self.tiers.len() - 1].as_ref()
    }

    fn first_match(&self, path: &str) -> Result<Option<&dyn Storage>, StorageError> {
        Ok(self
            .tier_for_path(path)?
            .map(|index: usize| self.tiers[index].as_ref()))
    }

    /// Run a boolean operation on the tiers its route selects.
    ///
    /// # Arguments
    /// * `operation` - Operation kind, selects the route
    /// * `path` - Path used to pick tiers for path-dependent routes
    /// * `run` - Operation applied to one tier
    fn dispatch_bool(
        &self,
        operation: Operation,
        path: &str,
        run: impl Fn(&dyn Storage) -> Result<bool, StorageError>,
    ) -> Result<bool, StorageError> {
        match operation.route() {
            Route::FirstMatch => match self.first_match(path)? {
                Some(tier) => run(tier),
                None => Ok(false),
            },
            Route::AllTiers => {
                let mut result: bool = true;
                for tier in &self.tiers {
                    let tier_result: bool = run(tier.as_ref())?;
                    if !tier_result {
                        debug!("{:?} of {} failed on {}", operation, path, tier.id());
                    }
                    result = result && tier_result;
                }
                Ok(result)
            }
            Route::AnyTier => {
                for tier in &self.tiers {
                    if run(tier.as_ref())? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Route::TiersWithPath => {
                let mut matched: bool = false;
                let mut result: bool = true;
                for tier in &self.tiers {
                    if tier.exists(path)? {
                        matched = true;
                        result = run(tier.as_ref())? && result;
                    }
                }
                if matched && !result {
                    warn!("{:?} of {} failed on some tiers", operation, path);
                }
                Ok(matched && result)
            }
            Route::TierZero => run(self.nearest()),
            Route::LastTier => run(self.farthest()),
            Route::Merged => Err(StorageError::InvalidArgument(format!(
                "{:?} does not produce a boolean",
                operation
            ))),
        }
    }

    /// Run a value-returning operation on the tier its route selects.
    fn dispatch<T>(
        &self,
        operation: Operation,
        path: &str,
        run: impl FnOnce(&dyn Storage) -> Result<Option<T>, StorageError>,
    ) -> Result<Option<T>, StorageError> {
        match operation.route() {
            Route::FirstMatch => match self.first_match(path)? {
                Some(tier) => run(tier),
                None => Ok(None),
            },
            Route::TierZero => run(self.nearest()),
            Route::LastTier => run(self.farthest()),
            route => Err(StorageError::InvalidArgument(format!(
                "{:?} cannot be routed as {:?}",
                operation, route
            ))),
        }
    }

    /// Run a lock operation on every tier, in order.
    fn dispatch_lock(
        &self,
        run: impl Fn(&dyn Storage) -> Result<(), StorageError>,
    ) -> Result<(), StorageError> {
        debug_assert_eq!(Operation::Lock.route(), Route::AllTiers);
        for tier in &self.tiers {
            run(tier.as_ref())?;
        }
        Ok(())
    }
}

impl Storage for LayeredStorage {
    fn id(&self) -> String {
        let ids: Vec<String> = self.tiers.iter().map(|tier| tier.id()).collect();
        format!("layered::{:x}", Sha256::digest(ids.join("+").as_bytes()))
    }

    fn mkdir(&self, path: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::MakeDirectory, path, |tier| {
            ensure_parent_dirs(tier, path)?;
            tier.mkdir(path)
        })
    }

    fn rmdir(&self, path: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::RemoveDirectory, path, |tier| tier.rmdir(path))
    }

    /// Merged listing of every tier holding the directory, None if none does.
    fn opendir(&self, path: &str) -> Result<Option<Box<dyn DirectoryListing>>, StorageError> {
        debug_assert_eq!(Operation::ListDirectory.route(), Route::Merged);
        let mut listings: Vec<Box<dyn DirectoryListing>> = Vec::new();
        for tier in &self.tiers {
            if let Some(listing) = tier.opendir(path)? {
                listings.push(listing);
            }
        }
        if listings.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(MergedDirectory::new(listings))))
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, StorageError> {
        self.dispatch(Operation::Stat, path, |tier| tier.stat(path))
    }

    fn open(
        &self,
        path: &str,
        mode: OpenMode,
    ) -> Result<Option<Box<dyn FileStream>>, StorageError> {
        if mode.is_read() {
            return self.dispatch(Operation::OpenRead, path, |tier| tier.open(path, mode));
        }
        self.dispatch(Operation::OpenWrite, path, |tier| {
            ensure_parent_dirs(tier, path)?;
            tier.open(path, mode)
        })
    }

    fn unlink(&self, path: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::Delete, path, |tier| tier.unlink(path))
    }

    fn rename(&self, source: &str, target: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::Rename, source, |tier| {
            ensure_parent_dirs(tier, target)?;
            tier.rename(source, target)
        })
    }

    fn copy(&self, source: &str, target: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::Copy, source, |tier| {
            ensure_parent_dirs(tier, target)?;
            tier.copy(source, target)
        })
    }

    fn touch(&self, path: &str, mtime: Option<i64>) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::Touch, path, |tier| {
            ensure_parent_dirs(tier, path)?;
            tier.touch(path, mtime)
        })
    }

    fn is_local(&self) -> bool {
        self.dispatch_bool(Operation::IsLocal, "", |tier| Ok(tier.is_local()))
            .unwrap_or(false)
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::Exists, path, |_| Ok(true))
    }

    fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::IsDir, path, |tier| tier.is_dir(path))
    }

    fn is_file(&self, path: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::IsFile, path, |tier| tier.is_file(path))
    }

    fn mtime(&self, path: &str) -> Result<Option<i64>, StorageError> {
        self.dispatch(Operation::Mtime, path, |tier| tier.mtime(path))
    }

    fn permissions(&self, path: &str) -> Result<Option<Permissions>, StorageError> {
        self.dispatch(Operation::Permissions, path, |tier| tier.permissions(path))
    }

    fn mime_type(&self, path: &str) -> Result<Option<String>, StorageError> {
        self.dispatch(Operation::MimeType, path, |tier| tier.mime_type(path))
    }

    fn read_all(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.dispatch(Operation::ReadAll, path, |tier| tier.read_all(path))
    }

    fn write_all(&self, path: &str, data: &[u8]) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::WriteAll, path, |tier| {
            ensure_parent_dirs(tier, path)?;
            tier.write_all(path, data)
        })
    }

    fn local_file(&self, path: &str) -> Result<Option<PathBuf>, StorageError> {
        self.dispatch(Operation::LocalFile, path, |tier| tier.local_file(path))
    }

    fn etag(&self, path: &str) -> Result<Option<String>, StorageError> {
        self.dispatch(Operation::ETag, path, |tier| tier.etag(path))
    }

    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        self.dispatch(Operation::Metadata, path, |tier| tier.metadata(path))
    }

    fn hash(&self, algorithm: HashAlgorithm, path: &str) -> Result<Option<String>, StorageError> {
        self.dispatch(Operation::Hash, path, |tier| tier.hash(algorithm, path))
    }

    fn free_space(&self, path: &str) -> Result<Option<u64>, StorageError> {
        self.dispatch(Operation::FreeSpace, path, |tier| tier.free_space(path))
    }

    fn has_updated(&self, path: &str, since: i64) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::HasUpdated, path, |tier| {
            tier.has_updated(path, since)
        })
    }

    fn test(&self) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::SelfTest, "", |tier| tier.test())
    }

    fn has_capability(&self, tag: &str) -> bool {
        tag == LAYERED_CAPABILITY || self.tiers.iter().any(|tier| tier.has_capability(tag))
    }

    fn verify_path(&self, path: &str, file_name: &str) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::VerifyPath, path, |tier| {
            tier.verify_path(path, file_name)
        })
    }

    fn copy_from_storage(
        &self,
        source: &dyn Storage,
        source_path: &str,
        target_path: &str,
    ) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::CopyFromStorage, target_path, |tier| {
            ensure_parent_dirs(tier, target_path)?;
            tier.copy_from_storage(source, source_path, target_path)
        })
    }

    fn move_from_storage(
        &self,
        source: &dyn Storage,
        source_path: &str,
        target_path: &str,
    ) -> Result<bool, StorageError> {
        self.dispatch_bool(Operation::MoveFromStorage, target_path, |tier| {
            ensure_parent_dirs(tier, target_path)?;
            tier.move_from_storage(source, source_path, target_path)
        })
    }

    fn acquire_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        self.dispatch_lock(|tier| tier.acquire_lock(path, lock_type))
    }

    fn release_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        self.dispatch_lock(|tier| tier.release_lock(path, lock_type))
    }

    fn change_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        self.dispatch_lock(|tier| tier.change_lock(path, lock_type))
    }
}
