//! Two-tier layered storage with read-through and write-back replication.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tiercache_storage::{
    path, DirectoryListing, FileMetadata, FileStat, FileStream, HashAlgorithm, LockType, OpenMode,
    Permissions, Storage, StorageError,
};
use tracing::{debug, warn};

use crate::error::OverlayError;
use crate::layered::{ensure_parent_dirs, LayeredStorage};
use crate::queue::JobQueue;
use crate::resolver::{StorageId, TierResolver};
use crate::sync_policy::{CloseHookStream, SyncPolicy};
use crate::tee::TeeCopyStream;

/// Capability tag of every caching storage.
pub const CACHING_CAPABILITY: &str = "caching";

/// Marker in the names of cache copies still being filled.
const STAGING_MARKER: &str = ".cache-part-";

/// Suffix counter for staging paths, shared by every overlay of the process.
static NEXT_STAGING: AtomicU64 = AtomicU64::new(0);

/// Whether `name` is a cache copy still being filled.
fn is_staging_name(name: &str) -> bool {
    name.starts_with('.') && name.contains(STAGING_MARKER)
}

/// Listing that hides in-progress cache copies.
struct StagingFilter {
    inner: Box<dyn DirectoryListing>,
}

impl DirectoryListing for StagingFilter {
    fn next_entry(&mut self) -> Result<Option<String>, StorageError> {
        while let Some(name) = self.inner.next_entry()? {
            if !is_staging_name(&name) {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> Result<(), StorageError> {
        self.inner.rewind()
    }
}

/// Layered storage over a cache tier (0) and a backend tier (1).
///
/// Reads that miss the cache are served from the backend and copied into
/// the cache on the way. Writes land in the cache and are queued for
/// replication to the backend; the job carries the cache mtime so a later
/// write supersedes it.
pub struct CachingLayeredStorage {
    layered: LayeredStorage,
    cache: Arc<dyn Storage>,
    backend: Arc<dyn Storage>,
    policy: Arc<SyncPolicy>,
}

impl CachingLayeredStorage {
    /// Create a caching storage.
    ///
    /// # Arguments
    /// * `tiers` - Exactly two tiers: cache, then backend
    /// * `user_id` - Owner of the mount, recorded in every job
    /// * `queue` - Queue receiving replication jobs
    /// * `resolver` - Assigns the stable ids the jobs refer to
    pub fn new(
        tiers: Vec<Arc<dyn Storage>>,
        user_id: &str,
        queue: Arc<dyn JobQueue>,
        resolver: &dyn TierResolver,
    ) -> Result<Self, OverlayError> {
        let [cache, backend] = <[Arc<dyn Storage>; 2]>::try_from(tiers).map_err(|tiers| {
            OverlayError::InvalidConfiguration(format!(
                "a caching storage needs exactly 2 tiers, got {}",
                tiers.len()
            ))
        })?;

        let cache_id: StorageId = resolver.register(user_id, cache.clone());
        let backend_id: StorageId = resolver.register(user_id, backend.clone());
        let policy = Arc::new(SyncPolicy::new(
            user_id,
            cache_id,
            backend_id,
            cache.clone(),
            queue,
        ));
        let layered = LayeredStorage::new(vec![cache.clone(), backend.clone()])?;

        Ok(Self {
            layered,
            cache,
            backend,
            policy,
        })
    }

    /// Stable id of the storage this overlay represents: the backend's.
    pub fn stable_id(&self) -> StorageId {
        self.policy.backend_id()
    }

    pub fn cache(&self) -> &Arc<dyn Storage> {
        &self.cache
    }

    pub fn backend(&self) -> &Arc<dyn Storage> {
        &self.backend
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Queue replication of `path` if `changed`, passing `changed` through.
    ///
    /// The operation already took effect on the cache tier, so a queue
    /// failure is logged rather than reported as a failed operation.
    fn schedule_if(&self, changed: bool, path: &str) -> bool {
        if changed {
            if let Err(e) = self.policy.schedule(path) {
                warn!("Failed to queue replication of {}: {}", path, e);
            }
        }
        changed
    }

    /// Hidden sibling of `path` a cache copy is written to before it is
    /// renamed into place.
    fn staging_path(path: &str) -> String {
        let sequence: u64 = NEXT_STAGING.fetch_add(1, Ordering::Relaxed);
        let name: String = format!(
            ".{}{}{}-{}",
            path::file_name(path),
            STAGING_MARKER,
            std::process::id(),
            sequence
        );
        path::join(&path::parent(path).unwrap_or_default(), &name)
    }

    /// Copy a backend file into the cache tier.
    ///
    /// The copy becomes visible at `path` only once it is complete.
    fn populate(&self, path: &str) -> Result<bool, StorageError> {
        if !self.backend.is_file(path)? {
            return Ok(false);
        }
        ensure_parent_dirs(self.cache.as_ref(), path)?;
        let staging: String = Self::staging_path(path);
        let copied: Result<bool, StorageError> =
            match self
                .cache
                .copy_from_storage(self.backend.as_ref(), path, &staging)
            {
                Ok(true) => self.cache.rename(&staging, path),
                other => other,
            };
        match copied {
            Ok(true) => debug!("Read-through of {} populated the cache", path),
            _ => discard_staging(self.cache.as_ref(), &staging),
        }
        copied
    }

    /// Open a backend file for reading, mirroring it into the cache tier.
    fn open_read_through(&self, path: &str) -> Result<Option<Box<dyn FileStream>>, StorageError> {
        let Some(source) = self.backend.open(path, OpenMode::Read)? else {
            return Ok(None);
        };
        ensure_parent_dirs(self.cache.as_ref(), path)?;
        let staging: String = Self::staging_path(path);
        let Some(target) = self.cache.open(&staging, OpenMode::Write)? else {
            return Ok(Some(source));
        };

        let cache: Arc<dyn Storage> = self.cache.clone();
        let cached_path: String = path.to_string();
        let tee = TeeCopyStream::new(source, target, move |success: bool| {
            if success {
                match cache.rename(&staging, &cached_path) {
                    Ok(true) => {
                        debug!("Cached {} while reading", cached_path);
                        return;
                    }
                    Ok(false) => warn!("Cache copy of {} vanished before rename", cached_path),
                    Err(e) => warn!("Failed to move cache copy of {} into place: {}", cached_path, e),
                }
            } else {
                debug!("Dropping partial cache copy of {}", cached_path);
            }
            discard_staging(cache.as_ref(), &staging);
        })?;
        Ok(Some(Box::new(tee)))
    }
}

/// Best-effort removal of an unfinished cache copy.
fn discard_staging(cache: &dyn Storage, staging: &str) {
    if let Err(e) = cache.unlink(staging) {
        warn!("Failed to delete partial cache copy {}: {}", staging, e);
    }
}

impl Storage for CachingLayeredStorage {
    fn id(&self) -> String {
        self.backend.id()
    }

    fn mkdir(&self, path: &str) -> Result<bool, StorageError> {
        self.layered.mkdir(path)
    }

    fn rmdir(&self, path: &str) -> Result<bool, StorageError> {
        self.layered.rmdir(path)
    }

    fn opendir(&self, path: &str) -> Result<Option<Box<dyn DirectoryListing>>, StorageError> {
        Ok(self.layered.opendir(path)?.map(|inner: Box<dyn DirectoryListing>| {
            Box::new(StagingFilter { inner }) as Box<dyn DirectoryListing>
        }))
    }

    fn stat(&self, path: &str) -> Result<Option<FileStat>, StorageError> {
        self.layered.stat(path)
    }

    /// Open a stream.
    ///
    /// A plain read of a file the cache lacks streams from the backend and
    /// keeps the cache copy only if the caller reads it to the end. Write
    /// streams queue replication when closed.
    fn open(
        &self,
        path: &str,
        mode: OpenMode,
    ) -> Result<Option<Box<dyn FileStream>>, StorageError> {
        if mode.is_read() {
            if mode == OpenMode::Read && !self.cache.exists(path)? {
                return self.open_read_through(path);
            }
            return self.layered.open(path, mode);
        }

        let stream: Option<Box<dyn FileStream>> = self.layered.open(path, mode)?;
        Ok(stream.map(|inner: Box<dyn FileStream>| {
            Box::new(CloseHookStream::new(inner, path, self.policy.clone())) as Box<dyn FileStream>
        }))
    }

    fn unlink(&self, path: &str) -> Result<bool, StorageError> {
        self.layered.unlink(path)
    }

    fn rename(&self, source: &str, target: &str) -> Result<bool, StorageError> {
        let renamed: bool = self.layered.rename(source, target)?;
        let needed: bool =
            renamed && self.policy.should_schedule_rename(self.backend.as_ref(), target)?;
        self.schedule_if(needed, target);
        Ok(renamed)
    }

    fn copy(&self, source: &str, target: &str) -> Result<bool, StorageError> {
        let copied: bool = self.layered.copy(source, target)?;
        Ok(self.schedule_if(copied, target))
    }

    fn touch(&self, path: &str, mtime: Option<i64>) -> Result<bool, StorageError> {
        self.layered.touch(path, mtime)
    }

    fn is_local(&self) -> bool {
        self.layered.is_local()
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        self.layered.exists(path)
    }

    fn is_dir(&self, path: &str) -> Result<bool, StorageError> {
        self.layered.is_dir(path)
    }

    fn is_file(&self, path: &str) -> Result<bool, StorageError> {
        self.layered.is_file(path)
    }

    fn mtime(&self, path: &str) -> Result<Option<i64>, StorageError> {
        self.layered.mtime(path)
    }

    fn permissions(&self, path: &str) -> Result<Option<Permissions>, StorageError> {
        self.layered.permissions(path)
    }

    fn mime_type(&self, path: &str) -> Result<Option<String>, StorageError> {
        self.layered.mime_type(path)
    }

    /// Read a whole file, copying it into the cache first if needed.
    fn read_all(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if !self.cache.exists(path)? {
            self.populate(path)?;
        }
        self.cache.read_all(path)
    }

    fn write_all(&self, path: &str, data: &[u8]) -> Result<bool, StorageError> {
        let written: bool = self.layered.write_all(path, data)?;
        Ok(self.schedule_if(written, path))
    }

    fn local_file(&self, path: &str) -> Result<Option<PathBuf>, StorageError> {
        self.layered.local_file(path)
    }

    fn etag(&self, path: &str) -> Result<Option<String>, StorageError> {
        self.layered.etag(path)
    }

    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        self.layered.metadata(path)
    }

    fn hash(&self, algorithm: HashAlgorithm, path: &str) -> Result<Option<String>, StorageError> {
        self.layered.hash(algorithm, path)
    }

    fn free_space(&self, path: &str) -> Result<Option<u64>, StorageError> {
        self.layered.free_space(path)
    }

    fn has_updated(&self, path: &str, since: i64) -> Result<bool, StorageError> {
        self.layered.has_updated(path, since)
    }

    fn test(&self) -> Result<bool, StorageError> {
        self.layered.test()
    }

    fn has_capability(&self, tag: &str) -> bool {
        tag == CACHING_CAPABILITY || self.layered.has_capability(tag)
    }

    fn verify_path(&self, path: &str, file_name: &str) -> Result<bool, StorageError> {
        self.layered.verify_path(path, file_name)
    }

    fn copy_from_storage(
        &self,
        source: &dyn Storage,
        source_path: &str,
        target_path: &str,
    ) -> Result<bool, StorageError> {
        let copied: bool = self
            .layered
            .copy_from_storage(source, source_path, target_path)?;
        Ok(self.schedule_if(copied, target_path))
    }

    fn move_from_storage(
        &self,
        source: &dyn Storage,
        source_path: &str,
        target_path: &str,
    ) -> Result<bool, StorageError> {
        let moved: bool = self
            .layered
            .move_from_storage(source, source_path, target_path)?;
        Ok(self.schedule_if(moved, target_path))
    }

    fn acquire_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        self.layered.acquire_lock(path, lock_type)
    }

    fn release_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        self.layered.release_lock(path, lock_type)
    }

    fn change_lock(&self, path: &str, lock_type: LockType) -> Result<(), StorageError> {
        self.layered.change_lock(path, lock_type)
    }
}
