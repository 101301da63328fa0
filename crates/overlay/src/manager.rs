//! Host registration point: wraps remote mounts with a local cache tier.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tiercache_storage::{LocalStorage, Storage};
use tracing::debug;

use crate::caching::CachingLayeredStorage;
use crate::error::OverlayError;
use crate::options::CacheOptions;
use crate::queue::JobQueue;
use crate::resolver::TierResolver;

/// Where a storage is mounted in the host namespace, e.g. `/alice/files/ext`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MountPoint(String);

impl MountPoint {
    pub fn new(mount_point: impl Into<String>) -> Self {
        Self(mount_point.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Owner of the mount: the first path segment of a user mount.
    ///
    /// `/alice/files/ext` belongs to `alice`; `/alice` and `/` are not user
    /// mounts.
    pub fn user_id(&self) -> Option<&str> {
        let parts: Vec<&str> = self.0.split('/').collect();
        if parts.len() <= 2 {
            return None;
        }
        Some(parts[1]).filter(|user: &&str| !user.is_empty())
    }
}

/// Decides which mounts get a cache tier and builds the caching storages.
pub struct CacheManager {
    options: CacheOptions,
    queue: Arc<dyn JobQueue>,
    resolver: Arc<dyn TierResolver>,
    /// Cache tiers by directory, shared by every wrapper of the same backend.
    cache_storages: Mutex<HashMap<PathBuf, Arc<dyn Storage>>>,
}

impl CacheManager {
    /// Create a manager.
    ///
    /// # Arguments
    /// * `options` - Cache options
    /// * `queue` - Queue receiving replication jobs of every wrapped mount
    /// * `resolver` - Resolver the job runner uses to find the tiers again
    pub fn new(
        options: CacheOptions,
        queue: Arc<dyn JobQueue>,
        resolver: Arc<dyn TierResolver>,
    ) -> Self {
        Self {
            options,
            queue,
            resolver,
            cache_storages: Mutex::new(HashMap::new()),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    pub fn resolver(&self) -> &Arc<dyn TierResolver> {
        &self.resolver
    }

    /// Whether `storage` mounted at `mount` gets a cache tier.
    ///
    /// Only remote storages mounted for a user are cached.
    pub fn should_apply_cache(&self, mount: &MountPoint, storage: &dyn Storage) -> bool {
        self.options.enabled && mount.user_id().is_some() && !storage.is_local()
    }

    /// Cache tier for a backend, created on first use.
    ///
    /// # Arguments
    /// * `backend` - Backend the cache tier fronts
    /// * `user_id` - Owner of the mount
    pub fn cache_storage(
        &self,
        backend: &dyn Storage,
        user_id: &str,
    ) -> Result<Arc<dyn Storage>, OverlayError> {
        let backend_hash: String = format!("{:x}", Sha256::digest(backend.id().as_bytes()));
        let cache_dir: PathBuf = self.options.cache_dir(user_id, &backend_hash);

        let mut storages = self.cache_storages.lock();
        if let Some(storage) = storages.get(&cache_dir) {
            return Ok(storage.clone());
        }
        debug!("Creating cache tier at {}", cache_dir.display());
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(cache_dir.clone())?);
        storages.insert(cache_dir, storage.clone());
        Ok(storage)
    }

    /// Wrap `storage` in a caching storage if it should be cached.
    ///
    /// # Arguments
    /// * `mount` - Where the storage is mounted
    /// * `storage` - Storage being mounted
    ///
    /// # Returns
    /// The caching storage, or `storage` itself when it is not cached.
    pub fn apply_cache_wrapper(
        &self,
        mount: &MountPoint,
        storage: Arc<dyn Storage>,
    ) -> Result<Arc<dyn Storage>, OverlayError> {
        let Some(user_id) = mount.user_id() else {
            return Ok(storage);
        };
        if !self.should_apply_cache(mount, storage.as_ref()) {
            return Ok(storage);
        }

        let cache: Arc<dyn Storage> = self.cache_storage(storage.as_ref(), user_id)?;
        debug!("Caching {} mounted at {}", storage.id(), mount.as_str());
        let caching = CachingLayeredStorage::new(
            vec![cache, storage],
            user_id,
            self.queue.clone(),
            self.resolver.as_ref(),
        )?;
        Ok(Arc::new(caching))
    }
}
