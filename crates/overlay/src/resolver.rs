//! Resolution of stable tier identifiers back to live storages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tiercache_storage::Storage;

/// Stable numeric identifier of a storage tier.
pub type StorageId = u64;

/// Maps storages to stable numeric ids and back, per user.
///
/// Replication jobs carry only ids; the resolver turns them into live
/// storages when the job runs, possibly long after it was scheduled.
pub trait TierResolver: Send + Sync {
    /// Stable id of a storage, making it resolvable for `user_id`.
    ///
    /// The same storage id string always maps to the same numeric id.
    ///
    /// # Arguments
    /// * `user_id` - User the storage is mounted for
    /// * `storage` - Storage to register
    fn register(&self, user_id: &str, storage: Arc<dyn Storage>) -> StorageId;

    /// Live storages bound to `id` for `user_id`.
    ///
    /// An empty result means the mount no longer applies.
    fn resolve(&self, user_id: &str, id: StorageId) -> Vec<Arc<dyn Storage>>;
}

/// In-process resolver backed by a mount table.
#[derive(Default)]
pub struct MountRegistry {
    /// Storage id string to numeric id.
    ids: RwLock<HashMap<String, StorageId>>,
    next_id: AtomicU64,
    /// (user, numeric id) to mounted storages.
    mounts: RwLock<HashMap<(String, StorageId), Vec<Arc<dyn Storage>>>>,
}

impl MountRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Numeric id previously assigned to a storage id string.
    ///
    /// # Arguments
    /// * `storage_id` - Value of `Storage::id()`
    pub fn numeric_id(&self, storage_id: &str) -> Option<StorageId> {
        self.ids.read().get(storage_id).copied()
    }

    /// Forget every storage mounted for `user_id` under `id`.
    ///
    /// # Returns
    /// Whether anything was mounted.
    pub fn unmount(&self, user_id: &str, id: StorageId) -> bool {
        self.mounts
            .write()
            .remove(&(user_id.to_string(), id))
            .is_some()
    }

    fn assign_id(&self, storage_id: String) -> StorageId {
        if let Some(id) = self.ids.read().get(&storage_id) {
            return *id;
        }
        *self
            .ids
            .write()
            .entry(storage_id)
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

impl TierResolver for MountRegistry {
    fn register(&self, user_id: &str, storage: Arc<dyn Storage>) -> StorageId {
        let storage_id: String = storage.id();
        let id: StorageId = self.assign_id(storage_id.clone());

        let mut mounts = self.mounts.write();
        let entry: &mut Vec<Arc<dyn Storage>> =
            mounts.entry((user_id.to_string(), id)).or_default();
        if !entry.iter().any(|s| s.id() == storage_id) {
            entry.push(storage);
        }
        id
    }

    fn resolve(&self, user_id: &str, id: StorageId) -> Vec<Arc<dyn Storage>> {
        self.mounts
            .read()
            .get(&(user_id.to_string(), id))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tiercache_storage::LocalStorage;

    fn storage(dir: &TempDir, name: &str) -> Arc<dyn Storage> {
        Arc::new(LocalStorage::new(dir.path().join(name)).unwrap())
    }

    #[test]
    fn test_register_assigns_stable_ids() {
        let dir = TempDir::new().unwrap();
        let registry = MountRegistry::new();
        let a: Arc<dyn Storage> = storage(&dir, "a");
        let b: Arc<dyn Storage> = storage(&dir, "b");

        let id_a: StorageId = registry.register("alice", a.clone());
        let id_b: StorageId = registry.register("alice", b);
        assert_ne!(id_a, id_b);
        assert_eq!(registry.register("bob", a.clone()), id_a);
        assert_eq!(registry.numeric_id(&a.id()), Some(id_a));
    }

    #[test]
    fn test_resolve_is_per_user() {
        let dir = TempDir::new().unwrap();
        let registry = MountRegistry::new();
        let id: StorageId = registry.register("alice", storage(&dir, "a"));

        assert_eq!(registry.resolve("alice", id).len(), 1);
        assert!(registry.resolve("bob", id).is_empty());
    }

    #[test]
    fn test_register_twice_resolves_once() {
        let dir = TempDir::new().unwrap();
        let registry = MountRegistry::new();
        let a: Arc<dyn Storage> = storage(&dir, "a");

        let id: StorageId = registry.register("alice", a.clone());
        registry.register("alice", a);
        assert_eq!(registry.resolve("alice", id).len(), 1);
    }

    #[test]
    fn test_unmount() {
        let dir = TempDir::new().unwrap();
        let registry = MountRegistry::new();
        let id: StorageId = registry.register("alice", storage(&dir, "a"));

        assert!(registry.unmount("alice", id));
        assert!(registry.resolve("alice", id).is_empty());
        assert!(!registry.unmount("alice", id));
    }
}
