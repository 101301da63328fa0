//! Layered storage overlay for tiercache.
//!
//! Composes several storages into one and turns a fast local tier into a
//! cache in front of a slow remote one:
//!
//! - **`LayeredStorage`** - N tiers behind one `Storage`, each operation
//!   routed by a fixed table (read nearest, write tier 0, delete everywhere)
//! - **`CachingLayeredStorage`** - two tiers with read-through population and
//!   write-back replication jobs
//! - **`ReplicationJob`** - serializable unit of replication work, fenced by
//!   the cache mtime captured when it was scheduled
//! - **`Evictor`** - keeps the newest cached files within a size budget
//! - **`CacheManager`** - decides which mounts get a cache tier
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tiercache_overlay::{CacheManager, CacheOptions, MemoryJobQueue, MountPoint, MountRegistry};
//!
//! let queue = Arc::new(MemoryJobQueue::new());
//! let registry = Arc::new(MountRegistry::new());
//! let manager = CacheManager::new(CacheOptions::default(), queue.clone(), registry.clone());
//!
//! let storage = manager.apply_cache_wrapper(&MountPoint::new("/alice/files/ext"), remote)?;
//! storage.write_all("report.txt", b"draft")?;
//! queue.run_pending(registry.as_ref(), manager.options().cache_size_limit)?;
//! ```

mod caching;
mod error;
mod evictor;
mod layered;
mod manager;
mod merged_dir;
mod options;
mod queue;
mod replication;
mod resolver;
mod routing;
mod sync_policy;
mod tee;

pub use caching::{CachingLayeredStorage, CACHING_CAPABILITY};
pub use error::OverlayError;
pub use evictor::{select_for_eviction, Evictor, FileRecord};
pub use layered::{ensure_parent_dirs, LayeredStorage, LAYERED_CAPABILITY};
pub use manager::{CacheManager, MountPoint};
pub use merged_dir::MergedDirectory;
pub use options::{CacheOptions, CACHE_FOLDER_NAME, DEFAULT_CACHE_SIZE_LIMIT};
pub use queue::{JobQueue, MemoryJobQueue};
pub use replication::{JobOutcome, ReplicationJob};
pub use resolver::{MountRegistry, StorageId, TierResolver};
pub use routing::{Operation, Route};
pub use sync_policy::{CloseHookStream, SyncPolicy};
pub use tee::{CompletionCallback, TeeCopyStream};
