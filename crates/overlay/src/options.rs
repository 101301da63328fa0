//! Configuration for the cache overlay.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default cache tier size budget (1 GiB).
pub const DEFAULT_CACHE_SIZE_LIMIT: u64 = 1024 * 1024 * 1024;

/// Name of the per-user directory holding cache tiers.
pub const CACHE_FOLDER_NAME: &str = "files_external_cache";

/// Options for the cache overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Data directory under which per-user cache tiers are created.
    pub data_dir: PathBuf,
    /// Size budget for one cache tier in bytes, applied after replication.
    pub cache_size_limit: u64,
    /// Whether remote mounts get a cache tier at all.
    pub enabled: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/tmp/tiercache/data"),
            cache_size_limit: DEFAULT_CACHE_SIZE_LIMIT,
            enabled: true,
        }
    }
}

impl CacheOptions {
    /// Create options with a custom data directory.
    ///
    /// # Arguments
    /// * `data_dir` - Data directory for cache tiers
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Directory of the cache tier for one user and backend.
    ///
    /// # Arguments
    /// * `user_id` - Owner of the mount
    /// * `backend_hash` - Hex digest of the backend storage id
    pub fn cache_dir(&self, user_id: &str, backend_hash: &str) -> PathBuf {
        self.data_dir
            .join(user_id)
            .join(CACHE_FOLDER_NAME)
            .join(backend_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CacheOptions::default();
        assert_eq!(options.cache_size_limit, DEFAULT_CACHE_SIZE_LIMIT);
        assert!(options.enabled);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let options: CacheOptions =
            serde_json::from_str(r#"{"data_dir": "/srv/data", "enabled": false}"#).unwrap();

        assert_eq!(options.data_dir, PathBuf::from("/srv/data"));
        assert!(!options.enabled);
        assert_eq!(options.cache_size_limit, DEFAULT_CACHE_SIZE_LIMIT);
    }

    #[test]
    fn test_cache_dir_layout() {
        let options = CacheOptions::with_data_dir(PathBuf::from("/srv/data"));
        assert_eq!(
            options.cache_dir("alice", "abc123"),
            PathBuf::from("/srv/data/alice/files_external_cache/abc123")
        );
    }
}
