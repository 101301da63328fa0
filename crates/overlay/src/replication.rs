//! Replication of one cached path to its backend tier.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tiercache_storage::{Storage, StorageError};
use tracing::debug;

use crate::error::OverlayError;
use crate::evictor::Evictor;
use crate::layered::ensure_parent_dirs;
use crate::resolver::{StorageId, TierResolver};

/// Result of running a replication job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// The path was copied to the target; `evicted` files were then trimmed
    /// from the source.
    Replicated { evicted: usize },
    /// The source changed after the job was scheduled; a later job owns it.
    Superseded,
    /// The source no longer has the path.
    SourceMissing,
    /// One of the tiers no longer resolves for the user.
    MountMissing,
}

/// Copies one path from the cache tier to the backend tier.
///
/// Jobs hold only ids and plain values so they can be queued as messages
/// and run later in another process. The captured mtime fences the job:
/// if the source was modified after scheduling, the job does nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationJob {
    user_id: String,
    source_storage_id: StorageId,
    target_storage_id: StorageId,
    path: String,
    mtime: i64,
}

impl ReplicationJob {
    /// Create a job.
    ///
    /// # Arguments
    /// * `user_id` - Owner of the mount
    /// * `source_storage_id` - Id of the cache tier
    /// * `target_storage_id` - Id of the backend tier
    /// * `path` - Path to replicate
    /// * `mtime` - Source mtime when the job was scheduled
    pub fn new(
        user_id: impl Into<String>,
        source_storage_id: StorageId,
        target_storage_id: StorageId,
        path: impl Into<String>,
        mtime: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            source_storage_id,
            target_storage_id,
            path: path.into(),
            mtime,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn source_storage_id(&self) -> StorageId {
        self.source_storage_id
    }

    pub fn target_storage_id(&self) -> StorageId {
        self.target_storage_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Source mtime captured at scheduling time.
    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    /// Serialize to the JSON message form.
    pub fn to_json(&self) -> Result<String, OverlayError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON message form.
    pub fn from_json(json: &str) -> Result<Self, OverlayError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Run the job.
    ///
    /// # Arguments
    /// * `resolver` - Resolves both tier ids to live storages
    /// * `size_limit` - Budget for the source tier after replication
    ///
    /// # Returns
    /// What the job did. Storage errors are returned to the runner, which
    /// owns retries; running a job again is safe.
    pub fn execute(
        &self,
        resolver: &dyn TierResolver,
        size_limit: u64,
    ) -> Result<JobOutcome, OverlayError> {
        let outcome: JobOutcome = self.run(resolver, size_limit)?;
        debug!(
            "Replication of {} for {}: {:?}",
            self.path, self.user_id, outcome
        );
        Ok(outcome)
    }

    fn run(&self, resolver: &dyn TierResolver, size_limit: u64) -> Result<JobOutcome, OverlayError> {
        let source: Option<Arc<dyn Storage>> = resolver
            .resolve(&self.user_id, self.source_storage_id)
            .into_iter()
            .next();
        let target: Option<Arc<dyn Storage>> = resolver
            .resolve(&self.user_id, self.target_storage_id)
            .into_iter()
            .next();
        let (Some(source), Some(target)) = (source, target) else {
            return Ok(JobOutcome::MountMissing);
        };

        let Some(current) = source.mtime(&self.path)? else {
            return Ok(JobOutcome::SourceMissing);
        };
        if current > self.mtime {
            return Ok(JobOutcome::Superseded);
        }

        ensure_parent_dirs(target.as_ref(), &self.path)?;
        if !target.copy_from_storage(source.as_ref(), &self.path, &self.path)? {
            return Err(StorageError::Other(format!(
                "failed to copy {} to {}",
                self.path,
                target.id()
            ))
            .into());
        }

        let evicted: usize = Evictor::new(source, size_limit).evict()?;
        Ok(JobOutcome::Replicated { evicted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_message_form() {
        let job = ReplicationJob::new("alice", 1, 2, "docs/a.txt", 1_700_000_000);
        let json: String = job.to_json().unwrap();

        assert!(json.contains("\"path\":\"docs/a.txt\""));
        assert_eq!(ReplicationJob::from_json(&json).unwrap(), job);
    }

    #[test]
    fn test_invalid_message() {
        let result = ReplicationJob::from_json("{\"path\": 3}");
        assert!(matches!(result, Err(OverlayError::Serialization(_))));
    }
}
