//! Decides when a cache tier change is replicated to the backend tier.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use tiercache_storage::{FileStream, Storage, StorageError};
use tracing::{debug, warn};

use crate::error::OverlayError;
use crate::queue::JobQueue;
use crate::replication::ReplicationJob;
use crate::resolver::StorageId;

/// Schedules replication jobs for paths changed in a cache tier.
pub struct SyncPolicy {
    user_id: String,
    cache_id: StorageId,
    backend_id: StorageId,
    cache: Arc<dyn Storage>,
    queue: Arc<dyn JobQueue>,
}

impl SyncPolicy {
    /// Create a policy.
    ///
    /// # Arguments
    /// * `user_id` - Owner of the mount
    /// * `cache_id` - Stable id of the cache tier
    /// * `backend_id` - Stable id of the backend tier
    /// * `cache` - The cache tier, read for the staleness fence
    /// * `queue` - Queue receiving the jobs
    pub fn new(
        user_id: impl Into<String>,
        cache_id: StorageId,
        backend_id: StorageId,
        cache: Arc<dyn Storage>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            cache_id,
            backend_id,
            cache,
            queue,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn cache_id(&self) -> StorageId {
        self.cache_id
    }

    pub fn backend_id(&self) -> StorageId {
        self.backend_id
    }

    /// Queue replication of `path`, fenced by its current cache mtime.
    ///
    /// # Returns
    /// False, without queueing, if the cache tier has nothing at `path`.
    pub fn schedule(&self, path: &str) -> Result<bool, OverlayError> {
        let Some(mtime) = self.cache.mtime(path)? else {
            debug!("Nothing to replicate at {}", path);
            return Ok(false);
        };
        self.queue.enqueue(ReplicationJob::new(
            self.user_id.clone(),
            self.cache_id,
            self.backend_id,
            path,
            mtime,
        ))?;
        debug!("Scheduled replication of {} (mtime {})", path, mtime);
        Ok(true)
    }

    /// Whether a rename to `target` needs a replication job.
    ///
    /// The backend already holding `target` means it converged on its own.
    pub fn should_schedule_rename(
        &self,
        backend: &dyn Storage,
        target: &str,
    ) -> Result<bool, StorageError> {
        Ok(!backend.exists(target)?)
    }
}

/// Write stream that schedules replication of its path once closed.
pub struct CloseHookStream {
    inner: Box<dyn FileStream>,
    path: String,
    policy: Arc<SyncPolicy>,
    closed: bool,
}

impl CloseHookStream {
    pub fn new(inner: Box<dyn FileStream>, path: impl Into<String>, policy: Arc<SyncPolicy>) -> Self {
        Self {
            inner,
            path: path.into(),
            policy,
            closed: false,
        }
    }
}

impl Read for CloseHookStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for CloseHookStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for CloseHookStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl FileStream for CloseHookStream {
    fn is_open(&self) -> bool {
        !self.closed
    }

    fn is_eof(&mut self) -> io::Result<bool> {
        self.inner.is_eof()
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.close()?;
        if let Err(e) = self.policy.schedule(&self.path) {
            warn!("Failed to queue replication of {}: {}", self.path, e);
        }
        Ok(())
    }
}

impl Drop for CloseHookStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Failed to close {}: {}", self.path, e);
        }
    }
}
