//! Producing side of the asynchronous job runner.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::OverlayError;
use crate::replication::{JobOutcome, ReplicationJob};
use crate::resolver::TierResolver;

/// Accepts replication jobs for later, at-least-once execution.
pub trait JobQueue: Send + Sync {
    /// Queue a job.
    fn enqueue(&self, job: ReplicationJob) -> Result<(), OverlayError>;
}

/// In-process FIFO queue holding jobs in their JSON message form.
#[derive(Debug, Default)]
pub struct MemoryJobQueue {
    messages: Mutex<VecDeque<String>>,
}

impl MemoryJobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Whether no job is queued.
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }

    /// Take the oldest job.
    pub fn pop(&self) -> Result<Option<ReplicationJob>, OverlayError> {
        let message: Option<String> = self.messages.lock().pop_front();
        message
            .map(|json: String| ReplicationJob::from_json(&json))
            .transpose()
    }

    /// Run every queued job in FIFO order.
    ///
    /// Jobs queued while running are run too. Stops at the first failing
    /// job; jobs after it stay queued.
    ///
    /// # Arguments
    /// * `resolver` - Resolves tier ids to live storages
    /// * `size_limit` - Cache tier budget applied after each replication
    pub fn run_pending(
        &self,
        resolver: &dyn TierResolver,
        size_limit: u64,
    ) -> Result<Vec<JobOutcome>, OverlayError> {
        let mut outcomes: Vec<JobOutcome> = Vec::new();
        while let Some(job) = self.pop()? {
            outcomes.push(job.execute(resolver, size_limit)?);
        }
        Ok(outcomes)
    }
}

impl JobQueue for MemoryJobQueue {
    fn enqueue(&self, job: ReplicationJob) -> Result<(), OverlayError> {
        let message: String = job.to_json()?;
        self.messages.lock().push_back(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(ReplicationJob::new("alice", 1, 2, "a", 1)).unwrap();
        queue.enqueue(ReplicationJob::new("alice", 1, 2, "b", 2)).unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().unwrap().unwrap().path(), "a");
        assert_eq!(queue.pop().unwrap().unwrap().path(), "b");
        assert!(queue.pop().unwrap().is_none());
        assert!(queue.is_empty());
    }
}
