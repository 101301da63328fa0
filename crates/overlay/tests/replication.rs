//! Replication job execution against registered tiers.

use std::sync::Arc;

use tempfile::TempDir;
use tiercache_overlay::{
    JobOutcome, JobQueue, MemoryJobQueue, MountRegistry, ReplicationJob, StorageId, TierResolver,
    DEFAULT_CACHE_SIZE_LIMIT,
};
use tiercache_storage::{LocalStorage, Storage};

const USER: &str = "test";
const NOW: i64 = 1_700_000_000;

struct TestEnv {
    _dir: TempDir,
    cache: Arc<LocalStorage>,
    backend: Arc<LocalStorage>,
    registry: MountRegistry,
    cache_id: StorageId,
    backend_id: StorageId,
}

impl TestEnv {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(LocalStorage::new(dir.path().join("cache")).unwrap());
        let backend = Arc::new(LocalStorage::new(dir.path().join("backend")).unwrap());
        let registry = MountRegistry::new();
        let cache_id: StorageId = registry.register(USER, cache.clone());
        let backend_id: StorageId = registry.register(USER, backend.clone());
        Self {
            _dir: dir,
            cache,
            backend,
            registry,
            cache_id,
            backend_id,
        }
    }

    /// Job for `path` fenced by the cache's current mtime.
    fn job(&self, path: &str) -> ReplicationJob {
        let mtime: i64 = self.cache.mtime(path).unwrap().unwrap();
        ReplicationJob::new(USER, self.cache_id, self.backend_id, path, mtime)
    }

    fn run(&self, job: &ReplicationJob) -> JobOutcome {
        job.execute(&self.registry, DEFAULT_CACHE_SIZE_LIMIT).unwrap()
    }
}

// ============================================================================
// Replication
// ============================================================================

#[test]
fn test_basic_sync() {
    let env = TestEnv::new();
    env.cache.write_all("foo.txt", b"bar").unwrap();

    let outcome: JobOutcome = env.run(&env.job("foo.txt"));

    assert_eq!(outcome, JobOutcome::Replicated { evicted: 0 });
    assert_eq!(env.backend.read_all("foo.txt").unwrap(), Some(b"bar".to_vec()));
}

#[test]
fn test_sync_new_folder() {
    let env = TestEnv::new();
    env.cache.mkdir("asd").unwrap();
    env.cache.mkdir("asd/bar").unwrap();
    env.cache.write_all("asd/bar/foo.txt", b"asd").unwrap();

    env.run(&env.job("asd/bar/foo.txt"));

    assert!(env.backend.is_dir("asd/bar").unwrap());
    assert_eq!(
        env.backend.read_all("asd/bar/foo.txt").unwrap(),
        Some(b"asd".to_vec())
    );
}

#[test]
fn test_sync_directory() {
    let env = TestEnv::new();
    env.cache.mkdir("dir").unwrap();
    env.cache.write_all("dir/a.txt", b"a").unwrap();
    env.cache.write_all("dir/b.txt", b"b").unwrap();

    env.run(&env.job("dir"));

    assert_eq!(env.backend.read_all("dir/a.txt").unwrap(), Some(b"a".to_vec()));
    assert_eq!(env.backend.read_all("dir/b.txt").unwrap(), Some(b"b".to_vec()));
}

#[test]
fn test_rerun_is_safe() {
    let env = TestEnv::new();
    env.cache.write_all("foo.txt", b"bar").unwrap();
    let job: ReplicationJob = env.job("foo.txt");

    env.run(&job);
    assert_eq!(env.run(&job), JobOutcome::Replicated { evicted: 0 });
    assert_eq!(env.backend.read_all("foo.txt").unwrap(), Some(b"bar".to_vec()));
}

// ============================================================================
// Fences and missing tiers
// ============================================================================

#[test]
fn test_changed_mtime_supersedes_job() {
    let env = TestEnv::new();
    env.cache.write_all("foo.txt", b"asd").unwrap();
    env.cache.touch("foo.txt", Some(NOW - 100)).unwrap();
    let job: ReplicationJob = env.job("foo.txt");

    env.cache.touch("foo.txt", Some(NOW)).unwrap();

    assert_eq!(env.run(&job), JobOutcome::Superseded);
    assert!(!env.backend.exists("foo.txt").unwrap());
}

#[test]
fn test_older_cache_mtime_still_replicates() {
    let env = TestEnv::new();
    env.cache.write_all("foo.txt", b"asd").unwrap();
    env.cache.touch("foo.txt", Some(NOW)).unwrap();
    let job: ReplicationJob = env.job("foo.txt");

    env.cache.touch("foo.txt", Some(NOW - 100)).unwrap();

    assert_eq!(env.run(&job), JobOutcome::Replicated { evicted: 0 });
}

#[test]
fn test_storage_not_found() {
    let env = TestEnv::new();
    let job = ReplicationJob::new(USER, env.cache_id, 9_999_999, "foo.txt", NOW);

    assert_eq!(env.run(&job), JobOutcome::MountMissing);
}

#[test]
fn test_other_user_cannot_resolve_tiers() {
    let env = TestEnv::new();
    env.cache.write_all("foo.txt", b"bar").unwrap();
    let job = ReplicationJob::new("mallory", env.cache_id, env.backend_id, "foo.txt", NOW);

    assert_eq!(env.run(&job), JobOutcome::MountMissing);
    assert!(!env.backend.exists("foo.txt").unwrap());
}

#[test]
fn test_unmounted_backend() {
    let env = TestEnv::new();
    env.cache.write_all("foo.txt", b"bar").unwrap();
    let job: ReplicationJob = env.job("foo.txt");

    env.registry.unmount(USER, env.backend_id);

    assert_eq!(env.run(&job), JobOutcome::MountMissing);
}

#[test]
fn test_source_missing() {
    let env = TestEnv::new();
    let job = ReplicationJob::new(USER, env.cache_id, env.backend_id, "gone.txt", NOW);

    assert_eq!(env.run(&job), JobOutcome::SourceMissing);
    assert!(!env.backend.exists("gone.txt").unwrap());
}

// ============================================================================
// Eviction
// ============================================================================

#[test]
fn test_eviction_after_replication() {
    let env = TestEnv::new();
    env.cache.mkdir("sub").unwrap();
    env.cache.write_all("foo.txt", b"asd").unwrap();
    env.cache.write_all("bar.txt", b"foobar").unwrap();
    env.cache.write_all("sub/asd.txt", b"qwerty").unwrap();
    env.cache.touch("foo.txt", Some(NOW)).unwrap();
    env.cache.touch("bar.txt", Some(NOW - 100)).unwrap();
    env.cache.touch("sub/asd.txt", Some(NOW - 150)).unwrap();

    let outcome: JobOutcome = env
        .job("foo.txt")
        .execute(&env.registry, 9)
        .unwrap();

    assert_eq!(outcome, JobOutcome::Replicated { evicted: 1 });
    assert!(env.backend.exists("foo.txt").unwrap());
    assert!(env.cache.exists("foo.txt").unwrap());
    assert!(env.cache.exists("bar.txt").unwrap());
    assert!(!env.cache.exists("sub/asd.txt").unwrap());
}

#[test]
fn test_newest_first_budget() {
    let env = TestEnv::new();
    env.cache.write_all("old", b"oooooo").unwrap();
    env.cache.write_all("mid", b"mmmmmm").unwrap();
    env.cache.write_all("new", b"nnn").unwrap();
    env.cache.touch("old", Some(NOW - 200)).unwrap();
    env.cache.touch("mid", Some(NOW - 100)).unwrap();
    env.cache.touch("new", Some(NOW)).unwrap();

    let outcome: JobOutcome = env.job("new").execute(&env.registry, 6).unwrap();

    assert_eq!(outcome, JobOutcome::Replicated { evicted: 2 });
    assert!(env.cache.exists("new").unwrap());
    assert!(!env.cache.exists("mid").unwrap());
    assert!(!env.cache.exists("old").unwrap());
}

// ============================================================================
// Queue
// ============================================================================

#[test]
fn test_queued_jobs_run_in_order() {
    let env = TestEnv::new();
    let queue = MemoryJobQueue::new();
    env.cache.write_all("a.txt", b"a").unwrap();
    queue.enqueue(env.job("a.txt")).unwrap();
    queue
        .enqueue(ReplicationJob::new(USER, env.cache_id, 42, "a.txt", NOW))
        .unwrap();

    let outcomes: Vec<JobOutcome> = queue
        .run_pending(&env.registry, DEFAULT_CACHE_SIZE_LIMIT)
        .unwrap();

    assert_eq!(
        outcomes,
        vec![JobOutcome::Replicated { evicted: 0 }, JobOutcome::MountMissing]
    );
    assert!(queue.is_empty());
    assert!(env.backend.exists("a.txt").unwrap());
}
