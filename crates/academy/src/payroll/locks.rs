//! Per-teacher mutual exclusion for read-check-append sequences.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Lock table keyed by teacher ID.
///
/// Contention is scoped to one teacher; there is no global lock. An entry
/// lives only while some caller holds or waits on it.
#[derive(Debug, Clone, Default)]
pub struct TeacherLocks {
    inner: Arc<LockMap>,
}

/// Held lock for one teacher. Releasing it prunes the table entry when no
/// other caller is waiting.
#[derive(Debug)]
pub struct TeacherLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    teacher_id: String,
    table: Arc<LockMap>,
}

impl Drop for TeacherLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone of the mutex, so a count of one means
        // only the table references it. The shard lock makes this atomic with
        // `lock` cloning the entry out.
        self.table
            .remove_if(&self.teacher_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl TeacherLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a teacher, waiting for any holder to release it.
    pub async fn lock(&self, teacher_id: &str) -> TeacherLockGuard {
        // Clone the Arc out so no map shard stays locked across the await.
        let mutex = self
            .inner
            .entry(teacher_id.to_string())
            .or_default()
            .clone();
        let guard = mutex.lock_owned().await;
        TeacherLockGuard {
            guard: Some(guard),
            teacher_id: teacher_id.to_string(),
            table: self.inner.clone(),
        }
    }

    /// Number of teachers currently locked or awaited.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
