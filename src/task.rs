//! Cancellation handles for in-flight operations

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;

/// Handle to one in-flight operation
///
/// Cancelling is idempotent and has no effect once the operation finished.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    token: CancellationToken,
}

impl TaskHandle {
    /// Identifier unique within the owning client
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the operation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

type Tasks = Arc<Mutex<HashMap<u64, CancellationToken>>>;

/// Tracks the operations issued by one client and its clones
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskRegistry {
    tasks: Tasks,
    next_id: Arc<AtomicU64>,
}

impl TaskRegistry {
    /// Register a new operation; it stays tracked until the guard drops
    pub(crate) fn register(&self) -> (TaskHandle, TaskGuard) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        lock(&self.tasks).insert(id, token.clone());

        let guard = TaskGuard {
            id,
            tasks: self.tasks.clone(),
        };
        (TaskHandle { id, token }, guard)
    }

    /// Cancel every tracked operation, returning how many there were
    pub(crate) fn cancel_all(&self) -> usize {
        let tasks = lock(&self.tasks);
        for token in tasks.values() {
            token.cancel();
        }
        tasks.len()
    }

    /// Number of operations still in flight
    pub(crate) fn outstanding(&self) -> usize {
        lock(&self.tasks).len()
    }
}

/// Removes its operation from the registry when dropped
#[derive(Debug)]
pub(crate) struct TaskGuard {
    id: u64,
    tasks: Tasks,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        lock(&self.tasks).remove(&self.id);
    }
}

fn lock(tasks: &Tasks) -> MutexGuard<'_, HashMap<u64, CancellationToken>> {
    tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
