//! Keyed task queue.
//!
//! An insertion-ordered map from [`TaskKey`] to task body. Pushing under a
//! key that is already queued drops the old body and appends the new one at
//! the back: the most recent body wins, in the most recent position.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::reactive::SubscriberId;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Deduplication key for scheduled tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey(KeyKind);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum KeyKind {
    /// Reruns of one effect share its key.
    Subscriber(u64),
    Fresh(u64),
}

impl TaskKey {
    /// A key no other task has.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(KeyKind::Fresh(COUNTER.fetch_add(1, Ordering::Relaxed)))
    }
}

impl Default for TaskKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<SubscriberId> for TaskKey {
    fn from(id: SubscriberId) -> Self {
        Self(KeyKind::Subscriber(id.raw()))
    }
}

/// Insertion-ordered, key-deduplicated queue of tasks.
#[derive(Default)]
pub struct TaskQueue {
    tasks: IndexMap<TaskKey, Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` under `key`. Returns `true` if it replaced a pending task.
    pub fn push(&mut self, key: TaskKey, task: Task) -> bool {
        let replaced = self.tasks.shift_remove(&key).is_some();
        self.tasks.insert(key, task);
        replaced
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.tasks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Remove every task, in queue order.
    pub fn take(&mut self) -> Vec<(TaskKey, Task)> {
        self.tasks.drain(..).collect()
    }

    /// Put tasks that were taken but never ran back at the front.
    ///
    /// A key queued again in the meantime keeps its newer body and position.
    pub fn restore_front(&mut self, tasks: impl IntoIterator<Item = (TaskKey, Task)>) {
        let mut restored: IndexMap<TaskKey, Task> = tasks.into_iter().collect();
        for (key, task) in self.tasks.drain(..) {
            restored.shift_remove(&key);
            restored.insert(key, task);
        }
        self.tasks = restored;
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.tasks.keys()).finish()
    }
}
