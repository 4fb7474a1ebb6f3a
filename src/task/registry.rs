//! In-memory task store.

use crate::error::{PatchwrightError, Result};
use crate::task::{Task, TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Number of tasks per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub created: usize,
    pub pending: usize,
    pub done: usize,
    pub error: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    /// Count for one status.
    #[must_use]
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Created => self.created,
            TaskStatus::Pending => self.pending,
            TaskStatus::Done => self.done,
            TaskStatus::Error => self.error,
            TaskStatus::Cancelled => self.cancelled,
        }
    }

    fn increment(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Created => self.created += 1,
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Done => self.done += 1,
            TaskStatus::Error => self.error += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    /// Tasks that have not reached a terminal status.
    #[must_use]
    pub fn running(&self) -> usize {
        self.created + self.pending
    }

    #[must_use]
    pub fn total(&self) -> usize {
        TaskStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// Keyed store of every task known to this process.
///
/// Safe to share between concurrently running tasks; each access takes the
/// map lock only for the lookup or insert itself.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<Task>>>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and store a new task.
    pub fn create(&self, repo_url: &str, prompt: &str) -> Arc<Task> {
        let task = Arc::new(Task::new(repo_url, prompt));
        self.insert(Arc::clone(&task));
        task
    }

    /// Store an existing task, replacing any task with the same id.
    pub fn insert(&self, task: Arc<Task>) {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id(), task);
    }

    /// Look up a task.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for unknown identifiers.
    pub fn get(&self, id: &TaskId) -> Result<Arc<Task>> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| PatchwrightError::task_not_found(id))
    }

    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate count of tasks per status.
    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts = StatusCounts::default();
        for task in tasks.values() {
            counts.increment(task.status());
        }
        counts
    }

    /// Number of tasks not yet in a terminal status.
    #[must_use]
    pub fn running_count(&self) -> usize {
        self.status_counts().running()
    }
}
