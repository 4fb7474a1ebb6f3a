//! Task lifecycle state machine.
//!
//! A [`Task`] records one change request: identity, inputs, status, result,
//! timestamps and an append-only log. Tasks are shared as `Arc<Task>` between
//! the registry, the orchestrator running them and cancellation requests, so
//! all mutable state sits behind one lock and every method takes `&self`.
//!
//! ```text
//! CREATED ──start()──▶ PENDING ──set_result()──▶ DONE
//!    │                    ├──────set_error()──▶ ERROR
//!    └──────cancel()──────┴───────cancel()────▶ CANCELLED
//! ```

pub mod registry;

pub use registry::{StatusCounts, TaskRegistry};

use crate::error::{PatchwrightError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Opaque task identifier.
pub type TaskId = Uuid;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Created,
    Pending,
    Done,
    Error,
    Cancelled,
}

impl TaskStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [TaskStatus; 5] = [
        Self::Created,
        Self::Pending,
        Self::Done,
        Self::Error,
        Self::Cancelled,
    ];

    /// Upper-case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Check whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a task log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    result: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    elapsed: Option<Duration>,
    log: Vec<String>,
}

/// One change request and its progress.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    repo_url: String,
    prompt: String,
    created_at: DateTime<Utc>,
    state: RwLock<TaskState>,
}

/// Serialisable point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub repo_url: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_secs: Option<f64>,
    pub log: Vec<String>,
}

impl Task {
    /// Create a task in `CREATED` with a fresh identifier.
    #[must_use]
    pub fn new(repo_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), repo_url, prompt)
    }

    /// Create a task with a caller-chosen identifier.
    #[must_use]
    pub fn with_id(id: TaskId, repo_url: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id,
            repo_url: repo_url.into(),
            prompt: prompt.into(),
            created_at: Utc::now(),
            state: RwLock::new(TaskState {
                status: TaskStatus::Created,
                result: None,
                started_at: None,
                ended_at: None,
                elapsed: None,
                log: Vec::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TaskState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TaskState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // Identity
    // =========================================================================

    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Move from `CREATED` to `PENDING`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` from any other status.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.write();
            check_transition(state.status, &[TaskStatus::Created], TaskStatus::Pending)?;
            state.status = TaskStatus::Pending;
            state.started_at = Some(Utc::now());
        }
        self.info("Task started");
        Ok(())
    }

    /// Finish successfully with `result` (the diff text).
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the task is `PENDING`.
    pub fn set_result(&self, result: impl Into<String>) -> Result<()> {
        self.finish(TaskStatus::Done, result.into())?;
        self.info("Task completed");
        Ok(())
    }

    /// Finish with a human-readable error message.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` unless the task is `PENDING`.
    pub fn set_error(&self, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        self.finish(TaskStatus::Error, message.clone())?;
        self.error(&format!("Task failed: {}", message));
        Ok(())
    }

    /// Mark the task cancelled. Advisory: a running orchestrator notices at
    /// its next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the task already finished.
    pub fn cancel(&self) -> Result<()> {
        {
            let mut state = self.write();
            check_transition(
                state.status,
                &[TaskStatus::Created, TaskStatus::Pending],
                TaskStatus::Cancelled,
            )?;
            state.status = TaskStatus::Cancelled;
            stamp_end(&mut state);
        }
        self.warn("Task cancelled");
        Ok(())
    }

    fn finish(&self, to: TaskStatus, result: String) -> Result<()> {
        let mut state = self.write();
        check_transition(state.status, &[TaskStatus::Pending], to)?;
        state.status = to;
        state.result = Some(result);
        stamp_end(&mut state);
        Ok(())
    }

    // =========================================================================
    // Log
    // =========================================================================

    /// Record an informational log line.
    pub fn info(&self, message: &str) {
        info!(task_id = %self.id, "{}", message);
        self.append(LogLevel::Info, message);
    }

    /// Record a warning log line.
    pub fn warn(&self, message: &str) {
        warn!(task_id = %self.id, "{}", message);
        self.append(LogLevel::Warn, message);
    }

    /// Record an error log line.
    pub fn error(&self, message: &str) {
        error!(task_id = %self.id, "{}", message);
        self.append(LogLevel::Error, message);
    }

    fn append(&self, level: LogLevel, message: &str) {
        let line = format!(
            "{} - {} - {}",
            Utc::now().to_rfc3339(),
            level.as_str(),
            message
        );
        self.write().log.push(line);
    }

    // =========================================================================
    // Read access
    // =========================================================================

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.read().status
    }

    /// Diff text on success, error message on failure.
    #[must_use]
    pub fn result(&self) -> Option<String> {
        self.read().result.clone()
    }

    /// Copy of the log lines.
    #[must_use]
    pub fn log(&self) -> Vec<String> {
        self.read().log.clone()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.read().started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.read().ended_at
    }

    /// Wall-clock time from `start()` to the terminal transition.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.read().elapsed
    }

    /// True iff the status is `DONE`, `ERROR` or `CANCELLED`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status().is_terminal()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status() == TaskStatus::Pending
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status() == TaskStatus::Cancelled
    }

    /// Consistent copy of the whole task.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.read();
        TaskSnapshot {
            id: self.id,
            repo_url: self.repo_url.clone(),
            prompt: self.prompt.clone(),
            status: state.status,
            result: state.result.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
            elapsed_secs: state.elapsed.map(|d| d.as_secs_f64()),
            log: state.log.clone(),
        }
    }
}

fn check_transition(from: TaskStatus, allowed: &[TaskStatus], to: TaskStatus) -> Result<()> {
    if allowed.contains(&from) {
        Ok(())
    } else {
        Err(PatchwrightError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn stamp_end(state: &mut TaskState) {
    let now = Utc::now();
    state.ended_at = Some(now);
    state.elapsed = Some(
        now.signed_duration_since(state.started_at.unwrap_or(now))
            .to_std()
            .unwrap_or_default(),
    );
}
