//! Task handles returned by queue submissions.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::access::AccessScope;
use crate::error::{DeviceError, Result};
use crate::range::WorkSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task{}", self.0)
    }
}

/// Lifecycle of a submitted task. There is no cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed(DeviceError),
    /// Skipped because an earlier task failed.
    Aborted,
}

impl TaskStatus {
    pub fn is_retired(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed(_) | Self::Aborted)
    }
}

/// Shared completion state between the worker and every handle.
pub(crate) struct TaskState {
    id: TaskId,
    kernel: String,
    status: Mutex<TaskStatus>,
    retired: Condvar,
}

impl TaskState {
    pub fn new(id: TaskId, kernel: &str) -> Self {
        TaskState {
            id,
            kernel: kernel.to_string(),
            status: Mutex::new(TaskStatus::Pending),
            retired: Condvar::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    pub fn status(&self) -> TaskStatus {
        self.status.lock().clone()
    }

    pub fn is_retired(&self) -> bool {
        self.status.lock().is_retired()
    }

    pub fn set_running(&self) {
        *self.status.lock() = TaskStatus::Running;
    }

    pub fn finish(&self, status: TaskStatus) {
        let mut guard = self.status.lock();
        *guard = status;
        self.retired.notify_all();
    }

    /// Block until the task retires.
    pub fn wait(&self) -> Result<()> {
        let mut guard = self.status.lock();
        while !guard.is_retired() {
            self.retired.wait(&mut guard);
        }
        match &*guard {
            TaskStatus::Failed(err) => Err(err.clone()),
            TaskStatus::Aborted => Err(DeviceError::QueueAborted {
                kernel: self.kernel.clone(),
            }),
            _ => Ok(()),
        }
    }
}

/// Handle to a submitted kernel; cloning shares the same task.
#[derive(Clone)]
pub struct Task {
    pub(crate) state: Arc<TaskState>,
    pub(crate) work_size: WorkSize,
    pub(crate) scopes: SmallVec<[AccessScope; 4]>,
    pub(crate) depends_on: Vec<TaskId>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        self.state.id()
    }

    pub fn kernel(&self) -> &str {
        self.state.kernel()
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn work_size(&self) -> WorkSize {
        self.work_size
    }

    /// Buffer scopes declared by the submission.
    pub fn scopes(&self) -> &[AccessScope] {
        &self.scopes
    }

    /// Earlier tasks whose scopes conflicted with this one at submission.
    pub fn depends_on(&self) -> &[TaskId] {
        &self.depends_on
    }

    /// Block until the task retires, surfacing its failure if any.
    pub fn wait(&self) -> Result<()> {
        self.state.wait()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id())
            .field("kernel", &self.kernel())
            .field("status", &self.status())
            .field("work_size", &self.work_size)
            .finish()
    }
}
