//! Hazard tracking: which in-flight tasks still hold a scope on a buffer.
//!
//! The queue executes in submission order, so the tracker never has to
//! reorder work. It records dependency edges for each new task and tells
//! host accesses which tasks they must wait for.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::access::AccessMode;
use crate::buffer::BufferHandle;
use crate::task::{TaskId, TaskState};

/// Scopes of submitted-but-not-retired tasks on one buffer.
#[derive(Default)]
pub(crate) struct PendingScopes {
    entries: Mutex<Vec<(Arc<TaskState>, AccessMode)>>,
}

impl PendingScopes {
    pub fn track(&self, task: &Arc<TaskState>, mode: AccessMode) {
        let mut entries = self.entries.lock();
        entries.retain(|(t, _)| !t.is_retired());
        entries.push((task.clone(), mode));
    }

    /// Unretired tasks whose scope conflicts with an access in `mode`.
    pub fn conflicting(&self, mode: AccessMode) -> Vec<Arc<TaskState>> {
        self.entries
            .lock()
            .iter()
            .filter(|(t, m)| !t.is_retired() && (mode.writes() || m.writes()))
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn unretired(&self) -> Vec<(Arc<TaskState>, AccessMode)> {
        self.entries
            .lock()
            .iter()
            .filter(|(t, _)| !t.is_retired())
            .cloned()
            .collect()
    }

    pub fn prune(&self) {
        self.entries.lock().retain(|(t, _)| !t.is_retired());
    }
}

/// Earlier unretired tasks a new submission must be ordered after.
pub(crate) fn dependencies(accesses: &[(Arc<dyn BufferHandle>, AccessMode)]) -> Vec<TaskId> {
    let mut deps: Vec<TaskId> = accesses
        .iter()
        .flat_map(|(handle, mode)| handle.conflicting(*mode))
        .map(|task| task.id())
        .collect();
    deps.sort_unstable();
    deps.dedup();
    deps
}

/// Register a new task's scopes with every buffer it touches.
pub(crate) fn track(task: &Arc<TaskState>, accesses: &[(Arc<dyn BufferHandle>, AccessMode)]) {
    for (handle, mode) in accesses {
        handle.track(task, *mode);
    }
}
