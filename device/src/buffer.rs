//! Managed buffers: host-allocated storage shared with the device queue.
//!
//! A `Buffer<T>` is a cheap handle; clones refer to the same storage. The
//! element count is fixed at construction. Kernels never hold the storage
//! lock across submissions, so host access only has to wait for the tasks
//! still pending on this buffer.

use std::any::Any;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::access::AccessMode;
use crate::error::{DeviceError, Result};
use crate::hazard::PendingScopes;
use crate::memory::Allocation;
use crate::task::{TaskId, TaskState};

/// Element types a buffer can hold.
pub trait Element: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Element for T {}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique buffer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl BufferId {
    fn next() -> Self {
        BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) struct BufferInner<T> {
    id: BufferId,
    len: usize,
    data: RwLock<Vec<T>>,
    pending: PendingScopes,
    invalidated: AtomicBool,
    /// Held for its `Drop`; returns the bytes to the device budget.
    _allocation: Option<Allocation>,
}

/// One-dimensional buffer of `T`.
pub struct Buffer<T> {
    inner: Arc<BufferInner<T>>,
}

impl<T> Clone for Buffer<T> {
    fn clone(&self) -> Self {
        Buffer {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Buffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("len", &self.inner.len)
            .finish()
    }
}

impl<T: Element + Default> Buffer<T> {
    /// Allocate `len` default-initialized elements on the host.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![T::default(); len])
    }
}

impl<T: Element> Buffer<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        Self::with_allocation(data, None)
    }

    pub(crate) fn with_allocation(data: Vec<T>, allocation: Option<Allocation>) -> Self {
        Buffer {
            inner: Arc::new(BufferInner {
                id: BufferId::next(),
                len: data.len(),
                data: RwLock::new(data),
                pending: PendingScopes::default(),
                invalidated: AtomicBool::new(false),
                _allocation: allocation,
            }),
        }
    }

    pub fn id(&self) -> BufferId {
        self.inner.id
    }

    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Whether a failed task left this buffer's contents undefined.
    pub fn is_invalidated(&self) -> bool {
        self.inner.invalidated.load(Ordering::Acquire)
    }

    /// Blocking read access: waits for every pending task that writes this
    /// buffer, then maps the contents.
    pub fn host_read(&self) -> Result<HostRead<'_, T>> {
        self.wait_pending(AccessMode::Read);
        self.check_valid()?;
        Ok(HostRead {
            guard: self.inner.data.read(),
        })
    }

    /// Blocking write access: waits for every pending task on this buffer.
    pub fn host_write(&self) -> Result<HostWrite<'_, T>> {
        self.wait_pending(AccessMode::ReadWrite);
        self.check_valid()?;
        Ok(HostWrite {
            guard: self.inner.data.write(),
        })
    }

    /// Copy the contents out after pending writers retire.
    pub fn to_vec(&self) -> Result<Vec<T>> {
        Ok(self.host_read()?.to_vec())
    }

    /// Ids of unretired tasks that still hold a scope on this buffer.
    pub fn pending_tasks(&self) -> Vec<TaskId> {
        self.inner
            .pending
            .unretired()
            .iter()
            .map(|(task, _)| task.id())
            .collect()
    }

    fn wait_pending(&self, mode: AccessMode) {
        for task in self.inner.pending.conflicting(mode) {
            // Failures surface through the invalidated flag below.
            let _ = task.wait();
        }
        self.inner.pending.prune();
    }

    fn check_valid(&self) -> Result<()> {
        if self.is_invalidated() {
            return Err(DeviceError::BufferInvalidated(self.inner.id));
        }
        Ok(())
    }

    pub(crate) fn storage(&self) -> &RwLock<Vec<T>> {
        &self.inner.data
    }

    pub(crate) fn handle(&self) -> Arc<dyn BufferHandle> {
        self.inner.clone()
    }
}

/// Type-erased view of a buffer used by the queue for hazard tracking,
/// invalidation and placeholder staging.
pub(crate) trait BufferHandle: Send + Sync {
    fn id(&self) -> BufferId;
    fn track(&self, task: &Arc<TaskState>, mode: AccessMode);
    fn conflicting(&self, mode: AccessMode) -> Vec<Arc<TaskState>>;
    fn invalidate(&self);
    /// Copy the current contents into kernel-private memory.
    fn snapshot(&self) -> Box<dyn Any + Send + Sync>;
}

impl<T: Element> BufferHandle for BufferInner<T> {
    fn id(&self) -> BufferId {
        self.id
    }

    fn track(&self, task: &Arc<TaskState>, mode: AccessMode) {
        self.pending.track(task, mode);
    }

    fn conflicting(&self, mode: AccessMode) -> Vec<Arc<TaskState>> {
        self.pending.conflicting(mode)
    }

    fn invalidate(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    fn snapshot(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(self.data.read().clone())
    }
}

/// Host read mapping; derefs to the buffer contents.
pub struct HostRead<'a, T> {
    guard: RwLockReadGuard<'a, Vec<T>>,
}

impl<T> Deref for HostRead<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.guard
    }
}

/// Host write mapping.
pub struct HostWrite<'a, T> {
    guard: RwLockWriteGuard<'a, Vec<T>>,
}

impl<T> Deref for HostWrite<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.guard
    }
}

impl<T> DerefMut for HostWrite<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a: Buffer<f32> = Buffer::new(4);
        let b: Buffer<f32> = Buffer::new(4);
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_host_roundtrip() {
        let buf = Buffer::from_vec(vec![1.0f32, 2.0, 3.0]);
        {
            let mut w = buf.host_write().unwrap();
            w[1] = 20.0;
        }
        assert_eq!(buf.to_vec().unwrap(), vec![1.0, 20.0, 3.0]);
        assert_eq!(buf.len(), 3);
        assert!(!buf.is_empty());
    }

    #[test]
    fn test_invalidated_buffer_rejects_host_access() {
        let buf = Buffer::from_vec(vec![1u32]);
        buf.handle().invalidate();
        assert!(buf.is_invalidated());
        assert_eq!(
            buf.host_read().err(),
            Some(DeviceError::BufferInvalidated(buf.id()))
        );
    }

    #[test]
    fn test_snapshot_copies_contents() {
        let buf = Buffer::from_vec(vec![5i32, 6]);
        let staged = buf.handle().snapshot();
        let staged = staged.downcast::<Vec<i32>>().unwrap();
        assert_eq!(*staged, vec![5, 6]);
    }
}
