//! Ordered device queue.
//!
//! Submissions are validated on the calling thread and handed to a single
//! worker over an mpsc channel, which runs them strictly in submission
//! order. The first failure aborts the queue: every task still queued is
//! retired as `Aborted` and later submissions are refused.

use std::any::Any;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::access::AccessMode;
use crate::buffer::{Buffer, BufferHandle, Element};
use crate::config::QueueConfig;
use crate::device::DeviceInfo;
use crate::error::{DeviceError, Result};
use crate::handler::{CommandGroup, Handler};
use crate::hazard;
use crate::kernel_registry::{KernelRegistry, KernelStats};
use crate::memory::MemoryBudget;
use crate::placeholder::Captures;
use crate::task::{Task, TaskId, TaskState, TaskStatus};

struct Job {
    state: Arc<TaskState>,
    group: CommandGroup,
}

/// State shared between the queue handle and its worker.
#[derive(Default)]
struct Shared {
    aborted: AtomicBool,
    registry: Mutex<KernelRegistry>,
    outstanding: Mutex<Vec<Arc<TaskState>>>,
}

pub struct Queue {
    config: QueueConfig,
    device: DeviceInfo,
    budget: Arc<MemoryBudget>,
    shared: Arc<Shared>,
    next_task: AtomicU64,
    sender: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Queue {
    /// Open the device described by `config` and start its worker.
    pub fn new(config: QueueConfig) -> Result<Self> {
        let device = DeviceInfo::from_config(&config)?;
        let shared = Arc::new(Shared::default());
        let (sender, receiver) = mpsc::channel();

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("parfold-device".to_string())
                .spawn(move || worker_loop(receiver, shared))
                .map_err(|e| DeviceError::DeviceUnavailable(e.to_string()))?
        };

        debug!(
            "opened queue on '{}' ({} backend, max work-group size {})",
            device.name,
            device.backend.name(),
            device.max_work_group_size
        );

        Ok(Queue {
            budget: MemoryBudget::new(config.memory_limit),
            config,
            device,
            shared,
            next_task: AtomicU64::new(0),
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }

    /// Number of tasks accepted so far. Rejected submissions do not count.
    pub fn submitted(&self) -> usize {
        self.next_task.load(Ordering::Acquire) as usize
    }

    /// Build a command group with `build` and enqueue it.
    ///
    /// Every usage error is reported here, before the task exists.
    pub fn submit<F>(&self, kernel: &str, build: F) -> Result<Task>
    where
        F: FnOnce(&mut Handler) -> Result<()>,
    {
        if self.is_aborted() {
            return Err(DeviceError::QueueAborted {
                kernel: kernel.to_string(),
            });
        }

        let mut handler = Handler::new(kernel, self.config.placeholder_mode);
        build(&mut handler)?;
        let group = handler.finish()?;

        let accesses: Vec<(Arc<dyn BufferHandle>, AccessMode)> = group
            .accesses
            .iter()
            .map(|(handle, scope)| (handle.clone(), scope.mode))
            .collect();
        let depends_on = hazard::dependencies(&accesses);

        let id = TaskId(self.next_task.fetch_add(1, Ordering::AcqRel));
        let state = Arc::new(TaskState::new(id, kernel));
        hazard::track(&state, &accesses);

        debug!(
            "{}: submit '{}' {:?}, {} scopes, depends on {:?}",
            id,
            kernel,
            group.work_size,
            group.accesses.len(),
            depends_on
        );

        let task = Task {
            state: state.clone(),
            work_size: group.work_size,
            scopes: group.accesses.iter().map(|(_, scope)| *scope).collect(),
            depends_on,
        };

        {
            let mut outstanding = self.shared.outstanding.lock();
            outstanding.retain(|t| !t.is_retired());
            outstanding.push(state.clone());
        }

        let sender = self.sender.as_ref().ok_or_else(|| DeviceError::QueueAborted {
            kernel: kernel.to_string(),
        })?;
        if sender.send(Job { state: state.clone(), group }).is_err() {
            state.finish(TaskStatus::Aborted);
            return Err(DeviceError::QueueAborted {
                kernel: kernel.to_string(),
            });
        }
        Ok(task)
    }

    /// Allocate `len` default elements against the device memory budget.
    pub fn allocate<T: Element + Default>(&self, len: usize) -> Result<Buffer<T>> {
        let bytes = len.saturating_mul(mem::size_of::<T>());
        let allocation = self.budget.reserve(bytes)?;
        Ok(Buffer::with_allocation(vec![T::default(); len], Some(allocation)))
    }

    /// Bytes currently held by queue allocations.
    pub fn memory_used(&self) -> usize {
        self.budget.used()
    }

    /// Block until every submitted task retires. Reports the first failure.
    pub fn wait(&self) -> Result<()> {
        let pending: Vec<Arc<TaskState>> = self.shared.outstanding.lock().drain(..).collect();
        let mut first_error = None;
        for task in pending {
            if let Err(err) = task.wait() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn kernel_stats(&self, kernel: &str) -> Option<KernelStats> {
        self.shared.registry.lock().get(kernel)
    }

    /// Kernel launches executed by the worker so far.
    pub fn total_launches(&self) -> usize {
        self.shared.registry.lock().total_launches()
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain what is queued and exit.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("device worker terminated abnormally");
            }
        }
    }
}

fn worker_loop(receiver: Receiver<Job>, shared: Arc<Shared>) {
    while let Ok(Job { state, group }) = receiver.recv() {
        if shared.aborted.load(Ordering::Acquire) {
            warn!(
                "{}: '{}' skipped, queue aborted by an earlier failure",
                state.id(),
                state.kernel()
            );
            for (handle, scope) in &group.accesses {
                if scope.mode.writes() {
                    handle.invalidate();
                }
            }
            state.finish(TaskStatus::Aborted);
            continue;
        }

        state.set_running();
        shared.registry.lock().record(&group.kernel, group.work_size);

        let CommandGroup {
            kernel,
            work,
            accesses,
            bindings,
            ..
        } = group;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let captures = Captures::stage(&bindings);
            work(&captures)
        }));

        let status = match outcome {
            Ok(Ok(())) => TaskStatus::Complete,
            Ok(Err(err)) => TaskStatus::Failed(err),
            Err(payload) => TaskStatus::Failed(DeviceError::KernelFault {
                kernel: kernel.clone(),
                message: panic_message(payload.as_ref()),
            }),
        };

        if let TaskStatus::Failed(err) = &status {
            error!("{}: kernel '{}' failed: {}", state.id(), kernel, err);
            for (handle, _) in &accesses {
                handle.invalidate();
            }
            shared.aborted.store(true, Ordering::Release);
        }
        state.finish(status);
    }
    debug!("device worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "kernel panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::Placeholder;
    use crate::range::WorkSize;

    fn queue() -> Queue {
        Queue::new(QueueConfig::default()).unwrap()
    }

    #[test]
    fn test_flat_kernel_runs() {
        let q = queue();
        let input = Buffer::from_vec(vec![1u32, 2, 3]);
        let output: Buffer<u32> = Buffer::new(3);
        let task = q
            .submit("double", |h| {
                let src = h.read(&input);
                let dst = h.discard_write(&output);
                h.parallel_for(src, dst, |x: &u32, _| x * 2)
            })
            .unwrap();
        task.wait().unwrap();
        assert_eq!(task.status(), TaskStatus::Complete);
        assert_eq!(output.to_vec().unwrap(), vec![2, 4, 6]);
        assert_eq!(q.kernel_stats("double").unwrap().launches, 1);
    }

    #[test]
    fn test_reader_depends_on_writer() {
        let q = queue();
        let a = Buffer::from_vec(vec![1u32; 4]);
        let b: Buffer<u32> = Buffer::new(4);
        let c: Buffer<u32> = Buffer::new(4);

        let first = q
            .submit("produce", |h| {
                let (src, dst) = (h.read(&a), h.discard_write(&b));
                h.parallel_for(src, dst, |x: &u32, _| {
                    thread::sleep(std::time::Duration::from_millis(20));
                    x + 1
                })
            })
            .unwrap();
        let second = q
            .submit("consume", |h| {
                let (src, dst) = (h.read(&b), h.discard_write(&c));
                h.parallel_for(src, dst, |x: &u32, _| x * 10)
            })
            .unwrap();

        assert!(second.depends_on().contains(&first.id()));
        assert!(first.depends_on().is_empty());
        assert_eq!(c.to_vec().unwrap(), vec![20; 4]);
    }

    #[test]
    fn test_rejected_submission_records_no_task() {
        let q = queue();
        let src = Buffer::from_vec(vec![1.0f32]);
        let max = Buffer::from_vec(vec![2.0f32]);
        let dst: Buffer<f32> = Buffer::new(1);
        let m = Placeholder::new(&max);

        let err = q
            .submit("normalize", |h| {
                h.require(&[m.reference()]);
                let (s, d) = (h.read(&src), h.discard_write(&dst));
                h.parallel_for(s, d, |x: &f32, _| *x)
            })
            .unwrap_err();
        assert!(matches!(err, DeviceError::MissingBinding { .. }));
        assert_eq!(q.submitted(), 0);
        assert!(max.pending_tasks().is_empty());
    }

    #[test]
    fn test_kernel_panic_aborts_queue() {
        let q = queue();
        let input = Buffer::from_vec(vec![1u32, 2]);
        let output: Buffer<u32> = Buffer::new(2);
        let later: Buffer<u32> = Buffer::new(2);

        let bad = q
            .submit("explode", |h| {
                let (s, d) = (h.read(&input), h.discard_write(&output));
                h.parallel_for(s, d, |x: &u32, _| {
                    if *x == 2 {
                        panic!("bad element");
                    }
                    *x
                })
            })
            .unwrap();
        let queued = q.submit("after", |h| {
            let (s, d) = (h.read(&input), h.discard_write(&later));
            h.copy(s, d, 2)
        });

        let err = bad.wait().unwrap_err();
        assert!(matches!(err, DeviceError::KernelFault { ref message, .. } if message.contains("bad element")));
        assert!(output.is_invalidated());
        assert!(q.is_aborted());

        // Either it was queued before the fault and retired as aborted, or
        // the submission itself was refused.
        match queued {
            Ok(task) => {
                assert!(matches!(task.wait(), Err(DeviceError::QueueAborted { .. })));
                assert_eq!(task.status(), TaskStatus::Aborted);
            }
            Err(err) => assert!(matches!(err, DeviceError::QueueAborted { .. })),
        }
        assert!(matches!(
            q.submit("refused", |h| {
                let (s, d) = (h.read(&input), h.discard_write(&later));
                h.copy(s, d, 1)
            }),
            Err(DeviceError::QueueAborted { .. })
        ));
        assert!(q.wait().is_err());
    }

    #[test]
    fn test_allocate_respects_budget() {
        let q = Queue::new(QueueConfig::default().with_memory_limit(64)).unwrap();
        let a: Buffer<u32> = q.allocate(8).unwrap();
        assert_eq!(q.memory_used(), 32);
        assert_eq!(
            q.allocate::<u32>(16).unwrap_err(),
            DeviceError::OutOfMemory {
                requested: 64,
                available: 32
            }
        );
        drop(a);
        assert_eq!(q.memory_used(), 0);
    }

    #[test]
    fn test_wait_drains_queue() {
        let q = queue();
        let src = Buffer::from_vec((0..16u32).collect::<Vec<_>>());
        let dst: Buffer<u32> = Buffer::new(16);
        let task = q
            .submit("copy", |h| {
                let (s, d) = (h.read(&src), h.discard_write(&dst));
                h.copy(s, d, 16)
            })
            .unwrap();
        q.wait().unwrap();
        assert!(task.status().is_retired());
        assert_eq!(task.work_size(), WorkSize::Copy(16));
        assert_eq!(q.total_launches(), 1);
    }
}
