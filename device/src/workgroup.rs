//! Work-group execution model.
//!
//! A grouped kernel is written as a sequence of phases separated by local
//! barriers. The executor runs one group lock-step: every work-item finishes
//! phase `p` and arrives at the group barrier before any item starts phase
//! `p + 1`. Groups are independent and run in parallel; their global writes
//! are buffered and land when the whole launch completes, so a launch is a
//! global barrier for the next one.

use log::trace;
use rayon::prelude::*;

use crate::buffer::Element;
use crate::error::{DeviceError, Result};
use crate::range::{NdItem, NdRange};

/// Kernel body executed by each work-item of a grouped launch.
pub trait GroupKernel<T>: Send + Sync {
    /// Number of barrier-separated phases for groups of `local_range` items.
    fn phases(&self, local_range: usize) -> usize;

    /// Run work-item `item`'s share of `phase`.
    fn run(&self, phase: usize, item: &NdItem, ctx: &mut GroupContext<'_, T>);
}

/// Scratch memory shared by the work-items of one group.
///
/// Slots start empty; a slot that was never stored reads as `None`.
pub struct LocalMemory<T> {
    slots: Vec<Option<T>>,
}

impl<T: Clone> LocalMemory<T> {
    pub fn new(len: usize) -> Self {
        LocalMemory {
            slots: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn set(&mut self, index: usize, value: T) {
        if let Some(slot) = self.slots.get_mut(index) {
            *slot = Some(value);
        }
    }
}

/// Rendezvous point for the work-items of one group.
#[derive(Debug)]
pub struct GroupBarrier {
    participants: usize,
    arrived: usize,
    generation: usize,
}

impl GroupBarrier {
    pub fn new(participants: usize) -> Self {
        GroupBarrier {
            participants,
            arrived: 0,
            generation: 0,
        }
    }

    pub fn arrive(&mut self) {
        self.arrived += 1;
    }

    /// Whether every participant has arrived at the current generation.
    pub fn is_complete(&self) -> bool {
        self.arrived == self.participants
    }

    /// Release the group into the next phase.
    pub fn release(&mut self) {
        debug_assert!(self.is_complete(), "barrier released before all arrivals");
        self.arrived = 0;
        self.generation += 1;
    }

    /// Number of completed rendezvous.
    pub fn generation(&self) -> usize {
        self.generation
    }
}

/// Memory visible to a work-item while it runs.
pub struct GroupContext<'a, T> {
    global: &'a [T],
    local: &'a mut LocalMemory<T>,
    writes: &'a mut Vec<(usize, T)>,
}

impl<T: Clone> GroupContext<'_, T> {
    pub fn global(&self, index: usize) -> Option<&T> {
        self.global.get(index)
    }

    pub fn global_len(&self) -> usize {
        self.global.len()
    }

    pub fn local(&self, index: usize) -> Option<&T> {
        self.local.get(index)
    }

    pub fn set_local(&mut self, index: usize, value: T) {
        self.local.set(index, value);
    }

    /// Queue a global store; it becomes visible when the launch completes.
    pub fn write_global(&mut self, index: usize, value: T) {
        self.writes.push((index, value));
    }
}

/// What one group did during a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupReport {
    pub group_id: usize,
    pub barriers: usize,
    pub writes: usize,
}

/// Run a single work-group to completion against read-only global memory.
///
/// Returns the group's report and its buffered global writes.
pub fn run_group<T, K>(
    kernel: &K,
    range: &NdRange,
    group_id: usize,
    global: &[T],
) -> (GroupReport, Vec<(usize, T)>)
where
    T: Clone,
    K: GroupKernel<T> + ?Sized,
{
    let local_range = range.local();
    let mut local = LocalMemory::new(local_range);
    let mut writes = Vec::new();
    let mut barrier = GroupBarrier::new(local_range);
    let phases = kernel.phases(local_range);

    for phase in 0..phases {
        for local_id in 0..local_range {
            let item = NdItem::new(range, group_id, local_id);
            let mut ctx = GroupContext {
                global,
                local: &mut local,
                writes: &mut writes,
            };
            kernel.run(phase, &item, &mut ctx);
            barrier.arrive();
        }
        if phase + 1 < phases {
            barrier.release();
        }
    }

    let report = GroupReport {
        group_id,
        barriers: barrier.generation(),
        writes: writes.len(),
    };
    (report, writes)
}

/// Run every group of `range` over `data` and commit their writes.
pub(crate) fn execute<T, K>(
    kernel_name: &str,
    kernel: &K,
    range: NdRange,
    data: &mut [T],
) -> Result<Vec<GroupReport>>
where
    T: Element,
    K: GroupKernel<T> + ?Sized,
{
    let outcomes: Vec<(GroupReport, Vec<(usize, T)>)> = {
        let global: &[T] = data;
        (0..range.groups())
            .into_par_iter()
            .map(|group_id| run_group(kernel, &range, group_id, global))
            .collect()
    };

    let len = data.len();
    let mut reports = Vec::with_capacity(outcomes.len());
    for (report, writes) in outcomes {
        trace!(
            "{}: group {} passed {} barriers, {} writes",
            kernel_name,
            report.group_id,
            report.barriers,
            report.writes
        );
        for (index, value) in writes {
            let slot = data.get_mut(index).ok_or_else(|| DeviceError::KernelFault {
                kernel: kernel_name.to_string(),
                message: format!("global write to {} out of bounds (len {})", index, len),
            })?;
            *slot = value;
        }
        reports.push(report);
    }
    Ok(reports)
}
