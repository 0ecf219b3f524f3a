//! Multi-pass tree reduction.
//!
//! Each pass folds `remaining` scratch elements in groups of at most the
//! device's work-group size, leaving one partial result per group at the
//! front of the scratch buffer:
//!
//! ```text
//! pass 0   [ x0 x1 x2 x3 | x4 x5 x6 x7 | x8 ]   remaining 9, group 4
//!                 |              |          |
//! pass 1   [ g0 g1 g2 ]                         remaining 3, group 3
//!               |
//! result   [ r ]
//! ```
//!
//! Inside a group the items load into local memory, then fold pairwise with
//! halving strides, one barrier per stride. Groups whose item count is not a
//! power of two are padded: a slot beyond the group's active count is never
//! read.

use std::fmt;

use log::debug;
use parfold_device::{Buffer, Element, GroupContext, GroupKernel, NdItem, NdRange, Queue};

use crate::error::{AlgoError, Result};
use crate::functor::Combiner;

/// Shape of one fold pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassPlan {
    /// Zero-based pass index.
    pub pass: usize,
    /// Elements entering the pass.
    pub length: usize,
    /// Work-items per group, `min(length, max work-group size)`.
    pub group_size: usize,
    /// `ceil(length / group_size)`; also the elements leaving the pass.
    pub groups: usize,
    /// Fold strides in execution order, largest first.
    pub strides: Vec<usize>,
}

impl PassPlan {
    /// Local barriers each group passes: one after the load, one per stride.
    pub fn barriers(&self) -> usize {
        self.strides.len() + 1
    }
}

/// Pass schedule for reducing `input_len` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldPlan {
    pub input_len: usize,
    pub max_work_group_size: usize,
    pub passes: Vec<PassPlan>,
}

impl FoldPlan {
    pub fn new(input_len: usize, max_work_group_size: usize) -> Result<Self> {
        if max_work_group_size < 2 {
            return Err(AlgoError::DegenerateWorkGroup {
                max_work_group_size,
            });
        }
        if input_len == 0 {
            return Err(AlgoError::EmptyBuffer);
        }

        let mut passes = Vec::new();
        let mut remaining = input_len;
        while remaining > 1 {
            let group_size = remaining.min(max_work_group_size);
            let groups = remaining.div_ceil(group_size);
            passes.push(PassPlan {
                pass: passes.len(),
                length: remaining,
                group_size,
                groups,
                strides: fold_strides(group_size),
            });
            remaining = groups;
        }

        Ok(FoldPlan {
            input_len,
            max_work_group_size,
            passes,
        })
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

impl fmt::Display for FoldPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.input_len)?;
        for pass in &self.passes {
            write!(f, " -> {}", pass.groups)?;
        }
        Ok(())
    }
}

/// Halving strides covering a group of `group_size` items:
/// `next_pow2(group_size) / 2, ..., 2, 1`.
pub fn fold_strides(group_size: usize) -> Vec<usize> {
    let mut strides = Vec::new();
    let mut stride = group_size.next_power_of_two() / 2;
    while stride >= 1 {
        strides.push(stride);
        stride /= 2;
    }
    strides
}

/// One fold pass as a grouped kernel.
///
/// Phase 0 loads, phases `1..=k` fold with stride `strides[phase - 1]`,
/// the last phase has item 0 store the group's result at `global[group]`.
pub struct TreeFold<T> {
    combiner: Combiner<T>,
    remaining: usize,
}

impl<T: Element> TreeFold<T> {
    pub fn new(combiner: Combiner<T>, remaining: usize) -> Self {
        TreeFold {
            combiner,
            remaining,
        }
    }

    /// Items of `group_id` that hold a real element.
    fn active(&self, item: &NdItem) -> usize {
        let first = item.group_id * item.local_range;
        self.remaining.saturating_sub(first).min(item.local_range)
    }
}

impl<T: Element> GroupKernel<T> for TreeFold<T> {
    fn phases(&self, local_range: usize) -> usize {
        fold_strides(local_range).len() + 2
    }

    fn run(&self, phase: usize, item: &NdItem, ctx: &mut GroupContext<'_, T>) {
        let strides = fold_strides(item.local_range);
        let l = item.local_id;

        if phase == 0 {
            if item.global_id < self.remaining {
                if let Some(value) = ctx.global(item.global_id).cloned() {
                    ctx.set_local(l, value);
                }
            }
        } else if let Some(&stride) = strides.get(phase - 1) {
            if l < stride && l + stride < self.active(item) {
                let pair = (ctx.local(l).cloned(), ctx.local(l + stride).cloned());
                if let (Some(left), Some(right)) = pair {
                    ctx.set_local(l, self.combiner.apply(left, right));
                }
            }
        } else if l == 0 {
            if let Some(result) = ctx.local(0).cloned() {
                ctx.write_global(item.group_id, result);
            }
        }
    }
}

/// Fold `input` into `output[0]` with `combiner`.
///
/// Work is submitted to `queue` and this returns without waiting; read
/// `output` to block on the result. `input` is never modified.
pub fn reduce<T>(
    queue: &Queue,
    input: &Buffer<T>,
    output: &Buffer<T>,
    combiner: &Combiner<T>,
) -> Result<()>
where
    T: Element + Default,
{
    if input.is_empty() || output.is_empty() {
        return Err(AlgoError::EmptyBuffer);
    }
    if output.len() != 1 {
        return Err(AlgoError::OutputNotScalar { len: output.len() });
    }

    let plan = FoldPlan::new(input.len(), queue.device().max_work_group_size)?;
    debug!("reduce '{}': {} ({} passes)", combiner.name(), plan, plan.len());

    let scratch: Buffer<T> = queue.allocate(input.len())?;
    let name = combiner.name();

    queue.submit(&format!("{}.copy_in", name), |h| {
        let src = h.read(input);
        let dst = h.discard_write(&scratch);
        h.copy(src, dst, input.len())
    })?;

    for pass in &plan.passes {
        let range = NdRange::covering(pass.length, pass.group_size)?;
        let kernel = TreeFold::new(combiner.clone(), pass.length);
        queue.submit(&format!("{}.fold", name), |h| {
            let data = h.read_write(&scratch);
            h.parallel_for_work_group(range, data, kernel)
        })?;
    }

    queue.submit(&format!("{}.copy_out", name), |h| {
        let src = h.read(&scratch);
        let dst = h.discard_write(output);
        h.copy(src, dst, 1)
    })?;
    Ok(())
}

pub fn reduce_max<T>(queue: &Queue, input: &Buffer<T>, output: &Buffer<T>) -> Result<()>
where
    T: Element + Default + PartialOrd,
{
    reduce(queue, input, output, &Combiner::max())
}

pub fn reduce_min<T>(queue: &Queue, input: &Buffer<T>, output: &Buffer<T>) -> Result<()>
where
    T: Element + Default + PartialOrd,
{
    reduce(queue, input, output, &Combiner::min())
}

pub fn reduce_sum<T>(queue: &Queue, input: &Buffer<T>, output: &Buffer<T>) -> Result<()>
where
    T: Element + Default + std::ops::Add<Output = T>,
{
    reduce(queue, input, output, &Combiner::sum())
}
