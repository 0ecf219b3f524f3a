//! Command-group handler. Collects the scopes, bindings and work of one
//! submission before it is handed to the worker.

use std::sync::Arc;

use rayon::prelude::*;

use crate::access::{AccessMode, AccessScope, AccessTarget};
use crate::buffer::{Buffer, BufferHandle, BufferId, Element};
use crate::error::{DeviceError, Result};
use crate::placeholder::{
    self, Binding, Capture, CaptureSet, Captures, Placeholder, PlaceholderMode, PlaceholderRef,
};
use crate::range::{NdRange, WorkSize};
use crate::workgroup::{self, GroupKernel};

/// Deferred kernel body; runs on the worker with the staged captures.
pub(crate) type Work = Box<dyn FnOnce(&Captures) -> Result<()> + Send>;

/// Buffer access requested for one submission.
pub struct Accessor<T> {
    buffer: Buffer<T>,
    mode: AccessMode,
}

impl<T: Element> Accessor<T> {
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn buffer_id(&self) -> BufferId {
        self.buffer.id()
    }

    fn readable(&self) -> bool {
        matches!(self.mode, AccessMode::Read | AccessMode::ReadWrite)
    }
}

/// A validated submission, ready for the worker.
pub(crate) struct CommandGroup {
    pub kernel: String,
    pub work_size: WorkSize,
    pub work: Work,
    pub accesses: Vec<(Arc<dyn BufferHandle>, AccessScope)>,
    pub bindings: Vec<Binding>,
}

pub struct Handler {
    kernel: String,
    placeholder_mode: PlaceholderMode,
    accesses: Vec<(Arc<dyn BufferHandle>, AccessScope)>,
    declared: CaptureSet,
    bindings: Vec<Binding>,
    work: Option<(WorkSize, Work)>,
}

impl Handler {
    pub(crate) fn new(kernel: &str, placeholder_mode: PlaceholderMode) -> Self {
        Handler {
            kernel: kernel.to_string(),
            placeholder_mode,
            accesses: Vec::new(),
            declared: CaptureSet::new(),
            bindings: Vec::new(),
            work: None,
        }
    }

    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    fn request<T: Element>(&mut self, buffer: &Buffer<T>, mode: AccessMode) -> Accessor<T> {
        self.accesses.push((
            buffer.handle(),
            AccessScope::new(buffer.id(), mode, AccessTarget::Global),
        ));
        Accessor {
            buffer: buffer.clone(),
            mode,
        }
    }

    pub fn read<T: Element>(&mut self, buffer: &Buffer<T>) -> Accessor<T> {
        self.request(buffer, AccessMode::Read)
    }

    pub fn discard_write<T: Element>(&mut self, buffer: &Buffer<T>) -> Accessor<T> {
        self.request(buffer, AccessMode::DiscardWrite)
    }

    pub fn read_write<T: Element>(&mut self, buffer: &Buffer<T>) -> Accessor<T> {
        self.request(buffer, AccessMode::ReadWrite)
    }

    /// Declare the placeholders a functor captured through its own `CaptureSet`.
    pub fn require(&mut self, captured: &[PlaceholderRef]) {
        self.declared.extend(captured);
    }

    /// Declare `placeholder` for a body written inline with the submission.
    pub fn capture<T: Element>(&mut self, placeholder: &Placeholder<T>) -> Capture<T> {
        self.declared.capture(placeholder)
    }

    /// Re-supply a placeholder; attaches its deferred read scope.
    pub fn bind(&mut self, binding: &Binding) {
        self.accesses.push((
            binding.handle().clone(),
            AccessScope::new(
                binding.buffer_id(),
                AccessMode::Read,
                AccessTarget::Placeholder,
            ),
        ));
        self.bindings.push(binding.clone());
    }

    fn deny<T: Element>(&self, accessor: &Accessor<T>) -> DeviceError {
        DeviceError::AccessDenied {
            kernel: self.kernel.clone(),
            buffer: accessor.buffer_id(),
            mode: accessor.mode.name(),
        }
    }

    fn set_work(&mut self, size: WorkSize, work: Work) -> Result<()> {
        if self.work.is_some() {
            return Err(DeviceError::InvalidRange(format!(
                "command group '{}' already has work attached",
                self.kernel
            )));
        }
        self.work = Some((size, work));
        Ok(())
    }

    /// Flat launch: one work-item per element, `dst[i] = f(&src[i])`.
    pub fn parallel_for<A, B, F>(&mut self, src: Accessor<A>, dst: Accessor<B>, f: F) -> Result<()>
    where
        A: Element,
        B: Element,
        F: Fn(&A, &Captures) -> B + Send + Sync + 'static,
    {
        if !src.readable() {
            return Err(self.deny(&src));
        }
        if !dst.mode.writes() {
            return Err(self.deny(&dst));
        }
        if src.len() != dst.len() {
            return Err(DeviceError::InvalidRange(format!(
                "flat launch over {} source elements into {} destination elements",
                src.len(),
                dst.len()
            )));
        }

        let len = dst.len();
        let work: Work = Box::new(move |captures: &Captures| {
            let src_data = src.buffer.storage().read();
            let mut dst_data = dst.buffer.storage().write();
            dst_data
                .par_iter_mut()
                .zip(src_data.par_iter())
                .for_each(|(out, x)| *out = f(x, captures));
            Ok(())
        });
        self.set_work(WorkSize::Flat(len), work)
    }

    /// Grouped launch over `range` with read-write access to `data`.
    pub fn parallel_for_work_group<T, K>(
        &mut self,
        range: NdRange,
        data: Accessor<T>,
        kernel: K,
    ) -> Result<()>
    where
        T: Element,
        K: GroupKernel<T> + 'static,
    {
        if data.mode != AccessMode::ReadWrite {
            return Err(self.deny(&data));
        }

        let name = self.kernel.clone();
        let work: Work = Box::new(move |_captures: &Captures| {
            let mut storage = data.buffer.storage().write();
            workgroup::execute(&name, &kernel, range, &mut storage)?;
            Ok(())
        });
        self.set_work(WorkSize::Grouped(range), work)
    }

    /// Copy the first `count` elements of `src` into `dst`.
    pub fn copy<T: Element>(&mut self, src: Accessor<T>, dst: Accessor<T>, count: usize) -> Result<()> {
        if !src.readable() {
            return Err(self.deny(&src));
        }
        if !dst.mode.writes() {
            return Err(self.deny(&dst));
        }
        if count > src.len() || count > dst.len() {
            return Err(DeviceError::InvalidRange(format!(
                "copy of {} elements from {} into {}",
                count,
                src.len(),
                dst.len()
            )));
        }

        let work: Work = Box::new(move |_captures: &Captures| {
            let src_data = src.buffer.storage().read();
            let mut dst_data = dst.buffer.storage().write();
            dst_data[..count].clone_from_slice(&src_data[..count]);
            Ok(())
        });
        self.set_work(WorkSize::Copy(count), work)
    }

    /// Validate the collected submission.
    pub(crate) fn finish(self) -> Result<CommandGroup> {
        let (work_size, work) = self.work.ok_or_else(|| DeviceError::NoWork {
            kernel: self.kernel.clone(),
        })?;

        placeholder::validate(
            &self.kernel,
            self.placeholder_mode,
            self.declared.references(),
            &self.bindings,
        )?;

        for (i, (_, a)) in self.accesses.iter().enumerate() {
            for (_, b) in &self.accesses[i + 1..] {
                if a.conflicts_with(b) {
                    return Err(DeviceError::ConflictingScopes {
                        kernel: self.kernel.clone(),
                        buffer: a.buffer,
                    });
                }
            }
        }

        Ok(CommandGroup {
            kernel: self.kernel,
            work_size,
            work,
            accesses: self.accesses,
            bindings: self.bindings,
        })
    }
}
