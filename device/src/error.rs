//! Device error taxonomy.
//!
//! Usage errors (bad ranges, conflicting scopes, placeholder bindings) are
//! detected while a command group is being built and never reach the worker.
//! Runtime failures (allocation, kernel faults) are reported through the
//! task that hit them and abort the rest of the queue.

use std::fmt;

use crate::buffer::BufferId;
use crate::placeholder::PlaceholderId;

/// Errors raised by the device queue and its buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Allocation would exceed the device memory budget.
    OutOfMemory { requested: usize, available: usize },

    /// A kernel panicked while executing on the device worker.
    KernelFault { kernel: String, message: String },

    /// The queue was torn down by an earlier failure.
    QueueAborted { kernel: String },

    /// A task that touched this buffer failed; its contents are undefined.
    BufferInvalidated(BufferId),

    /// Malformed work-size descriptor.
    InvalidRange(String),

    /// The accessor's mode does not permit the requested operation.
    AccessDenied {
        kernel: String,
        buffer: BufferId,
        mode: &'static str,
    },

    /// One submission requested incompatible scopes on the same buffer.
    ConflictingScopes { kernel: String, buffer: BufferId },

    /// The functor captured a placeholder that was not re-bound at submission.
    MissingBinding {
        kernel: String,
        placeholder: PlaceholderId,
    },

    /// The binding for a placeholder points at a different buffer.
    BindingMismatch {
        kernel: String,
        placeholder: PlaceholderId,
        expected: BufferId,
        found: BufferId,
    },

    /// Implicit placeholder discovery is not supported by this runtime.
    ImplicitPlaceholder {
        kernel: String,
        placeholder: PlaceholderId,
    },

    /// A command group was submitted without any work attached.
    NoWork { kernel: String },

    /// No device matching the configuration could be opened.
    DeviceUnavailable(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "device out of memory: requested {} bytes, {} available",
                requested, available
            ),
            DeviceError::KernelFault { kernel, message } => {
                write!(f, "kernel '{}' faulted: {}", kernel, message)
            }
            DeviceError::QueueAborted { kernel } => write!(
                f,
                "queue aborted by an earlier failure, '{}' was not run",
                kernel
            ),
            DeviceError::BufferInvalidated(id) => {
                write!(f, "buffer {} was invalidated by a failed task", id)
            }
            DeviceError::InvalidRange(msg) => write!(f, "invalid range: {}", msg),
            DeviceError::AccessDenied {
                kernel,
                buffer,
                mode,
            } => write!(
                f,
                "kernel '{}' cannot use buffer {} through a {} accessor here",
                kernel, buffer, mode
            ),
            DeviceError::ConflictingScopes { kernel, buffer } => write!(
                f,
                "kernel '{}' requests conflicting access scopes on buffer {}",
                kernel, buffer
            ),
            DeviceError::MissingBinding {
                kernel,
                placeholder,
            } => write!(
                f,
                "kernel '{}' captures placeholder {} but no binding was supplied",
                kernel, placeholder
            ),
            DeviceError::BindingMismatch {
                kernel,
                placeholder,
                expected,
                found,
            } => write!(
                f,
                "kernel '{}': placeholder {} refers to buffer {} but was bound to buffer {}",
                kernel, placeholder, expected, found
            ),
            DeviceError::ImplicitPlaceholder {
                kernel,
                placeholder,
            } => write!(
                f,
                "kernel '{}' captures placeholder {}; implicit placeholder binding is unsupported",
                kernel, placeholder
            ),
            DeviceError::NoWork { kernel } => {
                write!(f, "command group '{}' has no work attached", kernel)
            }
            DeviceError::DeviceUnavailable(msg) => write!(f, "device unavailable: {}", msg),
        }
    }
}

impl std::error::Error for DeviceError {}

pub type Result<T> = std::result::Result<T, DeviceError>;
