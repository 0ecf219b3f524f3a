//! parfold device layer
//!
//! An ordered command queue in front of one compute device. Buffers are
//! shared handles over host memory; each submission declares how it touches
//! them (read, discard-write, read-write, or deferred through a placeholder)
//! and the queue orders conflicting submissions behind one another.
//!
//! # Execution
//!
//! Kernels run on the queue's worker thread. Flat launches are data-parallel
//! over rayon; grouped launches run their work-groups in parallel, each one
//! lock-step through barrier-separated phases (see [`workgroup`]).
//!
//! # Backends
//!
//! The host backend takes its capability profile from [`QueueConfig`]. With
//! the `webgpu-backend` feature the profile is probed from a wgpu adapter.

pub mod access;
pub mod buffer;
pub mod config;
pub mod device;
pub mod error;
pub mod handler;
pub mod placeholder;
pub mod queue;
pub mod range;
pub mod task;
pub mod workgroup;

mod hazard;
mod kernel_registry;
mod memory;

#[cfg(feature = "webgpu-backend")]
pub mod wgpu_probe;

pub use access::{AccessMode, AccessScope, AccessTarget};
pub use buffer::{Buffer, BufferId, Element, HostRead, HostWrite};
pub use config::{Backend, QueueConfig, DEFAULT_MAX_WORK_GROUP_SIZE};
pub use device::{DeviceInfo, HOST_DEVICE_NAME};
pub use error::{DeviceError, Result};
pub use handler::{Accessor, Handler};
pub use kernel_registry::KernelStats;
pub use placeholder::{
    Binding, Capture, CaptureSet, Captures, Placeholder, PlaceholderId, PlaceholderMode,
    PlaceholderRef,
};
pub use queue::Queue;
pub use range::{NdItem, NdRange, WorkSize};
pub use task::{Task, TaskId, TaskStatus};
pub use workgroup::{GroupBarrier, GroupContext, GroupKernel, GroupReport, LocalMemory};
