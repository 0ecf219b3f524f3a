//! Work-size descriptors.

use crate::error::{DeviceError, Result};

/// Grouped launch: `global` work-items split into groups of `local`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NdRange {
    global: usize,
    local: usize,
}

impl NdRange {
    /// `global` must be a non-zero multiple of a non-zero `local`.
    pub fn new(global: usize, local: usize) -> Result<Self> {
        if local == 0 {
            return Err(DeviceError::InvalidRange(
                "work-group size must be non-zero".to_string(),
            ));
        }
        if global == 0 || global % local != 0 {
            return Err(DeviceError::InvalidRange(format!(
                "global size {} is not a non-zero multiple of work-group size {}",
                global, local
            )));
        }
        Ok(NdRange { global, local })
    }

    /// Smallest grouped range covering `len` items with groups of `local`.
    pub fn covering(len: usize, local: usize) -> Result<Self> {
        if local == 0 {
            return Self::new(len, local);
        }
        Self::new(len.div_ceil(local) * local, local)
    }

    pub fn global(&self) -> usize {
        self.global
    }

    pub fn local(&self) -> usize {
        self.local
    }

    pub fn groups(&self) -> usize {
        self.global / self.local
    }
}

/// Shape of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkSize {
    /// One work-item per element.
    Flat(usize),
    Grouped(NdRange),
    /// Buffer-to-buffer copy of this many elements.
    Copy(usize),
}

/// Position of one work-item inside a grouped launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdItem {
    pub global_id: usize,
    pub local_id: usize,
    pub group_id: usize,
    pub local_range: usize,
    pub group_range: usize,
}

impl NdItem {
    pub(crate) fn new(range: &NdRange, group_id: usize, local_id: usize) -> Self {
        NdItem {
            global_id: group_id * range.local() + local_id,
            local_id,
            group_id,
            local_range: range.local(),
            group_range: range.groups(),
        }
    }
}
