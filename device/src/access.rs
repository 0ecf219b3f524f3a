//! Access scopes: how one submission touches one buffer.

use crate::buffer::BufferId;

/// Access mode requested by a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    /// Write-only; prior contents are not preserved.
    DiscardWrite,
    ReadWrite,
}

impl AccessMode {
    pub fn writes(self) -> bool {
        matches!(self, Self::DiscardWrite | Self::ReadWrite)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::DiscardWrite => "discard_write",
            Self::ReadWrite => "read_write",
        }
    }
}

/// Memory the scope is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessTarget {
    Global,
    /// Deferred scope resolved from a binding at submission time. Staged
    /// into kernel-private memory at launch.
    Placeholder,
}

/// A `(mode, target)` declaration against exactly one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessScope {
    pub buffer: BufferId,
    pub mode: AccessMode,
    pub target: AccessTarget,
}

impl AccessScope {
    pub fn new(buffer: BufferId, mode: AccessMode, target: AccessTarget) -> Self {
        AccessScope {
            buffer,
            mode,
            target,
        }
    }

    /// Single-writer/multiple-reader: two scopes on the same buffer conflict
    /// unless both only read.
    pub fn conflicts_with(&self, other: &AccessScope) -> bool {
        self.buffer == other.buffer && (self.mode.writes() || other.mode.writes())
    }
}
