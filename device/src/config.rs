//! Queue configuration, deserialized from the `[device]` table of
//! `parfold.toml`.

use serde::Deserialize;

use crate::placeholder::PlaceholderMode;

/// Default work-group limit for the host device.
pub const DEFAULT_MAX_WORK_GROUP_SIZE: usize = 256;

/// Where the device capability profile comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Kernels run on the host worker with the configured limits.
    #[default]
    Host,
    /// Limits and name are probed from a wgpu adapter.
    Webgpu,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Host => "host",
            Backend::Webgpu => "webgpu",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    pub backend: Backend,
    /// Overrides the reported device name.
    pub device_name: Option<String>,
    pub max_work_group_size: usize,
    /// Bytes available to queue allocations; unlimited when unset.
    pub memory_limit: Option<usize>,
    pub placeholder_mode: PlaceholderMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            backend: Backend::Host,
            device_name: None,
            max_work_group_size: DEFAULT_MAX_WORK_GROUP_SIZE,
            memory_limit: None,
            placeholder_mode: PlaceholderMode::Explicit,
        }
    }
}

impl QueueConfig {
    pub fn with_max_work_group_size(mut self, size: usize) -> Self {
        self.max_work_group_size = size;
        self
    }

    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    pub fn with_placeholder_mode(mut self, mode: PlaceholderMode) -> Self {
        self.placeholder_mode = mode;
        self
    }
}
