//! Device capability profile: name and work-group limit the queue reports.

use crate::config::{Backend, QueueConfig};
use crate::error::Result;

/// Name reported by the host device when the config does not override it.
pub const HOST_DEVICE_NAME: &str = "parfold host device";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Diagnostic only.
    pub name: String,
    pub max_work_group_size: usize,
    pub backend: Backend,
}

impl DeviceInfo {
    /// Resolve the profile for `config`, probing hardware when asked to.
    pub fn from_config(config: &QueueConfig) -> Result<Self> {
        let mut info = match config.backend {
            Backend::Host => DeviceInfo {
                name: HOST_DEVICE_NAME.to_string(),
                max_work_group_size: config.max_work_group_size,
                backend: Backend::Host,
            },
            Backend::Webgpu => probe_webgpu()?,
        };
        if let Some(name) = &config.device_name {
            info.name = name.clone();
        }
        Ok(info)
    }
}

#[cfg(feature = "webgpu-backend")]
fn probe_webgpu() -> Result<DeviceInfo> {
    crate::wgpu_probe::probe()
}

#[cfg(not(feature = "webgpu-backend"))]
fn probe_webgpu() -> Result<DeviceInfo> {
    Err(crate::error::DeviceError::DeviceUnavailable(
        "built without the webgpu-backend feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_profile_uses_config_limits() {
        let config = QueueConfig::default().with_max_work_group_size(64);
        let info = DeviceInfo::from_config(&config).unwrap();
        assert_eq!(info.max_work_group_size, 64);
        assert_eq!(info.name, HOST_DEVICE_NAME);
        assert_eq!(info.backend, Backend::Host);
    }

    #[test]
    fn test_name_override() {
        let config = QueueConfig {
            device_name: Some("test gpu".to_string()),
            ..QueueConfig::default()
        };
        assert_eq!(DeviceInfo::from_config(&config).unwrap().name, "test gpu");
    }

    #[test]
    #[cfg(not(feature = "webgpu-backend"))]
    fn test_webgpu_unavailable_without_feature() {
        let config = QueueConfig {
            backend: Backend::Webgpu,
            ..QueueConfig::default()
        };
        assert!(matches!(
            DeviceInfo::from_config(&config),
            Err(crate::error::DeviceError::DeviceUnavailable(_))
        ));
    }
}
