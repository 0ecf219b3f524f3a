//! WebGPU adapter probing via wgpu.
//!
//! Only the adapter's identity and compute limits are used; kernels still
//! execute on the host worker.

use crate::config::Backend;
use crate::device::DeviceInfo;
use crate::error::{DeviceError, Result};

fn request_adapter() -> Option<wgpu::Adapter> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
}

/// Capability profile of the best available adapter.
pub fn probe() -> Result<DeviceInfo> {
    let adapter = request_adapter()
        .ok_or_else(|| DeviceError::DeviceUnavailable("no wgpu adapter found".to_string()))?;
    let info = adapter.get_info();
    let limits = adapter.limits();
    log::debug!(
        "wgpu adapter '{}' ({:?}), max invocations per workgroup {}",
        info.name,
        info.backend,
        limits.max_compute_invocations_per_workgroup
    );
    Ok(DeviceInfo {
        name: info.name,
        max_work_group_size: limits.max_compute_invocations_per_workgroup as usize,
        backend: Backend::Webgpu,
    })
}

/// Whether any wgpu adapter is available on this system.
pub fn is_available() -> bool {
    request_adapter().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_when_available() {
        if !is_available() {
            return;
        }
        let info = probe().unwrap();
        assert!(info.max_work_group_size >= 1);
        assert_eq!(info.backend, Backend::Webgpu);
    }
}
