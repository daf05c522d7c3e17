use anyhow::{Context, Result};

use super::GpuInit;

/// Adapter, device and queue shared by the window and headless contexts.
pub(crate) struct DeviceParts {
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

pub(crate) fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    })
}

/// Requests a high-performance adapter (able to present to `surface` when one
/// is given) and opens a device on it with `init`'s features and limits.
pub(crate) async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
    init: &GpuInit,
    label: &'static str,
) -> Result<DeviceParts> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .with_context(|| format!("no GPU adapter for the {label}"))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: init.required_features,
            required_limits: init.required_limits.clone(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        })
        .await
        .with_context(|| format!("failed to open the {label}"))?;

    let info = adapter.get_info();
    log::info!("{label}: {} ({:?})", info.name, info.backend);

    Ok(DeviceParts {
        adapter,
        device,
        queue,
    })
}
