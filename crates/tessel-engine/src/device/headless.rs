use anyhow::Result;

use super::GpuInit;
use super::adapter::{self, DeviceParts};

/// Device and queue without a window, for offscreen export.
pub struct HeadlessGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl HeadlessGpu {
    /// Acquires an adapter with no surface requirement. Surface options in
    /// `init` are ignored.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let instance = adapter::new_instance();
        let DeviceParts { device, queue, .. } =
            adapter::request_device(&instance, None, &init, "tessel headless device").await?;
        Ok(Self { device, queue })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}
