use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::window::Window;

use super::GpuInit;
use super::adapter::{self, DeviceParts};
use super::surface::{self, SurfaceErrorAction};

/// One acquired swapchain image and the encoder recording into it.
///
/// Hand it back through [`Gpu::present`] promptly; a held texture blocks the
/// next acquire.
pub struct SurfaceFrame {
    texture: wgpu::SurfaceTexture,
    pub view: wgpu::TextureView,
    pub encoder: wgpu::CommandEncoder,
}

/// Device, queue and swapchain of the viewer window. The window must outlive
/// `'w`.
pub struct Gpu<'w> {
    surface: wgpu::Surface<'w>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    /// Drawable size in physical pixels; zero while minimised.
    size: PhysicalSize<u32>,
}

impl<'w> Gpu<'w> {
    /// Creates a GPU context bound to a window.
    pub async fn new(window: &'w Window, init: GpuInit) -> Result<Self> {
        let size = window.inner_size();
        anyhow::ensure!(size.width > 0 && size.height > 0, "window has zero size");

        let instance = adapter::new_instance();
        let surface = instance
            .create_surface(window)
            .context("failed to create wgpu surface")?;

        let DeviceParts {
            adapter,
            device,
            queue,
        } = adapter::request_device(&instance, Some(&surface), &init, "tessel device").await?;

        let caps = surface.get_capabilities(&adapter);
        let config =
            surface::surface_config(&caps, size, &init).context("no supported surface formats")?;
        surface.configure(&device, &config);
        log::info!(
            "swapchain {:?} {}x{} ({:?})",
            config.format,
            config.width,
            config.height,
            config.present_mode
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
        })
    }

    /// Returns the active surface format.
    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Reconfigures the surface after a resize.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        surface::apply_resize(
            &self.surface,
            &self.device,
            &mut self.config,
            &mut self.size,
            new_size,
        );
    }

    fn is_minimised(&self) -> bool {
        self.size.width == 0 || self.size.height == 0
    }

    /// Acquires the next swapchain image. On failure the surface is
    /// reconfigured when that can help, and the returned action says what the
    /// caller does with this frame.
    pub fn acquire_frame(&mut self) -> std::result::Result<SurfaceFrame, SurfaceErrorAction> {
        let texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err) => {
                let action = surface::action_for(&err);
                log::debug!("frame acquire failed: {err}; {action:?}");
                if action == SurfaceErrorAction::Reconfigured && !self.is_minimised() {
                    self.surface.configure(&self.device, &self.config);
                }
                return Err(action);
            }
        };
        let view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tessel frame encoder"),
            });

        Ok(SurfaceFrame {
            texture,
            view,
            encoder,
        })
    }

    /// Submits the frame's commands and presents its image.
    pub fn present(&self, frame: SurfaceFrame) {
        let SurfaceFrame {
            texture,
            view,
            encoder,
        } = frame;
        self.queue.submit(std::iter::once(encoder.finish()));
        drop(view);
        texture.present();
    }
}
