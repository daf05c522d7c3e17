use std::sync::mpsc;

use anyhow::{Context, Result, anyhow};

/// Pixel format of export targets. Linear so palette values land unchanged.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const BYTES_PER_PIXEL: u32 = 4;

/// Offscreen RGBA8 render target with CPU readback.
///
/// Typical use: render into [`view`](Self::view), call
/// [`encode_readback`](Self::encode_readback) on the same encoder, submit, then
/// [`read_rgba`](Self::read_rgba).
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_bytes_per_row: u32,
}

impl OffscreenTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self> {
        anyhow::ensure!(width > 0 && height > 0, "offscreen target has zero size");
        let max = device.limits().max_texture_dimension_2d;
        anyhow::ensure!(
            width <= max && height <= max,
            "offscreen target {width}x{height} exceeds device limit {max}"
        );

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tessel offscreen target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let padded_bytes_per_row = padded_row_bytes(width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("tessel offscreen readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            texture,
            view,
            readback,
            width,
            height,
            padded_bytes_per_row,
        })
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn format(&self) -> wgpu::TextureFormat {
        OFFSCREEN_FORMAT
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Records a copy of the target into the readback buffer.
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// Blocks until the last submitted readback is available and returns
    /// tightly packed RGBA rows, top row first.
    pub fn read_rgba(&self, device: &wgpu::Device) -> Result<Vec<u8>> {
        let slice = self.readback.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::wait_indefinitely())
            .context("failed waiting for GPU readback")?;

        receiver
            .recv()
            .map_err(|_| anyhow!("GPU map callback was dropped"))?
            .context("GPU buffer mapping failed")?;

        let pixels = {
            let mapped = slice.get_mapped_range();
            copy_tight_rows(
                &mapped,
                self.width * BYTES_PER_PIXEL,
                self.padded_bytes_per_row,
                self.height,
            )
        };
        self.readback.unmap();
        pixels
    }
}

/// Row pitch rounded up to wgpu's copy alignment.
pub(crate) fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strips row padding from a mapped readback buffer.
pub(crate) fn copy_tight_rows(
    padded: &[u8],
    row_bytes: u32,
    padded_row_bytes: u32,
    rows: u32,
) -> Result<Vec<u8>> {
    let (row, pitch) = (row_bytes as usize, padded_row_bytes as usize);
    let needed = pitch * rows.saturating_sub(1) as usize + row;
    anyhow::ensure!(
        rows == 0 || padded.len() >= needed,
        "readback holds {} bytes, {rows} rows of pitch {pitch} need {needed}",
        padded.len()
    );

    let mut out = Vec::with_capacity(row * rows as usize);
    for r in 0..rows as usize {
        let start = r * pitch;
        out.extend_from_slice(&padded[start..start + row]);
    }
    Ok(out)
}
