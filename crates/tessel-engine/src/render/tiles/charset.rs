use anyhow::{Context, Result};

/// Glyph atlas sampled by the tile shader.
///
/// The atlas is a `columns x rows` grid of equally sized cells stored as a
/// single-channel coverage texture. Character index `i` lives in cell
/// `(i % columns, i / columns)`.
pub struct CharsetAtlas {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    columns: u32,
    rows: u32,
    cell_width: u32,
    cell_height: u32,
}

impl CharsetAtlas {
    /// Uploads a coverage bitmap (one byte per pixel, row-major, 0 = empty).
    pub fn from_coverage(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        columns: u32,
        rows: u32,
        cell_width: u32,
        cell_height: u32,
        coverage: &[u8],
    ) -> Result<Self> {
        let (width, height) = atlas_size(columns, rows, cell_width, cell_height, coverage.len())?;

        let max = device.limits().max_texture_dimension_2d;
        anyhow::ensure!(
            width <= max && height <= max,
            "charset atlas {width}x{height} exceeds device limit {max}"
        );

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("tessel charset atlas"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            coverage,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Nearest filtering and clamped edges keep glyph cells from bleeding.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tessel charset sampler"),
            ..Default::default()
        });

        log::debug!(
            "charset atlas: {columns}x{rows} cells of {cell_width}x{cell_height} px ({width}x{height})"
        );

        Ok(Self {
            texture,
            view,
            sampler,
            columns,
            rows,
            cell_width,
            cell_height,
        })
    }

    #[inline]
    pub fn columns(&self) -> u32 {
        self.columns
    }

    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Glyph count.
    #[inline]
    pub fn len(&self) -> u32 {
        self.columns * self.rows
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One cell's size in texels.
    #[inline]
    pub fn cell_size(&self) -> (u32, u32) {
        (self.cell_width, self.cell_height)
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

/// Validates atlas dimensions against the coverage length and returns the
/// texture size in texels.
fn atlas_size(
    columns: u32,
    rows: u32,
    cell_width: u32,
    cell_height: u32,
    coverage_len: usize,
) -> Result<(u32, u32)> {
    anyhow::ensure!(
        columns > 0 && rows > 0 && cell_width > 0 && cell_height > 0,
        "charset atlas needs non-zero cells (got {columns}x{rows} of {cell_width}x{cell_height})"
    );
    let width = columns
        .checked_mul(cell_width)
        .context("charset atlas width overflows")?;
    let height = rows
        .checked_mul(cell_height)
        .context("charset atlas height overflows")?;
    let expected = width as usize * height as usize;
    anyhow::ensure!(
        coverage_len == expected,
        "charset coverage has {coverage_len} bytes, expected {expected} ({width}x{height})"
    );
    Ok((width, height))
}
