use anyhow::{Context, Result};

use crate::coords::ColorRgba;
use crate::device::OffscreenTarget;
use crate::render::RenderTarget;
use crate::tile::{RenderContext, TileGrid, TileRenderable};

use super::renderer::TileRenderer;

/// Pixel size of an export: one charset cell per tile, times `scale`.
pub fn export_size(grid: &TileGrid, cell: (u32, u32), scale: u32) -> Option<(u32, u32)> {
    let scale = scale.max(1);
    let width = grid.width().checked_mul(cell.0)?.checked_mul(scale)?;
    let height = grid.height().checked_mul(cell.1)?.checked_mul(scale)?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Renders `frame` of `renderable` into `target` and returns its RGBA pixels.
///
/// The renderable's interactive state is untouched afterwards. `renderer` must
/// have been built for the target's format.
pub fn export_frame(
    renderer: &mut TileRenderer,
    target: &OffscreenTarget,
    renderable: &mut TileRenderable,
    ctx: &RenderContext,
    frame: usize,
    clear: ColorRgba,
) -> Result<Vec<u8>> {
    anyhow::ensure!(
        renderer.format() == target.format(),
        "renderer targets {:?}, export target is {:?}",
        renderer.format(),
        target.format()
    );

    let pixels = renderable
        .render_frame_for_export(renderer, ctx, frame, |r: &mut TileRenderer| {
            let mut encoder = r
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("tessel export encoder"),
                });
            {
                let mut pass = RenderTarget::new(&mut encoder, target.view());
                r.flush(&mut pass, Some(clear));
            }
            target.encode_readback(&mut encoder);
            r.queue().submit(std::iter::once(encoder.finish()));
            target.read_rgba(r.device())
        })
        .with_context(|| format!("failed to export frame {frame}"))?;

    let (w, h) = target.size();
    log::debug!("exported frame {frame}: {w}x{h}, {} bytes", pixels.len());
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_size_scales_cells() {
        let grid = TileGrid::new(10, 4, 1, 1);
        assert_eq!(export_size(&grid, (8, 8), 1), Some((80, 32)));
        assert_eq!(export_size(&grid, (8, 16), 3), Some((240, 192)));
        assert_eq!(export_size(&grid, (8, 8), 0), Some((80, 32)));
    }

    #[test]
    fn export_size_rejects_empty_or_overflowing() {
        assert_eq!(export_size(&TileGrid::new(0, 4, 1, 1), (8, 8), 1), None);
        assert_eq!(export_size(&TileGrid::new(u32::MAX, 1, 0, 0), (8, 8), 1), None);
    }
}
