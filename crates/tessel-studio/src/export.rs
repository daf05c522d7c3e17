//! Headless PNG export of every frame.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbaImage;

use tessel_engine::coords::{ColorRgba, Viewport};
use tessel_engine::device::{GpuInit, HeadlessGpu, OFFSCREEN_FORMAT, OffscreenTarget};
use tessel_engine::render::RenderCtx;
use tessel_engine::render::tiles::{
    CharsetAtlas, TileRenderer, TileRendererConfig, export_frame, export_size,
};
use tessel_engine::tile::{RenderContext, SharedGrid, TileRenderable};

use crate::glyphs;

pub struct ExportOptions {
    pub out_dir: PathBuf,
    pub scale: u32,
    pub clear: ColorRgba,
    /// Export only this frame instead of all of them.
    pub frame: Option<usize>,
}

/// Renders frames of `grid` offscreen and writes `frame_NNNN.png` files.
/// Returns the written paths.
pub fn run(grid: SharedGrid, opts: &ExportOptions) -> Result<Vec<PathBuf>> {
    let gpu = pollster::block_on(HeadlessGpu::new(GpuInit::default()))?;

    let atlas = CharsetAtlas::from_coverage(
        gpu.device(),
        gpu.queue(),
        glyphs::COLUMNS,
        glyphs::ROWS,
        glyphs::CELL,
        glyphs::CELL,
        &glyphs::coverage(),
    )?;
    let (width, height) = export_size(&grid.borrow(), atlas.cell_size(), opts.scale)
        .context("art is empty or too large to export")?;

    let rctx = RenderCtx::new(
        gpu.device(),
        gpu.queue(),
        OFFSCREEN_FORMAT,
        Viewport::new(width as f32, height as f32),
    );
    let mut renderer = TileRenderer::new(&rctx, atlas, TileRendererConfig::default());
    let target = OffscreenTarget::new(gpu.device(), width, height)?;
    let mut art = TileRenderable::create(&mut renderer, grid.clone(), None)
        .context("failed to create tile renderable")?;

    fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("failed to create {}", opts.out_dir.display()))?;

    let frames: Vec<usize> = match opts.frame {
        Some(f) => vec![f % grid.borrow().frame_count()],
        None => (0..grid.borrow().frame_count()).collect(),
    };

    let ctx = RenderContext::default();
    let mut written = Vec::with_capacity(frames.len());
    let result = frames.iter().try_for_each(|&frame| {
        let pixels = export_frame(&mut renderer, &target, &mut art, &ctx, frame, opts.clear)?;
        let path = frame_path(&opts.out_dir, frame);
        save_png(&path, width, height, pixels)?;
        log::info!("wrote {}", path.display());
        written.push(path);
        Ok::<_, anyhow::Error>(())
    });

    art.destroy(&mut renderer);
    result.map(|()| written)
}

fn frame_path(dir: &Path, frame: usize) -> PathBuf {
    dir.join(format!("frame_{frame:04}.png"))
}

fn save_png(path: &Path, width: u32, height: u32, pixels: Vec<u8>) -> Result<()> {
    let image = RgbaImage::from_raw(width, height, pixels)
        .context("readback size does not match the export target")?;
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_paths_are_zero_padded() {
        let p = frame_path(Path::new("out"), 7);
        assert_eq!(p, Path::new("out").join("frame_0007.png"));
    }

    #[test]
    fn save_png_rejects_short_buffers() {
        let dir = std::env::temp_dir().join("tessel-studio-export-test");
        assert!(save_png(&dir.join("short.png"), 4, 4, vec![0; 10]).is_err());
    }
}
