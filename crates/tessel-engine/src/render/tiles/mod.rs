//! Tile rendering backends.
//!
//! - [`TileGpu`]: the seam the tile core draws through
//! - [`TileRenderer`]: wgpu implementation (charset atlas + palette + WGSL program)
//! - [`RecordingGpu`]: records calls instead of drawing
//! - [`export_frame`]: one-frame offscreen capture with pixel readback

mod backend;
mod charset;
mod export;
mod recording;
mod renderer;

pub use backend::{BufferSetId, LayerDraw, TileGpu};
pub use charset::CharsetAtlas;
pub use export::{export_frame, export_size};
pub use recording::{GpuCall, RecordingGpu};
pub use renderer::{TileRenderer, TileRendererConfig, default_palette};
