//! Backend seam between the tile core and the GPU.
//!
//! The core never touches wgpu directly. Every GPU-visible action (buffer
//! lifecycle, program binding, blend state, draw) goes through [`TileGpu`], so
//! the same render path drives the wgpu renderer, headless capture, and the
//! recording backend used in tests.

use std::ops::Range;

use glam::{Mat4, Vec3};

use crate::tile::{FrameAttributes, GeometryData, TileAttrs, TileResult};

/// Opaque handle to one buffer set owned by a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BufferSetId(pub(crate) u64);

/// Fully resolved state for drawing one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerDraw {
    pub layer: usize,
    /// Index range into the shared element buffer.
    pub elements: Range<u32>,
    pub projection: Mat4,
    pub view: Mat4,
    /// Grid origin; `z` already includes layer depth or override.
    pub position: Vec3,
    pub scale: Vec3,
    pub alpha: f32,
    pub bg_alpha: f32,
    pub brightness: f32,
}

/// GPU operations required by the tile core.
///
/// Callers must not assume any binding or blend state survives between calls.
pub trait TileGpu {
    /// Allocates static geometry buffers and the four dynamic attribute buffers.
    fn create_buffer_set(
        &mut self,
        geometry: GeometryData<'_>,
        attrs: FrameAttributes<'_>,
    ) -> TileResult<BufferSetId>;

    /// Re-uploads vertex/index buffers, resizing attribute storage when the
    /// tile count changed.
    fn upload_geometry(&mut self, id: BufferSetId, geometry: GeometryData<'_>) -> TileResult<()>;

    /// Re-uploads only the attribute buffers named in `which`.
    fn upload_attributes(
        &mut self,
        id: BufferSetId,
        which: TileAttrs,
        attrs: FrameAttributes<'_>,
    ) -> TileResult<()>;

    /// Releases every handle of the set.
    fn release_buffer_set(&mut self, id: BufferSetId);

    /// Binds the tile program, charset and palette.
    fn bind_program(&mut self);

    /// Enables or disables source-alpha blending for subsequent draws.
    fn set_blending(&mut self, enabled: bool);

    fn draw_layer(&mut self, id: BufferSetId, draw: &LayerDraw) -> TileResult<()>;
}
