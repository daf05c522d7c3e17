//! In-memory [`TileGpu`] that records every call.
//!
//! Used by tests and by headless drivers that only need draw ordering and
//! resolved uniforms, not pixels.

use std::collections::HashMap;

use crate::tile::{FrameAttributes, GeometryData, TileAttrs, TileError, TileResult};

use super::backend::{BufferSetId, LayerDraw, TileGpu};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateBufferSet {
        id: BufferSetId,
        vertices: usize,
        indices: usize,
        tiles: usize,
    },
    UploadGeometry {
        id: BufferSetId,
        vertices: usize,
        indices: usize,
    },
    UploadAttributes {
        id: BufferSetId,
        which: TileAttrs,
        /// Character buffer contents at upload time (empty unless `CHAR`).
        chars: Vec<u32>,
    },
    Release {
        id: BufferSetId,
    },
    BindProgram,
    SetBlending(bool),
    Draw {
        id: BufferSetId,
        draw: LayerDraw,
    },
}

#[derive(Debug, Clone, Default)]
struct RecordedSet {
    tiles: usize,
    indices: usize,
    chars: Vec<u32>,
}

/// Recording backend.
#[derive(Debug, Default)]
pub struct RecordingGpu {
    calls: Vec<GpuCall>,
    live: HashMap<BufferSetId, RecordedSet>,
    next_id: u64,
    fail_allocations: bool,
    double_releases: usize,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent allocations and uploads fail with `TileError::Gpu`.
    pub fn fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Draws in issue order.
    pub fn draws(&self) -> impl Iterator<Item = &LayerDraw> {
        self.calls.iter().filter_map(|c| match c {
            GpuCall::Draw { draw, .. } => Some(draw),
            _ => None,
        })
    }

    /// Layer indices of recorded draws in issue order.
    pub fn drawn_layers(&self) -> Vec<usize> {
        self.draws().map(|d| d.layer).collect()
    }

    pub fn draw_count(&self) -> usize {
        self.draws().count()
    }

    /// Attribute subsets uploaded, in order.
    pub fn attribute_uploads(&self) -> Vec<TileAttrs> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                GpuCall::UploadAttributes { which, .. } => Some(*which),
                _ => None,
            })
            .collect()
    }

    pub fn live_sets(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, id: BufferSetId) -> bool {
        self.live.contains_key(&id)
    }

    /// Character buffer contents currently mirrored for `id`.
    pub fn chars(&self, id: BufferSetId) -> Option<&[u32]> {
        self.live.get(&id).map(|s| s.chars.as_slice())
    }

    /// Releases of ids that were not live.
    pub fn double_releases(&self) -> usize {
        self.double_releases
    }

    fn check_alloc(&self) -> TileResult<()> {
        if self.fail_allocations {
            return Err(TileError::gpu("recording backend: allocation refused"));
        }
        Ok(())
    }

    fn set_mut(&mut self, id: BufferSetId) -> TileResult<&mut RecordedSet> {
        self.live
            .get_mut(&id)
            .ok_or_else(|| TileError::gpu(format!("unknown buffer set {id:?}")))
    }
}

impl TileGpu for RecordingGpu {
    fn create_buffer_set(
        &mut self,
        geometry: GeometryData<'_>,
        attrs: FrameAttributes<'_>,
    ) -> TileResult<BufferSetId> {
        self.check_alloc()?;
        let id = BufferSetId(self.next_id);
        self.next_id += 1;

        self.live.insert(
            id,
            RecordedSet {
                tiles: attrs.tile_count(),
                indices: geometry.indices.len(),
                chars: attrs.chars.to_vec(),
            },
        );
        self.calls.push(GpuCall::CreateBufferSet {
            id,
            vertices: geometry.vertices.len(),
            indices: geometry.indices.len(),
            tiles: attrs.tile_count(),
        });
        Ok(id)
    }

    fn upload_geometry(&mut self, id: BufferSetId, geometry: GeometryData<'_>) -> TileResult<()> {
        self.check_alloc()?;
        let set = self.set_mut(id)?;
        set.tiles = geometry.vertices.len() / 4;
        set.indices = geometry.indices.len();
        set.chars.resize(set.tiles, 0);
        self.calls.push(GpuCall::UploadGeometry {
            id,
            vertices: geometry.vertices.len(),
            indices: geometry.indices.len(),
        });
        Ok(())
    }

    fn upload_attributes(
        &mut self,
        id: BufferSetId,
        which: TileAttrs,
        attrs: FrameAttributes<'_>,
    ) -> TileResult<()> {
        self.check_alloc()?;
        let set = self.set_mut(id)?;
        if attrs.tile_count() != set.tiles {
            return Err(TileError::gpu(format!(
                "attribute upload of {} tiles into a set sized for {}",
                attrs.tile_count(),
                set.tiles
            )));
        }
        let chars = if which.contains(TileAttrs::CHAR) {
            set.chars.copy_from_slice(attrs.chars);
            attrs.chars.to_vec()
        } else {
            Vec::new()
        };
        self.calls.push(GpuCall::UploadAttributes { id, which, chars });
        Ok(())
    }

    fn release_buffer_set(&mut self, id: BufferSetId) {
        if self.live.remove(&id).is_none() {
            self.double_releases += 1;
        }
        self.calls.push(GpuCall::Release { id });
    }

    fn bind_program(&mut self) {
        self.calls.push(GpuCall::BindProgram);
    }

    fn set_blending(&mut self, enabled: bool) {
        self.calls.push(GpuCall::SetBlending(enabled));
    }

    fn draw_layer(&mut self, id: BufferSetId, draw: &LayerDraw) -> TileResult<()> {
        let Some(set) = self.live.get(&id) else {
            return Err(TileError::gpu(format!("draw from released buffer set {id:?}")));
        };
        // wgpu rejects index ranges past the bound buffer.
        if draw.elements.end as usize > set.indices {
            return Err(TileError::gpu(format!(
                "draw of elements {:?} past an index buffer of {}",
                draw.elements, set.indices
            )));
        }
        self.calls.push(GpuCall::Draw {
            id,
            draw: draw.clone(),
        });
        Ok(())
    }
}
