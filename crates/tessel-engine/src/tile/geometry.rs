//! Static tile geometry and per-frame attribute views.
//!
//! Layout conventions:
//! - one quad per tile, 4 vertices + 6 indices (two triangles)
//! - tiles are laid out per layer, row-major, top-left origin
//! - +X right, +Y up; row `y` spans `[-(y+1) * quad_h, -y * quad_h]`
//! - every layer repeats the same positions; only the global tile index differs

use bytemuck::{Pod, Zeroable};

/// Indices emitted per tile quad.
pub const INDICES_PER_TILE: u32 = 6;

/// Vertices emitted per tile quad.
pub const VERTICES_PER_TILE: u32 = 4;

const QUAD_CORNER_INDICES: [u32; 6] = [0, 1, 2, 0, 2, 3];

bitflags::bitflags! {
    /// Subset of per-tile attribute buffers.
    ///
    /// Uploads cost scales with grid area, so callers pass only what changed.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
    pub struct TileAttrs: u8 {
        const CHAR = 1 << 0;
        const UV   = 1 << 1;
        const FG   = 1 << 2;
        const BG   = 1 << 3;
    }
}

/// Vertex of a tile quad.
///
/// `tile` is the global tile index (`layer * width * height + y * width + x`)
/// used by the vertex shader to fetch attributes; `corner` is 0..4 clockwise
/// from top-left.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct TileVertex {
    pub pos: [f32; 2],
    pub tile: u32,
    pub corner: u32,
}

impl TileVertex {
    const ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
        0 => Float32x2, // pos
        1 => Uint32,    // tile
        2 => Uint32     // corner
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<TileVertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRS,
        }
    }
}

/// CPU-side static geometry shared by every layer of a grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<TileVertex>,
    pub indices: Vec<u32>,
}

impl Geometry {
    /// Builds quads for `layers` copies of a `width x height` grid.
    pub fn build(width: u32, height: u32, layers: usize, quad_w: f32, quad_h: f32) -> Self {
        let per_layer = (width * height) as usize;
        let tiles = per_layer * layers;

        let mut vertices = Vec::with_capacity(tiles * VERTICES_PER_TILE as usize);
        let mut indices = Vec::with_capacity(tiles * INDICES_PER_TILE as usize);

        for layer in 0..layers {
            for y in 0..height {
                for x in 0..width {
                    let tile = (layer * per_layer) as u32 + y * width + x;
                    let left = x as f32 * quad_w;
                    let right = (x + 1) as f32 * quad_w;
                    let top = -(y as f32) * quad_h;
                    let bottom = -((y + 1) as f32) * quad_h;

                    let base = vertices.len() as u32;
                    vertices.extend_from_slice(&[
                        TileVertex {
                            pos: [left, top],
                            tile,
                            corner: 0,
                        },
                        TileVertex {
                            pos: [right, top],
                            tile,
                            corner: 1,
                        },
                        TileVertex {
                            pos: [right, bottom],
                            tile,
                            corner: 2,
                        },
                        TileVertex {
                            pos: [left, bottom],
                            tile,
                            corner: 3,
                        },
                    ]);
                    indices.extend(QUAD_CORNER_INDICES.iter().map(|i| base + i));
                }
            }
        }

        Self { vertices, indices }
    }

    #[inline]
    pub fn element_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn as_data(&self) -> GeometryData<'_> {
        GeometryData {
            vertices: &self.vertices,
            indices: &self.indices,
        }
    }
}

/// Borrowed view of static geometry handed to a GPU backend.
#[derive(Debug, Copy, Clone)]
pub struct GeometryData<'a> {
    pub vertices: &'a [TileVertex],
    pub indices: &'a [u32],
}

/// Borrowed view of one animation frame's attribute arrays (all layers).
#[derive(Debug, Copy, Clone)]
pub struct FrameAttributes<'a> {
    pub chars: &'a [u32],
    pub uvs: &'a [u32],
    pub fg: &'a [u32],
    pub bg: &'a [u32],
}

impl<'a> FrameAttributes<'a> {
    /// Returns the array backing one attribute flag.
    ///
    /// `which` must contain exactly one flag; multi-flag sets resolve to the
    /// first matching buffer in `CHAR, UV, FG, BG` order.
    pub fn slice(&self, which: TileAttrs) -> &'a [u32] {
        if which.contains(TileAttrs::CHAR) {
            self.chars
        } else if which.contains(TileAttrs::UV) {
            self.uvs
        } else if which.contains(TileAttrs::FG) {
            self.fg
        } else {
            self.bg
        }
    }

    #[inline]
    pub fn tile_count(&self) -> usize {
        self.chars.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_emits_one_quad_per_tile_per_layer() {
        let g = Geometry::build(3, 2, 2, 1.0, 1.0);
        assert_eq!(g.vertices.len(), 3 * 2 * 2 * 4);
        assert_eq!(g.element_count(), 3 * 2 * 2 * 6);
    }

    #[test]
    fn second_layer_reuses_positions_with_offset_tile_index() {
        let g = Geometry::build(2, 2, 2, 1.0, 1.0);
        let first = g.vertices[0];
        let second = g.vertices[4 * 4];
        assert_eq!(first.pos, second.pos);
        assert_eq!(first.tile, 0);
        assert_eq!(second.tile, 4);
    }

    #[test]
    fn quads_extend_right_and_down() {
        let g = Geometry::build(2, 2, 1, 0.5, 2.0);
        // Tile (1, 1) starts at vertex 12.
        let v = &g.vertices[12..16];
        assert_eq!(v[0].pos, [0.5, -2.0]);
        assert_eq!(v[2].pos, [1.0, -4.0]);
        assert_eq!(v[0].tile, 3);
    }

    #[test]
    fn indices_reference_own_quad() {
        let g = Geometry::build(2, 1, 1, 1.0, 1.0);
        assert_eq!(&g.indices[6..12], &[4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn attribute_slice_selects_buffer() {
        let (c, u, f, b) = ([1], [2], [3], [4]);
        let attrs = FrameAttributes {
            chars: &c,
            uvs: &u,
            fg: &f,
            bg: &b,
        };
        assert_eq!(attrs.slice(TileAttrs::FG), &[3]);
        assert_eq!(attrs.slice(TileAttrs::BG), &[4]);
    }
}
