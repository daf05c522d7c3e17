//! Source tile grid: the data a renderable reads.
//!
//! Authoring (painting, undo, file formats) lives outside the engine. The grid
//! here carries just enough mutation to drive invalidation: tile writes and
//! preview overlays are batched until `commit_pending()`; layer and size
//! changes reach subscribers immediately.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::geometry::{FrameAttributes, Geometry, GeometryData, TileAttrs};
use super::subscribers::{Invalidation, SubscriberId, Subscribers};

/// Hold duration for new frames, in seconds.
pub const DEFAULT_HOLD_SECS: f64 = 0.1;

/// Z spacing between consecutively added layers.
pub const DEFAULT_LAYER_Z_SPACING: f32 = 0.05;

/// Grid shared between the editor and any number of renderables.
pub type SharedGrid = Rc<RefCell<TileGrid>>;

/// Stable identity of a grid, used by the "currently editing" predicate.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct GridId(u64);

impl GridId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Glyph orientation applied when sampling the charset.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum UvMod {
    #[default]
    Normal = 0,
    Rotate90 = 1,
    Rotate180 = 2,
    Rotate270 = 3,
    FlipX = 4,
    FlipY = 5,
    Flip90 = 6,
    Flip270 = 7,
}

impl UvMod {
    pub fn from_raw(v: u32) -> Self {
        match v {
            1 => Self::Rotate90,
            2 => Self::Rotate180,
            3 => Self::Rotate270,
            4 => Self::FlipX,
            5 => Self::FlipY,
            6 => Self::Flip90,
            7 => Self::Flip270,
            _ => Self::Normal,
        }
    }
}

/// One cell of the grid. Colors are palette indices; index 0 is transparent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Tile {
    pub ch: u32,
    pub fg: u32,
    pub bg: u32,
    pub uv: UvMod,
}

impl Tile {
    #[inline]
    pub const fn new(ch: u32, fg: u32, bg: u32) -> Self {
        Self {
            ch,
            fg,
            bg,
            uv: UvMod::Normal,
        }
    }

    #[inline]
    pub const fn with_uv(mut self, uv: UvMod) -> Self {
        self.uv = uv;
        self
    }

    fn changed_attrs(&self, other: &Tile) -> TileAttrs {
        let mut attrs = TileAttrs::empty();
        attrs.set(TileAttrs::CHAR, self.ch != other.ch);
        attrs.set(TileAttrs::UV, self.uv != other.uv);
        attrs.set(TileAttrs::FG, self.fg != other.fg);
        attrs.set(TileAttrs::BG, self.bg != other.bg);
        attrs
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub name: String,
    pub z: f32,
    pub visible: bool,
}

#[derive(Debug, Clone, Default)]
struct FrameData {
    chars: Vec<u32>,
    uvs: Vec<u32>,
    fg: Vec<u32>,
    bg: Vec<u32>,
}

impl FrameData {
    fn blank(tiles: usize) -> Self {
        Self {
            chars: vec![0; tiles],
            uvs: vec![0; tiles],
            fg: vec![0; tiles],
            bg: vec![0; tiles],
        }
    }

    fn get(&self, i: usize) -> Tile {
        Tile {
            ch: self.chars[i],
            fg: self.fg[i],
            bg: self.bg[i],
            uv: UvMod::from_raw(self.uvs[i]),
        }
    }

    fn put(&mut self, i: usize, tile: Tile) {
        self.chars[i] = tile.ch;
        self.uvs[i] = tile.uv as u32;
        self.fg[i] = tile.fg;
        self.bg[i] = tile.bg;
    }

    fn attributes(&self) -> FrameAttributes<'_> {
        FrameAttributes {
            chars: &self.chars,
            uvs: &self.uvs,
            fg: &self.fg,
            bg: &self.bg,
        }
    }
}

/// A transient tile override placed by an external cursor/hover system.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PreviewEdit {
    pub frame: usize,
    pub layer: usize,
    pub x: u32,
    pub y: u32,
    pub original: Tile,
    pub preview: Tile,
}

#[derive(Debug, Default, Copy, Clone)]
struct Pending {
    attrs: TileAttrs,
}

/// Per-frame, per-layer tile arrays plus static geometry.
#[derive(Debug)]
pub struct TileGrid {
    id: GridId,
    width: u32,
    height: u32,
    quad_width: f32,
    quad_height: f32,

    layers: Vec<LayerInfo>,
    frames: Vec<FrameData>,
    holds: Vec<f64>,

    active_frame: usize,
    active_layer: usize,

    geometry: Geometry,
    pending: Pending,
    subscribers: Subscribers,
    preview: Vec<PreviewEdit>,
}

impl TileGrid {
    /// Creates a blank grid with unit quads and default hold durations.
    pub fn new(width: u32, height: u32, frames: usize, layers: usize) -> Self {
        let layer_infos = (0..layers)
            .map(|i| LayerInfo {
                name: format!("Layer {}", i + 1),
                z: i as f32 * DEFAULT_LAYER_Z_SPACING,
                visible: true,
            })
            .collect();
        let tiles = (width * height) as usize * layers;

        Self {
            id: GridId::next(),
            width,
            height,
            quad_width: 1.0,
            quad_height: 1.0,
            layers: layer_infos,
            frames: (0..frames).map(|_| FrameData::blank(tiles)).collect(),
            holds: vec![DEFAULT_HOLD_SECS; frames],
            active_frame: 0,
            active_layer: 0,
            geometry: Geometry::build(width, height, layers, 1.0, 1.0),
            pending: Pending::default(),
            subscribers: Subscribers::default(),
            preview: Vec::new(),
        }
    }

    /// Sets the world-space size of one tile quad.
    pub fn with_quad_size(mut self, quad_width: f32, quad_height: f32) -> Self {
        self.quad_width = quad_width;
        self.quad_height = quad_height;
        self.rebuild_geometry();
        self
    }

    /// Wraps the grid for sharing between renderables.
    pub fn shared(self) -> SharedGrid {
        Rc::new(RefCell::new(self))
    }

    // ── read contract ─────────────────────────────────────────────────────

    #[inline]
    pub fn id(&self) -> GridId {
        self.id
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(quad_width, quad_height)` in world units.
    #[inline]
    pub fn quad_size(&self) -> (f32, f32) {
        (self.quad_width, self.quad_height)
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn tiles_per_layer(&self) -> usize {
        (self.width * self.height) as usize
    }

    pub fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&LayerInfo> {
        self.layers.get(index)
    }

    /// Per-frame hold durations in seconds.
    pub fn holds(&self) -> &[f64] {
        &self.holds
    }

    #[inline]
    pub fn active_frame(&self) -> usize {
        self.active_frame
    }

    #[inline]
    pub fn active_layer(&self) -> usize {
        self.active_layer
    }

    /// True when there is at least one tile, frame and layer to draw.
    pub fn is_drawable(&self) -> bool {
        !self.frames.is_empty() && !self.layers.is_empty() && self.width > 0 && self.height > 0
    }

    pub fn geometry(&self) -> GeometryData<'_> {
        self.geometry.as_data()
    }

    /// Attribute arrays of `frame`, all layers flattened.
    ///
    /// # Panics
    /// Panics if `frame >= frame_count()`.
    pub fn frame_attributes(&self, frame: usize) -> FrameAttributes<'_> {
        self.frames[frame].attributes()
    }

    pub fn tile(&self, frame: usize, layer: usize, x: u32, y: u32) -> Option<Tile> {
        let i = self.tile_index(frame, layer, x, y)?;
        Some(self.frames[frame].get(i))
    }

    // ── edits ─────────────────────────────────────────────────────────────

    /// Writes one tile. Returns `false` when out of bounds.
    ///
    /// Changes are batched; call [`commit_pending`](Self::commit_pending) to
    /// invalidate subscribers.
    pub fn set_tile(&mut self, frame: usize, layer: usize, x: u32, y: u32, tile: Tile) -> bool {
        let Some(i) = self.tile_index(frame, layer, x, y) else {
            return false;
        };
        let old = self.frames[frame].get(i);
        self.pending.attrs |= old.changed_attrs(&tile);
        self.frames[frame].put(i, tile);
        true
    }

    /// Fills every tile of one layer in one frame.
    pub fn fill_layer(&mut self, frame: usize, layer: usize, tile: Tile) {
        for y in 0..self.height {
            for x in 0..self.width {
                self.set_tile(frame, layer, x, y, tile);
            }
        }
    }

    pub fn set_layer_z(&mut self, layer: usize, z: f32) {
        if let Some(l) = self.layers.get_mut(layer) {
            l.z = z;
        }
    }

    pub fn set_layer_visible(&mut self, layer: usize, visible: bool) {
        if let Some(l) = self.layers.get_mut(layer) {
            l.visible = visible;
        }
    }

    pub fn set_active_frame(&mut self, frame: usize) {
        if frame < self.frames.len() {
            self.active_frame = frame;
        }
    }

    pub fn set_active_layer(&mut self, layer: usize) {
        if layer < self.layers.len() {
            self.active_layer = layer;
        }
    }

    /// Sets the hold duration of `frame` in seconds.
    ///
    /// Non-positive values are stored as given; the animation clock clamps
    /// them to its minimum hold when playing.
    pub fn set_hold(&mut self, frame: usize, secs: f64) {
        if let Some(h) = self.holds.get_mut(frame) {
            if secs <= 0.0 || !secs.is_finite() {
                log::warn!("frame {frame} hold {secs}s will be clamped to the minimum hold");
            }
            *h = secs;
        }
    }

    /// Appends a blank frame; returns its index.
    pub fn add_frame(&mut self, hold_secs: f64) -> usize {
        let tiles = self.tiles_per_layer() * self.layers.len();
        self.frames.push(FrameData::blank(tiles));
        self.holds.push(hold_secs);
        self.pending.attrs |= TileAttrs::all();
        self.frames.len() - 1
    }

    /// Appends a blank layer above the current top layer; returns its index.
    pub fn add_layer(&mut self, name: impl Into<String>) -> usize {
        let z = self
            .layers
            .iter()
            .map(|l| l.z)
            .reduce(f32::max)
            .map_or(0.0, |top| top + DEFAULT_LAYER_Z_SPACING);
        self.layers.push(LayerInfo {
            name: name.into(),
            z,
            visible: true,
        });

        let per_layer = self.tiles_per_layer();
        for frame in &mut self.frames {
            for buf in [&mut frame.chars, &mut frame.uvs, &mut frame.fg, &mut frame.bg] {
                buf.extend(std::iter::repeat_n(0, per_layer));
            }
        }
        self.rebuild_geometry();
        self.layers.len() - 1
    }

    /// Removes a layer. The last remaining layer cannot be removed.
    pub fn remove_layer(&mut self, layer: usize) -> bool {
        if layer >= self.layers.len() || self.layers.len() == 1 {
            return false;
        }
        self.layers.remove(layer);

        let per_layer = self.tiles_per_layer();
        let span = layer * per_layer..(layer + 1) * per_layer;
        for frame in &mut self.frames {
            for buf in [&mut frame.chars, &mut frame.uvs, &mut frame.fg, &mut frame.bg] {
                buf.drain(span.clone());
            }
        }
        self.preview.retain(|p| p.layer != layer);
        self.active_layer = self.active_layer.min(self.layers.len() - 1);
        self.rebuild_geometry();
        true
    }

    /// Resizes every frame and layer, keeping the overlapping top-left region.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        let layers = self.layers.len();
        let (old_w, old_h) = (self.width, self.height);
        let new_per_layer = (width * height) as usize;

        for frame in &mut self.frames {
            let mut next = FrameData::blank(new_per_layer * layers);
            for layer in 0..layers {
                for y in 0..height.min(old_h) {
                    for x in 0..width.min(old_w) {
                        let src = layer * (old_w * old_h) as usize + (y * old_w + x) as usize;
                        let dst = layer * new_per_layer + (y * width + x) as usize;
                        next.put(dst, frame.get(src));
                    }
                }
            }
            *frame = next;
        }

        self.width = width;
        self.height = height;
        self.preview.retain(|p| p.x < width && p.y < height);
        self.rebuild_geometry();
    }

    /// True when edits are waiting for [`commit_pending`](Self::commit_pending).
    pub fn has_pending(&self) -> bool {
        !self.pending.attrs.is_empty()
    }

    /// Broadcasts batched changes to every live subscriber.
    pub fn commit_pending(&mut self) {
        let Pending { attrs } = std::mem::take(&mut self.pending);
        if attrs.is_empty() {
            return;
        }
        log::trace!(
            "grid {:?}: committing {:?} to {} subscribers",
            self.id,
            attrs,
            self.subscribers.len()
        );
        self.subscribers.notify(attrs, false);
    }

    // ── subscribers ───────────────────────────────────────────────────────

    pub fn register(&mut self, id: SubscriberId, cell: &Rc<Invalidation>) {
        self.subscribers.register(id, cell);
    }

    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        self.subscribers.unregister(id)
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.subscribers.contains(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    // ── preview overlay ───────────────────────────────────────────────────

    /// Shows `tile` at a cell until the preview is undone.
    pub fn apply_preview(
        &mut self,
        frame: usize,
        layer: usize,
        x: u32,
        y: u32,
        tile: Tile,
    ) -> bool {
        let Some(original) = self.tile(frame, layer, x, y) else {
            return false;
        };
        // Stacked previews on one cell keep the first original.
        let original = self
            .preview
            .iter()
            .find(|p| p.frame == frame && p.layer == layer && p.x == x && p.y == y)
            .map_or(original, |p| p.original);
        self.preview
            .retain(|p| !(p.frame == frame && p.layer == layer && p.x == x && p.y == y));
        self.set_tile(frame, layer, x, y, tile);
        self.preview.push(PreviewEdit {
            frame,
            layer,
            x,
            y,
            original,
            preview: tile,
        });
        true
    }

    pub fn preview_edits(&self) -> &[PreviewEdit] {
        &self.preview
    }

    /// Restores original tiles under every preview and returns the undone set.
    pub fn undo_preview_edits(&mut self) -> Vec<PreviewEdit> {
        let edits = std::mem::take(&mut self.preview);
        for e in edits.iter().rev() {
            self.set_tile(e.frame, e.layer, e.x, e.y, e.original);
        }
        edits
    }

    /// Re-applies previews previously returned by `undo_preview_edits`.
    pub fn reapply_preview_edits(&mut self, edits: Vec<PreviewEdit>) {
        for e in edits {
            self.apply_preview(e.frame, e.layer, e.x, e.y, e.preview);
        }
    }

    // ── internals ─────────────────────────────────────────────────────────

    fn tile_index(&self, frame: usize, layer: usize, x: u32, y: u32) -> Option<usize> {
        if frame >= self.frames.len()
            || layer >= self.layers.len()
            || x >= self.width
            || y >= self.height
        {
            return None;
        }
        Some(layer * self.tiles_per_layer() + (y * self.width + x) as usize)
    }

    fn rebuild_geometry(&mut self) {
        self.geometry = Geometry::build(
            self.width,
            self.height,
            self.layers.len(),
            self.quad_width,
            self.quad_height,
        );
        // Subscribers' buffers no longer match the layout, so structural
        // changes skip the commit batch.
        self.subscribers.notify(TileAttrs::all(), true);
    }
}
