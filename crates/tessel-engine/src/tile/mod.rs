//! Tile-art rendering core.
//!
//! A [`TileGrid`] holds animated, layered character-grid art. A
//! [`TileRenderable`] is one GPU-backed view of a grid: it mirrors one frame
//! into its own buffer set, plays the animation, places itself in the world,
//! and issues one indexed draw per visible layer in z order.
//!
//! The core talks to the GPU only through [`crate::render::tiles::TileGpu`] and
//! reads all ambient state from an explicit [`RenderContext`].

mod buffers;
mod compositor;
mod context;
mod error;
mod geometry;
mod grid;
mod placement;
mod renderable;
mod subscribers;

pub use buffers::{BufferSet, validate_source};
pub use compositor::{CompositeParams, LayerKey, LayerPass, LayerSelection, draw_order, plan_layers};
pub use context::{Camera, InactiveLayerVisibility, RenderContext};
pub use error::{TileError, TileResult};
pub use geometry::{
    FrameAttributes, Geometry, GeometryData, INDICES_PER_TILE, TileAttrs, TileVertex,
    VERTICES_PER_TILE,
};
pub use grid::{
    DEFAULT_HOLD_SECS, DEFAULT_LAYER_Z_SPACING, GridId, LayerInfo, PreviewEdit, SharedGrid, Tile,
    TileGrid, UvMod,
};
pub use placement::{
    Anchor, AnchorState, DEFAULT_MOVE_RATE, MIN_MOVE_TICK_MS, Placement, Resolved, ViewMode,
};
pub use renderable::TileRenderable;
pub use subscribers::{Invalidation, SubscriberId, Subscribers};
