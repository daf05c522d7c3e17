//! GPU rendering subsystem.
//!
//! The tile core issues GPU work through [`tiles::TileGpu`]; [`tiles::TileRenderer`]
//! implements it on wgpu and encodes queued draws into a [`RenderTarget`].
//!
//! Convention:
//! - tile geometry is in world units, +Y up, art origin at its top-left corner
//! - each draw carries its own projection/view, so world, UI and export views
//!   share one pipeline

mod ctx;
pub mod tiles;

pub use ctx::{RenderCtx, RenderTarget};
