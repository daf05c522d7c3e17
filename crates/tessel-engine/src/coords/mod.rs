//! Shared value types for renderers and the runtime.
//!
//! Window space is logical pixels, origin top-left. Tile art lives in world
//! units (one tile per unit) and reaches clip space through a camera.

mod color;
mod viewport;

pub use color::ColorRgba;
pub use viewport::Viewport;
