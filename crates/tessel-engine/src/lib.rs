//! Tessel engine crate.
//!
//! Renders animated, multi-layer character-grid art ("tile art") on the GPU.
//!
//! - [`tile`] holds the CPU side: grids, geometry, per-renderable buffer sets,
//!   layer compositing and placement.
//! - [`render::tiles`] is the wgpu backend for it, plus offscreen export.
//! - [`window`], [`device`], [`core`] and [`time`] are the platform runtime
//!   used by the interactive viewer.

pub mod device;
pub mod window;
pub mod time;
pub mod core;

pub mod logging;
pub mod coords;
pub mod render;
pub mod tile;
