//! Window + runtime loop.
//!
//! Owns the `winit` EventLoop and the viewer window with its `Gpu` and
//! `FrameClock`, and drives `core::App` once per redraw.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig};
