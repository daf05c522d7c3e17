//! GPU device, surface and offscreen targets.
//!
//! - `Gpu` owns the viewer window's device/queue and swapchain
//! - `HeadlessGpu` owns a device with no surface, for export
//! - `OffscreenTarget` is an RGBA8 render target with CPU readback

mod adapter;
mod context;
mod headless;
mod init;
mod offscreen;
mod surface;

pub use context::{Gpu, SurfaceFrame};
pub use headless::HeadlessGpu;
pub use init::GpuInit;
pub use offscreen::{OFFSCREEN_FORMAT, OffscreenTarget};
pub use surface::SurfaceErrorAction;
