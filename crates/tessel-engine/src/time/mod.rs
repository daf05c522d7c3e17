//! Time subsystem.
//!
//! - `FrameClock` produces clamped per-frame deltas for the render loop.
//! - `AnimationClock` turns elapsed milliseconds into displayed-frame advances.

mod anim_clock;
mod frame_clock;

pub use anim_clock::{AnimationClock, MIN_HOLD_MS, PlaybackState, hold_ms};
pub use frame_clock::{FrameClock, FrameTime};
