//! Time subsystem.
//!
//! Provides stable, testable frame timing without owning a thread or timer.
//! Every entry point takes the current `Instant`, so the worker loop decides
//! when time advances and tests can drive it deterministically.

mod frame_clock;
mod frame_loop;

pub use frame_clock::{FrameClock, FrameTime};
pub use frame_loop::{FrameLoop, FrameTick, DEFAULT_FRAME_RATE};
