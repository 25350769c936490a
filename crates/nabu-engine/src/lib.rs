//! Nabu engine crate.
//!
//! Owns everything that runs next to a graphics context: the GL-style
//! backend abstraction, the multi-pass shader [`Engine`] and its frame loop.

pub mod engine;
pub mod gfx;
pub mod logging;
pub mod time;

pub use engine::{Engine, EngineConfig, EngineError, FrameCallback, FrameState, UniformValue};
pub use time::DEFAULT_FRAME_RATE;
