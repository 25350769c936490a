//! Frame hooks: serializable work items run on the worker against an engine.
//!
//! A hook either runs once (its result is the reply) or is registered under a
//! key and runs on every frame.

use nabu_engine::engine::Result as EngineResult;
use nabu_engine::gfx::Graphics;
use nabu_engine::{Engine, EngineError, UniformValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn millis_to_seconds() -> f64 {
    0.001
}

/// Work item evaluated against an engine with the current frame counter and
/// elapsed milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum FrameHook {
    Paint,
    SetUniform {
        name: String,
        value: UniformValue,
    },
    /// Sets `name` to elapsed milliseconds times `scale` (seconds by default).
    ElapsedUniform {
        name: String,
        #[serde(default = "millis_to_seconds")]
        scale: f64,
    },
    FrameUniform {
        name: String,
    },
    CheckVitals,
    /// Evaluates to the engine's frame state.
    FrameState,
    /// Runs each hook in order, stopping at the first failure; evaluates to the
    /// last hook's value.
    Sequence {
        hooks: Vec<FrameHook>,
    },
}

impl FrameHook {
    /// Time uniform in seconds plus a paint, the usual per-frame animation.
    pub fn animate(time_uniform: impl Into<String>) -> Self {
        Self::Sequence {
            hooks: vec![
                Self::ElapsedUniform {
                    name: time_uniform.into(),
                    scale: millis_to_seconds(),
                },
                Self::Paint,
            ],
        }
    }

    pub fn run<G: Graphics>(
        &self,
        engine: &mut Engine<G>,
        frame: u64,
        elapsed_ms: f64,
    ) -> EngineResult<Value> {
        match self {
            Self::Paint => engine.paint().map(|()| Value::Null),
            Self::SetUniform { name, value } => engine
                .update_uniform(name, value.clone())
                .map(|()| Value::Null),
            Self::ElapsedUniform { name, scale } => engine
                .update_uniform(name, UniformValue::Scalar((elapsed_ms * scale) as f32))
                .map(|()| Value::Null),
            Self::FrameUniform { name } => engine
                .update_uniform(name, UniformValue::Scalar(frame as f32))
                .map(|()| Value::Null),
            Self::CheckVitals => engine.check_vitals().map(|()| Value::Null),
            Self::FrameState => serde_json::to_value(engine.frame_state())
                .map_err(|e| EngineError::Hook(e.to_string())),
            Self::Sequence { hooks } => {
                let mut last = Value::Null;
                for hook in hooks {
                    last = hook.run(engine, frame, elapsed_ms)?;
                }
                Ok(last)
            }
        }
    }

    /// Turns the hook into an engine frame callback.
    pub fn into_callback<G: Graphics>(
        self,
    ) -> impl FnMut(&mut Engine<G>, u64, f64) -> EngineResult<Value> + 'static {
        move |engine: &mut Engine<G>, frame: u64, elapsed_ms: f64| {
            self.run(engine, frame, elapsed_ms)
        }
    }
}
