use std::time::Duration;

/// Per-engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Start the frame loop at construction with this rate.
    pub frame_rate: Option<f64>,
    /// Paint right after a size change when something is paintable.
    pub repaint_on_resize: bool,
    /// Lower clamp for the per-frame delta fed into elapsed time.
    pub min_frame_delta: Duration,
    /// Upper clamp for the per-frame delta; a stalled worker does not produce
    /// a jump in elapsed time.
    pub max_frame_delta: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_rate: None,
            repaint_on_resize: true,
            min_frame_delta: Duration::from_micros(100),
            max_frame_delta: Duration::from_millis(250),
        }
    }
}
