//! Frame configuration.
//!
//! [`FrameConfig`] holds the display geometry and the delta-time policy used
//! by the [`Orchestrator`](crate::frame::Orchestrator). It can be built in
//! code or parsed from JSON; missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Display geometry and delta-time policy for a running game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Logical canvas width.
    pub canvas_width: f64,
    /// Logical canvas height.
    pub canvas_height: f64,
    /// Initial screen width. `None` means the canvas width.
    pub screen_width: Option<f64>,
    /// Initial screen height. `None` means the canvas height.
    pub screen_height: Option<f64>,
    /// Largest delta in seconds handed to systems. Larger host deltas (for
    /// instance after a pause) are clamped to this.
    pub max_delta: f64,
    /// Delta in seconds for the first [`advance`](crate::frame::Orchestrator::advance)
    /// call, when there is no previous timestamp.
    pub default_delta: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1280.0,
            canvas_height: 720.0,
            screen_width: None,
            screen_height: None,
            max_delta: 0.25,
            default_delta: 1.0 / 60.0,
        }
    }
}

impl FrameConfig {
    /// Parse and validate a config from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] if the text is not valid JSON
    /// for this struct or a value fails [`validate`](Self::validate).
    pub fn from_json_str(text: &str) -> Result<Self, EngineError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| EngineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every size and delta is positive and finite.
    pub fn validate(&self) -> Result<(), EngineError> {
        let (screen_w, screen_h) = self.screen_size();
        let fields = [
            ("canvas_width", self.canvas_width),
            ("canvas_height", self.canvas_height),
            ("screen_width", screen_w),
            ("screen_height", screen_h),
            ("max_delta", self.max_delta),
            ("default_delta", self.default_delta),
        ];
        for (name, value) in fields {
            if !(value.is_finite() && value > 0.0) {
                return Err(EngineError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.default_delta > self.max_delta {
            return Err(EngineError::InvalidConfig(format!(
                "default_delta ({}) exceeds max_delta ({})",
                self.default_delta, self.max_delta
            )));
        }
        Ok(())
    }

    /// Canvas size as `(width, height)`.
    pub fn canvas_size(&self) -> (f64, f64) {
        (self.canvas_width, self.canvas_height)
    }

    /// Initial screen size, falling back to the canvas size.
    pub fn screen_size(&self) -> (f64, f64) {
        (
            self.screen_width.unwrap_or(self.canvas_width),
            self.screen_height.unwrap_or(self.canvas_height),
        )
    }

    /// Clamp a host delta into `[0, max_delta]`. Non-finite deltas become 0.
    pub fn clamp_delta(&self, dt: f64) -> f64 {
        if dt.is_finite() {
            dt.clamp(0.0, self.max_delta)
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
