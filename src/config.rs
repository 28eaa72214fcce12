//! Engine configuration.
//!
//! Consolidates the user-tunable knobs (replay window length, capture rate,
//! frame shape, export codec) into a single typed struct. Config is plain
//! data passed by value: there is no global settings state, and persistence
//! is left to the embedding application. How many cameras run is decided by
//! the source list handed to the engine, not by config.

use serde::{Deserialize, Serialize};

use crate::export::ExportCodec;

/// Settings for a [`ReplayEngine`](crate::engine::ReplayEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Replay window length in frames per camera.
    pub buffer_capacity: usize,

    /// Fallback coordinator tick rate in frames per second, used when the
    /// reference source reports no usable nominal rate.
    pub fps: u32,

    /// Expected frame width in pixels.
    pub width: u32,

    /// Expected frame height in pixels.
    pub height: u32,

    /// Codec used when exporting clips.
    pub codec: ExportCodec,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 250,
            fps: 25,
            width: 1920,
            height: 1080,
            codec: ExportCodec::H264,
        }
    }
}

impl EngineConfig {
    /// Clamp settings to acceptable ranges.
    pub fn validate(&mut self) {
        self.buffer_capacity = self.buffer_capacity.max(1);
        self.fps = self.fps.clamp(1, 120);
    }

    /// Coordinator tick interval derived from the fallback capture rate.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / self.fps as f64)
    }
}
