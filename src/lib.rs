//! Instant-replay capture engine for multi-camera video.
//!
//! Each camera feeds a fixed-capacity ring buffer holding the last N frames.
//! A sync coordinator ticks all capture sessions in lockstep so their replay
//! windows stay phase-aligned, and any buffer can be snapshotted at any time
//! and exported to a video file while capture continues.
//!
//! The typical entry point is [`ReplayEngine`], which wires sources,
//! coordinator, and sessions together from an [`EngineConfig`]:
//!
//! ```no_run
//! use replaydeck::{EngineConfig, ReplayEngine, SyntheticSource};
//!
//! let config = EngineConfig::default();
//! let sources = vec![
//!     SyntheticSource::new(config.width, config.height, 3, config.fps as f64),
//!     SyntheticSource::new(config.width, config.height, 3, config.fps as f64),
//! ];
//! let engine = ReplayEngine::start(config, sources)?;
//! // ... render session events, scrub, replay ...
//! engine.stop()?;
//! # Ok::<(), replaydeck::ReplayError>(())
//! ```

pub mod buffer;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod frame;
pub mod logging;
pub mod sync;

pub use buffer::RingBuffer;
pub use capture::{
    CaptureSession, FrameSource, SessionEvent, SessionHandle, SyntheticSource, ViewMode,
};
pub use config::EngineConfig;
pub use engine::ReplayEngine;
pub use error::{ReplayError, ReplayResult};
pub use export::{
    BufferExporter, BufferSnapshot, ExportCodec, ExportHandle, ExportProgress, ExportSink,
    ExportSummary, FfmpegSink, StreamParams,
};
pub use frame::{Frame, SharedFrame};
pub use sync::SyncCoordinator;
