//! Multi-camera orchestration.
//!
//! A [`ReplayEngine`] wires N capture sessions to one sync coordinator so
//! every camera records the same instant-replay window in lockstep. Viewer
//! commands (scrub, playback, resume live) fan out to all sessions, matching
//! how an operator reviews an incident across every camera angle at once.
//! Clip exports snapshot one camera's buffer and run on their own thread.

use std::path::Path;
use std::time::Duration;

use crate::capture::{CaptureSession, FrameSource, SessionHandle, ViewMode};
use crate::config::EngineConfig;
use crate::error::{ReplayError, ReplayResult};
use crate::export::{BufferExporter, ExportHandle, FfmpegSink};
use crate::sync::SyncCoordinator;

/// A set of phase-aligned capture sessions plus their tick source.
pub struct ReplayEngine {
    coordinator: SyncCoordinator,
    sessions: Vec<SessionHandle>,
    config: EngineConfig,
    clip_index: usize,
}

impl ReplayEngine {
    /// Spawn one capture session per source, all paced by a timer-driven
    /// coordinator at the reference source's nominal frame rate.
    pub fn start<S: FrameSource>(config: EngineConfig, sources: Vec<S>) -> ReplayResult<Self> {
        let mut config = config;
        config.validate();
        let coordinator = SyncCoordinator::start(reference_interval(&config, &sources));
        Self::assemble(config, sources, coordinator)
    }

    /// Like [`start`](Self::start), but paced by a caller-supplied
    /// coordinator. A manual coordinator makes multi-camera behavior
    /// deterministic under test.
    pub fn start_with_coordinator<S: FrameSource>(
        config: EngineConfig,
        sources: Vec<S>,
        coordinator: SyncCoordinator,
    ) -> ReplayResult<Self> {
        let mut config = config;
        config.validate();
        Self::assemble(config, sources, coordinator)
    }

    fn assemble<S: FrameSource>(
        config: EngineConfig,
        sources: Vec<S>,
        mut coordinator: SyncCoordinator,
    ) -> ReplayResult<Self> {
        if sources.is_empty() {
            return Err(ReplayError::SourceUnavailable(
                "no frame sources supplied".to_string(),
            ));
        }

        let mut sessions = Vec::with_capacity(sources.len());
        for (index, source) in sources.into_iter().enumerate() {
            let ticks = coordinator.register();
            match CaptureSession::spawn(source, config.buffer_capacity, ticks) {
                Ok(handle) => sessions.push(handle),
                Err(e) => {
                    log::error!("[ENGINE] camera {} failed to start: {}", index, e);
                    // Roll back the sessions that did come up.
                    coordinator.shutdown();
                    for session in sessions {
                        let _ = session.join();
                    }
                    return Err(e);
                }
            }
        }

        log::info!(
            "[ENGINE] started {} sessions, window {} frames @ {} fps",
            sessions.len(),
            config.buffer_capacity,
            config.fps
        );
        Ok(Self {
            coordinator,
            sessions,
            config,
            clip_index: 0,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, index: usize) -> Option<&SessionHandle> {
        self.sessions.get(index)
    }

    pub fn sessions(&self) -> &[SessionHandle] {
        &self.sessions
    }

    /// Apply a view mode to every camera at once.
    pub fn set_mode(&self, mode: ViewMode) {
        for session in &self.sessions {
            session.set_mode(mode);
        }
    }

    /// Move the scrub position on every camera.
    pub fn set_peek_position(&self, position: usize) {
        for session in &self.sessions {
            session.set_peek_position(position);
        }
    }

    /// Replay every camera's buffer from its oldest frame.
    pub fn restart_playback(&self) {
        self.set_mode(ViewMode::Playback);
    }

    /// Return every camera to live viewing.
    pub fn resume_live(&self) {
        self.set_mode(ViewMode::Live);
    }

    /// Snapshot one camera's buffer and export it as `clip_{n}.<ext>` in
    /// `output_dir`, using the configured codec. Returns immediately; the
    /// export runs concurrently with ongoing capture.
    pub fn export_session(&mut self, index: usize, output_dir: &Path) -> ReplayResult<ExportHandle> {
        let session = self
            .sessions
            .get(index)
            .ok_or_else(|| ReplayError::Other(format!("no session at index {}", index)))?;

        let snapshot = session.snapshot();
        if snapshot.is_empty() {
            return Err(ReplayError::ExportFailure(
                "buffer is empty, nothing to export".to_string(),
            ));
        }

        let codec = self.config.codec;
        let filename = format!("clip_{}.{}", self.clip_index, codec.extension());
        self.clip_index += 1;

        let output_path = output_dir.join(filename);
        log::info!(
            "[ENGINE] exporting camera {} ({} frames) to {}",
            index,
            snapshot.frame_count(),
            output_path.display()
        );
        let sink = FfmpegSink::new(output_path);
        Ok(BufferExporter::spawn(snapshot, codec, sink))
    }

    /// Stop the coordinator and join every session, reporting the first
    /// session error encountered.
    pub fn stop(mut self) -> ReplayResult<()> {
        self.coordinator.shutdown();

        let mut first_error = None;
        for session in self.sessions.drain(..) {
            if let Err(e) = session.join() {
                log::error!("[ENGINE] session ended with error: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Tick interval pinned to the reference (first) source's nominal rate, so
/// capture cadence matches the frame rate stamped into exported clips. The
/// configured rate is only a fallback for sources that report no usable rate.
fn reference_interval<S: FrameSource>(config: &EngineConfig, sources: &[S]) -> Duration {
    match sources.first().map(|s| s.nominal_frame_rate()) {
        Some(rate) if rate.is_finite() && rate > 0.0 => {
            if (rate - config.fps as f64).abs() > f64::EPSILON {
                log::debug!(
                    "[ENGINE] pacing at source rate {} fps (configured {} fps)",
                    rate,
                    config.fps
                );
            }
            Duration::from_secs_f64(1.0 / rate)
        }
        Some(rate) => {
            log::warn!(
                "[ENGINE] reference source reports unusable frame rate {}, pacing at configured {} fps",
                rate,
                config.fps
            );
            config.tick_interval()
        }
        None => config.tick_interval(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;

    fn sources(n: usize) -> Vec<SyntheticSource> {
        (0..n).map(|_| SyntheticSource::new(8, 8, 3, 25.0)).collect()
    }

    fn small_config() -> EngineConfig {
        EngineConfig {
            buffer_capacity: 10,
            fps: 25,
            width: 8,
            height: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_tick_interval_tracks_reference_source() {
        let config = small_config();

        // A 50 fps source under a 25 fps config: pacing follows the source,
        // matching the rate stamped into exported clips.
        let fast = vec![SyntheticSource::new(8, 8, 3, 50.0)];
        assert_eq!(
            reference_interval(&config, &fast),
            Duration::from_millis(20)
        );

        // Unusable source rate falls back to the configured cadence.
        let broken = vec![SyntheticSource::new(8, 8, 3, 0.0)];
        assert_eq!(
            reference_interval(&config, &broken),
            Duration::from_millis(40)
        );
        assert_eq!(
            reference_interval(&config, &Vec::<SyntheticSource>::new()),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn test_engine_requires_sources() {
        let err = ReplayEngine::start_with_coordinator(
            small_config(),
            Vec::<SyntheticSource>::new(),
            SyncCoordinator::manual(),
        )
        .unwrap_err();
        assert!(matches!(err, ReplayError::SourceUnavailable(_)));
    }

    #[test]
    fn test_engine_starts_and_stops_cleanly() {
        let engine = ReplayEngine::start_with_coordinator(
            small_config(),
            sources(2),
            SyncCoordinator::manual(),
        )
        .unwrap();
        assert_eq!(engine.session_count(), 2);
        engine.stop().unwrap();
    }

    #[test]
    fn test_mode_fans_out_to_all_sessions() {
        let engine = ReplayEngine::start_with_coordinator(
            small_config(),
            sources(3),
            SyncCoordinator::manual(),
        )
        .unwrap();

        engine.restart_playback();
        for session in engine.sessions() {
            assert_eq!(session.mode(), ViewMode::Playback);
        }

        engine.resume_live();
        for session in engine.sessions() {
            assert_eq!(session.mode(), ViewMode::Live);
        }
        engine.stop().unwrap();
    }

    #[test]
    fn test_export_empty_buffer_is_rejected() {
        let mut engine = ReplayEngine::start_with_coordinator(
            small_config(),
            sources(1),
            SyncCoordinator::manual(),
        )
        .unwrap();

        let err = engine
            .export_session(0, Path::new("/tmp"))
            .unwrap_err();
        assert!(matches!(err, ReplayError::ExportFailure(_)));
        engine.stop().unwrap();
    }

    #[test]
    fn test_export_unknown_session_is_rejected() {
        let mut engine = ReplayEngine::start_with_coordinator(
            small_config(),
            sources(1),
            SyncCoordinator::manual(),
        )
        .unwrap();

        let err = engine.export_session(5, Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, ReplayError::Other(_)));
        engine.stop().unwrap();
    }
}

impl std::fmt::Debug for ReplayEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayEngine").finish_non_exhaustive()
    }
}
