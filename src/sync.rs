//! Lockstep tick coordination across capture sessions.
//!
//! One coordinator drives N capture loops: every tick is broadcast to all
//! registered sessions, and each session performs exactly one
//! acquire-write-select-emit cycle per tick received. This bounds the
//! head-position skew between cameras to the tick granularity, at the cost of
//! running every camera at the pace of the slowest one.
//!
//! Tick delivery uses bounded(1) channels: a session still busy with its
//! previous cycle simply misses a tick and waits for the next one. That is a
//! documented degradation (the session free-runs until caught up), not an
//! error, and it keeps a stalled camera from accumulating a tick backlog.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Tick endpoint handed to a capture session. The session blocks on this at
/// the top of every acquisition cycle; disconnection means the coordinator
/// has shut down and the session should stop.
pub type TickReceiver = Receiver<Instant>;

struct CoordinatorShared {
    senders: Mutex<Vec<Sender<Instant>>>,
}

impl CoordinatorShared {
    fn broadcast(&self, now: Instant) {
        let mut senders = self.senders.lock();
        senders.retain(|tx| match tx.try_send(now) {
            Ok(()) => true,
            // Session mid-cycle: it skips this tick.
            Err(TrySendError::Full(_)) => {
                log::trace!("[SYNC] session busy, tick skipped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Shared tick source that keeps all capture sessions phase-aligned.
///
/// Created either timer-driven ([`SyncCoordinator::start`]) at the nominal
/// frame interval of the reference source, or hand-cranked
/// ([`SyncCoordinator::manual`]) for deterministic tests.
pub struct SyncCoordinator {
    shared: Arc<CoordinatorShared>,
    stop_tx: Option<Sender<()>>,
    ticker: Option<JoinHandle<()>>,
}

impl SyncCoordinator {
    /// Spawn a timer-driven coordinator broadcasting every `interval`.
    pub fn start(interval: Duration) -> Self {
        let shared = Arc::new(CoordinatorShared {
            senders: Mutex::new(Vec::new()),
        });
        let (stop_tx, stop_rx) = unbounded::<()>();
        let thread_shared = Arc::clone(&shared);

        let ticker = std::thread::Builder::new()
            .name("sync-coordinator".into())
            .spawn(move || {
                let ticks = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(ticks) -> tick => {
                            if let Ok(now) = tick {
                                thread_shared.broadcast(now);
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::debug!("[SYNC] coordinator stopped");
            })
            .ok();

        log::info!("[SYNC] coordinator started, interval {:?}", interval);
        Self {
            shared,
            stop_tx: Some(stop_tx),
            ticker,
        }
    }

    /// Create a coordinator with no timer; ticks fire only via [`tick`].
    ///
    /// [`tick`]: SyncCoordinator::tick
    pub fn manual() -> Self {
        Self {
            shared: Arc::new(CoordinatorShared {
                senders: Mutex::new(Vec::new()),
            }),
            stop_tx: None,
            ticker: None,
        }
    }

    /// Register a session; returns its tick endpoint.
    pub fn register(&self) -> TickReceiver {
        let (tx, rx) = bounded(1);
        self.shared.senders.lock().push(tx);
        rx
    }

    /// Broadcast one tick immediately. The normal driver for manual
    /// coordinators; harmless alongside a running timer.
    pub fn tick(&self) {
        self.shared.broadcast(Instant::now());
    }

    /// Number of still-connected sessions.
    pub fn session_count(&self) -> usize {
        self.shared.senders.lock().len()
    }

    /// Stop the timer and disconnect every registered session. Sessions see
    /// the disconnect as a stop request at their next cycle boundary.
    pub fn shutdown(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(ticker) = self.ticker.take() {
            let _ = ticker.join();
        }
        self.shared.senders.lock().clear();
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_tick_reaches_every_session() {
        let coordinator = SyncCoordinator::manual();
        let a = coordinator.register();
        let b = coordinator.register();
        assert_eq!(coordinator.session_count(), 2);

        for _ in 0..3 {
            coordinator.tick();
            assert!(a.recv_timeout(Duration::from_secs(1)).is_ok());
            assert!(b.recv_timeout(Duration::from_secs(1)).is_ok());
        }
    }

    #[test]
    fn test_busy_session_skips_ticks_without_backlog() {
        let coordinator = SyncCoordinator::manual();
        let rx = coordinator.register();

        // Three ticks while the session is "busy": only one is buffered.
        coordinator.tick();
        coordinator.tick();
        coordinator.tick();

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_session_is_unregistered() {
        let coordinator = SyncCoordinator::manual();
        let rx = coordinator.register();
        let _keep = coordinator.register();
        drop(rx);

        coordinator.tick();
        assert_eq!(coordinator.session_count(), 1);
    }

    #[test]
    fn test_shutdown_disconnects_sessions() {
        let mut coordinator = SyncCoordinator::manual();
        let rx = coordinator.register();
        coordinator.shutdown();
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(50)),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected)
        ));
    }

    #[test]
    fn test_interval_coordinator_delivers_ticks() {
        let mut coordinator = SyncCoordinator::start(Duration::from_millis(10));
        let rx = coordinator.register();

        for _ in 0..3 {
            assert!(rx.recv_timeout(Duration::from_secs(1)).is_ok());
        }
        coordinator.shutdown();
    }
}
