//! Application state shared across handlers.
//!
//! Handlers only read from the [`ReadingStore`] and [`PollMetrics`] that the
//! acquisition thread writes to; nothing here touches the device.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use co2mon_core::{PollMetrics, ReadingStore};

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Latest readings, written by the acquisition thread.
    pub store: Arc<ReadingStore>,
    /// Acquisition metrics.
    pub metrics: Arc<PollMetrics>,
    monitoring: Arc<AtomicBool>,
}

impl AppState {
    /// Create new application state with its own monitoring flag.
    pub fn new(store: Arc<ReadingStore>, metrics: Arc<PollMetrics>) -> Arc<Self> {
        Self::with_liveness(store, metrics, Arc::new(AtomicBool::new(false)))
    }

    /// Create application state that reports the acquisition thread's
    /// liveness flag (see [`Co2Monitor::liveness`](co2mon_core::Co2Monitor::liveness)).
    pub fn with_liveness(
        store: Arc<ReadingStore>,
        metrics: Arc<PollMetrics>,
        liveness: Arc<AtomicBool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            metrics,
            monitoring: liveness,
        })
    }

    /// Whether background acquisition is running.
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::SeqCst)
    }

    /// Record whether background acquisition is running.
    pub fn set_monitoring(&self, running: bool) {
        self.monitoring.store(running, Ordering::SeqCst);
    }
}
