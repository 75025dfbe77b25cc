//! Background acquisition and its start/stop lifecycle.
//!
//! [`Co2Monitor`] owns the transport and a shared [`ReadingStore`]. While
//! monitoring, the transport is moved into a dedicated thread that runs poll
//! cycles separated by the observation interval; stopping joins the thread
//! and takes the transport back, so monitoring can be started again.
//!
//! ```text
//! Stopped --start_monitoring--> Running --stop_monitoring--> Stopped
//! ```
//!
//! Readers never touch the transport. They clone the store via
//! [`Co2Monitor::store`] and read it from any thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use co2mon_types::{Co2Reading, TemperatureReading};

use crate::error::{Error, Result};
use crate::metrics::{PollMetrics, PollMetricsSnapshot};
use crate::poll::{PollOptions, poll_cycle_until};
use crate::store::ReadingStore;
use crate::transport::{FrameSource, HidTransport};

/// Name of the acquisition thread.
pub const THREAD_NAME: &str = "co2mon-acquisition";

/// Cooperative cancellation flag that can also cut a sleep short.
#[derive(Debug, Clone, Default)]
struct StopFlag {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopFlag {
    fn raise(&self) {
        let (raised, wake) = &*self.inner;
        *raised.lock() = true;
        wake.notify_all();
    }

    fn is_raised(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep for `duration` or until raised. Returns whether it was raised.
    fn sleep(&self, duration: Duration) -> bool {
        let (raised, wake) = &*self.inner;
        // An interval too long to represent as an Instant never times out.
        let deadline = Instant::now().checked_add(duration);
        let mut guard = raised.lock();
        while !*guard {
            match deadline {
                Some(deadline) => {
                    if wake.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
                None => wake.wait(&mut guard),
            }
        }
        *guard
    }
}

/// Slot the transport waits in until the acquisition thread picks it up.
///
/// If the thread never starts, the spawn closure is dropped unrun and the
/// transport can be reclaimed from here.
#[derive(Debug)]
struct Handoff<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> Handoff<T> {
    fn new(transport: T) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(transport))),
        }
    }

    fn share(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }

    fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }
}

/// Clears the liveness flag when the acquisition thread exits, even by
/// unwinding.
struct LivenessGuard(Arc<AtomicBool>);

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The running acquisition thread.
///
/// Created by [`Co2Monitor::start_monitoring`] and consumed by
/// [`Co2Monitor::stop_monitoring`]; at most one exists per monitor.
#[derive(Debug)]
pub struct MonitoringHandle<T> {
    stop: StopFlag,
    thread: JoinHandle<Option<T>>,
    interval: Duration,
}

impl<T> MonitoringHandle<T> {
    /// The observation interval the loop was started with.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the thread has already exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Raise the stop flag and wait for the thread, returning the transport.
    ///
    /// Returns `None` if the thread panicked.
    fn shutdown(self) -> Option<T> {
        self.stop.raise();
        self.thread.join().ok().flatten()
    }
}

/// A CO2 monitor with a background acquisition loop.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use co2mon_core::Co2Monitor;
///
/// # fn main() -> Result<(), co2mon_core::Error> {
/// let mut monitor = Co2Monitor::open()?;
/// monitor.start_monitoring(Duration::from_secs(10))?;
///
/// let store = monitor.store();
/// std::thread::spawn(move || {
///     if let Some(co2) = store.co2() {
///         println!("CO2: {} ppm", co2.value);
///     }
/// });
///
/// monitor.stop_monitoring();
/// # Ok(())
/// # }
/// ```
pub struct Co2Monitor<T: FrameSource + 'static = HidTransport> {
    transport: Option<T>,
    handle: Option<MonitoringHandle<T>>,
    store: Arc<ReadingStore>,
    metrics: Arc<PollMetrics>,
    alive: Arc<AtomicBool>,
    options: PollOptions,
}

impl<T: FrameSource + 'static> std::fmt::Debug for Co2Monitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Co2Monitor")
            .field("monitoring", &self.is_monitoring())
            .field("has_transport", &self.transport.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Co2Monitor<HidTransport> {
    /// Open the USB monitor, perform the key handshake and wrap it.
    pub fn open() -> Result<Self> {
        Self::open_with_options(PollOptions::default())
    }

    /// Like [`open`](Self::open), with custom poll options.
    pub fn open_with_options(options: PollOptions) -> Result<Self> {
        options.validate()?;
        let transport = HidTransport::open()?;
        Self::with_options(transport, options)
    }
}

impl<T: FrameSource + 'static> Co2Monitor<T> {
    /// Wrap an already opened transport with default poll options.
    pub fn new(transport: T) -> Self {
        Self::build(transport, PollOptions::default())
    }

    /// Wrap an already opened transport.
    pub fn with_options(transport: T, options: PollOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self::build(transport, options))
    }

    fn build(transport: T, options: PollOptions) -> Self {
        Self {
            transport: Some(transport),
            handle: None,
            store: Arc::new(ReadingStore::new()),
            metrics: Arc::new(PollMetrics::new()),
            alive: Arc::new(AtomicBool::new(false)),
            options,
        }
    }

    /// Start the acquisition thread.
    ///
    /// Returns immediately without waiting for the first reading. Does
    /// nothing if monitoring is already running.
    pub fn start_monitoring(&mut self, interval: Duration) -> Result<()> {
        if self.handle.is_some() {
            debug!("Monitoring already running, ignoring start request");
            return Ok(());
        }
        if interval.is_zero() {
            return Err(Error::invalid_config("observation interval must be > 0"));
        }
        let Some(transport) = self.transport.take() else {
            warn!("No device available, monitoring not started");
            return Ok(());
        };

        let handoff = Handoff::new(transport);
        let stop = StopFlag::default();
        self.alive.store(true, Ordering::SeqCst);
        let spawned = {
            let handoff = handoff.share();
            let stop = stop.clone();
            let store = Arc::clone(&self.store);
            let metrics = Arc::clone(&self.metrics);
            let alive = LivenessGuard(Arc::clone(&self.alive));
            let options = self.options.clone();
            thread::Builder::new()
                .name(THREAD_NAME.to_string())
                .spawn(move || {
                    let _alive = alive;
                    let mut transport = handoff.take()?;
                    run_acquisition(&mut transport, &store, &metrics, &options, interval, &stop);
                    Some(transport)
                })
        };
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.alive.store(false, Ordering::SeqCst);
                self.transport = handoff.take();
                error!("Failed to spawn the acquisition thread: {}", e);
                return Err(e.into());
            }
        };

        info!("Monitoring started (interval: {:?})", interval);
        self.handle = Some(MonitoringHandle {
            stop,
            thread,
            interval,
        });
        Ok(())
    }

    /// Stop the acquisition thread and wait for it to exit.
    ///
    /// Blocks for at most one in-flight read. Does nothing if monitoring is
    /// not running.
    pub fn stop_monitoring(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        debug!("Stopping monitoring");
        match handle.shutdown() {
            Some(transport) => {
                self.transport = Some(transport);
                info!("Monitoring stopped");
            }
            None => error!("Acquisition thread panicked; the device handle was lost"),
        }
    }

    /// Whether the acquisition thread is running.
    pub fn is_monitoring(&self) -> bool {
        self.handle.is_some()
    }

    /// A flag that is `true` while the acquisition thread is alive.
    ///
    /// The thread clears it on exit, including when it unwinds, so observers
    /// see a dead loop even before [`stop_monitoring`](Self::stop_monitoring)
    /// is called.
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// The running loop, if any.
    pub fn handle(&self) -> Option<&MonitoringHandle<T>> {
        self.handle.as_ref()
    }

    /// The latest CO2 reading.
    pub fn co2(&self) -> Option<Co2Reading> {
        self.store.co2()
    }

    /// The latest temperature reading.
    pub fn temperature(&self) -> Option<TemperatureReading> {
        self.store.temperature()
    }

    /// A shared handle to the reading store for other threads.
    pub fn store(&self) -> Arc<ReadingStore> {
        Arc::clone(&self.store)
    }

    /// Shared acquisition metrics.
    pub fn metrics(&self) -> Arc<PollMetrics> {
        Arc::clone(&self.metrics)
    }

    /// A snapshot of the acquisition metrics.
    pub fn metrics_snapshot(&self) -> PollMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The poll options in use.
    pub fn options(&self) -> &PollOptions {
        &self.options
    }

    /// Stop monitoring and release the device.
    pub fn close(mut self) {
        self.stop_monitoring();
        if self.transport.take().is_some() {
            info!("Device closed");
        }
    }
}

impl<T: FrameSource + 'static> Drop for Co2Monitor<T> {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}

fn run_acquisition<T: FrameSource>(
    transport: &mut T,
    store: &ReadingStore,
    metrics: &PollMetrics,
    options: &PollOptions,
    interval: Duration,
    stop: &StopFlag,
) {
    debug!("Acquisition thread running");
    while !stop.is_raised() {
        poll_cycle_until(transport, store, metrics, options, || stop.is_raised());
        if stop.sleep(interval) {
            break;
        }
    }
    debug!("Acquisition thread exiting");
}
