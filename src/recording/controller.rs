//! Recording lifecycle controller.
//!
//! Owns the capture handle, the elapsed-time clock and the metering sampler.
//! Both periodic tasks run while recording and are cancelled together on
//! pause, stop and discard. Stop and discard share one in-flight guard so
//! that a button press, the duration cap and a foreground check racing each
//! other release the device exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::RecordingSettings;
use crate::domain::{RecordingArtifact, RecordingState};
use crate::error::RecordingError;

use super::collaborators::{
    CaptureDevice, CaptureHandle, Clock, CompletionHandler, Notifier, SystemClock,
};
use super::metering::LevelMeter;

/// Read-only view of the controller for presentation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingSnapshot {
    pub state: RecordingState,
    pub elapsed_seconds: u64,
    pub accumulated_pause_ms: i64,
    pub levels: Vec<f32>,
    /// True when the clock and metering tasks are both live
    pub timers_running: bool,
}

/// Drives one recording at a time through its lifecycle
#[derive(Clone)]
pub struct RecordingController {
    inner: Arc<Inner>,
}

struct Inner {
    device: Arc<dyn CaptureDevice>,
    notifier: Arc<dyn Notifier>,
    on_complete: Arc<dyn CompletionHandler>,
    clock: Arc<dyn Clock>,
    settings: RecordingSettings,

    /// Set while a stop or discard is running
    stopping: AtomicBool,

    session: Mutex<Session>,
}

struct Session {
    state: RecordingState,
    handle: Option<Box<dyn CaptureHandle>>,
    start_epoch_ms: Option<i64>,
    paused_at_ms: Option<i64>,
    accumulated_pause_ms: i64,
    elapsed_seconds: u64,
    meter: LevelMeter,
    timers: Option<Timers>,
}

/// The two periodic tasks. Dropping aborts both.
struct Timers {
    clock: JoinHandle<()>,
    metering: JoinHandle<()>,
}

impl Timers {
    fn is_running(&self) -> bool {
        !self.clock.is_finished() && !self.metering.is_finished()
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.clock.abort();
        self.metering.abort();
    }
}

impl Session {
    fn new(max_bars: usize) -> Self {
        Self {
            state: RecordingState::Idle,
            handle: None,
            start_epoch_ms: None,
            paused_at_ms: None,
            accumulated_pause_ms: 0,
            elapsed_seconds: 0,
            meter: LevelMeter::new(max_bars),
            timers: None,
        }
    }

    /// Elapsed seconds excluding pauses, clamped to `[0, cap]`
    fn compute_elapsed(&self, now_ms: i64, cap: u64) -> u64 {
        let Some(start) = self.start_epoch_ms else {
            return self.elapsed_seconds;
        };
        // While paused the clock is frozen at the pause instant
        let until = self.paused_at_ms.unwrap_or(now_ms);
        let seconds = (until - start).max(0) / 1000;
        (seconds as u64).min(cap)
    }
}

/// A live recording that was torn down
struct Released {
    artifact: Option<RecordingArtifact>,
}

/// Result of a periodic elapsed-time tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Continue,
    LimitReached,
}

impl RecordingController {
    pub fn new(
        device: Arc<dyn CaptureDevice>,
        notifier: Arc<dyn Notifier>,
        on_complete: Arc<dyn CompletionHandler>,
        settings: RecordingSettings,
    ) -> Self {
        Self::with_clock(device, notifier, on_complete, settings, Arc::new(SystemClock))
    }

    pub fn with_clock(
        device: Arc<dyn CaptureDevice>,
        notifier: Arc<dyn Notifier>,
        on_complete: Arc<dyn CompletionHandler>,
        settings: RecordingSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let session = Session::new(settings.max_bars);
        Self {
            inner: Arc::new(Inner {
                device,
                notifier,
                on_complete,
                clock,
                settings,
                stopping: AtomicBool::new(false),
                session: Mutex::new(session),
            }),
        }
    }

    /// Acquire the device and begin capturing.
    ///
    /// Allowed from `Idle` or after a previous recording finished.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), RecordingError> {
        let mut session = self.inner.session.lock().await;

        if !matches!(session.state, RecordingState::Idle) && !session.state.is_terminal() {
            return Err(RecordingError::InvalidState {
                state: session.state,
                operation: "start",
            });
        }

        self.inner
            .device
            .set_capture_mode(true)
            .await
            .map_err(|e| RecordingError::DeviceUnavailable(e.to_string()))?;

        let handle = match self.inner.device.acquire().await {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(mode_err) = self.inner.device.set_capture_mode(false).await {
                    debug!(error = %mode_err, "Failed to leave capture mode after acquire error");
                }
                return Err(RecordingError::DeviceUnavailable(e.to_string()));
            }
        };

        *session = Session::new(self.inner.settings.max_bars);
        session.handle = Some(handle);
        session.start_epoch_ms = Some(self.inner.clock.now_ms());
        session.state = RecordingState::Recording;
        session.timers = Some(spawn_timers(&self.inner));

        // Armed under the lock so a racing stop always dismisses afterwards
        if let Err(e) = self.inner.notifier.arm().await {
            warn!(error = %e, "Recording notification unavailable, continuing without it");
        }
        drop(session);

        info!("Recording started");
        Ok(())
    }

    /// Suspend capture. No-op unless recording.
    pub async fn pause(&self) -> Result<(), RecordingError> {
        let mut session = self.inner.session.lock().await;
        if session.state != RecordingState::Recording {
            return Ok(());
        }

        let Some(handle) = session.handle.as_mut() else {
            return Ok(());
        };
        handle
            .pause()
            .await
            .map_err(|e| RecordingError::PauseFailed(e.to_string()))?;

        session.timers = None;
        session.paused_at_ms = Some(self.inner.clock.now_ms());
        session.state = RecordingState::Paused;

        debug!(elapsed_seconds = session.elapsed_seconds, "Recording paused");
        Ok(())
    }

    /// Reactivate capture. No-op unless paused.
    pub async fn resume(&self) -> Result<(), RecordingError> {
        let mut session = self.inner.session.lock().await;
        if session.state != RecordingState::Paused {
            return Ok(());
        }

        let Some(handle) = session.handle.as_mut() else {
            return Ok(());
        };
        handle
            .resume()
            .await
            .map_err(|e| RecordingError::ResumeFailed(e.to_string()))?;

        let now = self.inner.clock.now_ms();
        if let Some(paused_at) = session.paused_at_ms.take() {
            let paused_for = (now - paused_at).max(0);
            session.accumulated_pause_ms += paused_for;
            if let Some(start) = session.start_epoch_ms.as_mut() {
                *start += paused_for;
            }
        }

        session.state = RecordingState::Recording;
        session.timers = Some(spawn_timers(&self.inner));

        debug!(
            accumulated_pause_ms = session.accumulated_pause_ms,
            "Recording resumed"
        );
        Ok(())
    }

    /// Finish the recording and hand the artifact to the completion handler.
    ///
    /// Returns `None` when another stop/discard is already running or when
    /// nothing is being recorded.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Option<RecordingArtifact> {
        if self.inner.stopping.swap(true, Ordering::AcqRel) {
            debug!("Stop already in flight, ignoring");
            return None;
        }
        let released = self.release(false).await;
        self.inner.stopping.store(false, Ordering::Release);
        released.and_then(|r| r.artifact)
    }

    /// Abandon the recording. Never calls the completion handler.
    ///
    /// Returns true when a live recording was released.
    #[instrument(skip(self))]
    pub async fn discard(&self) -> bool {
        if self.inner.stopping.swap(true, Ordering::AcqRel) {
            debug!("Stop already in flight, ignoring discard");
            return false;
        }
        let released = self.release(true).await.is_some();
        self.inner.stopping.store(false, Ordering::Release);
        released
    }

    /// Progress callback from the capture device
    pub async fn on_device_progress(&self, duration_ms: u64) {
        if duration_ms >= self.inner.settings.max_duration_seconds * 1000 {
            info!(duration_ms, "Device reported duration cap, stopping");
            self.stop().await;
        }
    }

    /// Host process returned to the foreground.
    ///
    /// Elapsed time is recomputed from the clock; if the cap passed while
    /// suspended the recording stops immediately.
    pub async fn on_foreground(&self) {
        let reached = {
            let mut session = self.inner.session.lock().await;
            if session.handle.is_none() {
                return;
            }
            let cap = self.inner.settings.max_duration_seconds;
            session.elapsed_seconds = session.compute_elapsed(self.inner.clock.now_ms(), cap);
            session.elapsed_seconds >= cap
        };

        if reached {
            info!("Duration cap passed while in background, stopping");
            self.stop().await;
        }
    }

    /// Elapsed-time tick. Stops the recording when the cap is reached.
    pub async fn on_clock_tick(&self) {
        if self.tick_elapsed().await == Tick::LimitReached {
            self.stop().await;
        }
    }

    /// Metering tick: sample the device and append to the waveform
    pub async fn on_meter_tick(&self) {
        let mut session = self.inner.session.lock().await;
        if session.state != RecordingState::Recording {
            return;
        }
        let Some(handle) = session.handle.as_ref() else {
            return;
        };
        let reading = handle.status().await;
        match reading {
            Ok(status) => {
                session.meter.push_reading(&status);
            }
            Err(e) => debug!(error = %e, "Skipping metering sample"),
        }
    }

    pub async fn state(&self) -> RecordingState {
        self.inner.session.lock().await.state
    }

    pub async fn elapsed_seconds(&self) -> u64 {
        self.inner.session.lock().await.elapsed_seconds
    }

    pub async fn levels(&self) -> Vec<f32> {
        self.inner.session.lock().await.meter.levels()
    }

    pub async fn snapshot(&self) -> RecordingSnapshot {
        let session = self.inner.session.lock().await;
        RecordingSnapshot {
            state: session.state,
            elapsed_seconds: session.elapsed_seconds,
            accumulated_pause_ms: session.accumulated_pause_ms,
            levels: session.meter.levels(),
            timers_running: session.timers.as_ref().is_some_and(Timers::is_running),
        }
    }

    pub fn settings(&self) -> &RecordingSettings {
        &self.inner.settings
    }

    async fn tick_elapsed(&self) -> Tick {
        let mut session = self.inner.session.lock().await;
        if session.state != RecordingState::Recording {
            return Tick::Continue;
        }

        let cap = self.inner.settings.max_duration_seconds;
        session.elapsed_seconds = session.compute_elapsed(self.inner.clock.now_ms(), cap);

        if session.elapsed_seconds >= cap {
            // No more samples from here on
            session.state = RecordingState::Stopping;
            return Tick::LimitReached;
        }
        Tick::Continue
    }

    /// Shared tail of stop and discard. Caller holds the in-flight guard.
    async fn release(&self, discard: bool) -> Option<Released> {
        let (mut handle, elapsed) = {
            let mut session = self.inner.session.lock().await;
            let handle = session.handle.take()?;

            session.state = RecordingState::Stopping;
            session.timers = None;
            session.meter.clear();

            let cap = self.inner.settings.max_duration_seconds;
            session.elapsed_seconds = session.compute_elapsed(self.inner.clock.now_ms(), cap);
            session.start_epoch_ms = None;
            session.paused_at_ms = None;

            (handle, session.elapsed_seconds)
        };

        if let Err(e) = handle.stop_and_unload().await {
            debug!(error = %e, "Capture already released");
        }
        let location = handle.location();
        drop(handle);

        let artifact = location.map(|location| RecordingArtifact::new(location, elapsed));

        if !discard {
            match &artifact {
                Some(artifact) => {
                    info!(
                        location = %artifact.location,
                        duration_seconds = artifact.duration_seconds,
                        "Recording saved"
                    );
                    self.inner
                        .on_complete
                        .on_recording_complete(artifact.clone())
                        .await;
                }
                None => warn!("Capture device reported no location for the recording"),
            }
        }

        if let Err(e) = self.inner.device.set_capture_mode(false).await {
            warn!(error = %e, "Failed to leave capture mode");
        }
        if let Err(e) = self.inner.notifier.dismiss().await {
            warn!(error = %e, "Failed to dismiss recording notification");
        }

        self.inner.session.lock().await.state = if discard {
            info!("Recording discarded");
            RecordingState::Discarded
        } else {
            RecordingState::Stopped
        };

        Some(Released { artifact })
    }
}

/// Spawn the elapsed-time clock and the metering sampler.
///
/// Tasks hold a weak reference so a dropped controller ends them.
fn spawn_timers(inner: &Arc<Inner>) -> Timers {
    let clock_period = Duration::from_millis(inner.settings.clock_interval_ms.max(1));
    let meter_period = Duration::from_millis(inner.settings.metering_interval_ms.max(1));

    let weak = Arc::downgrade(inner);
    let clock = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + clock_period, clock_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(controller) = upgrade(&weak) else {
                break;
            };
            if controller.tick_elapsed().await == Tick::LimitReached {
                // Stop cancels this task, so it has to run elsewhere
                tokio::spawn(async move {
                    controller.stop().await;
                });
                break;
            }
        }
    });

    let weak = Arc::downgrade(inner);
    let metering = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + meter_period, meter_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Some(controller) = upgrade(&weak) else {
                break;
            };
            controller.on_meter_tick().await;
        }
    });

    Timers { clock, metering }
}

fn upgrade(weak: &Weak<Inner>) -> Option<RecordingController> {
    weak.upgrade().map(|inner| RecordingController { inner })
}
