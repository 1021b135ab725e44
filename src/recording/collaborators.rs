//! Capability interfaces consumed by the recording controller.
//!
//! The capture device, the OS notification, speech transcription and the
//! completion sink live outside this crate. Hosts implement these traits and
//! hand them to [`RecordingController`](super::RecordingController).

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::RecordingArtifact;
use crate::error::DeviceError;

/// Point-in-time reading from an active capture
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CaptureStatus {
    /// False while suspended or after unload
    pub is_recording: bool,

    /// Instantaneous loudness in dBFS, if the device meters
    pub metering_db: Option<f32>,

    /// Captured duration as seen by the device
    pub duration_ms: u64,
}

/// Audio capture device that can hand out one recording at a time
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// Enter or leave recording mode (audio session category, routing)
    async fn set_capture_mode(&self, active: bool) -> Result<(), DeviceError>;

    /// Acquire the device and start capturing
    async fn acquire(&self) -> Result<Box<dyn CaptureHandle>, DeviceError>;
}

/// Exclusive handle on an active capture
#[async_trait]
pub trait CaptureHandle: Send + Sync {
    async fn pause(&mut self) -> Result<(), DeviceError>;

    async fn resume(&mut self) -> Result<(), DeviceError>;

    async fn status(&self) -> Result<CaptureStatus, DeviceError>;

    /// Finish the capture and release the device
    async fn stop_and_unload(&mut self) -> Result<(), DeviceError>;

    /// Where the finished audio was written
    fn location(&self) -> Option<String>;
}

/// Active-recording indicator surfaced by the OS
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn arm(&self) -> Result<(), DeviceError>;

    async fn dismiss(&self) -> Result<(), DeviceError>;
}

/// Receives the artifact of every completed (not discarded) recording
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_recording_complete(&self, artifact: RecordingArtifact);
}

/// Live speech-to-text source shown next to the waveform
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn start(&self) -> Result<(), DeviceError>;

    /// Stop listening; must not block
    fn stop(&self);

    /// Clear the accumulated text
    fn reset(&self);

    /// Text recognized so far
    fn transcript(&self) -> String;
}

/// Millisecond clock used for elapsed-time bookkeeping
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Wall clock. Keeps counting while the host process is suspended.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock driven by tokio's timer, so it follows paused/advanced time
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: tokio::time::Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> i64 {
        self.origin.elapsed().as_millis() as i64
    }
}

/// Notifier for hosts without an OS indicator
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn arm(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    async fn dismiss(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}
