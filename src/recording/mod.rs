//! Audio recording lifecycle.
//!
//! - **Metering**: dB readings to a bounded amplitude window
//! - **Collaborators**: capture device, notification, transcription, clock
//! - **Controller**: start/pause/resume/stop/discard with the duration cap
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Recording ⇄ Paused → Stopping → Stopped
//!          └──────────┴──────────────→ Discarded
//! ```

pub mod collaborators;
pub mod controller;
pub mod metering;

// Re-export key types
pub use collaborators::{
    CaptureDevice, CaptureHandle, CaptureStatus, Clock, CompletionHandler, MonotonicClock,
    NoopNotifier, Notifier, SystemClock, Transcriber,
};
pub use controller::{RecordingController, RecordingSnapshot};
pub use metering::{amplitude_from_db, LevelMeter, AMPLITUDE_FLOOR, DEFAULT_MAX_BARS};
