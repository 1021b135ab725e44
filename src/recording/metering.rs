//! Loudness metering for the live waveform.
//!
//! Capture devices report loudness in dBFS. Each reading is mapped to a
//! linear amplitude and pushed into a fixed-capacity window; the oldest
//! sample falls out when the window is full.

use std::collections::VecDeque;

use super::collaborators::CaptureStatus;

/// Default number of bars in the visible waveform
pub const DEFAULT_MAX_BARS: usize = 40;

/// Lowest amplitude ever emitted so the waveform never collapses to a line
pub const AMPLITUDE_FLOOR: f32 = 0.05;

/// `max(0.05, 10^((db + 40) / 20))`. Returns `None` for non-finite input.
pub fn amplitude_from_db(loudness_db: f32) -> Option<f32> {
    if !loudness_db.is_finite() {
        return None;
    }
    let amplitude = 10f32.powf((loudness_db + 40.0) / 20.0);
    Some(amplitude.max(AMPLITUDE_FLOOR))
}

/// Ring buffer of recent amplitudes
#[derive(Debug, Clone)]
pub struct LevelMeter {
    levels: VecDeque<f32>,
    capacity: usize,
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BARS)
    }
}

impl LevelMeter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            levels: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full
    pub fn push(&mut self, amplitude: f32) {
        if self.levels.len() == self.capacity {
            self.levels.pop_front();
        }
        self.levels.push_back(amplitude);
    }

    /// Convert and append a device reading.
    ///
    /// Readings taken while the device is not recording, or without a usable
    /// loudness value, are skipped rather than recorded as silence.
    pub fn push_reading(&mut self, status: &CaptureStatus) -> Option<f32> {
        if !status.is_recording {
            return None;
        }
        let amplitude = amplitude_from_db(status.metering_db?)?;
        self.push(amplitude);
        Some(amplitude)
    }

    /// Samples oldest first
    pub fn levels(&self) -> Vec<f32> {
        self.levels.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }
}
