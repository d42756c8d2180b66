//! Host implementations for offline replay.
//!
//! Replay has no real clock, speech stack, or camera. The timer only hands
//! out ids (the trace carries the ticks), narration and camera release are
//! logged.

use std::time::Duration;

use invigil_core::host::{CameraControl, Narrator, TimerDriver, TimerId, UtteranceId};
use tracing::info;

/// Timer driver that allocates ids without scheduling anything.
#[derive(Debug, Default)]
pub struct TraceTimer {
    next_id: u64,
}

impl TimerDriver for TraceTimer {
    fn start(&mut self, interval: Duration) -> TimerId {
        self.next_id += 1;
        info!(id = self.next_id, ?interval, "countdown started");
        TimerId(self.next_id)
    }

    fn cancel(&mut self, id: TimerId) {
        info!(?id, "countdown cancelled");
    }
}

/// Narrator that logs instead of speaking.
#[derive(Debug, Default)]
pub struct ConsoleNarrator {
    next_id: u64,
}

impl Narrator for ConsoleNarrator {
    fn speak(&mut self, text: &str, rate: f32, pitch: f32) -> UtteranceId {
        self.next_id += 1;
        info!(id = self.next_id, rate, pitch, "narrating: {text}");
        UtteranceId(self.next_id)
    }

    fn cancel(&mut self) {
        info!("narration cancelled");
    }
}

/// Camera control with nothing to release.
#[derive(Debug, Default)]
pub struct NullCamera;

impl CameraControl for NullCamera {
    fn release(&mut self) {
        info!("camera released");
    }
}
