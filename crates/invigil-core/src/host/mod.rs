//! Host capability traits.
//!
//! The engine never touches raw scheduling, speech, or camera primitives.
//! Each host concern sits behind a narrow trait so the browser bindings (or a
//! test double) can be injected, and so stale completions from a superseded
//! phase are provably droppable: every started countdown and utterance gets
//! an id, and the engine compares ids before acting on a completion.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of a live countdown handed out by a [`TimerDriver`].
///
/// Ids are never reused within a session, so a tick carrying an id the
/// engine no longer owns is from a cancelled countdown and must be dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerId(pub u64);

/// Identifier of an in-flight narration utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UtteranceId(pub u64);

/// The only scheduling surface available to the engine.
///
/// Implementations must deliver ticks tagged with the returned [`TimerId`].
/// The engine owns at most one live id at a time; starting a new countdown
/// always cancels the predecessor first.
pub trait TimerDriver {
    /// Starts a recurring tick at `interval` and returns its id.
    fn start(&mut self, interval: Duration) -> TimerId;

    /// Cancels a previously started countdown. Cancelling an unknown or
    /// already-cancelled id is a no-op.
    fn cancel(&mut self, id: TimerId);
}

/// Speech-synthesis capability.
///
/// Completion is signalled back to the engine as an event carrying the
/// [`UtteranceId`] returned here, not through a callback on this trait.
pub trait Narrator {
    /// Begins speaking `text` with the given rate and pitch.
    fn speak(&mut self, text: &str, rate: f32, pitch: f32) -> UtteranceId;

    /// Silences any in-flight utterance immediately. Its completion event
    /// may still arrive afterwards and must be ignored by id mismatch.
    fn cancel(&mut self);
}

/// Camera stream ownership.
///
/// The stream and its analysis pipeline are singly owned by the session;
/// terminal transitions release them exactly once.
pub trait CameraControl {
    /// Stops the camera track and the frame-analysis pipeline.
    fn release(&mut self);
}
