//! Session aggregate and transition methods.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StrikeLimits;
use crate::host::{TimerId, UtteranceId};

/// The session's current discrete phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    /// Created, identity validated, not yet started.
    NotStarted,
    /// Interview in progress; timer, narration, and input may run.
    Active,
    /// Paused because fullscreen was exited.
    PausedForFullscreen,
    /// Paused because a proctoring violation was surfaced.
    PausedForViolation,
    /// All questions answered and evaluation recorded.
    Completed,
    /// Forcibly ended; cannot be undone by any subsequent event.
    Terminated,
}

impl Phase {
    /// Returns the phase name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::Active => "Active",
            Self::PausedForFullscreen => "PausedForFullscreen",
            Self::PausedForViolation => "PausedForViolation",
            Self::Completed => "Completed",
            Self::Terminated => "Terminated",
        }
    }

    /// Returns whether this phase is absorbing.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Terminated)
    }

    /// Returns whether this is one of the paused phases.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        matches!(self, Self::PausedForFullscreen | Self::PausedForViolation)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the session was paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PauseReason {
    /// The candidate left fullscreen.
    FullscreenExit,
    /// A proctoring violation was surfaced.
    Violation,
}

/// Category of a counted integrity strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrikeCategory {
    /// Fullscreen exited.
    FullscreenExit,
    /// Tab or window switched away.
    TabSwitch,
    /// Camera track lost or analysis pipeline failed.
    CameraFailure,
    /// Debounced proctoring violation (no-face, multi-face, gaze).
    IntegrityWarning,
}

impl StrikeCategory {
    /// Returns a short code for logging and trace output.
    #[must_use]
    pub const fn as_code(&self) -> &'static str {
        match self {
            Self::FullscreenExit => "FULLSCREEN_EXIT",
            Self::TabSwitch => "TAB_SWITCH",
            Self::CameraFailure => "CAMERA_FAILURE",
            Self::IntegrityWarning => "INTEGRITY_WARNING",
        }
    }

    /// Violation-class categories pause the session when counted below the
    /// limit; fullscreen/tab categories only count (the fullscreen pause
    /// arrives through its own browser event).
    #[must_use]
    pub const fn is_violation_class(&self) -> bool {
        matches!(self, Self::CameraFailure | Self::IntegrityWarning)
    }
}

impl std::fmt::Display for StrikeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullscreenExit => write!(f, "fullscreen exit"),
            Self::TabSwitch => write!(f, "tab switch"),
            Self::CameraFailure => write!(f, "camera failure"),
            Self::IntegrityWarning => write!(f, "integrity warning"),
        }
    }
}

/// Independent monotonic strike counters. Reset only by session end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrikeCounters {
    /// Fullscreen exits counted.
    pub fullscreen_exits: u32,
    /// Tab switches counted.
    pub tab_switches: u32,
    /// Camera failures counted.
    pub camera_failures: u32,
    /// Integrity warnings counted.
    pub integrity_warnings: u32,
}

impl StrikeCounters {
    /// Returns the count for one category.
    #[must_use]
    pub const fn count(&self, category: StrikeCategory) -> u32 {
        match category {
            StrikeCategory::FullscreenExit => self.fullscreen_exits,
            StrikeCategory::TabSwitch => self.tab_switches,
            StrikeCategory::CameraFailure => self.camera_failures,
            StrikeCategory::IntegrityWarning => self.integrity_warnings,
        }
    }

    fn increment(&mut self, category: StrikeCategory) -> u32 {
        let counter = match category {
            StrikeCategory::FullscreenExit => &mut self.fullscreen_exits,
            StrikeCategory::TabSwitch => &mut self.tab_switches,
            StrikeCategory::CameraFailure => &mut self.camera_failures,
            StrikeCategory::IntegrityWarning => &mut self.integrity_warnings,
        };
        *counter += 1;
        *counter
    }
}

/// Why a session reached [`Phase::Terminated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationCause {
    /// A strike counter reached its configured maximum.
    StrikeLimit(StrikeCategory),
    /// Terminated by an explicit request (operator or host shutdown).
    Forced,
}

/// Final outcome of a session, for the terminal candidate-visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    /// Interview ran to completion and evaluation was recorded.
    Completed,
    /// Interview was ended for cause.
    Terminated(TerminationCause),
}

/// Result of a transition request.
///
/// Invalid-phase requests are ignored, never raised: a stale callback from a
/// superseded phase must be a provable no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Transition {
    /// The transition was applied.
    Applied,
    /// The request arrived in a phase where it does not apply.
    Ignored,
}

impl Transition {
    /// Returns whether the transition was applied.
    #[must_use]
    pub const fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Result of counting a strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum StrikeOutcome {
    /// Counted; below the category limit, no phase change.
    Counted,
    /// Counted; the session paused to surface the violation.
    Paused,
    /// The category limit was reached; the session is now terminated.
    Terminated,
    /// The session was already terminal; nothing counted.
    Ignored,
}

/// The single mutable aggregate root for one proctored interview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    phase: Phase,
    /// Candidate identity resolved at session start; immutable thereafter.
    candidate_id: String,
    strikes: StrikeCounters,
    limits: StrikeLimits,
    current_question: Option<String>,
    last_known_question: Option<String>,
    /// At most one live countdown at any instant.
    countdown: Option<TimerId>,
    /// Narration in flight, if any.
    active_utterance: Option<UtteranceId>,
    pause_reason: Option<PauseReason>,
    outcome: Option<SessionOutcome>,
}

impl Session {
    /// Creates a session for a validated candidate.
    #[must_use]
    pub fn new(candidate_id: impl Into<String>, limits: StrikeLimits) -> Self {
        Self {
            phase: Phase::NotStarted,
            candidate_id: candidate_id.into(),
            strikes: StrikeCounters::default(),
            limits,
            current_question: None,
            last_known_question: None,
            countdown: None,
            active_utterance: None,
            pause_reason: None,
            outcome: None,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Candidate identifier.
    #[must_use]
    pub fn candidate_id(&self) -> &str {
        &self.candidate_id
    }

    /// Strike counters.
    #[must_use]
    pub const fn strikes(&self) -> StrikeCounters {
        self.strikes
    }

    /// Why the session is currently paused, if it is.
    #[must_use]
    pub const fn pause_reason(&self) -> Option<PauseReason> {
        self.pause_reason
    }

    /// Final outcome once the session is terminal.
    #[must_use]
    pub const fn outcome(&self) -> Option<SessionOutcome> {
        self.outcome
    }

    /// The active prompt text.
    #[must_use]
    pub fn current_question(&self) -> Option<&str> {
        self.current_question.as_deref()
    }

    /// Durable copy of the prompt retained across pause/resume.
    #[must_use]
    pub fn last_known_question(&self) -> Option<&str> {
        self.last_known_question.as_deref()
    }

    /// Sets the active prompt and its durable copy.
    pub fn set_question(&mut self, question: impl Into<String>) {
        let question = question.into();
        self.current_question = Some(question.clone());
        self.last_known_question = Some(question);
    }

    /// Clears the active prompt (the durable copy is kept).
    pub fn clear_question(&mut self) {
        self.current_question = None;
    }

    /// Records ownership of a live countdown.
    ///
    /// The caller must have cancelled the predecessor first; this asserts the
    /// single-timer invariant in debug builds.
    pub fn put_countdown(&mut self, id: TimerId) {
        debug_assert!(self.countdown.is_none(), "countdown already live");
        self.countdown = Some(id);
    }

    /// Releases ownership of the live countdown, if any.
    pub fn take_countdown(&mut self) -> Option<TimerId> {
        self.countdown.take()
    }

    /// Returns whether `id` is the live countdown.
    #[must_use]
    pub fn owns_countdown(&self, id: TimerId) -> bool {
        self.countdown == Some(id)
    }

    /// Records the in-flight utterance.
    pub fn put_utterance(&mut self, id: UtteranceId) {
        self.active_utterance = Some(id);
    }

    /// Clears the in-flight utterance, if any.
    pub fn take_utterance(&mut self) -> Option<UtteranceId> {
        self.active_utterance.take()
    }

    /// Returns whether `id` is the in-flight utterance.
    #[must_use]
    pub fn owns_utterance(&self, id: UtteranceId) -> bool {
        self.active_utterance == Some(id)
    }

    /// `NotStarted → Active`. Camera acquisition and identity validation are
    /// the caller's contract and must already have succeeded.
    pub fn start(&mut self) -> Transition {
        if self.phase != Phase::NotStarted {
            debug!(phase = %self.phase, "start ignored");
            return Transition::Ignored;
        }
        self.phase = Phase::Active;
        info!(candidate = %self.candidate_id, "session started");
        Transition::Applied
    }

    /// `Active → PausedFor*`. Idempotent: a pause request while already
    /// paused is a no-op and must not stack or double-count.
    pub fn pause(&mut self, reason: PauseReason) -> Transition {
        if self.phase != Phase::Active {
            debug!(phase = %self.phase, "pause ignored");
            return Transition::Ignored;
        }
        self.phase = match reason {
            PauseReason::FullscreenExit => Phase::PausedForFullscreen,
            PauseReason::Violation => Phase::PausedForViolation,
        };
        self.pause_reason = Some(reason);
        info!(phase = %self.phase, "session paused");
        Transition::Applied
    }

    /// Paused → `Active`. The external precondition (fullscreen re-engaged)
    /// is checked by the caller before requesting resume.
    pub fn resume(&mut self) -> Transition {
        if !self.phase.is_paused() {
            debug!(phase = %self.phase, "resume ignored");
            return Transition::Ignored;
        }
        self.phase = Phase::Active;
        self.pause_reason = None;
        info!("session resumed");
        Transition::Applied
    }

    /// Increments the counter for `category`.
    ///
    /// Reaching the configured maximum terminates the session regardless of
    /// the current phase, preempting any pause. Below the maximum,
    /// violation-class categories pause an active session to surface the
    /// warning.
    pub fn record_strike(&mut self, category: StrikeCategory) -> StrikeOutcome {
        if self.phase.is_terminal() {
            debug!(code = category.as_code(), "strike ignored, session over");
            return StrikeOutcome::Ignored;
        }
        let count = self.strikes.increment(category);
        let max = match category {
            StrikeCategory::FullscreenExit => self.limits.max_fullscreen_exits,
            StrikeCategory::TabSwitch => self.limits.max_tab_switches,
            StrikeCategory::CameraFailure => self.limits.max_camera_failures,
            StrikeCategory::IntegrityWarning => self.limits.max_integrity_warnings,
        };
        warn!(code = category.as_code(), count, max, "strike recorded");

        if count >= max {
            self.force_terminal(SessionOutcome::Terminated(TerminationCause::StrikeLimit(
                category,
            )));
            return StrikeOutcome::Terminated;
        }
        if category.is_violation_class() && self.phase == Phase::Active {
            self.phase = Phase::PausedForViolation;
            self.pause_reason = Some(PauseReason::Violation);
            return StrikeOutcome::Paused;
        }
        StrikeOutcome::Counted
    }

    /// `Active → Completed`.
    pub fn complete(&mut self) -> Transition {
        if self.phase != Phase::Active {
            debug!(phase = %self.phase, "complete ignored");
            return Transition::Ignored;
        }
        self.force_terminal(SessionOutcome::Completed);
        info!(candidate = %self.candidate_id, "session completed");
        Transition::Applied
    }

    /// Any non-terminal phase → `Terminated`, outcome marked forced.
    pub fn terminate(&mut self) -> Transition {
        if self.phase.is_terminal() {
            debug!(phase = %self.phase, "terminate ignored");
            return Transition::Ignored;
        }
        self.force_terminal(SessionOutcome::Terminated(TerminationCause::Forced));
        warn!(candidate = %self.candidate_id, "session terminated");
        Transition::Applied
    }

    fn force_terminal(&mut self, outcome: SessionOutcome) {
        self.phase = match outcome {
            SessionOutcome::Completed => Phase::Completed,
            SessionOutcome::Terminated(_) => Phase::Terminated,
        };
        self.pause_reason = None;
        self.outcome = Some(outcome);
    }
}
