//! Event dispatcher fusing all signal sources into the session state.
//!
//! The engine is single-threaded and cooperative: every signal source (timer
//! ticks, frame-analysis results, fullscreen/visibility changes, narration
//! completions, transcripts) arrives as an [`Event`] and is applied by
//! [`Engine::handle`], one event at a time. There is no true parallelism; the
//! hazard is interleaving, and the discipline that prevents double-fires is
//! uniform: every handler checks the current phase (and handle ownership)
//! as its first action and no-ops when the session has moved on.
//!
//! Countdown and narration cancellation happen inside one handler
//! invocation, so from the event loop's perspective pause and terminate are
//! atomic. Stale ticks and stale narration completions are detected by id
//! mismatch against the handles the session owns.

#[cfg(test)]
mod tests;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ProctorConfig;
use crate::detect::{FrameObservation, Violation, ViolationTracker};
use crate::host::{CameraControl, Narrator, TimerDriver, TimerId, UtteranceId};
use crate::service::{InterviewService, ServiceError};
use crate::session::{
    PauseReason, Phase, Session, SessionOutcome, StrikeCategory, StrikeOutcome,
};

/// An asynchronously-arriving signal, normalized for the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// One countdown tick from the timer driver.
    Tick(TimerId),
    /// One camera frame-analysis result.
    Frame(FrameObservation),
    /// Fullscreen engaged (`true`) or exited (`false`).
    FullscreenChanged(bool),
    /// Page visibility changed; `hidden: true` means the tab lost focus.
    VisibilityChanged {
        /// Whether the page became hidden.
        hidden: bool,
    },
    /// The camera track was lost or the analysis pipeline failed.
    CameraFailed,
    /// An utterance finished speaking naturally.
    NarrationFinished(UtteranceId),
    /// Speech recognition produced a final transcript.
    TranscriptReady(String),
    /// The candidate edited the answer text directly.
    AnswerEdited(String),
    /// The candidate pressed submit.
    SubmitRequested,
    /// The candidate acknowledged a pause and asked to resume.
    ResumeRequested,
    /// The candidate asked to retry a failed question fetch.
    RetryRequested,
    /// The host asked for a forced termination (shutdown, operator).
    TerminateRequested,
}

/// Candidate-visible output produced while handling events.
///
/// The engine renders nothing; hosts drain these and decide presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notice {
    /// A new question is displayed.
    Question(String),
    /// A debounced proctoring violation was surfaced.
    Violation(Violation),
    /// The session paused.
    Paused(PauseReason),
    /// The session resumed.
    Resumed,
    /// A tab/window switch was counted.
    TabSwitchWarning,
    /// An empty answer was rejected locally; nothing was sent.
    EmptyAnswerRejected,
    /// A next-question request failed; submission was re-enabled.
    ServiceRetry(String),
    /// The interview completed normally.
    Completed,
    /// The interview was ended for cause.
    Terminated,
}

/// Errors that prevent a session from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// Token validation failed; fatal to session start.
    #[error("identity validation failed: {0}")]
    Validation(#[source] ServiceError),
}

/// The proctoring engine: owns the session aggregate, the violation tracker,
/// the flow state, and the host capabilities.
pub struct Engine<S, T, N, C>
where
    S: InterviewService,
    T: TimerDriver,
    N: Narrator,
    C: CameraControl,
{
    pub(crate) config: ProctorConfig,
    pub(crate) session: Session,
    pub(crate) tracker: ViolationTracker,
    pub(crate) service: S,
    pub(crate) timer: T,
    pub(crate) narrator: N,
    pub(crate) camera: C,
    /// Current answer text, typed or transcribed.
    pub(crate) answer_draft: String,
    /// Submission gate between questions.
    pub(crate) accepting_answers: bool,
    /// Seconds left on the live countdown.
    pub(crate) countdown_remaining: u64,
    /// Last known fullscreen state; precondition for resume.
    pub(crate) fullscreen: bool,
    pub(crate) notices: Vec<Notice>,
}

impl<S, T, N, C> Engine<S, T, N, C>
where
    S: InterviewService,
    T: TimerDriver,
    N: Narrator,
    C: CameraControl,
{
    /// Validates the one-time link token and builds an engine in
    /// `NotStarted`. Camera acquisition is the host's contract and must have
    /// succeeded before this is called.
    ///
    /// # Errors
    ///
    /// Returns [`StartError::Validation`] when the token exchange fails;
    /// the session never starts.
    pub fn start(
        config: ProctorConfig,
        service: S,
        timer: T,
        narrator: N,
        camera: C,
        token: &str,
    ) -> Result<Self, StartError> {
        let candidate_id = service.validate(token).map_err(StartError::Validation)?;
        let session = Session::new(candidate_id, config.limits.clone());
        let tracker = ViolationTracker::new(config.detection.clone());
        Ok(Self {
            config,
            session,
            tracker,
            service,
            timer,
            narrator,
            camera,
            answer_draft: String::new(),
            accepting_answers: false,
            countdown_remaining: 0,
            fullscreen: true,
            notices: Vec::new(),
        })
    }

    /// Moves the session to `Active` and fetches the first question.
    pub fn begin(&mut self) {
        if !self.session.start().applied() {
            return;
        }
        self.request_next(None);
    }

    /// Applies one event. Every branch guards on phase (and handle
    /// ownership) first; events that arrive for a superseded phase are
    /// dropped.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Tick(id) => self.on_tick(id),
            Event::Frame(frame) => self.on_frame(&frame),
            Event::FullscreenChanged(engaged) => self.on_fullscreen(engaged),
            Event::VisibilityChanged { hidden } => self.on_visibility(hidden),
            Event::CameraFailed => self.on_camera_failed(),
            Event::NarrationFinished(id) => self.on_narration_finished(id),
            Event::TranscriptReady(text) => self.on_transcript(text),
            Event::AnswerEdited(text) => self.on_answer_edited(text),
            Event::SubmitRequested => self.submit(),
            Event::ResumeRequested => self.on_resume_requested(),
            Event::RetryRequested => self.on_retry_requested(),
            Event::TerminateRequested => self.on_terminate_requested(),
        }
    }

    /// Session phase, for hosts.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Session aggregate, read-only.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Final outcome, once terminal.
    #[must_use]
    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.session.outcome()
    }

    /// Current answer draft.
    #[must_use]
    pub fn answer_draft(&self) -> &str {
        &self.answer_draft
    }

    /// Drains accumulated candidate-visible notices.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// The injected timer driver (host or test double).
    #[must_use]
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// The injected narrator.
    #[must_use]
    pub fn narrator(&self) -> &N {
        &self.narrator
    }

    /// The injected camera control.
    #[must_use]
    pub fn camera(&self) -> &C {
        &self.camera
    }

    /// The injected interview service.
    #[must_use]
    pub fn service(&self) -> &S {
        &self.service
    }

    fn on_tick(&mut self, id: TimerId) {
        // Stale ticks from a cancelled countdown carry an id the session no
        // longer owns.
        if self.session.phase() != Phase::Active || !self.session.owns_countdown(id) {
            debug!(?id, "tick dropped");
            return;
        }
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
        if self.countdown_remaining == 0 {
            self.cancel_countdown();
            self.submit_on_timeout();
        }
    }

    fn on_frame(&mut self, frame: &FrameObservation) {
        // Frames only matter while the interview is actually running.
        if self.session.phase() != Phase::Active {
            return;
        }
        if let Some(violation) = self.tracker.observe(frame) {
            self.notices.push(Notice::Violation(violation));
            self.apply_strike(StrikeCategory::IntegrityWarning);
        }
    }

    fn on_fullscreen(&mut self, engaged: bool) {
        self.fullscreen = engaged;
        if engaged {
            // Re-engaging fullscreen satisfies the resume precondition for a
            // fullscreen pause; violation pauses wait for an explicit resume
            // request.
            if self.session.phase() == Phase::PausedForFullscreen {
                self.do_resume();
            }
            return;
        }
        if self.session.phase().is_terminal() || self.session.phase() == Phase::NotStarted {
            return;
        }
        // Pause before evaluating the strike so no countdown or narration
        // callback can interleave with the limit check.
        if self.session.pause(PauseReason::FullscreenExit).applied() {
            self.silence();
            self.notices.push(Notice::Paused(PauseReason::FullscreenExit));
        }
        self.apply_strike(StrikeCategory::FullscreenExit);
    }

    fn on_visibility(&mut self, hidden: bool) {
        if !hidden {
            return;
        }
        if self.session.phase().is_terminal() || self.session.phase() == Phase::NotStarted {
            return;
        }
        // Tab switches count without pausing.
        if self.apply_strike(StrikeCategory::TabSwitch) == StrikeOutcome::Counted {
            self.notices.push(Notice::TabSwitchWarning);
        }
    }

    fn on_camera_failed(&mut self) {
        if self.session.phase().is_terminal() || self.session.phase() == Phase::NotStarted {
            return;
        }
        self.apply_strike(StrikeCategory::CameraFailure);
    }

    fn on_narration_finished(&mut self, id: UtteranceId) {
        // A stale completion from a silenced utterance must not resume a
        // countdown for a phase that has already moved on.
        if self.session.phase() != Phase::Active || !self.session.owns_utterance(id) {
            debug!(?id, "narration completion dropped");
            return;
        }
        let _ = self.session.take_utterance();
        // The question has been fully spoken; answering time starts now.
        self.start_countdown();
    }

    fn on_transcript(&mut self, text: String) {
        if self.session.phase() != Phase::Active {
            return;
        }
        // Transcripts overwrite the draft; the candidate may still edit.
        self.answer_draft = text;
    }

    fn on_answer_edited(&mut self, text: String) {
        if self.session.phase() != Phase::Active {
            return;
        }
        self.answer_draft = text;
    }

    fn on_resume_requested(&mut self) {
        if !self.session.phase().is_paused() {
            debug!(phase = %self.session.phase(), "resume request ignored");
            return;
        }
        if !self.fullscreen {
            debug!("resume request ignored, fullscreen not engaged");
            return;
        }
        self.do_resume();
    }

    fn on_retry_requested(&mut self) {
        if self.session.phase() != Phase::Active {
            return;
        }
        // Only meaningful while no question has ever been presented (the
        // first fetch failed); later fetch failures are recovered through
        // resubmission, which carries the answer.
        if self.session.last_known_question().is_none() {
            self.request_next(None);
        }
    }

    fn on_terminate_requested(&mut self) {
        if self.session.terminate().applied() {
            self.release_all();
            self.notices.push(Notice::Terminated);
        }
    }

    /// Restores `Active` and restores the question display. Countdown state
    /// is never preserved across a pause; the question gets a fresh full
    /// interval.
    fn do_resume(&mut self) {
        if !self.session.resume().applied() {
            return;
        }
        self.notices.push(Notice::Resumed);
        if self.session.current_question().is_some() {
            // Question still displayed: restart the countdown directly.
            self.start_countdown();
        } else if let Some(question) = self.session.last_known_question().map(str::to_string) {
            // Redisplay without re-fetching.
            self.present_question(question);
        } else {
            self.request_next(None);
        }
    }

    /// Counts a strike and performs the side effects its outcome requires.
    pub(crate) fn apply_strike(&mut self, category: StrikeCategory) -> StrikeOutcome {
        let outcome = self.session.record_strike(category);
        match outcome {
            StrikeOutcome::Terminated => {
                self.release_all();
                self.notices.push(Notice::Terminated);
            },
            StrikeOutcome::Paused => {
                self.silence();
                self.notices.push(Notice::Paused(PauseReason::Violation));
            },
            StrikeOutcome::Counted | StrikeOutcome::Ignored => {},
        }
        outcome
    }

    /// Starts a fresh countdown, cancelling any predecessor first. The
    /// countdown handle is owned exclusively by the session.
    pub(crate) fn start_countdown(&mut self) {
        self.cancel_countdown();
        let id = self.timer.start(Duration::from_secs(1));
        self.session.put_countdown(id);
        self.countdown_remaining = self.config.interview.question_time.as_secs();
    }

    /// Cancels the live countdown, if any.
    pub(crate) fn cancel_countdown(&mut self) {
        if let Some(id) = self.session.take_countdown() {
            self.timer.cancel(id);
        }
        self.countdown_remaining = 0;
    }

    /// Cancels countdown and narration together, within this handler
    /// invocation.
    pub(crate) fn silence(&mut self) {
        self.cancel_countdown();
        if self.session.take_utterance().is_some() {
            self.narrator.cancel();
        }
    }

    /// Terminal cleanup: stop everything and release the camera.
    pub(crate) fn release_all(&mut self) {
        self.silence();
        self.camera.release();
        if let Some(outcome) = self.session.outcome() {
            warn!(?outcome, "session closed");
        }
    }
}
