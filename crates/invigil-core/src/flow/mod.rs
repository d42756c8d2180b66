//! Question/answer cycle controller.
//!
//! Orchestrates one round: display, narrate, await an answer (typed or
//! transcribed) or the countdown expiry, submit, request the next question.
//! Every operation is gated by the session phase; the countdown never starts
//! while the question is still being spoken, and never consumes answering
//! time during narration.

use tracing::{info, warn};

use crate::engine::{Engine, Notice};
use crate::host::{CameraControl, Narrator, TimerDriver};
use crate::service::InterviewService;
use crate::session::Phase;

/// Spoken once after the final evaluation is recorded.
const CLOSING_MESSAGE: &str = "Thank you. Your interview is now complete.";

impl<S, T, N, C> Engine<S, T, N, C>
where
    S: InterviewService,
    T: TimerDriver,
    N: Narrator,
    C: CameraControl,
{
    /// Requests the next question, carrying the previous answer (`None`
    /// requests the first question).
    ///
    /// On a completed response, records the evaluation exactly once and then
    /// completes the session. On failure, surfaces a retry notice and
    /// re-enables submission; the session stays `Active`.
    pub(crate) fn request_next(&mut self, previous_answer: Option<&str>) {
        if self.session.phase() != Phase::Active {
            return;
        }
        match self.service.next(self.session.candidate_id(), previous_answer) {
            Ok(response) => {
                if response.completed {
                    self.finish_interview();
                } else if let Some(question) = response.question {
                    self.present_question(question);
                } else {
                    // Service contract breach: not completed but no question.
                    warn!("next-question response carried no question");
                    self.accepting_answers = true;
                    self.notices
                        .push(Notice::ServiceRetry("missing question".to_string()));
                }
            },
            Err(err) => {
                warn!(error = %err, "next-question request failed");
                self.accepting_answers = true;
                self.notices.push(Notice::ServiceRetry(err.to_string()));
            },
        }
    }

    /// Displays and narrates a question. The countdown starts only when the
    /// narration-completion event arrives.
    pub(crate) fn present_question(&mut self, question: String) {
        if self.session.phase() != Phase::Active {
            return;
        }
        self.session.set_question(question.clone());
        self.answer_draft.clear();
        self.accepting_answers = true;
        // No countdown may run while the question is spoken.
        self.cancel_countdown();
        self.narrator.cancel();
        let id = self.narrator.speak(
            &question,
            self.config.interview.speech_rate,
            self.config.interview.speech_pitch,
        );
        self.session.put_utterance(id);
        info!("question presented");
        self.notices.push(Notice::Question(question));
    }

    /// Candidate-initiated submission. Empty or whitespace-only answers are
    /// rejected locally, without a network call, and the countdown keeps
    /// running.
    pub(crate) fn submit(&mut self) {
        if self.session.phase() != Phase::Active || !self.accepting_answers {
            return;
        }
        let answer = self.answer_draft.trim().to_string();
        if answer.is_empty() {
            self.notices.push(Notice::EmptyAnswerRejected);
            return;
        }
        self.advance(&answer);
    }

    /// Countdown-expiry submission: whatever text is present goes out,
    /// possibly empty. The session always advances on timeout.
    pub(crate) fn submit_on_timeout(&mut self) {
        if self.session.phase() != Phase::Active {
            return;
        }
        let answer = self.answer_draft.trim().to_string();
        self.advance(&answer);
    }

    /// Cancels the countdown, closes the submission gate, and requests the
    /// next question.
    fn advance(&mut self, answer: &str) {
        self.cancel_countdown();
        self.accepting_answers = false;
        self.session.clear_question();
        self.request_next(Some(answer));
    }

    /// Records the evaluation, releases the camera, and surfaces completion.
    fn finish_interview(&mut self) {
        // Exactly one evaluate call, before completion is surfaced. A
        // failure here is logged but does not block completion.
        if let Err(err) = self.service.evaluate(self.session.candidate_id()) {
            warn!(error = %err, "evaluation request failed");
        }
        if self.session.complete().applied() {
            // The closing message is spoken before the camera is released.
            // It is not tracked, so a completion event for it is dropped by
            // id mismatch.
            self.silence();
            let _ = self.narrator.speak(
                CLOSING_MESSAGE,
                self.config.interview.speech_rate,
                self.config.interview.speech_pitch,
            );
            self.release_all();
            self.notices.push(Notice::Completed);
        }
    }
}
