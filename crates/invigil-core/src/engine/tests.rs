//! Engine dispatch tests: timer ownership, pause/resume races, strike flow,
//! and the full question/answer cycle against a scripted service.

use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;

use super::{Engine, Event, Notice, StartError};
use crate::config::ProctorConfig;
use crate::detect::{FaceLandmarks, FrameObservation};
use crate::host::mock::{MockCamera, MockNarrator, MockTimer};
use crate::host::{CameraControl, Narrator, TimerId, UtteranceId};
use crate::service::ScriptedService;
use crate::session::{PauseReason, Phase, SessionOutcome, StrikeCategory, TerminationCause};

/// Spoken by the engine after the final evaluation.
const CLOSING_TEXT: &str = "Thank you. Your interview is now complete.";

type TestEngine = Engine<ScriptedService, MockTimer, MockNarrator, MockCamera>;

fn engine_with(questions: &[&str]) -> TestEngine {
    let service = ScriptedService::new("c-1", questions.iter().map(|q| (*q).to_string()).collect());
    let mut engine = Engine::start(
        ProctorConfig::default(),
        service,
        MockTimer::new(),
        MockNarrator::new(),
        MockCamera::new(),
        "tok-1",
    )
    .unwrap();
    engine.begin();
    engine
}

fn no_face(ts: u64) -> Event {
    Event::Frame(FrameObservation {
        timestamp_ms: ts,
        face_count: 0,
        landmarks: None,
    })
}

fn centered_face(ts: u64) -> Event {
    Event::Frame(FrameObservation {
        timestamp_ms: ts,
        face_count: 1,
        landmarks: Some(FaceLandmarks {
            nose: (0.5, 0.6),
            left_eye: (0.4, 0.6),
            right_eye: (0.6, 0.6),
        }),
    })
}

/// Drives the current narration to completion, starting the countdown.
fn finish_narration(engine: &mut TestEngine) {
    let id = engine.narrator().current.expect("narration in flight");
    engine.handle(Event::NarrationFinished(id));
}

/// Id of the live countdown, from the timer double.
fn live_countdown(engine: &TestEngine) -> TimerId {
    *engine.timer().live.first().expect("countdown live")
}

#[test]
fn test_invalid_token_is_fatal_to_start() {
    let result = Engine::start(
        ProctorConfig::default(),
        ScriptedService::new("c-1", vec![]),
        MockTimer::new(),
        MockNarrator::new(),
        MockCamera::new(),
        "",
    );
    assert!(matches!(result, Err(StartError::Validation(_))));
}

#[test]
fn test_begin_presents_and_narrates_first_question() {
    let mut engine = engine_with(&["Q1"]);
    assert_eq!(engine.phase(), Phase::Active);
    assert_eq!(engine.session().current_question(), Some("Q1"));
    assert_eq!(engine.narrator().spoken, vec!["Q1".to_string()]);
    // The countdown must not run while the question is being spoken.
    assert_eq!(engine.timer().live_count(), 0);

    finish_narration(&mut engine);
    assert_eq!(engine.timer().live_count(), 1);
    assert_eq!(engine.countdown_remaining, 60);
}

#[test]
fn test_timeout_submits_empty_answer_and_advances() {
    let mut engine = engine_with(&["Q1", "Q2"]);
    finish_narration(&mut engine);

    let countdown = live_countdown(&engine);
    for _ in 0..60 {
        engine.handle(Event::Tick(countdown));
    }

    // Countdown hit zero with an empty answer box: the empty answer went
    // out and the next question was fetched with it.
    assert_eq!(engine.session().current_question(), Some("Q2"));
    let answers = engine.service().answers();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0], None);
    assert_eq!(answers[1].as_deref(), Some(""));
}

#[test]
fn test_empty_submit_is_rejected_locally() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);
    let calls_before = engine.service().next_calls();

    engine.handle(Event::SubmitRequested);

    // No network call, countdown still live, notice surfaced.
    assert_eq!(engine.service().next_calls(), calls_before);
    assert_eq!(engine.timer().live_count(), 1);
    assert!(engine.drain_notices().contains(&Notice::EmptyAnswerRejected));
}

#[test]
fn test_whitespace_submit_is_rejected_locally() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);
    let calls_before = engine.service().next_calls();

    engine.handle(Event::AnswerEdited("   \t".to_string()));
    engine.handle(Event::SubmitRequested);

    assert_eq!(engine.service().next_calls(), calls_before);
}

#[test]
fn test_submit_cancels_countdown_and_fetches_next() {
    let mut engine = engine_with(&["Q1", "Q2"]);
    finish_narration(&mut engine);

    engine.handle(Event::TranscriptReady("my answer".to_string()));
    engine.handle(Event::SubmitRequested);

    assert_eq!(engine.session().current_question(), Some("Q2"));
    assert_eq!(engine.service().answers()[1].as_deref(), Some("my answer"));
    // Old countdown cancelled; new one starts only after Q2's narration.
    assert_eq!(engine.timer().live_count(), 0);
    finish_narration(&mut engine);
    assert_eq!(engine.timer().live_count(), 1);
}

#[test]
fn test_edits_after_transcript_overwrite_draft() {
    let mut engine = engine_with(&["Q1", "Q2"]);
    finish_narration(&mut engine);

    engine.handle(Event::TranscriptReady("spoken version".to_string()));
    engine.handle(Event::AnswerEdited("edited version".to_string()));
    engine.handle(Event::SubmitRequested);

    assert_eq!(
        engine.service().answers()[1].as_deref(),
        Some("edited version")
    );
}

#[test]
fn test_completed_response_evaluates_once_before_completion() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    engine.handle(Event::AnswerEdited("done".to_string()));
    engine.handle(Event::SubmitRequested);

    assert_eq!(engine.phase(), Phase::Completed);
    assert_eq!(engine.service().evaluate_calls(), 1);
    assert_eq!(engine.camera().releases, 1);
    assert_eq!(engine.outcome(), Some(SessionOutcome::Completed));
    // The closing message was narrated on the way out.
    assert_eq!(
        engine.narrator().spoken.last().map(String::as_str),
        Some(CLOSING_TEXT)
    );
}

/// Shared call journal for ordering assertions across host doubles.
#[derive(Clone, Default)]
struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    fn position(&self, entry: &str) -> Option<usize> {
        self.0.borrow().iter().position(|e| e == entry)
    }
}

struct LoggedNarrator {
    log: CallLog,
    next_id: u64,
}

impl Narrator for LoggedNarrator {
    fn speak(&mut self, text: &str, _rate: f32, _pitch: f32) -> UtteranceId {
        self.next_id += 1;
        self.log.push(format!("speak:{text}"));
        UtteranceId(self.next_id)
    }

    fn cancel(&mut self) {
        self.log.push("narration_cancel");
    }
}

struct LoggedCamera {
    log: CallLog,
}

impl CameraControl for LoggedCamera {
    fn release(&mut self) {
        self.log.push("camera_release");
    }
}

#[test]
fn test_closing_narration_precedes_camera_release() {
    let log = CallLog::default();
    let mut engine = Engine::start(
        ProctorConfig::default(),
        ScriptedService::new("c-1", vec!["Q1".to_string()]),
        MockTimer::new(),
        LoggedNarrator {
            log: log.clone(),
            next_id: 0,
        },
        LoggedCamera { log: log.clone() },
        "tok-1",
    )
    .unwrap();
    engine.begin();
    engine.handle(Event::NarrationFinished(UtteranceId(1)));
    engine.handle(Event::AnswerEdited("done".to_string()));
    engine.handle(Event::SubmitRequested);

    assert_eq!(engine.phase(), Phase::Completed);
    let closing = log
        .position(&format!("speak:{CLOSING_TEXT}"))
        .expect("closing message narrated");
    let release = log.position("camera_release").expect("camera released");
    assert!(
        closing < release,
        "closing message must be spoken before the camera is released"
    );
}

#[test]
fn test_fullscreen_exit_pauses_and_cancels_everything() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);
    assert_eq!(engine.timer().live_count(), 1);

    engine.handle(Event::FullscreenChanged(false));

    assert_eq!(engine.phase(), Phase::PausedForFullscreen);
    assert_eq!(engine.timer().live_count(), 0);
    assert_eq!(engine.session().strikes().fullscreen_exits, 1);
}

#[test]
fn test_fullscreen_reengage_resumes_with_fresh_interval() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    // Burn some time, then pause.
    let countdown = live_countdown(&engine);
    for _ in 0..20 {
        engine.handle(Event::Tick(countdown));
    }
    assert_eq!(engine.countdown_remaining, 40);

    engine.handle(Event::FullscreenChanged(false));
    engine.handle(Event::FullscreenChanged(true));

    // Countdown state is not preserved across a pause.
    assert_eq!(engine.phase(), Phase::Active);
    assert_eq!(engine.countdown_remaining, 60);
    assert_eq!(engine.timer().live_count(), 1);
    // Question redisplayed from the session, not re-fetched.
    assert_eq!(engine.service().next_calls(), 1);
}

#[test]
fn test_stale_tick_after_pause_is_dropped() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);
    let countdown = live_countdown(&engine);

    engine.handle(Event::FullscreenChanged(false));
    // The cancelled countdown's tick arrives late.
    engine.handle(Event::Tick(countdown));

    assert_eq!(engine.phase(), Phase::PausedForFullscreen);
    assert_eq!(engine.countdown_remaining, 0);
    // No auto-submit happened.
    assert_eq!(engine.service().next_calls(), 1);
}

#[test]
fn test_stale_narration_completion_is_dropped() {
    let mut engine = engine_with(&["Q1"]);
    let utterance = engine.narrator().current.unwrap();

    // Pause silences the narration mid-utterance.
    engine.handle(Event::FullscreenChanged(false));
    assert_eq!(engine.narrator().cancels, 1);

    engine.handle(Event::FullscreenChanged(true));
    // Resume restarted the countdown for the displayed question; the
    // silenced utterance's completion arrives late and must not start a
    // second one.
    let timers_started = engine.timer().started;
    engine.handle(Event::NarrationFinished(utterance));
    assert_eq!(engine.timer().started, timers_started);
    assert_eq!(engine.timer().live_count(), 1);
}

#[test]
fn test_tab_switches_count_without_pausing_until_limit() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    engine.handle(Event::VisibilityChanged { hidden: true });
    engine.handle(Event::VisibilityChanged { hidden: false });
    engine.handle(Event::VisibilityChanged { hidden: true });
    assert_eq!(engine.phase(), Phase::Active);
    assert_eq!(engine.session().strikes().tab_switches, 2);
    assert!(engine.drain_notices().contains(&Notice::TabSwitchWarning));

    // Third switch reaches the default limit.
    engine.handle(Event::VisibilityChanged { hidden: true });
    assert_eq!(engine.phase(), Phase::Terminated);
    assert_eq!(
        engine.outcome(),
        Some(SessionOutcome::Terminated(TerminationCause::StrikeLimit(
            StrikeCategory::TabSwitch
        )))
    );
    assert_eq!(engine.camera().releases, 1);
}

#[test]
fn test_camera_failure_pauses_then_terminates_at_limit() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    engine.handle(Event::CameraFailed);
    assert_eq!(engine.phase(), Phase::PausedForViolation);
    assert_eq!(engine.timer().live_count(), 0);

    engine.handle(Event::ResumeRequested);
    assert_eq!(engine.phase(), Phase::Active);

    engine.handle(Event::CameraFailed);
    assert_eq!(engine.phase(), Phase::Terminated);
}

#[test]
fn test_violation_pauses_session_and_surfaces_warning() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    for i in 0..15u64 {
        engine.handle(no_face(i * 66));
    }

    assert_eq!(engine.phase(), Phase::PausedForViolation);
    assert_eq!(engine.session().strikes().integrity_warnings, 1);
    let notices = engine.drain_notices();
    assert!(notices.iter().any(|n| matches!(n, Notice::Violation(_))));
    assert!(notices
        .iter()
        .any(|n| matches!(n, Notice::Paused(PauseReason::Violation))));
}

#[test]
fn test_frames_while_paused_are_dropped() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);
    engine.handle(Event::FullscreenChanged(false));

    for i in 0..30u64 {
        engine.handle(no_face(i * 66));
    }
    // No violation accrued while paused.
    assert_eq!(engine.session().strikes().integrity_warnings, 0);
}

#[test]
fn test_accumulated_violations_terminate() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    // Three violation bursts, spaced past the 10s cooldown; resume between
    // them since each one pauses the session.
    for burst in 0..3u64 {
        let base = burst * 20_000;
        for i in 0..15u64 {
            engine.handle(no_face(base + i * 66));
        }
        if burst < 2 {
            assert_eq!(engine.phase(), Phase::PausedForViolation);
            engine.handle(Event::ResumeRequested);
            assert_eq!(engine.phase(), Phase::Active);
        }
    }

    assert_eq!(engine.phase(), Phase::Terminated);
    assert_eq!(
        engine.outcome(),
        Some(SessionOutcome::Terminated(TerminationCause::StrikeLimit(
            StrikeCategory::IntegrityWarning
        )))
    );
    assert_eq!(engine.camera().releases, 1);
}

#[test]
fn test_resume_requires_fullscreen_precondition() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    engine.handle(Event::FullscreenChanged(false));
    // Resume request while fullscreen is still off goes nowhere.
    engine.handle(Event::ResumeRequested);
    assert_eq!(engine.phase(), Phase::PausedForFullscreen);

    engine.handle(Event::FullscreenChanged(true));
    assert_eq!(engine.phase(), Phase::Active);
}

#[test]
fn test_failed_next_keeps_session_active_and_reenables_submission() {
    let mut engine = engine_with(&["Q1", "Q2"]);
    finish_narration(&mut engine);

    engine.service().fail_next_calls(1);
    engine.handle(Event::TranscriptReady("lost answer".to_string()));
    engine.handle(Event::SubmitRequested);

    // The fetch failed: the session stays Active, submission reopens, and a
    // retry notice is surfaced.
    assert_eq!(engine.phase(), Phase::Active);
    assert!(engine.accepting_answers);
    assert!(engine
        .drain_notices()
        .iter()
        .any(|n| matches!(n, Notice::ServiceRetry(_))));
    assert_eq!(engine.session().current_question(), None);

    // Resubmission goes through once the service recovers.
    engine.handle(Event::TranscriptReady("recovered answer".to_string()));
    engine.handle(Event::SubmitRequested);
    assert_eq!(engine.session().current_question(), Some("Q2"));
    assert_eq!(
        engine.service().answers(),
        vec![None, Some("recovered answer".to_string())]
    );
}

#[test]
fn test_resume_redisplays_durable_question_without_refetch() {
    let mut engine = engine_with(&["Q1", "Q2"]);
    finish_narration(&mut engine);

    // A failed fetch leaves no displayed question, only the durable copy.
    engine.service().fail_next_calls(1);
    engine.handle(Event::TranscriptReady("into the void".to_string()));
    engine.handle(Event::SubmitRequested);
    assert_eq!(engine.session().current_question(), None);
    assert_eq!(engine.session().last_known_question(), Some("Q1"));
    let calls = engine.service().next_calls();

    engine.handle(Event::FullscreenChanged(false));
    engine.handle(Event::FullscreenChanged(true));

    // Q1 was redisplayed and renarrated from the session, not re-fetched.
    assert_eq!(engine.phase(), Phase::Active);
    assert_eq!(engine.session().current_question(), Some("Q1"));
    assert_eq!(
        engine.narrator().spoken.last().map(String::as_str),
        Some("Q1")
    );
    assert_eq!(engine.service().next_calls(), calls);
}

#[test]
fn test_resume_refetches_when_no_question_was_ever_presented() {
    let service = ScriptedService::new("c-1", vec!["Q1".to_string()]);
    service.fail_next_calls(1);
    let mut engine = Engine::start(
        ProctorConfig::default(),
        service,
        MockTimer::new(),
        MockNarrator::new(),
        MockCamera::new(),
        "tok-1",
    )
    .unwrap();
    engine.begin();
    assert_eq!(engine.session().current_question(), None);
    assert_eq!(engine.session().last_known_question(), None);

    engine.handle(Event::FullscreenChanged(false));
    engine.handle(Event::FullscreenChanged(true));

    // Resume had nothing to redisplay and re-requested the first question.
    assert_eq!(engine.session().current_question(), Some("Q1"));
    assert_eq!(engine.service().next_calls(), 2);
    assert_eq!(engine.service().answers(), vec![None]);
}

#[test]
fn test_retry_request_refetches_failed_first_question() {
    let service = ScriptedService::new("c-1", vec!["Q1".to_string()]);
    service.fail_next_calls(1);
    let mut engine = Engine::start(
        ProctorConfig::default(),
        service,
        MockTimer::new(),
        MockNarrator::new(),
        MockCamera::new(),
        "tok-1",
    )
    .unwrap();
    engine.begin();
    assert!(engine
        .drain_notices()
        .iter()
        .any(|n| matches!(n, Notice::ServiceRetry(_))));

    engine.handle(Event::RetryRequested);

    // Both attempts were first-question requests.
    assert_eq!(engine.session().current_question(), Some("Q1"));
    assert_eq!(engine.service().next_calls(), 2);
    assert_eq!(engine.service().answers(), vec![None]);
}

#[test]
fn test_retry_request_ignored_once_a_question_was_presented() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);
    let calls = engine.service().next_calls();

    engine.handle(Event::RetryRequested);

    assert_eq!(engine.service().next_calls(), calls);
    assert_eq!(engine.narrator().spoken.len(), 1);
}

#[test]
fn test_centered_frames_produce_no_violations() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    for i in 0..200u64 {
        engine.handle(centered_face(i * 66));
    }
    assert_eq!(engine.session().strikes().integrity_warnings, 0);
    assert_eq!(engine.phase(), Phase::Active);
}

#[test]
fn test_terminate_request_releases_resources_once() {
    let mut engine = engine_with(&["Q1"]);
    finish_narration(&mut engine);

    engine.handle(Event::TerminateRequested);
    assert_eq!(engine.phase(), Phase::Terminated);
    assert_eq!(
        engine.outcome(),
        Some(SessionOutcome::Terminated(TerminationCause::Forced))
    );
    assert_eq!(engine.camera().releases, 1);
    assert_eq!(engine.timer().live_count(), 0);

    // A second request is absorbed.
    engine.handle(Event::TerminateRequested);
    assert_eq!(engine.camera().releases, 1);
}

#[test]
fn test_end_to_end_interview_flow() {
    let mut engine = engine_with(&["Q1", "Q2"]);

    // Q1 narrated, countdown runs out with an empty box.
    finish_narration(&mut engine);
    let countdown = live_countdown(&engine);
    for _ in 0..60 {
        engine.handle(Event::Tick(countdown));
    }

    // Q2 answered by voice.
    assert_eq!(engine.session().current_question(), Some("Q2"));
    finish_narration(&mut engine);
    engine.handle(Event::TranscriptReady("final answer".to_string()));
    engine.handle(Event::SubmitRequested);

    assert_eq!(engine.phase(), Phase::Completed);
    assert_eq!(engine.service().evaluate_calls(), 1);
    let answers = engine.service().answers();
    assert_eq!(
        answers,
        vec![None, Some(String::new()), Some("final answer".to_string())]
    );
}

proptest! {
    /// Under any interleaving of pause/resume/tick/narration events, at most
    /// one countdown is ever live.
    #[test]
    fn prop_at_most_one_live_timer(ops in prop::collection::vec(0u8..8, 1..80)) {
        let mut engine = engine_with(&["Q1", "Q2", "Q3"]);
        for op in ops {
            match op {
                0 => engine.handle(Event::FullscreenChanged(false)),
                1 => engine.handle(Event::FullscreenChanged(true)),
                2 => engine.handle(Event::ResumeRequested),
                3 => {
                    if let Some(id) = engine.narrator().current {
                        engine.handle(Event::NarrationFinished(id));
                    }
                },
                4 => engine.handle(Event::Tick(TimerId(1))),
                5 => engine.handle(Event::Tick(TimerId(2))),
                6 => engine.handle(Event::VisibilityChanged { hidden: true }),
                _ => engine.handle(Event::SubmitRequested),
            }
            prop_assert!(engine.timer().live_count() <= 1);
        }
        prop_assert!(engine.timer().max_live <= 1);
    }
}
