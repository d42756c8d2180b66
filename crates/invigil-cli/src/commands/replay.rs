//! Event-trace replay against a scripted interview.
//!
//! A trace is one JSON-encoded engine event per line, in arrival order.
//! Questions come from a script file instead of the remote service, so a
//! recorded session can be re-driven deterministically and its notices
//! inspected.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use invigil_core::config::ProctorConfig;
use invigil_core::engine::{Engine, Event};
use invigil_core::service::ScriptedService;

use crate::hosts::{ConsoleNarrator, NullCamera, TraceTimer};

pub fn run(trace: &Path, questions: &Path, config: Option<&Path>) -> Result<()> {
    let config = match config {
        Some(path) => ProctorConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ProctorConfig::default(),
    };

    let script = fs::read_to_string(questions)
        .with_context(|| format!("failed to read questions from {}", questions.display()))?;
    let script: Vec<String> = script
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    let service = ScriptedService::new("replay-candidate", script);
    let mut engine = Engine::start(
        config,
        service,
        TraceTimer::default(),
        ConsoleNarrator::default(),
        NullCamera,
        "replay-token",
    )
    .context("token validation failed")?;
    engine.begin();
    report(&mut engine);

    let body = fs::read_to_string(trace)
        .with_context(|| format!("failed to read trace from {}", trace.display()))?;
    for (index, line) in body.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: Event = serde_json::from_str(line)
            .with_context(|| format!("invalid event at line {}", index + 1))?;
        engine.handle(event);
        report(&mut engine);
    }

    println!("final phase: {}", engine.phase());
    if let Some(outcome) = engine.outcome() {
        println!("outcome: {outcome:?}");
    }
    Ok(())
}

/// Prints the notices produced by the last event, tagged with the phase.
fn report(engine: &mut Engine<ScriptedService, TraceTimer, ConsoleNarrator, NullCamera>) {
    let phase = engine.phase();
    for notice in engine.drain_notices() {
        println!("[{phase}] {notice:?}");
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_replay_complete_session() {
        let dir = tempfile::tempdir().unwrap();
        let questions = dir.path().join("questions.txt");
        std::fs::write(&questions, "What is ownership?\n\nWhat is borrowing?\n").unwrap();

        // Narration ids are allocated in order: Q1 is utterance 1, Q2 is
        // utterance 2.
        let trace = dir.path().join("trace.jsonl");
        std::fs::write(
            &trace,
            concat!(
                "{\"NarrationFinished\":1}\n",
                "{\"TranscriptReady\":\"moves and drops\"}\n",
                "\"SubmitRequested\"\n",
                "{\"NarrationFinished\":2}\n",
                "{\"TranscriptReady\":\"references without ownership\"}\n",
                "\"SubmitRequested\"\n",
            ),
        )
        .unwrap();

        run(&trace, &questions, None).unwrap();
    }

    #[test]
    fn test_replay_rejects_malformed_event() {
        let dir = tempfile::tempdir().unwrap();
        let questions = dir.path().join("questions.txt");
        std::fs::write(&questions, "Q1\n").unwrap();
        let trace = dir.path().join("trace.jsonl");
        std::fs::write(&trace, "{\"NotAnEvent\":true}\n").unwrap();

        let err = run(&trace, &questions, None).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
