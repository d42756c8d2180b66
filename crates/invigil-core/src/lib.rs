//! invigil-core - Interview Proctoring Engine Library
//!
//! This library provides the session state machine, violation detection, and
//! question/answer flow control for a proctored automated interview. The
//! engine is host-agnostic: all platform capabilities (timers, speech
//! synthesis, camera ownership) sit behind traits so the browser bindings and
//! the test doubles share one code path.
//!
//! # Event Model
//!
//! Everything is single-threaded and cooperative. Signal sources (timer
//! ticks, frame analysis, fullscreen/visibility changes, narration
//! completions, transcripts) are normalized into [`engine::Event`] values and
//! applied one at a time by [`engine::Engine::handle`]. Stale completions
//! from a superseded phase are dropped by id mismatch, never acted on.
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with validated defaults
//! - [`detect`]: Debounced violation detection over the frame stream
//! - [`engine`]: Event dispatcher fusing all signal sources
//! - [`host`]: Capability traits for timers, narration, and the camera
//! - [`service`]: Remote interview service client and test doubles
//! - [`session`]: Session phase machine, strikes, and owned handles

pub mod config;
pub mod detect;
pub mod engine;
mod flow;
pub mod host;
pub mod service;
pub mod session;
