//! Proctoring session lifecycle state machine.
//!
//! The session is the single mutable aggregate root. It owns the phase, the
//! strike counters, the question text, and the countdown/utterance handles —
//! every asynchronous handler mutates session state only through the
//! transition methods here, and every transition method checks the current
//! phase as its first action.
//!
//! # State machine
//!
//! ```text
//!                       start()
//!   ┌────────────┐               ┌─────────┐    complete()   ┌────────────┐
//!   │ NotStarted │──────────────►│ Active  │────────────────►│ Completed  │
//!   └────────────┘               └─┬─────▲─┘                 └────────────┘
//!                         pause(r) │     │ resume()
//!                                  ▼     │
//!                        ┌───────────────┴──────┐
//!                        │ PausedForFullscreen /│
//!                        │ PausedForViolation   │
//!                        └──────────┬───────────┘
//!                                   │ strike limit reached (any phase)
//!                                   ▼
//!                             ┌────────────┐
//!                             │ Terminated │
//!                             └────────────┘
//! ```
//!
//! `Completed` and `Terminated` are absorbing. Transition methods called from
//! an invalid phase return [`Transition::Ignored`] instead of erroring:
//! asynchronous event arrival order is not controllable, so handlers are
//! defensively idempotent rather than assuming preconditions.

mod state;


pub use state::{
    PauseReason, Phase, Session, SessionOutcome, StrikeCategory, StrikeCounters, StrikeOutcome,
    TerminationCause, Transition,
};
