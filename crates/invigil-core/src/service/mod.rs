//! Remote interview service client.
//!
//! The service is a stateless request/response collaborator: it exchanges a
//! one-time link token for a candidate identity, serves the next question for
//! a previous answer, and records a final evaluation. The engine talks to it
//! through the provider-agnostic [`InterviewService`] trait;
//! [`HttpInterviewService`] is the HTTP implementation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceConfig;

/// Errors emitted by interview service providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServiceError {
    /// Request transport failed.
    #[error("service transport error: {0}")]
    Transport(String),

    /// API request failed with a structured status code.
    #[error("service API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the service.
        status: u16,
        /// Error body/message.
        message: String,
    },

    /// API payload parse failed.
    #[error("service parse error: {0}")]
    Parse(String),

    /// The link token was rejected during validation.
    #[error("invalid interview token")]
    InvalidToken,
}

impl From<reqwest::Error> for ServiceError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Response to a next-question request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextResponse {
    /// Whether the interview has no further questions.
    pub completed: bool,

    /// The next question, present unless `completed` is true.
    #[serde(default)]
    pub question: Option<String>,
}

/// Provider-agnostic interview service interface.
pub trait InterviewService {
    /// Exchanges a one-time link token for a candidate identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when the token is invalid or the request fails.
    /// Failure here is fatal to session start.
    fn validate(&self, token: &str) -> Result<String, ServiceError>;

    /// Requests the next question. `answer` is `None` for the first
    /// question; thereafter it carries the previous answer (possibly empty
    /// on timeout).
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails; the caller treats this as
    /// recoverable and re-enables submission.
    fn next(&self, candidate_id: &str, answer: Option<&str>) -> Result<NextResponse, ServiceError>;

    /// Records the final evaluation. Called exactly once, immediately after
    /// the final completed response, before completion is surfaced.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails.
    fn evaluate(&self, candidate_id: &str) -> Result<(), ServiceError>;
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    candidate_id: String,
}

#[derive(Serialize)]
struct NextRequest<'a> {
    candidate_id: &'a str,
    answer: Option<&'a str>,
}

#[derive(Serialize)]
struct EvaluateRequest<'a> {
    candidate_id: &'a str,
}

/// HTTP implementation of [`InterviewService`].
pub struct HttpInterviewService {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl HttpInterviewService {
    /// Creates a client from service configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &ServiceConfig) -> Result<Self, ServiceError> {
        Self::with_timeout(&config.base_url, config.request_timeout)
    }

    /// Creates a client for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<String, ServiceError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send()?;
        let status = response.status();
        let text = response.text()?;
        if !status.is_success() {
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }
}

impl InterviewService for HttpInterviewService {
    fn validate(&self, token: &str) -> Result<String, ServiceError> {
        let body = self.post("/validate", &ValidateRequest { token });
        match body {
            Ok(text) => {
                let parsed: ValidateResponse = serde_json::from_str(&text)?;
                Ok(parsed.candidate_id)
            },
            // The service answers 401/403 for bad tokens; fold both into the
            // dedicated variant so callers can show a blocking message.
            Err(ServiceError::Api { status, .. }) if status == 401 || status == 403 => {
                Err(ServiceError::InvalidToken)
            },
            Err(err) => Err(err),
        }
    }

    fn next(&self, candidate_id: &str, answer: Option<&str>) -> Result<NextResponse, ServiceError> {
        let text = self.post(
            "/next",
            &NextRequest {
                candidate_id,
                answer,
            },
        )?;
        Ok(serde_json::from_str(&text)?)
    }

    fn evaluate(&self, candidate_id: &str) -> Result<(), ServiceError> {
        self.post("/evaluate", &EvaluateRequest { candidate_id })?;
        Ok(())
    }
}

/// Scripted in-memory service for tests and trace replay.
///
/// Serves a fixed question list, recording every call so tests can assert
/// call counts (e.g. that an empty local submit never reaches the network).
/// Transport outages can be injected with [`Self::fail_next_calls`].
#[derive(Debug, Default)]
pub struct ScriptedService {
    questions: Vec<String>,
    candidate_id: String,
    state: std::cell::RefCell<ScriptedState>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    cursor: usize,
    pending_failures: u32,
    validate_calls: u32,
    next_calls: u32,
    evaluate_calls: u32,
    answers: Vec<Option<String>>,
}

impl ScriptedService {
    /// Creates a scripted service serving `questions` in order.
    #[must_use]
    pub fn new(candidate_id: impl Into<String>, questions: Vec<String>) -> Self {
        Self {
            questions,
            candidate_id: candidate_id.into(),
            state: std::cell::RefCell::new(ScriptedState::default()),
        }
    }

    /// Makes the next `n` calls to `next` fail with a transport error.
    pub fn fail_next_calls(&self, n: u32) {
        self.state.borrow_mut().pending_failures = n;
    }

    /// Number of `validate` calls observed.
    #[must_use]
    pub fn validate_calls(&self) -> u32 {
        self.state.borrow().validate_calls
    }

    /// Number of `next` calls observed.
    #[must_use]
    pub fn next_calls(&self) -> u32 {
        self.state.borrow().next_calls
    }

    /// Number of `evaluate` calls observed.
    #[must_use]
    pub fn evaluate_calls(&self) -> u32 {
        self.state.borrow().evaluate_calls
    }

    /// Answers received so far, in call order.
    #[must_use]
    pub fn answers(&self) -> Vec<Option<String>> {
        self.state.borrow().answers.clone()
    }
}

impl InterviewService for ScriptedService {
    fn validate(&self, token: &str) -> Result<String, ServiceError> {
        let mut state = self.state.borrow_mut();
        state.validate_calls += 1;
        if token.is_empty() {
            return Err(ServiceError::InvalidToken);
        }
        Ok(self.candidate_id.clone())
    }

    fn next(&self, _candidate_id: &str, answer: Option<&str>) -> Result<NextResponse, ServiceError> {
        let mut state = self.state.borrow_mut();
        state.next_calls += 1;
        if state.pending_failures > 0 {
            state.pending_failures -= 1;
            return Err(ServiceError::Transport("scripted outage".to_string()));
        }
        // Answers are recorded only when the call goes through; a failed
        // transport never delivered one.
        state.answers.push(answer.map(str::to_string));
        if state.cursor >= self.questions.len() {
            return Ok(NextResponse {
                completed: true,
                question: None,
            });
        }
        let question = self.questions[state.cursor].clone();
        state.cursor += 1;
        Ok(NextResponse {
            completed: false,
            question: Some(question),
        })
    }

    fn evaluate(&self, _candidate_id: &str) -> Result<(), ServiceError> {
        self.state.borrow_mut().evaluate_calls += 1;
        Ok(())
    }
}
