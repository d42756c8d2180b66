//! Configuration parsing and management.
//!
//! This module defines the proctoring configuration (TOML) that collects
//! every tunable the engine consumes: question timing, narration parameters,
//! detection thresholds, and strike limits. Thresholds that were historically
//! scattered constants live here as named, documented fields so tuning and
//! testing stay deterministic.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level proctoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProctorConfig {
    /// Question timing and narration settings.
    #[serde(default)]
    pub interview: InterviewConfig,

    /// Frame-analysis detection thresholds.
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Per-category strike limits.
    #[serde(default)]
    pub limits: StrikeLimits,

    /// Remote interview service settings.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl ProctorConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if
    /// validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a threshold is out of
    /// range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validates threshold ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when a field would make the
    /// engine degenerate (zero-length question interval, zero frame
    /// thresholds, non-positive deviation limit).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interview.question_time.is_zero() {
            return Err(ConfigError::Validation(
                "interview.question_time must be non-zero".to_string(),
            ));
        }
        let d = &self.detection;
        if d.no_face_frames == 0 || d.multi_face_frames == 0 || d.gaze_away_frames == 0 {
            return Err(ConfigError::Validation(
                "detection frame thresholds must be non-zero".to_string(),
            ));
        }
        if d.calibration_frames == 0 {
            return Err(ConfigError::Validation(
                "detection.calibration_frames must be non-zero".to_string(),
            ));
        }
        if d.smoothing_window == 0 {
            return Err(ConfigError::Validation(
                "detection.smoothing_window must be non-zero".to_string(),
            ));
        }
        if d.gaze_deviation_limit <= 0.0 {
            return Err(ConfigError::Validation(
                "detection.gaze_deviation_limit must be positive".to_string(),
            ));
        }
        let l = &self.limits;
        if l.max_fullscreen_exits == 0
            || l.max_tab_switches == 0
            || l.max_camera_failures == 0
            || l.max_integrity_warnings == 0
        {
            return Err(ConfigError::Validation(
                "strike limits must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Question timing and narration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewConfig {
    /// Time allotted to answer one question. The countdown starts only after
    /// narration finishes and restarts from the full interval on resume.
    #[serde(default = "default_question_time")]
    #[serde(with = "humantime_serde")]
    pub question_time: Duration,

    /// Narration speaking rate passed through to the host narrator.
    #[serde(default = "default_speech_rate")]
    pub speech_rate: f32,

    /// Narration pitch passed through to the host narrator.
    #[serde(default = "default_speech_pitch")]
    pub speech_pitch: f32,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            question_time: default_question_time(),
            speech_rate: default_speech_rate(),
            speech_pitch: default_speech_pitch(),
        }
    }
}

const fn default_question_time() -> Duration {
    Duration::from_secs(60)
}

const fn default_speech_rate() -> f32 {
    0.95
}

const fn default_speech_pitch() -> f32 {
    1.1
}

/// Frame-analysis detection thresholds.
///
/// Frame thresholds are proxies for elapsed wall-clock time at the expected
/// camera frame rate (15 frames ≈ 1 second at 15 fps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Consecutive frames without a face before a no-face violation fires.
    #[serde(default = "default_no_face_frames")]
    pub no_face_frames: u32,

    /// Consecutive frames with more than one face before a multi-face
    /// violation fires.
    #[serde(default = "default_multi_face_frames")]
    pub multi_face_frames: u32,

    /// Run length of out-of-tolerance gaze frames before a gaze violation
    /// fires. Unlike the face counters this run decays partially on
    /// in-tolerance frames rather than hard-resetting.
    #[serde(default = "default_gaze_away_frames")]
    pub gaze_away_frames: u32,

    /// Distance from the calibration baseline beyond which a smoothed gaze
    /// sample counts as deviated.
    #[serde(default = "default_gaze_deviation_limit")]
    pub gaze_deviation_limit: f32,

    /// Amount subtracted from the gaze run counter on each in-tolerance
    /// frame (floored at zero).
    #[serde(default = "default_gaze_decay")]
    pub gaze_decay: u32,

    /// Qualifying frames averaged into the per-candidate gaze baseline.
    /// The baseline is computed once and never recomputed within a session.
    #[serde(default = "default_calibration_frames")]
    pub calibration_frames: u32,

    /// Window size of the moving average applied to raw gaze deviation.
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,

    /// Minimum spacing between surfaced violations, shared across all
    /// categories. Emission attempts inside the window are suppressed
    /// entirely, never queued.
    #[serde(default = "default_violation_cooldown")]
    #[serde(with = "humantime_serde")]
    pub violation_cooldown: Duration,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            no_face_frames: default_no_face_frames(),
            multi_face_frames: default_multi_face_frames(),
            gaze_away_frames: default_gaze_away_frames(),
            gaze_deviation_limit: default_gaze_deviation_limit(),
            gaze_decay: default_gaze_decay(),
            calibration_frames: default_calibration_frames(),
            smoothing_window: default_smoothing_window(),
            violation_cooldown: default_violation_cooldown(),
        }
    }
}

const fn default_no_face_frames() -> u32 {
    15
}

const fn default_multi_face_frames() -> u32 {
    15
}

const fn default_gaze_away_frames() -> u32 {
    45
}

const fn default_gaze_deviation_limit() -> f32 {
    0.18
}

const fn default_gaze_decay() -> u32 {
    2
}

const fn default_calibration_frames() -> u32 {
    30
}

const fn default_smoothing_window() -> usize {
    5
}

const fn default_violation_cooldown() -> Duration {
    Duration::from_secs(10)
}

/// Per-category strike limits. Counters are monotonic; reaching any maximum
/// terminates the session unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeLimits {
    /// Fullscreen exits tolerated before termination.
    #[serde(default = "default_max_fullscreen_exits")]
    pub max_fullscreen_exits: u32,

    /// Tab/window switches tolerated before termination.
    #[serde(default = "default_max_tab_switches")]
    pub max_tab_switches: u32,

    /// Camera failures tolerated before termination.
    #[serde(default = "default_max_camera_failures")]
    pub max_camera_failures: u32,

    /// Proctoring violations tolerated before termination.
    #[serde(default = "default_max_integrity_warnings")]
    pub max_integrity_warnings: u32,
}

impl Default for StrikeLimits {
    fn default() -> Self {
        Self {
            max_fullscreen_exits: default_max_fullscreen_exits(),
            max_tab_switches: default_max_tab_switches(),
            max_camera_failures: default_max_camera_failures(),
            max_integrity_warnings: default_max_integrity_warnings(),
        }
    }
}

const fn default_max_fullscreen_exits() -> u32 {
    2
}

const fn default_max_tab_switches() -> u32 {
    3
}

const fn default_max_camera_failures() -> u32 {
    2
}

const fn default_max_integrity_warnings() -> u32 {
    3
}

/// Remote interview service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the interview service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout applied to each request.
    #[serde(default = "default_request_timeout")]
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8800".to_string()
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[source] std::io::Error),

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    /// Failed to serialize to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[source] toml::ser::Error),

    /// A field value is out of range.
    #[error("config validation failed: {0}")]
    Validation(String),
}
