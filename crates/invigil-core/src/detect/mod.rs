//! Violation detection over the camera frame-analysis stream.
//!
//! This module converts raw per-frame signals (face count plus optional
//! landmark geometry) into debounced violation events. Three categories are
//! tracked, mutually exclusive per frame and evaluated in priority order
//! no-face > multi-face > gaze:
//!
//! - **No face / multiple faces**: strict consecutive-run counters. A
//!   qualifying frame increments, any non-qualifying frame hard-resets to
//!   zero. First reach of the frame threshold emits one violation and resets.
//! - **Gaze deviation**: requires calibration first. The raw metric is the
//!   offset between the nose landmark and the inter-eye center, both axes;
//!   the first `calibration_frames` single-face frames are averaged into a
//!   per-candidate baseline that is never recomputed. Afterwards a moving
//!   average of the raw metric is compared against the baseline;
//!   out-of-tolerance frames increment the run counter and in-tolerance
//!   frames decay it partially (fixed decrement, floor zero) to tolerate
//!   brief natural glances.
//!
//! All categories share one cooldown timestamp: an emission attempt inside
//! the cooldown window is suppressed entirely (the run counter still resets,
//! nothing is queued), bounding the candidate-visible interruption rate no
//! matter how many categories are triggering at once.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DetectionConfig;

/// Face landmark positions in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    /// Nose tip position.
    pub nose: (f32, f32),
    /// Left eye center.
    pub left_eye: (f32, f32),
    /// Right eye center.
    pub right_eye: (f32, f32),
}

impl FaceLandmarks {
    /// Offset of the nose from the inter-eye center, both axes.
    #[must_use]
    pub fn gaze_offset(&self) -> (f32, f32) {
        let eye_center = (
            (self.left_eye.0 + self.right_eye.0) / 2.0,
            (self.left_eye.1 + self.right_eye.1) / 2.0,
        );
        (self.nose.0 - eye_center.0, self.nose.1 - eye_center.1)
    }
}

/// One frame's analysis result from the camera pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Wall-clock timestamp of the frame in milliseconds.
    pub timestamp_ms: u64,
    /// Number of faces detected in the frame.
    pub face_count: u32,
    /// Landmark geometry, present only when exactly one face was detected.
    pub landmarks: Option<FaceLandmarks>,
}

/// Category of a detected violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// No face visible for the configured run length.
    NoFace,
    /// More than one face visible for the configured run length.
    MultiFace,
    /// Gaze held away from the calibrated baseline for the configured run
    /// length.
    GazeAway,
}

impl ViolationKind {
    /// Returns a short code for logging and trace output.
    #[must_use]
    pub const fn as_code(&self) -> &'static str {
        match self {
            Self::NoFace => "NO_FACE",
            Self::MultiFace => "MULTI_FACE",
            Self::GazeAway => "GAZE_AWAY",
        }
    }

    /// Severity surfaced to the candidate alongside the warning.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::NoFace | Self::MultiFace => Severity::Severe,
            Self::GazeAway => Severity::Warning,
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoFace => write!(f, "no face visible"),
            Self::MultiFace => write!(f, "multiple faces visible"),
            Self::GazeAway => write!(f, "gaze away from screen"),
        }
    }
}

/// Violation severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Candidate-visible warning.
    Warning,
    /// Strong integrity signal.
    Severe,
}

/// A debounced violation event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation category.
    pub kind: ViolationKind,
    /// Severity of the event.
    pub severity: Severity,
    /// Frame timestamp at which the run length reached its threshold.
    pub timestamp_ms: u64,
}

/// Per-candidate neutral gaze reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeBaseline {
    /// Mean nose-to-eye-center offset over the calibration frames.
    pub offset: (f32, f32),
}

/// Debouncing state scoped to one active camera session.
#[derive(Debug)]
pub struct ViolationTracker {
    config: DetectionConfig,
    no_face_frames: u32,
    multi_face_frames: u32,
    gaze_away_frames: u32,
    baseline: Option<GazeBaseline>,
    calibration_sum: (f32, f32),
    calibration_count: u32,
    smoothing: VecDeque<(f32, f32)>,
    last_violation_ms: Option<u64>,
}

impl ViolationTracker {
    /// Creates a tracker for one camera session.
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            no_face_frames: 0,
            multi_face_frames: 0,
            gaze_away_frames: 0,
            baseline: None,
            calibration_sum: (0.0, 0.0),
            calibration_count: 0,
            smoothing: VecDeque::new(),
            last_violation_ms: None,
        }
    }

    /// Returns the calibration baseline, once computed.
    #[must_use]
    pub const fn baseline(&self) -> Option<GazeBaseline> {
        self.baseline
    }

    /// Returns whether gaze calibration has completed.
    #[must_use]
    pub const fn is_calibrated(&self) -> bool {
        self.baseline.is_some()
    }

    /// Processes one frame and returns a violation if a run length crossed
    /// its threshold outside the cooldown window.
    ///
    /// Must be called synchronously at frame rate; only the most recent
    /// frame's judgement matters, so callers drop frames rather than queue
    /// them when behind.
    pub fn observe(&mut self, frame: &FrameObservation) -> Option<Violation> {
        match frame.face_count {
            0 => {
                self.multi_face_frames = 0;
                self.no_face_frames += 1;
                if self.no_face_frames >= self.config.no_face_frames {
                    self.no_face_frames = 0;
                    return self.emit(ViolationKind::NoFace, frame.timestamp_ms);
                }
                None
            },
            1 => {
                self.no_face_frames = 0;
                self.multi_face_frames = 0;
                self.observe_gaze(frame)
            },
            _ => {
                // Multiple faces short-circuit gaze evaluation entirely.
                self.no_face_frames = 0;
                self.multi_face_frames += 1;
                if self.multi_face_frames >= self.config.multi_face_frames {
                    self.multi_face_frames = 0;
                    return self.emit(ViolationKind::MultiFace, frame.timestamp_ms);
                }
                None
            },
        }
    }

    fn observe_gaze(&mut self, frame: &FrameObservation) -> Option<Violation> {
        let offset = frame.landmarks?.gaze_offset();

        let Some(baseline) = self.baseline else {
            self.calibrate(offset);
            return None;
        };

        self.smoothing.push_back(offset);
        if self.smoothing.len() > self.config.smoothing_window {
            self.smoothing.pop_front();
        }
        let n = self.smoothing.len() as f32;
        let smoothed = self
            .smoothing
            .iter()
            .fold((0.0, 0.0), |acc, o| (acc.0 + o.0, acc.1 + o.1));
        let smoothed = (smoothed.0 / n, smoothed.1 / n);

        let dx = smoothed.0 - baseline.offset.0;
        let dy = smoothed.1 - baseline.offset.1;
        let distance = (dx * dx + dy * dy).sqrt();

        if distance > self.config.gaze_deviation_limit {
            self.gaze_away_frames += 1;
            if self.gaze_away_frames >= self.config.gaze_away_frames {
                self.gaze_away_frames = 0;
                return self.emit(ViolationKind::GazeAway, frame.timestamp_ms);
            }
        } else {
            // Partial decay rather than hard reset, so brief glances back at
            // the screen do not erase a sustained deviation.
            self.gaze_away_frames = self.gaze_away_frames.saturating_sub(self.config.gaze_decay);
        }
        None
    }

    fn calibrate(&mut self, offset: (f32, f32)) {
        self.calibration_sum.0 += offset.0;
        self.calibration_sum.1 += offset.1;
        self.calibration_count += 1;
        if self.calibration_count >= self.config.calibration_frames {
            let n = self.calibration_count as f32;
            self.baseline = Some(GazeBaseline {
                offset: (self.calibration_sum.0 / n, self.calibration_sum.1 / n),
            });
            debug!(
                frames = self.calibration_count,
                "gaze calibration baseline computed"
            );
        }
    }

    fn emit(&mut self, kind: ViolationKind, timestamp_ms: u64) -> Option<Violation> {
        let cooldown_ms = self.config.violation_cooldown.as_millis() as u64;
        if let Some(last) = self.last_violation_ms {
            if timestamp_ms.saturating_sub(last) < cooldown_ms {
                debug!(code = kind.as_code(), "violation suppressed by cooldown");
                return None;
            }
        }
        self.last_violation_ms = Some(timestamp_ms);
        Some(Violation {
            kind,
            severity: kind.severity(),
            timestamp_ms,
        })
    }
}
