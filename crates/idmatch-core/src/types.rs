use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default face-embedding model requested from the collaborator.
pub const DEFAULT_MODEL_NAME: &str = "ArcFace";
/// Default face detector backend.
pub const DEFAULT_DETECTOR_BACKEND: &str = "scrfd";
/// Default embedding distance metric.
pub const DEFAULT_DISTANCE_METRIC: &str = "cosine";

/// How hard the face collaborator should insist on finding a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMode {
    /// A missing face in either image is a `FaceNotDetected` failure.
    Strict,
    /// A missing face still yields the collaborator's best-effort reading.
    /// Meant for callers that already ran their own cheap quality gate.
    #[default]
    Lenient,
}

impl DetectionMode {
    pub fn enforce_detection(self) -> bool {
        matches!(self, DetectionMode::Strict)
    }
}

/// Model/detector/metric selection forwarded to the face collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceSettings {
    pub model_name: String,
    pub detector_backend: String,
    pub distance_metric: String,
    /// Optional threshold override. The collaborator reports the threshold it
    /// actually applied and stays the sole authority on `verified`.
    pub strictness_threshold: Option<f64>,
}

impl Default for FaceSettings {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            detector_backend: DEFAULT_DETECTOR_BACKEND.to_string(),
            distance_metric: DEFAULT_DISTANCE_METRIC.to_string(),
            strictness_threshold: None,
        }
    }
}

/// One verification call: a document photo and a live capture.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub document_image_path: PathBuf,
    pub live_image_path: PathBuf,
    pub face: FaceSettings,
    pub detection: DetectionMode,
}

impl VerificationRequest {
    pub fn new(document_image_path: impl Into<PathBuf>, live_image_path: impl Into<PathBuf>) -> Self {
        Self {
            document_image_path: document_image_path.into(),
            live_image_path: live_image_path.into(),
            face: FaceSettings::default(),
            detection: DetectionMode::default(),
        }
    }

    pub fn with_face_settings(mut self, face: FaceSettings) -> Self {
        self.face = face;
        self
    }

    pub fn with_detection(mut self, detection: DetectionMode) -> Self {
        self.detection = detection;
        self
    }
}

/// Region of a detected face in image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacialArea {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub left_eye: Option<(f32, f32)>,
    pub right_eye: Option<(f32, f32)>,
}

/// Detected face region per image role; `None` when no face was found
/// (possible only in lenient mode).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacialAreas {
    pub document: Option<FacialArea>,
    pub live: Option<FacialArea>,
}

/// A successful reading from the face collaborator, copied verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReading {
    pub same_identity: bool,
    pub distance: f64,
    pub threshold: f64,
    pub facial_areas: FacialAreas,
}

/// Why the face path could not produce a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceFailureReason {
    FaceNotDetected,
    CollaboratorError,
}

/// Outcome of the face match stage.
#[derive(Debug, Clone, PartialEq)]
pub enum FaceMatchOutcome {
    Matched(FaceReading),
    Failed {
        reason: FaceFailureReason,
        message: String,
    },
}

impl FaceMatchOutcome {
    pub fn reading(&self) -> Option<&FaceReading> {
        match self {
            FaceMatchOutcome::Matched(reading) => Some(reading),
            FaceMatchOutcome::Failed { .. } => None,
        }
    }

    /// Caller-facing explanation of a failed face path.
    pub(crate) fn failure_text(reason: FaceFailureReason, message: &str) -> String {
        match reason {
            FaceFailureReason::FaceNotDetected => {
                format!("face could not be detected in one or both images: {message}")
            }
            FaceFailureReason::CollaboratorError => format!("face verification error: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusLabel {
    Verified,
    NotVerified,
    /// The request could not be evaluated. Never a negative identity match.
    Error,
}

impl fmt::Display for StatusLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StatusLabel::Verified => "VERIFIED",
            StatusLabel::NotVerified => "NOT_VERIFIED",
            StatusLabel::Error => "ERROR",
        })
    }
}

/// Machine-readable cause of an `ERROR` status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImageNotFound,
    ImageDecodeError,
    /// Live capture below the configured byte floor.
    ImageTooSmall,
    FaceNotDetected,
    CollaboratorError,
    /// A pipeline task panicked or was cancelled.
    InternalError,
}

impl From<FaceFailureReason> for FailureKind {
    fn from(reason: FaceFailureReason) -> Self {
        match reason {
            FaceFailureReason::FaceNotDetected => FailureKind::FaceNotDetected,
            FaceFailureReason::CollaboratorError => FailureKind::CollaboratorError,
        }
    }
}

/// Merged, caller-facing verification packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub status: StatusLabel,
    /// Advisory 0–100 score, rounded to two decimals. Absent on `ERROR`.
    pub similarity_score: Option<f64>,
    /// Raw collaborator distance, rounded to four decimals.
    pub distance: Option<f64>,
    pub threshold_used: Option<f64>,
    pub model_used: String,
    pub ocr_text_found: bool,
    pub ocr_keywords: Vec<String>,
    pub masked_text_sample: String,
    pub failure_kind: Option<FailureKind>,
    pub failure_reason: Option<String>,
}

/// Result of a direct two-image face comparison (no document checks).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub verified: bool,
    pub status: StatusLabel,
    pub distance: Option<f64>,
    pub threshold: Option<f64>,
    pub similarity_score: Option<f64>,
    pub model: String,
    pub distance_metric: String,
    pub facial_areas: Option<FacialAreas>,
    pub failure_kind: Option<FailureKind>,
    pub failure_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_mode_enforcement() {
        assert!(DetectionMode::Strict.enforce_detection());
        assert!(!DetectionMode::Lenient.enforce_detection());
        assert_eq!(DetectionMode::default(), DetectionMode::Lenient);
    }

    #[test]
    fn test_status_label_serialization() {
        let json = serde_json::to_string(&StatusLabel::NotVerified).unwrap();
        assert_eq!(json, "\"NOT_VERIFIED\"");
        assert_eq!(StatusLabel::Verified.to_string(), "VERIFIED");
    }

    #[test]
    fn test_failure_kind_wire_names() {
        let names: Vec<String> = [
            FailureKind::ImageTooSmall,
            FailureKind::InternalError,
            FailureKind::ImageDecodeError,
        ]
        .iter()
        .map(|kind| serde_json::to_string(kind).unwrap())
        .collect();
        assert_eq!(names, ["\"image_too_small\"", "\"internal_error\"", "\"image_decode_error\""]);
    }

    #[test]
    fn test_face_failure_maps_to_failure_kind() {
        assert_eq!(
            FailureKind::from(FaceFailureReason::FaceNotDetected),
            FailureKind::FaceNotDetected
        );
        assert_eq!(
            FailureKind::from(FaceFailureReason::CollaboratorError),
            FailureKind::CollaboratorError
        );
    }

    #[test]
    fn test_failed_outcome_has_no_reading() {
        let outcome = FaceMatchOutcome::Failed {
            reason: FaceFailureReason::FaceNotDetected,
            message: "no face".into(),
        };
        assert!(outcome.reading().is_none());
    }

    #[test]
    fn test_request_defaults() {
        let req = VerificationRequest::new("id.jpg", "selfie.jpg");
        assert_eq!(req.face.model_name, "ArcFace");
        assert_eq!(req.face.distance_metric, "cosine");
        assert!(req.face.strictness_threshold.is_none());
        assert_eq!(req.detection, DetectionMode::Lenient);
    }
}
