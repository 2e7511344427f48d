//! Face match stage: asks the face collaborator whether two images show the
//! same person and turns its answer into a [`FaceMatchOutcome`].

use crate::types::{FaceFailureReason, FaceMatchOutcome, FaceReading, FaceSettings, DetectionMode};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceVerifyError {
    /// The collaborator's own "no face" signal.
    #[error("no face detected: {0}")]
    NoFaceDetected(String),
    #[error("{0}")]
    Backend(String),
}

/// Everything the face collaborator needs for one comparison.
#[derive(Debug, Clone, Copy)]
pub struct FaceQuery<'a> {
    pub first_image: &'a Path,
    pub second_image: &'a Path,
    pub model_name: &'a str,
    pub detector_backend: &'a str,
    pub distance_metric: &'a str,
    pub enforce_detection: bool,
    pub align: bool,
    pub threshold: Option<f64>,
}

impl<'a> FaceQuery<'a> {
    /// Build an aligned query from settings and a detection mode.
    pub fn new(
        first_image: &'a Path,
        second_image: &'a Path,
        settings: &'a FaceSettings,
        mode: DetectionMode,
    ) -> Self {
        Self {
            first_image,
            second_image,
            model_name: &settings.model_name,
            detector_backend: &settings.detector_backend,
            distance_metric: &settings.distance_metric,
            enforce_detection: mode.enforce_detection(),
            align: true,
            threshold: settings.strictness_threshold,
        }
    }
}

/// Face-verification collaborator: detection, alignment, embedding and
/// distance all happen behind this trait.
pub trait FaceVerifier: Send + Sync {
    fn name(&self) -> &str;

    fn verify_faces(&self, query: &FaceQuery<'_>) -> Result<FaceReading, FaceVerifyError>;
}

/// Thin adapter from the collaborator's `Result` to the tagged outcome.
pub struct FaceMatchStage {
    verifier: Arc<dyn FaceVerifier>,
}

impl FaceMatchStage {
    pub fn new(verifier: Arc<dyn FaceVerifier>) -> Self {
        Self { verifier }
    }

    pub fn verifier_name(&self) -> &str {
        self.verifier.name()
    }

    pub fn run(&self, query: &FaceQuery<'_>) -> FaceMatchOutcome {
        tracing::debug!(
            backend = self.verifier.name(),
            model = query.model_name,
            detector = query.detector_backend,
            metric = query.distance_metric,
            enforce_detection = query.enforce_detection,
            "face match started"
        );

        match self.verifier.verify_faces(query) {
            Ok(reading) => match check_reading(&reading) {
                Ok(()) => FaceMatchOutcome::Matched(reading),
                Err(message) => FaceMatchOutcome::Failed {
                    reason: FaceFailureReason::CollaboratorError,
                    message,
                },
            },
            Err(FaceVerifyError::NoFaceDetected(message)) => {
                tracing::info!(reason = %message, "face not detected");
                FaceMatchOutcome::Failed {
                    reason: FaceFailureReason::FaceNotDetected,
                    message,
                }
            }
            Err(FaceVerifyError::Backend(message)) => {
                tracing::warn!(error = %message, "face collaborator failed");
                FaceMatchOutcome::Failed {
                    reason: FaceFailureReason::CollaboratorError,
                    message,
                }
            }
        }
    }
}

/// Reject readings that break the collaborator contract
/// (`distance >= 0`, `threshold > 0`, both finite).
fn check_reading(reading: &FaceReading) -> Result<(), String> {
    if !reading.distance.is_finite() || reading.distance < 0.0 {
        return Err(format!("collaborator returned invalid distance {}", reading.distance));
    }
    if !reading.threshold.is_finite() || reading.threshold <= 0.0 {
        return Err(format!("collaborator returned invalid threshold {}", reading.threshold));
    }
    Ok(())
}
