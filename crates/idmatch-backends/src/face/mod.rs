//! ONNX Runtime face verifier: SCRFD detection, landmark alignment and
//! ArcFace embeddings behind the [`FaceVerifier`] collaborator trait.

pub mod alignment;
pub mod detector;
pub mod metrics;
pub mod recognizer;

use detector::{DetectorError, FaceDetector};
use idmatch_core::loader;
use idmatch_core::{FaceQuery, FaceReading, FaceVerifier, FaceVerifyError, FacialArea, FacialAreas};
use image::RgbImage;
use metrics::{DetectorBackend, DistanceMetric};
use recognizer::{FaceRecognizer, RecognizerError};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

const SUPPORTED_MODEL: &str = "ArcFace";

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Settings from a [`FaceQuery`], parsed and checked against what this
/// backend can do.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ResolvedQuery {
    backend: DetectorBackend,
    metric: DistanceMetric,
    threshold: f64,
}

impl ResolvedQuery {
    fn from_query(query: &FaceQuery<'_>) -> Result<Self, FaceVerifyError> {
        if !query.model_name.eq_ignore_ascii_case(SUPPORTED_MODEL) {
            return Err(FaceVerifyError::Backend(format!(
                "unsupported face model '{}' (this backend provides {SUPPORTED_MODEL})",
                query.model_name
            )));
        }
        let backend: DetectorBackend = query.detector_backend.parse().map_err(FaceVerifyError::Backend)?;
        let metric: DistanceMetric = query.distance_metric.parse().map_err(FaceVerifyError::Backend)?;
        let threshold = query.threshold.unwrap_or_else(|| metric.arcface_threshold());

        Ok(Self {
            backend,
            metric,
            threshold,
        })
    }
}

/// Which image of the pair is being processed; used in messages only.
#[derive(Debug, Clone, Copy)]
enum Role {
    First,
    Second,
}

impl Role {
    fn label(self) -> &'static str {
        match self {
            Role::First => "first",
            Role::Second => "second",
        }
    }
}

struct FaceCrop {
    crop: RgbImage,
    area: Option<FacialArea>,
}

/// Loaded detector and recognizer sessions, shared by concurrent requests.
pub struct OnnxFaceVerifier {
    detector: Mutex<FaceDetector>,
    recognizer: Mutex<FaceRecognizer>,
}

impl OnnxFaceVerifier {
    /// Load both models from `model_dir`. Fails if either file is missing.
    pub fn load(model_dir: &Path, intra_threads: usize) -> Result<Self, ModelLoadError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE), intra_threads)?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE), intra_threads)?;
        Ok(Self {
            detector: Mutex::new(detector),
            recognizer: Mutex::new(recognizer),
        })
    }

    fn locate(
        &self,
        path: &Path,
        role: Role,
        settings: &ResolvedQuery,
        query: &FaceQuery<'_>,
    ) -> Result<FaceCrop, FaceVerifyError> {
        let image = read_rgb(path)?;

        if settings.backend == DetectorBackend::Skip {
            let (w, h) = image.dimensions();
            return Ok(FaceCrop {
                crop: alignment::whole_image(&image),
                area: Some(FacialArea {
                    x: 0.0,
                    y: 0.0,
                    width: w as f32,
                    height: h as f32,
                    confidence: 0.0,
                    left_eye: None,
                    right_eye: None,
                }),
            });
        }

        let detections = self
            .detector
            .lock()
            .map_err(|_| FaceVerifyError::Backend("face detector lock poisoned".into()))?
            .detect(&image)
            .map_err(|e| FaceVerifyError::Backend(format!("face detection failed: {e}")))?;

        let Some(face) = detections.into_iter().next() else {
            if query.enforce_detection {
                return Err(FaceVerifyError::NoFaceDetected(format!(
                    "no face in {} image {}",
                    role.label(),
                    path.display()
                )));
            }
            tracing::warn!(image = role.label(), "no face detected; embedding whole image");
            return Ok(FaceCrop {
                crop: alignment::whole_image(&image),
                area: None,
            });
        };

        tracing::debug!(
            image = role.label(),
            confidence = face.confidence,
            has_landmarks = face.landmarks.is_some(),
            "face detected"
        );

        let crop = match (&face.landmarks, query.align) {
            (Some(landmarks), true) => alignment::align_face(&image, landmarks),
            _ => alignment::crop_face(&image, &face),
        };

        Ok(FaceCrop {
            crop,
            area: Some(face.to_facial_area()),
        })
    }
}

/// Decode with the pipeline's loader so the format is sniffed from content,
/// not trusted from the file extension.
fn read_rgb(path: &Path) -> Result<RgbImage, FaceVerifyError> {
    loader::load(path)
        .map(|image| image.to_rgb8())
        .map_err(|e| FaceVerifyError::Backend(e.to_string()))
}

impl FaceVerifier for OnnxFaceVerifier {
    fn name(&self) -> &str {
        "onnx-arcface"
    }

    fn verify_faces(&self, query: &FaceQuery<'_>) -> Result<FaceReading, FaceVerifyError> {
        let settings = ResolvedQuery::from_query(query)?;

        let first = self.locate(query.first_image, Role::First, &settings, query)?;
        let second = self.locate(query.second_image, Role::Second, &settings, query)?;

        let (a, b) = {
            let mut recognizer = self
                .recognizer
                .lock()
                .map_err(|_| FaceVerifyError::Backend("face recognizer lock poisoned".into()))?;
            let embed_failed = |e: RecognizerError| FaceVerifyError::Backend(format!("embedding failed: {e}"));
            let a = recognizer.extract(&first.crop).map_err(embed_failed)?;
            let b = recognizer.extract(&second.crop).map_err(embed_failed)?;
            (a, b)
        };

        let distance = settings.metric.distance(&a, &b);
        let reading = FaceReading {
            same_identity: distance <= settings.threshold,
            distance,
            threshold: settings.threshold,
            facial_areas: FacialAreas {
                document: first.area,
                live: second.area,
            },
        };

        tracing::debug!(
            metric = %settings.metric,
            distance = reading.distance,
            threshold = reading.threshold,
            same_identity = reading.same_identity,
            "embeddings compared"
        );

        Ok(reading)
    }
}
