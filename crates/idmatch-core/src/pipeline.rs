//! Verification orchestrator.
//!
//! Per request:
//!
//! ```text
//! START → LOADING_DOCUMENT → (TEXT_EXTRACTION ∥ FACE_MATCH) → MERGING → DONE
//!                 │                                 │
//!                 └──────────────→ ABORTED ←────────┘
//! ```
//!
//! The text path and the face path share no data and run on separate
//! blocking tasks; the merge waits for both. Text extraction never aborts a
//! request. Loader and face-match failures end it with `status = ERROR`.

use crate::document::{self, DocumentStructureFinding};
use crate::face::{FaceMatchStage, FaceQuery, FaceVerifier};
use crate::loader::{self, LoadError};
use crate::ocr::{ExtractedText, TextExtractor};
use crate::score;
use crate::types::{
    ComparisonResult, DetectionMode, FaceFailureReason, FaceMatchOutcome, FaceSettings,
    FailureKind, StatusLabel, VerificationRequest, VerificationResult,
};
use image::DynamicImage;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::Instrument;

const SCORE_DECIMALS: i32 = 2;
const DISTANCE_DECIMALS: i32 = 4;

/// Pipeline stage, used to label log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    LoadingDocument,
    TextExtraction,
    FaceMatch,
    Merging,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::LoadingDocument => "loading_document",
            Stage::TextExtraction => "text_extraction",
            Stage::FaceMatch => "face_match",
            Stage::Merging => "merging",
        })
    }
}

/// Clone-safe handle to the verification pipeline.
///
/// Collaborators are injected once at construction and only read afterwards,
/// so one `Verifier` serves any number of concurrent requests.
#[derive(Clone)]
pub struct Verifier {
    text: Arc<TextExtractor>,
    faces: Arc<FaceMatchStage>,
}

impl Verifier {
    pub fn new(face_verifier: Arc<dyn FaceVerifier>, text: TextExtractor) -> Self {
        Self {
            text: Arc::new(text),
            faces: Arc::new(FaceMatchStage::new(face_verifier)),
        }
    }

    pub fn ocr_available(&self) -> bool {
        self.text.is_available()
    }

    pub fn face_backend(&self) -> &str {
        self.faces.verifier_name()
    }

    /// Run the full document + face pipeline. Never fails: every problem is
    /// reported inside the returned [`VerificationResult`].
    pub async fn verify(&self, request: VerificationRequest) -> VerificationResult {
        let span = tracing::info_span!("verify", request_id = %uuid::Uuid::new_v4());
        self.run_verify(request).instrument(span).await
    }

    async fn run_verify(&self, request: VerificationRequest) -> VerificationResult {
        let model = request.face.model_name.clone();
        tracing::info!(
            document = %request.document_image_path.display(),
            live = %request.live_image_path.display(),
            detection = ?request.detection,
            "verification started"
        );

        // Blocking threads do not inherit the request span; each task re-enters it.
        let span = tracing::Span::current();

        tracing::debug!(stage = %Stage::LoadingDocument);
        let document_path = request.document_image_path.clone();
        let load_span = span.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            let _entered = load_span.enter();
            loader::load(&document_path)
        })
        .await;
        let raster = match loaded_raster(loaded) {
            Ok(raster) => raster,
            Err((kind, reason)) => return aborted(model, kind, reason),
        };

        // The raster moves into the text task and is dropped there on every path.
        let text = Arc::clone(&self.text);
        let text_span = span.clone();
        let text_path = tokio::task::spawn_blocking(move || {
            let _entered = text_span.enter();
            tracing::debug!(stage = %Stage::TextExtraction);
            let extracted = text.extract(&raster);
            drop(raster);
            let finding = document::validate(&extracted.raw_text);
            (extracted, finding)
        });

        let faces = Arc::clone(&self.faces);
        let face_path = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            tracing::debug!(stage = %Stage::FaceMatch);
            let query = FaceQuery::new(
                &request.document_image_path,
                &request.live_image_path,
                &request.face,
                request.detection,
            );
            faces.run(&query)
        });

        let (text_joined, face_joined) = tokio::join!(text_path, face_path);

        let (extracted, finding) = text_joined.unwrap_or_else(|err| {
            tracing::warn!(stage = %Stage::TextExtraction, error = %err, "text task failed; continuing without document text");
            (ExtractedText::empty(), DocumentStructureFinding::default())
        });

        let outcome = face_joined.unwrap_or_else(|err| FaceMatchOutcome::Failed {
            reason: FaceFailureReason::CollaboratorError,
            message: format!("face match task failed: {err}"),
        });

        tracing::debug!(stage = %Stage::Merging);
        let result = merge(model, &extracted, &finding, outcome);
        tracing::info!(
            status = %result.status,
            distance = ?result.distance,
            threshold = ?result.threshold_used,
            score = ?result.similarity_score,
            keywords = result.ocr_keywords.len(),
            "verification finished"
        );
        result
    }

    /// Direct two-image comparison in strict mode, without document checks.
    pub async fn compare(
        &self,
        first_image: PathBuf,
        second_image: PathBuf,
        settings: FaceSettings,
    ) -> ComparisonResult {
        let span = tracing::info_span!("compare", request_id = %uuid::Uuid::new_v4());
        let faces = Arc::clone(&self.faces);
        let model = settings.model_name.clone();
        let metric = settings.distance_metric.clone();

        let task_span = span.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let _entered = task_span.enter();
            let query = FaceQuery::new(&first_image, &second_image, &settings, DetectionMode::Strict);
            faces.run(&query)
        })
        .await;

        let outcome = joined.unwrap_or_else(|err| FaceMatchOutcome::Failed {
            reason: FaceFailureReason::CollaboratorError,
            message: format!("face match task failed: {err}"),
        });

        let result = comparison(model, metric, outcome);
        span.in_scope(|| tracing::info!(status = %result.status, distance = ?result.distance, "comparison finished"));
        result
    }
}

/// Unwrap the loader task. A task that panicked or was cancelled is an
/// internal failure, not a property of the uploaded file.
fn loaded_raster(
    joined: Result<Result<DynamicImage, LoadError>, JoinError>,
) -> Result<DynamicImage, (FailureKind, String)> {
    match joined {
        Ok(Ok(raster)) => Ok(raster),
        Ok(Err(err)) => {
            tracing::warn!(stage = %Stage::LoadingDocument, error = %err, "verification aborted");
            Err((err.kind(), err.to_string()))
        }
        Err(err) => {
            tracing::error!(stage = %Stage::LoadingDocument, error = %err, "image loader task failed");
            Err((FailureKind::InternalError, format!("image loader task failed: {err}")))
        }
    }
}

fn aborted(model: String, kind: FailureKind, reason: String) -> VerificationResult {
    VerificationResult {
        verified: false,
        status: StatusLabel::Error,
        similarity_score: None,
        distance: None,
        threshold_used: None,
        model_used: model,
        ocr_text_found: false,
        ocr_keywords: Vec::new(),
        masked_text_sample: String::new(),
        failure_kind: Some(kind),
        failure_reason: Some(reason),
    }
}

fn merge(
    model: String,
    extracted: &ExtractedText,
    finding: &DocumentStructureFinding,
    outcome: FaceMatchOutcome,
) -> VerificationResult {
    let ocr_text_found = extracted.has_text();
    let ocr_keywords = finding.matched_keywords.clone();
    let masked_text_sample = finding.masked_sample();

    match outcome {
        FaceMatchOutcome::Matched(reading) => {
            let similarity = score::normalize(reading.distance, reading.threshold);
            VerificationResult {
                verified: reading.same_identity,
                status: if reading.same_identity {
                    StatusLabel::Verified
                } else {
                    StatusLabel::NotVerified
                },
                similarity_score: Some(score::round_to(similarity, SCORE_DECIMALS)),
                distance: Some(score::round_to(reading.distance, DISTANCE_DECIMALS)),
                threshold_used: Some(reading.threshold),
                model_used: model,
                ocr_text_found,
                ocr_keywords,
                masked_text_sample,
                failure_kind: None,
                failure_reason: None,
            }
        }
        FaceMatchOutcome::Failed { reason, message } => VerificationResult {
            verified: false,
            status: StatusLabel::Error,
            similarity_score: None,
            distance: None,
            threshold_used: None,
            model_used: model,
            ocr_text_found,
            ocr_keywords,
            masked_text_sample,
            failure_kind: Some(reason.into()),
            failure_reason: Some(FaceMatchOutcome::failure_text(reason, &message)),
        },
    }
}

fn comparison(model: String, distance_metric: String, outcome: FaceMatchOutcome) -> ComparisonResult {
    match outcome {
        FaceMatchOutcome::Matched(reading) => {
            let similarity = score::normalize(reading.distance, reading.threshold);
            ComparisonResult {
                verified: reading.same_identity,
                status: if reading.same_identity {
                    StatusLabel::Verified
                } else {
                    StatusLabel::NotVerified
                },
                distance: Some(score::round_to(reading.distance, DISTANCE_DECIMALS)),
                threshold: Some(reading.threshold),
                similarity_score: Some(score::round_to(similarity, SCORE_DECIMALS)),
                model,
                distance_metric,
                facial_areas: Some(reading.facial_areas),
                failure_kind: None,
                failure_reason: None,
            }
        }
        FaceMatchOutcome::Failed { reason, message } => ComparisonResult {
            verified: false,
            status: StatusLabel::Error,
            distance: None,
            threshold: None,
            similarity_score: None,
            model,
            distance_metric,
            facial_areas: None,
            failure_kind: Some(reason.into()),
            failure_reason: Some(FaceMatchOutcome::failure_text(reason, &message)),
        },
    }
}
