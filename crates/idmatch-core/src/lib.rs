//! idmatch-core — ID document + live capture verification pipeline.
//!
//! Chains image loading, OCR-based document plausibility checks and a face
//! match into one verification decision. Face verification and character
//! recognition are delegated to injected collaborators ([`FaceVerifier`],
//! [`TextRecognizer`]); this crate only sequences them, interprets their
//! readings and decides.

pub mod document;
pub mod face;
pub mod loader;
pub mod ocr;
pub mod pipeline;
pub mod preprocess;
pub mod score;
pub mod types;

pub use document::DocumentStructureFinding;
pub use face::{FaceMatchStage, FaceQuery, FaceVerifier, FaceVerifyError};
pub use loader::LoadError;
pub use ocr::{ExtractedText, LayoutHint, OcrError, TextExtractor, TextRecognizer};
pub use pipeline::Verifier;
pub use types::{
    ComparisonResult, DetectionMode, FaceFailureReason, FaceMatchOutcome, FaceReading,
    FaceSettings, FacialArea, FacialAreas, FailureKind, StatusLabel, VerificationRequest,
    VerificationResult,
};
