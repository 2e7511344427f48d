//! idmatch-backends — concrete collaborators for the verification pipeline.
//!
//! [`OnnxFaceVerifier`] runs SCRFD detection and ArcFace embeddings on CPU via
//! ONNX Runtime. [`TesseractEngine`] drives the `tesseract` executable.

pub mod face;
pub mod tesseract;

pub use face::metrics::{DetectorBackend, DistanceMetric, Embedding};
pub use face::{ModelLoadError, OnnxFaceVerifier, ARCFACE_MODEL_FILE, SCRFD_MODEL_FILE};
pub use tesseract::TesseractEngine;

use std::path::PathBuf;

/// `$XDG_DATA_HOME/idmatch/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("idmatch")
        .join("models")
}

/// Model files [`OnnxFaceVerifier::load`] expects, paired with whether each
/// exists under `model_dir`.
pub fn model_files(model_dir: &std::path::Path) -> [(&'static str, bool); 2] {
    [SCRFD_MODEL_FILE, ARCFACE_MODEL_FILE].map(|name| (name, model_dir.join(name).is_file()))
}
