//! Text extraction stage.
//!
//! Runs the OCR preprocessing chain and hands the binarized raster to the
//! injected [`TextRecognizer`]. Failures never leave this module: document
//! text is an advisory signal, so a missing or failing engine degrades the
//! output to [`ExtractedText::empty`] instead of failing the request.

use crate::preprocess;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine not available: {0}")]
    EngineUnavailable(String),
    #[error("OCR failed: {0}")]
    Failed(String),
}

/// Page layout assumption passed to the recognizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutHint {
    /// Let the engine segment the page itself.
    Auto,
    /// The raster holds one line of text.
    SingleLine,
    /// The raster holds one uniform block of text. Used for ID cards.
    SingleBlock,
}

/// OCR collaborator.
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Check once at start-up that the engine can run at all.
    fn probe(&self) -> Result<(), OcrError>;

    fn recognize(&self, image: &GrayImage, layout: LayoutHint) -> Result<String, OcrError>;
}

/// Text pulled from a document raster. Always defined, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    pub raw_text: String,
    /// False when the engine is unavailable or failed for this raster.
    pub was_extracted: bool,
}

impl ExtractedText {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_text(&self) -> bool {
        !self.raw_text.is_empty()
    }
}

/// The text extraction stage, holding the recognizer only if its start-up
/// probe succeeded.
pub struct TextExtractor {
    recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl TextExtractor {
    /// Probe `recognizer` once and remember whether it is usable.
    pub fn probe(recognizer: Arc<dyn TextRecognizer>) -> Self {
        match recognizer.probe() {
            Ok(()) => {
                tracing::info!(engine = recognizer.name(), "OCR engine available");
                Self {
                    recognizer: Some(recognizer),
                }
            }
            Err(err) => {
                tracing::warn!(
                    engine = recognizer.name(),
                    error = %err,
                    "OCR engine unavailable; document text checks will be skipped"
                );
                Self { recognizer: None }
            }
        }
    }

    /// A stage with no engine; every extraction yields empty text.
    pub fn disabled() -> Self {
        Self { recognizer: None }
    }

    pub fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }

    pub fn engine_name(&self) -> Option<&str> {
        self.recognizer.as_deref().map(|r| r.name())
    }

    /// Extract trimmed text from a document raster.
    pub fn extract(&self, raster: &DynamicImage) -> ExtractedText {
        let Some(recognizer) = self.recognizer.as_deref() else {
            tracing::debug!("OCR skipped: no engine");
            return ExtractedText::empty();
        };

        let binary = preprocess::prepare_for_ocr(raster);
        match recognizer.recognize(&binary, LayoutHint::SingleBlock) {
            Ok(text) => {
                let raw_text = text.trim().to_string();
                tracing::debug!(chars = raw_text.chars().count(), "OCR finished");
                ExtractedText {
                    raw_text,
                    was_extracted: true,
                }
            }
            Err(err) => {
                tracing::warn!(engine = recognizer.name(), error = %err, "OCR failed; continuing without document text");
                ExtractedText::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    struct ScriptedRecognizer {
        probe_ok: bool,
        reply: Result<&'static str, &'static str>,
        seen: Mutex<Vec<(LayoutHint, bool)>>,
    }

    impl ScriptedRecognizer {
        fn new(probe_ok: bool, reply: Result<&'static str, &'static str>) -> Arc<Self> {
            Arc::new(Self {
                probe_ok,
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl TextRecognizer for ScriptedRecognizer {
        fn name(&self) -> &str {
            "scripted"
        }

        fn probe(&self) -> Result<(), OcrError> {
            if self.probe_ok {
                Ok(())
            } else {
                Err(OcrError::EngineUnavailable("not installed".into()))
            }
        }

        fn recognize(&self, image: &GrayImage, layout: LayoutHint) -> Result<String, OcrError> {
            let binary = image.pixels().all(|p| p[0] == 0 || p[0] == 255);
            self.seen.lock().unwrap().push((layout, binary));
            self.reply
                .map(str::to_string)
                .map_err(|e| OcrError::Failed(e.to_string()))
        }
    }

    fn card() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(24, 12, |x, _| {
            if x % 4 < 2 {
                Rgb([15, 15, 15])
            } else {
                Rgb([240, 240, 240])
            }
        }))
    }

    #[test]
    fn test_extract_trims_and_marks_extracted() {
        let rec = ScriptedRecognizer::new(true, Ok("  REPUBLIC\nName: A \n"));
        let stage = TextExtractor::probe(rec.clone());
        assert!(stage.is_available());

        let text = stage.extract(&card());
        assert_eq!(text.raw_text, "REPUBLIC\nName: A");
        assert!(text.was_extracted);
        assert!(text.has_text());
    }

    #[test]
    fn test_extract_sends_binarized_single_block() {
        let rec = ScriptedRecognizer::new(true, Ok("x"));
        let stage = TextExtractor::probe(rec.clone());
        stage.extract(&card());

        let seen = rec.seen.lock().unwrap();
        assert_eq!(seen.as_slice(), &[(LayoutHint::SingleBlock, true)]);
    }

    #[test]
    fn test_unavailable_engine_is_never_called() {
        let rec = ScriptedRecognizer::new(false, Ok("should not be read"));
        let stage = TextExtractor::probe(rec.clone());
        assert!(!stage.is_available());

        let text = stage.extract(&card());
        assert_eq!(text, ExtractedText::empty());
        assert!(!text.was_extracted);
        assert!(rec.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_runtime_failure_is_absorbed() {
        let rec = ScriptedRecognizer::new(true, Err("engine crashed"));
        let stage = TextExtractor::probe(rec);

        let text = stage.extract(&card());
        assert_eq!(text.raw_text, "");
        assert!(!text.was_extracted);
    }

    #[test]
    fn test_blank_output_is_extracted_but_empty() {
        let rec = ScriptedRecognizer::new(true, Ok(" \n\t "));
        let stage = TextExtractor::probe(rec);

        let text = stage.extract(&card());
        assert!(text.was_extracted);
        assert!(!text.has_text());
    }

    #[test]
    fn test_disabled_stage() {
        let stage = TextExtractor::disabled();
        assert!(!stage.is_available());
        assert!(stage.engine_name().is_none());
        assert_eq!(stage.extract(&card()), ExtractedText::empty());
    }
}
