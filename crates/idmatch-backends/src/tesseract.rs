//! Tesseract OCR engine driven as a subprocess.
//!
//! The binarized raster is PNG-encoded onto the child's stdin and the text is
//! read back from stdout (`tesseract stdin stdout ...`), so nothing touches
//! the filesystem.

use idmatch_core::{LayoutHint, OcrError, TextRecognizer};
use image::{GrayImage, ImageFormat};
use std::io::{Cursor, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

pub const DEFAULT_TESSERACT_CMD: &str = "tesseract";
pub const DEFAULT_LANGUAGE: &str = "eng";

/// LSTM engine only.
const OCR_ENGINE_MODE: &str = "3";

pub struct TesseractEngine {
    command: PathBuf,
    language: String,
}

impl TesseractEngine {
    pub fn new(command: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }

    fn spawn_error(&self, err: std::io::Error) -> OcrError {
        if err.kind() == ErrorKind::NotFound {
            OcrError::EngineUnavailable(format!("{} not found on PATH", self.command.display()))
        } else {
            OcrError::Failed(format!("cannot run {}: {err}", self.command.display()))
        }
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TESSERACT_CMD, DEFAULT_LANGUAGE)
    }
}

/// Tesseract page segmentation mode for a layout hint.
fn page_segmentation_mode(layout: LayoutHint) -> &'static str {
    match layout {
        LayoutHint::Auto => "3",
        LayoutHint::SingleLine => "7",
        LayoutHint::SingleBlock => "6",
    }
}

impl TextRecognizer for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn probe(&self) -> Result<(), OcrError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(OcrError::EngineUnavailable(format!(
                "{} --version exited with {}",
                self.command.display(),
                output.status
            )));
        }

        // Older releases print the banner on stderr.
        let banner = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        let version = String::from_utf8_lossy(banner);
        tracing::debug!(version = version.lines().next().unwrap_or(""), "tesseract probed");
        Ok(())
    }

    fn recognize(&self, image: &GrayImage, layout: LayoutHint) -> Result<String, OcrError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| OcrError::Failed(format!("PNG encoding failed: {e}")))?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l"])
            .arg(&self.language)
            .args(["--oem", OCR_ENGINE_MODE, "--psm", page_segmentation_mode(layout)])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OcrError::Failed("tesseract stdin unavailable".into()))?;

        // Feed stdin from a second thread so a full stdout pipe cannot deadlock us.
        let output = std::thread::scope(|scope| {
            let writer = scope.spawn(move || stdin.write_all(&png));
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });
        let output = match output {
            (Ok(output), _) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(OcrError::Failed(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )));
            }
            (Ok(output), Ok(())) => output,
            (Ok(_), Err(e)) => return Err(OcrError::Failed(format!("writing raster to tesseract: {e}"))),
            (Err(e), _) => return Err(OcrError::Failed(format!("waiting for tesseract: {e}"))),
        };

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(chars = text.chars().count(), "tesseract finished");
        Ok(text)
    }
}
