use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idmatch_backends::{OnnxFaceVerifier, TesseractEngine};
use idmatch_core::{
    document, loader, DetectionMode, FailureKind, StatusLabel, TextExtractor, VerificationRequest, Verifier,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "idmatch", about = "ID document and selfie verification", version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check an ID document image against a live selfie
    Verify {
        /// Photo of the identity document
        #[arg(long)]
        document: PathBuf,
        /// Live capture of the person
        #[arg(long)]
        selfie: PathBuf,
        /// Fail when a face cannot be detected instead of guessing
        #[arg(long)]
        strict: bool,
        /// Override the metric's same-identity distance threshold
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Compare the faces in two images (strict detection, no document checks)
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Run OCR and document checks on one image; prints masked output only
    Ocr { image: PathBuf },
    /// Show configuration, OCR availability and model files
    Status,
}

/// Printed instead of a result when the live image fails the size gate.
#[derive(Serialize)]
struct Rejection {
    verified: bool,
    status: StatusLabel,
    failure_kind: FailureKind,
    failure_reason: String,
}

#[derive(Serialize)]
struct OcrReport {
    engine: Option<String>,
    ocr_text_found: bool,
    has_plausible_structure: bool,
    matched_keywords: Vec<String>,
    masked_text_sample: String,
}

#[derive(Serialize)]
struct ModelFile {
    file: &'static str,
    present: bool,
}

#[derive(Serialize)]
struct StatusReport<'a> {
    config: &'a Config,
    ocr_engine_available: bool,
    model_files: Vec<ModelFile>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // stdout carries the JSON result.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Verify {
            document,
            selfie,
            strict,
            threshold,
        } => {
            if let Some(threshold) = threshold {
                config.strictness_threshold = Some(threshold);
            }
            if let Err(reason) = check_live_image(&selfie, config.min_live_image_bytes) {
                return reject(reason);
            }

            let verifier = build_verifier(&config)?;
            let detection = if strict {
                DetectionMode::Strict
            } else {
                config.detection_mode()
            };
            let request = VerificationRequest::new(document, selfie)
                .with_face_settings(config.face_settings())
                .with_detection(detection);

            let result = verifier.verify(request).await;
            print_json(&result)?;
            Ok(exit_code(result.status))
        }
        Commands::Compare {
            first,
            second,
            threshold,
        } => {
            if let Some(threshold) = threshold {
                config.strictness_threshold = Some(threshold);
            }
            if let Err(reason) = check_live_image(&second, config.min_live_image_bytes) {
                return reject(reason);
            }

            let verifier = build_verifier(&config)?;
            let result = verifier.compare(first, second, config.face_settings()).await;
            print_json(&result)?;
            Ok(exit_code(result.status))
        }
        Commands::Ocr { image } => {
            let text = probe_ocr(&config);
            let engine = text.engine_name().map(str::to_string);
            let (extracted, finding) = tokio::task::spawn_blocking(move || -> Result<_> {
                let raster = loader::load(&image)?;
                let extracted = text.extract(&raster);
                let finding = document::validate(&extracted.raw_text);
                Ok((extracted, finding))
            })
            .await
            .context("OCR task failed")??;

            print_json(&OcrReport {
                engine,
                ocr_text_found: extracted.has_text(),
                has_plausible_structure: finding.has_plausible_structure,
                masked_text_sample: finding.masked_sample(),
                matched_keywords: finding.matched_keywords,
            })?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status => {
            let text = probe_ocr(&config);
            let model_files = idmatch_backends::model_files(&config.model_dir)
                .into_iter()
                .map(|(file, present)| ModelFile { file, present })
                .collect();
            print_json(&StatusReport {
                config: &config,
                ocr_engine_available: text.is_available(),
                model_files,
            })?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn probe_ocr(config: &Config) -> TextExtractor {
    TextExtractor::probe(Arc::new(TesseractEngine::new(
        &config.tesseract_cmd,
        &config.ocr_language,
    )))
}

/// Load the face models (fatal if missing) and probe the OCR engine.
fn build_verifier(config: &Config) -> Result<Verifier> {
    let faces = OnnxFaceVerifier::load(&config.model_dir, config.onnx_threads)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    tracing::info!(model_dir = %config.model_dir.display(), "face models loaded");

    Ok(Verifier::new(Arc::new(faces), probe_ocr(config)))
}

/// Reject live captures below `min_bytes`. Missing files pass through so
/// the pipeline can report them.
fn check_live_image(path: &Path, min_bytes: u64) -> Result<(), String> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() < min_bytes => Err(format!(
            "live image {} is too small ({} bytes, minimum {min_bytes}); capture a clearer photo",
            path.display(),
            meta.len()
        )),
        _ => Ok(()),
    }
}

impl Rejection {
    fn too_small(reason: String) -> Self {
        Self {
            verified: false,
            status: StatusLabel::Error,
            failure_kind: FailureKind::ImageTooSmall,
            failure_reason: reason,
        }
    }
}

fn reject(reason: String) -> Result<ExitCode> {
    tracing::warn!(reason = %reason, "live image rejected");
    let rejection = Rejection::too_small(reason);
    print_json(&rejection)?;
    Ok(exit_code(rejection.status))
}

fn exit_status(status: StatusLabel) -> u8 {
    match status {
        StatusLabel::Verified => 0,
        StatusLabel::NotVerified => 1,
        StatusLabel::Error => 2,
    }
}

fn exit_code(status: StatusLabel) -> ExitCode {
    ExitCode::from(exit_status(status))
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
