use anyhow::{Context, Result};
use idmatch_core::types::{DEFAULT_DETECTOR_BACKEND, DEFAULT_DISTANCE_METRIC, DEFAULT_MODEL_NAME};
use idmatch_core::{DetectionMode, FaceSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MIN_LIVE_IMAGE_BYTES: u64 = 5 * 1024;
const DEFAULT_ONNX_THREADS: usize = 2;

/// Optional settings file; every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    model_dir: Option<PathBuf>,
    model_name: Option<String>,
    detector_backend: Option<String>,
    distance_metric: Option<String>,
    strictness_threshold: Option<f64>,
    enforce_detection: Option<bool>,
    tesseract_cmd: Option<PathBuf>,
    ocr_language: Option<String>,
    min_live_image_bytes: Option<u64>,
    onnx_threads: Option<usize>,
}

/// CLI configuration: defaults, then the TOML file, then `IDMATCH_*`
/// environment variables. Command-line flags are applied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    pub model_name: String,
    pub detector_backend: String,
    pub distance_metric: String,
    /// Overrides the metric's default same-identity threshold.
    pub strictness_threshold: Option<f64>,
    /// Fail on a missing face instead of embedding the whole image.
    pub enforce_detection: bool,
    pub tesseract_cmd: PathBuf,
    pub ocr_language: String,
    /// Live captures smaller than this are rejected before verification.
    pub min_live_image_bytes: u64,
    pub onnx_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: idmatch_backends::default_model_dir(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            detector_backend: DEFAULT_DETECTOR_BACKEND.to_string(),
            distance_metric: DEFAULT_DISTANCE_METRIC.to_string(),
            strictness_threshold: None,
            enforce_detection: false,
            tesseract_cmd: PathBuf::from(idmatch_backends::tesseract::DEFAULT_TESSERACT_CMD),
            ocr_language: idmatch_backends::tesseract::DEFAULT_LANGUAGE.to_string(),
            min_live_image_bytes: DEFAULT_MIN_LIVE_IMAGE_BYTES,
            onnx_threads: DEFAULT_ONNX_THREADS,
        }
    }
}

impl Config {
    /// Load from an optional TOML file and the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    fn from_sources(file: Option<&Path>, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let parsed: FileConfig =
                toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))?;
            config.apply_file(parsed);
        }

        config.apply_env(env);
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        let FileConfig {
            model_dir,
            model_name,
            detector_backend,
            distance_metric,
            strictness_threshold,
            enforce_detection,
            tesseract_cmd,
            ocr_language,
            min_live_image_bytes,
            onnx_threads,
        } = file;

        set(&mut self.model_dir, model_dir);
        set(&mut self.model_name, model_name);
        set(&mut self.detector_backend, detector_backend);
        set(&mut self.distance_metric, distance_metric);
        if strictness_threshold.is_some() {
            self.strictness_threshold = strictness_threshold;
        }
        set(&mut self.enforce_detection, enforce_detection);
        set(&mut self.tesseract_cmd, tesseract_cmd);
        set(&mut self.ocr_language, ocr_language);
        set(&mut self.min_live_image_bytes, min_live_image_bytes);
        set(&mut self.onnx_threads, onnx_threads);
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        set(&mut self.model_dir, env("IDMATCH_MODEL_DIR").map(PathBuf::from));
        set(&mut self.model_name, env("IDMATCH_MODEL_NAME"));
        set(&mut self.detector_backend, env("IDMATCH_DETECTOR_BACKEND"));
        set(&mut self.distance_metric, env("IDMATCH_DISTANCE_METRIC"));
        if let Some(threshold) = parse_env(&env, "IDMATCH_STRICTNESS_THRESHOLD") {
            self.strictness_threshold = Some(threshold);
        }
        set(
            &mut self.enforce_detection,
            env("IDMATCH_ENFORCE_DETECTION").map(|v| v.trim() != "0"),
        );
        set(&mut self.tesseract_cmd, env("IDMATCH_TESSERACT_CMD").map(PathBuf::from));
        set(&mut self.ocr_language, env("IDMATCH_OCR_LANGUAGE"));
        set(
            &mut self.min_live_image_bytes,
            parse_env(&env, "IDMATCH_MIN_LIVE_IMAGE_BYTES"),
        );
        set(&mut self.onnx_threads, parse_env(&env, "IDMATCH_ONNX_THREADS"));
    }

    pub fn face_settings(&self) -> FaceSettings {
        FaceSettings {
            model_name: self.model_name.clone(),
            detector_backend: self.detector_backend.clone(),
            distance_metric: self.distance_metric.clone(),
            strictness_threshold: self.strictness_threshold,
        }
    }

    pub fn detection_mode(&self) -> DetectionMode {
        if self.enforce_detection {
            DetectionMode::Strict
        } else {
            DetectionMode::Lenient
        }
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Parse a numeric variable; malformed values are ignored.
fn parse_env<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(None, env_of(&[])).unwrap();
        assert_eq!(config.model_name, "ArcFace");
        assert_eq!(config.detector_backend, "scrfd");
        assert_eq!(config.distance_metric, "cosine");
        assert_eq!(config.strictness_threshold, None);
        assert!(!config.enforce_detection);
        assert_eq!(config.min_live_image_bytes, 5120);
        assert_eq!(config.onnx_threads, 2);
        assert_eq!(config.detection_mode(), DetectionMode::Lenient);
        assert!(config.model_dir.ends_with("idmatch/models"));
    }

    #[test]
    fn test_env_overrides() {
        let env = env_of(&[
            ("IDMATCH_MODEL_DIR", "/opt/models"),
            ("IDMATCH_DISTANCE_METRIC", "euclidean_l2"),
            ("IDMATCH_STRICTNESS_THRESHOLD", "0.9"),
            ("IDMATCH_ENFORCE_DETECTION", "1"),
            ("IDMATCH_MIN_LIVE_IMAGE_BYTES", "2048"),
            ("IDMATCH_ONNX_THREADS", "4"),
        ]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.distance_metric, "euclidean_l2");
        assert_eq!(config.strictness_threshold, Some(0.9));
        assert_eq!(config.detection_mode(), DetectionMode::Strict);
        assert_eq!(config.min_live_image_bytes, 2048);
        assert_eq!(config.onnx_threads, 4);

        let settings = config.face_settings();
        assert_eq!(settings.distance_metric, "euclidean_l2");
        assert_eq!(settings.strictness_threshold, Some(0.9));
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let env = env_of(&[
            ("IDMATCH_STRICTNESS_THRESHOLD", "strict"),
            ("IDMATCH_MIN_LIVE_IMAGE_BYTES", "-5"),
            ("IDMATCH_ONNX_THREADS", "lots"),
        ]);
        let config = Config::from_sources(None, env).unwrap();
        assert_eq!(config.strictness_threshold, None);
        assert_eq!(config.min_live_image_bytes, 5120);
        assert_eq!(config.onnx_threads, 2);
    }

    #[test]
    fn test_enforce_detection_zero_means_off() {
        let config = Config::from_sources(None, env_of(&[("IDMATCH_ENFORCE_DETECTION", "0")])).unwrap();
        assert!(!config.enforce_detection);
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idmatch.toml");
        std::fs::write(
            &path,
            r#"
model_dir = "/srv/models"
distance_metric = "euclidean"
strictness_threshold = 3.5
ocr_language = "deu"
"#,
        )
        .unwrap();

        let config = Config::from_sources(Some(&path), env_of(&[("IDMATCH_OCR_LANGUAGE", "fra")])).unwrap();
        assert_eq!(config.model_dir, PathBuf::from("/srv/models"));
        assert_eq!(config.distance_metric, "euclidean");
        assert_eq!(config.strictness_threshold, Some(3.5));
        assert_eq!(config.ocr_language, "fra");
        assert_eq!(config.detector_backend, "scrfd");
    }

    #[test]
    fn test_unknown_file_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idmatch.toml");
        std::fs::write(&path, "ocr_engine = \"easyocr\"\n").unwrap();
        let err = Config::from_sources(Some(&path), env_of(&[])).unwrap_err();
        assert!(format!("{err:#}").contains("parsing config file"));
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Config::from_sources(Some(Path::new("/nonexistent/idmatch.toml")), env_of(&[]))
            .unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }
}
