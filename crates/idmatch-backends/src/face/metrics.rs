//! Embedding distances and the ArcFace decision thresholds that go with them.

use std::fmt;
use std::str::FromStr;

/// Face embedding as emitted by the recognizer (not normalized).
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    fn norm(&self) -> f64 {
        self.values
            .iter()
            .map(|&v| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Cosine similarity in [-1, 1]; 0 when either vector is all zeros.
    pub fn similarity(&self, other: &Embedding) -> f64 {
        let dot: f64 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| a as f64 * b as f64)
            .sum();
        let denom = self.norm() * other.norm();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    pub fn euclidean_distance(&self, other: &Embedding) -> f64 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| (a as f64 - b as f64).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Unit-length copy. A zero vector stays zero.
    pub fn l2_normalized(&self) -> Embedding {
        let norm = self.norm();
        if norm > 0.0 {
            Embedding::new(self.values.iter().map(|&v| (v as f64 / norm) as f32).collect())
        } else {
            self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    EuclideanL2,
}

impl DistanceMetric {
    /// Distance between two embeddings; always `>= 0`.
    pub fn distance(self, a: &Embedding, b: &Embedding) -> f64 {
        match self {
            // Similarity can drift a hair past 1.0 in floating point.
            DistanceMetric::Cosine => (1.0 - a.similarity(b)).max(0.0),
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::EuclideanL2 => a.l2_normalized().euclidean_distance(&b.l2_normalized()),
        }
    }

    /// Same-identity cutoff for ArcFace embeddings under this metric.
    pub fn arcface_threshold(self) -> f64 {
        match self {
            DistanceMetric::Cosine => 0.68,
            DistanceMetric::Euclidean => 4.15,
            DistanceMetric::EuclideanL2 => 1.13,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(format!(
                "unsupported distance metric '{other}' (expected cosine, euclidean or euclidean_l2)"
            )),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How faces are located before embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorBackend {
    Scrfd,
    /// Treat each whole image as the face.
    Skip,
}

impl FromStr for DetectorBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scrfd" => Ok(DetectorBackend::Scrfd),
            "skip" => Ok(DetectorBackend::Skip),
            other => Err(format!(
                "unsupported detector backend '{other}' (expected scrfd or skip)"
            )),
        }
    }
}
