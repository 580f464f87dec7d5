//! Shared value types: detected faces, embeddings and distance metrics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A detected face in image coordinates, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection-over-Union with another box, 0.0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;

        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Zero vectors compare as 0.0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Copy of this embedding scaled to unit length (unchanged if all zeros).
    pub fn l2_normalized(&self) -> Embedding {
        let norm = self.values.iter().map(|v| v * v).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            self.values.iter().map(|v| v / norm).collect()
        } else {
            self.values.clone()
        };
        Embedding {
            values,
            model_version: self.model_version.clone(),
        }
    }
}

/// How two embeddings are turned into a distance. Lower is more similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in [0, 2].
    #[default]
    Cosine,
    Euclidean,
    /// Euclidean distance between the L2-normalized embeddings, in [0, 2].
    EuclideanL2,
}

impl DistanceMetric {
    pub fn distance(self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - a.similarity(b),
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::EuclideanL2 => a.l2_normalized().euclidean_distance(&b.l2_normalized()),
        }
    }

    /// Decision threshold tuned for ArcFace embeddings with this metric.
    pub fn default_threshold(self) -> f32 {
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

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" | "euclidean-l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(format!(
                "unknown distance metric '{other}' (expected cosine, euclidean or euclidean_l2)"
            )),
        }
    }
}

/// Outcome of comparing a probe image with one reference image.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    /// Whether both images depict the same identity (`distance <= threshold`).
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
    pub metric: DistanceMetric,
}

impl Verification {
    /// Build a verification result, deciding `verified` from the threshold.
    pub fn decide(distance: f32, threshold: f32, metric: DistanceMetric) -> Self {
        Self {
            verified: distance <= threshold,
            distance,
            threshold,
            metric,
        }
    }
}
