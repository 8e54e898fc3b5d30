use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
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
}

/// Face encoding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub values: Vec<f32>,
    /// Model that produced this encoding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. Higher = more similar.
    ///
    /// Encodings of different dimension never compare as similar.
    pub fn similarity(&self, other: &FaceEncoding) -> f32 {
        if self.values.len() != other.values.len() {
            return 0.0;
        }

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

    /// Euclidean distance between two encodings.
    pub fn euclidean_distance(&self, other: &FaceEncoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Whether the encoding was produced by a different model than `other`.
    ///
    /// Unknown versions on either side are treated as compatible.
    pub fn model_differs(&self, other: &FaceEncoding) -> bool {
        match (&self.model_version, &other.model_version) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }
}

/// A stored face encoding tied to a student.
#[derive(Debug, Clone)]
pub struct EnrolledFace {
    pub enrollment_number: String,
    pub encoding: FaceEncoding,
}

/// Result of matching a probe encoding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Cosine similarity of the best match [-1, 1].
    pub similarity: f32,
    /// Enrollment number of the matched face (if any).
    pub enrollment_number: Option<String>,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            matched: false,
            similarity: 0.0,
            enrollment_number: None,
        }
    }
}

/// Strategy for comparing a probe encoding against enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &FaceEncoding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher.
///
/// Visits every gallery entry, so the time taken does not depend on the
/// position of the match.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &FaceEncoding, gallery: &[EnrolledFace], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, face) in gallery.iter().enumerate() {
            if probe.model_differs(&face.encoding) {
                tracing::warn!(
                    enrollment = %face.enrollment_number,
                    probe = ?probe.model_version,
                    stored = ?face.encoding.model_version,
                    "encoding produced by a different model; skipping"
                );
                continue;
            }
            let sim = probe.similarity(&face.encoding);
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_sim >= threshold => MatchResult {
                matched: true,
                similarity: best_sim,
                enrollment_number: Some(gallery[idx].enrollment_number.clone()),
            },
            _ => MatchResult {
                matched: false,
                similarity: if best_sim == f32::NEG_INFINITY { 0.0 } else { best_sim },
                enrollment_number: None,
            },
        }
    }
}
