//! ArcFace face encoder via ONNX Runtime.
//!
//! Produces 512-dimensional L2-normalised encodings from aligned RGB face
//! crops using the w600k_r50 model.

use crate::alignment::{self, ALIGNED_SIZE};
use crate::types::{BoundingBox, FaceEncoding};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric, unlike SCRFD
const ARCFACE_ENCODING_DIM: usize = 512;
pub const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {0} (place w600k_r50.onnx in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; the detector must supply them for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face encoder.
pub struct FaceRecognizer {
    session: Session,
}

impl FaceRecognizer {
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Encode a detected face from an interleaved RGB frame.
    pub fn extract(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        face: &BoundingBox,
    ) -> Result<FaceEncoding, RecognizerError> {
        let landmarks = face.landmarks.as_ref().ok_or(RecognizerError::NoLandmarks)?;
        let aligned = alignment::align_face(rgb, width, height, landmarks);
        let input = preprocess(&aligned);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("encoding extraction: {e}")))?;

        if raw.len() != ARCFACE_ENCODING_DIM {
            return Err(RecognizerError::InferenceFailed(format!(
                "expected {ARCFACE_ENCODING_DIM}-dim encoding, got {}",
                raw.len()
            )));
        }

        Ok(FaceEncoding {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

/// Convert a 112×112 RGB crop into a normalized NCHW tensor.
fn preprocess(aligned: &[u8]) -> Array4<f32> {
    let size = ALIGNED_SIZE;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

    for y in 0..size {
        for x in 0..size {
            for c in 0..3 {
                let pixel = aligned.get((y * size + x) * 3 + c).copied().unwrap_or(0) as f32;
                tensor[[0, c, y, x]] = (pixel - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
    }

    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
