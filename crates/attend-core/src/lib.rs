//! attend-core: Face detection, encoding and matching for hostel attendance.
//!
//! SCRFD finds faces, ArcFace turns an aligned crop into an encoding, and
//! [`CosineMatcher`] compares encodings. Encodings persist as blobs through
//! [`FaceEncoding::to_blob`].

pub mod alignment;
pub mod detector;
pub mod encoding;
pub mod recognizer;
pub mod types;

use std::path::PathBuf;

pub use detector::{DetectorError, FaceDetector};
pub use encoding::EncodingError;
pub use recognizer::{FaceRecognizer, RecognizerError};
pub use types::{BoundingBox, CosineMatcher, EnrolledFace, FaceEncoding, MatchResult, Matcher};

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default location of the ONNX models: `$XDG_DATA_HOME/attend/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attend")
        .join("models")
}
