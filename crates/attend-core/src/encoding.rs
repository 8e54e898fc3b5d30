//! Blob format for persisted face encodings.
//!
//! A blob is the 4-byte magic `AFE1` followed by the bincode (fixed-width,
//! little-endian) serialization of [`FaceEncoding`].

use crate::types::FaceEncoding;
use bincode::Options;
use thiserror::Error;

const BLOB_MAGIC: &[u8; 4] = b"AFE1";
const MAX_ENCODING_DIM: usize = 4096;
const MAX_BLOB_BYTES: u64 = 64 * 1024;

#[derive(Error, Debug)]
pub enum EncodingError {
    #[error("not a face encoding blob (bad magic)")]
    BadMagic,
    #[error("face encoding dimension {0} out of range")]
    BadDimension(usize),
    #[error("cannot decode face encoding: {0}")]
    Decode(#[from] bincode::Error),
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_BLOB_BYTES)
        .reject_trailing_bytes()
}

fn check_dim(encoding: &FaceEncoding) -> Result<(), EncodingError> {
    let dim = encoding.values.len();
    if dim == 0 || dim > MAX_ENCODING_DIM {
        return Err(EncodingError::BadDimension(dim));
    }
    Ok(())
}

impl FaceEncoding {
    /// Serialize to the on-disk blob format.
    pub fn to_blob(&self) -> Result<Vec<u8>, EncodingError> {
        check_dim(self)?;
        let mut out = BLOB_MAGIC.to_vec();
        options().serialize_into(&mut out, self)?;
        Ok(out)
    }

    /// Parse a blob written by [`to_blob`](Self::to_blob).
    pub fn from_blob(blob: &[u8]) -> Result<Self, EncodingError> {
        let body = blob.strip_prefix(BLOB_MAGIC).ok_or(EncodingError::BadMagic)?;
        let encoding: FaceEncoding = options().deserialize(body)?;
        check_dim(&encoding)?;
        Ok(encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FaceEncoding {
        FaceEncoding {
            values: vec![0.25, -1.5, 3.0],
            model_version: Some("w600k_r50".into()),
        }
    }

    #[test]
    fn test_blob_layout() {
        let blob = sample().to_blob().unwrap();
        assert_eq!(&blob[..4], b"AFE1");
        // values: u64 length + 3 f32
        assert_eq!(&blob[4..12], &3u64.to_le_bytes());
        assert_eq!(&blob[12..16], &0.25f32.to_le_bytes());
        // model_version: Some tag + u64 length + "w600k_r50"
        assert_eq!(blob[24], 1);
        assert_eq!(&blob[33..], b"w600k_r50");
    }

    #[test]
    fn test_blob_preserves_values_and_tag() {
        let enc = sample();
        assert_eq!(FaceEncoding::from_blob(&enc.to_blob().unwrap()).unwrap(), enc);
    }

    #[test]
    fn test_blob_without_tag() {
        let enc = FaceEncoding::new(vec![1.0; 8]);
        let parsed = FaceEncoding::from_blob(&enc.to_blob().unwrap()).unwrap();
        assert!(parsed.model_version.is_none());
        assert_eq!(parsed.dim(), 8);
    }

    #[test]
    fn test_bad_magic() {
        // A pickled numpy array from an older database starts with 0x80.
        let err = FaceEncoding::from_blob(&[0x80, 0x04, 0x95, 0x00, 0x01]).unwrap_err();
        assert!(matches!(err, EncodingError::BadMagic));
    }

    #[test]
    fn test_garbage_after_magic() {
        let err = FaceEncoding::from_blob(b"AFE1\xff\xff\xff\xff\xff\xff\xff\xff").unwrap_err();
        assert!(matches!(err, EncodingError::Decode(_)));
    }

    #[test]
    fn test_truncated() {
        let blob = sample().to_blob().unwrap();
        let err = FaceEncoding::from_blob(&blob[..blob.len() - 2]).unwrap_err();
        assert!(matches!(err, EncodingError::Decode(_)));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut blob = sample().to_blob().unwrap();
        blob.push(0);
        assert!(matches!(FaceEncoding::from_blob(&blob), Err(EncodingError::Decode(_))));
    }

    #[test]
    fn test_empty_encoding_rejected() {
        let err = FaceEncoding::new(vec![]).to_blob().unwrap_err();
        assert!(matches!(err, EncodingError::BadDimension(0)));
    }

    #[test]
    fn test_empty_values_in_blob_rejected() {
        let mut blob = BLOB_MAGIC.to_vec();
        options().serialize_into(&mut blob, &FaceEncoding::new(vec![])).unwrap();
        assert!(matches!(FaceEncoding::from_blob(&blob), Err(EncodingError::BadDimension(0))));
    }

    #[test]
    fn test_empty_blob() {
        assert!(matches!(FaceEncoding::from_blob(&[]), Err(EncodingError::BadMagic)));
    }
}
