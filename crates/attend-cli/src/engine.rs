use attend_core::{
    BoundingBox, CosineMatcher, DetectorError, EnrolledFace, FaceDetector, FaceEncoding, FaceRecognizer,
    MatchResult, Matcher, RecognizerError,
};
use attend_hw::{Camera, Frame};
use std::future::Future;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] attend_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("no face detected in any captured frame")]
    NoFaceDetected,
    #[error("no camera was opened for this command")]
    NoCamera,
    #[error("cannot start engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// A face encoding and the detector confidence of the face it came from.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub encoding: FaceEncoding,
    pub quality: f32,
}

/// Result of a verification operation.
#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub result: MatchResult,
    pub best_quality: f32,
}

/// Anything that can produce and compare face encodings.
///
/// Implemented by [`EngineHandle`]; workflows are generic over it so they run
/// without a camera in tests.
pub trait FaceProbe {
    /// Capture `frames_count` frames and encode the most confident face.
    fn capture(&self, frames_count: usize) -> impl Future<Output = Result<CaptureResult, EngineError>> + Send;

    /// Encode the most confident face in a still photo.
    fn encode_photo(&self, frame: Frame) -> impl Future<Output = Result<CaptureResult, EngineError>> + Send;

    /// Capture frames and compare each face found against `gallery`.
    fn verify(
        &self,
        gallery: Vec<EnrolledFace>,
        threshold: f32,
        frames_count: usize,
    ) -> impl Future<Output = Result<VerifyResult, EngineError>> + Send;
}

enum EngineRequest {
    Capture {
        frames_count: usize,
        reply: oneshot::Sender<Result<CaptureResult, EngineError>>,
    },
    EncodePhoto {
        frame: Frame,
        reply: oneshot::Sender<Result<CaptureResult, EngineError>>,
    },
    Verify {
        gallery: Vec<EnrolledFace>,
        threshold: f32,
        frames_count: usize,
        reply: oneshot::Sender<Result<VerifyResult, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

impl FaceProbe for EngineHandle {
    async fn capture(&self, frames_count: usize) -> Result<CaptureResult, EngineError> {
        self.request(|reply| EngineRequest::Capture { frames_count, reply })
            .await
    }

    async fn encode_photo(&self, frame: Frame) -> Result<CaptureResult, EngineError> {
        self.request(|reply| EngineRequest::EncodePhoto { frame, reply })
            .await
    }

    async fn verify(
        &self,
        gallery: Vec<EnrolledFace>,
        threshold: f32,
        frames_count: usize,
    ) -> Result<VerifyResult, EngineError> {
        self.request(|reply| EngineRequest::Verify {
            gallery,
            threshold,
            frames_count,
            reply,
        })
        .await
    }
}

/// What the engine thread needs at startup.
pub struct EngineOptions<'a> {
    /// Camera to open, or `None` for photo-only commands.
    pub camera_device: Option<&'a str>,
    pub detector_path: &'a str,
    pub recognizer_path: &'a str,
    pub warmup_frames: usize,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Opens the camera (when asked to), loads both ONNX models and discards
/// warmup frames before entering the request loop. Fails fast if any
/// resource is unavailable.
pub fn spawn_engine(opts: EngineOptions<'_>) -> Result<EngineHandle, EngineError> {
    let camera = match opts.camera_device {
        Some(device) => {
            let camera = Camera::open(device)?;
            tracing::info!(
                device,
                width = camera.width,
                height = camera.height,
                fourcc = ?camera.fourcc,
                "camera opened"
            );
            Some(camera)
        }
        None => None,
    };

    let mut detector = FaceDetector::load(opts.detector_path)?;
    tracing::info!(path = opts.detector_path, "SCRFD detector loaded");

    let mut recognizer = FaceRecognizer::load(opts.recognizer_path)?;
    tracing::info!(path = opts.recognizer_path, "ArcFace recognizer loaded");

    if let Some(camera) = &camera {
        if opts.warmup_frames > 0 {
            tracing::debug!(count = opts.warmup_frames, "discarding warmup frames");
            for _ in 0..opts.warmup_frames {
                let _ = camera.capture_frame();
            }
        }
    }

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("attend-engine".into())
        .spawn(move || {
            tracing::debug!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Capture { frames_count, reply } => {
                        let result = capture_frames(camera.as_ref(), frames_count)
                            .and_then(|frames| best_encoding(&mut detector, &mut recognizer, &frames));
                        let _ = reply.send(result);
                    }
                    EngineRequest::EncodePhoto { frame, reply } => {
                        let result = best_encoding(&mut detector, &mut recognizer, std::slice::from_ref(&frame));
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify {
                        gallery,
                        threshold,
                        frames_count,
                        reply,
                    } => {
                        let result = capture_frames(camera.as_ref(), frames_count).and_then(|frames| {
                            run_verify(&mut detector, &mut recognizer, &frames, &gallery, threshold)
                        });
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::debug!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn capture_frames(camera: Option<&Camera>, frames_count: usize) -> Result<Vec<Frame>, EngineError> {
    let camera = camera.ok_or(EngineError::NoCamera)?;
    let (frames, dark_skipped) = camera.capture_frames(frames_count)?;
    tracing::debug!(captured = frames.len(), dark_skipped, "captured frames");
    Ok(frames)
}

/// Pick the most confident face across `frames` and encode it.
fn best_encoding(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    frames: &[Frame],
) -> Result<CaptureResult, EngineError> {
    let mut best: Option<(usize, BoundingBox)> = None;

    for (i, frame) in frames.iter().enumerate() {
        let faces = detector.detect(&frame.data, frame.width, frame.height)?;
        if let Some(face) = faces.into_iter().next() {
            if best.as_ref().map_or(true, |(_, b)| face.confidence > b.confidence) {
                best = Some((i, face));
            }
        }
    }

    let (idx, face) = best.ok_or(EngineError::NoFaceDetected)?;
    tracing::info!(confidence = face.confidence, frame = idx, "best face selected");

    let frame = &frames[idx];
    let encoding = recognizer.extract(&frame.data, frame.width, frame.height, &face)?;
    Ok(CaptureResult {
        encoding,
        quality: face.confidence,
    })
}

/// Detect, encode and compare every frame; keep the best match.
fn run_verify(
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    frames: &[Frame],
    gallery: &[EnrolledFace],
    threshold: f32,
) -> Result<VerifyResult, EngineError> {
    let matcher = CosineMatcher;
    let mut best_result: Option<MatchResult> = None;
    let mut best_quality = 0.0f32;

    for frame in frames {
        let faces = detector.detect(&frame.data, frame.width, frame.height)?;
        let Some(face) = faces.first() else {
            continue;
        };

        let encoding = recognizer.extract(&frame.data, frame.width, frame.height, face)?;
        let result = matcher.compare(&encoding, gallery, threshold);

        if best_result.as_ref().map_or(true, |prev| result.similarity > prev.similarity) {
            best_quality = face.confidence;
            best_result = Some(result);
        }
        // Stop at the first match.
        if best_result.as_ref().is_some_and(|r| r.matched) {
            break;
        }
    }

    let result = best_result.ok_or(EngineError::NoFaceDetected)?;
    tracing::info!(
        matched = result.matched,
        similarity = result.similarity,
        quality = best_quality,
        "verify complete"
    );
    Ok(VerifyResult { result, best_quality })
}
