//! V4L2 webcam capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError, DARK_FRAME_THRESHOLD};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 640;
const REQUESTED_HEIGHT: u32 = 480;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    StreamingNotSupported,
    #[error("frame conversion failed: {0}")]
    Frame(#[from] FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed, 2 bytes/pixel.
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpg,
    /// Packed 24-bit RGB.
    Rgb3,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpg),
            b"RGB3" => Some(Self::Rgb3),
            _ => None,
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0").
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to query capabilities: {e}")))?;

        tracing::info!(device = device_path, driver = %caps.driver, card = %caps.card, "opened camera");

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for YUYV; many webcams answer with MJPG at this size instead.
        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to get format: {e}")))?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device
            .set_format(&fmt)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("failed to set format: {e}")))?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG or RGB3)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    fn stream(&self) -> Result<MmapStream<'_>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))
    }

    /// Capture a single frame.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = self.stream()?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        let sequence = meta.sequence;
        self.to_frame(buf, sequence)
    }

    /// Convert a raw buffer to an RGB frame based on the negotiated format.
    fn to_frame(&self, buf: &[u8], sequence: u32) -> Result<Frame, CameraError> {
        let pixels = (self.width * self.height) as usize;

        let (data, width, height) = match self.pixel_format {
            PixelFormat::Yuyv => (frame::yuyv_to_rgb(buf, self.width, self.height)?, self.width, self.height),
            PixelFormat::Mjpg => frame::mjpeg_to_rgb(buf)?,
            PixelFormat::Rgb3 => {
                if buf.len() < pixels * 3 {
                    return Err(CameraError::CaptureFailed(format!(
                        "RGB3 buffer too short: expected {}, got {}",
                        pixels * 3,
                        buf.len()
                    )));
                }
                (buf[..pixels * 3].to_vec(), self.width, self.height)
            }
        };

        let is_dark = frame::is_dark_frame(&frame::luma(&data), DARK_FRAME_THRESHOLD);

        Ok(Frame {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
            is_dark,
        })
    }

    /// Capture up to `count` usable frames.
    ///
    /// Makes at most `count * 3` raw captures; dark frames (lens covered,
    /// lights off) are skipped and counted. Returns the frames and the number
    /// of dark frames skipped.
    pub fn capture_frames(&self, count: usize) -> Result<(Vec<Frame>, usize), CameraError> {
        let max_attempts = count * 3;
        let mut good_frames = Vec::with_capacity(count);
        let mut dark_count = 0usize;

        let mut stream = self.stream()?;

        for _ in 0..max_attempts {
            if good_frames.len() >= count {
                break;
            }

            let (buf, meta) = stream
                .next()
                .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
            let sequence = meta.sequence;

            let frame = match self.to_frame(buf, sequence) {
                Ok(f) => f,
                // A torn MJPG buffer is not fatal; the next one usually decodes.
                Err(CameraError::Frame(e)) => {
                    tracing::debug!(seq = sequence, error = %e, "dropping undecodable frame");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if frame.is_dark {
                dark_count += 1;
                tracing::debug!(seq = sequence, "skipping dark frame");
                continue;
            }

            good_frames.push(frame);
        }

        Ok((good_frames, dark_count))
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let dev = Device::with_path(&path).ok()?;
                let caps = dev.query_caps().ok()?;
                if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                    return None;
                }
                Some(DeviceInfo {
                    path,
                    name: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}
