//! attend-hw: Webcam capture for hostel attendance.
//!
//! Provides V4L2 capture into RGB frames and loading of still photos in the
//! same frame type.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{load_photo, Frame, FrameError};
