//! rouge-hw — Hardware abstraction for live video capture.
//!
//! Provides V4L2-based camera access, RGBA frame conversion and the
//! latest-frame stream the compositor reads from.

pub mod camera;
pub mod frame;
pub mod stream;

pub use camera::{CameraError, DeviceInfo, PixelFormat, V4lCamera};
pub use frame::{Frame, FrameError};
pub use stream::{CaptureDevice, CaptureProfile, CaptureStream, Facing, FrameSender};
