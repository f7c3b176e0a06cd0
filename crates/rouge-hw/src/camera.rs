//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame};
use crate::stream::{CaptureDevice, CaptureProfile, CaptureStream, FrameSender};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream as _;
use v4l::prelude::*;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::FourCC;

/// Consecutive dequeue failures tolerated before the capture thread gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 30;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("capture stream closed before the first frame")]
    StreamClosed,
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
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb24,
}

/// A V4L2 capture device, opened lazily on [`CaptureDevice::acquire`].
pub struct V4lCamera {
    device_path: String,
}

impl V4lCamera {
    pub fn new(device_path: impl Into<String>) -> Self {
        Self {
            device_path: device_path.into(),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// An opened device with its negotiated mode.
struct OpenedCamera {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

fn open_device(device_path: &str, profile: &CaptureProfile) -> Result<OpenedCamera, CameraError> {
    if !Path::new(device_path).exists() {
        return Err(CameraError::DeviceNotFound(device_path.to_string()));
    }

    let device = Device::with_path(device_path).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => CameraError::PermissionDenied(device_path.to_string()),
        _ if e.raw_os_error() == Some(16) => CameraError::DeviceBusy, // EBUSY
        _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
    })?;

    let caps = device.query_caps().map_err(|e| {
        CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
    })?;

    tracing::info!(
        device = device_path,
        driver = %caps.driver,
        card = %caps.card,
        facing = ?profile.facing,
        "opened camera"
    );

    if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
        return Err(CameraError::StreamingNotSupported);
    }

    // Ask for YUYV at the ideal size; accept RGB3 if the driver prefers it.
    let mut fmt = device.format().map_err(|e| {
        CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
    })?;
    fmt.fourcc = FourCC::new(b"YUYV");
    fmt.width = profile.ideal_width;
    fmt.height = profile.ideal_height;

    let negotiated = device.set_format(&fmt).map_err(|e| {
        CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
    })?;

    let fourcc = negotiated.fourcc;
    let pixel_format = if fourcc == FourCC::new(b"YUYV") {
        PixelFormat::Yuyv
    } else if fourcc == FourCC::new(b"RGB3") {
        PixelFormat::Rgb24
    } else {
        return Err(CameraError::FormatNegotiationFailed(format!(
            "unsupported pixel format: {fourcc:?} (need YUYV or RGB3)"
        )));
    };

    let fps = profile.target_fps();
    if let Err(e) = device.set_params(&Parameters::with_fps(fps)) {
        tracing::warn!(fps, error = %e, "could not set frame rate; using driver default");
    }

    tracing::info!(
        width = negotiated.width,
        height = negotiated.height,
        fourcc = ?fourcc,
        fps,
        "negotiated format"
    );

    Ok(OpenedCamera {
        device,
        width: negotiated.width,
        height: negotiated.height,
        pixel_format,
    })
}

impl OpenedCamera {
    fn to_rgba(&self, buf: &[u8]) -> Result<Vec<u8>, CameraError> {
        let converted = match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_rgba(buf, self.width, self.height),
            PixelFormat::Rgb24 => frame::rgb24_to_rgba(buf, self.width, self.height),
        };
        converted.map_err(|e| CameraError::CaptureFailed(format!("conversion failed: {e}")))
    }

    /// Capture loop: dequeue, convert, publish, until stopped or the stream is dropped.
    fn run(self, tx: FrameSender, stop: Arc<AtomicBool>) {
        let mut stream = match MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "failed to create mmap stream");
                return;
            }
        };

        let mut failures = 0u32;
        while !stop.load(Ordering::Relaxed) {
            let (buf, meta) = match stream.next() {
                Ok(next) => next,
                Err(e) => {
                    failures += 1;
                    tracing::warn!(error = %e, failures, "failed to dequeue buffer");
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        tracing::error!("camera stopped delivering frames");
                        return;
                    }
                    continue;
                }
            };
            failures = 0;

            let rgba = match self.to_rgba(buf) {
                Ok(rgba) => rgba,
                Err(e) => {
                    tracing::debug!(seq = meta.sequence, error = %e, "dropping frame");
                    continue;
                }
            };

            let frame = Frame {
                data: rgba,
                width: self.width,
                height: self.height,
                timestamp: std::time::Instant::now(),
                sequence: meta.sequence as u64,
            };
            if !tx.publish(frame) {
                break;
            }
        }
        tracing::debug!("capture thread exiting");
    }
}

impl CaptureDevice for V4lCamera {
    /// Open the device and start the capture thread. Fails fast if the
    /// device cannot be opened or negotiated.
    fn acquire(&mut self, profile: &CaptureProfile) -> Result<CaptureStream, CameraError> {
        let camera = open_device(&self.device_path, profile)?;

        let (tx, stream) = CaptureStream::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("rouge-capture".into())
            .spawn(move || camera.run(tx, stop_flag))
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        Ok(stream.on_release(move || {
            stop.store(true, Ordering::SeqCst);
            if handle.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }))
    }
}
