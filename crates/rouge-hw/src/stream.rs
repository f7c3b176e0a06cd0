//! Latest-frame stream between a capture source and the frame loop.
//!
//! The producer overwrites a single slot; the consumer always sees the
//! newest frame and can await the next one. Stale frames are never queued.

use crate::camera::CameraError;
use crate::frame::Frame;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;

/// Which way the camera should face. Advisory on devices without facing info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    #[default]
    User,
    Environment,
}

/// Requested capture configuration. Devices pick the closest supported mode.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureProfile {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub ideal_fps: u32,
    pub max_fps: u32,
}

impl Default for CaptureProfile {
    fn default() -> Self {
        Self {
            facing: Facing::User,
            ideal_width: 1280,
            ideal_height: 720,
            ideal_fps: 30,
            max_fps: 60,
        }
    }
}

impl CaptureProfile {
    /// Frame rate to request: the ideal, never above the maximum.
    pub fn target_fps(&self) -> u32 {
        self.ideal_fps.min(self.max_fps).max(1)
    }
}

/// A source of live video. `acquire` is the permission-gated request.
pub trait CaptureDevice: Send {
    fn acquire(&mut self, profile: &CaptureProfile) -> Result<CaptureStream, CameraError>;
}

type Slot = Option<Arc<Frame>>;
type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Producer half: publishes frames into the stream's slot.
#[derive(Clone)]
pub struct FrameSender {
    tx: watch::Sender<Slot>,
}

impl FrameSender {
    /// Replace the current frame. Returns `false` once the stream is gone.
    pub fn publish(&self, frame: Frame) -> bool {
        self.tx.send(Some(Arc::new(frame))).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half: the acquired capture device as seen by the frame loop.
pub struct CaptureStream {
    rx: watch::Receiver<Slot>,
    release: Option<ReleaseFn>,
}

impl CaptureStream {
    /// A connected sender/stream pair with no device behind it.
    pub fn channel() -> (FrameSender, CaptureStream) {
        let (tx, rx) = watch::channel(None);
        (FrameSender { tx }, CaptureStream { rx, release: None })
    }

    /// Run `release` exactly once when the stream is stopped or dropped.
    pub fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// True once the first frame has arrived (metadata known).
    pub fn is_ready(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Natural pixel size of the most recent frame.
    pub fn natural_size(&self) -> Option<(u32, u32)> {
        self.rx.borrow().as_ref().map(|f| (f.width, f.height))
    }

    /// The most recent frame, if any.
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.rx.borrow().clone()
    }

    /// Whether the producer is still connected.
    pub fn is_open(&self) -> bool {
        self.rx.has_changed().is_ok()
    }

    /// Wait until a frame newer than the last one observed here arrives.
    /// Returns `None` when the producer has gone away.
    pub async fn next_frame(&mut self) -> Option<Arc<Frame>> {
        self.rx.changed().await.ok()?;
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the first frame.
    pub async fn wait_ready(&mut self) -> Result<(), CameraError> {
        self.rx
            .wait_for(|slot| slot.is_some())
            .await
            .map(|_| ())
            .map_err(|_| CameraError::StreamClosed)
    }

    /// Stop capture and release the device. Idempotent.
    pub fn stop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
            tracing::info!("capture device released");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.release.is_none()
    }
}

impl Drop for CaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_ready_after_first_frame() {
        let (tx, mut stream) = CaptureStream::channel();
        assert!(!stream.is_ready());
        assert_eq!(stream.natural_size(), None);

        tx.publish(Frame::solid(4, 2, [0, 0, 0, 255], 1));
        stream.wait_ready().await.unwrap();
        assert!(stream.is_ready());
        assert_eq!(stream.natural_size(), Some((4, 2)));
    }

    #[tokio::test]
    async fn test_latest_overwrites() {
        let (tx, mut stream) = CaptureStream::channel();
        tx.publish(Frame::solid(1, 1, [0, 0, 0, 255], 1));
        tx.publish(Frame::solid(1, 1, [0, 0, 0, 255], 2));
        let frame = stream.next_frame().await.unwrap();
        assert_eq!(frame.sequence, 2);
        assert_eq!(stream.latest().map(|f| f.sequence), Some(2));
    }

    #[tokio::test]
    async fn test_closed_producer() {
        let (tx, mut stream) = CaptureStream::channel();
        drop(tx);
        assert!(!stream.is_open());
        assert!(stream.next_frame().await.is_none());
        assert!(matches!(stream.wait_ready().await, Err(CameraError::StreamClosed)));
    }

    #[test]
    fn test_release_runs_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let (_tx, stream) = CaptureStream::channel();
        let mut stream = stream.on_release(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        stream.stop();
        stream.stop();
        assert!(stream.is_stopped());
        drop(stream);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_target_fps_capped() {
        let profile = CaptureProfile {
            ideal_fps: 90,
            max_fps: 60,
            ..CaptureProfile::default()
        };
        assert_eq!(profile.target_fps(), 60);
        assert_eq!(CaptureProfile::default().target_fps(), 30);
    }
}
