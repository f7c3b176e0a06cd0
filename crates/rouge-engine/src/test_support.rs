//! Synthetic landmarks, tracker and capture device for engine tests.

use rouge_core::regions::{LOWER_LIP_INNER, LOWER_LIP_OUTER, UPPER_LIP_INNER, UPPER_LIP_OUTER};
use rouge_core::types::REFINED_FACE_MESH_LANDMARKS;
use rouge_core::{Landmark, LandmarkSet, LandmarkTracker, RgbaView, TrackerError};
use rouge_hw::{CameraError, CaptureDevice, CaptureProfile, CaptureStream, Frame, FrameSender};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A face mesh whose lip contours trace two concentric ellipses centred at
/// `(cx, cy)` (normalized). The inner ellipse is the open mouth.
pub(crate) fn mouth_landmarks(cx: f32, cy: f32, rx: f32, ry: f32) -> LandmarkSet {
    let mut points = vec![Landmark::new(cx, cy, 0.0); REFINED_FACE_MESH_LANDMARKS];
    place_ring(&mut points, &UPPER_LIP_OUTER, &LOWER_LIP_OUTER, cx, cy, rx, ry);
    place_ring(
        &mut points,
        &UPPER_LIP_INNER,
        &LOWER_LIP_INNER,
        cx,
        cy,
        rx * 0.6,
        ry * 0.3,
    );
    LandmarkSet::new(points)
}

fn place_ring(
    points: &mut [Landmark],
    upper: &[usize],
    lower: &[usize],
    cx: f32,
    cy: f32,
    rx: f32,
    ry: f32,
) {
    let at = |theta: f32| Landmark::new(cx + rx * theta.cos(), cy - ry * theta.sin(), 0.0);
    let upper_steps = (upper.len() - 1) as f32;
    for (j, &idx) in upper.iter().enumerate() {
        points[idx] = at(PI - PI * j as f32 / upper_steps);
    }
    let lower_steps = lower.len() as f32;
    for (k, &idx) in lower.iter().enumerate() {
        points[idx] = at(PI + PI * (k + 1) as f32 / lower_steps);
    }
}

/// Returns whatever landmarks were last configured, counting calls.
#[derive(Clone, Default)]
pub(crate) struct ScriptedTracker {
    pub(crate) result: Arc<Mutex<Option<LandmarkSet>>>,
    pub(crate) calls: Arc<AtomicUsize>,
    /// Blocks each inference this long before answering.
    pub(crate) delay: Duration,
}

impl ScriptedTracker {
    pub(crate) fn returning(landmarks: Option<LandmarkSet>) -> Self {
        Self {
            result: Arc::new(Mutex::new(landmarks)),
            calls: Arc::default(),
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LandmarkTracker for ScriptedTracker {
    fn infer(&mut self, _frame: &RgbaView<'_>) -> Result<Option<LandmarkSet>, TrackerError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = self.result.lock().map_err(|_| TrackerError::Panicked)?;
        Ok(result.clone())
    }
}

/// Capture device fed by the test through [`FrameSender`]s.
#[derive(Clone, Default)]
pub(crate) struct SyntheticCamera {
    pub(crate) senders: Arc<Mutex<Vec<FrameSender>>>,
    pub(crate) acquired: Arc<AtomicUsize>,
    pub(crate) released: Arc<AtomicUsize>,
    /// Fail acquisition with a permission error.
    pub(crate) deny: bool,
    /// Frame published immediately on acquisition.
    pub(crate) first_frame: Option<(u32, u32)>,
}

impl SyntheticCamera {
    pub(crate) fn with_frames(width: u32, height: u32) -> Self {
        Self {
            first_frame: Some((width, height)),
            ..Self::default()
        }
    }

    pub(crate) fn denied() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub(crate) fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub(crate) fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Publish a frame on the most recently acquired stream.
    pub(crate) fn publish(&self, frame: Frame) -> bool {
        let senders = self.senders.lock().unwrap();
        senders.last().is_some_and(|tx| tx.publish(frame))
    }
}

impl CaptureDevice for SyntheticCamera {
    fn acquire(&mut self, _profile: &CaptureProfile) -> Result<CaptureStream, CameraError> {
        if self.deny {
            return Err(CameraError::PermissionDenied("synthetic".into()));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let (tx, stream) = CaptureStream::channel();
        if let Some((w, h)) = self.first_frame {
            tx.publish(Frame::solid(w, h, [128, 128, 128, 255], 1));
        }
        self.senders.lock().unwrap().push(tx);
        let released = self.released.clone();
        Ok(stream.on_release(move || {
            released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
