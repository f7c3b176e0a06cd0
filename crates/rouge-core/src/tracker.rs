//! Contract for the external landmark tracker.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{LandmarkSet, RgbaView};

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("model file not found: {0}; download a face-landmark ONNX model and set ROUGE_MODEL_PATH")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("tracker panicked during inference")]
    Panicked,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Tracker configuration. Only a single face is supported.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerOptions {
    pub max_faces: usize,
    /// Keep the iris points (478 landmarks instead of 468).
    pub refine_landmarks: bool,
    /// Presence threshold when searching for a face.
    pub min_detection_confidence: f32,
    /// Presence threshold while following a face from the previous frame.
    pub min_tracking_confidence: f32,
    /// Must stay `false`: coordinates are unmirrored, mirroring is a render concern.
    pub selfie_mode: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            max_faces: 1,
            refine_landmarks: true,
            min_detection_confidence: 0.6,
            min_tracking_confidence: 0.6,
            selfie_mode: false,
        }
    }
}

/// Maps one image to zero or one face's landmarks.
///
/// `infer` blocks for the duration of the model call; callers run it off the
/// frame loop and never issue a second call before the first returns.
pub trait LandmarkTracker: Send {
    fn infer(&mut self, frame: &RgbaView<'_>) -> Result<Option<LandmarkSet>, TrackerError>;
}

impl<T: LandmarkTracker + ?Sized> LandmarkTracker for Box<T> {
    fn infer(&mut self, frame: &RgbaView<'_>) -> Result<Option<LandmarkSet>, TrackerError> {
        (**self).infer(frame)
    }
}
