//! Face-mesh landmark tracker via ONNX Runtime.
//!
//! Runs a MediaPipe-style face-landmark model on a square region of
//! interest. The ROI follows the previous detection (tracking mode); when
//! no face was seen last frame it falls back to the centred square of the
//! frame (detection mode).

use crate::tracker::{LandmarkTracker, TrackerError, TrackerOptions};
use crate::types::{Landmark, LandmarkSet, RgbaView, FACE_MESH_LANDMARKS};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use serde::Deserialize;
use std::path::Path;

// --- Named constants ---
const FACE_MESH_INPUT_SIZE: usize = 192;
/// The ROI is the landmark bounding square scaled by this factor.
const ROI_SCALE: f32 = 1.5;
/// Smallest ROI side in pixels; below this the crop is mostly interpolation.
const MIN_ROI_SIDE: f32 = 32.0;

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, 192, 192, 3]`, as in TFLite-converted exports.
    #[default]
    Nhwc,
    /// `[1, 3, 192, 192]`
    Nchw,
}

/// Square crop in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Roi {
    cx: f32,
    cy: f32,
    side: f32,
}

impl Roi {
    fn centred(width: u32, height: u32) -> Self {
        Self {
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
            side: width.min(height) as f32,
        }
    }

    /// Square around the landmarks' bounding box, scaled by [`ROI_SCALE`].
    fn around(landmarks: &LandmarkSet, width: u32, height: u32) -> Option<Self> {
        let (w, h) = (width as f32, height as f32);
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for p in landmarks.iter() {
            min_x = min_x.min(p.x * w);
            min_y = min_y.min(p.y * h);
            max_x = max_x.max(p.x * w);
            max_y = max_y.max(p.y * h);
        }
        if !min_x.is_finite() || !max_y.is_finite() {
            return None;
        }
        let side = ((max_x - min_x).max(max_y - min_y) * ROI_SCALE).max(MIN_ROI_SIDE);
        Some(Self {
            cx: (min_x + max_x) / 2.0,
            cy: (min_y + max_y) / 2.0,
            side,
        })
    }

    fn origin(&self) -> (f32, f32) {
        (self.cx - self.side / 2.0, self.cy - self.side / 2.0)
    }
}

/// Face-mesh tracker backed by an ONNX model.
pub struct FaceMeshTracker {
    session: Session,
    options: TrackerOptions,
    layout: InputLayout,
    input_size: usize,
    output_count: usize,
    /// ROI derived from the last successful detection.
    roi: Option<Roi>,
}

impl FaceMeshTracker {
    /// Load the face-landmark ONNX model from the given path.
    pub fn load(
        model_path: &str,
        options: TrackerOptions,
        layout: InputLayout,
    ) -> Result<Self, TrackerError> {
        if !Path::new(model_path).exists() {
            return Err(TrackerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)
            .map_err(ort::Error::from)?
            .commit_from_file(model_path)?;

        let output_count = session.outputs().len();
        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            ?layout,
            "loaded face-mesh model"
        );

        if options.max_faces != 1 {
            tracing::warn!(
                max_faces = options.max_faces,
                "face-mesh tracker follows a single face; extra faces are ignored"
            );
        }
        if options.selfie_mode {
            tracing::warn!("selfie mode requested; landmarks are still reported unmirrored");
        }

        Ok(Self {
            session,
            options,
            layout,
            input_size: FACE_MESH_INPUT_SIZE,
            output_count,
            roi: None,
        })
    }

    fn threshold(&self) -> f32 {
        if self.roi.is_some() {
            self.options.min_tracking_confidence
        } else {
            self.options.min_detection_confidence
        }
    }

    fn run(&mut self, frame: &RgbaView<'_>) -> Result<Option<LandmarkSet>, TrackerError> {
        let roi = self
            .roi
            .unwrap_or_else(|| Roi::centred(frame.width, frame.height));
        let input = preprocess(frame, &roi, self.input_size, self.layout);
        let threshold = self.threshold();
        let input_size = self.input_size;
        let output_count = self.output_count;

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        // Exports disagree on output names and order; pick tensors by size.
        let mut coords: Option<Vec<f32>> = None;
        let mut presence: Option<f32> = None;
        for idx in 0..output_count {
            let Ok((_, data)) = outputs[idx].try_extract_tensor::<f32>() else {
                continue;
            };
            if data.len() >= FACE_MESH_LANDMARKS * 3 && data.len() % 3 == 0 && coords.is_none() {
                coords = Some(data.to_vec());
            } else if data.len() == 1 && presence.is_none() {
                presence = Some(data[0]);
            }
        }

        let coords = coords.ok_or_else(|| {
            TrackerError::InferenceFailed(format!(
                "no landmark tensor among {output_count} outputs"
            ))
        })?;
        let score = presence.map(presence_probability).unwrap_or(1.0);

        if score < threshold {
            tracing::trace!(score, threshold, "face presence below threshold");
            return Ok(None);
        }

        let mut landmarks = decode_landmarks(&coords, &roi, input_size, frame.width, frame.height);
        if !self.options.refine_landmarks {
            landmarks.truncate(FACE_MESH_LANDMARKS);
        }
        Ok(Some(landmarks))
    }
}

impl LandmarkTracker for FaceMeshTracker {
    fn infer(&mut self, frame: &RgbaView<'_>) -> Result<Option<LandmarkSet>, TrackerError> {
        let result = self.run(frame);
        self.roi = match &result {
            Ok(Some(landmarks)) => Roi::around(landmarks, frame.width, frame.height),
            _ => None,
        };
        result
    }
}

/// Presence outputs are either a probability or a raw logit.
fn presence_probability(raw: f32) -> f32 {
    if (0.0..=1.0).contains(&raw) {
        raw
    } else {
        1.0 / (1.0 + (-raw).exp())
    }
}

/// Crop the ROI and resize it bilinearly into a `[0, 1]` float tensor.
/// Samples outside the frame read as black.
fn preprocess(frame: &RgbaView<'_>, roi: &Roi, size: usize, layout: InputLayout) -> Array4<f32> {
    let mut tensor = match layout {
        InputLayout::Nhwc => Array4::<f32>::zeros((1, size, size, 3)),
        InputLayout::Nchw => Array4::<f32>::zeros((1, 3, size, size)),
    };

    let (ox, oy) = roi.origin();
    let step = roi.side / size as f32;
    let w = frame.width as i32;
    let h = frame.height as i32;

    let sample = |x: i32, y: i32, c: usize| -> f32 {
        if x >= 0 && x < w && y >= 0 && y < h {
            frame.data[(y as usize * w as usize + x as usize) * 4 + c] as f32
        } else {
            0.0
        }
    };

    for ty in 0..size {
        let sy = oy + (ty as f32 + 0.5) * step - 0.5;
        let y0 = sy.floor() as i32;
        let fy = sy - y0 as f32;
        for tx in 0..size {
            let sx = ox + (tx as f32 + 0.5) * step - 0.5;
            let x0 = sx.floor() as i32;
            let fx = sx - x0 as f32;

            for c in 0..3 {
                let val = sample(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                    + sample(x0 + 1, y0, c) * fx * (1.0 - fy)
                    + sample(x0, y0 + 1, c) * (1.0 - fx) * fy
                    + sample(x0 + 1, y0 + 1, c) * fx * fy;
                let normalized = val / 255.0;
                match layout {
                    InputLayout::Nhwc => tensor[[0, ty, tx, c]] = normalized,
                    InputLayout::Nchw => tensor[[0, c, ty, tx]] = normalized,
                }
            }
        }
    }

    tensor
}

/// Map model-space `(x, y, z)` triples (pixels of the `size × size` input)
/// back to frame-normalized coordinates.
fn decode_landmarks(coords: &[f32], roi: &Roi, size: usize, width: u32, height: u32) -> LandmarkSet {
    let (ox, oy) = roi.origin();
    let scale = roi.side / size as f32;
    let (w, h) = (width as f32, height as f32);

    coords
        .chunks_exact(3)
        .map(|c| {
            Landmark::new(
                (ox + c[0] * scale) / w,
                (oy + c[1] * scale) / h,
                c[2] * scale / w,
            )
        })
        .collect::<Vec<_>>()
        .into()
}
