//! rouge-core — Color, geometry and landmark logic for virtual lipstick try-on.
//!
//! Everything here is pure computation apart from [`face_mesh`], which runs
//! the landmark model via ONNX Runtime for CPU inference.

pub mod color;
pub mod face_mesh;
pub mod geometry;
pub mod regions;
pub mod shades;
pub mod stabilizer;
pub mod tracker;
pub mod types;

pub use color::{Hsl, Rgb, Rgba};
pub use geometry::{BoundingBox, CompoundPath, FillRule, PixelRect, Point};
pub use stabilizer::{DrawSource, LandmarkStabilizer, SmoothingParams, StabilizerState};
pub use tracker::{LandmarkTracker, TrackerError, TrackerOptions};
pub use types::{Landmark, LandmarkSet, RgbaView, Shade, ShadeColor};

use std::path::PathBuf;

/// Default location of the face-landmark model:
/// `$XDG_DATA_HOME/rouge/models` (or `~/.local/share/rouge/models`).
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rouge/models")
}
