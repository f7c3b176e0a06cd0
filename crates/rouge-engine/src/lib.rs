//! rouge-engine — Real-time lip compositor and try-on session controller.
//!
//! A [`Session`] acquires a capture device, runs the frame loop on a tokio
//! task and feeds frames to a [`LandmarkTracker`](rouge_core::LandmarkTracker)
//! one at a time. Each frame is drawn into a back buffer, lips are recolored
//! in place, and the result is copied to the front buffer in one step.

pub mod buffers;
pub mod compositor;
pub mod config;
pub mod inference;
pub mod raster;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffers::{FrameBuffers, MaskBuffer, Viewport};
pub use compositor::{recolor_region, Compositor, CoordinateSpace, FrameReport, LipRings};
pub use config::{ConfigError, EngineConfig, Pacing};
pub use inference::{InferenceSlot, SubmitOutcome};
pub use session::{
    Session, SessionError, SessionState, SessionStatus, Snapshot, SnapshotError, Visibility,
    SNAPSHOT_FILENAME,
};
