//! Temporal smoothing of the raw landmark stream.
//!
//! Velocity-adaptive exponential smoothing: lip points blend faster when
//! they move a lot (responsiveness) and slower when they barely move
//! (stability). Losing the face clears the smoothed state so a stale mask
//! never drifts onto a new position after occlusion.

use serde::Deserialize;

use crate::regions;
use crate::types::{Landmark, LandmarkSet};

/// Blend factors for the EMA. Higher = more responsive, lower = more stable.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SmoothingParams {
    /// Blend factor for every non-lip landmark.
    pub base: f32,
    /// Lip blend factor for motions near zero.
    pub min_lip: f32,
    /// Lip blend factor for motions at or beyond `snap_threshold`.
    pub max_lip: f32,
    /// Planar displacement (normalized units) that maps to `max_lip`.
    pub snap_threshold: f32,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            base: 0.70,
            min_lip: 0.40,
            max_lip: 0.92,
            snap_threshold: 0.006,
        }
    }
}

impl SmoothingParams {
    /// Blend factor for a lip landmark that moved `planar` since the last frame.
    pub fn lip_blend(&self, planar: f32) -> f32 {
        let ratio = if self.snap_threshold > 0.0 {
            (planar / self.snap_threshold).min(1.0)
        } else {
            1.0
        };
        self.min_lip + (self.max_lip - self.min_lip) * ratio
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilizerState {
    Uninitialized,
    Tracking,
}

/// Where the landmarks handed to the renderer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawSource {
    Smoothed,
    LastKnownGood,
}

pub struct LandmarkStabilizer {
    params: SmoothingParams,
    smoothed: Option<LandmarkSet>,
    last_good: Option<LandmarkSet>,
    lip_mask: Vec<bool>,
}

impl LandmarkStabilizer {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            smoothed: None,
            last_good: None,
            lip_mask: Vec::new(),
        }
    }

    pub fn params(&self) -> &SmoothingParams {
        &self.params
    }

    pub fn state(&self) -> StabilizerState {
        if self.smoothed.is_some() {
            StabilizerState::Tracking
        } else {
            StabilizerState::Uninitialized
        }
    }

    pub fn smoothed(&self) -> Option<&LandmarkSet> {
        self.smoothed.as_ref()
    }

    pub fn last_known_good(&self) -> Option<&LandmarkSet> {
        self.last_good.as_ref()
    }

    /// Remember the most recent non-empty detection. Independent of the
    /// smoothing state and never fed back into it.
    pub fn record_detection(&mut self, raw: &LandmarkSet) {
        if !raw.is_empty() {
            self.last_good = Some(raw.clone());
        }
    }

    /// Advance one frame. `None` (or an empty set) means the tracker saw no face.
    pub fn update(&mut self, raw: Option<&LandmarkSet>) {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            if self.smoothed.take().is_some() {
                tracing::debug!("tracking lost; smoothed landmarks cleared");
            }
            return;
        };

        match &self.smoothed {
            None => {
                tracing::debug!(landmarks = raw.len(), "tracking acquired");
                self.smoothed = Some(raw.clone());
                return;
            }
            Some(s) if s.len() != raw.len() => {
                tracing::debug!(landmarks = raw.len(), "landmark count changed; reinitialized");
                self.smoothed = Some(raw.clone());
                return;
            }
            Some(_) => {}
        }
        let Some(smoothed) = self.smoothed.as_mut() else {
            return;
        };

        if self.lip_mask.len() != raw.len() {
            self.lip_mask = regions::lip_index_mask(raw.len());
        }

        for (i, (s, c)) in smoothed
            .as_mut_slice()
            .iter_mut()
            .zip(raw.iter())
            .enumerate()
        {
            let blend = if self.lip_mask[i] {
                let planar = (c.x - s.x).hypot(c.y - s.y);
                self.params.lip_blend(planar)
            } else {
                self.params.base
            };
            blend_toward(s, c, blend);
        }
    }

    /// Landmarks to render this frame: smoothed, else last-known-good.
    pub fn drawable(&self) -> Option<(&LandmarkSet, DrawSource)> {
        self.smoothed
            .as_ref()
            .map(|s| (s, DrawSource::Smoothed))
            .or_else(|| self.last_good.as_ref().map(|s| (s, DrawSource::LastKnownGood)))
    }

    /// Drop the smoothed state (session stop). Last-known-good is kept.
    pub fn reset(&mut self) {
        self.smoothed = None;
    }

    pub fn clear_all(&mut self) {
        self.smoothed = None;
        self.last_good = None;
    }
}

/// Depth blends at half the planar rate; the tracker's z is noisier.
fn blend_toward(s: &mut Landmark, c: &Landmark, blend: f32) {
    s.x += (c.x - s.x) * blend;
    s.y += (c.y - s.y) * blend;
    s.z += (c.z - s.z) * (blend * 0.5);
}
