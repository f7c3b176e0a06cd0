use rouge_core::face_mesh::InputLayout;
use rouge_core::{SmoothingParams, TrackerOptions};
use rouge_hw::CaptureProfile;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Engine configuration: built-in defaults, then an optional TOML file,
/// then `ROUGE_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub smoothing: SmoothingParams,
    pub visual: VisualConfig,
    pub performance: PerformanceConfig,
    pub capture: CaptureConfig,
    pub tracker: TrackerConfig,
}

/// Look and feel of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    /// Mask feather radius in CSS pixels (scaled by the device pixel ratio).
    pub edge_feather_px: f32,
    /// Base color laydown of the recolor pass.
    pub base_opacity: f32,
    /// Extra opacity in darker areas, keeps depth in shadows.
    pub shadow_boost: f32,
    /// Opacity of the multiply glaze drawn under the recolor.
    pub glaze_opacity: f32,
    /// Device pixel ratio of the display.
    pub device_pixel_ratio: f32,
    /// Ceiling applied to `device_pixel_ratio`.
    pub dpr_limit: f32,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            edge_feather_px: 0.9,
            base_opacity: 0.84,
            shadow_boost: 0.20,
            glaze_opacity: 0.28,
            device_pixel_ratio: 1.0,
            dpr_limit: 2.0,
        }
    }
}

/// Frame pacing strategy for the render loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// Wake on each new camera frame, with a periodic fallback.
    #[default]
    VideoFrame,
    /// Fixed-rate ticks only.
    Interval,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Run the per-pixel recolor every N frames (1 = every frame).
    pub colorize_every_n_frames: u32,
    /// Maximum padding around the lip bounding box, in CSS pixels.
    pub max_bbox_pad: f32,
    /// Chaikin iterations applied to the lip rings.
    pub smoothing_iterations: usize,
    /// Vertical subsamples per pixel row when filling masks.
    pub mask_samples: usize,
    pub pacing: Pacing,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            colorize_every_n_frames: 1,
            max_bbox_pad: 8.0,
            smoothing_iterations: 1,
            mask_samples: 4,
            pacing: Pacing::VideoFrame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// V4L2 device path.
    pub device: String,
    #[serde(flatten)]
    pub profile: CaptureProfile,
    /// How long `start()` waits for the first frame.
    pub ready_timeout_ms: u64,
    /// Frame size assumed when the device has not reported one yet.
    pub fallback_width: u32,
    pub fallback_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            profile: CaptureProfile::default(),
            ready_timeout_ms: 5000,
            fallback_width: 1280,
            fallback_height: 720,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub model_path: PathBuf,
    pub input_layout: InputLayout,
    #[serde(flatten)]
    pub options: TrackerOptions,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            model_path: rouge_core::default_model_dir().join("face_landmark.onnx"),
            input_layout: InputLayout::default(),
            options: TrackerOptions::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults, overlaid by `path` (if given), overlaid by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `ROUGE_*` overrides. `lookup` is `std::env::var` outside of tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(device) = lookup("ROUGE_CAMERA_DEVICE") {
            self.capture.device = device;
        }
        if let Some(path) = lookup("ROUGE_MODEL_PATH") {
            self.tracker.model_path = PathBuf::from(path);
        }
        self.visual.device_pixel_ratio =
            parse_or(&lookup, "ROUGE_DEVICE_PIXEL_RATIO", self.visual.device_pixel_ratio);
        self.visual.dpr_limit = parse_or(&lookup, "ROUGE_DPR_LIMIT", self.visual.dpr_limit);
        self.visual.base_opacity = parse_or(&lookup, "ROUGE_BASE_OPACITY", self.visual.base_opacity);
        self.performance.colorize_every_n_frames = parse_or(
            &lookup,
            "ROUGE_COLORIZE_EVERY_N_FRAMES",
            self.performance.colorize_every_n_frames,
        );
        self.capture.ready_timeout_ms =
            parse_or(&lookup, "ROUGE_READY_TIMEOUT_MS", self.capture.ready_timeout_ms);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.smoothing;
        if !(0.0..=1.0).contains(&s.base) {
            return Err(invalid("smoothing.base", format!("{} not in [0, 1]", s.base)));
        }
        if !(0.0..=1.0).contains(&s.min_lip) || !(0.0..=1.0).contains(&s.max_lip) {
            return Err(invalid("smoothing.min_lip/max_lip", "must be in [0, 1]".into()));
        }
        if s.min_lip > s.max_lip {
            return Err(invalid(
                "smoothing.min_lip",
                format!("{} exceeds max_lip {}", s.min_lip, s.max_lip),
            ));
        }
        if self.visual.dpr_limit <= 0.0 {
            return Err(invalid("visual.dpr_limit", "must be positive".into()));
        }
        if self.performance.colorize_every_n_frames == 0 {
            return Err(invalid(
                "performance.colorize_every_n_frames",
                "must be at least 1".into(),
            ));
        }
        if self.performance.mask_samples == 0 {
            return Err(invalid("performance.mask_samples", "must be at least 1".into()));
        }
        if self.capture.fallback_width == 0 || self.capture.fallback_height == 0 {
            return Err(invalid("capture.fallback_width/height", "must be non-zero".into()));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
