//! Per-frame composition: mirrored camera blit, lip glaze, per-pixel recolor,
//! then an atomic present of the back buffer.

use crate::buffers::{FrameBuffers, MaskBuffer, Viewport};
use crate::config::{PerformanceConfig, VisualConfig};
use crate::raster::{self, MirrorBlit, Rasterizer};
use image::RgbaImage;
use rouge_core::color::{self, Hsl, Rgb};
use rouge_core::geometry::{compute_bounding_box, smooth_polyline};
use rouge_core::regions::{inner_ring_indices, outer_ring_indices};
use rouge_core::{
    CompoundPath, DrawSource, LandmarkSet, LandmarkStabilizer, PixelRect, Point, RgbaView, Shade,
    SmoothingParams,
};

/// Mask coverage below this is left untouched by the recolor pass.
const MIN_MASK_ALPHA: f32 = 0.01;
/// Recolor bbox padding as a fraction of the larger box side.
const BBOX_PAD_RATIO: f32 = 0.04;
const MIN_BBOX_PAD: f32 = 2.0;

/// How lip points map onto the buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// CSS pixels in the frame's own orientation; drawn through the
    /// horizontal mirror (`x_device = device_width - x * dpr`).
    MirroredDisplay,
    /// CSS pixels with x already flipped, so they address the mirrored
    /// pixels in the back buffer directly (`x_device = x * dpr`).
    BufferPixels,
}

/// Smoothed outer and inner lip rings in one coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub struct LipRings {
    pub outer: Vec<Point>,
    pub inner: Vec<Point>,
    pub space: CoordinateSpace,
}

impl LipRings {
    /// Build both rings from `landmarks` for a `css_width × css_height`
    /// display. `None` if the set is too small to contain the lip indices.
    pub fn project(
        landmarks: &LandmarkSet,
        css_width: f32,
        css_height: f32,
        space: CoordinateSpace,
        iterations: usize,
    ) -> Option<Self> {
        let ring = |indices: Vec<usize>| -> Option<Vec<Point>> {
            let points = indices
                .into_iter()
                .map(|i| {
                    landmarks.get(i).map(|lm| match space {
                        CoordinateSpace::MirroredDisplay => {
                            Point::new(lm.x * css_width, lm.y * css_height)
                        }
                        CoordinateSpace::BufferPixels => {
                            Point::new(css_width - lm.x * css_width, lm.y * css_height)
                        }
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            Some(smooth_polyline(&points, iterations))
        };
        Some(Self {
            outer: ring(outer_ring_indices())?,
            inner: ring(inner_ring_indices())?,
            space,
        })
    }

    /// Outer ring minus inner ring, in CSS pixels.
    pub fn path(&self) -> CompoundPath {
        CompoundPath::from_rings(self.outer.clone(), Some(self.inner.clone()))
    }

    /// The compound path in device pixels of `viewport`.
    pub fn device_path(&self, viewport: &Viewport) -> CompoundPath {
        let dpr = viewport.device_pixel_ratio;
        let device_width = viewport.device_width() as f32;
        match self.space {
            CoordinateSpace::MirroredDisplay => self
                .path()
                .map(|p| Point::new(device_width - p.x * dpr, p.y * dpr)),
            CoordinateSpace::BufferPixels => self.path().map(|p| Point::new(p.x * dpr, p.y * dpr)),
        }
    }
}

/// What one composition step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// The front buffer was updated.
    pub presented: bool,
    pub drew_camera: bool,
    /// Which landmarks the overlay used, if any.
    pub source: Option<DrawSource>,
    /// The per-pixel recolor pass ran.
    pub recolored: bool,
    /// A tracker inference was started this step.
    pub submitted: bool,
}

/// Owns the buffers and per-frame state of one view.
pub struct Compositor {
    buffers: FrameBuffers,
    stabilizer: LandmarkStabilizer,
    rasterizer: Rasterizer,
    blit: MirrorBlit,
    visual: VisualConfig,
    performance: PerformanceConfig,
    latest: Option<LandmarkSet>,
    frame_counter: u64,
    frames_presented: u64,
}

impl Compositor {
    pub fn new(
        viewport: Viewport,
        smoothing: SmoothingParams,
        visual: VisualConfig,
        performance: PerformanceConfig,
    ) -> Self {
        Self {
            buffers: FrameBuffers::new(viewport),
            stabilizer: LandmarkStabilizer::new(smoothing),
            rasterizer: Rasterizer::new(),
            blit: MirrorBlit::new(),
            visual,
            performance,
            latest: None,
            frame_counter: 0,
            frames_presented: 0,
        }
    }

    pub fn buffers(&self) -> &FrameBuffers {
        &self.buffers
    }

    pub fn viewport(&self) -> Viewport {
        self.buffers.viewport()
    }

    pub fn resize(&mut self, viewport: Viewport) -> bool {
        self.buffers.resize(viewport)
    }

    pub fn stabilizer(&self) -> &LandmarkStabilizer {
        &self.stabilizer
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Store the newest tracker output. `None` means the tracker saw no face.
    pub fn accept_results(&mut self, landmarks: Option<LandmarkSet>) {
        if let Some(set) = landmarks.as_ref().filter(|s| !s.is_empty()) {
            self.stabilizer.record_detection(set);
        }
        self.latest = landmarks;
    }

    /// Forget per-session tracking state. Last-known-good landmarks survive.
    pub fn reset(&mut self) {
        self.stabilizer.reset();
        self.latest = None;
    }

    /// Compose one frame. Without a camera frame nothing is drawn and the
    /// front buffer keeps its previous contents.
    pub fn compose(&mut self, frame: Option<&RgbaView<'_>>, shade: &Shade) -> FrameReport {
        let Some(frame) = frame else {
            return FrameReport::default();
        };

        let Self {
            buffers,
            stabilizer,
            rasterizer,
            blit,
            visual,
            performance,
            latest,
            frame_counter,
            frames_presented,
        } = self;

        blit.draw(frame, buffers.back_mut());
        stabilizer.update(latest.as_ref());

        let mut report = FrameReport {
            presented: true,
            drew_camera: true,
            ..FrameReport::default()
        };

        let target = shade.rgba();
        if let Some((landmarks, source)) = stabilizer.drawable() {
            report.source = Some(source);
            if !target.is_transparent() {
                let viewport = buffers.viewport();
                let (css_w, css_h) = viewport.drawing_size();
                let iterations = performance.smoothing_iterations;
                let samples = performance.mask_samples;

                if let Some(rings) = LipRings::project(
                    landmarks,
                    css_w,
                    css_h,
                    CoordinateSpace::MirroredDisplay,
                    iterations,
                ) {
                    let (back, mask) = buffers.layers_mut();
                    glaze(
                        back,
                        mask,
                        rasterizer,
                        &rings.device_path(&viewport),
                        target.rgb(),
                        visual.glaze_opacity,
                        samples,
                    );
                }

                let every = u64::from(performance.colorize_every_n_frames.max(1));
                if *frame_counter % every == 0 {
                    if let Some(rings) = LipRings::project(
                        landmarks,
                        css_w,
                        css_h,
                        CoordinateSpace::BufferPixels,
                        iterations,
                    ) {
                        let t = target.rgb();
                        let (back, mask) = buffers.layers_mut();
                        report.recolored = colorize(
                            back,
                            mask,
                            rasterizer,
                            &rings,
                            &viewport,
                            color::rgb_to_hsl(t.r, t.g, t.b),
                            visual,
                            performance,
                        );
                    }
                }
                *frame_counter += 1;
            }
        }

        buffers.present();
        *frames_presented += 1;
        tracing::trace!(
            frame = *frames_presented,
            source = ?report.source,
            recolored = report.recolored,
            "frame presented"
        );
        report
    }
}

/// Multiply-blend `color` over the path at `opacity`, no feathering.
fn glaze(
    back: &mut RgbaImage,
    mask: &mut MaskBuffer,
    rasterizer: &mut Rasterizer,
    path: &CompoundPath,
    color: Rgb,
    opacity: f32,
    samples: usize,
) {
    let (w, h) = back.dimensions();
    let Some(rect) = PixelRect::covering(&path.bounding_box(), w, h) else {
        return;
    };
    mask.begin(rect.width, rect.height);
    rasterizer.fill(
        mask,
        &path.translate(-(rect.x as f32), -(rect.y as f32)),
        samples,
    );

    let tint = [
        color.r as f32 / 255.0,
        color.g as f32 / 255.0,
        color.b as f32 / 255.0,
    ];
    for my in 0..mask.height() {
        for mx in 0..mask.width() {
            let coverage = mask.get(mx, my) * opacity;
            if coverage <= 0.0 {
                continue;
            }
            let px = back.get_pixel_mut(rect.x + mx, rect.y + my);
            for (c, s) in px.0[..3].iter_mut().zip(tint) {
                *c = (*c as f32 * (1.0 - coverage * (1.0 - s))).round() as u8;
            }
        }
    }
}

/// Padded, clamped recolor pass in buffer pixel space. Returns whether any
/// region was processed.
#[allow(clippy::too_many_arguments)]
fn colorize(
    back: &mut RgbaImage,
    mask: &mut MaskBuffer,
    rasterizer: &mut Rasterizer,
    rings: &LipRings,
    viewport: &Viewport,
    target: Hsl,
    visual: &VisualConfig,
    performance: &PerformanceConfig,
) -> bool {
    let Some(rect) = recolor_rect(&rings.outer, viewport, performance.max_bbox_pad) else {
        return false;
    };
    let dpr = viewport.device_pixel_ratio;
    let (sx, sy) = (rect.x as f32, rect.y as f32);

    mask.begin(rect.width, rect.height);
    let path = rings.path().map(|p| Point::new(p.x * dpr - sx, p.y * dpr - sy));
    rasterizer.fill(mask, &path, performance.mask_samples);
    rasterizer.feather(mask, raster::feather_radius(visual.edge_feather_px, dpr));

    recolor_region(back, mask, rect, target, visual);
    true
}

/// Device-pixel rectangle around the outer ring: padded in CSS pixels by a
/// size-relative margin (at least 2, at most `max_pad`), clamped to the buffer.
pub fn recolor_rect(outer: &[Point], viewport: &Viewport, max_pad: f32) -> Option<PixelRect> {
    let bbox = compute_bounding_box(outer);
    let (css_w, css_h) = viewport.drawing_size();
    let pad = max_pad.min(
        (bbox.width.max(bbox.height) * BBOX_PAD_RATIO)
            .round()
            .max(MIN_BBOX_PAD),
    );

    let bx = (bbox.x - pad).floor().max(0.0);
    let by = (bbox.y - pad).floor().max(0.0);
    let bw = (css_w - bx).min((bbox.width + pad * 2.0).ceil());
    let bh = (css_h - by).min((bbox.height + pad * 2.0).ceil());
    if bw <= 0.0 || bh <= 0.0 {
        return None;
    }

    let dpr = viewport.device_pixel_ratio;
    let (dev_w, dev_h) = viewport.device_size();
    let sx = (bx * dpr).floor() as u32;
    let sy = (by * dpr).floor() as u32;
    if sx >= dev_w || sy >= dev_h {
        return None;
    }
    let sw = ((bw * dpr).floor() as u32).max(1).min(dev_w - sx);
    let sh = ((bh * dpr).floor() as u32).max(1).min(dev_h - sy);
    Some(PixelRect {
        x: sx,
        y: sy,
        width: sw,
        height: sh,
    })
}

/// Recolor `rect` of `back` toward `target`'s hue and saturation, keeping
/// each pixel's lightness. `mask` is aligned 1:1 with `rect`.
///
/// Per pixel: `alpha = clamp(base + boost × (0.5 − l)) × mask`, so darker
/// pixels take slightly more color.
pub fn recolor_region(
    back: &mut RgbaImage,
    mask: &MaskBuffer,
    rect: PixelRect,
    target: Hsl,
    visual: &VisualConfig,
) {
    let (w, h) = back.dimensions();
    let rows = rect.height.min(mask.height()).min(h.saturating_sub(rect.y));
    let cols = rect.width.min(mask.width()).min(w.saturating_sub(rect.x));

    for my in 0..rows {
        for mx in 0..cols {
            let ma = mask.get(mx, my);
            if ma < MIN_MASK_ALPHA {
                continue;
            }
            let px = back.get_pixel_mut(rect.x + mx, rect.y + my);
            let [r, g, b, _] = px.0;
            let l = color::rgb_to_hsl(r, g, b).l;
            let a = (visual.base_opacity + visual.shadow_boost * (0.5 - l)).clamp(0.0, 1.0) * ma;
            let n = color::hsl_to_rgb(target.h, target.s, l);
            let mix = |new: u8, old: u8| (new as f32 * a + old as f32 * (1.0 - a)).round() as u8;
            px.0[0] = mix(n.r, r);
            px.0[1] = mix(n.g, g);
            px.0[2] = mix(n.b, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::mouth_landmarks;
    use rouge_core::color::{hue_distance, rgb_to_hsl};
    use rouge_core::shades;
    use rouge_hw::Frame;

    const W: u32 = 64;
    const H: u32 = 48;

    fn compositor(every_n: u32) -> Compositor {
        let performance = PerformanceConfig {
            colorize_every_n_frames: every_n,
            ..PerformanceConfig::default()
        };
        Compositor::new(
            Viewport::new(W, H, 1.0, 2.0),
            SmoothingParams::default(),
            VisualConfig::default(),
            performance,
        )
    }

    fn gray() -> Frame {
        Frame::solid(W, H, [128, 128, 128, 255], 1)
    }

    fn scarlet() -> Shade {
        shades::lookup("Scarlet Siren").unwrap()
    }

    #[test]
    fn test_no_frame_is_not_presented() {
        let mut comp = compositor(1);
        let report = comp.compose(None, &scarlet());
        assert!(!report.presented);
        assert_eq!(comp.frames_presented(), 0);
        assert!(comp.buffers().front().pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn test_transparent_shade_leaves_camera_untouched() {
        let frame = gray();

        let mut bare = compositor(1);
        bare.accept_results(Some(mouth_landmarks(0.5, 0.5, 0.25, 0.15)));
        let report = bare.compose(Some(&frame.view()), &Shade::bare());
        assert_eq!(report.source, Some(DrawSource::Smoothed));
        assert!(!report.recolored);

        let mut untracked = compositor(1);
        untracked.compose(Some(&frame.view()), &scarlet());

        assert_eq!(
            bare.buffers().front().as_raw(),
            untracked.buffers().front().as_raw(),
            "bare lips render exactly the camera frame"
        );
        assert_eq!(bare.frame_counter(), 0);
    }

    #[test]
    fn test_recolor_region_matches_target_hue() {
        let mut back = RgbaImage::from_pixel(4, 4, image::Rgba([128, 128, 128, 255]));
        let mut mask = MaskBuffer::new(4, 4);
        mask.begin(2, 2);
        mask.as_mut_slice().fill(1.0);
        let target = rgb_to_hsl(0xB8, 0x22, 0x29);
        let rect = PixelRect {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
        };

        recolor_region(&mut back, &mask, rect, target, &VisualConfig::default());

        let [r, g, b, a] = back.get_pixel(1, 1).0;
        let hsl = rgb_to_hsl(r, g, b);
        assert!(hue_distance(hsl.h, target.h) < 0.01, "hue {} vs {}", hsl.h, target.h);
        assert!((hsl.l - 128.0 / 255.0).abs() < 0.02, "lightness kept: {}", hsl.l);
        assert_eq!(a, 255);
        assert_eq!(back.get_pixel(0, 0).0, [128, 128, 128, 255], "outside rect");
        assert_eq!(back.get_pixel(3, 3).0, [128, 128, 128, 255], "outside rect");
    }

    #[test]
    fn test_recolor_region_skips_empty_mask() {
        let mut back = RgbaImage::from_pixel(2, 2, image::Rgba([90, 60, 30, 255]));
        let mut mask = MaskBuffer::new(2, 2);
        mask.begin(2, 2);
        mask.as_mut_slice().fill(0.005);
        let before = back.clone();
        let rect = PixelRect {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
        };
        recolor_region(&mut back, &mask, rect, rgb_to_hsl(200, 0, 0), &VisualConfig::default());
        assert_eq!(back, before);
    }

    #[test]
    fn test_scarlet_lips_take_target_hue() {
        let mut comp = compositor(1);
        comp.accept_results(Some(mouth_landmarks(0.5, 0.5, 0.25, 0.15)));
        let report = comp.compose(Some(&gray().view()), &scarlet());
        assert!(report.recolored);

        let target = rgb_to_hsl(0xB8, 0x22, 0x29);
        // Upper lip body, between the outer and inner contours.
        let [r, g, b, _] = comp.buffers().front().get_pixel(32, 19).0;
        let hsl = rgb_to_hsl(r, g, b);
        assert!(hue_distance(hsl.h, target.h) < 0.02, "hue {} vs {}", hsl.h, target.h);
        assert!(hsl.s > 0.3, "saturation {}", hsl.s);
        assert!((hsl.l - 0.5).abs() < 0.1, "lightness {}", hsl.l);

        // Open mouth and skin are untouched.
        assert_eq!(comp.buffers().front().get_pixel(32, 24).0, [128, 128, 128, 255]);
        assert_eq!(comp.buffers().front().get_pixel(2, 2).0, [128, 128, 128, 255]);
    }

    #[test]
    fn test_last_known_good_after_face_lost() {
        let mut comp = compositor(1);
        comp.accept_results(Some(mouth_landmarks(0.5, 0.5, 0.25, 0.15)));
        comp.compose(Some(&gray().view()), &scarlet());

        comp.accept_results(None);
        let report = comp.compose(Some(&gray().view()), &scarlet());
        assert_eq!(report.source, Some(DrawSource::LastKnownGood));
        assert!(report.recolored, "overlay keeps rendering from memory");
    }

    #[test]
    fn test_never_tracked_draws_camera_only() {
        let mut comp = compositor(1);
        let report = comp.compose(Some(&gray().view()), &scarlet());
        assert!(report.presented && report.drew_camera);
        assert_eq!(report.source, None);
        assert!(!report.recolored);
    }

    #[test]
    fn test_colorize_every_n_frames() {
        let mut comp = compositor(3);
        comp.accept_results(Some(mouth_landmarks(0.5, 0.5, 0.25, 0.15)));
        let recolored: Vec<bool> = (0..6)
            .map(|_| comp.compose(Some(&gray().view()), &scarlet()).recolored)
            .collect();
        assert_eq!(recolored, vec![true, false, false, true, false, false]);
        assert_eq!(comp.frame_counter(), 6);
    }

    #[test]
    fn test_rings_are_mirror_images() {
        let landmarks = mouth_landmarks(0.3, 0.5, 0.1, 0.05);
        let display =
            LipRings::project(&landmarks, 100.0, 50.0, CoordinateSpace::MirroredDisplay, 1).unwrap();
        let pixels =
            LipRings::project(&landmarks, 100.0, 50.0, CoordinateSpace::BufferPixels, 1).unwrap();
        assert_eq!(display.outer.len(), 42, "21 points doubled by one Chaikin pass");
        for (d, p) in display.outer.iter().zip(&pixels.outer) {
            assert!((d.x - (100.0 - p.x)).abs() < 1e-3);
            assert!((d.y - p.y).abs() < 1e-6);
        }

        // Both land on the same device pixels.
        let vp = Viewport::new(100, 50, 2.0, 2.0);
        let a = display.device_path(&vp).bounding_box();
        let b = pixels.device_path(&vp).bounding_box();
        assert!((a.x - b.x).abs() < 1e-2 && (a.width - b.width).abs() < 1e-2);
    }

    #[test]
    fn test_rings_agree_at_fractional_pixel_ratio() {
        // 101 × 1.5 = 151.5 floors to a 151 px wide buffer.
        let vp = Viewport::new(101, 50, 1.5, 2.0);
        assert_eq!(vp.device_width(), 151);
        let (w, h) = vp.drawing_size();
        assert!((w - 151.0 / 1.5).abs() < 1e-4);

        let landmarks = mouth_landmarks(0.3, 0.5, 0.1, 0.05);
        let display =
            LipRings::project(&landmarks, w, h, CoordinateSpace::MirroredDisplay, 1).unwrap();
        let pixels = LipRings::project(&landmarks, w, h, CoordinateSpace::BufferPixels, 1).unwrap();
        let a = display.device_path(&vp);
        let b = pixels.device_path(&vp);
        for (pa, pb) in a.subpaths().iter().flatten().zip(b.subpaths().iter().flatten()) {
            assert!((pa.x - pb.x).abs() < 1e-3, "{} vs {}", pa.x, pb.x);
            assert!((pa.y - pb.y).abs() < 1e-3);
        }
    }

    #[test]
    fn test_rings_need_full_mesh() {
        let short = LandmarkSet::new(vec![rouge_core::Landmark::default(); 100]);
        assert!(LipRings::project(&short, 10.0, 10.0, CoordinateSpace::BufferPixels, 1).is_none());
    }

    #[test]
    fn test_recolor_rect_padding_and_clamp() {
        let vp = Viewport::new(100, 100, 2.0, 2.0);
        let outer = [Point::new(20.0, 30.0), Point::new(70.0, 50.0)];
        // bbox 50×20 → pad round(2.0) = 2
        let rect = recolor_rect(&outer, &vp, 8.0).unwrap();
        assert_eq!((rect.x, rect.y), (36, 56));
        assert_eq!((rect.width, rect.height), (108, 48));

        let edge = [Point::new(95.0, 95.0), Point::new(99.0, 99.0)];
        let rect = recolor_rect(&edge, &vp, 8.0).unwrap();
        assert!(rect.x + rect.width <= 200 && rect.y + rect.height <= 200);

        let outside = [Point::new(150.0, 150.0), Point::new(160.0, 160.0)];
        assert!(recolor_rect(&outside, &vp, 8.0).is_none());
    }
}
