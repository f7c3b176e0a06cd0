//! Software rasterization for the overlay: anti-aliased polygon fill into a
//! [`MaskBuffer`], box-blur feathering, and the mirrored camera blit.

use crate::buffers::MaskBuffer;
use image::RgbaImage;
use rouge_core::{CompoundPath, FillRule, RgbaView};

/// Blur passes per axis. Two box passes approximate a triangle filter.
const FEATHER_PASSES: usize = 2;

/// Scanline rasterizer with reusable scratch storage.
#[derive(Debug, Default)]
pub struct Rasterizer {
    crossings: Vec<(f32, i32)>,
    line: Vec<f32>,
    blurred: Vec<f32>,
}

impl Rasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate coverage of `path` into `mask`, honoring its fill rule.
    ///
    /// Each pixel row is sampled at `samples` sub-scanlines; along a
    /// scanline, partially covered pixels receive fractional coverage.
    pub fn fill(&mut self, mask: &mut MaskBuffer, path: &CompoundPath, samples: usize) {
        let (w, h) = (mask.width() as usize, mask.height() as usize);
        if w == 0 || h == 0 {
            return;
        }
        let samples = samples.max(1);
        let weight = 1.0 / samples as f32;
        let rule = path.fill_rule();
        let data = mask.as_mut_slice();

        for row in 0..h {
            for s in 0..samples {
                let sy = row as f32 + (s as f32 + 0.5) * weight;

                self.crossings.clear();
                for (a, b) in path.edges() {
                    let (top, bottom, dir) = if a.y <= b.y { (a, b, 1) } else { (b, a, -1) };
                    if sy < top.y || sy >= bottom.y {
                        continue;
                    }
                    let t = (sy - top.y) / (bottom.y - top.y);
                    self.crossings.push((top.x + (bottom.x - top.x) * t, dir));
                }
                if self.crossings.len() < 2 {
                    continue;
                }
                self.crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

                let out = &mut data[row * w..(row + 1) * w];
                let mut winding = 0;
                let mut span_start = 0.0;
                for &(x, dir) in &self.crossings {
                    let was_inside = inside(rule, winding);
                    winding += dir;
                    let now_inside = inside(rule, winding);
                    if !was_inside && now_inside {
                        span_start = x;
                    } else if was_inside && !now_inside {
                        add_span(out, span_start, x, weight);
                    }
                }
            }
        }

        for v in data.iter_mut() {
            *v = v.min(1.0);
        }
    }

    /// Soften mask edges with a separable box blur of `radius` pixels.
    /// Outside the mask counts as zero coverage.
    pub fn feather(&mut self, mask: &mut MaskBuffer, radius: usize) {
        let (w, h) = (mask.width() as usize, mask.height() as usize);
        if radius == 0 || w == 0 || h == 0 {
            return;
        }
        let data = mask.as_mut_slice();

        for _ in 0..FEATHER_PASSES {
            for row in data.chunks_exact_mut(w) {
                self.line.clear();
                self.line.extend_from_slice(row);
                box_blur(&self.line, &mut self.blurred, radius);
                row.copy_from_slice(&self.blurred);
            }
            for col in 0..w {
                self.line.clear();
                self.line.extend((0..h).map(|y| data[y * w + col]));
                box_blur(&self.line, &mut self.blurred, radius);
                for (y, &v) in self.blurred.iter().enumerate() {
                    data[y * w + col] = v;
                }
            }
        }
    }
}

fn inside(rule: FillRule, winding: i32) -> bool {
    match rule {
        FillRule::EvenOdd => winding % 2 != 0,
        FillRule::NonZero => winding != 0,
    }
}

/// Add `weight × overlap` to every pixel the span `[x0, x1)` touches.
fn add_span(out: &mut [f32], x0: f32, x1: f32, weight: f32) {
    let w = out.len() as f32;
    let x0 = x0.max(0.0);
    let x1 = x1.min(w);
    if x1 <= x0 {
        return;
    }
    let first = x0.floor() as usize;
    let last = (x1.ceil() as usize).min(out.len());
    for (px, cell) in out.iter_mut().enumerate().take(last).skip(first) {
        let left = (px as f32).max(x0);
        let right = (px as f32 + 1.0).min(x1);
        if right > left {
            *cell += (right - left) * weight;
        }
    }
}

/// Sliding-window mean over `[i - radius, i + radius]`, zero-padded.
fn box_blur(src: &[f32], out: &mut Vec<f32>, radius: usize) {
    let n = src.len();
    out.clear();
    out.resize(n, 0.0);
    let norm = 1.0 / (2 * radius + 1) as f32;

    let mut sum: f32 = src[..(radius + 1).min(n)].iter().sum();
    for i in 0..n {
        out[i] = sum * norm;
        if i + radius + 1 < n {
            sum += src[i + radius + 1];
        }
        if i >= radius {
            sum -= src[i - radius];
        }
    }
}

/// Feather radius in device pixels for a CSS-pixel feather at `dpr`.
pub fn feather_radius(feather_px: f32, dpr: f32) -> usize {
    ((feather_px * dpr).round() as usize).max(1)
}

#[derive(Debug, Clone, Copy)]
struct Tap {
    i0: usize,
    i1: usize,
    t: f32,
}

fn taps_for(dst_len: u32, src_len: u32, mirrored: bool, out: &mut Vec<Tap>) {
    out.clear();
    let scale = src_len as f32 / dst_len as f32;
    let max = src_len.saturating_sub(1) as f32;
    for d in 0..dst_len {
        let pos = if mirrored { dst_len - 1 - d } else { d };
        let s = ((pos as f32 + 0.5) * scale - 0.5).clamp(0.0, max);
        let i0 = s.floor() as usize;
        let i1 = (i0 + 1).min(src_len.saturating_sub(1) as usize);
        out.push(Tap {
            i0,
            i1,
            t: s - i0 as f32,
        });
    }
}

/// Draws a camera frame into a buffer, scaled bilinearly and mirrored
/// horizontally. Column and row taps are cached per size pair.
#[derive(Debug, Default)]
pub struct MirrorBlit {
    key: Option<(u32, u32, u32, u32)>,
    columns: Vec<Tap>,
    rows: Vec<Tap>,
}

impl MirrorBlit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn draw(&mut self, src: &RgbaView<'_>, dst: &mut RgbaImage) {
        let (dw, dh) = dst.dimensions();
        if src.width == 0 || src.height == 0 || dw == 0 || dh == 0 {
            return;
        }
        let key = (src.width, src.height, dw, dh);
        if self.key != Some(key) {
            taps_for(dw, src.width, true, &mut self.columns);
            taps_for(dh, src.height, false, &mut self.rows);
            self.key = Some(key);
        }

        let src_stride = src.width as usize * 4;
        let out: &mut [u8] = dst;
        for (row_tap, out_row) in self.rows.iter().zip(out.chunks_exact_mut(dw as usize * 4)) {
            let r0 = &src.data[row_tap.i0 * src_stride..(row_tap.i0 + 1) * src_stride];
            let r1 = &src.data[row_tap.i1 * src_stride..(row_tap.i1 + 1) * src_stride];
            let ty = row_tap.t;
            for (col, px) in self.columns.iter().zip(out_row.chunks_exact_mut(4)) {
                let (a, b) = (col.i0 * 4, col.i1 * 4);
                let tx = col.t;
                for c in 0..4 {
                    let top = r0[a + c] as f32 * (1.0 - tx) + r0[b + c] as f32 * tx;
                    let bottom = r1[a + c] as f32 * (1.0 - tx) + r1[b + c] as f32 * tx;
                    px[c] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}
