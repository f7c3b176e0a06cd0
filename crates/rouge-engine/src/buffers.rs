//! Double-buffered presentation surfaces and the reusable mask raster.

use image::RgbaImage;

/// Smallest device-pixel dimension a buffer is allowed to have.
const MIN_DEVICE_PX: u32 = 2;

/// Display geometry: CSS size plus the (capped) device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub css_width: u32,
    pub css_height: u32,
    pub device_pixel_ratio: f32,
}

impl Viewport {
    /// `requested_dpr` falls back to 1.0 when unusable and is capped at `dpr_limit`.
    pub fn new(css_width: u32, css_height: u32, requested_dpr: f32, dpr_limit: f32) -> Self {
        let dpr = if requested_dpr.is_finite() && requested_dpr > 0.0 {
            requested_dpr
        } else {
            1.0
        };
        Self {
            css_width,
            css_height,
            device_pixel_ratio: dpr.min(dpr_limit),
        }
    }

    pub fn device_width(&self) -> u32 {
        device_px(self.css_width, self.device_pixel_ratio)
    }

    pub fn device_height(&self) -> u32 {
        device_px(self.css_height, self.device_pixel_ratio)
    }

    pub fn device_size(&self) -> (u32, u32) {
        (self.device_width(), self.device_height())
    }

    /// CSS size the device buffer actually covers: `device / dpr`. Differs
    /// from `css_width`/`css_height` when `css × dpr` is fractional.
    pub fn drawing_size(&self) -> (f32, f32) {
        let dpr = self.device_pixel_ratio;
        (
            self.device_width() as f32 / dpr,
            self.device_height() as f32 / dpr,
        )
    }

    /// Same CSS size at a new pixel ratio.
    pub fn with_dpr(&self, requested_dpr: f32, dpr_limit: f32) -> Self {
        Self::new(self.css_width, self.css_height, requested_dpr, dpr_limit)
    }
}

fn device_px(css: u32, dpr: f32) -> u32 {
    ((css as f32 * dpr).floor() as u32).max(MIN_DEVICE_PX)
}

/// Coverage raster in `[0, 1]`.
///
/// Storage is sized for the whole device grid once; each pass views a
/// sub-rectangle of it via [`MaskBuffer::begin`], so per-frame masks never
/// allocate.
#[derive(Debug, Clone)]
pub struct MaskBuffer {
    data: Vec<f32>,
    capacity_width: u32,
    capacity_height: u32,
    width: u32,
    height: u32,
}

impl MaskBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            data: vec![0.0; width as usize * height as usize],
            capacity_width: width,
            capacity_height: height,
            width,
            height,
        }
    }

    /// Start a new mask of `width × height`, cleared to zero. Dimensions are
    /// clamped to the storage grid.
    pub fn begin(&mut self, width: u32, height: u32) {
        self.width = width.min(self.capacity_width);
        self.height = height.min(self.capacity_height);
        let len = self.len();
        self.data[..len].fill(0.0);
    }

    fn resize_storage(&mut self, width: u32, height: u32) {
        self.data.clear();
        self.data.resize(width as usize * height as usize, 0.0);
        self.capacity_width = width;
        self.capacity_height = height;
        self.width = width;
        self.height = height;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn capacity(&self) -> (u32, u32) {
        (self.capacity_width, self.capacity_height)
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Coverage at `(x, y)`; zero outside the current view.
    pub fn get(&self, x: u32, y: u32) -> f32 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// Current view, row-major with stride `width()`.
    pub fn as_slice(&self) -> &[f32] {
        &self.data[..self.len()]
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        let len = self.len();
        &mut self.data[..len]
    }
}

/// Back (working) and front (presented) surfaces plus the mask raster, all
/// at device-pixel resolution and resized together.
pub struct FrameBuffers {
    back: RgbaImage,
    front: RgbaImage,
    mask: MaskBuffer,
    viewport: Viewport,
}

impl FrameBuffers {
    pub fn new(viewport: Viewport) -> Self {
        let (w, h) = viewport.device_size();
        Self {
            back: RgbaImage::new(w, h),
            front: RgbaImage::new(w, h),
            mask: MaskBuffer::new(w, h),
            viewport,
        }
    }

    /// Reallocate for a new viewport. Returns `false` when the device size is
    /// unchanged (the viewport is still updated).
    pub fn resize(&mut self, viewport: Viewport) -> bool {
        let old = self.dims();
        self.viewport = viewport;
        let (w, h) = viewport.device_size();
        if (w, h) == old {
            return false;
        }
        self.back = RgbaImage::new(w, h);
        self.front = RgbaImage::new(w, h);
        self.mask.resize_storage(w, h);
        tracing::info!(
            width = w,
            height = h,
            dpr = viewport.device_pixel_ratio,
            "buffers resized"
        );
        true
    }

    /// Copy the finished back buffer to the front in one operation.
    pub fn present(&mut self) {
        let front: &mut [u8] = &mut self.front;
        front.copy_from_slice(self.back.as_raw());
    }

    pub fn dims(&self) -> (u32, u32) {
        self.back.dimensions()
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn back(&self) -> &RgbaImage {
        &self.back
    }

    pub fn back_mut(&mut self) -> &mut RgbaImage {
        &mut self.back
    }

    pub fn front(&self) -> &RgbaImage {
        &self.front
    }

    /// Back buffer and mask, borrowed together for a pixel pass.
    pub fn layers_mut(&mut self) -> (&mut RgbaImage, &mut MaskBuffer) {
        (&mut self.back, &mut self.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_dpr_capped() {
        let vp = Viewport::new(640, 480, 3.0, 2.0);
        assert_eq!(vp.device_pixel_ratio, 2.0);
        assert_eq!(vp.device_size(), (1280, 960));
    }

    #[test]
    fn test_viewport_bad_dpr_defaults_to_one() {
        assert_eq!(Viewport::new(10, 10, 0.0, 2.0).device_pixel_ratio, 1.0);
        assert_eq!(Viewport::new(10, 10, f32::NAN, 2.0).device_pixel_ratio, 1.0);
    }

    #[test]
    fn test_viewport_minimum_size() {
        let vp = Viewport::new(0, 1, 1.0, 2.0);
        assert_eq!(vp.device_size(), (2, 2));
    }

    #[test]
    fn test_fractional_dpr_floors() {
        let vp = Viewport::new(101, 51, 1.5, 2.0);
        assert_eq!(vp.device_size(), (151, 76));
    }

    #[test]
    fn test_resize_keeps_layers_in_step() {
        let mut buffers = FrameBuffers::new(Viewport::new(4, 4, 1.0, 2.0));
        assert!(!buffers.resize(Viewport::new(4, 4, 1.0, 2.0)));

        assert!(buffers.resize(Viewport::new(8, 6, 2.0, 2.0)));
        assert_eq!(buffers.dims(), (16, 12));
        assert_eq!(buffers.front().dimensions(), (16, 12));
        let (_, mask) = buffers.layers_mut();
        assert_eq!(mask.capacity(), (16, 12));
    }

    #[test]
    fn test_present_copies_back_to_front() {
        let mut buffers = FrameBuffers::new(Viewport::new(3, 2, 1.0, 2.0));
        buffers.back_mut().put_pixel(1, 1, image::Rgba([9, 8, 7, 255]));
        assert_eq!(buffers.front().get_pixel(1, 1).0, [0, 0, 0, 0]);

        buffers.present();
        assert_eq!(buffers.front().get_pixel(1, 1).0, [9, 8, 7, 255]);
        assert_eq!(buffers.front().as_raw(), buffers.back().as_raw());
    }

    #[test]
    fn test_mask_begin_clears_view() {
        let mut mask = MaskBuffer::new(4, 4);
        mask.as_mut_slice().fill(1.0);
        mask.begin(2, 3);
        assert_eq!(mask.width(), 2);
        assert_eq!(mask.height(), 3);
        assert!(mask.as_slice().iter().all(|&v| v == 0.0));
        assert_eq!(mask.get(5, 0), 0.0);

        mask.begin(10, 10);
        assert_eq!((mask.width(), mask.height()), (4, 4));
    }
}
