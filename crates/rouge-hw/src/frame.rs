//! Frame type and pixel conversion: YUYV/RGB24 to RGBA8.

use rouge_core::RgbaView;

/// A captured color camera frame.
#[derive(Clone)]
pub struct Frame {
    /// RGBA8 pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u64,
}

impl Frame {
    /// Wrap RGBA8 pixels, validating the buffer length.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 4;
        if data.len() != expected || expected == 0 {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        })
    }

    /// A frame filled with one color. Handy for synthetic sources.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4], sequence: u64) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence,
        }
    }

    pub fn view(&self) -> RgbaView<'_> {
        RgbaView {
            data: &self.data,
            width: self.width,
            height: self.height,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Convert packed YUYV (4:2:2) to RGBA8 using BT.601 limited-range coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgba(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgba = Vec::with_capacity(pixels * 4);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for &y in &[chunk[0], chunk[2]] {
            let c = 1.164 * (y as f32 - 16.0);
            let r = c + 1.596 * v;
            let g = c - 0.392 * u - 0.813 * v;
            let b = c + 2.017 * u;
            rgba.extend_from_slice(&[clamp_u8(r), clamp_u8(g), clamp_u8(b), 255]);
        }
    }
    Ok(rgba)
}

/// Convert packed RGB24 to RGBA8.
pub fn rgb24_to_rgba(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 3;
    if rgb.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: rgb.len(),
        });
    }
    let mut rgba = Vec::with_capacity(pixels * 4);
    for px in rgb[..expected].chunks_exact(3) {
        rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
    }
    Ok(rgba)
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
