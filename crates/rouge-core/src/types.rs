use serde::{Deserialize, Serialize};

use crate::color::{self, Rgba};

/// Landmark count of the base face mesh.
pub const FACE_MESH_LANDMARKS: usize = 468;
/// Landmark count with iris refinement enabled.
pub const REFINED_FACE_MESH_LANDMARKS: usize = 478;

/// One tracked facial point. `x`/`y` are normalized to the frame size,
/// `z` is a relative depth estimate on roughly the same scale as `x`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// All landmarks of one face from one inference. Indices are stable
/// identities assigned by the tracker's model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet(Vec<Landmark>);

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self(points)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.0.get(index)
    }

    pub fn as_slice(&self) -> &[Landmark] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [Landmark] {
        &mut self.0
    }

    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Landmark> {
        self.0.iter()
    }
}

impl From<Vec<Landmark>> for LandmarkSet {
    fn from(points: Vec<Landmark>) -> Self {
        Self(points)
    }
}

/// Borrowed RGBA8 pixels, row-major, no row padding.
#[derive(Debug, Clone, Copy)]
pub struct RgbaView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
}

impl<'a> RgbaView<'a> {
    /// Returns `None` if `data` is too short for `width × height` pixels.
    pub fn new(data: &'a [u8], width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 || data.len() < width as usize * height as usize * 4 {
            return None;
        }
        Some(Self { data, width, height })
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }
}

/// A shade's color: a hex string or the "no color / bare lips" sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadeColor {
    None,
    Hex(String),
}

impl ShadeColor {
    pub fn parse(s: &str) -> Self {
        if s == color::TRANSPARENT {
            ShadeColor::None
        } else {
            ShadeColor::Hex(s.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ShadeColor::None => color::TRANSPARENT,
            ShadeColor::Hex(hex) => hex,
        }
    }
}

/// A lipstick shade from the catalog. Immutable once selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shade {
    pub id: u32,
    pub name: String,
    pub color: ShadeColor,
}

impl Shade {
    pub fn new(id: u32, name: impl Into<String>, color: &str) -> Self {
        Self {
            id,
            name: name.into(),
            color: ShadeColor::parse(color),
        }
    }

    /// The "N/A" shade: nothing is drawn over the lips.
    pub fn bare() -> Self {
        Self::new(0, "N/A", color::TRANSPARENT)
    }

    pub fn rgba(&self) -> Rgba {
        match &self.color {
            ShadeColor::None => Rgba::CLEAR,
            ShadeColor::Hex(hex) => color::hex_to_rgb(hex),
        }
    }

    pub fn is_bare(&self) -> bool {
        self.rgba().is_transparent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_shade_is_transparent() {
        assert!(Shade::bare().is_bare());
        assert_eq!(Shade::bare().color.as_str(), "transparent");
    }

    #[test]
    fn test_shade_rgba() {
        let s = Shade::new(1, "Scarlet Siren", "#B82229");
        assert_eq!(s.rgba(), Rgba { r: 0xB8, g: 0x22, b: 0x29, a: 255 });
        assert!(!s.is_bare());
    }

    #[test]
    fn test_landmark_set_json() {
        let set: LandmarkSet =
            serde_json::from_str(r#"[{"x":0.1,"y":0.2,"z":0.3},{"x":0.5,"y":0.5}]"#).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(1), Some(&Landmark::new(0.5, 0.5, 0.0)));
    }

    #[test]
    fn test_rgba_view_rejects_short_buffer() {
        assert!(RgbaView::new(&[0; 15], 2, 2).is_none());
        assert!(RgbaView::new(&[0; 16], 2, 2).is_some());
        assert!(RgbaView::new(&[], 0, 0).is_none());
    }
}
