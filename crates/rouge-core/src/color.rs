//! RGB ↔ HSL conversion and shade color parsing.
//!
//! The recolor pass keeps a pixel's lightness and swaps in the target
//! shade's hue and saturation, so both directions must round-trip within
//! integer rounding (±1 per channel).

/// Sentinel color string meaning "no color selected".
pub const TRANSPARENT: &str = "transparent";

/// Color returned when a hex string cannot be parsed.
pub const FALLBACK_RGBA: Rgba = Rgba { r: 200, g: 0, b: 0, a: 255 };

/// 8-bit RGB triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// 8-bit RGB plus alpha. Alpha is either 0 (the sentinel) or 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const CLEAR: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0 };

    /// True for the "no color" sentinel. Recoloring must be skipped entirely.
    pub fn is_transparent(&self) -> bool {
        self.a == 0
    }

    pub fn rgb(&self) -> Rgb {
        Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Hue, saturation, lightness, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

/// Parse `#RRGGBB` / `RRGGBB` (case-insensitive).
///
/// [`TRANSPARENT`] maps to [`Rgba::CLEAR`]. Anything else that is not six hex
/// digits yields [`FALLBACK_RGBA`] instead of an error, since this runs on the
/// per-frame path.
pub fn hex_to_rgb(hex: &str) -> Rgba {
    if hex == TRANSPARENT {
        return Rgba::CLEAR;
    }
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return FALLBACK_RGBA;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    match (channel(0), channel(2), channel(4)) {
        (Some(r), Some(g), Some(b)) => Rgba { r, g, b, a: 255 },
        _ => FALLBACK_RGBA,
    }
}

pub fn rgb_to_hsl(r: u8, g: u8, b: u8) -> Hsl {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;

    if max == min {
        return Hsl { h: 0.0, s: 0.0, l };
    }

    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if max == r {
        (g - b) / d + if g < b { 6.0 } else { 0.0 }
    } else if max == g {
        (b - r) / d + 2.0
    } else {
        (r - g) / d + 4.0
    };

    Hsl { h: h / 6.0, s, l }
}

pub fn hsl_to_rgb(h: f32, s: f32, l: f32) -> Rgb {
    let to_u8 = |v: f32| (v * 255.0).round().clamp(0.0, 255.0) as u8;

    if s == 0.0 {
        let v = to_u8(l);
        return Rgb { r: v, g: v, b: v };
    }

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;

    Rgb {
        r: to_u8(hue_to_channel(p, q, h + 1.0 / 3.0)),
        g: to_u8(hue_to_channel(p, q, h)),
        b: to_u8(hue_to_channel(p, q, h - 1.0 / 3.0)),
    }
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

/// Shortest distance between two hues on the unit circle.
pub fn hue_distance(a: f32, b: f32) -> f32 {
    let d = (a - b).abs() % 1.0;
    d.min(1.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Rgb, b: Rgb) {
        let diff = |x: u8, y: u8| (x as i16 - y as i16).abs();
        assert!(
            diff(a.r, b.r) <= 1 && diff(a.g, b.g) <= 1 && diff(a.b, b.b) <= 1,
            "{a:?} vs {b:?}"
        );
    }

    #[test]
    fn test_hex_parse_with_and_without_hash() {
        assert_eq!(hex_to_rgb("#B82229"), Rgba { r: 0xB8, g: 0x22, b: 0x29, a: 255 });
        assert_eq!(hex_to_rgb("b82229"), Rgba { r: 0xB8, g: 0x22, b: 0x29, a: 255 });
    }

    #[test]
    fn test_hex_transparent_sentinel() {
        let c = hex_to_rgb(TRANSPARENT);
        assert_eq!(c.a, 0);
        assert!(c.is_transparent());
    }

    #[test]
    fn test_hex_malformed_fails_closed() {
        for bad in ["", "#", "#12345", "#1234567", "#GG0000", "red", "#ßß00"] {
            assert_eq!(hex_to_rgb(bad), FALLBACK_RGBA, "input {bad:?}");
        }
    }

    #[test]
    fn test_grey_has_no_saturation() {
        let hsl = rgb_to_hsl(128, 128, 128);
        assert_eq!(hsl.s, 0.0);
        assert_eq!(hsl.h, 0.0);
        assert!((hsl.l - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_primary_hues() {
        assert!(rgb_to_hsl(255, 0, 0).h.abs() < 1e-6);
        assert!((rgb_to_hsl(0, 255, 0).h - 1.0 / 3.0).abs() < 1e-6);
        assert!((rgb_to_hsl(0, 0, 255).h - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_round_trip_within_one() {
        // Strided sweep over the cube plus every catalog-like extreme.
        for r in (0..=255u16).step_by(17) {
            for g in (0..=255u16).step_by(15) {
                for b in (0..=255u16).step_by(51) {
                    let (r, g, b) = (r as u8, g as u8, b as u8);
                    let hsl = rgb_to_hsl(r, g, b);
                    assert_close(hsl_to_rgb(hsl.h, hsl.s, hsl.l), Rgb { r, g, b });
                }
            }
        }
    }

    #[test]
    fn test_scarlet_siren_hue() {
        let c = hex_to_rgb("#B82229");
        let hsl = rgb_to_hsl(c.r, c.g, c.b);
        assert!((hsl.h - 0.992).abs() < 0.002, "h = {}", hsl.h);
        assert!((hsl.s - 0.688).abs() < 0.002, "s = {}", hsl.s);
    }

    #[test]
    fn test_hue_distance_wraps() {
        assert!((hue_distance(0.99, 0.01) - 0.02).abs() < 1e-6);
        assert!((hue_distance(0.25, 0.75) - 0.5).abs() < 1e-6);
    }
}
