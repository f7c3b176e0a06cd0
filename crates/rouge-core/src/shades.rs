//! Built-in shade catalog. Index 0 is "N/A" (bare lips).

use crate::types::Shade;

const CATALOG: [(u32, &str, &str); 24] = [
    (0, "N/A", "transparent"),
    (1, "Scarlet Siren", "#B82229"),
    (2, "Rouge Eternelle", "#8D1D27"),
    (3, "Power Play", "#631820"),
    (4, "Spiced Silk", "#A64D3E"),
    (5, "Bare Bloom", "#D18A68"),
    (6, "Peach Tantra", "#F2A36E"),
    (7, "Rose Flame", "#C95A6C"),
    (8, "Whisper Nude", "#C79082"),
    (9, "Bloom Creme", "#D24E71"),
    (10, "Berry Amour", "#8A3832"),
    (11, "Cinnamon Saffron", "#B64A29"),
    (12, "Oud Royale", "#431621"),
    (13, "Velvet Crush", "#C22A2D"),
    (14, "Spiced Ember", "#A03529"),
    (15, "Creme Blush", "#CF5F4C"),
    (16, "Caramel Eclair", "#C77444"),
    (17, "Rose Fantasy", "#C25D6A"),
    (18, "Mauve Memoir", "#A86267"),
    (19, "Rouge Mistral", "#94373F"),
    (20, "Flushed Fig", "#9A4140"),
    (21, "Terracotta Dream", "#C5552F"),
    (22, "Nude Myth", "#AF705A"),
    (23, "Runway Rani", "#D13864"),
];

/// The full catalog in display order.
pub fn catalog() -> Vec<Shade> {
    CATALOG
        .iter()
        .map(|&(id, name, color)| Shade::new(id, name, color))
        .collect()
}

pub fn find_by_id(id: u32) -> Option<Shade> {
    CATALOG
        .iter()
        .find(|(shade_id, _, _)| *shade_id == id)
        .map(|&(id, name, color)| Shade::new(id, name, color))
}

/// Case-insensitive name lookup.
pub fn find_by_name(name: &str) -> Option<Shade> {
    CATALOG
        .iter()
        .find(|(_, shade_name, _)| shade_name.eq_ignore_ascii_case(name.trim()))
        .map(|&(id, name, color)| Shade::new(id, name, color))
}

/// Resolve a user-supplied selector: numeric id first, then name.
pub fn lookup(selector: &str) -> Option<Shade> {
    selector
        .trim()
        .parse::<u32>()
        .ok()
        .and_then(find_by_id)
        .or_else(|| find_by_name(selector))
}
