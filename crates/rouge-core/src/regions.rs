//! Face-mesh index tables for the lip contours.
//!
//! Upper rings run from the left mouth corner to the right one; lower rings
//! run the same direction, so a closed ring is upper followed by reversed lower.

pub const UPPER_LIP_OUTER: [usize; 11] = [61, 185, 40, 39, 37, 0, 267, 269, 270, 409, 291];
pub const LOWER_LIP_OUTER: [usize; 10] = [146, 91, 181, 84, 17, 314, 405, 321, 375, 291];
pub const UPPER_LIP_INNER: [usize; 11] = [78, 191, 80, 81, 82, 13, 312, 311, 310, 415, 308];
pub const LOWER_LIP_INNER: [usize; 10] = [95, 88, 178, 87, 14, 317, 402, 318, 324, 308];

/// Highest index referenced by any lip table.
pub const MAX_LIP_INDEX: usize = 415;

/// Whether `index` belongs to any lip contour. These indices get
/// velocity-adaptive smoothing.
pub fn is_lip_index(index: usize) -> bool {
    UPPER_LIP_OUTER.contains(&index)
        || LOWER_LIP_OUTER.contains(&index)
        || UPPER_LIP_INNER.contains(&index)
        || LOWER_LIP_INNER.contains(&index)
}

/// Outer silhouette: upper-outer then lower-outer reversed.
pub fn outer_ring_indices() -> Vec<usize> {
    closed_ring(&UPPER_LIP_OUTER, &LOWER_LIP_OUTER)
}

/// Mouth opening: upper-inner then lower-inner reversed.
pub fn inner_ring_indices() -> Vec<usize> {
    closed_ring(&UPPER_LIP_INNER, &LOWER_LIP_INNER)
}

fn closed_ring(upper: &[usize], lower: &[usize]) -> Vec<usize> {
    upper.iter().chain(lower.iter().rev()).copied().collect()
}

/// Dense lookup table for [`is_lip_index`], sized to cover every lip index.
pub fn lip_index_mask(len: usize) -> Vec<bool> {
    (0..len).map(is_lip_index).collect()
}
