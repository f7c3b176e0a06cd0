//! Polygon helpers for lip silhouettes: Chaikin smoothing, bounding boxes,
//! and two-ring compound paths filled with the even-odd rule.

/// Upper bound for [`smooth_polyline`]; each iteration doubles the point count.
pub const MAX_SMOOTHING_ITERATIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn lerp(self, other: Point, t: f32) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Axis-aligned box in the same units as the points it was computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn max_x(&self) -> f32 {
        self.x + self.width
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.height
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.max_x() && p.y >= self.y && p.y <= self.max_y()
    }

    /// Grow the box by `pad` on every side.
    pub fn expand(&self, pad: f32) -> BoundingBox {
        BoundingBox {
            x: self.x - pad,
            y: self.y - pad,
            width: self.width + pad * 2.0,
            height: self.height + pad * 2.0,
        }
    }
}

/// Integer pixel rectangle, always non-empty and inside its raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Smallest pixel rectangle covering `bbox`, clamped to a `bounds_w × bounds_h`
    /// raster. `None` when the box lies entirely outside.
    pub fn covering(bbox: &BoundingBox, bounds_w: u32, bounds_h: u32) -> Option<PixelRect> {
        let x0 = bbox.x.floor().max(0.0);
        let y0 = bbox.y.floor().max(0.0);
        let x1 = bbox.max_x().ceil().min(bounds_w as f32);
        let y1 = bbox.max_y().ceil().min(bounds_h as f32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Chaikin corner cutting over a closed loop.
///
/// Each edge `p0 → p1` contributes the points at 1/4 and 3/4 along it, so one
/// iteration turns N points into 2N. `iterations` is capped at
/// [`MAX_SMOOTHING_ITERATIONS`].
pub fn smooth_polyline(points: &[Point], iterations: usize) -> Vec<Point> {
    let mut pts = points.to_vec();
    if pts.len() < 2 {
        return pts;
    }
    for _ in 0..iterations.min(MAX_SMOOTHING_ITERATIONS) {
        let n = pts.len();
        let mut out = Vec::with_capacity(n * 2);
        for i in 0..n {
            let p0 = pts[i];
            let p1 = pts[(i + 1) % n];
            out.push(p0.lerp(p1, 0.25));
            out.push(p0.lerp(p1, 0.75));
        }
        pts = out;
    }
    pts
}

/// Minimal axis-aligned box containing `points`; width and height are at least 1.
pub fn compute_bounding_box(points: &[Point]) -> BoundingBox {
    if points.is_empty() {
        return BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        };
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    BoundingBox {
        x: min_x,
        y: min_y,
        width: (max_x - min_x).max(1.0),
        height: (max_y - min_y).max(1.0),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillRule {
    EvenOdd,
    NonZero,
}

/// A fillable region made of closed subpaths.
///
/// Built from an outer ring and an optional inner ring; with
/// [`FillRule::EvenOdd`] the inner ring cuts a hole (the open mouth).
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundPath {
    subpaths: Vec<Vec<Point>>,
    fill_rule: FillRule,
}

impl CompoundPath {
    pub fn from_rings(outer: Vec<Point>, inner: Option<Vec<Point>>) -> Self {
        let mut subpaths = vec![outer];
        if let Some(inner) = inner.filter(|ring| !ring.is_empty()) {
            subpaths.push(inner);
        }
        Self {
            subpaths,
            fill_rule: FillRule::EvenOdd,
        }
    }

    pub fn subpaths(&self) -> &[Vec<Point>] {
        &self.subpaths
    }

    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    /// Every edge of every subpath, including the closing edge.
    pub fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        self.subpaths.iter().flat_map(|ring| {
            let n = ring.len();
            (0..n).map(move |i| (ring[i], ring[(i + 1) % n]))
        })
    }

    /// Apply a coordinate transform to every vertex.
    pub fn map(&self, f: impl Fn(Point) -> Point) -> CompoundPath {
        CompoundPath {
            subpaths: self
                .subpaths
                .iter()
                .map(|ring| ring.iter().copied().map(&f).collect())
                .collect(),
            fill_rule: self.fill_rule,
        }
    }

    pub fn translate(&self, dx: f32, dy: f32) -> CompoundPath {
        self.map(|p| Point::new(p.x + dx, p.y + dy))
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let all: Vec<Point> = self.subpaths.iter().flatten().copied().collect();
        compute_bounding_box(&all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f32) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ]
    }

    #[test]
    fn test_smooth_doubles_point_count() {
        let pts = square(10.0);
        assert_eq!(smooth_polyline(&pts, 1).len(), 8);
        assert_eq!(smooth_polyline(&pts, 2).len(), 16);
        assert_eq!(smooth_polyline(&pts, 0), pts);
    }

    #[test]
    fn test_smooth_quarter_points() {
        let out = smooth_polyline(&square(4.0), 1);
        assert_eq!(out[0], Point::new(1.0, 0.0));
        assert_eq!(out[1], Point::new(3.0, 0.0));
        // Closing edge (0,4) → (0,0)
        assert_eq!(out[7], Point::new(0.0, 1.0));
    }

    #[test]
    fn test_smooth_stays_inside_original_bbox() {
        let pts = vec![
            Point::new(12.0, 40.0),
            Point::new(30.0, 22.0),
            Point::new(55.0, 20.0),
            Point::new(80.0, 38.0),
            Point::new(50.0, 61.0),
        ];
        let original = compute_bounding_box(&pts).expand(0.5);
        for p in smooth_polyline(&pts, 1) {
            assert!(original.contains(p), "{p:?} escaped {original:?}");
        }
    }

    #[test]
    fn test_smooth_iterations_capped() {
        let out = smooth_polyline(&square(1.0), 100);
        assert_eq!(out.len(), 4 << MAX_SMOOTHING_ITERATIONS);
    }

    #[test]
    fn test_bbox_minimum_size() {
        let b = compute_bounding_box(&[Point::new(5.0, 5.0)]);
        assert_eq!((b.width, b.height), (1.0, 1.0));

        let b = compute_bounding_box(&[Point::new(0.0, 2.0), Point::new(10.0, 2.0)]);
        assert_eq!((b.x, b.y, b.width, b.height), (0.0, 2.0, 10.0, 1.0));
    }

    #[test]
    fn test_compound_path_rings() {
        let path = CompoundPath::from_rings(square(10.0), Some(square(2.0)));
        assert_eq!(path.subpaths().len(), 2);
        assert_eq!(path.fill_rule(), FillRule::EvenOdd);
        assert_eq!(path.edges().count(), 8);

        let solid = CompoundPath::from_rings(square(10.0), Some(Vec::new()));
        assert_eq!(solid.subpaths().len(), 1);
    }

    #[test]
    fn test_compound_path_translate() {
        let path = CompoundPath::from_rings(square(2.0), None).translate(3.0, -1.0);
        let b = path.bounding_box();
        assert_eq!((b.x, b.y, b.width, b.height), (3.0, -1.0, 2.0, 2.0));
    }

    #[test]
    fn test_pixel_rect_covering_clamps() {
        let b = BoundingBox { x: -3.5, y: 2.2, width: 10.0, height: 4.0 };
        let r = PixelRect::covering(&b, 5, 100).unwrap();
        assert_eq!(r, PixelRect { x: 0, y: 2, width: 5, height: 5 });

        let outside = BoundingBox { x: 50.0, y: 0.0, width: 4.0, height: 4.0 };
        assert!(PixelRect::covering(&outside, 10, 10).is_none());
    }
}
