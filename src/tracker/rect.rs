use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, stored as top-left plus extent.
///
/// The Kalman filter works on `[cx, cy, aspect, height]` (see [`Rect::to_xyah`]);
/// detectors usually emit corner pairs (see [`Rect::from_tlbr`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    #[inline]
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Box spanning the corners `(x1, y1)` and `(x2, y2)`.
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    /// Inverse of [`Rect::to_xyah`].
    #[inline]
    pub fn from_xyah(cx: f32, cy: f32, aspect: f32, height: f32) -> Self {
        let width = aspect * height;
        Self::new(cx - width * 0.5, cy - height * 0.5, width, height)
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Center x, center y, width/height ratio and height. A flat box has ratio 0.
    #[inline]
    pub fn to_xyah(&self) -> [f32; 4] {
        let (cx, cy) = self.center();
        let aspect = if self.height > 0.0 { self.width / self.height } else { 0.0 };
        [cx, cy, aspect, self.height]
    }

    #[inline]
    pub fn center(&self) -> (f32, f32) {
        self.reference_point([0.5, 0.5])
    }

    /// Point at `(fx, fy)` of the box extent; `(0.5, 1.0)` is bottom-center.
    #[inline]
    pub fn reference_point(&self, factor: [f32; 2]) -> (f32, f32) {
        (self.x + self.width * factor[0], self.y + self.height * factor[1])
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Finite coordinates and strictly positive extent.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height].iter().all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Intersection over union; 0 when the boxes are disjoint or both empty.
    pub fn iou(&self, other: &Rect) -> f32 {
        let iw = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let ih = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter = iw * ih;
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}
