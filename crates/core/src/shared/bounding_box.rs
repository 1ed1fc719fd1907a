/// Axis-aligned box in frame pixels: top-left corner plus size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Builds a box from corner coordinates. Inverted corners yield a
    /// zero-sized box rather than a negative one.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x: x1,
            y: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Clips the box to `[0, frame_w - 1] × [0, frame_h - 1]`.
    ///
    /// NaN edges (e.g. `-inf + inf` from an overflowing box) clip to 0.
    pub fn clipped(&self, frame_w: u32, frame_h: u32) -> Self {
        let max_x = frame_w.saturating_sub(1) as f32;
        let max_y = frame_h.saturating_sub(1) as f32;
        let x1 = self.x.max(0.0).min(max_x);
        let y1 = self.y.max(0.0).min(max_y);
        let x2 = self.right().max(0.0).min(max_x);
        let y2 = self.bottom().max(0.0).min(max_y);
        Self::from_corners(x1, y1, x2, y2)
    }

    /// Intersection-over-union; 0 when the union is empty.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x.max(other.x);
        let iy1 = self.y.max(other.y);
        let ix2 = self.right().min(other.right());
        let iy2 = self.bottom().min(other.bottom());

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_from_corners() {
        let b = BoundingBox::from_corners(10.0, 20.0, 30.0, 60.0);
        assert_eq!(b, BoundingBox::new(10.0, 20.0, 20.0, 40.0));
    }

    #[test]
    fn test_from_inverted_corners_is_empty() {
        let b = BoundingBox::from_corners(30.0, 20.0, 10.0, 10.0);
        assert_eq!(b.area(), 0.0);
    }

    #[rstest]
    #[case(BoundingBox::new(-10.0, -10.0, 50.0, 50.0), BoundingBox::new(0.0, 0.0, 40.0, 40.0))]
    #[case(BoundingBox::new(90.0, 40.0, 50.0, 50.0), BoundingBox::new(90.0, 40.0, 9.0, 9.0))]
    #[case(BoundingBox::new(200.0, 200.0, 10.0, 10.0), BoundingBox::new(99.0, 49.0, 0.0, 0.0))]
    #[case(BoundingBox::new(10.0, 10.0, 20.0, 20.0), BoundingBox::new(10.0, 10.0, 20.0, 20.0))]
    #[case(
        BoundingBox::new(f32::NEG_INFINITY, 10.0, f32::INFINITY, 20.0),
        BoundingBox::new(0.0, 10.0, 0.0, 20.0)
    )]
    fn test_clipped(#[case] input: BoundingBox, #[case] expected: BoundingBox) {
        assert_eq!(input.clipped(100, 50), expected);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_identical() {
        let a = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 10.0, 10.0);
        assert_relative_eq!(a.iou(&b), 25.0 / 175.0, epsilon = 1e-6);
    }

    #[test]
    fn test_iou_zero_area_boxes() {
        let a = BoundingBox::new(3.0, 3.0, 0.0, 0.0);
        assert_eq!(a.iou(&a), 0.0);
    }
}
