//! Turns a dense `[4 + K, A]` YOLO prediction into candidate detections.

use ndarray::ArrayView2;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::letterbox::Letterbox;
use crate::shared::bounding_box::BoundingBox;

const UNKNOWN_CLASS: &str = "unknown";

/// Decoding parameters for one frame.
pub struct DecodeParams<'a> {
    pub confidence_threshold: f32,
    pub letterbox: Letterbox,
    pub frame_width: u32,
    pub frame_height: u32,
    pub class_names: &'a [String],
}

/// Decodes every anchor whose best class score reaches the threshold.
///
/// Rows 0..4 hold `cx, cy, w, h` in model-input pixels, rows `4..4+K` the
/// per-class scores. Boxes are mapped back through the letterbox (remove
/// padding, then unscale) and clipped to the frame.
pub fn decode(output: ArrayView2<'_, f32>, params: &DecodeParams<'_>) -> Vec<Detection> {
    let (rows, anchors) = output.dim();
    if rows <= 4 {
        return Vec::new();
    }
    let num_classes = rows - 4;
    let lb = &params.letterbox;

    let mut candidates = Vec::new();
    for a in 0..anchors {
        let mut class_id = 0;
        let mut best = output[[4, a]];
        for c in 1..num_classes {
            let score = output[[4 + c, a]];
            if score > best {
                best = score;
                class_id = c;
            }
        }
        if best.is_nan() || best < params.confidence_threshold {
            continue;
        }

        let cx = output[[0, a]];
        let cy = output[[1, a]];
        let w = output[[2, a]];
        let h = output[[3, a]];
        if ![cx, cy, w, h].iter().all(|v| v.is_finite()) {
            continue;
        }

        let (x1, y1) = lb.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.to_source(cx + w / 2.0, cy + h / 2.0);
        let bbox = BoundingBox::from_corners(x1, y1, x2, y2)
            .clipped(params.frame_width, params.frame_height);

        let class_name = params
            .class_names
            .get(class_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_CLASS);

        candidates.push(Detection::new(bbox, class_id, class_name, best));
    }

    log::debug!(
        "Decoded {} candidates from {anchors} anchors",
        candidates.len()
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rstest::rstest;

    fn names() -> Vec<String> {
        vec!["yawn".into(), "closed_eyes".into(), "normal".into()]
    }

    /// Builds a `[7, anchors.len()]` tensor from `(cx, cy, w, h, [s0, s1, s2])`.
    fn tensor(anchors: &[(f32, f32, f32, f32, [f32; 3])]) -> Array2<f32> {
        let mut t = Array2::<f32>::zeros((7, anchors.len()));
        for (i, (cx, cy, w, h, scores)) in anchors.iter().enumerate() {
            t[[0, i]] = *cx;
            t[[1, i]] = *cy;
            t[[2, i]] = *w;
            t[[3, i]] = *h;
            for (c, s) in scores.iter().enumerate() {
                t[[4 + c, i]] = *s;
            }
        }
        t
    }

    fn params<'a>(names: &'a [String], w: u32, h: u32) -> DecodeParams<'a> {
        DecodeParams {
            confidence_threshold: 0.5,
            letterbox: Letterbox::fit(w, h, 640),
            frame_width: w,
            frame_height: h,
            class_names: names,
        }
    }

    #[test]
    fn test_discards_low_scores() {
        let names = names();
        let t = tensor(&[
            (320.0, 320.0, 100.0, 100.0, [0.2, 0.4, 0.1]),
            (100.0, 320.0, 50.0, 50.0, [0.1, 0.9, 0.3]),
        ]);
        let dets = decode(t.view(), &params(&names, 640, 640));
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 1);
        assert_eq!(dets[0].class_name, "closed_eyes");
        assert_relative_eq!(dets[0].confidence, 0.9);
    }

    #[test]
    fn test_argmax_first_maximum_wins() {
        let names = names();
        let t = tensor(&[(320.0, 320.0, 10.0, 10.0, [0.7, 0.7, 0.2])]);
        let dets = decode(t.view(), &params(&names, 640, 640));
        assert_eq!(dets[0].class_id, 0);
    }

    #[test]
    fn test_inverts_letterbox_padding() {
        // 1280x720 → scale 0.5, resized 640x360, pad_y = 140.
        let names = names();
        // Source box (200, 100)-(400, 300) in model space: (100, 190)-(200, 290).
        let t = tensor(&[(150.0, 240.0, 100.0, 100.0, [0.9, 0.0, 0.0])]);
        let dets = decode(t.view(), &params(&names, 1280, 720));
        let b = dets[0].bbox;
        assert_relative_eq!(b.x, 200.0, epsilon = 1e-3);
        assert_relative_eq!(b.y, 100.0, epsilon = 1e-3);
        assert_relative_eq!(b.width, 200.0, epsilon = 1e-3);
        assert_relative_eq!(b.height, 200.0, epsilon = 1e-3);
    }

    #[test]
    fn test_clips_to_frame() {
        let names = names();
        let t = tensor(&[
            (0.0, 0.0, 300.0, 300.0, [0.9, 0.0, 0.0]),
            (640.0, 640.0, 300.0, 300.0, [0.0, 0.9, 0.0]),
            (-500.0, 900.0, 10.0, 10.0, [0.0, 0.0, 0.9]),
        ]);
        let (w, h) = (1280, 720);
        for det in decode(t.view(), &params(&names, w, h)) {
            let b = det.bbox;
            assert!(b.x >= 0.0 && b.y >= 0.0);
            assert!(b.right() <= (w - 1) as f32);
            assert!(b.bottom() <= (h - 1) as f32);
            assert!(b.width >= 0.0 && b.height >= 0.0);
        }
    }

    fn assert_inside(dets: &[Detection], w: u32, h: u32) {
        let (max_x, max_y) = ((w - 1) as f32, (h - 1) as f32);
        for det in dets {
            let b = det.bbox;
            assert!(
                [b.x, b.y, b.width, b.height].iter().all(|v| v.is_finite()),
                "non-finite box {b:?}"
            );
            assert!(b.x >= 0.0 && b.y >= 0.0, "{b:?} outside {w}x{h}");
            assert!(b.width >= 0.0 && b.height >= 0.0, "{b:?} has negative size");
            assert!(b.right() <= max_x && b.bottom() <= max_y, "{b:?} outside {w}x{h}");
        }
    }

    #[rstest]
    #[case(0.0, 0.0, 0.0, 0.0)]
    #[case(320.0, 320.0, -200.0, -200.0)]
    #[case(-1e6, -1e6, 1e6, 1e6)]
    #[case(639.9, 0.1, 5000.0, 0.5)]
    #[case(1e30, -1e30, 1e30, 1e30)]
    #[case(f32::MIN, 320.0, f32::MAX, 10.0)]
    #[case(f32::MAX, f32::MAX, f32::MAX, f32::MAX)]
    fn test_extreme_geometry_stays_inside_frame(
        #[case] cx: f32,
        #[case] cy: f32,
        #[case] bw: f32,
        #[case] bh: f32,
        #[values((640, 640), (1280, 720), (720, 1280), (2560, 100), (1, 1))] size: (u32, u32),
    ) {
        let names = names();
        let (w, h) = size;
        let t = tensor(&[(cx, cy, bw, bh, [0.9, 0.0, 0.0])]);
        assert_inside(&decode(t.view(), &params(&names, w, h)), w, h);
    }

    #[rstest]
    #[case(640, 640, 1)]
    #[case(1280, 720, 7)]
    #[case(480, 1920, 42)]
    fn test_random_anchors_stay_inside_frame(#[case] w: u32, #[case] h: u32, #[case] seed: u64) {
        // Deterministic LCG so failures reproduce.
        let mut state = seed;
        let mut next = move |lo: f32, hi: f32| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            lo + (hi - lo) * ((state >> 40) as f32 / (1u64 << 24) as f32)
        };
        let anchors: Vec<_> = (0..2000)
            .map(|_| {
                (
                    next(-2000.0, 2640.0),
                    next(-2000.0, 2640.0),
                    next(-500.0, 3000.0),
                    next(-500.0, 3000.0),
                    [next(0.5, 1.0), 0.0, 0.0],
                )
            })
            .collect();
        let names = names();
        let dets = decode(tensor(&anchors).view(), &params(&names, w, h));
        assert_eq!(dets.len(), 2000);
        assert_inside(&dets, w, h);
    }

    #[test]
    fn test_unknown_class_name() {
        let names = vec!["only".to_string()];
        let t = tensor(&[(320.0, 320.0, 10.0, 10.0, [0.1, 0.2, 0.8])]);
        let dets = decode(t.view(), &params(&names, 640, 640));
        assert_eq!(dets[0].class_name, "unknown");
        assert_eq!(dets[0].class_id, 2);
    }

    #[test]
    fn test_nan_scores_are_skipped() {
        let names = names();
        let t = tensor(&[(320.0, 320.0, 10.0, 10.0, [f32::NAN, f32::NAN, f32::NAN])]);
        assert!(decode(t.view(), &params(&names, 640, 640)).is_empty());
    }

    #[test]
    fn test_non_finite_geometry_is_skipped() {
        let names = names();
        let t = tensor(&[(f32::INFINITY, 320.0, 10.0, f32::NAN, [0.9, 0.0, 0.0])]);
        assert!(decode(t.view(), &params(&names, 640, 640)).is_empty());
    }

    #[test]
    fn test_degenerate_tensor() {
        let names = names();
        let t = Array2::<f32>::zeros((4, 10));
        assert!(decode(t.view(), &params(&names, 640, 640)).is_empty());
    }
}
