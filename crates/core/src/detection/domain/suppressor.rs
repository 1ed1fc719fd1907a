use std::cmp::Ordering;

use crate::detection::domain::detection::Detection;

/// Greedy NMS: rank by confidence, keep a candidate only if it overlaps
/// every already-kept box by at most `iou_threshold`.
///
/// The sort is stable, so equal-confidence candidates keep their input
/// order. Suppression is class-agnostic: two fatigue classes cannot share
/// a face region.
pub fn suppress(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = kept
            .iter()
            .any(|k| k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
