use crate::shared::bounding_box::BoundingBox;

/// A classified box in original-frame coordinates.
///
/// Produced by the decoder as a candidate; the same type flows on after
/// suppression as an accepted detection.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_id: usize, class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            bbox,
            class_id,
            class_name: class_name.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Overlay-style label, e.g. `"closed_eyes 87%"`.
    pub fn label(&self) -> String {
        format!("{} {}%", self.class_name, (self.confidence * 100.0) as u32)
    }
}
