use crate::detection::domain::detection::Detection;
use crate::shared::frame::Frame;

/// Domain interface for per-frame fatigue classification.
///
/// Returns accepted (post-NMS) detections in the frame's own coordinates.
/// Implementations may hold inference sessions, hence `&mut self`.
pub trait FatigueDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>>;
}
