use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::detection::domain::fatigue_detector::FatigueDetector;
use crate::shared::frame::Frame;
use crate::storage::domain::detection_store::DetectionStore;
use crate::video::domain::frame_source::{FrameSource, SourceDescriptor};

/// Result of a single-image run.
#[derive(Debug)]
pub struct ImageReport {
    /// The frame detection ran on (resized when a display size is set).
    pub frame: Frame,
    pub detections: Vec<Detection>,
    /// How many detections the store accepted.
    pub saved: usize,
}

/// Single-image pipeline: read → resize → detect → save.
///
/// There is no temporal context for a still image, so every detection is
/// offered to the store directly; only the store's own duplicate guard
/// applies.
pub struct DetectImageUseCase {
    source: Box<dyn FrameSource>,
    detector: Box<dyn FatigueDetector>,
    store: Option<Box<dyn DetectionStore>>,
    display_size: Option<(u32, u32)>,
}

impl DetectImageUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn FatigueDetector>,
        store: Option<Box<dyn DetectionStore>>,
        display_size: Option<(u32, u32)>,
    ) -> Self {
        Self {
            source,
            detector,
            store,
            display_size,
        }
    }

    pub fn execute(&mut self, image_path: &Path) -> Result<ImageReport, Box<dyn std::error::Error>> {
        self.source
            .open(&SourceDescriptor::File(image_path.to_path_buf()))?;
        let frame = self.source.read().ok_or("No frames in image")?;
        self.source.close();

        let frame = match self.display_size {
            Some((w, h)) => frame.resized(w, h),
            None => frame,
        };

        let detections = self.detector.detect(&frame)?;
        let mut saved = 0;
        if let Some(store) = self.store.as_mut() {
            for det in &detections {
                if store.save(&det.class_name, det.confidence)? {
                    saved += 1;
                }
            }
        }
        log::info!(
            "Detection complete: {} targets in {}",
            detections.len(),
            image_path.display()
        );

        Ok(ImageReport {
            frame,
            detections,
            saved,
        })
    }

    /// Returns the store so callers can query it after the run.
    pub fn into_store(self) -> Option<Box<dyn DetectionStore>> {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::video_metadata::VideoMetadata;
    use crate::storage::infrastructure::sqlite_detection_store::SqliteDetectionStore;
    use std::sync::{Arc, Mutex};

    // --- Stubs ---

    struct StubImageSource {
        frame: Option<Frame>,
    }

    impl FrameSource for StubImageSource {
        fn open(
            &mut self,
            _source: &SourceDescriptor,
        ) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            let frame = self.frame.as_ref().ok_or("missing image")?;
            Ok(VideoMetadata {
                width: frame.width(),
                height: frame.height(),
                fps: 0.0,
                total_frames: 1,
                codec: String::new(),
                live: false,
            })
        }

        fn read(&mut self) -> Option<Frame> {
            self.frame.take()
        }

        fn close(&mut self) {
            self.frame = None;
        }
    }

    struct StubDetector {
        detections: Vec<Detection>,
        sizes: Arc<Mutex<Vec<(u32, u32)>>>,
    }

    impl FatigueDetector for StubDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            self.sizes
                .lock()
                .unwrap()
                .push((frame.width(), frame.height()));
            Ok(self.detections.clone())
        }
    }

    // --- Helpers ---

    fn make_frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![128; (w * h * 3) as usize], w, h, 3, 0)
    }

    fn det(class_name: &str, confidence: f32) -> Detection {
        Detection::new(BoundingBox::new(5.0, 5.0, 20.0, 20.0), 0, class_name, confidence)
    }

    fn use_case(
        detections: Vec<Detection>,
        store: Option<Box<dyn DetectionStore>>,
        display_size: Option<(u32, u32)>,
    ) -> (DetectImageUseCase, Arc<Mutex<Vec<(u32, u32)>>>) {
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let uc = DetectImageUseCase::new(
            Box::new(StubImageSource {
                frame: Some(make_frame(100, 80)),
            }),
            Box::new(StubDetector {
                detections,
                sizes: sizes.clone(),
            }),
            store,
            display_size,
        );
        (uc, sizes)
    }

    // --- Tests ---

    #[test]
    fn test_saves_every_detection_without_gate() {
        let store = SqliteDetectionStore::open_in_memory().unwrap();
        let (mut uc, _) = use_case(
            vec![det("yawn", 0.9), det("closed_eyes", 0.7)],
            Some(Box::new(store)),
            None,
        );
        let report = uc.execute(Path::new("driver.jpg")).unwrap();
        assert_eq!(report.detections.len(), 2);
        assert_eq!(report.saved, 2);
        assert_eq!(uc.into_store().unwrap().total_count().unwrap(), 2);
    }

    #[test]
    fn test_store_guard_still_applies() {
        let store = SqliteDetectionStore::open_in_memory().unwrap();
        let (mut uc, _) = use_case(
            vec![det("yawn", 0.9), det("yawn", 0.8)],
            Some(Box::new(store)),
            None,
        );
        let report = uc.execute(Path::new("driver.jpg")).unwrap();
        assert_eq!(report.saved, 1);
    }

    #[test]
    fn test_resizes_to_display_size() {
        let (mut uc, sizes) = use_case(vec![], None, Some((960, 540)));
        let report = uc.execute(Path::new("driver.jpg")).unwrap();
        assert_eq!((report.frame.width(), report.frame.height()), (960, 540));
        assert_eq!(sizes.lock().unwrap().as_slice(), &[(960, 540)]);
    }

    #[test]
    fn test_without_store_reports_only() {
        let (mut uc, _) = use_case(vec![det("yawn", 0.9)], None, None);
        let report = uc.execute(Path::new("driver.jpg")).unwrap();
        assert_eq!(report.detections.len(), 1);
        assert_eq!(report.saved, 0);
    }

    #[test]
    fn test_missing_image_is_error() {
        let mut uc = DetectImageUseCase::new(
            Box::new(StubImageSource { frame: None }),
            Box::new(StubDetector {
                detections: vec![],
                sizes: Arc::new(Mutex::new(Vec::new())),
            }),
            None,
            None,
        );
        assert!(uc.execute(Path::new("missing.jpg")).is_err());
    }
}
