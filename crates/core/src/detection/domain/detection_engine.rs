use ndarray::Axis;

use crate::detection::domain::decoder::{decode, DecodeParams};
use crate::detection::domain::detection::Detection;
use crate::detection::domain::fatigue_detector::FatigueDetector;
use crate::detection::domain::letterbox::letterbox;
use crate::detection::domain::model_runner::{ModelError, ModelRunner};
use crate::detection::domain::suppressor::suppress;
use crate::shared::constants::{
    DEFAULT_CLASS_NAMES, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_NMS_THRESHOLD,
};
use crate::shared::frame::Frame;

/// Letterbox → inference → decode → NMS over an optional model.
///
/// Without a loaded model every call is a no-op returning no detections,
/// so callers can keep the pipeline running while a model is swapped.
pub struct DetectionEngine {
    runner: Option<Box<dyn ModelRunner>>,
    class_names: Vec<String>,
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl DetectionEngine {
    pub fn new(class_names: Vec<String>) -> Self {
        Self {
            runner: None,
            class_names,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        }
    }

    /// Installs a runner after checking its class count against the
    /// configured names. On error the engine is left unloaded.
    pub fn set_runner(&mut self, runner: Box<dyn ModelRunner>) -> Result<(), ModelError> {
        let model = runner.num_classes();
        if model != self.class_names.len() {
            self.runner = None;
            return Err(ModelError::ClassCount {
                model,
                configured: self.class_names.len(),
            });
        }
        log::info!(
            "Model ready: input {0}x{0}, output {1:?}",
            runner.input_size(),
            runner.output_shape()
        );
        self.runner = Some(runner);
        Ok(())
    }

    pub fn unload(&mut self) {
        self.runner = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.runner.is_some()
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
    }

    pub fn nms_threshold(&self) -> f32 {
        self.nms_threshold
    }

    pub fn set_nms_threshold(&mut self, threshold: f32) {
        self.nms_threshold = threshold.clamp(0.0, 1.0);
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CLASS_NAMES.iter().map(|s| s.to_string()).collect())
    }
}

impl FatigueDetector for DetectionEngine {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
        let Some(runner) = self.runner.as_mut() else {
            return Ok(Vec::new());
        };
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let (tensor, geometry) = letterbox(frame, runner.input_size());
        let output = runner.run(tensor)?;
        let raw = output.index_axis(Axis(0), 0);

        let candidates = decode(
            raw,
            &DecodeParams {
                confidence_threshold: self.confidence_threshold,
                letterbox: geometry,
                frame_width: frame.width(),
                frame_height: frame.height(),
                class_names: &self.class_names,
            },
        );
        Ok(suppress(candidates, self.nms_threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Array4};

    /// Runner returning a fixed prediction regardless of input.
    struct FixedRunner {
        pub output: Array3<f32>,
        pub input_size: u32,
        pub calls: usize,
    }

    impl FixedRunner {
        /// One anchor per `(cx, cy, w, h, class, score)` in model space.
        pub fn with_anchors(anchors: &[(f32, f32, f32, f32, usize, f32)], classes: usize) -> Self {
            let mut output = Array3::<f32>::zeros((1, 4 + classes, anchors.len()));
            for (i, &(cx, cy, w, h, class, score)) in anchors.iter().enumerate() {
                output[[0, 0, i]] = cx;
                output[[0, 1, i]] = cy;
                output[[0, 2, i]] = w;
                output[[0, 3, i]] = h;
                output[[0, 4 + class, i]] = score;
            }
            Self {
                output,
                input_size: 640,
                calls: 0,
            }
        }
    }

    impl ModelRunner for FixedRunner {
        fn input_size(&self) -> u32 {
            self.input_size
        }

        fn output_shape(&self) -> [usize; 3] {
            let (a, b, c) = self.output.dim();
            [a, b, c]
        }

        fn run(&mut self, input: Array4<f32>) -> Result<Array3<f32>, ModelError> {
            assert_eq!(input.shape(), &[1, 3, 640, 640]);
            self.calls += 1;
            Ok(self.output.clone())
        }
    }

    struct FailingRunner;

    impl ModelRunner for FailingRunner {
        fn input_size(&self) -> u32 {
            64
        }

        fn output_shape(&self) -> [usize; 3] {
            [1, 7, 10]
        }

        fn run(&mut self, _input: Array4<f32>) -> Result<Array3<f32>, ModelError> {
            Err(ModelError::Inference("device lost".into()))
        }
    }

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(vec![90; (w * h * 3) as usize], w, h, 3, 0)
    }

    #[test]
    fn test_unloaded_engine_returns_nothing() {
        let mut engine = DetectionEngine::default();
        assert!(!engine.is_loaded());
        assert!(engine.detect(&frame(64, 48)).unwrap().is_empty());
    }

    #[test]
    fn test_detects_and_suppresses_duplicates() {
        let mut engine = DetectionEngine::default();
        engine.set_confidence_threshold(0.5);
        let runner = FixedRunner::with_anchors(
            &[
                (320.0, 320.0, 100.0, 100.0, 1, 0.9),
                (322.0, 321.0, 100.0, 100.0, 1, 0.8),
                (100.0, 320.0, 60.0, 60.0, 0, 0.7),
                (500.0, 320.0, 60.0, 60.0, 2, 0.3),
            ],
            3,
        );
        engine.set_runner(Box::new(runner)).unwrap();

        let dets = engine.detect(&frame(640, 640)).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_name, "closed_eyes");
        assert_eq!(dets[1].class_name, "yawn");
    }

    #[test]
    fn test_boxes_are_in_frame_coordinates() {
        let mut engine = DetectionEngine::default();
        engine.set_confidence_threshold(0.5);
        // 960x540 → scale 2/3, pad_y = 140; model box (100,190)-(200,290).
        let runner = FixedRunner::with_anchors(&[(150.0, 240.0, 100.0, 100.0, 0, 0.9)], 3);
        engine.set_runner(Box::new(runner)).unwrap();

        let dets = engine.detect(&frame(960, 540)).unwrap();
        let b = dets[0].bbox;
        assert!((b.x - 150.0).abs() < 0.01);
        assert!((b.y - 75.0).abs() < 0.01);
        assert!((b.width - 150.0).abs() < 0.01);
    }

    #[test]
    fn test_class_count_mismatch_leaves_engine_unloaded() {
        let mut engine = DetectionEngine::default();
        let runner = FixedRunner::with_anchors(&[], 5);
        let err = engine.set_runner(Box::new(runner)).unwrap_err();
        assert!(matches!(err, ModelError::ClassCount { model: 5, configured: 3 }));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_runtime_fault_is_an_error() {
        let mut engine = DetectionEngine::default();
        engine.set_runner(Box::new(FailingRunner)).unwrap();
        let err = engine.detect(&frame(32, 32)).unwrap_err();
        assert!(err.to_string().contains("device lost"));
    }

    #[test]
    fn test_thresholds_are_clamped() {
        let mut engine = DetectionEngine::default();
        engine.set_confidence_threshold(1.5);
        engine.set_nms_threshold(-0.1);
        assert_eq!(engine.confidence_threshold(), 1.0);
        assert_eq!(engine.nms_threshold(), 0.0);
    }

    #[test]
    fn test_unload() {
        let mut engine = DetectionEngine::default();
        engine
            .set_runner(Box::new(FixedRunner::with_anchors(&[], 3)))
            .unwrap();
        engine.unload();
        assert!(!engine.is_loaded());
    }
}
