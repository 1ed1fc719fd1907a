use ndarray::{Array3, Array4};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("failed to load model from {path}: {message}")]
    Load { path: String, message: String },
    #[error("model input must be [N, 3, H, W] with H == W, got {0:?}")]
    InputShape(Vec<i64>),
    #[error("model output must be [1, 4 + classes, anchors], got {0:?}")]
    OutputShape(Vec<i64>),
    #[error("model predicts {model} classes but {configured} class names are configured")]
    ClassCount { model: usize, configured: usize },
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Opaque inference backend: normalized NCHW tensor in, raw
/// `[1, 4 + K, A]` prediction tensor out.
///
/// Shapes are fixed once the runner exists; `run` may still fail at
/// runtime, which is distinct from having no model at all.
pub trait ModelRunner: Send {
    /// Side length of the square model input.
    fn input_size(&self) -> u32;

    /// Declared output shape `[1, 4 + K, A]`.
    fn output_shape(&self) -> [usize; 3];

    fn run(&mut self, input: Array4<f32>) -> Result<Array3<f32>, ModelError>;

    /// Number of classes scored per anchor.
    fn num_classes(&self) -> usize {
        self.output_shape()[1].saturating_sub(4)
    }
}
