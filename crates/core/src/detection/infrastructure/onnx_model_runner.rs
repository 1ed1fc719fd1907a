/// ONNX Runtime backend for the fatigue model via `ort`.
///
/// Validates the declared input/output shapes once at load time so the
/// per-frame path only has to move tensors.
use std::path::Path;

use ndarray::{Array3, Array4, Ix3};

use crate::detection::domain::model_runner::{ModelError, ModelRunner};
use crate::shared::constants::DEFAULT_INPUT_SIZE;

/// Session tuning knobs.
#[derive(Clone, Debug)]
pub struct OnnxRunnerOptions {
    /// Threads for intra-op parallelism; `None` uses all cores.
    pub intra_threads: Option<usize>,
    /// Graph optimization level, 0 (disabled) to 3 (all).
    pub optimization_level: u8,
    /// Request the platform accelerator (CoreML, DirectML) when available.
    pub accelerate: bool,
}

impl Default for OnnxRunnerOptions {
    fn default() -> Self {
        Self {
            intra_threads: None,
            optimization_level: 3,
            accelerate: true,
        }
    }
}

fn graph_optimization(level: u8) -> ort::session::builder::GraphOptimizationLevel {
    use ort::session::builder::GraphOptimizationLevel;
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}

pub struct OnnxModelRunner {
    session: ort::session::Session,
    input_size: u32,
    output_shape: [usize; 3],
}

impl OnnxModelRunner {
    /// Load an ONNX model and validate its shapes.
    ///
    /// Input must be `[N, 3, H, W]` with `H == W`; a dynamic side falls
    /// back to 640. Output must be `[1, 4 + K, A]`; a dynamic anchor count
    /// is derived from the input size assuming strides 8/16/32.
    pub fn load(path: &Path, options: &OnnxRunnerOptions) -> Result<Self, ModelError> {
        let load_err = |message: String| ModelError::Load {
            path: path.display().to_string(),
            message,
        };

        if !path.exists() {
            return Err(load_err("file not found".into()));
        }

        let intra_threads = options.intra_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

        let builder = ort::session::Session::builder()
            .map_err(|e| load_err(e.to_string()))?
            .with_optimization_level(graph_optimization(options.optimization_level))
            .map_err(|e| load_err(e.to_string()))?
            .with_intra_threads(intra_threads)
            .map_err(|e| load_err(e.to_string()))?;
        let mut builder = if options.accelerate {
            builder
                .with_execution_providers(preferred_execution_providers())
                .map_err(|e| load_err(e.to_string()))?
        } else {
            builder
        };
        let session = builder
            .commit_from_file(path)
            .map_err(|e| load_err(e.to_string()))?;

        let input_dims = tensor_dims(session.inputs().first().map(|i| i.dtype()));
        let input_size = validate_input(&input_dims)?;

        let output_dims = tensor_dims(session.outputs().first().map(|o| o.dtype()));
        let output_shape = validate_output(&output_dims, input_size)?;

        log::info!(
            "Loaded {} ({}x{} input, {} classes, {} anchors)",
            path.display(),
            input_size,
            input_size,
            output_shape[1] - 4,
            output_shape[2]
        );

        Ok(Self {
            session,
            input_size,
            output_shape,
        })
    }
}

impl ModelRunner for OnnxModelRunner {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn output_shape(&self) -> [usize; 3] {
        self.output_shape
    }

    fn run(&mut self, input: Array4<f32>) -> Result<Array3<f32>, ModelError> {
        let infer_err = |e: ort::Error| ModelError::Inference(e.to_string());

        let input_value = ort::value::Tensor::from_array(input).map_err(infer_err)?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(infer_err)?;
        if outputs.len() == 0 {
            return Err(ModelError::Inference("model produced no outputs".into()));
        }
        let tensor = outputs[0].try_extract_array::<f32>().map_err(infer_err)?;
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();

        let tensor = tensor
            .into_dimensionality::<Ix3>()
            .map_err(|_| ModelError::OutputShape(shape.clone()))?;
        if tensor.dim().1 != self.output_shape[1] {
            return Err(ModelError::OutputShape(shape));
        }
        Ok(tensor.to_owned())
    }
}

/// Return the preferred ONNX execution providers for the current platform.
///
/// Falls back to CPU if the platform-specific provider is unavailable.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

fn tensor_dims(value_type: Option<&ort::value::ValueType>) -> Vec<i64> {
    match value_type {
        Some(ort::value::ValueType::Tensor { shape, .. }) => shape.iter().copied().collect(),
        _ => Vec::new(),
    }
}

/// Checks `[N, 3, H, W]`, returning the square side. Non-positive dims are dynamic.
fn validate_input(dims: &[i64]) -> Result<u32, ModelError> {
    if dims.len() != 4 || (dims[1] > 0 && dims[1] != 3) {
        return Err(ModelError::InputShape(dims.to_vec()));
    }
    match (dims[2], dims[3]) {
        (h, w) if h > 0 && w > 0 && h != w => Err(ModelError::InputShape(dims.to_vec())),
        (h, _) if h > 0 => Ok(h as u32),
        (_, w) if w > 0 => Ok(w as u32),
        _ => Ok(DEFAULT_INPUT_SIZE),
    }
}

/// Checks `[1, 4 + K, A]` with `K >= 1`.
fn validate_output(dims: &[i64], input_size: u32) -> Result<[usize; 3], ModelError> {
    if dims.len() != 3 || dims[1] <= 4 || (dims[0] > 0 && dims[0] != 1) {
        return Err(ModelError::OutputShape(dims.to_vec()));
    }
    let anchors = if dims[2] > 0 {
        dims[2] as usize
    } else {
        anchor_count(input_size)
    };
    Ok([1, dims[1] as usize, anchors])
}

/// Anchor count of a three-head detector at strides 8, 16 and 32.
fn anchor_count(input_size: u32) -> usize {
    [8u32, 16, 32]
        .iter()
        .map(|s| {
            let side = (input_size / s) as usize;
            side * side
        })
        .sum()
}
