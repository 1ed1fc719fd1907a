pub mod onnx_model_runner;
