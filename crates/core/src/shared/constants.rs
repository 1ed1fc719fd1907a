use std::time::Duration;

pub const DEFAULT_MODEL_PATH: &str = "models/fatigue.onnx";
pub const DEFAULT_DB_PATH: &str = "detection_results.db";

/// Class order of the bundled fatigue model's score rows.
pub const DEFAULT_CLASS_NAMES: &[&str] = &["yawn", "closed_eyes", "normal"];

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;
pub const DEFAULT_SAVE_INTERVAL_MS: u64 = 1000;

/// Fallback model input resolution when the model leaves it dynamic.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Letterbox padding value (YOLO convention), before normalization.
pub const LETTERBOX_FILL: u8 = 114;

pub const DEFAULT_DISPLAY_WIDTH: u32 = 960;
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 540;

/// Delay between loop iterations (~30 fps).
pub const FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// Capacity of the worker → consumer event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 4;

/// Largest confidence jump still treated as the same ongoing observation.
pub const MAX_CONFIDENCE_JUMP: f32 = 0.3;

/// Consecutive consistent sightings required before an event is persisted.
pub const MIN_CONSECUTIVE: u32 = 2;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
