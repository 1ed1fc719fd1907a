mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};

use fatigue_core::detection::domain::detection_engine::DetectionEngine;
use fatigue_core::detection::domain::persistence_gate::PersistenceGate;
use fatigue_core::detection::infrastructure::onnx_model_runner::{
    OnnxModelRunner, OnnxRunnerOptions,
};
use fatigue_core::pipeline::acquisition_loop::{
    AcquisitionConfig, AcquisitionLoop, PipelineEvent, WorkerParts,
};
use fatigue_core::pipeline::detect_image_use_case::DetectImageUseCase;
use fatigue_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use fatigue_core::storage::domain::detection_store::{DetectionStore, TIMESTAMP_FORMAT};
use fatigue_core::storage::infrastructure::csv_export::export_csv;
use fatigue_core::storage::infrastructure::sqlite_detection_store::SqliteDetectionStore;
use fatigue_core::video::domain::frame_source::SourceDescriptor;
use fatigue_core::video::infrastructure::ffmpeg_source::FfmpegSource;
use fatigue_core::video::infrastructure::image_file_source::{is_image_path, ImageFileSource};

use settings::Settings;

/// Driver fatigue monitoring for video files, cameras, streams and images.
#[derive(Parser)]
#[command(name = "fatigue-monitor")]
struct Cli {
    /// Settings file (default: <config dir>/FatigueMonitor/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// ONNX model path.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// SQLite database for detection records.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f32>,

    /// NMS IoU threshold (0.0-1.0).
    #[arg(long, global = true)]
    nms: Option<f32>,

    /// Minimum milliseconds between two stored events of one class.
    #[arg(long, global = true)]
    save_interval: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor a video file, capture device or network stream.
    Watch(WatchArgs),
    /// Detect on a single image.
    Image {
        path: PathBuf,
    },
    /// Query or manage stored detection records.
    #[command(subcommand)]
    Records(RecordsCommand),
}

#[derive(Args)]
struct WatchArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Capture device name (required for DirectShow on Windows).
    #[arg(long, requires = "device")]
    device_name: Option<String>,

    /// Intra-op threads for inference (default: all cores).
    #[arg(long)]
    threads: Option<usize>,

    /// Decode and display only, without inference.
    #[arg(long)]
    no_detect: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct SourceArgs {
    /// Video file.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Capture device index.
    #[arg(long)]
    device: Option<u32>,

    /// Network stream URL (rtsp://, http://).
    #[arg(long)]
    url: Option<String>,
}

#[derive(Subcommand)]
enum RecordsCommand {
    /// Most recent records, newest first.
    Recent {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Records between two timestamps ("YYYY-MM-DD HH:MM:SS"), inclusive.
    Range {
        from: String,
        to: String,
    },
    /// Totals, average confidence and per-type counts.
    Stats,
    /// Delete every record.
    Clear,
    /// Write all records to a CSV file.
    Export {
        path: PathBuf,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = resolve_settings(&cli)?;

    match cli.command {
        Command::Watch(args) => run_watch(&settings, args),
        Command::Image { path } => run_image(&settings, &path),
        Command::Records(command) => run_records(&settings, command),
    }
}

fn resolve_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };
    let mut settings = Settings::load_or_create(&path)?;

    if let Some(model) = &cli.model {
        settings.model_path = model.clone();
    }
    if let Some(db) = &cli.db {
        settings.db_path = db.clone();
    }
    if let Some(confidence) = cli.confidence {
        settings.confidence_threshold = confidence;
    }
    if let Some(nms) = cli.nms {
        settings.nms_threshold = nms;
    }
    if let Some(interval) = cli.save_interval {
        settings.save_interval_ms = interval;
    }
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&settings.confidence_threshold) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence_threshold
        )
        .into());
    }
    if !(0.0..=1.0).contains(&settings.nms_threshold) {
        return Err(format!(
            "NMS threshold must be between 0.0 and 1.0, got {}",
            settings.nms_threshold
        )
        .into());
    }
    if settings.class_names.is_empty() {
        return Err("class_names must not be empty".into());
    }
    Ok(())
}

/// Builds the engine; a model that fails to load leaves it unloaded so
/// frames still flow without detections.
fn build_engine(settings: &Settings, options: &OnnxRunnerOptions) -> DetectionEngine {
    let mut engine = DetectionEngine::new(settings.class_names.clone());
    engine.set_confidence_threshold(settings.confidence_threshold);
    engine.set_nms_threshold(settings.nms_threshold);

    log::info!("Loading model: {}", settings.model_path.display());
    match OnnxModelRunner::load(&settings.model_path, options) {
        Ok(runner) => {
            if let Err(e) = engine.set_runner(Box::new(runner)) {
                log::warn!("Model rejected, detection disabled: {e}");
            }
        }
        Err(e) => log::warn!("Model not loaded, detection disabled: {e}"),
    }
    engine
}

fn open_store(settings: &Settings) -> Result<SqliteDetectionStore, Box<dyn std::error::Error>> {
    let store = SqliteDetectionStore::open(&settings.db_path)?;
    log::debug!("Using database {}", settings.db_path.display());
    Ok(store)
}

fn source_descriptor(args: &SourceArgs) -> Result<SourceDescriptor, Box<dyn std::error::Error>> {
    if let Some(file) = &args.file {
        if !file.exists() {
            return Err(format!("Input file not found: {}", file.display()).into());
        }
        return Ok(SourceDescriptor::File(file.clone()));
    }
    if let Some(index) = args.device {
        return Ok(SourceDescriptor::Device(index));
    }
    if let Some(url) = &args.url {
        return Ok(SourceDescriptor::Network(url.clone()));
    }
    Err("One of --file, --device or --url is required".into())
}

fn ffmpeg_source(device_name: Option<&str>) -> FfmpegSource {
    match device_name {
        Some(name) => FfmpegSource::new().with_device_name(name),
        None => FfmpegSource::new(),
    }
}

fn run_watch(settings: &Settings, args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let source = source_descriptor(&args.source)?;
    let options = OnnxRunnerOptions {
        intra_threads: args.threads,
        ..OnnxRunnerOptions::default()
    };
    let engine = build_engine(settings, &options);

    let parts = WorkerParts {
        source: Box::new(ffmpeg_source(args.device_name.as_deref())),
        detector: Box::new(engine),
        store: Some(Box::new(open_store(settings)?)),
        gate: PersistenceGate::new(
            settings.confidence_threshold,
            Duration::from_millis(settings.save_interval_ms),
        ),
        logger: Box::new(StdoutPipelineLogger::default()),
    };
    let config = AcquisitionConfig {
        display_size: settings.display_size(),
        detection_enabled: !args.no_detect,
        ..AcquisitionConfig::default()
    };

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed))?;

    log::info!("Starting {source}");
    let session = AcquisitionLoop::start(source, parts, config);
    let mut stop_sent = false;
    let mut frames = 0usize;
    let mut events = 0usize;

    loop {
        if interrupted.load(Ordering::Relaxed) && !stop_sent {
            log::info!("Interrupted, stopping");
            session.stop();
            stop_sent = true;
        }
        match session.recv_timeout(Duration::from_millis(200)) {
            Some(PipelineEvent::Opened(Ok(meta))) => log::info!("Opened {meta}"),
            Some(PipelineEvent::Opened(Err(e))) => log::error!("Failed to open source: {e}"),
            Some(PipelineEvent::FrameReady(annotated)) => {
                frames += 1;
                for det in &annotated.persisted {
                    events += 1;
                    log::info!(
                        "Frame {}: {} at ({:.0}, {:.0})",
                        annotated.frame.index(),
                        det.label(),
                        det.bbox.x,
                        det.bbox.y
                    );
                }
            }
            Some(PipelineEvent::Error(e)) => log::warn!("{e}"),
            Some(PipelineEvent::Finished) => break,
            None if !session.is_running() => break,
            None => {}
        }
    }

    let parts = session.join()?;
    log::info!("Processed {frames} frames, stored {events} fatigue events");
    if let Some(store) = parts.store {
        print_stats(&*store)?;
    }
    Ok(())
}

fn run_image(settings: &Settings, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Input file not found: {}", path.display()).into());
    }
    if !is_image_path(path) {
        return Err(format!("Not a supported image: {}", path.display()).into());
    }
    let engine = build_engine(settings, &OnnxRunnerOptions::default());
    if !engine.is_loaded() {
        return Err("Image detection requires a loaded model".into());
    }

    let mut use_case = DetectImageUseCase::new(
        Box::new(ImageFileSource::new()),
        Box::new(engine),
        Some(Box::new(open_store(settings)?)),
        settings.display_size(),
    );
    let report = use_case.execute(path)?;
    for det in &report.detections {
        println!(
            "{}\t{:.0},{:.0},{:.0},{:.0}",
            det.label(),
            det.bbox.x,
            det.bbox.y,
            det.bbox.width,
            det.bbox.height
        );
    }
    log::info!(
        "{} detections, {} saved ({}x{})",
        report.detections.len(),
        report.saved,
        report.frame.width(),
        report.frame.height()
    );
    Ok(())
}

fn run_records(settings: &Settings, command: RecordsCommand) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = open_store(settings)?;
    match command {
        RecordsCommand::Recent { limit } => print_records(&store.recent(limit)?),
        RecordsCommand::Range { from, to } => {
            let start = parse_timestamp(&from)?;
            let end = parse_timestamp(&to)?;
            print_records(&store.between(start, end)?);
        }
        RecordsCommand::Stats => print_stats(&store)?,
        RecordsCommand::Clear => {
            let removed = store.clear()?;
            println!("Removed {removed} records");
        }
        RecordsCommand::Export { path } => {
            let written = export_csv(&store.all()?, &path)?;
            println!("Exported {written} records to {}", path.display());
        }
    }
    Ok(())
}

fn parse_timestamp(value: &str) -> Result<NaiveDateTime, Box<dyn std::error::Error>> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
        .map_err(|e| format!("Invalid timestamp '{value}' (expected {TIMESTAMP_FORMAT}): {e}").into())
}

fn print_records(records: &[fatigue_core::storage::domain::detection_store::DetectionRecord]) {
    for record in records {
        println!(
            "{}\t{}\t{}\t{:.3}",
            record.id,
            record.formatted_timestamp(),
            record.detection_type,
            record.confidence
        );
    }
}

fn print_stats(store: &dyn DetectionStore) -> Result<(), Box<dyn std::error::Error>> {
    println!("Total: {}", store.total_count()?);
    println!("Average confidence: {:.3}", store.average_confidence()?);
    for (detection_type, count) in store.statistics()? {
        println!("  {detection_type}: {count}");
    }
    Ok(())
}
