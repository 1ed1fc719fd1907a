use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};

use crate::detection::domain::detection::Detection;
use crate::detection::domain::fatigue_detector::FatigueDetector;
use crate::detection::domain::persistence_gate::PersistenceGate;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::shared::constants::{DEFAULT_EVENT_CAPACITY, FRAME_INTERVAL};
use crate::shared::frame::Frame;
use crate::shared::video_metadata::VideoMetadata;
use crate::storage::domain::detection_store::DetectionStore;
use crate::video::domain::frame_source::{FrameSource, SourceDescriptor};

/// How often a blocked send re-checks the stop flag.
const SEND_POLL: Duration = Duration::from_millis(20);

/// Runtime settings for one capture session.
#[derive(Clone, Debug)]
pub struct AcquisitionConfig {
    /// Fixed delay after each iteration.
    pub frame_interval: Duration,
    /// Capacity of the event channel.
    pub event_capacity: usize,
    /// Resize every frame to this size before detection.
    pub display_size: Option<(u32, u32)>,
    /// When false, frames pass through without inference.
    pub detection_enabled: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            frame_interval: FRAME_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            display_size: None,
            detection_enabled: true,
        }
    }
}

/// Everything the worker owns for the duration of a session.
///
/// Moved into the worker on `start` and handed back by `join`, so the
/// detector and store cannot be touched while a session is running.
pub struct WorkerParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn FatigueDetector>,
    /// `None` runs the gate without persisting.
    pub store: Option<Box<dyn DetectionStore>>,
    pub gate: PersistenceGate,
    pub logger: Box<dyn PipelineLogger>,
}

/// A processed frame with its detections.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    /// Accepted detections, in `frame` coordinates.
    pub detections: Vec<Detection>,
    /// The subset that passed the gate and was written to the store.
    pub persisted: Vec<Detection>,
}

#[derive(Clone, Debug)]
pub enum PipelineEvent {
    Opened(Result<VideoMetadata, String>),
    FrameReady(AnnotatedFrame),
    Error(String),
    Finished,
}

/// Handle to a running capture session.
pub struct AcquisitionLoop {
    events: Receiver<PipelineEvent>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<WorkerParts>>,
}

impl AcquisitionLoop {
    /// Spawns the worker, which opens `source` on its own thread.
    pub fn start(source: SourceDescriptor, parts: WorkerParts, config: AcquisitionConfig) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(config.event_capacity.max(1));
        let stopped = Arc::new(AtomicBool::new(false));
        let worker = Worker {
            parts,
            source,
            config,
            tx,
            stopped: stopped.clone(),
        };
        let handle = thread::spawn(move || worker.run());
        Self {
            events: rx,
            stopped,
            handle: Some(handle),
        }
    }

    /// Blocking iterator over events; ends after `Finished`.
    pub fn events(&self) -> impl Iterator<Item = PipelineEvent> + '_ {
        let mut finished = false;
        std::iter::from_fn(move || {
            if finished {
                return None;
            }
            loop {
                let event = self.events.recv().ok()?;
                if let Some(event) = self.admit(event) {
                    finished = matches!(event, PipelineEvent::Finished);
                    return Some(event);
                }
            }
        })
    }

    /// Waits up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<PipelineEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(event) => {
                    if let Some(event) = self.admit(event) {
                        return Some(event);
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    /// Requests the worker to stop at its next scheduling boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Waits for the worker to exit and returns its parts.
    pub fn join(mut self) -> Result<WorkerParts, Box<dyn std::error::Error>> {
        let handle = self.handle.take().ok_or("Acquisition loop already joined")?;
        // Release the receiver so a worker blocked on a full channel can exit.
        drop(std::mem::replace(&mut self.events, crossbeam_channel::never()));
        handle
            .join()
            .map_err(|_| "Acquisition worker panicked".into())
    }

    fn admit(&self, event: PipelineEvent) -> Option<PipelineEvent> {
        if self.stopped.load(Ordering::Relaxed) && matches!(event, PipelineEvent::FrameReady(_)) {
            None
        } else {
            Some(event)
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stop();
            drop(std::mem::replace(&mut self.events, crossbeam_channel::never()));
            let _ = handle.join();
        }
    }
}

struct Worker {
    parts: WorkerParts,
    source: SourceDescriptor,
    config: AcquisitionConfig,
    tx: Sender<PipelineEvent>,
    stopped: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self) -> WorkerParts {
        self.parts.gate.reset();

        match self.parts.source.open(&self.source) {
            Ok(metadata) => {
                let total = if self.source.is_live() {
                    0
                } else {
                    metadata.total_frames
                };
                self.parts
                    .logger
                    .info(&format!("Session started on {}", self.source));
                self.send_control(PipelineEvent::Opened(Ok(metadata)));
                self.capture(total);
            }
            Err(e) => {
                log::warn!("Failed to open {}: {e}", self.source);
                self.send_control(PipelineEvent::Opened(Err(e.to_string())));
            }
        }

        self.parts.source.close();
        self.parts.gate.reset();
        self.parts.logger.summary();
        self.send_control(PipelineEvent::Finished);
        self.parts
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    fn capture(&mut self, total: usize) {
        let live = self.source.is_live();
        let mut frames = 0usize;

        while !self.is_stopped() {
            let read_start = Instant::now();
            let Some(frame) = self.parts.source.read() else {
                if !live {
                    log::info!("End of {} after {frames} frames", self.source);
                    break;
                }
                let message = format!("Failed to read frame from {}", self.source);
                if !self.report_error(message, live) {
                    break;
                }
                thread::sleep(self.config.frame_interval);
                continue;
            };
            self.parts
                .logger
                .timing("read", elapsed_ms(read_start));

            // Streams can hand out empty frames while warming up.
            if frame.is_empty() {
                self.parts.logger.count("empty_frames");
                thread::sleep(self.config.frame_interval);
                continue;
            }

            let frame = match self.config.display_size {
                Some((w, h)) => frame.resized(w, h),
                None => frame,
            };

            let annotated = self.process(frame, live);
            frames += 1;
            self.parts.logger.progress(frames, total);

            if self.is_stopped() || !self.deliver(annotated, live) {
                break;
            }
            thread::sleep(self.config.frame_interval);
        }
    }

    fn process(&mut self, frame: Frame, live: bool) -> AnnotatedFrame {
        if !self.config.detection_enabled {
            return AnnotatedFrame {
                frame,
                detections: Vec::new(),
                persisted: Vec::new(),
            };
        }

        let detect_start = Instant::now();
        let detections = match self.parts.detector.detect(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                self.report_error(format!("Detection failed: {e}"), live);
                Vec::new()
            }
        };
        self.parts
            .logger
            .timing("detect", elapsed_ms(detect_start));
        self.parts
            .logger
            .metric("detections", detections.len() as f64);

        let gate_start = Instant::now();
        let persisted = self.persist(&detections, Instant::now(), live);
        self.parts.logger.timing("gate", elapsed_ms(gate_start));

        AnnotatedFrame {
            frame,
            detections,
            persisted,
        }
    }

    /// Runs the gate once per class for this frame, on that class's most
    /// confident detection, and stores what it accepts.
    fn persist(&mut self, detections: &[Detection], now: Instant, live: bool) -> Vec<Detection> {
        let mut persisted = Vec::new();
        for det in strongest_per_class(detections) {
            let decision = self.parts.gate.evaluate(&det.class_name, det.confidence, now);
            if !decision.is_accept() {
                log::trace!("{}: {decision:?}", det.class_name);
                continue;
            }

            let saved = match self.parts.store.as_mut() {
                Some(store) => store.save(&det.class_name, det.confidence),
                None => Ok(true),
            };
            match saved {
                Ok(true) => {
                    log::info!("Fatigue event: {}", det.label());
                    self.parts.logger.count("persisted");
                    persisted.push(det.clone());
                }
                Ok(false) => log::debug!("Store refused duplicate {}", det.class_name),
                Err(e) => {
                    log::warn!("Failed to save {}: {e}", det.class_name);
                    self.report_error(format!("Failed to save {}: {e}", det.class_name), live);
                }
            }
        }
        persisted
    }

    /// Hands a frame to the consumer. Returns false once the consumer is gone.
    fn deliver(&mut self, annotated: AnnotatedFrame, live: bool) -> bool {
        self.send_in_loop(PipelineEvent::FrameReady(annotated), live, "dropped_frames")
    }

    /// Reports a recoverable failure from inside the capture loop.
    fn report_error(&mut self, message: String, live: bool) -> bool {
        self.send_in_loop(PipelineEvent::Error(message), live, "dropped_events")
    }

    /// Live sources never wait on the consumer: a full channel drops the
    /// event and bumps `drop_counter`. Finite sources wait, re-checking the
    /// stop flag. Returns false once the consumer is gone or stop was
    /// requested while waiting.
    fn send_in_loop(&mut self, event: PipelineEvent, live: bool, drop_counter: &str) -> bool {
        if live {
            return match self.tx.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.parts.logger.count(drop_counter);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            };
        }

        let mut pending = event;
        loop {
            match self.tx.send_timeout(pending, SEND_POLL) {
                Ok(()) => return true,
                Err(SendTimeoutError::Timeout(event)) => {
                    if self.is_stopped() {
                        return false;
                    }
                    pending = event;
                }
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
    }

    /// Session lifecycle events (`Opened`, `Finished`) are never dropped
    /// while the consumer is listening.
    fn send_control(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

/// Keeps the most confident detection of each class, in first-seen order.
fn strongest_per_class(detections: &[Detection]) -> Vec<&Detection> {
    let mut best: Vec<&Detection> = Vec::new();
    for det in detections {
        match best.iter_mut().find(|b| b.class_name == det.class_name) {
            Some(slot) if det.confidence > slot.confidence => *slot = det,
            Some(_) => {}
            None => best.push(det),
        }
    }
    best
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
