use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::shared::constants::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SAVE_INTERVAL_MS, MAX_CONFIDENCE_JUMP, MIN_CONSECUTIVE,
};

/// Outcome of evaluating one detection against the gate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateDecision {
    Accept,
    BelowThreshold,
    CoolingDown { remaining: Duration },
    Seeded,
    ConfidenceJump { delta: f32 },
    Building { count: u32 },
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }
}

/// Per-class tracking state.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassState {
    pub consecutive_count: u32,
    pub last_confidence: f32,
    pub last_accept_time: Option<Instant>,
}

/// Session-scoped debounce turning per-frame classifications into
/// rate-limited events.
///
/// A class is persisted only after two confidence-consistent sightings,
/// and at most once per `min_interval`. State must be reset whenever a
/// capture session starts or stops.
#[derive(Debug)]
pub struct PersistenceGate {
    confidence_threshold: f32,
    min_interval: Duration,
    states: HashMap<String, ClassState>,
}

impl PersistenceGate {
    pub fn new(confidence_threshold: f32, min_interval: Duration) -> Self {
        Self {
            confidence_threshold,
            min_interval,
            states: HashMap::new(),
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn state(&self, class_name: &str) -> Option<&ClassState> {
        self.states.get(class_name)
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Clears every class; the next sighting of any class seeds again.
    pub fn reset(&mut self) {
        self.states.clear();
    }

    pub fn evaluate(&mut self, class_name: &str, confidence: f32, now: Instant) -> GateDecision {
        if confidence < self.confidence_threshold {
            return GateDecision::BelowThreshold;
        }

        let Some(state) = self.states.get_mut(class_name) else {
            self.states.insert(
                class_name.to_string(),
                ClassState {
                    consecutive_count: 1,
                    last_confidence: confidence,
                    last_accept_time: None,
                },
            );
            return GateDecision::Seeded;
        };

        if let Some(last) = state.last_accept_time {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return GateDecision::CoolingDown {
                    remaining: self.min_interval - elapsed,
                };
            }
        }

        let delta = (confidence - state.last_confidence).abs();
        if delta > MAX_CONFIDENCE_JUMP {
            state.consecutive_count = 0;
            return GateDecision::ConfidenceJump { delta };
        }

        state.consecutive_count += 1;
        if state.consecutive_count < MIN_CONSECUTIVE {
            return GateDecision::Building {
                count: state.consecutive_count,
            };
        }

        state.last_confidence = confidence;
        state.last_accept_time = Some(now);
        GateDecision::Accept
    }
}

impl Default for PersistenceGate {
    fn default() -> Self {
        Self::new(
            DEFAULT_CONFIDENCE_THRESHOLD,
            Duration::from_millis(DEFAULT_SAVE_INTERVAL_MS),
        )
    }
}
