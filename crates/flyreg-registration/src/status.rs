//! Status events for registration runs.
//!
//! Stages report what they are doing through a [`StatusTracker`], which fans
//! events out to any number of [`StatusSink`]s. Rendering is up to the sink.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Pipeline and batch stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    EstimatePose,
    RefineRoll,
    CorrectIntensity,
    BuildTransform,
    Resample,
    GenerateMask,
    ApplyMask,
    Save,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Load => "load",
            Stage::EstimatePose => "estimate-pose",
            Stage::RefineRoll => "refine-roll",
            Stage::CorrectIntensity => "correct-intensity",
            Stage::BuildTransform => "build-transform",
            Stage::Resample => "resample",
            Stage::GenerateMask => "generate-mask",
            Stage::ApplyMask => "apply-mask",
            Stage::Save => "save",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusEvent {
    pub stage: Stage,
    pub sample_id: String,
    pub message: String,
    pub level: StatusLevel,
    /// Time since the tracker was created.
    pub elapsed: Duration,
}

/// Receives status events; must tolerate calls from several worker threads.
pub trait StatusSink: Send + Sync {
    fn on_event(&self, event: &StatusEvent);
}

/// Renders events through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn on_event(&self, event: &StatusEvent) {
        let elapsed = event.elapsed.as_secs_f64();
        match event.level {
            StatusLevel::Info => tracing::info!(
                sample = %event.sample_id,
                stage = %event.stage,
                "{} ({elapsed:.2}s)",
                event.message
            ),
            StatusLevel::Warn => tracing::warn!(
                sample = %event.sample_id,
                stage = %event.stage,
                "{}",
                event.message
            ),
            StatusLevel::Error => tracing::error!(
                sample = %event.sample_id,
                stage = %event.stage,
                "{}",
                event.message
            ),
        }
    }
}

/// Records every event it receives.
#[derive(Debug, Clone, Default)]
pub struct HistoryStatusSink {
    history: Arc<Mutex<Vec<StatusEvent>>>,
}

impl HistoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StatusEvent> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stages reported for `sample_id`, in order.
    pub fn stages_of(&self, sample_id: &str) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter(|e| e.sample_id == sample_id)
            .map(|e| e.stage)
            .collect()
    }

    pub fn clear(&self) {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl StatusSink for HistoryStatusSink {
    fn on_event(&self, event: &StatusEvent) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Fans events out to registered sinks.
#[derive(Clone)]
pub struct StatusTracker {
    sinks: Vec<Arc<dyn StatusSink>>,
    start: Instant,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self {
            sinks: Vec::new(),
            start: Instant::now(),
        }
    }
}

impl fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusTracker")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker that only logs through `tracing`.
    pub fn tracing() -> Self {
        Self::new().with_sink(Arc::new(TracingStatusSink))
    }

    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn StatusSink>) {
        self.sinks.push(sink);
    }

    pub fn emit(&self, stage: Stage, sample_id: &str, level: StatusLevel, message: impl Into<String>) {
        let event = StatusEvent {
            stage,
            sample_id: sample_id.to_owned(),
            message: message.into(),
            level,
            elapsed: self.start.elapsed(),
        };
        for sink in &self.sinks {
            sink.on_event(&event);
        }
    }

    pub fn info(&self, stage: Stage, sample_id: &str, message: impl Into<String>) {
        self.emit(stage, sample_id, StatusLevel::Info, message);
    }

    pub fn warn(&self, stage: Stage, sample_id: &str, message: impl Into<String>) {
        self.emit(stage, sample_id, StatusLevel::Warn, message);
    }

    pub fn error(&self, stage: Stage, sample_id: &str, message: impl Into<String>) {
        self.emit(stage, sample_id, StatusLevel::Error, message);
    }
}
