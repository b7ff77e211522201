//! Progress side channel for long-running operations.
//!
//! Orchestration stages report human-readable status lines through a
//! [`ProgressSink`]. The strings carry no functional meaning; callers render
//! them (progress bar, log lines) or drop them.

use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Step(String),
    /// Something was already gone or could not be cleaned up automatically.
    Warning(String),
}

impl ProgressEvent {
    pub fn message(&self) -> &str {
        match self {
            ProgressEvent::Step(msg) | ProgressEvent::Warning(msg) => msg,
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);

    fn step(&self, msg: String) {
        self.emit(ProgressEvent::Step(msg));
    }

    fn warning(&self, msg: String) {
        self.emit(ProgressEvent::Warning(msg));
    }
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Discards everything.
pub struct Silent;

impl ProgressSink for Silent {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Collects events in memory, in the order they were emitted.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<ProgressEvent>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Warning(msg) => Some(msg),
                ProgressEvent::Step(_) => None,
            })
            .collect()
    }
}

impl ProgressSink for Recorder {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
