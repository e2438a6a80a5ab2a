// src/progress.rs
//
// Progress events and sinks for the long-running stages. Every sink trait is
// implemented for `FnMut(Event)` closures so callers can pass `&mut |e| ...`.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecodeProgressEvent {
    pub bytes_processed: usize,
    pub total_bytes: usize,
    pub current_session: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisProgressEvent {
    pub step: &'static str,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplyProgressEvent {
    pub stage: ApplyStage,
    pub message: String,
    pub percent: f64,
}

/// Write-back stages in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyStage {
    Snapshot,
    Filter,
    Pid,
    Reboot,
}

impl ApplyStage {
    pub fn as_str(self) -> &'static str {
        match self {
            ApplyStage::Snapshot => "snapshot",
            ApplyStage::Filter => "filter",
            ApplyStage::Pid => "pid",
            ApplyStage::Reboot => "reboot",
        }
    }
}

impl std::fmt::Display for ApplyStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait DecodeProgress {
    fn report(&mut self, event: DecodeProgressEvent);
}

pub trait AnalysisProgress {
    fn report(&mut self, event: AnalysisProgressEvent);
}

pub trait ApplyProgress {
    fn report(&mut self, event: ApplyProgressEvent);
}

impl<F: FnMut(DecodeProgressEvent)> DecodeProgress for F {
    fn report(&mut self, event: DecodeProgressEvent) {
        self(event)
    }
}

impl<F: FnMut(AnalysisProgressEvent)> AnalysisProgress for F {
    fn report(&mut self, event: AnalysisProgressEvent) {
        self(event)
    }
}

impl<F: FnMut(ApplyProgressEvent)> ApplyProgress for F {
    fn report(&mut self, event: ApplyProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl DecodeProgress for NoProgress {
    fn report(&mut self, _event: DecodeProgressEvent) {}
}

impl AnalysisProgress for NoProgress {
    fn report(&mut self, _event: AnalysisProgressEvent) {}
}

impl ApplyProgress for NoProgress {
    fn report(&mut self, _event: ApplyProgressEvent) {}
}
