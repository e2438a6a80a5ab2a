// src/apply/mod.rs

pub mod channels;
pub mod cli_script;
pub mod msp;
pub mod orchestrator;

pub use channels::{
    CommandChannel, ConnectionEvent, ConnectionMonitor, ParameterChannel, ParameterGroup,
    ParameterWrite, SnapshotService,
};
pub use orchestrator::{ApplyOrchestrator, ApplyRequest, ApplyResult, ApplyStage, ApplyState};
