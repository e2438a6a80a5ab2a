// src/apply/orchestrator.rs
//
// Sequences the write-back of accepted recommendations:
// snapshot -> filter `set` lines -> PID group writes -> `save` (reboot).

use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::apply::channels::{
    CommandChannel, ConnectionEvent, ConnectionMonitor, ParameterChannel, ParameterGroup,
    ParameterWrite, SnapshotService,
};
use crate::error::{ChannelError, OrchestratorError};
use crate::progress::{ApplyProgress, ApplyProgressEvent};
use crate::recommendation::Recommendation;

pub use crate::progress::ApplyStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ApplyState {
    Idle,
    Confirming,
    Applying,
    Done,
    Error,
}

impl ApplyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyState::Idle => "idle",
            ApplyState::Confirming => "confirming",
            ApplyState::Applying => "applying",
            ApplyState::Done => "done",
            ApplyState::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyRequest {
    pub filter_recs: Vec<Recommendation>,
    pub pid_recs: Vec<Recommendation>,
    pub feedforward_recs: Vec<Recommendation>,
    pub create_snapshot: bool,
}

impl ApplyRequest {
    /// Builds a request from analyzer output, dropping no-change entries and
    /// moving feedforward settings out of the PID list.
    pub fn from_recommendations(
        filter_recs: &[Recommendation],
        pid_recs: &[Recommendation],
        create_snapshot: bool,
    ) -> Self {
        let (feedforward_recs, pid_recs): (Vec<_>, Vec<_>) = pid_recs
            .iter()
            .filter(|r| r.is_change())
            .cloned()
            .partition(|r| ParameterGroup::for_setting(&r.setting) == Some(ParameterGroup::Feedforward));
        ApplyRequest {
            filter_recs: filter_recs.iter().filter(|r| r.is_change()).cloned().collect(),
            pid_recs,
            feedforward_recs,
            create_snapshot,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filter_recs.is_empty() && self.pid_recs.is_empty() && self.feedforward_recs.is_empty()
    }

    /// PID and feedforward recommendations grouped per structured write, in
    /// write order. Settings outside any group go with the feedforward group.
    pub fn parameter_writes(&self) -> Vec<(ParameterWrite, usize)> {
        let mut grouped: BTreeMap<ParameterGroup, Vec<(String, i64)>> = BTreeMap::new();
        for rec in self.pid_recs.iter().chain(self.feedforward_recs.iter()) {
            let group = ParameterGroup::for_setting(&rec.setting).unwrap_or(ParameterGroup::Feedforward);
            grouped
                .entry(group)
                .or_default()
                .push((rec.setting.clone(), rec.device_value()));
        }
        ParameterGroup::all()
            .into_iter()
            .filter_map(|group| {
                let values = grouped.remove(&group)?;
                let count = values.len();
                Some((ParameterWrite { group, values }, count))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApplyResult {
    pub success: bool,
    pub applied_filters: usize,
    pub applied_pids: usize,
    pub snapshot_id: Option<String>,
    pub rebooted: bool,
    pub failed_stage: Option<ApplyStage>,
    pub failed_group: Option<String>,
    pub error: Option<String>,
}

/// A CLI reply that reports a rejected command.
fn check_reply(line: &str, reply: String) -> Result<String, ChannelError> {
    let lower = reply.to_lowercase();
    if lower.contains("error") || lower.contains("invalid") {
        Err(ChannelError::Rejected(format!("{}: {}", line, reply.trim())))
    } else {
        Ok(reply)
    }
}

struct StageFailure {
    stage: ApplyStage,
    group: Option<String>,
    error: ChannelError,
}

impl StageFailure {
    fn at(stage: ApplyStage) -> impl FnOnce(ChannelError) -> StageFailure {
        move |error| StageFailure {
            stage,
            group: None,
            error,
        }
    }
}

pub struct ApplyOrchestrator<'a> {
    commands: &'a mut dyn CommandChannel,
    parameters: &'a mut dyn ParameterChannel,
    snapshots: &'a mut dyn SnapshotService,
    connection: &'a mut dyn ConnectionMonitor,
    state: ApplyState,
}

impl<'a> ApplyOrchestrator<'a> {
    pub fn new(
        commands: &'a mut dyn CommandChannel,
        parameters: &'a mut dyn ParameterChannel,
        snapshots: &'a mut dyn SnapshotService,
        connection: &'a mut dyn ConnectionMonitor,
    ) -> Self {
        Self {
            commands,
            parameters,
            snapshots,
            connection,
            state: ApplyState::Idle,
        }
    }

    pub fn state(&self) -> ApplyState {
        self.state
    }

    /// Enters the confirmation gate.
    pub fn begin_confirm(&mut self) -> Result<(), OrchestratorError> {
        match self.state {
            ApplyState::Idle | ApplyState::Done | ApplyState::Error | ApplyState::Confirming => {
                self.state = ApplyState::Confirming;
                Ok(())
            }
            ApplyState::Applying => Err(OrchestratorError::InvalidState {
                action: "confirm",
                state: self.state.as_str(),
            }),
        }
    }

    pub fn cancel(&mut self) -> Result<(), OrchestratorError> {
        match self.state {
            ApplyState::Confirming => {
                self.state = ApplyState::Idle;
                Ok(())
            }
            other => Err(OrchestratorError::InvalidState {
                action: "cancel",
                state: other.as_str(),
            }),
        }
    }

    /// Runs the full write-back. Device failures are reported in the
    /// result; only misuse of the state machine is an `Err`.
    pub fn apply(
        &mut self,
        request: &ApplyRequest,
        progress: &mut dyn ApplyProgress,
    ) -> Result<ApplyResult, OrchestratorError> {
        match self.state {
            ApplyState::Confirming | ApplyState::Done | ApplyState::Error => {}
            other => {
                return Err(OrchestratorError::InvalidState {
                    action: "apply",
                    state: other.as_str(),
                })
            }
        }
        self.state = ApplyState::Applying;

        let mut result = ApplyResult::default();
        let outcome = self.run(request, progress, &mut result);
        match outcome {
            Ok(()) => {
                result.success = true;
                self.state = ApplyState::Done;
                info!(
                    "Apply complete: {} filter and {} PID setting(s) written{}",
                    result.applied_filters,
                    result.applied_pids,
                    if result.rebooted { ", device rebooting" } else { "" }
                );
            }
            Err(failure) => {
                error!(
                    "Apply failed at {} stage{}: {}",
                    failure.stage,
                    failure
                        .group
                        .as_deref()
                        .map(|g| format!(" ({})", g))
                        .unwrap_or_default(),
                    failure.error
                );
                result.success = false;
                result.failed_stage = Some(failure.stage);
                result.failed_group = failure.group;
                result.error = Some(failure.error.to_string());
                self.state = ApplyState::Error;
            }
        }
        Ok(result)
    }

    fn run(
        &mut self,
        request: &ApplyRequest,
        progress: &mut dyn ApplyProgress,
        result: &mut ApplyResult,
    ) -> Result<(), StageFailure> {
        let mut report = |stage: ApplyStage, message: String, percent: f64| {
            progress.report(ApplyProgressEvent {
                stage,
                message,
                percent,
            });
        };

        if request.is_empty() {
            info!("Nothing to apply");
            report(ApplyStage::Reboot, "Nothing to apply".to_string(), 100.0);
            return Ok(());
        }

        if request.create_snapshot {
            report(ApplyStage::Snapshot, "Creating configuration snapshot".to_string(), 0.0);
            let id = self
                .snapshots
                .create("Pre-tuning (auto)")
                .map_err(StageFailure::at(ApplyStage::Snapshot))?;
            info!("Snapshot {} created", id);
            result.snapshot_id = Some(id);
        }

        let filter_count = request.filter_recs.len();
        for (i, rec) in request.filter_recs.iter().enumerate() {
            let line = format!("set {} = {}", rec.setting, rec.device_value());
            report(
                ApplyStage::Filter,
                line.clone(),
                10.0 + 40.0 * i as f64 / filter_count as f64,
            );
            self.commands
                .send_line(&line)
                .and_then(|reply| check_reply(&line, reply))
                .map_err(StageFailure::at(ApplyStage::Filter))?;
            result.applied_filters += 1;
        }

        let writes = request.parameter_writes();
        let write_count = writes.len();
        for (i, (write, settings)) in writes.iter().enumerate() {
            report(
                ApplyStage::Pid,
                format!("Writing {} ({} value(s))", write.group, settings),
                50.0 + 40.0 * i as f64 / write_count as f64,
            );
            self.parameters.write(write).map_err(|error| StageFailure {
                stage: ApplyStage::Pid,
                group: Some(write.group.to_string()),
                error,
            })?;
            result.applied_pids += settings;
        }

        report(ApplyStage::Reboot, "Saving and rebooting".to_string(), 90.0);
        self.connection.notify(ConnectionEvent::ExpectDisconnect);
        let saved = self
            .commands
            .send_line("save")
            .and_then(|reply| check_reply("save", reply));
        match saved {
            Ok(_) => {}
            Err(ChannelError::Disconnected) => result.rebooted = true,
            Err(error) => {
                warn!("Save failed; cancelling expected disconnect");
                self.connection.notify(ConnectionEvent::CancelExpectedDisconnect);
                return Err(StageFailure {
                    stage: ApplyStage::Reboot,
                    group: None,
                    error,
                });
            }
        }
        report(ApplyStage::Reboot, "Settings saved".to_string(), 100.0);
        Ok(())
    }
}
