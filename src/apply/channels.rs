// src/apply/channels.rs
//
// Collaborator seams of the apply sequence: the line-oriented CLI channel,
// the binary parameter channel, snapshot storage and the connection
// lifecycle owner.

use log::info;
use serde::Serialize;
use std::fmt;

use crate::axis_names::{AXIS_COUNT, AXIS_KEYS};
use crate::error::ChannelError;

/// Line-oriented command channel (firmware CLI). Returns the device's reply.
pub trait CommandChannel {
    fn send_line(&mut self, line: &str) -> Result<String, ChannelError>;
}

/// Unit of one structured write on the binary channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ParameterGroup {
    /// P/I/D gains of one axis (0=roll, 1=pitch, 2=yaw).
    PidAxis(usize),
    /// Per-axis feedforward gains and the global feedforward settings.
    Feedforward,
}

impl ParameterGroup {
    /// Group a setting key belongs to, or `None` for non-PID settings.
    pub fn for_setting(setting: &str) -> Option<Self> {
        if setting.starts_with("feedforward_") {
            return Some(ParameterGroup::Feedforward);
        }
        let (prefix, axis_key) = setting.rsplit_once('_')?;
        let axis = AXIS_KEYS.iter().position(|k| *k == axis_key)?;
        match prefix {
            "p" | "i" | "d" | "d_min" => Some(ParameterGroup::PidAxis(axis)),
            "f" => Some(ParameterGroup::Feedforward),
            _ => None,
        }
    }

    /// Write order: roll, pitch, yaw, then feedforward.
    pub fn all() -> Vec<ParameterGroup> {
        let mut groups: Vec<ParameterGroup> = (0..AXIS_COUNT).map(ParameterGroup::PidAxis).collect();
        groups.push(ParameterGroup::Feedforward);
        groups
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterGroup::PidAxis(axis) => {
                write!(f, "pid_{}", AXIS_KEYS.get(*axis).copied().unwrap_or("unknown"))
            }
            ParameterGroup::Feedforward => f.write_str("feedforward"),
        }
    }
}

/// Settings written together in one group, as `(setting key, device value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterWrite {
    pub group: ParameterGroup,
    pub values: Vec<(String, i64)>,
}

/// Structured binary parameter channel (MSP).
pub trait ParameterChannel {
    fn write(&mut self, write: &ParameterWrite) -> Result<(), ChannelError>;
}

/// Stores a configuration snapshot and returns its id.
pub trait SnapshotService {
    fn create(&mut self, label: &str) -> Result<String, ChannelError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionEvent {
    /// The next disconnect is the reboot triggered by `save`.
    ExpectDisconnect,
    CancelExpectedDisconnect,
}

/// Owner of the connection lifecycle, told about upcoming reboots.
pub trait ConnectionMonitor {
    fn notify(&mut self, event: ConnectionEvent);
}

/// Monitor for offline use that only logs the events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogConnectionMonitor;

impl ConnectionMonitor for LogConnectionMonitor {
    fn notify(&mut self, event: ConnectionEvent) {
        info!("Connection event: {:?}", event);
    }
}
