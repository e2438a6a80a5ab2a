// src/data_input/pid_metadata.rs

use serde::Serialize;
use std::collections::HashMap;

use crate::axis_names::{axis_setting, AXIS_COUNT};

/// Firmware family, detected from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FirmwareType {
    Betaflight,
    EmuFlight,
    Inav,
    #[default]
    Unknown,
}

/// Gains for a single axis
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AxisPid {
    pub p: Option<u32>,
    pub i: Option<u32>,
    pub d: Option<u32>,
    pub d_min: Option<u32>, // D-Min for Betaflight 4.x
    pub d_max: Option<u32>, // D-Max for Betaflight 4.6+
    pub ff: Option<u32>,
}

impl AxisPid {
    /// Short form for reports, e.g. `P:45 I:80 D:40 FF:120`
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(p) = self.p {
            parts.push(format!("P:{}", p));
        }
        if let Some(i) = self.i {
            parts.push(format!("I:{}", i));
        }
        match (self.d, self.d_min) {
            (Some(d), Some(d_min)) if d_min != d && d_min > 0 => {
                parts.push(format!("D:{}/{}", d_min, d))
            }
            (Some(d), _) => parts.push(format!("D:{}", d)),
            _ => {}
        }
        if let Some(ff) = self.ff.filter(|&ff| ff > 0) {
            parts.push(format!("FF:{}", ff));
        }
        parts.join(" ")
    }
}

/// Current PID and feedforward configuration as logged in the header
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PidMetadata {
    pub axes: [AxisPid; AXIS_COUNT],
    pub feedforward_boost: Option<u32>,
    pub feedforward_smooth_factor: Option<u32>,
    pub firmware_type: FirmwareType,
}

impl PidMetadata {
    /// Gains for an axis (0=roll, 1=pitch, 2=yaw)
    pub fn axis(&self, axis_index: usize) -> Option<&AxisPid> {
        self.axes.get(axis_index)
    }

    /// Current value of a firmware CLI setting such as `p_roll`,
    /// `f_yaw` or `feedforward_boost`.
    pub fn setting_value(&self, setting: &str) -> Option<f64> {
        match setting {
            "feedforward_boost" => return self.feedforward_boost.map(f64::from),
            "feedforward_smooth_factor" => return self.feedforward_smooth_factor.map(f64::from),
            _ => {}
        }
        for (axis_index, axis) in self.axes.iter().enumerate() {
            let value = if setting == axis_setting("p", axis_index) {
                axis.p
            } else if setting == axis_setting("i", axis_index) {
                axis.i
            } else if setting == axis_setting("d", axis_index) {
                axis.d
            } else if setting == axis_setting("d_min", axis_index) {
                axis.d_min
            } else if setting == axis_setting("f", axis_index) {
                axis.ff
            } else {
                continue;
            };
            return value.map(f64::from);
        }
        None
    }

    pub fn has_gains(&self) -> bool {
        self.axes.iter().any(|a| a.p.is_some())
    }
}

fn firmware_from_text(text: &str) -> Option<FirmwareType> {
    let text = text.to_lowercase();
    if text.contains("emuflight") {
        Some(FirmwareType::EmuFlight)
    } else if text.contains("betaflight") {
        Some(FirmwareType::Betaflight)
    } else if text.contains("inav") {
        Some(FirmwareType::Inav)
    } else {
        None
    }
}

/// Detect firmware type from the lowercase header map
fn detect_firmware_type(header_map: &HashMap<String, String>) -> FirmwareType {
    let from_text = ["firmware revision", "firmware type"]
        .iter()
        .filter_map(|key| header_map.get(*key))
        .find_map(|value| firmware_from_text(value));
    if let Some(firmware) = from_text {
        return firmware;
    }

    // Field-specific fallbacks
    if header_map.contains_key("df_yaw") {
        return FirmwareType::EmuFlight;
    }
    if header_map.contains_key("ff_weight") {
        return FirmwareType::Betaflight;
    }
    FirmwareType::Unknown
}

/// Parse PID metadata from header key-value pairs.
/// Missing keys leave the corresponding values as `None`.
pub fn parse_pid_metadata(header_metadata: &[(String, String)]) -> PidMetadata {
    let mut pid_data = PidMetadata::default();
    if header_metadata.is_empty() {
        return pid_data;
    }

    let header_map: HashMap<String, String> = header_metadata
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    pid_data.firmware_type = detect_firmware_type(&header_map);

    for (axis_index, key) in ["rollpid", "pitchpid", "yawpid"].iter().enumerate() {
        if let Some(pid_str) = header_map.get(*key) {
            pid_data.axes[axis_index] = parse_axis_pid(pid_str);
        }
    }

    // Betaflight: ff_weight holds roll,pitch,yaw feedforward
    if let Some(ff_weight_str) = header_map.get("ff_weight") {
        let ff_values = parse_comma_separated_values(ff_weight_str);
        for (axis, &ff) in pid_data.axes.iter_mut().zip(ff_values.iter()) {
            axis.ff = Some(ff);
        }
    }

    // EmuFlight: df_yaw is yaw feedforward only
    if let Some(df_yaw) = header_map.get("df_yaw").and_then(|s| s.trim().parse::<u32>().ok()) {
        if df_yaw > 0 {
            pid_data.axes[2].ff = Some(df_yaw);
        }
    }

    for (list_key, apply) in [
        ("d_min", set_d_min as fn(&mut AxisPid, u32)),
        ("d_max", set_d_max as fn(&mut AxisPid, u32)),
    ] {
        if let Some(list) = header_map.get(list_key) {
            let values = parse_comma_separated_values(list);
            if values.len() >= AXIS_COUNT {
                for (axis, &value) in pid_data.axes.iter_mut().zip(values.iter()) {
                    apply(axis, value);
                }
            }
        }
    }

    pid_data.feedforward_boost = header_map
        .get("feedforward_boost")
        .and_then(|s| s.trim().parse::<u32>().ok());
    pid_data.feedforward_smooth_factor = header_map
        .get("feedforward_smooth_factor")
        .and_then(|s| s.trim().parse::<u32>().ok());

    pid_data
}

fn set_d_min(axis: &mut AxisPid, value: u32) {
    axis.d_min = Some(value);
}

fn set_d_max(axis: &mut AxisPid, value: u32) {
    axis.d_max = Some(value);
}

/// Parse gains from "31,56,21" (P,I,D), "45,80,40,120" (INAV P,I,D,FF)
/// or "57,66,58,58,206" (Betaflight 4.6+ P,I,D,D-Max,FF)
fn parse_axis_pid(pid_str: &str) -> AxisPid {
    let values = parse_comma_separated_values(pid_str);
    let mut axis_pid = AxisPid {
        p: values.first().copied(),
        i: values.get(1).copied(),
        d: values.get(2).copied(),
        ..AxisPid::default()
    };

    match values.len() {
        4 => axis_pid.ff = Some(values[3]),
        5 => {
            axis_pid.d_max = Some(values[3]);
            axis_pid.ff = Some(values[4]);
        }
        _ => {}
    }
    axis_pid
}

fn parse_comma_separated_values(value_str: &str) -> Vec<u32> {
    value_str
        .split(',')
        .filter_map(|s| s.trim().parse::<u32>().ok())
        .collect()
}
