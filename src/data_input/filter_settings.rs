// src/data_input/filter_settings.rs

use serde::Serialize;
use std::collections::HashMap;

/// Lowpass filter types as numbered by the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FilterType {
    PT1,
    Biquad,
    PT2,
    PT3,
}

impl FilterType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(FilterType::PT1),
            1 => Some(FilterType::Biquad),
            2 => Some(FilterType::PT2),
            3 => Some(FilterType::PT3),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterType::PT1 => "PT1",
            FilterType::Biquad => "BIQUAD",
            FilterType::PT2 => "PT2",
            FilterType::PT3 => "PT3",
        }
    }
}

/// Gyro/D-term lowpass and dynamic notch configuration from the log header.
/// A cutoff of 0 in the header means the filter is disabled and is kept as
/// `Some(0.0)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterSettings {
    pub gyro_lpf1_type: Option<FilterType>,
    pub gyro_lpf1_static_hz: Option<f64>,
    pub gyro_lpf1_dyn_hz: Option<(f64, f64)>,
    pub gyro_lpf2_static_hz: Option<f64>,
    pub dterm_lpf1_type: Option<FilterType>,
    pub dterm_lpf1_static_hz: Option<f64>,
    pub dterm_lpf1_dyn_hz: Option<(f64, f64)>,
    pub dterm_lpf2_static_hz: Option<f64>,
    pub dyn_notch_min_hz: Option<f64>,
    pub dyn_notch_max_hz: Option<f64>,
    pub dyn_notch_count: Option<u32>,
    pub dyn_notch_q: Option<u32>,
    pub rpm_filter_harmonics: Option<u32>,
    pub motor_poles: Option<u32>,
}

impl FilterSettings {
    /// Current value of a firmware CLI filter setting.
    pub fn setting_value(&self, setting: &str) -> Option<f64> {
        match setting {
            "gyro_lpf1_static_hz" => self.gyro_lpf1_static_hz,
            "gyro_lpf2_static_hz" => self.gyro_lpf2_static_hz,
            "dterm_lpf1_static_hz" => self.dterm_lpf1_static_hz,
            "dterm_lpf2_static_hz" => self.dterm_lpf2_static_hz,
            "dyn_notch_min_hz" => self.dyn_notch_min_hz,
            "dyn_notch_max_hz" => self.dyn_notch_max_hz,
            "gyro_lpf1_dyn_min_hz" => self.gyro_lpf1_dyn_hz.map(|(min, _)| min),
            "gyro_lpf1_dyn_max_hz" => self.gyro_lpf1_dyn_hz.map(|(_, max)| max),
            "dterm_lpf1_dyn_min_hz" => self.dterm_lpf1_dyn_hz.map(|(min, _)| min),
            "dterm_lpf1_dyn_max_hz" => self.dterm_lpf1_dyn_hz.map(|(_, max)| max),
            _ => None,
        }
    }

    pub fn rpm_filter_enabled(&self) -> bool {
        self.rpm_filter_harmonics.map_or(false, |h| h > 0)
    }
}

fn parse_hz(header_map: &HashMap<String, String>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| header_map.get(*key))
        .find_map(|s| s.trim_matches('"').trim().parse::<f64>().ok())
}

fn parse_u32(header_map: &HashMap<String, String>, key: &str) -> Option<u32> {
    header_map.get(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn parse_type(header_map: &HashMap<String, String>, key: &str) -> Option<FilterType> {
    parse_u32(header_map, key).and_then(FilterType::from_u32)
}

/// Parse dynamic cutoff string format "min,max" into a tuple.
/// Returns `None` for malformed values or when dynamic mode is off (0,0).
fn parse_dynamic_cutoffs(header_map: &HashMap<String, String>, key: &str) -> Option<(f64, f64)> {
    let value = header_map.get(key)?;
    let parts: Vec<&str> = value.trim_matches('"').split(',').collect();
    if parts.len() != 2 {
        return None;
    }
    let min_cutoff = parts[0].trim().parse::<f64>().ok()?;
    let max_cutoff = parts[1].trim().parse::<f64>().ok()?;
    (min_cutoff > 0.0 && max_cutoff > 0.0).then_some((min_cutoff, max_cutoff))
}

/// Parse filter settings using modern Betaflight names first and the
/// pre-4.0 names (`gyro_lowpass_hz`, `dterm_lowpass_hz`, ...) as fallback.
pub fn parse_filter_settings(headers: &[(String, String)]) -> FilterSettings {
    let header_map: HashMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    FilterSettings {
        gyro_lpf1_type: parse_type(&header_map, "gyro_lpf1_type")
            .or_else(|| parse_type(&header_map, "gyro_lowpass_type")),
        gyro_lpf1_static_hz: parse_hz(&header_map, &["gyro_lpf1_static_hz", "gyro_lowpass_hz"]),
        gyro_lpf1_dyn_hz: parse_dynamic_cutoffs(&header_map, "gyro_lpf1_dyn_hz"),
        gyro_lpf2_static_hz: parse_hz(&header_map, &["gyro_lpf2_static_hz", "gyro_lowpass2_hz"]),
        dterm_lpf1_type: parse_type(&header_map, "dterm_lpf1_type")
            .or_else(|| parse_type(&header_map, "dterm_filter_type")),
        dterm_lpf1_static_hz: parse_hz(&header_map, &["dterm_lpf1_static_hz", "dterm_lowpass_hz"]),
        dterm_lpf1_dyn_hz: parse_dynamic_cutoffs(&header_map, "dterm_lpf1_dyn_hz"),
        dterm_lpf2_static_hz: parse_hz(
            &header_map,
            &["dterm_lpf2_static_hz", "dterm_lowpass2_hz"],
        ),
        dyn_notch_min_hz: parse_hz(&header_map, &["dyn_notch_min_hz"]),
        dyn_notch_max_hz: parse_hz(&header_map, &["dyn_notch_max_hz"]),
        dyn_notch_count: parse_u32(&header_map, "dyn_notch_count"),
        dyn_notch_q: parse_u32(&header_map, "dyn_notch_q"),
        rpm_filter_harmonics: parse_u32(&header_map, "rpm_filter_harmonics")
            .or_else(|| parse_u32(&header_map, "gyro_rpm_notch_harmonics")),
        motor_poles: parse_u32(&header_map, "motor_poles"),
    }
}
