// src/data_input/flight_data.rs

use serde::Serialize;
use std::collections::BTreeMap;

use crate::axis_names::AXIS_COUNT;
use crate::data_input::filter_settings::{parse_filter_settings, FilterSettings};
use crate::data_input::frame_decoder::LogEvent;
use crate::data_input::log_header::LogHeader;
use crate::data_input::pid_metadata::{parse_pid_metadata, PidMetadata};

/// A time-monotonic signal: parallel timestamps (seconds) and values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            times: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub fn from_parts(times: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(times.len(), values.len());
        Self { times, values }
    }

    pub fn push(&mut self, time: f64, value: f64) {
        self.times.push(time);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_monotonic(&self) -> bool {
        self.times.windows(2).all(|w| w[1] >= w[0])
    }

    /// Value of the sample whose timestamp is closest to `time`.
    pub fn value_at_nearest(&self, time: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let idx = self.times.partition_point(|&t| t < time);
        let best = if idx == 0 {
            0
        } else if idx >= self.times.len() {
            self.times.len() - 1
        } else if (self.times[idx] - time).abs() < (time - self.times[idx - 1]).abs() {
            idx
        } else {
            idx - 1
        };
        Some(self.values[best])
    }

    /// Resamples onto `reference`'s timestamps by nearest-sample lookup.
    /// Returns an empty series when `self` has no samples.
    pub fn aligned_to(&self, reference: &TimeSeries) -> TimeSeries {
        if self.is_empty() {
            return TimeSeries::new();
        }
        let values = reference
            .times
            .iter()
            .filter_map(|&t| self.value_at_nearest(t))
            .collect();
        TimeSeries::from_parts(reference.times.clone(), values)
    }
}

/// Raw decoded main-frame columns, one `Vec` per header field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable {
    pub names: Vec<String>,
    pub columns: Vec<Vec<i64>>,
}

impl FieldTable {
    pub fn new(names: Vec<String>) -> Self {
        let columns = vec![Vec::new(); names.len()];
        Self { names, columns }
    }

    pub fn push_row(&mut self, row: &[i64]) {
        for (column, &value) in self.columns.iter_mut().zip(row) {
            column.push(value);
        }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn column(&self, name: &str) -> Option<&[i64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }
}

/// Typed per-signal series of one session. Signals missing from the log are
/// empty series.
#[derive(Debug, Clone, Default)]
pub struct FlightData {
    pub sample_rate_hz: f64,
    pub duration_s: f64,
    pub frame_count: usize,
    pub gyro: [TimeSeries; AXIS_COUNT],
    pub gyro_unfiltered: [TimeSeries; AXIS_COUNT],
    /// Roll, pitch, yaw in deg/s, then throttle in percent.
    pub setpoint: [TimeSeries; 4],
    pub p_term: [TimeSeries; AXIS_COUNT],
    pub i_term: [TimeSeries; AXIS_COUNT],
    pub d_term: [TimeSeries; AXIS_COUNT],
    pub f_term: [TimeSeries; AXIS_COUNT],
    pub motors: Vec<TimeSeries>,
    pub erpm: Vec<TimeSeries>,
    pub debug: Vec<TimeSeries>,
    /// S/G-frame channels keyed by field name, at their own (sparser) rate.
    pub slow: BTreeMap<String, TimeSeries>,
    pub raw: FieldTable,
    /// Gains and filter configuration the session was flown with.
    pub pid_metadata: PidMetadata,
    pub filter_settings: FilterSettings,
}

fn series_for(table: &FieldTable, times: &[f64], name: &str, scale: f64) -> TimeSeries {
    match table.column(name) {
        Some(column) => TimeSeries::from_parts(
            times.to_vec(),
            column.iter().map(|&v| v as f64 * scale).collect(),
        ),
        None => TimeSeries::new(),
    }
}

fn indexed_series(table: &FieldTable, times: &[f64], prefix: &str) -> Vec<TimeSeries> {
    (0..)
        .map(|i| format!("{}[{}]", prefix, i))
        .take_while(|name| table.column(name).is_some())
        .map(|name| series_for(table, times, &name, 1.0))
        .collect()
}

fn axis_series(table: &FieldTable, times: &[f64], prefix: &str) -> [TimeSeries; AXIS_COUNT] {
    std::array::from_fn(|axis| series_for(table, times, &format!("{}[{}]", prefix, axis), 1.0))
}

impl FlightData {
    /// Maps decoded columns onto typed signals.
    pub fn from_table(
        header: &LogHeader,
        raw: FieldTable,
        slow: BTreeMap<String, TimeSeries>,
    ) -> Self {
        let frame_count = raw.row_count();
        let pid_metadata = parse_pid_metadata(&header.metadata);
        let filter_settings = parse_filter_settings(&header.metadata);
        let times: Vec<f64> = match raw.column("time") {
            Some(column) => column.iter().map(|&t| t as f64 * 1e-6).collect(),
            None => Vec::new(),
        };
        if times.is_empty() {
            return FlightData {
                frame_count,
                raw,
                slow,
                pid_metadata,
                filter_settings,
                ..FlightData::default()
            };
        }

        let duration_s = times.last().copied().unwrap_or(0.0) - times[0];
        let sample_rate_hz = estimate_sample_rate(&times)
            .or_else(|| header.header_sample_rate_hz())
            .unwrap_or(0.0);

        let throttle = if raw.column("setpoint[3]").is_some() {
            series_for(&raw, &times, "setpoint[3]", 0.1)
        } else if let Some(column) = raw.column("rcCommand[3]") {
            TimeSeries::from_parts(
                times.clone(),
                column
                    .iter()
                    .map(|&v| ((v as f64 - 1000.0) / 10.0).clamp(0.0, 100.0))
                    .collect(),
            )
        } else {
            TimeSeries::new()
        };

        let [roll_sp, pitch_sp, yaw_sp] = axis_series(&raw, &times, "setpoint");

        FlightData {
            sample_rate_hz,
            duration_s,
            frame_count,
            gyro: axis_series(&raw, &times, "gyroADC"),
            gyro_unfiltered: axis_series(&raw, &times, "gyroUnfilt"),
            setpoint: [roll_sp, pitch_sp, yaw_sp, throttle],
            p_term: axis_series(&raw, &times, "axisP"),
            i_term: axis_series(&raw, &times, "axisI"),
            d_term: axis_series(&raw, &times, "axisD"),
            f_term: axis_series(&raw, &times, "axisF"),
            motors: indexed_series(&raw, &times, "motor"),
            erpm: indexed_series(&raw, &times, "eRPM"),
            debug: indexed_series(&raw, &times, "debug"),
            slow,
            raw,
            pid_metadata,
            filter_settings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count == 0
    }

    pub fn throttle(&self) -> &TimeSeries {
        &self.setpoint[3]
    }
}

/// Sample rate from the mean timestamp delta.
pub fn estimate_sample_rate(times: &[f64]) -> Option<f64> {
    if times.len() < 2 {
        return None;
    }
    let span = times[times.len() - 1] - times[0];
    if span <= 0.0 {
        return None;
    }
    Some((times.len() - 1) as f64 / span)
}

/// One armed-to-disarmed recording inside a log file.
#[derive(Debug, Clone)]
pub struct LogSession {
    pub index: usize,
    pub header: LogHeader,
    pub flight_data: FlightData,
    pub events: Vec<LogEvent>,
    pub corrupted_frame_count: usize,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ParseResult {
    pub sessions: Vec<LogSession>,
    pub corrupted_frame_count: usize,
    pub warnings: Vec<String>,
}

impl ParseResult {
    pub fn session(&self, index: usize) -> Option<&LogSession> {
        self.sessions.iter().find(|s| s.index == index)
    }
}
