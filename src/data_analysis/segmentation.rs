// src/data_analysis/segmentation.rs
//
// Selects near-hover windows of gyro data for spectral analysis.

use log::{debug, warn};
use ndarray::ArrayView1;
use ndarray_stats::QuantileExt;
use serde::Serialize;

use crate::axis_names::AXIS_COUNT;
use crate::config::NoiseConfig;
use crate::data_input::flight_data::FlightData;

/// A half-overlapping analysis window `[start, start + len)` of main-loop samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: usize,
    pub len: usize,
    pub mean_throttle_pct: f64,
}

fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let view = ArrayView1::from(values);
    let mean = view.mean().unwrap_or(0.0);
    (mean, view.std(0.0))
}

fn peak_abs(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let abs = ArrayView1::from(values).mapv(f64::abs);
    abs.max().copied().unwrap_or(f64::INFINITY)
}

/// Number of main-loop samples usable by every gyro axis.
pub fn usable_length(data: &FlightData) -> usize {
    data.gyro
        .iter()
        .map(|g| g.len())
        .min()
        .unwrap_or(0)
}

pub fn find_steady_segments(data: &FlightData, config: &NoiseConfig) -> Vec<Segment> {
    let window = config.fft_window_size;
    let hop = (window / 2).max(1);
    let n = usable_length(data);
    if window == 0 || n < window {
        return Vec::new();
    }

    let throttle = &data.throttle().values;
    let has_throttle = throttle.len() >= n;
    if !has_throttle {
        warn!("No throttle channel; segment selection uses stick activity only");
    }

    let mut segments = Vec::new();
    for start in (0..=n - window).step_by(hop) {
        let end = start + window;

        let mean_throttle_pct = if has_throttle {
            let (mean, std) = mean_and_std(&throttle[start..end]);
            if mean < config.hover_throttle_min_pct
                || mean > config.hover_throttle_max_pct
                || std >= config.max_throttle_std_pct
            {
                continue;
            }
            mean
        } else {
            f64::NAN
        };

        let sticks_quiet = data.setpoint[..AXIS_COUNT].iter().all(|sp| {
            sp.values.len() < end || peak_abs(&sp.values[start..end]) < config.max_stick_rate_dps
        });
        if !sticks_quiet {
            continue;
        }

        segments.push(Segment {
            start,
            len: window,
            mean_throttle_pct,
        });
    }

    debug!(
        "Selected {} of {} candidate windows",
        segments.len(),
        (n - window) / hop + 1
    );
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_input::flight_data::TimeSeries;

    fn flight(n: usize, throttle: impl Fn(usize) -> f64, stick: impl Fn(usize) -> f64) -> FlightData {
        let times: Vec<f64> = (0..n).map(|i| i as f64 / 1000.0).collect();
        let series = |f: &dyn Fn(usize) -> f64| {
            TimeSeries::from_parts(times.clone(), (0..n).map(f).collect())
        };
        let mut data = FlightData {
            sample_rate_hz: 1000.0,
            frame_count: n,
            ..FlightData::default()
        };
        for axis in 0..AXIS_COUNT {
            data.gyro[axis] = series(&|_| 0.0);
            data.setpoint[axis] = series(&stick);
        }
        data.setpoint[3] = series(&throttle);
        data
    }

    fn config() -> NoiseConfig {
        NoiseConfig {
            fft_window_size: 100,
            ..NoiseConfig::default()
        }
    }

    #[test]
    fn test_hover_windows_half_overlap() {
        let data = flight(400, |_| 40.0, |_| 0.0);
        let segments = find_steady_segments(&data, &config());
        let starts: Vec<usize> = segments.iter().map(|s| s.start).collect();
        assert_eq!(starts, vec![0, 50, 100, 150, 200, 250, 300]);
        assert_eq!(segments[0].mean_throttle_pct, 40.0);
    }

    #[test]
    fn test_rejects_stick_input_and_low_throttle() {
        // low throttle in the first half, a stick flick in the second
        let data = flight(
            400,
            |i| if i < 200 { 5.0 } else { 40.0 },
            |i| if (300..310).contains(&i) { 200.0 } else { 0.0 },
        );
        let starts: Vec<usize> = find_steady_segments(&data, &config())
            .iter()
            .map(|s| s.start)
            .collect();
        assert_eq!(starts, vec![200]);
    }

    #[test]
    fn test_empty_flight_has_no_segments() {
        assert!(find_steady_segments(&FlightData::default(), &config()).is_empty());
    }
}
