// src/data_analysis/step_metrics.rs
//
// Closed-loop response metrics of a single step, measured on the gyro trace
// normalised against the commanded change.

use ndarray::{s, Array1};
use serde::Serialize;

use crate::config::StepConfig;
use crate::data_analysis::step_detection::StepEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepResponse {
    pub axis: usize,
    pub rise_time_ms: Option<f64>,
    pub overshoot_pct: f64,
    pub settling_time_ms: Option<f64>,
    pub latency_ms: Option<f64>,
    pub ringing_count: usize,
    /// Peak and steady-state values of the normalised trace (1.0 = commanded).
    pub peak_value: f64,
    pub steady_state_value: f64,
    pub steady_state_error: f64,
    pub trace: Vec<f64>,
}

fn index_to_ms(index: usize, sample_rate_hz: f64) -> f64 {
    index as f64 * 1000.0 / sample_rate_hz
}

/// Gyro response relative to its value at onset, divided by the signed
/// setpoint change, over the response window.
fn normalized_trace(
    step: &StepEvent,
    setpoint: &[f64],
    gyro: &[f64],
    window: usize,
) -> Option<Array1<f64>> {
    let start = step.start_index;
    if start == 0 || start >= gyro.len() || step.end_index >= setpoint.len() {
        return None;
    }
    let end = (start + window).min(gyro.len());
    if end - start < window / 2 {
        return None;
    }

    let change = setpoint[step.end_index] - setpoint[start - 1];
    if change.abs() < f64::EPSILON {
        return None;
    }
    let reference = gyro[start - 1];
    let trace = Array1::from(gyro[start..end].to_vec());
    Some(trace.mapv(|g| (g - reference) / change))
}

/// Number of times the trace crosses the target after the peak, counting a
/// crossing only once the trace leaves the `±band` band on the far side.
fn count_ringing(trace: &Array1<f64>, peak_index: usize, band: f64) -> usize {
    let mut crossings = 0;
    let mut side: Option<bool> = None;
    for &y in trace.slice(s![peak_index..]).iter() {
        let current = if y > 1.0 + band {
            Some(true)
        } else if y < 1.0 - band {
            Some(false)
        } else {
            None
        };
        if let Some(above) = current {
            if side.map_or(false, |prev| prev != above) {
                crossings += 1;
            }
            side = Some(above);
        }
    }
    crossings
}

/// Measures one detected step. Returns `None` when less than half a response
/// window of data follows the onset.
pub fn measure_step(
    step: &StepEvent,
    setpoint: &[f64],
    gyro: &[f64],
    sample_rate_hz: f64,
    config: &StepConfig,
) -> Option<StepResponse> {
    if sample_rate_hz <= 0.0 {
        return None;
    }
    let window = (config.response_window_ms * sample_rate_hz / 1000.0).round() as usize;
    let trace = normalized_trace(step, setpoint, gyro, window)?;
    let n = trace.len();
    if n == 0 {
        return None;
    }

    let first_reach = |threshold: f64| trace.iter().position(|&y| y >= threshold);
    let rise_time_ms = first_reach(config.rise_threshold).map(|i| index_to_ms(i, sample_rate_hz));
    let latency_ms = first_reach(config.latency_threshold).map(|i| index_to_ms(i, sample_rate_hz));

    let (peak_index, peak_value) = trace
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, y)| {
            if y > best.1 {
                (i, y)
            } else {
                best
            }
        });
    let overshoot_pct = ((peak_value - 1.0) * 100.0).max(0.0);

    // Settled one sample after the last excursion; never settled if the
    // window ends outside the band.
    let settling_time_ms = match trace
        .iter()
        .rposition(|&y| (y - 1.0).abs() > config.settle_tolerance)
    {
        Some(last) if last + 1 >= n => None,
        Some(last) => Some(index_to_ms(last + 1, sample_rate_hz)),
        None => Some(0.0),
    };

    let tail_len = ((n as f64 * config.steady_state_tail_fraction).round() as usize).clamp(1, n);
    let steady_state_value = trace.slice(s![n - tail_len..]).mean().unwrap_or(0.0);

    Some(StepResponse {
        axis: step.axis,
        rise_time_ms,
        overshoot_pct,
        settling_time_ms,
        latency_ms,
        ringing_count: count_ringing(&trace, peak_index, config.ringing_band),
        peak_value,
        steady_state_value,
        steady_state_error: (1.0 - steady_state_value).abs(),
        trace: trace.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_analysis::step_detection::StepDirection;

    const FS: f64 = 2000.0;

    fn step_at(start: usize) -> StepEvent {
        StepEvent {
            axis: 0,
            start_index: start,
            end_index: start,
            magnitude: 300.0,
            direction: StepDirection::Up,
        }
    }

    /// 0 -> 330 over 20 ms, hold to 45 ms, back to 300 at 50 ms.
    fn overshooting_gyro(n: usize, start: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                if i < start {
                    return 0.0;
                }
                let k = (i - start) as f64;
                if k <= 40.0 {
                    330.0 * k / 40.0
                } else if k <= 90.0 {
                    330.0
                } else if k <= 100.0 {
                    330.0 - 30.0 * (k - 90.0) / 10.0
                } else {
                    300.0
                }
            })
            .collect()
    }

    fn setpoint(n: usize, start: usize) -> Vec<f64> {
        (0..n).map(|i| if i < start { 0.0 } else { 300.0 }).collect()
    }

    #[test]
    fn test_overshoot_and_settling() {
        let (n, start) = (2000, 200);
        let response = measure_step(
            &step_at(start),
            &setpoint(n, start),
            &overshooting_gyro(n, start),
            FS,
            &StepConfig::default(),
        )
        .unwrap();

        assert!((response.overshoot_pct - 10.0).abs() < 1e-6);
        assert!((response.peak_value - 1.1).abs() < 1e-9);
        // 0.9 is reached at sample 33, 0.1 at sample 4
        assert_eq!(response.rise_time_ms, Some(16.5));
        assert_eq!(response.latency_ms, Some(2.0));
        let settling = response.settling_time_ms.unwrap();
        assert!((settling - 48.0).abs() <= 1.0, "settling {}", settling);
        assert_eq!(response.ringing_count, 0);
        assert!(response.steady_state_error < 1e-9);
        assert_eq!(response.trace.len(), 500);
    }

    #[test]
    fn test_ringing_is_counted() {
        let (n, start) = (2000, 200);
        // decaying oscillation around the target
        let gyro: Vec<f64> = (0..n)
            .map(|i| {
                if i < start {
                    return 0.0;
                }
                let t = (i - start) as f64 / FS;
                300.0 * (1.0 - (-t * 20.0).exp() * (2.0 * std::f64::consts::PI * 25.0 * t).cos())
            })
            .collect();
        let response = measure_step(
            &step_at(start),
            &setpoint(n, start),
            &gyro,
            FS,
            &StepConfig::default(),
        )
        .unwrap();
        assert!(response.overshoot_pct > 20.0);
        assert!(response.ringing_count >= 2, "ringing {}", response.ringing_count);
    }

    #[test]
    fn test_unsettled_and_short_windows() {
        let (n, start) = (2000, 200);
        // never reaches the target
        let lazy: Vec<f64> = (0..n).map(|i| if i < start { 0.0 } else { 150.0 }).collect();
        let response = measure_step(
            &step_at(start),
            &setpoint(n, start),
            &lazy,
            FS,
            &StepConfig::default(),
        )
        .unwrap();
        assert_eq!(response.rise_time_ms, None);
        assert_eq!(response.settling_time_ms, None);
        assert!((response.steady_state_error - 0.5).abs() < 1e-9);

        // less than half a window after the onset
        let short = measure_step(
            &step_at(1900),
            &setpoint(n, 1900),
            &lazy,
            FS,
            &StepConfig::default(),
        );
        assert!(short.is_none());
    }

    #[test]
    fn test_zero_response_window_measures_nothing() {
        let (n, start) = (2000, 200);
        let config = StepConfig {
            response_window_ms: 0.0,
            ..StepConfig::default()
        };
        let response = measure_step(
            &step_at(start),
            &setpoint(n, start),
            &overshooting_gyro(n, start),
            FS,
            &config,
        );
        assert!(response.is_none());
    }
}
