// src/data_analysis/step_detection.rs

use serde::Serialize;

use crate::config::StepConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepDirection {
    Up,
    Down,
}

/// A rapid setpoint change that is then held: `start_index` is the first
/// sample that leaves the prior level, `end_index` the sample where the
/// commanded change is complete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepEvent {
    pub axis: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub magnitude: f64,
    pub direction: StepDirection,
}

fn ms_to_samples(ms: f64, sample_rate_hz: f64) -> usize {
    (ms * sample_rate_hz / 1000.0).round().max(1.0) as usize
}

/// Finds step inputs in one axis of setpoint data (deg/s). A step leaves a
/// steady level, changes by at least `min_magnitude_dps` within
/// `max_rise_ms` and then holds within `hold_tolerance` of the change for
/// `min_hold_ms`.
pub fn detect_steps(
    axis: usize,
    setpoint: &[f64],
    sample_rate_hz: f64,
    config: &StepConfig,
) -> Vec<StepEvent> {
    let n = setpoint.len();
    if n < 2 || sample_rate_hz <= 0.0 || config.min_magnitude_dps <= 0.0 {
        return Vec::new();
    }
    let rise_samples = ms_to_samples(config.max_rise_ms, sample_rate_hz);
    let hold_samples = ms_to_samples(config.min_hold_ms, sample_rate_hz);
    let quiet_band = config.min_magnitude_dps * 0.05;
    let pre_step_tolerance = config.min_magnitude_dps * config.hold_tolerance;

    let mut steps = Vec::new();
    let mut i = 0;
    while i + 1 < n {
        let base = setpoint[i];
        let horizon = (i + rise_samples).min(n - 1);
        let Some(reached) =
            (i + 1..=horizon).find(|&j| (setpoint[j] - base).abs() >= config.min_magnitude_dps)
        else {
            i += 1;
            continue;
        };

        // Onset: first sample after the last one still at the prior level.
        let last_quiet = (i..reached)
            .rev()
            .find(|&k| (setpoint[k] - base).abs() < quiet_band)
            .unwrap_or(i);
        let start = last_quiet + 1;

        // The prior level must have been steady for one rise window.
        let settled_before = {
            let level = setpoint[start - 1];
            setpoint[start.saturating_sub(rise_samples)..start]
                .iter()
                .all(|&v| (v - level).abs() <= pre_step_tolerance)
        };
        if !settled_before {
            i = reached;
            continue;
        }

        // Completion: first sample of the largest excursion within the rise window.
        let rise_end = (start + rise_samples).min(n - 1);
        let mut end = start;
        let mut best = 0.0;
        for k in start..=rise_end {
            let delta = (setpoint[k] - base).abs();
            if delta > best {
                best = delta;
                end = k;
            }
        }
        let magnitude = setpoint[end] - base;

        let hold_end = end + hold_samples;
        let held = hold_end < n
            && setpoint[end..=hold_end]
                .iter()
                .all(|&v| (v - setpoint[end]).abs() <= config.hold_tolerance * magnitude.abs());

        if held {
            steps.push(StepEvent {
                axis,
                start_index: start,
                end_index: end,
                magnitude: magnitude.abs(),
                direction: if magnitude > 0.0 {
                    StepDirection::Up
                } else {
                    StepDirection::Down
                },
            });
            i = hold_end;
        } else {
            i = reached;
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StepConfig {
        StepConfig::default()
    }

    #[test]
    fn test_single_instant_step() {
        // 2 kHz, 0 -> 300 deg/s at 100 ms, held to the end
        let setpoint: Vec<f64> = (0..2000).map(|i| if i < 200 { 0.0 } else { 300.0 }).collect();
        let steps = detect_steps(0, &setpoint, 2000.0, &config());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].start_index, 200);
        assert_eq!(steps[0].end_index, 200);
        assert_eq!(steps[0].magnitude, 300.0);
        assert_eq!(steps[0].direction, StepDirection::Up);
    }

    #[test]
    fn test_ramped_step_down() {
        // 1 kHz, 200 -> -100 over 20 ms starting at sample 300
        let setpoint: Vec<f64> = (0..1000)
            .map(|i| match i {
                0..=300 => 200.0,
                301..=320 => 200.0 - 15.0 * (i - 300) as f64,
                _ => -100.0,
            })
            .collect();
        let steps = detect_steps(1, &setpoint, 1000.0, &config());
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].start_index, 301);
        assert_eq!(steps[0].end_index, 320);
        assert_eq!(steps[0].magnitude, 300.0);
        assert_eq!(steps[0].direction, StepDirection::Down);
    }

    #[test]
    fn test_ignores_small_slow_and_unheld_changes() {
        let fs = 1000.0;
        // small change
        let small: Vec<f64> = (0..1000).map(|i| if i < 500 { 0.0 } else { 50.0 }).collect();
        assert!(detect_steps(0, &small, fs, &config()).is_empty());
        // slow sweep: 300 deg/s over 600 ms
        let slow: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.5).min(300.0)).collect();
        assert!(detect_steps(0, &slow, fs, &config()).is_empty());
        // flick released after 20 ms
        let flick: Vec<f64> = (0..1000)
            .map(|i| if (500..520).contains(&i) { 300.0 } else { 0.0 })
            .collect();
        assert!(detect_steps(0, &flick, fs, &config()).is_empty());
    }
}
