// src/data_analysis/filter_recommendations.rs
//
// Rules turning the classified noise picture into gyro/D-term lowpass and
// dynamic notch changes.

use crate::config::FilterTuningConfig;
use crate::data_analysis::noise_analysis::{AxisNoiseProfile, NoiseLevel};
use crate::data_analysis::peak_detection::{NoisePeak, PeakClass};
use crate::data_input::filter_settings::FilterSettings;
use crate::recommendation::{Confidence, Impact, Recommendation};

fn round_to(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value.round();
    }
    (value / step).round() * step
}

fn cutoff(value: f64, min: f64, max: f64, config: &FilterTuningConfig) -> f64 {
    round_to(value, config.cutoff_rounding_hz).clamp(min, max)
}

fn confidence_for_margin(margin_db: f64, config: &FilterTuningConfig) -> Confidence {
    if margin_db >= config.high_confidence_margin_db {
        Confidence::High
    } else if margin_db >= config.strong_peak_margin_db {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// A configured, enabled cutoff. Zero means the filter is off.
fn enabled(value: Option<f64>) -> Option<f64> {
    value.filter(|&v| v > 0.0)
}

struct LowpassRule {
    setting: &'static str,
    label: &'static str,
    min_hz: f64,
    max_hz: f64,
    below_peak_ratio: f64,
    raise_ratio: f64,
}

/// The lowest-frequency strong broadband or unidentified peak below the
/// low/mid band limit, across all axes.
fn lowest_strong_peak<'a>(
    profiles: &'a [AxisNoiseProfile],
    config: &FilterTuningConfig,
) -> Option<(&'a NoisePeak, &'static str)> {
    profiles
        .iter()
        .flat_map(|p| p.peaks.iter().map(move |peak| (peak, p.axis_name)))
        .filter(|(peak, _)| {
            matches!(peak.class, PeakClass::FrameResonance | PeakClass::Unknown)
                && peak.margin_db >= config.strong_peak_margin_db
                && peak.frequency_hz < config.low_mid_band_max_hz
        })
        .min_by(|a, b| a.0.frequency_hz.total_cmp(&b.0.frequency_hz))
}

pub fn recommend_filters(
    profiles: &[AxisNoiseProfile],
    level: NoiseLevel,
    settings: &FilterSettings,
    config: &FilterTuningConfig,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    let rules = [
        LowpassRule {
            setting: "gyro_lpf1_static_hz",
            label: "gyro lowpass",
            min_hz: config.gyro_lpf_min_hz,
            max_hz: config.gyro_lpf_max_hz,
            below_peak_ratio: config.gyro_cutoff_below_peak_ratio,
            raise_ratio: config.gyro_lpf_raise_ratio,
        },
        LowpassRule {
            setting: "dterm_lpf1_static_hz",
            label: "D-term lowpass",
            min_hz: config.dterm_lpf_min_hz,
            max_hz: config.dterm_lpf_max_hz,
            below_peak_ratio: config.dterm_cutoff_below_peak_ratio,
            raise_ratio: config.dterm_lpf_raise_ratio,
        },
    ];

    let strong_peak = lowest_strong_peak(profiles, config);

    for rule in &rules {
        let Some(current) = enabled(settings.setting_value(rule.setting)) else {
            continue;
        };

        if let Some((peak, axis_name)) = strong_peak {
            let target = cutoff(
                peak.frequency_hz * rule.below_peak_ratio,
                rule.min_hz,
                rule.max_hz,
                config,
            );
            if target < current {
                recommendations.push(Recommendation::new(
                    rule.setting,
                    current,
                    target,
                    format!(
                        "{} peak at {:.0} Hz on {} is {:.1} dB above the noise floor; lower the {} below it",
                        peak.class.as_str(),
                        peak.frequency_hz,
                        axis_name,
                        peak.margin_db,
                        rule.label
                    ),
                    Impact::Noise,
                    confidence_for_margin(peak.margin_db, config),
                ));
            }
        } else if level == NoiseLevel::Low {
            let target = cutoff(current * rule.raise_ratio, rule.min_hz, rule.max_hz, config);
            if target > current {
                recommendations.push(Recommendation::new(
                    rule.setting,
                    current,
                    target,
                    format!(
                        "Gyro spectrum is clean; raise the {} to cut filter delay",
                        rule.label
                    ),
                    Impact::Latency,
                    Confidence::Medium,
                ));
            }
        }
    }

    recommendations.extend(recommend_dyn_notch(profiles, settings, config));
    recommendations
}

/// Widens the dynamic notch range so motor and electrical peaks outside it
/// are tracked. Both classes are narrow by construction.
fn recommend_dyn_notch(
    profiles: &[AxisNoiseProfile],
    settings: &FilterSettings,
    config: &FilterTuningConfig,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    let narrow: Vec<&NoisePeak> = profiles
        .iter()
        .flat_map(|p| p.peaks.iter())
        .filter(|p| matches!(p.class, PeakClass::MotorHarmonic | PeakClass::Electrical))
        .collect();

    let lowest = narrow.iter().min_by(|a, b| a.frequency_hz.total_cmp(&b.frequency_hz));
    let highest = narrow.iter().max_by(|a, b| a.frequency_hz.total_cmp(&b.frequency_hz));

    if let (Some(current_min), Some(peak)) = (enabled(settings.dyn_notch_min_hz), lowest) {
        if peak.frequency_hz < current_min {
            let target = cutoff(
                peak.frequency_hz * (1.0 - config.dyn_notch_margin_ratio),
                config.dyn_notch_min_limit_hz,
                config.dyn_notch_max_limit_hz,
                config,
            );
            if target < current_min {
                recommendations.push(Recommendation::new(
                    "dyn_notch_min_hz",
                    current_min,
                    target,
                    format!(
                        "Narrow {} peak at {:.0} Hz is below the dynamic notch range",
                        peak.class.as_str(),
                        peak.frequency_hz
                    ),
                    Impact::Noise,
                    confidence_for_margin(peak.margin_db, config),
                ));
            }
        }
    }

    if let (Some(current_max), Some(peak)) = (enabled(settings.dyn_notch_max_hz), highest) {
        if peak.frequency_hz > current_max {
            let target = cutoff(
                peak.frequency_hz * (1.0 + config.dyn_notch_margin_ratio),
                config.dyn_notch_min_limit_hz,
                config.dyn_notch_max_limit_hz,
                config,
            );
            if target > current_max {
                recommendations.push(Recommendation::new(
                    "dyn_notch_max_hz",
                    current_max,
                    target,
                    format!(
                        "Narrow {} peak at {:.0} Hz is above the dynamic notch range",
                        peak.class.as_str(),
                        peak.frequency_hz
                    ),
                    Impact::Noise,
                    confidence_for_margin(peak.margin_db, config),
                ));
            }
        }
    }

    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(frequency_hz: f64, margin_db: f64, width_hz: f64, class: PeakClass) -> NoisePeak {
        NoisePeak {
            frequency_hz,
            amplitude_db: margin_db - 30.0,
            margin_db,
            width_hz,
            class,
        }
    }

    fn profile(peaks: Vec<NoisePeak>) -> AxisNoiseProfile {
        AxisNoiseProfile {
            axis: 0,
            axis_name: "Roll",
            frequencies: Vec::new(),
            magnitudes_db: Vec::new(),
            noise_floor_db: -30.0,
            peaks,
        }
    }

    fn settings() -> FilterSettings {
        FilterSettings {
            gyro_lpf1_static_hz: Some(250.0),
            dterm_lpf1_static_hz: Some(100.0),
            dyn_notch_min_hz: Some(150.0),
            dyn_notch_max_hz: Some(600.0),
            ..FilterSettings::default()
        }
    }

    #[test]
    fn test_lowers_cutoffs_below_frame_resonance() {
        let profiles = [profile(vec![peak(120.0, 32.0, 60.0, PeakClass::FrameResonance)])];
        let recs = recommend_filters(
            &profiles,
            NoiseLevel::Medium,
            &settings(),
            &FilterTuningConfig::default(),
        );
        let gyro = recs.iter().find(|r| r.setting == "gyro_lpf1_static_hz").unwrap();
        assert_eq!(gyro.recommended_value, 95.0); // 120 * 0.8 = 96 -> 95
        assert_eq!(gyro.impact, Impact::Noise);
        assert_eq!(gyro.confidence, Confidence::High);
        let dterm = recs.iter().find(|r| r.setting == "dterm_lpf1_static_hz").unwrap();
        assert_eq!(dterm.recommended_value, 85.0); // 120 * 0.7 = 84 -> 85
        assert!(recs.iter().all(|r| r.is_change()));
    }

    #[test]
    fn test_raises_cutoffs_when_clean() {
        let recs = recommend_filters(
            &[profile(Vec::new())],
            NoiseLevel::Low,
            &settings(),
            &FilterTuningConfig::default(),
        );
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].recommended_value, 300.0);
        assert_eq!(recs[1].recommended_value, 115.0);
        assert!(recs.iter().all(|r| r.impact == Impact::Latency));
    }

    #[test]
    fn test_widens_dyn_notch() {
        let profiles = [profile(vec![
            peak(110.0, 22.0, 8.0, PeakClass::MotorHarmonic),
            peak(700.0, 15.0, 8.0, PeakClass::Electrical),
        ])];
        let recs = recommend_filters(
            &profiles,
            NoiseLevel::Medium,
            &settings(),
            &FilterTuningConfig::default(),
        );
        let min = recs.iter().find(|r| r.setting == "dyn_notch_min_hz").unwrap();
        assert_eq!(min.recommended_value, 90.0); // 110 * 0.8 = 88 -> 90
        assert_eq!(min.confidence, Confidence::Medium);
        let max = recs.iter().find(|r| r.setting == "dyn_notch_max_hz").unwrap();
        assert_eq!(max.recommended_value, 840.0);
        assert_eq!(max.confidence, Confidence::Low);
    }

    #[test]
    fn test_skips_disabled_filters() {
        let settings = FilterSettings {
            gyro_lpf1_static_hz: Some(0.0),
            ..FilterSettings::default()
        };
        let recs = recommend_filters(
            &[profile(Vec::new())],
            NoiseLevel::Low,
            &settings,
            &FilterTuningConfig::default(),
        );
        assert!(recs.is_empty());
    }
}
