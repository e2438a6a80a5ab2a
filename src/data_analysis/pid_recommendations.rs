// src/data_analysis/pid_recommendations.rs
//
// Rules turning per-axis step-response means into PID and feedforward gain
// changes for a flight style.

use crate::axis_names::axis_setting;
use crate::config::{PidTuningConfig, TargetBand};
use crate::data_analysis::step_analysis::{AxisStepProfile, FlightStyle};
use crate::data_input::pid_metadata::PidMetadata;
use crate::recommendation::{Confidence, Impact, Recommendation};

/// Gain raised by `ratio`, by at least one unit.
fn raised(current: u32, ratio: f64) -> f64 {
    let current = f64::from(current);
    (current * (1.0 + ratio)).round().max(current + 1.0)
}

/// Gain lowered by `ratio`, by at least one unit, never below 1.
fn lowered(current: u32, ratio: f64) -> f64 {
    let current = f64::from(current);
    (current * (1.0 - ratio))
        .round()
        .min(current - 1.0)
        .max(1.0)
}

fn confidence_for_steps(step_count: usize, config: &PidTuningConfig) -> Confidence {
    if step_count >= config.min_steps_for_high_confidence {
        Confidence::High
    } else if step_count >= 2 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn push_change(
    recommendations: &mut Vec<Recommendation>,
    setting: String,
    current: u32,
    target: f64,
    reason: String,
    impact: Impact,
    confidence: Confidence,
) {
    let current = f64::from(current);
    if (target - current).abs() >= 1.0 {
        recommendations.push(Recommendation::new(
            setting, current, target, reason, impact, confidence,
        ));
    }
}

fn recommend_axis(
    profile: &AxisStepProfile,
    band: &TargetBand,
    pids: &PidMetadata,
    config: &PidTuningConfig,
    recommendations: &mut Vec<Recommendation>,
) {
    let Some(gains) = pids.axis(profile.axis) else {
        return;
    };
    let Some(p) = gains.p.filter(|&p| p > 0) else {
        return;
    };
    let confidence = confidence_for_steps(profile.step_count, config);
    let axis = profile.axis;
    let name = profile.axis_name;

    if profile.overshoot_over(band) || profile.ringing_over(band) {
        let what = format!(
            "{} overshoots {:.1}% with {:.1} oscillation(s) (target {:.0}%, {:.0})",
            name,
            profile.mean_overshoot_pct,
            profile.mean_ringing,
            band.overshoot_max_pct,
            band.ringing_max
        );
        let d = gains.d.unwrap_or(0);
        let d_headroom = d > 0 && f64::from(d) < f64::from(p) * config.d_max_ratio_of_p;
        if d_headroom {
            push_change(
                recommendations,
                axis_setting("d", axis),
                d,
                raised(d, config.d_step_ratio),
                format!("{}; raise D to damp it", what),
                Impact::Stability,
                confidence,
            );
        }
        let severe =
            profile.mean_overshoot_pct > band.overshoot_max_pct * config.severe_overshoot_factor;
        if severe || !d_headroom {
            push_change(
                recommendations,
                axis_setting("p", axis),
                p,
                lowered(p, config.p_step_ratio),
                format!("{}; lower P", what),
                Impact::Stability,
                confidence,
            );
        }
    } else if profile.rise_over(band) || profile.latency_over(band) {
        push_change(
            recommendations,
            axis_setting("p", axis),
            p,
            raised(p, config.p_step_ratio),
            format!(
                "{} responds slowly (rise {}, target {:.0} ms); raise P",
                name,
                profile
                    .mean_rise_time_ms
                    .map_or_else(|| "not reached".to_string(), |r| format!("{:.1} ms", r)),
                band.rise_time_max_ms
            ),
            Impact::Tracking,
            confidence,
        );
        if profile.latency_over(band) {
            if let Some(ff) = gains.ff.filter(|&ff| ff > 0) {
                push_change(
                    recommendations,
                    axis_setting("f", axis),
                    ff,
                    raised(ff, config.ff_step_ratio),
                    format!(
                        "{} lags the sticks by {:.1} ms (target {:.0} ms); raise feedforward",
                        name,
                        profile.mean_latency_ms.unwrap_or(0.0),
                        band.latency_max_ms
                    ),
                    Impact::Latency,
                    confidence,
                );
            }
        }
    }

    if profile.mean_steady_state_error > config.steady_state_error_max {
        if let Some(i) = gains.i.filter(|&i| i > 0) {
            push_change(
                recommendations,
                axis_setting("i", axis),
                i,
                raised(i, config.i_step_ratio),
                format!(
                    "{} holds {:.0}% off the commanded rate; raise I",
                    name,
                    profile.mean_steady_state_error * 100.0
                ),
                Impact::Tracking,
                confidence,
            );
        }
    }
}

/// Style-wide feedforward adjustments: smoothing for overshooting smooth
/// flyers, boost for lagging aggressive ones.
fn recommend_feedforward_style(
    profiles: &[AxisStepProfile],
    style: FlightStyle,
    band: &TargetBand,
    pids: &PidMetadata,
    config: &PidTuningConfig,
    recommendations: &mut Vec<Recommendation>,
) {
    let measured: Vec<&AxisStepProfile> = profiles.iter().filter(|p| p.has_steps()).collect();
    let total_steps = measured.iter().map(|p| p.step_count).sum();
    let confidence = confidence_for_steps(total_steps, config);

    match style {
        FlightStyle::Smooth if measured.iter().any(|p| p.overshoot_over(band)) => {
            if let Some(current) = pids.feedforward_smooth_factor {
                let target = (f64::from(current) + config.ff_smooth_factor_step)
                    .min(config.ff_smooth_factor_max);
                push_change(
                    recommendations,
                    "feedforward_smooth_factor".to_string(),
                    current,
                    target,
                    "Overshoot on a smooth style; smooth the feedforward".to_string(),
                    Impact::Stability,
                    confidence,
                );
            }
        }
        FlightStyle::Aggressive if measured.iter().any(|p| p.latency_over(band)) => {
            if let Some(current) = pids.feedforward_boost {
                let target =
                    (f64::from(current) + config.ff_boost_step).min(config.ff_boost_max);
                push_change(
                    recommendations,
                    "feedforward_boost".to_string(),
                    current,
                    target,
                    "Latency above the aggressive target; boost the feedforward".to_string(),
                    Impact::Latency,
                    confidence,
                );
            }
        }
        _ => {}
    }
}

pub fn recommend_pids(
    profiles: &[AxisStepProfile],
    style: FlightStyle,
    band: &TargetBand,
    pids: &PidMetadata,
    config: &PidTuningConfig,
) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();
    for profile in profiles.iter().filter(|p| p.has_steps()) {
        recommend_axis(profile, band, pids, config, &mut recommendations);
    }
    recommend_feedforward_style(profiles, style, band, pids, config, &mut recommendations);
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StyleBands;
    use crate::data_input::pid_metadata::AxisPid;

    fn profile(axis: usize, overshoot: f64, rise: Option<f64>, latency: Option<f64>) -> AxisStepProfile {
        AxisStepProfile {
            axis,
            axis_name: crate::axis_names::axis_name(axis),
            step_count: 3,
            mean_rise_time_ms: rise,
            mean_overshoot_pct: overshoot,
            mean_settling_time_ms: Some(60.0),
            mean_latency_ms: latency,
            mean_ringing: 0.0,
            mean_steady_state_error: 0.0,
            steps: Vec::new(),
            responses: Vec::new(),
        }
    }

    fn pids() -> PidMetadata {
        let axis = |p, i, d, ff| AxisPid {
            p: Some(p),
            i: Some(i),
            d: Some(d),
            ff: Some(ff),
            ..AxisPid::default()
        };
        PidMetadata {
            axes: [axis(45, 80, 40, 120), axis(47, 84, 46, 125), axis(45, 80, 0, 120)],
            feedforward_boost: Some(15),
            feedforward_smooth_factor: Some(25),
            ..PidMetadata::default()
        }
    }

    fn balanced() -> TargetBand {
        StyleBands::default().balanced
    }

    #[test]
    fn test_overshoot_raises_d() {
        let recs = recommend_pids(
            &[profile(0, 20.0, Some(15.0), Some(3.0))],
            FlightStyle::Balanced,
            &balanced(),
            &pids(),
            &PidTuningConfig::default(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].setting, "d_roll");
        assert_eq!(recs[0].recommended_value, 46.0);
        assert_eq!(recs[0].impact, Impact::Stability);
        assert_eq!(recs[0].confidence, Confidence::Medium);
    }

    #[test]
    fn test_severe_overshoot_without_d_lowers_p() {
        // yaw has no D, so P comes down even for moderate overshoot
        let recs = recommend_pids(
            &[profile(2, 20.0, Some(15.0), Some(3.0))],
            FlightStyle::Balanced,
            &balanced(),
            &pids(),
            &PidTuningConfig::default(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].setting, "p_yaw");
        assert_eq!(recs[0].recommended_value, 41.0); // 45 * 0.9 = 40.5 -> 41

        let recs = recommend_pids(
            &[profile(0, 40.0, Some(15.0), Some(3.0))],
            FlightStyle::Balanced,
            &balanced(),
            &pids(),
            &PidTuningConfig::default(),
        );
        let settings: Vec<&str> = recs.iter().map(|r| r.setting.as_str()).collect();
        assert_eq!(settings, vec!["d_roll", "p_roll"]);
    }

    #[test]
    fn test_slow_response_raises_p_and_ff() {
        let recs = recommend_pids(
            &[profile(1, 2.0, Some(55.0), Some(25.0))],
            FlightStyle::Balanced,
            &balanced(),
            &pids(),
            &PidTuningConfig::default(),
        );
        let p = recs.iter().find(|r| r.setting == "p_pitch").unwrap();
        assert_eq!(p.recommended_value, 52.0); // 47 * 1.1 = 51.7 -> 52
        assert_eq!(p.impact, Impact::Tracking);
        let ff = recs.iter().find(|r| r.setting == "f_pitch").unwrap();
        assert_eq!(ff.recommended_value, 144.0); // 125 * 1.15 = 143.75 -> 144
        assert_eq!(ff.impact, Impact::Latency);
    }

    #[test]
    fn test_steady_state_error_raises_i() {
        let mut axis = profile(0, 2.0, Some(15.0), Some(3.0));
        axis.mean_steady_state_error = 0.2;
        let recs = recommend_pids(
            &[axis],
            FlightStyle::Balanced,
            &balanced(),
            &pids(),
            &PidTuningConfig::default(),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].setting, "i_roll");
        assert_eq!(recs[0].recommended_value, 88.0);
    }

    #[test]
    fn test_style_feedforward_adjustments() {
        let bands = StyleBands::default();
        let smooth = recommend_pids(
            &[profile(0, 10.0, Some(15.0), Some(3.0))],
            FlightStyle::Smooth,
            &bands.smooth,
            &pids(),
            &PidTuningConfig::default(),
        );
        let factor = smooth
            .iter()
            .find(|r| r.setting == "feedforward_smooth_factor")
            .unwrap();
        assert_eq!(factor.recommended_value, 35.0);

        let aggressive = recommend_pids(
            &[profile(0, 10.0, Some(20.0), Some(14.0))],
            FlightStyle::Aggressive,
            &bands.aggressive,
            &pids(),
            &PidTuningConfig::default(),
        );
        let boost = aggressive
            .iter()
            .find(|r| r.setting == "feedforward_boost")
            .unwrap();
        assert_eq!(boost.recommended_value, 20.0);
    }

    #[test]
    fn test_changes_are_at_least_one_unit() {
        assert_eq!(raised(3, 0.1), 4.0);
        assert_eq!(lowered(3, 0.1), 2.0);
        assert_eq!(lowered(1, 0.5), 1.0);
    }

    #[test]
    fn test_no_steps_no_recommendations() {
        let mut axis = profile(0, 50.0, None, None);
        axis.step_count = 0;
        let recs = recommend_pids(
            &[axis],
            FlightStyle::Smooth,
            &balanced(),
            &pids(),
            &PidTuningConfig::default(),
        );
        assert!(recs.is_empty());
    }
}
