// src/data_analysis/step_analysis.rs
//
// Step-response analysis: detect stick steps per axis, measure the gyro's
// response to each, score the per-axis means against the flight style's
// target band and recommend PID/feedforward changes.

use log::{debug, info, warn};
use serde::Serialize;
use std::str::FromStr;
use std::time::Instant;

use crate::axis_names::{axis_name, AXIS_COUNT};
use crate::config::{AnalysisConfig, StyleBands, TargetBand};
use crate::data_analysis::pid_recommendations::recommend_pids;
use crate::data_analysis::step_detection::{detect_steps, StepEvent};
use crate::data_analysis::step_metrics::{measure_step, StepResponse};
use crate::data_input::flight_data::FlightData;
use crate::data_input::pid_metadata::PidMetadata;
use crate::error::AnalysisError;
use crate::progress::{AnalysisProgress, AnalysisProgressEvent};
use crate::recommendation::Recommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlightStyle {
    Smooth,
    #[default]
    Balanced,
    Aggressive,
}

impl FlightStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStyle::Smooth => "smooth",
            FlightStyle::Balanced => "balanced",
            FlightStyle::Aggressive => "aggressive",
        }
    }

    pub fn target_band(&self, bands: &StyleBands) -> TargetBand {
        match self {
            FlightStyle::Smooth => bands.smooth,
            FlightStyle::Balanced => bands.balanced,
            FlightStyle::Aggressive => bands.aggressive,
        }
    }
}

impl std::fmt::Display for FlightStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStyle {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "smooth" => Ok(FlightStyle::Smooth),
            "balanced" => Ok(FlightStyle::Balanced),
            "aggressive" => Ok(FlightStyle::Aggressive),
            other => Err(AnalysisError::InvalidInput(format!(
                "unknown flight style '{}'",
                other
            ))),
        }
    }
}

/// Mean response metrics of one axis. Optional metrics average only the
/// steps where they were measurable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisStepProfile {
    pub axis: usize,
    pub axis_name: &'static str,
    pub step_count: usize,
    pub mean_rise_time_ms: Option<f64>,
    pub mean_overshoot_pct: f64,
    pub mean_settling_time_ms: Option<f64>,
    pub mean_latency_ms: Option<f64>,
    pub mean_ringing: f64,
    pub mean_steady_state_error: f64,
    pub steps: Vec<StepEvent>,
    pub responses: Vec<StepResponse>,
}

impl AxisStepProfile {
    fn from_responses(axis: usize, steps: Vec<StepEvent>, responses: Vec<StepResponse>) -> Self {
        let count = responses.len();
        let mean = |values: Vec<f64>| -> Option<f64> {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };
        AxisStepProfile {
            axis,
            axis_name: axis_name(axis),
            step_count: count,
            mean_rise_time_ms: mean(responses.iter().filter_map(|r| r.rise_time_ms).collect()),
            mean_overshoot_pct: mean(responses.iter().map(|r| r.overshoot_pct).collect())
                .unwrap_or(0.0),
            mean_settling_time_ms: mean(
                responses.iter().filter_map(|r| r.settling_time_ms).collect(),
            ),
            mean_latency_ms: mean(responses.iter().filter_map(|r| r.latency_ms).collect()),
            mean_ringing: mean(responses.iter().map(|r| r.ringing_count as f64).collect())
                .unwrap_or(0.0),
            mean_steady_state_error: mean(
                responses.iter().map(|r| r.steady_state_error).collect(),
            )
            .unwrap_or(0.0),
            steps,
            responses,
        }
    }

    pub fn has_steps(&self) -> bool {
        self.step_count > 0
    }

    pub fn overshoot_over(&self, band: &TargetBand) -> bool {
        self.mean_overshoot_pct > band.overshoot_max_pct
    }

    pub fn ringing_over(&self, band: &TargetBand) -> bool {
        self.mean_ringing > band.ringing_max
    }

    /// A step that never reached the rise threshold counts as too slow.
    pub fn rise_over(&self, band: &TargetBand) -> bool {
        match self.mean_rise_time_ms {
            Some(rise) => rise > band.rise_time_max_ms,
            None => self.has_steps(),
        }
    }

    pub fn latency_over(&self, band: &TargetBand) -> bool {
        self.mean_latency_ms
            .map_or(false, |latency| latency > band.latency_max_ms)
    }

    pub fn settling_over(&self, band: &TargetBand) -> bool {
        match self.mean_settling_time_ms {
            Some(settling) => settling > band.settling_time_max_ms,
            None => self.has_steps(),
        }
    }

    pub fn within_band(&self, band: &TargetBand) -> bool {
        !(self.overshoot_over(band)
            || self.ringing_over(band)
            || self.rise_over(band)
            || self.latency_over(band)
            || self.settling_over(band))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PidAnalysisResult {
    pub session_index: usize,
    pub style: FlightStyle,
    pub target: TargetBand,
    pub axes: Vec<AxisStepProfile>,
    pub current_pids: PidMetadata,
    pub recommendations: Vec<Recommendation>,
    pub summary: String,
    pub analysis_time_ms: u64,
    pub step_count: usize,
}

fn report(progress: &mut dyn AnalysisProgress, step: &'static str, percent: f64) {
    progress.report(AnalysisProgressEvent { step, percent });
}

fn format_opt_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.1} ms", v))
}

fn summarize(
    axes: &[AxisStepProfile],
    style: FlightStyle,
    target: &TargetBand,
    recommendations: &[Recommendation],
) -> String {
    let mut summary = format!("Step response vs {} targets.", style);
    for profile in axes {
        if !profile.has_steps() {
            summary.push_str(&format!(" {}: no steps.", profile.axis_name));
            continue;
        }
        summary.push_str(&format!(
            " {}: {} step(s), overshoot {:.1}%, rise {}, settling {}{}.",
            profile.axis_name,
            profile.step_count,
            profile.mean_overshoot_pct,
            format_opt_ms(profile.mean_rise_time_ms),
            format_opt_ms(profile.mean_settling_time_ms),
            if profile.within_band(target) {
                ", on target"
            } else {
                ""
            }
        ));
    }
    if recommendations.is_empty() {
        summary.push_str(" PID settings already good.");
    } else {
        summary.push_str(&format!(" {} PID change(s) suggested.", recommendations.len()));
    }
    summary
}

/// Analyses stick steps of one session and recommends PID and feedforward
/// changes for the given flight style (balanced when `None`).
pub fn analyze(
    data: &FlightData,
    session_index: usize,
    style: Option<FlightStyle>,
    config: &AnalysisConfig,
    progress: &mut dyn AnalysisProgress,
) -> Result<PidAnalysisResult, AnalysisError> {
    let started = Instant::now();
    let style = style.unwrap_or_default();
    let target = style.target_band(&config.styles);

    if data.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "flight data has no samples".to_string(),
        ));
    }
    if data.sample_rate_hz <= 0.0 || !data.sample_rate_hz.is_finite() {
        return Err(AnalysisError::InvalidInput(format!(
            "invalid sample rate {}",
            data.sample_rate_hz
        )));
    }

    report(progress, "detecting", 0.0);
    let detected: Vec<Vec<StepEvent>> = (0..AXIS_COUNT)
        .map(|axis| {
            let setpoint = &data.setpoint[axis].values;
            if setpoint.is_empty() || data.gyro[axis].is_empty() {
                warn!("{}: setpoint or gyro not logged; axis skipped", axis_name(axis));
                return Vec::new();
            }
            let steps = detect_steps(axis, setpoint, data.sample_rate_hz, &config.steps);
            debug!("{}: {} step(s) detected", axis_name(axis), steps.len());
            steps
        })
        .collect();

    report(progress, "measuring", 30.0);
    let mut axes = Vec::with_capacity(AXIS_COUNT);
    for (axis, steps) in detected.into_iter().enumerate() {
        let setpoint = &data.setpoint[axis].values;
        let gyro = &data.gyro[axis].values;
        let mut measured_steps = Vec::with_capacity(steps.len());
        let mut responses = Vec::with_capacity(steps.len());
        for step in steps {
            if let Some(response) =
                measure_step(&step, setpoint, gyro, data.sample_rate_hz, &config.steps)
            {
                measured_steps.push(step);
                responses.push(response);
            }
        }
        axes.push(AxisStepProfile::from_responses(axis, measured_steps, responses));
    }

    let step_count: usize = axes.iter().map(|a| a.step_count).sum();
    if step_count == 0 {
        return Err(AnalysisError::InsufficientData(
            "no step inputs found".to_string(),
        ));
    }

    report(progress, "scoring", 60.0);
    for profile in axes.iter().filter(|p| p.has_steps()) {
        info!(
            "{}: {} step(s), overshoot {:.1}%, rise {}, settling {}, latency {}, ringing {:.1}",
            profile.axis_name,
            profile.step_count,
            profile.mean_overshoot_pct,
            format_opt_ms(profile.mean_rise_time_ms),
            format_opt_ms(profile.mean_settling_time_ms),
            format_opt_ms(profile.mean_latency_ms),
            profile.mean_ringing
        );
    }

    report(progress, "recommending", 80.0);
    let recommendations = recommend_pids(&axes, style, &target, &data.pid_metadata, &config.pid);
    let summary = summarize(&axes, style, &target, &recommendations);
    info!("{}", summary);
    report(progress, "recommending", 100.0);

    Ok(PidAnalysisResult {
        session_index,
        style,
        target,
        axes,
        current_pids: data.pid_metadata.clone(),
        recommendations,
        summary,
        analysis_time_ms: started.elapsed().as_millis() as u64,
        step_count,
    })
}
