// src/config.rs

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::constants::*;
use crate::error::ConfigError;

/// Decoder tolerances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub max_frame_length: usize,
    pub max_time_jump_us: i64,
    pub session_gap_iterations: i64,
    pub progress_interval_bytes: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_frame_length: MAX_FRAME_LENGTH,
            max_time_jump_us: MAX_TIME_JUMP_US,
            session_gap_iterations: SESSION_GAP_ITERATIONS,
            progress_interval_bytes: DECODE_PROGRESS_INTERVAL_BYTES,
        }
    }
}

/// Segment selection and spectrum/peak thresholds for the noise analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub fft_window_size: usize,
    pub hover_throttle_min_pct: f64,
    pub hover_throttle_max_pct: f64,
    pub max_throttle_std_pct: f64,
    pub max_stick_rate_dps: f64,
    pub noise_floor_percentile: f64,
    pub min_peak_frequency_hz: f64,
    pub peak_margin_db: f64,
    pub min_peak_separation_hz: f64,
    pub max_peaks_per_axis: usize,
    pub peak_window_radius: usize,
    pub narrow_peak_max_width_hz: f64,
    pub frame_resonance_min_hz: f64,
    pub frame_resonance_max_hz: f64,
    pub motor_band_min_hz: f64,
    pub motor_band_max_hz: f64,
    pub harmonic_tolerance: f64,
    pub electrical_min_hz: f64,
    pub level_medium_db: f64,
    pub level_high_db: f64,
    pub level_high_peak_count: usize,
    pub level_medium_peak_count: usize,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            fft_window_size: FFT_WINDOW_SIZE,
            hover_throttle_min_pct: HOVER_THROTTLE_MIN_PCT,
            hover_throttle_max_pct: HOVER_THROTTLE_MAX_PCT,
            max_throttle_std_pct: MAX_THROTTLE_STD_PCT,
            max_stick_rate_dps: MAX_STICK_RATE_DPS,
            noise_floor_percentile: NOISE_FLOOR_PERCENTILE,
            min_peak_frequency_hz: MIN_PEAK_FREQUENCY_HZ,
            peak_margin_db: PEAK_MARGIN_DB,
            min_peak_separation_hz: MIN_PEAK_SEPARATION_HZ,
            max_peaks_per_axis: MAX_PEAKS_PER_AXIS,
            peak_window_radius: PEAK_DETECTION_WINDOW_RADIUS,
            narrow_peak_max_width_hz: NARROW_PEAK_MAX_WIDTH_HZ,
            frame_resonance_min_hz: FRAME_RESONANCE_MIN_HZ,
            frame_resonance_max_hz: FRAME_RESONANCE_MAX_HZ,
            motor_band_min_hz: MOTOR_BAND_MIN_HZ,
            motor_band_max_hz: MOTOR_BAND_MAX_HZ,
            harmonic_tolerance: HARMONIC_TOLERANCE,
            electrical_min_hz: ELECTRICAL_MIN_HZ,
            level_medium_db: NOISE_LEVEL_MEDIUM_DB,
            level_high_db: NOISE_LEVEL_HIGH_DB,
            level_high_peak_count: NOISE_LEVEL_HIGH_PEAK_COUNT,
            level_medium_peak_count: NOISE_LEVEL_MEDIUM_PEAK_COUNT,
        }
    }
}

/// Limits used when turning the noise picture into filter changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterTuningConfig {
    pub strong_peak_margin_db: f64,
    pub high_confidence_margin_db: f64,
    pub low_mid_band_max_hz: f64,
    pub gyro_lpf_min_hz: f64,
    pub gyro_lpf_max_hz: f64,
    pub dterm_lpf_min_hz: f64,
    pub dterm_lpf_max_hz: f64,
    pub gyro_cutoff_below_peak_ratio: f64,
    pub dterm_cutoff_below_peak_ratio: f64,
    pub gyro_lpf_raise_ratio: f64,
    pub dterm_lpf_raise_ratio: f64,
    pub dyn_notch_min_limit_hz: f64,
    pub dyn_notch_max_limit_hz: f64,
    pub dyn_notch_margin_ratio: f64,
    pub cutoff_rounding_hz: f64,
}

impl Default for FilterTuningConfig {
    fn default() -> Self {
        Self {
            strong_peak_margin_db: STRONG_PEAK_MARGIN_DB,
            high_confidence_margin_db: HIGH_CONFIDENCE_MARGIN_DB,
            low_mid_band_max_hz: LOW_MID_BAND_MAX_HZ,
            gyro_lpf_min_hz: GYRO_LPF_MIN_HZ,
            gyro_lpf_max_hz: GYRO_LPF_MAX_HZ,
            dterm_lpf_min_hz: DTERM_LPF_MIN_HZ,
            dterm_lpf_max_hz: DTERM_LPF_MAX_HZ,
            gyro_cutoff_below_peak_ratio: GYRO_CUTOFF_BELOW_PEAK_RATIO,
            dterm_cutoff_below_peak_ratio: DTERM_CUTOFF_BELOW_PEAK_RATIO,
            gyro_lpf_raise_ratio: GYRO_LPF_RAISE_RATIO,
            dterm_lpf_raise_ratio: DTERM_LPF_RAISE_RATIO,
            dyn_notch_min_limit_hz: DYN_NOTCH_MIN_LIMIT_HZ,
            dyn_notch_max_limit_hz: DYN_NOTCH_MAX_LIMIT_HZ,
            dyn_notch_margin_ratio: DYN_NOTCH_MARGIN_RATIO,
            cutoff_rounding_hz: CUTOFF_ROUNDING_HZ,
        }
    }
}

/// Step detection and response measurement thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    pub min_magnitude_dps: f64,
    pub max_rise_ms: f64,
    pub hold_tolerance: f64,
    pub min_hold_ms: f64,
    pub response_window_ms: f64,
    pub rise_threshold: f64,
    pub latency_threshold: f64,
    pub settle_tolerance: f64,
    pub ringing_band: f64,
    pub steady_state_tail_fraction: f64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            min_magnitude_dps: STEP_MIN_MAGNITUDE_DPS,
            max_rise_ms: STEP_MAX_RISE_MS,
            hold_tolerance: STEP_HOLD_TOLERANCE,
            min_hold_ms: STEP_MIN_HOLD_MS,
            response_window_ms: RESPONSE_WINDOW_MS,
            rise_threshold: RISE_THRESHOLD,
            latency_threshold: LATENCY_THRESHOLD,
            settle_tolerance: SETTLE_TOLERANCE,
            ringing_band: RINGING_BAND,
            steady_state_tail_fraction: STEADY_STATE_TAIL_FRACTION,
        }
    }
}

/// Gain adjustment sizes used by the PID recommender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidTuningConfig {
    pub p_step_ratio: f64,
    pub i_step_ratio: f64,
    pub d_step_ratio: f64,
    pub ff_step_ratio: f64,
    pub d_max_ratio_of_p: f64,
    pub severe_overshoot_factor: f64,
    pub steady_state_error_max: f64,
    pub ff_smooth_factor_step: f64,
    pub ff_smooth_factor_max: f64,
    pub ff_boost_step: f64,
    pub ff_boost_max: f64,
    pub min_steps_for_high_confidence: usize,
}

impl Default for PidTuningConfig {
    fn default() -> Self {
        Self {
            p_step_ratio: P_STEP_RATIO,
            i_step_ratio: I_STEP_RATIO,
            d_step_ratio: D_STEP_RATIO,
            ff_step_ratio: FF_STEP_RATIO,
            d_max_ratio_of_p: D_MAX_RATIO_OF_P,
            severe_overshoot_factor: SEVERE_OVERSHOOT_FACTOR,
            steady_state_error_max: STEADY_STATE_ERROR_MAX,
            ff_smooth_factor_step: FF_SMOOTH_FACTOR_STEP,
            ff_smooth_factor_max: FF_SMOOTH_FACTOR_MAX,
            ff_boost_step: FF_BOOST_STEP,
            ff_boost_max: FF_BOOST_MAX,
            min_steps_for_high_confidence: MIN_STEPS_FOR_HIGH_CONFIDENCE,
        }
    }
}

/// Acceptable step-response bounds for one flight style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetBand {
    pub overshoot_max_pct: f64,
    pub rise_time_max_ms: f64,
    pub settling_time_max_ms: f64,
    pub latency_max_ms: f64,
    pub ringing_max: f64,
}

impl TargetBand {
    const fn from_tuple(t: (f64, f64, f64, f64, f64)) -> Self {
        Self {
            overshoot_max_pct: t.0,
            rise_time_max_ms: t.1,
            settling_time_max_ms: t.2,
            latency_max_ms: t.3,
            ringing_max: t.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleBands {
    pub smooth: TargetBand,
    pub balanced: TargetBand,
    pub aggressive: TargetBand,
}

impl Default for StyleBands {
    fn default() -> Self {
        Self {
            smooth: TargetBand::from_tuple(SMOOTH_BAND),
            balanced: TargetBand::from_tuple(BALANCED_BAND),
            aggressive: TargetBand::from_tuple(AGGRESSIVE_BAND),
        }
    }
}

/// Every tunable threshold of the decode/analysis pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub decoder: DecoderConfig,
    pub noise: NoiseConfig,
    pub filters: FilterTuningConfig,
    pub steps: StepConfig,
    pub pid: PidTuningConfig,
    pub styles: StyleBands,
}

impl AnalysisConfig {
    /// Loads a (possibly partial) JSON config; missing fields take defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let n = self.noise.fft_window_size;
        if n < 64 || !n.is_power_of_two() {
            return Err(ConfigError::Invalid {
                field: "noise.fft_window_size",
                reason: format!("{n} must be a power of two >= 64"),
            });
        }
        if !(0.0..1.0).contains(&self.noise.noise_floor_percentile) {
            return Err(ConfigError::Invalid {
                field: "noise.noise_floor_percentile",
                reason: "must be within [0, 1)".to_string(),
            });
        }
        if self.noise.hover_throttle_min_pct >= self.noise.hover_throttle_max_pct {
            return Err(ConfigError::Invalid {
                field: "noise.hover_throttle_min_pct",
                reason: "must be below hover_throttle_max_pct".to_string(),
            });
        }
        if self.steps.min_magnitude_dps <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "steps.min_magnitude_dps",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.steps.response_window_ms > 0.0 && self.steps.response_window_ms.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "steps.response_window_ms",
                reason: "must be a positive number of milliseconds".to_string(),
            });
        }
        if !(self.steps.steady_state_tail_fraction > 0.0
            && self.steps.steady_state_tail_fraction <= 1.0)
        {
            return Err(ConfigError::Invalid {
                field: "steps.steady_state_tail_fraction",
                reason: "must be within (0, 1]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.steps.rise_threshold)
            || !(0.0..=1.0).contains(&self.steps.latency_threshold)
        {
            return Err(ConfigError::Invalid {
                field: "steps.rise_threshold",
                reason: "rise/latency thresholds are fractions within [0, 1]".to_string(),
            });
        }
        if self.filters.gyro_lpf_min_hz >= self.filters.gyro_lpf_max_hz
            || self.filters.dterm_lpf_min_hz >= self.filters.dterm_lpf_max_hz
        {
            return Err(ConfigError::Invalid {
                field: "filters",
                reason: "lowpass min cutoff must be below max cutoff".to_string(),
            });
        }
        if self.decoder.max_frame_length == 0 {
            return Err(ConfigError::Invalid {
                field: "decoder.max_frame_length",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
