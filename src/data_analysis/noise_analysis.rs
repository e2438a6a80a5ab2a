// src/data_analysis/noise_analysis.rs
//
// Gyro noise analysis: hover segments -> averaged spectra -> classified
// peaks -> filter recommendations.

use log::{debug, info, warn};
use serde::Serialize;
use std::time::Instant;

use crate::axis_names::{axis_name, AXIS_COUNT};
use crate::config::{AnalysisConfig, NoiseConfig};
use crate::constants::DEFAULT_MOTOR_POLES;
use crate::data_analysis::filter_recommendations::recommend_filters;
use crate::data_analysis::peak_detection::{
    classify_peak, find_peaks, fundamental_from_peaks, NoisePeak,
};
use crate::data_analysis::segmentation::{find_steady_segments, Segment};
use crate::data_analysis::spectral_analysis::{
    averaged_amplitude_spectrum_db, percentile, AmplitudeSpectrum,
};
use crate::data_input::flight_data::FlightData;
use crate::error::AnalysisError;
use crate::progress::{AnalysisProgress, AnalysisProgressEvent};
use crate::recommendation::Recommendation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseLevel {
    Low,
    Medium,
    High,
}

impl NoiseLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseLevel::Low => "low",
            NoiseLevel::Medium => "medium",
            NoiseLevel::High => "high",
        }
    }
}

impl std::fmt::Display for NoiseLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Averaged spectrum and classified peaks of one gyro axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisNoiseProfile {
    pub axis: usize,
    pub axis_name: &'static str,
    pub frequencies: Vec<f64>,
    pub magnitudes_db: Vec<f64>,
    pub noise_floor_db: f64,
    pub peaks: Vec<NoisePeak>,
}

impl AxisNoiseProfile {
    pub fn strongest_peak(&self) -> Option<&NoisePeak> {
        self.peaks
            .iter()
            .max_by(|a, b| a.amplitude_db.total_cmp(&b.amplitude_db))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterAnalysisResult {
    pub session_index: usize,
    pub axes: Vec<AxisNoiseProfile>,
    pub level: NoiseLevel,
    pub motor_fundamental_hz: Option<f64>,
    pub recommendations: Vec<Recommendation>,
    pub summary: String,
    pub analysis_time_ms: u64,
    pub segment_count: usize,
}

fn report(progress: &mut dyn AnalysisProgress, step: &'static str, percent: f64) {
    progress.report(AnalysisProgressEvent { step, percent });
}

/// Mean motor rotation frequency (Hz) over the selected windows, from eRPM
/// telemetry. The logged value is eRPM / 100.
fn fundamental_from_erpm(data: &FlightData, segments: &[Segment]) -> Option<f64> {
    if data.erpm.is_empty() {
        return None;
    }
    let poles = data
        .filter_settings
        .motor_poles
        .filter(|&p| p >= 2)
        .unwrap_or(DEFAULT_MOTOR_POLES);
    let pole_pairs = f64::from(poles / 2);

    let mut sum = 0.0;
    let mut count = 0usize;
    for motor in &data.erpm {
        for segment in segments {
            let end = (segment.start + segment.len).min(motor.values.len());
            if segment.start >= end {
                continue;
            }
            sum += motor.values[segment.start..end].iter().sum::<f64>();
            count += end - segment.start;
        }
    }
    if count == 0 {
        return None;
    }
    let mean_erpm = sum / count as f64 * 100.0;
    let hz = mean_erpm / pole_pairs / 60.0;
    (hz > 0.0).then_some(hz)
}

fn noise_floor(spectrum: &AmplitudeSpectrum, config: &NoiseConfig) -> f64 {
    let above: Vec<f64> = spectrum
        .frequencies
        .iter()
        .zip(spectrum.magnitudes_db.iter())
        .filter(|(&f, _)| f >= config.min_peak_frequency_hz)
        .map(|(_, &db)| db)
        .collect();
    percentile(&above, config.noise_floor_percentile)
        .or_else(|| percentile(&spectrum.magnitudes_db, config.noise_floor_percentile))
        .unwrap_or(0.0)
}

/// Overall level from the strongest absolute peak amplitude and the largest
/// per-axis count of significant peaks.
pub fn classify_noise_level(profiles: &[AxisNoiseProfile], config: &NoiseConfig) -> NoiseLevel {
    let strongest = profiles
        .iter()
        .filter_map(|p| p.strongest_peak())
        .map(|p| p.amplitude_db)
        .fold(f64::NEG_INFINITY, f64::max);
    let peak_count = profiles.iter().map(|p| p.peaks.len()).max().unwrap_or(0);

    if strongest >= config.level_high_db
        || (peak_count >= config.level_high_peak_count && strongest >= config.level_medium_db)
    {
        NoiseLevel::High
    } else if strongest >= config.level_medium_db || peak_count >= config.level_medium_peak_count {
        NoiseLevel::Medium
    } else {
        NoiseLevel::Low
    }
}

fn summarize(
    profiles: &[AxisNoiseProfile],
    level: NoiseLevel,
    recommendations: &[Recommendation],
    segment_count: usize,
) -> String {
    let mut summary = format!(
        "Noise level {} over {} hover segment(s).",
        level, segment_count
    );
    for profile in profiles {
        match profile.strongest_peak() {
            Some(peak) => summary.push_str(&format!(
                " {}: strongest {} peak at {:.0} Hz ({:.1} dB).",
                profile.axis_name,
                peak.class.as_str(),
                peak.frequency_hz,
                peak.amplitude_db
            )),
            None => summary.push_str(&format!(" {}: no significant peaks.", profile.axis_name)),
        }
    }
    if recommendations.is_empty() {
        summary.push_str(" Filter settings already good.");
    } else {
        summary.push_str(&format!(" {} filter change(s) suggested.", recommendations.len()));
    }
    summary
}

/// Analyses the gyro noise of one session and recommends filter changes.
pub fn analyze(
    data: &FlightData,
    session_index: usize,
    config: &AnalysisConfig,
    progress: &mut dyn AnalysisProgress,
) -> Result<FilterAnalysisResult, AnalysisError> {
    let started = Instant::now();
    let noise_config = &config.noise;

    if data.is_empty() || data.gyro.iter().all(|g| g.is_empty()) {
        return Err(AnalysisError::InsufficientData(
            "flight data has no gyro samples".to_string(),
        ));
    }
    if data.sample_rate_hz <= 0.0 || !data.sample_rate_hz.is_finite() {
        return Err(AnalysisError::InvalidInput(format!(
            "invalid sample rate {}",
            data.sample_rate_hz
        )));
    }

    report(progress, "segmenting", 0.0);
    let segments = find_steady_segments(data, noise_config);
    if segments.is_empty() {
        return Err(AnalysisError::InsufficientData(
            "not enough hover data".to_string(),
        ));
    }
    info!(
        "Noise analysis of session {}: {} segment(s) of {} samples at {:.0} Hz",
        session_index,
        segments.len(),
        noise_config.fft_window_size,
        data.sample_rate_hz
    );
    let starts: Vec<usize> = segments.iter().map(|s| s.start).collect();

    report(progress, "fft", 25.0);
    let logged_axes = data.gyro.iter().filter(|g| !g.is_empty()).count();
    let total_segments = (logged_axes * starts.len()).max(1);
    let mut spectra: Vec<(usize, AmplitudeSpectrum)> = Vec::with_capacity(AXIS_COUNT);
    for (axis, gyro) in data.gyro.iter().enumerate() {
        if gyro.is_empty() {
            warn!("{} gyro not logged; axis skipped", axis_name(axis));
            continue;
        }
        let done_before = spectra.len() * starts.len();
        let spectrum = averaged_amplitude_spectrum_db(
            &gyro.values,
            &starts,
            noise_config.fft_window_size,
            data.sample_rate_hz,
            |done| {
                let fraction = (done_before + done) as f64 / total_segments as f64;
                report(progress, "fft", 25.0 + 35.0 * fraction.min(1.0));
            },
        )?;
        spectra.push((axis, spectrum));
    }

    report(progress, "analyzing", 60.0);
    let mut profiles: Vec<AxisNoiseProfile> = spectra
        .into_iter()
        .map(|(axis, spectrum)| {
            let floor = noise_floor(&spectrum, noise_config);
            let peaks = find_peaks(&spectrum, floor, noise_config);
            debug!(
                "{}: floor {:.1} dB, {} peak(s)",
                axis_name(axis),
                floor,
                peaks.len()
            );
            AxisNoiseProfile {
                axis,
                axis_name: axis_name(axis),
                frequencies: spectrum.frequencies,
                magnitudes_db: spectrum.magnitudes_db,
                noise_floor_db: floor,
                peaks,
            }
        })
        .collect();

    let fundamental = fundamental_from_erpm(data, &segments).or_else(|| {
        let all_peaks: Vec<NoisePeak> = profiles.iter().flat_map(|p| p.peaks.clone()).collect();
        fundamental_from_peaks(&all_peaks, noise_config)
    });
    if let Some(f0) = fundamental {
        debug!("Motor fundamental estimate {:.1} Hz", f0);
    }

    for profile in &mut profiles {
        for peak in &mut profile.peaks {
            peak.class = classify_peak(peak, fundamental, noise_config);
        }
        for peak in &profile.peaks {
            info!(
                "{}: {} peak at {:.1} Hz, {:.1} dB ({:.1} dB above floor)",
                profile.axis_name,
                peak.class.as_str(),
                peak.frequency_hz,
                peak.amplitude_db,
                peak.margin_db
            );
        }
    }
    let level = classify_noise_level(&profiles, noise_config);

    report(progress, "recommending", 85.0);
    let recommendations = recommend_filters(&profiles, level, &data.filter_settings, &config.filters);
    let summary = summarize(&profiles, level, &recommendations, segments.len());
    info!("{}", summary);
    report(progress, "recommending", 100.0);

    Ok(FilterAnalysisResult {
        session_index,
        axes: profiles,
        level,
        motor_fundamental_hz: fundamental,
        recommendations,
        summary,
        analysis_time_ms: started.elapsed().as_millis() as u64,
        segment_count: segments.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_analysis::peak_detection::PeakClass;
    use crate::data_input::flight_data::TimeSeries;
    use crate::progress::NoProgress;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn hover_flight(n: usize, fs: f64, gyro: impl Fn(f64) -> f64) -> FlightData {
        let times: Vec<f64> = (0..n).map(|i| i as f64 / fs).collect();
        let mut data = FlightData {
            sample_rate_hz: fs,
            frame_count: n,
            duration_s: times[n - 1],
            ..FlightData::default()
        };
        for axis in 0..AXIS_COUNT {
            data.gyro[axis] =
                TimeSeries::from_parts(times.clone(), times.iter().map(|&t| gyro(t)).collect());
            data.setpoint[axis] = TimeSeries::from_parts(times.clone(), vec![0.0; n]);
        }
        data.setpoint[3] = TimeSeries::from_parts(times.clone(), vec![40.0; n]);
        data
    }

    fn peak(amplitude_db: f64) -> NoisePeak {
        NoisePeak {
            frequency_hz: 200.0,
            amplitude_db,
            margin_db: amplitude_db + 30.0,
            width_hz: 10.0,
            class: PeakClass::Unknown,
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

    #[test]
    fn test_noise_level_thresholds() {
        let config = NoiseConfig::default();
        assert_eq!(classify_noise_level(&[profile(vec![])], &config), NoiseLevel::Low);
        assert_eq!(
            classify_noise_level(&[profile(vec![peak(9.5)])], &config),
            NoiseLevel::Medium
        );
        assert_eq!(
            classify_noise_level(&[profile(vec![peak(25.0)])], &config),
            NoiseLevel::High
        );
        let many = vec![peak(0.0), peak(-1.0), peak(-2.0)];
        assert_eq!(classify_noise_level(&[profile(many)], &config), NoiseLevel::Medium);
    }

    #[test]
    fn test_finds_single_tone() {
        let fs = 2000.0;
        let mut rng = StdRng::seed_from_u64(7);
        let noise: Vec<f64> = (0..8192).map(|_| rng.gen_range(-0.5..0.5)).collect();
        // 250 Hz sits exactly on bin 128 of a 1024-point window
        let data = hover_flight(8192, fs, |t| {
            let i = (t * fs).round() as usize;
            3.0 * (2.0 * std::f64::consts::PI * 250.0 * t).sin() + noise[i]
        });
        let mut events = Vec::new();
        let result = analyze(&data, 0, &AnalysisConfig::default(), &mut |e: AnalysisProgressEvent| {
            events.push(e)
        })
        .unwrap();
        let steps: Vec<&str> = events.iter().map(|e| e.step).collect();

        assert_eq!(result.axes.len(), 3);
        assert!(result.segment_count > 0);
        let strongest = result.axes[0].strongest_peak().unwrap();
        assert!((strongest.frequency_hz - 250.0).abs() < 3.0);
        assert_eq!(result.level, NoiseLevel::Medium);
        assert_eq!(steps.first(), Some(&"segmenting"));
        assert!(steps.contains(&"analyzing"));
        assert_eq!(steps.last(), Some(&"recommending"));
        // one fft event on entry, then one per segment and axis
        let fft_events = steps.iter().filter(|s| **s == "fft").count();
        assert_eq!(fft_events, 1 + 3 * result.segment_count);
        assert!(events.windows(2).all(|w| w[1].percent >= w[0].percent));
    }

    #[test]
    fn test_fundamental_from_erpm() {
        let fs = 1000.0;
        let mut data = hover_flight(2048, fs, |_| 0.0);
        // 150 Hz rotation with 14 poles: 150 * 60 * 7 = 63000 eRPM, logged as 630
        data.erpm = vec![TimeSeries::from_parts(
            data.gyro[0].times.clone(),
            vec![630.0; 2048],
        )];
        let segments = [Segment {
            start: 0,
            len: 1024,
            mean_throttle_pct: 40.0,
        }];
        let f0 = fundamental_from_erpm(&data, &segments).unwrap();
        assert!((f0 - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_flight_is_insufficient() {
        let err = analyze(
            &FlightData::default(),
            0,
            &AnalysisConfig::default(),
            &mut NoProgress,
        )
        .unwrap_err();
        assert!(err.is_insufficient_data());
    }

    #[test]
    fn test_no_hover_is_insufficient() {
        let mut data = hover_flight(4096, 1000.0, |_| 0.0);
        data.setpoint[3] = TimeSeries::from_parts(data.gyro[0].times.clone(), vec![90.0; 4096]);
        let err = analyze(&data, 0, &AnalysisConfig::default(), &mut NoProgress).unwrap_err();
        assert_eq!(err, AnalysisError::InsufficientData("not enough hover data".to_string()));
    }
}
