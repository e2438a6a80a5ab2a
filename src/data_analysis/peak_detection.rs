// src/data_analysis/peak_detection.rs

use serde::Serialize;

use crate::config::NoiseConfig;
use crate::data_analysis::spectral_analysis::AmplitudeSpectrum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakClass {
    FrameResonance,
    MotorHarmonic,
    Electrical,
    Unknown,
}

impl PeakClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeakClass::FrameResonance => "frame_resonance",
            PeakClass::MotorHarmonic => "motor_harmonic",
            PeakClass::Electrical => "electrical",
            PeakClass::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoisePeak {
    pub frequency_hz: f64,
    pub amplitude_db: f64,
    pub margin_db: f64,
    pub width_hz: f64,
    pub class: PeakClass,
}

impl NoisePeak {
    pub fn is_narrow(&self, config: &NoiseConfig) -> bool {
        self.width_hz <= config.narrow_peak_max_width_hz
    }
}

/// Windowed local maximum: at least every bin within `w` on the left and
/// strictly above every bin within `w` on the right (rightmost point of a
/// plateau). Falls back to the 3-point test near the edges.
fn is_local_peak(values: &[f64], j: usize, w: usize) -> bool {
    let amp = values[j];
    if j >= w && j + w < values.len() {
        let ge_left = (1..=w).all(|k| amp >= values[j - k]);
        ge_left && (1..=w).all(|k| amp > values[j + k])
    } else {
        amp >= values[j - 1] && amp > values[j + 1]
    }
}

/// Full width of the peak at 3 dB below its top, in Hz.
fn width_3db(spectrum: &AmplitudeSpectrum, j: usize) -> f64 {
    let values = &spectrum.magnitudes_db;
    let cutoff = values[j] - 3.0;
    let mut left = j;
    while left > 0 && values[left - 1] >= cutoff {
        left -= 1;
    }
    let mut right = j;
    while right + 1 < values.len() && values[right + 1] >= cutoff {
        right += 1;
    }
    (right - left + 1) as f64 * spectrum.resolution_hz()
}

/// Finds peaks more than `peak_margin_db` above `noise_floor_db`, strongest
/// first, at least `min_peak_separation_hz` apart and at most
/// `max_peaks_per_axis` of them. Peaks are returned unclassified.
pub fn find_peaks(
    spectrum: &AmplitudeSpectrum,
    noise_floor_db: f64,
    config: &NoiseConfig,
) -> Vec<NoisePeak> {
    let values = &spectrum.magnitudes_db;
    if values.len() < 3 {
        return Vec::new();
    }

    let mut candidates: Vec<NoisePeak> = Vec::new();
    for j in 1..(values.len() - 1) {
        let freq = spectrum.frequencies[j];
        if freq < config.min_peak_frequency_hz {
            continue;
        }
        let margin = values[j] - noise_floor_db;
        if margin <= config.peak_margin_db || !is_local_peak(values, j, config.peak_window_radius) {
            continue;
        }
        candidates.push(NoisePeak {
            frequency_hz: freq,
            amplitude_db: values[j],
            margin_db: margin,
            width_hz: width_3db(spectrum, j),
            class: PeakClass::Unknown,
        });
    }

    candidates.sort_by(|a, b| b.amplitude_db.total_cmp(&a.amplitude_db));
    let mut peaks: Vec<NoisePeak> = Vec::new();
    for candidate in candidates {
        if peaks.len() >= config.max_peaks_per_axis {
            break;
        }
        let too_close = peaks.iter().any(|p| {
            (p.frequency_hz - candidate.frequency_hz).abs() < config.min_peak_separation_hz
        });
        if !too_close {
            peaks.push(candidate);
        }
    }
    peaks
}

/// Estimates the motor rotation frequency from narrow peaks: the lowest
/// narrow peak inside the motor band.
pub fn fundamental_from_peaks(peaks: &[NoisePeak], config: &NoiseConfig) -> Option<f64> {
    peaks
        .iter()
        .filter(|p| p.is_narrow(config))
        .map(|p| p.frequency_hz)
        .filter(|f| (config.motor_band_min_hz..=config.motor_band_max_hz).contains(f))
        .min_by(|a, b| a.total_cmp(b))
}

fn is_harmonic_of(frequency: f64, fundamental: f64, tolerance: f64) -> bool {
    if fundamental <= 0.0 {
        return false;
    }
    let ratio = frequency / fundamental;
    let order = ratio.round();
    order >= 1.0 && ((ratio - order) / order).abs() <= tolerance
}

pub fn classify_peak(peak: &NoisePeak, fundamental_hz: Option<f64>, config: &NoiseConfig) -> PeakClass {
    let narrow = peak.is_narrow(config);
    if narrow {
        if let Some(f0) = fundamental_hz {
            if is_harmonic_of(peak.frequency_hz, f0, config.harmonic_tolerance) {
                return PeakClass::MotorHarmonic;
            }
        }
        if peak.frequency_hz >= config.electrical_min_hz {
            return PeakClass::Electrical;
        }
    } else if (config.frame_resonance_min_hz..=config.frame_resonance_max_hz)
        .contains(&peak.frequency_hz)
    {
        return PeakClass::FrameResonance;
    }
    PeakClass::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum_with(bumps: &[(usize, f64, usize)], len: usize, df: f64) -> AmplitudeSpectrum {
        let mut magnitudes_db = vec![-30.0_f64; len];
        for &(center, height, half_width) in bumps {
            for k in center.saturating_sub(half_width)..=(center + half_width).min(len - 1) {
                let dist = (k as f64 - center as f64).abs();
                magnitudes_db[k] = magnitudes_db[k].max(height - 2.0 * dist);
            }
        }
        AmplitudeSpectrum {
            frequencies: (1..=len).map(|i| i as f64 * df).collect(),
            magnitudes_db,
        }
    }

    #[test]
    fn test_finds_peaks_above_floor() {
        // bins of 4 Hz: peaks at 120 Hz and 340 Hz
        let spectrum = spectrum_with(&[(29, 10.0, 3), (84, 5.0, 3)], 200, 4.0);
        let peaks = find_peaks(&spectrum, -30.0, &NoiseConfig::default());
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].frequency_hz, 120.0);
        assert_eq!(peaks[1].frequency_hz, 340.0);
        assert!((peaks[0].margin_db - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_ignores_low_frequency_and_weak_bumps() {
        let spectrum = spectrum_with(&[(4, 10.0, 2), (60, -25.0, 2)], 200, 4.0);
        assert!(find_peaks(&spectrum, -30.0, &NoiseConfig::default()).is_empty());
    }

    #[test]
    fn test_peak_separation_keeps_stronger() {
        let spectrum = spectrum_with(&[(50, 10.0, 1), (54, 6.0, 1)], 200, 4.0);
        let config = NoiseConfig {
            peak_window_radius: 1,
            ..NoiseConfig::default()
        };
        let peaks = find_peaks(&spectrum, -30.0, &config);
        // bin 50 is 204 Hz, bin 54 is 220 Hz
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].frequency_hz, 204.0);
    }

    #[test]
    fn test_classification() {
        let config = NoiseConfig::default();
        let peak = |f: f64, w: f64| NoisePeak {
            frequency_hz: f,
            amplitude_db: 0.0,
            margin_db: 20.0,
            width_hz: w,
            class: PeakClass::Unknown,
        };
        assert_eq!(classify_peak(&peak(300.0, 8.0), Some(150.0), &config), PeakClass::MotorHarmonic);
        assert_eq!(classify_peak(&peak(800.0, 8.0), None, &config), PeakClass::Electrical);
        assert_eq!(classify_peak(&peak(150.0, 60.0), None, &config), PeakClass::FrameResonance);
        assert_eq!(classify_peak(&peak(450.0, 60.0), None, &config), PeakClass::Unknown);
        assert_eq!(
            fundamental_from_peaks(&[peak(300.0, 8.0), peak(150.0, 8.0), peak(40.0, 8.0)], &config),
            Some(150.0)
        );
    }
}
