// src/data_analysis/spectral_analysis.rs

use ndarray::Array1;
use realfft::RealFftPlanner;

use crate::data_analysis::fft_utils;
use crate::error::AnalysisError;

/// One-sided amplitude spectrum in dB, DC bin removed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AmplitudeSpectrum {
    pub frequencies: Vec<f64>,
    pub magnitudes_db: Vec<f64>,
}

impl AmplitudeSpectrum {
    pub fn resolution_hz(&self) -> f64 {
        match self.frequencies.as_slice() {
            [a, b, ..] => b - a,
            _ => 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }
}

/// Calculates the frequency vector for FFT results
pub fn frequency_vector(nfft: usize, sample_rate: f64) -> Vec<f64> {
    let num_freqs = nfft / 2 + 1;
    (0..num_freqs)
        .map(|i| (i as f64 * sample_rate) / (nfft as f64))
        .collect()
}

/// Converts magnitude to decibels
pub fn to_magnitude_db(magnitude: f64) -> f64 {
    if magnitude > 0.0 {
        20.0 * magnitude.log10()
    } else {
        -100.0 // Floor for zero/negative values
    }
}

/// Averages the Hann-windowed amplitude spectrum (in dB) of `signal` over
/// the windows starting at `segment_starts`, each `segment_length` long.
///
/// Amplitudes are normalised by the window sum so a sine of amplitude A
/// reads close to `20·log10(A)` at its bin.
pub fn averaged_amplitude_spectrum_db(
    signal: &[f64],
    segment_starts: &[usize],
    segment_length: usize,
    sample_rate: f64,
    mut on_segment: impl FnMut(usize),
) -> Result<AmplitudeSpectrum, AnalysisError> {
    if sample_rate <= 0.0 {
        return Err(AnalysisError::InvalidInput(format!(
            "sample rate must be positive, got {}",
            sample_rate
        )));
    }
    if segment_length < 2 {
        return Err(AnalysisError::InvalidInput("segment too short".to_string()));
    }

    let window = fft_utils::hann_window(segment_length);
    let window_sum: f64 = window.sum();
    let num_freqs = segment_length / 2 + 1;
    let mut db_sum = vec![0.0f64; num_freqs];
    let mut segment_count = 0usize;
    let mut planner = RealFftPlanner::<f64>::new();

    for &start in segment_starts {
        let end = start + segment_length;
        if end > signal.len() {
            continue;
        }
        let segment = &signal[start..end];
        let mean = segment.iter().sum::<f64>() / segment_length as f64;
        let windowed = Array1::from_iter(
            segment
                .iter()
                .zip(window.iter())
                .map(|(&x, &w)| (x - mean) * w),
        );

        let spectrum = fft_utils::fft_forward(&mut planner, &windowed);
        for (acc, bin) in db_sum.iter_mut().zip(spectrum.iter()) {
            *acc += to_magnitude_db(2.0 * bin.norm() / window_sum);
        }
        segment_count += 1;
        on_segment(segment_count);
    }

    if segment_count == 0 {
        return Err(AnalysisError::InsufficientData(
            "no complete segment for spectral analysis".to_string(),
        ));
    }

    let frequencies = frequency_vector(segment_length, sample_rate);
    Ok(AmplitudeSpectrum {
        frequencies: frequencies[1..].to_vec(),
        magnitudes_db: db_sum[1..]
            .iter()
            .map(|&sum| sum / segment_count as f64)
            .collect(),
    })
}

/// Linear-interpolated percentile (`q` in [0, 1]) of `values`.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}
