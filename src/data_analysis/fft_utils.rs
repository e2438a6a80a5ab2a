// src/data_analysis/fft_utils.rs

use ndarray::Array1;
use num_complex::Complex64;
use realfft::RealFftPlanner;

/// Computes the FFT of a real-valued signal.
/// Returns the `n/2 + 1` one-sided complex spectrum. Handles empty input.
pub fn fft_forward(planner: &mut RealFftPlanner<f64>, data: &Array1<f64>) -> Array1<Complex64> {
    if data.is_empty() {
        return Array1::zeros(0);
    }
    let n = data.len();
    let fft = planner.plan_fft_forward(n);
    let mut input = data.to_vec();
    let mut output = fft.make_output_vec();
    if fft.process(&mut input, &mut output).is_err() {
        log::warn!("FFT forward processing failed for length {}", n);
        return Array1::zeros(n / 2 + 1);
    }
    Array1::from(output)
}

/// Symmetric Hann window of `num` points.
pub fn hann_window(num: usize) -> Array1<f64> {
    if num <= 1 {
        return Array1::ones(num);
    }
    Array1::from_iter((0..num).map(|i| {
        0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (num as f64 - 1.0)).cos())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_shape() {
        let w = hann_window(5);
        assert!(w[0].abs() < 1e-12);
        assert!((w[2] - 1.0).abs() < 1e-12);
        assert!(w[4].abs() < 1e-12);
    }

    #[test]
    fn test_fft_of_cosine_peaks_at_bin() {
        let n = 64;
        let data = Array1::from_iter(
            (0..n).map(|i| (2.0 * std::f64::consts::PI * 8.0 * i as f64 / n as f64).cos()),
        );
        let mut planner = RealFftPlanner::<f64>::new();
        let spectrum = fft_forward(&mut planner, &data);
        assert_eq!(spectrum.len(), n / 2 + 1);
        let peak_bin = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i);
        assert_eq!(peak_bin, Some(8));
    }
}
