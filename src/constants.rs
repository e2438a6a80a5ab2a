// src/constants.rs
//
// Default tuning constants. Every value here is the default of a field in
// `config::AnalysisConfig` and can be overridden from a JSON config file.

// --- Decoder ---
pub const MAX_FRAME_LENGTH: usize = 256; // Longest plausible encoded frame in bytes.
pub const MAX_TIME_JUMP_US: i64 = 10_000_000; // Main-frame time may not jump forward more than 10 s.
pub const SESSION_GAP_ITERATIONS: i64 = 5_000; // Loop-iteration discontinuity that starts a new session.
pub const DECODE_PROGRESS_INTERVAL_BYTES: usize = 64 * 1024;
pub const DEFAULT_MOTOR_POLES: u32 = 14;

// --- Segmenting ---
pub const FFT_WINDOW_SIZE: usize = 1024; // Samples per spectral segment.
pub const HOVER_THROTTLE_MIN_PCT: f64 = 15.0;
pub const HOVER_THROTTLE_MAX_PCT: f64 = 75.0;
pub const MAX_THROTTLE_STD_PCT: f64 = 5.0;
pub const MAX_STICK_RATE_DPS: f64 = 80.0;

// --- Spectrum / peaks ---
pub const NOISE_FLOOR_PERCENTILE: f64 = 0.25;
pub const MIN_PEAK_FREQUENCY_HZ: f64 = 30.0; // Ignore low-frequency flight content.
pub const PEAK_MARGIN_DB: f64 = 10.0;
pub const MIN_PEAK_SEPARATION_HZ: f64 = 20.0;
pub const MAX_PEAKS_PER_AXIS: usize = 6;
pub const PEAK_DETECTION_WINDOW_RADIUS: usize = 3;
pub const NARROW_PEAK_MAX_WIDTH_HZ: f64 = 30.0; // -3 dB full width.
pub const FRAME_RESONANCE_MIN_HZ: f64 = 60.0;
pub const FRAME_RESONANCE_MAX_HZ: f64 = 300.0;
pub const MOTOR_BAND_MIN_HZ: f64 = 70.0;
pub const MOTOR_BAND_MAX_HZ: f64 = 500.0;
pub const HARMONIC_TOLERANCE: f64 = 0.08; // Relative distance to an integer harmonic.
pub const ELECTRICAL_MIN_HZ: f64 = 600.0;
pub const NOISE_LEVEL_MEDIUM_DB: f64 = 6.0; // ~2 deg/s peak amplitude.
pub const NOISE_LEVEL_HIGH_DB: f64 = 20.0; // ~10 deg/s peak amplitude.
pub const NOISE_LEVEL_HIGH_PEAK_COUNT: usize = 4;
pub const NOISE_LEVEL_MEDIUM_PEAK_COUNT: usize = 3;

// --- Filter recommendations ---
pub const STRONG_PEAK_MARGIN_DB: f64 = 20.0;
pub const HIGH_CONFIDENCE_MARGIN_DB: f64 = 30.0;
pub const LOW_MID_BAND_MAX_HZ: f64 = 300.0;
pub const GYRO_LPF_MIN_HZ: f64 = 80.0;
pub const GYRO_LPF_MAX_HZ: f64 = 500.0;
pub const DTERM_LPF_MIN_HZ: f64 = 50.0;
pub const DTERM_LPF_MAX_HZ: f64 = 200.0;
pub const GYRO_CUTOFF_BELOW_PEAK_RATIO: f64 = 0.8;
pub const DTERM_CUTOFF_BELOW_PEAK_RATIO: f64 = 0.7;
pub const GYRO_LPF_RAISE_RATIO: f64 = 1.2;
pub const DTERM_LPF_RAISE_RATIO: f64 = 1.15;
pub const DYN_NOTCH_MIN_LIMIT_HZ: f64 = 60.0;
pub const DYN_NOTCH_MAX_LIMIT_HZ: f64 = 1000.0;
pub const DYN_NOTCH_MARGIN_RATIO: f64 = 0.2;
pub const CUTOFF_ROUNDING_HZ: f64 = 5.0;

// --- Step detection / measurement ---
pub const STEP_MIN_MAGNITUDE_DPS: f64 = 100.0;
pub const STEP_MAX_RISE_MS: f64 = 50.0;
pub const STEP_HOLD_TOLERANCE: f64 = 0.15;
pub const STEP_MIN_HOLD_MS: f64 = 100.0;
pub const RESPONSE_WINDOW_MS: f64 = 250.0;
pub const RISE_THRESHOLD: f64 = 0.9;
pub const LATENCY_THRESHOLD: f64 = 0.1;
pub const SETTLE_TOLERANCE: f64 = 0.05;
pub const RINGING_BAND: f64 = 0.05;
pub const STEADY_STATE_TAIL_FRACTION: f64 = 0.2; // Last fraction of the window averaged as steady state.

// --- PID recommendations ---
pub const P_STEP_RATIO: f64 = 0.10;
pub const I_STEP_RATIO: f64 = 0.10;
pub const D_STEP_RATIO: f64 = 0.15;
pub const FF_STEP_RATIO: f64 = 0.15;
pub const D_MAX_RATIO_OF_P: f64 = 1.2; // D has headroom while D < P * ratio.
pub const SEVERE_OVERSHOOT_FACTOR: f64 = 2.0;
pub const STEADY_STATE_ERROR_MAX: f64 = 0.1;
pub const FF_SMOOTH_FACTOR_STEP: f64 = 10.0;
pub const FF_SMOOTH_FACTOR_MAX: f64 = 75.0;
pub const FF_BOOST_STEP: f64 = 5.0;
pub const FF_BOOST_MAX: f64 = 50.0;
pub const MIN_STEPS_FOR_HIGH_CONFIDENCE: usize = 5;

// --- Flight style target bands: (overshoot %, rise ms, settling ms, latency ms, ringing) ---
pub const SMOOTH_BAND: (f64, f64, f64, f64, f64) = (8.0, 60.0, 150.0, 25.0, 1.0);
pub const BALANCED_BAND: (f64, f64, f64, f64, f64) = (15.0, 40.0, 120.0, 18.0, 2.0);
pub const AGGRESSIVE_BAND: (f64, f64, f64, f64, f64) = (25.0, 25.0, 100.0, 12.0, 3.0);

// src/constants.rs
