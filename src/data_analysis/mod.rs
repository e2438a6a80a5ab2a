// src/data_analysis/mod.rs

pub mod fft_utils;
pub mod filter_recommendations;
pub mod noise_analysis;
pub mod peak_detection;
pub mod pid_recommendations;
pub mod segmentation;
pub mod spectral_analysis;
pub mod step_analysis;
pub mod step_detection;
pub mod step_metrics;

pub use noise_analysis::{FilterAnalysisResult, NoiseLevel};
pub use step_analysis::{FlightStyle, PidAnalysisResult};
