// src/lib.rs - Library interface for internal module access

pub mod apply;
pub mod axis_names;
pub mod config;
pub mod constants;
pub mod data_analysis;
pub mod data_input;
pub mod error;
pub mod progress;
pub mod recommendation;
