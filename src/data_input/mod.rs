// src/data_input/mod.rs

pub mod byte_stream;
pub mod csv_export;
pub mod filter_settings;
pub mod flight_data;
pub mod frame_decoder;
pub mod log_header;
pub mod pid_metadata;

pub use flight_data::{FlightData, LogSession, ParseResult, TimeSeries};
pub use frame_decoder::{decode, decode_file, decode_with_config, split_log_chunks};
