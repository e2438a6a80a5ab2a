// src/data_input/frame_decoder.rs
//
// Binary blackbox decoder: splits the byte stream into header-delimited
// chunks, decodes I/P/S/G/H/E frames against the header's decode plan and
// groups main frames into sessions.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

use crate::config::DecoderConfig;
use crate::data_input::byte_stream::{ByteStream, StreamError};
use crate::data_input::flight_data::{FieldTable, FlightData, LogSession, ParseResult, TimeSeries};
use crate::data_input::log_header::{parse_header_line, Encoding, FrameKind, FramePlan, LogHeader, Predictor};
use crate::error::DecodeError;
use crate::progress::{DecodeProgress, DecodeProgressEvent};

/// Every log written by the firmware starts with this header line.
pub const LOG_START_MARKER: &[u8] = b"H Product:";
const LOG_END_MESSAGE: &[u8] = b"End of log\0";

/// Events recorded in E-frames.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LogEvent {
    SyncBeep { time_us: i64 },
    InflightAdjustment { function: u8, value: f64 },
    LoggingResume { iteration: i64, time_us: i64 },
    Disarm { reason: u32 },
    FlightMode { flags: u32, last_flags: u32 },
    LogEnd,
}

#[derive(Error, Debug, Clone, PartialEq)]
enum FrameError {
    #[error("{0}")]
    Stream(#[from] StreamError),
    #[error("field '{0}' exceeds its declared width")]
    WidthOverflow(String),
    #[error("unknown event type {0}")]
    UnknownEvent(u8),
    #[error("malformed log-end event")]
    BadLogEnd,
    #[error("time went backwards ({last} -> {time} us)")]
    TimeBackwards { last: i64, time: i64 },
    #[error("time jumped {0} us")]
    TimeJump(i64),
    #[error("frame length {0} exceeds the maximum")]
    TooLong(usize),
    #[error("header defines no P-frame fields")]
    NoInterPlan,
}

/// A header-delimited region of the input. Chunks share no decoder state.
#[derive(Debug, Clone, Copy)]
pub struct LogChunk<'a> {
    pub offset: usize,
    pub bytes: &'a [u8],
}

/// Splits the input at every log-start header line. Bytes before the first
/// header are not part of any chunk.
pub fn split_log_chunks(bytes: &[u8]) -> Vec<LogChunk<'_>> {
    let mut starts: Vec<usize> = bytes
        .windows(LOG_START_MARKER.len())
        .enumerate()
        .filter(|(_, w)| *w == LOG_START_MARKER)
        .map(|(i, _)| i)
        .collect();

    // Logs that lack the product line still start with a header line.
    if starts.is_empty() && bytes.starts_with(b"H ") {
        starts.push(0);
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(bytes.len());
            LogChunk {
                offset: start,
                bytes: &bytes[start..end],
            }
        })
        .collect()
}

pub fn decode(bytes: &[u8], progress: &mut dyn DecodeProgress) -> ParseResult {
    decode_with_config(bytes, &DecoderConfig::default(), progress)
}

pub fn decode_file(
    path: &Path,
    config: &DecoderConfig,
    progress: &mut dyn DecodeProgress,
) -> Result<ParseResult, DecodeError> {
    let bytes = std::fs::read(path)?;
    info!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(decode_with_config(&bytes, config, progress))
}

pub fn decode_with_config(
    bytes: &[u8],
    config: &DecoderConfig,
    progress: &mut dyn DecodeProgress,
) -> ParseResult {
    let mut result = ParseResult::default();
    let chunks = split_log_chunks(bytes);

    if let Some(first) = chunks.first() {
        if first.offset > 0 {
            result
                .warnings
                .push(format!("Skipped {} bytes before the first log header", first.offset));
        }
    } else if !bytes.is_empty() {
        result
            .warnings
            .push("No log header found; nothing decoded".to_string());
    }

    let mut reporter = ProgressReporter {
        sink: progress,
        total_bytes: bytes.len(),
        interval: config.progress_interval_bytes.max(1),
        last_reported: 0,
    };

    for chunk in &chunks {
        let first_index = result.sessions.len();
        let outcome = decode_chunk(chunk, config, first_index, &mut reporter);
        result.corrupted_frame_count += outcome.corrupted_frame_count;
        result.warnings.extend(outcome.warnings);
        result.sessions.extend(outcome.sessions);
    }

    reporter.finish(result.sessions.len().saturating_sub(1));
    info!(
        "Decoded {} session(s), {} corrupted frame(s)",
        result.sessions.len(),
        result.corrupted_frame_count
    );
    result
}

struct ProgressReporter<'p> {
    sink: &'p mut dyn DecodeProgress,
    total_bytes: usize,
    interval: usize,
    last_reported: usize,
}

impl ProgressReporter<'_> {
    fn event(&self, bytes_processed: usize, current_session: usize) -> DecodeProgressEvent {
        let percent = if self.total_bytes == 0 {
            100.0
        } else {
            bytes_processed as f64 * 100.0 / self.total_bytes as f64
        };
        DecodeProgressEvent {
            bytes_processed,
            total_bytes: self.total_bytes,
            current_session,
            percent,
        }
    }

    fn maybe_report(&mut self, bytes_processed: usize, current_session: usize) {
        if bytes_processed >= self.last_reported + self.interval {
            self.last_reported = bytes_processed;
            let event = self.event(bytes_processed, current_session);
            self.sink.report(event);
        }
    }

    fn finish(&mut self, current_session: usize) {
        let event = self.event(self.total_bytes, current_session);
        self.sink.report(event);
    }
}

#[derive(Default)]
struct ChunkOutcome {
    sessions: Vec<LogSession>,
    corrupted_frame_count: usize,
    warnings: Vec<String>,
}

/// Accumulates the frames of the session currently being decoded.
struct SessionBuilder {
    table: FieldTable,
    slow: BTreeMap<String, TimeSeries>,
    events: Vec<LogEvent>,
    corrupted_frame_count: usize,
    skipped_frames: usize,
    warnings: Vec<String>,
}

impl SessionBuilder {
    fn new(header: &LogHeader) -> Self {
        Self {
            table: FieldTable::new(header.intra.names().map(str::to_string).collect()),
            slow: BTreeMap::new(),
            events: Vec::new(),
            corrupted_frame_count: 0,
            skipped_frames: 0,
            warnings: Vec::new(),
        }
    }

    fn push_slow(&mut self, plan: &FramePlan, values: &[i64], time_us: i64) {
        let time = time_us as f64 * 1e-6;
        for (field, &value) in plan.fields.iter().zip(values) {
            self.slow
                .entry(field.name.clone())
                .or_default()
                .push(time, value as f64);
        }
    }
}

/// Prediction history and per-chunk decode state.
struct ChunkDecoder<'h> {
    header: &'h LogHeader,
    config: &'h DecoderConfig,
    main_prev: Option<Vec<i64>>,
    main_prev2: Option<Vec<i64>>,
    slow_prev: Option<Vec<i64>>,
    gps_prev: Option<Vec<i64>>,
    gps_home: Option<Vec<i64>>,
    iteration_index: Option<usize>,
    time_index: Option<usize>,
    motor0_index: Option<usize>,
    gps_time_index: Option<usize>,
    last_iteration: Option<i64>,
    last_main_time: Option<i64>,
}

enum Decoded {
    Main { kind: FrameKind, values: Vec<i64> },
    Slow(Vec<i64>),
    Gps(Vec<i64>),
    GpsHome(Vec<i64>),
    Event(LogEvent),
    /// P-frame with no I-frame to predict from.
    Orphan,
}

fn read_fields(stream: &mut ByteStream, plan: &FramePlan) -> Result<Vec<i64>, StreamError> {
    let mut raw = vec![0i64; plan.fields.len()];
    for group in &plan.groups {
        let slot = &mut raw[group.first..group.first + group.len];
        match group.encoding {
            Encoding::SignedVb => slot[0] = i64::from(stream.read_signed_vb()?),
            Encoding::UnsignedVb => slot[0] = i64::from(stream.read_unsigned_vb()?),
            Encoding::Neg14Bit => slot[0] = i64::from(stream.read_neg_14bit()?),
            Encoding::Null => slot[0] = 0,
            Encoding::Tag8_8Svb => {
                let values = stream.read_tag8_8svb(group.len)?;
                copy_prefix(slot, &values);
            }
            Encoding::Tag2_3S32 => copy_prefix(slot, &stream.read_tag2_3s32()?),
            Encoding::Tag8_4S16 => copy_prefix(slot, &stream.read_tag8_4s16()?),
            Encoding::Tag2_3SVariable => copy_prefix(slot, &stream.read_tag2_3svariable()?),
        }
    }
    Ok(raw)
}

fn copy_prefix(slot: &mut [i64], values: &[i32]) {
    for (dst, &src) in slot.iter_mut().zip(values) {
        *dst = i64::from(src);
    }
}

impl<'h> ChunkDecoder<'h> {
    fn new(header: &'h LogHeader, config: &'h DecoderConfig) -> Self {
        Self {
            header,
            config,
            main_prev: None,
            main_prev2: None,
            slow_prev: None,
            gps_prev: None,
            gps_home: None,
            iteration_index: header.intra.index_of("loopIteration"),
            time_index: header.intra.index_of("time"),
            motor0_index: header.intra.index_of("motor[0]"),
            gps_time_index: header.gps.index_of("time"),
            last_iteration: None,
            last_main_time: None,
        }
    }

    fn apply_predictors(
        &self,
        plan: &FramePlan,
        raw: &mut [i64],
        prev: Option<&[i64]>,
        prev2: Option<&[i64]>,
        skipped_frames: i64,
        motor0_index: Option<usize>,
    ) -> Result<(), FrameError> {
        let header = self.header;
        for i in 0..raw.len() {
            let field = &plan.fields[i];
            let previous = prev.map(|p| p[i]);
            let prediction = match field.predictor {
                Predictor::Zero => 0,
                Predictor::Previous => previous.unwrap_or(0),
                Predictor::StraightLine => match (previous, prev2) {
                    (Some(p1), Some(p2)) => 2 * p1 - p2[i],
                    (Some(p1), None) => p1,
                    _ => 0,
                },
                Predictor::Average2 => match (previous, prev2) {
                    (Some(p1), Some(p2)) => (p1 + p2[i]) / 2,
                    (Some(p1), None) => p1,
                    _ => 0,
                },
                Predictor::MinThrottle => header.minthrottle,
                Predictor::Motor0 => match motor0_index {
                    Some(m) if m < i => raw[m],
                    _ => 0,
                },
                Predictor::Increment => 1 + skipped_frames + previous.unwrap_or(0),
                Predictor::HomeCoord => {
                    let coord = usize::from(field.name.ends_with("[1]"));
                    self.gps_home
                        .as_ref()
                        .and_then(|home| home.get(coord).copied())
                        .unwrap_or(0)
                }
                Predictor::Fifteen100 => 1500,
                Predictor::VbatRef => header.vbatref,
                Predictor::LastMainFrameTime => self.last_main_time.unwrap_or(0),
                Predictor::MinMotor => header.motor_output_low,
            };
            raw[i] += prediction;

            let in_range = if field.signed {
                raw[i] >= i64::from(i32::MIN) && raw[i] <= i64::from(i32::MAX)
            } else {
                raw[i] >= i64::from(i32::MIN) && raw[i] <= i64::from(u32::MAX)
            };
            if !in_range {
                return Err(FrameError::WidthOverflow(field.name.clone()));
            }
        }
        Ok(())
    }

    fn decode_main(&self, kind: FrameKind, stream: &mut ByteStream) -> Result<Decoded, FrameError> {
        let header = self.header;
        match kind {
            FrameKind::Intra => {
                let mut values = read_fields(stream, &header.intra)?;
                self.apply_predictors(&header.intra, &mut values, None, None, 0, self.motor0_index)?;
                Ok(Decoded::Main { kind, values })
            }
            _ => {
                if header.inter.is_empty() {
                    return Err(FrameError::NoInterPlan);
                }
                let mut values = read_fields(stream, &header.inter)?;
                let Some(prev) = self.main_prev.as_deref() else {
                    return Ok(Decoded::Orphan);
                };
                let prev2 = self.main_prev2.as_deref().or(Some(prev));
                let skipped = match self.iteration_index {
                    Some(idx) => header.skipped_frames_after(prev[idx]),
                    None => 0,
                };
                let motor0 = header.inter.index_of("motor[0]");
                self.apply_predictors(&header.inter, &mut values, Some(prev), prev2, skipped, motor0)?;
                Ok(Decoded::Main { kind, values })
            }
        }
    }

    fn decode_event(&self, stream: &mut ByteStream) -> Result<LogEvent, FrameError> {
        let event_type = stream.read_u8()?;
        Ok(match event_type {
            0 => LogEvent::SyncBeep {
                time_us: i64::from(stream.read_unsigned_vb()?),
            },
            13 => {
                let function = stream.read_u8()?;
                let value = if function & 0x80 != 0 {
                    let mut bytes = [0u8; 4];
                    for b in bytes.iter_mut() {
                        *b = stream.read_u8()?;
                    }
                    f64::from(f32::from_le_bytes(bytes))
                } else {
                    f64::from(stream.read_signed_vb()?)
                };
                LogEvent::InflightAdjustment {
                    function: function & 0x7F,
                    value,
                }
            }
            14 => LogEvent::LoggingResume {
                iteration: i64::from(stream.read_unsigned_vb()?),
                time_us: i64::from(stream.read_unsigned_vb()?),
            },
            15 => LogEvent::Disarm {
                reason: stream.read_unsigned_vb()?,
            },
            30 => LogEvent::FlightMode {
                flags: stream.read_unsigned_vb()?,
                last_flags: stream.read_unsigned_vb()?,
            },
            255 => {
                for &expected in LOG_END_MESSAGE {
                    if stream.read_u8()? != expected {
                        return Err(FrameError::BadLogEnd);
                    }
                }
                LogEvent::LogEnd
            }
            other => return Err(FrameError::UnknownEvent(other)),
        })
    }

    fn decode_frame(&self, kind: FrameKind, stream: &mut ByteStream) -> Result<Decoded, FrameError> {
        let header = self.header;
        match kind {
            kind if kind.is_main() => self.decode_main(kind, stream),
            FrameKind::Slow => {
                let mut values = read_fields(stream, &header.slow)?;
                let prev = self.slow_prev.as_deref();
                self.apply_predictors(&header.slow, &mut values, prev, None, 0, None)?;
                Ok(Decoded::Slow(values))
            }
            FrameKind::Gps => {
                let mut values = read_fields(stream, &header.gps)?;
                let prev = self.gps_prev.as_deref();
                self.apply_predictors(&header.gps, &mut values, prev, None, 0, None)?;
                Ok(Decoded::Gps(values))
            }
            FrameKind::GpsHome => {
                let mut values = read_fields(stream, &header.gps_home)?;
                self.apply_predictors(&header.gps_home, &mut values, None, None, 0, None)?;
                Ok(Decoded::GpsHome(values))
            }
            _ => self.decode_event(stream).map(Decoded::Event),
        }
    }

    /// Rejects main frames whose clock runs backwards or jumps too far.
    fn check_time(&self, values: &[i64]) -> Result<(), FrameError> {
        let (Some(idx), Some(last)) = (self.time_index, self.last_main_time) else {
            return Ok(());
        };
        let Some(&time) = values.get(idx) else {
            return Ok(());
        };
        if time < last {
            return Err(FrameError::TimeBackwards { last, time });
        }
        if time - last > self.config.max_time_jump_us {
            return Err(FrameError::TimeJump(time - last));
        }
        Ok(())
    }

    /// Time checks apply within a session; an I-frame that opens a new
    /// session is not compared against the previous one.
    fn validate(&self, decoded: &Decoded) -> Result<(), FrameError> {
        match decoded {
            Decoded::Main { kind, values } => {
                if *kind == FrameKind::Intra && self.starts_new_session(values) {
                    Ok(())
                } else {
                    self.check_time(values)
                }
            }
            _ => Ok(()),
        }
    }

    /// True when this I-frame's iteration breaks the running sequence.
    fn starts_new_session(&self, values: &[i64]) -> bool {
        match (self.iteration_index, self.last_iteration) {
            (Some(idx), Some(last)) => match values.get(idx) {
                Some(&iteration) => {
                    iteration < last || iteration - last > self.config.session_gap_iterations
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Drops the prediction history after a lost frame. P-frames decode as
    /// orphans until the next I-frame; the last accepted time stays as the
    /// reference for the time checks.
    fn invalidate_prediction(&mut self) {
        self.main_prev = None;
        self.main_prev2 = None;
    }

    fn reset_main_history(&mut self) {
        self.main_prev = None;
        self.main_prev2 = None;
        self.last_iteration = None;
        self.last_main_time = None;
    }

    fn accept_main(&mut self, kind: FrameKind, values: &[i64]) {
        if let Some(&iteration) = self.iteration_index.and_then(|idx| values.get(idx)) {
            self.last_iteration = Some(iteration);
        }
        if let Some(&time) = self.time_index.and_then(|idx| values.get(idx)) {
            self.last_main_time = Some(time);
        }
        match kind {
            // Both history slots hold the I-frame so the first P-frame of a
            // group averages the I-frame with itself.
            FrameKind::Intra => {
                self.main_prev = Some(values.to_vec());
                self.main_prev2 = Some(values.to_vec());
            }
            _ => {
                self.main_prev2 = self.main_prev.take();
                self.main_prev = Some(values.to_vec());
            }
        }
    }
}

fn frame_followed_by_boundary(stream: &ByteStream) -> bool {
    match stream.peek() {
        None => true,
        Some(byte) => FrameKind::from_marker(byte).is_some(),
    }
}

fn is_header_line(stream: &ByteStream) -> bool {
    stream.peek() == Some(b'H') && stream.byte_at(stream.pos() + 1) == Some(b' ')
}

fn finish_session(
    builder: SessionBuilder,
    header: &LogHeader,
    outcome: &mut ChunkOutcome,
    next_index: usize,
) {
    let SessionBuilder {
        table,
        slow,
        events,
        corrupted_frame_count,
        skipped_frames,
        mut warnings,
    } = builder;

    if skipped_frames > 0 {
        warnings.push(format!(
            "Skipped {} P-frame(s) without a preceding I-frame",
            skipped_frames
        ));
    }

    if table.row_count() == 0 {
        if corrupted_frame_count > 0 || !events.is_empty() {
            outcome
                .warnings
                .push("Dropped a session with no decodable main frames".to_string());
        }
        outcome.warnings.extend(warnings);
        return;
    }

    let flight_data = FlightData::from_table(header, table, slow);
    info!(
        "Session {}: {} frames, {:.1} s, {:.0} Hz",
        next_index, flight_data.frame_count, flight_data.duration_s, flight_data.sample_rate_hz
    );
    outcome.sessions.push(LogSession {
        index: next_index,
        header: header.clone(),
        flight_data,
        events,
        corrupted_frame_count,
        warnings,
    });
}

fn decode_chunk(
    chunk: &LogChunk,
    config: &DecoderConfig,
    first_index: usize,
    reporter: &mut ProgressReporter,
) -> ChunkOutcome {
    let mut outcome = ChunkOutcome::default();
    let mut stream = ByteStream::new(chunk.bytes);

    let mut lines = Vec::new();
    while is_header_line(&stream) {
        if let Some(line) = parse_header_line(stream.read_line()) {
            lines.push(line);
        }
    }

    let header = match LogHeader::from_lines(lines) {
        Ok(header) => header,
        Err(err) => {
            warn!("Skipping log at byte {}: {}", chunk.offset, err);
            outcome
                .warnings
                .push(format!("Skipping log at byte {}: {}", chunk.offset, err));
            return outcome;
        }
    };
    debug!(
        "Header at byte {}: {} main fields, firmware {:?}",
        chunk.offset,
        header.intra.fields.len(),
        header.firmware_revision
    );

    let mut decoder = ChunkDecoder::new(&header, config);
    let mut session = SessionBuilder::new(&header);
    let mut resyncing = false;

    let record_corrupt = |decoder: &mut ChunkDecoder<'_>,
                          session: &mut SessionBuilder,
                          outcome: &mut ChunkOutcome,
                          offset: usize,
                          reason: String| {
        let message = format!("Corrupt frame at byte {}: {}", chunk.offset + offset, reason);
        warn!("{}", message);
        decoder.invalidate_prediction();
        session.corrupted_frame_count += 1;
        session.warnings.push(message);
        outcome.corrupted_frame_count += 1;
    };

    while let Some(marker) = stream.peek() {
        reporter.maybe_report(chunk.offset + stream.pos(), first_index + outcome.sessions.len());
        let start = stream.pos();

        let kind = match FrameKind::from_marker(marker) {
            Some(FrameKind::GpsHome) if header.gps_home.is_empty() && is_header_line(&stream) => {
                let line = stream.read_line();
                debug!("Ignoring stray header line: {}", String::from_utf8_lossy(line));
                continue;
            }
            Some(kind) => kind,
            None => {
                if !resyncing {
                    record_corrupt(
                        &mut decoder,
                        &mut session,
                        &mut outcome,
                        start,
                        format!("unexpected byte 0x{:02X}", marker),
                    );
                    resyncing = true;
                }
                stream.advance(1);
                continue;
            }
        };

        stream.advance(1);
        let decoded = decoder.decode_frame(kind, &mut stream);
        let length = stream.pos() - start;

        let decoded = decoded.and_then(|d| {
            if length > config.max_frame_length {
                return Err(FrameError::TooLong(length));
            }
            decoder.validate(&d)?;
            Ok(d)
        });

        let decoded = match decoded {
            Ok(decoded) => decoded,
            Err(err) => {
                if !resyncing {
                    let reason = if matches!(err, FrameError::Stream(StreamError::Eof)) {
                        "truncated at end of data".to_string()
                    } else {
                        format!("{} frame: {}", kind.marker() as char, err)
                    };
                    record_corrupt(&mut decoder, &mut session, &mut outcome, start, reason);
                    resyncing = true;
                }
                stream.set_pos(start + 1);
                continue;
            }
        };
        resyncing = false;

        match decoded {
            Decoded::Main { kind, values } => {
                if kind == FrameKind::Intra && decoder.starts_new_session(&values) {
                    info!(
                        "Loop iteration discontinuity at byte {}; starting a new session",
                        chunk.offset + start
                    );
                    let next = first_index + outcome.sessions.len();
                    let finished = std::mem::replace(&mut session, SessionBuilder::new(&header));
                    finish_session(finished, &header, &mut outcome, next);
                    decoder.reset_main_history();
                }
                session.table.push_row(&values);
                decoder.accept_main(kind, &values);
            }
            Decoded::Orphan => session.skipped_frames += 1,
            Decoded::Slow(values) => {
                session.push_slow(&header.slow, &values, decoder.last_main_time.unwrap_or(0));
                decoder.slow_prev = Some(values);
            }
            Decoded::Gps(values) => {
                let time = decoder
                    .gps_time_index
                    .and_then(|idx| values.get(idx).copied())
                    .or(decoder.last_main_time)
                    .unwrap_or(0);
                session.push_slow(&header.gps, &values, time);
                decoder.gps_prev = Some(values);
            }
            Decoded::GpsHome(values) => {
                session.push_slow(&header.gps_home, &values, decoder.last_main_time.unwrap_or(0));
                decoder.gps_home = Some(values);
            }
            Decoded::Event(event) => {
                debug!("Event at byte {}: {:?}", chunk.offset + start, event);
                match &event {
                    LogEvent::LoggingResume { iteration, time_us } => {
                        // Logging restarts with an I-frame; P-frames before it
                        // have nothing valid to predict from.
                        decoder.main_prev = None;
                        decoder.main_prev2 = None;
                        decoder.last_iteration = Some(*iteration);
                        decoder.last_main_time = Some(*time_us);
                    }
                    LogEvent::Disarm { reason } => info!("Disarm event (reason {})", reason),
                    _ => {}
                }
                let is_end = event == LogEvent::LogEnd;
                session.events.push(event);
                if is_end {
                    break;
                }
            }
        }

        if !frame_followed_by_boundary(&stream) {
            let offset = stream.pos();
            record_corrupt(
                &mut decoder,
                &mut session,
                &mut outcome,
                offset,
                "frame not followed by a valid frame marker".to_string(),
            );
            resyncing = true;
            stream.advance(1);
        }
    }

    let next = first_index + outcome.sessions.len();
    finish_session(session, &header, &mut outcome, next);
    outcome
}
