// tests/common/mod.rs
//
// Writes small synthetic blackbox logs: a text header followed by I/P main
// frames and optional S-frames. I-frames carry absolute values; P-frames
// use the increment predictor for the loop iteration, the straight-line
// predictor for time and the previous-value predictor for every other field.

#![allow(dead_code)]

pub const I_INTERVAL: i64 = 32;
pub const SLOW_FIELDS: [&str; 2] = ["flightModeFlags", "stateFlags"];

pub fn write_unsigned_vb(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn write_signed_vb(out: &mut Vec<u8>, value: i32) {
    write_unsigned_vb(out, ((value << 1) ^ (value >> 31)) as u32);
}

/// Header text for `loopIteration,time` followed by `fields`.
pub fn header(fields: &[&str], extra: &[(&str, &str)]) -> Vec<u8> {
    let mut names = vec!["loopIteration", "time"];
    names.extend_from_slice(fields);
    // per-field attribute list: iteration and time first, then one value for
    // every other field
    let list = |iteration: &str, time: &str, rest: &str| {
        let mut items = vec![iteration, time];
        items.extend(std::iter::repeat(rest).take(fields.len()));
        items.join(",")
    };

    let mut lines = vec![
        ("Product".to_string(), "Blackbox flight data recorder by Nicholas Sherlock".to_string()),
        ("Data version".to_string(), "2".to_string()),
        ("I interval".to_string(), I_INTERVAL.to_string()),
        ("P interval".to_string(), "1/1".to_string()),
        ("Firmware type".to_string(), "Cleanflight".to_string()),
        (
            "Firmware revision".to_string(),
            "Betaflight 4.4.2 (024f8e13d) STM32F7X2".to_string(),
        ),
        ("Field I name".to_string(), names.join(",")),
        ("Field I signed".to_string(), list("0", "0", "1")),
        ("Field I predictor".to_string(), list("0", "0", "0")),
        ("Field I encoding".to_string(), list("1", "1", "0")),
        ("Field P predictor".to_string(), list("6", "2", "1")),
        ("Field P encoding".to_string(), list("9", "0", "0")),
        ("Field S name".to_string(), SLOW_FIELDS.join(",")),
        ("Field S signed".to_string(), "0,0".to_string()),
        ("Field S predictor".to_string(), "0,0".to_string()),
        ("Field S encoding".to_string(), "1,1".to_string()),
    ];
    lines.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    let mut bytes = Vec::new();
    for (name, value) in lines {
        bytes.extend_from_slice(format!("H {}:{}\n", name, value).as_bytes());
    }
    bytes
}

/// Encodes main-frame rows (`[iteration, time_us, fields...]`) with the
/// prediction history the decoder keeps.
#[derive(Default)]
pub struct FrameWriter {
    pub bytes: Vec<u8>,
    prev: Option<Vec<i64>>,
    prev2: Option<Vec<i64>>,
}

impl FrameWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&mut self, row: &[i64]) {
        let restart = match &self.prev {
            Some(prev) => row[0] < prev[0],
            None => true,
        };
        if restart || row[0] % I_INTERVAL == 0 {
            self.bytes.push(b'I');
            write_unsigned_vb(&mut self.bytes, row[0] as u32);
            write_unsigned_vb(&mut self.bytes, row[1] as u32);
            for &value in &row[2..] {
                write_signed_vb(&mut self.bytes, value as i32);
            }
            self.prev = Some(row.to_vec());
            self.prev2 = Some(row.to_vec());
            return;
        }

        let (Some(prev), Some(prev2)) = (self.prev.take(), self.prev2.take()) else {
            unreachable!("history is set by the first frame");
        };
        self.bytes.push(b'P');
        write_signed_vb(&mut self.bytes, (row[1] - (2 * prev[1] - prev2[1])) as i32);
        for (i, &value) in row.iter().enumerate().skip(2) {
            write_signed_vb(&mut self.bytes, (value - prev[i]) as i32);
        }
        self.prev2 = Some(prev);
        self.prev = Some(row.to_vec());
    }

    /// S-frame with absolute values for [`SLOW_FIELDS`].
    pub fn slow(&mut self, values: [u32; 2]) {
        self.bytes.push(b'S');
        for value in values {
            write_unsigned_vb(&mut self.bytes, value);
        }
    }

    /// Inserts bytes that belong to no frame.
    pub fn garbage(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn end_of_log(&mut self) {
        self.bytes.push(b'E');
        self.bytes.push(0xFF);
        self.bytes.extend_from_slice(b"End of log\0");
    }
}

/// `n` rows at `sample_rate_hz`, iterations from 0, time from 1 s. `fields`
/// maps (sample index, time in seconds) to the field values.
pub fn rows(n: usize, sample_rate_hz: f64, fields: impl Fn(usize, f64) -> Vec<i64>) -> Vec<Vec<i64>> {
    let period_us = 1e6 / sample_rate_hz;
    (0..n)
        .map(|i| {
            let time_us = 1_000_000 + (i as f64 * period_us).round() as i64;
            let mut row = vec![i as i64, time_us];
            row.extend(fields(i, i as f64 / sample_rate_hz));
            row
        })
        .collect()
}

/// A complete single-session log.
pub fn build_log(fields: &[&str], extra: &[(&str, &str)], rows: &[Vec<i64>]) -> Vec<u8> {
    let mut bytes = header(fields, extra);
    let mut writer = FrameWriter::new();
    for row in rows {
        writer.frame(row);
    }
    writer.end_of_log();
    bytes.extend(writer.bytes);
    bytes
}

pub const MAIN_FIELDS: [&str; 7] = [
    "gyroADC[0]",
    "gyroADC[1]",
    "gyroADC[2]",
    "setpoint[0]",
    "setpoint[1]",
    "setpoint[2]",
    "setpoint[3]",
];

pub const PID_HEADER: [(&str, &str); 6] = [
    ("rollPID", "45,80,40"),
    ("pitchPID", "47,84,46"),
    ("yawPID", "45,80,0"),
    ("ff_weight", "120,125,120"),
    ("gyro_lpf1_static_hz", "250"),
    ("dterm_lpf1_static_hz", "100"),
];
