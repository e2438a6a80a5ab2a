// src/data_input/log_header.rs
//
// Parses the `H name:value` header block and resolves every field's predictor
// and encoding into a decode plan before any frame is read.

use std::collections::HashMap;

use crate::error::DecodeError;

/// Frame type, identified by its marker byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    Intra,
    Inter,
    Slow,
    Gps,
    GpsHome,
    Event,
}

impl FrameKind {
    pub fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            b'I' => Some(FrameKind::Intra),
            b'P' => Some(FrameKind::Inter),
            b'S' => Some(FrameKind::Slow),
            b'G' => Some(FrameKind::Gps),
            b'H' => Some(FrameKind::GpsHome),
            b'E' => Some(FrameKind::Event),
            _ => None,
        }
    }

    pub fn marker(self) -> u8 {
        match self {
            FrameKind::Intra => b'I',
            FrameKind::Inter => b'P',
            FrameKind::Slow => b'S',
            FrameKind::Gps => b'G',
            FrameKind::GpsHome => b'H',
            FrameKind::Event => b'E',
        }
    }

    pub fn is_main(self) -> bool {
        matches!(self, FrameKind::Intra | FrameKind::Inter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    Zero,
    Previous,
    StraightLine,
    Average2,
    MinThrottle,
    Motor0,
    Increment,
    HomeCoord,
    Fifteen100,
    VbatRef,
    LastMainFrameTime,
    MinMotor,
}

impl Predictor {
    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0 => Predictor::Zero,
            1 => Predictor::Previous,
            2 => Predictor::StraightLine,
            3 => Predictor::Average2,
            4 => Predictor::MinThrottle,
            5 => Predictor::Motor0,
            6 => Predictor::Increment,
            7 => Predictor::HomeCoord,
            8 => Predictor::Fifteen100,
            9 => Predictor::VbatRef,
            10 => Predictor::LastMainFrameTime,
            11 => Predictor::MinMotor,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    SignedVb,
    UnsignedVb,
    Neg14Bit,
    Tag8_8Svb,
    Tag2_3S32,
    Tag8_4S16,
    Null,
    Tag2_3SVariable,
}

impl Encoding {
    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            0 => Encoding::SignedVb,
            1 => Encoding::UnsignedVb,
            3 => Encoding::Neg14Bit,
            6 => Encoding::Tag8_8Svb,
            7 => Encoding::Tag2_3S32,
            8 => Encoding::Tag8_4S16,
            9 => Encoding::Null,
            10 => Encoding::Tag2_3SVariable,
            _ => return None,
        })
    }

    /// Largest number of consecutive fields one read of this encoding covers.
    fn group_capacity(self) -> usize {
        match self {
            Encoding::Tag8_8Svb => 8,
            Encoding::Tag8_4S16 => 4,
            Encoding::Tag2_3S32 | Encoding::Tag2_3SVariable => 3,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub signed: bool,
    pub predictor: Predictor,
    pub encoding: Encoding,
}

/// A run of consecutive fields decoded by one encoding read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGroup {
    pub encoding: Encoding,
    pub first: usize,
    pub len: usize,
}

/// Resolved layout of one frame type.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FramePlan {
    pub fields: Vec<FieldDef>,
    pub groups: Vec<FieldGroup>,
}

impl FramePlan {
    fn build(fields: Vec<FieldDef>) -> Self {
        let mut groups = Vec::new();
        let mut i = 0;
        while i < fields.len() {
            let encoding = fields[i].encoding;
            let capacity = encoding.group_capacity();
            let mut len = 1;
            while len < capacity
                && i + len < fields.len()
                && fields[i + len].encoding == encoding
            {
                len += 1;
            }
            groups.push(FieldGroup { encoding, first: i, len });
            i += len;
        }
        Self { fields, groups }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    pub product: Option<String>,
    pub firmware_type: Option<String>,
    pub firmware_revision: Option<String>,
    pub data_version: u32,
    pub i_interval: i64,
    pub p_interval_num: i64,
    pub p_interval_denom: i64,
    pub minthrottle: i64,
    pub vbatref: i64,
    pub motor_output_low: i64,
    pub motor_output_high: i64,
    pub looptime_us: Option<f64>,
    pub intra: FramePlan,
    pub inter: FramePlan,
    pub slow: FramePlan,
    pub gps: FramePlan,
    pub gps_home: FramePlan,
    /// Every header line in file order, name as written.
    pub metadata: Vec<(String, String)>,
}

#[derive(Default)]
struct RawFieldLists {
    names: Vec<String>,
    signed: Vec<u32>,
    predictors: Vec<u32>,
    encodings: Vec<u32>,
}

fn parse_int_list(field: &str, value: &str) -> Result<Vec<u32>, DecodeError> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim().parse::<u32>().map_err(|_| DecodeError::InvalidHeader {
                field: field.to_string(),
                reason: format!("'{}' is not an integer", s.trim()),
            })
        })
        .collect()
}

fn parse_number(field: &str, value: &str) -> Result<i64, DecodeError> {
    value.trim().parse::<i64>().map_err(|_| DecodeError::InvalidHeader {
        field: field.to_string(),
        reason: format!("'{}' is not an integer", value.trim()),
    })
}

impl LogHeader {
    /// Builds the header from `(name, value)` lines as read from the log.
    pub fn from_lines(lines: Vec<(String, String)>) -> Result<Self, DecodeError> {
        let mut lists: HashMap<char, RawFieldLists> = HashMap::new();
        let mut header = LogHeader {
            product: None,
            firmware_type: None,
            firmware_revision: None,
            data_version: 2,
            i_interval: 32,
            p_interval_num: 1,
            p_interval_denom: 1,
            minthrottle: 1070,
            vbatref: 4095,
            motor_output_low: 0,
            motor_output_high: 2047,
            looptime_us: None,
            intra: FramePlan::default(),
            inter: FramePlan::default(),
            slow: FramePlan::default(),
            gps: FramePlan::default(),
            gps_home: FramePlan::default(),
            metadata: Vec::new(),
        };

        for (name, value) in &lines {
            if let Some(rest) = name.strip_prefix("Field ") {
                let mut parts = rest.splitn(2, ' ');
                let frame = parts.next().and_then(|s| s.chars().next());
                let attribute = parts.next().unwrap_or("");
                let Some(frame) = frame else { continue };
                let entry = lists.entry(frame).or_default();
                match attribute {
                    "name" => {
                        entry.names = value.split(',').map(|s| s.trim().to_string()).collect()
                    }
                    "signed" => entry.signed = parse_int_list(name, value)?,
                    "predictor" => entry.predictors = parse_int_list(name, value)?,
                    "encoding" => entry.encodings = parse_int_list(name, value)?,
                    _ => {}
                }
                continue;
            }

            match name.as_str() {
                "Product" => header.product = Some(value.clone()),
                "Firmware type" => header.firmware_type = Some(value.clone()),
                "Firmware revision" => header.firmware_revision = Some(value.clone()),
                "Data version" => header.data_version = parse_number(name, value)? as u32,
                "I interval" => header.i_interval = parse_number(name, value)?.max(1),
                "P interval" => {
                    let (num, denom) = match value.split_once('/') {
                        Some((n, d)) => (parse_number(name, n)?, parse_number(name, d)?),
                        None => (1, parse_number(name, value)?),
                    };
                    header.p_interval_num = num.max(1);
                    header.p_interval_denom = denom.max(1);
                }
                "minthrottle" => header.minthrottle = parse_number(name, value)?,
                "vbatref" => header.vbatref = parse_number(name, value)?,
                "motorOutput" => {
                    let range = parse_int_list(name, value)?;
                    if let Some(&low) = range.first() {
                        header.motor_output_low = i64::from(low);
                    }
                    if let Some(&high) = range.get(1) {
                        header.motor_output_high = i64::from(high);
                    }
                }
                "looptime" => header.looptime_us = value.trim().parse::<f64>().ok(),
                _ => {}
            }
        }

        header.intra = Self::resolve_plan('I', lists.get(&'I'), None)?;
        if header.intra.is_empty() {
            return Err(DecodeError::InvalidHeader {
                field: "Field I name".to_string(),
                reason: "no main-frame field definitions".to_string(),
            });
        }
        header.inter = Self::resolve_plan('P', lists.get(&'P'), Some(lists.get(&'I')))?;
        header.slow = Self::resolve_plan('S', lists.get(&'S'), None)?;
        header.gps = Self::resolve_plan('G', lists.get(&'G'), None)?;
        header.gps_home = Self::resolve_plan('H', lists.get(&'H'), None)?;
        header.metadata = lines;
        Ok(header)
    }

    /// P-frames take names and signedness from the I-frame definition.
    fn resolve_plan(
        frame: char,
        own: Option<&RawFieldLists>,
        inherit_from: Option<Option<&RawFieldLists>>,
    ) -> Result<FramePlan, DecodeError> {
        let Some(own) = own else {
            return Ok(FramePlan::default());
        };
        let (names, signed) = match inherit_from {
            Some(Some(base)) => (&base.names, &base.signed),
            Some(None) => return Ok(FramePlan::default()),
            None => (&own.names, &own.signed),
        };
        if names.is_empty() {
            return Ok(FramePlan::default());
        }
        if own.predictors.len() != names.len() || own.encodings.len() != names.len() {
            return Err(DecodeError::InvalidHeader {
                field: format!("Field {} predictor/encoding", frame),
                reason: format!(
                    "{} names but {} predictors and {} encodings",
                    names.len(),
                    own.predictors.len(),
                    own.encodings.len()
                ),
            });
        }

        let mut fields = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let predictor = Predictor::from_id(own.predictors[i]).ok_or_else(|| {
                DecodeError::InvalidHeader {
                    field: format!("Field {} predictor", frame),
                    reason: format!("unknown predictor {} for '{}'", own.predictors[i], name),
                }
            })?;
            let encoding = Encoding::from_id(own.encodings[i]).ok_or_else(|| {
                DecodeError::InvalidHeader {
                    field: format!("Field {} encoding", frame),
                    reason: format!("unknown encoding {} for '{}'", own.encodings[i], name),
                }
            })?;
            fields.push(FieldDef {
                name: name.clone(),
                signed: signed.get(i).copied().unwrap_or(0) != 0,
                predictor,
                encoding,
            });
        }
        Ok(FramePlan::build(fields))
    }

    /// Whether the firmware logged a main frame on this loop iteration.
    pub fn should_have_frame(&self, iteration: i64) -> bool {
        (iteration.rem_euclid(self.i_interval) + self.p_interval_num - 1)
            .rem_euclid(self.p_interval_denom)
            < self.p_interval_num
    }

    /// Iterations the P-interval dropped after `last_iteration`.
    pub fn skipped_frames_after(&self, last_iteration: i64) -> i64 {
        let mut skipped = 0;
        let mut iteration = last_iteration + 1;
        while !self.should_have_frame(iteration) && skipped < self.p_interval_denom {
            skipped += 1;
            iteration += 1;
        }
        skipped
    }

    /// Case-insensitive lookup in the raw metadata.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Main-loop sample rate implied by the header, if `looptime` was logged.
    pub fn header_sample_rate_hz(&self) -> Option<f64> {
        let looptime = self.looptime_us.filter(|&l| l > 0.0)?;
        let logged_fraction = self.p_interval_num as f64 / self.p_interval_denom as f64;
        Some(1e6 / looptime * logged_fraction)
    }
}

/// Splits one header text line (`H name:value`) into its parts.
pub fn parse_header_line(line: &[u8]) -> Option<(String, String)> {
    let text = std::str::from_utf8(line).ok()?;
    let text = text.trim_end_matches('\r');
    let body = text.strip_prefix("H ")?;
    let (name, value) = body.split_once(':')?;
    Some((name.trim().to_string(), value.to_string()))
}
