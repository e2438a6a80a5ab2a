// src/apply/msp.rs
//
// MSP v1 framing and a parameter channel that writes PID and feedforward
// gains over any byte link (serial port, TCP bridge).
//
// Frame: '$' 'M' <direction> <size> <command> <payload...> <checksum>
// where checksum = size ^ command ^ payload bytes.

use log::debug;
use std::io::{Read, Write};

use crate::apply::channels::{ParameterChannel, ParameterGroup, ParameterWrite};
use crate::axis_names::AXIS_KEYS;
use crate::error::ChannelError;

pub const MSP_PID_ADVANCED: u8 = 94;
pub const MSP_SET_PID_ADVANCED: u8 = 95;
pub const MSP_PID: u8 = 112;
pub const MSP_SET_PID: u8 = 202;

const MSP_MAX_PAYLOAD: usize = 255;
/// P, I, D bytes per PID item in the `MSP_PID` table.
const MSP_PID_ITEM_LEN: usize = 3;

/// Field layout of the `MSP_PID_ADVANCED` payload (API 1.44, firmware 4.3+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdvancedField {
    /// Little-endian u16 at this offset.
    U16(usize),
    U8(usize),
}

impl AdvancedField {
    fn for_setting(setting: &str) -> Option<Self> {
        match setting {
            "f_roll" => Some(AdvancedField::U16(32)),
            "f_pitch" => Some(AdvancedField::U16(34)),
            "f_yaw" => Some(AdvancedField::U16(36)),
            "feedforward_averaging" => Some(AdvancedField::U8(50)),
            "feedforward_smooth_factor" => Some(AdvancedField::U8(51)),
            "feedforward_boost" => Some(AdvancedField::U8(52)),
            "feedforward_max_rate_limit" => Some(AdvancedField::U8(53)),
            "feedforward_jitter_factor" => Some(AdvancedField::U8(54)),
            _ => None,
        }
    }

    fn end(self) -> usize {
        match self {
            AdvancedField::U16(offset) => offset + 2,
            AdvancedField::U8(offset) => offset + 1,
        }
    }

    fn patch(self, table: &mut [u8], setting: &str, value: i64) -> Result<(), ChannelError> {
        let out_of_range = |max: u32| {
            ChannelError::Rejected(format!("{} = {} is outside 0..={}", setting, value, max))
        };
        match self {
            AdvancedField::U16(offset) => {
                let value = u16::try_from(value).map_err(|_| out_of_range(u32::from(u16::MAX)))?;
                table[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
            }
            AdvancedField::U8(offset) => {
                table[offset] = u8::try_from(value).map_err(|_| out_of_range(u32::from(u8::MAX)))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MspDirection {
    /// '<' host to flight controller
    Request,
    /// '>' flight controller reply
    Response,
    /// '!' flight controller error reply
    Error,
}

impl MspDirection {
    fn marker(self) -> u8 {
        match self {
            MspDirection::Request => b'<',
            MspDirection::Response => b'>',
            MspDirection::Error => b'!',
        }
    }

    fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            b'<' => Some(MspDirection::Request),
            b'>' => Some(MspDirection::Response),
            b'!' => Some(MspDirection::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MspFrame {
    pub direction: MspDirection,
    pub command: u8,
    pub payload: Vec<u8>,
}

fn checksum(size: u8, command: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(size ^ command, |acc, &b| acc ^ b)
}

impl MspFrame {
    pub fn request(command: u8, payload: Vec<u8>) -> Self {
        Self {
            direction: MspDirection::Request,
            command,
            payload,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ChannelError> {
        if self.payload.len() > MSP_MAX_PAYLOAD {
            return Err(ChannelError::Protocol(format!(
                "payload of {} bytes exceeds MSP v1 limit",
                self.payload.len()
            )));
        }
        let size = self.payload.len() as u8;
        let mut bytes = Vec::with_capacity(self.payload.len() + 6);
        bytes.extend_from_slice(&[b'$', b'M', self.direction.marker(), size, self.command]);
        bytes.extend_from_slice(&self.payload);
        bytes.push(checksum(size, self.command, &self.payload));
        Ok(bytes)
    }

    /// Reads one frame, skipping any bytes before the `$M` preamble.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, ChannelError> {
        let mut byte = [0u8; 1];
        let mut previous = 0u8;
        loop {
            reader.read_exact(&mut byte)?;
            if previous == b'$' && byte[0] == b'M' {
                break;
            }
            previous = byte[0];
        }

        let mut header = [0u8; 3];
        reader.read_exact(&mut header)?;
        let direction = MspDirection::from_marker(header[0]).ok_or_else(|| {
            ChannelError::Protocol(format!("unknown direction byte 0x{:02x}", header[0]))
        })?;
        let (size, command) = (header[1], header[2]);

        let mut payload = vec![0u8; size as usize];
        reader.read_exact(&mut payload)?;
        reader.read_exact(&mut byte)?;
        let expected = checksum(size, command, &payload);
        if byte[0] != expected {
            return Err(ChannelError::Protocol(format!(
                "checksum mismatch for command {}: got 0x{:02x}, expected 0x{:02x}",
                command, byte[0], expected
            )));
        }
        Ok(Self {
            direction,
            command,
            payload,
        })
    }
}

/// Parameter channel speaking MSP v1. PID axis writes read the current
/// `MSP_PID` table, patch the axis and send it back with `MSP_SET_PID`;
/// feedforward writes do the same over `MSP_PID_ADVANCED`.
pub struct MspParameterChannel<L: Read + Write> {
    link: L,
}

impl<L: Read + Write> MspParameterChannel<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Sends a request and waits for the reply to the same command.
    pub fn request(&mut self, command: u8, payload: Vec<u8>) -> Result<Vec<u8>, ChannelError> {
        let bytes = MspFrame::request(command, payload).encode()?;
        self.link.write_all(&bytes)?;
        self.link.flush()?;

        let reply = MspFrame::read_from(&mut self.link)?;
        if reply.command != command {
            return Err(ChannelError::Protocol(format!(
                "expected reply to command {}, got {}",
                command, reply.command
            )));
        }
        match reply.direction {
            MspDirection::Response => Ok(reply.payload),
            MspDirection::Error => Err(ChannelError::Rejected(format!(
                "flight controller refused command {}",
                command
            ))),
            MspDirection::Request => Err(ChannelError::Protocol(
                "received a request frame as reply".to_string(),
            )),
        }
    }

    fn write_pid_axis(&mut self, axis: usize, values: &[(String, i64)]) -> Result<(), ChannelError> {
        let axis_key = AXIS_KEYS
            .get(axis)
            .ok_or_else(|| ChannelError::Unsupported(format!("PID axis {}", axis)))?;

        let mut table = self.request(MSP_PID, Vec::new())?;
        let offset = axis * MSP_PID_ITEM_LEN;
        if table.len() < offset + MSP_PID_ITEM_LEN {
            return Err(ChannelError::Protocol(format!(
                "PID table of {} bytes has no {} entry",
                table.len(),
                axis_key
            )));
        }

        for (setting, value) in values {
            let term = match setting.strip_suffix(axis_key).and_then(|s| s.strip_suffix('_')) {
                Some("p") => 0,
                Some("i") => 1,
                Some("d") => 2,
                _ => return Err(ChannelError::Unsupported(setting.clone())),
            };
            let byte = u8::try_from(*value).map_err(|_| {
                ChannelError::Rejected(format!("{} = {} is outside 0..=255", setting, value))
            })?;
            table[offset + term] = byte;
        }

        debug!("MSP_SET_PID {} -> {:?}", axis_key, &table[offset..offset + MSP_PID_ITEM_LEN]);
        self.request(MSP_SET_PID, table)?;
        Ok(())
    }

    fn write_feedforward(&mut self, values: &[(String, i64)]) -> Result<(), ChannelError> {
        let fields = values
            .iter()
            .map(|(setting, value)| {
                AdvancedField::for_setting(setting)
                    .map(|field| (field, setting, *value))
                    .ok_or_else(|| ChannelError::Unsupported(setting.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = self.request(MSP_PID_ADVANCED, Vec::new())?;
        for (field, setting, value) in fields {
            // older firmware sends a shorter table without the field
            if table.len() < field.end() {
                return Err(ChannelError::Unsupported(format!(
                    "{} (advanced PID table of {} bytes)",
                    setting,
                    table.len()
                )));
            }
            field.patch(&mut table, setting, value)?;
        }

        debug!("MSP_SET_PID_ADVANCED {:?}", values);
        self.request(MSP_SET_PID_ADVANCED, table)?;
        Ok(())
    }
}

impl<L: Read + Write> ParameterChannel for MspParameterChannel<L> {
    fn write(&mut self, write: &ParameterWrite) -> Result<(), ChannelError> {
        match write.group {
            ParameterGroup::PidAxis(axis) => self.write_pid_axis(axis, &write.values),
            ParameterGroup::Feedforward => self.write_feedforward(&write.values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// In-memory link: replies are pre-loaded, requests are captured.
    struct MockLink {
        replies: Cursor<Vec<u8>>,
        sent: Vec<u8>,
    }

    impl MockLink {
        fn new(replies: &[MspFrame]) -> Self {
            let bytes = replies
                .iter()
                .flat_map(|f| f.encode().unwrap())
                .collect();
            Self {
                replies: Cursor::new(bytes),
                sent: Vec::new(),
            }
        }
    }

    impl Read for MockLink {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.replies.read(buf)
        }
    }

    impl Write for MockLink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.sent.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn response(command: u8, payload: Vec<u8>) -> MspFrame {
        MspFrame {
            direction: MspDirection::Response,
            command,
            payload,
        }
    }

    #[test]
    fn test_request_encoding() {
        let bytes = MspFrame::request(MSP_PID, Vec::new()).encode().unwrap();
        assert_eq!(bytes, vec![b'$', b'M', b'<', 0, 112, 112]);
        let bytes = MspFrame::request(MSP_SET_PID, vec![1, 2]).encode().unwrap();
        assert_eq!(*bytes.last().unwrap(), 2 ^ 202 ^ 1 ^ 2);
    }

    #[test]
    fn test_read_skips_noise_and_checks_checksum() {
        let mut bytes = vec![0x00, b'x', b'$'];
        bytes.extend(response(MSP_PID, vec![45, 80, 40]).encode().unwrap());
        let frame = MspFrame::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(frame.payload, vec![45, 80, 40]);

        let mut corrupt = response(MSP_PID, vec![45, 80, 40]).encode().unwrap();
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;
        let err = MspFrame::read_from(&mut Cursor::new(corrupt)).unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[test]
    fn test_pid_axis_read_modify_write() {
        let table: Vec<u8> = (0..30).collect();
        let link = MockLink::new(&[response(MSP_PID, table.clone()), response(MSP_SET_PID, Vec::new())]);
        let mut channel = MspParameterChannel::new(link);
        channel
            .write(&ParameterWrite {
                group: ParameterGroup::PidAxis(1),
                values: vec![("p_pitch".to_string(), 52), ("d_pitch".to_string(), 50)],
            })
            .unwrap();

        let link = channel.into_inner();
        let mut sent = Cursor::new(link.sent);
        let first = MspFrame::read_from(&mut sent).unwrap();
        assert_eq!(first.command, MSP_PID);
        let second = MspFrame::read_from(&mut sent).unwrap();
        assert_eq!(second.command, MSP_SET_PID);
        let mut expected = table;
        expected[3] = 52;
        expected[5] = 50;
        assert_eq!(second.payload, expected);
    }

    #[test]
    fn test_error_reply_is_rejected() {
        let error_reply = MspFrame {
            direction: MspDirection::Error,
            command: MSP_PID,
            payload: Vec::new(),
        };
        let mut channel = MspParameterChannel::new(MockLink::new(&[error_reply]));
        let err = channel
            .write(&ParameterWrite {
                group: ParameterGroup::PidAxis(0),
                values: vec![("p_roll".to_string(), 50)],
            })
            .unwrap_err();
        assert!(matches!(err, ChannelError::Rejected(_)));
    }

    #[test]
    fn test_feedforward_read_modify_write() {
        let table: Vec<u8> = (0..57).collect();
        let link = MockLink::new(&[
            response(MSP_PID_ADVANCED, table.clone()),
            response(MSP_SET_PID_ADVANCED, Vec::new()),
        ]);
        let mut channel = MspParameterChannel::new(link);
        channel
            .write(&ParameterWrite {
                group: ParameterGroup::Feedforward,
                values: vec![
                    ("f_pitch".to_string(), 300),
                    ("feedforward_smooth_factor".to_string(), 35),
                ],
            })
            .unwrap();

        let link = channel.into_inner();
        let mut sent = Cursor::new(link.sent);
        let first = MspFrame::read_from(&mut sent).unwrap();
        assert_eq!(first.command, MSP_PID_ADVANCED);
        assert!(first.payload.is_empty());
        let second = MspFrame::read_from(&mut sent).unwrap();
        assert_eq!(second.command, MSP_SET_PID_ADVANCED);
        let mut expected = table;
        expected[34] = 0x2C;
        expected[35] = 0x01;
        expected[51] = 35;
        assert_eq!(second.payload, expected);
    }

    #[test]
    fn test_feedforward_unknown_setting_or_short_table() {
        let mut channel = MspParameterChannel::new(MockLink::new(&[]));
        let err = channel
            .write(&ParameterWrite {
                group: ParameterGroup::Feedforward,
                values: vec![("feedforward_transition".to_string(), 10)],
            })
            .unwrap_err();
        assert_eq!(err, ChannelError::Unsupported("feedforward_transition".to_string()));
        assert!(channel.into_inner().sent.is_empty());

        // table from firmware that predates the feedforward tuning fields
        let short: Vec<u8> = vec![0; 46];
        let mut channel =
            MspParameterChannel::new(MockLink::new(&[response(MSP_PID_ADVANCED, short)]));
        let err = channel
            .write(&ParameterWrite {
                group: ParameterGroup::Feedforward,
                values: vec![("feedforward_boost".to_string(), 20)],
            })
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(_)));
    }

    #[test]
    fn test_disconnected_link() {
        let mut channel = MspParameterChannel::new(MockLink::new(&[]));
        let err = channel.request(MSP_PID, Vec::new()).unwrap_err();
        assert_eq!(err, ChannelError::Disconnected);
    }
}
