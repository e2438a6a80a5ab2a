// src/data_input/byte_stream.rs
//
// Cursor over the raw log bytes with the blackbox field decoders.
// All multi-value decoders return fixed arrays; callers take the prefix
// they need.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("unexpected end of data")]
    Eof,
    #[error("variable-length value longer than 5 bytes")]
    Overflow,
}

pub type StreamResult<T> = Result<T, StreamError>;

/// Sign-extend the low `bits` bits of `value`.
#[inline]
pub fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

#[inline]
pub fn zigzag_decode(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

pub struct ByteStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Byte at an absolute offset, without moving the cursor.
    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        self.data.get(offset).copied()
    }

    pub fn advance(&mut self, n: usize) {
        self.set_pos(self.pos + n);
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_u8(&mut self) -> StreamResult<u8> {
        let byte = self.peek().ok_or(StreamError::Eof)?;
        self.pos += 1;
        Ok(byte)
    }

    /// Reads up to and excluding the next `\n`, consuming the newline.
    pub fn read_line(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        match rest.iter().position(|&b| b == b'\n') {
            Some(n) => {
                self.pos += n + 1;
                &rest[..n]
            }
            None => {
                self.pos = self.data.len();
                rest
            }
        }
    }

    pub fn read_unsigned_vb(&mut self) -> StreamResult<u32> {
        let mut result: u64 = 0;
        for i in 0..5 {
            let byte = self.read_u8()?;
            result |= u64::from(byte & 0x7F) << (7 * i);
            if byte < 0x80 {
                return u32::try_from(result).map_err(|_| StreamError::Overflow);
            }
        }
        Err(StreamError::Overflow)
    }

    pub fn read_signed_vb(&mut self) -> StreamResult<i32> {
        self.read_unsigned_vb().map(zigzag_decode)
    }

    pub fn read_neg_14bit(&mut self) -> StreamResult<i32> {
        let raw = self.read_unsigned_vb()?;
        Ok(-sign_extend(raw & 0x3FFF, 14))
    }

    /// Up to 8 signed VB values behind one presence-bit header byte. A lone
    /// value is written without the header.
    pub fn read_tag8_8svb(&mut self, count: usize) -> StreamResult<[i32; 8]> {
        let mut values = [0i32; 8];
        if count == 1 {
            values[0] = self.read_signed_vb()?;
            return Ok(values);
        }
        let mut header = self.read_u8()?;
        for value in values.iter_mut().take(count.min(8)) {
            if header & 0x01 != 0 {
                *value = self.read_signed_vb()?;
            }
            header >>= 1;
        }
        Ok(values)
    }

    fn read_packed_widths(&mut self, mut selector: u8) -> StreamResult<[i32; 3]> {
        let mut values = [0i32; 3];
        for value in values.iter_mut() {
            *value = match selector & 0x03 {
                0 => self.read_u8()? as i8 as i32,
                1 => {
                    let lo = self.read_u8()? as u16;
                    let hi = self.read_u8()? as u16;
                    (lo | (hi << 8)) as i16 as i32
                }
                2 => {
                    let b1 = self.read_u8()? as u32;
                    let b2 = self.read_u8()? as u32;
                    let b3 = self.read_u8()? as u32;
                    sign_extend(b1 | (b2 << 8) | (b3 << 16), 24)
                }
                _ => {
                    let b1 = self.read_u8()? as u32;
                    let b2 = self.read_u8()? as u32;
                    let b3 = self.read_u8()? as u32;
                    let b4 = self.read_u8()? as u32;
                    (b1 | (b2 << 8) | (b3 << 16) | (b4 << 24)) as i32
                }
            };
            selector >>= 2;
        }
        Ok(values)
    }

    pub fn read_tag2_3s32(&mut self) -> StreamResult<[i32; 3]> {
        let lead = self.read_u8()?;
        match lead >> 6 {
            0 => Ok([
                sign_extend(u32::from((lead >> 4) & 0x03), 2),
                sign_extend(u32::from((lead >> 2) & 0x03), 2),
                sign_extend(u32::from(lead & 0x03), 2),
            ]),
            1 => {
                let next = self.read_u8()?;
                Ok([
                    sign_extend(u32::from(lead & 0x0F), 4),
                    sign_extend(u32::from(next >> 4), 4),
                    sign_extend(u32::from(next & 0x0F), 4),
                ])
            }
            2 => {
                let b1 = self.read_u8()?;
                let b2 = self.read_u8()?;
                Ok([
                    sign_extend(u32::from(lead & 0x3F), 6),
                    sign_extend(u32::from(b1 & 0x3F), 6),
                    sign_extend(u32::from(b2 & 0x3F), 6),
                ])
            }
            _ => self.read_packed_widths(lead),
        }
    }

    /// Data-version-2 layout: fields are packed on nibble boundaries.
    pub fn read_tag8_4s16(&mut self) -> StreamResult<[i32; 4]> {
        let mut selector = self.read_u8()?;
        let mut values = [0i32; 4];
        let mut nibble_pending = false;
        let mut buffer: u8 = 0;

        for value in values.iter_mut() {
            *value = match selector & 0x03 {
                0 => 0,
                1 => {
                    if nibble_pending {
                        nibble_pending = false;
                        sign_extend(u32::from(buffer & 0x0F), 4)
                    } else {
                        buffer = self.read_u8()?;
                        nibble_pending = true;
                        sign_extend(u32::from(buffer >> 4), 4)
                    }
                }
                2 => {
                    if nibble_pending {
                        let hi = buffer << 4;
                        buffer = self.read_u8()?;
                        (hi | (buffer >> 4)) as i8 as i32
                    } else {
                        self.read_u8()? as i8 as i32
                    }
                }
                _ => {
                    if nibble_pending {
                        let c1 = u16::from(buffer);
                        let c2 = u16::from(self.read_u8()?);
                        buffer = self.read_u8()?;
                        ((c1 << 12) | (c2 << 4) | (u16::from(buffer) >> 4)) as i16 as i32
                    } else {
                        let c1 = u16::from(self.read_u8()?);
                        let c2 = u16::from(self.read_u8()?);
                        ((c1 << 8) | c2) as i16 as i32
                    }
                }
            };
            selector >>= 2;
        }
        Ok(values)
    }

    pub fn read_tag2_3svariable(&mut self) -> StreamResult<[i32; 3]> {
        let lead = self.read_u8()?;
        match lead >> 6 {
            0 => Ok([
                sign_extend(u32::from((lead >> 4) & 0x03), 2),
                sign_extend(u32::from((lead >> 2) & 0x03), 2),
                sign_extend(u32::from(lead & 0x03), 2),
            ]),
            1 => {
                let b1 = u32::from(self.read_u8()?);
                let lead = u32::from(lead);
                Ok([
                    sign_extend((lead & 0x3E) >> 1, 5),
                    sign_extend(((lead & 0x01) << 4) | ((b1 & 0xF0) >> 4), 5),
                    sign_extend(b1 & 0x0F, 4),
                ])
            }
            2 => {
                let b1 = u32::from(self.read_u8()?);
                let b2 = u32::from(self.read_u8()?);
                let lead = u32::from(lead);
                Ok([
                    sign_extend(((lead & 0x3F) << 2) | ((b1 & 0xC0) >> 6), 8),
                    sign_extend(((b1 & 0x3F) << 1) | ((b2 & 0x80) >> 7), 7),
                    sign_extend(b2 & 0x7F, 7),
                ])
            }
            _ => self.read_packed_widths(lead),
        }
    }
}
