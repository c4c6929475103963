//! Payload cursors used by every system message codec. NMEA 2000 payloads are
//! little-endian and mostly byte aligned, with a few packed nibbles (group
//! function acknowledgements) and padded text fields. The reader and writer
//! track a bit cursor so both shapes go through the same code path.
use crate::error::{BitReaderError, BitWriterError};
use heapless::String;

/// Padding byte for fixed-length text fields.
pub const TEXT_PADDING: u8 = 0x00;
/// Control byte preceding an ASCII variable-length text field.
pub const VAR_TEXT_ASCII: u8 = 0x01;

//==================================================================================BITREADER
/// Read cursor over a received payload.
pub struct BitReader<'a> {
    buffer: &'a [u8],
    /// Bits consumed since the start of the buffer.
    bit_cursor: usize,
}

impl<'a> BitReader<'a> {
    /// Create a reader positioned at the start of the payload.
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    /// Create a reader positioned `offset` bytes into the payload.
    pub fn at_offset(buffer: &'a [u8], offset: usize) -> Result<Self, BitReaderError> {
        if offset > buffer.len() {
            return Err(BitReaderError::OutOfBounds {
                asked: offset,
                available: buffer.len(),
            });
        }
        Ok(Self {
            buffer,
            bit_cursor: offset * 8,
        })
    }

    /// Bytes left after the cursor (partial byte counts as consumed).
    pub fn remaining_bytes(&self) -> usize {
        self.buffer.len().saturating_sub(self.bit_cursor.div_ceil(8))
    }

    /// Read `num_bits` (1..=64) little-endian bits starting at the cursor.
    pub fn read_bits(&mut self, num_bits: u8) -> Result<u64, BitReaderError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitReaderError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }

        let available = self.buffer.len() * 8 - self.bit_cursor;
        if num_bits as usize > available {
            return Err(BitReaderError::OutOfBounds {
                asked: num_bits as usize,
                available,
            });
        }

        let mut result: u64 = 0;
        let mut done: usize = 0;
        while done < num_bits as usize {
            let position = self.bit_cursor + done;
            let offset = position % 8;
            let take = (8 - offset).min(num_bits as usize - done);
            let mask = ((1u16 << take) - 1) as u8;
            let chunk = (self.buffer[position / 8] >> offset) & mask;
            result |= (chunk as u64) << done;
            done += take;
        }

        self.bit_cursor += num_bits as usize;
        Ok(result)
    }

    pub fn read_u8(&mut self) -> Result<u8, BitReaderError> {
        self.read_bits(8).map(|v| v as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, BitReaderError> {
        self.read_bits(16).map(|v| v as u16)
    }

    /// Three-byte little-endian value, the width of a PGN on the wire.
    pub fn read_u24(&mut self) -> Result<u32, BitReaderError> {
        self.read_bits(24).map(|v| v as u32)
    }

    pub fn read_u32(&mut self) -> Result<u32, BitReaderError> {
        self.read_bits(32).map(|v| v as u32)
    }

    pub fn read_u64(&mut self) -> Result<u64, BitReaderError> {
        self.read_bits(64)
    }

    /// Skip `length` bytes (reserved fields).
    pub fn skip_bytes(&mut self, length: usize) -> Result<(), BitReaderError> {
        self.read_slice(length).map(|_| ())
    }

    /// Return a slice of `len` bytes from the current position.
    /// Cursor must be aligned on an octet boundary.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], BitReaderError> {
        if self.bit_cursor % 8 != 0 {
            return Err(BitReaderError::NonAlignedBit {
                cursor: self.bit_cursor,
            });
        }

        let byte_start = self.bit_cursor / 8;
        let byte_end = byte_start + len;
        if byte_end > self.buffer.len() {
            return Err(BitReaderError::OutOfBounds {
                asked: len,
                available: self.buffer.len() - byte_start,
            });
        }
        self.bit_cursor += len * 8;
        Ok(&self.buffer[byte_start..byte_end])
    }

    /// Read a fixed-length text field. Text stops at the first `0x00`,
    /// `0xFF` or `@` byte; the whole field is consumed either way.
    pub fn read_fixed_text<const N: usize>(
        &mut self,
        field_len: usize,
    ) -> Result<String<N>, BitReaderError> {
        let raw = self.read_slice(field_len)?;
        Ok(text_from_bytes(raw))
    }

    /// Read a length-prefixed text field: `[len + 2, control, bytes...]`.
    /// Lengths below two yield an empty string.
    pub fn read_var_text<const N: usize>(&mut self) -> Result<String<N>, BitReaderError> {
        let total = self.read_u8()? as usize;
        if total < 2 {
            return Ok(String::new());
        }
        let _control = self.read_u8()?;
        let raw = self.read_slice(total - 2)?;
        Ok(text_from_bytes(raw))
    }
}

/// Decode printable text out of a raw field, truncating to `N` bytes.
fn text_from_bytes<const N: usize>(raw: &[u8]) -> String<N> {
    let mut text = String::new();
    for &byte in raw {
        if byte == 0x00 || byte == 0xFF || byte == b'@' {
            break;
        }
        let ch = if byte.is_ascii() { byte as char } else { '?' };
        if text.push(ch).is_err() {
            break;
        }
    }
    text
}

//==================================================================================BITWRITER

/// Write cursor laying fields into a caller-provided buffer.
pub struct BitWriter<'a> {
    buffer: &'a mut [u8],
    /// Bits written since the start of the buffer.
    bit_cursor: usize,
}

impl<'a> BitWriter<'a> {
    /// Create a writer positioned at the start of the buffer.
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            bit_cursor: 0,
        }
    }

    /// Number of bytes touched so far, a trailing partial byte included.
    pub fn byte_len(&self) -> usize {
        self.bit_cursor.div_ceil(8)
    }

    /// Write the `num_bits` (1..=64) low bits of `value`, little-endian.
    pub fn write_bits(&mut self, value: u64, num_bits: u8) -> Result<(), BitWriterError> {
        if !(1..=64).contains(&num_bits) {
            return Err(BitWriterError::TooLongForType {
                max: 64,
                asked: num_bits,
            });
        }

        let available = self.buffer.len() * 8 - self.bit_cursor;
        if num_bits as usize > available {
            return Err(BitWriterError::OutOfBounds {
                asked: num_bits as usize,
                available,
            });
        }

        let mut remaining = value;
        let mut done: usize = 0;
        while done < num_bits as usize {
            let position = self.bit_cursor + done;
            let offset = position % 8;
            let take = (8 - offset).min(num_bits as usize - done);
            let mask = ((1u16 << take) - 1) as u8;
            let byte = &mut self.buffer[position / 8];
            *byte = (*byte & !(mask << offset)) | (((remaining as u8) & mask) << offset);
            remaining >>= take;
            done += take;
        }

        self.bit_cursor += num_bits as usize;
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BitWriterError> {
        self.write_bits(value as u64, 8)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), BitWriterError> {
        self.write_bits(value as u64, 16)
    }

    /// Three-byte little-endian value, the width of a PGN on the wire.
    pub fn write_u24(&mut self, value: u32) -> Result<(), BitWriterError> {
        self.write_bits((value & 0x00FF_FFFF) as u64, 24)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), BitWriterError> {
        self.write_bits(value as u64, 32)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), BitWriterError> {
        self.write_bits(value, 64)
    }

    /// Copy an already-aligned byte slice into the buffer.
    pub fn write_slice(&mut self, slice: &[u8]) -> Result<(), BitWriterError> {
        if self.bit_cursor % 8 != 0 {
            return Err(BitWriterError::NonAlignedBit {
                cursor: self.bit_cursor,
            });
        }
        let byte_start = self.bit_cursor / 8;
        let byte_end = byte_start + slice.len();
        if byte_end > self.buffer.len() {
            return Err(BitWriterError::OutOfBounds {
                asked: slice.len(),
                available: self.buffer.len() - byte_start,
            });
        }
        self.buffer[byte_start..byte_end].copy_from_slice(slice);
        self.bit_cursor += slice.len() * 8;
        Ok(())
    }

    /// Write `text` into a field of exactly `field_len` bytes, truncating or
    /// padding with [`TEXT_PADDING`].
    pub fn write_fixed_text(&mut self, text: &str, field_len: usize) -> Result<(), BitWriterError> {
        let bytes = text.as_bytes();
        let used = bytes.len().min(field_len);
        self.write_slice(&bytes[..used])?;
        for _ in used..field_len {
            self.write_u8(TEXT_PADDING)?;
        }
        Ok(())
    }

    /// Write a length-prefixed ASCII text field: `[len + 2, 0x01, bytes...]`.
    pub fn write_var_text(&mut self, text: &[u8]) -> Result<(), BitWriterError> {
        if text.len() > u8::MAX as usize - 2 {
            return Err(BitWriterError::OutOfBounds {
                asked: text.len(),
                available: u8::MAX as usize - 2,
            });
        }
        self.write_u8(text.len() as u8 + 2)?;
        self.write_u8(VAR_TEXT_ASCII)?;
        self.write_slice(text)
    }
}
