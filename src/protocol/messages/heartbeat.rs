//! Heartbeat (PGN 126993), broadcast at a fixed interval at priority 7.
//!
//! ```text
//! interval / 10 ms u16 | status u8 | 0xFF | 0xFFFFFFFF
//! ```
use super::PGN_HEARTBEAT;
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;

/// Largest interval the u16 field can carry.
pub const MAX_HEARTBEAT_INTERVAL_MS: u32 = 655_320;
/// Field value sent when the interval exceeds the representable range.
const INTERVAL_OUT_OF_RANGE: u16 = 0xFFFC;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Heartbeat {
    pub interval_ms: u32,
    pub status: u8,
}

impl Heartbeat {
    pub const fn new(interval_ms: u32) -> Self {
        Self {
            interval_ms,
            status: 0,
        }
    }
}

impl PgnData for Heartbeat {
    const PGN: u32 = PGN_HEARTBEAT;
    const PRIORITY: u8 = 7;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 3 {
            return Err(DecodeError::InvalidLength { len: payload.len() });
        }
        let mut reader = BitReader::new(payload);
        let interval = reader.read_u16()?;
        Ok(Self {
            interval_ms: interval as u32 * 10,
            status: reader.read_u8()?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let interval = if self.interval_ms > MAX_HEARTBEAT_INTERVAL_MS {
            INTERVAL_OUT_OF_RANGE
        } else {
            (self.interval_ms / 10) as u16
        };
        let mut writer = BitWriter::new(buffer);
        writer.write_u16(interval)?;
        writer.write_u8(self.status)?;
        writer.write_u8(0xFF)?;
        writer.write_u32(0xFFFF_FFFF)?;
        Ok(writer.byte_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Default one-minute heartbeat.
    fn test_heartbeat_layout() {
        let message = Heartbeat::new(60_000).to_message().unwrap();
        assert_eq!(message.priority, 7);
        assert_eq!(message.payload(), &[0x70, 0x17, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(Heartbeat::from_message(&message), Ok(Heartbeat::new(60_000)));
    }

    #[test]
    /// Intervals past the field range are flagged.
    fn test_heartbeat_out_of_range() {
        let message = Heartbeat::new(MAX_HEARTBEAT_INTERVAL_MS + 1).to_message().unwrap();
        assert_eq!(&message.payload()[..2], &[0xFC, 0xFF]);
    }
}
