//! ISO acknowledgement (PGN 59392), used to NAK requests the node cannot
//! answer.
//!
//! ```text
//! [control, group function, 0xFF, 0xFF, 0xFF, PGN (3 bytes LE)]
//! ```
use super::PGN_ISO_ACKNOWLEDGEMENT;
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use crate::protocol::lookups::AckControl;

/// Group function byte when the acknowledgement does not relate to one.
pub const NO_GROUP_FUNCTION: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoAcknowledgement {
    pub control: AckControl,
    pub group_function: u8,
    /// PGN being acknowledged.
    pub pgn: u32,
}

impl IsoAcknowledgement {
    /// Negative acknowledgement for a PGN the node does not provide.
    pub const fn nak(pgn: u32) -> Self {
        Self {
            control: AckControl::Nak,
            group_function: NO_GROUP_FUNCTION,
            pgn,
        }
    }
}

impl PgnData for IsoAcknowledgement {
    const PGN: u32 = PGN_ISO_ACKNOWLEDGEMENT;
    const PRIORITY: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 8 {
            return Err(DecodeError::InvalidLength { len: payload.len() });
        }
        let mut reader = BitReader::new(payload);
        let control =
            AckControl::try_from(reader.read_u8()?).map_err(|_| DecodeError::InvalidValue)?;
        let group_function = reader.read_u8()?;
        reader.skip_bytes(3)?;
        Ok(Self {
            control,
            group_function,
            pgn: reader.read_u24()?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(self.control.into())?;
        writer.write_u8(self.group_function)?;
        writer.write_slice(&[0xFF; 3])?;
        writer.write_u24(self.pgn)?;
        Ok(writer.byte_len())
    }
}
