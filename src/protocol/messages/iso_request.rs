//! ISO request (PGN 59904): ask a node, or every node, to send a PGN.
use super::PGN_ISO_REQUEST;
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoRequest {
    /// Requested PGN.
    pub pgn: u32,
}

impl IsoRequest {
    pub const fn new(pgn: u32) -> Self {
        Self { pgn }
    }
}

impl PgnData for IsoRequest {
    const PGN: u32 = PGN_ISO_REQUEST;
    const PRIORITY: u8 = 6;

    /// Accepts 3 to 8 bytes; anything after the PGN is ignored.
    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if !(3..=8).contains(&payload.len()) {
            return Err(DecodeError::InvalidLength { len: payload.len() });
        }
        let mut reader = BitReader::new(payload);
        Ok(Self {
            pgn: reader.read_u24()?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u24(self.pgn)?;
        Ok(writer.byte_len())
    }
}
