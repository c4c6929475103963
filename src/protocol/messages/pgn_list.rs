//! PGN list (PGN 126464): the PGNs a node transmits or receives.
//! Byte 0 selects the list, then one 3-byte PGN after another.
use super::PGN_PGN_LIST;
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use crate::protocol::lookups::PgnListKind;
use heapless::Vec;

/// Capacity of a PGN list.
pub const MAX_PGN_LIST: usize = 64;

/// Bounded list of PGNs.
pub type Pgns = Vec<u32, MAX_PGN_LIST>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PgnList {
    pub kind: PgnListKind,
    pub pgns: Pgns,
}

impl PgnList {
    /// Build a list from a slice. PGNs beyond [`MAX_PGN_LIST`] are dropped.
    pub fn new(kind: PgnListKind, pgns: &[u32]) -> Self {
        let mut list = Pgns::new();
        for &pgn in pgns.iter().take(MAX_PGN_LIST) {
            // Capacity checked by `take`.
            let _ = list.push(pgn);
        }
        Self { kind, pgns: list }
    }
}

impl PgnData for PgnList {
    const PGN: u32 = PGN_PGN_LIST;
    const PRIORITY: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BitReader::new(payload);
        let kind =
            PgnListKind::try_from(reader.read_u8()?).map_err(|_| DecodeError::InvalidValue)?;
        let mut pgns = Pgns::new();
        while reader.remaining_bytes() >= 3 {
            if pgns.push(reader.read_u24()?).is_err() {
                break;
            }
        }
        Ok(Self { kind, pgns })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(self.kind.into())?;
        for &pgn in &self.pgns {
            writer.write_u24(pgn)?;
        }
        Ok(writer.byte_len())
    }
}
