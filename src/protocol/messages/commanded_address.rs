//! Commanded address (PGN 65240): another node orders the owner of a NAME to
//! move to a new address. Nine bytes, NAME then address.
use super::PGN_COMMANDED_ADDRESS;
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use crate::protocol::managment::iso_name::IsoName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandedAddress {
    /// NAME of the node that must move.
    pub name: IsoName,
    pub address: u8,
}

impl PgnData for CommandedAddress {
    const PGN: u32 = PGN_COMMANDED_ADDRESS;
    const PRIORITY: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 9 {
            return Err(DecodeError::InvalidLength { len: payload.len() });
        }
        let mut reader = BitReader::new(payload);
        Ok(Self {
            name: IsoName::from_raw(reader.read_u64()?),
            address: reader.read_u8()?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u64(self.name.raw())?;
        writer.write_u8(self.address)?;
        Ok(writer.byte_len())
    }
}
