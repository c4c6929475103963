//! ISO address claim (PGN 60928): the 8-byte NAME of the sender, broadcast
//! from the address it claims.
use super::{N2kMessage, PGN_ISO_ADDRESS_CLAIM};
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use crate::protocol::managment::iso_name::IsoName;

impl PgnData for IsoName {
    const PGN: u32 = PGN_ISO_ADDRESS_CLAIM;
    const PRIORITY: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < 8 {
            return Err(DecodeError::InvalidLength { len: payload.len() });
        }
        let mut reader = BitReader::new(payload);
        Ok(IsoName::from_raw(reader.read_u64()?))
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u64(self.raw())?;
        Ok(writer.byte_len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A claim announcement: `name` claims `source`.
pub struct AddressClaim {
    pub name: IsoName,
    pub source: u8,
}

impl AddressClaim {
    /// Build the claim message sent to `destination`.
    pub fn to_message(&self, destination: u8) -> Result<N2kMessage, BitWriterError> {
        Ok(self
            .name
            .to_message()?
            .from_source(self.source)
            .to_destination(destination))
    }

    /// Read a received claim: the NAME from the payload, the claimed address
    /// from the message source.
    pub fn from_message(message: &N2kMessage) -> Result<Self, DecodeError> {
        Ok(Self {
            name: <IsoName as PgnData>::from_message(message)?,
            source: message.source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::transport::BROADCAST_ADDRESS;

    #[test]
    /// The claim carries the NAME little-endian and the address as source.
    fn test_claim_message() {
        let claim = AddressClaim {
            name: IsoName::from_raw(0x0102_0304_0506_0708),
            source: 30,
        };
        let message = claim.to_message(BROADCAST_ADDRESS).unwrap();
        assert_eq!(message.pgn, PGN_ISO_ADDRESS_CLAIM);
        assert_eq!(message.source, 30);
        assert!(message.is_broadcast());
        assert_eq!(message.payload(), &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(AddressClaim::from_message(&message), Ok(claim));
    }

    #[test]
    /// A truncated claim is rejected.
    fn test_short_claim() {
        let message = N2kMessage::from_payload(PGN_ISO_ADDRESS_CLAIM, &[1, 2, 3]).unwrap();
        assert_eq!(
            AddressClaim::from_message(&message),
            Err(DecodeError::InvalidLength { len: 3 })
        );
    }
}
