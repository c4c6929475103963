//! Product information (PGN 126996), 134 bytes.
//!
//! ```text
//! N2K version u16 | product code u16 | model id [32] | software code [32]
//! | model version [32] | serial code [32] | certification u8 | load u8
//! ```
use super::PGN_PRODUCT_INFORMATION;
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use heapless::String;

/// Length of each fixed text field.
pub const PRODUCT_TEXT_LEN: usize = 32;
/// Payload length of the message.
pub const PRODUCT_INFORMATION_LEN: usize = 134;

/// A product information text field.
pub type ProductText = String<PRODUCT_TEXT_LEN>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProductInformation {
    pub n2k_version: u16,
    pub product_code: u16,
    pub model_id: ProductText,
    pub software_code: ProductText,
    pub model_version: ProductText,
    pub serial_code: ProductText,
    pub certification_level: u8,
    /// Load equivalency, in units of 50 mA.
    pub load_equivalency: u8,
}

impl Default for ProductInformation {
    fn default() -> Self {
        Self {
            n2k_version: 1300,
            product_code: 666,
            model_id: String::new(),
            software_code: String::new(),
            model_version: String::new(),
            serial_code: String::new(),
            certification_level: 0,
            load_equivalency: 1,
        }
    }
}

impl PgnData for ProductInformation {
    const PGN: u32 = PGN_PRODUCT_INFORMATION;
    const PRIORITY: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.len() < PRODUCT_INFORMATION_LEN {
            return Err(DecodeError::InvalidLength { len: payload.len() });
        }
        let mut reader = BitReader::new(payload);
        Ok(Self {
            n2k_version: reader.read_u16()?,
            product_code: reader.read_u16()?,
            model_id: reader.read_fixed_text(PRODUCT_TEXT_LEN)?,
            software_code: reader.read_fixed_text(PRODUCT_TEXT_LEN)?,
            model_version: reader.read_fixed_text(PRODUCT_TEXT_LEN)?,
            serial_code: reader.read_fixed_text(PRODUCT_TEXT_LEN)?,
            certification_level: reader.read_u8()?,
            load_equivalency: reader.read_u8()?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u16(self.n2k_version)?;
        writer.write_u16(self.product_code)?;
        writer.write_fixed_text(&self.model_id, PRODUCT_TEXT_LEN)?;
        writer.write_fixed_text(&self.software_code, PRODUCT_TEXT_LEN)?;
        writer.write_fixed_text(&self.model_version, PRODUCT_TEXT_LEN)?;
        writer.write_fixed_text(&self.serial_code, PRODUCT_TEXT_LEN)?;
        writer.write_u8(self.certification_level)?;
        writer.write_u8(self.load_equivalency)?;
        Ok(writer.byte_len())
    }
}
