//! Configuration information (PGN 126998): three variable-length ASCII
//! strings, installation description 1, installation description 2 and
//! manufacturer information, each encoded `[len + 2, 0x01, bytes...]`.
//!
//! The three texts together may not exceed [`MAX_CONFIGURATION_TEXT`] bytes.
//! Longer content is trimmed from manufacturer information first, then from
//! description 1, then from description 2.
use super::PGN_CONFIGURATION_INFORMATION;
use crate::error::{BitWriterError, ConfigError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use crate::protocol::transport::fast_packet::MAX_FAST_PACKET_PAYLOAD;
use heapless::String;

/// Combined text budget once the three two-byte headers are accounted for.
pub const MAX_CONFIGURATION_TEXT: usize = MAX_FAST_PACKET_PAYLOAD - 6;
/// Maximum length of one text field.
pub const CONFIGURATION_TEXT_LEN: usize = MAX_CONFIGURATION_TEXT;

/// A configuration information text field.
pub type ConfigurationText = String<CONFIGURATION_TEXT_LEN>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConfigurationInformation {
    pub installation_description1: ConfigurationText,
    pub installation_description2: ConfigurationText,
    pub manufacturer_information: ConfigurationText,
}

/// Copy `text` into a bounded field.
pub fn configuration_text(text: &str) -> Result<ConfigurationText, ConfigError> {
    ConfigurationText::try_from(text).map_err(|_| ConfigError::TextTooLong {
        len: text.len(),
        max: CONFIGURATION_TEXT_LEN,
    })
}

impl ConfigurationInformation {
    /// Build from plain strings, rejecting fields over 217 bytes.
    pub fn new(
        installation_description1: &str,
        installation_description2: &str,
        manufacturer_information: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            installation_description1: configuration_text(installation_description1)?,
            installation_description2: configuration_text(installation_description2)?,
            manufacturer_information: configuration_text(manufacturer_information)?,
        })
    }

    /// Lengths actually sent for (description 1, description 2,
    /// manufacturer information).
    fn encoded_lengths(&self) -> (usize, usize, usize) {
        let mut desc1 = self.installation_description1.len();
        let mut desc2 = self.installation_description2.len();
        let mut manufacturer = self.manufacturer_information.len();
        let mut excess = (desc1 + desc2 + manufacturer).saturating_sub(MAX_CONFIGURATION_TEXT);
        for len in [&mut manufacturer, &mut desc1, &mut desc2] {
            let cut = excess.min(*len);
            *len -= cut;
            excess -= cut;
        }
        (desc1, desc2, manufacturer)
    }
}

impl PgnData for ConfigurationInformation {
    const PGN: u32 = PGN_CONFIGURATION_INFORMATION;
    const PRIORITY: u8 = 6;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BitReader::new(payload);
        Ok(Self {
            installation_description1: reader.read_var_text()?,
            installation_description2: reader.read_var_text()?,
            manufacturer_information: reader.read_var_text()?,
        })
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let (desc1, desc2, manufacturer) = self.encoded_lengths();
        let mut writer = BitWriter::new(buffer);
        writer.write_var_text(&self.installation_description1.as_bytes()[..desc1])?;
        writer.write_var_text(&self.installation_description2.as_bytes()[..desc2])?;
        writer.write_var_text(&self.manufacturer_information.as_bytes()[..manufacturer])?;
        Ok(writer.byte_len())
    }
}
