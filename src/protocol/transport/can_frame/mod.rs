//! In-memory representation of an SAE J1939 / NMEA 2000 CAN frame, usable
//! directly with `embedded-can` drivers.
use crate::protocol::transport::can_id::CanId;
use embedded_can::{ExtendedId, Frame, Id};

/// Payload capacity of a classic CAN frame.
pub const CAN_FRAME_CAPACITY: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw NMEA 2000 frame as read from the CAN bus.
pub struct CanFrame {
    /// Full 29-bit CAN identifier stored inside a `u32`.
    pub id: CanId,
    /// Payload buffer. Unused trailing bytes hold `0xFF`.
    pub data: [u8; CAN_FRAME_CAPACITY],
    /// Number of valid payload bytes (Data Length Code, 0 to 8).
    pub len: usize,
}

impl CanFrame {
    /// Build a frame from an identifier and up to eight payload bytes.
    pub fn from_slice(id: CanId, payload: &[u8]) -> Option<Self> {
        if payload.len() > CAN_FRAME_CAPACITY {
            return None;
        }
        let mut data = [0xFF; CAN_FRAME_CAPACITY];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            id,
            data,
            len: payload.len(),
        })
    }

    /// Valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.min(CAN_FRAME_CAPACITY)]
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Extended(id) => CanFrame::from_slice(CanId(id.as_raw()), data),
            // NMEA 2000 only uses 29-bit identifiers.
            Id::Standard(_) => None,
        }
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        true
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        let raw = self.id.0 & ExtendedId::MAX.as_raw();
        Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::ZERO))
    }

    fn dlc(&self) -> usize {
        self.len
    }

    fn data(&self) -> &[u8] {
        self.payload()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// Short payloads are padded with 0xFF and keep their length.
    fn test_from_slice_pads() {
        let frame = CanFrame::from_slice(CanId(0x18EAFF01), &[1, 2, 3]).unwrap();
        assert_eq!(frame.len, 3);
        assert_eq!(frame.data, [1, 2, 3, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert!(CanFrame::from_slice(CanId(0), &[0; 9]).is_none());
    }

    #[test]
    /// The `embedded_can::Frame` view only accepts extended identifiers.
    fn test_embedded_can_frame() {
        let ext = ExtendedId::new(0x09F80123).unwrap();
        let frame = <CanFrame as Frame>::new(ext, &[0xAA; 8]).unwrap();
        assert_eq!(frame.id(), Id::Extended(ext));
        assert_eq!(frame.dlc(), 8);
        assert!(frame.is_extended());

        let std_id = embedded_can::StandardId::new(0x100).unwrap();
        assert!(<CanFrame as Frame>::new(std_id, &[0]).is_none());
    }
}
