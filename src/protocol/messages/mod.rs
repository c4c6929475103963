//! Application message value type and the payload codecs of the system PGNs
//! the node speaks itself.
//!
//! Every other PGN is opaque: the node moves its bytes around without ever
//! looking at field semantics.
use crate::error::{DecodeError, FastPacketError};
use crate::protocol::transport::can_id::CanIdFields;
use crate::protocol::transport::fast_packet::MAX_FAST_PACKET_PAYLOAD;
use crate::protocol::transport::BROADCAST_ADDRESS;
use heapless::Vec;

pub mod address_claim;
pub mod commanded_address;
pub mod configuration_information;
pub mod heartbeat;
pub mod iso_acknowledgement;
pub mod iso_request;
pub mod pgn_list;
pub mod product_information;

//==================================================================================PGNS
pub const PGN_ISO_ACKNOWLEDGEMENT: u32 = 59392;
pub const PGN_ISO_REQUEST: u32 = 59904;
pub const PGN_ISO_ADDRESS_CLAIM: u32 = 60928;
pub const PGN_COMMANDED_ADDRESS: u32 = 65240;
pub const PGN_GROUP_FUNCTION: u32 = 126208;
pub const PGN_PGN_LIST: u32 = 126464;
pub const PGN_HEARTBEAT: u32 = 126993;
pub const PGN_PRODUCT_INFORMATION: u32 = 126996;
pub const PGN_CONFIGURATION_INFORMATION: u32 = 126998;

/// Default priority for messages created without an explicit one.
pub const DEFAULT_PRIORITY: u8 = 6;

/// Payload storage of a message.
pub type Payload = Vec<u8, MAX_FAST_PACKET_PAYLOAD>;

//==================================================================================N2K_MESSAGE
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A complete NMEA 2000 message, single frame or reassembled fast packet.
///
/// On send the node overwrites `source` with its own claimed address.
pub struct N2kMessage {
    pub priority: u8,
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
    pub data: Payload,
}

impl N2kMessage {
    /// Broadcast message with the default priority and an empty payload.
    pub fn new(pgn: u32) -> Self {
        Self {
            priority: DEFAULT_PRIORITY,
            pgn,
            source: 0,
            destination: BROADCAST_ADDRESS,
            data: Vec::new(),
        }
    }

    /// Broadcast message carrying a copy of `payload`.
    pub fn from_payload(pgn: u32, payload: &[u8]) -> Result<Self, FastPacketError> {
        let data = Vec::from_slice(payload).map_err(|_| FastPacketError::PayloadTooLong {
            len: payload.len(),
        })?;
        Ok(Self {
            data,
            ..Self::new(pgn)
        })
    }

    /// Rebuild a message from a decoded identifier and its payload.
    pub fn from_header(header: CanIdFields, payload: &[u8]) -> Result<Self, FastPacketError> {
        let mut message = Self::from_payload(header.pgn, payload)?;
        message.priority = header.priority;
        message.source = header.source;
        message.destination = header.destination;
        Ok(message)
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    pub fn to_destination(mut self, destination: u8) -> Self {
        self.destination = destination;
        self
    }

    pub fn from_source(mut self, source: u8) -> Self {
        self.source = source;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.data
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination == BROADCAST_ADDRESS
    }

    /// Identifier fields used to frame this message.
    pub fn header(&self) -> CanIdFields {
        CanIdFields {
            priority: self.priority,
            pgn: self.pgn,
            source: self.source,
            destination: self.destination,
        }
    }

    /// Reject the message unless it carries `expected`.
    pub(crate) fn expect_pgn(&self, expected: u32) -> Result<(), DecodeError> {
        if self.pgn == expected {
            Ok(())
        } else {
            Err(DecodeError::WrongPgn {
                expected,
                found: self.pgn,
            })
        }
    }
}
