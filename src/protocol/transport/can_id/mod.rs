//! Creation and extraction of the 29-bit CAN identifiers used by
//! NMEA 2000 (derived from the SAE J1939 specification).
//!
//! ```text
//! bits 26-28  priority
//! bit  25     reserved (R)
//! bit  24     data page (DP)
//! bits 16-23  PDU format (PF)
//! bits  8-15  PDU specific (PS): destination when PF < 240, PGN low byte otherwise
//! bits  0-7   source address
//! ```
use crate::error::CanIdBuildError;
use crate::protocol::transport::BROADCAST_ADDRESS;

/// PDU format values from this threshold up are broadcast-only (PDU2).
pub const PDU2_THRESHOLD: u8 = 240;
/// Mask of the 18-bit PGN space (R, DP, PF, PS).
pub const PGN_MASK: u32 = 0x3_FFFF;
const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Returns `true` when the PGN is destination-addressable (PDU1).
pub const fn is_pdu1(pgn: u32) -> bool {
    (((pgn >> 8) & 0xFF) as u8) < PDU2_THRESHOLD
}

//==================================================================================CAN_ID_FIELDS
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Decoded view of an identifier. `destination` is [`BROADCAST_ADDRESS`]
/// for every PDU2 PGN.
pub struct CanIdFields {
    pub priority: u8,
    pub pgn: u32,
    pub source: u8,
    pub destination: u8,
}

impl From<CanId> for CanIdFields {
    fn from(id: CanId) -> Self {
        id.fields()
    }
}

impl From<CanIdFields> for CanId {
    fn from(fields: CanIdFields) -> Self {
        CanId::from_fields(fields)
    }
}

//==================================================================================CAN_ID
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Encapsulates an extended CAN identifier (29 bits) and exposes accessors
/// for priority, PGN, destination, and source.
pub struct CanId(pub u32);

impl CanId {
    /// Creates a strict `CanIdBuilder` for a PGN and source address.
    pub fn builder(pgn: u32, source_address: u8) -> CanIdBuilder {
        CanIdBuilder::new(pgn, source_address)
    }

    /// Total encoding: never fails. PDU1 PGNs take `destination` in the PS
    /// byte (their own low byte is dropped), PDU2 PGNs ignore it.
    pub fn from_fields(fields: CanIdFields) -> Self {
        let pgn = fields.pgn & PGN_MASK;
        let base = (((fields.priority & 0x07) as u32) << 26) | fields.source as u32;
        if is_pdu1(pgn) {
            CanId(base | ((pgn & 0x3_FF00) << 8) | ((fields.destination as u32) << 8))
        } else {
            CanId(base | (pgn << 8))
        }
    }

    /// Total decoding into priority, PGN, source and destination.
    pub fn fields(&self) -> CanIdFields {
        CanIdFields {
            priority: self.priority(),
            pgn: self.pgn(),
            source: self.source_address(),
            destination: self.destination().unwrap_or(BROADCAST_ADDRESS),
        }
    }

    /// Returns the priority (3 bits, value 0-7) encoded in the CAN ID.
    pub fn priority(&self) -> u8 {
        ((self.0 >> 26) & 0x07) as u8
    }

    /// Extracts the 18-bit PGN, handling the PDU1/PDU2 distinction.
    pub fn pgn(&self) -> u32 {
        let raw = self.0 & EXTENDED_ID_MASK;
        let pf = ((raw >> 16) & 0xFF) as u8;
        let upper = (raw >> 8) & 0x3_FF00;

        if pf < PDU2_THRESHOLD {
            // PDU1: PS carries the destination, not part of the PGN.
            upper
        } else {
            upper | ((raw >> 8) & 0xFF)
        }
    }

    /// Returns the destination address (PDU1) when the PGN carries one.
    pub fn destination(&self) -> Option<u8> {
        let pf = ((self.0 >> 16) & 0xFF) as u8;
        if pf < PDU2_THRESHOLD {
            Some(((self.0 >> 8) & 0xFF) as u8)
        } else {
            None
        }
    }

    /// Eight-bit source address (logical node identifier on the N2K network).
    pub fn source_address(&self) -> u8 {
        (self.0 & 0xFF) as u8
    }
}
//==================================================================================CAN_ID_BUILDER
#[derive(Debug)]
/// Fluent builder that refuses PDU1/PDU2 misuse instead of silently
/// dropping bits like [`CanId::from_fields`].
pub struct CanIdBuilder {
    pub priority: u8,
    pub pgn: u32,
    pub source_address: u8,
    pub destination: Option<u8>,
}

impl CanIdBuilder {
    /// Initializes the builder for a given PGN and source address.
    pub fn new(pgn: u32, source_address: u8) -> Self {
        Self {
            priority: 6,
            pgn,
            source_address,
            destination: None,
        }
    }

    /// Sets the priority (3 bits) to use during construction.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority & 0x07;
        self
    }

    /// Assigns a destination address (PDU1). Implies a directed message.
    pub fn to_destination(mut self, destination_address: u8) -> Self {
        self.destination = Some(destination_address);
        self
    }

    /// Builds the CAN identifier while applying J1939 rules:
    /// - PF < 240 → addressed message (PDU1): `destination` mandatory and PGN PS byte must be `0`
    /// - PF ≥ 240 → broadcast (PDU2): `destination` must not be provided
    pub fn build(self) -> Result<CanId, CanIdBuildError> {
        let pgn = self.pgn & PGN_MASK;
        let pf = ((pgn >> 8) & 0xFF) as u8;
        let ps = (pgn & 0xFF) as u8;

        let destination = match self.destination {
            None if pf < PDU2_THRESHOLD => return Err(CanIdBuildError::InvalidForBroadcast),
            None => BROADCAST_ADDRESS,
            Some(_) if pf >= PDU2_THRESHOLD => {
                return Err(CanIdBuildError::InvalidForFocusedMessage { pf })
            }
            Some(_) if ps != 0 => return Err(CanIdBuildError::PsFocusMessageMustBeNull),
            Some(da) => da,
        };

        Ok(CanId::from_fields(CanIdFields {
            priority: self.priority,
            pgn,
            source: self.source_address,
            destination,
        }))
    }
}
