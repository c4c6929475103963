//! NMEA 2000 transport layer: CAN frame representations, 29-bit identifier
//! management, Fast Packet encoding/reassembly, and the bus and clock seams.
//!
//! ## Addresses
//!
//! Source addresses 0 to 253 are usable by nodes. 254 is the null address a
//! node uses when it could not claim any address, and 255 is the global
//! (broadcast) destination.

pub mod can_frame;
pub mod can_id;
pub mod fast_packet;
pub mod traits;

/// Global destination address.
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Null address, only ever used to announce that no address could be claimed.
pub const NULL_ADDRESS: u8 = 0xFE;

/// Highest source address a node may transmit data from.
pub const MAX_SOURCE_ADDRESS: u8 = 253;

/// Returns `true` for the global destination address.
pub const fn is_broadcast(destination: u8) -> bool {
    destination == BROADCAST_ADDRESS
}
