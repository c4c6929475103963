//! `n2k-node` library: a `no_std` NMEA 2000 node engine. It turns raw CAN
//! frames into complete messages and back (fast packet transport), claims
//! and defends a bus address, answers the ISO and group-function system
//! messages, and keeps a registry of the other devices on the bus.
//!
//! The engine is poll driven: the host calls
//! [`NetworkManager::poll`](protocol::managment::network_manager::NetworkManager::poll)
//! repeatedly and every state machine advances inside that call.
#![no_std]
//==================================================================================
// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

/// Domain and low-level errors (identifier construction, payload cursors,
/// send refusals, node failures).
pub mod error;
/// Byte and bit cursors shared by every payload codec.
pub mod infra;
/// NMEA 2000 protocol implementation: CAN transport, fast packets,
/// network management, and system message codecs.
pub mod protocol;
//==================================================================================
