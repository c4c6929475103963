//! High-level components of the NMEA 2000 protocol: lookup tables,
//! network management, system message codecs, and CAN/Fast Packet transport.
pub mod lookups;
pub mod managment;
pub mod messages;
pub mod transport;
