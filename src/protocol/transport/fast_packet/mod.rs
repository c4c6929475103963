//! NMEA 2000 Fast Packet support: carries payloads of up to 223 bytes across
//! successive CAN frames.
//!
//! ```text
//! first frame        [seq << 5 | 0, total length, 6 data bytes]
//! continuation frame [seq << 5 | counter, 7 data bytes]
//! ```
//!
//! `seq` is a 3-bit send-order tag shared by every frame of one message,
//! `counter` a 5-bit frame index. Unused trailing bytes are padded with `0xFF`.

/// Maximum payload a Fast Packet can transport once reassembled.
pub const MAX_FAST_PACKET_PAYLOAD: usize = 223;
/// Payload bytes carried by the first frame.
pub const FIRST_FRAME_DATA: usize = 6;
/// Payload bytes carried by each continuation frame.
pub const CONTINUATION_FRAME_DATA: usize = 7;
/// Filler for unused frame bytes.
pub const FRAME_PADDING: u8 = 0xFF;

pub mod assembler;
pub mod builder;
pub mod classification;

/// Frame index held in the low five bits of byte 0.
#[inline]
pub const fn frame_counter(header: u8) -> u8 {
    header & 0x1F
}

/// Send-order tag held in the high three bits of byte 0.
#[inline]
pub const fn sequence_id(header: u8) -> u8 {
    (header >> 5) & 0x07
}

/// Compose byte 0 of a fast-packet frame.
#[inline]
pub const fn frame_header(sequence_id: u8, counter: u8) -> u8 {
    ((sequence_id & 0x07) << 5) | (counter & 0x1F)
}
