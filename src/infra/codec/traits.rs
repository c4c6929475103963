//! Uniform API of the system message codecs. Upper layers only deal with
//! [`N2kMessage`]; each codec knows its PGN, its priority and how to lay its
//! fields into a payload.
use crate::error::{BitWriterError, DecodeError};
use crate::protocol::messages::N2kMessage;
use crate::protocol::transport::fast_packet::MAX_FAST_PACKET_PAYLOAD;

//==================================================================================PGN_DATA
/// Implemented by every typed system payload.
pub trait PgnData: Sized {
    /// PGN carried by the message.
    const PGN: u32;
    /// Priority used when the node sends it.
    const PRIORITY: u8;

    /// Parse a raw payload.
    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError>;

    /// Serialize into `buffer`, returning the number of bytes written.
    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError>;

    /// Parse a message, checking its PGN first.
    fn from_message(message: &N2kMessage) -> Result<Self, DecodeError> {
        message.expect_pgn(Self::PGN)?;
        Self::from_payload(message.payload())
    }

    /// Build a broadcast message. Callers address it with
    /// [`N2kMessage::to_destination`] when needed.
    fn to_message(&self) -> Result<N2kMessage, BitWriterError> {
        let mut buffer = [0u8; MAX_FAST_PACKET_PAYLOAD];
        let len = self.to_payload(&mut buffer)?;
        let mut message = N2kMessage::new(Self::PGN).with_priority(Self::PRIORITY);
        message
            .data
            .extend_from_slice(&buffer[..len])
            .map_err(|_| BitWriterError::OutOfBounds {
                asked: len,
                available: MAX_FAST_PACKET_PAYLOAD,
            })?;
        Ok(message)
    }
}
