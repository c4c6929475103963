//! Error definitions shared across library modules.
//! Each type models one failure scenario: identifier construction, payload
//! cursors, message decoding, send refusals and node-level failures.
use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors that can occur while building a 29-bit CAN identifier with the
/// strict builder.
pub enum CanIdBuildError {
    /// Attempt to build a broadcast message (PDU2) with PF < 240.
    #[error("Invalid for broadcast message: PF is too low")]
    InvalidForBroadcast,
    /// Attempt to send an addressed message (PDU1) with PF ≥ 240.
    #[error("Invalid for addressed message: PF is too high: {pf}")]
    InvalidForFocusedMessage { pf: u8 },
    /// In PDU1 the lower 8 bits of the PGN must remain zero.
    #[error("PDU1 PGNs require PS = 0")]
    PsFocusMessageMustBeNull,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while splitting a payload into CAN frames.
pub enum FastPacketError {
    /// Payload exceeds the 223 bytes a fast packet can carry.
    #[error("Payload too long for a fast packet: {len} bytes")]
    PayloadTooLong { len: usize },
}

//==================================================================================DECODE_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures while decoding the payload of a system message.
pub enum DecodeError {
    /// The message does not carry the PGN the decoder expects.
    #[error("Wrong PGN: expected {expected}, found {found}")]
    WrongPgn { expected: u32, found: u32 },
    /// Payload length is incompatible with the PGN definition.
    #[error("Invalid data length: {len}")]
    InvalidLength { len: usize },
    /// A field holds a value outside its definition.
    #[error("Invalid field value")]
    InvalidValue,
    /// Cursor ran past the payload.
    #[error(transparent)]
    Reader(#[from] BitReaderError),
}

//==================================================================================SEND_ERROR
#[derive(Error, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Outbound message refused by the node, or failed on the bus.
pub enum SendError<E: core::fmt::Debug> {
    /// The node runs in listen-only mode and never transmits.
    #[error("Node is listen-only")]
    ListenOnly,
    /// An address claim is in progress; data must not be sent yet.
    #[error("Address claim pending")]
    ClaimPending,
    /// The node lost every address it could claim.
    #[error("Node could not claim an address")]
    CannotClaim,
    /// The current source address is outside 0..=253.
    #[error("Invalid source address: {address}")]
    InvalidSource { address: u8 },
    /// The PGN does not fit the 18-bit PGN space.
    #[error("Invalid PGN: {pgn}")]
    InvalidPgn { pgn: u32 },
    /// Payload does not fit the transport chosen for the PGN.
    #[error(transparent)]
    Framing(#[from] FastPacketError),
    /// Payload could not be encoded.
    #[error(transparent)]
    Encode(#[from] BitWriterError),
    /// CAN layer refused or failed to send the frame.
    #[error("CAN bus send error: {0:?}")]
    Bus(E),
}

//==================================================================================NODE_ERROR
#[derive(Error, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Failures surfaced by `open()` and `poll()`.
pub enum NodeError<E: core::fmt::Debug> {
    /// The CAN driver could not be opened.
    #[error("CAN bus open error: {0:?}")]
    Open(E),
    /// Receiving a frame failed.
    #[error("CAN bus receive error: {0:?}")]
    Bus(E),
    /// A response or a scheduled message could not be sent.
    #[error("Send failed: {0:?}")]
    Send(SendError<E>),
}

impl<E: core::fmt::Debug> From<SendError<E>> for NodeError<E> {
    fn from(err: SendError<E>) -> Self {
        NodeError::Send(err)
    }
}

impl<E: core::fmt::Debug> From<BitWriterError> for NodeError<E> {
    fn from(err: BitWriterError) -> Self {
        NodeError::Send(SendError::Encode(err))
    }
}

//==================================================================================CONFIG_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Fixed-capacity configuration tables refused an entry.
pub enum ConfigError {
    /// The table is full.
    #[error("Capacity exceeded: {capacity}")]
    CapacityExceeded { capacity: usize },
    /// A text field is longer than its maximum length.
    #[error("Text too long: {len} > {max}")]
    TextTooLong { len: usize, max: usize },
}

//==================================================================================CHANNEL_BUS_ERROR
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised by the channel-backed CAN bus.
pub enum ChannelBusError {
    /// The transmit queue has no room for another frame.
    #[error("Transmit queue full")]
    TxQueueFull,
}

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while reading a payload.
pub enum BitReaderError {
    /// Attempted to read past the end of the buffer.
    #[error("Attempted to read out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Requested more bits than the target type can hold.
    #[error("Cannot read more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
    /// Cursor is not aligned on a byte boundary when required.
    #[error("Non aligned bit. Cursor: {cursor}")]
    NonAlignedBit { cursor: usize },
}
//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Errors raised while writing a payload.
pub enum BitWriterError {
    /// Attempted to write beyond the provided capacity.
    #[error("Attempted to write out of bounds -> asked: {asked}, available: {available}")]
    OutOfBounds { asked: usize, available: usize },
    /// Field is too large for the provided type.
    #[error("Cannot write more than {max} bits. Requested: {asked}")]
    TooLongForType { max: u8, asked: u8 },
    /// Cursor is not aligned on a byte boundary when the operation requires it.
    #[error("Non aligned bit. Cursor: {cursor}")]
    NonAlignedBit { cursor: usize },
}
