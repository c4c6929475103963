//! Frame generator: splits an outbound payload into the CAN frames that
//! carry it, a single frame or a fast-packet sequence.
use super::classification::Framing;
use super::{
    frame_header, CONTINUATION_FRAME_DATA, FIRST_FRAME_DATA, FRAME_PADDING,
    MAX_FAST_PACKET_PAYLOAD,
};
use crate::error::FastPacketError;
use crate::protocol::transport::can_frame::{CanFrame, CAN_FRAME_CAPACITY};
use crate::protocol::transport::can_id::{CanId, CanIdFields};

#[derive(Debug, Clone)]
/// Shared parameters for all frames composing one message.
pub struct FastPacketBuilder<'a> {
    header: CanIdFields,
    payload: &'a [u8],
    framing: Framing,
    sequence_id: u8,
}

/// Lazy iterator returning frames one by one as they are encoded.
#[derive(Debug, Clone)]
pub struct FrameIterator<'a> {
    id: CanId,
    payload: &'a [u8],
    fast_packet: bool,
    sequence_id: u8,
    frame_index: u8,
    bytes_sent: usize,
    done: bool,
}

impl<'a> FastPacketBuilder<'a> {
    /// Payloads of eight bytes or less go out as one frame unless `framing`
    /// asks for a fast packet. Longer payloads always use fast packets.
    pub fn new(header: CanIdFields, payload: &'a [u8], framing: Framing) -> Self {
        Self {
            header,
            payload,
            framing,
            sequence_id: 0,
        }
    }

    /// Set the 3-bit send-order tag shared by the frames of this message.
    pub fn with_sequence_id(mut self, sequence_id: u8) -> Self {
        self.sequence_id = sequence_id & 0x07;
        self
    }

    /// Whether the payload will be split into a fast packet.
    pub fn is_fast_packet(&self) -> bool {
        self.framing == Framing::FastPacket || self.payload.len() > CAN_FRAME_CAPACITY
    }

    /// Start the iteration; each call to `next` yields the next frame.
    pub fn build(self) -> Result<FrameIterator<'a>, FastPacketError> {
        if self.payload.len() > MAX_FAST_PACKET_PAYLOAD {
            return Err(FastPacketError::PayloadTooLong {
                len: self.payload.len(),
            });
        }
        Ok(FrameIterator {
            id: CanId::from_fields(self.header),
            fast_packet: self.is_fast_packet(),
            payload: self.payload,
            sequence_id: self.sequence_id,
            frame_index: 0,
            bytes_sent: 0,
            done: false,
        })
    }
}

impl Iterator for FrameIterator<'_> {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if !self.fast_packet {
            self.done = true;
            return CanFrame::from_slice(self.id, self.payload);
        }

        let mut data = [FRAME_PADDING; CAN_FRAME_CAPACITY];
        data[0] = frame_header(self.sequence_id, self.frame_index);
        let remaining = &self.payload[self.bytes_sent..];
        let copied = if self.frame_index == 0 {
            // Byte 1: total payload length.
            data[1] = self.payload.len() as u8;
            let count = remaining.len().min(FIRST_FRAME_DATA);
            data[2..2 + count].copy_from_slice(&remaining[..count]);
            count
        } else {
            let count = remaining.len().min(CONTINUATION_FRAME_DATA);
            data[1..1 + count].copy_from_slice(&remaining[..count]);
            count
        };

        self.bytes_sent += copied;
        self.frame_index = self.frame_index.wrapping_add(1);
        self.done = self.bytes_sent >= self.payload.len();

        Some(CanFrame {
            id: self.id,
            data,
            len: CAN_FRAME_CAPACITY,
        })
    }
}
