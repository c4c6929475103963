//! Reassembler: turns received CAN frames into complete messages.
//!
//! Single-frame PGNs complete immediately. Fast packets are rebuilt in a fixed
//! pool of slots keyed by `(pgn, source)`, so several senders can interleave
//! their transfers. When the pool is full, the least recently touched slot is
//! recycled only once it has been idle for longer than
//! [`REASSEMBLY_IDLE_TIMEOUT`]; otherwise the new message is dropped.
use super::classification::{Framing, PgnClassification};
use super::{
    frame_counter, sequence_id, CONTINUATION_FRAME_DATA, FIRST_FRAME_DATA,
    MAX_FAST_PACKET_PAYLOAD,
};
use crate::protocol::messages::{N2kMessage, Payload};
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::can_id::CanIdFields;
use embassy_time::{Duration, Instant};

/// Default number of concurrent fast-packet transfers.
pub const DEFAULT_REASSEMBLY_SLOTS: usize = 5;
/// Idle time after which an unfinished transfer may be evicted.
pub const REASSEMBLY_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

//==================================================================================Enums and Structs
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessResult {
    /// Frame discarded: orphan continuation, lost frame, invalid length or
    /// no slot available.
    Ignored,
    /// Frame stored, more fragments are expected.
    FragmentConsumed,
    /// The message is complete.
    MessageComplete(CompletedMessage),
}

/// A complete message handed out by the reassembler. The slot it came from
/// is already free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedMessage {
    pub message: N2kMessage,
    /// PGN handled by the node rather than the application.
    pub is_system: bool,
}

#[derive(Debug, Clone)]
struct ReassemblySlot {
    in_use: bool,
    header: CanIdFields,
    sequence_id: u8,
    data: Payload,
    declared_length: usize,
    last_frame_counter: u8,
    last_touched_at: Instant,
}

impl ReassemblySlot {
    const fn new() -> Self {
        Self {
            in_use: false,
            header: CanIdFields {
                priority: 0,
                pgn: 0,
                source: 0,
                destination: 0,
            },
            sequence_id: 0,
            data: Payload::new(),
            declared_length: 0,
            last_frame_counter: 0,
            last_touched_at: Instant::from_ticks(0),
        }
    }

    fn matches(&self, pgn: u32, source: u8) -> bool {
        self.in_use && self.header.pgn == pgn && self.header.source == source
    }

    fn free(&mut self) {
        self.in_use = false;
        self.data.clear();
        self.declared_length = 0;
        self.last_frame_counter = 0;
    }

    /// Append at most `max` bytes, never past the declared length.
    fn append(&mut self, bytes: &[u8], max: usize) {
        let needed = self.declared_length.saturating_sub(self.data.len());
        let take = needed.min(max).min(bytes.len());
        // `declared_length` never exceeds the payload capacity.
        let _ = self.data.extend_from_slice(&bytes[..take]);
    }

    fn is_ready(&self) -> bool {
        self.data.len() >= self.declared_length
    }

    /// Move the message out and release the slot.
    fn take(&mut self, is_system: bool) -> CompletedMessage {
        let message = N2kMessage {
            priority: self.header.priority,
            pgn: self.header.pgn,
            source: self.header.source,
            destination: self.header.destination,
            data: core::mem::take(&mut self.data),
        };
        self.free();
        CompletedMessage { message, is_system }
    }
}

//==================================================================================FastPacketReassembler
/// Bounded pool of in-flight fast-packet transfers.
#[derive(Debug, Clone)]
pub struct FastPacketReassembler<const SLOTS: usize = DEFAULT_REASSEMBLY_SLOTS> {
    slots: [ReassemblySlot; SLOTS],
}

impl<const SLOTS: usize> Default for FastPacketReassembler<SLOTS> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SLOTS: usize> FastPacketReassembler<SLOTS> {
    pub const fn new() -> Self {
        Self {
            slots: [const { ReassemblySlot::new() }; SLOTS],
        }
    }

    /// Number of transfers currently in progress.
    pub fn in_progress(&self) -> usize {
        self.slots.iter().filter(|s| s.in_use).count()
    }

    /// Feed one frame; returns the message it completes, if any.
    pub fn ingest(
        &mut self,
        frame: &CanFrame,
        classification: &PgnClassification,
        now: Instant,
    ) -> Option<CompletedMessage> {
        match self.process_frame(frame, classification, now) {
            ProcessResult::MessageComplete(message) => Some(message),
            _ => None,
        }
    }

    //==================================================================================Process Functions
    /// Process one received frame.
    pub fn process_frame(
        &mut self,
        frame: &CanFrame,
        classification: &PgnClassification,
        now: Instant,
    ) -> ProcessResult {
        let header = frame.id.fields();
        let is_system = PgnClassification::is_system(header.pgn);

        if classification.framing(header.pgn) == Framing::SingleFrame {
            return match N2kMessage::from_header(header, frame.payload()) {
                Ok(message) => {
                    ProcessResult::MessageComplete(CompletedMessage { message, is_system })
                }
                Err(_) => ProcessResult::Ignored,
            };
        }

        let data = frame.payload();
        let Some(&first) = data.first() else {
            return ProcessResult::Ignored;
        };

        if frame_counter(first) == 0 {
            self.start_transfer(header, data, now, is_system)
        } else {
            self.continue_transfer(header, data, now, is_system)
        }
    }

    fn start_transfer(
        &mut self,
        header: CanIdFields,
        data: &[u8],
        now: Instant,
        is_system: bool,
    ) -> ProcessResult {
        let Some(&declared_length) = data.get(1) else {
            return ProcessResult::Ignored;
        };
        let declared_length = declared_length as usize;
        if declared_length > MAX_FAST_PACKET_PAYLOAD {
            debug!(
                "fast packet {} from {}: declared length {} too long",
                header.pgn,
                header.source,
                declared_length
            );
            return ProcessResult::Ignored;
        }

        let Some(index) = self.allocate(header.pgn, header.source, now) else {
            debug!(
                "fast packet {} from {}: no free slot, dropped",
                header.pgn,
                header.source
            );
            return ProcessResult::Ignored;
        };

        let slot = &mut self.slots[index];
        slot.free();
        slot.in_use = true;
        slot.header = header;
        slot.sequence_id = sequence_id(data[0]);
        slot.declared_length = declared_length;
        slot.last_touched_at = now;
        slot.append(&data[2..], FIRST_FRAME_DATA);

        if slot.is_ready() {
            ProcessResult::MessageComplete(slot.take(is_system))
        } else {
            ProcessResult::FragmentConsumed
        }
    }

    fn continue_transfer(
        &mut self,
        header: CanIdFields,
        data: &[u8],
        now: Instant,
        is_system: bool,
    ) -> ProcessResult {
        let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.matches(header.pgn, header.source))
        else {
            trace!(
                "fast packet {} from {}: orphan frame",
                header.pgn,
                header.source
            );
            return ProcessResult::Ignored;
        };

        let counter = frame_counter(data[0]);
        let expected = (slot.last_frame_counter + 1) & 0x1F;
        if sequence_id(data[0]) != slot.sequence_id || counter != expected {
            debug!(
                "fast packet {} from {}: lost frame (got {}, expected {})",
                header.pgn,
                header.source,
                counter,
                expected
            );
            slot.free();
            return ProcessResult::Ignored;
        }

        slot.last_frame_counter = counter;
        slot.last_touched_at = now;
        slot.append(&data[1..], CONTINUATION_FRAME_DATA);

        if slot.is_ready() {
            ProcessResult::MessageComplete(slot.take(is_system))
        } else {
            ProcessResult::FragmentConsumed
        }
    }

    /// Slot for a new transfer: the one already used by `(pgn, source)`, a
    /// free one, or the least recently touched one if idle long enough.
    fn allocate(&self, pgn: u32, source: u8, now: Instant) -> Option<usize> {
        if let Some(index) = self.slots.iter().position(|s| s.matches(pgn, source)) {
            return Some(index);
        }
        if let Some(index) = self.slots.iter().position(|s| !s.in_use) {
            return Some(index);
        }
        let (index, oldest) = self
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.last_touched_at)?;
        if now.saturating_duration_since(oldest.last_touched_at) > REASSEMBLY_IDLE_TIMEOUT {
            debug!(
                "evicting stale fast packet {} from {}",
                oldest.header.pgn,
                oldest.header.source
            );
            Some(index)
        } else {
            None
        }
    }
}
