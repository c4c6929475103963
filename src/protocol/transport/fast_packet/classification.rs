//! PGN classification table: decides whether a PGN travels as a single frame
//! or as a fast packet, and whether it is a system PGN handled by the node.
//!
//! Only framing is decided here; payload content is never validated. PGNs
//! found in no list are single frame.
use crate::error::ConfigError;
use heapless::Vec;

/// Capacity of each application list.
pub const MAX_APPLICATION_PGNS: usize = 48;

/// System PGNs that fit one frame: ISO acknowledgement, request, claim.
pub const SYSTEM_SINGLE_FRAME_PGNS: [u32; 3] = [59392, 59904, 60928];
/// System PGNs sent as fast packets: commanded address, group function,
/// PGN list.
pub const SYSTEM_FAST_PACKET_PGNS: [u32; 3] = [65240, 126208, 126464];

pub const DEFAULT_SINGLE_FRAME_PGNS: [u32; 22] = [
    126992, 127245, 127250, 127251, 127257, 127488, 127493, 127501, 127505, 127508, 127513,
    128259, 128267, 129025, 129026, 129283, 130306, 130310, 130311, 130312, 130314, 130316,
];

pub const DEFAULT_FAST_PACKET_PGNS: [u32; 16] = [
    126996, 126998, 127237, 127489, 127506, 128275, 129029, 129038, 129039, 129284, 129285,
    129540, 129794, 129809, 129810, 130074,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Framing {
    SingleFrame,
    FastPacket,
}

/// Application lists on top of the fixed system lists.
#[derive(Debug, Clone)]
pub struct PgnClassification {
    single_frame: Vec<u32, MAX_APPLICATION_PGNS>,
    fast_packet: Vec<u32, MAX_APPLICATION_PGNS>,
}

impl Default for PgnClassification {
    /// System lists plus the usual navigation and engine PGNs.
    fn default() -> Self {
        let mut table = Self::system_only();
        // Both default lists are smaller than the capacity.
        let _ = table.single_frame.extend_from_slice(&DEFAULT_SINGLE_FRAME_PGNS);
        let _ = table.fast_packet.extend_from_slice(&DEFAULT_FAST_PACKET_PGNS);
        table
    }
}

impl PgnClassification {
    /// Only the system PGNs are known.
    pub const fn system_only() -> Self {
        Self {
            single_frame: Vec::new(),
            fast_packet: Vec::new(),
        }
    }

    /// Returns `true` for PGNs the node handles itself.
    pub fn is_system(pgn: u32) -> bool {
        SYSTEM_SINGLE_FRAME_PGNS.contains(&pgn) || SYSTEM_FAST_PACKET_PGNS.contains(&pgn)
    }

    pub fn framing(&self, pgn: u32) -> Framing {
        if SYSTEM_SINGLE_FRAME_PGNS.contains(&pgn) {
            Framing::SingleFrame
        } else if SYSTEM_FAST_PACKET_PGNS.contains(&pgn) || self.fast_packet.contains(&pgn) {
            Framing::FastPacket
        } else {
            Framing::SingleFrame
        }
    }

    pub fn is_fast_packet(&self, pgn: u32) -> bool {
        self.framing(pgn) == Framing::FastPacket
    }

    /// Register an application single-frame PGN, removing it from the
    /// fast-packet list if it was there.
    pub fn add_single_frame(&mut self, pgn: u32) -> Result<(), ConfigError> {
        self.fast_packet.retain(|&p| p != pgn);
        add_unique(&mut self.single_frame, pgn)
    }

    /// Register an application fast-packet PGN, removing it from the
    /// single-frame list if it was there.
    pub fn add_fast_packet(&mut self, pgn: u32) -> Result<(), ConfigError> {
        self.single_frame.retain(|&p| p != pgn);
        add_unique(&mut self.fast_packet, pgn)
    }

    /// Application PGNs known to the table, single frame then fast packet.
    pub fn application_pgns(&self) -> impl Iterator<Item = u32> + '_ {
        self.single_frame.iter().chain(self.fast_packet.iter()).copied()
    }
}

fn add_unique(list: &mut Vec<u32, MAX_APPLICATION_PGNS>, pgn: u32) -> Result<(), ConfigError> {
    if list.contains(&pgn) {
        return Ok(());
    }
    list.push(pgn).map_err(|_| ConfigError::CapacityExceeded {
        capacity: MAX_APPLICATION_PGNS,
    })
}
