//! Group function protocol (PGN 126208): request, command and acknowledge
//! exchanges that read or set fields of another PGN by field number.
//!
//! ```text
//! byte 0     function code (request, command, acknowledge, read, ...)
//! byte 1..4  PGN the function applies to (3 bytes LE)
//! request:     interval u32 | offset u16 | pair count | (field, value)...
//! command:     priority u8  | pair count | (field, value)...
//! acknowledge: pgn error | tp error << 4 | pair count | 4-bit codes...
//! ```
//!
//! Nothing here touches the bus. [`respond`] turns an incoming group
//! function into a [`GroupFunctionReply`]: the acknowledgement to send back,
//! if any, and the [`NodeAction`]s the node must carry out afterwards.
use crate::error::{BitWriterError, DecodeError};
use crate::infra::codec::bits::{BitReader, BitWriter};
use crate::infra::codec::traits::PgnData;
use crate::protocol::lookups::{
    GroupFunctionCode, ParameterErrorCode, PgnErrorCode, PgnListKind,
    TransmissionOrPriorityErrorCode,
};
use crate::protocol::managment::iso_name::IsoName;
use crate::protocol::messages::configuration_information::{
    ConfigurationInformation, ConfigurationText,
};
use crate::protocol::messages::product_information::ProductInformation;
use crate::protocol::messages::{N2kMessage, PGN_GROUP_FUNCTION};
use heapless::Vec;

mod handlers;

/// A pair count is one byte.
pub const MAX_PARAMETER_PAIRS: usize = u8::MAX as usize;
/// Most actions a single group function can trigger.
pub const MAX_NODE_ACTIONS: usize = 4;

/// Transmission interval meaning "leave the interval unchanged".
pub const INTERVAL_UNCHANGED: u32 = 0xFFFF_FFFF;
/// Transmission interval meaning "restore the default interval".
pub const INTERVAL_RESTORE_DEFAULT: u32 = 0xFFFF_FFFE;
/// Offset meaning "leave the offset unchanged".
pub const OFFSET_UNCHANGED: u16 = 0xFFFF;
/// Command priority setting meaning "leave the priority unchanged".
pub const PRIORITY_UNCHANGED: u8 = 0x08;

const REQUEST_PAIRS_OFFSET: usize = 11;
const COMMAND_PAIRS_OFFSET: usize = 6;

//==================================================================================PARSED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Request: send the PGN now, optionally only if the given fields match.
pub struct GroupFunctionRequest<'a> {
    pub pgn: u32,
    pub interval_ms: u32,
    pub interval_offset: u16,
    pub pair_count: u8,
    pairs: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Command: write the given fields.
pub struct GroupFunctionCommand<'a> {
    pub pgn: u32,
    pub priority: u8,
    pub pair_count: u8,
    pairs: &'a [u8],
}

impl GroupFunctionRequest<'_> {
    /// Cursor over the `(field, value)` pairs.
    pub fn pairs(&self) -> BitReader<'_> {
        BitReader::new(self.pairs)
    }
}

impl GroupFunctionCommand<'_> {
    pub fn pairs(&self) -> BitReader<'_> {
        BitReader::new(self.pairs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A decoded PGN 126208 payload.
pub enum GroupFunction<'a> {
    Request(GroupFunctionRequest<'a>),
    Command(GroupFunctionCommand<'a>),
    Acknowledge(GroupFunctionAcknowledgement),
    Read { pgn: u32, pair_count: u8 },
    ReadReply { pgn: u32 },
    Write { pgn: u32, pair_count: u8 },
    WriteReply { pgn: u32 },
}

impl<'a> GroupFunction<'a> {
    /// Decode the function code, the target PGN and the fixed parameters.
    pub fn parse(payload: &'a [u8]) -> Result<Self, DecodeError> {
        let mut reader = BitReader::new(payload);
        let code = GroupFunctionCode::try_from(reader.read_u8()?)
            .map_err(|_| DecodeError::InvalidValue)?;
        let pgn = reader.read_u24()?;
        Ok(match code {
            GroupFunctionCode::Request => {
                let interval_ms = reader.read_u32()?;
                let interval_offset = reader.read_u16()?;
                let pair_count = reader.read_u8()?;
                Self::Request(GroupFunctionRequest {
                    pgn,
                    interval_ms,
                    interval_offset,
                    pair_count,
                    pairs: &payload[REQUEST_PAIRS_OFFSET..],
                })
            }
            GroupFunctionCode::Command => {
                let priority = reader.read_u8()? & 0x0F;
                let pair_count = reader.read_u8()?;
                Self::Command(GroupFunctionCommand {
                    pgn,
                    priority,
                    pair_count,
                    pairs: &payload[COMMAND_PAIRS_OFFSET..],
                })
            }
            GroupFunctionCode::Acknowledge => {
                Self::Acknowledge(GroupFunctionAcknowledgement::from_payload(payload)?)
            }
            GroupFunctionCode::Read => Self::Read {
                pgn,
                pair_count: read_write_pair_count(pgn, payload)?,
            },
            GroupFunctionCode::Write => Self::Write {
                pgn,
                pair_count: read_write_pair_count(pgn, payload)?,
            },
            GroupFunctionCode::ReadReply => Self::ReadReply { pgn },
            GroupFunctionCode::WriteReply => Self::WriteReply { pgn },
        })
    }

    /// PGN the function applies to.
    pub fn pgn(&self) -> u32 {
        match self {
            Self::Request(request) => request.pgn,
            Self::Command(command) => command.pgn,
            Self::Acknowledge(ack) => ack.pgn,
            Self::Read { pgn, .. }
            | Self::ReadReply { pgn }
            | Self::Write { pgn, .. }
            | Self::WriteReply { pgn } => *pgn,
        }
    }
}

/// Proprietary PGNs carry manufacturer code and industry group before the
/// unique id of a read or write.
fn read_write_pair_count(pgn: u32, payload: &[u8]) -> Result<u8, DecodeError> {
    let offset = if is_proprietary(pgn) { 9 } else { 6 };
    let mut reader = BitReader::at_offset(payload, offset)?;
    Ok(reader.read_u8()?)
}

fn is_proprietary(pgn: u32) -> bool {
    pgn == 0xEF00 || (0xFF00..=0xFFFF).contains(&pgn) || pgn == 0x1EF00 || pgn >= 0x1FF00
}

//==================================================================================ACKNOWLEDGEMENT
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Group function acknowledgement, always sent at priority 7 to the
/// requester.
pub struct GroupFunctionAcknowledgement {
    pub pgn: u32,
    pub pgn_error: PgnErrorCode,
    pub transmission_error: TransmissionOrPriorityErrorCode,
    /// One code per parameter pair, in request order.
    pub parameters: Vec<ParameterErrorCode, MAX_PARAMETER_PAIRS>,
}

impl GroupFunctionAcknowledgement {
    pub fn new(
        pgn: u32,
        pgn_error: PgnErrorCode,
        transmission_error: TransmissionOrPriorityErrorCode,
    ) -> Self {
        Self {
            pgn,
            pgn_error,
            transmission_error,
            parameters: Vec::new(),
        }
    }

    /// Append the code of the next parameter pair.
    pub fn push(&mut self, code: ParameterErrorCode) {
        // Capacity matches the largest pair count a message can declare.
        let _ = self.parameters.push(code);
    }

    /// Same code for `count` pairs.
    pub fn with_parameters(mut self, count: u8, code: ParameterErrorCode) -> Self {
        for _ in 0..count {
            self.push(code);
        }
        self
    }

    /// Addressed message for `requester`.
    pub fn to_reply(&self, requester: u8) -> Result<N2kMessage, BitWriterError> {
        Ok(self.to_message()?.to_destination(requester))
    }
}

impl PgnData for GroupFunctionAcknowledgement {
    const PGN: u32 = PGN_GROUP_FUNCTION;
    const PRIORITY: u8 = 7;

    fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = BitReader::new(payload);
        if reader.read_u8()? != GroupFunctionCode::Acknowledge as u8 {
            return Err(DecodeError::InvalidValue);
        }
        let pgn = reader.read_u24()?;
        let errors = reader.read_u8()?;
        let pgn_error =
            PgnErrorCode::try_from(errors & 0x0F).map_err(|_| DecodeError::InvalidValue)?;
        let transmission_error = TransmissionOrPriorityErrorCode::try_from(errors >> 4)
            .map_err(|_| DecodeError::InvalidValue)?;
        let count = reader.read_u8()?;
        let mut ack = Self::new(pgn, pgn_error, transmission_error);
        for _ in 0..count {
            let nibble = reader.read_bits(4)? as u8;
            ack.push(ParameterErrorCode::try_from(nibble).map_err(|_| DecodeError::InvalidValue)?);
        }
        Ok(ack)
    }

    fn to_payload(&self, buffer: &mut [u8]) -> Result<usize, BitWriterError> {
        let mut writer = BitWriter::new(buffer);
        writer.write_u8(GroupFunctionCode::Acknowledge as u8)?;
        writer.write_u24(self.pgn)?;
        writer.write_u8(self.pgn_error as u8 | (self.transmission_error as u8) << 4)?;
        writer.write_u8(self.parameters.len() as u8)?;
        for code in &self.parameters {
            writer.write_bits(*code as u64, 4)?;
        }
        // Odd count: the unused upper nibble reads as "not available".
        if self.parameters.len() % 2 == 1 {
            writer.write_bits(0x0F, 4)?;
        }
        Ok(writer.byte_len())
    }
}

//==================================================================================REPLY
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Work a group function asks the node to do.
pub enum NodeAction {
    /// Broadcast our address claim.
    SendAddressClaim,
    /// Send a PGN list to `destination`.
    SendPgnList { kind: PgnListKind, destination: u8 },
    SendProductInformation,
    SendConfigurationInformation,
    SendHeartbeat,
    /// Apply a heartbeat interval (special values included).
    SetHeartbeatInterval(u32),
    /// New instance fields; `0xFF` leaves a field unchanged.
    SetDeviceInstances { lower: u8, upper: u8, system: u8 },
    SetInstallationDescription1(ConfigurationText),
    SetInstallationDescription2(ConfigurationText),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of a group function: acknowledgement first, then the actions.
pub struct GroupFunctionReply {
    /// Node that sent the group function.
    pub requester: u8,
    pub acknowledgement: Option<GroupFunctionAcknowledgement>,
    pub actions: Vec<NodeAction, MAX_NODE_ACTIONS>,
}

impl GroupFunctionReply {
    fn new(requester: u8) -> Self {
        Self {
            requester,
            acknowledgement: None,
            actions: Vec::new(),
        }
    }

    fn act(&mut self, action: NodeAction) {
        // No handler queues more than MAX_NODE_ACTIONS.
        let _ = self.actions.push(action);
    }

    pub fn is_empty(&self) -> bool {
        self.acknowledgement.is_none() && self.actions.is_empty()
    }
}

/// What the default handlers can see of the node.
#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    pub name: IsoName,
    pub product: &'a ProductInformation,
    pub configuration: Option<&'a ConfigurationInformation>,
}

//==================================================================================RESPOND
/// Answer a group function received by the node.
///
/// The caller only passes messages that are broadcast or addressed to the
/// node. Broadcasts that do not match or are not supported stay silent.
/// Returns `None` when the message is not a valid group function or needs no
/// answer.
pub fn respond(message: &N2kMessage, node: &NodeView<'_>) -> Option<GroupFunctionReply> {
    let function = match GroupFunction::parse(message.payload()) {
        Ok(function) => function,
        Err(err) => {
            debug!("malformed group function from {}: {:?}", message.source, err);
            return None;
        }
    };
    let broadcast = message.is_broadcast();
    let mut reply = GroupFunctionReply::new(message.source);

    match function {
        GroupFunction::Request(request) => handlers::request(&request, broadcast, node, &mut reply),
        GroupFunction::Command(command) => handlers::command(&command, broadcast, node, &mut reply),
        GroupFunction::Read { pgn, pair_count } | GroupFunction::Write { pgn, pair_count } => {
            if !broadcast {
                reply.acknowledgement = Some(
                    GroupFunctionAcknowledgement::new(
                        pgn,
                        PgnErrorCode::ReadOrWriteNotSupported,
                        TransmissionOrPriorityErrorCode::IntervalOrPriorityNotSupported,
                    )
                    .with_parameters(pair_count, ParameterErrorCode::ReadOrWriteNotSupported),
                );
            }
        }
        GroupFunction::Acknowledge(ack) => {
            debug!(
                "group function ack from {} for {}: {:?}",
                message.source,
                ack.pgn,
                ack.pgn_error
            );
        }
        GroupFunction::ReadReply { .. } | GroupFunction::WriteReply { .. } => {}
    }

    if reply.is_empty() {
        None
    } else {
        Some(reply)
    }
}

/// Transmission/priority outcome for a request interval the handler cannot
/// change.
pub fn interval_error(interval_ms: u32) -> TransmissionOrPriorityErrorCode {
    match interval_ms {
        INTERVAL_UNCHANGED | INTERVAL_RESTORE_DEFAULT => TransmissionOrPriorityErrorCode::Acknowledge,
        _ => TransmissionOrPriorityErrorCode::IntervalOrPriorityNotSupported,
    }
}
