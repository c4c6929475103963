//! Default handlers of the PGNs the node answers group functions for.
use super::{
    interval_error, GroupFunctionAcknowledgement, GroupFunctionCommand, GroupFunctionReply,
    GroupFunctionRequest, NodeAction, NodeView, INTERVAL_UNCHANGED, OFFSET_UNCHANGED,
    PRIORITY_UNCHANGED,
};
use crate::error::BitReaderError;
use crate::infra::codec::bits::BitReader;
use crate::protocol::lookups::{
    ParameterErrorCode, PgnErrorCode, PgnListKind, TransmissionOrPriorityErrorCode,
};
use crate::protocol::messages::configuration_information::{
    ConfigurationInformation, ConfigurationText,
};
use crate::protocol::messages::product_information::{ProductText, PRODUCT_TEXT_LEN};
use crate::protocol::messages::{
    PGN_CONFIGURATION_INFORMATION, PGN_HEARTBEAT, PGN_ISO_ADDRESS_CLAIM, PGN_PGN_LIST,
    PGN_PRODUCT_INFORMATION,
};

/// Heartbeat intervals a request may set.
const HEARTBEAT_REQUEST_RANGE: core::ops::RangeInclusive<u32> = 1000..=60_000;

/// Comparison of one request field against the node's value.
enum FieldMatch {
    Equal,
    Different,
    /// Field number not defined for the PGN; its length is unknown.
    Unknown,
}

fn masked<T>(value: T, current: T, mask: T) -> FieldMatch
where
    T: core::ops::BitAnd<Output = T> + PartialEq + Copy,
{
    if value & mask == current {
        FieldMatch::Equal
    } else {
        FieldMatch::Different
    }
}

fn same_text(value: &str, current: &str) -> FieldMatch {
    if value == current {
        FieldMatch::Equal
    } else {
        FieldMatch::Different
    }
}

/// Walk the `(field, value)` pairs of a request, recording one code per
/// pair in `ack`. Returns whether every field matched.
///
/// After an unknown field the remaining values cannot be located, so every
/// later pair is reported as temporarily unable to comply. A broadcast
/// stops at the first mismatch since it will not be acknowledged.
fn filter_fields(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    ack: &mut GroupFunctionAcknowledgement,
    mut check: impl FnMut(u8, &mut BitReader<'_>) -> Result<FieldMatch, BitReaderError>,
) -> bool {
    let mut reader = request.pairs();
    let mut matched = true;
    let mut lost = false;
    for _ in 0..request.pair_count {
        if !matched && broadcast {
            break;
        }
        let code = if lost {
            ParameterErrorCode::TemporarilyUnableToComply
        } else {
            match reader.read_u8().and_then(|field| check(field, &mut reader)) {
                Ok(FieldMatch::Equal) => ParameterErrorCode::Acknowledge,
                Ok(FieldMatch::Different) => {
                    matched = false;
                    ParameterErrorCode::ParameterOutOfRange
                }
                Ok(FieldMatch::Unknown) | Err(_) => {
                    matched = false;
                    lost = true;
                    ParameterErrorCode::InvalidParameterField
                }
            }
        };
        ack.push(code);
    }
    matched
}

/// Request acknowledgement skeleton: the PGN is always acknowledged, the
/// interval outcome depends on the handler.
fn request_ack(
    request: &GroupFunctionRequest<'_>,
    transmission_error: TransmissionOrPriorityErrorCode,
) -> GroupFunctionAcknowledgement {
    GroupFunctionAcknowledgement::new(request.pgn, PgnErrorCode::Acknowledge, transmission_error)
}

/// Acknowledge a filtered request when it is addressed to us and either a
/// field or the interval was refused.
fn finish_request(
    reply: &mut GroupFunctionReply,
    ack: GroupFunctionAcknowledgement,
    matched: bool,
    broadcast: bool,
) {
    let refused =
        !matched || ack.transmission_error != TransmissionOrPriorityErrorCode::Acknowledge;
    if refused && !broadcast {
        reply.acknowledgement = Some(ack);
    }
}

fn priority_error(priority: u8) -> TransmissionOrPriorityErrorCode {
    if priority == PRIORITY_UNCHANGED {
        TransmissionOrPriorityErrorCode::Acknowledge
    } else {
        TransmissionOrPriorityErrorCode::IntervalOrPriorityNotSupported
    }
}

//==================================================================================DISPATCH
pub(super) fn request(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    node: &NodeView<'_>,
    reply: &mut GroupFunctionReply,
) {
    match request.pgn {
        PGN_ISO_ADDRESS_CLAIM => address_claim_request(request, broadcast, node, reply),
        PGN_PGN_LIST => pgn_list_request(request, broadcast, reply),
        PGN_HEARTBEAT => heartbeat_request(request, broadcast, reply),
        PGN_PRODUCT_INFORMATION => product_request(request, broadcast, node, reply),
        PGN_CONFIGURATION_INFORMATION => match node.configuration {
            Some(configuration) => configuration_request(request, broadcast, configuration, reply),
            None => not_supported(request.pgn, request.pair_count, broadcast, reply),
        },
        pgn => not_supported(pgn, request.pair_count, broadcast, reply),
    }
}

pub(super) fn command(
    command: &GroupFunctionCommand<'_>,
    broadcast: bool,
    node: &NodeView<'_>,
    reply: &mut GroupFunctionReply,
) {
    match command.pgn {
        PGN_ISO_ADDRESS_CLAIM => address_claim_command(command, reply),
        PGN_CONFIGURATION_INFORMATION if node.configuration.is_some() => {
            configuration_command(command, reply)
        }
        pgn => not_supported(pgn, command.pair_count, broadcast, reply),
    }
}

/// PGNs without a handler.
fn not_supported(pgn: u32, pair_count: u8, broadcast: bool, reply: &mut GroupFunctionReply) {
    refuse(pgn, PgnErrorCode::PgnNotSupported, pair_count, broadcast, reply);
}

fn refuse(
    pgn: u32,
    pgn_error: PgnErrorCode,
    pair_count: u8,
    broadcast: bool,
    reply: &mut GroupFunctionReply,
) {
    if broadcast {
        return;
    }
    debug!("group function for {} refused: {:?}", pgn, pgn_error);
    reply.acknowledgement = Some(
        GroupFunctionAcknowledgement::new(
            pgn,
            pgn_error,
            TransmissionOrPriorityErrorCode::IntervalOrPriorityNotSupported,
        )
        .with_parameters(pair_count, ParameterErrorCode::RequestOrCommandNotSupported),
    );
}

//==================================================================================ADDRESS_CLAIM
const FIELD_UNIQUE_NUMBER: u8 = 1;
const FIELD_MANUFACTURER_CODE: u8 = 2;
const FIELD_DEVICE_INSTANCE_LOWER: u8 = 3;
const FIELD_DEVICE_INSTANCE_UPPER: u8 = 4;
const FIELD_DEVICE_FUNCTION: u8 = 5;
const FIELD_NAME_RESERVED: u8 = 6;
const FIELD_DEVICE_CLASS: u8 = 7;
const FIELD_SYSTEM_INSTANCE: u8 = 8;
const FIELD_INDUSTRY_GROUP: u8 = 9;
const FIELD_SELF_CONFIGURABLE: u8 = 10;

/// Request 60928: answer with our claim if every NAME field matches.
fn address_claim_request(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    node: &NodeView<'_>,
    reply: &mut GroupFunctionReply,
) {
    let name = node.name;
    let mut ack = request_ack(request, interval_error(request.interval_ms));
    let matched = filter_fields(request, broadcast, &mut ack, |field, values| {
        Ok(match field {
            FIELD_UNIQUE_NUMBER => masked(values.read_u32()?, name.unique_number(), 0x1F_FFFF),
            FIELD_MANUFACTURER_CODE => masked(values.read_u16()?, name.manufacturer_code(), 0x7FF),
            FIELD_DEVICE_INSTANCE_LOWER => {
                masked(values.read_u8()?, name.device_instance_lower(), 0x07)
            }
            FIELD_DEVICE_INSTANCE_UPPER => {
                masked(values.read_u8()?, name.device_instance_upper(), 0x1F)
            }
            FIELD_DEVICE_FUNCTION => masked(values.read_u8()?, name.device_function(), 0xFF),
            FIELD_DEVICE_CLASS => masked(values.read_u8()?, name.device_class(), 0x7F),
            FIELD_SYSTEM_INSTANCE => masked(values.read_u8()?, name.system_instance(), 0x0F),
            FIELD_INDUSTRY_GROUP => masked(values.read_u8()?, name.industry_group(), 0x07),
            FIELD_NAME_RESERVED | FIELD_SELF_CONFIGURABLE => {
                values.skip_bytes(1)?;
                FieldMatch::Equal
            }
            _ => FieldMatch::Unknown,
        })
    });
    finish_request(reply, ack, matched, broadcast);
    if matched {
        reply.act(NodeAction::SendAddressClaim);
    }
}

/// Command 60928: only the instance fields are writable. Always
/// acknowledged.
fn address_claim_command(command: &GroupFunctionCommand<'_>, reply: &mut GroupFunctionReply) {
    let mut ack = GroupFunctionAcknowledgement::new(
        command.pgn,
        PgnErrorCode::Acknowledge,
        priority_error(command.priority),
    );
    let (mut lower, mut upper, mut system) = (0xFF, 0xFF, 0xFF);
    let mut values = command.pairs();
    let mut lost = false;
    for _ in 0..command.pair_count {
        if lost {
            ack.push(ParameterErrorCode::TemporarilyUnableToComply);
            continue;
        }
        let written = values.read_u8().and_then(|field| {
            let (target, mask) = match field {
                FIELD_DEVICE_INSTANCE_LOWER => (&mut lower, 0x07),
                FIELD_DEVICE_INSTANCE_UPPER => (&mut upper, 0x1F),
                FIELD_SYSTEM_INSTANCE => (&mut system, 0x0F),
                _ => return Ok(false),
            };
            *target = values.read_u8()? & mask;
            Ok(true)
        });
        match written {
            Ok(true) => ack.push(ParameterErrorCode::Acknowledge),
            Ok(false) | Err(_) => {
                lost = true;
                ack.push(ParameterErrorCode::InvalidParameterField);
            }
        }
    }

    reply.acknowledgement = Some(ack);
    if (lower, upper, system) != (0xFF, 0xFF, 0xFF) {
        reply.act(NodeAction::SetDeviceInstances {
            lower,
            upper,
            system,
        });
    }
}

//==================================================================================PGN_LIST
/// Request 126464: field 1 picks the transmit or the receive list, both
/// lists are sent when it is absent.
fn pgn_list_request(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    reply: &mut GroupFunctionReply,
) {
    let mut selected: Option<PgnListKind> = None;
    let mut ack = request_ack(request, interval_error(request.interval_ms));
    let matched = filter_fields(request, broadcast, &mut ack, |field, values| {
        Ok(match field {
            1 => match PgnListKind::try_from(values.read_u8()?) {
                Ok(kind) => {
                    selected = Some(kind);
                    FieldMatch::Equal
                }
                Err(_) => FieldMatch::Different,
            },
            _ => FieldMatch::Unknown,
        })
    });
    finish_request(reply, ack, matched, broadcast);
    if !matched {
        return;
    }
    let destination = reply.requester;
    for kind in [PgnListKind::Transmit, PgnListKind::Receive] {
        if selected.is_none() || selected == Some(kind) {
            reply.act(NodeAction::SendPgnList { kind, destination });
        }
    }
}

//==================================================================================HEARTBEAT
/// Request 126993: the transmission interval of the request sets the
/// heartbeat interval. No parameter pairs are defined for this PGN.
fn heartbeat_request(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    reply: &mut GroupFunctionReply,
) {
    if request.pair_count > 0 {
        if !broadcast {
            reply.acknowledgement = Some(
                request_ack(
                    request,
                    TransmissionOrPriorityErrorCode::IntervalOrPriorityNotSupported,
                )
                .with_parameters(
                    request.pair_count,
                    ParameterErrorCode::RequestOrCommandNotSupported,
                ),
            );
        }
        return;
    }

    if request.interval_ms == INTERVAL_UNCHANGED && request.interval_offset == OFFSET_UNCHANGED {
        // Nothing to change.
        refuse(
            request.pgn,
            PgnErrorCode::RequestOrCommandNotSupported,
            0,
            broadcast,
            reply,
        );
        return;
    }

    let transmission_error = if HEARTBEAT_REQUEST_RANGE.contains(&request.interval_ms) {
        TransmissionOrPriorityErrorCode::Acknowledge
    } else {
        interval_error(request.interval_ms)
    };
    if transmission_error == TransmissionOrPriorityErrorCode::Acknowledge {
        reply.act(NodeAction::SetHeartbeatInterval(request.interval_ms));
        reply.act(NodeAction::SendHeartbeat);
    } else if !broadcast {
        reply.acknowledgement = Some(request_ack(request, transmission_error));
    }
}

//==================================================================================PRODUCT_INFORMATION
/// Request 126996: fields 1 to 8 follow the product information layout.
fn product_request(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    node: &NodeView<'_>,
    reply: &mut GroupFunctionReply,
) {
    let product = node.product;
    let mut ack = request_ack(request, interval_error(request.interval_ms));
    let matched = filter_fields(request, broadcast, &mut ack, |field, values| {
        Ok(match field {
            1 => masked(values.read_u16()?, product.n2k_version, 0xFFFF),
            2 => masked(values.read_u16()?, product.product_code, 0xFFFF),
            3 => fixed_text(values, &product.model_id)?,
            4 => fixed_text(values, &product.software_code)?,
            5 => fixed_text(values, &product.model_version)?,
            6 => fixed_text(values, &product.serial_code)?,
            7 => masked(values.read_u8()?, product.certification_level, 0xFF),
            8 => masked(values.read_u8()?, product.load_equivalency, 0xFF),
            _ => FieldMatch::Unknown,
        })
    });
    finish_request(reply, ack, matched, broadcast);
    if matched {
        reply.act(NodeAction::SendProductInformation);
    }
}

fn fixed_text(values: &mut BitReader<'_>, current: &str) -> Result<FieldMatch, BitReaderError> {
    let value: ProductText = values.read_fixed_text(PRODUCT_TEXT_LEN)?;
    Ok(same_text(&value, current))
}

//==================================================================================CONFIGURATION_INFORMATION
const FIELD_INSTALLATION_DESCRIPTION1: u8 = 1;
const FIELD_INSTALLATION_DESCRIPTION2: u8 = 2;
const FIELD_MANUFACTURER_INFORMATION: u8 = 3;

/// Request 126998: fields 1 to 3 are the three texts.
fn configuration_request(
    request: &GroupFunctionRequest<'_>,
    broadcast: bool,
    configuration: &ConfigurationInformation,
    reply: &mut GroupFunctionReply,
) {
    let mut ack = request_ack(request, interval_error(request.interval_ms));
    let matched = filter_fields(request, broadcast, &mut ack, |field, values| {
        let current = match field {
            FIELD_INSTALLATION_DESCRIPTION1 => &configuration.installation_description1,
            FIELD_INSTALLATION_DESCRIPTION2 => &configuration.installation_description2,
            FIELD_MANUFACTURER_INFORMATION => &configuration.manufacturer_information,
            _ => return Ok(FieldMatch::Unknown),
        };
        let value: ConfigurationText = values.read_var_text()?;
        Ok(same_text(&value, current))
    });
    finish_request(reply, ack, matched, broadcast);
    if matched {
        reply.act(NodeAction::SendConfigurationInformation);
    }
}

/// Command 126998: the installation descriptions are writable, the
/// manufacturer information is not.
fn configuration_command(command: &GroupFunctionCommand<'_>, reply: &mut GroupFunctionReply) {
    let mut ack = GroupFunctionAcknowledgement::new(
        command.pgn,
        PgnErrorCode::Acknowledge,
        priority_error(command.priority),
    );
    let mut values = command.pairs();
    let mut lost = false;
    for _ in 0..command.pair_count {
        if lost {
            ack.push(ParameterErrorCode::TemporarilyUnableToComply);
            continue;
        }
        let action = values.read_u8().and_then(|field| {
            Ok(match field {
                FIELD_INSTALLATION_DESCRIPTION1 => {
                    Some(NodeAction::SetInstallationDescription1(values.read_var_text()?))
                }
                FIELD_INSTALLATION_DESCRIPTION2 => {
                    Some(NodeAction::SetInstallationDescription2(values.read_var_text()?))
                }
                _ => None,
            })
        });
        match action {
            Ok(Some(action)) => {
                reply.act(action);
                ack.push(ParameterErrorCode::Acknowledge);
            }
            Ok(None) | Err(_) => {
                lost = true;
                ack.push(ParameterErrorCode::InvalidParameterField);
            }
        }
    }
    reply.acknowledgement = Some(ack);
}
