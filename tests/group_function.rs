mod helpers;

use helpers::{settle, MockCanBus, MockClock, TestNode};
use n2k_node::infra::codec::traits::PgnData;
use n2k_node::protocol::lookups::{NodeMode, ParameterErrorCode, PgnErrorCode};
use n2k_node::protocol::managment::group_function::GroupFunctionAcknowledgement;
use n2k_node::protocol::managment::iso_name::IsoName;
use n2k_node::protocol::managment::network_manager::{NetworkManager, NodeConfig};
use n2k_node::protocol::messages::{N2kMessage, PGN_GROUP_FUNCTION, PGN_ISO_ADDRESS_CLAIM};

const DEVICE: u8 = 30;
const HOST: u8 = 40;

fn device_name() -> IsoName {
    IsoName::builder()
        .unique_number(1234)
        .manufacturer_code(2046)
        .device_function(130)
        .device_class(25)
        .industry_group(4)
        .build()
}

/// A claimed device and a send-only host that sees every message.
fn setup(clock: &MockClock) -> (TestNode, TestNode) {
    let (device_bus, host_bus) = MockCanBus::create_pair();
    let device_config = NodeConfig::builder(device_name())
        .preferred_address(DEVICE)
        .mode(NodeMode::ListenAndNode)
        .build()
        .unwrap();
    let host_config = NodeConfig::builder(IsoName::from_raw(1))
        .preferred_address(HOST)
        .mode(NodeMode::ListenAndSend)
        .build()
        .unwrap();
    let mut device = NetworkManager::new(device_bus, clock.clone(), device_config);
    let mut host = NetworkManager::new(host_bus, clock.clone(), host_config);

    settle(&mut [&mut device, &mut host]);
    clock.advance_ms(250);
    settle(&mut [&mut device, &mut host]);
    (device, host)
}

/// Request for the address claim with four NAME filter pairs.
fn claim_request(unique_number: u32) -> N2kMessage {
    let mut payload = vec![0x00, 0x00, 0xEE, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 4];
    payload.push(1);
    payload.extend_from_slice(&unique_number.to_le_bytes());
    payload.push(2);
    payload.extend_from_slice(&2046u16.to_le_bytes());
    payload.extend_from_slice(&[42, 0]);
    payload.extend_from_slice(&[3, 2]);
    N2kMessage::from_payload(PGN_GROUP_FUNCTION, &payload)
        .unwrap()
        .to_destination(DEVICE)
}

fn acknowledgements(messages: &[N2kMessage]) -> Vec<GroupFunctionAcknowledgement> {
    messages
        .iter()
        .filter(|m| m.pgn == PGN_GROUP_FUNCTION && m.source == DEVICE)
        .map(|m| GroupFunctionAcknowledgement::from_payload(m.payload()).unwrap())
        .collect()
}

#[test]
/// Fields [valid, valid, unknown, valid] are acknowledged as [ack, ack,
/// invalid field, temporarily unable to comply] and nothing else happens.
fn test_degrade_policy_over_the_bus() {
    let clock = MockClock::new();
    let (mut device, mut host) = setup(&clock);

    host.send(claim_request(1234)).unwrap();
    let delivered = settle(&mut [&mut device, &mut host]);

    let acks = acknowledgements(&delivered[1]);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].pgn, PGN_ISO_ADDRESS_CLAIM);
    assert_eq!(acks[0].pgn_error, PgnErrorCode::Acknowledge);
    assert_eq!(
        acks[0].parameters.as_slice(),
        &[
            ParameterErrorCode::Acknowledge,
            ParameterErrorCode::Acknowledge,
            ParameterErrorCode::InvalidParameterField,
            ParameterErrorCode::TemporarilyUnableToComply,
        ]
    );
    let reply = delivered[1].iter().find(|m| m.pgn == PGN_GROUP_FUNCTION).unwrap();
    assert_eq!(reply.destination, HOST);
    assert_eq!(reply.payload(), &[2, 0x00, 0xEE, 0x00, 0x00, 4, 0x00, 0x21]);
    assert!(
        !delivered[1].iter().any(|m| m.pgn == PGN_ISO_ADDRESS_CLAIM),
        "No claim on a failed filter"
    );
}

#[test]
/// Commanding new device instances renames the device, which claims again.
fn test_command_device_instances() {
    let clock = MockClock::new();
    let (mut device, mut host) = setup(&clock);

    // Command 60928 at priority "unchanged", one pair: field 3 (lower
    // instance) = 5.
    let command = N2kMessage::from_payload(
        PGN_GROUP_FUNCTION,
        &[1, 0x00, 0xEE, 0x00, 0x08, 1, 3, 5],
    )
    .unwrap()
    .to_destination(DEVICE);
    host.send(command).unwrap();
    let delivered = settle(&mut [&mut device, &mut host]);

    let acks = acknowledgements(&delivered[1]);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].parameters.as_slice(), &[ParameterErrorCode::Acknowledge]);

    assert_eq!(device.name().device_instance_lower(), 5);
    assert!(device.read_reset_device_information_changed());
    let claim = delivered[1]
        .iter()
        .find(|m| m.pgn == PGN_ISO_ADDRESS_CLAIM)
        .expect("new claim");
    assert_eq!(IsoName::from_le_bytes(claim.payload().try_into().unwrap()), device.name());
}

#[test]
/// Unknown PGNs are refused to the requester.
fn test_unsupported_pgn() {
    let clock = MockClock::new();
    let (mut device, mut host) = setup(&clock);

    let request = N2kMessage::from_payload(
        PGN_GROUP_FUNCTION,
        &[0, 0x01, 0xF8, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0],
    )
    .unwrap()
    .to_destination(DEVICE);
    host.send(request).unwrap();
    let delivered = settle(&mut [&mut device, &mut host]);

    let acks = acknowledgements(&delivered[1]);
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].pgn, 129025);
    assert_eq!(acks[0].pgn_error, PgnErrorCode::PgnNotSupported);
}
