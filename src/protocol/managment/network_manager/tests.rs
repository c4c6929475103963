//! Node behaviour against an in-memory bus: claim gating, send rules,
//! system message responders, timers.
use super::*;
use crate::protocol::lookups::NodeMode;
use crate::protocol::managment::network_discovering::DeviceDiscoveryService;
use crate::protocol::transport::can_frame::CanFrame;
use crate::protocol::transport::fast_packet::classification::PgnClassification;
use crate::protocol::transport::fast_packet::sequence_id;
use core::cell::Cell;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use heapless::{Deque, Vec};

const US: u8 = 30;
const PEER: u8 = 50;

#[derive(Default)]
struct TestBus {
    inbox: Deque<CanFrame, 64>,
    sent: Vec<CanFrame, 128>,
    opened: u8,
}

impl CanBus for TestBus {
    type Error = ();

    fn open(&mut self) -> Result<(), Self::Error> {
        self.opened += 1;
        Ok(())
    }

    fn send_frame(&mut self, frame: &CanFrame, _wait_sent: bool) -> Result<(), Self::Error> {
        self.sent.push(frame.clone()).map_err(|_| ())
    }

    fn recv_frame(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        Ok(self.inbox.pop_front())
    }
}

struct TestClock(Cell<Instant>);

impl TestClock {
    fn new() -> Self {
        Self(Cell::new(Instant::from_millis(0)))
    }

    fn set(&self, ms: u64) {
        self.0.set(Instant::from_millis(ms));
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.0.get()
    }
}

type TestNode<'a, O = ()> = NetworkManager<TestBus, &'a TestClock, O>;

fn config(mode: NodeMode) -> NodeConfig {
    NodeConfig::builder(IsoName::from_raw(100))
        .preferred_address(US)
        .mode(mode)
        .build()
        .unwrap()
}

/// Frames of `message` pushed into the node's receive queue.
fn inject<O: MessageObserver>(node: &mut TestNode<'_, O>, message: &N2kMessage) {
    let framing = PgnClassification::default().framing(message.pgn);
    let frames = FastPacketBuilder::new(message.header(), message.payload(), framing)
        .build()
        .unwrap();
    for frame in frames {
        node.bus_mut().inbox.push_back(frame).unwrap();
    }
}

/// Poll until the receive queue is empty, keeping application messages.
fn poll_all<O: MessageObserver>(node: &mut TestNode<'_, O>) -> Vec<N2kMessage, 8> {
    let mut delivered = Vec::new();
    while !node.bus_mut().inbox.is_empty() {
        if let Some(message) = node.poll().unwrap() {
            delivered.push(message).unwrap();
        }
    }
    delivered
}

/// Messages the node put on the bus since the last call.
fn sent<O: MessageObserver>(node: &mut TestNode<'_, O>) -> Vec<N2kMessage, 16> {
    let frames = core::mem::take(&mut node.bus_mut().sent);
    let table = PgnClassification::default();
    let mut reassembler = FastPacketReassembler::<5>::new();
    let mut messages = Vec::new();
    for frame in &frames {
        if let Some(done) = reassembler.ingest(frame, &table, Instant::from_millis(0)) {
            messages.push(done.message).unwrap();
        }
    }
    messages
}

fn claimed_node(clock: &TestClock) -> TestNode<'_> {
    let mut node = NetworkManager::new(TestBus::default(), clock, config(NodeMode::ListenAndNode));
    node.open().unwrap();
    clock.set(250);
    node.poll().unwrap();
    sent(&mut node);
    node
}

fn iso_request(pgn: u32, destination: u8) -> N2kMessage {
    IsoRequest::new(pgn)
        .to_message()
        .unwrap()
        .from_source(PEER)
        .to_destination(destination)
}

#[test]
/// Opening claims the preferred address once.
fn test_open_claims_address() {
    let clock = TestClock::new();
    let mut node = NetworkManager::new(TestBus::default(), &clock, config(NodeMode::ListenAndNode));
    node.open().unwrap();
    node.open().unwrap();

    assert_eq!(node.bus_mut().opened, 1);
    let claims = sent(&mut node);
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].pgn, PGN_ISO_ADDRESS_CLAIM);
    assert_eq!(claims[0].source, US);
    assert_eq!(claims[0].payload(), &100u64.to_le_bytes());
    assert!(node.claim_state() != ClaimState::Claimed);
}

#[test]
/// Data waits for the claim timer; afterwards it leaves from our address.
fn test_send_gated_by_claim() {
    let clock = TestClock::new();
    let mut node = NetworkManager::new(TestBus::default(), &clock, config(NodeMode::ListenAndNode));
    let message = N2kMessage::from_payload(129025, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    assert!(matches!(node.send(message.clone()), Err(SendError::ClaimPending)));
    clock.set(250);
    node.send(message).unwrap();

    let out = sent(&mut node);
    assert_eq!(out.last().map(|m| (m.pgn, m.source)), Some((129025, US)));
}

#[test]
/// Listen-only nodes stay silent but still deliver traffic.
fn test_listen_only() {
    let clock = TestClock::new();
    let mut node = NetworkManager::new(TestBus::default(), &clock, config(NodeMode::ListenOnly));
    node.open().unwrap();
    assert!(sent(&mut node).is_empty());

    let message = N2kMessage::from_payload(129025, &[0; 8]).unwrap().from_source(PEER);
    assert!(matches!(node.send(message.clone()), Err(SendError::ListenOnly)));

    inject(&mut node, &message);
    inject(&mut node, &iso_request(PGN_PRODUCT_INFORMATION, BROADCAST_ADDRESS));
    assert_eq!(poll_all(&mut node).as_slice(), &[message]);
    assert!(sent(&mut node).is_empty());
}

#[test]
/// The handler sees application messages only; system requests are answered
/// by the node.
fn test_poll_with_handler() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);
    let position = N2kMessage::from_payload(129025, &[7; 8]).unwrap().from_source(PEER);
    inject(&mut node, &iso_request(PGN_PRODUCT_INFORMATION, US));
    inject(&mut node, &position);

    let mut handled: Vec<N2kMessage, 4> = Vec::new();
    while !node.bus_mut().inbox.is_empty() {
        node.poll_with(|message| handled.push(message.clone()).unwrap())
            .unwrap();
    }
    assert_eq!(handled.as_slice(), &[position]);
    let answers = sent(&mut node);
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].pgn, PGN_PRODUCT_INFORMATION);
}

#[test]
/// Send-only nodes transmit from their fixed address and hand system
/// messages to the application.
fn test_send_only() {
    let clock = TestClock::new();
    let mut node = NetworkManager::new(TestBus::default(), &clock, config(NodeMode::SendOnly));
    node.send(N2kMessage::from_payload(129025, &[0; 8]).unwrap()).unwrap();
    assert_eq!(sent(&mut node).iter().map(|m| m.source).collect::<Vec<u8, 4>>(), [US]);

    let request = iso_request(PGN_PRODUCT_INFORMATION, BROADCAST_ADDRESS);
    inject(&mut node, &request);
    assert_eq!(poll_all(&mut node).as_slice(), &[request]);
    assert!(sent(&mut node).is_empty());

    let mut config = config(NodeMode::SendOnly);
    config.preferred_address = 254;
    let mut node = NetworkManager::new(TestBus::default(), &clock, config);
    assert!(matches!(
        node.send(N2kMessage::new(129025)),
        Err(SendError::InvalidSource { address: 254 })
    ));
}

#[test]
/// Consecutive fast packets carry consecutive send-order tags.
fn test_fast_packet_sequence_rotates() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);
    let message = N2kMessage::from_payload(129029, &[0x11; 20]).unwrap();
    node.send(message.clone()).unwrap();
    node.send(message).unwrap();

    let frames = &node.bus_mut().sent;
    assert_eq!(frames.len(), 6);
    assert_eq!(sequence_id(frames[0].data[0]), 0);
    assert_eq!(sequence_id(frames[3].data[0]), 1);
    assert_eq!(frames[0].data[1], 20);
}

#[test]
/// ISO requests: supported PGNs answered, others NAKed, foreign ones ignored.
fn test_iso_request_responses() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);

    inject(&mut node, &iso_request(PGN_PRODUCT_INFORMATION, US));
    assert!(poll_all(&mut node).is_empty(), "System messages stay inside");
    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].pgn, PGN_PRODUCT_INFORMATION);
    assert_eq!(out[0].payload().len(), 134);

    inject(&mut node, &iso_request(130_999, US));
    poll_all(&mut node);
    let out = sent(&mut node);
    assert_eq!(out[0].pgn, 59392);
    assert_eq!(out[0].destination, PEER);
    assert_eq!(out[0].payload(), &[1, 0xFF, 0xFF, 0xFF, 0xFF, 0xB7, 0xFF, 0x01]);

    inject(&mut node, &iso_request(PGN_ISO_ADDRESS_CLAIM, US + 1));
    poll_all(&mut node);
    assert!(sent(&mut node).is_empty());

    inject(&mut node, &iso_request(PGN_PGN_LIST, US));
    poll_all(&mut node);
    let out = sent(&mut node);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].payload()[0], 0);
    assert_eq!(out[1].payload()[0], 1);
    assert!(out.iter().all(|m| m.destination == PEER));
}

#[test]
/// Without configuration information the request is NAKed.
fn test_configuration_request_nak() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);
    inject(&mut node, &iso_request(PGN_CONFIGURATION_INFORMATION, BROADCAST_ADDRESS));
    poll_all(&mut node);

    let out = sent(&mut node);
    assert_eq!(out[0].pgn, 59392);
    assert_eq!(&out[0].payload()[5..], &[0x16, 0xF0, 0x01]);
}

#[test]
/// Product information requested during the claim goes out once claimed.
fn test_pending_product_information() {
    let clock = TestClock::new();
    let mut node = NetworkManager::new(TestBus::default(), &clock, config(NodeMode::ListenAndNode));
    node.open().unwrap();
    sent(&mut node);

    inject(&mut node, &iso_request(PGN_PRODUCT_INFORMATION, BROADCAST_ADDRESS));
    poll_all(&mut node);
    assert!(sent(&mut node).is_empty());

    clock.set(300);
    node.poll().unwrap();
    assert_eq!(sent(&mut node).first().map(|m| m.pgn), Some(PGN_PRODUCT_INFORMATION));
    node.poll().unwrap();
    assert!(sent(&mut node).is_empty(), "Sent once");
}

#[test]
/// Heartbeat at the configured interval; disabled below one second.
fn test_heartbeat() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);

    clock.set(59_999);
    node.poll().unwrap();
    assert!(sent(&mut node).is_empty());
    clock.set(60_000);
    node.poll().unwrap();
    let out = sent(&mut node);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].pgn, PGN_HEARTBEAT);
    assert_eq!(out[0].priority, 7);

    node.set_heartbeat_interval(500);
    assert_eq!(node.heartbeat_interval_ms(), 0);
    clock.set(500_000);
    node.poll().unwrap();
    assert!(sent(&mut node).is_empty());

    node.set_heartbeat_interval(INTERVAL_RESTORE_DEFAULT);
    assert_eq!(node.heartbeat_interval_ms(), 60_000);
    node.set_heartbeat_interval(INTERVAL_UNCHANGED);
    assert_eq!(node.heartbeat_interval_ms(), 60_000);
}

#[test]
/// A stronger claim on our address moves us up and raises the flag.
fn test_lose_address() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);
    let claim = AddressClaim {
        name: IsoName::from_raw(50),
        source: US,
    };
    inject(&mut node, &claim.to_message(BROADCAST_ADDRESS).unwrap());
    poll_all(&mut node);

    assert_eq!(node.address(), US + 1);
    assert!(node.read_reset_address_changed());
    assert_eq!(sent(&mut node).first().map(|m| m.source), Some(US + 1));
    assert!(matches!(node.send(N2kMessage::new(129025)), Err(SendError::ClaimPending)));
}

#[test]
/// A commanded address for our NAME is adopted.
fn test_commanded_address() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);
    let command = CommandedAddress {
        name: IsoName::from_raw(100),
        address: 77,
    };
    inject(&mut node, &command.to_message().unwrap().from_source(PEER));
    poll_all(&mut node);

    assert_eq!(node.address(), 77);
    assert!(node.read_reset_address_changed());
    assert_eq!(sent(&mut node).first().map(|m| (m.pgn, m.source)), Some((PGN_ISO_ADDRESS_CLAIM, 77)));
}

#[test]
/// A group function command changing our instance is acknowledged, then
/// the new NAME is claimed.
fn test_group_function_sets_instances() {
    let clock = TestClock::new();
    let mut node = claimed_node(&clock);
    let payload = [1, 0x00, 0xEE, 0x00, 0x08, 1, 3, 5];
    let command = N2kMessage::from_payload(PGN_GROUP_FUNCTION, &payload)
        .unwrap()
        .from_source(PEER)
        .to_destination(US);
    inject(&mut node, &command);
    poll_all(&mut node);

    let out = sent(&mut node);
    assert_eq!(out[0].pgn, PGN_GROUP_FUNCTION);
    assert_eq!(out[0].destination, PEER);
    assert_eq!(out[1].pgn, PGN_ISO_ADDRESS_CLAIM);
    assert_eq!(node.name().device_instance_lower(), 5);
    assert!(node.read_reset_device_information_changed());
    assert!(!node.read_reset_device_information_changed());
}

#[test]
/// The observer sees the traffic and its requests go out once claimed.
fn test_discovery_requests() {
    let clock = TestClock::new();
    let mut node: TestNode<'_, DeviceDiscoveryService> = NetworkManager::with_observer(
        TestBus::default(),
        &clock,
        config(NodeMode::ListenAndNode),
        DeviceDiscoveryService::new(),
    );
    node.open().unwrap();
    inject(&mut node, &N2kMessage::from_payload(129025, &[0; 8]).unwrap().from_source(12));
    poll_all(&mut node);
    assert_eq!(node.observer().count(), 1);

    clock.set(1_000);
    node.poll().unwrap();
    let out = sent(&mut node);
    let request = out.iter().find(|m| m.pgn == PGN_ISO_REQUEST).unwrap();
    assert_eq!(request.destination, 12);
    assert_eq!(request.payload(), &[0x00, 0xEE, 0x00]);
}

#[test]
/// The shared wrapper serializes access to one node.
fn test_shared_node() {
    let clock = TestClock::new();
    let shared: SharedNode<NoopRawMutex, _> = SharedNode::new(claimed_node(&clock));
    let result = shared.lock(|node| node.send(N2kMessage::from_payload(129025, &[0; 8]).unwrap()));
    assert!(result.is_ok());
    let mut node = shared.into_inner();
    assert_eq!(sent(&mut node).len(), 1);
}
