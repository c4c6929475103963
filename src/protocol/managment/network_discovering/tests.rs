//! Registry bookkeeping and request gating.
use super::*;
use heapless::Vec;

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

fn data_from(source: u8) -> N2kMessage {
    N2kMessage::from_payload(129025, &[1, 2, 3, 4, 5, 6, 7, 8])
        .unwrap()
        .from_source(source)
}

fn claim_from(source: u8, name: IsoName) -> N2kMessage {
    AddressClaim { name, source }
        .to_message(BROADCAST_ADDRESS)
        .unwrap()
}

fn product_from(source: u8) -> N2kMessage {
    let mut product = ProductInformation::default();
    product.model_id.push_str("Depth sounder").unwrap();
    product.to_message().unwrap().from_source(source)
}

fn request(destination: u8, pgn: u32) -> Option<DiscoveryRequest> {
    Some(DiscoveryRequest { destination, pgn })
}

#[test]
/// Any traffic from an unknown address creates a record; the first request
/// waits for the settle delay, the next one for the spacing.
fn test_unknown_source_creates_record() {
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&data_from(12), at(0));

    assert_eq!(discovery.count(), 1);
    assert_eq!(discovery.find_by_source(12).unwrap().name, None);
    assert!(discovery.read_reset_list_updated());
    assert!(!discovery.read_reset_list_updated());

    assert_eq!(discovery.poll_request(at(999)), None);
    assert_eq!(discovery.poll_request(at(1000)), request(12, PGN_ISO_ADDRESS_CLAIM));
    assert_eq!(discovery.poll_request(at(1500)), None);
    assert_eq!(discovery.poll_request(at(2000)), request(12, PGN_ISO_ADDRESS_CLAIM));
}

#[test]
/// A claimed device skips the NAME phase and walks through the others as
/// its answers arrive.
fn test_information_phases() {
    let name = IsoName::from_raw(0x1234);
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(10, name), at(0));
    assert_eq!(discovery.find_by_source(10).unwrap().name, Some(name));

    assert_eq!(discovery.poll_request(at(1000)), request(10, PGN_PRODUCT_INFORMATION));
    assert_eq!(discovery.poll_request(at(1010)), None, "Product phase not satisfied yet");

    discovery.handle_message(&product_from(10), at(1100));
    assert_eq!(
        discovery.find_by_source(10).unwrap().product.as_ref().map(|p| p.model_id.as_str()),
        Some("Depth sounder")
    );
    assert_eq!(
        discovery.poll_request(at(1100)),
        request(10, PGN_CONFIGURATION_INFORMATION)
    );

    let configuration = ConfigurationInformation::new("Helm", "", "Acme").unwrap();
    discovery.handle_message(&configuration.to_message().unwrap().from_source(10), at(1200));
    assert_eq!(discovery.poll_request(at(1200)), request(10, PGN_PGN_LIST));

    let transmit = PgnList::new(PgnListKind::Transmit, &[59392, 129025]);
    let receive = PgnList::new(PgnListKind::Receive, &[59904]);
    discovery.handle_message(&transmit.to_message().unwrap().from_source(10), at(1300));
    discovery.handle_message(&receive.to_message().unwrap().from_source(10), at(1310));

    let device = discovery.find_by_source(10).unwrap();
    assert_eq!(device.transmit_pgns.as_deref(), Some(&[59392, 129025][..]));
    assert_eq!(device.receive_pgns.as_deref(), Some(&[59904][..]));
    assert_eq!(device.configuration, Some(configuration));
    assert_eq!(discovery.poll_request(at(5000)), None);
}

#[test]
/// Product requests wait until every device has its NAME or ran out of
/// attempts.
fn test_name_phase_first() {
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(10, IsoName::from_raw(1)), at(0));
    discovery.handle_message(&data_from(11), at(0));

    assert_eq!(discovery.poll_request(at(1000)), request(11, PGN_ISO_ADDRESS_CLAIM));
    assert_eq!(discovery.poll_request(at(1001)), None);

    discovery.handle_message(&claim_from(11, IsoName::from_raw(2)), at(1100));
    assert_eq!(discovery.poll_request(at(1100)).map(|r| r.pgn), Some(PGN_PRODUCT_INFORMATION));
}

#[test]
/// A silent device gets 20 NAME requests and 4 of each other kind, then
/// nothing until it talks again after a minute.
fn test_attempt_bounds_and_restart() {
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&data_from(12), at(0));

    let mut sent: Vec<u32, 64> = Vec::new();
    for step in 1..=40u64 {
        if let Some(req) = discovery.poll_request(at(step * 1000)) {
            sent.push(req.pgn).unwrap();
        }
    }
    let count = |pgn: u32| sent.iter().filter(|&&p| p == pgn).count();
    assert_eq!(count(PGN_ISO_ADDRESS_CLAIM), 20);
    assert_eq!(count(PGN_PRODUCT_INFORMATION), 4);
    assert_eq!(count(PGN_CONFIGURATION_INFORMATION), 4);
    assert_eq!(count(PGN_PGN_LIST), 4);
    assert_eq!(sent.len(), 32);

    // Traffic within the minute keeps the counter.
    discovery.handle_message(&data_from(12), at(50_000));
    assert_eq!(discovery.poll_request(at(51_000)), None);

    discovery.handle_message(&data_from(12), at(120_000));
    assert_eq!(discovery.poll_request(at(120_000)), request(12, PGN_ISO_ADDRESS_CLAIM));
}

/// NAME requests issued while polling once per second over `from_s..=to_s`.
fn name_requests(discovery: &mut DeviceDiscoveryService<32>, from_s: u64, to_s: u64) -> usize {
    (from_s..=to_s)
        .filter_map(|s| discovery.poll_request(at(s * 1000)))
        .filter(|req| req.pgn == PGN_ISO_ADDRESS_CLAIM)
        .count()
}

#[test]
/// NAME requests to an anonymous device stop after 20 attempts and only
/// restart when it talks again after more than a minute of silence.
fn test_name_request_restart_after_silence() {
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&data_from(12), at(0));

    assert_eq!(name_requests(&mut discovery, 1, 59), 20);
    assert_eq!(name_requests(&mut discovery, 60, 60), 0, "Attempts exhausted");

    // Exactly one minute of silence is not enough.
    discovery.handle_message(&data_from(12), at(60_000));
    assert_eq!(name_requests(&mut discovery, 61, 119), 0);
    discovery.handle_message(&data_from(12), at(120_000));
    assert_eq!(name_requests(&mut discovery, 121, 179), 0);

    discovery.handle_message(&data_from(12), at(180_001));
    assert_eq!(
        discovery.poll_request(at(180_001)),
        request(12, PGN_ISO_ADDRESS_CLAIM)
    );
    assert_eq!(name_requests(&mut discovery, 182, 220), 19);
    assert_eq!(discovery.find_by_source(12).unwrap().name, None);
}

#[test]
/// A known NAME claiming another address moves its record.
fn test_address_change_relocates() {
    let name = IsoName::from_raw(77);
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(10, name), at(0));
    discovery.handle_message(&claim_from(20, name), at(10));

    assert_eq!(discovery.count(), 1);
    assert!(discovery.find_by_source(10).is_none());
    assert_eq!(discovery.find_by_name(name).map(|d| d.source), Some(20));
}

#[test]
/// A NAME claimed from an address already known under another NAME takes
/// it over; everybody is then asked to claim again.
fn test_displaced_device() {
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(10, IsoName::from_raw(1)), at(0));
    discovery.handle_message(&claim_from(10, IsoName::from_raw(2)), at(10));

    assert_eq!(discovery.count(), 1);
    assert_eq!(discovery.find_by_source(10).unwrap().name, Some(IsoName::from_raw(2)));
    assert!(discovery.find_by_name(IsoName::from_raw(1)).is_none());
    assert_eq!(
        discovery.poll_request(at(10)),
        request(BROADCAST_ADDRESS, PGN_ISO_ADDRESS_CLAIM)
    );
}

#[test]
/// An anonymous placeholder merges with the record holding the NAME.
fn test_placeholder_merge() {
    let name = IsoName::from_raw(5);
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(10, name), at(0));
    discovery.handle_message(&data_from(11), at(5));
    assert_eq!(discovery.count(), 2);

    discovery.handle_message(&claim_from(11, name), at(10));
    assert_eq!(discovery.count(), 1);
    assert_eq!(discovery.find_by_name(name).map(|d| d.source), Some(11));
}

#[test]
/// The same claim twice changes nothing.
fn test_repeated_claim() {
    let name = IsoName::from_raw(5);
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(10, name), at(0));
    discovery.handle_message(&product_from(10), at(5));
    discovery.read_reset_list_updated();

    discovery.handle_message(&claim_from(10, name), at(10));
    assert!(!discovery.read_reset_list_updated());
    assert!(discovery.find_by_source(10).unwrap().product.is_some());
}

#[test]
/// Lookup by unique number and manufacturer.
fn test_find_by_ids() {
    let name = IsoName::builder().unique_number(4242).manufacturer_code(135).build();
    let mut discovery = DeviceDiscoveryService::<32>::new();
    discovery.handle_message(&claim_from(33, name), at(0));

    assert_eq!(discovery.find_by_ids(4242, 135).map(|d| d.source), Some(33));
    assert!(discovery.find_by_ids(4242, 136).is_none());
}

#[test]
/// A full registry ignores newcomers; the null address is never tracked.
fn test_registry_capacity() {
    let mut discovery = DeviceDiscoveryService::<4>::new();
    for source in 0..6 {
        discovery.handle_message(&data_from(source), at(0));
    }
    discovery.handle_message(&data_from(254), at(0));

    assert_eq!(discovery.count(), 4);
    assert!(discovery.find_by_source(5).is_none());
    assert!(discovery.is_address_taken(0));
    assert!(!discovery.is_address_taken(5));

    // Untracked devices are never asked anything, even once others leave
    // the NAME phase.
    discovery.read_reset_list_updated();
    discovery.handle_message(&data_from(5), at(500));
    assert!(!discovery.read_reset_list_updated());
    for step in 1..=60u64 {
        if let Some(req) = discovery.poll_request(at(step * 1000)) {
            assert!(req.destination < 4, "request to untracked {}", req.destination);
        }
    }
}
