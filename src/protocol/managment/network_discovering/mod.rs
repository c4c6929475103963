//! Device discovery: a registry of the other nodes on the bus, filled from
//! the traffic the node receives and completed by time-gated ISO requests.
//!
//! Every address that sends anything gets a [`DeviceRecord`] while the
//! registry has room (see [`DeviceDiscoveryService`] for the capacity). The
//! service then asks each device, one request at a time, for the information
//! it is missing, in this order:
//!
//! 1. NAME (address claim), at most [`MAX_NAME_REQUESTS`] attempts,
//! 2. product information,
//! 3. configuration information,
//! 4. transmit and receive PGN lists,
//!
//! each of the last three bounded to [`MAX_INFO_REQUESTS`] attempts. A phase
//! starts only once no device still wants something from the previous one.
//!
//! The service never touches the bus: [`MessageObserver::next_request`]
//! hands the next request to the node, which sends it.
use crate::error::BitWriterError;
use crate::infra::codec::traits::PgnData;
use crate::protocol::lookups::PgnListKind;
use crate::protocol::managment::iso_name::IsoName;
use crate::protocol::messages::address_claim::AddressClaim;
use crate::protocol::messages::configuration_information::ConfigurationInformation;
use crate::protocol::messages::iso_request::IsoRequest;
use crate::protocol::messages::pgn_list::{PgnList, Pgns};
use crate::protocol::messages::product_information::ProductInformation;
use crate::protocol::messages::{
    N2kMessage, PGN_CONFIGURATION_INFORMATION, PGN_ISO_ADDRESS_CLAIM, PGN_PGN_LIST,
    PGN_PRODUCT_INFORMATION,
};
use crate::protocol::transport::{BROADCAST_ADDRESS, MAX_SOURCE_ADDRESS};
use embassy_time::{Duration, Instant};
use heapless::FnvIndexMap;

/// Default registry capacity. Must be a power of two. A busy bus can hold
/// up to 254 devices; raise `N` when that many must be tracked.
pub const DEFAULT_MAX_DEVICES: usize = 32;
/// A new device is left alone this long before the first request.
pub const FIRST_REQUEST_DELAY: Duration = Duration::from_millis(1000);
/// Minimum spacing between two requests of the same kind to one device.
pub const REQUEST_SPACING: Duration = Duration::from_millis(1000);
/// Silence after which the NAME requests of an anonymous device restart.
pub const NAME_REQUEST_RESTART: Duration = Duration::from_secs(60);
pub const MAX_NAME_REQUESTS: u8 = 20;
pub const MAX_INFO_REQUESTS: u8 = 4;

//==================================================================================OBSERVER
/// Seam between the node and whatever watches the bus traffic.
///
/// The node feeds every completed message (system ones included) to
/// [`observe`](Self::observe) and, once per poll, sends what
/// [`next_request`](Self::next_request) returns. `()` observes nothing.
pub trait MessageObserver {
    fn observe(&mut self, _message: &N2kMessage, _now: Instant) {}

    /// Request to put on the bus, at most one per call.
    fn next_request(&mut self, _now: Instant) -> Option<DiscoveryRequest> {
        None
    }

    /// Whether another device is known to hold `address`. The address
    /// arbitrator skips such addresses when it has to move.
    fn is_address_taken(&self, _address: u8) -> bool {
        false
    }
}

impl MessageObserver for () {}

impl<O: MessageObserver + ?Sized> MessageObserver for &mut O {
    fn observe(&mut self, message: &N2kMessage, now: Instant) {
        (**self).observe(message, now)
    }

    fn next_request(&mut self, now: Instant) -> Option<DiscoveryRequest> {
        (**self).next_request(now)
    }

    fn is_address_taken(&self, address: u8) -> bool {
        (**self).is_address_taken(address)
    }
}

//==================================================================================REQUEST
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// ISO request the node should send on behalf of the service.
pub struct DiscoveryRequest {
    pub destination: u8,
    pub pgn: u32,
}

impl DiscoveryRequest {
    /// The ISO request message (PGN 59904) addressed to `destination`.
    pub fn to_message(&self) -> Result<N2kMessage, BitWriterError> {
        Ok(IsoRequest::new(self.pgn)
            .to_message()?
            .to_destination(self.destination))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Name,
    Product,
    Configuration,
    PgnList,
}

impl Phase {
    const ORDER: [Phase; 4] = [
        Phase::Name,
        Phase::Product,
        Phase::Configuration,
        Phase::PgnList,
    ];

    const fn pgn(self) -> u32 {
        match self {
            Phase::Name => PGN_ISO_ADDRESS_CLAIM,
            Phase::Product => PGN_PRODUCT_INFORMATION,
            Phase::Configuration => PGN_CONFIGURATION_INFORMATION,
            Phase::PgnList => PGN_PGN_LIST,
        }
    }

    const fn max_attempts(self) -> u8 {
        match self {
            Phase::Name => MAX_NAME_REQUESTS,
            _ => MAX_INFO_REQUESTS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RequestTracker {
    attempts: u8,
    last_sent: Option<Instant>,
}

impl RequestTracker {
    fn spaced(&self, now: Instant) -> bool {
        self.last_sent
            .map_or(true, |at| now.saturating_duration_since(at) >= REQUEST_SPACING)
    }

    fn mark(&mut self, now: Instant) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_sent = Some(now);
    }
}

//==================================================================================DEVICE_RECORD
#[derive(Debug, Clone, PartialEq, Eq)]
/// What the node knows about one device on the bus.
pub struct DeviceRecord {
    pub source: u8,
    /// Known once the device claimed its address.
    pub name: Option<IsoName>,
    pub product: Option<ProductInformation>,
    pub configuration: Option<ConfigurationInformation>,
    pub transmit_pgns: Option<Pgns>,
    pub receive_pgns: Option<Pgns>,
    pub created_at: Instant,
    pub last_message_at: Instant,
    name_requests: RequestTracker,
    product_requests: RequestTracker,
    configuration_requests: RequestTracker,
    pgn_list_requests: RequestTracker,
}

impl DeviceRecord {
    fn new(source: u8, now: Instant) -> Self {
        Self {
            source,
            name: None,
            product: None,
            configuration: None,
            transmit_pgns: None,
            receive_pgns: None,
            created_at: now,
            last_message_at: now,
            name_requests: RequestTracker::default(),
            product_requests: RequestTracker::default(),
            configuration_requests: RequestTracker::default(),
            pgn_list_requests: RequestTracker::default(),
        }
    }

    /// Unique number and manufacturer code from the NAME.
    pub fn ids(&self) -> Option<(u32, u16)> {
        self.name
            .map(|name| (name.unique_number(), name.manufacturer_code()))
    }

    fn tracker(&self, phase: Phase) -> &RequestTracker {
        match phase {
            Phase::Name => &self.name_requests,
            Phase::Product => &self.product_requests,
            Phase::Configuration => &self.configuration_requests,
            Phase::PgnList => &self.pgn_list_requests,
        }
    }

    fn tracker_mut(&mut self, phase: Phase) -> &mut RequestTracker {
        match phase {
            Phase::Name => &mut self.name_requests,
            Phase::Product => &mut self.product_requests,
            Phase::Configuration => &mut self.configuration_requests,
            Phase::PgnList => &mut self.pgn_list_requests,
        }
    }

    fn is_missing(&self, phase: Phase) -> bool {
        match phase {
            Phase::Name => self.name.is_none(),
            Phase::Product => self.product.is_none(),
            Phase::Configuration => self.configuration.is_none(),
            Phase::PgnList => self.transmit_pgns.is_none() || self.receive_pgns.is_none(),
        }
    }

    /// Information still missing and attempts left.
    fn wants(&self, phase: Phase) -> bool {
        self.is_missing(phase) && self.tracker(phase).attempts < phase.max_attempts()
    }

    fn ready_for(&self, phase: Phase, now: Instant) -> bool {
        self.wants(phase)
            && now.saturating_duration_since(self.created_at) >= FIRST_REQUEST_DELAY
            && self.tracker(phase).spaced(now)
    }
}

//==================================================================================SERVICE
/// Registry of the devices seen on the bus, keyed by source address.
///
/// Holds at most `N` records ([`DEFAULT_MAX_DEVICES`] by default, a power of
/// two). Once full, devices from new addresses are not tracked: nothing is
/// requested from them and [`is_address_taken`](MessageObserver::is_address_taken)
/// reports their address as free. Records leave the registry only when a
/// device is displaced, so size `N` for the largest expected bus.
pub struct DeviceDiscoveryService<const N: usize = DEFAULT_MAX_DEVICES> {
    devices: FnvIndexMap<u8, DeviceRecord, N>,
    /// Some device may still want a request; cleared once none does.
    requests_pending: bool,
    /// Ask every node for its claim, after a device was displaced.
    global_name_request: bool,
    list_updated: bool,
}

impl<const N: usize> Default for DeviceDiscoveryService<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> DeviceDiscoveryService<N> {
    pub fn new() -> Self {
        Self {
            devices: FnvIndexMap::new(),
            requests_pending: false,
            global_name_request: false,
            list_updated: false,
        }
    }

    pub fn count(&self) -> usize {
        self.devices.len()
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> + '_ {
        self.devices.values()
    }

    pub fn find_by_source(&self, source: u8) -> Option<&DeviceRecord> {
        self.devices.get(&source)
    }

    pub fn find_by_name(&self, name: IsoName) -> Option<&DeviceRecord> {
        self.devices.values().find(|d| d.name == Some(name))
    }

    /// Match on unique number and manufacturer code.
    pub fn find_by_ids(&self, unique_number: u32, manufacturer_code: u16) -> Option<&DeviceRecord> {
        self.devices
            .values()
            .find(|d| d.ids() == Some((unique_number, manufacturer_code)))
    }

    /// Read-and-clear: a device appeared, moved or changed its information.
    pub fn read_reset_list_updated(&mut self) -> bool {
        core::mem::replace(&mut self.list_updated, false)
    }

    /// Feed one received message.
    pub fn handle_message(&mut self, message: &N2kMessage, now: Instant) {
        let source = message.source;
        if source > MAX_SOURCE_ADDRESS {
            return;
        }

        if message.pgn == PGN_ISO_ADDRESS_CLAIM {
            match AddressClaim::from_message(message) {
                Ok(claim) => self.handle_claim(&claim, now),
                Err(err) => debug!("bad address claim from {}: {:?}", source, err),
            }
        } else if !self.devices.contains_key(&source) && !self.add_device(source, now) {
            return;
        }

        let Some(device) = self.devices.get_mut(&source) else {
            return;
        };
        match message.pgn {
            PGN_PRODUCT_INFORMATION => match ProductInformation::from_message(message) {
                Ok(product) => {
                    if device.product.as_ref() != Some(&product) {
                        device.product = Some(product);
                        self.list_updated = true;
                    }
                }
                Err(err) => debug!("bad product information from {}: {:?}", source, err),
            },
            PGN_CONFIGURATION_INFORMATION => {
                match ConfigurationInformation::from_message(message) {
                    Ok(configuration) => {
                        device.configuration = Some(configuration);
                        self.list_updated = true;
                    }
                    Err(err) => debug!("bad configuration from {}: {:?}", source, err),
                }
            }
            PGN_PGN_LIST => match PgnList::from_message(message) {
                Ok(list) => match list.kind {
                    PgnListKind::Transmit => device.transmit_pgns = Some(list.pgns),
                    PgnListKind::Receive => device.receive_pgns = Some(list.pgns),
                },
                Err(err) => debug!("bad PGN list from {}: {:?}", source, err),
            },
            _ => {}
        }

        if device.name.is_none()
            && device.name_requests.attempts > 0
            && now.saturating_duration_since(device.last_message_at) > NAME_REQUEST_RESTART
        {
            device.name_requests = RequestTracker::default();
            self.requests_pending = true;
        }
        device.last_message_at = now;
    }

    /// Next request to send, if any device is due one.
    pub fn poll_request(&mut self, now: Instant) -> Option<DiscoveryRequest> {
        if core::mem::replace(&mut self.global_name_request, false) {
            return Some(DiscoveryRequest {
                destination: BROADCAST_ADDRESS,
                pgn: PGN_ISO_ADDRESS_CLAIM,
            });
        }
        if !self.requests_pending {
            return None;
        }

        self.requests_pending = false;
        for phase in Phase::ORDER {
            for device in self.devices.values_mut() {
                if device.ready_for(phase, now) {
                    device.tracker_mut(phase).mark(now);
                    self.requests_pending = true;
                    debug!("discovery: request {} from {}", phase.pgn(), device.source);
                    return Some(DiscoveryRequest {
                        destination: device.source,
                        pgn: phase.pgn(),
                    });
                }
                self.requests_pending |= device.wants(phase);
            }
            if self.requests_pending {
                // Waiting on timers of this phase.
                return None;
            }
        }
        None
    }

    fn add_device(&mut self, source: u8, now: Instant) -> bool {
        match self.devices.insert(source, DeviceRecord::new(source, now)) {
            Ok(_) => {
                self.requests_pending = true;
                self.list_updated = true;
                true
            }
            Err(_) => {
                warn!("device registry full ({}), {} not tracked", N, source);
                false
            }
        }
    }

    fn position_of(&self, name: IsoName) -> Option<u8> {
        self.devices
            .values()
            .find(|d| d.name == Some(name))
            .map(|d| d.source)
    }

    /// Move the record at `from` to `to`, replacing whatever was there.
    fn relocate(&mut self, from: u8, to: u8) {
        if let Some(mut record) = self.devices.remove(&from) {
            record.source = to;
            self.devices.remove(&to);
            // One record was just removed, so there is room.
            let _ = self.devices.insert(to, record);
        }
    }

    fn handle_claim(&mut self, claim: &AddressClaim, now: Instant) {
        let source = claim.source;
        match self.devices.get(&source).map(|d| d.name) {
            Some(Some(name)) if name == claim.name => return,
            Some(Some(previous)) => {
                // Another device took this address; the previous owner went
                // somewhere else and has to announce itself again.
                debug!("discovery: {} changed from {:?} to {:?}", source, previous, claim.name);
                self.devices.remove(&source);
                self.global_name_request = true;
                self.claim_new_source(claim, now);
            }
            Some(None) => match self.position_of(claim.name) {
                Some(old) => self.relocate(old, source),
                None => {
                    if let Some(device) = self.devices.get_mut(&source) {
                        device.name = Some(claim.name);
                    }
                }
            },
            None => self.claim_new_source(claim, now),
        }

        if let Some(device) = self.devices.get_mut(&source) {
            device.product = None;
            device.product_requests = RequestTracker::default();
        }
        self.requests_pending = true;
        self.list_updated = true;
    }

    fn claim_new_source(&mut self, claim: &AddressClaim, now: Instant) {
        match self.position_of(claim.name) {
            Some(old) => {
                debug!("discovery: {:?} moved from {} to {}", claim.name, old, claim.source);
                self.relocate(old, claim.source);
            }
            None => {
                if self.add_device(claim.source, now) {
                    if let Some(device) = self.devices.get_mut(&claim.source) {
                        device.name = Some(claim.name);
                    }
                }
            }
        }
    }
}

impl<const N: usize> MessageObserver for DeviceDiscoveryService<N> {
    fn observe(&mut self, message: &N2kMessage, now: Instant) {
        self.handle_message(message, now);
    }

    fn next_request(&mut self, now: Instant) -> Option<DiscoveryRequest> {
        self.poll_request(now)
    }

    fn is_address_taken(&self, address: u8) -> bool {
        self.devices.contains_key(&address)
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
