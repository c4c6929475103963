//! The node itself: owns the CAN bus, the reassembly pool, the address
//! arbitrator and an optional traffic observer, and advances all of them from
//! [`NetworkManager::poll`].
//!
//! ```text
//! CanBus -> FastPacketReassembler -> system PGN?  -> arbitrator / responders
//!                                   \-> observer   \-> application (poll result)
//! send() -> claim checks -> FastPacketBuilder -> CanBus
//! ```
//!
//! Everything is synchronous and non-blocking. `poll()` reads at most one
//! frame, then runs the level-triggered timers (claim, pending information,
//! heartbeat, discovery requests).
use crate::error::{NodeError, SendError};
use crate::fmt::Debug2Format;
use crate::infra::codec::traits::PgnData;
use crate::protocol::lookups::PgnListKind;
use crate::protocol::managment::address_claiming::{AddressClaimArbitrator, ClaimState};
use crate::protocol::managment::group_function::{
    self, NodeAction, NodeView, INTERVAL_RESTORE_DEFAULT, INTERVAL_UNCHANGED,
};
use crate::protocol::managment::iso_name::IsoName;
use crate::protocol::managment::network_discovering::MessageObserver;
use crate::protocol::messages::address_claim::AddressClaim;
use crate::protocol::messages::commanded_address::CommandedAddress;
use crate::protocol::messages::configuration_information::ConfigurationText;
use crate::protocol::messages::heartbeat::Heartbeat;
use crate::protocol::messages::iso_acknowledgement::IsoAcknowledgement;
use crate::protocol::messages::iso_request::IsoRequest;
use crate::protocol::messages::pgn_list::PgnList;
use crate::protocol::messages::{
    N2kMessage, PGN_COMMANDED_ADDRESS, PGN_CONFIGURATION_INFORMATION, PGN_GROUP_FUNCTION,
    PGN_HEARTBEAT, PGN_ISO_ADDRESS_CLAIM, PGN_ISO_REQUEST, PGN_PGN_LIST, PGN_PRODUCT_INFORMATION,
};
use crate::protocol::transport::can_id::PGN_MASK;
use crate::protocol::transport::fast_packet::assembler::{
    CompletedMessage, FastPacketReassembler, DEFAULT_REASSEMBLY_SLOTS,
};
use crate::protocol::transport::fast_packet::builder::FastPacketBuilder;
use crate::protocol::transport::traits::can_bus::CanBus;
use crate::protocol::transport::traits::clock::Clock;
use crate::protocol::transport::{BROADCAST_ADDRESS, MAX_SOURCE_ADDRESS};
use core::cell::RefCell;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};

pub mod config;

pub use config::{NodeConfig, NodeConfigBuilder};
use config::normalize_heartbeat_interval;

/// Information messages that could not go out yet, retried from `poll()`.
#[derive(Debug, Clone, Copy, Default)]
struct PendingMessages {
    address_claim: bool,
    product_information: bool,
    configuration_information: bool,
}

//==================================================================================NETWORK_MANAGER
/// One logical NMEA 2000 device on one bus.
pub struct NetworkManager<
    C: CanBus,
    K: Clock,
    O: MessageObserver = (),
    const SLOTS: usize = DEFAULT_REASSEMBLY_SLOTS,
> {
    bus: C,
    clock: K,
    observer: O,
    config: NodeConfig,
    reassembler: FastPacketReassembler<SLOTS>,
    arbitrator: AddressClaimArbitrator,
    opened: bool,
    /// Send-order tag of the next fast packet.
    sequence_id: u8,
    heartbeat_interval_ms: u32,
    next_heartbeat_at: Option<Instant>,
    pending: PendingMessages,
    device_information_changed: bool,
}

impl<C: CanBus, K: Clock> NetworkManager<C, K> {
    /// Node without an observer and the default reassembly pool.
    pub fn new(bus: C, clock: K, config: NodeConfig) -> Self {
        Self::with_observer(bus, clock, config, ())
    }
}

impl<C: CanBus, K: Clock, O: MessageObserver, const SLOTS: usize> NetworkManager<C, K, O, SLOTS> {
    /// Node feeding every completed message to `observer` (typically a
    /// [`DeviceDiscoveryService`](super::network_discovering::DeviceDiscoveryService)).
    pub fn with_observer(bus: C, clock: K, config: NodeConfig, observer: O) -> Self {
        Self {
            bus,
            clock,
            observer,
            arbitrator: AddressClaimArbitrator::new(config.name, config.preferred_address),
            heartbeat_interval_ms: normalize_heartbeat_interval(config.heartbeat_interval_ms),
            config,
            reassembler: FastPacketReassembler::new(),
            opened: false,
            sequence_id: 0,
            next_heartbeat_at: None,
            pending: PendingMessages::default(),
            device_information_changed: false,
        }
    }

    //==================================================================================ACCESSORS
    /// Current source address.
    pub fn address(&self) -> u8 {
        if self.config.mode.is_active_node() {
            self.arbitrator.address()
        } else {
            self.config.preferred_address
        }
    }

    pub fn name(&self) -> IsoName {
        self.arbitrator.name()
    }

    pub fn claim_state(&self) -> ClaimState {
        self.arbitrator.state()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    pub fn bus_mut(&mut self) -> &mut C {
        &mut self.bus
    }

    /// Heartbeat interval in effect, 0 when disabled.
    pub fn heartbeat_interval_ms(&self) -> u32 {
        self.heartbeat_interval_ms
    }

    /// Read-and-clear: the node moved to another address. Persist
    /// [`address`](Self::address) so the next start claims it directly.
    pub fn read_reset_address_changed(&mut self) -> bool {
        self.arbitrator.read_reset_address_changed()
    }

    /// Read-and-clear: NAME instances or installation descriptions changed.
    pub fn read_reset_device_information_changed(&mut self) -> bool {
        core::mem::take(&mut self.device_information_changed)
    }

    //==================================================================================OPEN
    /// Open the bus and, for full nodes, start the address claim.
    /// Idempotent; `send()` and `poll()` call it lazily.
    pub fn open(&mut self) -> Result<(), NodeError<C::Error>> {
        self.ensure_open().map_err(NodeError::Open)
    }

    fn ensure_open(&mut self) -> Result<(), C::Error> {
        if self.opened {
            return Ok(());
        }
        self.bus.open()?;
        self.opened = true;

        let now = self.clock.now();
        self.schedule_heartbeat(now);
        if self.config.mode.is_active_node() {
            let claim = self.arbitrator.start_claim(now);
            self.send_claim(claim);
        }
        Ok(())
    }

    //==================================================================================SEND
    /// Send an application message from the node's address.
    ///
    /// Refused in listen-only mode, while the address claim runs and after
    /// the claim failed. Payloads over eight bytes, and PGNs classified as
    /// fast packet, are split into fast-packet frames.
    pub fn send(&mut self, message: N2kMessage) -> Result<(), SendError<C::Error>> {
        self.ensure_open().map_err(SendError::Bus)?;
        let now = self.clock.now();
        let source = match self.source_address(now) {
            Ok(source) => source,
            Err(err) => {
                debug!("send of {} refused: {:?}", message.pgn, Debug2Format(&err));
                return Err(err);
            }
        };
        self.transmit(&message.from_source(source))
    }

    fn source_address(&mut self, now: Instant) -> Result<u8, SendError<C::Error>> {
        let mode = self.config.mode;
        if !mode.can_transmit() {
            return Err(SendError::ListenOnly);
        }
        if !mode.is_active_node() {
            let address = self.config.preferred_address;
            if address > MAX_SOURCE_ADDRESS {
                return Err(SendError::InvalidSource { address });
            }
            return Ok(address);
        }

        self.arbitrator.update(now);
        match self.arbitrator.state() {
            ClaimState::Claimed => Ok(self.arbitrator.address()),
            ClaimState::CannotClaim => Err(SendError::CannotClaim),
            ClaimState::Unclaimed | ClaimState::ClaimPending { .. } => Err(SendError::ClaimPending),
        }
    }

    /// Put a message on the bus as is, source included.
    fn transmit(&mut self, message: &N2kMessage) -> Result<(), SendError<C::Error>> {
        if message.pgn > PGN_MASK {
            return Err(SendError::InvalidPgn { pgn: message.pgn });
        }
        let framing = self.config.classification.framing(message.pgn);
        let mut builder = FastPacketBuilder::new(message.header(), message.payload(), framing);
        let fast_packet = builder.is_fast_packet();
        if fast_packet {
            builder = builder.with_sequence_id(self.next_sequence_id());
        }
        for frame in builder.build()? {
            self.bus
                .send_frame(&frame, fast_packet)
                .map_err(SendError::Bus)?;
        }
        Ok(())
    }

    fn next_sequence_id(&mut self) -> u8 {
        let id = self.sequence_id;
        self.sequence_id = (self.sequence_id + 1) & 0x07;
        id
    }

    /// Claims go out whatever the claim state; a failed one is retried.
    fn send_claim(&mut self, claim: AddressClaim) {
        let result = claim
            .to_message(BROADCAST_ADDRESS)
            .map_err(SendError::from)
            .and_then(|message| self.transmit(&message));
        self.pending.address_claim = result.is_err();
        if let Err(err) = result {
            warn!("address claim not sent: {:?}", Debug2Format(&err));
        }
    }

    /// Broadcast our address claim.
    pub fn send_address_claim(&mut self) -> Result<(), SendError<C::Error>> {
        self.ensure_open().map_err(SendError::Bus)?;
        if !self.config.mode.is_active_node() {
            return Err(SendError::ListenOnly);
        }
        let message = self.arbitrator.claim().to_message(BROADCAST_ADDRESS)?;
        self.transmit(&message)
    }

    /// Broadcast the product information. Retried from `poll()` on failure.
    pub fn send_product_information(&mut self) -> Result<(), SendError<C::Error>> {
        let result = self
            .config
            .product
            .to_message()
            .map_err(SendError::from)
            .and_then(|message| self.send(message));
        self.pending.product_information = result.is_err();
        result
    }

    /// Broadcast the configuration information, or a NAK when the node has
    /// none. Retried from `poll()` on failure.
    pub fn send_configuration_information(&mut self) -> Result<(), SendError<C::Error>> {
        self.configuration_information_to(BROADCAST_ADDRESS)
    }

    fn configuration_information_to(&mut self, requester: u8) -> Result<(), SendError<C::Error>> {
        let message = match &self.config.configuration {
            Some(configuration) => configuration.to_message()?,
            None => IsoAcknowledgement::nak(PGN_CONFIGURATION_INFORMATION)
                .to_message()?
                .to_destination(requester),
        };
        let result = self.send(message);
        self.pending.configuration_information = result.is_err();
        result
    }

    pub fn send_heartbeat(&mut self) -> Result<(), SendError<C::Error>> {
        let message = Heartbeat::new(self.heartbeat_interval_ms).to_message()?;
        self.send(message)
    }

    fn send_pgn_list(&mut self, kind: PgnListKind, destination: u8) -> Result<(), SendError<C::Error>> {
        let pgns = match kind {
            PgnListKind::Transmit => &self.config.transmit_pgns,
            PgnListKind::Receive => &self.config.receive_pgns,
        };
        let message = PgnList::new(kind, pgns).to_message()?.to_destination(destination);
        self.send(message)
    }

    fn send_nak(&mut self, pgn: u32, requester: u8) -> Result<(), SendError<C::Error>> {
        let message = IsoAcknowledgement::nak(pgn)
            .to_message()?
            .to_destination(requester);
        self.send(message)
    }

    //==================================================================================SETTINGS
    /// Change the heartbeat interval. `0xFFFF_FFFF` leaves it unchanged,
    /// `0xFFFF_FFFE` restores the configured one, anything under a second
    /// disables it.
    pub fn set_heartbeat_interval(&mut self, interval_ms: u32) {
        let interval = match interval_ms {
            INTERVAL_UNCHANGED => return,
            INTERVAL_RESTORE_DEFAULT => self.config.heartbeat_interval_ms,
            other => other,
        };
        self.heartbeat_interval_ms = normalize_heartbeat_interval(interval);
        let now = self.clock.now();
        self.schedule_heartbeat(now);
    }

    fn schedule_heartbeat(&mut self, now: Instant) {
        self.next_heartbeat_at = match self.heartbeat_interval_ms {
            0 => None,
            interval => Some(now + Duration::from_millis(u64::from(interval))),
        };
    }

    /// Update the NAME instance fields; `0xFF` leaves a field unchanged.
    /// A changed NAME is announced with a new claim.
    pub fn set_device_instances(&mut self, lower: u8, upper: u8, system: u8) {
        let current = self.arbitrator.name();
        let mut name = current;
        if lower != 0xFF {
            name = name.with_device_instance_lower(lower);
        }
        if upper != 0xFF {
            name = name.with_device_instance_upper(upper);
        }
        if system != 0xFF {
            name = name.with_system_instance(system);
        }
        if name == current {
            return;
        }

        info!("device instances changed: {:?}", name);
        self.arbitrator.set_name(name);
        self.device_information_changed = true;
        if self.opened && self.config.mode.is_active_node() {
            let claim = self.arbitrator.start_claim(self.clock.now());
            self.send_claim(claim);
        }
    }

    /// Move to `address` and claim it. Ignored above 253.
    pub fn set_address(&mut self, address: u8) {
        if !self.config.mode.is_active_node() {
            if address <= MAX_SOURCE_ADDRESS {
                self.config.preferred_address = address;
            }
            return;
        }
        if let Some(claim) = self.arbitrator.set_address(address, self.clock.now()) {
            if self.opened {
                self.send_claim(claim);
            }
        }
    }

    fn set_installation_description(&mut self, first: bool, text: ConfigurationText) {
        if let Some(configuration) = self.config.configuration.as_mut() {
            let field = if first {
                &mut configuration.installation_description1
            } else {
                &mut configuration.installation_description2
            };
            if *field != text {
                *field = text;
                self.device_information_changed = true;
            }
        }
    }

    //==================================================================================POLL
    /// Read at most one frame and run the timers. Returns the application
    /// message the frame completed, if any.
    ///
    /// Bus receive failures are returned; failures to answer system messages
    /// are logged and retried where it makes sense.
    pub fn poll(&mut self) -> Result<Option<N2kMessage>, NodeError<C::Error>> {
        self.open()?;
        let now = self.clock.now();

        let mut delivered = None;
        if let Some(frame) = self.bus.recv_frame().map_err(NodeError::Bus)? {
            if let Some(completed) =
                self.reassembler
                    .ingest(&frame, &self.config.classification, now)
            {
                delivered = self.dispatch(completed, now);
            }
        }

        self.run_timers(now);
        Ok(delivered)
    }

    /// [`poll`](Self::poll), handing the completed application message to
    /// `handler`.
    pub fn poll_with(
        &mut self,
        mut handler: impl FnMut(&N2kMessage),
    ) -> Result<(), NodeError<C::Error>> {
        if let Some(message) = self.poll()? {
            handler(&message);
        }
        Ok(())
    }

    fn dispatch(&mut self, completed: CompletedMessage, now: Instant) -> Option<N2kMessage> {
        let CompletedMessage { message, is_system } = completed;
        self.observer.observe(&message, now);

        if !is_system {
            return Some(message);
        }
        let mode = self.config.mode;
        if !mode.can_transmit() {
            return None;
        }
        if !mode.is_active_node() {
            // Send-only nodes have no system role.
            return Some(message);
        }

        match message.pgn {
            PGN_ISO_REQUEST => self.handle_iso_request(&message),
            PGN_ISO_ADDRESS_CLAIM => self.handle_address_claim(&message, now),
            PGN_COMMANDED_ADDRESS => self.handle_commanded_address(&message, now),
            PGN_GROUP_FUNCTION => self.handle_group_function(&message, now),
            _ => {}
        }
        None
    }

    fn is_for_us(&self, message: &N2kMessage) -> bool {
        message.is_broadcast() || message.destination == self.arbitrator.address()
    }

    fn handle_iso_request(&mut self, message: &N2kMessage) {
        if !self.is_for_us(message) {
            return;
        }
        let request = match IsoRequest::from_message(message) {
            Ok(request) => request,
            Err(err) => {
                debug!("bad ISO request from {}: {:?}", message.source, err);
                return;
            }
        };
        let requester = message.source;
        trace!("ISO request for {} from {}", request.pgn, requester);

        let result = match request.pgn {
            PGN_ISO_ADDRESS_CLAIM => self.send_address_claim(),
            PGN_PGN_LIST => self
                .send_pgn_list(PgnListKind::Transmit, requester)
                .and_then(|_| self.send_pgn_list(PgnListKind::Receive, requester)),
            PGN_PRODUCT_INFORMATION => self.send_product_information(),
            PGN_CONFIGURATION_INFORMATION => self.configuration_information_to(requester),
            PGN_HEARTBEAT => self.send_heartbeat(),
            other => self.send_nak(other, requester),
        };
        if let Err(err) = result {
            warn!("no answer to ISO request for {}: {:?}", request.pgn, Debug2Format(&err));
        }
    }

    fn handle_address_claim(&mut self, message: &N2kMessage, now: Instant) {
        let claim = match AddressClaim::from_message(message) {
            Ok(claim) => claim,
            Err(err) => {
                debug!("bad address claim from {}: {:?}", message.source, err);
                return;
            }
        };
        let name = self.arbitrator.name();
        let observer = &self.observer;
        let reply = self
            .arbitrator
            .handle_claim(&claim, now, |address| observer.is_address_taken(address));
        if self.arbitrator.name() != name {
            self.device_information_changed = true;
        }
        if let Some(reply) = reply {
            self.send_claim(reply);
        }
    }

    fn handle_commanded_address(&mut self, message: &N2kMessage, now: Instant) {
        match CommandedAddress::from_message(message) {
            Ok(command) => {
                if let Some(claim) = self.arbitrator.handle_commanded_address(&command, now) {
                    self.send_claim(claim);
                }
            }
            Err(err) => debug!("bad commanded address from {}: {:?}", message.source, err),
        }
    }

    fn handle_group_function(&mut self, message: &N2kMessage, now: Instant) {
        if !self.is_for_us(message) {
            return;
        }
        let view = NodeView {
            name: self.arbitrator.name(),
            product: &self.config.product,
            configuration: self.config.configuration.as_ref(),
        };
        let Some(reply) = group_function::respond(message, &view) else {
            return;
        };

        if let Some(ack) = &reply.acknowledgement {
            let result = ack
                .to_reply(reply.requester)
                .map_err(SendError::from)
                .and_then(|message| self.send(message));
            if let Err(err) = result {
                warn!("group function ack not sent: {:?}", Debug2Format(&err));
            }
        }
        for action in reply.actions {
            self.apply(action, now);
        }
    }

    fn apply(&mut self, action: NodeAction, now: Instant) {
        let result = match action {
            NodeAction::SendAddressClaim => self.send_address_claim(),
            NodeAction::SendPgnList { kind, destination } => self.send_pgn_list(kind, destination),
            NodeAction::SendProductInformation => self.send_product_information(),
            NodeAction::SendConfigurationInformation => self.send_configuration_information(),
            NodeAction::SendHeartbeat => {
                let result = self.send_heartbeat();
                self.schedule_heartbeat(now);
                result
            }
            NodeAction::SetHeartbeatInterval(interval) => {
                self.set_heartbeat_interval(interval);
                Ok(())
            }
            NodeAction::SetDeviceInstances {
                lower,
                upper,
                system,
            } => {
                self.set_device_instances(lower, upper, system);
                Ok(())
            }
            NodeAction::SetInstallationDescription1(text) => {
                self.set_installation_description(true, text);
                Ok(())
            }
            NodeAction::SetInstallationDescription2(text) => {
                self.set_installation_description(false, text);
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!("group function action failed: {:?}", Debug2Format(&err));
        }
    }

    //==================================================================================TIMERS
    fn run_timers(&mut self, now: Instant) {
        let mode = self.config.mode;
        if !mode.can_transmit() {
            return;
        }

        if mode.is_active_node() {
            if self.pending.address_claim {
                let claim = self.arbitrator.claim();
                self.send_claim(claim);
            }
            self.arbitrator.update(now);
            if self.arbitrator.state() != ClaimState::Claimed {
                return;
            }

            if self.pending.product_information {
                let _ = self.send_product_information();
            }
            if self.pending.configuration_information {
                let _ = self.send_configuration_information();
            }
            if self.next_heartbeat_at.is_some_and(|at| now >= at) {
                if let Err(err) = self.send_heartbeat() {
                    debug!("heartbeat not sent: {:?}", Debug2Format(&err));
                }
                self.schedule_heartbeat(now);
            }
        }

        if let Some(request) = self.observer.next_request(now) {
            let result = request
                .to_message()
                .map_err(SendError::from)
                .and_then(|message| self.send(message));
            if let Err(err) = result {
                debug!("discovery request not sent: {:?}", Debug2Format(&err));
            }
        }
    }
}

//==================================================================================SHARED_NODE
/// A node shared between execution contexts (an interrupt handler and the
/// main loop, several tasks), serialized by an `embassy_sync` mutex.
pub struct SharedNode<M: RawMutex, N> {
    inner: Mutex<M, RefCell<N>>,
}

impl<M: RawMutex, N> SharedNode<M, N> {
    pub const fn new(node: N) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(node)),
        }
    }

    /// Run `f` with exclusive access to the node. Must not be re-entered
    /// from inside `f`.
    pub fn lock<R>(&self, f: impl FnOnce(&mut N) -> R) -> R {
        self.inner.lock(|node| f(&mut node.borrow_mut()))
    }

    pub fn into_inner(self) -> N {
        self.inner.into_inner().into_inner()
    }
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
