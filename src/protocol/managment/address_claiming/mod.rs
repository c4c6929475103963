//! SAE J1939 / NMEA 2000 address-claim arbitration.
//!
//! The arbitrator owns the node's NAME and source address and decides what to
//! do with every address claim seen on the bus. It never touches the bus
//! itself: each operation returns the [`AddressClaim`] the caller must
//! broadcast, if any.
//!
//! ```text
//! Unclaimed --start_claim--> ClaimPending --250 ms, no contest--> Claimed
//!                                ^    |
//!                lost, next addr |    | lost at 253
//!                                +----+----> CannotClaim (source 254)
//! ```
//!
//! A contest always compares NAMEs: the numerically smaller one keeps the
//! address, the other moves up to the next free address.
use crate::protocol::managment::iso_name::IsoName;
use crate::protocol::messages::address_claim::AddressClaim;
use crate::protocol::messages::commanded_address::CommandedAddress;
use crate::protocol::transport::{MAX_SOURCE_ADDRESS, NULL_ADDRESS};
use embassy_time::{Duration, Instant};

/// Time a claim must stand uncontested before the address may be used.
pub const ADDRESS_CLAIM_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClaimState {
    /// No claim issued yet.
    Unclaimed,
    /// Claim broadcast at `since`; data must not be sent yet.
    ClaimPending { since: Instant },
    /// The claim stood for [`ADDRESS_CLAIM_TIMEOUT`].
    Claimed,
    /// Every address up to 253 was lost. Terminal until a new address is set.
    CannotClaim,
}

//==================================================================================ARBITRATOR
#[derive(Debug, Clone)]
pub struct AddressClaimArbitrator {
    name: IsoName,
    address: u8,
    state: ClaimState,
    address_changed: bool,
}

impl AddressClaimArbitrator {
    /// Arbitrator for `name`, starting from `preferred_address`. Addresses
    /// above 253 fall back to 0.
    pub fn new(name: IsoName, preferred_address: u8) -> Self {
        Self {
            name,
            address: if preferred_address > MAX_SOURCE_ADDRESS {
                0
            } else {
                preferred_address
            },
            state: ClaimState::Unclaimed,
            address_changed: false,
        }
    }

    pub fn name(&self) -> IsoName {
        self.name
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn state(&self) -> ClaimState {
        self.state
    }

    /// Claim currently announced by this node.
    pub fn claim(&self) -> AddressClaim {
        AddressClaim {
            name: self.name,
            source: self.address,
        }
    }

    /// Broadcast a claim for the current address and start the claim timer.
    pub fn start_claim(&mut self, now: Instant) -> AddressClaim {
        if self.state == ClaimState::CannotClaim {
            return self.claim();
        }
        info!("claiming address {}", self.address);
        self.state = ClaimState::ClaimPending { since: now };
        self.claim()
    }

    /// Move to `address` and claim it. Also the way out of `CannotClaim`.
    pub fn set_address(&mut self, address: u8, now: Instant) -> Option<AddressClaim> {
        if address > MAX_SOURCE_ADDRESS {
            return None;
        }
        if address != self.address {
            self.address = address;
            self.address_changed = true;
        }
        self.state = ClaimState::Unclaimed;
        Some(self.start_claim(now))
    }

    /// Replace the NAME. The caller restarts the claim so the bus learns it.
    pub fn set_name(&mut self, name: IsoName) {
        self.name = name;
    }

    /// Advance the claim timer.
    pub fn update(&mut self, now: Instant) {
        if let ClaimState::ClaimPending { since } = self.state {
            if now.saturating_duration_since(since) >= ADDRESS_CLAIM_TIMEOUT {
                info!("address {} claimed", self.address);
                self.state = ClaimState::Claimed;
            }
        }
    }

    /// Returns `true` while the claim timer runs.
    pub fn is_claim_pending(&self) -> bool {
        matches!(self.state, ClaimState::ClaimPending { .. })
    }

    /// React to a claim received from another node.
    ///
    /// `is_taken` reports addresses known to be held by other devices so the
    /// next address skips them. Returns the claim to broadcast: ours again
    /// when we keep the address, the new one when we move.
    pub fn handle_claim(
        &mut self,
        claim: &AddressClaim,
        now: Instant,
        is_taken: impl Fn(u8) -> bool,
    ) -> Option<AddressClaim> {
        if claim.source != self.address || self.state == ClaimState::CannotClaim {
            return None;
        }

        if self.name < claim.name {
            debug!("defending address {}", self.address);
            return Some(self.claim());
        }

        if self.name == claim.name {
            // Same NAME on two devices: make ours distinct, then give way.
            let instance = self.name.device_instance().wrapping_add(1);
            warn!(
                "duplicate NAME on address {}, device instance -> {}",
                self.address,
                instance
            );
            self.name = self.name.with_device_instance(instance);
        }

        Some(self.move_to_next_address(now, is_taken))
    }

    /// Adopt the address ordered by a commanded-address message aimed at our
    /// NAME. Returns the claim for the new address.
    pub fn handle_commanded_address(
        &mut self,
        command: &CommandedAddress,
        now: Instant,
    ) -> Option<AddressClaim> {
        if command.name != self.name
            || command.address == self.address
            || command.address > MAX_SOURCE_ADDRESS
        {
            return None;
        }
        info!("commanded to address {}", command.address);
        self.set_address(command.address, now)
    }

    /// Read and clear the "address changed" flag.
    pub fn read_reset_address_changed(&mut self) -> bool {
        core::mem::take(&mut self.address_changed)
    }

    fn move_to_next_address(
        &mut self,
        now: Instant,
        is_taken: impl Fn(u8) -> bool,
    ) -> AddressClaim {
        let first = self.address.saturating_add(1);
        let next = (first..=MAX_SOURCE_ADDRESS).find(|&a| !is_taken(a));
        self.address_changed = true;
        match next {
            Some(address) => {
                warn!("lost address {}, moving to {}", self.address, address);
                self.address = address;
                self.state = ClaimState::ClaimPending { since: now };
            }
            None => {
                error!("lost address {}, no address left", self.address);
                self.address = NULL_ADDRESS;
                self.state = ClaimState::CannotClaim;
            }
        }
        self.claim()
    }
}
