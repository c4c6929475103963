//! Node configuration, assembled with [`NodeConfigBuilder`].
use crate::error::ConfigError;
use crate::protocol::lookups::NodeMode;
use crate::protocol::managment::iso_name::IsoName;
use crate::protocol::messages::configuration_information::ConfigurationInformation;
use crate::protocol::messages::heartbeat::MAX_HEARTBEAT_INTERVAL_MS;
use crate::protocol::messages::pgn_list::{Pgns, MAX_PGN_LIST};
use crate::protocol::messages::product_information::ProductInformation;
use crate::protocol::transport::fast_packet::classification::PgnClassification;

pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 60_000;
/// Shorter heartbeat intervals switch the heartbeat off.
pub const MIN_HEARTBEAT_INTERVAL_MS: u32 = 1_000;

/// PGNs every node transmits.
pub const DEFAULT_TRANSMIT_PGNS: [u32; 8] =
    [59392, 59904, 60928, 126208, 126464, 126993, 126996, 126998];
/// PGNs every node receives.
pub const DEFAULT_RECEIVE_PGNS: [u32; 5] = [59392, 59904, 60928, 65240, 126208];

#[derive(Debug, Clone)]
/// Everything the node needs to know about itself.
pub struct NodeConfig {
    pub name: IsoName,
    /// First address tried by the claim; the fixed source in send-only modes.
    pub preferred_address: u8,
    pub mode: NodeMode,
    pub product: ProductInformation,
    /// `None` answers configuration requests with a NAK.
    pub configuration: Option<ConfigurationInformation>,
    /// 0 disables the heartbeat.
    pub heartbeat_interval_ms: u32,
    /// Complete transmit list, defaults first.
    pub transmit_pgns: Pgns,
    /// Complete receive list, defaults first.
    pub receive_pgns: Pgns,
    pub classification: PgnClassification,
}

impl NodeConfig {
    pub fn builder(name: IsoName) -> NodeConfigBuilder {
        NodeConfigBuilder::new(name)
    }
}

/// Clamp a heartbeat interval to what the node supports.
pub(crate) fn normalize_heartbeat_interval(interval_ms: u32) -> u32 {
    if interval_ms < MIN_HEARTBEAT_INTERVAL_MS {
        0
    } else {
        interval_ms.min(MAX_HEARTBEAT_INTERVAL_MS)
    }
}

//==================================================================================BUILDER
/// Fluent builder for [`NodeConfig`]. Capacity errors are kept until
/// [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct NodeConfigBuilder {
    config: NodeConfig,
    error: Option<ConfigError>,
}

impl NodeConfigBuilder {
    pub fn new(name: IsoName) -> Self {
        let mut transmit_pgns = Pgns::new();
        let mut receive_pgns = Pgns::new();
        // Both default lists fit the capacity.
        let _ = transmit_pgns.extend_from_slice(&DEFAULT_TRANSMIT_PGNS);
        let _ = receive_pgns.extend_from_slice(&DEFAULT_RECEIVE_PGNS);
        Self {
            config: NodeConfig {
                name,
                preferred_address: 0,
                mode: NodeMode::default(),
                product: ProductInformation::default(),
                configuration: None,
                heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
                transmit_pgns,
                receive_pgns,
                classification: PgnClassification::default(),
            },
            error: None,
        }
    }

    pub fn preferred_address(mut self, address: u8) -> Self {
        self.config.preferred_address = address;
        self
    }

    pub fn mode(mut self, mode: NodeMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn product(mut self, product: ProductInformation) -> Self {
        self.config.product = product;
        self
    }

    pub fn configuration(mut self, configuration: ConfigurationInformation) -> Self {
        self.config.configuration = Some(configuration);
        self
    }

    pub fn heartbeat_interval_ms(mut self, interval_ms: u32) -> Self {
        self.config.heartbeat_interval_ms = normalize_heartbeat_interval(interval_ms);
        self
    }

    /// Start from an empty classification table instead of the default
    /// navigation PGNs.
    pub fn system_classification_only(mut self) -> Self {
        self.config.classification = PgnClassification::system_only();
        self
    }

    /// Add application PGNs the node transmits.
    pub fn transmit_pgns(mut self, pgns: &[u32]) -> Self {
        for &pgn in pgns {
            let result = add_pgn(&mut self.config.transmit_pgns, pgn);
            self.keep_error(result);
        }
        self
    }

    /// Add application PGNs the node listens to.
    pub fn receive_pgns(mut self, pgns: &[u32]) -> Self {
        for &pgn in pgns {
            let result = add_pgn(&mut self.config.receive_pgns, pgn);
            self.keep_error(result);
        }
        self
    }

    pub fn single_frame_pgns(mut self, pgns: &[u32]) -> Self {
        for &pgn in pgns {
            let result = self.config.classification.add_single_frame(pgn);
            self.keep_error(result);
        }
        self
    }

    pub fn fast_packet_pgns(mut self, pgns: &[u32]) -> Self {
        for &pgn in pgns {
            let result = self.config.classification.add_fast_packet(pgn);
            self.keep_error(result);
        }
        self
    }

    fn keep_error(&mut self, result: Result<(), ConfigError>) {
        if let Err(err) = result {
            self.error.get_or_insert(err);
        }
    }

    /// Fails with the first capacity error met while building.
    pub fn build(self) -> Result<NodeConfig, ConfigError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.config),
        }
    }
}

fn add_pgn(list: &mut Pgns, pgn: u32) -> Result<(), ConfigError> {
    if list.contains(&pgn) {
        return Ok(());
    }
    list.push(pgn)
        .map_err(|_| ConfigError::CapacityExceeded { capacity: MAX_PGN_LIST })
}
