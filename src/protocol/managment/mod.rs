//! Network management: the NAME, address claiming, the node itself, device
//! discovery and the group function protocol.
pub mod address_claiming;
pub mod group_function;
pub mod iso_name;
pub mod network_discovering;
pub mod network_manager;
