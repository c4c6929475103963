//! Seams between the node and its environment: the CAN driver and the
//! monotonic clock.
pub mod can_bus;
pub mod clock;
