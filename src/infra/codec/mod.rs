//! Payload codec building blocks: bit cursors and the codec trait.
pub mod bits;
pub mod traits;
