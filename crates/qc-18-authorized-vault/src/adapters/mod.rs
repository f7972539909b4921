//! # Adapters Layer (Outer Hexagon)
//!
//! Adapters connect the vault to its host.
//!
//! - `host`: in-memory endpoint directory, journaled ledger, clocks
//! - `treasury`: the vault's own self-authorized token operations

pub mod host;
pub mod treasury;

pub use host::*;
pub use treasury::{VaultTreasury, WAITING_PERIOD};
