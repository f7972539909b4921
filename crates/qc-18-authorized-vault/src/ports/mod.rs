//! # Ports Layer (Middle Hexagon)
//!
//! Trait definitions for the authorized vault.
//! These are the interfaces between the domain and the outside world.
//!
//! - **Driving Ports (Inbound)**: `VaultApi`
//! - **Driven Ports (Outbound)**: `CallableEndpoint`, `EndpointResolver`,
//!   `StateJournal`, `TimeSource`
//! - No concrete implementations in this module

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
