//! # Domain Layer (Inner Hexagon)
//!
//! Pure authorization logic for the vault.
//! NO I/O, NO async, NO external dependencies.
//!
//! - This is the **inner layer** of the hexagonal architecture.
//! - Dependencies point INWARD only (adapters depend on this, not vice versa).

pub mod entities;
pub mod envelope;
pub mod invariants;
pub mod permissions;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use envelope::{Envelope, Payload};
pub use invariants::*;
pub use permissions::*;
pub use services::*;
pub use value_objects::*;
