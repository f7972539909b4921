//! # QC-18 Authorized Vault - Permissioned Command-Execution Subsystem
//!
//! **Subsystem ID:** 18
//! **Status:** Production-Ready
//!
//! ## Purpose
//!
//! Accepts opaque command envelopes from untrusted callers, decodes the
//! target and payload, checks the effective opcode against a sealed
//! permission registry and forwards the payload atomically. The opcode that
//! is authorized is always the opcode that is executed.
//!
//! ## Domain Invariants
//!
//! | ID | Invariant | Enforcement Location |
//! |----|-----------|---------------------|
//! | INVARIANT-1 | Single Decoder | `domain/envelope.rs` - `decode()` is the only payload reader |
//! | INVARIANT-2 | No Self-Escalation | `domain/invariants.rs` - `check_no_self_escalation()` |
//! | INVARIANT-3 | Configure Once | `domain/permissions.rs` - `PermissionRegistry::grant()`, `check_sealed_invariant()` |
//! | INVARIANT-4 | Atomic Forward | `service.rs` - checkpoint / commit / revert |
//! | INVARIANT-5 | Call Depth Limit | `domain/invariants.rs` - `check_call_depth_invariant()` |
//!
//! ## Envelope Layout
//!
//! ```text
//! [0..4)    entry selector  execute(address,bytes)
//! [4..36)   target          12 zero bytes ++ 20 address bytes
//! [36..68)  offset p        relative to byte 4
//! [4+p..)   length L        one 32-byte word
//! [4+p+32..4+p+32+L)        payload, opcode = payload[0..4]
//! ```
//!
//! ## Error Taxonomy
//!
//! | Category | Variants |
//! |----------|----------|
//! | `ConfigurationError` | `NotInitialized`, `AlreadyInitialized` |
//! | `EncodingError` | `MalformedEnvelope` |
//! | `AuthorizationError` | `CallerNotAllowed`, `Forbidden` |
//! | `ExecutionError` | `ForwardFailed(inner)` |
//!
//! ### Execution Safety Limits
//!
//! | Limit | Value | Purpose |
//! |-------|-------|---------|
//! | `max_call_depth` | 64 | Bound reentrant forwards (stack-safe ceiling) |
//! | `max_envelope_size` | 64 KB | Bound decoder input |
//!
//! ## Outbound Dependencies
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | `EndpointResolver` | Locate the forward target |
//! | `StateJournal` | Checkpoint and roll back host state, via one `ExecutionLane` |
//! | `TimeSource` | Stamp `LastInvocation` |
//!
//! ## Usage Example
//!
//! ```ignore
//! use qc_18_authorized_vault::prelude::*;
//!
//! let d = create_test_vault();
//! let vault = d.vault.address();
//! d.vault
//!     .grant(deployer, vec![PermissionKey::derive(selectors::withdraw(), player, vault)])
//!     .await?;
//!
//! let envelope = encode(vault, &calls::withdraw(token, player, amount));
//! d.vault.submit(player, envelope.as_slice()).await?;
//! ```

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

// =============================================================================
// MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod errors;
pub mod events;
pub mod ports;
pub mod service;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Domain entities
    pub use crate::domain::entities::{ExecutorState, ForwardCall};

    // Value objects
    pub use crate::domain::value_objects::{Address, Bytes, Hash, Selector, Timestamp, U256};

    // Envelope codec
    pub use crate::domain::envelope::{decode, encode, Envelope, Payload};

    // Permissions
    pub use crate::domain::permissions::{PermissionKey, PermissionRegistry, RegistryState};

    // Domain services
    pub use crate::domain::services::{keccak256, selector_of, selectors};

    // Invariants
    pub use crate::domain::invariants::{
        check_call_depth_invariant, check_no_self_escalation, check_opcode_agreement,
        check_sealed_invariant, limits,
    };

    // Ports
    pub use crate::ports::inbound::VaultApi;
    pub use crate::ports::outbound::{
        CallableEndpoint, Checkpoint, EndpointResolver, ExecutionLane, HostRuntime, StateJournal,
        TimeSource,
    };

    // Events
    pub use crate::events::VaultEvent;

    // Errors
    pub use crate::errors::{
        AuthorizationError, ConfigurationError, EncodingError, EndpointError, ExecutionError,
        MalformedReason, VaultError,
    };

    // Adapters
    pub use crate::adapters::treasury::{calls, withdrawal_limit};
    pub use crate::adapters::{
        InMemoryHost, InMemoryLedger, ManualClock, SystemClock, VaultTreasury, WAITING_PERIOD,
    };

    // Service
    pub use crate::service::{
        create_test_vault, deploy_in_memory, AuthorizedVaultService, InMemoryDeployment,
        VaultConfig, VaultStats,
    };
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Subsystem ID.
pub const SUBSYSTEM_ID: u8 = 18;

/// Subsystem name.
pub const SUBSYSTEM_NAME: &str = "Authorized Vault";

// =============================================================================
// TESTS
// =============================================================================
