//! # Core Domain Entities
//!
//! Executor lifecycle and the call handed to target endpoints.

use crate::domain::envelope::Payload;
use crate::domain::value_objects::{Address, Selector};
use serde::{Deserialize, Serialize};

// =============================================================================
// EXECUTOR STATE
// =============================================================================

/// Executor configuration flag.
///
/// Moves from `Unconfigured` to `Configured` exactly once, when the registry
/// seals. There are no other transitions.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ExecutorState {
    /// Waiting for the one-time grant. `submit` fails with `NotInitialized`.
    #[default]
    Unconfigured,
    /// Serving `submit` requests.
    Configured,
}

impl ExecutorState {
    /// Returns true once permissions are in place.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::Configured)
    }
}

// =============================================================================
// FORWARD CALL
// =============================================================================

/// A call delivered to a target endpoint.
#[derive(Clone, Debug)]
pub struct ForwardCall {
    /// Immediate sender of the call (the vault, for forwarded calls).
    pub sender: Address,
    /// Identity that submitted the originating envelope.
    pub origin: Address,
    /// Endpoint being called.
    pub target: Address,
    /// Payload, opcode first.
    pub payload: Payload,
    /// Nesting depth (1 for a top-level forward).
    pub depth: usize,
}

impl ForwardCall {
    /// Creates a top-level call with `sender == origin`.
    #[must_use]
    pub fn direct(sender: Address, target: Address, payload: Payload) -> Self {
        Self {
            sender,
            origin: sender,
            target,
            payload,
            depth: 1,
        }
    }

    /// Opcode of the payload.
    #[must_use]
    pub fn opcode(&self) -> Selector {
        self.payload.opcode()
    }

    /// Argument bytes after the opcode.
    #[must_use]
    pub fn arguments(&self) -> &[u8] {
        self.payload.arguments()
    }
}
