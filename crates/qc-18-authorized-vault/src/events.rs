//! # Event Schema
//!
//! Domain events recorded by the vault. Events from a forward that fails are
//! rolled back together with the rest of its effects.

use crate::domain::permissions::PermissionKey;
use crate::domain::value_objects::{Address, Selector, Timestamp};
use serde::{Deserialize, Serialize};

/// Event emitted by the vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// The registry was populated and sealed.
    Initialized {
        /// Authority that granted.
        who: Address,
        /// Keys granted, in registry order.
        keys: Vec<PermissionKey>,
    },
    /// A payload was forwarded successfully.
    Forwarded {
        /// Submitting identity.
        caller: Address,
        /// Target endpoint.
        target: Address,
        /// Effective opcode.
        opcode: Selector,
        /// New `LastInvocation`.
        at: Timestamp,
    },
}

impl VaultEvent {
    /// Short topic name for logs.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "vault.initialized",
            Self::Forwarded { .. } => "vault.forwarded",
        }
    }
}
