//! # Permission Registry
//!
//! The set of granted (opcode, caller, target) triples.
//!
//! ## Lifecycle
//!
//! ```text
//! Open ──grant(authority, keys)──→ Sealed
//! ```
//!
//! The registry is writable exactly once, by its authority. The first
//! successful grant seals it; every later grant fails with
//! `AlreadyInitialized` and leaves the contents untouched.

use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Hash, Selector};
use crate::errors::{AuthorizationError, ConfigurationError, VaultError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// PERMISSION KEY
// =============================================================================

/// Derived identity of an (opcode, caller, target) triple.
///
/// `keccak256(opcode[4] ++ caller[20] ++ target[20])`. The preimage is a
/// fixed-width concatenation, so distinct triples never share a preimage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionKey(Hash);

impl PermissionKey {
    /// Packed preimage size.
    pub const PREIMAGE_SIZE: usize = 4 + 20 + 20;

    /// Derives the key for a triple.
    #[must_use]
    pub fn derive(opcode: Selector, caller: Address, target: Address) -> Self {
        let mut preimage = [0u8; Self::PREIMAGE_SIZE];
        preimage[..4].copy_from_slice(opcode.as_bytes());
        preimage[4..24].copy_from_slice(caller.as_bytes());
        preimage[24..].copy_from_slice(target.as_bytes());
        Self(keccak256(&preimage))
    }

    /// Returns the underlying digest.
    #[must_use]
    pub const fn as_hash(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Debug for PermissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionKey({})", self.0)
    }
}

impl From<Hash> for PermissionKey {
    fn from(hash: Hash) -> Self {
        Self(hash)
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Whether the registry still accepts grants.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum RegistryState {
    /// Accepting the one-time grant.
    #[default]
    Open,
    /// Immutable for the rest of the system's life.
    Sealed,
}

/// Granted permission keys plus the authority allowed to write them.
#[derive(Clone, Debug)]
pub struct PermissionRegistry {
    authority: Address,
    state: RegistryState,
    keys: BTreeSet<PermissionKey>,
}

impl PermissionRegistry {
    /// Creates an open, empty registry.
    #[must_use]
    pub fn new(authority: Address) -> Self {
        Self {
            authority,
            state: RegistryState::Open,
            keys: BTreeSet::new(),
        }
    }

    /// Grants `keys` and seals the registry.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` if sealed (checked first).
    /// - `CallerNotAllowed` if `by` is not the authority.
    pub fn grant<I>(&mut self, by: Address, keys: I) -> Result<usize, VaultError>
    where
        I: IntoIterator<Item = PermissionKey>,
    {
        if self.is_sealed() {
            return Err(ConfigurationError::AlreadyInitialized.into());
        }
        if by != self.authority {
            return Err(AuthorizationError::CallerNotAllowed {
                caller: by,
                opcode: crate::domain::services::selectors::set_permissions(),
                target: Address::ZERO,
            }
            .into());
        }

        self.keys.extend(keys);
        self.state = RegistryState::Sealed;
        Ok(self.keys.len())
    }

    /// Pure lookup of a triple.
    #[must_use]
    pub fn is_granted(&self, opcode: Selector, caller: Address, target: Address) -> bool {
        self.contains(&PermissionKey::derive(opcode, caller, target))
    }

    /// Pure lookup of a pre-derived key.
    #[must_use]
    pub fn contains(&self, key: &PermissionKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns true once the grant has happened.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state == RegistryState::Sealed
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RegistryState {
        self.state
    }

    /// The address allowed to grant.
    #[must_use]
    pub fn authority(&self) -> Address {
        self.authority
    }

    /// Number of granted keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if nothing has been granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterates granted keys in a stable order.
    pub fn keys(&self) -> impl Iterator<Item = &PermissionKey> {
        self.keys.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================
