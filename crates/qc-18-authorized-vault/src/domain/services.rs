//! # Domain Services
//!
//! Pure hashing and selector derivation.
//! These functions are deterministic and have no side effects.

use crate::domain::value_objects::{Hash, Selector};
use sha3::{Digest, Keccak256};

// =============================================================================
// KECCAK256 UTILITY
// =============================================================================

/// Computes keccak256 hash of data.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    let hash = Keccak256::digest(data);
    Hash::new(hash.into())
}

/// Derives the 4-byte selector of a canonical function signature,
/// e.g. `"withdraw(address,address,uint256)"`.
#[must_use]
pub fn selector_of(signature: &str) -> Selector {
    let hash = keccak256(signature.as_bytes());
    let mut sel = [0u8; 4];
    sel.copy_from_slice(&hash.as_bytes()[..4]);
    Selector::new(sel)
}

// =============================================================================
// WELL-KNOWN SELECTORS
// =============================================================================

/// Operation codes the vault itself understands.
pub mod selectors {
    use super::selector_of;
    use crate::domain::value_objects::Selector;

    /// Signature of the envelope entry point.
    pub const EXECUTE_SIGNATURE: &str = "execute(address,bytes)";

    /// Signature of the registry-management operation.
    pub const SET_PERMISSIONS_SIGNATURE: &str = "setPermissions(bytes32[])";

    /// Signature of the rate-limited treasury withdrawal.
    pub const WITHDRAW_SIGNATURE: &str = "withdraw(address,address,uint256)";

    /// Signature of the full-balance treasury sweep.
    pub const SWEEP_FUNDS_SIGNATURE: &str = "sweepFunds(address,address)";

    /// Signature of the treasury timestamp getter.
    pub const LAST_WITHDRAWAL_SIGNATURE: &str = "getLastWithdrawalTimestamp()";

    /// Leading selector of every envelope.
    #[must_use]
    pub fn execute() -> Selector {
        selector_of(EXECUTE_SIGNATURE)
    }

    /// Registry-management opcode. Never reachable through forwarding to self.
    #[must_use]
    pub fn set_permissions() -> Selector {
        selector_of(SET_PERMISSIONS_SIGNATURE)
    }

    /// `withdraw(address,address,uint256)`.
    #[must_use]
    pub fn withdraw() -> Selector {
        selector_of(WITHDRAW_SIGNATURE)
    }

    /// `sweepFunds(address,address)`.
    #[must_use]
    pub fn sweep_funds() -> Selector {
        selector_of(SWEEP_FUNDS_SIGNATURE)
    }

    /// `getLastWithdrawalTimestamp()`.
    #[must_use]
    pub fn last_withdrawal_timestamp() -> Selector {
        selector_of(LAST_WITHDRAWAL_SIGNATURE)
    }
}

// =============================================================================
// TESTS
// =============================================================================
