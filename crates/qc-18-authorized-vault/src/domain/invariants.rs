//! # Domain Invariants
//!
//! Invariants that MUST hold before the vault forwards a payload.
//!
//! - INVARIANT-1: Single Decoder (checked opcode == forwarded opcode)
//! - INVARIANT-2: No Self-Escalation (registry management never forwarded to self)
//! - INVARIANT-3: Sealed Before Serving (permissions fixed before any forward)
//! - INVARIANT-4: Call Depth Limit

use crate::domain::permissions::PermissionRegistry;
use crate::domain::services::selectors;
use crate::domain::value_objects::{Address, Selector};

// =============================================================================
// INVARIANT CHECKS
// =============================================================================

/// INVARIANT-1: Single Decoder
///
/// The opcode used for the permission check is byte 0..4 of the exact bytes
/// handed to the target.
#[must_use]
pub fn check_opcode_agreement(checked: Selector, forwarded: &[u8]) -> bool {
    Selector::from_prefix(forwarded) == Some(checked)
}

/// INVARIANT-2: No Self-Escalation
///
/// Registry management is reachable only through the dedicated grant entry.
#[must_use]
pub fn check_no_self_escalation(vault: Address, target: Address, opcode: Selector) -> bool {
    !(target == vault && opcode == selectors::set_permissions())
}

/// INVARIANT-3: Sealed Before Serving
#[must_use]
pub fn check_sealed_invariant(registry: &PermissionRegistry) -> bool {
    registry.is_sealed()
}

/// INVARIANT-4: Call Depth Limit
#[must_use]
pub fn check_call_depth_invariant(depth: usize, max: usize) -> bool {
    depth <= max
}

// =============================================================================
// LIMIT CONSTANTS
// =============================================================================

/// Default execution limits.
pub mod limits {
    /// Maximum nested forward depth. Each level holds a chain of boxed
    /// futures on the stack; deeper chains overflow a 2 MiB worker stack.
    pub const MAX_CALL_DEPTH: usize = 64;

    /// Maximum accepted envelope size in bytes.
    pub const MAX_ENVELOPE_SIZE: usize = 64 * 1024; // 64 KB
}

// =============================================================================
// TESTS
// =============================================================================
