//! # Driving Ports (API - Inbound)
//!
//! The interface exposed by the vault to callers and to its deploying
//! authority.

use crate::domain::permissions::PermissionKey;
use crate::domain::value_objects::{Address, Bytes, Selector, Timestamp};
use crate::errors::VaultError;
use async_trait::async_trait;

/// Primary API of the authorized vault.
///
/// ## Usage
///
/// ```ignore
/// vault.grant(deployer, vec![key_a, key_b]).await?;
/// let output = vault.submit(player, envelope.as_slice()).await?;
/// ```
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Decode `envelope`, authorize `(opcode, caller, target)` and forward the
    /// payload to `target` as one atomic unit.
    ///
    /// # Returns
    ///
    /// * `Bytes` - Return data of the forwarded call
    async fn submit(&self, caller: Address, envelope: &[u8]) -> Result<Bytes, VaultError>;

    /// Grant permission keys once, sealing the registry.
    ///
    /// # Returns
    ///
    /// * `usize` - Number of distinct keys now granted
    async fn grant(&self, caller: Address, keys: Vec<PermissionKey>) -> Result<usize, VaultError>;

    /// Read-only permission lookup.
    async fn is_granted(&self, opcode: Selector, caller: Address, target: Address) -> bool;

    /// Timestamp of the most recent successful forward.
    async fn last_invocation(&self) -> Timestamp;
}
