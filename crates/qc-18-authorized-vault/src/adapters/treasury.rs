//! # Vault Treasury
//!
//! The vault's own token operations, deployed at the vault address.
//!
//! Mutating operations only accept calls whose sender is the vault itself,
//! so the only way to reach them is an authorized forward through `submit`.
//!
//! | Opcode | Operation | Sender |
//! |--------|-----------|--------|
//! | `0xd9caed12` | `withdraw(token, recipient, amount)` | vault only |
//! | `0x85fb709d` | `sweepFunds(receiver, token)` | vault only |
//! | `getLastWithdrawalTimestamp()` | read treasury timestamp | anyone |

use crate::adapters::host::InMemoryLedger;
use crate::domain::entities::ForwardCall;
use crate::domain::envelope::{read_address_word, read_u256_word, u256_word, WORD_SIZE};
use crate::domain::services::selectors;
use crate::domain::value_objects::{Address, Bytes, Timestamp, U256};
use crate::errors::EndpointError;
use crate::ports::outbound::{CallableEndpoint, TimeSource};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Seconds that must pass between two withdrawals (15 days).
pub const WAITING_PERIOD: u64 = 15 * 24 * 60 * 60;

/// Maximum amount per withdrawal (1 token with 18 decimals).
#[must_use]
pub fn withdrawal_limit() -> U256 {
    U256::exp10(18)
}

/// Token operations owned by the vault.
pub struct VaultTreasury {
    vault: Address,
    ledger: Arc<InMemoryLedger>,
    clock: Arc<dyn TimeSource>,
}

impl VaultTreasury {
    /// Create the treasury for `vault`, stamping the deploy time as the last
    /// withdrawal.
    #[must_use]
    pub fn new(vault: Address, ledger: Arc<InMemoryLedger>, clock: Arc<dyn TimeSource>) -> Self {
        ledger.set_timestamp(vault, clock.now());
        Self {
            vault,
            ledger,
            clock,
        }
    }

    /// Timestamp of the last withdrawal (deploy time until the first one).
    #[must_use]
    pub fn last_withdrawal(&self) -> Timestamp {
        self.ledger.timestamp(self.vault)
    }

    fn only_vault(&self, call: &ForwardCall) -> Result<(), EndpointError> {
        if call.sender == self.vault {
            Ok(())
        } else {
            Err(EndpointError::CallerNotAllowed(call.sender))
        }
    }

    fn withdraw(&self, args: &[u8]) -> Result<Bytes, EndpointError> {
        let token = address_arg(args, 0)?;
        let recipient = address_arg(args, 1)?;
        let amount = u256_arg(args, 2)?;

        let limit = withdrawal_limit();
        if amount > limit {
            return Err(EndpointError::InvalidWithdrawalAmount { amount, limit });
        }

        let now = self.clock.now();
        if now <= self.last_withdrawal().saturating_add(WAITING_PERIOD) {
            return Err(EndpointError::WithdrawalWaitingPeriodNotEnded);
        }

        self.ledger.set_timestamp(self.vault, now);
        self.ledger.transfer(token, self.vault, recipient, amount)?;
        info!(token = ?token, recipient = ?recipient, %amount, "Treasury withdrawal");
        Ok(Bytes::new())
    }

    fn sweep_funds(&self, args: &[u8]) -> Result<Bytes, EndpointError> {
        let receiver = address_arg(args, 0)?;
        let token = address_arg(args, 1)?;

        let balance = self.ledger.balance_of(token, self.vault);
        self.ledger.transfer(token, self.vault, receiver, balance)?;
        info!(token = ?token, receiver = ?receiver, %balance, "Treasury swept");
        Ok(Bytes::new())
    }
}

#[async_trait]
impl CallableEndpoint for VaultTreasury {
    async fn invoke(&self, call: ForwardCall) -> Result<Bytes, EndpointError> {
        let opcode = call.opcode();
        debug!(opcode = %opcode, sender = ?call.sender, "Treasury call");

        if opcode == selectors::withdraw() {
            self.only_vault(&call)?;
            self.withdraw(call.arguments())
        } else if opcode == selectors::sweep_funds() {
            self.only_vault(&call)?;
            self.sweep_funds(call.arguments())
        } else if opcode == selectors::last_withdrawal_timestamp() {
            let ts = U256::from(self.last_withdrawal().as_secs());
            Ok(Bytes::from(u256_word(ts).to_vec()))
        } else {
            Err(EndpointError::UnknownOperation(opcode))
        }
    }
}

fn address_arg(args: &[u8], index: usize) -> Result<Address, EndpointError> {
    read_address_word(args, index * WORD_SIZE)
        .map_err(|reason| EndpointError::InvalidArguments(format!("arg {index}: {reason}")))
}

fn u256_arg(args: &[u8], index: usize) -> Result<U256, EndpointError> {
    read_u256_word(args, index * WORD_SIZE)
        .ok_or_else(|| EndpointError::InvalidArguments(format!("arg {index}: missing word")))
}

// =============================================================================
// ARGUMENT ENCODING
// =============================================================================

/// Payload builders for treasury operations.
pub mod calls {
    use crate::domain::envelope::{address_word, u256_word, Payload};
    use crate::domain::services::selectors;
    use crate::domain::value_objects::{Address, U256};

    /// `withdraw(token, recipient, amount)`.
    #[must_use]
    pub fn withdraw(token: Address, recipient: Address, amount: U256) -> Payload {
        let mut args = Vec::with_capacity(96);
        args.extend_from_slice(&address_word(token));
        args.extend_from_slice(&address_word(recipient));
        args.extend_from_slice(&u256_word(amount));
        Payload::with_args(selectors::withdraw(), &args)
    }

    /// `sweepFunds(receiver, token)`.
    #[must_use]
    pub fn sweep_funds(receiver: Address, token: Address) -> Payload {
        let mut args = Vec::with_capacity(64);
        args.extend_from_slice(&address_word(receiver));
        args.extend_from_slice(&address_word(token));
        Payload::with_args(selectors::sweep_funds(), &args)
    }

    /// `getLastWithdrawalTimestamp()`.
    #[must_use]
    pub fn last_withdrawal_timestamp() -> Payload {
        Payload::with_args(selectors::last_withdrawal_timestamp(), &[])
    }
}

// =============================================================================
// TESTS
// =============================================================================
