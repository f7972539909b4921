//! # Vault Scenario
//!
//! Deploys a vault on an in-memory host, grants the usual two permissions and
//! replays the offset-smuggling attack against it.
//!
//! Configuration is read from `QC_VAULT_*` environment variables; log level
//! from `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use qc_18_authorized_vault::domain::envelope::{address_word, u256_word, WORD_SIZE};
use qc_18_authorized_vault::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Byte position a fixed-offset reader inspects for the opcode.
const NAIVE_OPCODE_POSITION: usize = 4 + 3 * WORD_SIZE;

/// Envelope whose fixed-offset bytes show `decoy` while the payload pointer
/// leads to `payload`.
fn smuggled_envelope(target: Address, decoy: Selector, payload: &Payload) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    out.extend_from_slice(selectors::execute().as_bytes());
    out.extend_from_slice(&address_word(target));
    // Offset 0x80 skips the zero word and the decoy word.
    out.extend_from_slice(&u256_word(U256::from(4 * WORD_SIZE)));
    out.extend_from_slice(&[0u8; WORD_SIZE]);
    let mut decoy_word = [0u8; WORD_SIZE];
    decoy_word[..4].copy_from_slice(decoy.as_bytes());
    out.extend_from_slice(&decoy_word);
    out.extend_from_slice(&u256_word(U256::from(payload.len())));
    out.extend_from_slice(payload.as_bytes());
    let padding = payload.len().next_multiple_of(WORD_SIZE) - payload.len();
    out.resize(out.len() + padding, 0);
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = VaultConfig::from_env().context("loading vault configuration")?;
    let deployer = config.authority;
    let d = deploy_in_memory(config, SystemClock.now());
    let vault = d.vault.address();

    let player = Address::new([0x11; 20]);
    let recovery = Address::new([0x22; 20]);
    let token = Address::new([0x70; 20]);
    let ledger = d.host.ledger();
    ledger.mint(token, vault, U256::exp10(24));

    d.vault
        .grant(
            deployer,
            vec![
                PermissionKey::derive(selectors::sweep_funds(), deployer, vault),
                PermissionKey::derive(selectors::withdraw(), player, vault),
            ],
        )
        .await?;

    // Legitimate use: one withdrawal once the waiting period is over.
    d.clock.advance(WAITING_PERIOD + 1);
    let envelope = encode(vault, &calls::withdraw(token, player, withdrawal_limit()));
    d.vault.submit(player, envelope.as_slice()).await?;
    info!(balance = %ledger.balance_of(token, player), "Player withdrawal accepted");

    // Attack: show `withdraw` at the fixed position, carry `sweepFunds`.
    let before = ledger.balance_of(token, vault);
    let attack = smuggled_envelope(
        vault,
        selectors::withdraw(),
        &calls::sweep_funds(recovery, token),
    );
    info!(
        naive_opcode = %hex::encode(&attack[NAIVE_OPCODE_POSITION..NAIVE_OPCODE_POSITION + 4]),
        len = attack.len(),
        "Submitting smuggled envelope"
    );

    match d.vault.submit(player, &attack).await {
        Err(VaultError::Authorization(AuthorizationError::CallerNotAllowed { opcode, .. })) => {
            info!(opcode = %opcode, "Smuggled envelope rejected");
        }
        Err(e) => warn!(error = %e, "Smuggled envelope rejected with unexpected error"),
        Ok(_) => {
            error!("Smuggled envelope executed");
            bail!("vault forwarded a payload the caller was not granted");
        }
    }

    let after = ledger.balance_of(token, vault);
    if after != before || ledger.balance_of(token, recovery) != U256::zero() {
        bail!("vault balance changed: {before} -> {after}");
    }

    for event in d.vault.events() {
        info!(topic = event.topic(), event = %serde_json::to_string(&event)?, "Event");
    }
    let stats = d.vault.stats().await;
    info!(
        submitted = stats.submitted,
        forwarded = stats.forwarded,
        rejected = stats.rejected,
        vault_balance = %after,
        "Scenario complete"
    );

    Ok(())
}
