//! # Authorized Vault Service
//!
//! The Executor: the single entry point that drives decoding, authorization
//! and forwarding as one atomic unit.
//!
//! ## Submit Pipeline
//!
//! 1. Require `Configured`, else `NotInitialized`
//! 2. Decode the envelope once into `(target, payload)`
//! 3. Effective opcode = `payload[0..4]`, the bytes the target will see
//! 4. Registry management forwarded to self → `Forbidden`
//! 5. No permission for `(opcode, caller, target)` → `CallerNotAllowed`
//! 6. Forward `payload` verbatim under a host checkpoint; any failure reverts
//! 7. On success, `LastInvocation := now`
//!
//! ## Reentrancy
//!
//! Entry points take `&self`. Registry guards are released before the forward
//! call is awaited, so a target may call `submit` again and observe the same
//! sealed permission set.
//!
//! Forwards run through the host's `ExecutionLane`: top-level forwards (and
//! direct host calls) take turns, nested forwards run inside the outer one.
//! An endpoint must re-enter on its own task: awaiting a `submit` spawned
//! onto another task from inside a forward waits on the outer forward
//! forever.

use crate::adapters::{InMemoryHost, ManualClock, VaultTreasury};
use crate::domain::entities::{ExecutorState, ForwardCall};
use crate::domain::envelope::{self, Envelope};
use crate::domain::invariants::{
    check_call_depth_invariant, check_no_self_escalation, check_opcode_agreement,
    check_sealed_invariant, limits,
};
use crate::domain::permissions::{PermissionKey, PermissionRegistry};
use crate::domain::value_objects::{Address, Bytes, Selector, Timestamp};
use crate::errors::{
    AuthorizationError, ConfigurationError, EndpointError, MalformedReason, VaultError,
};
use crate::events::VaultEvent;
use crate::ports::inbound::VaultApi;
use crate::ports::outbound::{
    EndpointResolver, ExecutionLane, HostRuntime, StateJournal, TimeSource,
};

use async_trait::async_trait;
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Authorized vault configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// The vault's own address (`self` for the escalation guard).
    pub vault_address: Address,
    /// Identity allowed to perform the one-time grant.
    pub authority: Address,
    /// Envelopes above this size are rejected as malformed.
    pub max_envelope_size: usize,
    /// Maximum nested forward depth.
    pub max_call_depth: usize,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            vault_address: Address::new([0x0f; 20]),
            authority: Address::new([0xde; 20]),
            max_envelope_size: limits::MAX_ENVELOPE_SIZE,
            max_call_depth: limits::MAX_CALL_DEPTH,
        }
    }
}

impl VaultConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_VAULT_ADDRESS`: vault address, hex (default: `0x0f0f...`)
    /// - `QC_VAULT_AUTHORITY`: granting authority, hex (default: `0xdede...`)
    /// - `QC_VAULT_MAX_ENVELOPE_BYTES`: envelope size limit (default: 65536)
    /// - `QC_VAULT_MAX_CALL_DEPTH`: nested forward limit (default and
    ///   ceiling: 64)
    ///
    /// # Errors
    ///
    /// `InvalidSetting` if an address variable is set but not a valid address,
    /// or if the call depth is above the ceiling.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        let defaults = Self::default();
        let max_call_depth = env::var("QC_VAULT_MAX_CALL_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_call_depth);
        if max_call_depth > limits::MAX_CALL_DEPTH {
            return Err(ConfigurationError::InvalidSetting {
                key: "QC_VAULT_MAX_CALL_DEPTH".to_string(),
                reason: format!("{max_call_depth} above ceiling {}", limits::MAX_CALL_DEPTH),
            });
        }

        Ok(Self {
            vault_address: address_var("QC_VAULT_ADDRESS")?.unwrap_or(defaults.vault_address),
            authority: address_var("QC_VAULT_AUTHORITY")?.unwrap_or(defaults.authority),
            max_envelope_size: env::var("QC_VAULT_MAX_ENVELOPE_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_envelope_size),
            max_call_depth,
        })
    }
}

fn address_var(key: &str) -> Result<Option<Address>, ConfigurationError> {
    match env::var(key) {
        Ok(value) => Address::from_hex(value.trim()).map(Some).ok_or_else(|| {
            ConfigurationError::InvalidSetting {
                key: key.to_string(),
                reason: format!("not a 20-byte hex address: {value}"),
            }
        }),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Statistics for the vault.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VaultStats {
    /// Total `submit` calls.
    pub submitted: u64,
    /// Successful forwards.
    pub forwarded: u64,
    /// Synchronous rejections (not initialized, malformed, unauthorized).
    pub rejected: u64,
    /// Forwards that failed and were rolled back.
    pub forward_failures: u64,
    /// Failed grant attempts.
    pub grants_rejected: u64,
}

// =============================================================================
// SERVICE
// =============================================================================

/// Configuration flag and registry, guarded together.
struct Core {
    state: ExecutorState,
    registry: PermissionRegistry,
}

/// Executor-owned state that is rolled back with a failed forward.
struct Journal {
    last_invocation: Timestamp,
    events: Vec<VaultEvent>,
}

/// The authorized vault (Executor).
pub struct AuthorizedVaultService<H: HostRuntime> {
    /// Service configuration.
    config: VaultConfig,
    /// Host runtime: endpoints, journal, clock.
    host: Arc<H>,
    /// Lifecycle flag plus permission registry.
    core: RwLock<Core>,
    /// `LastInvocation` and event log.
    journal: parking_lot::Mutex<Journal>,
    /// Service statistics.
    stats: RwLock<VaultStats>,
}

impl<H: HostRuntime> AuthorizedVaultService<H> {
    /// Create an unconfigured vault. `LastInvocation` starts at the host's
    /// current time. `max_call_depth` is capped at
    /// [`limits::MAX_CALL_DEPTH`].
    pub fn new(host: Arc<H>, mut config: VaultConfig) -> Self {
        if config.max_call_depth > limits::MAX_CALL_DEPTH {
            warn!(
                requested = config.max_call_depth,
                ceiling = limits::MAX_CALL_DEPTH,
                "Call depth capped"
            );
            config.max_call_depth = limits::MAX_CALL_DEPTH;
        }
        let deployed_at = host.now();
        info!(
            vault = ?config.vault_address,
            authority = ?config.authority,
            deployed_at = %deployed_at,
            "Authorized vault created"
        );
        Self {
            core: RwLock::new(Core {
                state: ExecutorState::Unconfigured,
                registry: PermissionRegistry::new(config.authority),
            }),
            journal: parking_lot::Mutex::new(Journal {
                last_invocation: deployed_at,
                events: Vec::new(),
            }),
            stats: RwLock::new(VaultStats::default()),
            config,
            host,
        }
    }

    /// The vault's own address.
    pub fn address(&self) -> Address {
        self.config.vault_address
    }

    /// Active configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Host runtime handle.
    pub fn host(&self) -> Arc<H> {
        self.host.clone()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ExecutorState {
        self.core.read().await.state
    }

    /// Granted keys, in registry order.
    pub async fn permissions(&self) -> Vec<PermissionKey> {
        self.core.read().await.registry.keys().copied().collect()
    }

    /// Events recorded so far.
    pub fn events(&self) -> Vec<VaultEvent> {
        self.journal.lock().events.clone()
    }

    /// Get current service statistics.
    pub async fn stats(&self) -> VaultStats {
        self.stats.read().await.clone()
    }

    /// Steps 1-5: everything decided before the forward, under one read guard.
    async fn authorize(&self, caller: Address, raw: &[u8]) -> Result<Envelope, VaultError> {
        let core = self.core.read().await;
        if !core.state.is_configured() {
            return Err(ConfigurationError::NotInitialized.into());
        }
        debug_assert!(check_sealed_invariant(&core.registry));

        if raw.len() > self.config.max_envelope_size {
            return Err(MalformedReason::TooLarge {
                size: raw.len(),
                max: self.config.max_envelope_size,
            }
            .into());
        }

        let decoded = envelope::decode(raw)?;
        let opcode = decoded.opcode();
        debug!(to = ?decoded.target, opcode = %opcode, len = decoded.payload.len(), "Envelope decoded");

        if !check_no_self_escalation(self.address(), decoded.target, opcode) {
            return Err(AuthorizationError::Forbidden { opcode }.into());
        }

        if !core.registry.is_granted(opcode, caller, decoded.target) {
            return Err(AuthorizationError::CallerNotAllowed {
                caller,
                opcode,
                target: decoded.target,
            }
            .into());
        }

        debug_assert!(check_opcode_agreement(opcode, decoded.payload.as_bytes()));
        Ok(decoded)
    }

    /// Steps 6-7: atomic forward of the already-authorized payload.
    async fn forward(&self, caller: Address, decoded: Envelope) -> Result<Bytes, VaultError> {
        let depth = ExecutionLane::current_depth() + 1;
        let max = self.config.max_call_depth;
        if !check_call_depth_invariant(depth, max) {
            return Err(EndpointError::CallDepthExceeded { depth, max }.into());
        }
        let _lane = self.host.lane().enter().await;

        let target = decoded.target;
        let opcode: Selector = decoded.opcode();
        let endpoint = self
            .host
            .resolve(target)
            .ok_or(EndpointError::NoEndpoint(target))?;

        let (saved_invocation, saved_events) = {
            let journal = self.journal.lock();
            (journal.last_invocation, journal.events.len())
        };
        let checkpoint = self.host.checkpoint();

        let call = ForwardCall {
            sender: self.address(),
            origin: caller,
            target,
            payload: decoded.payload,
            depth,
        };

        match ExecutionLane::at_depth(depth, endpoint.invoke(call)).await {
            Ok(output) => {
                self.host.commit(checkpoint);
                let now = self.host.now();
                {
                    let mut journal = self.journal.lock();
                    journal.last_invocation = now;
                    journal.events.push(VaultEvent::Forwarded {
                        caller,
                        target,
                        opcode,
                        at: now,
                    });
                }
                info!(to = ?target, opcode = %opcode, depth, "Payload forwarded");
                Ok(output)
            }
            Err(e) => {
                self.host.revert_to(checkpoint);
                {
                    let mut journal = self.journal.lock();
                    journal.last_invocation = saved_invocation;
                    journal.events.truncate(saved_events);
                }
                error!(to = ?target, opcode = %opcode, error = %e, "Forward failed, state reverted");
                Err(e.into())
            }
        }
    }

    #[instrument(skip(self, envelope), fields(size = envelope.len()))]
    async fn submit_internal(&self, caller: Address, envelope: &[u8]) -> Result<Bytes, VaultError> {
        let result = match self.authorize(caller, envelope).await {
            Ok(decoded) => self.forward(caller, decoded).await,
            Err(e) => {
                warn!(error = %e, kind = e.kind(), "Submit rejected");
                Err(e)
            }
        };

        let mut stats = self.stats.write().await;
        stats.submitted += 1;
        match &result {
            Ok(_) => stats.forwarded += 1,
            Err(e) if e.is_rejection() => stats.rejected += 1,
            Err(_) => stats.forward_failures += 1,
        }
        result
    }

    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    async fn grant_internal(
        &self,
        caller: Address,
        keys: Vec<PermissionKey>,
    ) -> Result<usize, VaultError> {
        let mut core = self.core.write().await;
        let result = core.registry.grant(caller, keys);
        match result {
            Ok(granted) => {
                core.state = ExecutorState::Configured;
                let keys = core.registry.keys().copied().collect();
                self.journal
                    .lock()
                    .events
                    .push(VaultEvent::Initialized { who: caller, keys });
                info!(granted, "Permissions granted, registry sealed");
                Ok(granted)
            }
            Err(e) => {
                drop(core);
                warn!(error = %e, "Grant rejected");
                self.stats.write().await.grants_rejected += 1;
                Err(e)
            }
        }
    }
}

// =============================================================================
// VaultApi Implementation
// =============================================================================

#[async_trait]
impl<H: HostRuntime + 'static> VaultApi for AuthorizedVaultService<H> {
    async fn submit(&self, caller: Address, envelope: &[u8]) -> Result<Bytes, VaultError> {
        self.submit_internal(caller, envelope).await
    }

    async fn grant(&self, caller: Address, keys: Vec<PermissionKey>) -> Result<usize, VaultError> {
        self.grant_internal(caller, keys).await
    }

    async fn is_granted(&self, opcode: Selector, caller: Address, target: Address) -> bool {
        self.core.read().await.registry.is_granted(opcode, caller, target)
    }

    async fn last_invocation(&self) -> Timestamp {
        self.journal.lock().last_invocation
    }
}

// =============================================================================
// IN-MEMORY DEPLOYMENT
// =============================================================================

/// A vault deployed on an in-memory host, with its treasury at the vault
/// address.
pub struct InMemoryDeployment {
    /// The executor.
    pub vault: Arc<AuthorizedVaultService<InMemoryHost>>,
    /// Host runtime.
    pub host: Arc<InMemoryHost>,
    /// Clock driving the host.
    pub clock: Arc<ManualClock>,
}

/// Deploy a vault and its treasury on a fresh in-memory host.
#[must_use]
pub fn deploy_in_memory(config: VaultConfig, start: Timestamp) -> InMemoryDeployment {
    let (host, clock) = InMemoryHost::with_manual_clock(start);
    let host = Arc::new(host);
    let treasury = VaultTreasury::new(config.vault_address, host.ledger(), host.clock());
    host.deploy(config.vault_address, Arc::new(treasury));
    let vault = Arc::new(AuthorizedVaultService::new(host.clone(), config));
    InMemoryDeployment { vault, host, clock }
}

/// Create a default deployment (for testing).
#[must_use]
pub fn create_test_vault() -> InMemoryDeployment {
    deploy_in_memory(VaultConfig::default(), Timestamp::from_secs(1_700_000_000))
}

// =============================================================================
// TESTS
// =============================================================================
