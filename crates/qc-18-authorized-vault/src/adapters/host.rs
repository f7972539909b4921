//! # Host Adapter
//!
//! In-memory host runtime: endpoint directory, journaled token ledger and
//! clocks. Production hosts would back these with chain state.

use crate::domain::entities::ForwardCall;
use crate::domain::envelope::Payload;
use crate::domain::value_objects::{Address, Bytes, Timestamp, U256};
use crate::errors::EndpointError;
use crate::ports::outbound::{
    CallableEndpoint, Checkpoint, EndpointResolver, ExecutionLane, StateJournal, TimeSource,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

// =============================================================================
// LEDGER
// =============================================================================

/// Token balances and per-account timestamps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerState {
    /// `(token, holder) -> balance`.
    balances: BTreeMap<(Address, Address), U256>,
    /// Per-account bookkeeping timestamps.
    timestamps: BTreeMap<Address, Timestamp>,
}

/// Journaled ledger. All endpoint state lives here so rollback covers it.
///
/// Writes made outside a lane-holding call (setup minting, for instance) are
/// not isolated from a concurrent revert.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<LedgerState>,
    journal: Mutex<Vec<LedgerState>>,
    lane: ExecutionLane,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of `holder` in `token`.
    #[must_use]
    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.state
            .read()
            .balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    /// Credit `amount` of `token` to `holder`.
    pub fn mint(&self, token: Address, holder: Address, amount: U256) {
        let mut state = self.state.write();
        let balance = state.balances.entry((token, holder)).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Move `amount` of `token` from `from` to `to`.
    pub fn transfer(
        &self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), EndpointError> {
        let mut state = self.state.write();
        let available = state
            .balances
            .get(&(token, from))
            .copied()
            .unwrap_or_default();
        if available < amount {
            return Err(EndpointError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        state.balances.insert((token, from), available - amount);
        let credit = state.balances.entry((token, to)).or_default();
        *credit = credit.saturating_add(amount);
        Ok(())
    }

    /// Bookkeeping timestamp stored for `account`.
    #[must_use]
    pub fn timestamp(&self, account: Address) -> Timestamp {
        self.state
            .read()
            .timestamps
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    /// Store a bookkeeping timestamp for `account`.
    pub fn set_timestamp(&self, account: Address, at: Timestamp) {
        self.state.write().timestamps.insert(account, at);
    }

    /// Copy of the current state, for comparisons.
    #[must_use]
    pub fn snapshot(&self) -> LedgerState {
        self.state.read().clone()
    }
}

impl StateJournal for InMemoryLedger {
    fn lane(&self) -> &ExecutionLane {
        &self.lane
    }

    fn checkpoint(&self) -> Checkpoint {
        let snapshot = self.state.read().clone();
        let mut journal = self.journal.lock();
        journal.push(snapshot);
        Checkpoint(journal.len() - 1)
    }

    fn commit(&self, checkpoint: Checkpoint) {
        self.journal.lock().truncate(checkpoint.0);
    }

    fn revert_to(&self, checkpoint: Checkpoint) {
        let mut journal = self.journal.lock();
        if let Some(snapshot) = journal.get(checkpoint.0).cloned() {
            *self.state.write() = snapshot;
        }
        journal.truncate(checkpoint.0);
    }
}

// =============================================================================
// CLOCKS
// =============================================================================

/// Clock advanced explicitly. Deterministic; used by tests and scenarios.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Create a clock at `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self(AtomicU64::new(start.as_secs()))
    }

    /// Jump to `at`.
    pub fn set(&self, at: Timestamp) {
        self.0.store(at.as_secs(), Ordering::SeqCst);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(self.0.load(Ordering::SeqCst))
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Timestamp::from_secs(secs)
    }
}

// =============================================================================
// HOST
// =============================================================================

/// In-memory host runtime.
pub struct InMemoryHost {
    endpoints: RwLock<HashMap<Address, Arc<dyn CallableEndpoint>>>,
    ledger: Arc<InMemoryLedger>,
    clock: Arc<dyn TimeSource>,
}

impl InMemoryHost {
    /// Create a host with an empty ledger and the given clock.
    #[must_use]
    pub fn new(clock: Arc<dyn TimeSource>) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            ledger: Arc::new(InMemoryLedger::new()),
            clock,
        }
    }

    /// Create a host driven by a fresh [`ManualClock`], returning both.
    #[must_use]
    pub fn with_manual_clock(start: Timestamp) -> (Self, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (Self::new(clock.clone()), clock)
    }

    /// Shared ledger handle.
    #[must_use]
    pub fn ledger(&self) -> Arc<InMemoryLedger> {
        self.ledger.clone()
    }

    /// Shared clock handle.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn TimeSource> {
        self.clock.clone()
    }

    /// Place `endpoint` at `address`, replacing anything already there.
    pub fn deploy(&self, address: Address, endpoint: Arc<dyn CallableEndpoint>) {
        self.endpoints.write().insert(address, endpoint);
    }

    /// Call an endpoint directly, outside the vault, with the same
    /// all-or-nothing semantics. Shares the execution lane with the vault.
    pub async fn call(
        &self,
        sender: Address,
        target: Address,
        payload: Payload,
    ) -> Result<Bytes, EndpointError> {
        let depth = ExecutionLane::current_depth() + 1;
        let _lane = self.lane().enter().await;
        let endpoint = self
            .resolve(target)
            .ok_or(EndpointError::NoEndpoint(target))?;

        let mut call = ForwardCall::direct(sender, target, payload);
        call.depth = depth;
        let checkpoint = self.checkpoint();
        match ExecutionLane::at_depth(depth, endpoint.invoke(call)).await {
            Ok(output) => {
                self.commit(checkpoint);
                Ok(output)
            }
            Err(e) => {
                self.revert_to(checkpoint);
                Err(e)
            }
        }
    }
}

impl EndpointResolver for InMemoryHost {
    fn resolve(&self, target: Address) -> Option<Arc<dyn CallableEndpoint>> {
        self.endpoints.read().get(&target).cloned()
    }
}

impl StateJournal for InMemoryHost {
    fn lane(&self) -> &ExecutionLane {
        self.ledger.lane()
    }

    fn checkpoint(&self) -> Checkpoint {
        self.ledger.checkpoint()
    }

    fn commit(&self, checkpoint: Checkpoint) {
        self.ledger.commit(checkpoint);
    }

    fn revert_to(&self, checkpoint: Checkpoint) {
        self.ledger.revert_to(checkpoint);
    }
}

impl TimeSource for InMemoryHost {
    fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

// =============================================================================
// TESTS
// =============================================================================
