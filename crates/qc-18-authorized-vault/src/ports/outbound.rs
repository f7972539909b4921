//! # Driven Ports (SPI - Outbound)
//!
//! Interfaces the vault depends on. The host runtime implements these to
//! provide:
//! - Target endpoints (arbitrary callable operations)
//! - Atomic execution with full rollback
//! - A time source for `LastInvocation`

use crate::domain::entities::ForwardCall;
use crate::domain::value_objects::{Address, Bytes, Timestamp};
use crate::errors::EndpointError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

// =============================================================================
// CALLABLE ENDPOINT
// =============================================================================

/// Any target the vault can forward a payload to.
///
/// The vault knows nothing about target semantics beyond byte forwarding.
/// Implementations may call back into the vault before returning.
#[async_trait]
pub trait CallableEndpoint: Send + Sync {
    /// Execute the call.
    ///
    /// # Returns
    ///
    /// * `Ok(Bytes)` - Return data
    /// * `Err(EndpointError)` - Failure; the host rolls back all effects
    async fn invoke(&self, call: ForwardCall) -> Result<Bytes, EndpointError>;
}

// =============================================================================
// ENDPOINT RESOLVER
// =============================================================================

/// Maps target addresses to deployed endpoints.
pub trait EndpointResolver: Send + Sync {
    /// Returns the endpoint at `target`, or None if nothing is deployed there.
    fn resolve(&self, target: Address) -> Option<Arc<dyn CallableEndpoint>>;
}

// =============================================================================
// STATE JOURNAL
// =============================================================================

/// Opaque handle to a journal position.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Checkpoint(pub usize);

/// Snapshot/rollback over host state.
///
/// Checkpoints nest: a checkpoint taken inside another must be committed or
/// reverted before the outer one. Every journal user enters the
/// [`ExecutionLane`] first so that top-level checkpoints never interleave.
pub trait StateJournal: Send + Sync {
    /// Lane serializing top-level executions against this journal.
    fn lane(&self) -> &ExecutionLane;

    /// Record the current state.
    fn checkpoint(&self) -> Checkpoint;

    /// Keep all changes made since `checkpoint`.
    fn commit(&self, checkpoint: Checkpoint);

    /// Discard all changes made since `checkpoint`.
    fn revert_to(&self, checkpoint: Checkpoint);
}

// =============================================================================
// EXECUTION LANE
// =============================================================================

tokio::task_local! {
    /// Depth of the call currently executing on this task.
    static CALL_DEPTH: usize;
}

/// One-at-a-time gate for top-level executions.
///
/// Depth is tracked per task. A call at depth 0 holds the lane until it
/// commits or reverts; calls nested inside it on the same task (reentrancy)
/// run without taking the lane again. Awaiting, from inside a call, work
/// spawned onto another task that enters the same lane never completes.
#[derive(Debug, Default)]
pub struct ExecutionLane {
    lock: Mutex<()>,
}

impl ExecutionLane {
    /// Create an idle lane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Depth of the call running on this task, 0 outside any call.
    #[must_use]
    pub fn current_depth() -> usize {
        CALL_DEPTH.try_with(|depth| *depth).unwrap_or(0)
    }

    /// Enter the lane. Top-level callers wait for exclusive access; nested
    /// callers get `None` and run inside the holder.
    pub async fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        if Self::current_depth() == 0 {
            Some(self.lock.lock().await)
        } else {
            None
        }
    }

    /// Run `call` at `depth`, so anything it re-enters sees `depth + 1`.
    pub async fn at_depth<F: Future>(depth: usize, call: F) -> F::Output {
        CALL_DEPTH.scope(depth, call).await
    }
}

// =============================================================================
// TIME SOURCE
// =============================================================================

/// Monotonic or approximate wall clock.
pub trait TimeSource: Send + Sync {
    /// Current time.
    fn now(&self) -> Timestamp;
}

// =============================================================================
// HOST RUNTIME
// =============================================================================

/// Everything the vault needs from its host.
pub trait HostRuntime: EndpointResolver + StateJournal + TimeSource {}

impl<T> HostRuntime for T where T: EndpointResolver + StateJournal + TimeSource {}
