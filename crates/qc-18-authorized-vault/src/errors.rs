//! # Error Types
//!
//! All error types for the authorized vault.
//!
//! Every error is a hard stop: it surfaces synchronously to the caller and
//! leaves the registry, `LastInvocation` and target state untouched.

use crate::domain::value_objects::{Address, Selector, U256};
use thiserror::Error;

// =============================================================================
// CONFIGURATION ERRORS
// =============================================================================

/// Errors tied to the configure-once lifecycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// `submit` called before permissions were granted.
    #[error("vault not initialized")]
    NotInitialized,

    /// `grant` called after the registry was sealed.
    #[error("vault already initialized")]
    AlreadyInitialized,

    /// A configuration value could not be parsed.
    #[error("invalid setting {key}: {reason}")]
    InvalidSetting {
        /// Environment variable or field name.
        key: String,
        /// What was wrong with the value.
        reason: String,
    },
}

// =============================================================================
// ENCODING ERRORS
// =============================================================================

/// Why an envelope was rejected by the codec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Shorter than the entry selector plus both head words.
    #[error("envelope too short")]
    TooShort,
    /// Leading four bytes are not the entry selector.
    #[error("unknown entry selector {0}")]
    UnknownEntry(Selector),
    /// High 12 bytes of the target word are not zero.
    #[error("dirty high bytes in target word")]
    DirtyAddress,
    /// Header pointer does not land inside the envelope.
    #[error("payload offset out of bounds")]
    OffsetOutOfBounds,
    /// Fewer than 32 bytes left for the length word.
    #[error("truncated length word")]
    TruncatedLength,
    /// Declared payload length runs past the end of the envelope.
    #[error("payload length out of bounds")]
    PayloadOutOfBounds,
    /// Payload shorter than four bytes, so no opcode.
    #[error("payload shorter than 4 bytes")]
    MissingOpcode,
    /// Envelope exceeds the configured size limit.
    #[error("envelope too large: {size} > {max} bytes")]
    TooLarge {
        /// Envelope length in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

/// Errors from the envelope codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// The envelope could not be decoded.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(MalformedReason),
}

// =============================================================================
// AUTHORIZATION ERRORS
// =============================================================================

/// Errors from the permission check.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No permission exists for the (opcode, caller, target) triple.
    #[error("caller {caller:?} not allowed to run {opcode} on {target:?}")]
    CallerNotAllowed {
        /// Account that submitted the envelope.
        caller: Address,
        /// Opcode taken from the decoded payload.
        opcode: Selector,
        /// Decoded forward target.
        target: Address,
    },

    /// Registry management attempted through the forwarding path.
    #[error("opcode {opcode} is forbidden on the vault itself")]
    Forbidden {
        /// The rejected opcode.
        opcode: Selector,
    },
}

// =============================================================================
// ENDPOINT ERRORS
// =============================================================================

/// Failures raised inside (or while reaching) a target endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    /// No endpoint is deployed at the target address.
    #[error("no endpoint at {0:?}")]
    NoEndpoint(Address),

    /// Nested forwards exceeded the configured depth.
    #[error("call depth exceeded: {depth} > {max}")]
    CallDepthExceeded {
        /// Depth the forward would have run at.
        depth: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Endpoint refused the sender.
    #[error("caller {0:?} not allowed")]
    CallerNotAllowed(Address),

    /// Endpoint does not implement the opcode.
    #[error("unknown operation {0}")]
    UnknownOperation(Selector),

    /// Argument words could not be decoded.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Withdrawal above the per-call limit.
    #[error("invalid withdrawal amount {amount} (limit {limit})")]
    InvalidWithdrawalAmount {
        /// Requested amount.
        amount: U256,
        /// Per-call limit.
        limit: U256,
    },

    /// Withdrawal attempted before the waiting period elapsed.
    #[error("withdrawal waiting period not ended")]
    WithdrawalWaitingPeriodNotEnded,

    /// Not enough tokens to move.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount to move.
        required: U256,
        /// Holder's balance.
        available: U256,
    },

    /// Generic revert with a reason.
    #[error("reverted: {0}")]
    Reverted(String),
}

// =============================================================================
// EXECUTION ERRORS
// =============================================================================

/// Errors from the forward call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The forwarded call failed and was rolled back.
    #[error("forward failed: {0}")]
    ForwardFailed(#[source] EndpointError),
}

// =============================================================================
// VAULT ERROR
// =============================================================================

/// Top-level error returned by every vault entry point.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// Lifecycle or configuration failure.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Envelope rejected by the codec.
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    /// Permission check failed.
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    /// Forward ran and was rolled back.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl VaultError {
    /// Returns true for the synchronous rejections raised before forwarding.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::Configuration(ConfigurationError::NotInitialized)
                | Self::Encoding(EncodingError::MalformedEnvelope(_))
                | Self::Authorization(_)
        )
    }

    /// Stable label for logs and statistics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(ConfigurationError::NotInitialized) => "not_initialized",
            Self::Configuration(ConfigurationError::AlreadyInitialized) => "already_initialized",
            Self::Configuration(ConfigurationError::InvalidSetting { .. }) => "invalid_setting",
            Self::Encoding(_) => "malformed_envelope",
            Self::Authorization(AuthorizationError::CallerNotAllowed { .. }) => {
                "caller_not_allowed"
            }
            Self::Authorization(AuthorizationError::Forbidden { .. }) => "forbidden",
            Self::Execution(_) => "forward_failed",
        }
    }
}

impl From<MalformedReason> for VaultError {
    fn from(reason: MalformedReason) -> Self {
        Self::Encoding(EncodingError::MalformedEnvelope(reason))
    }
}

impl From<EndpointError> for VaultError {
    fn from(err: EndpointError) -> Self {
        Self::Execution(ExecutionError::ForwardFailed(err))
    }
}

// =============================================================================
// TESTS
// =============================================================================
