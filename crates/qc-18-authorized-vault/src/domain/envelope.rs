//! # Envelope Codec
//!
//! Encodes and decodes the binary request envelope submitted to the vault.
//!
//! ## Wire Layout
//!
//! ```text
//! offset      size  field
//! 0           4     entry selector, keccak256("execute(address,bytes)")[0..4]
//! 4           32    target word (12 zero bytes ++ 20-byte address)
//! 36          32    header pointer p, relative to BASE = 4
//! BASE+p      32    payload length L
//! BASE+p+32   L     payload (first 4 bytes = opcode)
//! ```
//!
//! Only the entry selector and the two head words sit at fixed positions.
//! The payload lives wherever the header pointer says, so [`decode`] is the
//! only place that may locate it. Its [`Envelope`] output is consumed both by
//! the permission check and by the forward call.

use crate::domain::services::selectors;
use crate::domain::value_objects::{Address, Bytes, Selector, U256};
use crate::errors::MalformedReason;

/// Size of one head/length word.
pub const WORD_SIZE: usize = 32;

/// Offsets in the header pointer are relative to this position.
pub const HEADER_BASE: usize = 4;

/// Minimum envelope size: entry selector plus target word and header pointer.
pub const MIN_ENVELOPE_SIZE: usize = HEADER_BASE + 2 * WORD_SIZE;

/// Header pointer written by [`encode`]: the payload section follows the head.
pub const CANONICAL_PAYLOAD_OFFSET: usize = 2 * WORD_SIZE;

/// Length of an opcode.
pub const OPCODE_SIZE: usize = 4;

// =============================================================================
// PAYLOAD
// =============================================================================

/// A forwarded payload: opcode followed by operation arguments.
///
/// ## Invariants
/// - At least [`OPCODE_SIZE`] bytes long.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Payload(Bytes);

impl Payload {
    /// Wraps raw bytes, rejecting anything without a full opcode.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, MalformedReason> {
        let bytes = bytes.into();
        if bytes.len() < OPCODE_SIZE {
            return Err(MalformedReason::MissingOpcode);
        }
        Ok(Self(bytes))
    }

    /// Builds a payload from an opcode and pre-encoded argument bytes.
    #[must_use]
    pub fn with_args(opcode: Selector, args: &[u8]) -> Self {
        let mut data = Vec::with_capacity(OPCODE_SIZE + args.len());
        data.extend_from_slice(opcode.as_bytes());
        data.extend_from_slice(args);
        Self(Bytes::from(data))
    }

    /// The operation code: the first four bytes, exactly as forwarded.
    #[must_use]
    pub fn opcode(&self) -> Selector {
        let mut sel = [0u8; OPCODE_SIZE];
        sel.copy_from_slice(&self.0.as_slice()[..OPCODE_SIZE]);
        Selector::new(sel)
    }

    /// Argument bytes after the opcode.
    #[must_use]
    pub fn arguments(&self) -> &[u8] {
        &self.0.as_slice()[OPCODE_SIZE..]
    }

    /// Full payload bytes, opcode included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the payload, returning the raw bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A decoded request: where to forward, and what.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Envelope {
    /// Target endpoint of the forward call.
    pub target: Address,
    /// Bytes delivered verbatim to `target`.
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope value.
    #[must_use]
    pub fn new(target: Address, payload: Payload) -> Self {
        Self { target, payload }
    }

    /// The effective opcode: byte 0..4 of the forwarded payload.
    #[must_use]
    pub fn opcode(&self) -> Selector {
        self.payload.opcode()
    }
}

// =============================================================================
// ENCODE / DECODE
// =============================================================================

/// Encodes `(target, payload)` in the canonical layout.
#[must_use]
pub fn encode(target: Address, payload: &Payload) -> Bytes {
    let padded_len = payload.len().div_ceil(WORD_SIZE) * WORD_SIZE;
    let mut out = Vec::with_capacity(MIN_ENVELOPE_SIZE + WORD_SIZE + padded_len);

    out.extend_from_slice(selectors::execute().as_bytes());
    out.extend_from_slice(&address_word(target));
    out.extend_from_slice(&u256_word(U256::from(CANONICAL_PAYLOAD_OFFSET)));
    out.extend_from_slice(&u256_word(U256::from(payload.len())));
    out.extend_from_slice(payload.as_bytes());
    out.resize(MIN_ENVELOPE_SIZE + WORD_SIZE + padded_len, 0);

    Bytes::from(out)
}

/// Decodes an envelope into its target and payload.
///
/// Bytes outside the head words and the pointed-to payload section are
/// ignored.
pub fn decode(envelope: &[u8]) -> Result<Envelope, MalformedReason> {
    if envelope.len() < MIN_ENVELOPE_SIZE {
        return Err(MalformedReason::TooShort);
    }

    let entry = Selector::from_prefix(envelope).ok_or(MalformedReason::TooShort)?;
    if entry != selectors::execute() {
        return Err(MalformedReason::UnknownEntry(entry));
    }

    let target = read_address_word(envelope, HEADER_BASE)?;

    let offset = read_u256_word(envelope, HEADER_BASE + WORD_SIZE)
        .ok_or(MalformedReason::TruncatedLength)?;
    let length_at = to_usize(offset)
        .and_then(|o| o.checked_add(HEADER_BASE))
        .filter(|&pos| pos < envelope.len())
        .ok_or(MalformedReason::OffsetOutOfBounds)?;

    let length = read_u256_word(envelope, length_at).ok_or(MalformedReason::TruncatedLength)?;
    let start = length_at + WORD_SIZE;
    let end = to_usize(length)
        .and_then(|len| start.checked_add(len))
        .filter(|&end| end <= envelope.len())
        .ok_or(MalformedReason::PayloadOutOfBounds)?;

    let payload = Payload::new(&envelope[start..end])?;
    Ok(Envelope::new(target, payload))
}

// =============================================================================
// WORD HELPERS
// =============================================================================

/// Reads the 32-byte word at `pos`. Returns None if it runs past the end.
#[must_use]
pub fn read_word(data: &[u8], pos: usize) -> Option<[u8; WORD_SIZE]> {
    let end = pos.checked_add(WORD_SIZE)?;
    data.get(pos..end)?.try_into().ok()
}

/// Reads a big-endian unsigned word at `pos`.
#[must_use]
pub fn read_u256_word(data: &[u8], pos: usize) -> Option<U256> {
    read_word(data, pos).map(|word| U256::from_big_endian(&word))
}

/// Reads an address word at `pos`, requiring the 12 high bytes to be zero.
pub fn read_address_word(data: &[u8], pos: usize) -> Result<Address, MalformedReason> {
    let word = read_word(data, pos).ok_or(MalformedReason::TooShort)?;
    if word[..12].iter().any(|&b| b != 0) {
        return Err(MalformedReason::DirtyAddress);
    }
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&word[12..]);
    Ok(Address::new(addr))
}

/// Left-pads an address to one word.
#[must_use]
pub fn address_word(addr: Address) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    word[12..].copy_from_slice(addr.as_bytes());
    word
}

/// Encodes an unsigned integer as one big-endian word.
#[must_use]
pub fn u256_word(value: U256) -> [u8; WORD_SIZE] {
    let mut word = [0u8; WORD_SIZE];
    value.to_big_endian(&mut word);
    word
}

fn to_usize(value: U256) -> Option<usize> {
    if value > U256::from(usize::MAX) {
        None
    } else {
        Some(value.as_usize())
    }
}

// =============================================================================
// TESTS
// =============================================================================
