//! Flowsplit core: a deterministic kernel that splits one continuous incoming
//! payment stream across a churning set of recipients.
//!
//! Design goals:
//! - Invalid states unrepresentable where cheap (bounded `Bps`, newtyped
//!   amounts/rates/units with checked arithmetic only).
//! - Deterministic integer math: u128/i128 intermediates, floor division,
//!   remainders assigned explicitly so every split conserves the input.
//! - IO-free core: the streaming-payment primitive sits behind the
//!   [`stream::StreamAdapter`] trait; integration layers provide time,
//!   storage and the real primitive.
//! - Fail-closed at boundaries: callers get typed errors, never saturation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod flow;
pub mod hash;
pub mod item;
pub mod math;
pub mod pool;
pub mod rate;
pub mod registry;
pub mod stream;
pub mod voting;

pub use config::FlowConfig;
pub use flow::Flow;

/// 32-byte hash newtype used for recipient IDs, item hashes and vote
/// commitments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

/// Content-addressed recipient identity (hash of address + metadata + type).
pub type RecipientId = Hash32;

/// 20-byte account address.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(self) -> bool {
        self == Address::ZERO
    }
}

/// Voting token identity (ERC-721 token id or ERC-20 snapshot slot).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TokenId(pub u64);

pub const BPS_U16: u16 = 10_000;
pub const BPS_U128: u128 = 10_000;

/// Percentage scale: all percent-like parameters are basis points of this.
pub const PERCENTAGE_SCALE: u128 = BPS_U128;

/// Basis points in `[0, 10_000]` (correct-by-construction).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(BPS_U16);

    /// Constructs a bounded bps value.
    ///
    /// Preconditions:
    /// - `v <= 10_000` (else returns an error; fail-closed).
    ///
    /// Postconditions:
    /// - `self.get()` is always in `[0, 10_000]` and can be used without
    ///   re-checking.
    pub fn new(v: u16) -> Result<Bps> {
        if v <= BPS_U16 {
            Ok(Bps(v))
        } else {
            Err(FlowError::InvalidBps { bps: v })
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }

    pub fn as_u128(self) -> u128 {
        self.0 as u128
    }

    /// Doubles the value, saturating at `Bps::MAX`.
    ///
    /// Used when a parent flow seeds a child flow's manager-reward percent.
    pub fn doubled_capped(self) -> Bps {
        Bps((self.0.saturating_mul(2)).min(BPS_U16))
    }
}

impl TryFrom<u16> for Bps {
    type Error = FlowError;
    fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Bps::new(value)
    }
}

/// Signed rate-per-second in the streaming primitive's units.
///
/// The primitive's wire type is a 96-bit signed integer; rates outside that
/// range are rejected (`FlowRateTooHigh`), never truncated.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FlowRate(pub i128);

impl FlowRate {
    pub const ZERO: FlowRate = FlowRate(0);

    /// Largest rate representable by the primitive's 96-bit signed rate type.
    pub const MAX_STREAMABLE: i128 = (1i128 << 95) - 1;

    pub fn get(self) -> i128 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

/// Token amount in smallest units (wei-equivalent).
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn get(self) -> u128 {
        self.0
    }
}

/// Distribution-pool member units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Units(pub u128);

impl Units {
    pub const ZERO: Units = Units(0);
    pub const ONE: Units = Units(1);

    pub fn get(self) -> u128 {
        self.0
    }
}

/// Unified error type for flowsplit-core operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    // Precondition violations: reject the whole call, no partial state change.
    #[error("recipient address must not be zero")]
    AddressZero,

    #[error("recipient address must not be the flow's own address")]
    RecipientIsSelf,

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("recipient already exists: {id:?}")]
    RecipientAlreadyExists { id: RecipientId },

    #[error("unknown recipient id: {id:?}")]
    InvalidRecipientId { id: RecipientId },

    #[error("recipient already removed: {id:?}")]
    RecipientAlreadyRemoved { id: RecipientId },

    // Authorization failures: checked before any other state access.
    #[error("caller is not the owner or manager")]
    NotOwnerOrManager,

    #[error("caller is not the owner or parent flow")]
    NotOwnerOrParent,

    // Vote validation.
    #[error("allocation bps must sum to {expected}, got {sum}")]
    InvalidBpsSum { sum: u128, expected: u128 },

    #[error("recipients/allocations length mismatch: {recipients} vs {allocations}")]
    RecipientsAllocationsMismatch { recipients: usize, allocations: usize },

    #[error("at least one recipient allocation is required")]
    TooFewRecipients,

    #[error("each allocation must be positive")]
    AllocationMustBePositive,

    #[error("recipient is not approved for votes: {id:?}")]
    NotApprovedRecipient { id: RecipientId },

    // Numeric safety: reject rather than saturate; silent saturation would
    // corrupt the rate-conservation invariant.
    #[error("bps out of range: {bps} > {max}", max = BPS_U16)]
    InvalidBps { bps: u16 },

    #[error("flow rate must not be negative")]
    FlowRateNegative,

    #[error("flow rate {rate} exceeds the streamable maximum")]
    FlowRateTooHigh { rate: i128 },

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    // External-dependency failures (streaming primitive).
    #[error("streaming primitive rejected unit update for member {member:?}")]
    UnitsUpdateFailed { member: Address },

    #[error("unknown pool: {pool}")]
    PoolNotFound { pool: u64 },

    #[error("streaming primitive rejected pool connection for pool {pool}")]
    PoolConnectFailed { pool: u64 },

    #[error("unknown flow from {from:?} to {to:?}")]
    FlowNotFound { from: Address, to: Address },

    // TCR item decoding.
    #[error("malformed registry item: {0}")]
    MalformedItem(String),

    // Vote eligibility.
    #[error("eligibility proof is stale: {age_secs}s old, max {max_secs}s")]
    StaleEligibilityProof { age_secs: u64, max_secs: u64 },

    #[error("voter is not eligible for token {token:?}")]
    NotEligibleVoter { token: TokenId },

    #[error("invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, FlowError>;
