//! Shared types for the binary-options engine.
//!
//! These types form the data model used across the oracle, round engine
//! and vault. They are kept free of behaviour so every module can depend
//! on them without circular references.

use rust_decimal::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

/// Token amount in base units (e.g. wei for an 18-decimal token).
pub type Amount = u128;
/// Oracle price as a scaled integer.
pub type Price = u128;
pub type BlockNumber = u64;
/// Seconds since the Unix epoch, as reported by the chain.
pub type Timestamp = u64;
pub type Epoch = u64;
pub type TimeframeId = u8;
pub type TokenId = u64;
pub type RoundId = u64;

/// Basis-point denominator used for fees.
pub const BPS_DENOMINATOR: u128 = 10_000;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// A 20-byte account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address whose low 8 bytes hold `n` big-endian. Handy for fixtures.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Address {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix("0x").unwrap_or(s);
        if hex.len() != 40 {
            anyhow::bail!("address must be 40 hex characters, got {}", hex.len());
        }
        let mut bytes = [0u8; 20];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)?;
            bytes[i] = u8::from_str_radix(pair, 16)
                .map_err(|_| anyhow::anyhow!("invalid hex in address: {pair}"))?;
        }
        Ok(Self(bytes))
    }
}

// Serialized as a hex string so addresses can key JSON maps.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Side of a wager: price ends higher (bull) or lower (bear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Bull,
    Bear,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Bull => Direction::Bear,
            Direction::Bear => Direction::Bull,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bull => write!(f, "BULL"),
            Direction::Bear => write!(f, "BEAR"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bull" | "up" | "0" => Ok(Direction::Bull),
            "bear" | "down" | "1" => Ok(Direction::Bear),
            other => anyhow::bail!("Unknown direction: {other}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit conversion
// ---------------------------------------------------------------------------

/// Convert a human amount (e.g. `0.1`) into base units for a token with
/// `decimals` decimals. Fails if the value is negative, has more precision
/// than the token supports, or overflows.
pub fn to_base_units(value: Decimal, decimals: u32) -> anyhow::Result<Amount> {
    if value.is_sign_negative() {
        anyhow::bail!("amount must not be negative: {value}");
    }
    let scale = 10i128
        .checked_pow(decimals)
        .and_then(|s| Decimal::try_from_i128_with_scale(s, 0).ok())
        .ok_or_else(|| anyhow::anyhow!("unsupported token decimals: {decimals}"))?;
    let scaled = value
        .checked_mul(scale)
        .ok_or_else(|| anyhow::anyhow!("amount overflows base units: {value}"))?;
    if scaled.fract() != Decimal::ZERO {
        anyhow::bail!("amount {value} has more than {decimals} decimals");
    }
    scaled
        .to_u128()
        .ok_or_else(|| anyhow::anyhow!("amount not representable: {value}"))
}

/// Render base units as a human-readable decimal. Falls back to `None` when
/// the amount exceeds `Decimal`'s 96-bit mantissa.
pub fn from_base_units(amount: Amount, decimals: u32) -> Option<Decimal> {
    let raw = i128::try_from(amount).ok()?;
    Decimal::try_from_i128_with_scale(raw, decimals).ok().map(|d| d.normalize())
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Coarse error taxonomy used by callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Authorization,
    Sequencing,
    State,
    InputValidation,
    Funds,
    Arithmetic,
}

/// Every way a core operation can be rejected. A rejected call leaves all
/// state untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    // -- Authorization --
    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Not owner of token {0}")]
    NotOwner(TokenId),

    #[error("Not approved to act for {0}")]
    NotApproved(Address),

    #[error("Not owner or approved for token {0}")]
    NotOwnerOrApproved(TokenId),

    // -- Sequencing --
    #[error("Invalid oracle sequence: round {round_id} at {timestamp}")]
    InvalidSequence { round_id: RoundId, timestamp: Timestamp },

    #[error("Too early: block {current} < required {required}")]
    TooEarly { current: BlockNumber, required: BlockNumber },

    #[error("Timeframe {0} already started")]
    AlreadyStarted(TimeframeId),

    #[error("Timeframe {0} has not completed genesis")]
    NotGenesisStarted(TimeframeId),

    // -- State --
    #[error("Round {epoch} of timeframe {timeframe_id} is not accepting bets")]
    RoundNotBiddable { timeframe_id: TimeframeId, epoch: Epoch },

    #[error("Round {0} has not started")]
    RoundNotStarted(Epoch),

    #[error("Round {0} has not ended")]
    RoundNotEnded(Epoch),

    #[error("Rewards already claimed for round {0}")]
    AlreadyClaimed(Epoch),

    #[error("Position in round {0} is not claimable")]
    NotClaimable(Epoch),

    #[error("Paused")]
    Paused,

    #[error("Already holding a position in round {0}")]
    DuplicatePosition(Epoch),

    // -- Input validation --
    #[error("Zero address")]
    ZeroAddress,

    #[error("Zero amount")]
    ZeroAmount,

    #[error("Bet amount {amount} below minimum {minimum}")]
    BelowMinimum { amount: Amount, minimum: Amount },

    #[error("Invalid array length")]
    InvalidArrayLength,

    #[error("Token {0} does not exist")]
    TokenNotFound(TokenId),

    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: Amount, available: Amount },

    #[error("Insufficient share amount: requested {requested}, owned {owned}")]
    InsufficientShareAmount { requested: Amount, owned: Amount },

    #[error("Insufficient amount: {amount} below floor {floor}")]
    InsufficientAmount { amount: Amount, floor: Amount },

    #[error("Unknown timeframe {0}")]
    UnknownTimeframe(TimeframeId),

    #[error("Invalid timeframe configuration: {0}")]
    InvalidTimeframe(String),

    #[error("Oracle round {0} not found")]
    NotFound(RoundId),

    #[error("Oracle has no data")]
    NoData,

    // -- Funds --
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("Insufficient allowance: need {needed}, allowed {allowed}")]
    InsufficientAllowance { needed: Amount, allowed: Amount },

    #[error("Insufficient vault liquidity: need {needed}, have {available}")]
    InsufficientLiquidity { needed: Amount, available: Amount },

    #[error("Pool holds shares but no underlying")]
    EmptyPool,

    // -- Arithmetic --
    #[error("Arithmetic overflow")]
    Overflow,
}

impl MarketError {
    pub fn kind(&self) -> ErrorKind {
        use MarketError::*;
        match self {
            Unauthorized(_) | NotOwner(_) | NotApproved(_) | NotOwnerOrApproved(_) => {
                ErrorKind::Authorization
            }
            InvalidSequence { .. }
            | TooEarly { .. }
            | AlreadyStarted(_)
            | NotGenesisStarted(_) => ErrorKind::Sequencing,
            RoundNotBiddable { .. }
            | RoundNotStarted(_)
            | RoundNotEnded(_)
            | AlreadyClaimed(_)
            | NotClaimable(_)
            | Paused
            | DuplicatePosition(_) => ErrorKind::State,
            ZeroAddress
            | ZeroAmount
            | BelowMinimum { .. }
            | InvalidArrayLength
            | TokenNotFound(_)
            | InsufficientShares { .. }
            | InsufficientShareAmount { .. }
            | InsufficientAmount { .. }
            | UnknownTimeframe(_)
            | InvalidTimeframe(_)
            | NotFound(_)
            | NoData => ErrorKind::InputValidation,
            InsufficientBalance { .. }
            | InsufficientAllowance { .. }
            | InsufficientLiquidity { .. }
            | EmptyPool => ErrorKind::Funds,
            Overflow => ErrorKind::Arithmetic,
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
