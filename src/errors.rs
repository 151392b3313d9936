//! Error types for the fairbet engine.
//!
//! Every failure carries a human-readable message (via Display) and a
//! machine-checkable [`ErrorKind`] so callers and the HTTP layer can branch
//! without string matching.

use thiserror::Error;

/// Coarse error category, used by the API layer to pick a status code and by
/// callers to decide whether to retry, refresh, or abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range input, rejected before any mutation.
    Validation,
    /// Unknown player or round, no partial effects.
    NotFound,
    /// Registry invariant violation; caller should refresh status and retry.
    Conflict,
    /// Commitment mismatch or premature reveal; fatal, never auto-repaired.
    Integrity,
    /// Ledger or storage failure outside the engine.
    Upstream,
}

/// Root error type for all engine operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GameError {
    #[error("wager must be positive and finite, got {0}")]
    NonPositiveWager(f64),

    #[error("wager {wager} exceeds the configured limit {max}")]
    WagerExceedsLimit { wager: f64, max: f64 },

    #[error("total tiles {total_tiles} out of range: must satisfy 2 <= total <= {max}")]
    InvalidTotalTiles { total_tiles: u32, max: u32 },

    #[error("operation not supported for {mode} rounds")]
    UnsupportedMode { mode: String },

    #[error("mine count {count} out of range: must satisfy 1 <= count <= {max} for {total_tiles} tiles")]
    InvalidMineCount {
        count: u32,
        total_tiles: u32,
        max: u32,
    },

    #[error("tile index {tile} out of range for {total_tiles} tiles")]
    InvalidTile { tile: u32, total_tiles: u32 },

    #[error("slide target {0} out of range for the configured tier table")]
    InvalidTarget(f64),

    #[error("unknown game mode: {0}")]
    UnknownMode(String),

    #[error("tier table invalid: {0}")]
    BadPolicyTable(String),

    #[error("round {0} not found")]
    RoundNotFound(String),

    #[error("no active round for player {0}")]
    NoActiveRound(String),

    #[error("player {0} already has an active round")]
    RoundAlreadyActive(String),

    #[error("round {0} is no longer active")]
    RoundNotActive(String),

    #[error("tile {0} already revealed")]
    TileAlreadyRevealed(u32),

    #[error("server seed cannot be revealed before the round reaches a terminal state")]
    PrematureReveal,

    #[error("server seed does not match its stored commitment for round {0}")]
    SeedHashMismatch(String),

    #[error("insufficient funds for player {player}: needed {needed}, available {available}")]
    InsufficientFunds {
        player: String,
        needed: f64,
        available: f64,
    },

    #[error("ledger credit failed for player {player}: {reason}")]
    CreditFailed { player: String, reason: String },

    #[error("storage failure: {0}")]
    Storage(String),
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::NonPositiveWager(_)
            | GameError::WagerExceedsLimit { .. }
            | GameError::InvalidTotalTiles { .. }
            | GameError::UnsupportedMode { .. }
            | GameError::InvalidMineCount { .. }
            | GameError::InvalidTile { .. }
            | GameError::InvalidTarget(_)
            | GameError::UnknownMode(_)
            | GameError::BadPolicyTable(_) => ErrorKind::Validation,

            GameError::RoundNotFound(_) | GameError::NoActiveRound(_) => ErrorKind::NotFound,

            GameError::RoundAlreadyActive(_)
            | GameError::RoundNotActive(_)
            | GameError::TileAlreadyRevealed(_) => ErrorKind::Conflict,

            GameError::PrematureReveal | GameError::SeedHashMismatch(_) => ErrorKind::Integrity,

            GameError::InsufficientFunds { .. }
            | GameError::CreditFailed { .. }
            | GameError::Storage(_) => ErrorKind::Upstream,
        }
    }

    /// Stable machine code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            GameError::NonPositiveWager(_) => "NON_POSITIVE_WAGER",
            GameError::WagerExceedsLimit { .. } => "WAGER_EXCEEDS_LIMIT",
            GameError::InvalidTotalTiles { .. } => "INVALID_TOTAL_TILES",
            GameError::UnsupportedMode { .. } => "UNSUPPORTED_MODE",
            GameError::InvalidMineCount { .. } => "INVALID_MINE_COUNT",
            GameError::InvalidTile { .. } => "INVALID_TILE",
            GameError::InvalidTarget(_) => "INVALID_TARGET",
            GameError::UnknownMode(_) => "UNKNOWN_MODE",
            GameError::BadPolicyTable(_) => "BAD_POLICY_TABLE",
            GameError::RoundNotFound(_) => "ROUND_NOT_FOUND",
            GameError::NoActiveRound(_) => "NO_ACTIVE_ROUND",
            GameError::RoundAlreadyActive(_) => "ROUND_ALREADY_ACTIVE",
            GameError::RoundNotActive(_) => "ROUND_NOT_ACTIVE",
            GameError::TileAlreadyRevealed(_) => "TILE_ALREADY_REVEALED",
            GameError::PrematureReveal => "PREMATURE_REVEAL",
            GameError::SeedHashMismatch(_) => "SEED_HASH_MISMATCH",
            GameError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            GameError::CreditFailed { .. } => "CREDIT_FAILED",
            GameError::Storage(_) => "STORAGE",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type GameResult<T> = Result<T, GameError>;
