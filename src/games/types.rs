//! Round and session types shared across the engine.

use crate::fair::seed::SeedPair;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Supported wagering modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Mines,
    Crash,
    Slide,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Mines => "mines",
            GameMode::Crash => "crash",
            GameMode::Slide => "slide",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mines" => Some(GameMode::Mines),
            "crash" => Some(GameMode::Crash),
            "slide" => Some(GameMode::Slide),
            _ => None,
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round lifecycle. WAITING and RUNNING are the only states from which a
/// gameplay transition is possible; the rest are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoundStatus {
    Waiting,
    Running,
    Crashed,
    Won,
    Lost,
    CashedOut,
}

impl RoundStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoundStatus::Crashed | RoundStatus::Won | RoundStatus::Lost | RoundStatus::CashedOut
        )
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoundStatus::Waiting => "WAITING",
            RoundStatus::Running => "RUNNING",
            RoundStatus::Crashed => "CRASHED",
            RoundStatus::Won => "WON",
            RoundStatus::Lost => "LOST",
            RoundStatus::CashedOut => "CASHED_OUT",
        };
        f.write_str(s)
    }
}

/// Canonical player key: handles resolve case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PlayerKey(String);

impl PlayerKey {
    pub fn new(handle: &str) -> Self {
        Self(handle.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mode-specific parameters supplied at bet placement.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeParams {
    Mines { total_tiles: u32, mine_count: u32 },
    Crash,
    Slide { target: f64 },
}

impl ModeParams {
    pub fn mode(&self) -> GameMode {
        match self {
            ModeParams::Mines { .. } => GameMode::Mines,
            ModeParams::Crash => GameMode::Crash,
            ModeParams::Slide { .. } => GameMode::Slide,
        }
    }
}

/// Mode-specific state carried by an active round. Each variant holds only
/// the fields its mode needs; the registry dispatches on the tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ModeState {
    Mines {
        total_tiles: u32,
        mine_count: u32,
        /// Derived layout, ascending. Secret until the round ends.
        positions: Vec<u32>,
        revealed: BTreeSet<u32>,
    },
    Crash {
        /// Seed-derived crash point, fixed at creation. Secret until the
        /// round ends.
        crash_point: f64,
    },
    Slide {
        target: f64,
        sequence: Vec<f64>,
        realized_index: usize,
    },
}

/// An in-progress (or just-finished) round. Owned exclusively by the
/// registry; mutated only under its per-round lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    pub id: Uuid,
    pub player: PlayerKey,
    pub wager: f64,
    pub status: RoundStatus,
    pub created_at: DateTime<Utc>,
    /// For crash rounds: creation plus the pre-roll delay. Equal to
    /// `created_at` for the other modes.
    pub started_at: DateTime<Utc>,
    pub seeds: SeedPair,
    pub server_seed_hash: String,
    pub game_hash: String,
    pub state: ModeState,
    pub final_multiplier: Option<f64>,
}

impl Round {
    pub fn mode(&self) -> GameMode {
        match self.state {
            ModeState::Mines { .. } => GameMode::Mines,
            ModeState::Crash { .. } => GameMode::Crash,
            ModeState::Slide { .. } => GameMode::Slide,
        }
    }
}

/// Mode-specific progress snapshot for status reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RoundProgress {
    Mines {
        revealed: Vec<u32>,
        revealed_count: u32,
        safe_remaining: u32,
    },
    Crash {
        elapsed_secs: f64,
    },
    Slide {
        realized_index: usize,
    },
}

/// Ledger settlement state of a finished round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettlementStatus {
    /// Payout credited (or nothing to credit).
    Complete,
    /// Credit not yet applied; eligible for retry.
    PendingSettlement,
    /// Credit attempted and failed; eligible for retry.
    SettlementFailed,
}

/// Terminal outcome parameters as persisted for audit and verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RecordOutcome {
    Mines {
        total_tiles: u32,
        mine_count: u32,
        positions: Vec<u32>,
        revealed: Vec<u32>,
    },
    Crash {
        crash_point: f64,
        cashed_out_at: Option<f64>,
    },
    Slide {
        target: f64,
        sequence: Vec<f64>,
        realized_index: usize,
    },
}

/// Durable snapshot of a finished round, written through to the store at the
/// terminal transition. Retains the server seed beyond process memory so the
/// round stays verifiable after restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round_id: Uuid,
    pub player: PlayerKey,
    pub mode: GameMode,
    pub wager: f64,
    pub status: RoundStatus,
    pub final_multiplier: f64,
    pub payout: f64,
    pub server_seed: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub game_hash: String,
    pub outcome: RecordOutcome,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub settlement: SettlementStatus,
    #[serde(default)]
    pub retry_count: u32,
}
