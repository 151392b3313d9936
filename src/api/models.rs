//! Request and response bodies for the HTTP API. Engine-side views
//! (tickets, status, cashout results) serialize directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRoundRequest {
    pub player: String,
    pub wager: f64,
    /// "mines", "crash" or "slide".
    pub mode: String,
    /// Mines only; board size defaults to 25 tiles.
    pub total_tiles: Option<u32>,
    pub mine_count: Option<u32>,
    /// Slide only.
    pub target: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RevealRequest {
    pub tile: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CashoutRequest {
    /// Multiplier the client believes it locked in; diagnostic only.
    pub client_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlayerCashoutRequest {
    pub player: String,
    pub client_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    pub game_hash: String,
    pub server_seed: String,
    pub client_seed: String,
    pub mode: String,
    pub bet: f64,
    #[serde(default)]
    pub mine_count: u32,
    #[serde(default)]
    pub total_tiles: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub player: String,
    pub amount: f64,
    /// Supplied by the caller so a retried deposit applies once.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedResponse {
    pub round_id: Uuid,
    pub server_seed: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub player: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}
