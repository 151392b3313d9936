//! HTTP handlers mapping the API surface onto registry operations.

use crate::api::errors::ApiError;
use crate::api::models::{
    BalanceResponse, CashoutRequest, CreateRoundRequest, DepositRequest, HealthResponse,
    PlayerCashoutRequest, RecentQuery, RevealRequest, SeedResponse, VerifyRequest,
};
use crate::config::EngineConfig;
use crate::fair::{self, VerificationReport};
use crate::games::registry::{CashoutView, RevealView, RoundRegistry, RoundTicket, StatusView};
use crate::games::types::{GameMode, ModeParams, PlayerKey, RoundRecord};
use crate::ledger::BalanceLedger;
use crate::store::{HouseStats, RoundStore};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<RoundRegistry>,
    pub store: Arc<dyn RoundStore>,
    pub ledger: Arc<dyn BalanceLedger>,
    pub config: EngineConfig,
}

const DEFAULT_TOTAL_TILES: u32 = 25;
const MAX_RECENT_LIMIT: usize = 100;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// POST /api/rounds
pub async fn create_round(
    State(state): State<ApiState>,
    Json(request): Json<CreateRoundRequest>,
) -> Result<Json<RoundTicket>, ApiError> {
    let mode = GameMode::parse(&request.mode)
        .ok_or_else(|| crate::errors::GameError::UnknownMode(request.mode.clone()))?;

    let params = match mode {
        GameMode::Mines => {
            let mine_count = request
                .mine_count
                .ok_or_else(|| ApiError::bad_request("mine_count is required for mines"))?;
            ModeParams::Mines {
                total_tiles: request.total_tiles.unwrap_or(DEFAULT_TOTAL_TILES),
                mine_count,
            }
        }
        GameMode::Crash => ModeParams::Crash,
        GameMode::Slide => {
            let target = request
                .target
                .ok_or_else(|| ApiError::bad_request("target is required for slide"))?;
            ModeParams::Slide { target }
        }
    };

    let ticket = state
        .registry
        .create(&request.player, request.wager, params)?;
    Ok(Json(ticket))
}

/// GET /api/rounds/:id
pub async fn round_status(
    Path(round_id): Path<Uuid>,
    State(state): State<ApiState>,
) -> Result<Json<StatusView>, ApiError> {
    Ok(Json(state.registry.status(round_id)?))
}

/// POST /api/rounds/:id/reveal
pub async fn reveal_tile(
    Path(round_id): Path<Uuid>,
    State(state): State<ApiState>,
    Json(request): Json<RevealRequest>,
) -> Result<Json<RevealView>, ApiError> {
    Ok(Json(state.registry.apply_reveal(round_id, request.tile)?))
}

/// POST /api/rounds/:id/cashout
pub async fn cashout_round(
    Path(round_id): Path<Uuid>,
    State(state): State<ApiState>,
    Json(request): Json<CashoutRequest>,
) -> Result<Json<CashoutView>, ApiError> {
    Ok(Json(
        state
            .registry
            .cashout_by_round(round_id, request.client_multiplier)?,
    ))
}

/// POST /api/cashout - cash out the caller's active round by player handle.
pub async fn cashout_player(
    State(state): State<ApiState>,
    Json(request): Json<PlayerCashoutRequest>,
) -> Result<Json<CashoutView>, ApiError> {
    Ok(Json(
        state
            .registry
            .apply_cashout(&request.player, request.client_multiplier)?,
    ))
}

/// GET /api/rounds/:id/seed - the server seed of a finished round.
pub async fn reveal_seed(
    Path(round_id): Path<Uuid>,
    State(state): State<ApiState>,
) -> Result<Json<SeedResponse>, ApiError> {
    let server_seed = state.registry.reveal_seed(round_id)?;
    Ok(Json(SeedResponse {
        round_id,
        server_seed,
    }))
}

/// POST /api/verify - public recompute-and-compare, callable by anyone who
/// knows the revealed server seed.
pub async fn verify_round(
    State(state): State<ApiState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerificationReport>, ApiError> {
    let mode = GameMode::parse(&request.mode)
        .ok_or_else(|| crate::errors::GameError::UnknownMode(request.mode.clone()))?;

    let report = fair::verify(
        &request.game_hash,
        &request.server_seed,
        &request.client_seed,
        request.mine_count,
        request.total_tiles,
        mode,
        request.bet,
        &state.config.game.tiers,
        state.config.game.slide_sequence_len,
    )?;
    Ok(Json(report))
}

/// GET /api/rounds/recent
pub async fn recent_rounds(
    Query(query): Query<RecentQuery>,
    State(state): State<ApiState>,
) -> Result<Json<Vec<RoundRecord>>, ApiError> {
    let limit = query.limit.unwrap_or(20).min(MAX_RECENT_LIMIT);
    Ok(Json(state.store.recent(limit)?))
}

/// GET /api/stats
pub async fn house_stats(
    State(state): State<ApiState>,
) -> Result<Json<HouseStats>, ApiError> {
    Ok(Json(state.store.load_stats()?))
}

/// POST /api/deposit - credit the in-process ledger. Settlement of real
/// deposits happens upstream; this is the ledger contract only.
pub async fn deposit(
    State(state): State<ApiState>,
    Json(request): Json<DepositRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    if !(request.amount.is_finite() && request.amount > 0.0) {
        return Err(ApiError::bad_request("deposit amount must be positive"));
    }
    let player = PlayerKey::new(&request.player);
    let key = request
        .idempotency_key
        .unwrap_or_else(|| format!("deposit:{}", Uuid::new_v4()));
    state.ledger.credit(&player, request.amount, &key)?;
    Ok(Json(BalanceResponse {
        balance: state.ledger.balance(&player),
        player: player.to_string(),
    }))
}

/// GET /api/players/:player/balance
pub async fn player_balance(
    Path(player): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let player = PlayerKey::new(&player);
    Ok(Json(BalanceResponse {
        balance: state.ledger.balance(&player),
        player: player.to_string(),
    }))
}
