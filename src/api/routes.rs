//! Route definitions.

use crate::api::handlers::{
    cashout_player, cashout_round, create_round, deposit, health, house_stats, player_balance,
    recent_rounds, reveal_seed, reveal_tile, round_status, verify_round, ApiState,
};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the API router with all endpoints.
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Round lifecycle
        .route("/api/rounds", post(create_round))
        .route("/api/rounds/recent", get(recent_rounds))
        .route("/api/rounds/:id", get(round_status))
        .route("/api/rounds/:id/reveal", post(reveal_tile))
        .route("/api/rounds/:id/cashout", post(cashout_round))
        .route("/api/rounds/:id/seed", get(reveal_seed))
        .route("/api/cashout", post(cashout_player))
        // Fairness verification (public, stateless)
        .route("/api/verify", post(verify_round))
        // Ledger and house bookkeeping
        .route("/api/deposit", post(deposit))
        .route("/api/players/:player/balance", get(player_balance))
        .route("/api/stats", get(house_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
