//! Round session registry: the single owner of every in-progress round.
//!
//! Rounds live behind a per-round mutex inside a dashmap keyed by player, so
//! concurrent mutations against the same round serialize instead of racing;
//! the loser of a cashout race observes a terminal status and fails hard.
//! Terminal transitions remove the round from the active set, write the
//! record through to the durable store, and credit the ledger.
//!
//! Every transition is server-authoritative. A client-reported multiplier is
//! accepted only as a diagnostic and never reaches the payout path.

use crate::config::GameConfig;
use crate::errors::{GameError, GameResult};
use crate::fair::derive::{derive_positions, SeedStream};
use crate::fair::seed::{
    bind_game_hash, canonical_crash_outcome, canonical_mines_outcome, canonical_slide_outcome,
    verify_commitment, SeedPair,
};
use crate::games::payout::{draw_crash_point, draw_slide_sequence, mines_multiplier};
use crate::games::timing;
use crate::games::types::{
    GameMode, ModeParams, ModeState, PlayerKey, RecordOutcome, Round, RoundProgress, RoundRecord,
    RoundStatus, SettlementStatus,
};
use crate::ledger::BalanceLedger;
use crate::store::{apply_house_stats, RoundStore};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Upper bound on the mines board size accepted from clients.
const MAX_TOTAL_TILES: u32 = 400;

/// Public view returned by `create`. Never exposes the mine layout or the
/// crash point; the commitment and game hash let the player verify later.
#[derive(Debug, Clone, Serialize)]
pub struct RoundTicket {
    pub round_id: Uuid,
    pub mode: GameMode,
    pub status: RoundStatus,
    pub wager: f64,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub game_hash: String,
    pub created_at: DateTime<Utc>,
    /// Set only for rounds that resolve at creation (slide).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_multiplier: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payout: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub round_id: Uuid,
    pub status: RoundStatus,
    pub current_multiplier: f64,
    pub progress: RoundProgress,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevealView {
    pub status: RoundStatus,
    pub progress: RoundProgress,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CashoutView {
    pub round_id: Uuid,
    pub status: RoundStatus,
    pub final_multiplier: f64,
    pub payout: f64,
}

pub struct RoundRegistry {
    config: GameConfig,
    ledger: Arc<dyn BalanceLedger>,
    store: Arc<dyn RoundStore>,
    active: DashMap<PlayerKey, Arc<Mutex<Round>>>,
    by_id: DashMap<Uuid, PlayerKey>,
}

impl RoundRegistry {
    pub fn new(
        config: GameConfig,
        ledger: Arc<dyn BalanceLedger>,
        store: Arc<dyn RoundStore>,
    ) -> Self {
        Self {
            config,
            ledger,
            store,
            active: DashMap::new(),
            by_id: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Place a bet and open a round. The debit happens before the round is
    /// registered; a debit failure aborts creation with no round created.
    pub fn create(&self, player: &str, wager: f64, params: ModeParams) -> GameResult<RoundTicket> {
        self.validate(wager, &params)?;
        let key = PlayerKey::new(player);

        let round = match self.active.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(GameError::RoundAlreadyActive(key.to_string()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let round_id = Uuid::new_v4();
                self.ledger
                    .debit(&key, wager, &format!("bet:{round_id}"))?;

                let round = self.build_round(round_id, key.clone(), wager, &params);
                if round.status.is_terminal() {
                    // Slide resolves at creation; it never enters the active set.
                    drop(slot);
                } else {
                    self.by_id.insert(round.id, key.clone());
                    slot.insert(Arc::new(Mutex::new(round.clone())));
                }
                round
            }
        };

        tracing::info!(
            round_id = %round.id,
            player = %key,
            mode = %round.mode(),
            wager,
            status = %round.status,
            "round created"
        );

        let (final_multiplier, payout) = if round.status.is_terminal() {
            let record = self.settle_and_persist(&round);
            (Some(record.final_multiplier), Some(record.payout))
        } else {
            (None, None)
        };

        Ok(RoundTicket {
            round_id: round.id,
            mode: round.mode(),
            status: round.status,
            wager: round.wager,
            server_seed_hash: round.server_seed_hash.clone(),
            client_seed: round.seeds.client_seed.clone(),
            game_hash: round.game_hash.clone(),
            created_at: round.created_at,
            final_multiplier,
            payout,
        })
    }

    /// Status of the player's active round.
    pub fn get_active(&self, player: &str) -> GameResult<StatusView> {
        let key = PlayerKey::new(player);
        let slot = self
            .active
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GameError::NoActiveRound(key.to_string()))?;
        Ok(self.view_locked(&key, &slot))
    }

    /// Status by round id. Terminal rounds are served from the durable store
    /// so repeated reads of a finished round return the same frozen value.
    pub fn status(&self, round_id: Uuid) -> GameResult<StatusView> {
        if let Some((key, slot)) = self.active_slot(round_id) {
            let view = self.view_locked(&key, &slot);
            if view.round_id == round_id {
                return Ok(view);
            }
        }
        match self.store.load(round_id)? {
            Some(record) => Ok(self.record_view(&record)),
            None => Err(GameError::RoundNotFound(round_id.to_string())),
        }
    }

    /// Reveal one tile of a mines round.
    pub fn apply_reveal(&self, round_id: Uuid, tile: u32) -> GameResult<RevealView> {
        let Some((key, slot)) = self.active_slot(round_id) else {
            return self.gone(round_id);
        };

        let mut round = slot.lock().unwrap();
        if round.id != round_id {
            drop(round);
            return self.gone(round_id);
        }

        let ModeState::Mines {
            total_tiles,
            mine_count,
            ref positions,
            ..
        } = round.state
        else {
            return Err(GameError::UnsupportedMode {
                mode: round.mode().to_string(),
            });
        };

        if round.status != RoundStatus::Running {
            return Err(GameError::RoundNotActive(round_id.to_string()));
        }
        if tile >= total_tiles {
            return Err(GameError::InvalidTile { tile, total_tiles });
        }

        let hit_mine = positions.binary_search(&tile).is_ok();
        let ModeState::Mines { ref mut revealed, .. } = round.state else {
            unreachable!("mode checked above");
        };
        if revealed.contains(&tile) {
            return Err(GameError::TileAlreadyRevealed(tile));
        }

        if hit_mine {
            round.status = RoundStatus::Lost;
            round.final_multiplier = Some(0.0);
            let record = self.settle_and_persist(&round);
            self.detach(&key, &slot, round_id);
            tracing::info!(round_id = %round_id, tile, "mine hit, round lost");
            return Ok(RevealView {
                status: record.status,
                progress: live_progress(&round, Utc::now(), &self.config),
                multiplier: 0.0,
            });
        }

        revealed.insert(tile);
        let revealed_count = revealed.len() as u32;
        let multiplier = mines_multiplier(
            total_tiles,
            mine_count,
            revealed_count,
            self.config.edge_min,
            self.config.edge_max,
        );

        if revealed_count == total_tiles - mine_count {
            round.status = RoundStatus::Won;
            round.final_multiplier = Some(multiplier);
            let record = self.settle_and_persist(&round);
            self.detach(&key, &slot, round_id);
            tracing::info!(
                round_id = %round_id,
                multiplier,
                payout = record.payout,
                "all safe tiles revealed, round won"
            );
        }

        Ok(RevealView {
            status: round.status,
            progress: live_progress(&round, Utc::now(), &self.config),
            multiplier,
        })
    }

    /// Cash out the player's active round at the server-computed multiplier.
    ///
    /// `client_multiplier` is the value the client believes it locked in; it
    /// is logged when it diverges and otherwise ignored.
    pub fn apply_cashout(
        &self,
        player: &str,
        client_multiplier: Option<f64>,
    ) -> GameResult<CashoutView> {
        let key = PlayerKey::new(player);
        let slot = self
            .active
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| GameError::NoActiveRound(key.to_string()))?;
        self.cashout_slot(&key, &slot, client_multiplier)
    }

    /// Cash out addressed by round id instead of player. A finished round
    /// fails with `RoundNotActive`, an unknown one with `RoundNotFound`.
    pub fn cashout_by_round(
        &self,
        round_id: Uuid,
        client_multiplier: Option<f64>,
    ) -> GameResult<CashoutView> {
        let Some((key, slot)) = self.active_slot(round_id) else {
            return self.gone(round_id);
        };
        {
            let round = slot.lock().unwrap();
            if round.id != round_id {
                drop(round);
                return self.gone(round_id);
            }
        }
        self.cashout_slot(&key, &slot, client_multiplier)
    }

    fn cashout_slot(
        &self,
        key: &PlayerKey,
        slot: &Arc<Mutex<Round>>,
        client_multiplier: Option<f64>,
    ) -> GameResult<CashoutView> {
        let mut round = slot.lock().unwrap();
        let round_id = round.id;
        if round.status.is_terminal() {
            return Err(GameError::RoundNotActive(round_id.to_string()));
        }

        let multiplier = match round.state {
            ModeState::Mines {
                total_tiles,
                mine_count,
                ref revealed,
                ..
            } => mines_multiplier(
                total_tiles,
                mine_count,
                revealed.len() as u32,
                self.config.edge_min,
                self.config.edge_max,
            ),
            ModeState::Crash { .. } => {
                let now = Utc::now();
                let multiplier = self.tick_crash(&mut round, now);
                if round.status == RoundStatus::Crashed {
                    // The crash happened before the request was processed;
                    // settle the loss and reject the cashout.
                    self.settle_and_persist(&round);
                    self.detach(&key, &slot, round_id);
                    return Err(GameError::RoundNotActive(round_id.to_string()));
                }
                multiplier
            }
            ModeState::Slide { .. } => {
                return Err(GameError::UnsupportedMode {
                    mode: GameMode::Slide.to_string(),
                })
            }
        };

        if let Some(claimed) = client_multiplier {
            if (claimed - multiplier).abs() > 1e-6 {
                tracing::warn!(
                    round_id = %round_id,
                    claimed,
                    server = multiplier,
                    "client-reported multiplier diverges from server value, ignoring"
                );
            }
        }

        round.status = RoundStatus::CashedOut;
        round.final_multiplier = Some(multiplier);
        let record = self.settle_and_persist(&round);
        self.detach(&key, &slot, round_id);

        tracing::info!(
            round_id = %round_id,
            player = %key,
            multiplier,
            payout = record.payout,
            "round cashed out"
        );

        Ok(CashoutView {
            round_id,
            status: RoundStatus::CashedOut,
            final_multiplier: record.final_multiplier,
            payout: record.payout,
        })
    }

    /// Reveal the server seed of a finished round, re-checking the stored
    /// commitment first. A mismatch is fatal and is never patched over.
    pub fn reveal_seed(&self, round_id: Uuid) -> GameResult<String> {
        if self.by_id.contains_key(&round_id) {
            return Err(GameError::PrematureReveal);
        }
        let record = self
            .store
            .load(round_id)?
            .ok_or_else(|| GameError::RoundNotFound(round_id.to_string()))?;

        if !verify_commitment(&record.server_seed, &record.server_seed_hash) {
            tracing::error!(
                round_id = %round_id,
                "stored server seed does not match its commitment"
            );
            return Err(GameError::SeedHashMismatch(round_id.to_string()));
        }
        Ok(record.server_seed)
    }

    /// Re-drive ledger credits for rounds whose settlement did not complete.
    /// Returns the number of rounds settled by this pass.
    pub fn retry_pending_settlements(&self) -> GameResult<usize> {
        let mut settled = 0;
        for mut record in self.store.pending_settlements()? {
            let key = format!("payout:{}", record.round_id);
            match self
                .ledger
                .credit(&record.player, record.payout, &key)
            {
                Ok(()) => {
                    record.settlement = SettlementStatus::Complete;
                    self.store.persist(&record)?;
                    settled += 1;
                    tracing::info!(round_id = %record.round_id, "settlement retry succeeded");
                }
                Err(e) => {
                    record.settlement = SettlementStatus::SettlementFailed;
                    record.retry_count += 1;
                    self.store.persist(&record)?;
                    tracing::warn!(
                        round_id = %record.round_id,
                        retry_count = record.retry_count,
                        "settlement retry failed: {e}"
                    );
                }
            }
        }
        Ok(settled)
    }

    fn validate(&self, wager: f64, params: &ModeParams) -> GameResult<()> {
        if !(wager.is_finite() && wager > 0.0) {
            return Err(GameError::NonPositiveWager(wager));
        }
        if wager > self.config.max_wager {
            return Err(GameError::WagerExceedsLimit {
                wager,
                max: self.config.max_wager,
            });
        }
        match *params {
            ModeParams::Mines {
                total_tiles,
                mine_count,
            } => {
                if !(2..=MAX_TOTAL_TILES).contains(&total_tiles) {
                    return Err(GameError::InvalidTotalTiles {
                        total_tiles,
                        max: MAX_TOTAL_TILES,
                    });
                }
                if mine_count == 0 || mine_count >= total_tiles {
                    return Err(GameError::InvalidMineCount {
                        count: mine_count,
                        total_tiles,
                        max: total_tiles - 1,
                    });
                }
            }
            ModeParams::Crash => {}
            ModeParams::Slide { target } => {
                if !target.is_finite()
                    || target < 1.0
                    || target > self.config.tiers.max_value()
                {
                    return Err(GameError::InvalidTarget(target));
                }
            }
        }
        Ok(())
    }

    fn build_round(
        &self,
        round_id: Uuid,
        player: PlayerKey,
        wager: f64,
        params: &ModeParams,
    ) -> Round {
        let now = Utc::now();
        let seeds = SeedPair::generate();
        let server_seed_hash = seeds.commitment();
        let combined = seeds.combined();

        let (status, started_at, state, game_hash, final_multiplier) = match *params {
            ModeParams::Mines {
                total_tiles,
                mine_count,
            } => {
                let positions = derive_positions(&combined, mine_count, total_tiles)
                    .expect("mine count validated before build");
                let game_hash = bind_game_hash(
                    &canonical_mines_outcome(&positions),
                    GameMode::Mines.as_str(),
                    wager,
                    &seeds.server_seed,
                    &seeds.client_seed,
                    mine_count,
                    total_tiles,
                );
                let state = ModeState::Mines {
                    total_tiles,
                    mine_count,
                    positions,
                    revealed: BTreeSet::new(),
                };
                (RoundStatus::Running, now, state, game_hash, None)
            }
            ModeParams::Crash => {
                let mut stream = SeedStream::new(&combined);
                let crash_point = draw_crash_point(&mut stream, &self.config.tiers);
                let game_hash = bind_game_hash(
                    &canonical_crash_outcome(crash_point),
                    GameMode::Crash.as_str(),
                    wager,
                    &seeds.server_seed,
                    &seeds.client_seed,
                    0,
                    0,
                );
                let started_at = now + Duration::milliseconds(self.config.pre_roll_ms as i64);
                let state = ModeState::Crash { crash_point };
                (RoundStatus::Waiting, started_at, state, game_hash, None)
            }
            ModeParams::Slide { target } => {
                let mut stream = SeedStream::new(&combined);
                let (sequence, realized_index) = draw_slide_sequence(
                    &mut stream,
                    &self.config.tiers,
                    self.config.slide_sequence_len,
                );
                let game_hash = bind_game_hash(
                    &canonical_slide_outcome(&sequence, realized_index),
                    GameMode::Slide.as_str(),
                    wager,
                    &seeds.server_seed,
                    &seeds.client_seed,
                    0,
                    0,
                );
                let realized = sequence[realized_index];
                let won = realized >= target;
                let state = ModeState::Slide {
                    target,
                    sequence,
                    realized_index,
                };
                let status = if won { RoundStatus::Won } else { RoundStatus::Lost };
                let final_multiplier = if won { target } else { 0.0 };
                (status, now, state, game_hash, Some(final_multiplier))
            }
        };

        Round {
            id: round_id,
            player,
            wager,
            status,
            created_at: now,
            started_at,
            seeds,
            server_seed_hash,
            game_hash,
            state,
            final_multiplier,
        }
    }

    /// Evaluate a crash round against the server clock, transitioning
    /// WAITING -> RUNNING -> CRASHED as the elapsed time dictates. Returns
    /// the current multiplier.
    fn tick_crash(&self, round: &mut Round, now: DateTime<Utc>) -> f64 {
        let ModeState::Crash { crash_point } = round.state else {
            return round.final_multiplier.unwrap_or(timing::MIN_MULTIPLIER);
        };
        if round.status.is_terminal() {
            return round.final_multiplier.unwrap_or(crash_point);
        }
        if now < round.started_at {
            round.status = RoundStatus::Waiting;
            return timing::MIN_MULTIPLIER;
        }

        round.status = RoundStatus::Running;
        let elapsed = (now - round.started_at).num_milliseconds() as f64 / 1000.0;
        if timing::has_crashed(elapsed, self.config.growth_rate, crash_point) {
            round.status = RoundStatus::Crashed;
            round.final_multiplier = Some(crash_point);
            crash_point
        } else {
            timing::multiplier_at(elapsed, self.config.growth_rate, crash_point)
        }
    }

    /// Lock the slot, tick time-based state, and build a status view.
    /// Finalizes the round if the tick discovered a crash.
    fn view_locked(&self, key: &PlayerKey, slot: &Arc<Mutex<Round>>) -> StatusView {
        let mut round = slot.lock().unwrap();
        let now = Utc::now();

        let current_multiplier = match round.state {
            ModeState::Mines {
                total_tiles,
                mine_count,
                ref revealed,
                ..
            } => mines_multiplier(
                total_tiles,
                mine_count,
                revealed.len() as u32,
                self.config.edge_min,
                self.config.edge_max,
            ),
            ModeState::Crash { .. } => {
                let multiplier = self.tick_crash(&mut round, now);
                if round.status == RoundStatus::Crashed {
                    self.settle_and_persist(&round);
                    self.detach(key, slot, round.id);
                }
                multiplier
            }
            ModeState::Slide { .. } => round.final_multiplier.unwrap_or(0.0),
        };

        StatusView {
            round_id: round.id,
            status: round.status,
            current_multiplier,
            progress: live_progress(&round, now, &self.config),
        }
    }

    /// Frozen view of a finished round served from the durable store.
    fn record_view(&self, record: &RoundRecord) -> StatusView {
        let progress = match &record.outcome {
            RecordOutcome::Mines {
                total_tiles,
                mine_count,
                revealed,
                ..
            } => RoundProgress::Mines {
                revealed: revealed.clone(),
                revealed_count: revealed.len() as u32,
                safe_remaining: total_tiles - mine_count - revealed.len() as u32,
            },
            RecordOutcome::Crash {
                crash_point,
                cashed_out_at,
            } => {
                let frozen = cashed_out_at.unwrap_or(*crash_point);
                RoundProgress::Crash {
                    elapsed_secs: timing::crash_elapsed(frozen, self.config.growth_rate),
                }
            }
            RecordOutcome::Slide { realized_index, .. } => RoundProgress::Slide {
                realized_index: *realized_index,
            },
        };

        StatusView {
            round_id: record.round_id,
            status: record.status,
            current_multiplier: record.final_multiplier,
            progress,
        }
    }

    /// Settle a terminal round: credit the payout, persist the record, fold
    /// the house statistics. A credit failure leaves the record pending for
    /// `retry_pending_settlements`; it never marks the round complete.
    fn settle_and_persist(&self, round: &Round) -> RoundRecord {
        debug_assert!(round.status.is_terminal());
        let final_multiplier = round.final_multiplier.unwrap_or(0.0);
        let payout = match round.status {
            RoundStatus::Won | RoundStatus::CashedOut => round.wager * final_multiplier,
            _ => 0.0,
        };

        let mut settlement = SettlementStatus::Complete;
        let mut retry_count = 0;
        if payout > 0.0 {
            if let Err(e) =
                self.ledger
                    .credit(&round.player, payout, &format!("payout:{}", round.id))
            {
                tracing::error!(
                    round_id = %round.id,
                    payout,
                    "payout credit failed, leaving settlement pending: {e}"
                );
                settlement = SettlementStatus::SettlementFailed;
                retry_count = 1;
            }
        }

        let record = RoundRecord {
            round_id: round.id,
            player: round.player.clone(),
            mode: round.mode(),
            wager: round.wager,
            status: round.status,
            final_multiplier,
            payout,
            server_seed: round.seeds.server_seed.clone(),
            server_seed_hash: round.server_seed_hash.clone(),
            client_seed: round.seeds.client_seed.clone(),
            game_hash: round.game_hash.clone(),
            outcome: record_outcome(round),
            created_at: round.created_at,
            finished_at: Utc::now(),
            settlement,
            retry_count,
        };

        if let Err(e) = self.store.persist(&record) {
            tracing::error!(round_id = %round.id, "failed to persist round record: {e}");
        }
        if let Err(e) = apply_house_stats(self.store.as_ref(), &record) {
            tracing::warn!(round_id = %round.id, "failed to update house stats: {e}");
        }
        record
    }

    /// Remove a finished round from the active set. Guarded so a newer round
    /// registered under the same player is never evicted.
    fn detach(&self, key: &PlayerKey, slot: &Arc<Mutex<Round>>, round_id: Uuid) {
        self.active.remove_if(key, |_, value| Arc::ptr_eq(value, slot));
        self.by_id.remove(&round_id);
    }

    fn active_slot(&self, round_id: Uuid) -> Option<(PlayerKey, Arc<Mutex<Round>>)> {
        let key = self.by_id.get(&round_id).map(|entry| entry.value().clone())?;
        let slot = self.active.get(&key).map(|entry| entry.value().clone())?;
        Some((key, slot))
    }

    /// Error for a mutating operation against a round that is not active:
    /// finished rounds conflict, unknown rounds are not found.
    fn gone<T>(&self, round_id: Uuid) -> GameResult<T> {
        match self.store.load(round_id)? {
            Some(_) => Err(GameError::RoundNotActive(round_id.to_string())),
            None => Err(GameError::RoundNotFound(round_id.to_string())),
        }
    }
}

fn live_progress(round: &Round, now: DateTime<Utc>, config: &GameConfig) -> RoundProgress {
    match round.state {
        ModeState::Mines {
            total_tiles,
            mine_count,
            ref revealed,
            ..
        } => RoundProgress::Mines {
            revealed: revealed.iter().copied().collect(),
            revealed_count: revealed.len() as u32,
            safe_remaining: total_tiles - mine_count - revealed.len() as u32,
        },
        ModeState::Crash { crash_point } => {
            let elapsed = if round.status.is_terminal() {
                timing::crash_elapsed(
                    round.final_multiplier.unwrap_or(crash_point),
                    config.growth_rate,
                )
            } else if now > round.started_at {
                (now - round.started_at).num_milliseconds() as f64 / 1000.0
            } else {
                0.0
            };
            RoundProgress::Crash {
                elapsed_secs: elapsed,
            }
        }
        ModeState::Slide { realized_index, .. } => RoundProgress::Slide { realized_index },
    }
}

fn record_outcome(round: &Round) -> RecordOutcome {
    match round.state {
        ModeState::Mines {
            total_tiles,
            mine_count,
            ref positions,
            ref revealed,
        } => RecordOutcome::Mines {
            total_tiles,
            mine_count,
            positions: positions.clone(),
            revealed: revealed.iter().copied().collect(),
        },
        ModeState::Crash { crash_point } => RecordOutcome::Crash {
            crash_point,
            cashed_out_at: match round.status {
                RoundStatus::CashedOut => round.final_multiplier,
                _ => None,
            },
        },
        ModeState::Slide {
            target,
            ref sequence,
            realized_index,
        } => RecordOutcome::Slide {
            target,
            sequence: sequence.clone(),
            realized_index,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fair;
    use crate::ledger::MemoryLedger;
    use crate::store::MemoryRoundStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    const WAGER: f64 = 5.0;
    const FUNDS: f64 = 100.0;

    /// Ledger whose credits can be switched to fail, for settlement tests.
    struct FlakyLedger {
        inner: MemoryLedger,
        fail_credits: AtomicBool,
    }

    impl FlakyLedger {
        fn funded(player: &PlayerKey, amount: f64) -> Self {
            Self {
                inner: MemoryLedger::with_balance(player, amount),
                fail_credits: AtomicBool::new(false),
            }
        }
    }

    impl BalanceLedger for FlakyLedger {
        fn debit(&self, player: &PlayerKey, amount: f64, key: &str) -> GameResult<()> {
            self.inner.debit(player, amount, key)
        }

        fn credit(&self, player: &PlayerKey, amount: f64, key: &str) -> GameResult<()> {
            if self.fail_credits.load(Ordering::SeqCst) {
                return Err(GameError::CreditFailed {
                    player: player.to_string(),
                    reason: "ledger offline".to_string(),
                });
            }
            self.inner.credit(player, amount, key)
        }

        fn balance(&self, player: &PlayerKey) -> f64 {
            self.inner.balance(player)
        }
    }

    fn funded_registry(config: GameConfig) -> (RoundRegistry, Arc<MemoryLedger>, Arc<MemoryRoundStore>) {
        let ledger = Arc::new(MemoryLedger::with_balance(&PlayerKey::new("alice"), FUNDS));
        let store = Arc::new(MemoryRoundStore::new());
        let registry = RoundRegistry::new(config, ledger.clone(), store.clone());
        (registry, ledger, store)
    }

    fn alice() -> PlayerKey {
        PlayerKey::new("alice")
    }

    fn peek_round(registry: &RoundRegistry) -> Arc<Mutex<Round>> {
        registry
            .active
            .get(&alice())
            .map(|entry| entry.value().clone())
            .expect("active round")
    }

    fn mine_positions(registry: &RoundRegistry) -> Vec<u32> {
        let slot = peek_round(registry);
        let round = slot.lock().unwrap();
        match &round.state {
            ModeState::Mines { positions, .. } => positions.clone(),
            other => panic!("expected mines state, got {other:?}"),
        }
    }

    fn first_safe_tile(positions: &[u32], total_tiles: u32) -> u32 {
        (0..total_tiles)
            .find(|t| !positions.contains(t))
            .expect("at least one safe tile")
    }

    fn mines_params() -> ModeParams {
        ModeParams::Mines {
            total_tiles: 25,
            mine_count: 3,
        }
    }

    #[test]
    fn test_create_mines_debits_and_issues_commitment() {
        let (registry, ledger, _) = funded_registry(GameConfig::default());
        let ticket = registry.create("Alice", WAGER, mines_params()).unwrap();

        assert_eq!(ticket.mode, GameMode::Mines);
        assert_eq!(ticket.status, RoundStatus::Running);
        assert_eq!(ticket.server_seed_hash.len(), 64);
        assert!(!ticket.game_hash.is_empty());
        assert!(ticket.final_multiplier.is_none());
        assert_eq!(ledger.balance(&alice()), FUNDS - WAGER);

        // Handle resolution is case-insensitive.
        let status = registry.get_active("ALICE").unwrap();
        assert_eq!(status.round_id, ticket.round_id);
        assert_eq!(status.current_multiplier, 1.0);
    }

    #[test]
    fn test_second_create_conflicts() {
        let (registry, ledger, _) = funded_registry(GameConfig::default());
        registry.create("alice", WAGER, mines_params()).unwrap();

        let err = registry.create("alice", WAGER, mines_params()).unwrap_err();
        assert!(matches!(err, GameError::RoundAlreadyActive(_)));
        // The conflicting attempt must not debit.
        assert_eq!(ledger.balance(&alice()), FUNDS - WAGER);
    }

    #[test]
    fn test_insufficient_funds_leaves_no_round() {
        let ledger = Arc::new(MemoryLedger::with_balance(&alice(), 1.0));
        let store = Arc::new(MemoryRoundStore::new());
        let registry = RoundRegistry::new(GameConfig::default(), ledger.clone(), store);

        let err = registry.create("alice", WAGER, mines_params()).unwrap_err();
        assert!(matches!(err, GameError::InsufficientFunds { .. }));
        assert!(matches!(
            registry.get_active("alice").unwrap_err(),
            GameError::NoActiveRound(_)
        ));
        assert_eq!(ledger.balance(&alice()), 1.0);
    }

    #[test]
    fn test_validation_rejected_before_debit() {
        let (registry, ledger, _) = funded_registry(GameConfig::default());

        let cases: Vec<(f64, ModeParams, GameError)> = vec![
            (0.0, mines_params(), GameError::NonPositiveWager(0.0)),
            (
                f64::NAN,
                mines_params(),
                GameError::NonPositiveWager(f64::NAN),
            ),
            (
                5_000.0,
                mines_params(),
                GameError::WagerExceedsLimit {
                    wager: 5_000.0,
                    max: 1_000.0,
                },
            ),
            (
                WAGER,
                ModeParams::Mines {
                    total_tiles: 25,
                    mine_count: 0,
                },
                GameError::InvalidMineCount {
                    count: 0,
                    total_tiles: 25,
                    max: 24,
                },
            ),
            (
                WAGER,
                ModeParams::Mines {
                    total_tiles: 25,
                    mine_count: 25,
                },
                GameError::InvalidMineCount {
                    count: 25,
                    total_tiles: 25,
                    max: 24,
                },
            ),
            (
                WAGER,
                ModeParams::Mines {
                    total_tiles: 1,
                    mine_count: 1,
                },
                GameError::InvalidTotalTiles {
                    total_tiles: 1,
                    max: MAX_TOTAL_TILES,
                },
            ),
            (
                WAGER,
                ModeParams::Slide { target: 0.5 },
                GameError::InvalidTarget(0.5),
            ),
            (
                WAGER,
                ModeParams::Slide { target: 500.0 },
                GameError::InvalidTarget(500.0),
            ),
        ];

        for (wager, params, _expected) in cases {
            let err = registry.create("alice", wager, params).unwrap_err();
            assert_eq!(err.kind(), crate::errors::ErrorKind::Validation);
        }
        assert_eq!(ledger.balance(&alice()), FUNDS);
    }

    #[test]
    fn test_mines_reveal_then_cashout() {
        let (registry, ledger, store) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();

        let positions = mine_positions(&registry);
        let safe = first_safe_tile(&positions, 25);

        let view = registry.apply_reveal(ticket.round_id, safe).unwrap();
        assert_eq!(view.status, RoundStatus::Running);
        assert!(view.multiplier > 1.0);

        let cashout = registry.apply_cashout("alice", None).unwrap();
        assert_eq!(cashout.status, RoundStatus::CashedOut);
        assert_eq!(cashout.final_multiplier, view.multiplier);
        assert!((cashout.payout - WAGER * view.multiplier).abs() < 1e-9);
        assert!(
            (ledger.balance(&alice()) - (FUNDS - WAGER + cashout.payout)).abs() < 1e-9
        );

        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.status, RoundStatus::CashedOut);
        assert_eq!(record.settlement, SettlementStatus::Complete);

        // Terminal reads stay available and frozen.
        let status = registry.status(ticket.round_id).unwrap();
        assert_eq!(status.status, RoundStatus::CashedOut);
        assert_eq!(status.current_multiplier, cashout.final_multiplier);
    }

    #[test]
    fn test_mines_hit_mine_loses() {
        let (registry, ledger, store) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();
        let positions = mine_positions(&registry);

        let view = registry.apply_reveal(ticket.round_id, positions[0]).unwrap();
        assert_eq!(view.status, RoundStatus::Lost);
        assert_eq!(view.multiplier, 0.0);

        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.status, RoundStatus::Lost);
        assert_eq!(record.payout, 0.0);
        assert_eq!(ledger.balance(&alice()), FUNDS - WAGER);

        // The round left the active set; further operations fail hard.
        assert!(matches!(
            registry.apply_cashout("alice", None).unwrap_err(),
            GameError::NoActiveRound(_)
        ));
        assert!(matches!(
            registry.apply_reveal(ticket.round_id, 0).unwrap_err(),
            GameError::RoundNotActive(_)
        ));
    }

    #[test]
    fn test_mines_duplicate_reveal_conflicts() {
        let (registry, _, _) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();
        let positions = mine_positions(&registry);
        let safe = first_safe_tile(&positions, 25);

        registry.apply_reveal(ticket.round_id, safe).unwrap();
        let err = registry.apply_reveal(ticket.round_id, safe).unwrap_err();
        assert!(matches!(err, GameError::TileAlreadyRevealed(t) if t == safe));
    }

    #[test]
    fn test_mines_reveal_out_of_range() {
        let (registry, _, _) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();
        let err = registry.apply_reveal(ticket.round_id, 99).unwrap_err();
        assert!(matches!(err, GameError::InvalidTile { tile: 99, .. }));
    }

    #[test]
    fn test_mines_full_clear_wins() {
        let (registry, ledger, store) = funded_registry(GameConfig::default());
        let ticket = registry
            .create(
                "alice",
                WAGER,
                ModeParams::Mines {
                    total_tiles: 4,
                    mine_count: 3,
                },
            )
            .unwrap();
        let positions = mine_positions(&registry);
        let safe = first_safe_tile(&positions, 4);

        let view = registry.apply_reveal(ticket.round_id, safe).unwrap();
        assert_eq!(view.status, RoundStatus::Won);
        assert!(view.multiplier > 1.0);

        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.status, RoundStatus::Won);
        assert!((record.payout - WAGER * view.multiplier).abs() < 1e-9);
        assert!(ledger.balance(&alice()) > FUNDS - WAGER);
    }

    #[test]
    fn test_crash_cashout_during_waiting_pays_minimum() {
        let mut config = GameConfig::default();
        config.pre_roll_ms = 60_000;
        let (registry, ledger, _) = funded_registry(config);

        let ticket = registry.create("alice", WAGER, ModeParams::Crash).unwrap();
        assert_eq!(ticket.status, RoundStatus::Waiting);

        let status = registry.get_active("alice").unwrap();
        assert_eq!(status.status, RoundStatus::Waiting);
        assert_eq!(status.current_multiplier, 1.0);

        let cashout = registry.apply_cashout("alice", None).unwrap();
        assert_eq!(cashout.final_multiplier, 1.0);
        assert_eq!(cashout.payout, WAGER);
        assert_eq!(ledger.balance(&alice()), FUNDS);
    }

    #[test]
    fn test_crash_past_deadline_rejects_cashout_without_payout() {
        let mut config = GameConfig::default();
        config.pre_roll_ms = 0;
        let (registry, ledger, store) = funded_registry(config);

        let ticket = registry.create("alice", WAGER, ModeParams::Crash).unwrap();

        // Backdate the start far enough that any crash point has passed.
        {
            let slot = peek_round(&registry);
            let mut round = slot.lock().unwrap();
            round.started_at = Utc::now() - Duration::seconds(3_600);
        }

        let err = registry.apply_cashout("alice", None).unwrap_err();
        assert!(matches!(err, GameError::RoundNotActive(_)));
        assert_eq!(ledger.balance(&alice()), FUNDS - WAGER);

        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.status, RoundStatus::Crashed);
        assert_eq!(record.payout, 0.0);

        // Repeated terminal reads return the same frozen value.
        let first = registry.status(ticket.round_id).unwrap();
        let second = registry.status(ticket.round_id).unwrap();
        assert_eq!(first.status, RoundStatus::Crashed);
        assert_eq!(first.current_multiplier, second.current_multiplier);
        assert_eq!(first.current_multiplier, record.final_multiplier);
    }

    #[test]
    fn test_crash_status_read_freezes_at_crash_point() {
        let mut config = GameConfig::default();
        config.pre_roll_ms = 0;
        let (registry, _, store) = funded_registry(config);
        let ticket = registry.create("alice", WAGER, ModeParams::Crash).unwrap();

        let crash_point = {
            let slot = peek_round(&registry);
            let mut round = slot.lock().unwrap();
            round.started_at = Utc::now() - Duration::seconds(3_600);
            match round.state {
                ModeState::Crash { crash_point } => crash_point,
                _ => unreachable!(),
            }
        };

        let status = registry.status(ticket.round_id).unwrap();
        assert_eq!(status.status, RoundStatus::Crashed);
        assert_eq!(status.current_multiplier, crash_point);
        assert!(store.load(ticket.round_id).unwrap().is_some());

        // Cashout after the crash was observed elsewhere: by round id the
        // failure is the conflict the caller must refresh on.
        let err = registry.cashout_by_round(ticket.round_id, None).unwrap_err();
        assert!(matches!(err, GameError::RoundNotActive(_)));
    }

    #[test]
    fn test_crash_running_cashout_is_server_authoritative() {
        let mut config = GameConfig::default();
        config.pre_roll_ms = 0;
        let (registry, ledger, _) = funded_registry(config);
        registry.create("alice", WAGER, ModeParams::Crash).unwrap();

        {
            let slot = peek_round(&registry);
            let mut round = slot.lock().unwrap();
            // Pin the crash point high and rewind the clock five seconds so
            // the server-side multiplier is ~1.5 regardless of the draw.
            round.state = ModeState::Crash { crash_point: 1_000.0 };
            round.started_at = Utc::now() - Duration::seconds(5);
        }

        // The claimed 999x is diagnostic only.
        let cashout = registry.apply_cashout("alice", Some(999.0)).unwrap();
        assert!(
            cashout.final_multiplier >= 1.5 && cashout.final_multiplier < 1.6,
            "expected ~1.5x from the server clock, got {}",
            cashout.final_multiplier
        );
        assert!((cashout.payout - WAGER * cashout.final_multiplier).abs() < 1e-9);
        let expected = FUNDS - WAGER + cashout.payout;
        assert!((ledger.balance(&alice()) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_slide_resolves_at_creation() {
        let (registry, ledger, store) = funded_registry(GameConfig::default());

        // Every tier draw is at least 1.0, so a 1.0x target always wins.
        let win = registry
            .create("alice", WAGER, ModeParams::Slide { target: 1.0 })
            .unwrap();
        assert_eq!(win.status, RoundStatus::Won);
        assert_eq!(win.final_multiplier, Some(1.0));
        assert_eq!(win.payout, Some(WAGER));
        assert_eq!(ledger.balance(&alice()), FUNDS);
        assert!(matches!(
            registry.get_active("alice").unwrap_err(),
            GameError::NoActiveRound(_)
        ));

        // Draws are strictly below the top bound, so a 100x target always
        // loses.
        let loss = registry
            .create("alice", WAGER, ModeParams::Slide { target: 100.0 })
            .unwrap();
        assert_eq!(loss.status, RoundStatus::Lost);
        assert_eq!(loss.payout, Some(0.0));
        assert_eq!(ledger.balance(&alice()), FUNDS - WAGER);

        let record = store.load(loss.round_id).unwrap().unwrap();
        assert_eq!(record.status, RoundStatus::Lost);
        match record.outcome {
            RecordOutcome::Slide { ref sequence, realized_index, .. } => {
                assert_eq!(sequence.len(), 10);
                assert!(realized_index < 10);
            }
            ref other => panic!("expected slide outcome, got {other:?}"),
        }
    }

    #[test]
    fn test_seed_reveal_gate_and_integrity() {
        let (registry, _, store) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();

        assert!(matches!(
            registry.reveal_seed(ticket.round_id).unwrap_err(),
            GameError::PrematureReveal
        ));

        let positions = mine_positions(&registry);
        registry.apply_reveal(ticket.round_id, positions[0]).unwrap();

        let seed = registry.reveal_seed(ticket.round_id).unwrap();
        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(seed, record.server_seed);
        assert!(verify_commitment(&seed, &record.server_seed_hash));

        assert!(matches!(
            registry.reveal_seed(Uuid::new_v4()).unwrap_err(),
            GameError::RoundNotFound(_)
        ));
    }

    #[test]
    fn test_seed_reveal_detects_corrupted_record() {
        let (registry, _, store) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();
        let positions = mine_positions(&registry);
        registry.apply_reveal(ticket.round_id, positions[0]).unwrap();

        let mut record = store.load(ticket.round_id).unwrap().unwrap();
        record.server_seed = "ffffffffffffffffffffffffffffffff".to_string();
        store.persist(&record).unwrap();

        assert!(matches!(
            registry.reveal_seed(ticket.round_id).unwrap_err(),
            GameError::SeedHashMismatch(_)
        ));
    }

    #[test]
    fn test_credit_failure_leaves_settlement_pending() {
        let ledger = Arc::new(FlakyLedger::funded(&alice(), FUNDS));
        let store = Arc::new(MemoryRoundStore::new());
        let registry =
            RoundRegistry::new(GameConfig::default(), ledger.clone(), store.clone());

        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();
        ledger.fail_credits.store(true, Ordering::SeqCst);

        let cashout = registry.apply_cashout("alice", None).unwrap();
        assert_eq!(cashout.payout, WAGER);
        // The payout was not credited.
        assert_eq!(ledger.balance(&alice()), FUNDS - WAGER);

        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.settlement, SettlementStatus::SettlementFailed);
        assert_eq!(record.retry_count, 1);
        assert_eq!(store.pending_settlements().unwrap().len(), 1);

        // A retry while the ledger is still down bumps the counter.
        assert_eq!(registry.retry_pending_settlements().unwrap(), 0);
        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.retry_count, 2);

        // Once the ledger recovers the payout lands exactly once.
        ledger.fail_credits.store(false, Ordering::SeqCst);
        assert_eq!(registry.retry_pending_settlements().unwrap(), 1);
        assert_eq!(ledger.balance(&alice()), FUNDS);
        let record = store.load(ticket.round_id).unwrap().unwrap();
        assert_eq!(record.settlement, SettlementStatus::Complete);
        assert!(store.pending_settlements().unwrap().is_empty());

        // Nothing left to settle.
        assert_eq!(registry.retry_pending_settlements().unwrap(), 0);
        assert_eq!(ledger.balance(&alice()), FUNDS);
    }

    #[test]
    fn test_finished_round_verifies_end_to_end() {
        let (registry, _, store) = funded_registry(GameConfig::default());
        let ticket = registry.create("alice", WAGER, mines_params()).unwrap();
        let positions = mine_positions(&registry);
        registry.apply_reveal(ticket.round_id, positions[0]).unwrap();

        let record = store.load(ticket.round_id).unwrap().unwrap();
        let report = fair::verify(
            &record.game_hash,
            &record.server_seed,
            &record.client_seed,
            3,
            25,
            GameMode::Mines,
            record.wager,
            &registry.config().tiers,
            registry.config().slide_sequence_len,
        )
        .unwrap();

        assert!(report.is_valid);
        assert_eq!(report.recomputed_positions, positions);

        // A tampered wager no longer verifies.
        let report = fair::verify(
            &record.game_hash,
            &record.server_seed,
            &record.client_seed,
            3,
            25,
            GameMode::Mines,
            record.wager + 1.0,
            &registry.config().tiers,
            registry.config().slide_sequence_len,
        )
        .unwrap();
        assert!(!report.is_valid);
    }

    #[test]
    fn test_single_active_round_across_modes() {
        let (registry, _, _) = funded_registry(GameConfig::default());
        registry.create("alice", WAGER, mines_params()).unwrap();

        assert!(matches!(
            registry.create("alice", WAGER, ModeParams::Crash).unwrap_err(),
            GameError::RoundAlreadyActive(_)
        ));
        assert!(matches!(
            registry
                .create("alice", WAGER, ModeParams::Slide { target: 2.0 })
                .unwrap_err(),
            GameError::RoundAlreadyActive(_)
        ));

        // A different player is unaffected.
        let ledger_has_no_bob = registry.create("bob", WAGER, ModeParams::Crash);
        assert!(matches!(
            ledger_has_no_bob.unwrap_err(),
            GameError::InsufficientFunds { .. }
        ));
    }

    #[test]
    fn test_status_unknown_round() {
        let (registry, _, _) = funded_registry(GameConfig::default());
        assert!(matches!(
            registry.status(Uuid::new_v4()).unwrap_err(),
            GameError::RoundNotFound(_)
        ));
    }
}
