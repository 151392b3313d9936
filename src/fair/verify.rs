//! Public verification service.
//!
//! Pure recompute-and-compare: reruns the position generator / outcome draws
//! and the game hash binding from the revealed inputs, then checks the
//! result against the stored hash. Holds no private state, so it is safe to
//! expose to third parties once the server seed is known.

use crate::errors::GameResult;
use crate::fair::derive::{derive_positions, SeedStream};
use crate::fair::seed::{
    bind_game_hash, canonical_crash_outcome, canonical_mines_outcome, canonical_slide_outcome,
    combine_seeds,
};
use crate::games::payout::{draw_crash_point, draw_slide_sequence, TierTable};
use crate::games::types::GameMode;
use serde::{Deserialize, Serialize};

/// Outcome of a verification run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub is_valid: bool,
    /// Mine layout recomputed from the seeds (empty for crash/slide).
    pub recomputed_positions: Vec<u32>,
    pub recomputed_hash: String,
}

/// Recompute the outcome and binding hash for a finished round and compare
/// against the supplied hash.
#[allow(clippy::too_many_arguments)]
pub fn verify(
    game_hash: &str,
    server_seed: &str,
    client_seed: &str,
    mine_count: u32,
    total_tiles: u32,
    mode: GameMode,
    bet: f64,
    policy: &TierTable,
    slide_sequence_len: usize,
) -> GameResult<VerificationReport> {
    let combined = combine_seeds(server_seed, client_seed);

    let (outcome, recomputed_positions) = match mode {
        GameMode::Mines => {
            let positions = derive_positions(&combined, mine_count, total_tiles)?;
            (canonical_mines_outcome(&positions), positions)
        }
        GameMode::Crash => {
            let mut stream = SeedStream::new(&combined);
            let crash_point = draw_crash_point(&mut stream, policy);
            (canonical_crash_outcome(crash_point), Vec::new())
        }
        GameMode::Slide => {
            let mut stream = SeedStream::new(&combined);
            let (sequence, realized) =
                draw_slide_sequence(&mut stream, policy, slide_sequence_len);
            (canonical_slide_outcome(&sequence, realized), Vec::new())
        }
    };

    let recomputed_hash = bind_game_hash(
        &outcome,
        mode.as_str(),
        bet,
        server_seed,
        client_seed,
        mine_count,
        total_tiles,
    );

    Ok(VerificationReport {
        is_valid: recomputed_hash == game_hash,
        recomputed_positions,
        recomputed_hash,
    })
}
