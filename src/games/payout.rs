//! Payout multiplier math for all three modes.
//!
//! The same functions back live previews and final settlement, so a player
//! never sees a multiplier the settlement path would not honour.

use crate::errors::{GameError, GameResult};
use crate::fair::derive::SeedStream;
use serde::{Deserialize, Serialize};

/// House edge for a mines round, linearly interpolated between the
/// configured minimum and maximum as a function of mine density.
pub fn house_edge(mine_count: u32, total_tiles: u32, edge_min: f64, edge_max: f64) -> f64 {
    if total_tiles <= 2 {
        return edge_min;
    }
    let density = (mine_count.saturating_sub(1)) as f64 / (total_tiles - 2) as f64;
    edge_min + (edge_max - edge_min) * density.clamp(0.0, 1.0)
}

/// Edge-free hypergeometric multiplier: the reciprocal of the probability of
/// drawing `revealed` safe tiles in a row without replacement.
pub fn fair_mines_multiplier(total_tiles: u32, mine_count: u32, revealed: u32) -> f64 {
    let mut multiplier = 1.0;
    for i in 0..revealed {
        let p = (total_tiles - mine_count - i) as f64 / (total_tiles - i) as f64;
        multiplier /= p;
    }
    multiplier
}

/// Settlement multiplier after `revealed` safe tiles: the fair multiplier
/// discounted by the house edge at each step, floored at 1.0.
///
/// Precondition: `revealed <= total_tiles - mine_count` (the registry never
/// reveals past the last safe tile).
pub fn mines_multiplier(
    total_tiles: u32,
    mine_count: u32,
    revealed: u32,
    edge_min: f64,
    edge_max: f64,
) -> f64 {
    let h = house_edge(mine_count, total_tiles, edge_min, edge_max);
    let mut multiplier = 1.0;
    for i in 0..revealed {
        let p = (total_tiles - mine_count - i) as f64 / (total_tiles - i) as f64;
        multiplier *= (1.0 - h) / p;
    }
    multiplier.max(1.0)
}

/// One weighted band of the tiered-outcome distribution: values drawn
/// uniformly from `[low, high)` with probability `weight`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub weight: f64,
    pub low: f64,
    pub high: f64,
}

/// Weighted tier table. A policy value, not a fixed law: any table whose
/// weights sum to 1 and whose bands are well-formed is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub tiers: Vec<Tier>,
}

impl TierTable {
    /// Default policy: 40% in [1,2), 30% in [2,5), 20% in [5,20),
    /// 10% in [20,100).
    pub fn default_policy() -> Self {
        Self {
            tiers: vec![
                Tier { weight: 0.40, low: 1.0, high: 2.0 },
                Tier { weight: 0.30, low: 2.0, high: 5.0 },
                Tier { weight: 0.20, low: 5.0, high: 20.0 },
                Tier { weight: 0.10, low: 20.0, high: 100.0 },
            ],
        }
    }

    pub fn validate(&self) -> GameResult<()> {
        if self.tiers.is_empty() {
            return Err(GameError::BadPolicyTable("no tiers configured".into()));
        }
        let mut sum = 0.0;
        for tier in &self.tiers {
            if tier.weight <= 0.0 || !tier.weight.is_finite() {
                return Err(GameError::BadPolicyTable(format!(
                    "tier weight {} must be positive and finite",
                    tier.weight
                )));
            }
            if !(tier.low < tier.high) || tier.low < 1.0 {
                return Err(GameError::BadPolicyTable(format!(
                    "tier bounds [{}, {}) must satisfy 1 <= low < high",
                    tier.low, tier.high
                )));
            }
            sum += tier.weight;
        }
        if (sum - 1.0).abs() > 1e-9 {
            return Err(GameError::BadPolicyTable(format!(
                "tier weights sum to {sum}, expected 1"
            )));
        }
        Ok(())
    }

    /// Largest value the table can produce (exclusive bound).
    pub fn max_value(&self) -> f64 {
        self.tiers.iter().map(|t| t.high).fold(1.0, f64::max)
    }

    /// Draw one value: `tier_select` picks the band by cumulative weight,
    /// `within` places the value uniformly inside it. Both inputs in [0, 1).
    pub fn draw(&self, tier_select: f64, within: f64) -> f64 {
        let mut cumulative = 0.0;
        for tier in &self.tiers {
            cumulative += tier.weight;
            if tier_select < cumulative {
                return tier.low + within * (tier.high - tier.low);
            }
        }
        // Cumulative rounding can leave a sliver above the last boundary.
        let last = self.tiers.last().expect("validated non-empty");
        last.low + within * (last.high - last.low)
    }
}

/// Crash point for a new crash round, drawn from the tier table using the
/// round's combined-seed stream.
pub fn draw_crash_point(stream: &mut SeedStream, policy: &TierTable) -> f64 {
    let tier_select = stream.next_f64();
    let within = stream.next_f64();
    policy.draw(tier_select, within)
}

/// Slide sequence: `len` independent tier draws plus the realized position.
pub fn draw_slide_sequence(
    stream: &mut SeedStream,
    policy: &TierTable,
    len: usize,
) -> (Vec<f64>, usize) {
    let mut sequence = Vec::with_capacity(len);
    for _ in 0..len {
        let tier_select = stream.next_f64();
        let within = stream.next_f64();
        sequence.push(policy.draw(tier_select, within));
    }
    let realized_index = ((stream.next_f64() * len as f64) as usize).min(len.saturating_sub(1));
    (sequence, realized_index)
}
