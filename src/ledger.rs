//! Balance ledger seam.
//!
//! The engine consumes a debit/credit contract and nothing more; custody
//! correctness beyond that contract lives with the ledger implementation.
//! Both operations are keyed by an idempotency key so a retried settlement
//! never double-applies.

use crate::errors::{GameError, GameResult};
use crate::games::types::PlayerKey;
use dashmap::DashMap;

pub trait BalanceLedger: Send + Sync {
    /// Remove `amount` from the player's balance. Fails with
    /// `InsufficientFunds` without any partial effect.
    fn debit(&self, player: &PlayerKey, amount: f64, idempotency_key: &str) -> GameResult<()>;

    /// Add `amount` to the player's balance.
    fn credit(&self, player: &PlayerKey, amount: f64, idempotency_key: &str) -> GameResult<()>;

    fn balance(&self, player: &PlayerKey) -> f64;
}

/// In-process ledger. Idempotency keys are claimed before the balance is
/// touched, so a replayed debit or credit is a no-op.
#[derive(Default)]
pub struct MemoryLedger {
    balances: DashMap<PlayerKey, f64>,
    applied: DashMap<String, ()>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a starting balance (deposits are out of band for the engine).
    pub fn with_balance(player: &PlayerKey, amount: f64) -> Self {
        let ledger = Self::new();
        ledger.balances.insert(player.clone(), amount);
        ledger
    }
}

impl BalanceLedger for MemoryLedger {
    fn debit(&self, player: &PlayerKey, amount: f64, idempotency_key: &str) -> GameResult<()> {
        match self.applied.entry(idempotency_key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(()),
            dashmap::mapref::entry::Entry::Vacant(claim) => {
                let mut balance = self.balances.entry(player.clone()).or_insert(0.0);
                if *balance < amount {
                    return Err(GameError::InsufficientFunds {
                        player: player.to_string(),
                        needed: amount,
                        available: *balance,
                    });
                }
                *balance -= amount;
                claim.insert(());
                Ok(())
            }
        }
    }

    fn credit(&self, player: &PlayerKey, amount: f64, idempotency_key: &str) -> GameResult<()> {
        match self.applied.entry(idempotency_key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(()),
            dashmap::mapref::entry::Entry::Vacant(claim) => {
                *self.balances.entry(player.clone()).or_insert(0.0) += amount;
                claim.insert(());
                Ok(())
            }
        }
    }

    fn balance(&self, player: &PlayerKey) -> f64 {
        self.balances.get(player).map(|b| *b).unwrap_or(0.0)
    }
}
