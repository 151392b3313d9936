//! Durable round/audit store.
//!
//! Write-through happens at terminal transitions only; mid-round state never
//! reaches disk and the store is never authoritative while a round is live.
//! Records retain the server seed so rounds stay verifiable after restart.

use crate::errors::{GameError, GameResult};
use crate::games::types::{RoundRecord, SettlementStatus};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

const RECORD_PREFIX: &str = "round:record:";
const RECENT_PREFIX: &[u8] = b"round:index:recent:";
const PENDING_PREFIX: &[u8] = b"settlement:pending:";
const STATS_KEY: &[u8] = b"house:stats";

/// Cumulative house statistics, updated on every terminal round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HouseStats {
    pub total_wagered: f64,
    pub total_paid_out: f64,
    pub round_count: u64,
}

pub trait RoundStore: Send + Sync {
    fn persist(&self, record: &RoundRecord) -> GameResult<()>;
    fn load(&self, round_id: Uuid) -> GameResult<Option<RoundRecord>>;
    /// Finished rounds, newest first.
    fn recent(&self, limit: usize) -> GameResult<Vec<RoundRecord>>;
    /// Rounds whose payout credit has not completed.
    fn pending_settlements(&self) -> GameResult<Vec<RoundRecord>>;
    fn load_stats(&self) -> GameResult<HouseStats>;
    fn store_stats(&self, stats: &HouseStats) -> GameResult<()>;
}

/// Fold a finished round into the house statistics.
pub fn apply_house_stats(store: &dyn RoundStore, record: &RoundRecord) -> GameResult<()> {
    let mut stats = store.load_stats()?;
    stats.total_wagered += record.wager;
    stats.total_paid_out += record.payout;
    stats.round_count += 1;
    store.store_stats(&stats)
}

fn record_key(round_id: Uuid) -> Vec<u8> {
    format!("{RECORD_PREFIX}{round_id}").into_bytes()
}

fn recent_index_key(record: &RoundRecord) -> Vec<u8> {
    // Newest-first scan order via an inverted timestamp as the primary sort
    // key. Layout: prefix | inv_millis(be) | uuid bytes.
    let inv_millis = u64::MAX - record.finished_at.timestamp_millis().max(0) as u64;
    let mut key = Vec::with_capacity(RECENT_PREFIX.len() + 8 + 16);
    key.extend_from_slice(RECENT_PREFIX);
    key.extend_from_slice(&inv_millis.to_be_bytes());
    key.extend_from_slice(record.round_id.as_bytes());
    key
}

fn pending_key(round_id: Uuid) -> Vec<u8> {
    let mut key = Vec::with_capacity(PENDING_PREFIX.len() + 16);
    key.extend_from_slice(PENDING_PREFIX);
    key.extend_from_slice(round_id.as_bytes());
    key
}

fn encode(record: &RoundRecord) -> GameResult<Vec<u8>> {
    serde_json::to_vec(record).map_err(|e| {
        GameError::Storage(format!(
            "failed to encode round {}: {e}",
            record.round_id
        ))
    })
}

fn decode(round_id: &str, bytes: &[u8]) -> GameResult<RoundRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| GameError::Storage(format!("failed to decode round {round_id}: {e}")))
}

/// RocksDB-backed store.
pub struct RocksRoundStore {
    db: rocksdb::DB,
}

impl RocksRoundStore {
    pub fn open<P: AsRef<Path>>(path: P) -> GameResult<Self> {
        let mut options = rocksdb::Options::default();
        options.create_if_missing(true);
        let db = rocksdb::DB::open(&options, path)
            .map_err(|e| GameError::Storage(format!("failed to open round store: {e}")))?;
        Ok(Self { db })
    }

    fn scan_prefix(&self, prefix: &[u8]) -> GameResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut rows = Vec::new();
        let iter = self.db.iterator(rocksdb::IteratorMode::From(
            prefix,
            rocksdb::Direction::Forward,
        ));
        for item in iter {
            let (key, value) =
                item.map_err(|e| GameError::Storage(format!("iterator failed: {e}")))?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    fn uuid_from_key_suffix(key: &[u8]) -> Option<Uuid> {
        if key.len() < 16 {
            return None;
        }
        let suffix: [u8; 16] = key[key.len() - 16..].try_into().ok()?;
        Some(Uuid::from_bytes(suffix))
    }
}

impl RoundStore for RocksRoundStore {
    fn persist(&self, record: &RoundRecord) -> GameResult<()> {
        let bytes = encode(record)?;
        let mut batch = rocksdb::WriteBatch::default();
        batch.put(record_key(record.round_id), &bytes);
        batch.put(recent_index_key(record), record.round_id.as_bytes());

        // The pending index carries only unsettled rounds; a completed
        // settlement removes its entry in the same batch.
        if record.settlement == SettlementStatus::Complete {
            batch.delete(pending_key(record.round_id));
        } else {
            batch.put(pending_key(record.round_id), record.round_id.as_bytes());
        }

        self.db
            .write(batch)
            .map_err(|e| GameError::Storage(format!("failed to persist round: {e}")))?;
        tracing::debug!(
            round_id = %record.round_id,
            status = %record.status,
            settlement = ?record.settlement,
            "persisted round record"
        );
        Ok(())
    }

    fn load(&self, round_id: Uuid) -> GameResult<Option<RoundRecord>> {
        let bytes = self
            .db
            .get(record_key(round_id))
            .map_err(|e| GameError::Storage(format!("read failed: {e}")))?;
        match bytes {
            Some(bytes) => Ok(Some(decode(&round_id.to_string(), &bytes)?)),
            None => Ok(None),
        }
    }

    fn recent(&self, limit: usize) -> GameResult<Vec<RoundRecord>> {
        let mut records = Vec::new();
        for (key, _) in self.scan_prefix(RECENT_PREFIX)? {
            if records.len() >= limit {
                break;
            }
            let Some(round_id) = Self::uuid_from_key_suffix(&key) else {
                continue;
            };
            if let Some(record) = self.load(round_id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn pending_settlements(&self) -> GameResult<Vec<RoundRecord>> {
        let mut records = Vec::new();
        for (key, _) in self.scan_prefix(PENDING_PREFIX)? {
            let Some(round_id) = Self::uuid_from_key_suffix(&key) else {
                continue;
            };
            match self.load(round_id)? {
                Some(record) if record.settlement != SettlementStatus::Complete => {
                    records.push(record)
                }
                Some(_) => {}
                None => tracing::warn!(
                    round_id = %round_id,
                    "pending index entry without a round record"
                ),
            }
        }
        Ok(records)
    }

    fn load_stats(&self) -> GameResult<HouseStats> {
        let bytes = self
            .db
            .get(STATS_KEY)
            .map_err(|e| GameError::Storage(format!("read failed: {e}")))?;
        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| GameError::Storage(format!("failed to decode stats: {e}"))),
            None => Ok(HouseStats::default()),
        }
    }

    fn store_stats(&self, stats: &HouseStats) -> GameResult<()> {
        let bytes = serde_json::to_vec(stats)
            .map_err(|e| GameError::Storage(format!("failed to encode stats: {e}")))?;
        self.db
            .put(STATS_KEY, bytes)
            .map_err(|e| GameError::Storage(format!("write failed: {e}")))
    }
}

/// In-memory store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryRoundStore {
    records: DashMap<Uuid, RoundRecord>,
    stats: std::sync::RwLock<HouseStats>,
}

impl MemoryRoundStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoundStore for MemoryRoundStore {
    fn persist(&self, record: &RoundRecord) -> GameResult<()> {
        self.records.insert(record.round_id, record.clone());
        Ok(())
    }

    fn load(&self, round_id: Uuid) -> GameResult<Option<RoundRecord>> {
        Ok(self.records.get(&round_id).map(|r| r.clone()))
    }

    fn recent(&self, limit: usize) -> GameResult<Vec<RoundRecord>> {
        let mut records: Vec<RoundRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| std::cmp::Reverse(r.finished_at));
        records.truncate(limit);
        Ok(records)
    }

    fn pending_settlements(&self) -> GameResult<Vec<RoundRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.settlement != SettlementStatus::Complete)
            .map(|r| r.value().clone())
            .collect())
    }

    fn load_stats(&self) -> GameResult<HouseStats> {
        Ok(self.stats.read().expect("stats lock").clone())
    }

    fn store_stats(&self, stats: &HouseStats) -> GameResult<()> {
        *self.stats.write().expect("stats lock") = stats.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::{GameMode, PlayerKey, RecordOutcome, RoundStatus};
    use chrono::{Duration, Utc};

    fn fixture_record(settlement: SettlementStatus, age_secs: i64) -> RoundRecord {
        let finished = Utc::now() - Duration::seconds(age_secs);
        RoundRecord {
            round_id: Uuid::new_v4(),
            player: PlayerKey::new("alice"),
            mode: GameMode::Mines,
            wager: 5.0,
            status: RoundStatus::CashedOut,
            final_multiplier: 1.5,
            payout: 7.5,
            server_seed: "seed".into(),
            server_seed_hash: "hash".into(),
            client_seed: "client".into(),
            game_hash: "game".into(),
            outcome: RecordOutcome::Mines {
                total_tiles: 25,
                mine_count: 3,
                positions: vec![1, 5, 9],
                revealed: vec![0, 2],
            },
            created_at: finished - Duration::seconds(30),
            finished_at: finished,
            settlement,
            retry_count: 0,
        }
    }

    #[test]
    fn test_rocks_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RocksRoundStore::open(dir.path()).unwrap();

        let record = fixture_record(SettlementStatus::Complete, 0);
        store.persist(&record).unwrap();

        let loaded = store.load(record.round_id).unwrap().unwrap();
        assert_eq!(loaded.round_id, record.round_id);
        assert_eq!(loaded.server_seed, "seed");
        assert_eq!(loaded.payout, 7.5);
        assert!(store.load(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_rocks_recent_ordering() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RocksRoundStore::open(dir.path()).unwrap();

        let older = fixture_record(SettlementStatus::Complete, 60);
        let newer = fixture_record(SettlementStatus::Complete, 1);
        store.persist(&older).unwrap();
        store.persist(&newer).unwrap();

        let recent = store.recent(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].round_id, newer.round_id);
        assert_eq!(recent[1].round_id, older.round_id);

        assert_eq!(store.recent(1).unwrap().len(), 1);
    }

    #[test]
    fn test_rocks_pending_index_lifecycle() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RocksRoundStore::open(dir.path()).unwrap();

        let mut record = fixture_record(SettlementStatus::PendingSettlement, 0);
        store.persist(&record).unwrap();
        let pending = store.pending_settlements().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].round_id, record.round_id);

        record.settlement = SettlementStatus::Complete;
        store.persist(&record).unwrap();
        assert!(store.pending_settlements().unwrap().is_empty());
    }

    #[test]
    fn test_house_stats_accumulate() {
        let store = MemoryRoundStore::new();
        let record = fixture_record(SettlementStatus::Complete, 0);

        apply_house_stats(&store, &record).unwrap();
        apply_house_stats(&store, &record).unwrap();

        let stats = store.load_stats().unwrap();
        assert_eq!(stats.round_count, 2);
        assert_eq!(stats.total_wagered, 10.0);
        assert_eq!(stats.total_paid_out, 15.0);
    }

    #[test]
    fn test_memory_store_pending_filter() {
        let store = MemoryRoundStore::new();
        store
            .persist(&fixture_record(SettlementStatus::Complete, 0))
            .unwrap();
        store
            .persist(&fixture_record(SettlementStatus::SettlementFailed, 0))
            .unwrap();
        assert_eq!(store.pending_settlements().unwrap().len(), 1);
    }
}
