//! Deterministic expansion of a combined seed into indices and floats.
//!
//! The stream consumes the seed buffer in successive 4-byte big-endian
//! chunks; when the buffer is exhausted it is replaced by its own SHA-256
//! digest and consumption restarts. Fixed-width u32 arithmetic throughout,
//! so independent reimplementations converge on identical output.

use crate::errors::{GameError, GameResult};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Seed-exhausting chunk stream over a 32-byte combined seed.
pub struct SeedStream {
    buffer: Vec<u8>,
    cursor: usize,
}

impl SeedStream {
    pub fn new(combined_seed: &[u8; 32]) -> Self {
        Self {
            buffer: combined_seed.to_vec(),
            cursor: 0,
        }
    }

    /// Next 4 bytes of the stream as a big-endian u32, hash-extending the
    /// buffer when it runs dry.
    pub fn next_u32(&mut self) -> u32 {
        if self.cursor + 4 > self.buffer.len() {
            let mut hasher = Sha256::new();
            hasher.update(&self.buffer);
            self.buffer = hasher.finalize().to_vec();
            self.cursor = 0;
        }
        let chunk = &self.buffer[self.cursor..self.cursor + 4];
        self.cursor += 4;
        u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }

    /// Next value uniformly mapped into [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        self.next_u32() as f64 / (u32::MAX as f64 + 1.0)
    }
}

/// Derive `k` distinct indices in `[0, n)` from the combined seed, ascending.
///
/// Draws `u32 % n` from the stream and rejects duplicates until `k` unique
/// indices have been collected. `k = 0` yields an empty layout; `k >= n`
/// leaves no safe cell and is rejected.
pub fn derive_positions(combined_seed: &[u8; 32], k: u32, n: u32) -> GameResult<Vec<u32>> {
    if k == 0 {
        return Ok(Vec::new());
    }
    if k >= n {
        return Err(GameError::InvalidMineCount {
            count: k,
            total_tiles: n,
            max: n.saturating_sub(1),
        });
    }

    let mut stream = SeedStream::new(combined_seed);
    let mut seen = HashSet::with_capacity(k as usize);
    let mut positions = Vec::with_capacity(k as usize);
    while positions.len() < k as usize {
        let index = stream.next_u32() % n;
        if seen.insert(index) {
            positions.push(index);
        }
    }
    positions.sort_unstable();
    Ok(positions)
}
